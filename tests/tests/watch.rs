mod common;
use common::*;

use serde_json::json;

const USER_BY_ID: &str = "query UserById($id: ID!) { user(id: $id) { name } }";

#[tokio::test]
async fn refetch_reenters_the_fetch_path_with_new_variables() {
    let network = MockNetwork::new();
    let store = RecordingStore::new();
    network.respond_for_variables(USER_BY_ID, vars(json!({ "id": 1 })), json!({ "user": { "name": "Ada" } }));
    network.respond_for_variables(USER_BY_ID, vars(json!({ "id": 2 })), json!({ "user": { "name": "Alan" } }));
    let manager = manager_with(network.clone(), store.clone());

    let mut options = WatchQueryOptions::new(gql(USER_BY_ID));
    options.variables = Some(vars(json!({ "id": 1 })));
    let watch = manager.watch_query(options);
    let observed = TestObserver::new();
    let subscription = watch.subscribe(observed.observer());

    let first = observed.wait_for_results(1).await;
    assert_eq!(first[0].data, Some(json!({ "user": { "name": "Ada" } })));

    let refetched = subscription.refetch(Some(vars(json!({ "id": 2 })))).await.unwrap();
    assert_eq!(refetched.data, Some(json!({ "user": { "name": "Alan" } })));

    let deliveries = observed.wait_for_results(2).await;
    assert_eq!(deliveries[1].data, Some(json!({ "user": { "name": "Alan" } })));
    assert_eq!(network.requests().len(), 2);
    assert_eq!(network.requests()[1].variables, Some(vars(json!({ "id": 2 }))));

    subscription.unsubscribe();
}

#[tokio::test]
async fn unsubscribe_before_the_result_starves_the_listener_but_not_the_store() {
    let network = MockNetwork::new();
    let store = RecordingStore::new();
    network.respond("{ user(id: 1) { name } }", json!({ "user": { "name": "Ada" } }));
    let manager = manager_with(network.clone(), store.clone());

    let gate = network.gate();
    let watch = manager.watch_query(WatchQueryOptions::new(gql("{ user(id: 1) { name } }")));
    let observed = TestObserver::new();
    let subscription = watch.subscribe(observed.observer());

    network.wait_for_requests(1).await;
    subscription.unsubscribe();
    assert!(store.events().contains(&"APOLLO_QUERY_STOP"));

    // Late resolve: no cancellation, so the store still absorbs the result
    gate.notify_one();
    settle().await;

    assert!(observed.results().is_empty());
    assert!(observed.errors().is_empty());
    let state = store.state();
    assert!(state.data.contains_key("ROOT_QUERY"));
    assert!(state.queries.is_empty());
}

#[tokio::test]
async fn partial_data_watch_delivers_cache_first_then_the_filled_result() {
    let network = MockNetwork::new();
    let store = RecordingStore::new();
    network.respond("{ user(id: 1) { name } }", json!({ "user": { "name": "Ada" } }));
    network.respond("{ user(id: 1) { email } }", json!({ "user": { "email": "ada@example.com" } }));
    let manager = manager_with(network.clone(), store.clone());

    manager.query(WatchQueryOptions::new(gql("{ user(id: 1) { name } }"))).await.unwrap();

    let mut options = WatchQueryOptions::new(gql("{ user(id: 1) { name email } }"));
    options.return_partial_data = true;
    let watch = manager.watch_query(options);
    let observed = TestObserver::new();
    let subscription = watch.subscribe(observed.observer());

    observed.wait_for_data(&json!({ "user": { "name": "Ada", "email": "ada@example.com" } })).await;
    assert_eq!(observed.results()[0].data, Some(json!({ "user": { "name": "Ada" } })));
    assert!(store.events().contains(&"APOLLO_QUERY_RESULT_CLIENT"));

    subscription.unsubscribe();
}

#[tokio::test]
async fn watchers_see_updates_written_by_other_queries() {
    let network = MockNetwork::new();
    let store = RecordingStore::new();
    network.respond("{ user(id: 1) { name } }", json!({ "user": { "name": "Ada" } }));
    let manager = manager_with(network.clone(), store.clone());

    let watch = manager.watch_query(WatchQueryOptions::new(gql("{ user(id: 1) { name } }")));
    let observed = TestObserver::new();
    let subscription = watch.subscribe(observed.observer());
    observed.wait_for_results(1).await;

    // Someone else forces the same selection past the cache
    network.respond("{ user(id: 1) { name } }", json!({ "user": { "name": "Grace" } }));
    let mut forced = WatchQueryOptions::new(gql("{ user(id: 1) { name } }"));
    forced.force_fetch = true;
    manager.query(forced).await.unwrap();

    observed.wait_for_data(&json!({ "user": { "name": "Grace" } })).await;
    assert_eq!(observed.results()[0].data, Some(json!({ "user": { "name": "Ada" } })));

    subscription.unsubscribe();
}
