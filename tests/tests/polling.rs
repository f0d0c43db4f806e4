mod common;
use common::*;

use serde_json::json;
use std::time::Duration;
use tokio::time::sleep;

const VERSION_QUERY: &str = "{ deploy { version } }";

#[tokio::test]
async fn a_poll_interval_hands_the_query_to_the_scheduler() {
    let network = MockNetwork::new();
    let store = RecordingStore::new();
    network.respond(VERSION_QUERY, json!({ "deploy": { "version": 1 } }));
    let manager = manager_with(network.clone(), store.clone());

    let mut options = WatchQueryOptions::new(gql(VERSION_QUERY));
    options.poll_interval = Some(Duration::from_millis(30));
    let watch = manager.watch_query(options);
    let observed = TestObserver::new();
    let subscription = watch.subscribe(observed.observer());

    // The cache is full after the first answer; only forced refetches can
    // explain further traffic.
    network.wait_for_requests(3).await;
    observed.wait_for_results(1).await;

    subscription.stop_polling();
    settle().await;
    let after_stop = network.requests().len();
    sleep(Duration::from_millis(120)).await;
    assert_eq!(network.requests().len(), after_stop);

    subscription.unsubscribe();
    assert!(store.events().contains(&"APOLLO_QUERY_STOP"));
}

#[tokio::test]
async fn start_polling_upgrades_a_direct_watch() {
    let network = MockNetwork::new();
    let store = RecordingStore::new();
    network.respond(VERSION_QUERY, json!({ "deploy": { "version": 1 } }));
    let manager = manager_with(network.clone(), store.clone());

    let watch = manager.watch_query(WatchQueryOptions::new(gql(VERSION_QUERY)));
    let observed = TestObserver::new();
    let subscription = watch.subscribe(observed.observer());
    observed.wait_for_results(1).await;
    assert_eq!(network.requests().len(), 1);

    subscription.start_polling(Duration::from_millis(30));
    network.wait_for_requests(3).await;

    // Unsubscribing releases the poll slot along with the listener
    subscription.unsubscribe();
    settle().await;
    let after_stop = network.requests().len();
    sleep(Duration::from_millis(120)).await;
    assert_eq!(network.requests().len(), after_stop);
}

#[tokio::test]
async fn polling_delivers_changed_data_to_the_observer() {
    let network = MockNetwork::new();
    let store = RecordingStore::new();
    network.respond(VERSION_QUERY, json!({ "deploy": { "version": 1 } }));
    let manager = manager_with(network.clone(), store.clone());

    let mut options = WatchQueryOptions::new(gql(VERSION_QUERY));
    options.poll_interval = Some(Duration::from_millis(30));
    let watch = manager.watch_query(options);
    let observed = TestObserver::new();
    let subscription = watch.subscribe(observed.observer());

    observed.wait_for_data(&json!({ "deploy": { "version": 1 } })).await;
    network.respond(VERSION_QUERY, json!({ "deploy": { "version": 2 } }));
    observed.wait_for_data(&json!({ "deploy": { "version": 2 } })).await;

    subscription.unsubscribe();
}
