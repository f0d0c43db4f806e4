//! The watch handle surface: an observer capability record, the observable
//! query it subscribes to, and the subscription handle controlling the
//! watch's lifecycle.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, Weak,
};

use tokio::sync::oneshot;
use tracing::{debug, error};

use crate::{
    cache::read::read_selection_set_from_store,
    error::{QueryError, TransportError},
    manager::{QueryListener, QueryManager},
    store::QueryStoreValue,
    types::{GraphQLResult, QueryId, Variables, WatchQueryOptions},
};

/// What a subscriber can receive. Either capability may be omitted; a
/// network error with no `error` callback is logged and dropped.
#[derive(Default)]
pub struct QueryObserver {
    pub next: Option<Box<dyn Fn(GraphQLResult) + Send + Sync>>,
    pub error: Option<Box<dyn Fn(TransportError) + Send + Sync>>,
}

impl QueryObserver {
    pub fn new() -> Self { Self::default() }

    pub fn on_next(mut self, f: impl Fn(GraphQLResult) + Send + Sync + 'static) -> Self {
        self.next = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(TransportError) + Send + Sync + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }
}

/// A watchable query. Nothing happens until `subscribe`; each subscription
/// is an independent watch with its own query id.
pub struct ObservableQuery {
    manager: Arc<QueryManager>,
    options: WatchQueryOptions,
}

impl ObservableQuery {
    pub(crate) fn new(manager: Arc<QueryManager>, options: WatchQueryOptions) -> Self { Self { manager, options } }

    pub fn subscribe(&self, observer: QueryObserver) -> QuerySubscription {
        let query_id = self.manager.generate_query_id();
        let listener = store_listener(Arc::downgrade(&self.manager), self.options.return_partial_data, Arc::new(observer));

        if self.options.poll_interval.is_some() {
            self.manager.scheduler().start_polling_query(self.options.clone(), query_id, Some(listener));
        } else {
            self.manager.start_query(query_id, self.options.clone(), listener);
        }
        debug!("subscribed query {query_id}");

        QuerySubscription {
            manager: self.manager.clone(),
            query_id,
            options: Mutex::new(self.options.clone()),
            active: AtomicBool::new(true),
        }
    }

    /// One-shot form: subscribe, take the first delivery, then tear the
    /// subscription down on the next turn of the event loop.
    pub async fn result(&self) -> Result<GraphQLResult, QueryError> {
        let (tx, rx) = oneshot::channel::<Result<GraphQLResult, QueryError>>();
        let slot = Arc::new(Mutex::new(Some(tx)));
        let on_next = slot.clone();
        let on_error = slot.clone();
        let observer = QueryObserver::new()
            .on_next(move |result| {
                if let Some(tx) = on_next.lock().unwrap().take() {
                    let _ = tx.send(Ok(result));
                }
            })
            .on_error(move |error| {
                if let Some(tx) = on_error.lock().unwrap().take() {
                    let _ = tx.send(Err(QueryError::Network(error)));
                }
            });

        let subscription = self.subscribe(observer);
        let outcome = rx.await.map_err(|_| QueryError::Ended)?;
        tokio::spawn(async move {
            subscription.unsubscribe();
        });
        outcome
    }
}

/// Handle for one live watch. Dropping it tears the watch down the same way
/// an explicit `unsubscribe` does.
pub struct QuerySubscription {
    manager: Arc<QueryManager>,
    query_id: QueryId,
    options: Mutex<WatchQueryOptions>,
    active: AtomicBool,
}

impl QuerySubscription {
    pub fn query_id(&self) -> QueryId { self.query_id }

    /// Remove the listener, release any poll slot, and mark the query
    /// stopped in the store. In-flight requests are not cancelled; a late
    /// result still updates the store but reaches no listener.
    pub fn unsubscribe(self) { self.teardown(); }

    fn teardown(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.manager.stop_query(self.query_id);
        }
    }

    /// Re-enter the fetch path for this query with `force_fetch` set,
    /// optionally overlaying new variable values.
    pub async fn refetch(&self, variables: Option<Variables>) -> Result<GraphQLResult, QueryError> {
        let options = {
            let mut options = self.options.lock().unwrap();
            if let Some(new_variables) = variables {
                let merged = options.variables.get_or_insert_with(Variables::new);
                for (key, value) in new_variables {
                    merged.insert(key, value);
                }
            }
            options.force_fetch = true;
            options.clone()
        };
        self.manager.fetch_query(self.query_id, options).await
    }

    /// Hand this query's cadence to the scheduler. The listener installed at
    /// subscribe time keeps receiving every delivery.
    pub fn start_polling(&self, interval: std::time::Duration) {
        let options = {
            let mut options = self.options.lock().unwrap();
            options.poll_interval = Some(interval);
            options.clone()
        };
        self.manager.scheduler().start_polling_query(options, self.query_id, None);
    }

    /// Release the poll slot without ending the watch.
    pub fn stop_polling(&self) { self.manager.scheduler().stop_polling_query(self.query_id); }
}

impl Drop for QuerySubscription {
    fn drop(&mut self) { self.teardown(); }
}

/// Bridge a store snapshot to the observer per the delivery contract:
/// nothing while loading (unless partial data was requested), GraphQL errors
/// through `next`, transport errors through `error`, and otherwise a fresh
/// read of the query's full selection against the cache.
fn store_listener(manager: Weak<QueryManager>, return_partial_data: bool, observer: Arc<QueryObserver>) -> QueryListener {
    Box::new(move |value: &QueryStoreValue| {
        if value.loading && !value.return_partial_data {
            return;
        }
        if let Some(errors) = &value.graphql_errors {
            if let Some(next) = &observer.next {
                next(GraphQLResult { data: None, errors: Some(errors.clone()) });
            }
        } else if let Some(network_error) = &value.network_error {
            if let Some(on_error) = &observer.error {
                on_error(network_error.clone());
            } else {
                error!("unhandled network error on watched query: {network_error}");
            }
        } else {
            let Some(manager) = manager.upgrade() else { return };
            let state = manager.cache_state();
            match read_selection_set_from_store(
                &state.data,
                &value.query.id,
                &value.query.selection_set,
                value.variables.as_ref(),
                &value.fragment_map,
                return_partial_data,
            ) {
                Ok(data) => {
                    if let Some(next) = &observer.next {
                        next(GraphQLResult::data(data));
                    }
                }
                // The snapshot can lag the watch (e.g. right after a variable
                // change); the next broadcast delivers the consistent view.
                Err(e) => debug!("skipping delivery for incomplete snapshot: {e}"),
            }
        }
    })
}
