//! The polling scheduler: owns the timer lifecycle of every query watched
//! with a poll interval. A polling query belongs to the scheduler from
//! creation; the direct-watch path never touches it.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, Weak},
};

use tracing::{debug, warn};

use crate::{
    manager::{QueryListener, QueryManager},
    observable::ObservableQuery,
    types::{QueryId, WatchQueryOptions},
};

pub struct QueryScheduler {
    manager: Weak<QueryManager>,
    pollers: Mutex<HashMap<QueryId, tokio::task::JoinHandle<()>>>,
}

impl QueryScheduler {
    pub(crate) fn new(manager: Weak<QueryManager>) -> Self { Self { manager, pollers: Mutex::new(HashMap::new()) } }

    /// Build the watch handle for options carrying a poll interval.
    pub fn register_polling_query(&self, manager: &Arc<QueryManager>, options: WatchQueryOptions) -> ObservableQuery {
        ObservableQuery::new(manager.clone(), options)
    }

    /// Install the listener (when this is the query's registration) and arm
    /// the poll timer: one fetch now, then a forced refetch per interval.
    pub fn start_polling_query(&self, options: WatchQueryOptions, query_id: QueryId, listener: Option<QueryListener>) {
        let Some(interval) = options.poll_interval else {
            warn!("query {query_id} registered with the scheduler without a poll interval");
            return;
        };
        let Some(manager) = self.manager.upgrade() else { return };
        if let Some(listener) = listener {
            manager.add_query_listener(query_id, listener);
        }

        let weak = self.manager.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = manager.fetch_query(query_id, options.clone()).await {
                debug!("registration fetch for polling query {query_id} settled with {e}");
            }
            drop(manager);
            loop {
                tokio::time::sleep(interval).await;
                let Some(manager) = weak.upgrade() else { break };
                debug!("poll tick for query {query_id}");
                let mut forced = options.clone();
                forced.force_fetch = true;
                if let Err(e) = manager.fetch_query(query_id, forced).await {
                    debug!("poll fetch for query {query_id} settled with {e}");
                }
            }
        });
        // A later start for the same id supersedes the old timer
        if let Some(previous) = self.pollers.lock().unwrap().insert(query_id, handle) {
            previous.abort();
        }
    }

    /// Release the poll slot. The listener, if any, is untouched; dropping
    /// the whole query is the manager's `stop_query`.
    pub fn stop_polling_query(&self, query_id: QueryId) {
        if let Some(handle) = self.pollers.lock().unwrap().remove(&query_id) {
            handle.abort();
        }
    }
}

impl Drop for QueryScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.pollers.lock().unwrap().drain() {
            handle.abort();
        }
    }
}
