//! The shared request batcher.
//!
//! Fetches never talk to the transport directly; they enqueue here and get a
//! one-shot handle back. A timer drains the queue on a fixed cadence,
//! coalescing everything queued in the window onto a single `batch_query`
//! round trip when the transport supports it.

use std::{
    sync::{Arc, Mutex, Weak},
    time::Duration,
};

use tokio::sync::oneshot;
use tracing::debug;

use crate::{
    error::TransportError,
    network::NetworkInterface,
    types::{GraphQLRequest, GraphQLResult, QueryId},
};

pub const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_millis(25);

/// One enqueued fetch attempt.
pub struct QueuedRequest {
    pub request: GraphQLRequest,
    /// The query this attempt belongs to, when it came from the fetch path
    pub query_id: Option<QueryId>,
}

/// Resolves with the transport's answer for one enqueued request. The error
/// arm is a delivered value, exactly like the success arm.
pub type ResponseHandle = oneshot::Receiver<Result<GraphQLResult, TransportError>>;

#[derive(Clone)]
pub struct QueryBatcher(Arc<BatcherInner>);

struct BatcherInner {
    network: Arc<dyn NetworkInterface>,
    should_batch: bool,
    queue: Mutex<Vec<PendingRequest>>,
    poller: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

struct PendingRequest {
    request: GraphQLRequest,
    query_id: Option<QueryId>,
    tx: oneshot::Sender<Result<GraphQLResult, TransportError>>,
}

impl QueryBatcher {
    pub fn new(network: Arc<dyn NetworkInterface>, should_batch: bool) -> Self {
        Self(Arc::new(BatcherInner { network, should_batch, queue: Mutex::new(Vec::new()), poller: Mutex::new(None) }))
    }

    pub fn enqueue_request(&self, queued: QueuedRequest) -> ResponseHandle {
        let (tx, rx) = oneshot::channel();
        self.0.queue.lock().unwrap().push(PendingRequest { request: queued.request, query_id: queued.query_id, tx });
        rx
    }

    /// Drain the queue onto the transport. Called by the timer, and directly
    /// by hosts that drive the cadence themselves.
    pub fn consume_queue(&self) {
        let pending: Vec<PendingRequest> = std::mem::take(&mut *self.0.queue.lock().unwrap());
        if pending.is_empty() {
            return;
        }
        debug!("batcher consuming {} queued request(s), ids {:?}", pending.len(), pending.iter().map(|p| p.query_id).collect::<Vec<_>>());
        let network = self.0.network.clone();

        if self.0.should_batch {
            tokio::spawn(async move {
                let requests: Vec<GraphQLRequest> = pending.iter().map(|p| p.request.clone()).collect();
                match network.batch_query(requests).await {
                    Ok(results) if results.len() == pending.len() => {
                        for (item, result) in pending.into_iter().zip(results) {
                            let _ = item.tx.send(Ok(result));
                        }
                    }
                    Ok(results) => {
                        let error = TransportError::BatchMismatch { expected: pending.len(), got: results.len() };
                        for item in pending {
                            let _ = item.tx.send(Err(error.clone()));
                        }
                    }
                    Err(error) => {
                        for item in pending {
                            let _ = item.tx.send(Err(error.clone()));
                        }
                    }
                }
            });
        } else {
            tokio::spawn(async move {
                let in_flight: Vec<_> = pending.iter().map(|item| network.query(item.request.clone())).collect();
                let results = futures::future::join_all(in_flight).await;
                for (item, result) in pending.into_iter().zip(results) {
                    let _ = item.tx.send(result);
                }
            });
        }
    }

    /// Arm the cadence timer. The task holds only a weak handle, so dropping
    /// the batcher ends it.
    pub fn start(&self, interval: Duration) {
        let weak: Weak<BatcherInner> = Arc::downgrade(&self.0);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                QueryBatcher(inner).consume_queue();
            }
        });
        *self.0.poller.lock().unwrap() = Some(handle);
    }

    pub fn stop(&self) {
        if let Some(handle) = self.0.poller.lock().unwrap().take() {
            handle.abort();
        }
    }
}

impl Drop for BatcherInner {
    fn drop(&mut self) {
        if let Some(handle) = self.poller.lock().unwrap().take() {
            handle.abort();
        }
    }
}
