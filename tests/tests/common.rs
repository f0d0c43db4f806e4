#![allow(unused)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::time::{sleep, Duration, Instant};

pub use tessera_core::{
    document::{parse, print},
    error::{MutationError, QueryError, TransportError},
    observable::QueryObserver,
    store::{CacheState, Store, StoreAdapter, StoreEvent, StoreListener},
    GraphQLError, GraphQLRequest, GraphQLResult, MutationOptions, NetworkInterface, QueryManager, QueryManagerOptions,
    Variables, WatchQueryOptions,
};

pub fn gql(source: &str) -> apollo_compiler::ast::Document { parse(source).unwrap() }

/// The canonical wire form of a query source: what the manager will actually
/// put in a request body.
pub fn printed(source: &str) -> String { print(&gql(source)) }

pub fn vars(value: serde_json::Value) -> Variables { value.as_object().unwrap().clone() }

struct MockResponse {
    query: String,
    variables: Option<Variables>,
    result: Result<GraphQLResult, TransportError>,
}

/// Scripted transport: responses are matched on the printed query text (and
/// variables, when given), and every request is recorded for assertions.
pub struct MockNetwork {
    batching: bool,
    responses: Mutex<Vec<MockResponse>>,
    requests: Mutex<Vec<GraphQLRequest>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl MockNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { batching: false, responses: Mutex::new(Vec::new()), requests: Mutex::new(Vec::new()), gate: Mutex::new(None) })
    }

    pub fn batching() -> Arc<Self> {
        Arc::new(Self { batching: true, responses: Mutex::new(Vec::new()), requests: Mutex::new(Vec::new()), gate: Mutex::new(None) })
    }

    pub fn respond(&self, source: &str, data: serde_json::Value) {
        self.responses.lock().unwrap().push(MockResponse { query: printed(source), variables: None, result: Ok(GraphQLResult::data(data)) });
    }

    pub fn respond_for_variables(&self, source: &str, variables: Variables, data: serde_json::Value) {
        self.responses.lock().unwrap().push(MockResponse {
            query: printed(source),
            variables: Some(variables),
            result: Ok(GraphQLResult::data(data)),
        });
    }

    /// Register a response for an exact wire string (for transformed queries).
    pub fn respond_raw(&self, query: String, result: GraphQLResult) {
        self.responses.lock().unwrap().push(MockResponse { query, variables: None, result: Ok(result) });
    }

    pub fn respond_with_errors(&self, source: &str, errors: Vec<GraphQLError>) {
        self.responses.lock().unwrap().push(MockResponse {
            query: printed(source),
            variables: None,
            result: Ok(GraphQLResult { data: None, errors: Some(errors) }),
        });
    }

    pub fn fail(&self, source: &str, error: TransportError) {
        self.responses.lock().unwrap().push(MockResponse { query: printed(source), variables: None, result: Err(error) });
    }

    pub fn requests(&self) -> Vec<GraphQLRequest> { self.requests.lock().unwrap().clone() }

    /// Hold every response until the returned handle is notified.
    pub fn gate(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Wait until the manager has put `count` requests on the wire.
    pub async fn wait_for_requests(&self, count: usize) -> Vec<GraphQLRequest> {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let requests = self.requests();
            if requests.len() >= count {
                return requests;
            }
            assert!(Instant::now() < deadline, "expected {count} request(s), saw {}", requests.len());
            sleep(Duration::from_millis(5)).await;
        }
    }

    fn lookup(&self, request: &GraphQLRequest) -> Result<GraphQLResult, TransportError> {
        // Later registrations win, so a test can change the server's answer
        // part-way through
        let responses = self.responses.lock().unwrap();
        responses
            .iter()
            .rev()
            .find(|r| r.query == request.query && (r.variables.is_none() || r.variables == request.variables))
            .map(|r| r.result.clone())
            .unwrap_or_else(|| Err(TransportError::Network(format!("no mock response for {}", request.query))))
    }
}

#[async_trait]
impl NetworkInterface for MockNetwork {
    async fn query(&self, request: GraphQLRequest) -> Result<GraphQLResult, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.lookup(&request)
    }

    fn supports_batching(&self) -> bool { self.batching }

    async fn batch_query(&self, requests: Vec<GraphQLRequest>) -> Result<Vec<GraphQLResult>, TransportError> {
        self.requests.lock().unwrap().extend(requests.iter().cloned());
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        requests.iter().map(|request| self.lookup(request)).collect()
    }
}

/// Reference store wrapped with an event-kind tape, so tests can assert the
/// exact transition sequence a code path produced.
pub struct RecordingStore {
    inner: Store,
    events: Mutex<Vec<&'static str>>,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> { Arc::new(Self { inner: Store::new("apollo"), events: Mutex::new(Vec::new()) }) }

    pub fn with_data_ids() -> Arc<Self> {
        let hook: tessera_core::cache::DataIdFromObject =
            Arc::new(|value| value.get("id").and_then(|id| id.as_str()).map(|id| format!("id:{id}")));
        Arc::new(Self { inner: Store::with_data_ids("apollo", hook), events: Mutex::new(Vec::new()) })
    }

    pub fn events(&self) -> Vec<&'static str> { self.events.lock().unwrap().clone() }

    pub fn state(&self) -> CacheState { self.inner.get_state("apollo") }
}

impl StoreAdapter for RecordingStore {
    fn dispatch(&self, event: StoreEvent) {
        self.events.lock().unwrap().push(event.kind());
        self.inner.dispatch(event);
    }

    fn get_state(&self, root_key: &str) -> CacheState { self.inner.get_state(root_key) }

    fn subscribe(&self, listener: StoreListener) -> bool { self.inner.subscribe(listener) }
}

/// Collects observer deliveries so tests can await the nth one.
#[derive(Clone)]
pub struct TestObserver {
    results: Arc<Mutex<Vec<GraphQLResult>>>,
    errors: Arc<Mutex<Vec<TransportError>>>,
}

impl TestObserver {
    pub fn new() -> Self { Self { results: Arc::new(Mutex::new(Vec::new())), errors: Arc::new(Mutex::new(Vec::new())) } }

    pub fn observer(&self) -> QueryObserver {
        let results = self.results.clone();
        let errors = self.errors.clone();
        QueryObserver::new()
            .on_next(move |result| results.lock().unwrap().push(result))
            .on_error(move |error| errors.lock().unwrap().push(error))
    }

    pub fn results(&self) -> Vec<GraphQLResult> { self.results.lock().unwrap().clone() }

    pub fn errors(&self) -> Vec<TransportError> { self.errors.lock().unwrap().clone() }

    pub async fn wait_for_results(&self, count: usize) -> Vec<GraphQLResult> {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let results = self.results();
            if results.len() >= count {
                return results;
            }
            assert!(Instant::now() < deadline, "expected {count} delivery(ies), saw {}", results.len());
            sleep(Duration::from_millis(5)).await;
        }
    }

    /// Wait until some delivery carried exactly this data. Broadcast may
    /// legally re-deliver earlier snapshots in between.
    pub async fn wait_for_data(&self, expected: &serde_json::Value) {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if self.results().iter().any(|r| r.data.as_ref() == Some(expected)) {
                return;
            }
            assert!(Instant::now() < deadline, "never saw {expected}, deliveries: {:?}", self.results());
            sleep(Duration::from_millis(5)).await;
        }
    }

    pub async fn wait_for_error(&self) -> TransportError {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(error) = self.errors().first().cloned() {
                return error;
            }
            assert!(Instant::now() < deadline, "expected a transport error delivery");
            sleep(Duration::from_millis(5)).await;
        }
    }
}

pub fn manager_with(network: Arc<MockNetwork>, store: Arc<RecordingStore>) -> Arc<QueryManager> {
    QueryManager::new(QueryManagerOptions::new(network, store))
}

/// Opt into log output for a test run (`RUST_LOG`-style filtering applies).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).try_init();
}

/// Long enough for a batcher tick plus dispatches to settle.
pub async fn settle() { sleep(Duration::from_millis(80)).await; }
