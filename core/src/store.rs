//! The event-sourced cache: the event vocabulary, the per-query snapshot
//! records listeners are fed from, the adapter trait the manager drives, and
//! a reference in-memory store implementing it.
//!
//! The event kind strings are the binding contract with host stores and are
//! reproduced verbatim; see [`StoreEvent::kind`].

use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use tracing::warn;

use crate::{
    cache::{
        write::{write_result_to_store, StoreWrite},
        DataIdFromObject, NormalizedCache,
    },
    document::FragmentMap,
    error::TransportError,
    types::{GraphQLError, GraphQLResult, QueryId, RequestId, SelectionSetWithRoot, Variables},
};

/// A cache-mutating event. Every state transition the manager performs goes
/// through one of these; host stores replaying the same events arrive at the
/// same state.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    QueryInit {
        query_string: String,
        query: SelectionSetWithRoot,
        minimized_query_string: Option<String>,
        minimized_query: Option<SelectionSetWithRoot>,
        variables: Option<Variables>,
        force_fetch: bool,
        return_partial_data: bool,
        query_id: QueryId,
        request_id: RequestId,
        fragment_map: FragmentMap,
    },
    QueryResultClient {
        result: GraphQLResult,
        variables: Option<Variables>,
        query: SelectionSetWithRoot,
        /// True when the cache satisfied the whole request
        complete: bool,
        query_id: QueryId,
    },
    QueryResult {
        result: GraphQLResult,
        query_id: QueryId,
        request_id: RequestId,
    },
    QueryError {
        error: TransportError,
        query_id: QueryId,
        request_id: RequestId,
    },
    QueryStop {
        query_id: QueryId,
    },
    MutationInit {
        mutation_string: String,
        mutation: SelectionSetWithRoot,
        variables: Option<Variables>,
        mutation_id: RequestId,
        fragment_map: FragmentMap,
    },
    MutationResult {
        result: GraphQLResult,
        mutation_id: RequestId,
    },
}

impl StoreEvent {
    /// The wire-level name of this event. These exact strings are the
    /// external interface with host stores.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreEvent::QueryInit { .. } => "APOLLO_QUERY_INIT",
            StoreEvent::QueryResultClient { .. } => "APOLLO_QUERY_RESULT_CLIENT",
            StoreEvent::QueryResult { .. } => "APOLLO_QUERY_RESULT",
            StoreEvent::QueryError { .. } => "APOLLO_QUERY_ERROR",
            StoreEvent::QueryStop { .. } => "APOLLO_QUERY_STOP",
            StoreEvent::MutationInit { .. } => "APOLLO_MUTATION_INIT",
            StoreEvent::MutationResult { .. } => "APOLLO_MUTATION_RESULT",
        }
    }
}

/// The store's per-query snapshot; the record broadcast hands to listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryStoreValue {
    pub query_string: String,
    pub query: SelectionSetWithRoot,
    pub minimized_query_string: Option<String>,
    pub minimized_query: Option<SelectionSetWithRoot>,
    pub variables: Option<Variables>,
    pub loading: bool,
    pub force_fetch: bool,
    pub return_partial_data: bool,
    pub graphql_errors: Option<Vec<GraphQLError>>,
    pub network_error: Option<TransportError>,
    /// Set when the watch stopped while a request was still in flight; the
    /// record survives just long enough for the late result to land
    pub stopped: bool,
    pub request_id: RequestId,
    pub fragment_map: FragmentMap,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MutationStoreValue {
    pub mutation_string: String,
    pub mutation: SelectionSetWithRoot,
    pub variables: Option<Variables>,
    pub loading: bool,
    pub fragment_map: FragmentMap,
}

/// The projected view the manager reads: normalized entity data plus the
/// per-operation bookkeeping maps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheState {
    pub data: NormalizedCache,
    pub queries: IndexMap<QueryId, QueryStoreValue>,
    pub mutations: IndexMap<RequestId, MutationStoreValue>,
}

impl CacheState {
    pub fn is_empty(&self) -> bool { self.data.is_empty() && self.queries.is_empty() && self.mutations.is_empty() }
}

pub type StoreListener = Box<dyn Fn() + Send + Sync>;

/// What the manager requires of a host store. `dispatch` is synchronous:
/// once it returns, `get_state` reflects the event.
pub trait StoreAdapter: Send + Sync {
    fn dispatch(&self, event: StoreEvent);

    /// The projected view mounted under `root_key`.
    fn get_state(&self, root_key: &str) -> CacheState;

    /// Arm a change listener, returning `false` when the host store cannot
    /// notify; such hosts re-broadcast explicitly instead.
    fn subscribe(&self, listener: StoreListener) -> bool;
}

/// Reference in-memory store. Applies the event vocabulary with the
/// normalizing writer and notifies its listeners synchronously after every
/// dispatch.
#[derive(Clone)]
pub struct Store(Arc<StoreInner>);

struct StoreInner {
    root_key: String,
    state: Mutex<CacheState>,
    listeners: Mutex<Vec<Arc<StoreListener>>>,
    /// Serializes whole dispatches, transition through listener fan-out, so
    /// concurrent dispatchers cannot interleave their broadcasts
    notify_lock: Mutex<()>,
    data_id_from_object: Option<DataIdFromObject>,
}

impl Store {
    pub fn new(root_key: impl Into<String>) -> Self {
        Self(Arc::new(StoreInner {
            root_key: root_key.into(),
            state: Mutex::new(CacheState::default()),
            listeners: Mutex::new(Vec::new()),
            notify_lock: Mutex::new(()),
            data_id_from_object: None,
        }))
    }

    /// A store that keys entities by the given hook instead of by their path
    /// from the write root.
    pub fn with_data_ids(root_key: impl Into<String>, hook: DataIdFromObject) -> Self {
        Self(Arc::new(StoreInner {
            root_key: root_key.into(),
            state: Mutex::new(CacheState::default()),
            listeners: Mutex::new(Vec::new()),
            notify_lock: Mutex::new(()),
            data_id_from_object: Some(hook),
        }))
    }

    fn transition(&self, state: &mut CacheState, event: StoreEvent) {
        match event {
            StoreEvent::QueryInit {
                query_string,
                query,
                minimized_query_string,
                minimized_query,
                variables,
                force_fetch,
                return_partial_data,
                query_id,
                request_id,
                fragment_map,
            } => {
                state.queries.insert(query_id, QueryStoreValue {
                    query_string,
                    query,
                    minimized_query_string,
                    minimized_query,
                    variables,
                    loading: true,
                    force_fetch,
                    return_partial_data,
                    graphql_errors: None,
                    network_error: None,
                    stopped: false,
                    request_id,
                    fragment_map,
                });
            }
            StoreEvent::QueryResultClient { complete, query_id, .. } => {
                let Some(value) = state.queries.get_mut(&query_id) else {
                    warn!("APOLLO_QUERY_RESULT_CLIENT for unknown query {query_id}");
                    return;
                };
                // The client result was read out of this store, so there is
                // nothing to write back; only the loading flag moves.
                value.loading = !complete;
            }
            StoreEvent::QueryResult { result, query_id, .. } => {
                let Some(value) = state.queries.get_mut(&query_id) else {
                    warn!("APOLLO_QUERY_RESULT for unknown query {query_id}");
                    return;
                };
                value.graphql_errors = result.errors.clone();
                value.network_error = None;
                value.loading = false;
                let stopped = value.stopped;
                if !result.has_errors() {
                    if let Some(data) = &result.data {
                        // The network answered the residual, so the write is
                        // rooted at the minimized query when one was recorded.
                        let target = value.minimized_query.clone().unwrap_or_else(|| value.query.clone());
                        let variables = value.variables.clone();
                        let fragment_map = value.fragment_map.clone();
                        let ctx = StoreWrite {
                            variables: variables.as_ref(),
                            fragment_map: &fragment_map,
                            data_id_from_object: self.0.data_id_from_object.as_ref(),
                        };
                        if let Err(e) = write_result_to_store(&ctx, data, &target.id, &target.selection_set, &mut state.data) {
                            warn!("failed to write result for query {query_id}: {e}");
                        }
                    }
                }
                if stopped {
                    state.queries.shift_remove(&query_id);
                }
            }
            StoreEvent::QueryError { error, query_id, .. } => {
                let Some(value) = state.queries.get_mut(&query_id) else {
                    warn!("APOLLO_QUERY_ERROR for unknown query {query_id}");
                    return;
                };
                value.network_error = Some(error);
                value.loading = false;
                if value.stopped {
                    state.queries.shift_remove(&query_id);
                }
            }
            StoreEvent::QueryStop { query_id } => {
                // A stop with a request still in flight leaves a tombstone:
                // the late result updates the data map, then the record goes.
                match state.queries.get_mut(&query_id) {
                    Some(value) if value.loading => value.stopped = true,
                    _ => {
                        state.queries.shift_remove(&query_id);
                    }
                }
            }
            StoreEvent::MutationInit { mutation_string, mutation, variables, mutation_id, fragment_map } => {
                state.mutations.insert(mutation_id, MutationStoreValue {
                    mutation_string,
                    mutation,
                    variables,
                    loading: true,
                    fragment_map,
                });
            }
            StoreEvent::MutationResult { result, mutation_id } => {
                let Some(value) = state.mutations.get_mut(&mutation_id) else {
                    warn!("APOLLO_MUTATION_RESULT for unknown mutation {mutation_id}");
                    return;
                };
                value.loading = false;
                if !result.has_errors() {
                    if let Some(data) = &result.data {
                        let mutation = value.mutation.clone();
                        let variables = value.variables.clone();
                        let fragment_map = value.fragment_map.clone();
                        let ctx = StoreWrite {
                            variables: variables.as_ref(),
                            fragment_map: &fragment_map,
                            data_id_from_object: self.0.data_id_from_object.as_ref(),
                        };
                        if let Err(e) = write_result_to_store(&ctx, data, &mutation.id, &mutation.selection_set, &mut state.data) {
                            warn!("failed to write result for mutation {mutation_id}: {e}");
                        }
                    }
                }
            }
        }
    }
}

impl StoreAdapter for Store {
    fn dispatch(&self, event: StoreEvent) {
        // Serialize dispatch invocations: the transition and its fan-out are
        // atomic with respect to every other dispatch. Listeners may read
        // back through get_state but must not dispatch synchronously from
        // the callback; deferred work goes through a spawned task.
        let _notify_guard = self.0.notify_lock.lock().unwrap();
        {
            let mut state = self.0.state.lock().unwrap();
            self.transition(&mut state, event);
        }
        let listeners: Vec<Arc<StoreListener>> = self.0.listeners.lock().unwrap().clone();
        for listener in listeners {
            listener();
        }
    }

    fn get_state(&self, root_key: &str) -> CacheState {
        if root_key != self.0.root_key {
            warn!("no state mounted at root key {root_key:?}");
            return CacheState::default();
        }
        self.0.state.lock().unwrap().clone()
    }

    fn subscribe(&self, listener: StoreListener) -> bool {
        self.0.listeners.lock().unwrap().push(Arc::new(listener));
        true
    }
}
