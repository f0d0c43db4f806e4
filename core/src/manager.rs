//! The query manager: the coordinator between application code, the
//! event-sourced cache, and the transport.
//!
//! One manager owns the id counter, the listener registry, the shared
//! batcher, and the polling scheduler. Every fetch runs the same sequence:
//! transform, diff against the cache, announce via `APOLLO_QUERY_INIT`,
//! deliver cached data when allowed, and send only the residual over the
//! wire.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, Weak,
    },
    time::Duration,
};

use apollo_compiler::name;
use tracing::debug;

use crate::{
    batcher::{QueryBatcher, QueuedRequest, DEFAULT_BATCH_INTERVAL},
    cache::{
        diff::{diff_selection_set_against_store, document_for_missing_selections, StoreDiff},
        read::read_selection_set_from_store,
    },
    document,
    error::{MutationError, QueryError, TransportError},
    network::NetworkInterface,
    observable::ObservableQuery,
    scheduler::QueryScheduler,
    store::{CacheState, QueryStoreValue, StoreAdapter, StoreEvent},
    transform::{self, QueryTransformer},
    types::{
        GraphQLRequest, GraphQLResult, MutationOptions, QueryId, RequestId, SelectionSetWithRoot, WatchQueryOptions,
        ROOT_MUTATION_ID, ROOT_QUERY_ID,
    },
};

/// A listener bound to one query id, fed the query's store snapshot on every
/// broadcast until the query stops.
pub type QueryListener = Box<dyn Fn(&QueryStoreValue) + Send + Sync>;

pub struct QueryManagerOptions {
    pub network_interface: Arc<dyn NetworkInterface>,
    pub store: Arc<dyn StoreAdapter>,
    /// Where the cache's projected view is mounted inside the host store
    pub root_key: String,
    pub query_transformer: Option<Arc<dyn QueryTransformer>>,
    /// Defaults to whatever the transport reports via `supports_batching`
    pub should_batch: Option<bool>,
    pub batch_interval: Duration,
}

impl QueryManagerOptions {
    pub fn new(network_interface: Arc<dyn NetworkInterface>, store: Arc<dyn StoreAdapter>) -> Self {
        Self {
            network_interface,
            store,
            root_key: "apollo".to_string(),
            query_transformer: None,
            should_batch: None,
            batch_interval: DEFAULT_BATCH_INTERVAL,
        }
    }
}

pub struct QueryManager {
    store: Arc<dyn StoreAdapter>,
    network: Arc<dyn NetworkInterface>,
    root_key: String,
    transformer: Option<Arc<dyn QueryTransformer>>,
    batcher: QueryBatcher,
    scheduler: QueryScheduler,
    /// Shared between query and request ids; every acquisition increments
    id_counter: AtomicU64,
    listeners: Mutex<HashMap<QueryId, Arc<QueryListener>>>,
    /// The projected view as of the last broadcast, for the equality skip
    last_state: Mutex<Option<CacheState>>,
}

/// The planned network portion of one fetch.
struct Residual {
    query: SelectionSetWithRoot,
    query_string: String,
}

impl QueryManager {
    /// Must be called from within a tokio runtime: the batcher's cadence
    /// timer is armed here.
    pub fn new(options: QueryManagerOptions) -> Arc<Self> {
        let should_batch = options.should_batch.unwrap_or_else(|| options.network_interface.supports_batching());
        let batcher = QueryBatcher::new(options.network_interface.clone(), should_batch);

        let manager = Arc::new_cyclic(|weak: &Weak<QueryManager>| QueryManager {
            store: options.store,
            network: options.network_interface,
            root_key: options.root_key,
            transformer: options.query_transformer,
            batcher,
            scheduler: QueryScheduler::new(weak.clone()),
            id_counter: AtomicU64::new(1),
            listeners: Mutex::new(HashMap::new()),
            last_state: Mutex::new(None),
        });

        manager.batcher.start(options.batch_interval);
        let weak = Arc::downgrade(&manager);
        manager.store.subscribe(Box::new(move || {
            if let Some(manager) = weak.upgrade() {
                manager.broadcast_queries();
            }
        }));
        manager
    }

    /// Watch a query. Polling options hand the watch to the scheduler at
    /// creation; everything else follows the direct path.
    pub fn watch_query(self: &Arc<Self>, options: WatchQueryOptions) -> ObservableQuery {
        if options.poll_interval.is_some() {
            self.scheduler.register_polling_query(self, options)
        } else {
            ObservableQuery::new(self.clone(), options)
        }
    }

    /// One-shot query: the first delivery of a watch, after which the watch
    /// is torn down. Partial data makes no sense here and fails before any
    /// I/O.
    pub async fn query(self: &Arc<Self>, options: WatchQueryOptions) -> Result<GraphQLResult, QueryError> {
        if options.return_partial_data {
            return Err(QueryError::PartialDataForbidden);
        }
        // Malformed documents fail here rather than inside the detached
        // registration fetch, where the caller could never observe them
        document::query_definition(&options.query)?;
        self.watch_query(options).result().await
    }

    /// Run one fetch attempt for `query_id`: transform, plan, announce, and
    /// settle from cache and/or network.
    pub async fn fetch_query(self: &Arc<Self>, query_id: QueryId, options: WatchQueryOptions) -> Result<GraphQLResult, QueryError> {
        let query_def = document::query_definition(&options.query)?;
        let (transformed_doc, transformed_def) = match &self.transformer {
            Some(transformer) => transform::apply_transformer(&options.query, &query_def, transformer.as_ref()),
            None => (options.query.clone(), query_def.clone()),
        };
        let fragments = document::fragment_map(&transformed_doc);
        let query_string = document::print(&transformed_doc);

        // The store records the caller's selection; re-reads after the
        // network answers go through it.
        let query_ss = SelectionSetWithRoot {
            id: ROOT_QUERY_ID.to_string(),
            type_name: name!("Query"),
            selection_set: query_def.selection_set.clone(),
        };

        let mut initial_result = None;
        let residual: Option<Residual> = if options.force_fetch {
            if options.return_partial_data {
                // Planner skipped, but the observer still gets whatever the
                // cache can offer while the forced request is in flight.
                let state = self.store.get_state(&self.root_key);
                let ctx = StoreDiff {
                    store: &state.data,
                    variables: options.variables.as_ref(),
                    fragment_map: &fragments,
                    throw_on_missing_field: false,
                };
                let out = diff_selection_set_against_store(&ctx, &transformed_def.selection_set, ROOT_QUERY_ID, &name!("Query"))
                    .map_err(QueryError::Cache)?;
                initial_result = Some(out.result);
            }
            Some(Residual {
                query: SelectionSetWithRoot {
                    id: ROOT_QUERY_ID.to_string(),
                    type_name: name!("Query"),
                    selection_set: transformed_def.selection_set.clone(),
                },
                query_string: query_string.clone(),
            })
        } else {
            let state = self.store.get_state(&self.root_key);
            let ctx = StoreDiff {
                store: &state.data,
                variables: options.variables.as_ref(),
                fragment_map: &fragments,
                throw_on_missing_field: false,
            };
            let out = diff_selection_set_against_store(&ctx, &transformed_def.selection_set, ROOT_QUERY_ID, &name!("Query"))
                .map_err(QueryError::Cache)?;
            initial_result = Some(out.result);
            if out.missing_selection_sets.is_empty() {
                None
            } else {
                let composed = document_for_missing_selections(
                    &out.missing_selection_sets,
                    transformed_def.name.clone(),
                    &transformed_def.variables,
                    &fragments,
                );
                // Round-trip through the printer so the recorded string and
                // the recorded definition can never drift apart.
                let printed = document::print(&composed);
                let reparsed = document::parse(&printed)?;
                let residual_def = document::query_definition(&reparsed)?;
                Some(Residual {
                    query: SelectionSetWithRoot {
                        id: ROOT_QUERY_ID.to_string(),
                        type_name: name!("Query"),
                        selection_set: residual_def.selection_set.clone(),
                    },
                    query_string: printed,
                })
            }
        };

        let request_id = self.generate_request_id();
        debug!("fetch_query {query_id} request {request_id}, residual: {}", residual.is_some());

        self.store.dispatch(StoreEvent::QueryInit {
            query_string,
            query: query_ss.clone(),
            minimized_query_string: residual.as_ref().map(|r| r.query_string.clone()),
            minimized_query: residual.as_ref().map(|r| r.query.clone()),
            variables: options.variables.clone(),
            force_fetch: options.force_fetch,
            return_partial_data: options.return_partial_data,
            query_id,
            request_id,
            fragment_map: fragments.clone(),
        });

        if residual.is_none() || options.return_partial_data {
            self.store.dispatch(StoreEvent::QueryResultClient {
                result: GraphQLResult { data: initial_result.clone(), errors: None },
                variables: options.variables.clone(),
                query: query_ss.clone(),
                complete: residual.is_none(),
                query_id,
            });
        }

        let Some(residual) = residual else {
            return Ok(GraphQLResult { data: initial_result, errors: None });
        };

        let request = GraphQLRequest {
            query: residual.query_string.clone(),
            variables: options.variables.clone(),
            operation_name: transformed_def.name.as_ref().map(|n| n.to_string()),
        };
        let handle = self.batcher.enqueue_request(QueuedRequest { request, query_id: Some(query_id) });

        match handle.await.unwrap_or(Err(TransportError::Abandoned)) {
            Ok(result) => {
                self.store.dispatch(StoreEvent::QueryResult { result, query_id, request_id });
                // Merge view: the full selection read back out of the store.
                // A failed read here is swallowed; the store already holds
                // the authoritative outcome.
                let state = self.store.get_state(&self.root_key);
                let merged = read_selection_set_from_store(
                    &state.data,
                    &query_ss.id,
                    &query_ss.selection_set,
                    options.variables.as_ref(),
                    &fragments,
                    false,
                )
                .ok();
                Ok(GraphQLResult { data: merged, errors: None })
            }
            Err(error) => {
                self.store.dispatch(StoreEvent::QueryError { error: error.clone(), query_id, request_id });
                Err(QueryError::Network(error))
            }
        }
    }

    /// Single-shot mutation: unconditional network round trip, no diffing,
    /// no batching. Transport failures propagate to the caller unchanged.
    pub async fn mutate(self: &Arc<Self>, options: MutationOptions) -> Result<GraphQLResult, MutationError> {
        let mutation_id = self.generate_request_id();
        let mutation_def = document::mutation_definition(&options.mutation)?;
        let (transformed_doc, transformed_def) = match &self.transformer {
            Some(transformer) => transform::apply_transformer(&options.mutation, &mutation_def, transformer.as_ref()),
            None => (options.mutation.clone(), mutation_def.clone()),
        };
        let fragments = document::fragment_map(&transformed_doc);
        let mutation_string = document::print(&transformed_doc);
        let mutation_ss = SelectionSetWithRoot {
            id: ROOT_MUTATION_ID.to_string(),
            type_name: name!("Mutation"),
            selection_set: transformed_def.selection_set.clone(),
        };

        self.store.dispatch(StoreEvent::MutationInit {
            mutation_string: mutation_string.clone(),
            mutation: mutation_ss,
            variables: options.variables.clone(),
            mutation_id,
            fragment_map: fragments,
        });

        let request = GraphQLRequest {
            query: mutation_string,
            variables: options.variables.clone(),
            operation_name: transformed_def.name.as_ref().map(|n| n.to_string()),
        };
        let result = self.network.query(request).await?;

        self.store.dispatch(StoreEvent::MutationResult { result: result.clone(), mutation_id });
        Ok(result)
    }

    /// Install the listener and fire the registration fetch. Deliveries
    /// after the first come through broadcast, not through this call.
    pub fn start_query(self: &Arc<Self>, query_id: QueryId, options: WatchQueryOptions, listener: QueryListener) -> QueryId {
        self.add_query_listener(query_id, listener);
        let manager = self.clone();
        tokio::spawn(async move {
            // Store-observable outcomes already live in the store; anything
            // else (e.g. a malformed document) has nowhere to go but the log
            if let Err(e) = manager.fetch_query(query_id, options).await {
                debug!("registration fetch for query {query_id} settled with {e}");
            }
        });
        query_id
    }

    /// Remove the listener, release any poll slot, and mark the query
    /// stopped. In-flight requests keep running; their late results update
    /// the store but reach no listener.
    pub fn stop_query(&self, query_id: QueryId) {
        self.scheduler.stop_polling_query(query_id);
        self.remove_query_listener(query_id);
        self.store.dispatch(StoreEvent::QueryStop { query_id });
    }

    pub fn add_query_listener(&self, query_id: QueryId, listener: QueryListener) {
        self.listeners.lock().unwrap().insert(query_id, Arc::new(listener));
    }

    pub fn remove_query_listener(&self, query_id: QueryId) { self.listeners.lock().unwrap().remove(&query_id); }

    /// Explicit re-broadcast for host stores that cannot notify on change.
    pub fn broadcast_new_store(&self) { self.broadcast_queries(); }

    /// Fan the current projected view out to every live listener, unless it
    /// is structurally identical to the last non-empty view we broadcast.
    fn broadcast_queries(&self) {
        let state = self.store.get_state(&self.root_key);
        {
            let mut last = self.last_state.lock().unwrap();
            if let Some(previous) = &*last {
                if !previous.is_empty() && *previous == state {
                    return;
                }
            }
            *last = Some(state.clone());
        }

        // Snapshot outside the lock so listeners may re-enter the registry
        let listeners: Vec<(QueryId, Arc<QueryListener>)> =
            self.listeners.lock().unwrap().iter().map(|(id, listener)| (*id, listener.clone())).collect();
        for (query_id, listener) in listeners {
            // A missing entry means the query stopped concurrently
            if let Some(value) = state.queries.get(&query_id) {
                listener(value);
            }
        }
    }

    pub(crate) fn generate_query_id(&self) -> QueryId { QueryId(self.id_counter.fetch_add(1, Ordering::SeqCst)) }

    pub(crate) fn generate_request_id(&self) -> RequestId { RequestId(self.id_counter.fetch_add(1, Ordering::SeqCst)) }

    pub(crate) fn scheduler(&self) -> &QueryScheduler { &self.scheduler }

    pub(crate) fn cache_state(&self) -> CacheState { self.store.get_state(&self.root_key) }
}
