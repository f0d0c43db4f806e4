use std::time::Duration;

use apollo_compiler::{ast, Name};
use serde::{Deserialize, Serialize};

/// Identifies one watched (or one-shot) query for its whole lifecycle.
///
/// Ids are drawn from the manager's single monotonic counter, shared with
/// [`RequestId`], so an observed sequence of allocations of either kind is
/// strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QueryId(pub u64);

impl std::fmt::Display for QueryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.0) }
}

/// Identifies a single network attempt, so late results from superseded
/// attempts can be told apart from current ones. Mutations draw their
/// `mutationId` from the same namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.0) }
}

/// Variable values supplied alongside an operation document.
pub type Variables = serde_json::Map<String, serde_json::Value>;

pub const ROOT_QUERY_ID: &str = "ROOT_QUERY";
pub const ROOT_MUTATION_ID: &str = "ROOT_MUTATION";

/// A selection tree plus the cache id and type it is rooted at; the
/// addressable unit of reads, writes, and diffs. Immutable after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionSetWithRoot {
    pub id: String,
    pub type_name: Name,
    pub selection_set: Vec<ast::Selection>,
}

/// What actually goes over the wire for one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<Variables>,
    #[serde(rename = "operationName", skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

/// A schema-level error riding a successful transport response. These are
/// data, not failures: they reach observers through `next`, never through
/// `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locations: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<serde_json::Value>,
}

impl GraphQLError {
    pub fn new(message: impl Into<String>) -> Self { Self { message: message.into(), locations: None, path: None } }
}

/// The result of executing one GraphQL operation. `data` and `errors` may
/// coexist on partially failed executions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQLResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<GraphQLError>>,
}

impl GraphQLResult {
    pub fn data(data: serde_json::Value) -> Self { Self { data: Some(data), errors: None } }

    pub fn has_errors(&self) -> bool { self.errors.as_ref().is_some_and(|e| !e.is_empty()) }
}

/// Options for a watched query. `refetch` and `start_polling` derive a new
/// record from these rather than mutating them.
#[derive(Clone)]
pub struct WatchQueryOptions {
    pub query: ast::Document,
    pub variables: Option<Variables>,
    /// Skip the diff planner and send the full transformed query
    pub force_fetch: bool,
    /// Deliver whatever the cache already holds before the network answers
    pub return_partial_data: bool,
    /// When set, the query is owned by the polling scheduler from creation
    pub poll_interval: Option<Duration>,
}

impl WatchQueryOptions {
    pub fn new(query: ast::Document) -> Self {
        Self { query, variables: None, force_fetch: false, return_partial_data: false, poll_interval: None }
    }
}

/// Options for a one-shot mutation.
#[derive(Clone)]
pub struct MutationOptions {
    pub mutation: ast::Document,
    pub variables: Option<Variables>,
}

impl MutationOptions {
    pub fn new(mutation: ast::Document) -> Self { Self { mutation, variables: None } }
}
