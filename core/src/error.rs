//! Public error types for tessera.
//!
//! Each operation on the manager returns its own error enum; transport
//! failures are additionally stored in the cache so every listener observes
//! the same view of them.

use thiserror::Error;

/// Error type for the transport layer.
///
/// Cloneable and comparable so it can live inside a query's store record and
/// be re-delivered to late subscribers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    /// The request never produced a response
    #[error("network error: {0}")]
    Network(String),

    /// The server answered outside the GraphQL protocol
    #[error("server responded with status {0}")]
    Status(u16),

    /// The response body could not be decoded
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// A batched transport returned a different number of results than requests
    #[error("batch response shape mismatch: {got} results for {expected} requests")]
    BatchMismatch { expected: usize, got: usize },

    /// The batcher dropped the request before completing it
    #[error("request abandoned before completion")]
    Abandoned,
}

/// Error type for malformed or misused operation documents.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DocumentError {
    #[error("parse error: {0}")]
    Parse(String),

    /// The document holds no operation of the kind the entry point requires
    #[error("document must contain a single {0} operation")]
    MissingOperation(&'static str),

    #[error("no fragment named {0}")]
    UnknownFragment(String),

    /// A field argument references a variable the caller never supplied
    #[error("variable {0} referenced in document but not provided")]
    UndefinedVariable(String),
}

/// Error type for normalized-cache reads and writes.
///
/// `MissingField` is only produced when the caller demanded a complete
/// result; the diff planner runs with that check disabled and reports
/// missing data as residual selections instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheError {
    #[error("can't find field {field} on object {id}")]
    MissingField { field: String, id: String },

    #[error("can't find field {field} on result object for {id}")]
    MissingResultField { field: String, id: String },

    /// A composite selection was written against a non-object result value
    #[error("result for {id} is not an object")]
    NonObjectResult { id: String },

    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// Error type for `query` and `fetch_query`.
///
/// Returned from: `QueryManager::query`, `QueryManager::fetch_query`,
/// `ObservableQuery::result`, `QuerySubscription::refetch`
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    /// `return_partial_data` is only legal on watch-style calls
    #[error("return_partial_data is not supported on one-shot queries")]
    PartialDataForbidden,

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Network(#[from] TransportError),

    /// The observer was dropped before delivering a first result
    #[error("subscription ended before a result arrived")]
    Ended,
}

/// Error type for `QueryManager::mutate`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MutationError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Network(#[from] TransportError),
}
