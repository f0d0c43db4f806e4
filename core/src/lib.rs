pub mod batcher;
pub mod cache;
pub mod document;
pub mod error;
pub mod manager;
pub mod network;
pub mod observable;
pub mod scheduler;
pub mod store;
pub mod transform;
pub mod types;

pub use manager::{QueryManager, QueryManagerOptions};
pub use network::{HttpNetworkInterface, NetworkInterface};
pub use observable::{ObservableQuery, QueryObserver, QuerySubscription};
pub use store::{Store, StoreAdapter, StoreEvent};
pub use types::{GraphQLError, GraphQLRequest, GraphQLResult, MutationOptions, QueryId, RequestId, Variables, WatchQueryOptions};
