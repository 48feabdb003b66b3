use std::sync::Arc;

use tokio::time::Instant;

use crate::endpoint::EndpointError;

/// Observable lifecycle state of a query, published on every transition.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryStatus {
    pub is_loading: bool,
    pub is_refetching: bool,
    pub is_fetching_more: bool,
    pub is_fetched: bool,
    pub error: Option<Arc<EndpointError>>,
    pub cached_at: Option<Instant>,
    /// Bumped whenever `data` changes.
    pub revision: u64,
}

impl QueryStatus {
    /// Whether any request is in flight.
    pub fn is_in_flight(&self) -> bool {
        self.is_loading || self.is_refetching || self.is_fetching_more
    }
}
