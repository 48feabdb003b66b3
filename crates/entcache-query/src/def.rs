use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use entcache_schema::TypeDescriptor;
use serde::{Deserialize, Serialize};

use crate::endpoint::Endpoint;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Query,
    Mutation,
    Subscription,
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query => f.write_str("query"),
            Self::Mutation => f.write_str("mutation"),
            Self::Subscription => f.write_str("subscription"),
        }
    }
}

/// Declaration of a query, mutation or subscription: its name, the
/// declared types of its data and inputs, and where the data comes from.
#[derive(Clone)]
pub struct QueryDef {
    name: String,
    kind: QueryKind,
    data: TypeDescriptor,
    request: Option<TypeDescriptor>,
    pagination: Option<TypeDescriptor>,
    endpoint: Option<Arc<dyn Endpoint>>,
    stale_time: Option<Duration>,
    cache_time: Option<Duration>,
}

impl QueryDef {
    fn with_kind(name: impl Into<String>, kind: QueryKind, data: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            kind,
            data,
            request: None,
            pagination: None,
            endpoint: None,
            stale_time: None,
            cache_time: None,
        }
    }

    pub fn query(name: impl Into<String>, data: TypeDescriptor) -> Self {
        Self::with_kind(name, QueryKind::Query, data)
    }

    pub fn mutation(name: impl Into<String>, data: TypeDescriptor) -> Self {
        Self::with_kind(name, QueryKind::Mutation, data)
    }

    pub fn subscription(name: impl Into<String>, data: TypeDescriptor) -> Self {
        Self::with_kind(name, QueryKind::Subscription, data)
    }

    pub fn request(mut self, desc: TypeDescriptor) -> Self {
        self.request = Some(desc);
        self
    }

    pub fn pagination(mut self, desc: TypeDescriptor) -> Self {
        self.pagination = Some(desc);
        self
    }

    pub fn endpoint(mut self, endpoint: Arc<dyn Endpoint>) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// How long a successful result stays fresh.
    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    /// How long a released query stays cached before removal.
    pub fn cache_time(mut self, cache_time: Duration) -> Self {
        self.cache_time = Some(cache_time);
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    pub fn data_type(&self) -> &TypeDescriptor {
        &self.data
    }

    pub fn request_type(&self) -> Option<&TypeDescriptor> {
        self.request.as_ref()
    }

    pub fn pagination_type(&self) -> Option<&TypeDescriptor> {
        self.pagination.as_ref()
    }

    pub fn endpoint_ref(&self) -> Option<&Arc<dyn Endpoint>> {
        self.endpoint.as_ref()
    }

    pub fn stale_time_override(&self) -> Option<Duration> {
        self.stale_time
    }

    pub fn cache_time_override(&self) -> Option<Duration> {
        self.cache_time
    }
}

impl fmt::Debug for QueryDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryDef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("data", &self.data)
            .field("has_endpoint", &self.endpoint.is_some())
            .finish()
    }
}
