use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use entcache_cache::{GcOutcome, QueryCache};
use entcache_merge::merge;
use entcache_query::{OptimisticInsert, Query, QueryDef, QueryHandle, QueryOptions, Variables};
use entcache_schema::{ModelType, TypeDescriptor, TypeResolver};
use entcache_store::{Node, RootStore};
use entcache_types::QueryId;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::{SdkError, SdkResult};

/// A client session: one entity graph, one query cache.
///
/// Clients are independent of each other. [`Client::dispose`] tears one
/// down; every operation afterwards fails with [`SdkError::Disposed`].
pub struct Client {
    config: ClientConfig,
    resolver: TypeResolver,
    root: Arc<RootStore>,
    cache: Arc<QueryCache>,
    persistent: RwLock<HashSet<QueryId>>,
    disposed: AtomicBool,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn root(&self) -> &Arc<RootStore> {
        &self.root
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn resolver(&self) -> &TypeResolver {
        &self.resolver
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn ensure_live(&self) -> SdkResult<()> {
        if self.is_disposed() {
            return Err(SdkError::Disposed);
        }
        Ok(())
    }

    fn options(&self) -> QueryOptions {
        QueryOptions {
            resolver: self.resolver,
            stale_time: self.config.default_stale_time(),
            cache_time: self.config.default_cache_time(),
        }
    }

    // -- Query instances ----------------------------------------------------

    /// Create and cache a query without running it.
    pub fn create_query(&self, def: Arc<QueryDef>) -> SdkResult<QueryHandle> {
        self.ensure_live()?;
        let query = Query::new(def, self.root.clone(), self.options());
        self.cache.set_query(query.clone());
        Ok(query)
    }

    /// Create a query that [`Client::release`] never removes. It lives until
    /// the client is disposed.
    pub fn create_persistent_query(&self, def: Arc<QueryDef>) -> SdkResult<QueryHandle> {
        let query = self.create_query(def)?;
        self.persistent
            .write()
            .expect("lock poisoned")
            .insert(query.id());
        Ok(query)
    }

    /// Create, cache and load a query.
    pub async fn query(&self, def: Arc<QueryDef>, vars: Variables) -> SdkResult<QueryHandle> {
        let query = self.create_query(def)?;
        query.query(vars).await?;
        Ok(query)
    }

    /// Reuse a cached query with the same definition and request, or load a
    /// new one.
    ///
    /// A reused query has its pending removal cancelled and is refetched
    /// when stale.
    pub async fn fetch_query(&self, def: Arc<QueryDef>, vars: Variables) -> SdkResult<QueryHandle> {
        self.ensure_live()?;
        let existing = self
            .cache
            .find_all(def.name(), |q| !q.is_disposed() && q.request_value() == vars.request)
            .into_iter()
            .next();
        let Some(query) = existing else {
            return self.query(def, vars).await;
        };

        query.cancel_removal();
        if query.is_stale() && !query.is_in_flight() {
            debug!(query = %query.id(), name = query.name(), "refetching stale query");
            query.refetch().await?;
        }
        Ok(query)
    }

    /// Create, cache and run a mutation.
    pub async fn mutate(&self, def: Arc<QueryDef>, vars: Variables) -> SdkResult<QueryHandle> {
        let mutation = self.create_query(def)?;
        mutation.mutate(vars).await?;
        Ok(mutation)
    }

    /// Run a mutation around an optimistic list insert.
    pub async fn mutate_optimistic(
        &self,
        def: Arc<QueryDef>,
        vars: Variables,
        insert: OptimisticInsert,
    ) -> SdkResult<QueryHandle> {
        let mutation = self.create_query(def)?;
        insert.run(&mutation, vars).await?;
        Ok(mutation)
    }

    /// Create and cache a subscription. Pushed payloads go through
    /// [`Query::apply_update`].
    pub fn subscription(&self, def: Arc<QueryDef>) -> SdkResult<QueryHandle> {
        self.create_query(def)
    }

    /// Stop using a query. It is removed after its cache time unless reused
    /// first. Persistent queries are kept.
    pub fn release(&self, query: &QueryHandle) -> SdkResult<()> {
        self.ensure_live()?;
        if self
            .persistent
            .read()
            .expect("lock poisoned")
            .contains(&query.id())
        {
            return Ok(());
        }
        self.cache.schedule_removal(query, query.cache_time());
        Ok(())
    }

    // -- Cache-wide operations ----------------------------------------------

    pub fn find_all(&self, name: &str, predicate: impl Fn(&Query) -> bool) -> Vec<QueryHandle> {
        self.cache.find_all(name, predicate)
    }

    /// Mark matching queries stale. Returns how many were invalidated.
    pub fn invalidate(&self, name: &str, predicate: impl Fn(&Query) -> bool) -> usize {
        let matched = self.cache.find_all(name, predicate);
        for query in &matched {
            query.invalidate();
        }
        debug!(name, count = matched.len(), "queries invalidated");
        matched.len()
    }

    pub fn run_gc(&self) -> SdkResult<GcOutcome> {
        self.ensure_live()?;
        Ok(self.cache.run_gc())
    }

    /// Merge data into the entity graph outside of any query.
    pub fn merge(&self, raw: &Value, desc: &TypeDescriptor) -> SdkResult<Node> {
        self.ensure_live()?;
        Ok(merge(&self.root, &self.resolver, raw, desc)?)
    }

    /// Abort and dispose every query, drop them from the cache and destroy
    /// every entity.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let queries = self.cache.len();
        self.cache.clear();
        self.persistent.write().expect("lock poisoned").clear();
        self.root.reset();
        info!(queries, "client disposed");
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("root", &self.root)
            .field("cache", &self.cache)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Builder for [`Client`].
#[derive(Debug, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    models: Vec<Arc<ModelType>>,
}

impl ClientBuilder {
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Register the model store for an entity type.
    pub fn model(mut self, model: Arc<ModelType>) -> Self {
        self.models.push(model);
        self
    }

    pub fn models(mut self, models: impl IntoIterator<Item = Arc<ModelType>>) -> Self {
        self.models.extend(models);
        self
    }

    pub fn build(self) -> SdkResult<Client> {
        let root = Arc::new(RootStore::with_event_capacity(self.config.event_capacity));
        for model in self.models {
            root.register_model(model)?;
        }
        let cache = QueryCache::new(root.clone(), self.config.gc_retry_delay());
        info!(models = root.model_names().len(), policy = ?self.config.union_policy, "client initialized");
        Ok(Client {
            resolver: TypeResolver::new(self.config.union_policy),
            config: self.config,
            root,
            cache,
            persistent: RwLock::new(HashSet::new()),
            disposed: AtomicBool::new(false),
        })
    }
}
