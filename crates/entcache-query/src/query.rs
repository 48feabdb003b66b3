use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use entcache_merge::{merge_objects, Merger};
use entcache_schema::{TypeDescriptor, TypeResolver};
use entcache_store::{Node, RootStore};
use entcache_types::QueryId;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::def::{QueryDef, QueryKind};
use crate::endpoint::{EndpointArgs, EndpointError};
use crate::error::{QueryError, QueryResult};
use crate::signal::AbortSignal;
use crate::status::QueryStatus;
use crate::variables::Variables;

pub type QueryHandle = Arc<Query>;

/// Defaults applied to queries whose definition does not override them.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueryOptions {
    pub resolver: TypeResolver,
    pub stale_time: Duration,
    pub cache_time: Duration,
}

/// Which transition a run performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    /// Initial load. Clears `data` when the endpoint fails.
    Load,
    /// Background refresh. Keeps `data` on failure.
    Refetch,
    /// Pagination. Returns the converted page without touching `data`.
    FetchMore,
    Mutate,
}

impl RunMode {
    fn should_update(self) -> bool {
        !matches!(self, Self::FetchMore)
    }

    fn clears_data_on_error(self) -> bool {
        matches!(self, Self::Load)
    }
}

/// Outcome of one run.
///
/// A superseded, aborted or disposed run yields the neutral result: no
/// data, no error, `disposed` set.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FetchResult {
    pub data: Option<Node>,
    pub error: Option<Arc<EndpointError>>,
    pub disposed: bool,
}

impl FetchResult {
    pub fn disposed() -> Self {
        Self {
            disposed: true,
            ..Self::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        !self.disposed && self.error.is_none()
    }
}

#[derive(Debug)]
struct QueryState {
    data: Node,
    request: Node,
    pagination: Node,
    raw_request: Option<Value>,
    raw_pagination: Option<Value>,
    error: Option<Arc<EndpointError>>,
    is_loading: bool,
    is_refetching: bool,
    is_fetching_more: bool,
    is_fetched: bool,
    invalidated: bool,
    cached_at: Option<Instant>,
    revision: u64,
}

impl QueryState {
    fn new() -> Self {
        Self {
            data: Node::Null,
            request: Node::Null,
            pagination: Node::Null,
            raw_request: None,
            raw_pagination: None,
            error: None,
            is_loading: false,
            is_refetching: false,
            is_fetching_more: false,
            is_fetched: false,
            invalidated: false,
            cached_at: None,
            revision: 0,
        }
    }

    fn set_flag(&mut self, mode: RunMode, value: bool) {
        match mode {
            RunMode::Load | RunMode::Mutate => self.is_loading = value,
            RunMode::Refetch => self.is_refetching = value,
            RunMode::FetchMore => self.is_fetching_more = value,
        }
    }

    fn clear_flags(&mut self) {
        self.is_loading = false;
        self.is_refetching = false;
        self.is_fetching_more = false;
    }

    fn status(&self) -> QueryStatus {
        QueryStatus {
            is_loading: self.is_loading,
            is_refetching: self.is_refetching,
            is_fetching_more: self.is_fetching_more,
            is_fetched: self.is_fetched,
            error: self.error.clone(),
            cached_at: self.cached_at,
            revision: self.revision,
        }
    }

    /// Object data is overlaid so untouched fields survive; anything else
    /// is replaced.
    fn apply_data(&mut self, node: Node) {
        let changed = match (&mut self.data, node) {
            (Node::Object(current), Node::Object(incoming)) => !merge_objects(current, incoming).is_empty(),
            (current, incoming) if *current == incoming => false,
            (current, incoming) => {
                *current = incoming;
                true
            }
        };
        if changed {
            self.revision += 1;
        }
    }
}

/// Lifecycle handler for one query, mutation or subscription instance.
pub struct Query {
    id: QueryId,
    def: Arc<QueryDef>,
    root: Arc<RootStore>,
    resolver: TypeResolver,
    stale_time: Duration,
    cache_time: Duration,
    state: RwLock<QueryState>,
    status: watch::Sender<QueryStatus>,
    generation: AtomicU64,
    in_flight: Mutex<Option<CancellationToken>>,
    disposed: AtomicBool,
    removal: Mutex<Option<JoinHandle<()>>>,
}

impl Query {
    pub fn new(def: Arc<QueryDef>, root: Arc<RootStore>, options: QueryOptions) -> QueryHandle {
        let (status, _) = watch::channel(QueryStatus::default());
        Arc::new(Self {
            id: QueryId::new(),
            stale_time: def.stale_time_override().unwrap_or(options.stale_time),
            cache_time: def.cache_time_override().unwrap_or(options.cache_time),
            def,
            root,
            resolver: options.resolver,
            state: RwLock::new(QueryState::new()),
            status,
            generation: AtomicU64::new(0),
            in_flight: Mutex::new(None),
            disposed: AtomicBool::new(false),
            removal: Mutex::new(None),
        })
    }

    // -- Accessors ----------------------------------------------------------

    pub fn id(&self) -> QueryId {
        self.id
    }

    pub fn def(&self) -> &Arc<QueryDef> {
        &self.def
    }

    pub fn name(&self) -> &str {
        self.def.name()
    }

    pub fn kind(&self) -> QueryKind {
        self.def.kind()
    }

    pub fn root(&self) -> &Arc<RootStore> {
        &self.root
    }

    pub fn resolver(&self) -> &TypeResolver {
        &self.resolver
    }

    pub fn data(&self) -> Node {
        self.state.read().expect("lock poisoned").data.clone()
    }

    pub fn request(&self) -> Node {
        self.state.read().expect("lock poisoned").request.clone()
    }

    pub fn pagination(&self) -> Node {
        self.state.read().expect("lock poisoned").pagination.clone()
    }

    /// The request as last passed in, before merging.
    pub fn request_value(&self) -> Option<Value> {
        self.state.read().expect("lock poisoned").raw_request.clone()
    }

    pub fn error(&self) -> Option<Arc<EndpointError>> {
        self.state.read().expect("lock poisoned").error.clone()
    }

    pub fn cached_at(&self) -> Option<Instant> {
        self.state.read().expect("lock poisoned").cached_at
    }

    pub fn status(&self) -> QueryStatus {
        self.state.read().expect("lock poisoned").status()
    }

    pub fn is_loading(&self) -> bool {
        self.state.read().expect("lock poisoned").is_loading
    }

    pub fn is_refetching(&self) -> bool {
        self.state.read().expect("lock poisoned").is_refetching
    }

    pub fn is_fetching_more(&self) -> bool {
        self.state.read().expect("lock poisoned").is_fetching_more
    }

    pub fn is_fetched(&self) -> bool {
        self.state.read().expect("lock poisoned").is_fetched
    }

    pub fn is_in_flight(&self) -> bool {
        self.status().is_in_flight()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub fn stale_time(&self) -> Duration {
        self.stale_time
    }

    pub fn cache_time(&self) -> Duration {
        self.cache_time
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<QueryStatus> {
        self.status.subscribe()
    }

    // -- Operations ---------------------------------------------------------

    pub async fn query(&self, vars: Variables) -> QueryResult<FetchResult> {
        self.run(RunMode::Load, vars).await
    }

    /// Re-run with the last request and pagination.
    pub async fn refetch(&self) -> QueryResult<FetchResult> {
        let vars = {
            let state = self.state.read().expect("lock poisoned");
            Variables {
                request: state.raw_request.clone(),
                pagination: state.raw_pagination.clone(),
                meta: Value::Null,
            }
        };
        self.run(RunMode::Refetch, vars).await
    }

    /// Fetch another page. The converted page is returned and `data` is left
    /// for the caller to extend with [`Query::update_data`].
    pub async fn query_more(&self, vars: Variables) -> QueryResult<FetchResult> {
        self.run(RunMode::FetchMore, vars).await
    }

    pub async fn mutate(&self, vars: Variables) -> QueryResult<FetchResult> {
        self.run(RunMode::Mutate, vars).await
    }

    /// Call the endpoint and merge its result.
    ///
    /// Starting a run aborts any run still in flight on this handler. The
    /// aborted run resolves to [`FetchResult::disposed`] and changes
    /// nothing. Endpoint failures are recorded on the query and returned in
    /// the result; `Err` is reserved for configuration and schema errors.
    pub async fn run(&self, mode: RunMode, vars: Variables) -> QueryResult<FetchResult> {
        let endpoint = self
            .def
            .endpoint_ref()
            .cloned()
            .ok_or_else(|| QueryError::NoEndpoint(self.def.name().to_string()))?;
        if self.is_disposed() {
            return Ok(FetchResult::disposed());
        }

        self.set_variables(&vars)?;
        let (generation, token) = self.begin(mode);
        let args = {
            let state = self.state.read().expect("lock poisoned");
            EndpointArgs {
                request: state.raw_request.clone().unwrap_or(Value::Null),
                pagination: state.raw_pagination.clone().unwrap_or(Value::Null),
                meta: vars.meta,
                signal: AbortSignal::new(token.clone()),
            }
        };
        debug!(query = %self.id, name = self.def.name(), ?mode, generation, "request started");

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            result = endpoint.call(args) => Some(result),
        };

        match outcome {
            None => {
                debug!(query = %self.id, generation, "request discarded");
                Ok(FetchResult::disposed())
            }
            Some(Ok(raw)) => self.complete(mode, generation, &raw),
            Some(Err(EndpointError::Aborted)) => {
                self.finish_aborted(mode, generation);
                Ok(FetchResult::disposed())
            }
            Some(Err(err)) => Ok(self.fail(mode, generation, err)),
        }
    }

    /// Cancel the request in flight, if any.
    pub fn abort(&self) {
        let token = self.in_flight.lock().expect("lock poisoned").take();
        let Some(token) = token else {
            return;
        };
        self.generation.fetch_add(1, Ordering::AcqRel);
        token.cancel();
        self.publish(|state| state.clear_flags());
        debug!(query = %self.id, "request aborted");
    }

    /// Mark the result stale regardless of its age.
    pub fn invalidate(&self) {
        self.state.write().expect("lock poisoned").invalidated = true;
    }

    /// Stale when never fetched, invalidated, or older than the stale time.
    pub fn is_stale(&self) -> bool {
        let state = self.state.read().expect("lock poisoned");
        match state.cached_at {
            _ if state.invalidated => true,
            None => true,
            Some(at) => at.elapsed() >= self.stale_time,
        }
    }

    /// Abort, cancel the removal timer and ignore all later completions.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.abort();
        self.cancel_removal();
        debug!(query = %self.id, name = self.def.name(), "query disposed");
    }

    /// Merge a pushed payload (a subscription event) into `data`.
    pub fn apply_update(&self, raw: &Value) -> QueryResult<Node> {
        if self.is_disposed() {
            return Err(QueryError::Disposed(self.def.name().to_string()));
        }
        let node = self.merge_as("data", raw, self.def.data_type())?;
        self.publish(|state| {
            state.apply_data(node.clone());
            state.cached_at = Some(Instant::now());
            state.is_fetched = true;
        });
        Ok(node)
    }

    /// Edit `data` in place, e.g. to append a page from [`Query::query_more`].
    pub fn update_data<R>(&self, f: impl FnOnce(&mut Node) -> R) -> R {
        let (out, status) = {
            let mut state = self.state.write().expect("lock poisoned");
            let before = state.data.clone();
            let out = f(&mut state.data);
            if state.data != before {
                state.revision += 1;
            }
            (out, state.status())
        };
        self.send_status(status);
        out
    }

    // -- Removal timer ------------------------------------------------------

    /// Install the cache-removal timer, cancelling any previous one.
    pub fn set_removal_timer(&self, handle: JoinHandle<()>) {
        if let Some(previous) = self.removal.lock().expect("lock poisoned").replace(handle) {
            previous.abort();
        }
    }

    /// Cancel a pending removal. Returns `true` if one was pending.
    pub fn cancel_removal(&self) -> bool {
        match self.removal.lock().expect("lock poisoned").take() {
            Some(handle) => {
                let pending = !handle.is_finished();
                handle.abort();
                pending
            }
            None => false,
        }
    }

    pub fn has_pending_removal(&self) -> bool {
        self.removal
            .lock()
            .expect("lock poisoned")
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    // -- Internals ----------------------------------------------------------

    fn set_variables(&self, vars: &Variables) -> QueryResult<()> {
        let request = match &vars.request {
            Some(raw) => Some(self.merge_input("request", raw, self.def.request_type())?),
            None => None,
        };
        let pagination = match &vars.pagination {
            Some(raw) => Some(self.merge_input("pagination", raw, self.def.pagination_type())?),
            None => None,
        };

        let mut state = self.state.write().expect("lock poisoned");
        if let Some(node) = request {
            state.request = node;
            state.raw_request = vars.request.clone();
        }
        if let Some(node) = pagination {
            state.pagination = node;
            state.raw_pagination = vars.pagination.clone();
        }
        Ok(())
    }

    fn merge_input(&self, label: &str, raw: &Value, desc: Option<&TypeDescriptor>) -> QueryResult<Node> {
        match desc {
            Some(desc) => self.merge_as(label, raw, desc),
            None => Ok(Node::Frozen(raw.clone())),
        }
    }

    fn merge_as(&self, label: &str, raw: &Value, desc: &TypeDescriptor) -> QueryResult<Node> {
        let scope = self.root.begin_mutation();
        let node = Merger::new(&self.root, &self.resolver, &scope)
            .at(label)
            .merge(raw, desc)?;
        Ok(node)
    }

    fn begin(&self, mode: RunMode) -> (u64, CancellationToken) {
        let token = CancellationToken::new();
        let previous = self.in_flight.lock().expect("lock poisoned").replace(token.clone());
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(previous) = previous {
            previous.cancel();
            debug!(query = %self.id, generation, "superseded request in flight");
        }
        self.publish(|state| {
            state.clear_flags();
            state.set_flag(mode, true);
        });
        (generation, token)
    }

    fn is_current(&self, generation: u64) -> bool {
        !self.is_disposed() && self.generation.load(Ordering::Acquire) == generation
    }

    fn release_token(&self, generation: u64) {
        if self.generation.load(Ordering::Acquire) == generation {
            self.in_flight.lock().expect("lock poisoned").take();
        }
    }

    fn complete(&self, mode: RunMode, generation: u64, raw: &Value) -> QueryResult<FetchResult> {
        if !self.is_current(generation) {
            return Ok(FetchResult::disposed());
        }
        let node = match self.merge_as("data", raw, self.def.data_type()) {
            Ok(node) => node,
            Err(err) => {
                self.release_token(generation);
                self.publish(|state| state.set_flag(mode, false));
                warn!(query = %self.id, error = %err, "result does not match schema");
                return Err(err);
            }
        };
        if !self.is_current(generation) {
            return Ok(FetchResult::disposed());
        }

        self.release_token(generation);
        self.publish(|state| {
            state.set_flag(mode, false);
            if mode.should_update() {
                state.apply_data(node.clone());
                state.error = None;
                state.cached_at = Some(Instant::now());
                state.is_fetched = true;
                state.invalidated = false;
            }
        });
        debug!(query = %self.id, generation, "request completed");
        Ok(FetchResult {
            data: Some(node),
            error: None,
            disposed: false,
        })
    }

    fn fail(&self, mode: RunMode, generation: u64, err: EndpointError) -> FetchResult {
        if !self.is_current(generation) {
            return FetchResult::disposed();
        }
        debug!(query = %self.id, generation, error = %err, "request failed");
        let err = Arc::new(err);
        self.release_token(generation);
        self.publish(|state| {
            state.set_flag(mode, false);
            state.error = Some(err.clone());
            if mode.clears_data_on_error() && !state.data.is_null() {
                state.data = Node::Null;
                state.revision += 1;
            }
        });
        FetchResult {
            data: None,
            error: Some(err),
            disposed: false,
        }
    }

    fn finish_aborted(&self, mode: RunMode, generation: u64) {
        if self.is_current(generation) {
            self.release_token(generation);
            self.publish(|state| state.set_flag(mode, false));
        }
    }

    /// Mutate state and publish the resulting status to watchers.
    fn publish(&self, f: impl FnOnce(&mut QueryState)) {
        let status = {
            let mut state = self.state.write().expect("lock poisoned");
            f(&mut state);
            state.status()
        };
        self.send_status(status);
    }

    fn send_status(&self, status: QueryStatus) {
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("id", &self.id)
            .field("name", &self.def.name())
            .field("kind", &self.def.kind())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
