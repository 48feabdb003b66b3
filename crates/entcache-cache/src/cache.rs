use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

use entcache_query::{Query, QueryHandle};
use entcache_store::{Node, RootStore};
use entcache_types::QueryId;
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::error::{CacheError, CacheResult};
use crate::gc::{collect_reachable, sweep, GcOutcome};

/// Every live query, mutation and subscription of one client.
pub struct QueryCache {
    root: Arc<RootStore>,
    queries: RwLock<BTreeMap<String, Vec<QueryHandle>>>,
    gc_pending: AtomicBool,
    gc_retry_delay: Duration,
    this: Weak<QueryCache>,
}

impl QueryCache {
    pub fn new(root: Arc<RootStore>, gc_retry_delay: Duration) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            root,
            queries: RwLock::new(BTreeMap::new()),
            gc_pending: AtomicBool::new(false),
            gc_retry_delay,
            this: this.clone(),
        })
    }

    pub fn root(&self) -> &Arc<RootStore> {
        &self.root
    }

    /// Track a query. Adding the same instance twice has no effect.
    pub fn set_query(&self, query: QueryHandle) {
        let mut queries = self.queries.write().expect("lock poisoned");
        let group = queries.entry(query.name().to_string()).or_default();
        if group.iter().any(|q| q.id() == query.id()) {
            return;
        }
        debug!(query = %query.id(), name = query.name(), kind = %query.kind(), "query cached");
        group.push(query);
    }

    /// Dispose and untrack a query, then collect garbage.
    pub fn remove_query(&self, query: &Query) -> CacheResult<GcOutcome> {
        let removed = {
            let mut queries = self.queries.write().expect("lock poisoned");
            let group = queries.get_mut(query.name());
            let removed = group.as_ref().is_some_and(|g| g.iter().any(|q| q.id() == query.id()));
            if let Some(group) = group {
                group.retain(|q| q.id() != query.id());
                if group.is_empty() {
                    queries.remove(query.name());
                }
            }
            removed
        };
        if !removed {
            return Err(CacheError::QueryNotFound(query.id()));
        }
        query.dispose();
        debug!(query = %query.id(), name = query.name(), "query removed");
        Ok(self.run_gc())
    }

    pub fn get(&self, id: QueryId) -> Option<QueryHandle> {
        self.queries
            .read()
            .expect("lock poisoned")
            .values()
            .flatten()
            .find(|q| q.id() == id)
            .cloned()
    }

    /// Cached queries of one definition matching a predicate.
    pub fn find_all(&self, name: &str, predicate: impl Fn(&Query) -> bool) -> Vec<QueryHandle> {
        self.queries
            .read()
            .expect("lock poisoned")
            .get(name)
            .map(|group| group.iter().filter(|q| predicate(q)).cloned().collect())
            .unwrap_or_default()
    }

    pub fn queries(&self) -> Vec<QueryHandle> {
        self.queries
            .read()
            .expect("lock poisoned")
            .values()
            .flatten()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.queries.read().expect("lock poisoned").values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispose and untrack every query. Entities are left to the caller.
    pub fn clear(&self) {
        let drained = std::mem::take(&mut *self.queries.write().expect("lock poisoned"));
        for query in drained.values().flatten() {
            query.dispose();
        }
        debug!(queries = drained.values().map(Vec::len).sum::<usize>(), "query cache cleared");
    }

    /// Mark and sweep, unless a pass is already pending or a request is in
    /// flight. In the latter case a retry is scheduled.
    pub fn run_gc(&self) -> GcOutcome {
        if self.gc_pending.load(Ordering::Acquire) {
            return GcOutcome::Skipped;
        }
        let queries = self.queries();
        if queries.iter().any(|q| q.is_in_flight()) {
            self.schedule_gc();
            return GcOutcome::Deferred;
        }

        let roots: Vec<Node> = queries
            .iter()
            .flat_map(|q| [q.data(), q.request(), q.pagination()])
            .collect();
        let report = {
            let scope = self.root.begin_mutation();
            let reachable = collect_reachable(&self.root, &roots);
            sweep(&self.root, &scope, &reachable)
        };
        info!(
            removed = report.entities_removed,
            reachable = report.reachable,
            queries = queries.len(),
            "garbage collected"
        );
        GcOutcome::Collected(report)
    }

    fn schedule_gc(&self) {
        let Ok(runtime) = Handle::try_current() else {
            debug!("no runtime, gc retried on next trigger");
            return;
        };
        if self.gc_pending.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(delay_ms = self.gc_retry_delay.as_millis() as u64, "gc deferred");
        let this = self.this.clone();
        let delay = self.gc_retry_delay;
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(cache) = this.upgrade() {
                cache.gc_pending.store(false, Ordering::Release);
                cache.run_gc();
            }
        });
    }

    /// Remove `query` after `after` unless the timer is cancelled first
    /// (the query is reused or disposed).
    pub fn schedule_removal(&self, query: &QueryHandle, after: Duration) {
        let runtime = match Handle::try_current() {
            Ok(runtime) if !after.is_zero() => runtime,
            _ => {
                let _ = self.remove_query(query);
                return;
            }
        };
        let this = self.this.clone();
        let target = Arc::downgrade(query);
        let handle = runtime.spawn(async move {
            tokio::time::sleep(after).await;
            if let (Some(cache), Some(query)) = (this.upgrade(), target.upgrade()) {
                let _ = cache.remove_query(&query);
            }
        });
        query.set_removal_timer(handle);
        debug!(query = %query.id(), after_ms = after.as_millis() as u64, "removal scheduled");
    }
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("queries", &self.len())
            .field("gc_pending", &self.gc_pending.load(Ordering::Relaxed))
            .finish()
    }
}
