//! Store facade: construction, configuration access, and the process-wide instance.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use once_cell::sync::OnceCell;
use txc_common::config::StoreConfig;
use txc_kv::pool::{KvPool, PooledConn};

static PROCESS_STORE: OnceCell<Arc<SessionStore>> = OnceCell::new();

/// The transaction session store.
///
/// Stateless beyond its configuration and pool handle: every operation borrows one backing
/// store connection for its own duration, and all cross-key consistency is mediated by the
/// backing store's optimistic transactions. One instance is safely shared by any number of
/// request handlers, timer sweeps, and console queries.
#[derive(Debug)]
pub struct SessionStore {
    pool: KvPool,
    query_limit: AtomicUsize,
    branch_scan_window: usize,
}

impl SessionStore {
    /// Creates a store over a fresh backing keyspace.
    #[must_use]
    pub fn new(config: &StoreConfig) -> Self {
        Self::with_pool(KvPool::new(config.pool_size), config)
    }

    /// Creates a store over an existing pool.
    ///
    /// Pools clone-share their keyspace, so two stores built from clones of one pool behave
    /// like coordinator peers against the same backing server.
    #[must_use]
    pub fn with_pool(pool: KvPool, config: &StoreConfig) -> Self {
        Self {
            pool,
            query_limit: AtomicUsize::new(config.query_limit.max(1)),
            branch_scan_window: config.branch_scan_window.max(1),
        }
    }

    /// Initializes the process-wide store on first call; later calls return the existing
    /// instance and ignore their config.
    pub fn init(config: &StoreConfig) -> Arc<Self> {
        Arc::clone(PROCESS_STORE.get_or_init(|| Arc::new(Self::new(config))))
    }

    /// The process-wide store, created with default configuration when nothing initialized
    /// it explicitly.
    pub fn instance() -> Arc<Self> {
        Self::init(&StoreConfig::default())
    }

    /// The pool this store issues its operations through.
    #[must_use]
    pub fn pool(&self) -> &KvPool {
        &self.pool
    }

    /// Maximum total xids returned by one multi-status query.
    #[must_use]
    pub fn query_limit(&self) -> usize {
        self.query_limit.load(Ordering::Relaxed)
    }

    /// Overrides the multi-status query limit at runtime, clamped to at least one xid.
    pub fn set_query_limit(&self, query_limit: usize) {
        self.query_limit.store(query_limit.max(1), Ordering::Relaxed);
    }

    /// Per-status LRANGE cap when one query spans several status lists.
    pub(crate) fn effective_query_limit(&self, status_count: usize) -> usize {
        (self.query_limit() / status_count.max(1)).max(1)
    }

    pub(crate) fn conn(&self) -> PooledConn {
        self.pool.get()
    }

    pub(crate) fn branch_scan_window(&self) -> usize {
        self.branch_scan_window
    }
}
