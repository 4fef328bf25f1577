//! Pooled connection source over one shared keyspace.
//!
//! Every logical store operation borrows one handle and releases it on scope exit, failure
//! paths included. A handle submits work in three modes: single command, pipeline (batched,
//! no atomicity between commands), and optimistic transaction (watch/exec, aborting cleanly
//! when any watched key moved since it was watched).

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::command::{KvCommand, KvReply};
use crate::keyspace::{Keyspace, ScanCursor};

#[derive(Debug)]
struct PoolShared {
    keyspace: Mutex<Keyspace>,
    free_handles: Mutex<usize>,
    handle_released: Condvar,
}

/// Bounded source of keyed-store connection handles.
///
/// Clones share the same keyspace and the same handle budget, so several store instances
/// cloned from one pool behave like coordinator peers against one backing server.
#[derive(Debug, Clone)]
pub struct KvPool {
    shared: Arc<PoolShared>,
}

impl KvPool {
    /// Creates a pool with the given handle capacity over a fresh keyspace.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                keyspace: Mutex::new(Keyspace::new()),
                free_handles: Mutex::new(capacity.max(1)),
                handle_released: Condvar::new(),
            }),
        }
    }

    /// Borrows one handle, blocking until a peer releases theirs when the pool is drained.
    #[must_use]
    pub fn get(&self) -> PooledConn {
        let mut free = self.shared.free_handles.lock();
        while *free == 0 {
            self.shared.handle_released.wait(&mut free);
        }
        *free -= 1;
        drop(free);
        PooledConn {
            shared: Arc::clone(&self.shared),
            watched: Vec::new(),
        }
    }
}

/// One borrowed connection handle; returns to the pool when dropped.
#[derive(Debug)]
pub struct PooledConn {
    shared: Arc<PoolShared>,
    watched: Vec<(String, u64)>,
}

impl PooledConn {
    /// Submits a single command.
    pub fn execute(&mut self, command: &KvCommand) -> KvReply {
        self.shared.keyspace.lock().apply(command)
    }

    /// Submits a batch in order, with no atomicity between commands.
    ///
    /// Commands from other handles may interleave between two pipelined commands; a crash
    /// mid-pipeline leaves any prefix applied.
    pub fn pipeline(&mut self, commands: &[KvCommand]) -> Vec<KvReply> {
        commands
            .iter()
            .map(|command| self.shared.keyspace.lock().apply(command))
            .collect()
    }

    /// Records the current version of a key for the next `exec` call.
    pub fn watch(&mut self, key: &str) {
        let version = self.shared.keyspace.lock().version(key);
        if !self.watched.iter().any(|(watched, _)| watched == key) {
            self.watched.push((key.to_owned(), version));
        }
    }

    /// Discards all watch state accumulated on this handle.
    pub fn unwatch(&mut self) {
        self.watched.clear();
    }

    /// Runs an optimistic transaction over the batched commands.
    ///
    /// Under one keyspace serialization point, every watched key is re-checked; if any moved
    /// since `watch`, nothing is applied and `None` is returned (the EXEC null-array case).
    /// Otherwise the whole batch applies atomically and its replies are returned. Watch state
    /// clears either way.
    pub fn exec(&mut self, commands: &[KvCommand]) -> Option<Vec<KvReply>> {
        let mut keyspace = self.shared.keyspace.lock();
        let watched = std::mem::take(&mut self.watched);
        let clean = watched
            .iter()
            .all(|(key, version)| keyspace.version(key) == *version);
        if !clean {
            return None;
        }
        Some(
            commands
                .iter()
                .map(|command| keyspace.apply(command))
                .collect(),
        )
    }

    /// Cursor-based key enumeration; see [`Keyspace::scan`].
    pub fn scan(
        &mut self,
        cursor: &ScanCursor,
        pattern: &str,
        count: usize,
    ) -> (ScanCursor, Vec<String>) {
        self.shared.keyspace.lock().scan(cursor, pattern, count)
    }
}

impl Drop for PooledConn {
    fn drop(&mut self) {
        let mut free = self.shared.free_handles.lock();
        *free += 1;
        self.shared.handle_released.notify_one();
    }
}
