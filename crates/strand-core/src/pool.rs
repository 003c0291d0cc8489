//! Connection-handler pool.
//!
//! A fixed set of handler instances is created at startup, each running its
//! own service loop in a dedicated thread. Idle handlers sit in the pool's
//! free list; the accept path takes one with [`HandlerPool::get`], assigns
//! it a connection, and the handler returns itself with
//! [`HandlerPool::put`] once the connection is done. Handlers live for the
//! process lifetime and are recycled across many sequential connections.

use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use crate::WAIT_GRANULARITY;

/// Raised by [`HandlerPool::get`] when no handler became idle within the
/// wait granularity. Callers re-check the run-state and retry.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("no idle handler became available")]
pub struct PoolTimeout;

/// Fixed-size pool of reusable handlers.
pub struct HandlerPool<H> {
    free: Mutex<Vec<Arc<H>>>,
    idle: Condvar,
    threads: Mutex<Vec<JoinHandle<()>>>,
    size: Mutex<usize>,
}

impl<H: Send + Sync + 'static> HandlerPool<H> {
    /// Creates an empty pool. Handlers are registered with [`add`].
    ///
    /// [`add`]: HandlerPool::add
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            free: Mutex::new(Vec::new()),
            idle: Condvar::new(),
            threads: Mutex::new(Vec::new()),
            size: Mutex::new(0),
        })
    }

    /// Registers a handler as idle and spawns its service-loop thread.
    pub fn add<F>(self: &Arc<Self>, handler: Arc<H>, service_loop: F)
    where
        F: FnOnce(Arc<H>) + Send + 'static,
    {
        let runner = handler.clone();
        let handle = std::thread::spawn(move || service_loop(runner));

        self.free.lock().push(handler);
        *self.size.lock() += 1;
        self.threads.lock().push(handle);
        self.idle.notify_one();
    }

    /// Takes an idle handler, removing it from the free list.
    ///
    /// Blocks up to the standard wait granularity; on expiry returns
    /// [`PoolTimeout`] so the caller can re-check the run-state before
    /// retrying.
    pub fn get(&self) -> Result<Arc<H>, PoolTimeout> {
        let mut free = self.free.lock();
        while free.is_empty() {
            if self.idle.wait_for(&mut free, WAIT_GRANULARITY).timed_out() && free.is_empty() {
                return Err(PoolTimeout);
            }
        }
        Ok(free.pop().expect("free list not empty"))
    }

    /// Returns a handler to the idle set once its connection is done.
    pub fn put(&self, handler: Arc<H>) {
        self.free.lock().push(handler);
        self.idle.notify_one();
    }

    /// Total number of handlers registered.
    pub fn size(&self) -> usize {
        *self.size.lock()
    }

    /// Number of currently idle handlers.
    pub fn idle_count(&self) -> usize {
        self.free.lock().len()
    }

    /// Joins all handler threads. Safe to call only after shutdown has been
    /// signalled; the service loops must observe it and return.
    pub fn join(&self) {
        let threads = {
            let mut guard = self.threads.lock();
            std::mem::take(&mut *guard)
        };
        for handle in threads {
            let _ = handle.join();
        }
    }
}
