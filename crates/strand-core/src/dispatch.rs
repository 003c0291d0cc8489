//! Bounded work-dispatch pool.
//!
//! A [`DispatchPool`] pairs a bounded queue of pending work items with a
//! fixed set of worker threads and a bounded queue of completed results.
//! Producers enqueue with backpressure (or a `false` return once shutdown
//! begins); consumers dequeue with a timeout that is a retryable condition,
//! not an error, so they can re-check the run-state between attempts.

use std::collections::VecDeque;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tracing::{debug, warn};

use crate::run_state::RunFlag;
use crate::WAIT_GRANULARITY;

/// Raised by [`DispatchPool::dequeue`] when no result arrived within the
/// wait granularity. Callers re-check the run-state and retry.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("timed out waiting on queue {0}")]
pub struct QueueTimeout(pub String);

/// A unit of processing bound to the pool's worker threads.
///
/// Exactly one worker processes any given item. Completion ordering across
/// items is not guaranteed.
pub trait Worker<M>: Send {
    /// Processes one item, producing its result.
    fn process(&mut self, item: M) -> M;
}

/// Bounded multi-producer/multi-consumer queue.
struct BoundedQueue<M> {
    name: String,
    capacity: usize,
    items: Mutex<VecDeque<M>>,
    available: Condvar,
    space: Condvar,
}

impl<M> BoundedQueue<M> {
    fn new(name: String, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            available: Condvar::new(),
            space: Condvar::new(),
        }
    }

    /// Adds an item, blocking in bounded slices while the queue is full.
    /// Returns false without queueing once shutdown has been requested.
    fn push(&self, item: M, run: &RunFlag) -> bool {
        let mut items = self.items.lock();
        while items.len() >= self.capacity {
            if run.is_shutdown() {
                warn!(queue = %self.name, "queue full at shutdown, dropping item");
                return false;
            }
            self.space.wait_for(&mut items, WAIT_GRANULARITY);
        }
        if run.is_shutdown() {
            return false;
        }
        items.push_back(item);
        self.available.notify_one();
        true
    }

    /// Removes the oldest item, waiting up to `timeout` for one to arrive.
    fn pop(&self, timeout: Duration) -> Result<M, QueueTimeout> {
        let deadline = Instant::now() + timeout;
        let mut items = self.items.lock();
        while items.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                return Err(QueueTimeout(self.name.clone()));
            }
            if self
                .available
                .wait_for(&mut items, deadline - now)
                .timed_out()
                && items.is_empty()
            {
                return Err(QueueTimeout(self.name.clone()));
            }
        }
        let item = items.pop_front().expect("queue not empty");
        self.space.notify_one();
        Ok(item)
    }

    fn len(&self) -> usize {
        self.items.lock().len()
    }
}

/// A fixed set of worker threads fed from a bounded pending queue, with
/// results returned on a bounded completion queue.
pub struct DispatchPool<M> {
    name: String,
    run: RunFlag,
    in_queue: std::sync::Arc<BoundedQueue<M>>,
    out_queue: std::sync::Arc<BoundedQueue<M>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl<M: Send + 'static> DispatchPool<M> {
    /// Creates a pool with `num_workers` threads, each running a worker
    /// built by `factory`, and pending/completed queues bounded at
    /// `max_in`/`max_out`.
    pub fn new<W, F>(
        name: &str,
        run: RunFlag,
        max_in: usize,
        max_out: usize,
        num_workers: usize,
        mut factory: F,
    ) -> Self
    where
        W: Worker<M> + 'static,
        F: FnMut(usize) -> W,
    {
        let in_queue = std::sync::Arc::new(BoundedQueue::new(
            format!("{name} input queue"),
            max_in,
        ));
        let out_queue = std::sync::Arc::new(BoundedQueue::new(
            format!("{name} output queue"),
            max_out,
        ));

        let mut threads = Vec::with_capacity(num_workers);
        for i in 0..num_workers {
            let mut worker = factory(i);
            let run = run.clone();
            let in_queue = in_queue.clone();
            let out_queue = out_queue.clone();
            let thread_name = format!("{name}-worker-{i}");
            let handle = std::thread::Builder::new()
                .name(thread_name)
                .spawn(move || loop {
                    match in_queue.pop(WAIT_GRANULARITY) {
                        Ok(item) => {
                            let result = worker.process(item);
                            if !out_queue.push(result, &run) {
                                debug!(queue = %out_queue.name, "result dropped during shutdown");
                            }
                        }
                        Err(_) => {
                            if run.is_shutdown() {
                                return;
                            }
                        }
                    }
                })
                .expect("failed to spawn dispatch worker");
            threads.push(handle);
        }

        Self {
            name: name.to_string(),
            run,
            in_queue,
            out_queue,
            threads: Mutex::new(threads),
        }
    }

    /// Adds an item to the pending queue.
    ///
    /// Blocks with backpressure while the queue is full. Returns `false`
    /// once shutdown has begun; the caller must discard the item and tear
    /// down, not retry.
    pub fn enqueue(&self, item: M) -> bool {
        if self.run.is_shutdown() {
            return false;
        }
        self.in_queue.push(item, &self.run)
    }

    /// Takes the next completed result, waiting up to the standard wait
    /// granularity.
    ///
    /// Results may complete out of submission order; callers needing
    /// correlation must use envelope identity, not sequence.
    pub fn dequeue(&self) -> Result<M, QueueTimeout> {
        self.out_queue.pop(WAIT_GRANULARITY)
    }

    /// Current number of pending items.
    pub fn pending(&self) -> usize {
        self.in_queue.len()
    }

    /// Pool name, used in queue diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits for all worker threads to terminate. Safe to call only after
    /// shutdown has been signalled on the run flag.
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
