//! # Strand core concurrency primitives
//!
//! The building blocks shared by every Strand listener:
//!
//! - **Run-state**: a process-wide lifecycle flag (`running -> draining ->
//!   shutdown`) consulted by every blocking wait.
//! - **Dispatch pool**: a bounded producer/consumer queue pairing work items
//!   with a fixed set of worker threads.
//! - **Handler pool**: a fixed set of reusable connection handlers with
//!   idle/busy recycling.
//!
//! All blocking waits in this crate are bounded by [`WAIT_GRANULARITY`] so
//! that a shutdown request is observed within a bounded latency.

use std::time::Duration;

pub mod dispatch;
pub mod pool;
pub mod run_state;

pub use dispatch::{DispatchPool, QueueTimeout, Worker};
pub use pool::{HandlerPool, PoolTimeout};
pub use run_state::{RunFlag, RunState, RunStateError};

/// Granularity of condition-variable waits. Every blocking wait re-checks
/// the run-state after at most this long.
pub const WAIT_GRANULARITY: Duration = Duration::from_secs(2);
