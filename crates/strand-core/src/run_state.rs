//! Process-wide run-state flag.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Run-state error.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RunStateError {
    #[error("invalid run-state transition: {from} -> {to}")]
    InvalidTransition { from: RunState, to: RunState },
}

/// Process lifecycle state.
///
/// Transitions are monotonic: `Running -> Draining -> Shutdown`. Every
/// blocking wait polls the current state after a timeout and terminates
/// promptly once `Shutdown` is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum RunState {
    /// Normal operation.
    Running = 0,
    /// No new work accepted; in-flight work completes.
    Draining = 1,
    /// All blocking loops must exit.
    Shutdown = 2,
}

impl RunState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => RunState::Running,
            1 => RunState::Draining,
            _ => RunState::Shutdown,
        }
    }

    /// Returns the state name.
    pub const fn name(&self) -> &'static str {
        match self {
            RunState::Running => "running",
            RunState::Draining => "draining",
            RunState::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Cloneable handle to the process run-state.
///
/// Created once by the top-level context and handed to every component with
/// a blocking wait. Reads are cheap (a relaxed atomic load).
#[derive(Debug, Clone, Default)]
pub struct RunFlag(Arc<AtomicU8>);

impl RunFlag {
    /// Creates a new flag in the `Running` state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current state.
    pub fn get(&self) -> RunState {
        RunState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Returns true once shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        self.get() == RunState::Shutdown
    }

    /// Advances the state. Reverse transitions are rejected; setting the
    /// current state again is a no-op.
    pub fn set(&self, new_state: RunState) -> Result<(), RunStateError> {
        let current = self.get();
        if new_state < current {
            return Err(RunStateError::InvalidTransition {
                from: current,
                to: new_state,
            });
        }
        self.0.store(new_state as u8, Ordering::Release);
        Ok(())
    }
}
