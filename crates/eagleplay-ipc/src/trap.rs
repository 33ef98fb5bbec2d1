//! Termination trap.
//!
//! The worker core's native way to give up is to terminate its whole
//! process. In this single-process bridge that call is intercepted: if
//! a recovery point is armed, [`ExitTrap::trip`] performs a non-local
//! return to the driving call site, which turns the termination into a
//! control-flow event. Tripping the trap with no recovery point armed
//! is an implementation bug, not a runtime condition, and halts the
//! process loudly.
//!
//! The recovery point is established with [`ExitTrap::catch_exit`],
//! which arms the trap only for the duration of one bounded unit of
//! worker execution.

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};

/// Payload carried through the unwind when the trap fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitSignal {
    /// Status code the worker core reported.
    pub status: i32,
}

/// Result of driving one protected unit of worker execution.
#[derive(Debug, PartialEq, Eq)]
pub enum ExitOutcome<R> {
    /// The unit ran to completion.
    Completed(R),
    /// The worker invoked its termination primitive mid-unit.
    Terminated(i32),
}

/// Intercepts the worker's process-termination primitive.
#[derive(Debug, Default)]
pub struct ExitTrap {
    armed: Cell<bool>,
}

impl ExitTrap {
    /// Create a disarmed trap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a recovery point is currently armed.
    pub fn is_armed(&self) -> bool {
        self.armed.get()
    }

    /// The intercepted termination primitive. Never returns.
    ///
    /// Armed: unwinds to the recovery point established by
    /// [`catch_exit`](Self::catch_exit). Unarmed: the trap was invoked
    /// outside its protected context — halt the process visibly rather
    /// than continue in an undefined state.
    pub fn trip(&self, status: i32) -> ! {
        if self.armed.get() {
            panic::panic_any(ExitSignal { status });
        }
        log::error!("unguarded worker termination (status {status}), aborting");
        eprintln!("eagleplay: FATAL: unguarded worker termination (status {status})");
        std::process::abort();
    }

    /// Run one bounded unit of worker execution with the recovery
    /// point armed.
    ///
    /// The trap is disarmed again on every path out, including foreign
    /// panics, which are re-raised untouched.
    pub fn catch_exit<R>(&self, unit: impl FnOnce() -> R) -> ExitOutcome<R> {
        self.armed.set(true);
        let result = panic::catch_unwind(AssertUnwindSafe(unit));
        self.armed.set(false);

        match result {
            Ok(value) => ExitOutcome::Completed(value),
            Err(payload) => match payload.downcast::<ExitSignal>() {
                Ok(signal) => ExitOutcome::Terminated(signal.status),
                Err(other) => panic::resume_unwind(other),
            },
        }
    }
}
