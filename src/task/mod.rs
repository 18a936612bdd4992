// src/task/mod.rs

//! Task abstraction.
//!
//! - [`Task`] is the capability trait concrete work implements (a download,
//!   a feed refresh, a simulated job). It only has to start work without
//!   blocking and later complete the [`TaskContext`] it was given.
//! - [`TaskHandle`] wraps a task with its lifecycle state machine. Groups
//!   store handles; callers keep clones to observe or pause/resume.
//! - [`TaskContext`] is handed to `execute` once per run. Completing it
//!   consumes it, so a run completes at most once; dropping it without
//!   completing fails the run.
//! - [`signal`] holds the messages a task sends back to its group.

pub mod context;
pub mod handle;
pub mod outcome;
pub(crate) mod signal;

pub use context::TaskContext;
pub use handle::TaskHandle;
pub use outcome::{Completion, TaskOutcome};

/// Unit of asynchronous work schedulable by a [`TaskGroup`](crate::group::TaskGroup).
///
/// `execute` is called on the group's pump; it must return quickly (spawn
/// the real work) and must eventually complete the context. Returning
/// `Err` (or panicking) means the work never started: the group rolls the
/// run back and the task stays `Ready`.
pub trait Task: Send + Sync + 'static {
    /// Display name, used in logs and events.
    fn name(&self) -> &str {
        ""
    }

    /// Weight of this task in the group's aggregate progress.
    fn weight(&self) -> u32 {
        1
    }

    fn execute(&self, ctx: TaskContext) -> anyhow::Result<()>;

    /// Called (outside any group lock) after a cancel request reached a
    /// running task. The run's cancellation token has already fired.
    fn on_cancel_requested(&self) {}

    /// Called after a stop request reached a running task.
    fn on_stop_requested(&self) {
        self.on_cancel_requested()
    }

    /// Called after a pause request reached a running task.
    fn on_pause_requested(&self) {}
}
