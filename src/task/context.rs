// src/task/context.rs

use tokio_util::sync::CancellationToken;

use crate::task::{TaskHandle, TaskOutcome};
use crate::types::{CancelKind, TaskId};

/// Capability handed to [`Task::execute`](crate::task::Task::execute) for a
/// single run.
///
/// The work reports progress through it and completes the run by consuming
/// it. Dropping a context without completing it fails the run, so a task
/// can never leave its group waiting forever.
#[derive(Debug)]
pub struct TaskContext {
    task: TaskHandle,
    epoch: u64,
    cancel: CancellationToken,
    pause: CancellationToken,
    done: bool,
}

impl TaskContext {
    pub(crate) fn new(
        task: TaskHandle,
        epoch: u64,
        cancel: CancellationToken,
        pause: CancellationToken,
    ) -> Self {
        Self {
            task,
            epoch,
            cancel,
            pause,
            done: false,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task.id()
    }

    pub fn task(&self) -> &TaskHandle {
        &self.task
    }

    /// Run counter for the owning task; increases with every dispatch.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// True once the task or its group asked this run to halt.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token fired when this run should halt. Clone it into spawned work.
    pub fn cancelled_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Resolves once this run is asked to halt.
    pub async fn wait_cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Which kind of halt was requested, if the request came through the
    /// task itself. Group-wide cancellation always reads as `Cancel`.
    pub fn cancel_kind(&self) -> Option<CancelKind> {
        if !self.is_cancelled() {
            return None;
        }
        Some(self.task.cancel_kind().unwrap_or(CancelKind::Cancel))
    }

    pub fn is_pause_requested(&self) -> bool {
        self.pause.is_cancelled()
    }

    /// Token fired when a pause was requested for this run.
    pub fn pause_token(&self) -> CancellationToken {
        self.pause.clone()
    }

    /// Report progress in percent. Values outside 0..=100 are clamped.
    pub fn progress(&self, percent: i32) {
        self.task.report_progress(self.epoch, percent, None);
    }

    /// Report progress together with a free-form state description.
    pub fn progress_with_state(&self, percent: i32, user_state: impl Into<String>) {
        self.task
            .report_progress(self.epoch, percent, Some(user_state.into()));
    }

    /// Tell observers the task changed in some way that is not progress.
    pub fn updated(&self) {
        self.task.report_updated(self.epoch);
    }

    pub fn succeed(self) {
        self.complete(TaskOutcome::Succeeded);
    }

    pub fn fail(self, error: impl Into<anyhow::Error>) {
        self.complete(TaskOutcome::Failed(error.into()));
    }

    /// Acknowledge a halt request.
    pub fn cancelled(self) {
        self.complete(TaskOutcome::Cancelled);
    }

    /// Stop this run without finishing the task. It can be resumed later.
    pub fn pause(self) {
        self.complete(TaskOutcome::Paused);
    }

    /// Complete the run. Returns `false` if the run had already been
    /// rolled back or superseded.
    pub fn complete(mut self, outcome: TaskOutcome) -> bool {
        self.done = true;
        self.task.complete_run(self.epoch, outcome)
    }
}

impl Drop for TaskContext {
    fn drop(&mut self) {
        if !self.done {
            self.task.report_abandoned(self.epoch);
        }
    }
}
