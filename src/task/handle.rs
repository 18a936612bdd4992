// src/task/handle.rs

//! Lifecycle state machine wrapped around a [`Task`].

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::anyhow;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::errors::{Result, TaskGroupError};
use crate::task::context::TaskContext;
use crate::task::signal::{SignalSender, TaskSignal};
use crate::task::{Completion, Task, TaskOutcome};
use crate::types::{CancelKind, GroupId, TaskId, TaskState, clamp_percent};

/// Shared, cloneable handle to a task and its lifecycle state.
///
/// Equality and hashing use the task id, so two clones of the same handle
/// compare equal.
#[derive(Clone)]
pub struct TaskHandle {
    inner: Arc<TaskInner>,
}

struct TaskInner {
    id: TaskId,
    name: String,
    weight: u32,
    work: Arc<dyn Task>,
    cell: Mutex<TaskCell>,
}

#[derive(Debug)]
struct TaskCell {
    state: TaskState,
    busy: bool,
    finished: bool,
    progress: u8,
    /// Incremented for every dispatch and every rollback; contexts from an
    /// older epoch are stale.
    epoch: u64,
    requested: Option<CancelKind>,
    /// Set by `resume` until the group has applied the `Paused → Ready`
    /// signal; the task is not dispatched before that.
    resume_unseen: bool,
    association: Option<Association>,
    run: Option<RunTokens>,
}

#[derive(Debug)]
struct Association {
    group_id: GroupId,
    signals: SignalSender,
}

#[derive(Debug)]
struct RunTokens {
    cancel: CancellationToken,
    pause: CancellationToken,
}

/// Why the pump could not start a task it selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DispatchRefusal {
    Busy,
    Finished,
    NotReady(TaskState),
    ResumeUnseen,
    NotAssociated,
}

impl fmt::Display for DispatchRefusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchRefusal::Busy => f.write_str("task is already running"),
            DispatchRefusal::Finished => f.write_str("task has already finished"),
            DispatchRefusal::NotReady(state) => write!(f, "task is {state}, not ready"),
            DispatchRefusal::ResumeUnseen => f.write_str("resume not yet seen by the group"),
            DispatchRefusal::NotAssociated => f.write_str("task is not associated with a group"),
        }
    }
}

enum HaltEffect {
    Nothing,
    SignalledRun,
    CancelledIdle,
}

impl TaskHandle {
    pub fn new<T: Task>(task: T) -> Self {
        Self::from_arc(Arc::new(task))
    }

    /// Wrap a task the caller keeps its own `Arc` to.
    pub fn from_arc(work: Arc<dyn Task>) -> Self {
        let name = work.name().to_string();
        let weight = work.weight();
        Self {
            inner: Arc::new(TaskInner {
                id: TaskId::next(),
                name,
                weight,
                work,
                cell: Mutex::new(TaskCell {
                    state: TaskState::Ready,
                    busy: false,
                    finished: false,
                    progress: 0,
                    epoch: 0,
                    requested: None,
                    resume_unseen: false,
                    association: None,
                    run: None,
                }),
            }),
        }
    }

    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn weight(&self) -> u32 {
        self.inner.weight
    }

    pub fn work(&self) -> &Arc<dyn Task> {
        &self.inner.work
    }

    pub fn state(&self) -> TaskState {
        self.lock_cell().state
    }

    pub fn is_busy(&self) -> bool {
        self.lock_cell().busy
    }

    pub fn is_finished(&self) -> bool {
        self.lock_cell().finished
    }

    /// Last progress percentage the task reported.
    pub fn progress(&self) -> u8 {
        self.lock_cell().progress
    }

    /// Group currently owning this task, if any.
    pub fn group_id(&self) -> Option<GroupId> {
        self.lock_cell().association.as_ref().map(|a| a.group_id)
    }

    /// Halt requested for the current (or last) run, if any.
    pub fn cancel_kind(&self) -> Option<CancelKind> {
        self.lock_cell().requested
    }

    /// Request cooperative cancellation.
    ///
    /// A running task is signalled and decides when to finish; a task that
    /// is ready or paused completes as `Cancelled` right away. Returns
    /// `false` if the task had already finished.
    pub fn cancel(&self) -> bool {
        self.request_halt(CancelKind::Cancel)
    }

    /// Like [`cancel`](Self::cancel), but asks the work to wind down.
    pub fn stop(&self) -> bool {
        self.request_halt(CancelKind::Stop)
    }

    /// Ask a running task to pause. The task decides whether to honour it
    /// by completing its context with [`TaskContext::pause`].
    pub fn request_pause(&self) -> bool {
        let requested = {
            let cell = self.lock_cell();
            match (&cell.run, cell.busy) {
                (Some(run), true) => {
                    run.pause.cancel();
                    true
                }
                _ => false,
            }
        };

        if requested {
            debug!(task = %self.id(), "pause requested");
            self.inner.work.on_pause_requested();
        }
        requested
    }

    /// Move a paused task back to `Ready` so its group can schedule it
    /// again. Returns `false` if the task is not paused.
    pub fn resume(&self) -> bool {
        let mut cell = self.lock_cell();
        if cell.state != TaskState::Paused || cell.busy || cell.finished {
            return false;
        }
        cell.requested = None;
        cell.resume_unseen = cell.association.is_some();
        self.set_state(&mut cell, TaskState::Ready);
        debug!(task = %self.id(), "task resumed");
        true
    }

    fn request_halt(&self, kind: CancelKind) -> bool {
        let effect = {
            let mut cell = self.lock_cell();
            if cell.finished {
                HaltEffect::Nothing
            } else if cell.busy {
                cell.requested = Some(kind);
                if let Some(run) = &cell.run {
                    run.cancel.cancel();
                }
                HaltEffect::SignalledRun
            } else {
                // Nothing is running, so there is nothing to wind down.
                cell.requested = Some(kind);
                cell.finished = true;
                self.set_state(&mut cell, TaskState::Cancelled);
                self.send(
                    &cell,
                    TaskSignal::Completed {
                        task: self.clone(),
                        completion: Completion::from_outcome(TaskOutcome::Cancelled),
                    },
                );
                HaltEffect::CancelledIdle
            }
        };

        match effect {
            HaltEffect::Nothing => false,
            HaltEffect::SignalledRun => {
                debug!(task = %self.id(), ?kind, "halt requested for running task");
                match kind {
                    CancelKind::Cancel => self.inner.work.on_cancel_requested(),
                    CancelKind::Stop => self.inner.work.on_stop_requested(),
                }
                true
            }
            HaltEffect::CancelledIdle => {
                debug!(task = %self.id(), ?kind, "idle task cancelled");
                true
            }
        }
    }

    pub(crate) fn check_associable(&self) -> Result<()> {
        let cell = self.lock_cell();
        if cell.finished {
            return Err(TaskGroupError::TaskFinished(self.id()));
        }
        if cell.association.is_some() {
            return Err(TaskGroupError::AlreadyAssociated(self.id()));
        }
        Ok(())
    }

    pub(crate) fn associate(&self, group_id: GroupId, signals: SignalSender) -> Result<()> {
        let mut cell = self.lock_cell();
        if cell.finished {
            return Err(TaskGroupError::TaskFinished(self.id()));
        }
        if cell.association.is_some() {
            return Err(TaskGroupError::AlreadyAssociated(self.id()));
        }
        cell.association = Some(Association { group_id, signals });
        cell.resume_unseen = false;
        trace!(task = %self.id(), group = %group_id, "task associated");
        Ok(())
    }

    /// Detach from `group_id`. Returns `false` if the task belongs to some
    /// other group (or none).
    pub(crate) fn disassociate(&self, group_id: GroupId) -> bool {
        let mut cell = self.lock_cell();
        match &cell.association {
            Some(a) if a.group_id == group_id => {
                cell.association = None;
                cell.resume_unseen = false;
                trace!(task = %self.id(), group = %group_id, "task disassociated");
                true
            }
            _ => false,
        }
    }

    pub(crate) fn is_member_of(&self, group_id: GroupId) -> bool {
        self.group_id() == Some(group_id)
    }

    /// Not busy, not finished and `Ready`, with any resume already
    /// applied by the group.
    pub(crate) fn is_dispatchable(&self) -> bool {
        let cell = self.lock_cell();
        !cell.busy && !cell.finished && cell.state == TaskState::Ready && !cell.resume_unseen
    }

    /// The group applied the `Paused → Ready` signal from `resume`.
    pub(crate) fn acknowledge_resume(&self) {
        self.lock_cell().resume_unseen = false;
    }

    /// `Ready → Running`. Hands out the context for the new run.
    pub(crate) fn begin_run(
        &self,
        session: &CancellationToken,
    ) -> std::result::Result<TaskContext, DispatchRefusal> {
        let mut cell = self.lock_cell();
        if cell.busy {
            return Err(DispatchRefusal::Busy);
        }
        if cell.finished {
            return Err(DispatchRefusal::Finished);
        }
        if cell.state != TaskState::Ready {
            return Err(DispatchRefusal::NotReady(cell.state));
        }
        if cell.resume_unseen {
            return Err(DispatchRefusal::ResumeUnseen);
        }
        if cell.association.is_none() {
            return Err(DispatchRefusal::NotAssociated);
        }

        cell.epoch += 1;
        cell.busy = true;
        cell.requested = None;
        // The group reports this transition itself, together with
        // `TaskStarted`, so no signal is sent here.
        cell.state = TaskState::Running;

        let cancel = session.child_token();
        let pause = CancellationToken::new();
        cell.run = Some(RunTokens {
            cancel: cancel.clone(),
            pause: pause.clone(),
        });

        Ok(TaskContext::new(self.clone(), cell.epoch, cancel, pause))
    }

    /// Undo `begin_run` after `execute` failed. Returns `false` if the run
    /// already completed (or is not the current one).
    pub(crate) fn abort_run(&self, epoch: u64) -> bool {
        let mut cell = self.lock_cell();
        if cell.epoch != epoch || !cell.busy {
            return false;
        }
        cell.epoch += 1;
        cell.busy = false;
        cell.run = None;
        cell.state = TaskState::Ready;
        true
    }

    pub(crate) fn complete_run(&self, epoch: u64, outcome: TaskOutcome) -> bool {
        let mut cell = self.lock_cell();
        if cell.epoch != epoch || !cell.busy {
            debug!(task = %self.id(), epoch, "completion for a stale run ignored");
            return false;
        }

        let completion = Completion::from_outcome(outcome);
        cell.busy = false;
        cell.run = None;
        if completion.is_paused() {
            cell.requested = None;
        } else {
            cell.finished = true;
        }

        self.set_state(&mut cell, completion.state);
        self.send(
            &cell,
            TaskSignal::Completed {
                task: self.clone(),
                completion,
            },
        );
        true
    }

    pub(crate) fn report_progress(&self, epoch: u64, percent: i32, user_state: Option<String>) {
        let mut cell = self.lock_cell();
        if cell.epoch != epoch || !cell.busy {
            return;
        }
        let percent = clamp_percent(percent);
        if cell.progress == percent && user_state.is_none() {
            return;
        }
        cell.progress = percent;
        self.send(
            &cell,
            TaskSignal::Progress {
                task: self.clone(),
                percent,
                user_state,
            },
        );
    }

    pub(crate) fn report_updated(&self, epoch: u64) {
        let cell = self.lock_cell();
        if cell.epoch != epoch {
            return;
        }
        self.send(&cell, TaskSignal::Updated { task: self.clone() });
    }

    /// Called when a context is dropped without completing.
    pub(crate) fn report_abandoned(&self, epoch: u64) {
        let cell = self.lock_cell();
        if cell.epoch != epoch || !cell.busy {
            return;
        }
        self.send(
            &cell,
            TaskSignal::Abandoned {
                task: self.clone(),
                epoch,
            },
        );
    }

    /// Fail a run whose context was lost. Stale epochs are ignored.
    pub(crate) fn fail_abandoned(&self, epoch: u64) -> bool {
        let failed = self.complete_run(
            epoch,
            TaskOutcome::Failed(anyhow!("task context dropped without completing the run")),
        );
        if failed {
            warn!(task = %self.id(), epoch, "task abandoned its run; marked failed");
        }
        failed
    }

    fn set_state(&self, cell: &mut TaskCell, new: TaskState) {
        let old = cell.state;
        if old == new {
            return;
        }
        cell.state = new;
        self.send(
            cell,
            TaskSignal::StateChanged {
                task: self.clone(),
                old,
                new,
            },
        );
    }

    fn send(&self, cell: &TaskCell, signal: TaskSignal) {
        if let Some(association) = &cell.association {
            if association.signals.send(signal).is_err() {
                trace!(task = %self.id(), "group signal channel closed");
            }
        }
    }

    fn lock_cell(&self) -> MutexGuard<'_, TaskCell> {
        self.inner
            .cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl PartialEq for TaskHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for TaskHandle {}

impl Hash for TaskHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inner.name.is_empty() {
            write!(f, "{}", self.inner.id)
        } else {
            write!(f, "{} ({})", self.inner.name, self.inner.id)
        }
    }
}
