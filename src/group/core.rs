// src/group/core.rs

//! Pure group state machine.
//!
//! [`GroupCore`] owns the ordered task list, the status and progress
//! managers and the session flags. Every operation is synchronous and
//! returns a [`CoreStep`] describing the events to publish and whether the
//! pump should re-evaluate scheduling. The async shell
//! (`group::task_group::TaskGroup` and `group::pump`) holds the core behind
//! one mutex, publishes the events and runs `Task::execute` outside the
//! lock.
//!
//! The core has no channels of its own and spawns nothing, so it can be
//! unit tested without a runtime.

use std::collections::HashSet;

use tracing::{debug, info, trace};

use crate::errors::{Result, TaskGroupError};
use crate::group::events::GroupEvent;
use crate::group::progress::GroupProgressManager;
use crate::group::status::{GroupStatus, GroupStatusManager};
use crate::task::TaskHandle;
use crate::task::signal::{SignalSender, TaskSignal};
use crate::types::{GroupId, TaskId, TaskState};

/// Result of one core operation, handed back to the shell.
#[derive(Debug, Default)]
pub struct CoreStep {
    /// Events to register, in order.
    pub events: Vec<GroupEvent>,
    /// The pump should run a scheduling pass.
    pub wake: bool,
}

impl CoreStep {
    fn push(&mut self, event: GroupEvent) {
        self.events.push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && !self.wake
    }
}

#[derive(Debug)]
pub struct GroupCore {
    id: GroupId,
    list: Vec<TaskHandle>,
    /// Tasks dispatched and not yet completed, in dispatch order.
    current: Vec<TaskId>,
    /// Tasks that still count toward `remaining`.
    outstanding: HashSet<TaskId>,
    status: GroupStatusManager,
    progress: GroupProgressManager,
    executing: bool,
    cancel_requested: bool,
    disposed: bool,
}

impl GroupCore {
    pub fn new(id: GroupId, max_running: usize) -> Self {
        Self {
            id,
            list: Vec::new(),
            current: Vec::new(),
            outstanding: HashSet::new(),
            status: GroupStatusManager::new(max_running),
            progress: GroupProgressManager::new(),
            executing: false,
            cancel_requested: false,
            disposed: false,
        }
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    // ---------------------------------------------------------------------
    // Adding tasks
    // ---------------------------------------------------------------------

    /// Associate `tasks` with this group and splice them into the list at
    /// `index`. Either every task is inserted or none is.
    pub(crate) fn insert_tasks(
        &mut self,
        index: usize,
        tasks: Vec<TaskHandle>,
        signals: &SignalSender,
    ) -> Result<CoreStep> {
        self.ensure_open()?;
        if index > self.list.len() {
            return Err(TaskGroupError::IndexOutOfRange {
                name: "index",
                index,
                len: self.list.len(),
            });
        }
        if tasks.is_empty() {
            return Ok(CoreStep::default());
        }

        let mut seen = HashSet::with_capacity(tasks.len());
        for task in &tasks {
            if !seen.insert(task.id()) {
                return Err(TaskGroupError::DuplicateTask(task.id()));
            }
            task.check_associable()?;
        }

        for (done, task) in tasks.iter().enumerate() {
            if let Err(err) = task.associate(self.id, signals.clone()) {
                for earlier in &tasks[..done] {
                    earlier.disassociate(self.id);
                }
                return Err(err);
            }
        }

        let mut step = CoreStep::default();
        let mut progress_change = None;
        for task in &tasks {
            self.outstanding.insert(task.id());
            if let Some(percent) = self.progress.add(task.id(), task.weight()) {
                progress_change = Some(percent);
            }
        }
        self.status.add_remaining(tasks.len());

        debug!(
            group = %self.id,
            index,
            added = tasks.len(),
            remaining = self.status.remaining(),
            "tasks added"
        );

        let added = tasks
            .iter()
            .enumerate()
            .map(|(offset, task)| (index + offset, task.clone()))
            .collect();
        self.list.splice(index..index, tasks);

        step.push(GroupEvent::TaskAdded { tasks: added });
        if let Some(percent) = progress_change {
            step.push(GroupEvent::ProgressChanged { percent });
        }
        self.push_status(&mut step);
        step.wake = true;
        Ok(step)
    }

    // ---------------------------------------------------------------------
    // Session lifecycle
    // ---------------------------------------------------------------------

    pub fn can_begin_execution(&self) -> bool {
        !self.disposed && !self.executing && self.status.remaining() > 0
    }

    pub fn begin_execution(&mut self) -> CoreStep {
        self.executing = true;
        self.cancel_requested = false;
        info!(
            group = %self.id,
            remaining = self.status.remaining(),
            max_running = self.status.max_running(),
            "execution session started"
        );

        let mut step = CoreStep::default();
        step.push(GroupEvent::Started);
        self.push_status(&mut step);
        step.wake = true;
        step
    }

    /// Set the one-shot cancellation flag. Returns the tasks to forward the
    /// request to, or `None` if the group is not executing or cancellation
    /// was already requested.
    pub fn request_cancel(&mut self) -> Result<Option<Vec<TaskHandle>>> {
        self.ensure_not_disposed()?;
        if !self.executing || self.cancel_requested {
            return Ok(None);
        }
        self.cancel_requested = true;
        let tasks = self
            .list
            .iter()
            .filter(|t| self.outstanding.contains(&t.id()))
            .cloned()
            .collect::<Vec<_>>();
        info!(group = %self.id, tasks = tasks.len(), "cancellation requested");
        Ok(Some(tasks))
    }

    /// End the session once nothing remains. Returns the closing events.
    pub fn finish_if_done(&mut self) -> Option<CoreStep> {
        if !self.executing || self.status.remaining() > 0 || !self.current.is_empty() {
            return None;
        }

        self.executing = false;
        self.cancel_requested = false;
        self.outstanding.clear();
        self.status.reset();
        self.progress.reset();
        info!(
            group = %self.id,
            completed = self.status.completed(),
            "execution session finished"
        );

        let mut step = CoreStep::default();
        step.push(GroupEvent::Stopped);
        self.push_status(&mut step);
        Some(step)
    }

    // ---------------------------------------------------------------------
    // Dispatch
    // ---------------------------------------------------------------------

    /// First dispatchable task in list order, if the ceiling admits it. The
    /// returned task holds a pending reservation until `task_started` or
    /// `dispatch_refused`.
    pub fn select_next(&mut self, skip: &HashSet<TaskId>) -> Option<TaskHandle> {
        if !self.executing || self.cancel_requested || self.disposed {
            return None;
        }
        let candidate = self
            .list
            .iter()
            .find(|t| !skip.contains(&t.id()) && t.is_dispatchable())?
            .clone();
        if self.status.register_pending(candidate.id()) {
            Some(candidate)
        } else {
            trace!(group = %self.id, running = self.status.running(), "ceiling reached");
            None
        }
    }

    pub fn task_started(&mut self, task: &TaskHandle) -> CoreStep {
        self.status.drop_pending(task.id());
        self.current.push(task.id());
        self.status.increment_running();
        debug!(
            group = %self.id,
            task = %task,
            running = self.status.running(),
            "task dispatched"
        );

        let mut step = CoreStep::default();
        step.push(GroupEvent::TaskStateChanged {
            task: task.clone(),
            old: TaskState::Ready,
            new: TaskState::Running,
        });
        self.push_status(&mut step);
        step
    }

    /// `execute` accepted the run. Emitted separately from `task_started`
    /// so a rolled-back dispatch never reports `TaskStarted`.
    pub fn execution_accepted(&mut self, task: &TaskHandle) -> CoreStep {
        let mut step = CoreStep::default();
        if self.current.contains(&task.id()) {
            step.push(GroupEvent::TaskStarted { task: task.clone() });
        }
        step
    }

    pub fn dispatch_refused(&mut self, task: &TaskHandle) {
        self.status.drop_pending(task.id());
    }

    /// Roll back a dispatch whose `execute` failed.
    pub fn dispatch_failed(&mut self, task: &TaskHandle) -> CoreStep {
        let mut step = CoreStep::default();
        let Some(pos) = self.current.iter().position(|id| *id == task.id()) else {
            return step;
        };
        self.current.remove(pos);
        self.status.decrement_running();

        step.push(GroupEvent::TaskStateChanged {
            task: task.clone(),
            old: TaskState::Running,
            new: TaskState::Ready,
        });
        self.push_status(&mut step);
        step
    }

    // ---------------------------------------------------------------------
    // Task signals
    // ---------------------------------------------------------------------

    pub(crate) fn apply_signal(&mut self, signal: TaskSignal) -> CoreStep {
        let mut step = CoreStep::default();
        if !signal.task().is_member_of(self.id) {
            trace!(group = %self.id, task = %signal.task(), "signal from non-member ignored");
            return step;
        }

        match signal {
            TaskSignal::StateChanged { task, old, new } => {
                if old == TaskState::Paused && new == TaskState::Ready {
                    task.acknowledge_resume();
                    debug!(group = %self.id, task = %task, "paused task back to ready");
                    step.wake = true;
                }
                step.push(GroupEvent::TaskStateChanged { task, old, new });
            }
            TaskSignal::Progress {
                task,
                percent,
                user_state,
            } => {
                let id = task.id();
                step.push(GroupEvent::TaskProgressChanged {
                    task,
                    percent,
                    user_state,
                });
                if let Some(percent) = self.progress.update(id, i32::from(percent)) {
                    step.push(GroupEvent::ProgressChanged { percent });
                }
            }
            TaskSignal::Updated { task } => {
                step.push(GroupEvent::TaskUpdated { task });
            }
            TaskSignal::Completed { task, completion } => {
                let id = task.id();
                self.status.suspend_update(true);
                self.status.drop_pending(id);

                if let Some(pos) = self.current.iter().position(|c| *c == id) {
                    self.current.remove(pos);
                    if !completion.cancelled {
                        self.status.increment_completed();
                    }
                    self.status.decrement_running();
                }

                let mut progress_change = None;
                if !completion.is_paused() {
                    if self.outstanding.remove(&id) {
                        self.status.decrement_remaining();
                    }
                    if completion.state == TaskState::Succeeded {
                        progress_change = self.progress.update(id, 100);
                    }
                    task.disassociate(self.id);
                }

                debug!(
                    group = %self.id,
                    task = %task,
                    state = %completion.state,
                    running = self.status.running(),
                    remaining = self.status.remaining(),
                    "task completed"
                );

                step.push(GroupEvent::TaskCompleted { task, completion });
                if let Some(percent) = progress_change {
                    step.push(GroupEvent::ProgressChanged { percent });
                }
                self.status.suspend_update(false);
                self.push_status(&mut step);
                step.wake = true;
            }
            TaskSignal::Abandoned { task, epoch } => {
                // The resulting completion arrives as its own signal.
                task.fail_abandoned(epoch);
            }
        }
        step
    }

    // ---------------------------------------------------------------------
    // Collection operations
    // ---------------------------------------------------------------------

    pub fn move_index(&mut self, dest: usize, src: usize) -> Result<CoreStep> {
        self.move_indices(dest, &[src])
    }

    /// Move the tasks at `sources` (kept in their relative order) so they
    /// start at `dest`, counted in the list with those tasks removed.
    pub fn move_indices(&mut self, dest: usize, sources: &[usize]) -> Result<CoreStep> {
        self.ensure_not_disposed()?;
        let len = self.list.len();
        if dest > len {
            return Err(TaskGroupError::IndexOutOfRange {
                name: "dest",
                index: dest,
                len,
            });
        }

        let mut moved = sources.to_vec();
        moved.sort_unstable();
        moved.dedup();
        if let Some(&bad) = moved.iter().find(|&&i| i >= len) {
            return Err(TaskGroupError::IndexOutOfRange {
                name: "source",
                index: bad,
                len,
            });
        }
        if moved.is_empty() {
            return Ok(CoreStep::default());
        }

        let moving: HashSet<usize> = moved.iter().copied().collect();
        let mut order: Vec<usize> = (0..len).filter(|i| !moving.contains(i)).collect();
        let at = dest.min(order.len());
        order.splice(at..at, moved);
        Ok(self.apply_order(order))
    }

    pub fn move_task(&mut self, dest: usize, task: &TaskHandle) -> Result<CoreStep> {
        self.move_tasks(dest, std::slice::from_ref(task))
    }

    /// Tasks not in this group are ignored; if none is found nothing moves.
    pub fn move_tasks(&mut self, dest: usize, tasks: &[TaskHandle]) -> Result<CoreStep> {
        self.ensure_not_disposed()?;
        let sources: Vec<usize> = tasks.iter().filter_map(|t| self.index_of(t)).collect();
        if sources.is_empty() {
            return Ok(CoreStep::default());
        }
        self.move_indices(dest, &sources)
    }

    pub fn reverse(&mut self) -> Result<CoreStep> {
        self.ensure_not_disposed()?;
        let order = (0..self.list.len()).rev().collect();
        Ok(self.apply_order(order))
    }

    /// `order[new] = old`.
    fn apply_order(&mut self, order: Vec<usize>) -> CoreStep {
        let mut step = CoreStep::default();
        if order.iter().enumerate().all(|(new, &old)| new == old) {
            return step;
        }

        let old = std::mem::take(&mut self.list);
        self.list = order.iter().map(|&i| old[i].clone()).collect();
        debug!(group = %self.id, tasks = self.list.len(), "tasks reordered");

        step.push(GroupEvent::Reordered { new_order: order });
        step.wake = true;
        step
    }

    /// Remove a task that is not running. `Ok(None)` if it is not in the
    /// list.
    pub fn remove(&mut self, task: &TaskHandle) -> Result<Option<CoreStep>> {
        self.ensure_not_disposed()?;
        let Some(index) = self.index_of(task) else {
            return Ok(None);
        };
        if task.is_busy() {
            return Err(TaskGroupError::TaskBusy(task.id()));
        }

        let id = task.id();
        task.disassociate(self.id);
        let task = self.list.remove(index);
        self.status.drop_pending(id);
        if self.outstanding.remove(&id) {
            self.status.decrement_remaining();
        }
        let progress_change = self.progress.remove(id);
        debug!(group = %self.id, task = %task, index, "task removed");

        let mut step = CoreStep::default();
        step.push(GroupEvent::TaskRemoved { index, task });
        if let Some(percent) = progress_change {
            step.push(GroupEvent::ProgressChanged { percent });
        }
        self.push_status(&mut step);
        step.wake = true;
        Ok(Some(step))
    }

    pub fn set_max_running(&mut self, max_running: usize) -> Result<CoreStep> {
        self.ensure_not_disposed()?;
        self.status.set_max_running(max_running);
        let mut step = CoreStep::default();
        self.push_status(&mut step);
        step.wake = true;
        Ok(step)
    }

    /// Detach every task and close the group for good. Refused while a
    /// session is executing. Returns `false` if already disposed.
    pub fn dispose(&mut self) -> Result<bool> {
        if self.disposed {
            return Ok(false);
        }
        if self.executing {
            return Err(TaskGroupError::Busy);
        }
        for task in &self.list {
            task.disassociate(self.id);
        }
        self.list.clear();
        self.current.clear();
        self.outstanding.clear();
        self.progress.reset();
        self.disposed = true;
        info!(group = %self.id, "task group disposed");
        Ok(true)
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn get(&self, index: usize) -> Result<TaskHandle> {
        self.list
            .get(index)
            .cloned()
            .ok_or(TaskGroupError::IndexOutOfRange {
                name: "index",
                index,
                len: self.list.len(),
            })
    }

    pub fn index_of(&self, task: &TaskHandle) -> Option<usize> {
        self.list.iter().position(|t| t == task)
    }

    pub fn contains(&self, task: &TaskHandle) -> bool {
        self.index_of(task).is_some()
    }

    pub fn tasks(&self) -> Vec<TaskHandle> {
        self.list.clone()
    }

    /// Copy the list into `dest` starting at `index`.
    pub fn copy_to(&self, dest: &mut [Option<TaskHandle>], index: usize) -> Result<()> {
        if index > dest.len() {
            return Err(TaskGroupError::IndexOutOfRange {
                name: "index",
                index,
                len: dest.len(),
            });
        }
        let room = dest.len() - index;
        if room < self.list.len() {
            return Err(TaskGroupError::IndexOutOfRange {
                name: "destination length",
                index: index + self.list.len(),
                len: dest.len(),
            });
        }
        for (slot, task) in dest[index..].iter_mut().zip(&self.list) {
            *slot = Some(task.clone());
        }
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.list.len()
    }

    pub fn status(&self) -> GroupStatus {
        self.status.snapshot()
    }

    pub fn progress(&self) -> f64 {
        self.progress.aggregate()
    }

    pub fn is_executing(&self) -> bool {
        self.executing
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn ensure_not_disposed(&self) -> Result<()> {
        if self.disposed {
            return Err(TaskGroupError::Disposed);
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        self.ensure_not_disposed()?;
        if self.cancel_requested {
            return Err(TaskGroupError::CancellationRequested);
        }
        Ok(())
    }

    fn push_status(&mut self, step: &mut CoreStep) {
        if let Some(status) = self.status.take_status_change() {
            step.push(GroupEvent::StatusChanged { status });
        }
    }
}
