// src/group/task_group.rs

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::{Notify, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::model::GroupSection;
use crate::errors::{Result, TaskGroupError};
use crate::group::core::{CoreStep, GroupCore};
use crate::group::events::GroupEvent;
use crate::group::pump::run_pump;
use crate::group::status::GroupStatus;
use crate::queue::{CommandQueue, EventPump};
use crate::task::TaskHandle;
use crate::task::signal::{SignalReceiver, SignalSender};
use crate::types::{CancelKind, GroupId};

/// Thread-safe, ordered, bounded-concurrency collection of tasks.
///
/// Cloning a `TaskGroup` yields another handle to the same group. Adding a
/// task starts an execution session if none is active; a session ends once
/// no task remains outstanding. Events are registered on the group's
/// [`CommandQueue`] and consumed through the [`EventPump`] returned by
/// [`take_event_pump`](Self::take_event_pump).
#[derive(Clone)]
pub struct TaskGroup {
    inner: Arc<GroupInner>,
}

pub(crate) struct GroupInner {
    pub(crate) id: GroupId,
    pub(crate) state: Mutex<GroupState>,
    events: CommandQueue<GroupEvent>,
    event_pump: Mutex<Option<EventPump<GroupEvent>>>,
    /// Set once the event pump has been handed out. Until then events are
    /// not registered, so a group nobody listens to buffers nothing.
    consumer_attached: AtomicBool,
    signals: SignalSender,
    pub(crate) wake: Notify,
    /// Bumped on every wake request, so the pump can tell a fresh request
    /// from a permit left over from its own pass.
    pub(crate) wake_seq: AtomicU64,
    pub(crate) idle: watch::Sender<bool>,
    runtime: Handle,
}

pub(crate) struct GroupState {
    pub(crate) core: GroupCore,
    /// Parked here while no pump is running.
    pub(crate) signal_rx: Option<SignalReceiver>,
    pub(crate) session: Option<CancellationToken>,
}

impl GroupInner {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, GroupState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register the step's events and poke the pump if asked to. Callers
    /// hold the state lock so that queue order matches state order.
    pub(crate) fn publish(&self, step: CoreStep) {
        if !step.events.is_empty()
            && self.consumer_attached.load(Ordering::Acquire)
            && !self.events.register_all(step.events)
        {
            debug!(group = %self.id, "event queue closed; events dropped");
        }
        if step.wake {
            self.wake_pump();
        }
    }

    pub(crate) fn wake_pump(&self) {
        self.wake_seq.fetch_add(1, Ordering::AcqRel);
        self.wake.notify_one();
    }
}

/// Resolves when a group has no execution session.
#[derive(Debug, Clone)]
pub struct IdleHandle {
    rx: watch::Receiver<bool>,
}

impl IdleHandle {
    pub fn is_idle(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the group is idle. Returns immediately if it already is.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as the group, so this only errors if
        // every group handle was dropped; treat that as idle.
        let _ = rx.wait_for(|idle| *idle).await;
    }
}

impl fmt::Debug for TaskGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("TaskGroup")
            .field("id", &self.inner.id)
            .field("count", &state.core.count())
            .field("status", &state.core.status())
            .finish_non_exhaustive()
    }
}

impl TaskGroup {
    /// Create a group driven by the current tokio runtime.
    pub fn new(max_running_tasks: usize) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| TaskGroupError::NoRuntime)?;
        Ok(Self::with_runtime(max_running_tasks, runtime))
    }

    /// Create a group whose pump runs on `runtime`.
    pub fn with_runtime(max_running_tasks: usize, runtime: Handle) -> Self {
        let id = GroupId::next();
        let (events, event_pump) = CommandQueue::new(id);
        let (signals, signal_rx) = mpsc::unbounded_channel();
        let (idle, _) = watch::channel(true);

        debug!(group = %id, max_running_tasks, "task group created");

        Self {
            inner: Arc::new(GroupInner {
                id,
                state: Mutex::new(GroupState {
                    core: GroupCore::new(id, max_running_tasks),
                    signal_rx: Some(signal_rx),
                    session: None,
                }),
                events,
                event_pump: Mutex::new(Some(event_pump)),
                consumer_attached: AtomicBool::new(false),
                signals,
                wake: Notify::new(),
                wake_seq: AtomicU64::new(0),
                idle,
                runtime,
            }),
        }
    }

    pub fn from_config(section: &GroupSection) -> Result<Self> {
        Self::new(section.max_running_tasks)
    }

    pub fn id(&self) -> GroupId {
        self.inner.id
    }

    /// Hand out the consumer side of the event queue. Only the first call
    /// returns `Some`.
    ///
    /// Events are recorded from this call on; whatever happened before it
    /// is not replayed. Dropping the pump stops recording again.
    pub fn take_event_pump(&self) -> Option<EventPump<GroupEvent>> {
        // Under the state lock so the first recorded event follows a
        // consistent state.
        let _state = self.inner.lock_state();
        let pump = self
            .inner
            .event_pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if pump.is_some() {
            self.inner.consumer_attached.store(true, Ordering::Release);
        }
        pump
    }

    /// Events registered so far. Stays at zero until
    /// [`take_event_pump`](Self::take_event_pump) is called.
    pub fn events_registered(&self) -> u64 {
        self.inner.events.registered()
    }

    pub fn idle_handle(&self) -> IdleHandle {
        IdleHandle {
            rx: self.inner.idle.subscribe(),
        }
    }

    // ---------------------------------------------------------------------
    // Adding tasks
    // ---------------------------------------------------------------------

    pub fn add(&self, task: TaskHandle) -> Result<()> {
        self.add_range(vec![task])
    }

    pub fn add_range(&self, tasks: impl IntoIterator<Item = TaskHandle>) -> Result<()> {
        let tasks: Vec<_> = tasks.into_iter().collect();
        {
            let mut state = self.inner.lock_state();
            let index = state.core.count();
            let step = state.core.insert_tasks(index, tasks, &self.inner.signals)?;
            self.inner.publish(step);
        }
        self.execute();
        Ok(())
    }

    pub fn insert(&self, index: usize, task: TaskHandle) -> Result<()> {
        self.insert_range(index, vec![task])
    }

    pub fn insert_range(
        &self,
        index: usize,
        tasks: impl IntoIterator<Item = TaskHandle>,
    ) -> Result<()> {
        let tasks: Vec<_> = tasks.into_iter().collect();
        {
            let mut state = self.inner.lock_state();
            let step = state.core.insert_tasks(index, tasks, &self.inner.signals)?;
            self.inner.publish(step);
        }
        self.execute();
        Ok(())
    }

    /// Start an execution session if one is not already running and there
    /// is work. Returns whether a session was started.
    fn execute(&self) -> bool {
        let (rx, session) = {
            let mut state = self.inner.lock_state();
            if !state.core.can_begin_execution() {
                return false;
            }
            let Some(rx) = state.signal_rx.take() else {
                return false;
            };
            let session = CancellationToken::new();
            state.session = Some(session.clone());
            let step = state.core.begin_execution();
            self.inner.idle.send_replace(false);
            self.inner.publish(step);
            (rx, session)
        };

        self.inner
            .runtime
            .spawn(run_pump(Arc::clone(&self.inner), rx, session));
        true
    }

    // ---------------------------------------------------------------------
    // Cancellation
    // ---------------------------------------------------------------------

    /// Cancel the running session. Returns `false` if the group is not
    /// executing or cancellation was already requested.
    pub fn cancel(&self) -> Result<bool> {
        self.halt(CancelKind::Cancel)
    }

    /// Like [`cancel`](Self::cancel), but asks running tasks to stop.
    pub fn stop(&self) -> Result<bool> {
        self.halt(CancelKind::Stop)
    }

    fn halt(&self, kind: CancelKind) -> Result<bool> {
        let (tasks, session) = {
            let mut state = self.inner.lock_state();
            let Some(tasks) = state.core.request_cancel()? else {
                return Ok(false);
            };
            (tasks, state.session.clone())
        };

        info!(group = %self.inner.id, ?kind, tasks = tasks.len(), "halting task group");
        for task in &tasks {
            match kind {
                CancelKind::Cancel => task.cancel(),
                CancelKind::Stop => task.stop(),
            };
        }
        if let Some(session) = session {
            session.cancel();
        }
        self.inner.wake_pump();
        Ok(true)
    }

    /// Resume a paused task that belongs to this group.
    ///
    /// The task's state changes under the group lock, so a scheduling pass
    /// never observes it half way.
    pub fn resume(&self, task: &TaskHandle) -> Result<bool> {
        let state = self.inner.lock_state();
        if state.core.is_disposed() {
            return Err(TaskGroupError::Disposed);
        }
        if !state.core.contains(task) {
            return Ok(false);
        }
        Ok(task.resume())
    }

    /// Detach every task and close the event queue. Fails with
    /// [`TaskGroupError::Busy`] while a session is running.
    pub fn dispose(&self) -> Result<()> {
        let disposed = self.inner.lock_state().core.dispose()?;
        if disposed {
            self.inner.events.dispose();
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Collection operations
    // ---------------------------------------------------------------------

    pub fn move_index(&self, dest: usize, src: usize) -> Result<()> {
        self.mutate(|core| core.move_index(dest, src))
    }

    pub fn move_indices(&self, dest: usize, sources: &[usize]) -> Result<()> {
        self.mutate(|core| core.move_indices(dest, sources))
    }

    pub fn move_task(&self, dest: usize, task: &TaskHandle) -> Result<()> {
        self.mutate(|core| core.move_task(dest, task))
    }

    pub fn move_tasks(&self, dest: usize, tasks: &[TaskHandle]) -> Result<()> {
        self.mutate(|core| core.move_tasks(dest, tasks))
    }

    pub fn reverse(&self) -> Result<()> {
        self.mutate(GroupCore::reverse)
    }

    /// Remove a task that is not running. Returns `false` if the task is
    /// not in this group.
    pub fn remove(&self, task: &TaskHandle) -> Result<bool> {
        let mut state = self.inner.lock_state();
        match state.core.remove(task)? {
            Some(step) => {
                self.inner.publish(step);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn set_max_running_tasks(&self, max_running_tasks: usize) -> Result<()> {
        self.mutate(|core| core.set_max_running(max_running_tasks))
    }

    fn mutate<F>(&self, op: F) -> Result<()>
    where
        F: FnOnce(&mut GroupCore) -> Result<CoreStep>,
    {
        let mut state = self.inner.lock_state();
        let step = op(&mut state.core)?;
        self.inner.publish(step);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn get(&self, index: usize) -> Result<TaskHandle> {
        self.inner.lock_state().core.get(index)
    }

    pub fn index_of(&self, task: &TaskHandle) -> Option<usize> {
        self.inner.lock_state().core.index_of(task)
    }

    pub fn contains(&self, task: &TaskHandle) -> bool {
        self.inner.lock_state().core.contains(task)
    }

    /// Snapshot of the list in order.
    pub fn tasks(&self) -> Vec<TaskHandle> {
        self.inner.lock_state().core.tasks()
    }

    pub fn copy_to(&self, dest: &mut [Option<TaskHandle>], index: usize) -> Result<()> {
        self.inner.lock_state().core.copy_to(dest, index)
    }

    pub fn count(&self) -> usize {
        self.inner.lock_state().core.count()
    }

    pub fn max_running_tasks(&self) -> usize {
        self.status().max_running
    }

    pub fn running_tasks(&self) -> usize {
        self.status().running
    }

    pub fn remaining_tasks(&self) -> usize {
        self.status().remaining
    }

    pub fn completed_tasks(&self) -> usize {
        self.status().completed
    }

    pub fn status(&self) -> GroupStatus {
        self.inner.lock_state().core.status()
    }

    /// Weighted aggregate progress of the current session, in percent.
    pub fn progress(&self) -> f64 {
        self.inner.lock_state().core.progress()
    }

    /// True while an execution session is active.
    pub fn is_busy(&self) -> bool {
        self.inner.lock_state().core.is_executing()
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.inner.lock_state().core.is_cancel_requested()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.lock_state().core.is_disposed()
    }
}
