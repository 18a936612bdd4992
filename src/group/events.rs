// src/group/events.rs

use crate::group::status::GroupStatus;
use crate::task::{Completion, TaskHandle};
use crate::types::TaskState;

/// Outward notification registered on a group's event queue.
///
/// Payloads are captured when the event is registered, so a consumer that
/// drains the queue later still sees the values as they were at that point.
#[derive(Debug, Clone)]
pub enum GroupEvent {
    /// Tasks inserted, each with the list index it landed on.
    TaskAdded { tasks: Vec<(usize, TaskHandle)> },
    TaskRemoved { index: usize, task: TaskHandle },
    TaskStarted { task: TaskHandle },
    TaskCompleted {
        task: TaskHandle,
        completion: Completion,
    },
    TaskUpdated { task: TaskHandle },
    TaskStateChanged {
        task: TaskHandle,
        old: TaskState,
        new: TaskState,
    },
    TaskProgressChanged {
        task: TaskHandle,
        percent: u8,
        user_state: Option<String>,
    },
    /// An execution session began.
    Started,
    /// The session drained; the group is idle again.
    Stopped,
    /// Aggregate progress, rounded to whole percent.
    ProgressChanged { percent: u8 },
    StatusChanged { status: GroupStatus },
    /// List order changed. `new_order[new_index] == old_index`.
    Reordered { new_order: Vec<usize> },
}

impl GroupEvent {
    /// Short, stable name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            GroupEvent::TaskAdded { .. } => "task_added",
            GroupEvent::TaskRemoved { .. } => "task_removed",
            GroupEvent::TaskStarted { .. } => "task_started",
            GroupEvent::TaskCompleted { .. } => "task_completed",
            GroupEvent::TaskUpdated { .. } => "task_updated",
            GroupEvent::TaskStateChanged { .. } => "task_state_changed",
            GroupEvent::TaskProgressChanged { .. } => "task_progress_changed",
            GroupEvent::Started => "started",
            GroupEvent::Stopped => "stopped",
            GroupEvent::ProgressChanged { .. } => "progress_changed",
            GroupEvent::StatusChanged { .. } => "status_changed",
            GroupEvent::Reordered { .. } => "reordered",
        }
    }

    /// The task this event is about, if any.
    pub fn task(&self) -> Option<&TaskHandle> {
        match self {
            GroupEvent::TaskRemoved { task, .. }
            | GroupEvent::TaskStarted { task }
            | GroupEvent::TaskCompleted { task, .. }
            | GroupEvent::TaskUpdated { task }
            | GroupEvent::TaskStateChanged { task, .. }
            | GroupEvent::TaskProgressChanged { task, .. } => Some(task),
            _ => None,
        }
    }
}
