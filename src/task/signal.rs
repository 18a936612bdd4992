// src/task/signal.rs

//! Messages flowing from tasks to the pump of the group that owns them.

use tokio::sync::mpsc;

use crate::task::{Completion, TaskHandle};
use crate::types::TaskState;

pub(crate) type SignalSender = mpsc::UnboundedSender<TaskSignal>;
pub(crate) type SignalReceiver = mpsc::UnboundedReceiver<TaskSignal>;

#[derive(Debug)]
pub(crate) enum TaskSignal {
    StateChanged {
        task: TaskHandle,
        old: TaskState,
        new: TaskState,
    },
    Completed {
        task: TaskHandle,
        completion: Completion,
    },
    Progress {
        task: TaskHandle,
        percent: u8,
        user_state: Option<String>,
    },
    Updated {
        task: TaskHandle,
    },
    /// The run's context was dropped without completing.
    Abandoned {
        task: TaskHandle,
        epoch: u64,
    },
}

impl TaskSignal {
    pub(crate) fn task(&self) -> &TaskHandle {
        match self {
            TaskSignal::StateChanged { task, .. }
            | TaskSignal::Completed { task, .. }
            | TaskSignal::Progress { task, .. }
            | TaskSignal::Updated { task }
            | TaskSignal::Abandoned { task, .. } => task,
        }
    }
}
