// src/task/outcome.rs

use std::sync::Arc;

use crate::types::TaskState;

/// How a run ended, as reported by the task.
#[derive(Debug)]
pub enum TaskOutcome {
    Succeeded,
    Failed(anyhow::Error),
    Cancelled,
    /// The run stopped but the task is not finished; it can be resumed.
    Paused,
}

impl TaskOutcome {
    /// State the task moves to for this outcome.
    pub fn state(&self) -> TaskState {
        match self {
            TaskOutcome::Succeeded => TaskState::Succeeded,
            TaskOutcome::Failed(_) => TaskState::Failed,
            TaskOutcome::Cancelled => TaskState::Cancelled,
            TaskOutcome::Paused => TaskState::Paused,
        }
    }
}

/// Payload of a completion: terminal (or paused) state, optional error and
/// whether the run was halted rather than finishing on its own.
#[derive(Debug, Clone)]
pub struct Completion {
    pub state: TaskState,
    pub error: Option<Arc<anyhow::Error>>,
    pub cancelled: bool,
}

impl Completion {
    pub(crate) fn from_outcome(outcome: TaskOutcome) -> Self {
        let state = outcome.state();
        let cancelled = matches!(state, TaskState::Cancelled | TaskState::Paused);
        let error = match outcome {
            TaskOutcome::Failed(err) => Some(Arc::new(err)),
            _ => None,
        };
        Self {
            state,
            error,
            cancelled,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.state == TaskState::Paused
    }
}
