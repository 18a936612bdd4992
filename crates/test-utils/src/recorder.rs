//! Collects the events a group delivers, for assertions.

use std::sync::{Arc, Mutex};

use taskgroup::{EventPump, EventWrapper, GroupEvent, TaskId, TaskState};
use tokio::task::JoinHandle;

#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<EventWrapper<GroupEvent>>>>,
}

impl EventRecorder {
    /// Subscribe to `pump`. Events are recorded whenever the pump's owner
    /// dispatches them.
    pub fn attach(pump: &mut EventPump<GroupEvent>) -> Self {
        let recorder = Self::default();
        let sink = Arc::clone(&recorder.events);
        pump.subscribe(move |wrapper| sink.lock().unwrap().push(wrapper.clone()));
        recorder
    }

    /// Attach to `pump` and run it on a tokio task.
    pub fn spawn(mut pump: EventPump<GroupEvent>) -> (Self, JoinHandle<u64>) {
        let recorder = Self::attach(&mut pump);
        let handle = tokio::spawn(pump.run());
        (recorder, handle)
    }

    pub fn events(&self) -> Vec<EventWrapper<GroupEvent>> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|w| w.event.kind())
            .collect()
    }

    pub fn seqs(&self) -> Vec<u64> {
        self.events.lock().unwrap().iter().map(|w| w.seq).collect()
    }

    /// `(task, final state)` for every `TaskCompleted`, in delivery order.
    pub fn completions(&self) -> Vec<(TaskId, TaskState)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|w| match &w.event {
                GroupEvent::TaskCompleted { task, completion } => {
                    Some((task.id(), completion.state))
                }
                _ => None,
            })
            .collect()
    }

    pub fn count<F>(&self, pred: F) -> usize
    where
        F: Fn(&GroupEvent) -> bool,
    {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|w| pred(&w.event))
            .count()
    }
}
