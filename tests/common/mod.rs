#![allow(dead_code)]

pub use taskgroup_test_utils::{
    ConcurrencyProbe, EventRecorder, FlakyTask, ManualControl, ManualTask, ProbeTask,
    eventually, init_tracing, with_timeout,
};

use std::error::Error;

use taskgroup::TaskGroup;
use tokio::task::JoinHandle;

pub type TestResult = Result<(), Box<dyn Error>>;

/// New group on the current runtime with its events recorded by a spawned
/// pump.
pub fn recorded_group(max_running: usize) -> (TaskGroup, EventRecorder, JoinHandle<u64>) {
    let group = TaskGroup::new(max_running).expect("tests run inside a tokio runtime");
    let pump = group.take_event_pump().expect("fresh group has its pump");
    let (recorder, handle) = EventRecorder::spawn(pump);
    (group, recorder, handle)
}
