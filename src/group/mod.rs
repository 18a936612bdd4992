// src/group/mod.rs

//! Task groups.
//!
//! The group is split the same way the rest of the crate is:
//! - [`core`] is the synchronous state machine (list, counters, flags).
//! - [`status`] and [`progress`] are the counter and progress managers the
//!   core owns.
//! - [`task_group`] is the thread-safe shell users hold, and `pump` is the
//!   scheduling loop it spawns for each execution session.
//! - [`events`] is what the group reports on its event queue.

pub mod core;
pub mod events;
pub mod progress;
mod pump;
pub mod status;
pub mod task_group;

pub use core::{CoreStep, GroupCore};
pub use events::GroupEvent;
pub use progress::GroupProgressManager;
pub use status::{Activity, GroupStatus, GroupStatusManager};
pub use task_group::{IdleHandle, TaskGroup};
