// src/queue/mod.rs

//! Ordered event delivery.
//!
//! Events can be raised on any thread (the pump loop, caller threads doing
//! `add`/`move_*`), but the consumer must see them in one deterministic
//! order. The queue is a pair:
//!
//! - [`CommandQueue`] is the producer side. `register` stamps each event
//!   with a sequence number and pushes it onto an unbounded tokio MPSC
//!   channel under one small lock, so channel order is registration order.
//! - [`EventPump`] is the consumer side, driven by whoever owns it: an idle
//!   callback (`pump_pending`), an async task (`recv` / `run`) or a
//!   dedicated thread (`blocking_recv`).

pub mod command_queue;
pub mod event_pump;

pub use command_queue::{CommandQueue, EventWrapper};
pub use event_pump::EventPump;
