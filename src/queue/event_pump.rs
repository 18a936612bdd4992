// src/queue/event_pump.rs

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::queue::command_queue::EventWrapper;

type Subscriber<E> = Box<dyn FnMut(&EventWrapper<E>) + Send>;

/// Consumer side of a [`CommandQueue`](crate::queue::CommandQueue).
///
/// Whoever owns the pump decides which thread events are delivered on.
/// Subscribers are invoked in subscription order for every event, and
/// events are delivered strictly in registration order.
pub struct EventPump<E> {
    rx: mpsc::UnboundedReceiver<EventWrapper<E>>,
    disposed: Arc<AtomicBool>,
    subscribers: Vec<Subscriber<E>>,
    delivered: u64,
}

impl<E> std::fmt::Debug for EventPump<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPump")
            .field("subscribers", &self.subscribers.len())
            .field("delivered", &self.delivered)
            .finish_non_exhaustive()
    }
}

impl<E> EventPump<E> {
    pub(crate) fn new(
        rx: mpsc::UnboundedReceiver<EventWrapper<E>>,
        disposed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            rx,
            disposed,
            subscribers: Vec::new(),
            delivered: 0,
        }
    }

    /// Add a handler invoked for every event this pump dispatches.
    pub fn subscribe<F>(&mut self, handler: F)
    where
        F: FnMut(&EventWrapper<E>) + Send + 'static,
    {
        self.subscribers.push(Box::new(handler));
    }

    /// Number of events handed out so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<EventWrapper<E>> {
        if self.is_disposed() {
            self.discard_remaining();
            return None;
        }
        let wrapper = self.rx.try_recv().ok()?;
        self.delivered += 1;
        Some(wrapper)
    }

    /// Wait for the next event. Returns `None` once the queue is disposed or
    /// every producer is gone.
    pub async fn recv(&mut self) -> Option<EventWrapper<E>> {
        let wrapper = self.rx.recv().await;
        self.accept(wrapper)
    }

    /// Blocking variant of [`recv`](Self::recv) for a dedicated consumer
    /// thread. Must not be called from inside an async context.
    pub fn blocking_recv(&mut self) -> Option<EventWrapper<E>> {
        let wrapper = self.rx.blocking_recv();
        self.accept(wrapper)
    }

    fn accept(&mut self, wrapper: Option<EventWrapper<E>>) -> Option<EventWrapper<E>> {
        if self.is_disposed() {
            self.discard_remaining();
            return None;
        }
        let wrapper = wrapper?;
        self.delivered += 1;
        Some(wrapper)
    }

    /// Deliver every event that is queued right now to the subscribers and
    /// return how many were delivered. Never blocks.
    pub fn pump_pending(&mut self) -> usize {
        let mut count = 0;
        while let Some(wrapper) = self.try_recv() {
            self.dispatch(&wrapper);
            count += 1;
        }
        count
    }

    /// Deliver events to the subscribers until the queue closes.
    pub async fn run(mut self) -> u64 {
        while let Some(wrapper) = self.recv().await {
            self.dispatch(&wrapper);
        }
        debug!(delivered = self.delivered, "event pump finished");
        self.delivered
    }

    /// Invoke every subscriber for one event.
    pub fn dispatch(&mut self, wrapper: &EventWrapper<E>) {
        for subscriber in self.subscribers.iter_mut() {
            let result = catch_unwind(AssertUnwindSafe(|| subscriber(wrapper)));
            if result.is_err() {
                warn!(
                    source = %wrapper.source,
                    seq = wrapper.seq,
                    "event subscriber panicked; continuing with the next one"
                );
            }
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn discard_remaining(&mut self) -> usize {
        let mut discarded = 0;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!(discarded, "discarded events left in disposed queue");
        }
        discarded
    }
}
