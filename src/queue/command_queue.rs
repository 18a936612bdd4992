// src/queue/command_queue.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::queue::event_pump::EventPump;
use crate::types::GroupId;

/// One pending event invocation.
///
/// The payload is captured at registration time; `seq` is the position in
/// registration order and is strictly increasing per queue.
#[derive(Debug, Clone)]
pub struct EventWrapper<E> {
    pub source: GroupId,
    pub seq: u64,
    pub event: E,
}

#[derive(Debug)]
struct QueueInner<E> {
    next_seq: u64,
    tx: Option<mpsc::UnboundedSender<EventWrapper<E>>>,
}

/// Producer side of the ordered event channel.
#[derive(Debug)]
pub struct CommandQueue<E> {
    source: GroupId,
    inner: Mutex<QueueInner<E>>,
    disposed: Arc<AtomicBool>,
}

impl<E> CommandQueue<E> {
    /// Create a queue and its single consumer.
    pub fn new(source: GroupId) -> (Self, EventPump<E>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let disposed = Arc::new(AtomicBool::new(false));

        let queue = Self {
            source,
            inner: Mutex::new(QueueInner {
                next_seq: 0,
                tx: Some(tx),
            }),
            disposed: Arc::clone(&disposed),
        };

        (queue, EventPump::new(rx, disposed))
    }

    pub fn source(&self) -> GroupId {
        self.source
    }

    /// Append one event.
    ///
    /// Returns `false` if the queue has been disposed or the consumer is
    /// gone; the event is dropped in that case.
    pub fn register(&self, event: E) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        self.push_locked(&mut inner, event)
    }

    /// Append several events as one contiguous run.
    pub fn register_all<I>(&self, events: I) -> bool
    where
        I: IntoIterator<Item = E>,
    {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut all = true;
        for event in events {
            all &= self.push_locked(&mut inner, event);
        }
        all
    }

    fn push_locked(&self, inner: &mut QueueInner<E>, event: E) -> bool {
        let seq = inner.next_seq;
        let Some(tx) = inner.tx.as_ref() else {
            trace!(source = %self.source, "event registered on disposed queue; dropping");
            return false;
        };

        let wrapper = EventWrapper {
            source: self.source,
            seq,
            event,
        };

        if tx.send(wrapper).is_err() {
            trace!(source = %self.source, seq, "event consumer gone; dropping event");
            return false;
        }

        inner.next_seq += 1;
        true
    }

    /// Number of events accepted so far.
    pub fn registered(&self) -> u64 {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_seq
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Close the queue. Events still buffered are discarded by the pump
    /// without being delivered.
    pub fn dispose(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.tx.take().is_some() {
            self.disposed.store(true, Ordering::Release);
            debug!(source = %self.source, "command queue disposed");
        }
    }
}
