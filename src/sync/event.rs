//! Events are binary flags that batches set, reset and wait on.
//!
//! The host side status of an event is only meaningful once every batch referencing it has executed. While
//! recording, an event is only ever referenced through an [`EventOp`] attached to a batch, so its transitions are
//! ordered by the position of that batch in the submission.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct EventInner {
    id: u64,
    signaled: AtomicBool,
}

/// Shared handle to an event. Clones refer to the same event.
///
/// # Example
/// ```
/// # use panbatch::prelude::*;
/// let event = Event::new();
/// assert!(!event.is_set());
/// event.set();
/// assert!(event.clone().is_set());
/// ```
#[derive(Debug, Clone)]
pub struct Event {
    inner: Arc<EventInner>,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Event {}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

impl Event {
    /// Create a new event in the reset state.
    pub fn new() -> Self {
        let id = NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "log-objects")]
        trace!("Created event {}", id);
        Self {
            inner: Arc::new(EventInner {
                id,
                signaled: AtomicBool::new(false),
            }),
        }
    }

    /// Unique id of this event, for logging.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Signal the event from the host.
    pub fn set(&self) {
        self.inner.signaled.store(true, Ordering::Release);
    }

    /// Reset the event from the host.
    pub fn reset(&self) {
        self.inner.signaled.store(false, Ordering::Release);
    }

    /// Whether the event is signaled.
    pub fn is_set(&self) -> bool {
        self.inner.signaled.load(Ordering::Acquire)
    }
}

/// An event operation attached to a batch. Set and reset operations execute after every job of their batch,
/// wait operations before any of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOp {
    /// Signal the event.
    Set(Event),
    /// Reset the event.
    Reset(Event),
    /// Wait until the event is signaled.
    Wait(Event),
}

impl EventOp {
    /// The event this operation acts on.
    pub fn event(&self) -> &Event {
        match self {
            EventOp::Set(event) | EventOp::Reset(event) | EventOp::Wait(event) => event,
        }
    }

    /// Whether this is a wait operation.
    pub fn is_wait(&self) -> bool {
        matches!(self, EventOp::Wait(_))
    }

    /// Apply a set or reset operation to the host side status, as the kernel does once the batch completes.
    /// Wait operations have no effect.
    pub fn apply(&self) {
        match self {
            EventOp::Set(event) => event.set(),
            EventOp::Reset(event) => event.reset(),
            EventOp::Wait(_) => {}
        }
    }
}
