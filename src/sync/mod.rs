//! The sync module provides the synchronization primitives batches carry.
//!
//! - The [`event`] module provides the [`Event`](crate::Event) handle and the [`EventOp`](crate::EventOp)
//! operations recorded by `set_event`, `reset_event` and `wait_events`.
//!
//! Pipeline barriers need no object of their own. They are implemented by splitting the current batch, see
//! [`SyncCmdBuffer::pipeline_barrier`](crate::SyncCmdBuffer::pipeline_barrier).

pub mod event;
