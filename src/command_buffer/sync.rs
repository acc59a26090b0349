//! Synchronization commands. Ordering between batches is the only ordering the hardware gives us, so barriers
//! and events are implemented by placing batch boundaries.

use anyhow::Result;
use ash::vk;

use crate::allocator::traits::SlabAllocator;
use crate::command_buffer::traits::SyncCmdBuffer;
use crate::command_buffer::CommandBuffer;
use crate::sync::event::{Event, EventOp};

impl<A: SlabAllocator> CommandBuffer<A> {
    /// Attach a set or reset operation behind every job recorded so far. The batch holding it is closed, so
    /// later jobs land in the next batch.
    fn add_signal_op(&mut self, op: EventOp) -> Result<()> {
        match &mut self.cur_batch {
            None => {
                self.open_batch_inner()?;
                self.with_batch(|_, batch| {
                    batch.event_ops.push(op);
                    Ok(())
                })?;
                self.close_batch_inner()
            }
            Some(batch) => {
                batch.event_ops.push(op);
                self.split_batch()
            }
        }
    }

    /// Attach a wait operation in front of every job recorded from now on.
    fn add_wait_op(&mut self, op: EventOp) -> Result<()> {
        let has_work = self
            .cur_batch
            .as_ref()
            .map(|batch| batch.has_fragment_job() || !batch.jobs.is_empty());
        match has_work {
            None => self.open_batch_inner()?,
            // The wait must not hold back work that was recorded before it.
            Some(true) => self.split_batch()?,
            Some(false) => {}
        }
        self.with_batch(|_, batch| {
            batch.event_ops.push(op);
            Ok(())
        })
    }
}

impl<A: SlabAllocator> SyncCmdBuffer for CommandBuffer<A> {
    fn pipeline_barrier(&mut self, _info: &vk::DependencyInfo) -> Result<&mut Self> {
        // Caches are flushed at batch boundaries, so a new batch covers every barrier.
        self.record(|cmd| {
            if cmd.cur_batch.is_some() {
                cmd.split_batch()?;
            }
            Ok(())
        })
    }

    fn set_event(&mut self, event: &Event) -> Result<&mut Self> {
        self.record(|cmd| cmd.add_signal_op(EventOp::Set(event.clone())))
    }

    fn reset_event(&mut self, event: &Event) -> Result<&mut Self> {
        self.record(|cmd| cmd.add_signal_op(EventOp::Reset(event.clone())))
    }

    fn wait_events(&mut self, events: &[Event]) -> Result<&mut Self> {
        self.record(|cmd| {
            events
                .iter()
                .try_for_each(|event| cmd.add_wait_op(EventOp::Wait(event.clone())))
        })
    }
}
