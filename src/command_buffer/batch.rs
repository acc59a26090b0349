//! Batches are the unit of submission: one job chain, the fragment jobs rendering its framebuffer, the
//! storage it needs, and the event operations ordered around it.
//!
//! A batch is built while open on a command buffer and never changes after it is closed.

use crate::allocator::arena::PoolPtr;
use crate::command_buffer::job::JobChain;
use crate::command_buffer::packed::{JobType, LocalStorageDesc};
use crate::command_buffer::state::AttachmentBos;
use crate::sync::event::EventOp;

/// Framebuffer descriptors of a batch, one per layer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FramebufferAlloc {
    /// Descriptor of the first layer.
    pub desc: PoolPtr,
    /// Distance between the descriptors of two layers.
    pub stride: u64,
    /// Number of layers.
    pub layer_count: u32,
    /// Whether a ZS/CRC extension follows each framebuffer descriptor.
    pub has_zs_ext: bool,
    /// Number of render target descriptors per layer.
    pub rt_count: u32,
}

impl FramebufferAlloc {
    /// GPU address of the descriptor of one layer.
    pub fn layer_address(&self, layer: u32) -> u64 {
        self.desc.gpu + layer as u64 * self.stride
    }
}

/// Tiler heap and per-layer tiler contexts of a batch.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TilerAlloc {
    /// Tiler heap descriptor.
    pub heap: PoolPtr,
    /// Tiler context of the first layer. Contexts of the other layers follow.
    pub contexts: PoolPtr,
    /// Number of layers.
    pub layer_count: u32,
}

/// One unit of GPU submission.
#[derive(Debug, Default, Clone)]
pub struct Batch {
    pub(crate) jobs: JobChain,
    pub(crate) fragment_jobs: JobChain,
    pub(crate) event_ops: Vec<EventOp>,
    pub(crate) fb: Option<FramebufferAlloc>,
    pub(crate) tiler: Option<TilerAlloc>,
    pub(crate) tls: Option<PoolPtr>,
    pub(crate) tls_size: u32,
    pub(crate) wls_size: u32,
    pub(crate) wls_instances: u64,
    pub(crate) wls_total_size: u64,
    pub(crate) tls_base: u64,
    pub(crate) wls_base: u64,
    pub(crate) bos: AttachmentBos,
}

impl Batch {
    /// The vertex, tiler and compute jobs, in recording order.
    pub fn jobs(&self) -> &JobChain {
        &self.jobs
    }

    /// The fragment jobs, one per framebuffer layer. Empty unless the batch renders.
    pub fn fragment_jobs(&self) -> &JobChain {
        &self.fragment_jobs
    }

    /// Event operations attached to this batch.
    pub fn event_ops(&self) -> &[EventOp] {
        &self.event_ops
    }

    /// Framebuffer descriptors, if the batch renders.
    pub fn framebuffer(&self) -> Option<&FramebufferAlloc> {
        self.fb.as_ref()
    }

    /// Tiler heap and contexts, if the batch has tiler jobs or renders.
    pub fn tiler(&self) -> Option<&TilerAlloc> {
        self.tiler.as_ref()
    }

    /// GPU address of the local storage descriptor, zero if no job needed one.
    pub fn tls_desc(&self) -> u64 {
        self.tls.map(|ptr| ptr.gpu).unwrap_or_default()
    }

    /// Largest per-thread storage size of any job of the batch.
    pub fn tls_size(&self) -> u32 {
        self.tls_size
    }

    /// Largest workgroup-local storage size of any job of the batch.
    pub fn wls_size(&self) -> u32 {
        self.wls_size
    }

    /// Workgroup-local storage instances of the batch.
    pub fn wls_instances(&self) -> u64 {
        self.wls_instances
    }

    /// Total workgroup-local storage allocated for the batch.
    pub fn wls_total_size(&self) -> u64 {
        self.wls_total_size
    }

    /// Base of the thread-local storage allocated at close, zero if none was needed.
    pub fn tls_base(&self) -> u64 {
        self.tls_base
    }

    /// Base of the workgroup-local storage allocated at close, zero if none was needed.
    pub fn wls_base(&self) -> u64 {
        self.wls_base
    }

    /// Buffer objects the batch renders to. They must be resident while it executes.
    pub fn bos(&self) -> &[u64] {
        &self.bos
    }

    /// Whether the batch has a fragment job.
    pub fn has_fragment_job(&self) -> bool {
        !self.fragment_jobs.is_empty()
    }

    /// Whether the batch bins primitives, which is what makes preloading the tile buffer worthwhile.
    pub fn has_tiler_job(&self) -> bool {
        self.jobs.first_tiler().is_some()
    }

    /// Number of jobs of one type, fragment jobs included.
    pub fn job_count(&self, ty: JobType) -> usize {
        match ty {
            JobType::Fragment => self.fragment_jobs.len(),
            _ => self.jobs.count(ty),
        }
    }

    /// Local storage descriptor of this batch, as written when it is closed.
    pub(crate) fn local_storage_desc(&self) -> LocalStorageDesc {
        LocalStorageDesc {
            tls_size: self.tls_size,
            wls_instances: u32::try_from(self.wls_instances).unwrap_or(u32::MAX),
            tls_base: self.tls_base,
            wls_base: self.wls_base,
            wls_size: self.wls_size,
            reserved: 0,
        }
    }

    /// Whether there is nothing to submit: no jobs and no event operations.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty() && self.fragment_jobs.is_empty() && self.event_ops.is_empty()
    }
}
