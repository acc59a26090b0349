//! The command buffer records draws, dispatches and synchronization into batches of hardware jobs.
//!
//! # Batches
//!
//! Commands are not stored. They are translated immediately into jobs appended to the *current batch*. At most
//! one batch is open at any time. It is closed when rendering ends, a dispatch completes, a barrier or event
//! operation needs a boundary, the job index space runs out, or recording ends. Closing a batch finalizes its
//! framebuffer, tiler and thread storage descriptors, appends the fragment jobs, and moves it to the list of
//! closed batches returned by [`CommandBuffer::batches`]. Batches without jobs or event operations are dropped
//! instead, so nothing empty is ever submitted.
//!
//! # Descriptor tables
//!
//! Binding descriptor sets, pushing descriptors or constants and binding pipelines only record state and
//! throw away memoized tables. Tables are built on the next draw or dispatch that needs them, see
//! [`DescriptorState`](crate::DescriptorState).
//!
//! # Failure
//!
//! Recording commands return `Result<&mut Self>` so they can be chained. The first command that fails puts the
//! command buffer in the failed state: later commands are ignored and [`CommandBuffer::end`] reports the
//! original error. Only [`CommandBuffer::reset`] or [`CommandBuffer::begin`] bring it back.
//!
//! # Commands
//! Draw, dispatch and synchronization commands are implemented through the traits in the [`traits`] module,
//! most easily imported through the [`prelude`](crate::prelude). Binding commands are inherent methods.
//!
//! # Example
//! ```
//! # use panbatch::prelude::*;
//! # use anyhow::Result;
//! fn record(pool: &CommandPool, pipeline: Arc<ComputePipeline>) -> Result<()> {
//!     let mut cmd = pool.allocate();
//!     cmd.begin()?
//!         .bind_pipeline(&Pipeline::Compute(pipeline))?
//!         .dispatch(4, 4, 1)?;
//!     cmd.end()?;
//!     assert_eq!(cmd.batches().len(), 1);
//!     Ok(())
//! }
//! # let device = DeviceBuilder::new().build().unwrap();
//! # let pool = CommandPool::new(device, HostAllocator::new(), CommandPoolSettings::default()).unwrap();
//! # let pipeline = ComputePipelineBuilder::new("example").set_shader(ShaderInfo::new(0x1000)).build().unwrap();
//! # record(&pool, pipeline).unwrap();
//! ```

use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::allocator::arena::ArenaPool;
use crate::allocator::host_allocator::HostAllocator;
use crate::allocator::traits::SlabAllocator;
use crate::command_buffer::batch::{Batch, FramebufferAlloc, TilerAlloc};
use crate::command_buffer::job::Job;
use crate::command_buffer::packed::{
    FragmentJobPayload, FramebufferDesc, LocalStorageDesc, RenderTargetDesc, TilerContextDesc, TilerHeapDesc,
    ZsCrcExtDesc, DESC_ALIGN, FBD_HAS_ZS_EXT, FBD_S_CLEAR, FBD_S_PRELOAD, FBD_Z_CLEAR, FBD_Z_PRELOAD,
    FRAMEBUFFER_ALIGN, RT_CLEAR, RT_PRELOAD, RT_WRITE_ENABLE,
};
use crate::command_buffer::state::{ComputeState, DynamicState, FramebufferInfo, GraphicsState};
use crate::command_buffer::sysvals::{ComputeSysvals, GraphicsSysvals};
use crate::core::device::Device;
use crate::core::pool_info::CommandPoolSettings;
use crate::descriptor::state::DescriptorState;
use crate::pipeline::pipeline_layout::MAX_PUSH_CONSTANTS_SIZE;
use crate::util::align::align_up;
use crate::Error;

pub mod batch;
pub mod command_pool;
pub mod compute;
pub mod descriptors;
pub mod graphics;
pub mod job;
pub mod packed;
pub mod state;
pub mod sync;
pub mod sysvals;
pub mod traits;

/// Tiles are 16x16 pixels.
const TILE_SHIFT: u32 = 4;
/// Distance between the sample position tables of two sample patterns.
const SAMPLE_PATTERN_STRIDE: u64 = 0x100;
/// Bin hierarchy levels enabled in every tiler context.
const TILER_HIERARCHY_MASK: u32 = 0x28;
/// Alignment of thread and workgroup storage.
const STORAGE_ALIGN: u64 = 4096;

const FBD_SIZE: u64 = std::mem::size_of::<FramebufferDesc>() as u64;
const ZS_EXT_SIZE: u64 = std::mem::size_of::<ZsCrcExtDesc>() as u64;
const RT_SIZE: u64 = std::mem::size_of::<RenderTargetDesc>() as u64;
const TILER_CONTEXT_SIZE: u64 = std::mem::size_of::<TilerContextDesc>() as u64;

/// Recording status of a command buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CommandBufferStatus {
    /// Freshly allocated or reset.
    Initial,
    /// Between `begin()` and `end()`.
    Recording,
    /// Recorded successfully, the batches can be submitted.
    Executable,
    /// A command failed. The command buffer must be reset.
    Invalid,
}

/// A command buffer, translating commands into batches of hardware jobs.
///
/// Allocated from a [`CommandPool`](crate::CommandPool). Owns three arenas: descriptor memory (job headers,
/// descriptor tables, push uniforms), thread storage, and varyings. All of them are reset with the command buffer.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct CommandBuffer<A: SlabAllocator = HostAllocator> {
    #[derivative(Debug = "ignore")]
    device: Device,
    settings: Arc<CommandPoolSettings>,
    status: CommandBufferStatus,
    failure: Option<String>,
    pub(crate) desc_pool: ArenaPool<A>,
    pub(crate) tls_pool: ArenaPool<A>,
    pub(crate) varying_pool: ArenaPool<A>,
    batches: Vec<Batch>,
    pub(crate) cur_batch: Option<Batch>,
    pub(crate) gfx: GraphicsState,
    pub(crate) compute: ComputeState,
    #[derivative(Debug = "ignore")]
    pub(crate) push_constants: [u8; MAX_PUSH_CONSTANTS_SIZE as usize],
}

impl<A: SlabAllocator> CommandBuffer<A> {
    pub(crate) fn new(device: Device, allocator: A, settings: Arc<CommandPoolSettings>) -> Self {
        #[cfg(feature = "log-objects")]
        trace!("Allocated command buffer from pool `{}`", settings.name);

        Self {
            device,
            desc_pool: ArenaPool::new(allocator.clone(), "desc", settings.desc_slab_size),
            tls_pool: ArenaPool::new(allocator.clone(), "tls", settings.tls_slab_size),
            varying_pool: ArenaPool::new(allocator, "varying", settings.varying_slab_size),
            settings,
            status: CommandBufferStatus::Initial,
            failure: None,
            batches: vec![],
            cur_batch: None,
            gfx: GraphicsState::default(),
            compute: ComputeState::default(),
            push_constants: [0; MAX_PUSH_CONSTANTS_SIZE as usize],
        }
    }

    /// Start recording. A command buffer that was recorded before is reset first.
    pub fn begin(&mut self) -> Result<&mut Self> {
        if self.status != CommandBufferStatus::Initial {
            self.reset();
        }
        self.status = CommandBufferStatus::Recording;
        Ok(self)
    }

    /// Finish recording. The open batch, if any, is closed.
    /// # Errors
    /// * Fails with [`Error::Failed`] if a command failed during recording.
    /// * Fails with [`Error::NotRecording`] if `begin()` was not called.
    /// * Fails with [`Error::OutOfMemory`] if closing the last batch runs out of memory.
    pub fn end(&mut self) -> Result<()> {
        match self.status {
            CommandBufferStatus::Recording => {}
            CommandBufferStatus::Invalid => {
                return Err(Error::Failed(self.failure.clone().unwrap_or_default()).into());
            }
            _ => return Err(Error::NotRecording.into()),
        }

        if let Err(err) = self.close_batch_inner() {
            self.fail(&err);
            return Err(err);
        }
        self.status = CommandBufferStatus::Executable;
        trace!("Finished command buffer with {} batches", self.batches.len());
        Ok(())
    }

    /// Release every batch, all arena memory and all recorded state. The command buffer is indistinguishable from
    /// a freshly allocated one afterwards. Slabs are kept for the next recording.
    pub fn reset(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Reset command buffer with {} batches", self.batches.len());

        self.batches.clear();
        self.cur_batch = None;
        self.desc_pool.reset();
        self.tls_pool.reset();
        self.varying_pool.reset();
        self.gfx = GraphicsState::default();
        self.compute = ComputeState::default();
        self.push_constants = [0; MAX_PUSH_CONSTANTS_SIZE as usize];
        self.status = CommandBufferStatus::Initial;
        self.failure = None;
    }

    /// Run one recording command. Commands on a failed command buffer are ignored, and a failing command puts
    /// the command buffer in the failed state.
    pub(crate) fn record(&mut self, command: impl FnOnce(&mut Self) -> Result<()>) -> Result<&mut Self> {
        match self.status {
            CommandBufferStatus::Recording => {}
            CommandBufferStatus::Invalid => return Ok(self),
            _ => return Err(Error::NotRecording.into()),
        }

        if let Err(err) = command(self) {
            self.fail(&err);
            return Err(err);
        }
        Ok(self)
    }

    /// Reject a command that has no implementation. The job stream and the command buffer status are untouched.
    pub(crate) fn unsupported(&mut self, command: &'static str) -> Result<&mut Self> {
        match self.status {
            CommandBufferStatus::Recording => {}
            CommandBufferStatus::Invalid => return Ok(self),
            _ => return Err(Error::NotRecording.into()),
        }
        warn!("`{}` is not supported, command ignored", command);
        Err(Error::Unsupported(command).into())
    }

    fn fail(&mut self, err: &anyhow::Error) {
        error!("Command buffer of pool `{}` failed: {}", self.settings.name, err);
        self.failure = Some(err.to_string());
        self.status = CommandBufferStatus::Invalid;
    }

    /// Open a new batch.
    /// # Errors
    /// * Fails with [`Error::BatchAlreadyOpen`] if a batch is open already.
    pub fn open_batch(&mut self) -> Result<&mut Self> {
        self.record(|cmd| cmd.open_batch_inner())
    }

    /// Close the current batch. Does nothing if no batch is open.
    /// # Errors
    /// * Fails with [`Error::OutOfMemory`] if the batch descriptors cannot be allocated.
    pub fn close_batch(&mut self) -> Result<&mut Self> {
        self.record(|cmd| cmd.close_batch_inner())
    }

    pub(crate) fn open_batch_inner(&mut self) -> Result<()> {
        if self.cur_batch.is_some() {
            return Err(Error::BatchAlreadyOpen.into());
        }
        #[cfg(feature = "log-objects")]
        trace!("Opened batch {}", self.batches.len());
        self.cur_batch = Some(Batch::default());
        Ok(())
    }

    pub(crate) fn close_batch_inner(&mut self) -> Result<()> {
        let Some(mut batch) = self.cur_batch.take() else {
            return Ok(());
        };

        match self.finish_batch(&mut batch) {
            Ok(true) => {
                trace!(
                    "Closed batch {} with {} jobs, {} fragment jobs and {} event operations",
                    self.batches.len(),
                    batch.jobs.len(),
                    batch.fragment_jobs.len(),
                    batch.event_ops.len()
                );
                self.batches.push(batch);
                Ok(())
            }
            Ok(false) => {
                trace!("Discarded empty batch");
                Ok(())
            }
            Err(err) => {
                self.cur_batch = Some(batch);
                Err(err)
            }
        }
    }

    /// Close the current batch and open a new one that picks up the framebuffer contents where the closed one
    /// left them.
    pub(crate) fn split_batch(&mut self) -> Result<()> {
        self.close_batch_inner()?;
        self.preload_fb_after_split();
        self.open_batch_inner()
    }

    pub(crate) fn preload_fb_after_split(&mut self) {
        self.gfx.fb.preload_after_split();
    }

    /// Run `f` on the current batch.
    /// # Errors
    /// * Fails with [`Error::NoBatch`] if no batch is open.
    pub(crate) fn with_batch<T>(&mut self, f: impl FnOnce(&mut Self, &mut Batch) -> Result<T>) -> Result<T> {
        let mut batch = self.cur_batch.take().ok_or(Error::NoBatch)?;
        let result = f(self, &mut batch);
        self.cur_batch = Some(batch);
        result
    }

    /// Finalize a batch. Returns `false` if the batch is empty and must be dropped.
    ///
    /// Everything is allocated before anything is added to the batch, so a failed close can be retried.
    fn finish_batch(&mut self, batch: &mut Batch) -> Result<bool> {
        let clear = self.gfx.fb.in_render_pass && self.gfx.fb.has_clear();

        if batch.jobs.is_empty() && !clear {
            if batch.event_ops.is_empty() {
                return Ok(false);
            }
            // The kernel needs a job to anchor the event operations to.
            let job = Job::Null.allocate(&mut self.desc_pool)?;
            batch.jobs.add(&mut self.desc_pool, job, 0, false);
            return Ok(true);
        }

        if clear {
            self.alloc_fb_desc(batch)?;
        }

        if batch.tls_size > 0 && batch.tls_base == 0 {
            let size = self.device.total_stack_size(batch.tls_size);
            batch.tls_base = self.tls_pool.allocate(size, STORAGE_ALIGN)?.gpu;
        }
        if batch.wls_total_size > 0 && batch.wls_base == 0 {
            batch.wls_base = self.tls_pool.allocate(batch.wls_total_size, STORAGE_ALIGN)?.gpu;
        }
        if let Some(tls) = batch.tls {
            self.desc_pool.write_pod(&tls, 0, &batch.local_storage_desc());
        }

        if let Some(fb) = batch.fb {
            let mut fragment_jobs = Vec::with_capacity(fb.layer_count as usize);
            for layer in 0..fb.layer_count {
                let tiler = self.prepare_tiler_context(batch, layer)?;
                self.write_fb_desc(batch, &fb, layer, tiler);
                let info = &self.gfx.fb;
                let payload = FragmentJobPayload {
                    bound_min_x: 0,
                    bound_min_y: 0,
                    bound_max_x: (info.width.saturating_sub(1) >> TILE_SHIFT) as u16,
                    bound_max_y: (info.height.saturating_sub(1) >> TILE_SHIFT) as u16,
                    framebuffer: fb.layer_address(layer),
                };
                fragment_jobs.push(Job::Fragment(payload).allocate(&mut self.desc_pool)?);
            }
            for job in fragment_jobs {
                batch.fragment_jobs.add(&mut self.desc_pool, job, 0, false);
            }
        }

        batch.jobs.link(&mut self.desc_pool);
        batch.fragment_jobs.link(&mut self.desc_pool);
        Ok(true)
    }

    /// Allocate the framebuffer descriptors of a batch, one per layer. They are filled when the batch is closed.
    pub(crate) fn alloc_fb_desc(&mut self, batch: &mut Batch) -> Result<()> {
        if batch.fb.is_some() {
            return Ok(());
        }

        let info = &self.gfx.fb;
        let has_zs_ext = info.zs_view.is_some() || info.s_view.is_some();
        let rt_count = info.rt_count.max(1);
        let layer_count = info.layer_count.max(1);
        let size = FBD_SIZE + if has_zs_ext { ZS_EXT_SIZE } else { 0 } + rt_count as u64 * RT_SIZE;
        let stride = align_up(size, FRAMEBUFFER_ALIGN);

        let desc = self.desc_pool.allocate(stride * layer_count as u64, FRAMEBUFFER_ALIGN)?;
        batch.bos.extend(info.bos.iter().copied());
        batch.fb = Some(FramebufferAlloc {
            desc,
            stride,
            layer_count,
            has_zs_ext,
            rt_count,
        });
        Ok(())
    }

    /// Allocate the local storage descriptor of a batch. It is filled when the batch is closed, once the storage
    /// needs of every job are known.
    pub(crate) fn alloc_tls_desc(&mut self, batch: &mut Batch) -> Result<u64> {
        if let Some(tls) = batch.tls {
            return Ok(tls.gpu);
        }
        let tls = self
            .desc_pool
            .allocate(std::mem::size_of::<LocalStorageDesc>() as u64, DESC_ALIGN)?;
        batch.tls = Some(tls);
        Ok(tls.gpu)
    }

    /// GPU address of the tiler context of one layer. The heap and every context are allocated and written the
    /// first time a batch needs one.
    pub(crate) fn prepare_tiler_context(&mut self, batch: &mut Batch, layer: u32) -> Result<u64> {
        let tiler = match batch.tiler {
            Some(tiler) => tiler,
            None => {
                let info = &self.gfx.fb;
                let layer_count = info.layer_count.max(1);
                let heap_info = self.device.tiler_heap;

                let heap = self
                    .desc_pool
                    .allocate(std::mem::size_of::<TilerHeapDesc>() as u64, DESC_ALIGN)?;
                let contexts = self
                    .desc_pool
                    .allocate(TILER_CONTEXT_SIZE * layer_count as u64, DESC_ALIGN)?;

                self.desc_pool.write_pod(
                    &heap,
                    0,
                    &TilerHeapDesc {
                        size: heap_info.size as u32,
                        reserved: 0,
                        base: heap_info.base,
                        bottom: heap_info.base,
                        top: heap_info.base + heap_info.size,
                    },
                );
                for index in 0..layer_count {
                    let context = TilerContextDesc {
                        hierarchy_mask: TILER_HIERARCHY_MASK,
                        sample_pattern: info.sample_pattern(),
                        fb_width: info.width as u16,
                        fb_height: info.height as u16,
                        layer: index,
                        heap: heap.gpu,
                        reserved: 0,
                    };
                    self.desc_pool
                        .write_pod(&contexts, index as u64 * TILER_CONTEXT_SIZE, &context);
                }

                let tiler = TilerAlloc {
                    heap,
                    contexts,
                    layer_count,
                };
                batch.tiler = Some(tiler);
                tiler
            }
        };
        let layer = layer.min(tiler.layer_count - 1);
        Ok(tiler.contexts.gpu_at(layer as u64 * TILER_CONTEXT_SIZE))
    }

    fn write_fb_desc(&mut self, batch: &Batch, fb: &FramebufferAlloc, layer: u32, tiler: u64) {
        let info = &self.gfx.fb;
        // Nothing was drawn if there is no tiler job, so there is nothing to preserve either.
        let preload = batch.has_tiler_job();

        let mut flags = 0;
        if fb.has_zs_ext {
            flags |= FBD_HAS_ZS_EXT;
        }
        if info.z_clear {
            flags |= FBD_Z_CLEAR;
        }
        if info.s_clear {
            flags |= FBD_S_CLEAR;
        }
        if preload && info.z_preload {
            flags |= FBD_Z_PRELOAD;
        }
        if preload && info.s_preload {
            flags |= FBD_S_PRELOAD;
        }

        let desc = FramebufferDesc {
            local_storage: batch.local_storage_desc(),
            sample_locations: self.device.sample_positions + info.sample_pattern() as u64 * SAMPLE_PATTERN_STRIDE,
            tiler,
            width: info.width as u16,
            height: info.height as u16,
            bound_max_x: info.width.saturating_sub(1) as u16,
            bound_max_y: info.height.saturating_sub(1) as u16,
            sample_count: info.nr_samples.max(1),
            render_target_count: fb.rt_count,
            flags,
            tile_buffer_budget: info.tile_buf_budget,
            layer,
            reserved: 0,
        };

        let base = layer as u64 * fb.stride;
        self.desc_pool.write_pod(&fb.desc, base, &desc);
        let mut offset = base + FBD_SIZE;

        if fb.has_zs_ext {
            let zs = info.zs_view.as_ref();
            let s = info.s_view.as_ref().or(zs.filter(|view| view.is_depth_stencil()));
            let ext = ZsCrcExtDesc {
                zs_base: zs.map(|view| layer_address(view.address(), view.row_stride(), view.extent().height, layer))
                    .unwrap_or_default(),
                s_base: s
                    .map(|view| layer_address(view.address(), view.row_stride(), view.extent().height, layer))
                    .unwrap_or_default(),
                zs_row_stride: zs.map(|view| view.row_stride()).unwrap_or_default(),
                s_row_stride: s.map(|view| view.row_stride()).unwrap_or_default(),
                zs_format: zs.map(|view| view.hw_format()).unwrap_or_default(),
                clear_depth: info.clear_depth,
                clear_stencil: info.clear_stencil,
                reserved: 0,
            };
            self.desc_pool.write_pod(&fb.desc, offset, &ext);
            offset += ZS_EXT_SIZE;
        }

        let tib_share = info.tile_buf_budget / fb.rt_count.max(1);
        for index in 0..fb.rt_count {
            let rt = &info.rts[index as usize];
            let desc = match &rt.view {
                Some(view) => {
                    let mut flags = RT_WRITE_ENABLE;
                    if rt.clear {
                        flags |= RT_CLEAR;
                    }
                    if preload && rt.preload {
                        flags |= RT_PRELOAD;
                    }
                    RenderTargetDesc {
                        base: layer_address(view.address(), view.row_stride(), view.extent().height, layer),
                        row_stride: view.row_stride(),
                        format: view.hw_format(),
                        clear: rt.clear_value,
                        flags,
                        internal_buffer_offset: index * tib_share,
                    }
                }
                None => RenderTargetDesc::default(),
            };
            self.desc_pool.write_pod(&fb.desc, offset, &desc);
            offset += RT_SIZE;
        }
    }

    /// Batches closed so far, in submission order.
    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    /// The open batch.
    pub fn current_batch(&self) -> Option<&Batch> {
        self.cur_batch.as_ref()
    }

    /// Recording status.
    pub fn status(&self) -> CommandBufferStatus {
        self.status
    }

    /// Message of the error that put the command buffer in the failed state.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Descriptor arena: job headers, descriptor tables and push uniforms.
    pub fn desc_pool(&self) -> &ArenaPool<A> {
        &self.desc_pool
    }

    /// Thread storage arena.
    pub fn tls_pool(&self) -> &ArenaPool<A> {
        &self.tls_pool
    }

    /// Varying arena.
    pub fn varying_pool(&self) -> &ArenaPool<A> {
        &self.varying_pool
    }

    /// Device this command buffer records for.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Settings of the pool this command buffer was allocated from.
    pub fn settings(&self) -> &CommandPoolSettings {
        &self.settings
    }

    /// Current push constant bytes.
    pub fn push_constant_bytes(&self) -> &[u8] {
        &self.push_constants
    }

    /// Descriptor state of a bind point.
    /// # Errors
    /// * Fails with [`Error::UnsupportedBindPoint`] for bind points other than graphics and compute.
    pub fn descriptor_state(&self, bind_point: vk::PipelineBindPoint) -> Result<&DescriptorState> {
        match bind_point {
            vk::PipelineBindPoint::GRAPHICS => Ok(&self.gfx.desc_state),
            vk::PipelineBindPoint::COMPUTE => Ok(&self.compute.desc_state),
            other => Err(Error::UnsupportedBindPoint(other).into()),
        }
    }

    pub(crate) fn descriptor_state_mut(&mut self, bind_point: vk::PipelineBindPoint) -> Result<&mut DescriptorState> {
        match bind_point {
            vk::PipelineBindPoint::GRAPHICS => Ok(&mut self.gfx.desc_state),
            vk::PipelineBindPoint::COMPUTE => Ok(&mut self.compute.desc_state),
            other => Err(Error::UnsupportedBindPoint(other).into()),
        }
    }

    /// The framebuffer being rendered to.
    pub fn framebuffer(&self) -> &FramebufferInfo {
        &self.gfx.fb
    }

    /// Current dynamic graphics state.
    pub fn dynamic_state(&self) -> &DynamicState {
        &self.gfx.dynamic
    }

    /// Current graphics system values.
    pub fn graphics_sysvals(&self) -> &GraphicsSysvals {
        &self.gfx.sysvals
    }

    /// Current compute system values.
    pub fn compute_sysvals(&self) -> &ComputeSysvals {
        &self.compute.sysvals
    }
}

fn layer_address(base: u64, row_stride: u32, height: u32, layer: u32) -> u64 {
    base + layer as u64 * row_stride as u64 * height as u64
}
