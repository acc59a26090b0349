//! Exposes the GPU properties the batch builder needs to size thread storage and framebuffer descriptors.

use std::ops::Deref;
use std::sync::Arc;

use anyhow::Result;

use crate::util::align::next_pow2;
use crate::Error;

/// Location of the device-wide tiler heap. Every tiler context points into it.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TilerHeap {
    /// GPU address of the heap.
    pub base: u64,
    /// Size of the heap in bytes.
    pub size: u64,
}

/// Static properties of the GPU the command buffers are recorded for.
#[derive(Debug, Clone)]
pub struct DeviceProperties {
    /// GPU product id, for logging only.
    pub gpu_id: u32,
    /// Number of shader core ids, including holes in the core mask.
    pub core_id_range: u32,
    /// Number of threads a single core allocates thread-local storage for.
    pub thread_tls_alloc: u32,
    /// Optimal tile buffer budget in bytes.
    pub optimal_tib_size: u32,
    /// Device-wide tiler heap.
    pub tiler_heap: TilerHeap,
    /// GPU address of the sample position table.
    pub sample_positions: u64,
}

impl Default for DeviceProperties {
    fn default() -> Self {
        Self {
            gpu_id: 0x7212,
            core_id_range: 4,
            thread_tls_alloc: 1024,
            optimal_tib_size: 16384,
            tiler_heap: TilerHeap {
                base: 0x4000_0000,
                size: 16 * 1024 * 1024,
            },
            sample_positions: 0x3fff_0000,
        }
    }
}

/// Wrapper around the device properties. Internal state is wrapped in an `Arc`, so this is cheap
/// to clone and safe to share between threads recording different command buffers.
#[derive(Debug, Clone)]
pub struct Device {
    inner: Arc<DeviceProperties>,
}

impl Device {
    /// Create a device from a set of properties.
    pub fn new(properties: DeviceProperties) -> Result<Self> {
        if properties.core_id_range == 0 {
            anyhow::bail!("Device must expose at least one shader core");
        }
        if properties.thread_tls_alloc == 0 {
            anyhow::bail!("Thread TLS allocation quantum must be non-zero");
        }
        info!(
            "Created device for GPU {:#x} with {} cores",
            properties.gpu_id, properties.core_id_range
        );
        Ok(Self {
            inner: Arc::new(properties),
        })
    }

    /// Get the raw device properties.
    pub fn properties(&self) -> &DeviceProperties {
        &self.inner
    }

    /// Total stack size needed for `thread_size` bytes of thread-local storage per invocation,
    /// accounting for every thread on every core.
    pub fn total_stack_size(&self, thread_size: u32) -> u64 {
        if thread_size == 0 {
            return 0;
        }
        let per_thread = next_pow2(crate::util::align::align_up(thread_size as u64, 16));
        per_thread * self.thread_tls_alloc as u64 * self.core_id_range as u64
    }

    /// Total workgroup-local storage for a dispatch. Each workgroup instance gets
    /// `next_pow2(max(wls_size, 128))` bytes, and instances are counted on power-of-two rounded dimensions.
    ///
    /// Fails if the total does not fit in 64 bits.
    pub fn total_wls_size(&self, wls_size: u32, instances: u64) -> Result<u64> {
        let per_instance = next_pow2(wls_size.max(128) as u64);
        per_instance
            .checked_mul(instances)
            .and_then(|size| size.checked_mul(self.core_id_range as u64))
            .ok_or_else(|| {
                Error::SizeOverflow {
                    what: "workgroup-local storage instances",
                    value: instances,
                    max: u64::MAX / per_instance / self.core_id_range.max(1) as u64,
                }
                .into()
            })
    }
}

impl Deref for Device {
    type Target = DeviceProperties;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Number of workgroup-local storage instances needed for a dispatch of the given size.
///
/// Fails if the count does not fit the 32-bit instance field of the local storage descriptor.
pub fn wls_instances(work_groups: [u32; 3]) -> Result<u64> {
    let instances = work_groups
        .iter()
        .try_fold(1u64, |acc, &dim| acc.checked_mul(next_pow2(dim.max(1) as u64)));
    match instances {
        Some(instances) if instances <= u32::MAX as u64 => Ok(instances),
        _ => Err(Error::SizeOverflow {
            what: "workgroup-local storage instances",
            value: instances.unwrap_or(u64::MAX),
            max: u32::MAX as u64,
        }
        .into()),
    }
}

/// The device builder is a convenience struct to easily create a [`Device`].
///
/// # Example
/// ```
/// # use panbatch::prelude::*;
/// let device = DeviceBuilder::new()
///     .core_id_range(8)
///     .thread_tls_alloc(768)
///     .build()
///     .unwrap();
/// assert_eq!(device.core_id_range, 8);
/// ```
#[derive(Debug, Default)]
pub struct DeviceBuilder {
    inner: DeviceProperties,
}

impl DeviceBuilder {
    /// Create a new device builder with the properties of a small four-core GPU.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the GPU product id.
    pub fn gpu_id(mut self, id: u32) -> Self {
        self.inner.gpu_id = id;
        self
    }

    /// Sets the core id range.
    pub fn core_id_range(mut self, range: u32) -> Self {
        self.inner.core_id_range = range;
        self
    }

    /// Sets the per-core thread TLS allocation quantum.
    pub fn thread_tls_alloc(mut self, threads: u32) -> Self {
        self.inner.thread_tls_alloc = threads;
        self
    }

    /// Sets the optimal tile buffer budget.
    pub fn optimal_tib_size(mut self, size: u32) -> Self {
        self.inner.optimal_tib_size = size;
        self
    }

    /// Sets the tiler heap location.
    pub fn tiler_heap(mut self, base: u64, size: u64) -> Self {
        self.inner.tiler_heap = TilerHeap {
            base,
            size,
        };
        self
    }

    /// Sets the address of the sample position table.
    pub fn sample_positions(mut self, address: u64) -> Self {
        self.inner.sample_positions = address;
        self
    }

    /// Build the device.
    pub fn build(self) -> Result<Device> {
        Device::new(self.inner)
    }
}
