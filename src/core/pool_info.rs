//! Exposes the settings used to create a [`CommandPool`](crate::CommandPool).

/// Default slab size of each command buffer arena.
pub const DEFAULT_SLAB_SIZE: u64 = 64 * 1024;

/// Largest job index the hardware job header can encode, minus the slots a single draw needs.
/// A batch is split before its job index reaches this value.
pub const JOB_INDEX_LIMIT: u16 = u16::MAX - 3;

/// Settings shared by every command buffer allocated from a pool.
#[derive(Debug, Clone)]
pub struct CommandPoolSettings {
    /// Debug name of the pool.
    pub name: String,
    /// Slab size of the descriptor arena. Holds job headers, descriptor tables and push uniforms.
    pub desc_slab_size: u64,
    /// Slab size of the thread-local storage arena.
    pub tls_slab_size: u64,
    /// Slab size of the varying arena.
    pub varying_slab_size: u64,
    /// Job index at which a batch is split. Never larger than [`JOB_INDEX_LIMIT`].
    pub job_index_limit: u16,
}

impl Default for CommandPoolSettings {
    fn default() -> Self {
        Self {
            name: String::from(""),
            desc_slab_size: DEFAULT_SLAB_SIZE,
            tls_slab_size: DEFAULT_SLAB_SIZE,
            varying_slab_size: DEFAULT_SLAB_SIZE,
            job_index_limit: JOB_INDEX_LIMIT,
        }
    }
}

/// The pool builder is a convenience struct to easily create [`CommandPoolSettings`].
///
/// For information about each of the fields, see [`CommandPoolSettings`].
/// # Example
/// ```
/// # use panbatch::prelude::*;
/// let settings = CommandPoolBuilder::new()
///     .name("render thread pool")
///     .desc_slab_size(16 * 1024u64)
///     .build();
/// assert_eq!(settings.desc_slab_size, 16 * 1024);
/// ```
#[derive(Debug, Default)]
pub struct CommandPoolBuilder {
    inner: CommandPoolSettings,
}

impl CommandPoolBuilder {
    /// Create a new pool builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the pool name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.inner.name = name.into();
        self
    }

    /// Slab size of the descriptor arena.
    pub fn desc_slab_size(mut self, size: impl Into<u64>) -> Self {
        self.inner.desc_slab_size = size.into();
        self
    }

    /// Slab size of the thread-local storage arena.
    pub fn tls_slab_size(mut self, size: impl Into<u64>) -> Self {
        self.inner.tls_slab_size = size.into();
        self
    }

    /// Slab size of the varying arena.
    pub fn varying_slab_size(mut self, size: impl Into<u64>) -> Self {
        self.inner.varying_slab_size = size.into();
        self
    }

    /// Split batches earlier than the hardware requires. Values above [`JOB_INDEX_LIMIT`] are clamped.
    pub fn job_index_limit(mut self, limit: u16) -> Self {
        self.inner.job_index_limit = limit.clamp(1, JOB_INDEX_LIMIT);
        self
    }

    /// Build the resulting pool settings.
    pub fn build(self) -> CommandPoolSettings {
        self.inner
    }
}
