//! Exposes the panbatch error type

use std::sync::PoisonError;

use ash::vk;
use thiserror::Error;

/// Error type that panbatch can return.
#[derive(Error, Debug)]
pub enum Error {
    /// A pool or slab allocation could not be satisfied.
    #[error("Out of memory: pool `{pool}` could not allocate {requested} bytes")]
    OutOfMemory {
        /// Label of the pool that failed.
        pool: &'static str,
        /// Size of the failed request, in bytes.
        requested: u64,
    },
    /// Command recorded on a command buffer that is not in the recording state.
    #[error("Command buffer is not recording. Did you forget to call `begin()`?")]
    NotRecording,
    /// The command buffer failed earlier and can only be reset.
    #[error("Command buffer is in the failed state: `{0}`")]
    Failed(String),
    /// Tried to open a batch while another one is still open.
    #[error("A batch is already open on this command buffer.")]
    BatchAlreadyOpen,
    /// Operation requires an open batch.
    #[error("No batch is open on this command buffer.")]
    NoBatch,
    /// Descriptor set index out of the supported range.
    #[error("Descriptor set index {0} is out of range.")]
    InvalidSetIndex(u32),
    /// A fixed hardware maximum was exceeded.
    #[error("Too many bindings: `{what}` supports at most {max}.")]
    TooManyBindings {
        /// Resource class that overflowed.
        what: &'static str,
        /// Hardware maximum.
        max: u32,
    },
    /// The number of dynamic offsets does not match the dynamic descriptors in the bound sets.
    #[error("Expected {expected} dynamic offsets, got {got}.")]
    DynamicOffsetCountMismatch {
        /// Number of dynamic descriptors in the bound sets.
        expected: usize,
        /// Number of offsets given.
        got: usize,
    },
    /// Primitive topology that the tiler cannot consume.
    #[error("Unsupported primitive topology `{0:?}`.")]
    UnsupportedTopology(vk::PrimitiveTopology),
    /// Index type other than 8, 16 or 32-bit unsigned.
    #[error("Invalid index type `{0:?}`.")]
    InvalidIndexType(vk::IndexType),
    /// Descriptor type that has no hardware table.
    #[error("Unsupported descriptor type `{0:?}`.")]
    UnsupportedDescriptorType(vk::DescriptorType),
    /// A descriptor write does not match the type of its binding.
    #[error("Descriptor write for binding {binding} does not match its type `{expected:?}`.")]
    DescriptorTypeMismatch {
        /// Binding number.
        binding: u32,
        /// Type declared in the set layout.
        expected: vk::DescriptorType,
    },
    /// Binding number not present in the set layout.
    #[error("Binding {0} does not exist in the descriptor set layout.")]
    NoBinding(u32),
    /// Descriptor write goes past the end of a binding array.
    #[error("Descriptor write out of range for binding {0}.")]
    DescriptorOutOfRange(u32),
    /// Tried to push descriptors into a set whose layout was not created for push descriptors.
    #[error("Set layout {0} was not created with the push descriptor flag.")]
    NotPushDescriptorLayout(u32),
    /// Draw or dispatch without a pipeline bound to the matching bind point.
    #[error("No pipeline bound to bind point `{0:?}`.")]
    NoPipelineBound(vk::PipelineBindPoint),
    /// Bind point other than graphics or compute.
    #[error("Unsupported bind point `{0:?}`.")]
    UnsupportedBindPoint(vk::PipelineBindPoint),
    /// Vertex attribute added for a binding that was never declared.
    #[error("Vertex binding {0} does not exist. Call `vertex_input()` before adding attributes to it.")]
    NoVertexBinding(u32),
    /// Indexed draw without an index buffer.
    #[error("Indexed draw recorded without an index buffer bound.")]
    NoIndexBuffer,
    /// Draw recorded outside of `begin_rendering`/`end_rendering`.
    #[error("Draw recorded outside of a render pass.")]
    NoRenderpass,
    /// Push constant write outside of the push constant block.
    #[error("Push constant range {offset}..{end} exceeds the {max} byte push constant block.")]
    PushConstantRange {
        /// Start offset.
        offset: u32,
        /// End offset.
        end: u32,
        /// Size of the push constant block.
        max: u32,
    },
    /// Buffer needs a host mapping for this operation.
    #[error("Requested mappable buffer, but buffer does not have a memory map")]
    UnmappableBuffer,
    /// A size derived from command parameters does not fit the hardware field that holds it.
    #[error("`{what}` of {value} exceeds the hardware limit of {max}.")]
    SizeOverflow {
        /// Quantity that overflowed.
        what: &'static str,
        /// Requested value.
        value: u64,
        /// Largest value the hardware accepts.
        max: u64,
    },
    /// Command that is not implemented on this hardware path.
    #[error("Unsupported command: `{0}`")]
    Unsupported(&'static str),
    /// Poisoned mutex
    #[error("Poisoned mutex")]
    PoisonError,
}

impl<T> From<PoisonError<T>> for Error {
    fn from(_: PoisonError<T>) -> Self {
        Error::PoisonError
    }
}
