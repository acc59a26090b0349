//! Application-owned resources referenced by descriptors and commands.

pub mod buffer;
pub mod image;
pub mod sampler;
