//! The allocator module exposes the memory side of a command buffer.
//! <br>
//! <br>
//! # Allocator traits
//! These are defined in [`traits`], and can be implemented to back command buffer arenas with real buffer objects.
//! # Host allocator
//! A slab allocator handing out host memory with stable fake GPU addresses, see [`host_allocator`]. Most types that
//! take a generic allocator parameter default to this allocator.
//! # Arena
//! A linear allocator used for everything a command buffer emits: job headers, descriptor tables, push uniforms,
//! thread storage and varyings. For more information check the [`arena`] module documentation.

pub mod arena;
pub mod host_allocator;
pub mod traits;
