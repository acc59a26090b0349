//! The core module holds the device description, pool settings and the error type.

pub mod device;
pub mod error;
pub mod pool_info;
