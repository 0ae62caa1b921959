//! Per-drawable GPU buffers.

mod pool;

pub use pool::{PoolBuffers, ResourcePool};
