//! Headless GPU device management.
//!
//! The sorter never presents to a surface; it only needs an adapter, a device
//! and a queue to record compute work into. Hosts with their own wgpu device
//! can skip this module and hand their device to
//! [`WgpuBackend`](crate::sort::WgpuBackend) directly.

mod gpu;
mod init;

pub use gpu::Gpu;
pub use init::GpuInit;
