//! Depth keys and the GPU radix sort.
//!
//! | Module          | Contents                                              |
//! |-----------------|-------------------------------------------------------|
//! | `config`        | partition / radix constants shared with the kernels   |
//! | `key`           | float-to-sortable key transform, [`KeyOrder`]         |
//! | `backend`       | [`ComputeBackend`] trait, kernels, binding slots      |
//! | `radix`         | [`RadixSort`] pass scheduling                         |
//! | `wgpu_backend`  | [`WgpuBackend`] running `shaders/radix_sort.wgsl`     |
//! | `cpu`           | [`CpuBackend`] reference executor                     |

mod backend;
pub mod config;
mod cpu;
mod key;
mod radix;
mod wgpu_backend;

pub use backend::{
    upload_positions, ComputeBackend, Dispatch, Kernel, KernelBindings, SortConstants, Slot,
};
pub use cpu::{CpuBackend, CpuBuffer, CpuStream};
pub use key::{float_to_sortable, view_depth, DepthKeyGenerator, KeyOrder};
pub use radix::{RadixSort, SortArgs};
pub use wgpu_backend::{reflect_kernels, WgpuBackend, WgpuBuffer, WgpuStream, RADIX_SORT_WGSL};
