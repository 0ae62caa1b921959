//! Drawables, cameras and the geometry helpers the renderer needs.

mod arena;
mod bounds;
mod camera;
mod instance_mesh;
mod target;

pub use arena::{SplatArena, SplatId};
pub use bounds::Aabb;
pub use camera::{Camera, CameraId, CameraKind};
pub use instance_mesh::{index_as_float_bits, InstanceMesh};
pub use target::{SortTarget, Splat};
