use glam::{Mat4, Vec3};

use crate::resources::ResourcePool;
use crate::sort::{upload_positions, ComputeBackend};

use super::bounds::Aabb;

/// What the sorter needs from a drawable.
pub trait SortTarget<B: ComputeBackend> {
    fn local_to_world(&self) -> Mat4;

    /// Primitives to sort this frame. May be below the pool's capacity.
    fn primitive_count(&self) -> u32;

    fn resources(&self) -> &ResourcePool<B>;

    fn resources_mut(&mut self) -> &mut ResourcePool<B>;

    fn is_active(&self) -> bool;

    /// Backing buffers exist and there is something to sort.
    fn is_valid(&self) -> bool {
        let pool = self.resources();
        let count = self.primitive_count();
        !pool.is_disposed() && count > 0 && count <= pool.count()
    }
}

/// A splat cloud: positions on the device plus its sort buffers.
pub struct Splat<B: ComputeBackend> {
    local_to_world: Mat4,
    primitive_count: u32,
    active: bool,
    local_bounds: Option<Aabb>,
    pool: ResourcePool<B>,
}

impl<B: ComputeBackend> Splat<B> {
    /// Wraps an existing position buffer of `count` points.
    pub fn new(backend: &B, positions: B::Buffer, count: u32, local_to_world: Mat4) -> Self {
        Self {
            local_to_world,
            primitive_count: count,
            active: true,
            local_bounds: None,
            pool: ResourcePool::create(backend, count, positions),
        }
    }

    /// Uploads `positions` and records their bounds.
    pub fn from_positions(backend: &B, positions: &[[f32; 3]], local_to_world: Mat4) -> Self {
        let buffer = upload_positions(backend, positions);
        let mut splat = Self::new(backend, buffer, positions.len() as u32, local_to_world);
        splat.local_bounds = Aabb::from_points(positions.iter().map(|&p| Vec3::from(p)));
        splat
    }

    pub fn set_local_to_world(&mut self, transform: Mat4) {
        self.local_to_world = transform;
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Limits sorting to the first `count` primitives, clamped to capacity.
    pub fn set_primitive_count(&mut self, count: u32) {
        self.primitive_count = count.min(self.pool.count());
    }

    pub fn set_local_bounds(&mut self, bounds: Option<Aabb>) {
        self.local_bounds = bounds;
    }

    pub fn local_bounds(&self) -> Option<Aabb> {
        self.local_bounds
    }

    /// Local bounds moved into world space.
    pub fn world_bounds(&self) -> Option<Aabb> {
        self.local_bounds.map(|b| b.transformed(&self.local_to_world))
    }

    /// Points the splat at a new position buffer of `count` points,
    /// rebuilding the sort buffers when the count changes.
    pub fn resize(&mut self, backend: &B, positions: B::Buffer, count: u32) {
        self.pool.recreate(backend, count, positions);
        self.primitive_count = count;
    }

    /// Releases the sort buffers. The splat stays but is no longer valid.
    pub fn dispose(&mut self, backend: &B) {
        self.pool.dispose(backend);
    }
}

impl<B: ComputeBackend> SortTarget<B> for Splat<B> {
    fn local_to_world(&self) -> Mat4 {
        self.local_to_world
    }

    fn primitive_count(&self) -> u32 {
        self.primitive_count
    }

    fn resources(&self) -> &ResourcePool<B> {
        &self.pool
    }

    fn resources_mut(&mut self) -> &mut ResourcePool<B> {
        &mut self.pool
    }

    fn is_active(&self) -> bool {
        self.active
    }
}
