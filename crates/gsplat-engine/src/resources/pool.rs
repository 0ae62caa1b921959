use crate::sort::config::{pass_histogram_len, GLOBAL_HISTOGRAM_LEN};
use crate::sort::ComputeBackend;

/// Buffers owned by a live pool. All sized from the same primitive count.
#[derive(Debug, Clone)]
pub struct PoolBuffers<T> {
    /// Final draw order: primitive index per slot.
    pub order: T,
    /// Depth keys.
    pub input_keys: T,
    pub alt_keys: T,
    pub alt_payload: T,
    pub pass_hist: T,
    pub global_hist: T,
}

impl<T> PoolBuffers<T> {
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        [
            &self.order,
            &self.input_keys,
            &self.alt_keys,
            &self.alt_payload,
            &self.pass_hist,
            &self.global_hist,
        ]
        .into_iter()
    }
}

/// Sort buffers owned by exactly one drawable.
///
/// Buffers are released through [`ResourcePool::dispose`]; dropping a pool
/// without disposing it leaves the release to the backend's handle type.
pub struct ResourcePool<B: ComputeBackend> {
    count: u32,
    /// Drawable positions (`3 * count` floats). Not owned by the pool.
    positions: B::Buffer,
    buffers: Option<PoolBuffers<B::Buffer>>,
    initialized: bool,
}

impl<B: ComputeBackend> ResourcePool<B> {
    /// Allocates every buffer for `count` primitives. The order buffer is not
    /// seeded yet.
    pub fn create(backend: &B, count: u32, positions: B::Buffer) -> Self {
        log::debug!("allocating sort buffers for {count} primitives");
        let buffers = PoolBuffers {
            order: backend.create_buffer("splat order", count),
            input_keys: backend.create_buffer("splat sort keys", count),
            alt_keys: backend.create_buffer("splat alt keys", count),
            alt_payload: backend.create_buffer("splat alt payload", count),
            pass_hist: backend.create_buffer("splat pass histogram", pass_histogram_len(count)),
            global_hist: backend.create_buffer("splat global histogram", GLOBAL_HISTOGRAM_LEN),
        };
        Self {
            count,
            positions,
            buffers: Some(buffers),
            initialized: false,
        }
    }

    /// Resizes the pool for `count` primitives.
    ///
    /// With an unchanged count only the position handle is refreshed; otherwise
    /// the pool is disposed and rebuilt from scratch, including the
    /// initialization flag.
    pub fn recreate(&mut self, backend: &B, count: u32, positions: B::Buffer) {
        if !self.is_disposed() && self.count == count {
            self.positions = positions;
            return;
        }
        self.dispose(backend);
        *self = Self::create(backend, count, positions);
    }

    /// Reallocates a disposed pool with its previous count and positions.
    pub fn restore(&mut self, backend: &B) {
        if self.is_disposed() {
            *self = Self::create(backend, self.count, self.positions.clone());
        }
    }

    /// Releases all owned buffers, keeping the position handle. Safe to call
    /// more than once.
    pub fn dispose(&mut self, backend: &B) {
        let Some(buffers) = self.buffers.take() else {
            return;
        };
        let PoolBuffers {
            order,
            input_keys,
            alt_keys,
            alt_payload,
            pass_hist,
            global_hist,
        } = buffers;
        for buffer in [order, input_keys, alt_keys, alt_payload, pass_hist, global_hist] {
            backend.release_buffer(buffer);
        }
        self.initialized = false;
        log::debug!("released sort buffers for {} primitives", self.count);
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn is_disposed(&self) -> bool {
        self.buffers.is_none()
    }

    /// Whether the order buffer was seeded with the identity permutation.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn mark_initialized(&mut self) {
        self.initialized = true;
    }

    pub fn buffers(&self) -> Option<&PoolBuffers<B::Buffer>> {
        self.buffers.as_ref()
    }

    /// The draw order handed to the renderer.
    pub fn order(&self) -> Option<&B::Buffer> {
        self.buffers.as_ref().map(|b| &b.order)
    }

    pub fn input_keys(&self) -> Option<&B::Buffer> {
        self.buffers.as_ref().map(|b| &b.input_keys)
    }

    pub fn positions(&self) -> &B::Buffer {
        &self.positions
    }
}
