//! Host render hooks.
//!
//! Every host reaches the sorter through [`TransparentsHook`]; the adapters
//! below only translate each host's frame events into those calls.

use crate::sort::ComputeBackend;
use crate::splat::{Camera, SortTarget};

use super::sorter::SplatSorter;

/// Sort work recorded right before transparent geometry is drawn.
pub trait TransparentsHook<B: ComputeBackend> {
    /// Refreshes the set of drawables to sort for `camera`.
    fn gather_for_camera(&mut self, camera: &Camera) -> bool;

    /// Records sorting of the gathered drawables into `stream`.
    fn dispatch_sort(&mut self, stream: &mut B::Stream, camera: &Camera);

    /// Gathers and records in one step. Returns whether anything was recorded.
    fn on_before_transparents(&mut self, camera: &Camera, stream: &mut B::Stream) -> bool {
        if !self.gather_for_camera(camera) {
            return false;
        }
        self.dispatch_sort(stream, camera);
        true
    }
}

impl<B: ComputeBackend, T: SortTarget<B>> TransparentsHook<B> for SplatSorter<B, T> {
    fn gather_for_camera(&mut self, camera: &Camera) -> bool {
        SplatSorter::gather_for_camera(self, camera)
    }

    fn dispatch_sort(&mut self, stream: &mut B::Stream, camera: &Camera) {
        SplatSorter::dispatch_sort(self, stream, camera)
    }

    fn on_before_transparents(&mut self, camera: &Camera, stream: &mut B::Stream) -> bool {
        SplatSorter::on_before_transparents(self, camera, stream)
    }
}

/// Hosts with per-camera pre-cull callbacks and command sequences attached
/// to cameras.
///
/// The sorter keeps one sequence, attaches it to each camera once, and
/// re-records it every pre-cull. The host replays
/// [`SplatSorter::command_sequence`] before transparents.
#[derive(Debug, Default)]
pub struct CameraCallbackHook;

impl CameraCallbackHook {
    pub fn on_pre_cull<B: ComputeBackend, T: SortTarget<B>>(
        &mut self,
        sorter: &mut SplatSorter<B, T>,
        camera: &Camera,
    ) -> bool {
        sorter.on_pre_cull(camera)
    }
}

/// Render-graph hosts: gather during camera pre-cull, record when the graph
/// executes the pass.
#[derive(Debug, Default)]
pub struct RenderGraphHook {
    has_camera: bool,
}

impl RenderGraphHook {
    /// Decides whether the pass is enqueued for this camera.
    pub fn on_camera_pre_cull<B: ComputeBackend, H: TransparentsHook<B>>(
        &mut self,
        hook: &mut H,
        camera: &Camera,
    ) -> bool {
        self.has_camera = hook.gather_for_camera(camera);
        self.has_camera
    }

    /// Whether the last pre-cull found anything to sort.
    pub fn has_camera(&self) -> bool {
        self.has_camera
    }

    /// Pass body: records into the graph's stream.
    pub fn record<B: ComputeBackend, H: TransparentsHook<B>>(
        &mut self,
        hook: &mut H,
        camera: &Camera,
        stream: &mut B::Stream,
    ) -> bool {
        if !self.has_camera {
            return false;
        }
        hook.dispatch_sort(stream, camera);
        true
    }
}

/// Custom-pass hosts: one call per camera with a fresh stream.
#[derive(Debug, Default)]
pub struct CustomPassHook;

impl CustomPassHook {
    pub fn execute<B: ComputeBackend, H: TransparentsHook<B>>(
        &mut self,
        hook: &mut H,
        camera: &Camera,
        stream: &mut B::Stream,
    ) -> bool {
        hook.on_before_transparents(camera, stream)
    }
}
