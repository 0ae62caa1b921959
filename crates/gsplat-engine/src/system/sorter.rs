use std::rc::Rc;

use crate::sort::{ComputeBackend, RadixSort, SortArgs};
use crate::splat::{Camera, InstanceMesh, SortTarget, Splat, SplatArena, SplatId};

use super::registry::Registry;
use super::settings::{HookStyle, SorterSettings};

/// Label of the persistent command sequence used with
/// [`HookStyle::CameraCallback`].
pub const SORT_PASS_NAME: &str = "SortGsplats";

/// Owns the drawables and the sort engine and decides, per camera, what to
/// sort.
///
/// Everything runs on the caller's thread. Recorded work is never waited on;
/// the host submits the streams it receives or takes.
pub struct SplatSorter<B: ComputeBackend, T: SortTarget<B> = Splat<B>> {
    backend: Rc<B>,
    sort: Option<RadixSort<B>>,
    settings: SorterSettings,
    instance_mesh: InstanceMesh,

    splats: SplatArena<T>,
    registry: Registry,

    /// Whether per-camera pre-cull callbacks are being handled.
    listening: bool,
    command_sequence: Option<B::Stream>,
}

impl<B: ComputeBackend, T: SortTarget<B>> SplatSorter<B, T> {
    pub fn new(backend: Rc<B>, settings: SorterSettings) -> Self {
        let mut sorter = Self {
            backend: backend.clone(),
            sort: None,
            settings,
            instance_mesh: InstanceMesh::new(settings.splat_instance_size),
            splats: SplatArena::new(),
            registry: Registry::new(),
            listening: false,
            command_sequence: None,
        };
        sorter.init_sorter(backend);
        sorter
    }

    /// (Re)builds the sort engine on `backend`.
    pub fn init_sorter(&mut self, backend: Rc<B>) {
        let sort = RadixSort::new(backend.clone());
        if sort.is_valid() {
            log::info!("splat sorter ready");
        }
        self.backend = backend;
        self.sort = Some(sort);
    }

    /// Drops the sort engine. The sorter stays usable but records nothing.
    pub fn clear_sorter(&mut self) {
        self.sort = None;
    }

    pub fn is_valid(&self) -> bool {
        self.sort.as_ref().is_some_and(RadixSort::is_valid)
    }

    pub fn backend(&self) -> &Rc<B> {
        &self.backend
    }

    pub fn settings(&self) -> &SorterSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: SorterSettings) {
        if settings.splat_instance_size != self.settings.splat_instance_size {
            self.instance_mesh = InstanceMesh::new(settings.splat_instance_size);
        }
        self.settings = settings;

        let listen = settings.hook_style == HookStyle::CameraCallback && !self.registry.is_empty();
        if listen && !self.listening {
            self.start_listening();
        } else if !listen && self.listening {
            self.stop_listening();
        }
    }

    pub fn instance_mesh(&self) -> &InstanceMesh {
        &self.instance_mesh
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Whether pre-cull callbacks are being handled (legacy hosts only).
    pub fn is_listening(&self) -> bool {
        self.listening
    }

    // ── drawables ─────────────────────────────────────────────────────────

    /// Takes ownership of `target` and registers it.
    pub fn insert(&mut self, target: T) -> SplatId {
        let id = self.splats.insert(target);
        self.register(id);
        id
    }

    /// Unregisters `id`, releases its buffers and hands the drawable back.
    pub fn remove(&mut self, id: SplatId) -> Option<T> {
        let mut target = self.splats.remove(id)?;
        self.unregister(id);
        target.resources_mut().dispose(&self.backend);
        Some(target)
    }

    /// Restores the buffers of a disabled drawable and registers it again.
    pub fn enable(&mut self, id: SplatId) -> bool {
        let Some(target) = self.splats.get_mut(id) else {
            return false;
        };
        target.resources_mut().restore(&self.backend);
        self.register(id);
        true
    }

    /// Unregisters `id` and releases its buffers; the drawable stays stored.
    pub fn disable(&mut self, id: SplatId) -> bool {
        let Some(target) = self.splats.get_mut(id) else {
            return false;
        };
        target.resources_mut().dispose(&self.backend);
        self.unregister(id);
        true
    }

    pub fn get(&self, id: SplatId) -> Option<&T> {
        self.splats.get(id)
    }

    pub fn get_mut(&mut self, id: SplatId) -> Option<&mut T> {
        self.splats.get_mut(id)
    }

    pub fn splats(&self) -> impl Iterator<Item = (SplatId, &T)> {
        self.splats.iter()
    }

    // ── registration ──────────────────────────────────────────────────────

    /// Adds a stored drawable to the live set.
    pub fn register(&mut self, id: SplatId) {
        if !self.splats.contains(id) {
            log::warn!("register of unknown splat {id:?} ignored");
            return;
        }
        if self.registry.register(id) && self.settings.hook_style == HookStyle::CameraCallback {
            self.start_listening();
        }
    }

    /// Removes `id` from the live set. The last removal stops listening and
    /// releases the command sequence.
    pub fn unregister(&mut self, id: SplatId) {
        if self.registry.unregister(id) {
            self.stop_listening();
        }
    }

    fn start_listening(&mut self) {
        log::debug!("listening for camera pre-cull");
        self.listening = true;
    }

    fn stop_listening(&mut self) {
        if self.listening {
            log::debug!("stopped listening for camera pre-cull");
        }
        self.listening = false;
        self.registry.clear_injected();
        self.command_sequence = None;
    }

    // ── per camera ────────────────────────────────────────────────────────

    /// Rebuilds the active list for `camera`: live drawables that are active
    /// and valid. Preview cameras get nothing.
    pub fn gather_for_camera(&mut self, camera: &Camera) -> bool {
        if camera.is_preview() {
            return false;
        }
        let splats = &self.splats;
        self.registry
            .gather(|id| splats.get(id).is_some_and(|t| t.is_active() && t.is_valid()))
    }

    /// Records key generation and sorting for every gathered drawable.
    ///
    /// Order buffers are seeded with the identity once per pool.
    pub fn dispatch_sort(&mut self, stream: &mut B::Stream, camera: &Camera) {
        let Some(sort) = self.sort.as_ref().filter(|s| s.is_valid()) else {
            log::trace!("sorter invalid; skipping camera {:?}", camera.id);
            return;
        };
        if !self.settings.is_valid() {
            log::trace!("settings invalid; skipping camera {:?}", camera.id);
            return;
        }

        for &id in self.registry.active() {
            let Some(target) = self.splats.get_mut(id) else {
                continue;
            };
            let count = target.primitive_count();
            let matrix_mv = camera.view * target.local_to_world();

            let pool = target.resources_mut();
            if !pool.is_initialized() {
                if let Some(order) = pool.order() {
                    sort.init_payload(stream, order, pool.count());
                }
                pool.mark_initialized();
            }

            sort.dispatch(
                stream,
                &SortArgs {
                    pool: &*pool,
                    count,
                    matrix_mv,
                    key_order: self.settings.key_order,
                },
            );
        }
    }

    /// Legacy pre-cull path: records into the persistent command sequence,
    /// attaching it to `camera` the first time. Returns whether work was
    /// recorded.
    pub fn on_pre_cull(&mut self, camera: &Camera) -> bool {
        if !self.listening {
            return false;
        }
        if !self.is_valid() || !self.settings.is_valid() {
            log::trace!("pre-cull for camera {:?} skipped", camera.id);
            return false;
        }
        if !self.gather_for_camera(camera) {
            return false;
        }

        if self.registry.mark_injected(camera.id) {
            log::debug!("attached '{SORT_PASS_NAME}' to camera {:?}", camera.id);
        }
        // A fresh stream stands in for clearing the reusable sequence.
        let mut sequence = self.backend.begin_stream(SORT_PASS_NAME);
        self.dispatch_sort(&mut sequence, camera);
        self.command_sequence = Some(sequence);
        true
    }

    /// Unified entry for hosts that hand over a stream: gather, then record.
    pub fn on_before_transparents(&mut self, camera: &Camera, stream: &mut B::Stream) -> bool {
        if !self.is_valid() || !self.settings.is_valid() {
            log::trace!("before-transparents for camera {:?} skipped", camera.id);
            return false;
        }
        if !self.gather_for_camera(camera) {
            return false;
        }
        self.dispatch_sort(stream, camera);
        true
    }

    /// The sequence recorded by the last [`SplatSorter::on_pre_cull`].
    pub fn command_sequence(&self) -> Option<&B::Stream> {
        self.command_sequence.as_ref()
    }

    pub fn take_command_sequence(&mut self) -> Option<B::Stream> {
        self.command_sequence.take()
    }
}
