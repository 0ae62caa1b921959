use std::collections::{BTreeSet, HashSet};

use crate::splat::{CameraId, SplatId};

/// Live drawable ids and per-camera bookkeeping. Holds ids only.
#[derive(Debug, Default)]
pub struct Registry {
    live: BTreeSet<SplatId>,
    injected: HashSet<CameraId>,
    active: Vec<SplatId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `id`. Returns `true` when the set goes from empty to non-empty.
    pub fn register(&mut self, id: SplatId) -> bool {
        let was_empty = self.live.is_empty();
        self.live.insert(id) && was_empty
    }

    /// Removes `id`. Returns `true` when this removed the last drawable, in
    /// which case the camera set and active list are cleared as well.
    pub fn unregister(&mut self, id: SplatId) -> bool {
        if !self.live.remove(&id) || !self.live.is_empty() {
            return false;
        }
        self.injected.clear();
        self.active.clear();
        true
    }

    pub fn contains(&self, id: SplatId) -> bool {
        self.live.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Rebuilds the active list from live ids accepted by `keep`. Returns
    /// whether it ended up non-empty.
    pub fn gather(&mut self, mut keep: impl FnMut(SplatId) -> bool) -> bool {
        self.active.clear();
        self.active.extend(self.live.iter().copied().filter(|&id| keep(id)));
        !self.active.is_empty()
    }

    /// Result of the last [`Registry::gather`].
    pub fn active(&self) -> &[SplatId] {
        &self.active
    }

    /// Records that `camera` has the command sequence attached. Returns `true`
    /// the first time only.
    pub fn mark_injected(&mut self, camera: CameraId) -> bool {
        self.injected.insert(camera)
    }

    pub fn is_injected(&self, camera: CameraId) -> bool {
        self.injected.contains(&camera)
    }

    pub fn injected_count(&self) -> usize {
        self.injected.len()
    }

    pub fn clear_injected(&mut self) {
        self.injected.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(index: u32) -> SplatId {
        SplatId {
            index,
            generation: 0,
        }
    }

    #[test]
    fn first_and_last_transitions() {
        let mut r = Registry::new();
        assert!(r.register(id(0)));
        assert!(!r.register(id(1)));
        assert!(!r.register(id(1)));
        assert!(!r.unregister(id(0)));
        assert!(!r.unregister(id(0)));
        assert!(r.unregister(id(1)));
        assert!(r.is_empty());
        assert!(r.register(id(2)));
    }

    #[test]
    fn last_unregister_clears_cameras() {
        let mut r = Registry::new();
        r.register(id(0));
        assert!(r.mark_injected(CameraId(7)));
        assert!(!r.mark_injected(CameraId(7)));
        r.gather(|_| true);
        assert_eq!(r.active(), [id(0)]);

        r.unregister(id(0));
        assert_eq!(r.injected_count(), 0);
        assert!(r.active().is_empty());
    }

    #[test]
    fn gather_filters() {
        let mut r = Registry::new();
        for i in 0..4 {
            r.register(id(i));
        }
        assert!(r.gather(|s| s.index % 2 == 1));
        assert_eq!(r.active(), [id(1), id(3)]);
        assert!(!r.gather(|_| false));
        assert!(r.active().is_empty());
    }
}
