use glam::Mat4;

/// Host-assigned camera identity. Stable across frames.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct CameraId(pub u64);

/// What a camera renders for. Preview cameras never get sorted work.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum CameraKind {
    #[default]
    Game,
    SceneView,
    Preview,
    Reflection,
}

/// Per-frame camera state handed over by the host.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Camera {
    pub id: CameraId,
    pub kind: CameraKind,
    /// World-to-view matrix.
    pub view: Mat4,
}

impl Camera {
    pub fn new(id: CameraId, kind: CameraKind, view: Mat4) -> Self {
        Self { id, kind, view }
    }

    pub fn is_preview(&self) -> bool {
        self.kind == CameraKind::Preview
    }
}
