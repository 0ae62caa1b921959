use crate::sort::KeyOrder;

/// How the host drives the sorter each frame.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum HookStyle {
    /// Host fires a pre-cull callback per camera and replays a persistent
    /// command sequence attached to that camera.
    #[default]
    CameraCallback,
    /// Pre-cull gather, then a graph pass records into a per-frame stream.
    RenderGraph,
    /// A custom pass executes with a fresh stream.
    CustomPass,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SorterSettings {
    pub hook_style: HookStyle,
    pub key_order: KeyOrder,
    /// Splats per quad-mesh draw instance.
    pub splat_instance_size: u32,
}

impl Default for SorterSettings {
    fn default() -> Self {
        Self {
            hook_style: HookStyle::default(),
            key_order: KeyOrder::default(),
            splat_instance_size: 128,
        }
    }
}

impl SorterSettings {
    pub fn is_valid(&self) -> bool {
        self.splat_instance_size > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let s = SorterSettings::default();
        assert!(s.is_valid());
        assert_eq!(s.hook_style, HookStyle::CameraCallback);
        assert_eq!(s.key_order, KeyOrder::Ascending);
    }

    #[test]
    fn zero_instance_size_is_invalid() {
        let s = SorterSettings {
            splat_instance_size: 0,
            ..Default::default()
        };
        assert!(!s.is_valid());
    }
}
