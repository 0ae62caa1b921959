use glam::{Mat4, Vec3};

/// Direction of the depth keys produced by `CalcDistance`.
///
/// With right-handed view matrices (camera looking down −Z) a farther point has
/// a more negative view-space `z`, so [`KeyOrder::Ascending`] yields a
/// back-to-front order.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum KeyOrder {
    #[default]
    Ascending,
    /// Every key bit is inverted, reversing the order.
    Descending,
}

impl KeyOrder {
    /// Value passed to the kernels in `SortConstants::descending`.
    #[inline]
    pub fn as_flag(self) -> u32 {
        match self {
            KeyOrder::Ascending => 0,
            KeyOrder::Descending => 1,
        }
    }
}

/// Maps an IEEE-754 bit pattern to a `u32` whose unsigned order matches the
/// float order: negative values have every bit flipped, non-negative values get
/// the sign bit set.
#[inline]
pub fn float_to_sortable(bits: u32) -> u32 {
    let mask = if bits & 0x8000_0000 != 0 {
        0xffff_ffff
    } else {
        0x8000_0000
    };
    bits ^ mask
}

/// Depth key parameters for the `CalcDistance` kernel.
///
/// The GPU computes keys itself; the helpers here produce identical keys on the
/// CPU for the reference backend, tests and tooling.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct DepthKeyGenerator {
    pub order: KeyOrder,
}

impl DepthKeyGenerator {
    pub fn new(order: KeyOrder) -> Self {
        Self { order }
    }

    /// Key for a view-space depth.
    #[inline]
    pub fn key_for_depth(&self, depth: f32) -> u32 {
        let key = float_to_sortable(depth.to_bits());
        match self.order {
            KeyOrder::Ascending => key,
            KeyOrder::Descending => !key,
        }
    }

    /// Key for an object-space position under `matrix_mv`
    /// (`camera.view * local_to_world`).
    #[inline]
    pub fn key_for_position(&self, matrix_mv: &Mat4, position: Vec3) -> u32 {
        self.key_for_depth(view_depth(matrix_mv, position))
    }
}

/// View-space `z` of `position`.
#[inline]
pub fn view_depth(matrix_mv: &Mat4, position: Vec3) -> f32 {
    (*matrix_mv * position.extend(1.0)).z
}
