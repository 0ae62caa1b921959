/// Position, normal, base color, opacity, scale and rotation floats.
pub const MIN_PROPERTIES: usize = 17;

/// Axis-aligned bounds of the imported positions.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bounds {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Bounds {
    pub fn point(p: [f32; 3]) -> Self {
        Self { min: p, max: p }
    }

    pub fn encapsulate(&mut self, p: [f32; 3]) {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(p[axis]);
            self.max[axis] = self.max[axis].max(p[axis]);
        }
    }
}

/// Decoded splat cloud, one entry per splat in each array.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplatAsset {
    pub splat_count: u32,
    /// Spherical harmonic bands beyond the base color, 0 to 3.
    pub sh_bands: u8,
    pub bounds: Bounds,
    pub positions: Vec<[f32; 3]>,
    /// Linear `r, g, b` DC terms and sigmoid-activated opacity.
    pub colors: Vec<[f32; 4]>,
    /// `sh_coefficients` RGB triples per splat, splat-major.
    pub shs: Vec<[f32; 3]>,
    /// Exponentiated scales.
    pub scales: Vec<[f32; 3]>,
    /// Unit quaternions, `w, x, y, z`.
    pub rotations: Vec<[f32; 4]>,
}

impl SplatAsset {
    /// SH triples stored per splat.
    pub fn sh_coefficients(&self) -> usize {
        if self.splat_count == 0 {
            0
        } else {
            self.shs.len() / self.splat_count as usize
        }
    }
}

/// SH bands implied by a vertex property count.
pub fn sh_bands_for(property_count: usize) -> u8 {
    let rest = property_count.saturating_sub(14) / 3;
    let bands = (rest as f64).sqrt().round() as i64 - 1;
    bands.clamp(0, 3) as u8
}

/// SH triples per splat implied by a vertex property count.
pub fn sh_coefficient_count(property_count: usize) -> usize {
    property_count.saturating_sub(MIN_PROPERTIES) / 3
}
