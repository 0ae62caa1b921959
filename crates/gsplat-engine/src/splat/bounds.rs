use glam::{Mat4, Vec3};

/// Axis-aligned bounding box.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest box containing every point, or `None` for an empty input.
    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        Some(points.fold(Self::new(first, first), |b, p| b.encapsulate(p)))
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Half size along each axis.
    #[inline]
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    #[must_use]
    pub fn encapsulate(self, p: Vec3) -> Self {
        Self::new(self.min.min(p), self.max.max(p))
    }

    /// Box around the eight corners of `self` after `transform`.
    pub fn transformed(&self, transform: &Mat4) -> Self {
        let c = self.center();
        let e = self.extents();
        let corner = |sx: f32, sy: f32, sz: f32| {
            transform.transform_point3(c + Vec3::new(sx * e.x, sy * e.y, sz * e.z))
        };

        let mut out = Self::new(corner(1.0, 1.0, 1.0), corner(1.0, 1.0, 1.0));
        for sx in [1.0, -1.0] {
            for sy in [1.0, -1.0] {
                for sz in [1.0, -1.0] {
                    out = out.encapsulate(corner(sx, sy, sz));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).abs().max_element() < 1e-5
    }

    #[test]
    fn from_points_covers_input() {
        let b = Aabb::from_points([
            Vec3::new(1.0, -2.0, 0.5),
            Vec3::new(-1.0, 4.0, 0.0),
            Vec3::new(0.0, 0.0, 3.0),
        ])
        .unwrap();
        assert_eq!(b.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(b.max, Vec3::new(1.0, 4.0, 3.0));
        assert!(Aabb::from_points(std::iter::empty()).is_none());
    }

    #[test]
    fn translation_moves_box() {
        let b = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let t = b.transformed(&Mat4::from_translation(Vec3::new(10.0, 0.0, -5.0)));
        assert!(approx(t.min, Vec3::new(9.0, -1.0, -6.0)));
        assert!(approx(t.max, Vec3::new(11.0, 1.0, -4.0)));
    }

    #[test]
    fn rotation_grows_box() {
        let b = Aabb::new(Vec3::new(-1.0, -1.0, 0.0), Vec3::new(1.0, 1.0, 0.0));
        let t = b.transformed(&Mat4::from_rotation_z(std::f32::consts::FRAC_PI_4));
        let r = std::f32::consts::SQRT_2;
        assert!(approx(t.min, Vec3::new(-r, -r, 0.0)));
        assert!(approx(t.max, Vec3::new(r, r, 0.0)));
    }
}
