/// Reinterprets an instance index as the bits of an `f32`.
///
/// The quad mesh carries the index in the `z` component of every vertex; the
/// vertex shader recovers it with `bitcast<u32>`. The value is a bit pattern,
/// not a number, and must not be converted numerically.
#[inline]
pub fn index_as_float_bits(index: u32) -> f32 {
    f32::from_bits(index)
}

/// Quad mesh holding `instance_size` splats per draw instance.
///
/// Each splat is a `[-1, 1]²` quad of four vertices and six indices; the `z`
/// component encodes the splat's slot inside the instance.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceMesh {
    instance_size: u32,
    vertices: Vec<[f32; 3]>,
    indices: Vec<u32>,
}

impl InstanceMesh {
    pub fn new(instance_size: u32) -> Self {
        let mut vertices = Vec::with_capacity(4 * instance_size as usize);
        let mut indices = Vec::with_capacity(6 * instance_size as usize);

        for i in 0..instance_size {
            let z = index_as_float_bits(i);
            vertices.extend_from_slice(&[
                [-1.0, -1.0, z],
                [1.0, -1.0, z],
                [-1.0, 1.0, z],
                [1.0, 1.0, z],
            ]);

            let b = i * 4;
            indices.extend_from_slice(&[b, b + 1, b + 2, b + 1, b + 3, b + 2]);
        }

        Self {
            instance_size,
            vertices,
            indices,
        }
    }

    pub fn instance_size(&self) -> u32 {
        self.instance_size
    }

    pub fn vertices(&self) -> &[[f32; 3]] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Instances to draw for `splat_count` splats.
    pub fn instance_count(&self, splat_count: u32) -> u32 {
        if self.instance_size == 0 {
            return 0;
        }
        splat_count.div_ceil(self.instance_size)
    }
}
