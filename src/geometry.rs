use serde::{Deserialize, Serialize};

/// GPU ready mesh buffers with interleaved attributes.
///
/// Vertices are laid out as `position.xyz`, `normal.xyz`, `uv.xy`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MeshData {
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
}

/// Number of floats per interleaved vertex.
pub const VERTEX_STRIDE: usize = 8;

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / VERTEX_STRIDE
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Builds a flat plane in the XY plane facing +Z, centered on the origin.
///
/// Matches the convention of the authoring library: a floor is a plane
/// rotated -90 degrees around X by its node transform, not a special mesh.
pub fn plane(width: f32, height: f32) -> MeshData {
    let hw = width * 0.5;
    let hh = height * 0.5;
    let vertices = vec![
        -hw, -hh, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, //
        hw, -hh, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, //
        hw, hh, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0, //
        -hw, hh, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0,
    ];
    let indices = vec![0, 1, 2, 0, 2, 3];
    MeshData { vertices, indices }
}

/// Builds a unit cube centered on the origin with per-face normals.
pub fn unit_cube() -> MeshData {
    // Six faces, four vertices each, so normals stay hard-edged.
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
    ];

    let mut vertices = Vec::with_capacity(6 * 4 * VERTEX_STRIDE);
    let mut indices = Vec::with_capacity(36);
    for (face, (normal, tangent, bitangent)) in faces.iter().enumerate() {
        let corners = [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)];
        for (u, v) in corners.iter() {
            for axis in 0..3 {
                let position = normal[axis] * 0.5 + tangent[axis] * u + bitangent[axis] * v;
                vertices.push(position);
            }
            vertices.extend_from_slice(normal);
            vertices.push(*u + 0.5);
            vertices.push(*v + 0.5);
        }
        let base = (face * 4) as u32;
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    MeshData { vertices, indices }
}
