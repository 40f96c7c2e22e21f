//! Triangle meshes.

use glam::{Mat4, Vec3};

/// Face index array; small meshes keep the 16-bit form they were authored
/// with and large ones use 32-bit indices. The codec preserves the width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaceIndices {
    U16(Vec<[u16; 3]>),
    U32(Vec<[u32; 3]>),
}

impl FaceIndices {
    pub fn len(&self) -> usize {
        match self {
            Self::U16(v) => v.len(),
            Self::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Widened view of face `i`.
    pub fn face(&self, i: usize) -> [u32; 3] {
        match self {
            Self::U16(v) => {
                let f = v[i];
                [u32::from(f[0]), u32::from(f[1]), u32::from(f[2])]
            }
            Self::U32(v) => v[i],
        }
    }
}

/// One named mesh: vertices, faces and its world transform. The surface
/// property is resolved by name through the scene's mesh map.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub name: String,
    pub vertices: Vec<Vec3>,
    pub faces: FaceIndices,
    pub matrix: Mat4,
}

impl Mesh {
    pub fn new(name: impl Into<String>, vertices: Vec<Vec3>, faces: FaceIndices) -> Self {
        Self {
            name: name.into(),
            vertices,
            faces,
            matrix: Mat4::IDENTITY,
        }
    }

    /// Vertex positions with the world transform applied.
    pub fn world_vertices(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.vertices
            .iter()
            .map(move |v| self.matrix.transform_point3(*v))
    }
}
