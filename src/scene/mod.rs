//! Scene Database
//!
//! In-memory form of everything a compute slave needs to trace rays:
//! environment, camera, named surface properties, procedural texture
//! stacks, triangle meshes with world transforms, an optional prebuilt
//! k-d tree cache blob, and the mesh-name → property-name map.
//!
//! The database is loaded once at master startup (see [`project`]),
//! serialized by [`codec`] into a single byte stream, and pushed to every
//! slave on connection.

pub mod codec;
pub mod project;

mod camera;
mod mesh;
mod property;
mod texture;

pub use camera::CameraState;
pub use mesh::{FaceIndices, Mesh};
pub use property::{DEFAULT_PROPERTY, Property};
pub use texture::{Texture, TextureLayer};

use glam::Vec3;
use rustc_hash::FxHashMap;

use crate::errors::{RaynetError, Result};

/// How slaves shade the pixels they return.
///
/// `Plane` and `Spall` carry the cutting geometry of the most recent
/// shotline; `Path` carries its sample count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderMode {
    Flat,
    Normal,
    Phong,
    Depth,
    Grid,
    Component,
    Path { samples: u32 },
    Plane { ray_pos: Vec3, ray_dir: Vec3 },
    Spall { ray_pos: Vec3, ray_dir: Vec3, angle: f32 },
}

impl RenderMode {
    pub fn wire_id(&self) -> u32 {
        match self {
            Self::Flat => 0,
            Self::Normal => 1,
            Self::Phong => 2,
            Self::Depth => 3,
            Self::Grid => 4,
            Self::Component => 5,
            Self::Path { .. } => 6,
            Self::Plane { .. } => 7,
            Self::Spall { .. } => 8,
        }
    }

    /// Mode-dependent tail after the discriminant.
    pub fn encode_tail(&self, w: &mut crate::wire::ByteWriter) {
        match *self {
            Self::Path { samples } => w.write_u32(samples),
            Self::Plane { ray_pos, ray_dir } => {
                w.write_vec3(ray_pos);
                w.write_vec3(ray_dir);
            }
            Self::Spall {
                ray_pos,
                ray_dir,
                angle,
            } => {
                w.write_vec3(ray_pos);
                w.write_vec3(ray_dir);
                w.write_f32(angle);
            }
            _ => {}
        }
    }

    pub fn decode(id: u32, r: &mut crate::wire::ByteReader<'_>) -> Result<Self> {
        Ok(match id {
            0 => Self::Flat,
            1 => Self::Normal,
            2 => Self::Phong,
            3 => Self::Depth,
            4 => Self::Grid,
            5 => Self::Component,
            6 => Self::Path {
                samples: r.read_u32()?,
            },
            7 => Self::Plane {
                ray_pos: r.read_vec3()?,
                ray_dir: r.read_vec3()?,
            },
            8 => Self::Spall {
                ray_pos: r.read_vec3()?,
                ray_dir: r.read_vec3()?,
                angle: r.read_f32()?,
            },
            other => return Err(RaynetError::UnknownRenderMode(other)),
        })
    }
}

/// Image and tiling geometry plus the session render mode.
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    pub img_w: u32,
    pub img_h: u32,
    /// Hypersample count per pixel.
    pub img_hs: u32,
    pub tile_w: u32,
    pub tile_h: u32,
    pub render_mode: RenderMode,
}

impl Environment {
    /// Number of tiles per frame; constant for the session.
    pub fn tile_total(&self) -> u32 {
        (self.img_w * self.img_h) / (self.tile_w * self.tile_h)
    }

    /// The image must divide evenly into tiles.
    pub fn validate_tiling(&self) -> Result<()> {
        let bad = self.tile_w == 0
            || self.tile_h == 0
            || self.img_w % self.tile_w != 0
            || self.img_h % self.tile_h != 0;
        if bad {
            return Err(RaynetError::InvalidTiling {
                img_w: self.img_w,
                img_h: self.img_h,
                tile_w: self.tile_w,
                tile_h: self.tile_h,
            });
        }
        Ok(())
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            img_w: 640,
            img_h: 480,
            img_hs: 1,
            tile_w: 40,
            tile_h: 40,
            render_mode: RenderMode::Phong,
        }
    }
}

/// A surface property by name.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedProperty {
    pub name: String,
    pub prop: Property,
}

/// The complete scene a master owns and a slave reconstructs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneDb {
    pub env: Environment,
    pub camera: CameraState,
    pub properties: Vec<NamedProperty>,
    pub textures: Vec<Texture>,
    pub meshes: Vec<Mesh>,
    /// Opaque, possibly empty, prebuilt acceleration-structure blob.
    pub kdtree_cache: Vec<u8>,
    /// `(mesh name, property name)` pairs.
    pub mesh_map: Vec<(String, String)>,
}

impl SceneDb {
    /// Total triangle count across all meshes.
    pub fn total_tri_num(&self) -> u32 {
        self.meshes.iter().map(|m| m.faces.len() as u32).sum()
    }

    /// Resolve a mesh's surface property through the mesh map, falling back
    /// to [`DEFAULT_PROPERTY`] when either link is missing.
    pub fn property_for_mesh(&self, mesh_name: &str) -> Property {
        let by_name: FxHashMap<&str, &Property> = self
            .properties
            .iter()
            .map(|p| (p.name.as_str(), &p.prop))
            .collect();
        self.mesh_map
            .iter()
            .find(|(m, _)| m == mesh_name)
            .and_then(|(_, p)| by_name.get(p.as_str()).copied())
            .copied()
            .unwrap_or(DEFAULT_PROPERTY)
    }

    /// Look up a named texture.
    pub fn texture(&self, name: &str) -> Option<&Texture> {
        self.textures.iter().find(|t| t.name() == name)
    }
}
