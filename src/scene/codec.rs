//! Scene Codec
//!
//! Packs a [`SceneDb`] into a single byte stream and unpacks it on the
//! slave side. The stream is sectioned, versioned and length-prefixed:
//!
//! ```text
//! u16 version
//! section ENV      { u32 len; tagged records: ENV_RM, ENV_IMG }
//! section CAMERA   { u32 len; pos, focus, tilt, fov, dof }
//! section PROP     { u32 len; repeated name + 7 floats }
//! section TEXTURE  { u32 len; repeated u16 kind + kind body }
//! section MESH     { u32 len; u32 total_tri_num; repeated mesh records }
//! section KDCACHE  { u32 len; opaque bytes, may be empty }
//! section MESHMAP  { u32 len; repeated mesh name + property name }
//! ```
//!
//! The packer is the single source of truth for the layout and never emits
//! interior padding. The unpacker detects byte order from the leading
//! version word and flips scalars as needed; opaque blobs stay raw.
//! Unknown tagged records inside a section are skipped to the section
//! boundary.

use glam::Mat4;
use log::debug;

use super::texture::kinds;
use super::{
    CameraState, Environment, FaceIndices, Mesh, NamedProperty, Property, RenderMode, SceneDb,
    Texture, TextureLayer,
};
use crate::errors::{RaynetError, Result};
use crate::wire::{ByteReader, ByteWriter};

/// Leading version word; asymmetric, so a byte-swapped stream is
/// recognizable from it.
pub const SCENE_VERSION: u16 = 1;

/// Environment record tags.
const ENV_RM: u16 = 0x0300;
const ENV_IMG: u16 = 0x0301;

// ============================================================================
// Packing
// ============================================================================

/// Pack in the master's native byte order.
pub fn pack_scene(db: &SceneDb) -> Vec<u8> {
    pack_scene_with(db, false)
}

/// Pack with optionally byte-swapped scalars; the swapped form exists so
/// tests can exercise the flip path without foreign hardware.
pub fn pack_scene_with(db: &SceneDb, swapped: bool) -> Vec<u8> {
    let mut w = if swapped {
        ByteWriter::swapped()
    } else {
        ByteWriter::new()
    };

    w.write_u16(SCENE_VERSION);
    pack_env(&mut w, &db.env);
    pack_camera(&mut w, &db.camera);
    pack_properties(&mut w, &db.properties);
    pack_textures(&mut w, &db.textures);
    pack_meshes(&mut w, db);
    pack_kdtree_cache(&mut w, &db.kdtree_cache);
    pack_mesh_map(&mut w, &db.mesh_map);

    w.into_vec()
}

fn pack_env(w: &mut ByteWriter, env: &Environment) {
    let mark = w.begin_section();

    w.write_u16(ENV_RM);
    w.write_u32(env.render_mode.wire_id());
    env.render_mode.encode_tail(w);

    w.write_u16(ENV_IMG);
    w.write_u32(env.img_w);
    w.write_u32(env.img_h);
    w.write_u32(env.img_hs);

    w.end_section(mark);
}

fn pack_camera(w: &mut ByteWriter, cam: &CameraState) {
    let mark = w.begin_section();
    w.write_vec3(cam.pos);
    w.write_vec3(cam.focus);
    w.write_f32(cam.tilt);
    w.write_f32(cam.fov);
    w.write_f32(cam.dof);
    w.end_section(mark);
}

fn pack_properties(w: &mut ByteWriter, props: &[NamedProperty]) {
    let mark = w.begin_section();
    for p in props {
        w.write_name(&p.name);
        w.write_vec3(p.prop.color);
        w.write_f32(p.prop.density);
        w.write_f32(p.prop.gloss);
        w.write_f32(p.prop.emission);
        w.write_f32(p.prop.ior);
    }
    w.end_section(mark);
}

fn pack_textures(w: &mut ByteWriter, textures: &[Texture]) {
    let mark = w.begin_section();
    for tex in textures {
        match tex {
            Texture::Stack { name, layers } => {
                w.write_u16(kinds::STACK);
                w.write_name(name);
                for layer in layers {
                    pack_layer(w, layer);
                }
            }
            Texture::Mix {
                name,
                texture1,
                texture2,
                coef,
            } => {
                w.write_u16(kinds::MIX);
                w.write_name(name);
                w.write_name(texture1);
                w.write_name(texture2);
                w.write_f32(*coef);
            }
        }
    }
    w.end_section(mark);
}

fn pack_layer(w: &mut ByteWriter, layer: &TextureLayer) {
    match layer {
        TextureLayer::Blend { color1, color2 } => {
            w.write_u16(kinds::BLEND);
            w.write_vec3(*color1);
            w.write_vec3(*color2);
        }
        TextureLayer::Bump { coef } => {
            w.write_u16(kinds::BUMP);
            w.write_vec3(*coef);
        }
        TextureLayer::Checker { tile } => {
            w.write_u16(kinds::CHECKER);
            w.write_u32(*tile);
        }
        TextureLayer::Camo {
            size,
            octaves,
            absolute,
            color1,
            color2,
            color3,
        } => {
            w.write_u16(kinds::CAMO);
            w.write_f32(*size);
            w.write_u32(*octaves);
            w.write_u32(*absolute);
            w.write_vec3(*color1);
            w.write_vec3(*color2);
            w.write_vec3(*color3);
        }
        TextureLayer::Clouds {
            size,
            octaves,
            absolute,
            scale,
            translate,
        } => {
            w.write_u16(kinds::CLOUDS);
            w.write_f32(*size);
            w.write_u32(*octaves);
            w.write_u32(*absolute);
            w.write_vec3(*scale);
            w.write_vec3(*translate);
        }
        TextureLayer::Image {
            width,
            height,
            pixels,
        } => {
            w.write_u16(kinds::IMAGE);
            w.write_u16(*width);
            w.write_u16(*height);
            w.write_bytes(pixels);
        }
        TextureLayer::Gradient { axis } => {
            w.write_u16(kinds::GRADIENT);
            w.write_u32(*axis);
        }
    }
}

fn pack_meshes(w: &mut ByteWriter, db: &SceneDb) {
    let mark = w.begin_section();
    w.write_u32(db.total_tri_num());

    for mesh in &db.meshes {
        w.write_name(&mesh.name);

        w.write_u32(mesh.vertices.len() as u32);
        for v in &mesh.vertices {
            w.write_vec3(*v);
        }

        match &mesh.faces {
            FaceIndices::U32(faces) => {
                w.write_u8(1);
                w.write_u32(faces.len() as u32);
                for f in faces {
                    w.write_u32(f[0]);
                    w.write_u32(f[1]);
                    w.write_u32(f[2]);
                }
            }
            FaceIndices::U16(faces) => {
                w.write_u8(0);
                w.write_u16(faces.len() as u16);
                for f in faces {
                    w.write_u16(f[0]);
                    w.write_u16(f[1]);
                    w.write_u16(f[2]);
                }
            }
        }

        for value in mesh.matrix.to_cols_array() {
            w.write_f32(value);
        }
    }
    w.end_section(mark);
}

fn pack_kdtree_cache(w: &mut ByteWriter, cache: &[u8]) {
    let mark = w.begin_section();
    w.write_bytes(cache);
    w.end_section(mark);
}

fn pack_mesh_map(w: &mut ByteWriter, map: &[(String, String)]) {
    let mark = w.begin_section();
    for (mesh, prop) in map {
        w.write_name(mesh);
        w.write_name(prop);
    }
    w.end_section(mark);
}

// ============================================================================
// Unpacking
// ============================================================================

/// Reconstruct a [`SceneDb`] from a packed stream, flipping scalars when
/// the leading version word shows the packer ran on opposite-order
/// hardware. Tile dimensions are not part of the stream; they arrive with
/// each work unit, so the unpacked environment carries the defaults.
pub fn unpack_scene(buf: &[u8]) -> Result<SceneDb> {
    let mut probe = ByteReader::new(buf, false);
    let ver = probe.read_u16()?;
    let flip = if ver == SCENE_VERSION {
        false
    } else if ver.swap_bytes() == SCENE_VERSION {
        true
    } else {
        return Err(RaynetError::BadSceneVersion(ver));
    };

    let mut r = ByteReader::new(&buf[2..], flip);
    let mut db = SceneDb::default();

    unpack_env(&mut section(&mut r)?, &mut db.env)?;
    unpack_camera(&mut section(&mut r)?, &mut db.camera)?;
    unpack_properties(&mut section(&mut r)?, &mut db.properties)?;
    unpack_textures(&mut section(&mut r)?, &mut db.textures)?;
    unpack_meshes(&mut section(&mut r)?, &mut db.meshes)?;
    db.kdtree_cache = section(&mut r)?.read_bytes_remaining();
    unpack_mesh_map(&mut section(&mut r)?, &mut db.mesh_map)?;

    Ok(db)
}

/// Split off the next length-prefixed section as its own reader.
fn section<'a>(r: &mut ByteReader<'a>) -> Result<SectionReader<'a>> {
    let len = r.read_u32()? as usize;
    let body = r.read_bytes(len)?;
    Ok(SectionReader {
        inner: ByteReader::new(body, r.flips()),
    })
}

struct SectionReader<'a> {
    inner: ByteReader<'a>,
}

impl<'a> SectionReader<'a> {
    fn read_bytes_remaining(mut self) -> Vec<u8> {
        let n = self.inner.remaining();
        self.inner.read_bytes(n).map(<[u8]>::to_vec).unwrap_or_default()
    }
}

impl<'a> std::ops::Deref for SectionReader<'a> {
    type Target = ByteReader<'a>;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl std::ops::DerefMut for SectionReader<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

fn unpack_env(r: &mut SectionReader<'_>, env: &mut Environment) -> Result<()> {
    while r.remaining() > 0 {
        let tag = r.read_u16()?;
        match tag {
            ENV_RM => {
                let id = r.read_u32()?;
                env.render_mode = RenderMode::decode(id, r)?;
            }
            ENV_IMG => {
                env.img_w = r.read_u32()?;
                env.img_h = r.read_u32()?;
                env.img_hs = r.read_u32()?;
            }
            unknown => {
                // Tag bodies are not self-delimiting; the section length is
                // the recovery boundary.
                debug!("skipping unknown environment tag {unknown:#06x}");
                let n = r.remaining();
                r.skip(n)?;
            }
        }
    }
    Ok(())
}

fn unpack_camera(r: &mut SectionReader<'_>, cam: &mut CameraState) -> Result<()> {
    cam.pos = r.read_vec3()?;
    cam.focus = r.read_vec3()?;
    cam.tilt = r.read_f32()?;
    cam.fov = r.read_f32()?;
    cam.dof = r.read_f32()?;
    Ok(())
}

fn unpack_properties(r: &mut SectionReader<'_>, props: &mut Vec<NamedProperty>) -> Result<()> {
    while r.remaining() > 0 {
        let name = r.read_name()?;
        let prop = Property {
            color: r.read_vec3()?,
            density: r.read_f32()?,
            gloss: r.read_f32()?,
            emission: r.read_f32()?,
            ior: r.read_f32()?,
        };
        props.push(NamedProperty { name, prop });
    }
    Ok(())
}

fn unpack_textures(r: &mut SectionReader<'_>, textures: &mut Vec<Texture>) -> Result<()> {
    while r.remaining() > 0 {
        let kind = r.read_u16()?;
        match kind {
            kinds::STACK => {
                let name = r.read_name()?;
                textures.push(Texture::Stack {
                    name,
                    layers: Vec::new(),
                });
            }
            kinds::MIX => {
                let name = r.read_name()?;
                let texture1 = r.read_name()?;
                let texture2 = r.read_name()?;
                let coef = r.read_f32()?;
                textures.push(Texture::Mix {
                    name,
                    texture1,
                    texture2,
                    coef,
                });
            }
            layer_kind => {
                let layer = unpack_layer(layer_kind, r)?;
                match textures.last_mut() {
                    Some(Texture::Stack { layers, .. }) => layers.push(layer),
                    _ => return Err(RaynetError::OrphanTextureLayer),
                }
            }
        }
    }
    Ok(())
}

fn unpack_layer(kind: u16, r: &mut SectionReader<'_>) -> Result<TextureLayer> {
    Ok(match kind {
        kinds::BLEND => TextureLayer::Blend {
            color1: r.read_vec3()?,
            color2: r.read_vec3()?,
        },
        kinds::BUMP => TextureLayer::Bump {
            coef: r.read_vec3()?,
        },
        kinds::CHECKER => TextureLayer::Checker {
            tile: r.read_u32()?,
        },
        kinds::CAMO => TextureLayer::Camo {
            size: r.read_f32()?,
            octaves: r.read_u32()?,
            absolute: r.read_u32()?,
            color1: r.read_vec3()?,
            color2: r.read_vec3()?,
            color3: r.read_vec3()?,
        },
        kinds::CLOUDS => TextureLayer::Clouds {
            size: r.read_f32()?,
            octaves: r.read_u32()?,
            absolute: r.read_u32()?,
            scale: r.read_vec3()?,
            translate: r.read_vec3()?,
        },
        kinds::IMAGE => {
            let width = r.read_u16()?;
            let height = r.read_u16()?;
            let n = 3 * width as usize * height as usize;
            TextureLayer::Image {
                width,
                height,
                pixels: r.read_bytes(n)?.to_vec(),
            }
        }
        kinds::GRADIENT => TextureLayer::Gradient {
            axis: r.read_u32()?,
        },
        other => return Err(RaynetError::UnknownTextureKind(other)),
    })
}

fn unpack_meshes(r: &mut SectionReader<'_>, meshes: &mut Vec<Mesh>) -> Result<()> {
    let total_tri = r.read_u32()?;
    let mut seen_tri: u64 = 0;

    while r.remaining() > 0 {
        let name = r.read_name()?;

        let num_vertices = r.read_u32()? as usize;
        if num_vertices * 12 > r.remaining() {
            return Err(RaynetError::FieldOutOfBounds {
                context: "mesh vertex count",
                value: num_vertices as u64,
            });
        }
        let mut vertices = Vec::with_capacity(num_vertices);
        for _ in 0..num_vertices {
            vertices.push(r.read_vec3()?);
        }

        let index_is_u32 = r.read_u8()? != 0;
        let faces = if index_is_u32 {
            let num_faces = r.read_u32()? as usize;
            seen_tri += num_faces as u64;
            if seen_tri > u64::from(total_tri) {
                return Err(RaynetError::FieldOutOfBounds {
                    context: "mesh face count",
                    value: seen_tri,
                });
            }
            let mut faces = Vec::with_capacity(num_faces);
            for _ in 0..num_faces {
                faces.push([r.read_u32()?, r.read_u32()?, r.read_u32()?]);
            }
            FaceIndices::U32(faces)
        } else {
            let num_faces = r.read_u16()? as usize;
            seen_tri += num_faces as u64;
            if seen_tri > u64::from(total_tri) {
                return Err(RaynetError::FieldOutOfBounds {
                    context: "mesh face count",
                    value: seen_tri,
                });
            }
            let mut faces = Vec::with_capacity(num_faces);
            for _ in 0..num_faces {
                faces.push([r.read_u16()?, r.read_u16()?, r.read_u16()?]);
            }
            FaceIndices::U16(faces)
        };

        let mut cols = [0.0f32; 16];
        for value in &mut cols {
            *value = r.read_f32()?;
        }

        meshes.push(Mesh {
            name,
            vertices,
            faces,
            matrix: Mat4::from_cols_array(&cols),
        });
    }
    Ok(())
}

fn unpack_mesh_map(r: &mut SectionReader<'_>, map: &mut Vec<(String, String)>) -> Result<()> {
    while r.remaining() > 0 {
        let mesh = r.read_name()?;
        let prop = r.read_name()?;
        map.push((mesh, prop));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn sample_scene() -> SceneDb {
        let mut db = SceneDb {
            env: Environment {
                img_w: 64,
                img_h: 64,
                img_hs: 1,
                render_mode: RenderMode::Path { samples: 12 },
                ..Environment::default()
            },
            camera: CameraState {
                pos: Vec3::new(10.0, 10.0, 10.0),
                focus: Vec3::new(0.5, -0.25, 1.0),
                tilt: 0.0,
                fov: 25.0,
                dof: 0.1,
            },
            ..SceneDb::default()
        };

        db.properties.push(NamedProperty {
            name: "steel".into(),
            prop: Property {
                color: Vec3::new(0.4, 0.4, 0.45),
                density: 7.8,
                gloss: 0.9,
                emission: 0.0,
                ior: 2.5,
            },
        });

        db.textures.push(Texture::Stack {
            name: "hull_paint".into(),
            layers: vec![
                TextureLayer::Blend {
                    color1: Vec3::new(0.1, 0.3, 0.1),
                    color2: Vec3::new(0.2, 0.2, 0.2),
                },
                TextureLayer::Checker { tile: 8 },
                TextureLayer::Camo {
                    size: 2.5,
                    octaves: 4,
                    absolute: 1,
                    color1: Vec3::X,
                    color2: Vec3::Y,
                    color3: Vec3::Z,
                },
            ],
        });
        db.textures.push(Texture::Mix {
            name: "worn".into(),
            texture1: "hull_paint".into(),
            texture2: "hull_paint".into(),
            coef: 0.25,
        });

        db.meshes.push(Mesh {
            name: "hull".into(),
            vertices: vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z],
            faces: FaceIndices::U16(vec![[0, 1, 2], [0, 2, 3]]),
            matrix: Mat4::from_translation(Vec3::new(0.0, 0.0, 1.5)),
        });
        db.meshes.push(Mesh {
            name: "wing".into(),
            vertices: vec![Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0)],
            faces: FaceIndices::U32(vec![[0, 1, 2]]),
            matrix: Mat4::IDENTITY,
        });

        db.kdtree_cache = vec![0xde, 0xad, 0xbe, 0xef, 0x00, 0x01];
        db.mesh_map.push(("hull".into(), "steel".into()));
        db.mesh_map.push(("wing".into(), "steel".into()));

        db
    }

    #[test]
    fn round_trip_native_order() {
        let db = sample_scene();
        let packed = pack_scene(&db);
        let back = unpack_scene(&packed).unwrap();
        assert_eq!(back, db);
    }

    #[test]
    fn round_trip_swapped_order() {
        let db = sample_scene();
        let packed = pack_scene_with(&db, true);
        let back = unpack_scene(&packed).unwrap();
        assert_eq!(back, db);
    }

    #[test]
    fn empty_scene_round_trips() {
        let db = SceneDb::default();
        let back = unpack_scene(&pack_scene(&db)).unwrap();
        assert_eq!(back, db);
    }

    #[test]
    fn total_tri_num_is_declared() {
        let db = sample_scene();
        let packed = pack_scene(&db);
        // version(2) + env section + camera section + prop section +
        // texture section precede the mesh section; walk to it.
        let mut r = ByteReader::new(&packed[2..], false);
        for _ in 0..4 {
            let len = r.read_u32().unwrap() as usize;
            r.skip(len).unwrap();
        }
        let _mesh_len = r.read_u32().unwrap();
        assert_eq!(r.read_u32().unwrap(), 3);
    }

    #[test]
    fn garbage_version_rejected() {
        let buf = [0x77u8, 0x77, 0, 0];
        assert!(matches!(
            unpack_scene(&buf),
            Err(RaynetError::BadSceneVersion(_))
        ));
    }

    #[test]
    fn unknown_env_tag_skipped() {
        let cam = CameraState::default();
        let mut w = ByteWriter::new();
        w.write_u16(SCENE_VERSION);

        // ENV section: a known record followed by an unknown tag and junk.
        let m = w.begin_section();
        w.write_u16(ENV_IMG);
        w.write_u32(32);
        w.write_u32(16);
        w.write_u32(1);
        w.write_u16(0x7777);
        w.write_bytes(&[9, 9, 9]);
        w.end_section(m);

        // CAMERA.
        let m = w.begin_section();
        w.write_vec3(cam.pos);
        w.write_vec3(cam.focus);
        w.write_f32(cam.tilt);
        w.write_f32(cam.fov);
        w.write_f32(cam.dof);
        w.end_section(m);

        // Empty PROP and TEXTURE.
        for _ in 0..2 {
            let m = w.begin_section();
            w.end_section(m);
        }
        // MESH carries its triangle count even when empty.
        let m = w.begin_section();
        w.write_u32(0);
        w.end_section(m);
        // Empty KDCACHE and MESHMAP.
        for _ in 0..2 {
            let m = w.begin_section();
            w.end_section(m);
        }

        let db = unpack_scene(&w.into_vec()).unwrap();
        assert_eq!(db.env.img_w, 32);
        assert_eq!(db.env.img_h, 16);
    }

    #[test]
    fn overdeclared_faces_rejected() {
        let mut patched = pack_scene(&sample_scene());

        // Walk to the mesh section and zero its declared triangle count so
        // the first mesh's face run overruns it.
        let mut r = ByteReader::new(&patched[2..], false);
        let mut offset = 2;
        for _ in 0..4 {
            let len = r.read_u32().unwrap() as usize;
            r.skip(len).unwrap();
            offset += 4 + len;
        }
        patched[offset + 4..offset + 8].copy_from_slice(&0u32.to_ne_bytes());

        assert!(matches!(
            unpack_scene(&patched),
            Err(RaynetError::FieldOutOfBounds { .. })
        ));
    }

    #[test]
    fn kd_cache_blob_is_opaque() {
        let mut db = SceneDb::default();
        db.kdtree_cache = (0u8..=255).collect();
        let back = unpack_scene(&pack_scene_with(&db, true)).unwrap();
        assert_eq!(back.kdtree_cache, db.kdtree_cache);
    }
}
