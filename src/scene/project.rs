//! Project Loading
//!
//! Reads a project environment file and the inputs it references into a
//! [`SceneDb`]. All text inputs are comma-separated `key,value...` lines;
//! `#` starts a comment. Paths are resolved relative to the project file.
//!
//! A key absent from the project file simply skips that input; a
//! configured path that cannot be read is an error.

use std::fs;
use std::path::{Path, PathBuf};

use glam::{Mat4, Vec3};
use log::info;

use super::{
    FaceIndices, Mesh, NamedProperty, Property, RenderMode, SceneDb, Texture, TextureLayer,
};
use crate::errors::{RaynetError, Result};
use crate::wire::ByteReader;

/// Revision expected at the head of a geometry file.
const GEOMETRY_REVISION: u16 = 2;

fn load_err(file: &Path, reason: impl Into<String>) -> RaynetError {
    RaynetError::ProjectLoad {
        file: file.display().to_string(),
        reason: reason.into(),
    }
}

/// Tokenized non-comment lines of a text input.
fn lines(path: &Path) -> Result<Vec<Vec<String>>> {
    let text = fs::read_to_string(path).map_err(|e| load_err(path, e.to_string()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| l.split(',').map(|t| t.trim().to_string()).collect())
        .collect())
}

fn parse_f32(path: &Path, tok: &str) -> Result<f32> {
    tok.parse()
        .map_err(|_| load_err(path, format!("bad float '{tok}'")))
}

fn parse_u32(path: &Path, tok: &str) -> Result<u32> {
    tok.parse()
        .map_err(|_| load_err(path, format!("bad integer '{tok}'")))
}

fn parse_vec3(path: &Path, toks: &[String]) -> Result<Vec3> {
    if toks.len() < 3 {
        return Err(load_err(path, "expected three components"));
    }
    Ok(Vec3::new(
        parse_f32(path, &toks[0])?,
        parse_f32(path, &toks[1])?,
        parse_f32(path, &toks[2])?,
    ))
}

/// Load a complete scene from a project environment file.
pub fn load_project(path: &Path) -> Result<SceneDb> {
    let dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
    let resolve = |p: &str| -> PathBuf { dir.join(p) };

    let mut db = SceneDb::default();
    let mut transforms: Vec<(String, Mat4)> = Vec::new();
    let mut render_samples = 32;
    let mut render_mode_name = String::from("phong");

    for toks in lines(path)? {
        match toks[0].as_str() {
            "image_size" if toks.len() >= 3 => {
                db.env.img_w = parse_u32(path, &toks[1])?;
                db.env.img_h = parse_u32(path, &toks[2])?;
                if let Some(hs) = toks.get(3) {
                    db.env.img_hs = parse_u32(path, hs)?;
                }
            }
            "tile_size" if toks.len() >= 3 => {
                db.env.tile_w = parse_u32(path, &toks[1])?;
                db.env.tile_h = parse_u32(path, &toks[2])?;
            }
            "render_mode" if toks.len() >= 2 => {
                render_mode_name = toks[1].clone();
            }
            "render_samples" if toks.len() >= 2 => {
                render_samples = parse_u32(path, &toks[1])?;
            }
            "camera_position" => db.camera.pos = parse_vec3(path, &toks[1..])?,
            "camera_focus" => db.camera.focus = parse_vec3(path, &toks[1..])?,
            "camera_tilt" if toks.len() >= 2 => {
                db.camera.tilt = parse_f32(path, &toks[1])?;
            }
            "camera_fov" if toks.len() >= 2 => {
                db.camera.fov = parse_f32(path, &toks[1])?;
            }
            "camera_dof" if toks.len() >= 2 => {
                db.camera.dof = parse_f32(path, &toks[1])?;
            }
            "properties_file" if toks.len() >= 2 => {
                db.properties = load_properties(&resolve(&toks[1]))?;
            }
            "textures_file" if toks.len() >= 2 => {
                db.textures = load_textures(&resolve(&toks[1]))?;
            }
            "geometry_file" if toks.len() >= 2 => {
                db.meshes = load_geometry(&resolve(&toks[1]))?;
            }
            "kdtree_cache_file" if toks.len() >= 2 => {
                let p = resolve(&toks[1]);
                db.kdtree_cache = fs::read(&p).map_err(|e| load_err(&p, e.to_string()))?;
            }
            "mesh_map_file" if toks.len() >= 2 => {
                db.mesh_map = load_mesh_map(&resolve(&toks[1]))?;
            }
            "transform" if toks.len() >= 18 => {
                let mut cols = [0.0f32; 16];
                for (slot, tok) in cols.iter_mut().zip(&toks[2..18]) {
                    *slot = parse_f32(path, tok)?;
                }
                transforms.push((toks[1].clone(), Mat4::from_cols_array(&cols)));
            }
            other => {
                return Err(load_err(path, format!("unknown directive '{other}'")));
            }
        }
    }

    db.env.render_mode = match render_mode_name.as_str() {
        "flat" => RenderMode::Flat,
        "normal" => RenderMode::Normal,
        "phong" => RenderMode::Phong,
        "depth" => RenderMode::Depth,
        "grid" => RenderMode::Grid,
        "component" => RenderMode::Component,
        "path" => RenderMode::Path {
            samples: render_samples,
        },
        other => return Err(load_err(path, format!("unknown render mode '{other}'"))),
    };

    for (name, matrix) in transforms {
        if let Some(mesh) = db.meshes.iter_mut().find(|m| m.name == name) {
            mesh.matrix = matrix;
        }
    }

    db.env.validate_tiling()?;
    info!(
        "loaded project {}: {}x{}, {} meshes, {} triangles",
        path.display(),
        db.env.img_w,
        db.env.img_h,
        db.meshes.len(),
        db.total_tri_num()
    );
    Ok(db)
}

/// `properties,NAME` opens an entry; following keyed lines fill it in.
pub fn load_properties(path: &Path) -> Result<Vec<NamedProperty>> {
    let mut out: Vec<NamedProperty> = Vec::new();

    for toks in lines(path)? {
        let key = toks[0].as_str();
        if key == "properties" {
            let name = toks
                .get(1)
                .ok_or_else(|| load_err(path, "properties line without a name"))?;
            out.push(NamedProperty {
                name: name.clone(),
                prop: Property::default(),
            });
            continue;
        }

        let Some(current) = out.last_mut() else {
            return Err(load_err(path, format!("'{key}' before any properties line")));
        };
        match key {
            "color" => current.prop.color = parse_vec3(path, &toks[1..])?,
            "density" => current.prop.density = parse_f32(path, &toks[1])?,
            "gloss" => current.prop.gloss = parse_f32(path, &toks[1])?,
            "emission" => current.prop.emission = parse_f32(path, &toks[1])?,
            "ior" => current.prop.ior = parse_f32(path, &toks[1])?,
            other => return Err(load_err(path, format!("unknown property key '{other}'"))),
        }
    }
    Ok(out)
}

/// `texture,stack,NAME` and `texture,mix,...` open entries; bare layer
/// lines push onto the most recent stack.
pub fn load_textures(path: &Path) -> Result<Vec<Texture>> {
    let mut out: Vec<Texture> = Vec::new();

    for toks in lines(path)? {
        match toks[0].as_str() {
            "texture" => match toks.get(1).map(String::as_str) {
                Some("stack") if toks.len() >= 3 => out.push(Texture::Stack {
                    name: toks[2].clone(),
                    layers: Vec::new(),
                }),
                Some("mix") if toks.len() >= 6 => out.push(Texture::Mix {
                    name: toks[2].clone(),
                    texture1: toks[3].clone(),
                    texture2: toks[4].clone(),
                    coef: parse_f32(path, &toks[5])?,
                }),
                _ => return Err(load_err(path, "malformed texture line")),
            },
            layer_key => {
                let layer = parse_layer(path, layer_key, &toks[1..])?;
                match out.last_mut() {
                    Some(Texture::Stack { layers, .. }) => layers.push(layer),
                    _ => return Err(RaynetError::OrphanTextureLayer),
                }
            }
        }
    }
    Ok(out)
}

fn parse_layer(path: &Path, key: &str, args: &[String]) -> Result<TextureLayer> {
    Ok(match key {
        "blend" if args.len() >= 6 => TextureLayer::Blend {
            color1: parse_vec3(path, &args[0..3])?,
            color2: parse_vec3(path, &args[3..6])?,
        },
        "bump" if args.len() >= 3 => TextureLayer::Bump {
            coef: parse_vec3(path, args)?,
        },
        "checker" if !args.is_empty() => TextureLayer::Checker {
            tile: parse_u32(path, &args[0])?,
        },
        "camo" if args.len() >= 12 => TextureLayer::Camo {
            size: parse_f32(path, &args[0])?,
            octaves: parse_u32(path, &args[1])?,
            absolute: parse_u32(path, &args[2])?,
            color1: parse_vec3(path, &args[3..6])?,
            color2: parse_vec3(path, &args[6..9])?,
            color3: parse_vec3(path, &args[9..12])?,
        },
        "clouds" if args.len() >= 9 => TextureLayer::Clouds {
            size: parse_f32(path, &args[0])?,
            octaves: parse_u32(path, &args[1])?,
            absolute: parse_u32(path, &args[2])?,
            scale: parse_vec3(path, &args[3..6])?,
            translate: parse_vec3(path, &args[6..9])?,
        },
        "gradient" if !args.is_empty() => TextureLayer::Gradient {
            axis: parse_u32(path, &args[0])?,
        },
        other => return Err(load_err(path, format!("unknown texture layer '{other}'"))),
    })
}

/// Binary geometry input: `u16 endian_tag`, `u16 revision`,
/// `u32 total_tri_num`, then per mesh a name, a vertex run, an index-width
/// byte and the face run. World transforms come from the project file.
pub fn load_geometry(path: &Path) -> Result<Vec<Mesh>> {
    let bytes = fs::read(path).map_err(|e| load_err(path, e.to_string()))?;

    let mut probe = ByteReader::new(&bytes, false);
    let endian_tag = probe.read_u16()?;
    let flip = match endian_tag {
        1 => false,
        0x0100 => true,
        other => {
            return Err(load_err(path, format!("bad endian tag {other:#06x}")));
        }
    };

    let mut r = ByteReader::new(&bytes[2..], flip);
    let revision = r.read_u16()?;
    if revision != GEOMETRY_REVISION {
        return Err(load_err(path, format!("unsupported revision {revision}")));
    }
    let total_tri = r.read_u32()?;

    let mut meshes = Vec::new();
    let mut seen_tri: u64 = 0;
    while r.remaining() > 0 {
        let name = r.read_name()?;

        let num_vertices = r.read_u32()? as usize;
        if num_vertices * 12 > r.remaining() {
            return Err(load_err(path, format!("vertex count {num_vertices} overruns file")));
        }
        let mut vertices = Vec::with_capacity(num_vertices);
        for _ in 0..num_vertices {
            vertices.push(r.read_vec3()?);
        }

        let wide = r.read_u8()? != 0;
        let faces = if wide {
            let n = r.read_u32()? as usize;
            seen_tri += n as u64;
            let mut faces = Vec::with_capacity(n);
            for _ in 0..n {
                faces.push([r.read_u32()?, r.read_u32()?, r.read_u32()?]);
            }
            FaceIndices::U32(faces)
        } else {
            let n = r.read_u16()? as usize;
            seen_tri += n as u64;
            let mut faces = Vec::with_capacity(n);
            for _ in 0..n {
                faces.push([r.read_u16()?, r.read_u16()?, r.read_u16()?]);
            }
            FaceIndices::U16(faces)
        };
        if seen_tri > u64::from(total_tri) {
            return Err(load_err(path, "face count exceeds declared triangle total"));
        }

        meshes.push(Mesh::new(name, vertices, faces));
    }
    Ok(meshes)
}

/// `mesh_name,property_name` lines.
pub fn load_mesh_map(path: &Path) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    for toks in lines(path)? {
        if toks.len() != 2 {
            return Err(load_err(path, "mesh map lines are 'mesh,property'"));
        }
        out.push((toks[0].clone(), toks[1].clone()));
    }
    Ok(out)
}

// ============================================================================
// Tests
// ============================================================================
