//! Render Engine Interface
//!
//! The ray-intersection engine proper is a collaborator behind a small
//! trait: prepare once from the unpacked scene, then render pixel tiles
//! and cast probes. [`SolidEngine`] is the built-in stand-in used by the
//! demo binaries and the pipeline tests; it shades flat color and probes
//! against mesh bounding boxes, which is enough to exercise every wire
//! path without a tracer.

use glam::Vec3;

use crate::errors::Result;
use crate::protocol::{ProbeReport, WorkHeader};
use crate::scene::{RenderMode, SceneDb};

/// Which probe a slave was asked to cast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeKind {
    Shotline,
    /// Cone of rays around the axis, half-angle in degrees.
    Spall { angle: f32 },
}

/// The two-method collaborator every slave drives.
pub trait Engine: Send {
    /// Called once after the scene arrives and unpacks.
    fn prep(&mut self, scene: &SceneDb) -> Result<()>;

    /// Produce `3 * size_x * size_y` RGB bytes for one tile.
    fn render(
        &mut self,
        tile: &WorkHeader,
        pos: Vec3,
        focus: Vec3,
        mode: &RenderMode,
    ) -> Result<Vec<u8>>;

    /// Cast a probe ray (or cone) and report what it passed through.
    fn probe(&mut self, pos: Vec3, dir: Vec3, kind: ProbeKind) -> Result<ProbeReport>;
}

/// Axis-aligned bounds of one mesh, in world space.
#[derive(Debug, Clone)]
struct MeshBounds {
    name: String,
    min: Vec3,
    max: Vec3,
}

impl MeshBounds {
    /// Slab-test a ray against the box; returns the entry/exit distances.
    fn intersect(&self, pos: Vec3, dir: Vec3) -> Option<(f32, f32)> {
        let mut t_min = f32::NEG_INFINITY;
        let mut t_max = f32::INFINITY;
        for axis in 0..3 {
            let d = dir[axis];
            if d.abs() < f32::EPSILON {
                if pos[axis] < self.min[axis] || pos[axis] > self.max[axis] {
                    return None;
                }
                continue;
            }
            let t0 = (self.min[axis] - pos[axis]) / d;
            let t1 = (self.max[axis] - pos[axis]) / d;
            let (near, far) = if t0 < t1 { (t0, t1) } else { (t1, t0) };
            t_min = t_min.max(near);
            t_max = t_max.min(far);
            if t_min > t_max {
                return None;
            }
        }
        (t_max >= 0.0).then_some((t_min.max(0.0), t_max))
    }
}

/// Flat-shading stand-in engine.
#[derive(Debug, Default)]
pub struct SolidEngine {
    pub color: [u8; 3],
    bounds: Vec<MeshBounds>,
}

impl SolidEngine {
    pub fn new(color: [u8; 3]) -> Self {
        Self {
            color,
            bounds: Vec::new(),
        }
    }
}

impl Engine for SolidEngine {
    fn prep(&mut self, scene: &SceneDb) -> Result<()> {
        self.bounds = scene
            .meshes
            .iter()
            .filter(|m| !m.vertices.is_empty())
            .map(|m| {
                let mut min = Vec3::splat(f32::INFINITY);
                let mut max = Vec3::splat(f32::NEG_INFINITY);
                for v in m.world_vertices() {
                    min = min.min(v);
                    max = max.max(v);
                }
                MeshBounds {
                    name: m.name.clone(),
                    min,
                    max,
                }
            })
            .collect();
        Ok(())
    }

    fn render(
        &mut self,
        tile: &WorkHeader,
        _pos: Vec3,
        _focus: Vec3,
        _mode: &RenderMode,
    ) -> Result<Vec<u8>> {
        Ok(self
            .color
            .iter()
            .copied()
            .cycle()
            .take(tile.pixel_bytes())
            .collect())
    }

    fn probe(&mut self, pos: Vec3, dir: Vec3, _kind: ProbeKind) -> Result<ProbeReport> {
        let mut first: Option<f32> = None;
        let mut last: Option<f32> = None;
        let mut names = Vec::new();

        for bounds in &self.bounds {
            if let Some((t_in, t_out)) = bounds.intersect(pos, dir) {
                first = Some(first.map_or(t_in, |t: f32| t.min(t_in)));
                last = Some(last.map_or(t_out, |t: f32| t.max(t_out)));
                names.push(bounds.name.clone());
            }
        }

        Ok(match (first, last) {
            (Some(t_in), Some(t_out)) => ProbeReport {
                in_hit: pos + dir * t_in,
                out_hit: pos + dir * t_out,
                names,
            },
            _ => ProbeReport::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{FaceIndices, Mesh};

    fn unit_box_scene(name: &str, offset: Vec3) -> SceneDb {
        let mut db = SceneDb::default();
        let corners = [
            Vec3::ZERO,
            Vec3::X,
            Vec3::Y,
            Vec3::Z,
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(0.0, 1.0, 1.0),
            Vec3::ONE,
        ];
        let vertices = corners.iter().map(|v| *v + offset).collect();
        db.meshes.push(Mesh::new(
            name,
            vertices,
            FaceIndices::U16(vec![[0, 1, 2]]),
        ));
        db
    }

    #[test]
    fn render_fills_tile_with_color() {
        let mut engine = SolidEngine::new([255, 0, 0]);
        let tile = WorkHeader::tile(0, 0, 4, 2);
        let pixels = engine
            .render(&tile, Vec3::ZERO, Vec3::X, &RenderMode::Phong)
            .unwrap();
        assert_eq!(pixels.len(), 24);
        assert!(pixels.chunks(3).all(|px| px == [255, 0, 0]));
    }

    #[test]
    fn probe_reports_entry_and_exit() {
        let mut engine = SolidEngine::new([0, 0, 0]);
        engine
            .prep(&unit_box_scene("hull", Vec3::new(2.0, 0.0, 0.0)))
            .unwrap();

        let report = engine
            .probe(Vec3::new(0.0, 0.5, 0.5), Vec3::X, ProbeKind::Shotline)
            .unwrap();
        assert_eq!(report.names, vec!["hull".to_string()]);
        assert!((report.in_hit.x - 2.0).abs() < 1e-5);
        assert!((report.out_hit.x - 3.0).abs() < 1e-5);
    }

    #[test]
    fn probe_miss_is_empty() {
        let mut engine = SolidEngine::new([0, 0, 0]);
        engine
            .prep(&unit_box_scene("hull", Vec3::new(2.0, 0.0, 0.0)))
            .unwrap();
        let report = engine
            .probe(Vec3::new(0.0, 5.0, 0.0), Vec3::X, ProbeKind::Shotline)
            .unwrap();
        assert!(report.names.is_empty());
    }
}
