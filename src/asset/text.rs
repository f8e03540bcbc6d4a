// asset/text.rs
// Extruded text meshes built from typeface glyph outlines.

use std::f32::consts::FRAC_PI_2;

use glam::Vec2;
use rayon::prelude::*;

use super::font::Font;
use super::mesh::MeshData;
use super::triangulate::{contains_point, signed_area, triangulate};

/// Rounded rim between the caps and the side walls. The caps move out by
/// `thickness` along Z and the walls grow by up to `size` in the glyph plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bevel {
    pub thickness: f32,
    pub size: f32,
    /// Outline growth already applied at the caps.
    pub offset: f32,
    pub segments: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextOptions {
    /// Em size in scene units.
    pub size: f32,
    /// Extrusion along +Z.
    pub depth: f32,
    pub curve_segments: u32,
    pub bevel: Option<Bevel>,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            size: 0.3,
            depth: 0.6,
            curve_segments: 4,
            bevel: None,
        }
    }
}

struct PlacedGlyph {
    ch: char,
    offset: Vec2,
}

pub struct TextGeometry;

impl TextGeometry {
    pub fn build(font: &Font, text: &str, options: TextOptions) -> MeshData {
        let scale = options.size / font.resolution;
        let line_height = font.line_height * scale;

        let mut placed = Vec::with_capacity(text.len());
        let mut cursor = Vec2::ZERO;
        for ch in text.chars() {
            if ch == '\n' {
                cursor = Vec2::new(0.0, cursor.y - line_height);
                continue;
            }
            match font.glyph(ch) {
                Some(glyph) => {
                    placed.push(PlacedGlyph { ch, offset: cursor });
                    cursor.x += glyph.advance * scale;
                }
                None => log::warn!("Font '{}' has no glyph for {:?}", font.family, ch),
            }
        }

        let parts: Vec<MeshData> = placed
            .par_iter()
            .filter_map(|placed| {
                let glyph = font.glyph(placed.ch)?;
                let contours = glyph.contours(scale, placed.offset, options.curve_segments);
                Some(extrude_glyph(&contours, options.depth, options.bevel.as_ref()))
            })
            .collect();

        let mut mesh = MeshData::default();
        for part in parts {
            mesh.append(part);
        }
        log::debug!(
            "Built text geometry for {:?}: {} vertices, {} triangles",
            text,
            mesh.vertex_count(),
            mesh.triangle_count()
        );
        mesh
    }
}

/// Groups contours into solids with their holes. The winding of the largest
/// contour defines which orientation is solid.
fn group_shapes(contours: &[Vec<Vec2>]) -> Vec<(Vec<Vec2>, Vec<Vec<Vec2>>)> {
    let areas: Vec<f32> = contours.iter().map(|c| signed_area(c)).collect();
    let Some(dominant) = areas
        .iter()
        .copied()
        .max_by(|a, b| a.abs().total_cmp(&b.abs()))
    else {
        return Vec::new();
    };
    let solid_sign = dominant.signum();

    let mut shapes: Vec<(Vec<Vec2>, Vec<Vec<Vec2>>, f32)> = Vec::new();
    let mut holes = Vec::new();
    for (contour, area) in contours.iter().zip(&areas) {
        if area.abs() < f32::EPSILON {
            continue;
        }
        if area.signum() == solid_sign {
            shapes.push((contour.clone(), Vec::new(), area.abs()));
        } else {
            holes.push(contour);
        }
    }

    for hole in holes {
        let owner = shapes
            .iter_mut()
            .filter(|(outline, _, _)| contains_point(outline, hole[0]))
            .min_by(|a, b| a.2.total_cmp(&b.2));
        match owner {
            Some((_, shape_holes, _)) => shape_holes.push(hole.clone()),
            None => log::debug!("Dropping glyph hole outside every outline"),
        }
    }

    shapes
        .into_iter()
        .map(|(outline, holes, _)| (outline, holes))
        .collect()
}

/// `(z, outline growth)` for every ring of the extrusion, back cap first.
fn profile(depth: f32, bevel: Option<&Bevel>) -> Vec<(f32, f32)> {
    let Some(bevel) = bevel.filter(|bevel| bevel.segments > 0) else {
        return vec![(0.0, 0.0), (depth, 0.0)];
    };
    let step = |segment: u32| {
        let t = segment as f32 / bevel.segments as f32 * FRAC_PI_2;
        (bevel.thickness * t.cos(), bevel.size * t.sin() + bevel.offset)
    };
    let full = bevel.size + bevel.offset;

    let mut layers = Vec::with_capacity(bevel.segments as usize * 2 + 2);
    layers.extend((0..bevel.segments).map(step).map(|(z, grow)| (-z, grow)));
    layers.push((0.0, full));
    layers.push((depth, full));
    layers.extend((0..bevel.segments).rev().map(step).map(|(z, grow)| (depth + z, grow)));
    layers
}

fn outward(edge: Vec2) -> Option<Vec2> {
    Vec2::new(edge.y, -edge.x).try_normalize()
}

/// Per-vertex direction that moves both adjacent edges out by one unit.
/// Sharp corners are capped at a miter length of sqrt(2).
fn bevel_vectors(ring: &[Vec2]) -> Vec<Vec2> {
    let n = ring.len();
    (0..n)
        .map(|i| {
            let here = ring[i];
            let incoming = outward(here - ring[(i + n - 1) % n]);
            let outgoing = outward(ring[(i + 1) % n] - here);
            let miter = match (incoming, outgoing) {
                (Some(a), Some(b)) => {
                    let denom = 1.0 + a.dot(b);
                    if denom < 1e-4 {
                        a
                    } else {
                        (a + b) / denom
                    }
                }
                (Some(a), None) | (None, Some(a)) => a,
                (None, None) => Vec2::ZERO,
            };
            let length_squared = miter.length_squared();
            if length_squared > 2.0 {
                miter * (2.0 / length_squared).sqrt()
            } else {
                miter
            }
        })
        .collect()
}

fn oriented(mut ring: Vec<Vec2>, counter_clockwise: bool) -> Vec<Vec2> {
    if (signed_area(&ring) > 0.0) != counter_clockwise {
        ring.reverse();
    }
    ring
}

fn extrude_glyph(contours: &[Vec<Vec2>], depth: f32, bevel: Option<&Bevel>) -> MeshData {
    let layers = profile(depth, bevel);
    let mut mesh = MeshData::default();

    for (outline, holes) in group_shapes(contours) {
        // Outlines run counter-clockwise and holes clockwise, so the outward
        // side is always to the right of the direction of travel.
        let mut rings = Vec::with_capacity(holes.len() + 1);
        rings.push(oriented(outline, true));
        rings.extend(holes.into_iter().map(|hole| oriented(hole, false)));
        let moves: Vec<Vec<Vec2>> = rings.iter().map(|ring| bevel_vectors(ring)).collect();
        let grown = |ring: usize, grow: f32| -> Vec<Vec2> {
            rings[ring]
                .iter()
                .zip(&moves[ring])
                .map(|(p, m)| *p + *m * grow)
                .collect()
        };

        let (back_z, back_grow) = layers[0];
        let (front_z, front_grow) = layers[layers.len() - 1];
        for (z, grow, normal, flip) in [(front_z, front_grow, 1.0, false), (back_z, back_grow, -1.0, true)] {
            let outline = grown(0, grow);
            let holes: Vec<Vec<Vec2>> = (1..rings.len()).map(|ring| grown(ring, grow)).collect();
            let (ring, cap) = triangulate(&outline, &holes);

            let base = mesh.positions.len() as u32;
            for p in &ring {
                mesh.positions.push([p.x, p.y, z]);
                mesh.normals.push([0.0, 0.0, normal]);
                mesh.uvs.push([p.x, p.y]);
            }
            for tri in cap.chunks_exact(3) {
                if flip {
                    mesh.indices.extend([base + tri[0], base + tri[2], base + tri[1]]);
                } else {
                    mesh.indices.extend([base + tri[0], base + tri[1], base + tri[2]]);
                }
            }
        }

        // Walls, one band of quads between each pair of neighbouring layers.
        for ring in 0..rings.len() {
            let bands: Vec<(f32, Vec<Vec2>)> = layers.iter().map(|&(z, grow)| (z, grown(ring, grow))).collect();
            for pair in bands.windows(2) {
                let ((z0, lower), (z1, upper)) = (&pair[0], &pair[1]);
                let n = lower.len();
                for i in 0..n {
                    let j = (i + 1) % n;
                    let a0 = lower[i].extend(*z0);
                    let b0 = lower[j].extend(*z0);
                    let b1 = upper[j].extend(*z1);
                    let a1 = upper[i].extend(*z1);
                    let Some(normal) = (b1 - a0).cross(a1 - b0).try_normalize() else {
                        continue;
                    };
                    let base = mesh.positions.len() as u32;
                    let length = (lower[j] - lower[i]).length();
                    for (p, u) in [(a0, 0.0), (b0, length), (b1, length), (a1, 0.0)] {
                        mesh.positions.push(p.to_array());
                        mesh.normals.push(normal.to_array());
                        mesh.uvs.push([u, p.z]);
                    }
                    mesh.indices
                        .extend([base, base + 1, base + 2, base, base + 2, base + 3]);
                }
            }
        }
    }

    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::font::tests::SQUARE_FONT;
    use glam::Vec3;

    fn font() -> Font {
        Font::parse("test.json", SQUARE_FONT.as_bytes()).unwrap()
    }

    fn front_cap_area(mesh: &MeshData, depth: f32) -> f32 {
        mesh.indices
            .chunks_exact(3)
            .filter(|t| {
                t.iter().all(|&i| (mesh.positions[i as usize][2] - depth).abs() < 1e-6)
                    && mesh.normals[t[0] as usize][2] > 0.5
            })
            .map(|t| {
                let p = |i: u32| Vec3::from_array(mesh.positions[i as usize]);
                (p(t[1]) - p(t[0])).cross(p(t[2]) - p(t[0])).z * 0.5
            })
            .sum()
    }

    #[test]
    fn glyph_with_hole_extrudes_to_expected_cap_area() {
        let options = TextOptions {
            size: 1.0,
            depth: 0.5,
            curve_segments: 4,
            bevel: None,
        };
        let mesh = TextGeometry::build(&font(), "A", options);
        // 1x1 square minus a 0.5x0.5 hole
        assert!((front_cap_area(&mesh, 0.5) - 0.75).abs() < 1e-4);

        let (min, max) = mesh.bounds().unwrap();
        assert!((min - Vec3::new(0.0, 0.0, 0.0)).length() < 1e-5);
        assert!((max - Vec3::new(1.0, 1.0, 0.5)).length() < 1e-5);
    }

    #[test]
    fn side_wall_normals_point_outward() {
        let mesh = TextGeometry::build(&font(), "A", TextOptions { size: 1.0, depth: 0.5, curve_segments: 4, bevel: None });
        for (p, n) in mesh.positions.iter().zip(&mesh.normals) {
            if n[2] != 0.0 {
                continue;
            }
            // On the outer square the normal points away from the centre;
            // on the hole it points towards it.
            let from_centre = Vec2::new(p[0] - 0.5, p[1] - 0.5);
            let normal = Vec2::new(n[0], n[1]);
            let on_outer = p[0].abs() < 1e-5 || p[1].abs() < 1e-5 || (p[0] - 1.0).abs() < 1e-5 || (p[1] - 1.0).abs() < 1e-5;
            if on_outer {
                assert!(from_centre.dot(normal) > 0.0);
            } else {
                assert!(from_centre.dot(normal) < 0.0);
            }
        }
    }

    #[test]
    fn advance_and_newline_place_glyphs() {
        let options = TextOptions { size: 1.0, depth: 0.1, curve_segments: 1, bevel: None };
        let one = TextGeometry::build(&font(), "A", options);
        let two = TextGeometry::build(&font(), "A A", options);
        assert_eq!(two.vertex_count(), one.vertex_count() * 2);
        let (_, max) = two.bounds().unwrap();
        // 1.2 advance + 0.6 space + 1.0 glyph width
        assert!((max.x - 2.8).abs() < 1e-5);

        let lines = TextGeometry::build(&font(), "A\nA", options);
        let (min, _) = lines.bounds().unwrap();
        assert!((min.y + 1.3).abs() < 1e-5);
    }

    #[test]
    fn unknown_glyphs_are_skipped() {
        let mesh = TextGeometry::build(&font(), "Z", TextOptions::default());
        assert!(mesh.is_empty());
    }

    fn bevelled(segments: u32) -> TextOptions {
        TextOptions {
            size: 1.0,
            depth: 0.5,
            curve_segments: 4,
            bevel: Some(Bevel {
                thickness: 0.1,
                size: 0.05,
                offset: 0.0,
                segments,
            }),
        }
    }

    #[test]
    fn bevel_pushes_caps_out_and_grows_the_walls() {
        let mesh = TextGeometry::build(&font(), "A", bevelled(3));
        let (min, max) = mesh.bounds().unwrap();
        assert!((min - Vec3::new(-0.05, -0.05, -0.1)).length() < 1e-5, "{:?}", min);
        assert!((max - Vec3::new(1.05, 1.05, 0.6)).length() < 1e-5, "{:?}", max);

        // The caps keep the glyph's own outline.
        assert!((front_cap_area(&mesh, 0.6) - 0.75).abs() < 1e-4);
    }

    #[test]
    fn bevel_faces_lean_towards_their_cap() {
        let mesh = TextGeometry::build(&font(), "A", bevelled(3));
        let mut leaning = 0;
        for (p, n) in mesh.positions.iter().zip(&mesh.normals) {
            if n[2].abs() > 0.999 {
                continue;
            }
            if p[2] > 0.5 + 1e-6 {
                assert!(n[2] > 0.0, "front bevel normal {:?} at {:?}", n, p);
                leaning += 1;
            } else if p[2] < -1e-6 {
                assert!(n[2] < 0.0, "back bevel normal {:?} at {:?}", n, p);
                leaning += 1;
            }
        }
        assert!(leaning > 0);
    }

    #[test]
    fn bevel_profile_runs_back_to_front() {
        let bevel = Bevel {
            thickness: 0.03,
            size: 0.02,
            offset: 0.0,
            segments: 3,
        };
        let layers = profile(0.6, Some(&bevel));
        assert_eq!(layers.len(), 8);
        assert_eq!(layers[0], (-0.03, 0.0));
        assert_eq!(layers[3], (0.0, 0.02));
        assert_eq!(layers[4], (0.6, 0.02));
        assert!((layers[7].0 - 0.63).abs() < 1e-6 && layers[7].1 == 0.0);
        assert!(layers.windows(2).all(|w| w[0].0 < w[1].0));

        assert_eq!(profile(0.6, None), vec![(0.0, 0.0), (0.6, 0.0)]);
    }
}
