// asset/triangulate.rs
// Ear clipping for simple polygons with holes. Holes are merged into the
// outline through bridge edges first, then the merged ring is clipped.

use glam::Vec2;

const EPSILON: f32 = 1e-7;

pub fn signed_area(points: &[Vec2]) -> f32 {
    let n = points.len();
    (0..n)
        .map(|i| points[i].perp_dot(points[(i + 1) % n]))
        .sum::<f32>()
        * 0.5
}

pub fn contains_point(polygon: &[Vec2], point: Vec2) -> bool {
    let n = polygon.len();
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (polygon[i], polygon[j]);
        if (a.y > point.y) != (b.y > point.y) {
            let x = (b.x - a.x) * (point.y - a.y) / (b.y - a.y) + a.x;
            if point.x < x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Triangulates `outer` minus `holes`. Returns the merged vertex ring and
/// counter-clockwise triangle indices into it.
pub fn triangulate(outer: &[Vec2], holes: &[Vec<Vec2>]) -> (Vec<Vec2>, Vec<u32>) {
    if outer.len() < 3 {
        return (Vec::new(), Vec::new());
    }

    let mut ring = outer.to_vec();
    if signed_area(&ring) < 0.0 {
        ring.reverse();
    }

    let mut holes: Vec<Vec<Vec2>> = holes
        .iter()
        .filter(|hole| hole.len() >= 3)
        .map(|hole| {
            let mut hole = hole.clone();
            if signed_area(&hole) > 0.0 {
                hole.reverse();
            }
            hole
        })
        .collect();
    holes.sort_by(|a, b| max_x(b).total_cmp(&max_x(a)));

    for (index, hole) in holes.iter().enumerate() {
        let pending = &holes[index + 1..];
        match bridge(&ring, hole, pending, outer, &holes[..index]) {
            Some((ring_index, hole_index)) => {
                let mut merged = Vec::with_capacity(ring.len() + hole.len() + 2);
                merged.extend_from_slice(&ring[..=ring_index]);
                merged.extend(hole[hole_index..].iter().chain(hole[..hole_index].iter()));
                merged.push(hole[hole_index]);
                merged.extend_from_slice(&ring[ring_index..]);
                ring = merged;
            }
            None => log::debug!("No visible bridge for hole with {} points", hole.len()),
        }
    }

    let indices = clip_ears(&ring);
    (ring, indices)
}

fn max_x(points: &[Vec2]) -> f32 {
    points.iter().map(|p| p.x).fold(f32::MIN, f32::max)
}

fn bridge(
    ring: &[Vec2],
    hole: &[Vec2],
    pending: &[Vec<Vec2>],
    outer: &[Vec2],
    merged_holes: &[Vec<Vec2>],
) -> Option<(usize, usize)> {
    let (hole_index, anchor) = hole
        .iter()
        .copied()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.x.total_cmp(&b.x))?;

    let mut candidates: Vec<usize> = (0..ring.len()).collect();
    candidates.sort_by(|&a, &b| {
        ring[a]
            .distance_squared(anchor)
            .total_cmp(&ring[b].distance_squared(anchor))
    });

    candidates
        .into_iter()
        .find(|&candidate| {
            let target = ring[candidate];
            let midpoint = (anchor + target) * 0.5;
            contains_point(outer, midpoint)
                && !merged_holes.iter().any(|h| contains_point(h, midpoint))
                && !pending.iter().any(|h| contains_point(h, midpoint))
                && !crosses_ring(anchor, target, ring)
                && !crosses_ring(anchor, target, hole)
                && !pending.iter().any(|h| crosses_ring(anchor, target, h))
        })
        .map(|ring_index| (ring_index, hole_index))
}

fn crosses_ring(a: Vec2, b: Vec2, ring: &[Vec2]) -> bool {
    let n = ring.len();
    (0..n).any(|i| {
        let (c, d) = (ring[i], ring[(i + 1) % n]);
        let shares_endpoint = [c, d]
            .iter()
            .any(|p| p.distance_squared(a) < EPSILON || p.distance_squared(b) < EPSILON);
        !shares_endpoint && segments_cross(a, b, c, d)
    })
}

fn orient(a: Vec2, b: Vec2, c: Vec2) -> f32 {
    (b - a).perp_dot(c - a)
}

fn segments_cross(a: Vec2, b: Vec2, c: Vec2, d: Vec2) -> bool {
    let d1 = orient(c, d, a);
    let d2 = orient(c, d, b);
    let d3 = orient(a, b, c);
    let d4 = orient(a, b, d);
    ((d1 > EPSILON && d2 < -EPSILON) || (d1 < -EPSILON && d2 > EPSILON))
        && ((d3 > EPSILON && d4 < -EPSILON) || (d3 < -EPSILON && d4 > EPSILON))
}

fn strictly_inside(p: Vec2, a: Vec2, b: Vec2, c: Vec2) -> bool {
    orient(a, b, p) > EPSILON && orient(b, c, p) > EPSILON && orient(c, a, p) > EPSILON
}

fn clip_ears(ring: &[Vec2]) -> Vec<u32> {
    let mut remaining: Vec<usize> = (0..ring.len()).collect();
    let mut indices = Vec::with_capacity(ring.len().saturating_sub(2) * 3);

    while remaining.len() > 3 {
        let n = remaining.len();
        let ear = (0..n).find(|&i| {
            let (ia, ib, ic) = (remaining[(i + n - 1) % n], remaining[i], remaining[(i + 1) % n]);
            let (a, b, c) = (ring[ia], ring[ib], ring[ic]);
            if orient(a, b, c) <= EPSILON {
                return false;
            }
            !remaining.iter().any(|&j| {
                let p = ring[j];
                j != ia
                    && j != ib
                    && j != ic
                    && p != a
                    && p != b
                    && p != c
                    && strictly_inside(p, a, b, c)
            })
        });

        // Degenerate rings can leave no strict ear. Drop a vertex to make
        // progress, keeping its triangle only if it is counter-clockwise.
        let i = ear.unwrap_or(0);
        let (ia, ib, ic) = (remaining[(i + n - 1) % n], remaining[i], remaining[(i + 1) % n]);
        if ear.is_some() || orient(ring[ia], ring[ib], ring[ic]) > EPSILON {
            indices.extend([ia as u32, ib as u32, ic as u32]);
        }
        remaining.remove(i);
    }

    if remaining.len() == 3 && orient(ring[remaining[0]], ring[remaining[1]], ring[remaining[2]]) > EPSILON {
        indices.extend(remaining.iter().map(|&i| i as u32));
    }

    indices
}
