//! 2D geometry operations for navigation queries
//!
//! Most operations work on the XZ plane (Y-up coordinate system). Vertex buffers are
//! flat `[x, y, z, x, y, z, ...]` slices. Polygons are expected in the mesh winding,
//! for which [`tri_area_2d`] of consecutive vertices is positive.

use glam::Vec3;

/// Squared distance under which two points are considered equal.
const EQUAL_THRESHOLD_SQR: f32 = (1.0 / 16384.0) * (1.0 / 16384.0);

/// Calculate twice the signed area of a 2D triangle on the XZ plane.
///
/// Positive for the winding used by navigation mesh polygons.
#[inline]
pub fn tri_area_2d(a: &[f32], b: &[f32], c: &[f32]) -> f32 {
    let abx = b[0] - a[0];
    let abz = b[2] - a[2];
    let acx = c[0] - a[0];
    let acz = c[2] - a[2];
    acx * abz - abx * acz
}

/// Perp-dot product of two vectors on the XZ plane, `u.z * v.x - u.x * v.z`.
#[inline]
pub fn vperp_2d(u: &[f32], v: &[f32]) -> f32 {
    u[2] * v[0] - u[0] * v[2]
}

/// Dot product of two vectors on the XZ plane.
#[inline]
pub fn vdot_2d(u: &[f32], v: &[f32]) -> f32 {
    u[0] * v[0] + u[2] * v[2]
}

/// Calculate squared distance between two points on the XZ plane.
#[inline]
pub fn dist_sqr_2d(a: &[f32], b: &[f32]) -> f32 {
    let dx = b[0] - a[0];
    let dz = b[2] - a[2];
    dx * dx + dz * dz
}

/// Euclidean distance between two 3D points.
#[inline]
pub fn vdist(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    Vec3::from_array(*a).distance(Vec3::from_array(*b))
}

/// Squared euclidean distance between two 3D points.
#[inline]
pub fn vdist_sqr(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    Vec3::from_array(*a).distance_squared(Vec3::from_array(*b))
}

/// Linear interpolation `a + (b - a) * t`.
#[inline]
pub fn vlerp(a: &[f32; 3], b: &[f32; 3], t: f32) -> [f32; 3] {
    Vec3::from_array(*a)
        .lerp(Vec3::from_array(*b), t)
        .to_array()
}

/// True when two points are closer than 1/16384 units.
#[inline]
pub fn vequal(a: &[f32; 3], b: &[f32; 3]) -> bool {
    vdist_sqr(a, b) < EQUAL_THRESHOLD_SQR
}

/// True when every component is finite.
#[inline]
pub fn visfinite(v: &[f32; 3]) -> bool {
    v.iter().all(|c| c.is_finite())
}

/// Reads vertex `i` of a flat vertex buffer.
#[inline]
pub fn vert_at(verts: &[f32], i: usize) -> [f32; 3] {
    [verts[i * 3], verts[i * 3 + 1], verts[i * 3 + 2]]
}

/// Squared distance from `pt` to segment `p..q` on the XZ plane, with the
/// parametric position of the closest point along the segment.
pub fn dist_pt_seg_sqr_2d(pt: &[f32], p: &[f32], q: &[f32]) -> (f32, f32) {
    let pqx = q[0] - p[0];
    let pqz = q[2] - p[2];
    let mut dx = pt[0] - p[0];
    let mut dz = pt[2] - p[2];
    let d = pqx * pqx + pqz * pqz;
    let mut t = pqx * dx + pqz * dz;
    if d > 0.0 {
        t /= d;
    }
    t = t.clamp(0.0, 1.0);
    dx = p[0] + t * pqx - pt[0];
    dz = p[2] + t * pqz - pt[2];
    (dx * dx + dz * dz, t)
}

/// Crossing-number point in polygon test on the XZ plane.
///
/// Points exactly on an edge may land either side.
pub fn point_in_polygon(pt: &[f32], verts: &[f32], nverts: usize) -> bool {
    let mut inside = false;
    let mut j = nverts.wrapping_sub(1);
    for i in 0..nverts {
        let vi = &verts[i * 3..i * 3 + 3];
        let vj = &verts[j * 3..j * 3 + 3];
        if ((vi[2] > pt[2]) != (vj[2] > pt[2]))
            && (pt[0] < (vj[0] - vi[0]) * (pt[2] - vi[2]) / (vj[2] - vi[2]) + vi[0])
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Point in polygon test plus the squared distance to every edge.
///
/// Returns `(inside, edge_dist_sqr, edge_t)` where entry `j` describes the edge
/// from vertex `j` to vertex `j + 1`.
pub fn distance_pt_poly_edges_sqr(
    pt: &[f32],
    verts: &[f32],
    nverts: usize,
) -> (bool, Vec<f32>, Vec<f32>) {
    let mut edge_dists = vec![0.0; nverts];
    let mut edge_ts = vec![0.0; nverts];
    let mut inside = false;

    let mut j = nverts.wrapping_sub(1);
    for i in 0..nverts {
        let vi = &verts[i * 3..i * 3 + 3];
        let vj = &verts[j * 3..j * 3 + 3];
        if ((vi[2] > pt[2]) != (vj[2] > pt[2]))
            && (pt[0] < (vj[0] - vi[0]) * (pt[2] - vi[2]) / (vj[2] - vi[2]) + vi[0])
        {
            inside = !inside;
        }
        let (d, t) = dist_pt_seg_sqr_2d(pt, vj, vi);
        edge_dists[j] = d;
        edge_ts[j] = t;
        j = i;
    }

    (inside, edge_dists, edge_ts)
}

/// Result of clipping a segment against a convex polygon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentPolyIntersection {
    /// Parametric entry point along the segment.
    pub tmin: f32,
    /// Parametric exit point along the segment.
    pub tmax: f32,
    /// Edge index the segment enters through, or -1 if it starts inside.
    pub seg_min: i32,
    /// Edge index the segment exits through, or -1 if it ends inside.
    pub seg_max: i32,
}

/// Clips the segment `p0..p1` against a convex polygon on the XZ plane.
///
/// Returns `None` when the segment misses the polygon entirely.
pub fn intersect_segment_poly_2d(
    p0: &[f32],
    p1: &[f32],
    verts: &[f32],
    nverts: usize,
) -> Option<SegmentPolyIntersection> {
    const EPS: f32 = 0.000_001;

    let mut hit = SegmentPolyIntersection {
        tmin: 0.0,
        tmax: 1.0,
        seg_min: -1,
        seg_max: -1,
    };

    let dir = [p1[0] - p0[0], 0.0, p1[2] - p0[2]];

    let mut j = nverts.wrapping_sub(1);
    for i in 0..nverts {
        let vi = &verts[i * 3..i * 3 + 3];
        let vj = &verts[j * 3..j * 3 + 3];
        let edge = [vi[0] - vj[0], 0.0, vi[2] - vj[2]];
        let diff = [p0[0] - vj[0], 0.0, p0[2] - vj[2]];
        let n = vperp_2d(&edge, &diff);
        let d = vperp_2d(&dir, &edge);

        if d.abs() < EPS {
            // Parallel to this edge; outside means no overlap at all.
            if n < 0.0 {
                return None;
            }
            j = i;
            continue;
        }

        let t = n / d;
        if d < 0.0 {
            // Entering across this edge.
            if t > hit.tmin {
                hit.tmin = t;
                hit.seg_min = j as i32;
                if hit.tmin > hit.tmax {
                    return None;
                }
            }
        } else if t < hit.tmax {
            // Leaving across this edge.
            hit.tmax = t;
            hit.seg_max = j as i32;
            if hit.tmax < hit.tmin {
                return None;
            }
        }
        j = i;
    }

    Some(hit)
}

/// Intersects two segments on the XZ plane.
///
/// Returns the parametric positions `(s, t)` along `ap..aq` and `bp..bq` of the
/// intersection of the two carrier lines, or `None` when they are parallel.
pub fn intersect_seg_seg_2d(ap: &[f32], aq: &[f32], bp: &[f32], bq: &[f32]) -> Option<(f32, f32)> {
    let perp = |a: [f32; 2], b: [f32; 2]| a[0] * b[1] - a[1] * b[0];
    let u = [aq[0] - ap[0], aq[2] - ap[2]];
    let v = [bq[0] - bp[0], bq[2] - bp[2]];
    let w = [ap[0] - bp[0], ap[2] - bp[2]];
    let d = perp(u, v);
    if d.abs() < 1e-6 {
        return None;
    }
    Some((perp(v, w) / d, perp(u, w) / d))
}

/// Check if two axis-aligned bounding boxes overlap.
#[inline]
pub fn overlap_bounds(amin: &[f32; 3], amax: &[f32; 3], bmin: &[f32; 3], bmax: &[f32; 3]) -> bool {
    amin[0] <= bmax[0]
        && amax[0] >= bmin[0]
        && amin[1] <= bmax[1]
        && amax[1] >= bmin[1]
        && amin[2] <= bmax[2]
        && amax[2] >= bmin[2]
}

/// Check if two quantized bounding boxes overlap.
#[inline]
pub fn overlap_quant_bounds(
    amin: &[u16; 3],
    amax: &[u16; 3],
    bmin: &[u16; 3],
    bmax: &[u16; 3],
) -> bool {
    amin[0] <= bmax[0]
        && amax[0] >= bmin[0]
        && amin[1] <= bmax[1]
        && amax[1] >= bmin[1]
        && amin[2] <= bmax[2]
        && amax[2] >= bmin[2]
}

fn project_poly(axis: &[f32; 3], poly: &[f32], npoly: usize) -> (f32, f32) {
    let mut rmin = vdot_2d(axis, &poly[0..3]);
    let mut rmax = rmin;
    for i in 1..npoly {
        let d = vdot_2d(axis, &poly[i * 3..i * 3 + 3]);
        rmin = rmin.min(d);
        rmax = rmax.max(d);
    }
    (rmin, rmax)
}

#[inline]
fn overlap_range(amin: f32, amax: f32, bmin: f32, bmax: f32, eps: f32) -> bool {
    !((amin + eps) > bmax || (amax - eps) < bmin)
}

/// Separating axis test between two convex polygons on the XZ plane.
///
/// Touching polygons do not count as overlapping.
pub fn overlap_poly_poly_2d(polya: &[f32], npolya: usize, polyb: &[f32], npolyb: usize) -> bool {
    const EPS: f32 = 1e-4;

    for (poly, npoly) in [(polya, npolya), (polyb, npolyb)] {
        let mut j = npoly - 1;
        for i in 0..npoly {
            let va = &poly[j * 3..j * 3 + 3];
            let vb = &poly[i * 3..i * 3 + 3];
            let n = [vb[2] - va[2], 0.0, -(vb[0] - va[0])];
            let (amin, amax) = project_poly(&n, polya, npolya);
            let (bmin, bmax) = project_poly(&n, polyb, npolyb);
            if !overlap_range(amin, amax, bmin, bmax, EPS) {
                return false;
            }
            j = i;
        }
    }
    true
}

/// Height of triangle `a, b, c` at the XZ location of `p`, if `p` lies over it.
pub fn closest_height_point_triangle(p: &[f32], a: &[f32], b: &[f32], c: &[f32]) -> Option<f32> {
    const EPS: f32 = 1e-6;

    let v0 = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
    let v1 = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let v2 = [p[0] - a[0], p[1] - a[1], p[2] - a[2]];

    let mut denom = v0[0] * v1[2] - v0[2] * v1[0];
    if denom.abs() < EPS {
        return None;
    }

    let mut u = v1[2] * v2[0] - v1[0] * v2[2];
    let mut v = v0[0] * v2[2] - v0[2] * v2[0];

    if denom < 0.0 {
        denom = -denom;
        u = -u;
        v = -v;
    }

    if u >= 0.0 && v >= 0.0 && (u + v) <= denom {
        Some(a[1] + (v0[1] * u + v1[1] * v) / denom)
    } else {
        None
    }
}

/// Picks a point inside a convex polygon from two uniform numbers in `[0, 1)`.
///
/// `s` selects a fan triangle weighted by area and, together with `t`, a
/// barycentric location inside it.
pub fn random_point_in_convex_poly(pts: &[f32], npts: usize, s: f32, t: f32) -> [f32; 3] {
    let mut areas = vec![0.0; npts];
    let mut area_sum = 0.0;
    for i in 2..npts {
        areas[i] = tri_area_2d(&pts[0..3], &pts[(i - 1) * 3..i * 3], &pts[i * 3..i * 3 + 3]);
        area_sum += areas[i].max(0.001);
    }

    let thr = s * area_sum;
    let mut acc = 0.0;
    let mut u = 1.0;
    let mut tri = npts - 1;
    for (i, &dacc) in areas.iter().enumerate().skip(2) {
        if thr >= acc && thr < acc + dacc {
            u = (thr - acc) / dacc;
            tri = i;
            break;
        }
        acc += dacc;
    }

    let v = t.sqrt();
    let a = 1.0 - v;
    let b = (1.0 - u) * v;
    let c = u * v;
    let pa = &pts[0..3];
    let pb = &pts[(tri - 1) * 3..tri * 3];
    let pc = &pts[tri * 3..tri * 3 + 3];

    [
        a * pa[0] + b * pb[0] + c * pc[0],
        a * pa[1] + b * pb[1] + c * pc[1],
        a * pa[2] + b * pb[2] + c * pc[2],
    ]
}

/// Area-weighted sum used by the reservoir samplers: twice the fan area of a
/// convex polygon.
pub fn poly_area_2d(verts: &[f32], nverts: usize) -> f32 {
    (2..nverts)
        .map(|j| tri_area_2d(&verts[0..3], &verts[(j - 1) * 3..j * 3], &verts[j * 3..j * 3 + 3]))
        .sum()
}

/// Regular polygon approximating a circle on the XZ plane, in mesh winding.
pub fn circle_polygon(center: &[f32; 3], radius: f32, segments: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(segments * 3);
    for i in 0..segments {
        let a = i as f32 * std::f32::consts::TAU / segments as f32;
        out.push(center[0] + a.cos() * radius);
        out.push(center[1]);
        out.push(center[2] - a.sin() * radius);
    }
    out
}

/// Clips `subject` against the convex polygon `clip` on the XZ plane.
///
/// Both polygons must use the mesh winding. Heights of new vertices are
/// interpolated along the subject edges. Returns an empty buffer when the
/// polygons do not overlap.
pub fn clip_poly_convex_2d(subject: &[f32], clip: &[f32]) -> Vec<f32> {
    let nclip = clip.len() / 3;
    let mut output = subject.to_vec();

    let mut j = nclip.wrapping_sub(1);
    for i in 0..nclip {
        if output.len() < 9 {
            return Vec::new();
        }
        let ca = &clip[j * 3..j * 3 + 3];
        let cb = &clip[i * 3..i * 3 + 3];
        let input = std::mem::take(&mut output);
        let n = input.len() / 3;

        let mut k = n - 1;
        for l in 0..n {
            let prev = &input[k * 3..k * 3 + 3];
            let cur = &input[l * 3..l * 3 + 3];
            let dp = tri_area_2d(ca, cb, prev);
            let dc = tri_area_2d(ca, cb, cur);
            if dc >= 0.0 {
                if dp < 0.0 {
                    let t = dp / (dp - dc);
                    output.extend_from_slice(&lerp_slice(prev, cur, t));
                }
                output.extend_from_slice(cur);
            } else if dp >= 0.0 {
                let t = dp / (dp - dc);
                output.extend_from_slice(&lerp_slice(prev, cur, t));
            }
            k = l;
        }
        j = i;
    }

    if output.len() < 9 {
        return Vec::new();
    }
    output
}

#[inline]
fn lerp_slice(a: &[f32], b: &[f32], t: f32) -> [f32; 3] {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
    ]
}
