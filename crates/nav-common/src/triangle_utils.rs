//! Triangle and bounds utilities used when preparing input geometry
//!
//! These mirror the small helpers a mesh build pipeline runs before voxelization:
//! bounds, grid and tile dimensions, and slope based walkability marking.

/// Walkable area id.
pub const WALKABLE_AREA: u8 = 63;

/// Null (unwalkable) area id.
pub const NULL_AREA: u8 = 0;

/// Describes how a triangle's area id is rewritten when it is marked walkable.
///
/// Only the bits in `mask` are replaced with the bits of `value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AreaModification {
    pub value: u8,
    pub mask: u8,
}

impl AreaModification {
    /// Replaces the whole area id with `value`.
    pub const fn new(value: u8) -> Self {
        Self { value, mask: 0xff }
    }

    pub const fn with_mask(value: u8, mask: u8) -> Self {
        Self { value, mask }
    }

    /// Applies the modification to an existing area id.
    #[inline]
    pub fn apply(&self, area: u8) -> u8 {
        (self.value & self.mask) | (area & !self.mask)
    }
}

impl Default for AreaModification {
    fn default() -> Self {
        Self::new(WALKABLE_AREA)
    }
}

/// Unit normal of triangle `v0, v1, v2`.
pub fn calc_tri_normal(v0: &[f32], v1: &[f32], v2: &[f32]) -> [f32; 3] {
    let e0 = glam::Vec3::new(v1[0] - v0[0], v1[1] - v0[1], v1[2] - v0[2]);
    let e1 = glam::Vec3::new(v2[0] - v0[0], v2[1] - v0[1], v2[2] - v0[2]);
    e0.cross(e1).normalize_or_zero().to_array()
}

fn tri_verts<'a>(verts: &'a [f32], tris: &[i32], i: usize) -> [&'a [f32]; 3] {
    let v = |k: usize| {
        let idx = tris[i * 3 + k] as usize * 3;
        &verts[idx..idx + 3]
    };
    [v(0), v(1), v(2)]
}

/// Returns one area id per triangle, modified by `area_mod` when the triangle's
/// slope is below `walkable_slope_angle` degrees and zero otherwise.
pub fn mark_walkable_triangles(
    walkable_slope_angle: f32,
    verts: &[f32],
    tris: &[i32],
    area_mod: AreaModification,
) -> Vec<u8> {
    let walkable_thr = walkable_slope_angle.to_radians().cos();
    let tri_count = tris.len() / 3;

    (0..tri_count)
        .map(|i| {
            let [a, b, c] = tri_verts(verts, tris, i);
            let norm = calc_tri_normal(a, b, c);
            if norm[1] > walkable_thr {
                area_mod.apply(NULL_AREA)
            } else {
                NULL_AREA
            }
        })
        .collect()
}

/// Sets the area id of every triangle steeper than `walkable_slope_angle` to
/// [`NULL_AREA`]. Walkable triangles keep their id.
pub fn clear_unwalkable_triangles(
    walkable_slope_angle: f32,
    verts: &[f32],
    tris: &[i32],
    areas: &mut [u8],
) {
    let walkable_thr = walkable_slope_angle.to_radians().cos();

    for (i, area) in areas.iter_mut().enumerate().take(tris.len() / 3) {
        let [a, b, c] = tri_verts(verts, tris, i);
        let norm = calc_tri_normal(a, b, c);
        if norm[1] <= walkable_thr {
            *area = NULL_AREA;
        }
    }
}

/// Axis aligned bounds of the first `nv` vertices of a flat buffer.
pub fn calc_bounds(verts: &[f32], nv: usize) -> ([f32; 3], [f32; 3]) {
    let mut bmin = [verts[0], verts[1], verts[2]];
    let mut bmax = bmin;
    for v in verts.chunks_exact(3).take(nv).skip(1) {
        for k in 0..3 {
            bmin[k] = bmin[k].min(v[k]);
            bmax[k] = bmax[k].max(v[k]);
        }
    }
    (bmin, bmax)
}

/// Grid width and depth (in cells) covering the given bounds.
pub fn calc_grid_size(bmin: &[f32; 3], bmax: &[f32; 3], cs: f32) -> (i32, i32) {
    let size_x = ((bmax[0] - bmin[0]) / cs + 0.5) as i32;
    let size_z = ((bmax[2] - bmin[2]) / cs + 0.5) as i32;
    (size_x, size_z)
}

/// Number of tiles along x and z needed to cover the bounds.
pub fn calc_tile_count(
    bmin: &[f32; 3],
    bmax: &[f32; 3],
    cs: f32,
    tile_size_x: i32,
    tile_size_z: i32,
) -> (i32, i32) {
    let (gw, gd) = calc_grid_size(bmin, bmax, cs);
    let tw = (gw + tile_size_x - 1) / tile_size_x;
    let td = (gd + tile_size_z - 1) / tile_size_z;
    (tw, td)
}

#[cfg(test)]
mod tests {
    use super::*;

    // One flat triangle and one vertical wall.
    const VERTS: [f32; 15] = [
        0.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, //
        1.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, //
        1.0, 1.0, 0.0, //
    ];
    const TRIS: [i32; 6] = [0, 1, 2, 0, 3, 4];

    #[test]
    fn test_normal_points_up_for_mesh_winding() {
        let n = calc_tri_normal(&VERTS[0..3], &VERTS[3..6], &VERTS[6..9]);
        assert!((n[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_mark_and_clear_walkable() {
        let areas = mark_walkable_triangles(45.0, &VERTS, &TRIS, AreaModification::default());
        assert_eq!(areas, vec![WALKABLE_AREA, NULL_AREA]);

        let mut areas = vec![7, 7];
        clear_unwalkable_triangles(45.0, &VERTS, &TRIS, &mut areas);
        assert_eq!(areas, vec![7, NULL_AREA]);
    }

    #[test]
    fn test_area_modification_mask() {
        let m = AreaModification::with_mask(0x0f, 0x0f);
        assert_eq!(m.apply(0xa0), 0xaf);
    }

    #[test]
    fn test_bounds_and_tiles() {
        let (bmin, bmax) = calc_bounds(&VERTS, 5);
        assert_eq!(bmin, [0.0, 0.0, 0.0]);
        assert_eq!(bmax, [1.0, 1.0, 1.0]);

        assert_eq!(calc_grid_size(&[0.0; 3], &[10.0, 0.0, 4.0], 0.5), (20, 8));
        assert_eq!(calc_tile_count(&[0.0; 3], &[10.0, 0.0, 4.0], 0.5, 16, 16), (2, 1));
    }
}
