//! Polygon query callbacks
//!
//! [`NavMeshQuery::query_polygons`](super::NavMeshQuery::query_polygons) hands
//! every batch of polygons that overlap the search box and pass the filter to
//! a [`PolyQuery`].

use super::nav_mesh::nearest_distance_sqr;
use super::{MeshTile, NavMesh, Poly, PolyRef};

/// Receives the polygons touched by a box query.
pub trait PolyQuery {
    /// Called for each batch of polygons of one tile that overlap the search
    /// area. Can be called several times for a single query.
    ///
    /// # Arguments
    /// * `tile` - The tile containing the polygons
    /// * `polys` - Polygons in the batch
    /// * `refs` - References matching `polys`
    fn process(&mut self, tile: &MeshTile, polys: &[&Poly], refs: &[PolyRef]);
}

/// Collects polygon references up to a maximum count.
pub struct CollectPolysQuery {
    polys: Vec<PolyRef>,
    max_polys: usize,
    overflow: bool,
}

impl CollectPolysQuery {
    pub fn new(max_polys: usize) -> Self {
        Self {
            polys: Vec::with_capacity(max_polys.min(1024)),
            max_polys,
            overflow: false,
        }
    }

    /// Returns the collected polygon references.
    pub fn polys(&self) -> &[PolyRef] {
        &self.polys
    }

    pub fn num_collected(&self) -> usize {
        self.polys.len()
    }

    /// Returns true if more polygons were available than could be collected.
    pub fn overflow(&self) -> bool {
        self.overflow
    }

    pub fn clear(&mut self) {
        self.polys.clear();
        self.overflow = false;
    }
}

impl PolyQuery for CollectPolysQuery {
    fn process(&mut self, _tile: &MeshTile, _polys: &[&Poly], refs: &[PolyRef]) {
        let remaining = self.max_polys.saturating_sub(self.polys.len());

        if remaining < refs.len() {
            self.overflow = true;
            self.polys.extend_from_slice(&refs[..remaining]);
        } else {
            self.polys.extend_from_slice(refs);
        }
    }
}

/// Tracks the polygon nearest to a point.
///
/// A point directly above a polygon and within the tile's climb height counts
/// as touching it, so walkable ground under the point wins over a closer wall.
pub struct FindNearestPolyQuery<'a> {
    nav_mesh: &'a NavMesh,
    center: [f32; 3],
    nearest_distance_sqr: f32,
    nearest_ref: PolyRef,
    nearest_point: [f32; 3],
    over_poly: bool,
}

impl<'a> FindNearestPolyQuery<'a> {
    pub fn new(nav_mesh: &'a NavMesh, center: &[f32; 3]) -> Self {
        Self {
            nav_mesh,
            center: *center,
            nearest_distance_sqr: f32::MAX,
            nearest_ref: PolyRef::NULL,
            nearest_point: *center,
            over_poly: false,
        }
    }

    /// Nearest polygon found, [`PolyRef::NULL`] if none
    pub fn nearest_ref(&self) -> PolyRef {
        self.nearest_ref
    }

    pub fn nearest_point(&self) -> &[f32; 3] {
        &self.nearest_point
    }

    /// Returns true if the nearest point is directly over the polygon.
    pub fn is_over_poly(&self) -> bool {
        self.over_poly
    }

    pub fn nearest_distance_sqr(&self) -> f32 {
        self.nearest_distance_sqr
    }
}

impl PolyQuery for FindNearestPolyQuery<'_> {
    fn process(&mut self, tile: &MeshTile, _polys: &[&Poly], refs: &[PolyRef]) {
        let climb = tile.walkable_climb();
        for &poly_ref in refs {
            let Ok((closest, over_poly)) = self.nav_mesh.closest_point_on_poly(poly_ref, &self.center)
            else {
                continue;
            };
            let d = nearest_distance_sqr(&self.center, &closest, over_poly, climb);
            if d < self.nearest_distance_sqr {
                self.nearest_distance_sqr = d;
                self.nearest_ref = poly_ref;
                self.nearest_point = closest;
                self.over_poly = over_poly;
            }
        }
    }
}
