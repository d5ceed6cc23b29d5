//! Polygon filters and search heuristics
//!
//! A [`QueryFilter`] decides which polygons a query may visit and what it costs
//! to move across them. A [`QueryHeuristic`] estimates the remaining cost of an
//! A* search.

use nav_common::vdist;

use super::{MeshTile, Poly, PolyFlags, PolyRef};

/// Maximum number of area ids
pub const MAX_AREAS: usize = 64;

/// A polygon together with the tile that owns it
#[derive(Debug, Clone, Copy)]
pub struct PolyContext<'a> {
    pub poly_ref: PolyRef,
    pub tile: &'a MeshTile,
    pub poly: &'a Poly,
}

impl<'a> PolyContext<'a> {
    pub fn new(poly_ref: PolyRef, tile: &'a MeshTile, poly: &'a Poly) -> Self {
        Self {
            poly_ref,
            tile,
            poly,
        }
    }
}

/// Decides polygon passability and traversal cost for a query
pub trait QueryFilter {
    /// Returns true if the polygon can be visited
    fn pass_filter(&self, poly_ref: PolyRef, tile: &MeshTile, poly: &Poly) -> bool;

    /// Cost to move from `pa` to `pb` across the `cur` polygon.
    ///
    /// `pa` lies on the edge shared with `prev` (or is the start position) and
    /// `pb` on the edge shared with `next` (or is the end position).
    fn get_cost(
        &self,
        pa: &[f32; 3],
        pb: &[f32; 3],
        prev: Option<PolyContext<'_>>,
        cur: PolyContext<'_>,
        next: Option<PolyContext<'_>>,
    ) -> f32;
}

/// Flag based filter with per-area cost multipliers
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultQueryFilter {
    /// Polygons must have at least one of these flags
    pub include_flags: PolyFlags,
    /// Polygons must have none of these flags
    pub exclude_flags: PolyFlags,
    /// Cost multiplier per area id
    pub area_cost: [f32; MAX_AREAS],
}

impl Default for DefaultQueryFilter {
    fn default() -> Self {
        Self {
            include_flags: PolyFlags::all(),
            exclude_flags: PolyFlags::empty(),
            area_cost: [1.0; MAX_AREAS],
        }
    }
}

impl DefaultQueryFilter {
    pub fn new(include_flags: PolyFlags, exclude_flags: PolyFlags) -> Self {
        Self {
            include_flags,
            exclude_flags,
            ..Self::default()
        }
    }

    /// Cost multiplier for an area id, 1.0 for ids out of range
    pub fn area_cost(&self, area: u8) -> f32 {
        self.area_cost.get(area as usize).copied().unwrap_or(1.0)
    }

    /// Sets the cost multiplier for an area id
    pub fn set_area_cost(&mut self, area: u8, cost: f32) {
        if let Some(slot) = self.area_cost.get_mut(area as usize) {
            *slot = cost;
        }
    }
}

impl QueryFilter for DefaultQueryFilter {
    fn pass_filter(&self, _poly_ref: PolyRef, _tile: &MeshTile, poly: &Poly) -> bool {
        poly.flags.intersects(self.include_flags) && !poly.flags.intersects(self.exclude_flags)
    }

    fn get_cost(
        &self,
        pa: &[f32; 3],
        pb: &[f32; 3],
        _prev: Option<PolyContext<'_>>,
        cur: PolyContext<'_>,
        _next: Option<PolyContext<'_>>,
    ) -> f32 {
        vdist(pa, pb) * self.area_cost(cur.poly.area)
    }
}

/// Estimates the remaining cost between two positions
pub trait QueryHeuristic {
    fn get_cost(&self, from: &[f32; 3], to: &[f32; 3]) -> f32;
}

/// Euclidean distance scaled slightly below 1 so equal-cost ties favour the goal
#[derive(Debug, Clone, Copy)]
pub struct DefaultQueryHeuristic {
    pub scale: f32,
}

impl DefaultQueryHeuristic {
    /// Scale used by the default heuristic
    pub const H_SCALE: f32 = 0.999;
}

impl Default for DefaultQueryHeuristic {
    fn default() -> Self {
        Self {
            scale: Self::H_SCALE,
        }
    }
}

impl QueryHeuristic for DefaultQueryHeuristic {
    fn get_cost(&self, from: &[f32; 3], to: &[f32; 3]) -> f32 {
        vdist(from, to) * self.scale
    }
}
