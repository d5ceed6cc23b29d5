//! Raycast hit information

use super::PolyRef;

/// Result of a walkability raycast along the mesh surface
#[derive(Debug, Clone, PartialEq)]
pub struct RaycastHit {
    /// Hit parameter along the segment, `f32::MAX` if the end was reached
    /// without hitting a wall
    pub t: f32,

    /// Normal of the wall that was hit
    pub hit_normal: [f32; 3],

    /// Edge of the last visited polygon that was hit, -1 if none
    pub hit_edge_index: i32,

    /// Polygons visited by the ray, in order
    pub path: Vec<PolyRef>,

    /// Cost of the visited path, only accumulated with
    /// [`RaycastOptions::USE_COSTS`](super::RaycastOptions::USE_COSTS)
    pub path_cost: f32,
}

impl Default for RaycastHit {
    fn default() -> Self {
        Self {
            t: 0.0,
            hit_normal: [0.0; 3],
            hit_edge_index: -1,
            path: Vec::new(),
            path_cost: 0.0,
        }
    }
}

impl RaycastHit {
    /// Creates a hit describing an unobstructed segment
    pub fn no_hit() -> Self {
        Self {
            t: f32::MAX,
            ..Self::default()
        }
    }

    /// Checks if the ray stopped at a wall
    pub fn hit_wall(&self) -> bool {
        self.t < f32::MAX
    }

    /// Point where the ray stopped, or `end` if it reached it
    pub fn hit_point(&self, start: &[f32; 3], end: &[f32; 3]) -> [f32; 3] {
        if !self.hit_wall() {
            return *end;
        }
        [
            start[0] + (end[0] - start[0]) * self.t,
            start[1] + (end[1] - start[1]) * self.t,
            start[2] + (end[2] - start[2]) * self.t,
        ]
    }

    /// Last polygon the ray visited
    pub fn last_poly(&self) -> PolyRef {
        self.path.last().copied().unwrap_or(PolyRef::NULL)
    }
}
