//! Circle constraints applied to polygons during random point sampling

use nav_common::{circle_polygon, clip_poly_convex_2d, dist_sqr_2d, point_in_polygon};

/// Number of segments used to approximate the sampling circle
pub const CIRCLE_SEGMENTS: usize = 12;

/// Restricts a polygon to the part that may be sampled inside a circle
pub trait PolygonConstraint {
    /// Returns the vertices to sample from, or `None` to skip the polygon.
    fn apply(&self, verts: &[f32], center: &[f32; 3], radius: f32) -> Option<Vec<f32>>;
}

/// Samples whole polygons; the circle only bounds which polygons are visited
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpConstraint;

impl PolygonConstraint for NoOpConstraint {
    fn apply(&self, verts: &[f32], _center: &[f32; 3], _radius: f32) -> Option<Vec<f32>> {
        Some(verts.to_vec())
    }
}

/// Clips each polygon to a polygonal approximation of the circle
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictConstraint;

impl PolygonConstraint for StrictConstraint {
    fn apply(&self, verts: &[f32], center: &[f32; 3], radius: f32) -> Option<Vec<f32>> {
        let radius_sqr = radius * radius;
        let nverts = verts.len() / 3;
        let all_inside = verts
            .chunks_exact(3)
            .all(|v| dist_sqr_2d(center, v) <= radius_sqr);
        if all_inside {
            return Some(verts.to_vec());
        }

        let circle = circle_polygon(center, radius, CIRCLE_SEGMENTS);
        let clipped = clip_poly_convex_2d(verts, &circle);
        if !clipped.is_empty() {
            return Some(clipped);
        }
        // Circle entirely inside the polygon
        if point_in_polygon(center, verts, nverts) {
            return Some(circle);
        }
        None
    }
}
