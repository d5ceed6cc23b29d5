//! Pathfinding and spatial queries over tiled polygon navigation meshes
//!
//! A [`NavMesh`] stores polygon tiles and the links between them. A
//! [`NavMeshQuery`] borrows the mesh and answers path, raycast, Dijkstra-style
//! expansion and sampling queries against it. Long searches can be spread over
//! several frames with a caller-owned [`SlicedFindPath`] session.

use std::fmt;

pub mod nav_mesh;
pub mod nav_mesh_builder;
pub mod nav_mesh_query;
pub mod node_pool;
pub mod poly_query;
pub mod polygon_constraint;
pub mod query_filter;
pub mod raycast_hit;
pub mod sliced_pathfinding;
pub mod status;

#[cfg(test)]
mod test_mesh_helpers;

#[cfg(test)]
mod random_point_tests;
#[cfg(test)]
mod sliced_pathfinding_tests;
#[cfg(test)]
mod spatial_query_tests;
#[cfg(test)]
mod wall_query_tests;

pub use nav_mesh::{
    decode_poly_ref, encode_poly_ref, BVNode, Link, MeshTile, NavMesh, OffMeshConnection, Poly,
    PolyDetail, TileHeader,
};
pub use nav_mesh_builder::{NavMeshBuilder, NavMeshCreateParams, OffMeshConnectionParams};
pub use nav_mesh_query::{
    MoveAlongSurfaceResult, NavMeshQuery, NearestPolyResult, NeighbourhoodResult, PathResult,
    PolysAroundResult, PortalPoints, StraightPathPoint, StraightPathResult, WallDistance,
    WallSegment,
};
pub use node_pool::{Node, NodeFlags, NodeIndex, NodePool, NodeQueue};
pub use poly_query::{CollectPolysQuery, FindNearestPolyQuery, PolyQuery};
pub use polygon_constraint::{NoOpConstraint, PolygonConstraint, StrictConstraint};
pub use query_filter::{
    DefaultQueryFilter, DefaultQueryHeuristic, PolyContext, QueryFilter, QueryHeuristic,
};
pub use raycast_hit::RaycastHit;
pub use sliced_pathfinding::{SlicedFindPath, SlicedPathState};
pub use status::Status;

pub use nav_common::{Error, Result};

/// Maximum number of vertices per navigation polygon
pub const MAX_VERTS_PER_POLY: usize = 6;

/// Marks a polygon edge neighbour as a portal into an adjacent tile.
/// The low byte holds the portal side.
pub const EXT_LINK: u16 = 0x8000;

/// Side value for links between polygons of the same tile
pub const LINK_SIDE_INTERNAL: u8 = 0xff;

/// Off-mesh connection can be traversed in both directions
pub const OFFMESH_CON_BIDIR: u8 = 1;

/// Multiple of the agent radius used as the automatic any-angle raycast limit
pub const RAY_CAST_LIMIT_PROPORTIONS: f32 = 50.0;

/// Default search node budget for a query
pub const DEFAULT_MAX_NODES: usize = 2048;

/// Reference to a polygon within a navigation mesh.
///
/// Packs a salt, a tile index and a polygon index. `0` never names a polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct PolyRef(u32);

impl PolyRef {
    /// The null reference
    pub const NULL: PolyRef = PolyRef(0);

    /// Wraps a raw reference value
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw reference value
    pub const fn id(&self) -> u32 {
        self.0
    }

    /// Returns true unless this is the null reference
    pub const fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl From<u32> for PolyRef {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for PolyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PolyRef({:#x})", self.0)
    }
}

bitflags::bitflags! {
    /// Polygon flags used by query filters
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(
        feature = "serialization",
        derive(serde::Serialize, serde::Deserialize)
    )]
    pub struct PolyFlags: u16 {
        /// Ability to walk (ground, grass, road)
        const WALK = 0x01;
        /// Ability to swim (water)
        const SWIM = 0x02;
        /// Ability to move through doors
        const DOOR = 0x04;
        /// Ability to jump
        const JUMP = 0x08;
        /// Disabled polygon
        const DISABLED = 0x10;
    }
}

bitflags::bitflags! {
    /// Options for [`NavMeshQuery::find_path`] and sliced searches
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FindPathOptions: u32 {
        /// Use raycasts during the search to shortcut straight stretches
        const ANY_ANGLE = 0x02;
    }
}

bitflags::bitflags! {
    /// Options for [`NavMeshQuery::raycast`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RaycastOptions: u32 {
        /// Accumulate filter costs along the ray
        const USE_COSTS = 0x01;
    }
}

bitflags::bitflags! {
    /// Options for [`NavMeshQuery::find_straight_path`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StraightPathOptions: u32 {
        /// Add a vertex at every polygon edge where the area changes
        const AREA_CROSSINGS = 0x01;
        /// Add a vertex at every polygon edge crossed
        const ALL_CROSSINGS = 0x02;
    }
}

bitflags::bitflags! {
    /// Flags attached to each straight path vertex
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StraightPathFlags: u8 {
        /// First vertex of the path
        const START = 0x01;
        /// Last vertex of the path
        const END = 0x02;
        /// Vertex is the start of an off-mesh connection
        const OFFMESH_CONNECTION = 0x04;
    }
}

/// Polygon kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum PolyType {
    /// Regular walkable surface polygon
    #[default]
    Ground,
    /// Two-vertex connection between two surface locations
    OffMeshConnection,
}

/// Navigation mesh layout parameters
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct NavMeshParams {
    /// World space origin of the tile grid
    pub origin: [f32; 3],
    /// Width of each tile along x
    pub tile_width: f32,
    /// Depth of each tile along z
    pub tile_height: f32,
    /// Maximum number of tiles the mesh can hold
    pub max_tiles: i32,
    /// Maximum number of polygons in a single tile
    pub max_polys_per_tile: i32,
}
