//! Navigation mesh query engine
//!
//! [`NavMeshQuery`] borrows a [`NavMesh`] and owns the search node pools used by
//! the graph queries. Each query clears the pools it uses, so one instance can
//! serve many queries in sequence but not concurrently; use one instance per
//! thread against the same shared mesh.
//!
//! The A* core ([`PathSearch`]) and the pool-free helpers (raycast, portal
//! geometry, path reconstruction) are shared with
//! [`SlicedFindPath`](super::SlicedFindPath).

use std::collections::VecDeque;

use glam::Vec3;
use nav_common::{
    dist_pt_seg_sqr_2d, distance_pt_poly_edges_sqr, intersect_seg_seg_2d,
    intersect_segment_poly_2d, overlap_poly_poly_2d, point_in_polygon, poly_area_2d,
    random_point_in_convex_poly, ticks, ticks_to_millis, tri_area_2d, vdist, vdist_sqr, vequal,
    vert_at, visfinite, vlerp, Error, Result,
};

use super::nav_mesh::closest_point_on_edges;
use super::node_pool::NULL_NODE;
use super::{
    decode_poly_ref, DefaultQueryHeuristic, FindNearestPolyQuery, FindPathOptions, MeshTile,
    NavMesh, NodeFlags, NodeIndex, NodePool, NodeQueue, Poly, PolyContext, PolyQuery, PolyRef,
    PolyType, PolygonConstraint, QueryFilter, QueryHeuristic, RaycastHit, RaycastOptions, Status,
    StraightPathFlags, StraightPathOptions, DEFAULT_MAX_NODES, EXT_LINK, MAX_VERTS_PER_POLY,
    RAY_CAST_LIMIT_PROPORTIONS,
};

/// Node budget of the small pool used by local searches
const TINY_NODE_POOL_SIZE: usize = 64;

/// Polygons handed to a [`PolyQuery`] per call
const QUERY_BATCH_SIZE: usize = 32;

/// Maximum neighbours considered across one edge by [`NavMeshQuery::move_along_surface`]
const MAX_EDGE_NEIGHBOURS: usize = 8;

/// Path corridor produced by a path search
#[derive(Debug, Clone, PartialEq)]
pub struct PathResult {
    /// Polygons from the start polygon to the goal, or to the polygon closest
    /// to it for a partial result
    pub path: Vec<PolyRef>,
    /// Success, possibly with `PARTIAL_RESULT` and `OUT_OF_NODES` details
    pub status: Status,
}

/// One vertex of a straight path
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StraightPathPoint {
    pub pos: [f32; 3],
    pub flags: StraightPathFlags,
    /// Polygon entered at this vertex, [`PolyRef::NULL`] for the end point
    pub poly_ref: PolyRef,
}

/// Result of [`NavMeshQuery::find_straight_path`]
#[derive(Debug, Clone, PartialEq)]
pub struct StraightPathResult {
    pub points: Vec<StraightPathPoint>,
    /// Success, with `BUFFER_TOO_SMALL` when the vertex cap cut the path short
    pub status: Status,
}

/// Portal between two adjacent polygons
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortalPoints {
    pub left: [f32; 3],
    pub right: [f32; 3],
    pub from_type: PolyType,
    pub to_type: PolyType,
}

/// Polygons reached by a Dijkstra expansion, in the order they were settled
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolysAroundResult {
    pub refs: Vec<PolyRef>,
    /// Parent of each polygon, [`PolyRef::NULL`] for the start polygon
    pub parents: Vec<PolyRef>,
    /// Accumulated cost to reach each polygon
    pub costs: Vec<f32>,
    /// Success, with `OUT_OF_NODES` if the expansion was cut short
    pub status: Status,
}

/// Non-overlapping polygons around a position
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NeighbourhoodResult {
    pub refs: Vec<PolyRef>,
    pub parents: Vec<PolyRef>,
}

/// Nearest polygon to a point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestPolyResult {
    /// [`PolyRef::NULL`] when no polygon was found in the search box
    pub poly_ref: PolyRef,
    pub point: [f32; 3],
    /// True if the point lies directly over the polygon
    pub over_poly: bool,
}

/// Result of [`NavMeshQuery::move_along_surface`]
#[derive(Debug, Clone, PartialEq)]
pub struct MoveAlongSurfaceResult {
    pub result_pos: [f32; 3],
    /// Polygons from the start polygon to the one containing `result_pos`
    pub visited: Vec<PolyRef>,
}

/// Boundary segment of a polygon
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallSegment {
    pub start: [f32; 3],
    pub end: [f32; 3],
    /// Polygon on the other side for portal segments, NULL for walls
    pub neighbour_ref: PolyRef,
}

impl WallSegment {
    pub fn is_wall(&self) -> bool {
        !self.neighbour_ref.is_valid()
    }
}

/// Distance to the nearest wall
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallDistance {
    /// Distance to the wall, or the search radius if none was found
    pub distance: f32,
    pub hit_pos: [f32; 3],
    pub hit_normal: [f32; 3],
}

/// Query engine over a navigation mesh
#[derive(Debug)]
pub struct NavMeshQuery<'a> {
    nav_mesh: &'a NavMesh,
    node_pool: NodePool,
    open_list: NodeQueue,
    tiny_node_pool: NodePool,
}

impl<'a> NavMeshQuery<'a> {
    /// Creates a query with the default node budget
    pub fn new(nav_mesh: &'a NavMesh) -> Self {
        Self::with_max_nodes(nav_mesh, DEFAULT_MAX_NODES)
    }

    /// Creates a query whose searches visit at most `max_nodes` polygons
    pub fn with_max_nodes(nav_mesh: &'a NavMesh, max_nodes: usize) -> Self {
        Self {
            nav_mesh,
            node_pool: NodePool::new(max_nodes),
            open_list: NodeQueue::new(max_nodes),
            tiny_node_pool: NodePool::new(TINY_NODE_POOL_SIZE),
        }
    }

    pub fn nav_mesh(&self) -> &'a NavMesh {
        self.nav_mesh
    }

    /// Node pool of the most recent search
    pub fn node_pool(&self) -> &NodePool {
        &self.node_pool
    }

    /// Finds a polygon corridor from `start_ref` to `end_ref`.
    ///
    /// When the goal cannot be reached the path leads to the visited polygon
    /// closest to it and the status carries `PARTIAL_RESULT`.
    pub fn find_path(
        &mut self,
        start_ref: PolyRef,
        end_ref: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &dyn QueryFilter,
    ) -> Result<PathResult> {
        self.find_path_with_options(
            start_ref,
            end_ref,
            start_pos,
            end_pos,
            filter,
            &DefaultQueryHeuristic::default(),
            FindPathOptions::empty(),
            0.0,
        )
    }

    /// Finds a polygon corridor with a custom heuristic and search options.
    ///
    /// With [`FindPathOptions::ANY_ANGLE`] the search raycasts from the parent
    /// of each expanded polygon and skips straight stretches. `raycast_limit`
    /// bounds the length of those raycasts; a negative value derives it from
    /// the start tile's agent radius.
    #[allow(clippy::too_many_arguments)]
    pub fn find_path_with_options(
        &mut self,
        start_ref: PolyRef,
        end_ref: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &dyn QueryFilter,
        heuristic: &dyn QueryHeuristic,
        options: FindPathOptions,
        raycast_limit: f32,
    ) -> Result<PathResult> {
        let start_time = ticks();
        let nav_mesh = self.nav_mesh;
        validate_path_request(nav_mesh, start_ref, end_ref, start_pos, end_pos)?;
        let raycast_limit_sqr = raycast_limit_sqr(nav_mesh, start_ref, options, raycast_limit)?;

        if start_ref == end_ref {
            return Ok(PathResult {
                path: vec![start_ref],
                status: Status::success(),
            });
        }

        let search = PathSearch {
            nav_mesh,
            end_ref,
            end_pos: *end_pos,
            filter,
            heuristic,
            options,
            raycast_limit_sqr,
        };

        let mut progress =
            search.seed(&mut self.node_pool, &mut self.open_list, start_ref, start_pos)?;
        loop {
            match search.step(&mut self.node_pool, &mut self.open_list, &mut progress)? {
                SearchStep::Continue => {}
                SearchStep::ReachedGoal | SearchStep::Exhausted => break,
            }
        }

        let path = get_path_to_node(&self.node_pool, progress.last_best_node);
        let status = progress.status(&self.node_pool, end_ref);
        if status.is_partial() || status.has_detail(Status::OUT_OF_NODES) {
            log::debug!(
                "find_path {start_ref} -> {end_ref} ended with {status} after {} nodes",
                self.node_pool.node_count()
            );
        }
        log::trace!(
            "find_path visited {} nodes in {:.3} ms",
            self.node_pool.node_count(),
            ticks_to_millis(ticks() - start_time)
        );

        Ok(PathResult { path, status })
    }

    /// Turns a polygon corridor into a list of straight segments.
    ///
    /// `start_pos` and `end_pos` are clamped to the first and last polygon.
    /// Processing stops once `max_straight_path` vertices were produced.
    pub fn find_straight_path(
        &self,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        path: &[PolyRef],
        max_straight_path: usize,
        options: StraightPathOptions,
    ) -> Result<StraightPathResult> {
        if !visfinite(start_pos) || !visfinite(end_pos) || max_straight_path == 0 {
            return Err(Error::invalid_param("invalid straight path input"));
        }
        let Some(&first_ref) = path.first().filter(|r| r.is_valid()) else {
            return Err(Error::invalid_param("empty path corridor"));
        };
        let last_ref = path[path.len() - 1];

        let closest_start = self
            .closest_point_on_poly_boundary(first_ref, start_pos)
            .map_err(|_| Error::invalid_param("cannot find start position"))?;
        let mut closest_end = self
            .closest_point_on_poly_boundary(last_ref, end_pos)
            .map_err(|_| Error::invalid_param("cannot find end position"))?;

        let mut out = StraightPathBuilder::new(max_straight_path);
        if !out.append_vertex(closest_start, StraightPathFlags::START, first_ref) {
            return Ok(out.finish());
        }

        let crossings = options
            .intersects(StraightPathOptions::AREA_CROSSINGS | StraightPathOptions::ALL_CROSSINGS);

        if path.len() > 1 {
            let mut portal_apex = closest_start;
            let mut portal_left = portal_apex;
            let mut portal_right = portal_apex;
            let mut apex_index = 0;
            let mut left_index = 0;
            let mut right_index = 0;
            let mut left_poly_type = PolyType::Ground;
            let mut right_poly_type = PolyType::Ground;
            let mut left_poly_ref = first_ref;
            let mut right_poly_ref = first_ref;

            let mut i = 0;
            while i < path.len() {
                let (left, right, to_type) = if i + 1 < path.len() {
                    match self.get_portal_points(path[i], path[i + 1]) {
                        Ok(portal) => {
                            // Starting really close to the first portal, advance.
                            if i == 0
                                && dist_pt_seg_sqr_2d(&portal_apex, &portal.left, &portal.right).0
                                    < 0.001 * 0.001
                            {
                                i += 1;
                                continue;
                            }
                            (portal.left, portal.right, portal.to_type)
                        }
                        Err(_) => {
                            // The corridor is broken; stop at the last valid polygon.
                            closest_end = self.closest_point_on_poly_boundary(path[i], end_pos)?;
                            if crossings {
                                out.append_portals(
                                    self.nav_mesh,
                                    apex_index,
                                    i,
                                    &closest_end,
                                    path,
                                    options,
                                );
                            }
                            out.append_vertex(closest_end, StraightPathFlags::empty(), path[i]);
                            out.partial = true;
                            return Ok(out.finish());
                        }
                    }
                } else {
                    (closest_end, closest_end, PolyType::Ground)
                };
                let next_ref = path.get(i + 1).copied().unwrap_or(PolyRef::NULL);

                // Right vertex.
                if tri_area_2d(&portal_apex, &portal_right, &right) <= 0.0 {
                    if vequal(&portal_apex, &portal_right)
                        || tri_area_2d(&portal_apex, &portal_left, &right) > 0.0
                    {
                        portal_right = right;
                        right_poly_ref = next_ref;
                        right_poly_type = to_type;
                        right_index = i;
                    } else {
                        if crossings
                            && !out.append_portals(
                                self.nav_mesh,
                                apex_index,
                                left_index,
                                &portal_left,
                                path,
                                options,
                            )
                        {
                            return Ok(out.finish());
                        }

                        portal_apex = portal_left;
                        apex_index = left_index;

                        let flags = apex_flags(left_poly_ref, left_poly_type);
                        if !out.append_vertex(portal_apex, flags, left_poly_ref) {
                            return Ok(out.finish());
                        }

                        portal_left = portal_apex;
                        portal_right = portal_apex;
                        left_index = apex_index;
                        right_index = apex_index;

                        // Restart from the new apex.
                        i = apex_index + 1;
                        continue;
                    }
                }

                // Left vertex.
                if tri_area_2d(&portal_apex, &portal_left, &left) >= 0.0 {
                    if vequal(&portal_apex, &portal_left)
                        || tri_area_2d(&portal_apex, &portal_right, &left) < 0.0
                    {
                        portal_left = left;
                        left_poly_ref = next_ref;
                        left_poly_type = to_type;
                        left_index = i;
                    } else {
                        if crossings
                            && !out.append_portals(
                                self.nav_mesh,
                                apex_index,
                                right_index,
                                &portal_right,
                                path,
                                options,
                            )
                        {
                            return Ok(out.finish());
                        }

                        portal_apex = portal_right;
                        apex_index = right_index;

                        let flags = apex_flags(right_poly_ref, right_poly_type);
                        if !out.append_vertex(portal_apex, flags, right_poly_ref) {
                            return Ok(out.finish());
                        }

                        portal_left = portal_apex;
                        portal_right = portal_apex;
                        left_index = apex_index;
                        right_index = apex_index;

                        i = apex_index + 1;
                        continue;
                    }
                }

                i += 1;
            }

            if crossings
                && !out.append_portals(
                    self.nav_mesh,
                    apex_index,
                    path.len() - 1,
                    &closest_end,
                    path,
                    options,
                )
            {
                return Ok(out.finish());
            }
        }

        out.append_vertex(closest_end, StraightPathFlags::END, PolyRef::NULL);
        Ok(out.finish())
    }

    /// Casts a walkability ray from `start_pos` towards `end_pos` along the
    /// mesh surface.
    ///
    /// `prev_ref` is the polygon the caller came from and is only used for
    /// cost evaluation.
    pub fn raycast(
        &self,
        start_ref: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &dyn QueryFilter,
        options: RaycastOptions,
        prev_ref: PolyRef,
    ) -> Result<RaycastHit> {
        raycast(
            self.nav_mesh,
            start_ref,
            start_pos,
            end_pos,
            filter,
            options,
            prev_ref,
        )
    }

    /// Portal shared by two adjacent polygons
    pub fn get_portal_points(&self, from_ref: PolyRef, to_ref: PolyRef) -> Result<PortalPoints> {
        let from = poly_context(self.nav_mesh, from_ref)?;
        let to = poly_context(self.nav_mesh, to_ref)?;
        let (left, right) = portal_points(from, to)?;
        Ok(PortalPoints {
            left,
            right,
            from_type: from.poly.poly_type,
            to_type: to.poly.poly_type,
        })
    }

    /// Midpoint of the portal between two adjacent polygons
    pub fn get_edge_mid_point(&self, from_ref: PolyRef, to_ref: PolyRef) -> Result<[f32; 3]> {
        let from = poly_context(self.nav_mesh, from_ref)?;
        let to = poly_context(self.nav_mesh, to_ref)?;
        edge_mid_point(from, to)
    }

    /// Finds the polygons reachable from `start_ref` whose portals touch the circle.
    ///
    /// Costs come from the filter; results are ordered by increasing cost.
    pub fn find_polys_around_circle(
        &mut self,
        start_ref: PolyRef,
        center: &[f32; 3],
        radius: f32,
        filter: &dyn QueryFilter,
    ) -> Result<PolysAroundResult> {
        if !self.nav_mesh.is_valid_poly_ref(start_ref)
            || !visfinite(center)
            || radius < 0.0
            || !radius.is_finite()
        {
            return Err(Error::invalid_param("invalid circle query"));
        }
        let radius_sqr = radius * radius;
        self.polys_around(start_ref, center, filter, |va, vb| {
            dist_pt_seg_sqr_2d(center, va, vb).0 <= radius_sqr
        })
    }

    /// Finds the polygons reachable from `start_ref` whose portals touch the
    /// convex shape `verts` (\[x,y,z,...\]).
    pub fn find_polys_around_shape(
        &mut self,
        start_ref: PolyRef,
        verts: &[f32],
        filter: &dyn QueryFilter,
    ) -> Result<PolysAroundResult> {
        let nverts = verts.len() / 3;
        if !self.nav_mesh.is_valid_poly_ref(start_ref)
            || nverts < 3
            || verts.iter().any(|v| !v.is_finite())
        {
            return Err(Error::invalid_param("invalid shape query"));
        }

        let mut center = [0.0; 3];
        for v in verts.chunks_exact(3) {
            center[0] += v[0];
            center[1] += v[1];
            center[2] += v[2];
        }
        let scale = 1.0 / nverts as f32;
        center = [center[0] * scale, center[1] * scale, center[2] * scale];

        self.polys_around(start_ref, &center, filter, |va, vb| {
            matches!(
                intersect_segment_poly_2d(va, vb, verts, nverts),
                Some(hit) if hit.tmin <= 1.0 && hit.tmax >= 0.0
            )
        })
    }

    /// Finds non-overlapping polygons around `center`, breadth first.
    ///
    /// A reached polygon is rejected when its footprint overlaps an already
    /// accepted polygon it is not connected to.
    pub fn find_local_neighbourhood(
        &mut self,
        start_ref: PolyRef,
        center: &[f32; 3],
        radius: f32,
        filter: &dyn QueryFilter,
    ) -> Result<NeighbourhoodResult> {
        if !self.nav_mesh.is_valid_poly_ref(start_ref)
            || !visfinite(center)
            || radius < 0.0
            || !radius.is_finite()
        {
            return Err(Error::invalid_param("invalid neighbourhood query"));
        }
        let nav_mesh = self.nav_mesh;
        let pool = &mut self.tiny_node_pool;
        pool.clear();

        let start_idx = pool
            .get_node(start_ref, 0)
            .ok_or(Error::OutOfNodes)?;
        pool.node_mut(start_idx).flags = NodeFlags::CLOSED;

        let mut result = NeighbourhoodResult {
            refs: vec![start_ref],
            parents: vec![PolyRef::NULL],
        };
        let mut queue = VecDeque::from([start_idx]);
        let radius_sqr = radius * radius;

        while let Some(cur_idx) = queue.pop_front() {
            let cur = poly_context(nav_mesh, pool.node(cur_idx).id)?;

            for link in cur.tile.links_of(cur.poly) {
                let neighbour_ref = link.reference;
                if !neighbour_ref.is_valid() {
                    continue;
                }
                let Some(neighbour_idx) = pool.get_node(neighbour_ref, 0) else {
                    continue;
                };
                if pool.node(neighbour_idx).flags.contains(NodeFlags::CLOSED) {
                    continue;
                }

                let Ok(neighbour) = poly_context(nav_mesh, neighbour_ref) else {
                    continue;
                };
                if neighbour.poly.is_off_mesh_connection()
                    || !filter.pass_filter(neighbour_ref, neighbour.tile, neighbour.poly)
                {
                    continue;
                }

                let Ok((va, vb)) = portal_points(cur, neighbour) else {
                    continue;
                };
                if dist_pt_seg_sqr_2d(center, &va, &vb).0 > radius_sqr {
                    continue;
                }

                // Visited even if the overlap test below rejects it.
                let node = pool.node_mut(neighbour_idx);
                node.flags |= NodeFlags::CLOSED;
                node.pidx = cur_idx;

                let npa = neighbour.poly.vert_count as usize;
                let pa = neighbour.tile.poly_verts(neighbour.poly);

                let mut overlap = false;
                for &past_ref in &result.refs {
                    // Connected polygons do not overlap.
                    if cur
                        .tile
                        .links_of(cur.poly)
                        .any(|l| l.reference == past_ref)
                    {
                        continue;
                    }
                    let Ok((past_tile, past_poly)) = nav_mesh.get_tile_and_poly_by_ref(past_ref)
                    else {
                        continue;
                    };
                    let pb = past_tile.poly_verts(past_poly);
                    if overlap_poly_poly_2d(&pa, npa, &pb, past_poly.vert_count as usize) {
                        overlap = true;
                        break;
                    }
                }
                if overlap {
                    continue;
                }

                result.refs.push(neighbour_ref);
                result.parents.push(cur.poly_ref);
                queue.push_back(neighbour_idx);
            }
        }

        Ok(result)
    }

    /// Wall and, optionally, portal segments of one polygon.
    ///
    /// Tile border edges are split by the spans of their links so partially
    /// connected edges yield both portal and wall pieces.
    pub fn get_poly_wall_segments(
        &self,
        poly_ref: PolyRef,
        store_portals: bool,
        filter: &dyn QueryFilter,
    ) -> Result<Vec<WallSegment>> {
        let (tile, poly) = self.nav_mesh.get_tile_and_poly_by_ref(poly_ref)?;
        let nv = poly.vert_count as usize;
        let mut segments = Vec::new();
        let mut intervals: Vec<SegInterval> = Vec::with_capacity(16);

        for i in 0..nv {
            let j = (i + nv - 1) % nv;
            let vj = tile.vertex(poly.verts[j]);
            let vi = tile.vertex(poly.verts[i]);
            intervals.clear();

            if poly.neighbors[j] & EXT_LINK != 0 {
                // Tile border.
                for link in tile.links_of(poly) {
                    if link.edge_index as usize != j || !link.reference.is_valid() {
                        continue;
                    }
                    let Ok((nei_tile, nei_poly)) =
                        self.nav_mesh.get_tile_and_poly_by_ref(link.reference)
                    else {
                        continue;
                    };
                    if filter.pass_filter(link.reference, nei_tile, nei_poly) {
                        insert_interval(
                            &mut intervals,
                            link.bmin as i32,
                            link.bmax as i32,
                            link.reference,
                        );
                    }
                }
            } else {
                // Internal edge.
                let mut nei_ref = PolyRef::NULL;
                if poly.neighbors[j] != 0 {
                    let idx = (poly.neighbors[j] - 1) as usize;
                    if let Some(nei_poly) = tile.polys.get(idx) {
                        let candidate = tile.poly_ref(idx);
                        if filter.pass_filter(candidate, tile, nei_poly) {
                            nei_ref = candidate;
                        }
                    }
                }

                if nei_ref.is_valid() && !store_portals {
                    continue;
                }
                segments.push(WallSegment {
                    start: vj,
                    end: vi,
                    neighbour_ref: nei_ref,
                });
                continue;
            }

            // Sentinels covering both ends of the edge.
            insert_interval(&mut intervals, -1, 0, PolyRef::NULL);
            insert_interval(&mut intervals, 255, 256, PolyRef::NULL);

            for k in 1..intervals.len() {
                let cur = intervals[k];
                if store_portals && cur.poly_ref.is_valid() {
                    segments.push(WallSegment {
                        start: vlerp(&vj, &vi, cur.tmin as f32 / 255.0),
                        end: vlerp(&vj, &vi, cur.tmax as f32 / 255.0),
                        neighbour_ref: cur.poly_ref,
                    });
                }

                let imin = intervals[k - 1].tmax;
                let imax = cur.tmin;
                if imin != imax {
                    segments.push(WallSegment {
                        start: vlerp(&vj, &vi, imin as f32 / 255.0),
                        end: vlerp(&vj, &vi, imax as f32 / 255.0),
                        neighbour_ref: PolyRef::NULL,
                    });
                }
            }
        }

        Ok(segments)
    }

    /// Distance from `center` to the nearest wall within `max_radius`.
    ///
    /// The search radius shrinks each time a closer wall is found.
    pub fn find_distance_to_wall(
        &mut self,
        start_ref: PolyRef,
        center: &[f32; 3],
        max_radius: f32,
        filter: &dyn QueryFilter,
    ) -> Result<WallDistance> {
        if !self.nav_mesh.is_valid_poly_ref(start_ref)
            || !visfinite(center)
            || max_radius < 0.0
            || !max_radius.is_finite()
        {
            return Err(Error::invalid_param("invalid wall distance query"));
        }
        let nav_mesh = self.nav_mesh;
        let pool = &mut self.node_pool;
        let open = &mut self.open_list;
        pool.clear();
        open.clear();

        let start_idx = pool.get_node(start_ref, 0).ok_or(Error::OutOfNodes)?;
        {
            let node = pool.node_mut(start_idx);
            node.pos = *center;
            node.flags = NodeFlags::OPEN;
        }
        open.push(pool, start_idx);

        let mut radius_sqr = max_radius * max_radius;
        let mut hit_pos = [0.0; 3];
        let mut best_edge: Option<([f32; 3], [f32; 3])> = None;

        while let Some(best_idx) = open.pop(pool) {
            let (best_ref, best_pos, best_total, best_pidx) = {
                let node = pool.node_mut(best_idx);
                node.flags.remove(NodeFlags::OPEN);
                node.flags.insert(NodeFlags::CLOSED);
                (node.id, node.pos, node.total, node.pidx)
            };
            let best = poly_context(nav_mesh, best_ref)?;
            let parent_ref = pool
                .get_node_at_idx(best_pidx)
                .map_or(PolyRef::NULL, |n| n.id);

            // Hit test walls.
            let nv = best.poly.vert_count as usize;
            for i in 0..nv {
                let j = (i + nv - 1) % nv;
                if best.poly.neighbors[j] & EXT_LINK != 0 {
                    // Tile border: solid unless the first link on the edge is passable.
                    let mut solid = true;
                    if let Some(link) = best
                        .tile
                        .links_of(best.poly)
                        .find(|l| l.edge_index as usize == j)
                    {
                        if link.reference.is_valid() {
                            if let Ok((nt, np)) = nav_mesh.get_tile_and_poly_by_ref(link.reference) {
                                if filter.pass_filter(link.reference, nt, np) {
                                    solid = false;
                                }
                            }
                        }
                    }
                    if !solid {
                        continue;
                    }
                } else if best.poly.neighbors[j] != 0 {
                    let idx = (best.poly.neighbors[j] - 1) as usize;
                    if let Some(nei_poly) = best.tile.polys.get(idx) {
                        if filter.pass_filter(best.tile.poly_ref(idx), best.tile, nei_poly) {
                            continue;
                        }
                    }
                }

                let vj = best.tile.vertex(best.poly.verts[j]);
                let vi = best.tile.vertex(best.poly.verts[i]);
                let (dist_sqr, tseg) = dist_pt_seg_sqr_2d(center, &vj, &vi);
                if dist_sqr > radius_sqr {
                    continue;
                }

                radius_sqr = dist_sqr;
                hit_pos = vlerp(&vj, &vi, tseg);
                best_edge = Some((vj, vi));
            }

            for link in best.tile.links_of(best.poly) {
                let neighbour_ref = link.reference;
                if !neighbour_ref.is_valid() || neighbour_ref == parent_ref {
                    continue;
                }
                let Ok(neighbour) = poly_context(nav_mesh, neighbour_ref) else {
                    continue;
                };
                if neighbour.poly.is_off_mesh_connection() {
                    continue;
                }

                let e = link.edge_index as usize;
                if e >= nv {
                    continue;
                }
                let va = best.tile.vertex(best.poly.verts[e]);
                let vb = best.tile.vertex(best.poly.verts[(e + 1) % nv]);
                if dist_pt_seg_sqr_2d(center, &va, &vb).0 > radius_sqr {
                    continue;
                }
                if !filter.pass_filter(neighbour_ref, neighbour.tile, neighbour.poly) {
                    continue;
                }

                let Some(neighbour_idx) = pool.get_node(neighbour_ref, 0) else {
                    continue;
                };
                let flags = pool.node(neighbour_idx).flags;
                if flags.contains(NodeFlags::CLOSED) {
                    continue;
                }
                if flags.is_empty() {
                    if let Ok(mid) = edge_mid_point(best, neighbour) {
                        pool.node_mut(neighbour_idx).pos = mid;
                    }
                }

                let total = best_total + vdist(&best_pos, &pool.node(neighbour_idx).pos);
                relax_dijkstra_node(pool, open, neighbour_idx, neighbour_ref, best_idx, total);
            }
        }

        let hit_normal = best_edge.map_or([0.0; 3], |(vj, vi)| {
            Vec3::new(vi[2] - vj[2], 0.0, -(vi[0] - vj[0]))
                .normalize_or_zero()
                .to_array()
        });

        Ok(WallDistance {
            distance: radius_sqr.sqrt(),
            hit_pos,
            hit_normal,
        })
    }

    /// Picks a random point on the mesh using a seeded generator
    pub fn find_random_point(
        &self,
        filter: &dyn QueryFilter,
        rng: &mut fastrand::Rng,
    ) -> Result<(PolyRef, [f32; 3])> {
        self.find_random_point_with(filter, || rng.f32())
    }

    /// Picks a random point on the mesh.
    ///
    /// A tile is chosen uniformly, then a ground polygon by area, then a point
    /// inside it. `rand` must return values in `[0, 1)`.
    pub fn find_random_point_with(
        &self,
        filter: &dyn QueryFilter,
        mut rand: impl FnMut() -> f32,
    ) -> Result<(PolyRef, [f32; 3])> {
        // Reservoir sample a tile.
        let mut chosen_tile: Option<&MeshTile> = None;
        let mut tile_sum = 0.0;
        for tile in self.nav_mesh.tiles() {
            let area = 1.0;
            tile_sum += area;
            if rand() * tile_sum <= area {
                chosen_tile = Some(tile);
            }
        }
        let tile = chosen_tile.ok_or_else(|| Error::failure("navigation mesh has no tiles"))?;

        // Reservoir sample a polygon by area.
        let mut chosen: Option<usize> = None;
        let mut area_sum = 0.0;
        for (i, poly) in tile.polys.iter().enumerate() {
            if poly.poly_type != PolyType::Ground
                || !filter.pass_filter(tile.poly_ref(i), tile, poly)
            {
                continue;
            }
            let verts = tile.poly_verts(poly);
            let poly_area = poly_area_2d(&verts, poly.vert_count as usize);
            area_sum += poly_area;
            if rand() * area_sum <= poly_area {
                chosen = Some(i);
            }
        }
        let poly_index = chosen.ok_or_else(|| Error::failure("no polygon passes the filter"))?;
        let poly = &tile.polys[poly_index];
        let poly_ref = tile.poly_ref(poly_index);

        let verts = tile.poly_verts(poly);
        let s = rand();
        let t = rand();
        let pt = random_point_in_convex_poly(&verts, poly.vert_count as usize, s, t);
        let (closest, _) = self.nav_mesh.closest_point_on_poly(poly_ref, &pt)?;
        Ok((poly_ref, closest))
    }

    /// Picks a random point reachable from `start_ref` within a circle, using
    /// a seeded generator
    pub fn find_random_point_around_circle(
        &mut self,
        start_ref: PolyRef,
        center: &[f32; 3],
        max_radius: f32,
        filter: &dyn QueryFilter,
        constraint: &dyn PolygonConstraint,
        rng: &mut fastrand::Rng,
    ) -> Result<(PolyRef, [f32; 3])> {
        self.find_random_point_around_circle_with(
            start_ref,
            center,
            max_radius,
            filter,
            constraint,
            || rng.f32(),
        )
    }

    /// Picks a random point reachable from `start_ref` within a circle.
    ///
    /// Polygons are weighted by the area `constraint` leaves of them. The
    /// circle always bounds which polygons are visited.
    pub fn find_random_point_around_circle_with(
        &mut self,
        start_ref: PolyRef,
        center: &[f32; 3],
        max_radius: f32,
        filter: &dyn QueryFilter,
        constraint: &dyn PolygonConstraint,
        mut rand: impl FnMut() -> f32,
    ) -> Result<(PolyRef, [f32; 3])> {
        if !visfinite(center) || max_radius < 0.0 || !max_radius.is_finite() {
            return Err(Error::invalid_param("invalid random circle query"));
        }
        let nav_mesh = self.nav_mesh;
        let start = poly_context(nav_mesh, start_ref)?;
        if !filter.pass_filter(start_ref, start.tile, start.poly) {
            return Err(Error::invalid_param("start polygon does not pass the filter"));
        }

        let pool = &mut self.node_pool;
        let open = &mut self.open_list;
        pool.clear();
        open.clear();

        let start_idx = pool.get_node(start_ref, 0).ok_or(Error::OutOfNodes)?;
        {
            let node = pool.node_mut(start_idx);
            node.pos = *center;
            node.flags = NodeFlags::OPEN;
        }
        open.push(pool, start_idx);

        let radius_sqr = max_radius * max_radius;
        let mut area_sum = 0.0;
        let mut chosen: Option<(PolyRef, Vec<f32>)> = None;

        while let Some(best_idx) = open.pop(pool) {
            let (best_ref, best_pos, best_total, best_pidx) = {
                let node = pool.node_mut(best_idx);
                node.flags.remove(NodeFlags::OPEN);
                node.flags.insert(NodeFlags::CLOSED);
                (node.id, node.pos, node.total, node.pidx)
            };
            let best = poly_context(nav_mesh, best_ref)?;

            if best.poly.poly_type == PolyType::Ground {
                let nv = best.poly.vert_count as usize;
                let verts = best.tile.poly_verts(best.poly);
                if let Some(constrained) = constraint.apply(&verts[..nv * 3], center, max_radius) {
                    let poly_area = poly_area_2d(&constrained, constrained.len() / 3);
                    area_sum += poly_area;
                    if rand() * area_sum <= poly_area {
                        chosen = Some((best_ref, constrained));
                    }
                }
            }

            let parent_ref = pool
                .get_node_at_idx(best_pidx)
                .map_or(PolyRef::NULL, |n| n.id);

            for link in best.tile.links_of(best.poly) {
                let neighbour_ref = link.reference;
                if !neighbour_ref.is_valid() || neighbour_ref == parent_ref {
                    continue;
                }
                let Ok(neighbour) = poly_context(nav_mesh, neighbour_ref) else {
                    continue;
                };
                if !filter.pass_filter(neighbour_ref, neighbour.tile, neighbour.poly) {
                    continue;
                }
                let Ok((va, vb)) = portal_points(best, neighbour) else {
                    continue;
                };
                if dist_pt_seg_sqr_2d(center, &va, &vb).0 > radius_sqr {
                    continue;
                }

                let Some(neighbour_idx) = pool.get_node(neighbour_ref, 0) else {
                    continue;
                };
                let flags = pool.node(neighbour_idx).flags;
                if flags.contains(NodeFlags::CLOSED) {
                    continue;
                }
                if flags.is_empty() {
                    pool.node_mut(neighbour_idx).pos = vlerp(&va, &vb, 0.5);
                }

                let total = best_total + vdist(&best_pos, &pool.node(neighbour_idx).pos);
                relax_dijkstra_node(pool, open, neighbour_idx, neighbour_ref, best_idx, total);
            }
        }

        let (poly_ref, verts) =
            chosen.ok_or_else(|| Error::failure("no polygon found within the circle"))?;
        let s = rand();
        let t = rand();
        let pt = random_point_in_convex_poly(&verts, verts.len() / 3, s, t);
        let (closest, _) = nav_mesh.closest_point_on_poly(poly_ref, &pt)?;
        Ok((poly_ref, closest))
    }

    /// Closest point on the polygon to `pos` and whether `pos` is over it
    pub fn closest_point_on_poly(
        &self,
        poly_ref: PolyRef,
        pos: &[f32; 3],
    ) -> Result<([f32; 3], bool)> {
        if !visfinite(pos) {
            return Err(Error::invalid_param("non-finite position"));
        }
        self.nav_mesh.closest_point_on_poly(poly_ref, pos)
    }

    /// `pos` if it lies inside the polygon in 2D, otherwise the closest point
    /// on its boundary
    pub fn closest_point_on_poly_boundary(
        &self,
        poly_ref: PolyRef,
        pos: &[f32; 3],
    ) -> Result<[f32; 3]> {
        let (tile, poly) = self.nav_mesh.get_tile_and_poly_by_ref(poly_ref)?;
        if !visfinite(pos) {
            return Err(Error::invalid_param("non-finite position"));
        }

        let nv = poly.vert_count as usize;
        let verts = tile.poly_verts(poly);
        let (inside, _, _) = distance_pt_poly_edges_sqr(pos, &verts, nv);
        if inside {
            return Ok(*pos);
        }
        Ok(closest_point_on_edges(&verts, nv, pos))
    }

    /// Height of the polygon at `pos`; only the x and z of `pos` are used.
    ///
    /// Off-mesh connections interpolate the height along their segment.
    pub fn get_poly_height(&self, poly_ref: PolyRef, pos: &[f32; 3]) -> Result<f32> {
        let (tile, poly) = self.nav_mesh.get_tile_and_poly_by_ref(poly_ref)?;
        if !pos[0].is_finite() || !pos[2].is_finite() {
            return Err(Error::invalid_param("non-finite position"));
        }

        if poly.is_off_mesh_connection() {
            let v0 = tile.vertex(poly.verts[0]);
            let v1 = tile.vertex(poly.verts[1]);
            let (_, t) = dist_pt_seg_sqr_2d(pos, &v0, &v1);
            return Ok(v0[1] + (v1[1] - v0[1]) * t);
        }

        let (_, _, poly_index) = decode_poly_ref(poly_ref);
        self.nav_mesh
            .get_poly_height(tile, poly_index as usize, pos)
            .ok_or_else(|| Error::invalid_param("position is outside the polygon"))
    }

    /// Finds the polygon nearest to `center` within the search box.
    ///
    /// Succeeds with a NULL reference when no polygon overlaps the box.
    pub fn find_nearest_poly(
        &self,
        center: &[f32; 3],
        half_extents: &[f32; 3],
        filter: &dyn QueryFilter,
    ) -> Result<NearestPolyResult> {
        let mut query = FindNearestPolyQuery::new(self.nav_mesh, center);
        self.query_polygons(center, half_extents, filter, &mut query)?;
        Ok(NearestPolyResult {
            poly_ref: query.nearest_ref(),
            point: *query.nearest_point(),
            over_poly: query.is_over_poly(),
        })
    }

    /// Streams the polygons overlapping the box that pass the filter to `query`
    pub fn query_polygons(
        &self,
        center: &[f32; 3],
        half_extents: &[f32; 3],
        filter: &dyn QueryFilter,
        query: &mut dyn PolyQuery,
    ) -> Result<()> {
        if !visfinite(center) || !visfinite(half_extents) {
            return Err(Error::invalid_param("invalid query box"));
        }
        let (bmin, bmax) = query_box(center, half_extents);

        for tile in self.query_tiles(center, half_extents) {
            let mut refs = Vec::with_capacity(QUERY_BATCH_SIZE);
            let mut polys = Vec::with_capacity(QUERY_BATCH_SIZE);
            for poly_ref in self.nav_mesh.query_polygons_in_tile(tile, &bmin, &bmax) {
                let (_, _, poly_index) = decode_poly_ref(poly_ref);
                let Some(poly) = tile.polys.get(poly_index as usize) else {
                    continue;
                };
                if !filter.pass_filter(poly_ref, tile, poly) {
                    continue;
                }
                refs.push(poly_ref);
                polys.push(poly);
                if refs.len() == QUERY_BATCH_SIZE {
                    query.process(tile, &polys, &refs);
                    refs.clear();
                    polys.clear();
                }
            }
            if !refs.is_empty() {
                query.process(tile, &polys, &refs);
            }
        }
        Ok(())
    }

    /// Tiles whose grid cells overlap the box
    pub fn query_tiles(&self, center: &[f32; 3], half_extents: &[f32; 3]) -> Vec<&'a MeshTile> {
        if !visfinite(center) || !visfinite(half_extents) {
            return Vec::new();
        }
        let nav_mesh = self.nav_mesh;
        let (bmin, bmax) = query_box(center, half_extents);
        let (minx, miny) = nav_mesh.calc_tile_loc(&bmin);
        let (maxx, maxy) = nav_mesh.calc_tile_loc(&bmax);

        let mut tiles = Vec::new();
        for y in miny..=maxy {
            for x in minx..=maxx {
                tiles.extend(nav_mesh.get_tiles_at(x, y));
            }
        }
        tiles
    }

    /// Moves from `start_pos` towards `end_pos` while staying on the mesh.
    ///
    /// The search is limited to polygons near the segment, so it suits small
    /// per-frame movements. Heights are not adjusted.
    pub fn move_along_surface(
        &mut self,
        start_ref: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &dyn QueryFilter,
    ) -> Result<MoveAlongSurfaceResult> {
        if !self.nav_mesh.is_valid_poly_ref(start_ref) || !visfinite(start_pos) || !visfinite(end_pos)
        {
            return Err(Error::invalid_param("invalid move request"));
        }
        let nav_mesh = self.nav_mesh;
        let pool = &mut self.tiny_node_pool;
        pool.clear();

        let start_idx = pool.get_node(start_ref, 0).ok_or(Error::OutOfNodes)?;
        pool.node_mut(start_idx).flags = NodeFlags::CLOSED;
        let mut queue = VecDeque::from([start_idx]);

        let mut best_pos = *start_pos;
        let mut best_dist = f32::MAX;
        let mut best_node = NULL_NODE;

        let search_pos = vlerp(start_pos, end_pos, 0.5);
        let search_rad = vdist(start_pos, end_pos) / 2.0 + 0.001;
        let search_rad_sqr = search_rad * search_rad;

        while let Some(cur_idx) = queue.pop_front() {
            let cur = poly_context(nav_mesh, pool.node(cur_idx).id)?;
            let nv = cur.poly.vert_count as usize;
            let verts = cur.tile.poly_verts(cur.poly);

            if point_in_polygon(end_pos, &verts, nv) {
                best_node = cur_idx;
                best_pos = *end_pos;
                break;
            }

            for i in 0..nv {
                let j = (i + nv - 1) % nv;
                let mut neis = [PolyRef::NULL; MAX_EDGE_NEIGHBOURS];
                let mut nneis = 0;

                if cur.poly.neighbors[j] & EXT_LINK != 0 {
                    for link in cur.tile.links_of(cur.poly) {
                        if link.edge_index as usize != j || !link.reference.is_valid() {
                            continue;
                        }
                        let Ok((nt, np)) = nav_mesh.get_tile_and_poly_by_ref(link.reference) else {
                            continue;
                        };
                        if filter.pass_filter(link.reference, nt, np) && nneis < MAX_EDGE_NEIGHBOURS
                        {
                            neis[nneis] = link.reference;
                            nneis += 1;
                        }
                    }
                } else if cur.poly.neighbors[j] != 0 {
                    let idx = (cur.poly.neighbors[j] - 1) as usize;
                    if let Some(nei_poly) = cur.tile.polys.get(idx) {
                        let nei_ref = cur.tile.poly_ref(idx);
                        if filter.pass_filter(nei_ref, cur.tile, nei_poly) {
                            neis[nneis] = nei_ref;
                            nneis += 1;
                        }
                    }
                }

                let vj = vert_at(&verts, j);
                let vi = vert_at(&verts, i);
                if nneis == 0 {
                    // Wall edge, track the closest point to the target.
                    let (dist_sqr, tseg) = dist_pt_seg_sqr_2d(end_pos, &vj, &vi);
                    if dist_sqr < best_dist {
                        best_pos = vlerp(&vj, &vi, tseg);
                        best_dist = dist_sqr;
                        best_node = cur_idx;
                    }
                    continue;
                }

                for &nei_ref in &neis[..nneis] {
                    let Some(neighbour_idx) = pool.get_node(nei_ref, 0) else {
                        continue;
                    };
                    if pool.node(neighbour_idx).flags.contains(NodeFlags::CLOSED) {
                        continue;
                    }
                    // Skip edges too far from the search segment.
                    if dist_pt_seg_sqr_2d(&search_pos, &vj, &vi).0 > search_rad_sqr {
                        continue;
                    }
                    let node = pool.node_mut(neighbour_idx);
                    node.pidx = cur_idx;
                    node.flags |= NodeFlags::CLOSED;
                    queue.push_back(neighbour_idx);
                }
            }
        }

        let mut visited = Vec::new();
        let mut idx = best_node;
        while let Some(node) = pool.get_node_at_idx(idx) {
            visited.push(node.id);
            idx = node.pidx;
        }
        visited.reverse();

        Ok(MoveAlongSurfaceResult {
            result_pos: best_pos,
            visited,
        })
    }

    /// True if the reference resolves and the polygon passes the filter
    pub fn is_valid_poly_ref(&self, poly_ref: PolyRef, filter: &dyn QueryFilter) -> bool {
        match self.nav_mesh.get_tile_and_poly_by_ref(poly_ref) {
            Ok((tile, poly)) => filter.pass_filter(poly_ref, tile, poly),
            Err(_) => false,
        }
    }

    /// True if the polygon was settled by the most recent search
    pub fn is_in_closed_list(&self, poly_ref: PolyRef) -> bool {
        self.node_pool
            .find_nodes(poly_ref)
            .into_iter()
            .any(|idx| self.node_pool.node(idx).flags.contains(NodeFlags::CLOSED))
    }

    /// Path from the start of the most recent Dijkstra-style search
    /// ([`find_polys_around_circle`](Self::find_polys_around_circle) and
    /// friends) to `end_ref`
    pub fn get_path_from_dijkstra_search(&self, end_ref: PolyRef) -> Result<Vec<PolyRef>> {
        if !self.nav_mesh.is_valid_poly_ref(end_ref) {
            return Err(Error::invalid_param("invalid end reference"));
        }
        let nodes = self.node_pool.find_nodes(end_ref);
        let &[end_idx] = nodes.as_slice() else {
            return Err(Error::invalid_param("end reference was not visited once"));
        };
        if !self.node_pool.node(end_idx).flags.contains(NodeFlags::CLOSED) {
            return Err(Error::invalid_param("end reference was not settled"));
        }
        Ok(get_path_to_node(&self.node_pool, end_idx))
    }

    /// Dijkstra expansion shared by the circle and shape queries. `touches`
    /// decides whether a portal lies inside the search area.
    fn polys_around(
        &mut self,
        start_ref: PolyRef,
        start_pos: &[f32; 3],
        filter: &dyn QueryFilter,
        touches: impl Fn(&[f32; 3], &[f32; 3]) -> bool,
    ) -> Result<PolysAroundResult> {
        let nav_mesh = self.nav_mesh;
        let pool = &mut self.node_pool;
        let open = &mut self.open_list;
        pool.clear();
        open.clear();

        let start_idx = pool.get_node(start_ref, 0).ok_or(Error::OutOfNodes)?;
        {
            let node = pool.node_mut(start_idx);
            node.pos = *start_pos;
            node.flags = NodeFlags::OPEN;
        }
        open.push(pool, start_idx);

        let mut result = PolysAroundResult {
            status: Status::success(),
            ..PolysAroundResult::default()
        };

        while let Some(best_idx) = open.pop(pool) {
            let (best_ref, best_pos, best_total, best_pidx) = {
                let node = pool.node_mut(best_idx);
                node.flags.remove(NodeFlags::OPEN);
                node.flags.insert(NodeFlags::CLOSED);
                (node.id, node.pos, node.total, node.pidx)
            };
            let best = poly_context(nav_mesh, best_ref)?;

            let parent = match pool.get_node_at_idx(best_pidx) {
                Some(node) => Some(poly_context(nav_mesh, node.id)?),
                None => None,
            };
            let parent_ref = parent.map_or(PolyRef::NULL, |p| p.poly_ref);

            result.refs.push(best_ref);
            result.parents.push(parent_ref);
            result.costs.push(best_total);

            for link in best.tile.links_of(best.poly) {
                let neighbour_ref = link.reference;
                if !neighbour_ref.is_valid() || neighbour_ref == parent_ref {
                    continue;
                }
                let Ok(neighbour) = poly_context(nav_mesh, neighbour_ref) else {
                    continue;
                };
                if !filter.pass_filter(neighbour_ref, neighbour.tile, neighbour.poly) {
                    continue;
                }
                let Ok((va, vb)) = portal_points(best, neighbour) else {
                    continue;
                };
                if !touches(&va, &vb) {
                    continue;
                }

                let Some(neighbour_idx) = pool.get_node(neighbour_ref, 0) else {
                    result.status = result.status.with_detail(Status::OUT_OF_NODES);
                    continue;
                };
                let flags = pool.node(neighbour_idx).flags;
                if flags.contains(NodeFlags::CLOSED) {
                    continue;
                }
                if flags.is_empty() {
                    pool.node_mut(neighbour_idx).pos = vlerp(&va, &vb, 0.5);
                }

                let neighbour_pos = pool.node(neighbour_idx).pos;
                let cost = filter.get_cost(&best_pos, &neighbour_pos, parent, best, Some(neighbour));
                let total = best_total + cost;
                relax_dijkstra_node(pool, open, neighbour_idx, neighbour_ref, best_idx, total);
            }
        }

        if result.status.has_detail(Status::OUT_OF_NODES) {
            log::debug!("polygon expansion from {start_ref} ran out of nodes");
        }
        Ok(result)
    }
}

/// Outcome of one open list pop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SearchStep {
    Continue,
    ReachedGoal,
    Exhausted,
}

/// Best-so-far bookkeeping of an A* search
#[derive(Debug, Clone, Copy)]
pub(crate) struct SearchProgress {
    pub(crate) last_best_node: NodeIndex,
    pub(crate) last_best_node_cost: f32,
    pub(crate) out_of_nodes: bool,
}

impl SearchProgress {
    /// Final status for a search whose best node is `last_best_node`
    pub(crate) fn status(&self, pool: &NodePool, end_ref: PolyRef) -> Status {
        let mut status = Status::success();
        if pool
            .get_node_at_idx(self.last_best_node)
            .map_or(true, |n| n.id != end_ref)
        {
            status = status.with_detail(Status::PARTIAL_RESULT);
        }
        if self.out_of_nodes {
            status = status.with_detail(Status::OUT_OF_NODES);
        }
        status
    }
}

/// A* search towards one goal, shared by [`NavMeshQuery::find_path`] and
/// sliced sessions. The node pool and open list are owned by the caller.
pub(crate) struct PathSearch<'s> {
    pub(crate) nav_mesh: &'s NavMesh,
    pub(crate) end_ref: PolyRef,
    pub(crate) end_pos: [f32; 3],
    pub(crate) filter: &'s dyn QueryFilter,
    pub(crate) heuristic: &'s dyn QueryHeuristic,
    pub(crate) options: FindPathOptions,
    pub(crate) raycast_limit_sqr: f32,
}

impl PathSearch<'_> {
    /// Clears the pools and queues the start node
    pub(crate) fn seed(
        &self,
        pool: &mut NodePool,
        open: &mut NodeQueue,
        start_ref: PolyRef,
        start_pos: &[f32; 3],
    ) -> Result<SearchProgress> {
        pool.clear();
        open.clear();

        let start_idx = pool.get_node(start_ref, 0).ok_or(Error::OutOfNodes)?;
        let total = self.heuristic.get_cost(start_pos, &self.end_pos);
        {
            let node = pool.node_mut(start_idx);
            node.pos = *start_pos;
            node.pidx = NULL_NODE;
            node.cost = 0.0;
            node.total = total;
            node.flags = NodeFlags::OPEN;
        }
        open.push(pool, start_idx);

        Ok(SearchProgress {
            last_best_node: start_idx,
            last_best_node_cost: total,
            out_of_nodes: false,
        })
    }

    /// Pops the cheapest open node and expands it.
    ///
    /// Fails when a polygon the expansion depends on no longer resolves.
    pub(crate) fn step(
        &self,
        pool: &mut NodePool,
        open: &mut NodeQueue,
        progress: &mut SearchProgress,
    ) -> Result<SearchStep> {
        let Some(best_idx) = open.pop(pool) else {
            return Ok(SearchStep::Exhausted);
        };
        let best_ref = {
            let node = pool.node_mut(best_idx);
            node.flags.remove(NodeFlags::OPEN);
            node.flags.insert(NodeFlags::CLOSED);
            node.id
        };

        if best_ref == self.end_ref {
            progress.last_best_node = best_idx;
            return Ok(SearchStep::ReachedGoal);
        }

        self.expand(pool, open, best_idx, progress)?;
        Ok(SearchStep::Continue)
    }

    fn expand(
        &self,
        pool: &mut NodePool,
        open: &mut NodeQueue,
        best_idx: NodeIndex,
        progress: &mut SearchProgress,
    ) -> Result<()> {
        let (best_ref, best_pos, best_cost, best_pidx) = {
            let node = pool.node(best_idx);
            (node.id, node.pos, node.cost, node.pidx)
        };
        let best = poly_context(self.nav_mesh, best_ref)?;

        let (parent, parent_pos, parent_cost, grandpa_ref) = match pool.get_node_at_idx(best_pidx)
        {
            Some(node) => {
                let grandpa_ref = pool
                    .get_node_at_idx(node.pidx)
                    .map_or(PolyRef::NULL, |g| g.id);
                (
                    Some(poly_context(self.nav_mesh, node.id)?),
                    node.pos,
                    node.cost,
                    grandpa_ref,
                )
            }
            None => (None, [0.0; 3], 0.0, PolyRef::NULL),
        };
        if grandpa_ref.is_valid() && !self.nav_mesh.is_valid_poly_ref(grandpa_ref) {
            return Err(Error::invalid_param(format!(
                "polygon {grandpa_ref} vanished during the search"
            )));
        }
        let parent_ref = parent.map_or(PolyRef::NULL, |p| p.poly_ref);

        let try_los = self.options.contains(FindPathOptions::ANY_ANGLE)
            && parent.is_some()
            && (self.raycast_limit_sqr >= f32::MAX
                || vdist_sqr(&parent_pos, &best_pos) < self.raycast_limit_sqr);

        for link in best.tile.links_of(best.poly) {
            let neighbour_ref = link.reference;
            if !neighbour_ref.is_valid() || neighbour_ref == parent_ref {
                continue;
            }
            let Ok(neighbour) = poly_context(self.nav_mesh, neighbour_ref) else {
                continue;
            };
            if !self
                .filter
                .pass_filter(neighbour_ref, neighbour.tile, neighbour.poly)
            {
                continue;
            }

            let Some(neighbour_idx) = pool.get_node(neighbour_ref, 0) else {
                progress.out_of_nodes = true;
                continue;
            };

            // Already reached from the same parent.
            let (existing_pidx, existing_flags, existing_total, mut neighbour_pos) = {
                let node = pool.node(neighbour_idx);
                (node.pidx, node.flags, node.total, node.pos)
            };
            if existing_pidx != NULL_NODE && existing_pidx == best_pidx {
                continue;
            }

            let portal_pos = if neighbour_ref == self.end_ref {
                edge_intersection_point(&best_pos, best, neighbour, &self.end_pos)
            } else {
                edge_mid_point(best, neighbour)
            };
            if let Ok(pos) = portal_pos {
                neighbour_pos = pos;
            }

            let mut shortcut = None;
            let mut cost = 0.0;
            if try_los {
                if let Ok(hit) = raycast(
                    self.nav_mesh,
                    parent_ref,
                    &parent_pos,
                    &neighbour_pos,
                    self.filter,
                    RaycastOptions::USE_COSTS,
                    grandpa_ref,
                ) {
                    if hit.t >= 1.0 {
                        cost = parent_cost + hit.path_cost;
                        shortcut = Some(hit.path);
                    }
                }
            }
            if shortcut.is_none() {
                cost = best_cost
                    + self
                        .filter
                        .get_cost(&best_pos, &neighbour_pos, parent, best, Some(neighbour));
            }

            let heuristic = if neighbour_ref == self.end_ref {
                cost += self
                    .filter
                    .get_cost(&neighbour_pos, &self.end_pos, Some(best), neighbour, None);
                0.0
            } else {
                self.heuristic.get_cost(&neighbour_pos, &self.end_pos)
            };
            let total = cost + heuristic;

            if existing_flags.intersects(NodeFlags::OPEN | NodeFlags::CLOSED)
                && total >= existing_total
            {
                continue;
            }

            let detached = shortcut.is_some();
            let node = pool.node_mut(neighbour_idx);
            node.pidx = if detached { best_pidx } else { best_idx };
            node.id = neighbour_ref;
            node.flags.remove(NodeFlags::CLOSED);
            node.flags.set(NodeFlags::PARENT_DETACHED, detached);
            node.cost = cost;
            node.total = total;
            node.pos = neighbour_pos;
            node.shortcut = shortcut;

            if existing_flags.contains(NodeFlags::OPEN) {
                open.modify(pool, neighbour_idx);
            } else {
                pool.node_mut(neighbour_idx).flags.insert(NodeFlags::OPEN);
                open.push(pool, neighbour_idx);
            }

            if heuristic < progress.last_best_node_cost {
                progress.last_best_node_cost = heuristic;
                progress.last_best_node = neighbour_idx;
            }
        }

        Ok(())
    }
}

/// Checks the inputs shared by full and sliced path searches
pub(crate) fn validate_path_request(
    nav_mesh: &NavMesh,
    start_ref: PolyRef,
    end_ref: PolyRef,
    start_pos: &[f32; 3],
    end_pos: &[f32; 3],
) -> Result<()> {
    if !nav_mesh.is_valid_poly_ref(start_ref) || !nav_mesh.is_valid_poly_ref(end_ref) {
        return Err(Error::invalid_param("invalid start or end polygon"));
    }
    if !visfinite(start_pos) || !visfinite(end_pos) {
        return Err(Error::invalid_param("non-finite start or end position"));
    }
    Ok(())
}

/// Squared any-angle raycast limit; negative limits derive it from the start
/// tile's agent radius
pub(crate) fn raycast_limit_sqr(
    nav_mesh: &NavMesh,
    start_ref: PolyRef,
    options: FindPathOptions,
    raycast_limit: f32,
) -> Result<f32> {
    if options.contains(FindPathOptions::ANY_ANGLE) && raycast_limit < 0.0 {
        let (tile, _) = nav_mesh.get_tile_and_poly_by_ref(start_ref)?;
        let agent_radius = tile.header.as_ref().map_or(0.0, |h| h.walkable_radius);
        let limit = agent_radius * RAY_CAST_LIMIT_PROPORTIONS;
        return Ok(limit * limit);
    }
    Ok(raycast_limit * raycast_limit)
}

/// Walks parent links back from `end_idx`, splicing in the polygons skipped
/// by any-angle shortcuts.
pub(crate) fn get_path_to_node(pool: &NodePool, end_idx: NodeIndex) -> Vec<PolyRef> {
    let mut reversed = Vec::new();
    let mut cur = pool.get_node_at_idx(end_idx);
    while let Some(node) = cur {
        reversed.push(node.id);
        let next = pool.get_node_at_idx(node.pidx);
        if let Some(shortcut) = &node.shortcut {
            let next_id = next.map_or(PolyRef::NULL, |n| n.id);
            for &id in shortcut.iter().rev() {
                if id != node.id && id != next_id {
                    reversed.push(id);
                }
            }
        }
        cur = next;
    }
    reversed.reverse();
    reversed
}

/// Resolves a reference into the context handed to filters
pub(crate) fn poly_context(nav_mesh: &NavMesh, poly_ref: PolyRef) -> Result<PolyContext<'_>> {
    let (tile, poly) = nav_mesh.get_tile_and_poly_by_ref(poly_ref)?;
    Ok(PolyContext::new(poly_ref, tile, poly))
}

/// Left and right end of the portal from `from` to `to`.
///
/// Off-mesh connections yield a degenerate portal at the connection endpoint.
pub(crate) fn portal_points(
    from: PolyContext<'_>,
    to: PolyContext<'_>,
) -> Result<([f32; 3], [f32; 3])> {
    let no_link = || {
        Error::NoLinkFound(format!(
            "{} is not linked to {}",
            from.poly_ref, to.poly_ref
        ))
    };
    let link = from
        .tile
        .links_of(from.poly)
        .find(|l| l.reference == to.poly_ref)
        .ok_or_else(no_link)?;

    if from.poly.is_off_mesh_connection() {
        let v = vertex_of(from.tile, from.poly, link.edge_index as usize)?;
        return Ok((v, v));
    }

    if to.poly.is_off_mesh_connection() {
        let back = to
            .tile
            .links_of(to.poly)
            .find(|l| l.reference == from.poly_ref)
            .ok_or_else(no_link)?;
        let v = vertex_of(to.tile, to.poly, back.edge_index as usize)?;
        return Ok((v, v));
    }

    let nv = from.poly.vert_count as usize;
    let e = link.edge_index as usize;
    let v0 = vertex_of(from.tile, from.poly, e)?;
    let v1 = vertex_of(from.tile, from.poly, (e + 1) % nv.max(1))?;

    if link.is_partial() {
        const S: f32 = 1.0 / 255.0;
        return Ok((
            vlerp(&v0, &v1, link.bmin as f32 * S),
            vlerp(&v0, &v1, link.bmax as f32 * S),
        ));
    }
    Ok((v0, v1))
}

/// Midpoint of the portal between two polygons
pub(crate) fn edge_mid_point(from: PolyContext<'_>, to: PolyContext<'_>) -> Result<[f32; 3]> {
    let (left, right) = portal_points(from, to)?;
    Ok(vlerp(&left, &right, 0.5))
}

/// Where the segment `from_pos..to_pos` crosses the portal, kept away from
/// the portal ends
pub(crate) fn edge_intersection_point(
    from_pos: &[f32; 3],
    from: PolyContext<'_>,
    to: PolyContext<'_>,
    to_pos: &[f32; 3],
) -> Result<[f32; 3]> {
    let (left, right) = portal_points(from, to)?;
    let t = intersect_seg_seg_2d(from_pos, to_pos, &left, &right)
        .map_or(0.5, |(_, t)| t.clamp(0.1, 0.9));
    Ok(vlerp(&left, &right, t))
}

/// Walkability raycast over the mesh surface.
///
/// Follows the edge the segment leaves each polygon through until the
/// segment ends inside a polygon (`t == f32::MAX`) or exits through a wall.
pub(crate) fn raycast(
    nav_mesh: &NavMesh,
    start_ref: PolyRef,
    start_pos: &[f32; 3],
    end_pos: &[f32; 3],
    filter: &dyn QueryFilter,
    options: RaycastOptions,
    prev_ref: PolyRef,
) -> Result<RaycastHit> {
    if !visfinite(start_pos) || !visfinite(end_pos) {
        return Err(Error::invalid_param("non-finite ray"));
    }
    if prev_ref.is_valid() && !nav_mesh.is_valid_poly_ref(prev_ref) {
        return Err(Error::invalid_param("invalid previous polygon"));
    }
    let mut cur = poly_context(nav_mesh, start_ref)?;
    let mut prev = if prev_ref.is_valid() {
        Some(poly_context(nav_mesh, prev_ref)?)
    } else {
        None
    };

    let use_costs = options.contains(RaycastOptions::USE_COSTS);
    let dir = [
        end_pos[0] - start_pos[0],
        end_pos[1] - start_pos[1],
        end_pos[2] - start_pos[2],
    ];
    let mut cur_pos = *start_pos;
    let mut hit = RaycastHit::default();

    loop {
        let nv = cur.poly.vert_count as usize;
        let verts = cur.tile.poly_verts(cur.poly);

        let Some(ix) = intersect_segment_poly_2d(start_pos, end_pos, &verts, nv) else {
            // Could not hit the polygon, keep the old t and report a hit.
            return Ok(hit);
        };

        hit.hit_edge_index = ix.seg_max;
        if ix.tmax > hit.t {
            hit.t = ix.tmax;
        }
        hit.path.push(cur.poly_ref);

        // Ray end is completely inside the polygon.
        if ix.seg_max == -1 {
            hit.t = f32::MAX;
            if use_costs {
                hit.path_cost += filter.get_cost(&cur_pos, end_pos, prev, cur, Some(cur));
            }
            return Ok(hit);
        }
        let seg_max = ix.seg_max as usize;

        let mut next: Option<PolyContext<'_>> = None;
        for link in cur.tile.links_of(cur.poly) {
            if link.edge_index as usize != seg_max {
                continue;
            }
            let Ok(candidate) = poly_context(nav_mesh, link.reference) else {
                continue;
            };
            if candidate.poly.is_off_mesh_connection()
                || !filter.pass_filter(link.reference, candidate.tile, candidate.poly)
            {
                continue;
            }

            if !link.is_partial() {
                next = Some(candidate);
                break;
            }

            // Partial tile border link: check the crossing lies inside its span.
            let v0 = vert_at(&verts, seg_max);
            let v1 = vert_at(&verts, (seg_max + 1) % nv);
            let axis = match link.side {
                0 | 4 => 2,
                2 | 6 => 0,
                _ => continue,
            };
            const S: f32 = 1.0 / 255.0;
            let mut lmin = v0[axis] + (v1[axis] - v0[axis]) * (link.bmin as f32 * S);
            let mut lmax = v0[axis] + (v1[axis] - v0[axis]) * (link.bmax as f32 * S);
            if lmin > lmax {
                std::mem::swap(&mut lmin, &mut lmax);
            }
            let c = start_pos[axis] + (end_pos[axis] - start_pos[axis]) * ix.tmax;
            if c >= lmin && c <= lmax {
                next = Some(candidate);
                break;
            }
        }

        if use_costs {
            // The 2D crossing loses height; take it from the exited edge.
            let last_pos = cur_pos;
            cur_pos = [
                start_pos[0] + dir[0] * hit.t,
                start_pos[1] + dir[1] * hit.t,
                start_pos[2] + dir[2] * hit.t,
            ];
            let e1 = vert_at(&verts, seg_max);
            let e2 = vert_at(&verts, (seg_max + 1) % nv);
            let e_dir = [e2[0] - e1[0], e2[1] - e1[1], e2[2] - e1[2]];
            let diff = [cur_pos[0] - e1[0], cur_pos[2] - e1[2]];
            let s = if e_dir[0] * e_dir[0] > e_dir[2] * e_dir[2] {
                diff[0] / e_dir[0]
            } else {
                diff[1] / e_dir[2]
            };
            cur_pos[1] = e1[1] + e_dir[1] * s;

            hit.path_cost += filter.get_cost(&last_pos, &cur_pos, prev, cur, next);
        }

        let Some(next) = next else {
            // No neighbour, the ray hit a wall.
            let va = vert_at(&verts, seg_max);
            let vb = vert_at(&verts, (seg_max + 1) % nv);
            hit.hit_normal = Vec3::new(vb[2] - va[2], 0.0, -(vb[0] - va[0]))
                .normalize_or_zero()
                .to_array();
            return Ok(hit);
        };

        prev = Some(cur);
        cur = next;
    }
}

/// Portal span of a tile border link, in link units
#[derive(Debug, Clone, Copy)]
struct SegInterval {
    poly_ref: PolyRef,
    tmin: i32,
    tmax: i32,
}

/// Inserts an interval keeping the list sorted by position
fn insert_interval(intervals: &mut Vec<SegInterval>, tmin: i32, tmax: i32, poly_ref: PolyRef) {
    let idx = intervals
        .iter()
        .position(|i| tmax <= i.tmin)
        .unwrap_or(intervals.len());
    intervals.insert(
        idx,
        SegInterval {
            poly_ref,
            tmin,
            tmax,
        },
    );
}

/// Updates a node reached by a Dijkstra expansion unless an open entry is
/// already at least as cheap
fn relax_dijkstra_node(
    pool: &mut NodePool,
    open: &mut NodeQueue,
    idx: NodeIndex,
    poly_ref: PolyRef,
    parent_idx: NodeIndex,
    total: f32,
) {
    let node = pool.node_mut(idx);
    if node.flags.contains(NodeFlags::OPEN) && total >= node.total {
        return;
    }

    node.id = poly_ref;
    node.flags.remove(NodeFlags::CLOSED);
    node.pidx = parent_idx;
    node.total = total;

    if node.flags.contains(NodeFlags::OPEN) {
        open.modify(pool, idx);
    } else {
        node.flags = NodeFlags::OPEN;
        open.push(pool, idx);
    }
}

/// Straight path under construction
struct StraightPathBuilder {
    points: Vec<StraightPathPoint>,
    max_points: usize,
    truncated: bool,
    partial: bool,
}

impl StraightPathBuilder {
    fn new(max_points: usize) -> Self {
        Self {
            points: Vec::with_capacity(max_points.min(256)),
            max_points,
            truncated: false,
            partial: false,
        }
    }

    /// Appends a vertex, or updates the last one if it is at the same spot.
    ///
    /// Returns false once the end was appended or the path is full.
    fn append_vertex(&mut self, pos: [f32; 3], flags: StraightPathFlags, poly_ref: PolyRef) -> bool {
        if let Some(last) = self.points.last_mut() {
            if vequal(&last.pos, &pos) {
                last.flags = flags;
                last.poly_ref = poly_ref;
                return true;
            }
        }

        if self.points.len() < self.max_points {
            self.points.push(StraightPathPoint {
                pos,
                flags,
                poly_ref,
            });
        }

        if flags == StraightPathFlags::END {
            return false;
        }
        if self.points.len() >= self.max_points {
            self.truncated = true;
            return false;
        }
        true
    }

    /// Appends the crossings of the segment from the last vertex to `end_pos`
    /// with the portals of `path[start_idx..=end_idx]`.
    ///
    /// Returns false when appending must stop.
    fn append_portals(
        &mut self,
        nav_mesh: &NavMesh,
        start_idx: usize,
        end_idx: usize,
        end_pos: &[f32; 3],
        path: &[PolyRef],
        options: StraightPathOptions,
    ) -> bool {
        let Some(start_pos) = self.points.last().map(|p| p.pos) else {
            return true;
        };

        for i in start_idx..end_idx {
            let (Ok(from), Ok(to)) = (
                poly_context(nav_mesh, path[i]),
                poly_context(nav_mesh, path[i + 1]),
            ) else {
                return false;
            };
            let Ok((left, right)) = portal_points(from, to) else {
                break;
            };

            if options.contains(StraightPathOptions::AREA_CROSSINGS)
                && from.poly.area == to.poly.area
            {
                continue;
            }

            if let Some((_, t)) = intersect_seg_seg_2d(&start_pos, end_pos, &left, &right) {
                let pt = vlerp(&left, &right, t);
                if !self.append_vertex(pt, StraightPathFlags::empty(), path[i + 1]) {
                    return false;
                }
            }
        }
        true
    }

    fn finish(self) -> StraightPathResult {
        let mut status = Status::success();
        if self.truncated {
            status = status.with_detail(Status::BUFFER_TOO_SMALL);
        }
        if self.partial {
            status = status.with_detail(Status::PARTIAL_RESULT);
        }
        StraightPathResult {
            points: self.points,
            status,
        }
    }
}

/// Flags of a funnel apex entering `poly_ref`
fn apex_flags(poly_ref: PolyRef, poly_type: PolyType) -> StraightPathFlags {
    if !poly_ref.is_valid() {
        StraightPathFlags::END
    } else if poly_type == PolyType::OffMeshConnection {
        StraightPathFlags::OFFMESH_CONNECTION
    } else {
        StraightPathFlags::empty()
    }
}

fn vertex_of(tile: &MeshTile, poly: &Poly, i: usize) -> Result<[f32; 3]> {
    if i >= (poly.vert_count as usize).min(MAX_VERTS_PER_POLY) {
        return Err(Error::InvalidMesh(format!("link edge {i} out of range")));
    }
    Ok(tile.vertex(poly.verts[i]))
}

fn query_box(center: &[f32; 3], half_extents: &[f32; 3]) -> ([f32; 3], [f32; 3]) {
    (
        [
            center[0] - half_extents[0],
            center[1] - half_extents[1],
            center[2] - half_extents[2],
        ],
        [
            center[0] + half_extents[0],
            center[1] + half_extents[1],
            center[2] + half_extents[2],
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_mesh_helpers::*;
    use crate::DefaultQueryFilter;

    #[test]
    fn test_portal_points_full_edge() -> Result<()> {
        let mesh = create_two_tile_mesh()?;
        let query = NavMeshQuery::new(&mesh);
        let a = poly_ref_at(&mesh, 0, 0, 0);
        let b = poly_ref_at(&mesh, 1, 0, 0);

        let portal = query.get_portal_points(a, b)?;
        assert_eq!(portal.left[0], 10.0);
        assert_eq!(portal.right[0], 10.0);
        let zs = [portal.left[2], portal.right[2]];
        assert!(zs.contains(&0.0) && zs.contains(&10.0));
        assert_eq!(portal.from_type, PolyType::Ground);
        assert_eq!(portal.to_type, PolyType::Ground);

        assert_eq!(query.get_edge_mid_point(a, b)?, [10.0, 0.0, 5.0]);
        Ok(())
    }

    #[test]
    fn test_portal_points_partial_link() -> Result<()> {
        let mesh = create_offset_tiles_mesh()?;
        let query = NavMeshQuery::new(&mesh);
        let a = poly_ref_at(&mesh, 0, 0, 0);
        let b = poly_ref_at(&mesh, 1, 0, 0);

        let portal = query.get_portal_points(a, b)?;
        for p in [portal.left, portal.right] {
            assert!((p[0] - 10.0).abs() < 1e-4);
            assert!(p[2] >= 5.0 - 0.05 && p[2] <= 10.0 + 1e-4);
        }
        Ok(())
    }

    #[test]
    fn test_portal_points_without_link() -> Result<()> {
        let mesh = create_grid_mesh()?;
        let query = NavMeshQuery::new(&mesh);
        let tile = mesh.get_tile_at(0, 0, 0).expect("tile");
        // Opposite corners of the grid are not adjacent.
        let err = query.get_portal_points(tile.poly_ref(0), tile.poly_ref(8));
        assert!(matches!(err, Err(Error::NoLinkFound(_))));
        Ok(())
    }

    #[test]
    fn test_path_to_node_splices_shortcut() {
        let mut pool = NodePool::new(8);
        let a = pool.get_node(PolyRef::new(1), 0).unwrap();
        let b = pool.get_node(PolyRef::new(2), 0).unwrap();
        let d = pool.get_node(PolyRef::new(4), 0).unwrap();
        pool.node_mut(b).pidx = a;
        // d shortcuts from b through 3
        pool.node_mut(d).pidx = b;
        pool.node_mut(d).shortcut = Some(vec![PolyRef::new(2), PolyRef::new(3), PolyRef::new(4)]);

        let path = get_path_to_node(&pool, d);
        let ids: Vec<u32> = path.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_insert_interval_keeps_order() {
        let mut ints = Vec::new();
        insert_interval(&mut ints, 128, 200, PolyRef::new(2));
        insert_interval(&mut ints, 0, 64, PolyRef::new(1));
        insert_interval(&mut ints, -1, 0, PolyRef::NULL);
        insert_interval(&mut ints, 255, 256, PolyRef::NULL);
        let mins: Vec<i32> = ints.iter().map(|i| i.tmin).collect();
        assert_eq!(mins, vec![-1, 0, 128, 255]);
    }

    #[test]
    fn test_query_tiles_and_invalid_box() -> Result<()> {
        let mesh = create_two_tile_mesh()?;
        let query = NavMeshQuery::new(&mesh);

        assert_eq!(query.query_tiles(&[10.0, 0.0, 5.0], &[1.0, 1.0, 1.0]).len(), 2);
        assert_eq!(query.query_tiles(&[2.0, 0.0, 5.0], &[1.0, 1.0, 1.0]).len(), 1);
        assert!(query
            .query_tiles(&[f32::NAN, 0.0, 0.0], &[1.0, 1.0, 1.0])
            .is_empty());

        let filter = DefaultQueryFilter::default();
        let mut collect = crate::CollectPolysQuery::new(8);
        let err = query.query_polygons(&[0.0; 3], &[f32::INFINITY, 1.0, 1.0], &filter, &mut collect);
        assert!(matches!(err, Err(Error::InvalidParam(_))));
        Ok(())
    }
}
