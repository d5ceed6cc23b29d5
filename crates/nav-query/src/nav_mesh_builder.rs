//! Navigation mesh builder for creating tile data
//!
//! This module provides the NavMeshBuilder which turns polygon data into a
//! [`MeshTile`] ready for [`NavMesh::add_tile`](super::NavMesh::add_tile):
//! polygon adjacency, tile boundary portals, off-mesh connection polygons and
//! the bounding volume tree.

use std::collections::HashMap;

use nav_common::{vert_at, Error, Result};

use super::{
    BVNode, MeshTile, OffMeshConnection, Poly, PolyDetail, PolyFlags, PolyType, TileHeader,
    EXT_LINK, LINK_SIDE_INTERNAL, MAX_VERTS_PER_POLY, OFFMESH_CON_BIDIR,
};

/// Marks an unused polygon vertex slot
pub const MESH_NULL_IDX: u16 = 0xffff;

/// Tolerance for deciding that an edge lies on the tile border
const BORDER_EPSILON: f32 = 1e-3;

/// Off-mesh connection to embed in a tile
#[derive(Debug, Clone, PartialEq)]
pub struct OffMeshConnectionParams {
    pub start: [f32; 3],
    pub end: [f32; 3],
    /// Snap radius of both endpoints
    pub radius: f32,
    pub flags: PolyFlags,
    pub area: u8,
    /// Traversable from end to start as well
    pub bidirectional: bool,
    pub user_id: u32,
}

/// Input for building one tile
#[derive(Debug, Clone)]
pub struct NavMeshCreateParams {
    /// Tile grid position
    pub tile_x: i32,
    pub tile_y: i32,
    pub tile_layer: i32,
    pub user_id: u32,
    /// World space vertices \[x,y,z,...\]
    pub verts: Vec<f32>,
    /// `nvp` vertex indices per polygon, padded with [`MESH_NULL_IDX`]
    pub polys: Vec<u16>,
    /// Maximum vertices per polygon
    pub nvp: usize,
    pub poly_flags: Vec<PolyFlags>,
    pub poly_areas: Vec<u8>,
    /// Optional height detail, one entry per polygon when present
    pub detail_meshes: Vec<PolyDetail>,
    pub detail_verts: Vec<f32>,
    pub detail_tris: Vec<[u8; 4]>,
    pub off_mesh_connections: Vec<OffMeshConnectionParams>,
    /// Tile bounds
    pub bmin: [f32; 3],
    pub bmax: [f32; 3],
    pub walkable_height: f32,
    pub walkable_radius: f32,
    pub walkable_climb: f32,
    /// Cell size, the BV tree quantizes with `1 / cs`
    pub cs: f32,
    pub build_bv_tree: bool,
}

impl Default for NavMeshCreateParams {
    fn default() -> Self {
        Self {
            tile_x: 0,
            tile_y: 0,
            tile_layer: 0,
            user_id: 0,
            verts: Vec::new(),
            polys: Vec::new(),
            nvp: MAX_VERTS_PER_POLY,
            poly_flags: Vec::new(),
            poly_areas: Vec::new(),
            detail_meshes: Vec::new(),
            detail_verts: Vec::new(),
            detail_tris: Vec::new(),
            off_mesh_connections: Vec::new(),
            bmin: [0.0; 3],
            bmax: [0.0; 3],
            walkable_height: 2.0,
            walkable_radius: 0.6,
            walkable_climb: 0.9,
            cs: 0.3,
            build_bv_tree: true,
        }
    }
}

impl NavMeshCreateParams {
    /// Number of ground polygons
    pub fn poly_count(&self) -> usize {
        self.poly_flags.len()
    }
}

/// Builder for creating navigation mesh tiles from polygon data
pub struct NavMeshBuilder;

impl NavMeshBuilder {
    /// Creates a navigation mesh tile from NavMeshCreateParams
    pub fn build_tile(params: &NavMeshCreateParams) -> Result<MeshTile> {
        Self::validate_params(params)?;

        let npolys = params.poly_count();
        let mut tile = MeshTile {
            header: Some(TileHeader {
                x: params.tile_x,
                y: params.tile_y,
                layer: params.tile_layer,
                user_id: params.user_id,
                bmin: params.bmin,
                bmax: params.bmax,
                walkable_height: params.walkable_height,
                walkable_radius: params.walkable_radius,
                walkable_climb: params.walkable_climb,
                bv_quant_factor: 1.0 / params.cs,
            }),
            verts: params.verts.clone(),
            detail_meshes: params.detail_meshes.clone(),
            detail_verts: params.detail_verts.clone(),
            detail_tris: params.detail_tris.clone(),
            ..MeshTile::default()
        };

        tile.polys = Self::build_polygons(params)?;

        // Only connections starting inside this tile are stored here
        let ymin = params.bmin[1] - params.walkable_climb;
        let ymax = params.bmax[1] + params.walkable_climb;
        for con in &params.off_mesh_connections {
            let start_class = classify_off_mesh_point(&con.start, &params.bmin, &params.bmax);
            if start_class != LINK_SIDE_INTERNAL || con.start[1] < ymin || con.start[1] > ymax {
                log::trace!("skipping off-mesh connection starting outside the tile");
                continue;
            }

            let first_vert = (tile.verts.len() / 3) as u16;
            tile.verts.extend_from_slice(&con.start);
            tile.verts.extend_from_slice(&con.end);

            let mut poly = Poly::new(con.area, PolyType::OffMeshConnection, con.flags);
            poly.verts[0] = first_vert;
            poly.verts[1] = first_vert + 1;
            poly.vert_count = 2;
            let poly_index = tile.polys.len() as u16;
            tile.polys.push(poly);

            tile.off_mesh_cons.push(OffMeshConnection {
                pos: [
                    con.start[0],
                    con.start[1],
                    con.start[2],
                    con.end[0],
                    con.end[1],
                    con.end[2],
                ],
                radius: con.radius,
                poly: poly_index,
                flags: if con.bidirectional { OFFMESH_CON_BIDIR } else { 0 },
                side: classify_off_mesh_point(&con.end, &params.bmin, &params.bmax),
                user_id: con.user_id,
            });
        }

        if params.build_bv_tree {
            tile.bv_tree = Self::build_bv_tree(params, &tile.polys[..npolys]);
        }

        log::debug!(
            "built tile ({}, {}, {}): {} polys, {} off-mesh connections, {} BV nodes",
            params.tile_x,
            params.tile_y,
            params.tile_layer,
            npolys,
            tile.off_mesh_cons.len(),
            tile.bv_tree.len()
        );

        Ok(tile)
    }

    /// Validates input parameters
    fn validate_params(params: &NavMeshCreateParams) -> Result<()> {
        let npolys = params.poly_count();
        if params.nvp < 3 || params.nvp > MAX_VERTS_PER_POLY {
            return Err(Error::invalid_param(format!(
                "nvp must be in 3..={MAX_VERTS_PER_POLY}, got {}",
                params.nvp
            )));
        }
        if npolys == 0 {
            return Err(Error::invalid_param("tile has no polygons"));
        }
        if params.poly_areas.len() != npolys || params.polys.len() != npolys * params.nvp {
            return Err(Error::invalid_param(
                "polygon, flag and area arrays disagree on polygon count",
            ));
        }
        if params.verts.len() % 3 != 0 || params.verts.len() < 9 {
            return Err(Error::invalid_param("vertex array must hold at least 3 xyz triples"));
        }
        if params.verts.len() / 3 + params.off_mesh_connections.len() * 2 > 0xffff
            || npolys + params.off_mesh_connections.len() > 0xffff
        {
            return Err(Error::invalid_param("too many vertices or polygons for one tile"));
        }
        if !(params.cs > 0.0) {
            return Err(Error::invalid_param("cell size must be positive"));
        }
        if !params.detail_meshes.is_empty() && params.detail_meshes.len() != npolys {
            return Err(Error::invalid_param("detail mesh count must match polygon count"));
        }

        let nverts = params.verts.len() / 3;
        for (i, poly) in params.polys.chunks_exact(params.nvp).enumerate() {
            let count = poly.iter().take_while(|&&v| v != MESH_NULL_IDX).count();
            if count < 3 {
                return Err(Error::invalid_param(format!(
                    "polygon {i} has fewer than 3 vertices"
                )));
            }
            if poly[..count].iter().any(|&v| v as usize >= nverts) {
                return Err(Error::invalid_param(format!(
                    "polygon {i} references a missing vertex"
                )));
            }
        }
        Ok(())
    }

    /// Builds the ground polygons with neighbour information
    fn build_polygons(params: &NavMeshCreateParams) -> Result<Vec<Poly>> {
        let nvp = params.nvp;
        let mut polys: Vec<Poly> = params
            .polys
            .chunks_exact(nvp)
            .enumerate()
            .map(|(i, src)| {
                let mut poly = Poly::new(params.poly_areas[i], PolyType::Ground, params.poly_flags[i]);
                let count = src.iter().take_while(|&&v| v != MESH_NULL_IDX).count();
                poly.verts[..count].copy_from_slice(&src[..count]);
                poly.vert_count = count as u8;
                poly
            })
            .collect();

        // Shared edges: (a, b) in one polygon matches (b, a) in its neighbour
        let mut edges: HashMap<(u16, u16), (usize, usize)> = HashMap::new();
        for (i, poly) in polys.iter().enumerate() {
            let nv = poly.vert_count as usize;
            for j in 0..nv {
                let a = poly.verts[j];
                let b = poly.verts[(j + 1) % nv];
                edges.insert((a, b), (i, j));
            }
        }

        for i in 0..polys.len() {
            let nv = polys[i].vert_count as usize;
            for j in 0..nv {
                let a = polys[i].verts[j];
                let b = polys[i].verts[(j + 1) % nv];
                if let Some(&(other, _)) = edges.get(&(b, a)) {
                    if other != i {
                        polys[i].neighbors[j] = other as u16 + 1;
                        continue;
                    }
                }
                let va = vert_at(&params.verts, a as usize);
                let vb = vert_at(&params.verts, b as usize);
                if let Some(side) = border_side(&va, &vb, &params.bmin, &params.bmax) {
                    polys[i].neighbors[j] = EXT_LINK | side as u16;
                }
            }
        }

        Ok(polys)
    }

    /// Builds the bounding volume tree over the ground polygons
    fn build_bv_tree(params: &NavMeshCreateParams, polys: &[Poly]) -> Vec<BVNode> {
        let quant = 1.0 / params.cs;
        let mut items: Vec<BVNode> = polys
            .iter()
            .enumerate()
            .map(|(i, poly)| {
                let mut bmin = vert_at(&params.verts, poly.verts[0] as usize);
                let mut bmax = bmin;
                let mut grow = |v: [f32; 3]| {
                    for k in 0..3 {
                        bmin[k] = bmin[k].min(v[k]);
                        bmax[k] = bmax[k].max(v[k]);
                    }
                };
                for j in 1..poly.vert_count as usize {
                    grow(vert_at(&params.verts, poly.verts[j] as usize));
                }
                if let Some(pd) = params.detail_meshes.get(i) {
                    for k in 0..pd.vert_count as usize {
                        let di = pd.vert_base as usize + k;
                        if di * 3 + 2 < params.detail_verts.len() {
                            grow(vert_at(&params.detail_verts, di));
                        }
                    }
                }

                let mut node = BVNode {
                    i: i as i32,
                    ..BVNode::default()
                };
                for k in 0..3 {
                    let lo = ((bmin[k] - params.bmin[k]) * quant).floor();
                    let hi = ((bmax[k] - params.bmin[k]) * quant).ceil();
                    node.bmin[k] = lo.clamp(0.0, 65535.0) as u16;
                    node.bmax[k] = hi.clamp(0.0, 65535.0) as u16;
                }
                node
            })
            .collect();

        let mut nodes = Vec::with_capacity(items.len() * 2);
        let len = items.len();
        subdivide(&mut items, 0, len, &mut nodes);
        nodes
    }
}

/// Recursively splits items along the longest axis, appending nodes in
/// depth-first order. Internal nodes store the negated subtree size.
fn subdivide(items: &mut [BVNode], imin: usize, imax: usize, nodes: &mut Vec<BVNode>) {
    let inum = imax - imin;
    let icur = nodes.len();

    if inum == 1 {
        nodes.push(items[imin].clone());
        return;
    }

    let mut node = BVNode {
        bmin: items[imin].bmin,
        bmax: items[imin].bmax,
        i: 0,
    };
    for it in &items[imin + 1..imax] {
        for k in 0..3 {
            node.bmin[k] = node.bmin[k].min(it.bmin[k]);
            node.bmax[k] = node.bmax[k].max(it.bmax[k]);
        }
    }
    nodes.push(node);

    let extent = [
        node_extent(&nodes[icur], 0),
        node_extent(&nodes[icur], 1),
        node_extent(&nodes[icur], 2),
    ];
    let mut axis = 0;
    if extent[1] > extent[axis] {
        axis = 1;
    }
    if extent[2] > extent[axis] {
        axis = 2;
    }
    items[imin..imax].sort_by_key(|it| it.bmin[axis]);

    let isplit = imin + inum / 2;
    subdivide(items, imin, isplit, nodes);
    subdivide(items, isplit, imax, nodes);

    let escape = (nodes.len() - icur) as i32;
    nodes[icur].i = -escape;
}

fn node_extent(node: &BVNode, axis: usize) -> u16 {
    node.bmax[axis].saturating_sub(node.bmin[axis])
}

/// Tile side an edge lies on, if both endpoints sit on the same border
fn border_side(va: &[f32; 3], vb: &[f32; 3], bmin: &[f32; 3], bmax: &[f32; 3]) -> Option<u8> {
    let on = |a: f32, b: f32, border: f32| {
        (a - border).abs() < BORDER_EPSILON && (b - border).abs() < BORDER_EPSILON
    };
    if on(va[0], vb[0], bmax[0]) {
        Some(0)
    } else if on(va[2], vb[2], bmax[2]) {
        Some(2)
    } else if on(va[0], vb[0], bmin[0]) {
        Some(4)
    } else if on(va[2], vb[2], bmin[2]) {
        Some(6)
    } else {
        None
    }
}

const XP: u8 = 1 << 0;
const ZP: u8 = 1 << 1;
const XM: u8 = 1 << 2;
const ZM: u8 = 1 << 3;

/// Side of the tile a point lies outside of, 0xff when inside
pub fn classify_off_mesh_point(pt: &[f32; 3], bmin: &[f32; 3], bmax: &[f32; 3]) -> u8 {
    let mut outcode = 0;
    if pt[0] >= bmax[0] {
        outcode |= XP;
    }
    if pt[2] >= bmax[2] {
        outcode |= ZP;
    }
    if pt[0] < bmin[0] {
        outcode |= XM;
    }
    if pt[2] < bmin[2] {
        outcode |= ZM;
    }

    match outcode {
        XP => 0,
        o if o == XP | ZP => 1,
        ZP => 2,
        o if o == XM | ZP => 3,
        XM => 4,
        o if o == XM | ZM => 5,
        ZM => 6,
        o if o == XP | ZM => 7,
        _ => LINK_SIDE_INTERNAL,
    }
}
