//! Small hand-built meshes shared by the unit tests
//!
//! Tiles are 10x10 world units with the grid origin at zero. Cell polygons
//! are listed as (x0,z0), (x0,z1), (x1,z1), (x1,z0), so edge 0 faces -x,
//! edge 1 faces +z, edge 2 faces +x and edge 3 faces -z.

use std::collections::HashMap;

use nav_common::Result;

use crate::nav_mesh_builder::MESH_NULL_IDX;
use crate::{
    MeshTile, NavMesh, NavMeshBuilder, NavMeshCreateParams, NavMeshParams, OffMeshConnectionParams,
    PolyFlags, PolyRef, MAX_VERTS_PER_POLY,
};

pub const TILE_SIZE: f32 = 10.0;

pub fn grid_params(max_tiles: i32) -> NavMeshParams {
    NavMeshParams {
        origin: [0.0; 3],
        tile_width: TILE_SIZE,
        tile_height: TILE_SIZE,
        max_tiles,
        max_polys_per_tile: 64,
    }
}

/// Tile covering grid cell `(tx, ty)` at height `height`, without polygons
fn tile_params(tx: i32, ty: i32, height: f32) -> NavMeshCreateParams {
    let x0 = tx as f32 * TILE_SIZE;
    let z0 = ty as f32 * TILE_SIZE;
    NavMeshCreateParams {
        tile_x: tx,
        tile_y: ty,
        bmin: [x0, height - 1.0, z0],
        bmax: [x0 + TILE_SIZE, height + 1.0, z0 + TILE_SIZE],
        cs: 0.1,
        ..NavMeshCreateParams::default()
    }
}

/// Adds an axis aligned rectangle polygon, sharing vertices with earlier ones
fn push_rect(
    params: &mut NavMeshCreateParams,
    lookup: &mut HashMap<(i32, i32), u16>,
    min: [f32; 2],
    max: [f32; 2],
    height: f32,
) {
    let corners = [
        [min[0], min[1]],
        [min[0], max[1]],
        [max[0], max[1]],
        [max[0], min[1]],
    ];
    for [x, z] in corners {
        let key = ((x * 1000.0).round() as i32, (z * 1000.0).round() as i32);
        let idx = *lookup.entry(key).or_insert_with(|| {
            params.verts.extend_from_slice(&[x, height, z]);
            (params.verts.len() / 3 - 1) as u16
        });
        params.polys.push(idx);
    }
    params
        .polys
        .extend(std::iter::repeat(MESH_NULL_IDX).take(MAX_VERTS_PER_POLY - 4));
    params.poly_flags.push(PolyFlags::WALK);
    params.poly_areas.push(0);
}

/// Tile made of unit cells; `cells` are (x, z) offsets from the tile corner.
/// Polygon `i` is `cells[i]`.
pub fn cell_tile_params(tx: i32, ty: i32, cells: &[(i32, i32)], height: f32) -> NavMeshCreateParams {
    let mut params = tile_params(tx, ty, height);
    let mut lookup = HashMap::new();
    let x0 = tx as f32 * TILE_SIZE;
    let z0 = ty as f32 * TILE_SIZE;
    for &(cx, cz) in cells {
        let min = [x0 + cx as f32, z0 + cz as f32];
        push_rect(&mut params, &mut lookup, min, [min[0] + 1.0, min[1] + 1.0], height);
    }
    params
}

/// Single polygon covering the whole tile
pub fn square_tile(tx: i32, ty: i32, height: f32) -> Result<MeshTile> {
    let mut params = tile_params(tx, ty, height);
    let x0 = tx as f32 * TILE_SIZE;
    let z0 = ty as f32 * TILE_SIZE;
    push_rect(
        &mut params,
        &mut HashMap::new(),
        [x0, z0],
        [x0 + TILE_SIZE, z0 + TILE_SIZE],
        height,
    );
    NavMeshBuilder::build_tile(&params)
}

/// One tile holding a 3x3 grid of unit cells; polygon `z * 3 + x` covers
/// `[x, x + 1] x [z, z + 1]`
pub fn create_grid_mesh() -> Result<NavMesh> {
    let cells: Vec<(i32, i32)> = (0..3).flat_map(|z| (0..3).map(move |x| (x, z))).collect();
    let mut mesh = NavMesh::new(grid_params(4))?;
    mesh.add_tile(NavMeshBuilder::build_tile(&cell_tile_params(0, 0, &cells, 0.0))?)?;
    Ok(mesh)
}

/// Two full tiles side by side along x, joined at x = 10
pub fn create_two_tile_mesh() -> Result<NavMesh> {
    let mut mesh = NavMesh::new(grid_params(4))?;
    mesh.add_tile(square_tile(0, 0, 0.0)?)?;
    mesh.add_tile(square_tile(1, 0, 0.0)?)?;
    Ok(mesh)
}

/// `count` full tiles in a row along x
pub fn create_tile_row_mesh(count: i32) -> Result<NavMesh> {
    let mut mesh = NavMesh::new(grid_params(count.max(1)))?;
    for tx in 0..count {
        mesh.add_tile(square_tile(tx, 0, 0.0)?)?;
    }
    Ok(mesh)
}

/// Tile (0, 0) is a full square; tile (1, 0) holds `[10, 20] x [5, 10]`, so
/// the portal between them only covers half of the first tile's east edge
pub fn create_offset_tiles_mesh() -> Result<NavMesh> {
    let mut mesh = NavMesh::new(grid_params(4))?;
    mesh.add_tile(square_tile(0, 0, 0.0)?)?;

    let mut params = tile_params(1, 0, 0.0);
    push_rect(&mut params, &mut HashMap::new(), [10.0, 5.0], [20.0, 10.0], 0.0);
    mesh.add_tile(NavMeshBuilder::build_tile(&params)?)?;
    Ok(mesh)
}

/// L shaped corridor of unit cells: (0,0), (1,0), (2,0), (2,1), (2,2).
/// The inner corner is at (2, 1).
pub fn create_l_mesh() -> Result<NavMesh> {
    let cells = [(0, 0), (1, 0), (2, 0), (2, 1), (2, 2)];
    let mut mesh = NavMesh::new(grid_params(1))?;
    mesh.add_tile(NavMeshBuilder::build_tile(&cell_tile_params(0, 0, &cells, 0.0))?)?;
    Ok(mesh)
}

/// Two unconnected unit cells at x in [0, 1] and [3, 4]
fn islands_params() -> NavMeshCreateParams {
    cell_tile_params(0, 0, &[(0, 0), (3, 0)], 0.0)
}

pub fn create_islands_mesh() -> Result<NavMesh> {
    let mut mesh = NavMesh::new(grid_params(1))?;
    mesh.add_tile(NavMeshBuilder::build_tile(&islands_params())?)?;
    Ok(mesh)
}

/// The two islands joined by an off-mesh connection from (0.5, 0.5) to
/// (3.5, 0.5); the connection is polygon 2
pub fn create_off_mesh_mesh(bidirectional: bool) -> Result<NavMesh> {
    let mut params = islands_params();
    params.off_mesh_connections.push(OffMeshConnectionParams {
        start: [0.5, 0.0, 0.5],
        end: [3.5, 0.0, 0.5],
        radius: 0.3,
        flags: PolyFlags::JUMP,
        area: 1,
        bidirectional,
        user_id: 1,
    });
    let mut mesh = NavMesh::new(grid_params(1))?;
    mesh.add_tile(NavMeshBuilder::build_tile(&params)?)?;
    Ok(mesh)
}

/// A 10x10 square rising along x with height `x / 2`
pub fn create_ramp_mesh() -> Result<NavMesh> {
    let mut params = tile_params(0, 0, 0.0);
    params.bmax[1] = 6.0;
    params.verts = vec![
        0.0, 0.0, 0.0, //
        0.0, 0.0, 10.0, //
        10.0, 5.0, 10.0, //
        10.0, 5.0, 0.0,
    ];
    params.polys = vec![0, 1, 2, 3, MESH_NULL_IDX, MESH_NULL_IDX];
    params.poly_flags = vec![PolyFlags::WALK];
    params.poly_areas = vec![0];
    let mut mesh = NavMesh::new(grid_params(1))?;
    mesh.add_tile(NavMeshBuilder::build_tile(&params)?)?;
    Ok(mesh)
}

/// Reference of polygon `poly_index` in the layer 0 tile at `(tx, ty)`
pub fn poly_ref_at(mesh: &NavMesh, tx: i32, ty: i32, poly_index: usize) -> PolyRef {
    mesh.get_tile_at(tx, ty, 0)
        .map_or(PolyRef::NULL, |tile| tile.poly_ref(poly_index))
}

pub fn seeded_rng() -> fastrand::Rng {
    fastrand::Rng::with_seed(0x5eed)
}

pub fn assert_near(a: &[f32; 3], b: &[f32; 3], eps: f32) {
    for k in 0..3 {
        assert!(
            (a[k] - b[k]).abs() <= eps,
            "{a:?} differs from {b:?} by more than {eps}"
        );
    }
}
