//! Tiled navigation mesh
//!
//! The navigation mesh is a grid of tiles. Each tile owns its polygons,
//! vertices, optional detail triangles, a quantized bounding volume tree and
//! the links that make up the adjacency graph. Links between tiles are created
//! when a tile is added and removed again when its neighbour goes away.

use std::collections::HashMap;

use nav_common::{
    closest_height_point_triangle, dist_pt_seg_sqr_2d, distance_pt_poly_edges_sqr,
    overlap_bounds, overlap_quant_bounds, point_in_polygon, vert_at, vlerp, Error, Result,
};

use super::{
    NavMeshParams, PolyFlags, PolyRef, PolyType, EXT_LINK, LINK_SIDE_INTERNAL,
    MAX_VERTS_PER_POLY, OFFMESH_CON_BIDIR,
};

/// Number of bits for polygon id
const POLY_BITS: u32 = 16;
/// Number of bits for tile id
const TILE_BITS: u32 = 10;
/// Number of bits for salt
const SALT_BITS: u32 = 6;

const POLY_MASK: u32 = (1 << POLY_BITS) - 1;
const TILE_MASK: u32 = (1 << TILE_BITS) - 1;
const SALT_MASK: u32 = (1 << SALT_BITS) - 1;

/// Creates a PolyRef from salt, tile index and polygon index
#[inline]
pub fn encode_poly_ref(salt: u32, tile_index: u32, poly_index: u32) -> PolyRef {
    PolyRef::new(
        ((salt & SALT_MASK) << (POLY_BITS + TILE_BITS))
            | ((tile_index & TILE_MASK) << POLY_BITS)
            | (poly_index & POLY_MASK),
    )
}

/// Decodes a PolyRef into salt, tile index and polygon index
#[inline]
pub fn decode_poly_ref(reference: PolyRef) -> (u32, u32, u32) {
    let id = reference.id();
    (
        (id >> (POLY_BITS + TILE_BITS)) & SALT_MASK,
        (id >> POLY_BITS) & TILE_MASK,
        id & POLY_MASK,
    )
}

/// Link between two polygons
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Link {
    /// Reference to the connected polygon
    pub reference: PolyRef,
    /// Index of the next link of the same polygon
    pub next: Option<usize>,
    /// Edge of the owning polygon the link crosses (0xff for off-mesh back links)
    pub edge_index: u8,
    /// Portal side for tile boundary links, 0xff for internal links
    pub side: u8,
    /// Start of the usable edge span, 0..=255
    pub bmin: u8,
    /// End of the usable edge span, 0..=255
    pub bmax: u8,
}

impl Link {
    /// Creates a link spanning the whole edge
    pub fn new(reference: PolyRef, edge_index: u8, side: u8) -> Self {
        Self {
            reference,
            next: None,
            edge_index,
            side,
            bmin: 0,
            bmax: 255,
        }
    }

    /// True if the link only covers part of its edge
    pub fn is_partial(&self) -> bool {
        self.side != LINK_SIDE_INTERNAL && (self.bmin != 0 || self.bmax != 255)
    }
}

/// Polygon in the navigation mesh
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Poly {
    /// First link index
    pub first_link: Option<usize>,
    /// Vertex indices into the tile vertex array
    pub verts: [u16; MAX_VERTS_PER_POLY],
    /// Per edge neighbour: 0 = wall, `n` = internal polygon `n - 1`,
    /// [`EXT_LINK`] | side = portal into the adjacent tile
    pub neighbors: [u16; MAX_VERTS_PER_POLY],
    /// Flags for the polygon
    pub flags: PolyFlags,
    /// Number of vertices in the polygon
    pub vert_count: u8,
    /// Area ID of the polygon
    pub area: u8,
    /// Polygon type
    pub poly_type: PolyType,
}

impl Poly {
    /// Creates a new polygon
    pub fn new(area: u8, poly_type: PolyType, flags: PolyFlags) -> Self {
        Self {
            first_link: None,
            verts: [0; MAX_VERTS_PER_POLY],
            neighbors: [0; MAX_VERTS_PER_POLY],
            flags,
            vert_count: 0,
            area,
            poly_type,
        }
    }

    pub fn is_off_mesh_connection(&self) -> bool {
        self.poly_type == PolyType::OffMeshConnection
    }
}

/// Detail triangle range of a polygon
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct PolyDetail {
    /// First vertex in the detail_verts array
    pub vert_base: u32,
    /// First triangle in the detail_tris array
    pub tri_base: u32,
    /// Number of extra detail vertices
    pub vert_count: u8,
    /// Number of triangles
    pub tri_count: u8,
}

/// Bounding volume node using quantized coordinates
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct BVNode {
    pub bmin: [u16; 3],
    pub bmax: [u16; 3],
    /// Polygon index for leaves, negated escape offset for internal nodes
    pub i: i32,
}

/// Off-mesh connection between two surface locations
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct OffMeshConnection {
    /// Endpoints \[ax,ay,az,bx,by,bz\]
    pub pos: [f32; 6],
    /// Snap radius of the endpoints
    pub radius: f32,
    /// Index of the connection polygon within the tile
    pub poly: u16,
    /// Connection flags ([`OFFMESH_CON_BIDIR`])
    pub flags: u8,
    /// Tile side the end point lies on, 0xff when inside the tile
    pub side: u8,
    pub user_id: u32,
}

impl OffMeshConnection {
    pub fn start_pos(&self) -> [f32; 3] {
        [self.pos[0], self.pos[1], self.pos[2]]
    }

    pub fn end_pos(&self) -> [f32; 3] {
        [self.pos[3], self.pos[4], self.pos[5]]
    }

    pub fn is_bidirectional(&self) -> bool {
        self.flags & OFFMESH_CON_BIDIR != 0
    }
}

/// Tile header information
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct TileHeader {
    /// Tile grid position
    pub x: i32,
    pub y: i32,
    pub layer: i32,
    pub user_id: u32,
    /// Bounding box of the tile
    pub bmin: [f32; 3],
    pub bmax: [f32; 3],
    /// Agent height the tile was built for
    pub walkable_height: f32,
    /// Agent radius the tile was built for
    pub walkable_radius: f32,
    /// Agent climb the tile was built for
    pub walkable_climb: f32,
    /// World to BV tree quantization factor
    pub bv_quant_factor: f32,
}

/// Mesh tile in the navigation mesh
#[derive(Debug, Clone, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct MeshTile {
    /// Salt of the tile slot, bumped every time the slot is freed
    pub salt: u32,
    /// Index of the slot this tile occupies
    pub index: u32,
    /// Header, `None` while the slot is unused
    pub header: Option<TileHeader>,
    pub polys: Vec<Poly>,
    /// Vertices \[x,y,z,...\]
    pub verts: Vec<f32>,
    pub links: Vec<Link>,
    /// Indices of released entries in `links`
    pub free_links: Vec<usize>,
    pub detail_meshes: Vec<PolyDetail>,
    /// Extra detail vertices \[x,y,z,...\]
    pub detail_verts: Vec<f32>,
    /// Detail triangles: three vertex indices and an edge flag byte
    pub detail_tris: Vec<[u8; 4]>,
    pub bv_tree: Vec<BVNode>,
    pub off_mesh_cons: Vec<OffMeshConnection>,
}

/// Iterator over the links of one polygon
pub struct PolyLinks<'a> {
    links: &'a [Link],
    next: Option<usize>,
}

impl<'a> Iterator for PolyLinks<'a> {
    type Item = &'a Link;

    fn next(&mut self) -> Option<&'a Link> {
        let link = self.links.get(self.next?)?;
        self.next = link.next;
        Some(link)
    }
}

impl MeshTile {
    fn empty(index: u32, salt: u32) -> Self {
        Self {
            salt,
            index,
            ..Self::default()
        }
    }

    /// Reference of polygon 0 of this tile; OR in a polygon index to address others
    pub fn poly_ref_base(&self) -> PolyRef {
        encode_poly_ref(self.salt, self.index, 0)
    }

    /// Reference of the polygon at `poly_index`
    pub fn poly_ref(&self, poly_index: usize) -> PolyRef {
        encode_poly_ref(self.salt, self.index, poly_index as u32)
    }

    /// Position of vertex `i`
    #[inline]
    pub fn vertex(&self, i: u16) -> [f32; 3] {
        vert_at(&self.verts, i as usize)
    }

    /// Copies the polygon's vertices into a flat buffer; the first
    /// `poly.vert_count * 3` values are meaningful
    pub fn poly_verts(&self, poly: &Poly) -> [f32; MAX_VERTS_PER_POLY * 3] {
        let mut out = [0.0; MAX_VERTS_PER_POLY * 3];
        for i in 0..poly.vert_count as usize {
            out[i * 3..i * 3 + 3].copy_from_slice(&self.vertex(poly.verts[i]));
        }
        out
    }

    /// Iterates the links of `poly`
    pub fn links_of(&self, poly: &Poly) -> PolyLinks<'_> {
        PolyLinks {
            links: &self.links,
            next: poly.first_link,
        }
    }

    /// Walkable climb the tile was built with
    pub fn walkable_climb(&self) -> f32 {
        self.header.as_ref().map_or(0.0, |h| h.walkable_climb)
    }

    /// Prepends a link to the polygon's link list
    fn push_link(&mut self, poly_index: usize, mut link: Link) {
        link.next = self.polys[poly_index].first_link;
        let idx = match self.free_links.pop() {
            Some(idx) => {
                self.links[idx] = link;
                idx
            }
            None => {
                self.links.push(link);
                self.links.len() - 1
            }
        };
        self.polys[poly_index].first_link = Some(idx);
    }

    /// Releases every link pointing into the tile slot `target_index`
    fn unconnect_links(&mut self, target_index: u32) {
        for i in 0..self.polys.len() {
            let mut prev: Option<usize> = None;
            let mut cur = self.polys[i].first_link;
            while let Some(j) = cur {
                let next = self.links[j].next;
                let (_, tile_index, _) = decode_poly_ref(self.links[j].reference);
                if tile_index == target_index {
                    match prev {
                        None => self.polys[i].first_link = next,
                        Some(p) => self.links[p].next = next,
                    }
                    self.links[j] = Link::new(PolyRef::NULL, 0, 0);
                    self.free_links.push(j);
                } else {
                    prev = Some(j);
                }
                cur = next;
            }
        }
    }

    /// Detail triangle `t` of the polygon at `poly_index` as three positions
    fn detail_triangle(&self, poly_index: usize, poly: &Poly, t: usize) -> Option<[[f32; 3]; 3]> {
        let pd = self.detail_meshes.get(poly_index)?;
        let tri = self.detail_tris.get(pd.tri_base as usize + t)?;
        let mut v = [[0.0; 3]; 3];
        for k in 0..3 {
            let idx = tri[k];
            v[k] = if idx < poly.vert_count {
                self.vertex(poly.verts[idx as usize])
            } else {
                let di = pd.vert_base as usize + (idx - poly.vert_count) as usize;
                if di * 3 + 2 >= self.detail_verts.len() {
                    return None;
                }
                vert_at(&self.detail_verts, di)
            };
        }
        Some(v)
    }
}

/// Checks that every index stored in the tile stays inside its arrays
fn validate_tile(tile: &MeshTile) -> Result<()> {
    if tile.verts.len() % 3 != 0 {
        return Err(Error::invalid_mesh("vertex array is not a list of xyz triples"));
    }
    let nverts = tile.verts.len() / 3;
    let npolys = tile.polys.len();

    for (i, poly) in tile.polys.iter().enumerate() {
        let nv = poly.vert_count as usize;
        let min = if poly.is_off_mesh_connection() { 2 } else { 3 };
        if nv < min || nv > MAX_VERTS_PER_POLY {
            return Err(Error::invalid_mesh(format!(
                "polygon {i} has {nv} vertices"
            )));
        }
        if poly.verts[..nv].iter().any(|&v| v as usize >= nverts) {
            return Err(Error::invalid_mesh(format!(
                "polygon {i} references a vertex outside the tile"
            )));
        }
        for &nei in &poly.neighbors[..nv] {
            let bad = if nei & EXT_LINK != 0 {
                nei & 0xff > 7
            } else {
                nei as usize > npolys
            };
            if bad {
                return Err(Error::invalid_mesh(format!(
                    "polygon {i} has an out of range neighbour {nei:#x}"
                )));
            }
        }
    }

    if tile.detail_meshes.len() > npolys {
        return Err(Error::invalid_mesh("more detail meshes than polygons"));
    }
    let ndetail_verts = tile.detail_verts.len() / 3;
    for (i, pd) in tile.detail_meshes.iter().enumerate() {
        let tri_end = pd.tri_base as usize + pd.tri_count as usize;
        let vert_end = pd.vert_base as usize + pd.vert_count as usize;
        if tri_end > tile.detail_tris.len() || vert_end > ndetail_verts {
            return Err(Error::invalid_mesh(format!(
                "detail mesh {i} runs past the detail arrays"
            )));
        }
        let limit = tile.polys[i].vert_count as usize + pd.vert_count as usize;
        let tris = &tile.detail_tris[pd.tri_base as usize..tri_end];
        if tris.iter().any(|t| t[..3].iter().any(|&k| k as usize >= limit)) {
            return Err(Error::invalid_mesh(format!(
                "detail mesh {i} has a triangle with an unknown vertex"
            )));
        }
    }

    for (i, con) in tile.off_mesh_cons.iter().enumerate() {
        let valid = tile
            .polys
            .get(con.poly as usize)
            .is_some_and(|p| p.is_off_mesh_connection());
        if !valid {
            return Err(Error::invalid_mesh(format!(
                "off-mesh connection {i} points at polygon {}",
                con.poly
            )));
        }
    }

    let nnodes = tile.bv_tree.len();
    for (i, node) in tile.bv_tree.iter().enumerate() {
        let in_range = if node.i >= 0 {
            (node.i as usize) < npolys
        } else {
            node.i != i32::MIN && i + (-node.i) as usize <= nnodes
        };
        if !in_range {
            return Err(Error::invalid_mesh(format!(
                "bounding volume node {i} has index {}",
                node.i
            )));
        }
    }
    Ok(())
}

/// Neighbour tile offset for a portal side
fn side_offset(side: u8) -> (i32, i32) {
    match side {
        0 => (1, 0),
        1 => (1, 1),
        2 => (0, 1),
        3 => (-1, 1),
        4 => (-1, 0),
        5 => (-1, -1),
        6 => (0, -1),
        7 => (1, -1),
        _ => (0, 0),
    }
}

/// Side facing the given side
#[inline]
pub(crate) fn opposite_side(side: u8) -> u8 {
    (side + 4) & 0x7
}

/// Navigation mesh structure
#[derive(Debug)]
pub struct NavMesh {
    params: NavMeshParams,
    /// Tile slots; a slot is in use when its header is set
    tiles: Vec<MeshTile>,
    /// Free slot indices, the next one to use last
    free_tiles: Vec<usize>,
    /// Slots by tile grid cell
    pos_lookup: HashMap<(i32, i32), Vec<usize>>,
}

impl NavMesh {
    /// Creates an empty navigation mesh
    pub fn new(params: NavMeshParams) -> Result<Self> {
        if !params.origin.iter().all(|v| v.is_finite()) {
            return Err(Error::invalid_param("navmesh origin must be finite"));
        }
        if !(params.tile_width > 0.0 && params.tile_height > 0.0) {
            return Err(Error::invalid_param("tile size must be positive"));
        }
        if params.max_tiles <= 0 || params.max_tiles > (1 << TILE_BITS) {
            return Err(Error::invalid_param(format!(
                "max_tiles must be in 1..={}",
                1 << TILE_BITS
            )));
        }
        if params.max_polys_per_tile <= 0 || params.max_polys_per_tile > (1 << POLY_BITS) {
            return Err(Error::invalid_param(format!(
                "max_polys_per_tile must be in 1..={}",
                1 << POLY_BITS
            )));
        }

        let max_tiles = params.max_tiles as usize;
        let tiles = (0..max_tiles)
            .map(|i| MeshTile::empty(i as u32, 1))
            .collect();
        let free_tiles = (0..max_tiles).rev().collect();

        Ok(Self {
            params,
            tiles,
            free_tiles,
            pos_lookup: HashMap::new(),
        })
    }

    pub fn params(&self) -> &NavMeshParams {
        &self.params
    }

    pub fn max_tiles(&self) -> usize {
        self.tiles.len()
    }

    /// Tile at slot `index`, if that slot is in use
    pub fn get_tile(&self, index: usize) -> Option<&MeshTile> {
        self.tiles.get(index).filter(|t| t.header.is_some())
    }

    /// Iterates the tiles in use in slot order
    pub fn tiles(&self) -> impl Iterator<Item = &MeshTile> {
        self.tiles.iter().filter(|t| t.header.is_some())
    }

    /// Adds a tile, links it to its neighbours and returns its reference
    pub fn add_tile(&mut self, mut tile: MeshTile) -> Result<PolyRef> {
        let header = tile
            .header
            .clone()
            .ok_or_else(|| Error::invalid_param("tile has no header"))?;

        if self.get_tile_at(header.x, header.y, header.layer).is_some() {
            return Err(Error::invalid_param(format!(
                "tile ({}, {}, {}) already occupied",
                header.x, header.y, header.layer
            )));
        }
        if tile.polys.len() > self.params.max_polys_per_tile as usize {
            return Err(Error::invalid_param(format!(
                "tile has {} polygons, limit is {}",
                tile.polys.len(),
                self.params.max_polys_per_tile
            )));
        }
        validate_tile(&tile)?;

        let idx = self
            .free_tiles
            .pop()
            .ok_or_else(|| Error::failure("no free tile slots"))?;

        tile.salt = self.tiles[idx].salt;
        tile.index = idx as u32;
        tile.links.clear();
        tile.free_links.clear();
        for poly in &mut tile.polys {
            poly.first_link = None;
        }
        self.tiles[idx] = tile;
        self.pos_lookup
            .entry((header.x, header.y))
            .or_default()
            .push(idx);

        self.connect_int_links(idx);
        self.base_off_mesh_links(idx);
        self.connect_ext_off_mesh_links(idx, idx, None);

        // Other layers in the same cell
        let layers: Vec<usize> = self
            .tile_indices_at(header.x, header.y)
            .into_iter()
            .filter(|&j| j != idx)
            .collect();
        for j in layers {
            self.connect_ext_links(idx, j, None);
            self.connect_ext_links(j, idx, None);
            self.connect_ext_off_mesh_links(idx, j, None);
            self.connect_ext_off_mesh_links(j, idx, None);
        }

        // Neighbour cells
        for side in 0..8u8 {
            let (dx, dy) = side_offset(side);
            let neis = self.tile_indices_at(header.x + dx, header.y + dy);
            for j in neis {
                self.connect_ext_links(idx, j, Some(side));
                self.connect_ext_links(j, idx, Some(opposite_side(side)));
                self.connect_ext_off_mesh_links(idx, j, Some(side));
                self.connect_ext_off_mesh_links(j, idx, Some(opposite_side(side)));
            }
        }

        let tile = &self.tiles[idx];
        log::debug!(
            "added tile ({}, {}, {}) at slot {} with {} polys, {} links",
            header.x,
            header.y,
            header.layer,
            idx,
            tile.polys.len(),
            tile.links.len() - tile.free_links.len()
        );

        Ok(tile.poly_ref_base())
    }

    /// Removes the tile referenced by `tile_ref` and unlinks it from its neighbours.
    ///
    /// The slot's salt changes, so references into the removed tile stop resolving.
    pub fn remove_tile(&mut self, tile_ref: PolyRef) -> Result<MeshTile> {
        let (salt, tile_index, _) = decode_poly_ref(tile_ref);
        let idx = tile_index as usize;
        let header = match self.tiles.get(idx) {
            Some(t) if t.salt == salt => t.header.clone(),
            _ => None,
        }
        .ok_or_else(|| Error::invalid_param(format!("invalid tile reference {tile_ref}")))?;

        if let Some(slots) = self.pos_lookup.get_mut(&(header.x, header.y)) {
            slots.retain(|&s| s != idx);
            if slots.is_empty() {
                self.pos_lookup.remove(&(header.x, header.y));
            }
        }

        let mut neighbours = self.tile_indices_at(header.x, header.y);
        for side in 0..8u8 {
            let (dx, dy) = side_offset(side);
            neighbours.extend(self.tile_indices_at(header.x + dx, header.y + dy));
        }
        for j in neighbours {
            self.tiles[j].unconnect_links(tile_index);
        }

        let mut next_salt = (salt + 1) & SALT_MASK;
        if next_salt == 0 {
            next_salt = 1;
        }
        let mut removed = std::mem::replace(
            &mut self.tiles[idx],
            MeshTile::empty(tile_index, next_salt),
        );
        removed.links.clear();
        removed.free_links.clear();
        for poly in &mut removed.polys {
            poly.first_link = None;
        }
        self.free_tiles.push(idx);

        log::debug!(
            "removed tile ({}, {}, {}) from slot {}",
            header.x,
            header.y,
            header.layer,
            idx
        );

        Ok(removed)
    }

    /// Grid cell containing `pos`
    pub fn calc_tile_loc(&self, pos: &[f32; 3]) -> (i32, i32) {
        let tx = ((pos[0] - self.params.origin[0]) / self.params.tile_width).floor() as i32;
        let ty = ((pos[2] - self.params.origin[2]) / self.params.tile_height).floor() as i32;
        (tx, ty)
    }

    fn tile_indices_at(&self, x: i32, y: i32) -> Vec<usize> {
        self.pos_lookup.get(&(x, y)).cloned().unwrap_or_default()
    }

    /// All layers at a grid cell
    pub fn get_tiles_at(&self, x: i32, y: i32) -> Vec<&MeshTile> {
        self.pos_lookup
            .get(&(x, y))
            .map(|slots| slots.iter().map(|&i| &self.tiles[i]).collect())
            .unwrap_or_default()
    }

    /// Tile at a grid cell and layer
    pub fn get_tile_at(&self, x: i32, y: i32, layer: i32) -> Option<&MeshTile> {
        self.pos_lookup.get(&(x, y)).and_then(|slots| {
            slots
                .iter()
                .map(|&i| &self.tiles[i])
                .find(|t| t.header.as_ref().is_some_and(|h| h.layer == layer))
        })
    }

    /// Tiles in the cell next to `(x, y)` across `side`
    pub fn get_neighbour_tiles_at(&self, x: i32, y: i32, side: u8) -> Vec<&MeshTile> {
        let (dx, dy) = side_offset(side);
        self.get_tiles_at(x + dx, y + dy)
    }

    /// Reference of a tile (its polygon reference base)
    pub fn get_tile_ref(&self, tile: &MeshTile) -> PolyRef {
        tile.poly_ref_base()
    }

    /// Tile addressed by a tile or polygon reference
    pub fn get_tile_by_ref(&self, reference: PolyRef) -> Option<&MeshTile> {
        let (salt, tile_index, _) = decode_poly_ref(reference);
        self.tiles
            .get(tile_index as usize)
            .filter(|t| t.header.is_some() && t.salt == salt)
    }

    /// Resolves a polygon reference
    pub fn get_tile_and_poly_by_ref(&self, reference: PolyRef) -> Result<(&MeshTile, &Poly)> {
        if !reference.is_valid() {
            return Err(Error::invalid_param("null polygon reference"));
        }
        let (_, _, poly_index) = decode_poly_ref(reference);
        self.get_tile_by_ref(reference)
            .and_then(|tile| tile.polys.get(poly_index as usize).map(|poly| (tile, poly)))
            .ok_or_else(|| Error::invalid_param(format!("invalid polygon reference {reference}")))
    }

    fn get_poly_mut(&mut self, reference: PolyRef) -> Result<&mut Poly> {
        let (salt, tile_index, poly_index) = decode_poly_ref(reference);
        self.tiles
            .get_mut(tile_index as usize)
            .filter(|t| reference.is_valid() && t.header.is_some() && t.salt == salt)
            .and_then(|t| t.polys.get_mut(poly_index as usize))
            .ok_or_else(|| Error::invalid_param(format!("invalid polygon reference {reference}")))
    }

    /// True if the reference resolves to a polygon of a live tile
    pub fn is_valid_poly_ref(&self, reference: PolyRef) -> bool {
        self.get_tile_and_poly_by_ref(reference).is_ok()
    }

    pub fn set_poly_flags(&mut self, reference: PolyRef, flags: PolyFlags) -> Result<()> {
        self.get_poly_mut(reference)?.flags = flags;
        Ok(())
    }

    pub fn get_poly_flags(&self, reference: PolyRef) -> Result<PolyFlags> {
        Ok(self.get_tile_and_poly_by_ref(reference)?.1.flags)
    }

    pub fn set_poly_area(&mut self, reference: PolyRef, area: u8) -> Result<()> {
        self.get_poly_mut(reference)?.area = area;
        Ok(())
    }

    pub fn get_poly_area(&self, reference: PolyRef) -> Result<u8> {
        Ok(self.get_tile_and_poly_by_ref(reference)?.1.area)
    }

    /// Endpoints of an off-mesh connection ordered so the first one is where
    /// `prev_ref` enters the connection
    pub fn get_off_mesh_connection_poly_end_points(
        &self,
        prev_ref: PolyRef,
        poly_ref: PolyRef,
    ) -> Result<([f32; 3], [f32; 3])> {
        let (tile, poly) = self.get_tile_and_poly_by_ref(poly_ref)?;
        if !poly.is_off_mesh_connection() {
            return Err(Error::invalid_param("polygon is not an off-mesh connection"));
        }
        // The link on edge 0 leads to the start landing polygon
        let mut idx0 = 0;
        let mut idx1 = 1;
        for link in tile.links_of(poly) {
            if link.edge_index == 0 {
                if link.reference != prev_ref {
                    idx0 = 1;
                    idx1 = 0;
                }
                break;
            }
        }
        Ok((tile.vertex(poly.verts[idx0]), tile.vertex(poly.verts[idx1])))
    }

    /// Height of the polygon surface at `pos`, if `pos` lies over the polygon
    pub fn get_poly_height(&self, tile: &MeshTile, poly_index: usize, pos: &[f32; 3]) -> Option<f32> {
        let poly = tile.polys.get(poly_index)?;
        if poly.is_off_mesh_connection() {
            return None;
        }
        let nv = poly.vert_count as usize;
        let verts = tile.poly_verts(poly);
        if !point_in_polygon(pos, &verts, nv) {
            return None;
        }

        match tile.detail_meshes.get(poly_index) {
            Some(pd) if pd.tri_count > 0 => {
                for t in 0..pd.tri_count as usize {
                    if let Some([a, b, c]) = tile.detail_triangle(poly_index, poly, t) {
                        if let Some(h) = closest_height_point_triangle(pos, &a, &b, &c) {
                            return Some(h);
                        }
                    }
                }
            }
            _ => {
                for j in 2..nv {
                    if let Some(h) = closest_height_point_triangle(
                        pos,
                        &verts[0..3],
                        &verts[(j - 1) * 3..j * 3],
                        &verts[j * 3..j * 3 + 3],
                    ) {
                        return Some(h);
                    }
                }
            }
        }

        // Point is on an edge between triangles; take the closest boundary height.
        Some(closest_point_on_edges(&verts, nv, pos)[1])
    }

    /// Closest point on the polygon to `pos` and whether `pos` is over the polygon.
    ///
    /// Off-mesh connections project onto their segment.
    pub fn closest_point_on_poly(
        &self,
        reference: PolyRef,
        pos: &[f32; 3],
    ) -> Result<([f32; 3], bool)> {
        let (tile, poly) = self.get_tile_and_poly_by_ref(reference)?;
        let (_, _, poly_index) = decode_poly_ref(reference);

        if let Some(h) = self.get_poly_height(tile, poly_index as usize, pos) {
            return Ok(([pos[0], h, pos[2]], true));
        }

        if poly.is_off_mesh_connection() {
            let v0 = tile.vertex(poly.verts[0]);
            let v1 = tile.vertex(poly.verts[1]);
            let (_, t) = dist_pt_seg_sqr_2d(pos, &v0, &v1);
            return Ok((vlerp(&v0, &v1, t), false));
        }

        let verts = tile.poly_verts(poly);
        Ok((
            closest_point_on_edges(&verts, poly.vert_count as usize, pos),
            false,
        ))
    }

    /// Polygons of `tile` whose bounds overlap the box, without filtering.
    ///
    /// Uses the BV tree when the tile has one, otherwise scans the ground polygons.
    pub fn query_polygons_in_tile(
        &self,
        tile: &MeshTile,
        qmin: &[f32; 3],
        qmax: &[f32; 3],
    ) -> Vec<PolyRef> {
        let mut result = Vec::new();
        let Some(header) = tile.header.as_ref() else {
            return result;
        };

        if !tile.bv_tree.is_empty() {
            let tbmin = header.bmin;
            let tbmax = header.bmax;
            let qfac = header.bv_quant_factor;
            let mut bmin = [0u16; 3];
            let mut bmax = [0u16; 3];
            for k in 0..3 {
                let lo = qmin[k].clamp(tbmin[k], tbmax[k]) - tbmin[k];
                let hi = qmax[k].clamp(tbmin[k], tbmax[k]) - tbmin[k];
                bmin[k] = ((qfac * lo) as i32 & 0x7fff_fffe).min(0xffff) as u16;
                bmax[k] = (((qfac * hi + 1.0) as i32) | 1).min(0xffff) as u16;
            }

            let end = tile.bv_tree.len();
            let mut node_index = 0usize;
            while node_index < end {
                let node = &tile.bv_tree[node_index];
                let overlap = overlap_quant_bounds(&bmin, &bmax, &node.bmin, &node.bmax);
                let is_leaf = node.i >= 0;
                if is_leaf && overlap {
                    result.push(tile.poly_ref(node.i as usize));
                }
                if overlap || is_leaf {
                    node_index += 1;
                } else {
                    node_index += (-node.i) as usize;
                }
            }
        } else {
            for (i, poly) in tile.polys.iter().enumerate() {
                if poly.is_off_mesh_connection() {
                    continue;
                }
                let (pmin, pmax) = poly_bounds(tile, poly);
                if overlap_bounds(qmin, qmax, &pmin, &pmax) {
                    result.push(tile.poly_ref(i));
                }
            }
        }

        result
    }

    /// Nearest polygon of one tile to `center` within `half_extents`
    fn find_nearest_poly_in_tile(
        &self,
        tile: &MeshTile,
        center: &[f32; 3],
        half_extents: &[f32; 3],
    ) -> Option<(PolyRef, [f32; 3])> {
        let bmin = [
            center[0] - half_extents[0],
            center[1] - half_extents[1],
            center[2] - half_extents[2],
        ];
        let bmax = [
            center[0] + half_extents[0],
            center[1] + half_extents[1],
            center[2] + half_extents[2],
        ];

        let climb = tile.walkable_climb();
        let mut nearest: Option<(PolyRef, [f32; 3])> = None;
        let mut nearest_dist_sqr = f32::MAX;
        for reference in self.query_polygons_in_tile(tile, &bmin, &bmax) {
            let Ok((closest, over_poly)) = self.closest_point_on_poly(reference, center) else {
                continue;
            };
            let d = nearest_distance_sqr(center, &closest, over_poly, climb);
            if d < nearest_dist_sqr {
                nearest_dist_sqr = d;
                nearest = Some((reference, closest));
            }
        }
        nearest
    }

    /// Links polygons of the same tile through their shared edges
    fn connect_int_links(&mut self, idx: usize) {
        let tile = &mut self.tiles[idx];
        for i in 0..tile.polys.len() {
            tile.polys[i].first_link = None;
            if tile.polys[i].is_off_mesh_connection() {
                continue;
            }
            // Reverse order so the list reads in edge order
            for j in (0..tile.polys[i].vert_count as usize).rev() {
                let nei = tile.polys[i].neighbors[j];
                if nei == 0 || nei & EXT_LINK != 0 {
                    continue;
                }
                let reference = tile.poly_ref((nei - 1) as usize);
                tile.push_link(i, Link::new(reference, j as u8, LINK_SIDE_INTERNAL));
            }
        }
    }

    /// Connects the start of each off-mesh connection to the tile's surface
    fn base_off_mesh_links(&mut self, idx: usize) {
        let tile = &self.tiles[idx];
        let climb = tile.walkable_climb();
        let mut snaps = Vec::new();
        for con in &tile.off_mesh_cons {
            let ext = [con.radius, climb, con.radius];
            let p = con.start_pos();
            let Some((reference, nearest)) = self.find_nearest_poly_in_tile(tile, &p, &ext)
            else {
                continue;
            };
            let dx = nearest[0] - p[0];
            let dz = nearest[2] - p[2];
            if dx * dx + dz * dz > con.radius * con.radius {
                continue;
            }
            snaps.push((con.poly as usize, reference, nearest));
        }

        let tile = &mut self.tiles[idx];
        for (poly_index, land_ref, nearest) in snaps {
            let v = tile.polys[poly_index].verts[0] as usize;
            tile.verts[v * 3..v * 3 + 3].copy_from_slice(&nearest);

            tile.push_link(poly_index, Link::new(land_ref, 0, LINK_SIDE_INTERNAL));

            // Start always connects back to the connection
            let (_, _, land_index) = decode_poly_ref(land_ref);
            let con_ref = tile.poly_ref(poly_index);
            tile.push_link(
                land_index as usize,
                Link::new(con_ref, 0xff, LINK_SIDE_INTERNAL),
            );
        }
    }

    /// Lands the end points of `target`'s off-mesh connections on `tile`
    fn connect_ext_off_mesh_links(&mut self, idx: usize, target_idx: usize, side: Option<u8>) {
        let opposite = side.map_or(LINK_SIDE_INTERNAL, opposite_side);
        let tile = &self.tiles[idx];
        let target = &self.tiles[target_idx];
        let climb = target.walkable_climb();

        let mut snaps = Vec::new();
        for con in &target.off_mesh_cons {
            if con.side != opposite {
                continue;
            }
            // Skip connections whose start could not be connected
            if target.polys[con.poly as usize].first_link.is_none() {
                continue;
            }
            let ext = [con.radius, climb, con.radius];
            let p = con.end_pos();
            let Some((reference, nearest)) = self.find_nearest_poly_in_tile(tile, &p, &ext)
            else {
                continue;
            };
            let dx = nearest[0] - p[0];
            let dz = nearest[2] - p[2];
            if dx * dx + dz * dz > con.radius * con.radius {
                continue;
            }
            snaps.push((
                con.poly as usize,
                reference,
                nearest,
                con.is_bidirectional(),
            ));
        }

        for (poly_index, land_ref, nearest, bidir) in snaps {
            let target = &mut self.tiles[target_idx];
            let v = target.polys[poly_index].verts[1] as usize;
            target.verts[v * 3..v * 3 + 3].copy_from_slice(&nearest);
            target.push_link(poly_index, Link::new(land_ref, 1, opposite));
            let con_ref = target.poly_ref(poly_index);

            if bidir {
                let (_, _, land_index) = decode_poly_ref(land_ref);
                let back_side = side.unwrap_or(LINK_SIDE_INTERNAL);
                self.tiles[idx].push_link(land_index as usize, Link::new(con_ref, 0xff, back_side));
            }
        }
    }

    /// Connects `tile`'s portal edges facing `side` to matching edges of `target`
    fn connect_ext_links(&mut self, idx: usize, target_idx: usize, side: Option<u8>) {
        let tile = &self.tiles[idx];
        let target = &self.tiles[target_idx];

        let mut new_links = Vec::new();
        for (i, poly) in tile.polys.iter().enumerate() {
            let nv = poly.vert_count as usize;
            for j in 0..nv {
                if poly.neighbors[j] & EXT_LINK == 0 {
                    continue;
                }
                let dir = (poly.neighbors[j] & 0xff) as u8;
                if side.is_some_and(|s| s != dir) {
                    continue;
                }

                let va = tile.vertex(poly.verts[j]);
                let vb = tile.vertex(poly.verts[(j + 1) % nv]);
                for (reference, cmin, cmax) in
                    find_connecting_polys(&va, &vb, target, opposite_side(dir))
                {
                    let mut link = Link::new(reference, j as u8, dir);
                    let axis = match dir {
                        0 | 4 => Some(2),
                        2 | 6 => Some(0),
                        _ => None,
                    };
                    if let Some(k) = axis {
                        let mut tmin = (cmin - va[k]) / (vb[k] - va[k]);
                        let mut tmax = (cmax - va[k]) / (vb[k] - va[k]);
                        if tmin > tmax {
                            std::mem::swap(&mut tmin, &mut tmax);
                        }
                        link.bmin = (tmin.clamp(0.0, 1.0) * 255.0).round() as u8;
                        link.bmax = (tmax.clamp(0.0, 1.0) * 255.0).round() as u8;
                    }
                    new_links.push((i, link));
                }
            }
        }

        let tile = &mut self.tiles[idx];
        for (poly_index, link) in new_links {
            tile.push_link(poly_index, link);
        }
    }
}

/// Squared distance used to rank nearest polygon candidates.
///
/// A point directly over a polygon and within climb height counts as distance 0.
pub(crate) fn nearest_distance_sqr(
    center: &[f32; 3],
    closest: &[f32; 3],
    over_poly: bool,
    walkable_climb: f32,
) -> f32 {
    let diff = [
        center[0] - closest[0],
        center[1] - closest[1],
        center[2] - closest[2],
    ];
    if over_poly {
        let d = diff[1].abs() - walkable_climb;
        if d > 0.0 {
            d * d
        } else {
            0.0
        }
    } else {
        diff[0] * diff[0] + diff[1] * diff[1] + diff[2] * diff[2]
    }
}

/// Closest point to `pos` on the boundary of a polygon
pub(crate) fn closest_point_on_edges(verts: &[f32], nv: usize, pos: &[f32; 3]) -> [f32; 3] {
    let (_, edge_dists, edge_ts) = distance_pt_poly_edges_sqr(pos, verts, nv);
    let mut imin = 0;
    for i in 1..nv {
        if edge_dists[i] < edge_dists[imin] {
            imin = i;
        }
    }
    let va = vert_at(verts, imin);
    let vb = vert_at(verts, (imin + 1) % nv);
    vlerp(&va, &vb, edge_ts[imin])
}

/// World space bounds of a polygon
pub(crate) fn poly_bounds(tile: &MeshTile, poly: &Poly) -> ([f32; 3], [f32; 3]) {
    let mut bmin = tile.vertex(poly.verts[0]);
    let mut bmax = bmin;
    for j in 1..poly.vert_count as usize {
        let v = tile.vertex(poly.verts[j]);
        for k in 0..3 {
            bmin[k] = bmin[k].min(v[k]);
            bmax[k] = bmax[k].max(v[k]);
        }
    }
    (bmin, bmax)
}

fn slab_coord(v: &[f32; 3], side: u8) -> f32 {
    match side {
        0 | 4 => v[0],
        2 | 6 => v[2],
        _ => 0.0,
    }
}

/// Edge end points projected onto the portal plane as (along, height)
fn calc_slab_end_points(va: &[f32; 3], vb: &[f32; 3], side: u8) -> ([f32; 2], [f32; 2]) {
    let k = match side {
        0 | 4 => 2,
        2 | 6 => 0,
        _ => return ([0.0; 2], [0.0; 2]),
    };
    if va[k] < vb[k] {
        ([va[k], va[1]], [vb[k], vb[1]])
    } else {
        ([vb[k], vb[1]], [va[k], va[1]])
    }
}

fn overlap_slabs(amin: &[f32; 2], amax: &[f32; 2], bmin: &[f32; 2], bmax: &[f32; 2], px: f32, py: f32) -> bool {
    // Horizontal overlap, shrunk by px so touching ends do not link
    let minx = (amin[0] + px).max(bmin[0] + px);
    let maxx = (amax[0] - px).min(bmax[0] - px);
    if minx > maxx {
        return false;
    }

    // Vertical overlap over the shared span
    let ad = (amax[1] - amin[1]) / (amax[0] - amin[0]);
    let ak = amin[1] - ad * amin[0];
    let bd = (bmax[1] - bmin[1]) / (bmax[0] - bmin[0]);
    let bk = bmin[1] - bd * bmin[0];
    let aminy = ad * minx + ak;
    let amaxy = ad * maxx + ak;
    let bminy = bd * minx + bk;
    let bmaxy = bd * maxx + bk;
    let dmin = bminy - aminy;
    let dmax = bmaxy - amaxy;

    // Crossing segments always overlap
    if dmin * dmax < 0.0 {
        return true;
    }

    let thr = (py * 2.0) * (py * 2.0);
    dmin * dmin <= thr || dmax * dmax <= thr
}

/// Polygons of `target` with a portal edge on `side` that matches `va..vb`,
/// with the overlapping span along the edge
fn find_connecting_polys(
    va: &[f32; 3],
    vb: &[f32; 3],
    target: &MeshTile,
    side: u8,
) -> Vec<(PolyRef, f32, f32)> {
    let (amin, amax) = calc_slab_end_points(va, vb, side);
    let apos = slab_coord(va, side);
    let marker = EXT_LINK | side as u16;
    let climb = target.walkable_climb();

    let mut result = Vec::new();
    for (i, poly) in target.polys.iter().enumerate() {
        let nv = poly.vert_count as usize;
        for j in 0..nv {
            if poly.neighbors[j] != marker {
                continue;
            }
            let vc = target.vertex(poly.verts[j]);
            let vd = target.vertex(poly.verts[(j + 1) % nv]);
            if (apos - slab_coord(&vc, side)).abs() > 0.01 {
                continue;
            }
            let (bmin, bmax) = calc_slab_end_points(&vc, &vd, side);
            if !overlap_slabs(&amin, &amax, &bmin, &bmax, 0.01, climb) {
                continue;
            }
            result.push((
                target.poly_ref(i),
                amin[0].max(bmin[0]),
                amax[0].min(bmax[0]),
            ));
            break;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_mesh_helpers::*;

    #[test]
    fn test_poly_ref_encoding() {
        let reference = encode_poly_ref(5, 12, 345);
        assert_eq!(decode_poly_ref(reference), (5, 12, 345));
        assert!(encode_poly_ref(1, 0, 0).is_valid());
    }

    #[test]
    fn test_invalid_params() {
        let mut params = grid_params(1);
        params.tile_width = 0.0;
        assert!(matches!(NavMesh::new(params), Err(Error::InvalidParam(_))));

        let mut params = grid_params(1);
        params.max_tiles = 2048;
        assert!(NavMesh::new(params).is_err());

        let mut params = grid_params(1);
        params.origin[1] = f32::NAN;
        assert!(NavMesh::new(params).is_err());
    }

    #[test]
    fn test_internal_links() -> Result<()> {
        let mesh = create_grid_mesh()?;
        let tile = mesh.get_tile_at(0, 0, 0).expect("tile");
        // Centre polygon of the 3x3 grid has four neighbours
        let center = &tile.polys[4];
        let links: Vec<_> = tile.links_of(center).collect();
        assert_eq!(links.len(), 4);
        assert!(links.iter().all(|l| l.side == LINK_SIDE_INTERNAL));
        // Links are listed in edge order
        let edges: Vec<u8> = links.iter().map(|l| l.edge_index).collect();
        assert_eq!(edges, vec![0, 1, 2, 3]);

        // Corner polygon has two
        assert_eq!(tile.links_of(&tile.polys[0]).count(), 2);
        Ok(())
    }

    #[test]
    fn test_external_links_and_removal() -> Result<()> {
        let mut mesh = create_two_tile_mesh()?;
        let a = poly_ref_at(&mesh, 0, 0, 0);
        let b = poly_ref_at(&mesh, 1, 0, 0);

        let (tile_a, poly_a) = mesh.get_tile_and_poly_by_ref(a)?;
        let link = tile_a.links_of(poly_a).next().expect("portal link");
        assert_eq!(link.reference, b);
        assert_eq!(link.side, 0);
        assert_eq!((link.bmin, link.bmax), (0, 255));

        let (tile_b, poly_b) = mesh.get_tile_and_poly_by_ref(b)?;
        let back = tile_b.links_of(poly_b).next().expect("back link");
        assert_eq!(back.reference, a);
        assert_eq!(back.side, 4);

        // Removing B invalidates its refs and unlinks A
        let tile_b_ref = mesh.get_tile_ref(tile_b);
        mesh.remove_tile(tile_b_ref)?;
        assert!(!mesh.is_valid_poly_ref(b));
        let (tile_a, poly_a) = mesh.get_tile_and_poly_by_ref(a)?;
        assert_eq!(tile_a.links_of(poly_a).count(), 0);
        assert!(mesh.remove_tile(tile_b_ref).is_err());
        Ok(())
    }

    #[test]
    fn test_salt_changes_on_reuse() -> Result<()> {
        let mut mesh = NavMesh::new(grid_params(1))?;
        let first = mesh.add_tile(square_tile(0, 0, 0.0)?)?;
        mesh.remove_tile(first)?;
        let second = mesh.add_tile(square_tile(0, 0, 0.0)?)?;
        assert_ne!(first, second);
        assert!(!mesh.is_valid_poly_ref(first));
        assert!(mesh.is_valid_poly_ref(second));
        Ok(())
    }

    #[test]
    fn test_duplicate_tile_rejected() -> Result<()> {
        let mut mesh = NavMesh::new(grid_params(2))?;
        mesh.add_tile(square_tile(0, 0, 0.0)?)?;
        assert!(mesh.add_tile(square_tile(0, 0, 0.0)?).is_err());
        Ok(())
    }

    #[test]
    fn test_malformed_tile_rejected() -> Result<()> {
        let mut mesh = NavMesh::new(grid_params(2))?;

        let mut tile = square_tile(0, 0, 0.0)?;
        tile.polys[0].verts[0] = 999;
        assert!(matches!(mesh.add_tile(tile), Err(Error::InvalidMesh(_))));

        let mut tile = square_tile(0, 0, 0.0)?;
        tile.polys[0].vert_count = MAX_VERTS_PER_POLY as u8 + 1;
        assert!(matches!(mesh.add_tile(tile), Err(Error::InvalidMesh(_))));

        let mut tile = square_tile(0, 0, 0.0)?;
        tile.polys[0].vert_count = 2;
        assert!(matches!(mesh.add_tile(tile), Err(Error::InvalidMesh(_))));

        let mut tile = square_tile(0, 0, 0.0)?;
        tile.polys[0].neighbors[0] = 7;
        assert!(matches!(mesh.add_tile(tile), Err(Error::InvalidMesh(_))));

        let mut tile = square_tile(0, 0, 0.0)?;
        tile.detail_meshes.push(PolyDetail {
            tri_count: 1,
            ..PolyDetail::default()
        });
        assert!(matches!(mesh.add_tile(tile), Err(Error::InvalidMesh(_))));

        let mut tile = square_tile(0, 0, 0.0)?;
        tile.bv_tree = vec![BVNode {
            i: 5,
            ..BVNode::default()
        }];
        assert!(matches!(mesh.add_tile(tile), Err(Error::InvalidMesh(_))));

        // Rejected tiles leave no trace, so the slot is still free
        assert_eq!(mesh.tiles().count(), 0);
        let reference = mesh.add_tile(square_tile(0, 0, 0.0)?)?;
        assert!(reference.is_valid());

        let query = crate::NavMeshQuery::new(&mesh);
        let walls = query.get_poly_wall_segments(
            poly_ref_at(&mesh, 0, 0, 0),
            false,
            &crate::DefaultQueryFilter::default(),
        )?;
        assert_eq!(walls.len(), 4);
        Ok(())
    }

    #[test]
    fn test_partial_portal_link() -> Result<()> {
        let mesh = create_offset_tiles_mesh()?;
        let a = poly_ref_at(&mesh, 0, 0, 0);
        let (tile_a, poly_a) = mesh.get_tile_and_poly_by_ref(a)?;
        let link = tile_a.links_of(poly_a).next().expect("portal link");
        assert!(link.is_partial());
        // A's east edge runs from z=10 to z=0; the neighbour covers z in [5, 10]
        assert_eq!(link.bmin, 0);
        assert!(link.bmax == 127 || link.bmax == 128);

        let b = poly_ref_at(&mesh, 1, 0, 0);
        let (tile_b, poly_b) = mesh.get_tile_and_poly_by_ref(b)?;
        let back = tile_b.links_of(poly_b).next().expect("back link");
        assert!(!back.is_partial());
        Ok(())
    }

    #[test]
    fn test_poly_flags_and_area() -> Result<()> {
        let mut mesh = create_grid_mesh()?;
        let r = poly_ref_at(&mesh, 0, 0, 3);
        mesh.set_poly_flags(r, PolyFlags::SWIM)?;
        mesh.set_poly_area(r, 7)?;
        assert_eq!(mesh.get_poly_flags(r)?, PolyFlags::SWIM);
        assert_eq!(mesh.get_poly_area(r)?, 7);
        assert!(mesh.set_poly_flags(PolyRef::NULL, PolyFlags::WALK).is_err());
        Ok(())
    }

    #[test]
    fn test_closest_point_and_height() -> Result<()> {
        let mesh = create_grid_mesh()?;
        let r = poly_ref_at(&mesh, 0, 0, 0);
        let (p, over) = mesh.closest_point_on_poly(r, &[0.5, 3.0, 0.5])?;
        assert!(over);
        assert_eq!(p, [0.5, 0.0, 0.5]);

        let (p, over) = mesh.closest_point_on_poly(r, &[-1.0, 0.0, 0.5])?;
        assert!(!over);
        assert!((p[0] - 0.0).abs() < 1e-6 && (p[2] - 0.5).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_query_polygons_in_tile_bv_and_linear() -> Result<()> {
        let mesh = create_grid_mesh()?;
        let tile = mesh.get_tile_at(0, 0, 0).expect("tile");
        assert!(!tile.bv_tree.is_empty());
        let hits = mesh.query_polygons_in_tile(tile, &[1.2, -1.0, 1.2], &[1.8, 1.0, 1.8]);
        assert_eq!(hits, vec![tile.poly_ref(4)]);

        let mut linear = tile.clone();
        linear.bv_tree.clear();
        let hits = mesh.query_polygons_in_tile(&linear, &[1.2, -1.0, 1.2], &[1.8, 1.0, 1.8]);
        assert_eq!(hits, vec![tile.poly_ref(4)]);
        Ok(())
    }

    #[test]
    fn test_calc_tile_loc() -> Result<()> {
        let mesh = NavMesh::new(grid_params(4))?;
        assert_eq!(mesh.calc_tile_loc(&[15.0, 0.0, 3.0]), (1, 0));
        assert_eq!(mesh.calc_tile_loc(&[-0.5, 0.0, -0.5]), (-1, -1));
        Ok(())
    }

    #[cfg(feature = "serialization")]
    #[test]
    fn test_tile_serialization_json() -> Result<()> {
        let mesh = create_grid_mesh()?;
        let tile = mesh.get_tile_at(0, 0, 0).expect("tile");
        let json = serde_json::to_string(tile).expect("serialize");
        let restored: MeshTile = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored.polys, tile.polys);
        assert_eq!(restored.bv_tree, tile.bv_tree);
        Ok(())
    }
}
