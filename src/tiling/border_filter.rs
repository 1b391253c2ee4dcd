//! Seam filtering across packed grid borders.
//!
//! Each loop's grid has four sides. Texel `(0, 0)` sits at the face centre
//! and texel `(w-1, h-1)` at the loop's vertex, so:
//!
//! * BOTTOM and LEFT touch the neighbouring quadrants of the same face,
//! * TOP lies on the mesh edge leaving the loop's vertex,
//! * RIGHT lies on the mesh edge arriving at it.
//!
//! Sides are walked counter-clockwise around the grid, which makes a shared
//! border run in opposite directions on its two grids when faces are wound
//! consistently. Resolution therefore always reports `reverse = true`.

use tracing::{debug, trace};

use crate::error::Result;
use crate::tiling::adjacency::EdgeAdjacency;
use crate::tiling::atlas_packer::AtlasImage;
use crate::tiling::primitives::BorderBlender;
use crate::types::{AtlasRegion, PolyMesh};

/// One side of a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Bottom = 0,
    Left = 1,
    Top = 2,
    Right = 3,
}

impl Side {
    /// Order in which sides are resolved and handed to the blender.
    pub const ALL: [Side; 4] = [Side::Bottom, Side::Left, Side::Top, Side::Right];

    /// Number of texels along this side of `rect`.
    pub fn len(self, rect: &AtlasRegion) -> u32 {
        match self {
            Side::Bottom | Side::Top => rect.width,
            Side::Left | Side::Right => rect.height,
        }
    }

    /// Number of texels from this side across to the opposite one.
    pub fn depth(self, rect: &AtlasRegion) -> u32 {
        match self {
            Side::Bottom | Side::Top => rect.height,
            Side::Left | Side::Right => rect.width,
        }
    }

    /// Absolute atlas position of the `t`-th texel walking this side
    /// counter-clockwise.
    pub fn texel(self, rect: &AtlasRegion, t: u32) -> (u32, u32) {
        let (w, h) = (rect.width, rect.height);
        let (x, y) = match self {
            Side::Bottom => (t, 0),
            Side::Right => (w - 1, t),
            Side::Top => (w - 1 - t, h - 1),
            Side::Left => (0, h - 1 - t),
        };
        (rect.x + x, rect.y + y)
    }
}

/// Which side of the adjacent grid touches, and in which direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdjacentEdge {
    pub side: Side,
    pub reverse: bool,
}

/// Loop and side on the other side of `side` of the loop at `loop_offset`
/// within `face_index`.
///
/// Boundary edges, and neighbours whose loops do not mention the shared
/// edge, resolve to the loop itself with the same side.
pub fn resolve_adjacent(
    mesh: &PolyMesh,
    adjacency: &EdgeAdjacency,
    face_index: usize,
    loop_offset: usize,
    side: Side,
) -> (usize, AdjacentEdge) {
    let face = &mesh.faces[face_index];
    debug_assert!(loop_offset < face.loop_count);

    let edge = |side| AdjacentEdge {
        side,
        reverse: true,
    };

    match side {
        Side::Bottom => (
            face.loop_at(face.prev_offset(loop_offset)),
            edge(Side::Left),
        ),
        Side::Left => (
            face.loop_at(face.next_offset(loop_offset)),
            edge(Side::Bottom),
        ),
        Side::Top | Side::Right => {
            let self_ref = (face.loop_at(loop_offset), edge(side));

            let e1_offset = if side == Side::Top {
                loop_offset
            } else {
                face.prev_offset(loop_offset)
            };
            let e1 = mesh.loop_edge(face, e1_offset);

            let Some(other_index) = adjacency.other_face(e1 as usize, face_index) else {
                return self_ref;
            };
            let other = &mesh.faces[other_index];

            // Assumes the neighbour is wound consistently with this face.
            match (0..other.loop_count).find(|&i| mesh.loop_edge(other, i) == e1) {
                Some(i) if side == Side::Top => {
                    (other.loop_at(other.next_offset(i)), edge(Side::Right))
                }
                Some(i) => (other.loop_at(i), edge(Side::Top)),
                None => {
                    trace!(
                        face = face_index,
                        other = other_index,
                        edge = e1,
                        "Shared edge missing from neighbour, using self"
                    );
                    self_ref
                }
            }
        }
    }
}

/// Summary of a filtering pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub loops: usize,
    /// Sides that resolved to their own loop.
    pub self_adjacent_sides: usize,
}

/// Blend every loop's borders with its neighbours, in place.
///
/// All reads come from one snapshot taken before any blending, so the
/// result does not depend on the order loops are visited in.
pub fn filter_borders(
    atlas: &mut AtlasImage,
    mesh: &PolyMesh,
    blender: &dyn BorderBlender,
) -> Result<FilterStats> {
    let adjacency = EdgeAdjacency::build(mesh);
    if adjacency.dropped() > 0 {
        debug!(
            dropped = adjacency.dropped(),
            "Tolerating non-manifold edges while filtering"
        );
    }

    let snapshot = atlas.buf.clone();
    let mut stats = FilterStats::default();

    for (face_index, face) in mesh.faces.iter().enumerate() {
        for offset in 0..face.loop_count {
            let cur_loop = face.loop_at(offset);
            let dst_rect = atlas.regions[cur_loop];

            let adjacent = Side::ALL.map(|side| {
                let (adj_loop, adj_edge) =
                    resolve_adjacent(mesh, &adjacency, face_index, offset, side);
                if adj_loop == cur_loop && adj_edge.side == side {
                    stats.self_adjacent_sides += 1;
                }
                (atlas.regions[adj_loop], adj_edge)
            });

            blender.blend_borders(&mut atlas.buf, &snapshot, dst_rect, &adjacent)?;
            stats.loops += 1;
        }
    }

    debug!(
        loops = stats.loops,
        edges = adjacency.edge_count(),
        self_adjacent = stats.self_adjacent_sides,
        "Borders filtered"
    );
    Ok(stats)
}
