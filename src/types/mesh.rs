use std::collections::HashMap;

use crate::error::{PtexError, Result};

/// A polygon: a contiguous run of loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Face {
    pub loop_start: usize,
    pub loop_count: usize,
}

impl Face {
    /// Loop index of the corner `offset` steps around the face (wrapping).
    pub fn loop_at(&self, offset: usize) -> usize {
        self.loop_start + offset % self.loop_count
    }

    /// Offset of the previous corner.
    pub fn prev_offset(&self, offset: usize) -> usize {
        (self.loop_count + offset - 1) % self.loop_count
    }

    /// Offset of the next corner.
    pub fn next_offset(&self, offset: usize) -> usize {
        (offset + 1) % self.loop_count
    }

    pub fn is_quad(&self) -> bool {
        self.loop_count == 4
    }
}

/// A face corner: the vertex it sits on and the edge leaving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Loop {
    pub vertex: u32,
    pub edge: u32,
}

/// Read-only polygon mesh topology.
///
/// Loop `i` of a face owns the edge from its vertex to the vertex of loop
/// `i + 1`, so consistently wound neighbours traverse a shared edge in
/// opposite directions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolyMesh {
    pub faces: Vec<Face>,
    pub loops: Vec<Loop>,
    pub edge_count: usize,
}

impl PolyMesh {
    /// Build topology from per-face vertex lists.
    ///
    /// Edges are identified by unordered vertex pairs and numbered in order
    /// of first appearance.
    pub fn from_polygons<P: AsRef<[u32]>>(polygons: &[P]) -> Result<Self> {
        let mut edge_ids: HashMap<(u32, u32), u32> = HashMap::new();
        let mut faces = Vec::with_capacity(polygons.len());
        let mut loops = Vec::new();

        for (face_index, polygon) in polygons.iter().enumerate() {
            let verts = polygon.as_ref();
            if verts.len() < 3 {
                return Err(PtexError::Topology(format!(
                    "face {face_index} has {} corners, need at least 3",
                    verts.len()
                )));
            }

            faces.push(Face {
                loop_start: loops.len(),
                loop_count: verts.len(),
            });

            for (i, &va) in verts.iter().enumerate() {
                let vb = verts[(i + 1) % verts.len()];
                let key = if va < vb { (va, vb) } else { (vb, va) };
                let next_id = edge_ids.len() as u32;
                let edge = *edge_ids.entry(key).or_insert(next_id);
                loops.push(Loop { vertex: va, edge });
            }
        }

        Ok(Self {
            faces,
            loops,
            edge_count: edge_ids.len(),
        })
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn loop_count(&self) -> usize {
        self.loops.len()
    }

    pub fn quad_count(&self) -> usize {
        self.faces.iter().filter(|f| f.is_quad()).count()
    }

    /// Edge id of the loop `offset` steps into `face`.
    pub fn loop_edge(&self, face: &Face, offset: usize) -> u32 {
        self.loops[face.loop_at(offset)].edge
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}
