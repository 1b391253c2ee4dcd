use tracing::trace;

use crate::types::PolyMesh;

/// Filtering expects edges to bound one or two faces.
pub const MAX_ADJ_FACES: usize = 2;

/// Edge id → faces touching it.
///
/// Derived from the mesh once per filtering pass and never persisted.
#[derive(Debug, Clone, Default)]
pub struct EdgeAdjacency {
    slots: Vec<[Option<usize>; MAX_ADJ_FACES]>,
    dropped: usize,
}

impl EdgeAdjacency {
    /// Scan every face's loops once, filling the first empty slot of each
    /// loop's edge. Faces beyond the second on an edge are dropped.
    pub fn build(mesh: &PolyMesh) -> Self {
        let mut slots = vec![[None; MAX_ADJ_FACES]; mesh.edge_count];
        let mut dropped = 0;

        for (face_index, face) in mesh.faces.iter().enumerate() {
            for offset in 0..face.loop_count {
                let edge = mesh.loop_edge(face, offset) as usize;
                let Some(entry) = slots.get_mut(edge) else {
                    trace!(edge, face = face_index, "Loop edge out of range, ignored");
                    dropped += 1;
                    continue;
                };
                match entry.iter_mut().find(|slot| slot.is_none()) {
                    Some(slot) => *slot = Some(face_index),
                    None => {
                        trace!(edge, face = face_index, "Non-manifold edge, face dropped");
                        dropped += 1;
                    }
                }
            }
        }

        Self { slots, dropped }
    }

    /// The face on the other side of `edge` from `face`.
    ///
    /// `None` for boundary edges and when `face` does not touch `edge`.
    pub fn other_face(&self, edge: usize, face: usize) -> Option<usize> {
        let slots = self.slots.get(edge)?;
        let i = slots.iter().position(|&slot| slot == Some(face))?;
        slots[MAX_ADJ_FACES - i - 1]
    }

    /// Faces recorded for `edge`.
    pub fn faces(&self, edge: usize) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .get(edge)
            .into_iter()
            .flat_map(|slots| slots.iter().flatten().copied())
    }

    /// Number of edges indexed, matching the mesh it was built from.
    pub fn edge_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of (edge, face) entries that did not fit.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_strip_neighbours() {
        let mesh = PolyMesh::from_polygons(&[vec![0, 3, 4, 1], vec![1, 4, 5, 2]]).unwrap();
        let adj = EdgeAdjacency::build(&mesh);
        let shared = mesh.loops[2].edge as usize;

        assert_eq!(adj.other_face(shared, 0), Some(1));
        assert_eq!(adj.other_face(shared, 1), Some(0));
        assert_eq!(adj.edge_count(), 7);
        assert_eq!(adj.dropped(), 0);
    }

    #[test]
    fn single_face_boundary() {
        let mesh = PolyMesh::from_polygons(&[vec![0, 1, 2, 3]]).unwrap();
        let adj = EdgeAdjacency::build(&mesh);
        for edge in 0..mesh.edge_count {
            assert_eq!(adj.other_face(edge, 0), None);
            assert_eq!(adj.faces(edge).collect::<Vec<_>>(), vec![0]);
        }
    }

    #[test]
    fn face_not_on_edge() {
        let mesh = PolyMesh::from_polygons(&[vec![0, 1, 2], vec![3, 4, 5]]).unwrap();
        let adj = EdgeAdjacency::build(&mesh);
        assert_eq!(adj.other_face(0, 1), None);
        assert_eq!(adj.other_face(99, 0), None);
    }

    #[test]
    fn tolerated_degenerate_input_third_face_dropped() {
        // Three triangles fanning off the edge 0-1.
        let mesh =
            PolyMesh::from_polygons(&[vec![0, 1, 2], vec![1, 0, 3], vec![0, 1, 4]]).unwrap();
        let adj = EdgeAdjacency::build(&mesh);
        let shared = mesh.loops[0].edge as usize;

        assert_eq!(adj.faces(shared).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(adj.other_face(shared, 0), Some(1));
        assert_eq!(adj.other_face(shared, 2), None);
        assert_eq!(adj.dropped(), 1);
    }
}
