use std::path::Path;

use tracing::debug;

use crate::error::{PtexError, Result};
use crate::types::PolyMesh;

/// Polygons are kept as authored so quads stay quads.
fn load_options() -> tobj::LoadOptions {
    tobj::LoadOptions {
        single_index: false,
        triangulate: false,
        ignore_points: true,
        ignore_lines: true,
        ..Default::default()
    }
}

/// Load the face topology of an OBJ file. Materials and attributes are
/// ignored; all models are merged into one mesh.
pub fn load_obj(path: &Path) -> Result<PolyMesh> {
    let (models, _materials) = tobj::load_obj(path, &load_options())
        .map_err(|e| PtexError::Input(format!("Failed to load OBJ: {e}")))?;

    debug!(model_count = models.len(), "Loaded OBJ models");

    let polygons = collect_polygons(&models)?;
    PolyMesh::from_polygons(&polygons)
}

/// Split each model's index buffer by face arity, offsetting vertex ids so
/// models do not share vertices.
fn collect_polygons(models: &[tobj::Model]) -> Result<Vec<Vec<u32>>> {
    let mut polygons = Vec::new();
    let mut vertex_offset = 0u32;

    for model in models {
        let mesh = &model.mesh;
        let mut start = 0usize;

        if mesh.face_arities.is_empty() {
            // tobj leaves arities empty when every face is a triangle.
            for tri in mesh.indices.chunks(3) {
                polygons.push(tri.iter().map(|&i| i + vertex_offset).collect());
            }
        } else {
            for &arity in &mesh.face_arities {
                let end = start + arity as usize;
                let face = mesh.indices.get(start..end).ok_or_else(|| {
                    PtexError::Input(format!(
                        "model {} face arities exceed {} indices",
                        model.name,
                        mesh.indices.len()
                    ))
                })?;
                polygons.push(face.iter().map(|&i| i + vertex_offset).collect());
                start = end;
            }
        }

        let vertex_count = u32::try_from(mesh.positions.len() / 3)
            .map_err(|_| PtexError::Input(format!("model {} is too large", model.name)))?;
        vertex_offset += vertex_count;
    }

    Ok(polygons)
}
