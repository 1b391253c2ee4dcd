pub mod archive;
pub mod import;
pub mod obj_loader;

use std::path::Path;

use tracing::{debug, info};

use crate::config::{LayerConfig, PipelineConfig};
use crate::error::{PtexError, Result};
use crate::ingestion::import::ImportStats;
use crate::layer::TexturedMesh;
use crate::types::TexelFormat;

/// Result of the ingestion stage.
#[derive(Debug)]
pub struct IngestionResult {
    pub textured: TexturedMesh,
    /// Name of the layer the rest of the pipeline works on.
    pub layer: String,
    pub import: Option<ImportStats>,
    pub stats: IngestionStats,
}

/// Statistics about the ingested data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionStats {
    pub faces: usize,
    pub quads: usize,
    pub loops: usize,
    pub edges: usize,
    pub format: String,
    pub texel_bytes: usize,
}

/// Check the input mesh exists and is an OBJ file.
pub fn check_input(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(PtexError::Input(format!(
            "Input file not found: {}",
            path.display()
        )));
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    if ext != "obj" {
        return Err(PtexError::Input(format!(
            "Unsupported file format: .{ext}"
        )));
    }
    Ok(())
}

/// Run the full ingestion stage: load the mesh, then import the archive or
/// create a fresh layer.
pub fn ingest(config: &PipelineConfig) -> Result<IngestionResult> {
    // 1. Validate input
    check_input(&config.input)?;

    // 2. Load topology
    let mesh = obj_loader::load_obj(&config.input)?;
    info!(
        path = %config.input.display(),
        faces = mesh.face_count(),
        loops = mesh.loop_count(),
        "Loaded mesh"
    );
    let mut textured = TexturedMesh::new(mesh);

    // 3. Import or create the layer
    let (layer, import) = match &config.archive {
        Some(path) => {
            let (layer, stats) = textured.import_file(path)?;
            (layer.name().to_string(), Some(stats))
        }
        None => {
            create_layer(&mut textured, &config.layer)?;
            (config.layer.name.clone(), None)
        }
    };

    // 4. Compute stats
    let stats = compute_stats(&textured, &layer);
    debug!(
        faces = stats.faces,
        quads = stats.quads,
        edges = stats.edges,
        texel_bytes = stats.texel_bytes,
        "Ingestion stats"
    );

    Ok(IngestionResult {
        textured,
        layer,
        import,
        stats,
    })
}

/// Add a layer described by `config` and fill it.
pub fn create_layer(textured: &mut TexturedMesh, config: &LayerConfig) -> Result<()> {
    let format = TexelFormat::new(config.data_type, config.num_channels)?;
    let layer = textured.add_layer(&config.name, format, config.resolution)?;

    if let Some(color) = config.fill_color {
        for grid in layer.grids_mut() {
            grid.fill(&color)?;
        }
    }
    // The pattern wins over a fill colour.
    if config.pattern {
        textured.fill_layer_pattern(&config.name)?;
    }
    Ok(())
}

/// Compute summary statistics for `layer` on the ingested mesh.
pub fn compute_stats(textured: &TexturedMesh, layer: &str) -> IngestionStats {
    let mesh = &textured.mesh;
    let layer = textured.layer(layer);
    let texel_bytes = layer
        .map(|l| {
            l.grids()
                .iter()
                .filter(|g| g.is_allocated())
                .filter_map(|g| g.rect_bytes().ok())
                .sum::<usize>()
        })
        .unwrap_or(0);

    IngestionStats {
        faces: mesh.face_count(),
        quads: mesh.quad_count(),
        loops: mesh.loop_count(),
        edges: mesh.edge_count,
        format: layer.map(|l| l.format().to_string()).unwrap_or_default(),
        texel_bytes,
    }
}
