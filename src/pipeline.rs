use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::info;

use crate::config::PipelineConfig;
use crate::error::{PtexError, Result};
use crate::ingestion::archive::DirectoryArchive;
use crate::ingestion::{self, IngestionResult};
use crate::tiling::atlas_writer;
use crate::tiling::layout::GuillotinePacker;
use crate::tiling::primitives::{AverageBlender, FilterResampler, Primitives};

/// Summary of a completed pipeline run.
#[derive(Debug)]
pub struct ProcessingResult {
    pub loops: usize,
    pub atlas_size: (u32, u32),
    pub atlas_path: Option<PathBuf>,
    pub archive_path: Option<PathBuf>,
    pub duration: Duration,
}

/// Pipeline orchestrator: ingest, resize, pack, export.
pub struct Pipeline;

impl Pipeline {
    /// Run the full pipeline.
    pub fn run(config: &PipelineConfig) -> Result<ProcessingResult> {
        let start = Instant::now();

        info!(input = %config.input.display(), "Starting pipeline");

        if config.dry_run {
            info!("--dry-run: loading inputs only");
            let ingestion_result = ingestion::ingest(config)?;
            print_dry_run_summary(&ingestion_result);
            return Ok(ProcessingResult {
                loops: ingestion_result.stats.loops,
                atlas_size: (0, 0),
                atlas_path: None,
                archive_path: None,
                duration: start.elapsed(),
            });
        }

        let resampler = FilterResampler::default();
        let blender = AverageBlender;
        let solver = GuillotinePacker {
            max_size: config.atlas.max_size,
        };
        let prims = Primitives {
            resampler: &resampler,
            blender: &blender,
            solver: &solver,
        };

        info!("Stage 1/4: Ingestion");
        let IngestionResult {
            mut textured,
            layer: layer_name,
            ..
        } = ingestion::ingest(config)?;

        let (mesh, layer) = textured
            .mesh_and_layer_mut(&layer_name)
            .ok_or_else(|| PtexError::Input(format!("no layer named {layer_name}")))?;
        let format = layer.format();

        if let Some(logres) = config.resize {
            info!(resolution = %logres, "Stage 2/4: Resize");
            layer.resize_all(logres, prims.resampler)?;
        } else {
            info!("Stage 2/4: Resize (skipped)");
        }

        info!("Stage 3/4: Packing");
        let atlas = layer.get_or_build_display_image(mesh, &prims, &config.atlas)?;
        let atlas_size = atlas.dimensions();

        info!(output = %config.output.display(), "Stage 4/4: Export");
        let output = atlas_writer::write_atlas(
            atlas,
            &layer_name,
            format,
            &config.output,
            config.output_format,
        )?;

        let archive_path = if config.export_archive {
            let path = config.output.join(format!("{layer_name}_archive"));
            DirectoryArchive::write(&path, mesh, layer)?;
            Some(path)
        } else {
            None
        };

        let duration = start.elapsed();
        info!(
            loops = mesh.loop_count(),
            width = atlas_size.0,
            height = atlas_size.1,
            elapsed = ?duration,
            "Pipeline complete"
        );

        Ok(ProcessingResult {
            loops: mesh.loop_count(),
            atlas_size,
            atlas_path: Some(output.image_path),
            archive_path,
            duration,
        })
    }
}

/// Print dry-run summary with mesh and layer stats.
fn print_dry_run_summary(ingestion: &IngestionResult) {
    let stats = &ingestion.stats;
    println!("=== Dry Run Summary ===");
    println!("  Faces:     {}", stats.faces);
    println!("  Quads:     {}", stats.quads);
    println!("  Loops:     {}", stats.loops);
    println!("  Edges:     {}", stats.edges);
    println!("  Layer:     {} ({})", ingestion.layer, stats.format);
    println!("  Texels:    {} bytes", stats.texel_bytes);
    if let Some(import) = &ingestion.import {
        println!(
            "  Archive:   {} subimages read, {} unused",
            import.subimages_read, import.unused_subimages
        );
    }
}
