pub mod grid;

use std::path::Path;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::AtlasConfig;
use crate::error::{PtexError, Result};
use crate::ingestion::archive::{DirectoryArchive, SubimageArchive};
use crate::ingestion::import::{ImportStats, import_grids};
use crate::tiling::atlas_packer::{AtlasImage, pack_loops, update_grids_from_atlas};
use crate::tiling::primitives::{Primitives, Resampler};
use crate::types::{LogResolution, PolyMesh, TexelFormat};

pub use grid::{DEFAULT_COLOR, TexelGrid};

/// Whether every grid of a layer was filled.
///
/// A failed import leaves its layer `Incomplete` in the mesh so the caller
/// can discard it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerStatus {
    Complete,
    Incomplete,
}

/// The packed atlas shown for a layer.
///
/// Freeing the buffer keeps the resource; the next request repacks into it.
#[derive(Debug, Clone)]
pub struct DisplayImage {
    name: String,
    atlas: Option<AtlasImage>,
    builds: u32,
}

impl DisplayImage {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            atlas: None,
            builds: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn atlas(&self) -> Option<&AtlasImage> {
        self.atlas.as_ref()
    }

    /// Mutable access to the packed buffer, for painting into it before
    /// [`PtexLayer::update_from_image`].
    pub fn atlas_mut(&mut self) -> Option<&mut AtlasImage> {
        self.atlas.as_mut()
    }

    pub fn has_buffer(&self) -> bool {
        self.atlas.is_some()
    }

    /// How many times a buffer has been assigned.
    pub fn builds(&self) -> u32 {
        self.builds
    }

    fn free_buffers(&mut self) {
        self.atlas = None;
    }

    fn assign(&mut self, atlas: AtlasImage) {
        self.atlas = Some(atlas);
        self.builds += 1;
    }
}

/// One named texture: a grid per mesh loop, all of one format.
#[derive(Debug, Clone)]
pub struct PtexLayer {
    name: String,
    format: TexelFormat,
    grids: Vec<TexelGrid>,
    display: Option<DisplayImage>,
    status: LayerStatus,
}

impl PtexLayer {
    /// Layer whose grids are all allocated at `logres` with the default colour.
    pub fn filled(
        name: &str,
        format: TexelFormat,
        loop_count: usize,
        logres: LogResolution,
    ) -> Result<Self> {
        let grids = (0..loop_count)
            .map(|_| TexelGrid::new(format, logres))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            name: name.to_string(),
            format,
            grids,
            display: None,
            status: LayerStatus::Complete,
        })
    }

    /// Layer of unallocated grids waiting to be imported.
    pub fn placeholder(name: &str, format: TexelFormat, loop_count: usize) -> Self {
        Self {
            name: name.to_string(),
            format,
            grids: vec![TexelGrid::unallocated(format); loop_count],
            display: None,
            status: LayerStatus::Incomplete,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> TexelFormat {
        self.format
    }

    pub fn status(&self) -> LayerStatus {
        self.status
    }

    pub fn is_complete(&self) -> bool {
        self.status == LayerStatus::Complete
    }

    pub fn grids(&self) -> &[TexelGrid] {
        &self.grids
    }

    /// Direct grid access. Call [`mark_for_update`](Self::mark_for_update)
    /// after editing texels.
    pub fn grids_mut(&mut self) -> &mut [TexelGrid] {
        &mut self.grids
    }

    pub fn display(&self) -> Option<&DisplayImage> {
        self.display.as_ref()
    }

    pub fn display_mut(&mut self) -> Option<&mut DisplayImage> {
        self.display.as_mut()
    }

    pub(crate) fn set_status(&mut self, status: LayerStatus) {
        self.status = status;
    }

    /// Drop the display buffer so the next request repacks.
    pub fn mark_for_update(&mut self) {
        if let Some(display) = &mut self.display {
            display.free_buffers();
            debug!(layer = %self.name, "Display image marked for update");
        }
    }

    /// The current atlas, packing it first if there is no buffer.
    ///
    /// On failure the display image keeps whatever it had.
    pub fn get_or_build_display_image(
        &mut self,
        mesh: &PolyMesh,
        prims: &Primitives<'_>,
        config: &AtlasConfig,
    ) -> Result<&AtlasImage> {
        let display = self
            .display
            .get_or_insert_with(|| DisplayImage::new(&self.name));

        if display.atlas.is_none() {
            let atlas = pack_loops(mesh, &self.grids, prims, config)?;
            display.assign(atlas);
            let builds = display.builds;
            debug!(layer = %self.name, builds, "Display image built");
        }

        display
            .atlas
            .as_ref()
            .ok_or_else(|| PtexError::Primitive(format!("layer {} has no atlas", self.name)))
    }

    /// Copy the display atlas, edits included, back into the grids.
    pub fn update_from_image(&mut self) -> Result<usize> {
        let atlas = self
            .display
            .as_ref()
            .and_then(|d| d.atlas.as_ref())
            .ok_or_else(|| {
                PtexError::Primitive(format!("layer {} has no display atlas", self.name))
            })?;
        update_grids_from_atlas(atlas, &mut self.grids)
    }

    /// Resample one grid and invalidate the display.
    pub fn resize_grid(
        &mut self,
        loop_index: usize,
        logres: LogResolution,
        resampler: &dyn Resampler,
    ) -> Result<()> {
        let grid = self.grids.get_mut(loop_index).ok_or_else(|| {
            PtexError::Input(format!("layer {} has no loop {loop_index}", self.name))
        })?;
        grid.resize(logres, resampler)?;
        self.mark_for_update();
        Ok(())
    }

    /// Resample every allocated grid to `logres`, in parallel.
    ///
    /// Grids that resized before an error keep their new size.
    pub fn resize_all(&mut self, logres: LogResolution, resampler: &dyn Resampler) -> Result<()> {
        let result = self
            .grids
            .par_iter_mut()
            .filter(|g| g.is_allocated())
            .try_for_each(|grid| grid.resize(logres, resampler));
        self.mark_for_update();
        result
    }

    /// Fill each grid with the debug pattern for its corner.
    pub fn fill_pattern(&mut self, mesh: &PolyMesh) -> Result<()> {
        for face in &mesh.faces {
            for offset in 0..face.loop_count {
                if let Some(grid) = self.grids.get_mut(face.loop_at(offset)) {
                    grid.fill_pattern(offset)?;
                }
            }
        }
        self.mark_for_update();
        Ok(())
    }
}

/// A mesh plus the texture layers painted on it.
#[derive(Debug, Clone, Default)]
pub struct TexturedMesh {
    pub mesh: PolyMesh,
    layers: Vec<PtexLayer>,
}

impl TexturedMesh {
    pub fn new(mesh: PolyMesh) -> Self {
        Self {
            mesh,
            layers: Vec::new(),
        }
    }

    pub fn layers(&self) -> &[PtexLayer] {
        &self.layers
    }

    pub fn layer(&self, name: &str) -> Option<&PtexLayer> {
        self.layers.iter().find(|l| l.name == name)
    }

    pub fn layer_mut(&mut self, name: &str) -> Option<&mut PtexLayer> {
        self.layers.iter_mut().find(|l| l.name == name)
    }

    pub fn remove_layer(&mut self, name: &str) -> Option<PtexLayer> {
        let i = self.layers.iter().position(|l| l.name == name)?;
        Some(self.layers.remove(i))
    }

    /// Add a layer with every grid at `logres` and the default colour.
    pub fn add_layer(
        &mut self,
        name: &str,
        format: TexelFormat,
        logres: LogResolution,
    ) -> Result<&mut PtexLayer> {
        self.check_unique(name)?;
        let layer = PtexLayer::filled(name, format, self.mesh.loop_count(), logres)?;
        info!(layer = name, %format, %logres, loops = self.mesh.loop_count(), "Layer added");
        Ok(self.push(layer))
    }

    /// Import `archive` as a new layer.
    ///
    /// The layer is added before any subimage is read. If the import fails
    /// it stays behind with [`LayerStatus::Incomplete`].
    pub fn import(
        &mut self,
        archive: &mut dyn SubimageArchive,
        name: &str,
    ) -> Result<(&mut PtexLayer, ImportStats)> {
        self.check_unique(name)?;
        let format = archive.texel_format()?;
        let loop_count = self.mesh.loop_count();

        self.layers
            .push(PtexLayer::placeholder(name, format, loop_count));
        let Self { mesh, layers } = self;
        let layer = layers
            .last_mut()
            .ok_or_else(|| PtexError::Input(format!("layer {name} was not added")))?;

        match import_grids(mesh, archive, &mut layer.grids) {
            Ok(stats) => {
                layer.set_status(LayerStatus::Complete);
                info!(
                    layer = name,
                    faces = stats.faces,
                    subimages = stats.subimages_read,
                    "Layer imported"
                );
                Ok((layer, stats))
            }
            Err(e) => {
                warn!(layer = name, %e, "Import failed, layer left incomplete");
                Err(e)
            }
        }
    }

    /// Import a directory archive, naming the layer after the directory.
    pub fn import_file(&mut self, path: &Path) -> Result<(&mut PtexLayer, ImportStats)> {
        let mut archive = DirectoryArchive::open(path)?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("ptex")
            .to_string();
        self.import(&mut archive, &name)
    }

    /// The mesh together with one of its layers, for calls that need both.
    pub fn mesh_and_layer_mut(&mut self, name: &str) -> Option<(&PolyMesh, &mut PtexLayer)> {
        let layer = self.layers.iter_mut().find(|l| l.name == name)?;
        Some((&self.mesh, layer))
    }

    /// Fill the named layer with the debug pattern.
    pub fn fill_layer_pattern(&mut self, name: &str) -> Result<()> {
        let (mesh, layer) = self
            .mesh_and_layer_mut(name)
            .ok_or_else(|| PtexError::Input(format!("no layer named {name}")))?;
        layer.fill_pattern(mesh)
    }

    fn check_unique(&self, name: &str) -> Result<()> {
        if self.layer(name).is_some() {
            return Err(PtexError::Input(format!("layer {name} already exists")));
        }
        Ok(())
    }

    fn push(&mut self, layer: PtexLayer) -> &mut PtexLayer {
        self.layers.push(layer);
        let i = self.layers.len() - 1;
        &mut self.layers[i]
    }
}
