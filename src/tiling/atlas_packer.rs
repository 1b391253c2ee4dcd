use tracing::{debug, info, warn};

use crate::config::AtlasConfig;
use crate::error::{PtexError, Result};
use crate::layer::grid::TexelGrid;
use crate::tiling::border_filter::filter_borders;
use crate::tiling::layout::PackedLayout;
use crate::tiling::primitives::Primitives;
use crate::types::{AtlasRegion, ImageBuf, PolyMesh};

/// Every grid of a layer packed into one RGBA buffer.
///
/// `regions[i]` is where loop `i` landed.
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasImage {
    pub buf: ImageBuf,
    pub regions: Vec<AtlasRegion>,
}

impl AtlasImage {
    pub fn dimensions(&self) -> (u32, u32) {
        self.buf.dimensions()
    }
}

/// Pack one grid per mesh loop into a new atlas.
///
/// Grids must all hold texels of one format. The atlas has four channels
/// of that data type; missing alpha is set to 1 after border filtering
/// when `config.fill_alpha` is on.
pub fn pack_loops(
    mesh: &PolyMesh,
    grids: &[TexelGrid],
    prims: &Primitives<'_>,
    config: &AtlasConfig,
) -> Result<AtlasImage> {
    if grids.len() != mesh.loop_count() {
        return Err(PtexError::Topology(format!(
            "{} grids for {} loops",
            grids.len(),
            mesh.loop_count()
        )));
    }
    let Some(first) = grids.first() else {
        return Err(PtexError::Topology("mesh has no loops to pack".into()));
    };

    let format = first.format();
    let mut texels = Vec::with_capacity(grids.len());
    for (i, grid) in grids.iter().enumerate() {
        if grid.format() != format {
            return Err(PtexError::Format(format!(
                "loop {i} is {}, loop 0 is {format}",
                grid.format()
            )));
        }
        let buf = grid
            .texels()
            .ok_or_else(|| PtexError::Format(format!("loop {i} has no texels")))?;
        texels.push(buf);
    }

    let mut layout = PackedLayout::new(texels.len());
    for (i, buf) in texels.iter().enumerate() {
        layout.add(buf.width(), buf.height(), i);
    }
    let layout = layout.finalize(prims.solver)?;

    let mut buf = ImageBuf::new(layout.width, layout.height, format.with_channels(4)?)?;
    let mut regions = Vec::with_capacity(texels.len());
    for (i, src) in texels.iter().enumerate() {
        let region = layout
            .region(i)
            .ok_or_else(|| PtexError::Primitive(format!("layout did not place loop {i}")))?;
        if (region.width, region.height) != src.dimensions() {
            return Err(PtexError::Primitive(format!(
                "loop {i} placed as {}x{}, grid is {:?}",
                region.width,
                region.height,
                src.dimensions()
            )));
        }
        buf.copy_from(src, region.x, region.y)?;
        regions.push(region);
    }

    let mut atlas = AtlasImage { buf, regions };

    if config.filter_borders {
        filter_borders(&mut atlas, mesh, prims.blender)?;
    } else {
        debug!("Border filtering disabled");
    }

    if config.fill_alpha && format.num_channels() < 4 {
        atlas.buf.fill_channel(3, 1.0);
    }

    info!(
        loops = atlas.regions.len(),
        width = layout.width,
        height = layout.height,
        %format,
        "Atlas packed"
    );
    Ok(atlas)
}

/// Copy each loop's region of `atlas` back into its grid.
///
/// Grids without texels are skipped. Returns how many grids were written.
pub fn update_grids_from_atlas(atlas: &AtlasImage, grids: &mut [TexelGrid]) -> Result<usize> {
    if atlas.regions.len() != grids.len() {
        return Err(PtexError::Topology(format!(
            "atlas has {} regions for {} grids",
            atlas.regions.len(),
            grids.len()
        )));
    }

    let mut updated = 0;
    for (i, (region, grid)) in atlas.regions.iter().zip(grids.iter_mut()).enumerate() {
        let Some(texels) = grid.texels_mut() else {
            warn!(grid = i, "Grid has no texels, skipped");
            continue;
        };
        if texels.dimensions() != (region.width, region.height) {
            return Err(PtexError::Primitive(format!(
                "region {i} is {}x{}, grid is {:?}",
                region.width,
                region.height,
                texels.dimensions()
            )));
        }
        texels.copy_rect_from(&atlas.buf, *region, 0, 0)?;
        updated += 1;
    }

    debug!(updated, total = grids.len(), "Grids updated from atlas");
    Ok(updated)
}
