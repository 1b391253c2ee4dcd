use tracing::{debug, trace, warn};

use crate::error::{PtexError, Result};
use crate::ingestion::archive::SubimageArchive;
use crate::layer::{LayerStatus, PtexLayer, TexelGrid};
use crate::tiling::primitives::quad_split;
use crate::types::{ImageBuf, LogResolution, PolyMesh};

/// What an import consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub faces: usize,
    pub quads: usize,
    pub subimages_read: usize,
    /// Subimages left over after every face was filled.
    pub unused_subimages: usize,
}

/// Seek to `index`, read it, and check the read matches the seek.
fn read_subimage(archive: &mut dyn SubimageArchive, index: usize) -> Result<ImageBuf> {
    let (w, h) = archive.seek_subimage(index)?;
    let img = archive.read()?;
    if img.dimensions() != (w, h) {
        return Err(PtexError::Archive(format!(
            "subimage {index} sought as {w}x{h}, read as {:?}",
            img.dimensions()
        )));
    }
    Ok(img)
}

/// Fill one grid per mesh loop from `archive`.
///
/// Faces consume subimages in order. A quad takes one subimage and splits
/// it into four corner grids at half resolution, with loops 1 and 3
/// transposed. Any other face takes one subimage per loop.
///
/// Stops at the first failure; grids filled before it keep their texels.
pub fn import_grids(
    mesh: &PolyMesh,
    archive: &mut dyn SubimageArchive,
    grids: &mut [TexelGrid],
) -> Result<ImportStats> {
    if grids.len() != mesh.loop_count() {
        return Err(PtexError::Topology(format!(
            "{} grids for {} loops",
            grids.len(),
            mesh.loop_count()
        )));
    }
    let format = archive.texel_format()?;
    let mut stats = ImportStats::default();
    let mut subimage = 0;

    for (face_index, face) in mesh.faces.iter().enumerate() {
        if face.is_quad() {
            let img = read_subimage(archive, subimage)?;
            let (w, h) = img.dimensions();
            let half = LogResolution::from_linear(w, h)?.halved();
            let mut quads = [
                ImageBuf::for_logres(format, half)?,
                ImageBuf::for_logres(format, half.transposed())?,
                ImageBuf::for_logres(format, half)?,
                ImageBuf::for_logres(format, half.transposed())?,
            ];
            let [q0, q1, q2, q3] = &mut quads;
            quad_split([q0, q1, q2, q3], &img)?;

            for (offset, quad) in quads.into_iter().enumerate() {
                grids[face.loop_at(offset)].set_texels(quad)?;
            }
            trace!(face = face_index, subimage, %half, "Quad split");
            stats.quads += 1;
            subimage += 1;
        } else {
            for offset in 0..face.loop_count {
                let img = read_subimage(archive, subimage)?;
                grids[face.loop_at(offset)].set_texels(img)?;
                subimage += 1;
            }
        }
        stats.faces += 1;
    }

    stats.subimages_read = subimage;
    stats.unused_subimages = archive.num_subimages().saturating_sub(subimage);
    if stats.unused_subimages > 0 {
        warn!(
            unused = stats.unused_subimages,
            read = subimage,
            "Archive has more subimages than the mesh needs"
        );
    }
    debug!(faces = stats.faces, quads = stats.quads, subimages = subimage, "Grids imported");
    Ok(stats)
}

/// Import `archive` into a standalone layer named `name`.
pub fn import_layer(
    mesh: &PolyMesh,
    archive: &mut dyn SubimageArchive,
    name: &str,
) -> Result<PtexLayer> {
    let format = archive.texel_format()?;
    let mut layer = PtexLayer::placeholder(name, format, mesh.loop_count());
    import_grids(mesh, archive, layer.grids_mut())?;
    layer.set_status(LayerStatus::Complete);
    Ok(layer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::archive::MemoryArchive;
    use crate::types::{DataType, TexelFormat};

    fn rgba(data_type: DataType) -> TexelFormat {
        TexelFormat::new(data_type, 4).unwrap()
    }

    fn image(w: u32, h: u32, data_type: DataType) -> ImageBuf {
        let mut img = ImageBuf::new(w, h, rgba(data_type)).unwrap();
        for y in 0..h {
            for x in 0..w {
                img.set_texel(x, y, &[x as f32 / w as f32, y as f32 / h as f32, 0.5, 1.0]);
            }
        }
        img
    }

    #[test]
    fn quad_import_halves_and_alternates() {
        let mesh = PolyMesh::from_polygons(&[vec![0, 1, 2, 3]]).unwrap();
        let mut archive = MemoryArchive::new(
            rgba(DataType::Uint8),
            vec![image(16, 4, DataType::Uint8)],
        );
        let layer = import_layer(&mesh, &mut archive, "paint").unwrap();

        assert!(layer.is_complete());
        let res: Vec<_> = layer.grids().iter().map(|g| g.logres()).collect();
        assert_eq!(res[0], LogResolution { u: 3, v: 1 });
        assert_eq!(res[1], LogResolution { u: 1, v: 3 });
        assert_eq!(res[2], res[0]);
        assert_eq!(res[3], res[1]);
    }

    #[test]
    fn quad_import_clamps_one_texel_side() {
        let mesh = PolyMesh::from_polygons(&[vec![0, 1, 2, 3]]).unwrap();
        let mut archive = MemoryArchive::new(
            rgba(DataType::Float32),
            vec![image(8, 1, DataType::Float32)],
        );
        let layer = import_layer(&mesh, &mut archive, "paint").unwrap();
        assert_eq!(layer.grids()[0].logres(), LogResolution { u: 2, v: 0 });
        assert_eq!(layer.grids()[1].logres(), LogResolution { u: 0, v: 2 });
    }

    #[test]
    fn non_quad_reads_one_subimage_per_loop() {
        let mesh = PolyMesh::from_polygons(&[vec![0, 1, 2], vec![0, 2, 3, 4]]).unwrap();
        let images = vec![
            image(4, 4, DataType::Uint8),
            image(8, 2, DataType::Uint8),
            image(1, 1, DataType::Uint8),
            image(4, 4, DataType::Uint8),
        ];
        let mut archive = MemoryArchive::new(rgba(DataType::Uint8), images.clone());
        let layer = import_layer(&mesh, &mut archive, "paint").unwrap();

        assert_eq!(layer.grids()[1].texels().unwrap(), &images[1]);
        assert_eq!(layer.grids()[2].logres(), LogResolution { u: 0, v: 0 });
        // The quad used the fourth subimage.
        assert_eq!(layer.grids()[3].logres(), LogResolution { u: 1, v: 1 });
    }

    #[test]
    fn leftover_subimages_are_counted() {
        let mesh = PolyMesh::from_polygons(&[vec![0, 1, 2, 3]]).unwrap();
        let images = vec![image(2, 2, DataType::Uint8), image(2, 2, DataType::Uint8)];
        let mut archive = MemoryArchive::new(rgba(DataType::Uint8), images);
        let mut grids = vec![TexelGrid::unallocated(rgba(DataType::Uint8)); 4];
        let stats = import_grids(&mesh, &mut archive, &mut grids).unwrap();
        assert_eq!(stats.subimages_read, 1);
        assert_eq!(stats.unused_subimages, 1);
    }

    #[test]
    fn non_power_of_two_subimage_fails() {
        let mesh = PolyMesh::from_polygons(&[vec![0, 1, 2]]).unwrap();
        let images = vec![image(3, 4, DataType::Uint8); 3];
        let mut archive = MemoryArchive::new(rgba(DataType::Uint8), images);
        let err = import_layer(&mesh, &mut archive, "paint").unwrap_err();
        assert!(matches!(err, PtexError::Format(_)));
    }

    #[test]
    fn format_mismatch_fails() {
        let mesh = PolyMesh::from_polygons(&[vec![0, 1, 2]]).unwrap();
        let images = vec![image(2, 2, DataType::Float32); 3];
        let mut archive = MemoryArchive::new(rgba(DataType::Uint8), images);
        assert!(import_layer(&mesh, &mut archive, "paint").is_err());
    }

    #[test]
    fn short_archive_fails_with_archive_error() {
        let mesh = PolyMesh::from_polygons(&[vec![0, 1, 2]]).unwrap();
        let images = vec![image(2, 2, DataType::Uint8); 2];
        let mut archive = MemoryArchive::new(rgba(DataType::Uint8), images);
        let mut grids = vec![TexelGrid::unallocated(rgba(DataType::Uint8)); 3];
        let err = import_grids(&mesh, &mut archive, &mut grids).unwrap_err();
        assert!(matches!(err, PtexError::Archive(_)));
        assert!(grids[0].is_allocated());
        assert!(!grids[2].is_allocated());
    }
}
