use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PtexError, Result};
use crate::layer::PtexLayer;
use crate::tiling::primitives::quad_merge;
use crate::types::{DataType, ImageBuf, PolyMesh, TexelFormat};

/// Name of the manifest inside a directory archive.
pub const MANIFEST_NAME: &str = "ptex.json";

/// A sequence of per-face images with one texel format.
///
/// Reading is two-step: seek to a subimage to learn its size, then read it.
pub trait SubimageArchive {
    fn texel_format(&self) -> Result<TexelFormat>;

    fn num_subimages(&self) -> usize;

    /// Select subimage `index` and return its `(width, height)`.
    fn seek_subimage(&mut self, index: usize) -> Result<(u32, u32)>;

    /// Read the selected subimage.
    fn read(&mut self) -> Result<ImageBuf>;
}

/// `ptex.json`: the texel type and one image file per subimage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveManifest {
    pub data_type: String,
    pub num_channels: u32,
    pub subimages: Vec<String>,
}

/// A directory holding `ptex.json` plus the subimage files it lists.
#[derive(Debug, Clone)]
pub struct DirectoryArchive {
    root: PathBuf,
    manifest: ArchiveManifest,
    current: Option<usize>,
}

impl DirectoryArchive {
    pub fn open(root: &Path) -> Result<Self> {
        let manifest_path = root.join(MANIFEST_NAME);
        let text = fs::read_to_string(&manifest_path).map_err(|e| {
            PtexError::Archive(format!("cannot read {}: {e}", manifest_path.display()))
        })?;
        let manifest: ArchiveManifest = serde_json::from_str(&text)?;
        debug!(
            path = %root.display(),
            subimages = manifest.subimages.len(),
            data_type = %manifest.data_type,
            channels = manifest.num_channels,
            "Opened archive"
        );
        Ok(Self {
            root: root.to_path_buf(),
            manifest,
            current: None,
        })
    }

    pub fn manifest(&self) -> &ArchiveManifest {
        &self.manifest
    }

    fn subimage_path(&self, index: usize) -> Result<PathBuf> {
        let name = self.manifest.subimages.get(index).ok_or_else(|| {
            PtexError::Archive(format!(
                "no subimage {index}, archive has {}",
                self.manifest.subimages.len()
            ))
        })?;
        Ok(self.root.join(name))
    }

    /// Store `layer` as a directory archive, one subimage per face for
    /// quads and one per loop otherwise.
    pub fn write(root: &Path, mesh: &PolyMesh, layer: &PtexLayer) -> Result<Self> {
        fs::create_dir_all(root)?;
        let format = layer.format();
        let ext = match format.data_type() {
            DataType::Uint8 => "png",
            DataType::Float32 => "exr",
        };

        let texels = |loop_index: usize| {
            layer
                .grids()
                .get(loop_index)
                .and_then(|g| g.texels())
                .ok_or_else(|| PtexError::Archive(format!("loop {loop_index} has no texels")))
        };

        let mut subimages = Vec::new();
        let mut save = |img: &ImageBuf| -> Result<()> {
            let name = format!("{:06}.{ext}", subimages.len());
            img.to_dynamic().save(root.join(&name))?;
            subimages.push(name);
            Ok(())
        };

        for face in &mesh.faces {
            if face.is_quad() {
                let merged = quad_merge([
                    texels(face.loop_at(0))?,
                    texels(face.loop_at(1))?,
                    texels(face.loop_at(2))?,
                    texels(face.loop_at(3))?,
                ])?;
                save(&merged)?;
            } else {
                for offset in 0..face.loop_count {
                    save(texels(face.loop_at(offset))?)?;
                }
            }
        }

        let manifest = ArchiveManifest {
            data_type: format.data_type().to_string(),
            num_channels: format.num_channels() as u32,
            subimages,
        };
        fs::write(
            root.join(MANIFEST_NAME),
            serde_json::to_string_pretty(&manifest)?,
        )?;
        info!(
            path = %root.display(),
            subimages = manifest.subimages.len(),
            "Archive written"
        );

        Ok(Self {
            root: root.to_path_buf(),
            manifest,
            current: None,
        })
    }
}

impl SubimageArchive for DirectoryArchive {
    fn texel_format(&self) -> Result<TexelFormat> {
        TexelFormat::from_archive(&self.manifest.data_type, self.manifest.num_channels)
    }

    fn num_subimages(&self) -> usize {
        self.manifest.subimages.len()
    }

    fn seek_subimage(&mut self, index: usize) -> Result<(u32, u32)> {
        let path = self.subimage_path(index)?;
        let dims = image::image_dimensions(&path).map_err(|e| {
            PtexError::Archive(format!("cannot seek to {}: {e}", path.display()))
        })?;
        self.current = Some(index);
        Ok(dims)
    }

    fn read(&mut self) -> Result<ImageBuf> {
        let index = self
            .current
            .ok_or_else(|| PtexError::Archive("read before seek".into()))?;
        let path = self.subimage_path(index)?;
        let img = image::open(&path)
            .map_err(|e| PtexError::Archive(format!("cannot read {}: {e}", path.display())))?;
        ImageBuf::from_dynamic(&img, self.texel_format()?)
    }
}

/// Subimages held in memory.
#[derive(Debug, Clone)]
pub struct MemoryArchive {
    format: TexelFormat,
    images: Vec<ImageBuf>,
    current: Option<usize>,
}

impl MemoryArchive {
    pub fn new(format: TexelFormat, images: Vec<ImageBuf>) -> Self {
        Self {
            format,
            images,
            current: None,
        }
    }
}

impl SubimageArchive for MemoryArchive {
    fn texel_format(&self) -> Result<TexelFormat> {
        Ok(self.format)
    }

    fn num_subimages(&self) -> usize {
        self.images.len()
    }

    fn seek_subimage(&mut self, index: usize) -> Result<(u32, u32)> {
        let img = self.images.get(index).ok_or_else(|| {
            PtexError::Archive(format!("no subimage {index}, archive has {}", self.images.len()))
        })?;
        self.current = Some(index);
        Ok(img.dimensions())
    }

    fn read(&mut self) -> Result<ImageBuf> {
        self.current
            .and_then(|i| self.images.get(i))
            .cloned()
            .ok_or_else(|| PtexError::Archive("read before seek".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb8() -> TexelFormat {
        TexelFormat::new(DataType::Uint8, 3).unwrap()
    }

    #[test]
    fn memory_archive_seek_then_read() {
        let mut a = ImageBuf::new(4, 2, rgb8()).unwrap();
        a.fill(&[1.0, 0.0, 0.0]).unwrap();
        let mut archive = MemoryArchive::new(rgb8(), vec![a.clone()]);

        assert!(archive.read().is_err());
        assert_eq!(archive.seek_subimage(0).unwrap(), (4, 2));
        assert_eq!(archive.read().unwrap(), a);
        assert!(matches!(archive.seek_subimage(1), Err(PtexError::Archive(_))));
    }

    #[test]
    fn directory_archive_reads_manifest_and_images() {
        let dir = tempfile::tempdir().unwrap();
        let mut img = ImageBuf::new(8, 4, rgb8()).unwrap();
        img.fill(&[0.0, 1.0, 0.0]).unwrap();
        img.to_dynamic().save(dir.path().join("face0.png")).unwrap();

        let manifest = ArchiveManifest {
            data_type: "uint8".into(),
            num_channels: 3,
            subimages: vec!["face0.png".into()],
        };
        fs::write(
            dir.path().join(MANIFEST_NAME),
            serde_json::to_string(&manifest).unwrap(),
        )
        .unwrap();

        let mut archive = DirectoryArchive::open(dir.path()).unwrap();
        assert_eq!(archive.texel_format().unwrap(), rgb8());
        assert_eq!(archive.num_subimages(), 1);
        assert_eq!(archive.seek_subimage(0).unwrap(), (8, 4));
        assert_eq!(archive.read().unwrap(), img);
    }

    #[test]
    fn directory_archive_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            DirectoryArchive::open(dir.path()),
            Err(PtexError::Archive(_))
        ));

        let manifest = ArchiveManifest {
            data_type: "uint16".into(),
            num_channels: 3,
            subimages: vec!["missing.png".into()],
        };
        fs::write(
            dir.path().join(MANIFEST_NAME),
            serde_json::to_string(&manifest).unwrap(),
        )
        .unwrap();
        let mut archive = DirectoryArchive::open(dir.path()).unwrap();
        assert!(matches!(archive.texel_format(), Err(PtexError::Format(_))));
        assert!(matches!(archive.seek_subimage(0), Err(PtexError::Archive(_))));
    }

    #[test]
    fn bad_manifest_is_json_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(MANIFEST_NAME), "{ not json").unwrap();
        assert!(matches!(
            DirectoryArchive::open(dir.path()),
            Err(PtexError::Json(_))
        ));
    }
}
