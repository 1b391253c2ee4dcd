use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::OutputFormat;
use crate::error::Result;
use crate::tiling::atlas_packer::AtlasImage;
use crate::types::{AtlasRegion, DataType, TexelFormat};

/// An encoded atlas image.
#[derive(Debug, Clone)]
pub struct EncodedAtlas {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub extension: &'static str,
    pub width: u32,
    pub height: u32,
}

/// JSON written next to the atlas image: where each loop's grid lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtlasSidecar {
    pub layer: String,
    pub image: String,
    pub width: u32,
    pub height: u32,
    /// Format of the grids the atlas was packed from.
    pub format: TexelFormat,
    pub regions: Vec<AtlasRegion>,
}

/// Paths produced by [`write_atlas`].
#[derive(Debug, Clone)]
pub struct AtlasOutput {
    pub image_path: PathBuf,
    pub sidecar_path: PathBuf,
    pub bytes: usize,
}

/// `Auto` picks PNG for 8-bit atlases and OpenEXR for float ones.
pub fn resolve_format(format: OutputFormat, data_type: DataType) -> OutputFormat {
    match (format, data_type) {
        (OutputFormat::Auto, DataType::Uint8) => OutputFormat::Png,
        (OutputFormat::Auto, DataType::Float32) => OutputFormat::Exr,
        (other, _) => other,
    }
}

/// Encode the atlas buffer.
pub fn encode_atlas(atlas: &AtlasImage, format: OutputFormat) -> Result<EncodedAtlas> {
    let (width, height) = atlas.dimensions();
    let img = atlas.buf.to_dynamic();

    match resolve_format(format, atlas.buf.data_type()) {
        OutputFormat::Exr => encode_exr(img, width, height),
        _ => encode_png(img, width, height),
    }
}

fn encode_png(img: DynamicImage, width: u32, height: u32) -> Result<EncodedAtlas> {
    // PNG has no float variant here; quantise.
    let img = match img {
        DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => {
            DynamicImage::ImageRgba8(img.to_rgba8())
        }
        other => other,
    };
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)?;
    Ok(EncodedAtlas {
        data: buf.into_inner(),
        mime_type: "image/png".into(),
        extension: "png",
        width,
        height,
    })
}

fn encode_exr(img: DynamicImage, width: u32, height: u32) -> Result<EncodedAtlas> {
    let img = DynamicImage::ImageRgba32F(img.to_rgba32f());
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::OpenExr)?;
    Ok(EncodedAtlas {
        data: buf.into_inner(),
        mime_type: "image/x-exr".into(),
        extension: "exr",
        width,
        height,
    })
}

/// Write `<dir>/<layer>.<ext>` and `<dir>/<layer>.json`.
pub fn write_atlas(
    atlas: &AtlasImage,
    layer: &str,
    grid_format: TexelFormat,
    dir: &Path,
    format: OutputFormat,
) -> Result<AtlasOutput> {
    fs::create_dir_all(dir)?;

    let encoded = encode_atlas(atlas, format)?;
    let image_name = format!("{layer}.{}", encoded.extension);
    let image_path = dir.join(&image_name);
    fs::write(&image_path, &encoded.data)?;
    debug!(path = %image_path.display(), bytes = encoded.data.len(), "Atlas image written");

    let sidecar = AtlasSidecar {
        layer: layer.to_string(),
        image: image_name,
        width: encoded.width,
        height: encoded.height,
        format: grid_format,
        regions: atlas.regions.clone(),
    };
    let sidecar_path = dir.join(format!("{layer}.json"));
    fs::write(&sidecar_path, serde_json::to_string_pretty(&sidecar)?)?;

    info!(
        image = %image_path.display(),
        regions = sidecar.regions.len(),
        mime = %encoded.mime_type,
        "Atlas exported"
    );
    Ok(AtlasOutput {
        image_path,
        sidecar_path,
        bytes: encoded.data.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ImageBuf;

    fn checkerboard(data_type: DataType) -> AtlasImage {
        let format = TexelFormat::new(data_type, 4).unwrap();
        let mut buf = ImageBuf::new(4, 2, format).unwrap();
        for y in 0..2 {
            for x in 0..4 {
                let c = if (x + y) % 2 == 0 {
                    [1.0, 0.0, 0.0, 1.0]
                } else {
                    [0.0, 0.0, 1.0, 1.0]
                };
                buf.set_texel(x, y, &c);
            }
        }
        AtlasImage {
            buf,
            regions: vec![AtlasRegion::new(0, 0, 2, 2), AtlasRegion::new(2, 0, 2, 2)],
        }
    }

    #[test]
    fn auto_follows_data_type() {
        assert_eq!(resolve_format(OutputFormat::Auto, DataType::Uint8), OutputFormat::Png);
        assert_eq!(resolve_format(OutputFormat::Auto, DataType::Float32), OutputFormat::Exr);
        assert_eq!(resolve_format(OutputFormat::Png, DataType::Float32), OutputFormat::Png);
    }

    #[test]
    fn png_roundtrip() {
        let atlas = checkerboard(DataType::Uint8);
        let encoded = encode_atlas(&atlas, OutputFormat::Auto).unwrap();
        assert_eq!(encoded.mime_type, "image/png");
        assert_eq!((encoded.width, encoded.height), (4, 2));

        let decoded = image::load_from_memory(&encoded.data).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (4, 2));
        assert_eq!(decoded.get_pixel(0, 0), &image::Rgba([255, 0, 0, 255]));
        assert_eq!(decoded.get_pixel(1, 0), &image::Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn float_atlas_to_png_is_quantised() {
        let atlas = checkerboard(DataType::Float32);
        let encoded = encode_atlas(&atlas, OutputFormat::Png).unwrap();
        let decoded = image::load_from_memory(&encoded.data).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(3, 1), &image::Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn exr_roundtrip() {
        let atlas = checkerboard(DataType::Float32);
        let encoded = encode_atlas(&atlas, OutputFormat::Auto).unwrap();
        assert_eq!(encoded.extension, "exr");

        let decoded = image::load_from_memory_with_format(&encoded.data, ImageFormat::OpenExr)
            .unwrap()
            .to_rgba32f();
        assert_eq!(decoded.dimensions(), (4, 2));
        assert_eq!(decoded.get_pixel(1, 0).0, [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn writes_image_and_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let atlas = checkerboard(DataType::Uint8);
        let grid_format = TexelFormat::new(DataType::Uint8, 3).unwrap();
        let out = write_atlas(&atlas, "albedo", grid_format, dir.path(), OutputFormat::Png)
            .unwrap();

        assert_eq!(out.image_path, dir.path().join("albedo.png"));
        assert!(out.image_path.exists());

        let json = fs::read_to_string(&out.sidecar_path).unwrap();
        let sidecar: AtlasSidecar = serde_json::from_str(&json).unwrap();
        assert_eq!(sidecar.image, "albedo.png");
        assert_eq!(sidecar.format, grid_format);
        assert_eq!(sidecar.regions, atlas.regions);
    }
}
