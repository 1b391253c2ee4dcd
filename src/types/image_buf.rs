use image::{DynamicImage, Rgba, Rgba32FImage};

use crate::error::{PtexError, Result};
use crate::types::region::AtlasRegion;
use crate::types::texel::{DataType, LogResolution, TexelFormat, rect_bytes};

/// Float to 8-bit: round to nearest, clamped to `[0, 255]`.
pub fn unit_to_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

pub fn u8_to_unit(value: u8) -> f32 {
    value as f32 / 255.0
}

/// Raw channel storage.
#[derive(Debug, Clone, PartialEq)]
pub enum TexelData {
    Uint8(Vec<u8>),
    Float32(Vec<f32>),
}

/// Owned, row-major 2-D texel buffer. Row 0 comes first in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBuf {
    width: u32,
    height: u32,
    format: TexelFormat,
    data: TexelData,
}

fn alloc<T: Clone>(len: usize, zero: T) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|e| PtexError::Allocation(format!("{len} channel values: {e}")))?;
    v.resize(len, zero);
    Ok(v)
}

impl ImageBuf {
    /// Zero-filled buffer.
    pub fn new(width: u32, height: u32, format: TexelFormat) -> Result<Self> {
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(format.num_channels() as usize))
            .ok_or_else(|| {
                PtexError::Allocation(format!("{width}x{height} {format} buffer overflows"))
            })?;
        let data = match format.data_type() {
            DataType::Uint8 => TexelData::Uint8(alloc(len, 0u8)?),
            DataType::Float32 => TexelData::Float32(alloc(len, 0.0f32)?),
        };
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// Zero-filled buffer sized for a grid.
    pub fn for_logres(format: TexelFormat, logres: LogResolution) -> Result<Self> {
        // Validates the byte size before touching the allocator.
        rect_bytes(format, logres)?;
        let (w, h) = logres.linear();
        Self::new(w, h, format)
    }

    /// Wrap existing texels. `data` must hold exactly `width * height * channels` values.
    pub fn from_data(width: u32, height: u32, num_channels: u8, data: TexelData) -> Result<Self> {
        let data_type = match &data {
            TexelData::Uint8(_) => DataType::Uint8,
            TexelData::Float32(_) => DataType::Float32,
        };
        let format = TexelFormat::new(data_type, num_channels)?;
        let expected = width as usize * height as usize * num_channels as usize;
        let actual = match &data {
            TexelData::Uint8(v) => v.len(),
            TexelData::Float32(v) => v.len(),
        };
        if expected != actual {
            return Err(PtexError::Format(format!(
                "expected {expected} channel values for {width}x{height}x{num_channels}, got {actual}"
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// Convert a decoded image into a buffer of the requested format.
    ///
    /// One and two channel formats read the image as grey (plus alpha),
    /// three and four as RGB(A).
    pub fn from_dynamic(img: &DynamicImage, format: TexelFormat) -> Result<Self> {
        let (width, height) = (img.width(), img.height());
        let data = match (format.data_type(), format.num_channels()) {
            (DataType::Uint8, 1) => TexelData::Uint8(img.to_luma8().into_raw()),
            (DataType::Uint8, 2) => TexelData::Uint8(img.to_luma_alpha8().into_raw()),
            (DataType::Uint8, 3) => TexelData::Uint8(img.to_rgb8().into_raw()),
            (DataType::Uint8, _) => TexelData::Uint8(img.to_rgba8().into_raw()),
            (DataType::Float32, 1) => TexelData::Float32(img.to_luma32f().into_raw()),
            (DataType::Float32, 2) => TexelData::Float32(img.to_luma_alpha32f().into_raw()),
            (DataType::Float32, 3) => TexelData::Float32(img.to_rgb32f().into_raw()),
            (DataType::Float32, _) => TexelData::Float32(img.to_rgba32f().into_raw()),
        };
        Self::from_data(width, height, format.num_channels(), data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn num_channels(&self) -> u8 {
        self.format.num_channels()
    }

    pub fn data_type(&self) -> DataType {
        self.format.data_type()
    }

    pub fn format(&self) -> TexelFormat {
        self.format
    }

    pub fn data(&self) -> &TexelData {
        &self.data
    }

    /// Raw bytes in native endianness.
    pub fn as_bytes(&self) -> &[u8] {
        match &self.data {
            TexelData::Uint8(v) => v,
            TexelData::Float32(v) => bytemuck::cast_slice(v),
        }
    }

    /// The full buffer as a region at the origin.
    pub fn bounds(&self) -> AtlasRegion {
        AtlasRegion::new(0, 0, self.width, self.height)
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        debug_assert!(x < self.width && y < self.height);
        (y as usize * self.width as usize + x as usize) * self.num_channels() as usize
    }

    /// Texel as RGBA floats. Missing colour channels read as 0, missing alpha as 1.
    pub fn texel(&self, x: u32, y: u32) -> [f32; 4] {
        let mut out = [0.0, 0.0, 0.0, 1.0];
        let n = self.num_channels() as usize;
        let start = self.offset(x, y);
        match &self.data {
            TexelData::Uint8(v) => {
                for (dst, &src) in out.iter_mut().zip(&v[start..start + n]) {
                    *dst = u8_to_unit(src);
                }
            }
            TexelData::Float32(v) => {
                out[..n].copy_from_slice(&v[start..start + n]);
            }
        }
        out
    }

    /// Write up to `num_channels` values of `color` into one texel.
    pub fn set_texel(&mut self, x: u32, y: u32, color: &[f32]) {
        let n = (self.num_channels() as usize).min(color.len());
        let start = self.offset(x, y);
        match &mut self.data {
            TexelData::Uint8(v) => {
                for (dst, &src) in v[start..start + n].iter_mut().zip(color) {
                    *dst = unit_to_u8(src);
                }
            }
            TexelData::Float32(v) => {
                v[start..start + n].copy_from_slice(&color[..n]);
            }
        }
    }

    /// Set every texel to `color` (converted to the buffer's data type).
    ///
    /// `color` needs at least one value per channel; extra values are ignored.
    pub fn fill(&mut self, color: &[f32]) -> Result<()> {
        let n = self.num_channels() as usize;
        if color.len() < n {
            return Err(PtexError::Format(format!(
                "{} channel colour for a {} buffer",
                color.len(),
                self.format()
            )));
        }
        match &mut self.data {
            TexelData::Uint8(v) => {
                let texel: Vec<u8> = color[..n].iter().map(|&c| unit_to_u8(c)).collect();
                for chunk in v.chunks_exact_mut(n) {
                    chunk.copy_from_slice(&texel);
                }
            }
            TexelData::Float32(v) => {
                for chunk in v.chunks_exact_mut(n) {
                    chunk.copy_from_slice(&color[..n]);
                }
            }
        }
        Ok(())
    }

    /// Set one channel of every texel.
    pub fn fill_channel(&mut self, channel: u8, value: f32) {
        let n = self.num_channels() as usize;
        let c = channel as usize;
        if c >= n {
            return;
        }
        match &mut self.data {
            TexelData::Uint8(v) => {
                let value = unit_to_u8(value);
                v.chunks_exact_mut(n).for_each(|t| t[c] = value);
            }
            TexelData::Float32(v) => {
                v.chunks_exact_mut(n).for_each(|t| t[c] = value);
            }
        }
    }

    /// Copy all of `src` into `self` with its origin at `(x, y)`.
    pub fn copy_from(&mut self, src: &ImageBuf, x: u32, y: u32) -> Result<()> {
        self.copy_rect_from(src, src.bounds(), x, y)
    }

    /// Copy the `src_rect` part of `src` into `self` with its origin at `(x, y)`.
    ///
    /// Data types must match. Channel counts may differ: the first
    /// `min(src, dst)` channels are copied and the rest are left alone.
    pub fn copy_rect_from(
        &mut self,
        src: &ImageBuf,
        src_rect: AtlasRegion,
        x: u32,
        y: u32,
    ) -> Result<()> {
        if !src_rect.fits_within(src.width, src.height) {
            return Err(PtexError::Primitive(format!(
                "source rect {src_rect:?} outside {}x{} image",
                src.width, src.height
            )));
        }
        let dst_rect = AtlasRegion::new(x, y, src_rect.width, src_rect.height);
        if !dst_rect.fits_within(self.width, self.height) {
            return Err(PtexError::Primitive(format!(
                "destination rect {dst_rect:?} outside {}x{} image",
                self.width, self.height
            )));
        }

        let layout = CopyLayout {
            src_channels: src.num_channels() as usize,
            src_width: src.width as usize,
            dst_channels: self.num_channels() as usize,
            dst_width: self.width as usize,
            src_rect,
            dst_x: x as usize,
            dst_y: y as usize,
        };
        match (&mut self.data, &src.data) {
            (TexelData::Uint8(d), TexelData::Uint8(s)) => copy_texels(d, s, &layout),
            (TexelData::Float32(d), TexelData::Float32(s)) => copy_texels(d, s, &layout),
            _ => {
                return Err(PtexError::Primitive(format!(
                    "cannot copy {} texels into {} buffer",
                    src.data_type(),
                    self.data_type()
                )));
            }
        }
        Ok(())
    }

    /// RGBA float expansion, used by the resampler and encoders.
    pub fn to_rgba32f(&self) -> Rgba32FImage {
        Rgba32FImage::from_fn(self.width, self.height, |x, y| Rgba(self.texel(x, y)))
    }

    /// Overwrite every texel from an RGBA float image of the same size.
    pub fn write_rgba32f(&mut self, img: &Rgba32FImage) -> Result<()> {
        if img.dimensions() != self.dimensions() {
            return Err(PtexError::Primitive(format!(
                "cannot write {:?} image into {}x{} buffer",
                img.dimensions(),
                self.width,
                self.height
            )));
        }
        for (x, y, px) in img.enumerate_pixels() {
            self.set_texel(x, y, &px.0);
        }
        Ok(())
    }

    /// Encodable image: 8-bit buffers keep their channel layout, float
    /// buffers become RGB or RGBA float.
    pub fn to_dynamic(&self) -> DynamicImage {
        match (&self.data, self.num_channels()) {
            (TexelData::Uint8(v), 1) => image::GrayImage::from_raw(self.width, self.height, v.clone())
                .map(DynamicImage::ImageLuma8),
            (TexelData::Uint8(v), 2) => {
                image::GrayAlphaImage::from_raw(self.width, self.height, v.clone())
                    .map(DynamicImage::ImageLumaA8)
            }
            (TexelData::Uint8(v), 3) => image::RgbImage::from_raw(self.width, self.height, v.clone())
                .map(DynamicImage::ImageRgb8),
            (TexelData::Uint8(v), _) => image::RgbaImage::from_raw(self.width, self.height, v.clone())
                .map(DynamicImage::ImageRgba8),
            (TexelData::Float32(v), 3) => {
                image::Rgb32FImage::from_raw(self.width, self.height, v.clone())
                    .map(DynamicImage::ImageRgb32F)
            }
            (TexelData::Float32(_), _) => None,
        }
        .unwrap_or_else(|| {
            // Grey float buffers are spread over RGB so they decode as grey.
            let n = self.num_channels();
            DynamicImage::ImageRgba32F(Rgba32FImage::from_fn(self.width, self.height, |x, y| {
                let t = self.texel(x, y);
                match n {
                    1 => Rgba([t[0], t[0], t[0], 1.0]),
                    2 => Rgba([t[0], t[0], t[0], t[1]]),
                    _ => Rgba(t),
                }
            }))
        })
    }
}

struct CopyLayout {
    src_channels: usize,
    src_width: usize,
    dst_channels: usize,
    dst_width: usize,
    src_rect: AtlasRegion,
    dst_x: usize,
    dst_y: usize,
}

fn copy_texels<T: Copy>(dst: &mut [T], src: &[T], l: &CopyLayout) {
    let n = l.src_channels.min(l.dst_channels);
    for row in 0..l.src_rect.height as usize {
        let sy = l.src_rect.y as usize + row;
        let dy = l.dst_y + row;
        for col in 0..l.src_rect.width as usize {
            let s = (sy * l.src_width + l.src_rect.x as usize + col) * l.src_channels;
            let d = (dy * l.dst_width + l.dst_x + col) * l.dst_channels;
            dst[d..d + n].copy_from_slice(&src[s..s + n]);
        }
    }
}
