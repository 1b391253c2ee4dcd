use tracing::trace;

use crate::error::{PtexError, Result};
use crate::tiling::primitives::Resampler;
use crate::types::texel::rect_bytes;
use crate::types::{DataType, ImageBuf, LogResolution, TexelFormat};

/// Colour of a freshly initialised grid.
pub const DEFAULT_COLOR: [f32; 4] = [0.8, 0.8, 0.8, 1.0];

/// The texels owned by one mesh loop.
///
/// `texels` is `None` until the grid is filled, and again after [`free`].
///
/// [`free`]: TexelGrid::free
#[derive(Debug, Clone, PartialEq)]
pub struct TexelGrid {
    format: TexelFormat,
    logres: LogResolution,
    texels: Option<ImageBuf>,
}

impl TexelGrid {
    /// Allocate a grid filled with [`DEFAULT_COLOR`].
    pub fn new(format: TexelFormat, logres: LogResolution) -> Result<Self> {
        Self::with_fill(format, logres, &DEFAULT_COLOR)
    }

    pub fn with_fill(format: TexelFormat, logres: LogResolution, color: &[f32]) -> Result<Self> {
        let mut texels = ImageBuf::for_logres(format, logres)?;
        texels.fill(color)?;
        Ok(Self {
            format,
            logres,
            texels: Some(texels),
        })
    }

    /// Placeholder with no texels, sized 1x1 until initialised.
    pub fn unallocated(format: TexelFormat) -> Self {
        Self {
            format,
            logres: LogResolution { u: 0, v: 0 },
            texels: None,
        }
    }

    /// Replace the grid with a freshly filled one at `logres`.
    pub fn init(&mut self, logres: LogResolution) -> Result<()> {
        *self = Self::new(self.format, logres)?;
        Ok(())
    }

    /// Take ownership of `texels` as the grid contents.
    ///
    /// The buffer must have the grid's format and a power-of-two size.
    pub fn set_texels(&mut self, texels: ImageBuf) -> Result<()> {
        if texels.format() != self.format {
            return Err(PtexError::Format(format!(
                "grid is {}, buffer is {}",
                self.format,
                texels.format()
            )));
        }
        let (w, h) = texels.dimensions();
        self.logres = LogResolution::from_linear(w, h)?;
        self.texels = Some(texels);
        Ok(())
    }

    /// Set every texel to `color`.
    pub fn fill(&mut self, color: &[f32]) -> Result<()> {
        self.texels_or_err()?.fill(color)
    }

    /// Debug pattern: a solid colour per corner for the first four loops,
    /// a UV gradient for the rest. The corner at the face centre is white
    /// and the left column is lightened.
    pub fn fill_pattern(&mut self, index: usize) -> Result<()> {
        let texels = self.texels_or_err()?;
        let (w, h) = texels.dimensions();
        let unit = |n: u32, d: u32| if d > 1 { n as f32 / (d - 1) as f32 } else { 0.0 };

        for y in 0..h {
            for x in 0..w {
                let (u, v) = (unit(x, w), unit(y, h));
                let mut rgba = match index {
                    0 => [1.0, 0.0, 0.0, 1.0],
                    1 => [0.0, 1.0, 0.0, 1.0],
                    2 => [0.0, 0.0, 1.0, 1.0],
                    3 => [1.0, 1.0, 0.0, 1.0],
                    _ => [u, v, index as f32 / 2.0, 1.0],
                };
                if x == 0 && y == 0 {
                    rgba = [1.0; 4];
                } else if x == 0 {
                    for c in rgba.iter_mut().take(3).filter(|c| **c == 0.0) {
                        *c = 0.5;
                    }
                }
                texels.set_texel(x, y, &rgba);
            }
        }
        Ok(())
    }

    /// Resample to `logres`. On any failure the grid is left untouched.
    pub fn resize(&mut self, logres: LogResolution, resampler: &dyn Resampler) -> Result<()> {
        let src = self.texels.as_ref().ok_or_else(|| {
            PtexError::Primitive("cannot resize a grid with no texels".into())
        })?;
        let mut dst = ImageBuf::for_logres(self.format, logres)?;
        resampler.resize(&mut dst, src)?;

        trace!(from = %self.logres, to = %logres, "Grid resized");
        self.texels = Some(dst);
        self.logres = logres;
        Ok(())
    }

    /// Release the texels. Does nothing if already empty.
    pub fn free(&mut self) {
        self.texels = None;
    }

    pub fn format(&self) -> TexelFormat {
        self.format
    }

    pub fn data_type(&self) -> DataType {
        self.format.data_type()
    }

    pub fn logres(&self) -> LogResolution {
        self.logres
    }

    pub fn is_allocated(&self) -> bool {
        self.texels.is_some()
    }

    pub fn texels(&self) -> Option<&ImageBuf> {
        self.texels.as_ref()
    }

    pub fn texels_mut(&mut self) -> Option<&mut ImageBuf> {
        self.texels.as_mut()
    }

    /// Byte size of the texels at the current resolution.
    pub fn rect_bytes(&self) -> Result<usize> {
        rect_bytes(self.format, self.logres)
    }

    fn texels_or_err(&mut self) -> Result<&mut ImageBuf> {
        self.texels
            .as_mut()
            .ok_or_else(|| PtexError::Primitive("grid has no texels".into()))
    }
}
