//! Image primitives behind narrow traits so callers and tests can swap them.

use std::ops::Range;

use image::imageops::{self, FilterType};

use crate::error::{PtexError, Result};
use crate::tiling::border_filter::{AdjacentEdge, Side};
use crate::tiling::layout::{DEFAULT_MAX_ATLAS_SIZE, GuillotinePacker, LayoutSolver};
use crate::types::{AtlasRegion, ImageBuf};

/// Scales one buffer into another of the same format.
pub trait Resampler: Sync {
    /// Fill all of `dst` from all of `src`.
    fn resize(&self, dst: &mut ImageBuf, src: &ImageBuf) -> Result<()>;
}

/// Blends the border texels of one atlas rectangle with its neighbours.
pub trait BorderBlender {
    /// Read from `snapshot`, write the border of `dst` into `atlas`.
    ///
    /// `adjacent` is indexed by [`Side`] and names the rectangle and side
    /// touching each side of `dst`.
    fn blend_borders(
        &self,
        atlas: &mut ImageBuf,
        snapshot: &ImageBuf,
        dst: AtlasRegion,
        adjacent: &[(AtlasRegion, AdjacentEdge); 4],
    ) -> Result<()>;
}

/// Resampler backed by `image::imageops::resize`.
#[derive(Debug, Clone, Copy)]
pub struct FilterResampler(pub FilterType);

impl Default for FilterResampler {
    fn default() -> Self {
        Self(FilterType::Triangle)
    }
}

impl Resampler for FilterResampler {
    fn resize(&self, dst: &mut ImageBuf, src: &ImageBuf) -> Result<()> {
        if dst.format() != src.format() {
            return Err(PtexError::Primitive(format!(
                "cannot resample {} into {}",
                src.format(),
                dst.format()
            )));
        }
        if dst.dimensions() == src.dimensions() {
            return dst.copy_from(src, 0, 0);
        }
        let scaled = imageops::resize(&src.to_rgba32f(), dst.width(), dst.height(), self.0);
        dst.write_rgba32f(&scaled)
    }
}

/// Averages each seam between two grids into one shared set of values.
///
/// The shorter side of a seam sets the sample count. Each of its texels is
/// paired with the block of texels it covers on the longer side, and both
/// get the mean of the texel and the block's mean. Filtering an already
/// filtered atlas changes nothing.
///
/// Corner texels and the blocks they pair with are left alone since they
/// touch more than one neighbour. So are sides that resolve to themselves
/// and sides of grids one texel thin, whose border texels lie on two
/// seams at once.
#[derive(Debug, Clone, Copy, Default)]
pub struct AverageBlender;

impl BorderBlender for AverageBlender {
    fn blend_borders(
        &self,
        atlas: &mut ImageBuf,
        snapshot: &ImageBuf,
        dst: AtlasRegion,
        adjacent: &[(AtlasRegion, AdjacentEdge); 4],
    ) -> Result<()> {
        let bounds = snapshot.bounds();
        if !dst.fits_within(bounds.width, bounds.height) {
            return Err(PtexError::Primitive(format!(
                "border rect {dst:?} outside {}x{} atlas",
                bounds.width, bounds.height
            )));
        }

        for side in Side::ALL {
            let (adj_rect, adj_edge) = adjacent[side as usize];
            if adj_rect == dst && adj_edge.side == side {
                continue;
            }
            if !adj_rect.fits_within(bounds.width, bounds.height) || adj_rect.is_empty() {
                return Err(PtexError::Primitive(format!(
                    "adjacent rect {adj_rect:?} outside {}x{} atlas",
                    bounds.width, bounds.height
                )));
            }
            if side.depth(&dst) < 2 || adj_edge.side.depth(&adj_rect) < 2 {
                continue;
            }

            let seam = Seam {
                dst,
                side,
                adj: adj_rect,
                edge: adj_edge,
            };
            seam.blend(atlas, snapshot);
        }
        Ok(())
    }
}

/// One side of `dst` and the side of `adj` it meets.
struct Seam {
    dst: AtlasRegion,
    side: Side,
    adj: AtlasRegion,
    edge: AdjacentEdge,
}

impl Seam {
    fn blend(&self, atlas: &mut ImageBuf, snapshot: &ImageBuf) {
        let dst_len = self.side.len(&self.dst);
        let adj_len = self.edge.side.len(&self.adj);
        let samples = dst_len.min(adj_len);

        for j in 1..samples.saturating_sub(1) {
            let own = block(j, samples, dst_len);
            let mut other = block(j, samples, adj_len);
            if self.edge.reverse {
                other = adj_len - other.end..adj_len - other.start;
            }

            let own_mean = block_mean(
                snapshot,
                own.clone().map(|t| self.side.texel(&self.dst, t)),
            );
            let other_mean = block_mean(
                snapshot,
                other.map(|t| self.edge.side.texel(&self.adj, t)),
            );
            let mut value = [0.0f32; 4];
            for (v, (a, b)) in value.iter_mut().zip(own_mean.iter().zip(&other_mean)) {
                *v = ((a + b) * 0.5) as f32;
            }

            for t in own {
                let (x, y) = self.side.texel(&self.dst, t);
                atlas.set_texel(x, y, &value);
            }
        }
    }
}

/// Side indices covered by sample `j` of `samples` on a side `len` long.
fn block(j: u32, samples: u32, len: u32) -> Range<u32> {
    let edge = |j: u32| (u64::from(j) * u64::from(len)).div_ceil(u64::from(samples)) as u32;
    edge(j)..edge(j + 1)
}

/// Mean of the given texels, summed in the order given.
fn block_mean(buf: &ImageBuf, texels: impl Iterator<Item = (u32, u32)>) -> [f64; 4] {
    let mut sum = [0.0f64; 4];
    let mut count = 0u32;
    for (x, y) in texels {
        for (s, c) in sum.iter_mut().zip(buf.texel(x, y)) {
            *s += f64::from(c);
        }
        count += 1;
    }
    sum.map(|s| s / f64::from(count.max(1)))
}

fn check_split_size(quad: &ImageBuf, src: &ImageBuf, expected: (u32, u32), i: usize) -> Result<()> {
    if quad.data_type() != src.data_type() {
        return Err(PtexError::Archive(format!(
            "quadrant {i} is {}, source is {}",
            quad.data_type(),
            src.data_type()
        )));
    }
    if quad.dimensions() != expected {
        return Err(PtexError::Archive(format!(
            "quadrant {i} is {:?}, expected {expected:?}",
            quad.dimensions()
        )));
    }
    Ok(())
}

/// Source pixel for texel `(gx, gy)` of quadrant `q` in a `w`x`h` face image.
///
/// Each quadrant's `(0, 0)` sits at the image centre and its far corner on
/// image corner `q`. Quadrants 1 and 3 are transposed.
fn quad_source(q: usize, gx: u32, gy: u32, w: u32, h: u32) -> (u32, u32) {
    let hw = (w / 2).max(1);
    let hh = (h / 2).max(1);
    let (ox, oy) = (w - hw, h - hh);
    match q {
        0 => (hw - 1 - gx, hh - 1 - gy),
        1 => (ox + gy, hh - 1 - gx),
        2 => (ox + gx, oy + gy),
        _ => (hw - 1 - gy, oy + gx),
    }
}

/// Split a quad face image into four corner grids.
///
/// `dst[0]` and `dst[2]` must be `(w/2, h/2)` and `dst[1]`, `dst[3]` the
/// transpose, each side clamped to at least one texel.
pub fn quad_split(dst: [&mut ImageBuf; 4], src: &ImageBuf) -> Result<()> {
    let (w, h) = src.dimensions();
    if w == 0 || h == 0 {
        return Err(PtexError::Archive("cannot split an empty image".into()));
    }
    let half = ((w / 2).max(1), (h / 2).max(1));

    for (q, quad) in dst.into_iter().enumerate() {
        let expected = if q % 2 == 0 { half } else { (half.1, half.0) };
        check_split_size(quad, src, expected, q)?;
        for gy in 0..quad.height() {
            for gx in 0..quad.width() {
                let (px, py) = quad_source(q, gx, gy, w, h);
                quad.set_texel(gx, gy, &src.texel(px, py));
            }
        }
    }
    Ok(())
}

/// Reassemble a face image from four corner grids. Inverse of [`quad_split`]
/// for even-sized images.
pub fn quad_merge(src: [&ImageBuf; 4]) -> Result<ImageBuf> {
    let (hw, hh) = src[0].dimensions();
    let (w, h) = (hw * 2, hh * 2);
    let mut merged = ImageBuf::new(w, h, src[0].format())?;

    for (q, quad) in src.into_iter().enumerate() {
        let expected = if q % 2 == 0 { (hw, hh) } else { (hh, hw) };
        check_split_size(quad, &merged, expected, q)?;
        for gy in 0..quad.height() {
            for gx in 0..quad.width() {
                let (px, py) = quad_source(q, gx, gy, w, h);
                merged.set_texel(px, py, &quad.texel(gx, gy));
            }
        }
    }
    Ok(merged)
}

/// The primitives a pack or resize call needs, passed together.
#[derive(Clone, Copy)]
pub struct Primitives<'a> {
    pub resampler: &'a dyn Resampler,
    pub blender: &'a dyn BorderBlender,
    pub solver: &'a dyn LayoutSolver,
}

static DEFAULT_RESAMPLER: FilterResampler = FilterResampler(FilterType::Triangle);
static DEFAULT_BLENDER: AverageBlender = AverageBlender;
static DEFAULT_SOLVER: GuillotinePacker = GuillotinePacker {
    max_size: DEFAULT_MAX_ATLAS_SIZE,
};

impl Default for Primitives<'static> {
    fn default() -> Self {
        Self {
            resampler: &DEFAULT_RESAMPLER,
            blender: &DEFAULT_BLENDER,
            solver: &DEFAULT_SOLVER,
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::types::{DataType, TexelFormat};

    fn rgba(data_type: DataType) -> TexelFormat {
        TexelFormat::new(data_type, 4).unwrap()
    }

    fn numbered(w: u32, h: u32) -> ImageBuf {
        let mut buf = ImageBuf::new(w, h, rgba(DataType::Float32)).unwrap();
        for y in 0..h {
            for x in 0..w {
                buf.set_texel(x, y, &[x as f32, y as f32, 0.0, 1.0]);
            }
        }
        buf
    }

    fn split(src: &ImageBuf, hw: u32, hh: u32) -> [ImageBuf; 4] {
        let format = src.format();
        let mut q: [ImageBuf; 4] = [
            ImageBuf::new(hw, hh, format).unwrap(),
            ImageBuf::new(hh, hw, format).unwrap(),
            ImageBuf::new(hw, hh, format).unwrap(),
            ImageBuf::new(hh, hw, format).unwrap(),
        ];
        let [a, b, c, d] = &mut q;
        quad_split([a, b, c, d], src).unwrap();
        q
    }

    #[test]
    fn split_puts_far_corners_on_image_corners() {
        let src = numbered(8, 4);
        let q = split(&src, 4, 2);

        assert_eq!(q[0].texel(3, 1)[..2], [0.0, 0.0]);
        assert_eq!(q[1].texel(1, 3)[..2], [7.0, 0.0]);
        assert_eq!(q[2].texel(3, 1)[..2], [7.0, 3.0]);
        assert_eq!(q[3].texel(1, 3)[..2], [0.0, 3.0]);

        // Every (0, 0) touches the centre.
        assert_eq!(q[0].texel(0, 0)[..2], [3.0, 1.0]);
        assert_eq!(q[2].texel(0, 0)[..2], [4.0, 2.0]);
    }

    #[test]
    fn merge_inverts_split() {
        let src = numbered(8, 4);
        let q = split(&src, 4, 2);
        let merged = quad_merge([&q[0], &q[1], &q[2], &q[3]]).unwrap();
        assert_eq!(merged, src);
    }

    #[test]
    fn split_of_one_texel_image() {
        let src = numbered(1, 1);
        let q = split(&src, 1, 1);
        for quad in &q {
            assert_eq!(quad.texel(0, 0), src.texel(0, 0));
        }
    }

    #[test]
    fn split_rejects_wrong_quadrant_size() {
        let src = numbered(4, 4);
        let format = src.format();
        let mut a = ImageBuf::new(2, 2, format).unwrap();
        let mut b = ImageBuf::new(2, 2, format).unwrap();
        let mut c = ImageBuf::new(4, 2, format).unwrap();
        let mut d = ImageBuf::new(2, 2, format).unwrap();
        let err = quad_split([&mut a, &mut b, &mut c, &mut d], &src).unwrap_err();
        assert!(matches!(err, PtexError::Archive(_)));
    }

    #[test]
    fn resample_same_size_copies() {
        let src = numbered(4, 4);
        let mut dst = ImageBuf::new(4, 4, src.format()).unwrap();
        FilterResampler::default().resize(&mut dst, &src).unwrap();
        assert_eq!(dst, src);
    }

    #[test]
    fn resample_flat_colour_stays_flat() {
        let format = rgba(DataType::Uint8);
        let mut src = ImageBuf::new(8, 8, format).unwrap();
        src.fill(&[0.2, 0.4, 0.6, 1.0]).unwrap();
        let mut dst = ImageBuf::new(2, 4, format).unwrap();
        FilterResampler::default().resize(&mut dst, &src).unwrap();
        let t = dst.texel(1, 3);
        assert_abs_diff_eq!(t[0], 0.2, epsilon = 1.0 / 255.0);
        assert_abs_diff_eq!(t[2], 0.6, epsilon = 1.0 / 255.0);
    }

    #[test]
    fn resample_rejects_format_mismatch() {
        let src = numbered(4, 4);
        let mut dst = ImageBuf::new(2, 2, rgba(DataType::Uint8)).unwrap();
        assert!(FilterResampler::default().resize(&mut dst, &src).is_err());
    }

    type Neighbours = [(AtlasRegion, AdjacentEdge); 4];

    fn self_adjacent(rect: AtlasRegion) -> Neighbours {
        Side::ALL.map(|side| (rect, AdjacentEdge { side, reverse: true }))
    }

    #[test]
    fn self_adjacent_blend_is_noop() {
        let atlas = numbered(4, 4);
        let mut out = atlas.clone();
        let rect = atlas.bounds();
        AverageBlender
            .blend_borders(&mut out, &atlas, rect, &self_adjacent(rect))
            .unwrap();
        assert_eq!(out, atlas);
    }

    #[test]
    fn blend_averages_across_seam_and_skips_corners() {
        // Two 4x4 rects side by side; the right side of the left rect meets
        // the left side of the right rect.
        let mut atlas = ImageBuf::new(8, 4, rgba(DataType::Float32)).unwrap();
        let left = AtlasRegion::new(0, 0, 4, 4);
        let right = AtlasRegion::new(4, 0, 4, 4);
        for y in 0..4 {
            for x in 0..8 {
                let v = if x < 4 { 0.0 } else { 1.0 };
                atlas.set_texel(x, y, &[v, v, v, 1.0]);
            }
        }
        let snapshot = atlas.clone();

        let mut adjacent = self_adjacent(left);
        adjacent[Side::Right as usize] = (
            right,
            AdjacentEdge {
                side: Side::Left,
                reverse: true,
            },
        );
        AverageBlender
            .blend_borders(&mut atlas, &snapshot, left, &adjacent)
            .unwrap();

        assert_eq!(atlas.texel(3, 1)[0], 0.5);
        assert_eq!(atlas.texel(3, 2)[0], 0.5);
        assert_eq!(atlas.texel(3, 0)[0], 0.0);
        assert_eq!(atlas.texel(3, 3)[0], 0.0);
        assert_eq!(atlas.texel(2, 1)[0], 0.0);
    }

    /// A 4x4 rect whose right side meets the left side of an 8x8 rect.
    fn mixed_seam() -> (ImageBuf, Vec<(AtlasRegion, Neighbours)>) {
        let mut atlas = ImageBuf::new(12, 8, rgba(DataType::Float32)).unwrap();
        for y in 0..8 {
            for x in 0..12 {
                atlas.set_texel(x, y, &[x as f32 / 12.0, y as f32 / 8.0, 0.3, 1.0]);
            }
        }
        let small = AtlasRegion::new(0, 0, 4, 4);
        let large = AtlasRegion::new(4, 0, 8, 8);
        let edge = |side| AdjacentEdge { side, reverse: true };

        let mut small_adj = self_adjacent(small);
        small_adj[Side::Right as usize] = (large, edge(Side::Left));
        let mut large_adj = self_adjacent(large);
        large_adj[Side::Left as usize] = (small, edge(Side::Right));
        (atlas, vec![(small, small_adj), (large, large_adj)])
    }

    fn blend_pass(atlas: &mut ImageBuf, rects: &[(AtlasRegion, Neighbours)]) {
        let snapshot = atlas.clone();
        for (rect, adjacent) in rects {
            AverageBlender
                .blend_borders(atlas, &snapshot, *rect, adjacent)
                .unwrap();
        }
    }

    #[test]
    fn mixed_size_seam_agrees_on_both_sides() {
        let (mut atlas, rects) = mixed_seam();
        blend_pass(&mut atlas, &rects);

        // Texel 1 down the small side covers texels 2 and 3 of the large one.
        for j in 1..3 {
            let small = atlas.texel(3, j);
            assert_eq!(atlas.texel(4, 2 * j), small);
            assert_eq!(atlas.texel(4, 2 * j + 1), small);
        }
        // Corners and the large side's end blocks are untouched.
        assert_eq!(atlas.texel(3, 0)[0], 3.0 / 12.0);
        assert_eq!(atlas.texel(4, 1)[0], 4.0 / 12.0);
        assert_eq!(atlas.texel(4, 7)[0], 4.0 / 12.0);
    }

    #[test]
    fn mixed_size_seam_is_a_fixed_point() {
        let (mut atlas, rects) = mixed_seam();
        blend_pass(&mut atlas, &rects);
        let once = atlas.clone();
        blend_pass(&mut atlas, &rects);
        assert_eq!(atlas, once);
    }

    #[test]
    fn thin_rect_sides_are_not_blended() {
        let mut atlas = ImageBuf::new(5, 4, rgba(DataType::Float32)).unwrap();
        atlas.set_texel(4, 1, &[1.0, 1.0, 1.0, 1.0]);
        let wide = AtlasRegion::new(0, 0, 4, 4);
        let thin = AtlasRegion::new(4, 0, 1, 4);
        let mut adjacent = self_adjacent(wide);
        adjacent[Side::Right as usize] = (
            thin,
            AdjacentEdge {
                side: Side::Left,
                reverse: true,
            },
        );
        let snapshot = atlas.clone();
        AverageBlender
            .blend_borders(&mut atlas, &snapshot, wide, &adjacent)
            .unwrap();
        assert_eq!(atlas, snapshot);
    }

    #[test]
    fn blend_rejects_rect_outside_atlas() {
        let atlas = numbered(4, 4);
        let mut out = atlas.clone();
        let rect = AtlasRegion::new(2, 2, 4, 4);
        assert!(
            AverageBlender
                .blend_borders(&mut out, &atlas, rect, &self_adjacent(rect))
                .is_err()
        );
    }

    #[test]
    fn default_primitives_use_configured_limit() {
        let prims = Primitives::default();
        let items = [crate::tiling::layout::LayoutItem {
            key: 0,
            width: 2 * DEFAULT_MAX_ATLAS_SIZE,
            height: 1,
        }];
        assert!(prims.solver.solve(&items).is_err());
    }
}
