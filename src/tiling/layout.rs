use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::{PtexError, Result};
use crate::types::AtlasRegion;

/// Upper bound on either atlas side unless configured otherwise.
pub const DEFAULT_MAX_ATLAS_SIZE: u32 = 1 << 15;

/// One rectangle to place, identified by a caller-chosen key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutItem {
    pub key: usize,
    pub width: u32,
    pub height: u32,
}

/// Finalised layout: total size plus one region per key.
#[derive(Debug, Clone, Default)]
pub struct Layout {
    pub width: u32,
    pub height: u32,
    regions: HashMap<usize, AtlasRegion>,
}

impl Layout {
    pub fn region(&self, key: usize) -> Option<AtlasRegion> {
        self.regions.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Bin-packing layout solver.
pub trait LayoutSolver {
    /// Place every item without overlap. Regions keep the item's size.
    fn solve(&self, items: &[LayoutItem]) -> Result<Layout>;
}

/// Collects rectangles, then hands them to a solver.
#[derive(Debug, Default)]
pub struct PackedLayout {
    items: Vec<LayoutItem>,
}

impl PackedLayout {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    pub fn add(&mut self, width: u32, height: u32, key: usize) {
        self.items.push(LayoutItem { key, width, height });
    }

    pub fn finalize(self, solver: &dyn LayoutSolver) -> Result<Layout> {
        solver.solve(&self.items)
    }
}

/// A free rectangle in the guillotine packer.
#[derive(Clone)]
struct FreeRect {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
}

/// Guillotine bin packing with Best Short Side Fit.
///
/// Sorts items by max dimension descending and places each using BSSF.
/// Grows the trial area (doubles the smaller dimension) until everything
/// fits or `max_size` is exceeded.
#[derive(Debug, Clone, Copy)]
pub struct GuillotinePacker {
    pub max_size: u32,
}

impl Default for GuillotinePacker {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_ATLAS_SIZE,
        }
    }
}

impl LayoutSolver for GuillotinePacker {
    fn solve(&self, items: &[LayoutItem]) -> Result<Layout> {
        if items.is_empty() {
            return Ok(Layout::default());
        }
        if let Some(item) = items.iter().find(|i| i.width == 0 || i.height == 0) {
            return Err(PtexError::Primitive(format!(
                "layout item {} has zero size",
                item.key
            )));
        }

        // Sort by max dimension descending, then by min dimension
        let mut order: Vec<usize> = (0..items.len()).collect();
        order.sort_by(|&a, &b| {
            let (ia, ib) = (&items[a], &items[b]);
            let key_a = (ia.width.max(ia.height), ia.width.min(ia.height));
            let key_b = (ib.width.max(ib.height), ib.width.min(ib.height));
            key_b.cmp(&key_a)
        });

        // Start with the largest item, rounded up
        let first = &items[order[0]];
        let mut atlas_w = first.width.next_power_of_two();
        let mut atlas_h = first.height.next_power_of_two();

        loop {
            if atlas_w > self.max_size || atlas_h > self.max_size {
                warn!(
                    atlas_w,
                    atlas_h,
                    max_size = self.max_size,
                    "Atlas size limit exceeded"
                );
                return Err(PtexError::Primitive(format!(
                    "{} rectangles do not fit in a {}x{} atlas",
                    items.len(),
                    self.max_size,
                    self.max_size
                )));
            }

            if let Some(regions) = try_pack(&order, items, atlas_w, atlas_h) {
                let (width, height) = compute_atlas_size(&regions);
                debug!(
                    items = items.len(),
                    width, height, "Layout finalised"
                );
                return Ok(Layout {
                    width,
                    height,
                    regions: regions.into_iter().collect(),
                });
            }

            // Grow: double the smaller dimension
            if atlas_w <= atlas_h {
                atlas_w = atlas_w.saturating_mul(2);
            } else {
                atlas_h = atlas_h.saturating_mul(2);
            }
        }
    }
}

fn try_pack(
    order: &[usize],
    items: &[LayoutItem],
    atlas_w: u32,
    atlas_h: u32,
) -> Option<Vec<(usize, AtlasRegion)>> {
    let mut free_rects = vec![FreeRect {
        x: 0,
        y: 0,
        w: atlas_w,
        h: atlas_h,
    }];

    let mut placements = Vec::with_capacity(order.len());

    for &idx in order {
        let item = &items[idx];

        let best = find_bssf(&free_rects, item.width, item.height)?;
        let rect = free_rects.swap_remove(best);

        placements.push((
            item.key,
            AtlasRegion::new(rect.x, rect.y, item.width, item.height),
        ));

        guillotine_split(&mut free_rects, &rect, item.width, item.height);
    }

    Some(placements)
}

fn find_bssf(free_rects: &[FreeRect], w: u32, h: u32) -> Option<usize> {
    let mut best_idx = None;
    let mut best_short_side = u32::MAX;

    for (i, rect) in free_rects.iter().enumerate() {
        if rect.w >= w && rect.h >= h {
            let short_side = (rect.w - w).min(rect.h - h);
            if short_side < best_short_side {
                best_short_side = short_side;
                best_idx = Some(i);
            }
        }
    }

    best_idx
}

fn guillotine_split(free_rects: &mut Vec<FreeRect>, rect: &FreeRect, w: u32, h: u32) {
    let right_w = rect.w - w;
    let below_h = rect.h - h;

    if right_w > 0 {
        free_rects.push(FreeRect {
            x: rect.x + w,
            y: rect.y,
            w: right_w,
            h,
        });
    }

    if below_h > 0 {
        free_rects.push(FreeRect {
            x: rect.x,
            y: rect.y + h,
            w: rect.w,
            h: below_h,
        });
    }
}

/// Tight bounds around all placed regions.
///
/// Regions come from the packer and stay within `max_size`, so the
/// bounds fit in `u32`.
fn compute_atlas_size(regions: &[(usize, AtlasRegion)]) -> (u32, u32) {
    let (w, h) = regions.iter().fold((0u64, 0u64), |(w, h), (_, r)| {
        (w.max(r.x_end()), h.max(r.y_end()))
    });
    (clamp_u32(w), clamp_u32(h))
}

fn clamp_u32(v: u64) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}
