use serde::{Deserialize, Serialize};

/// Rectangle of texels inside a packed atlas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AtlasRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl AtlasRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// One past the last column. Widened so it cannot overflow.
    pub fn x_end(&self) -> u64 {
        u64::from(self.x) + u64::from(self.width)
    }

    /// One past the last row.
    pub fn y_end(&self) -> u64 {
        u64::from(self.y) + u64::from(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether the two rectangles share at least one texel.
    pub fn overlaps(&self, other: &AtlasRegion) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && u64::from(self.x) < other.x_end()
            && u64::from(other.x) < self.x_end()
            && u64::from(self.y) < other.y_end()
            && u64::from(other.y) < self.y_end()
    }

    /// Whether the rectangle lies inside a `width` x `height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x_end() <= u64::from(width) && self.y_end() <= u64::from(height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_detection() {
        let a = AtlasRegion::new(0, 0, 4, 4);
        assert!(a.overlaps(&AtlasRegion::new(3, 3, 4, 4)));
        assert!(!a.overlaps(&AtlasRegion::new(4, 0, 4, 4))); // touching edge
        assert!(!a.overlaps(&AtlasRegion::new(0, 4, 2, 2)));
        assert!(!a.overlaps(&AtlasRegion::new(1, 1, 0, 2)));
    }

    #[test]
    fn fits_within_bounds() {
        let r = AtlasRegion::new(2, 2, 2, 2);
        assert!(r.fits_within(4, 4));
        assert!(!r.fits_within(3, 4));
        assert_eq!((r.x_end(), r.y_end()), (4, 4));
    }

    #[test]
    fn far_corner_does_not_overflow() {
        let r = AtlasRegion::new(u32::MAX - 1, 0, 4, u32::MAX);
        assert_eq!(r.x_end(), u64::from(u32::MAX) + 3);
        assert!(!r.fits_within(u32::MAX, u32::MAX));
        assert!(r.overlaps(&AtlasRegion::new(u32::MAX, 5, 1, 1)));
        assert!(AtlasRegion::new(0, 0, u32::MAX, u32::MAX).fits_within(u32::MAX, u32::MAX));
    }
}
