//! Render-target geometry: one shared eye buffer split into two side-by-side viewports.

use crate::hmd::Eye;

/// A size in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Sizei {
    pub width: u32,
    pub height: u32,
}

impl Sizei {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// A pixel rectangle inside a render target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Recti {
    pub x: u32,
    pub y: u32,
    pub size: Sizei,
}

impl Recti {
    pub const fn new(x: u32, y: u32, size: Sizei) -> Self {
        Self { x, y, size }
    }

    /// One past the right-most column.
    pub const fn right(&self) -> u32 {
        self.x + self.size.width
    }

    /// One past the bottom-most row.
    pub const fn bottom(&self) -> u32 {
        self.y + self.size.height
    }

    pub const fn overlaps(&self, other: &Self) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

/// Size of the combined eye buffer and the viewport each eye renders into.
///
/// Computed once after the session is created and never changed afterwards; the eye,
/// depth and resolve buffers are all created at exactly [`RenderTargetGeometry::size`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargetGeometry {
    pub size: Sizei,
    pub viewports: [Recti; 2],
}

impl RenderTargetGeometry {
    /// Combines the per-eye recommended sizes into one buffer wide enough for both eyes.
    ///
    /// Both eyes get the same viewport size: half the combined width (rounded down) by
    /// the full height. Devices whose eyes need different sizes are not supported.
    pub fn from_eye_sizes(left: Sizei, right: Sizei) -> Self {
        let size = Sizei::new(left.width + right.width, left.height.max(right.height));
        let half = Sizei::new(size.width / 2, size.height);

        Self {
            size,
            viewports: [
                Recti::new(0, 0, half),
                // Right eye starts after the rounded-up half when the width is odd.
                Recti::new(size.width.div_ceil(2), 0, half),
            ],
        }
    }

    pub fn viewport(&self, eye: Eye) -> Recti {
        self.viewports[eye.index()]
    }

    /// Whether both viewports fit inside the buffer without overlapping.
    pub fn is_valid(&self) -> bool {
        let [left, right] = &self.viewports;
        !left.overlaps(right)
            && self
                .viewports
                .iter()
                .all(|vp| vp.right() <= self.size.width && vp.bottom() <= self.size.height)
    }
}
