use crate::annotation::PixelPoint;
use crate::session::PageView;

/// A page's physical dimensions, in the document's native units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalSize {
    pub width: f32,
    pub height: f32,
}

impl PhysicalSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// A point in physical page space: origin bottom-left, y growing upward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalPoint {
    pub x: f32,
    pub y: f32,
}

/// Maps overlay-pixel coordinates (origin top-left, y down) onto one page's
/// physical coordinates (origin bottom-left, y up).
///
/// Built fresh at export time from the current page view and the mutator's
/// reported physical size; never cached across renders.
#[derive(Debug, Clone, Copy)]
pub struct PageTransform {
    scale_x: f32,
    scale_y: f32,
    physical_height: f32,
}

impl PageTransform {
    pub fn new(view: PageView, physical: PhysicalSize) -> Self {
        Self {
            scale_x: physical.width / view.pixel_width as f32,
            scale_y: physical.height / view.pixel_height as f32,
            physical_height: physical.height,
        }
    }

    pub fn scale_x(&self) -> f32 {
        self.scale_x
    }

    pub fn scale_y(&self) -> f32 {
        self.scale_y
    }

    pub fn to_physical(&self, point: PixelPoint) -> PhysicalPoint {
        PhysicalPoint {
            x: point.x * self.scale_x,
            y: self.physical_height - point.y * self.scale_y,
        }
    }

    /// Baseline position for text anchored at a visual top-left click point:
    /// one font size below the flipped anchor. Exported text relies on this
    /// exact offset to line up with the on-screen overlay.
    pub fn text_baseline(&self, anchor: PixelPoint, font_size: f32) -> PhysicalPoint {
        let point = self.to_physical(anchor);
        PhysicalPoint {
            x: point.x,
            y: point.y - font_size,
        }
    }
}
