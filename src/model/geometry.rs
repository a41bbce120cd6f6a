//! Page geometry in PDF user space (origin bottom-left, y grows upward).

use serde::{Deserialize, Serialize};

/// An axis-aligned box in page units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    /// Area over integer-truncated corners, `(int(x2)-int(x1)) * (int(y2)-int(y1))`.
    pub fn truncated_area(&self) -> i64 {
        (self.x2 as i64 - self.x1 as i64) * (self.y2 as i64 - self.y1 as i64)
    }

    pub fn union(&self, other: &Self) -> Self {
        Self {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) * 0.5, (self.y1 + self.y2) * 0.5)
    }

    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.x1 && x <= self.x2 && y >= self.y1 && y <= self.y2
    }

    /// Whether the two boxes share any area.
    pub fn intersects(&self, other: &Self) -> bool {
        self.x1 < other.x2 && other.x1 < self.x2 && self.y1 < other.y2 && other.y1 < self.y2
    }

    /// Horizontal overlap length with another box.
    pub fn horizontal_overlap(&self, other: &Self) -> f32 {
        (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0)
    }

    /// Normalize against the page size.
    pub fn relative_to(&self, page: PageSize) -> RelativeBox {
        let w = if page.width > 0.0 { page.width } else { 1.0 };
        let h = if page.height > 0.0 { page.height } else { 1.0 };
        RelativeBox {
            x1: self.x1 / w,
            y1: self.y1 / h,
            x2: self.x2 / w,
            y2: self.y2 / h,
        }
    }
}

/// A box expressed as fractions of the page width and height.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RelativeBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl RelativeBox {
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }
}

/// Page dimensions taken from the MediaBox.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl Default for PageSize {
    /// US Letter, used when a page carries no usable MediaBox.
    fn default() -> Self {
        Self {
            width: 612.0,
            height: 792.0,
        }
    }
}
