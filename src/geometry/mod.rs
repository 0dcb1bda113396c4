//! Geometry primitives
//!
//! Bounding boxes in document space (typographic points, origin top-left),
//! Intersection-over-Union, and the invertible transform between document
//! space and the raster-pixel space of a page rendered at a given scale.

use serde::{Deserialize, Serialize};

use crate::document::{DocumentError, PageRenderer};

/// Axis-aligned rectangle in document-space points
///
/// Serialized as a 4-element `[x0, y0, x1, y1]` array to match the on-disk
/// record format. Corner order (`x0 <= x1`, `y0 <= y1`) is enforced at
/// construction; raw detector output may arrive with swapped corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BoundingBox {
    /// Create a box, normalizing corner order
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Area of the overlap with another box, zero when disjoint
    pub fn intersection_area(&self, other: &BoundingBox) -> f64 {
        let w = (self.x1.min(other.x1) - self.x0.max(other.x0)).max(0.0);
        let h = (self.y1.min(other.y1) - self.y0.max(other.y0)).max(0.0);
        w * h
    }

    /// Intersection-over-Union with another box
    ///
    /// Defined as 0.0 when the union area is zero, so degenerate boxes never
    /// match anything.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let inter = self.intersection_area(other);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            return 0.0;
        }
        inter / union
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from(v: [f64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x0, b.y0, b.x1, b.y1]
    }
}

/// Document-space ↔ raster-pixel mapping for one rendered page
///
/// Valid only for the `(page, scale)` pair it was built for; rebuild whenever
/// either changes. `to_pixel` and `to_document` are mutually inverse up to
/// rounding.
#[derive(Debug, Clone, Copy)]
pub struct PageTransform {
    scale: f64,
    page_width: f64,
    page_height: f64,
}

impl PageTransform {
    /// Build the transform for a page rendered at `scale` pixels per point
    ///
    /// Fails with [`DocumentError::PageOutOfRange`] when the page index is
    /// outside `[0, page_count)`.
    pub fn for_page(
        renderer: &dyn PageRenderer,
        page: usize,
        scale: f64,
    ) -> Result<Self, DocumentError> {
        let page_count = renderer.page_count();
        if page >= page_count {
            return Err(DocumentError::PageOutOfRange { page, page_count });
        }
        let (page_width, page_height) = renderer.page_size_points(page)?;
        Ok(Self {
            scale,
            page_width,
            page_height,
        })
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Page size in document-space points
    pub fn page_size_points(&self) -> (f64, f64) {
        (self.page_width, self.page_height)
    }

    /// Raster width of the rendered page in pixels
    pub fn pixel_width(&self) -> u32 {
        (self.page_width * self.scale).round() as u32
    }

    /// Raster height of the rendered page in pixels
    pub fn pixel_height(&self) -> u32 {
        (self.page_height * self.scale).round() as u32
    }

    pub fn to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (x * self.scale, y * self.scale)
    }

    pub fn to_document(&self, px: f64, py: f64) -> (f64, f64) {
        (px / self.scale, py / self.scale)
    }

    /// Map a document-space box to raster pixels
    pub fn box_to_pixel(&self, bbox: &BoundingBox) -> BoundingBox {
        let (px0, py0) = self.to_pixel(bbox.x0, bbox.y0);
        let (px1, py1) = self.to_pixel(bbox.x1, bbox.y1);
        BoundingBox::new(px0, py0, px1, py1)
    }
}
