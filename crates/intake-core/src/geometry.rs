//! Page-space geometry
//!
//! Rectangles are in PDF points with the origin at the top-left corner of the
//! page and y growing downward, which is also the raster's orientation. Engines
//! that report bottom-left-origin boxes convert through [`Rect::from_pdf_box`].

use serde::{Deserialize, Serialize};

use crate::error::{IntakeError, Result};

/// US Letter, used when a page does not declare its own size
pub const LETTER: PageSize = PageSize {
    width: 612.0,
    height: 792.0,
};

/// Largest page side a PDF may declare (14400 user units)
pub const MAX_PAGE_POINTS: f64 = 14_400.0;

/// Largest raster produced for one page, in pixels. Letter at the maximum
/// zoom of 8 is about 31 million.
pub const MAX_RASTER_PIXELS: u64 = 64 * 1024 * 1024;

/// Page dimensions in points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Finite, non-negative and no larger than [`MAX_PAGE_POINTS`] per side
    pub fn within_pdf_limits(&self) -> bool {
        let side_ok = |v: f64| v.is_finite() && (0.0..=MAX_PAGE_POINTS).contains(&v);
        side_ok(self.width) && side_ok(self.height)
    }

    /// Raster dimensions at the given zoom, never smaller than 1x1.
    ///
    /// Fails with [`IntakeError::Render`] when the raster would exceed
    /// [`MAX_RASTER_PIXELS`].
    pub fn pixels(&self, zoom: f32) -> Result<(u32, u32)> {
        let zoom = f64::from(zoom);
        let w = (self.width * zoom).round().max(1.0);
        let h = (self.height * zoom).round().max(1.0);
        if !(w * h).is_finite() || w * h > MAX_RASTER_PIXELS as f64 {
            return Err(IntakeError::Render(format!(
                "{}x{}pt page at zoom {} exceeds the {} pixel raster budget",
                self.width, self.height, zoom, MAX_RASTER_PIXELS
            )));
        }
        Ok((w as u32, h as u32))
    }
}

/// Bounding rectangle in page space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Rect {
    /// Create a rectangle, normalizing so that `x0 <= x1` and `y0 <= y1`
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    /// Convert a PDF box (bottom-left origin) into page space.
    pub fn from_pdf_box(left: f64, bottom: f64, right: f64, top: f64, page_height: f64) -> Self {
        Self::new(left, page_height - top, right, page_height - bottom)
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    /// Multiply every coordinate by the zoom factor
    pub fn scaled(&self, zoom: f32) -> Self {
        let z = f64::from(zoom);
        Self {
            x0: self.x0 * z,
            y0: self.y0 * z,
            x1: self.x1 * z,
            y1: self.y1 * z,
        }
    }

    /// Smallest rectangle covering both
    pub fn union(&self, other: &Rect) -> Self {
        Self {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Pixel bounds `(left, top, right, bottom)` of this rectangle on a raster
    /// rendered at `zoom`, clamped to `width x height`. Inclusive on all sides.
    ///
    /// Returns `None` when the rectangle lies entirely outside the raster.
    pub fn pixel_bounds(&self, zoom: f32, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        if width == 0 || height == 0 {
            return None;
        }
        let scaled = self.scaled(zoom);
        let max_x = f64::from(width - 1);
        let max_y = f64::from(height - 1);

        if scaled.x1 < 0.0 || scaled.y1 < 0.0 || scaled.x0 > max_x || scaled.y0 > max_y {
            return None;
        }

        let left = scaled.x0.floor().clamp(0.0, max_x) as u32;
        let top = scaled.y0.floor().clamp(0.0, max_y) as u32;
        let right = scaled.x1.ceil().clamp(0.0, max_x) as u32;
        let bottom = scaled.y1.ceil().clamp(0.0, max_y) as u32;
        Some((left, top, right, bottom))
    }

    /// Stable key for memoizing renders, since f64 is not `Hash`
    pub(crate) fn cache_key(&self) -> [u64; 4] {
        [
            self.x0.to_bits(),
            self.y0.to_bits(),
            self.x1.to_bits(),
            self.y1.to_bits(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes_corners() {
        let r = Rect::new(100.0, 50.0, 10.0, 5.0);
        assert_eq!(r, Rect::new(10.0, 5.0, 100.0, 50.0));
        assert_eq!(r.width(), 90.0);
        assert_eq!(r.height(), 45.0);
    }

    #[test]
    fn test_pdf_box_flips_y_axis() {
        // A box 100pt above the bottom of a Letter page
        let r = Rect::from_pdf_box(72.0, 100.0, 172.0, 112.0, 792.0);
        assert_eq!(r.x0, 72.0);
        assert_eq!(r.y0, 680.0);
        assert_eq!(r.y1, 692.0);
    }

    #[test]
    fn test_scaled_by_default_zoom() {
        let r = Rect::new(10.0, 20.0, 30.0, 40.0).scaled(2.5);
        assert_eq!(r, Rect::new(25.0, 50.0, 75.0, 100.0));
    }

    #[test]
    fn test_pixel_bounds_clamps_to_raster() {
        let r = Rect::new(-10.0, 10.0, 1000.0, 20.0);
        let bounds = r.pixel_bounds(1.0, 612, 792).unwrap();
        assert_eq!(bounds, (0, 10, 611, 20));
    }

    #[test]
    fn test_pixel_bounds_outside_raster() {
        let r = Rect::new(700.0, 10.0, 720.0, 20.0);
        assert!(r.pixel_bounds(1.0, 612, 792).is_none());
    }

    #[test]
    fn test_page_pixels_never_zero() {
        let size = PageSize::new(0.2, 0.2);
        assert_eq!(size.pixels(1.0).unwrap(), (1, 1));
        assert_eq!(LETTER.pixels(2.5).unwrap(), (1530, 1980));
        assert_eq!(LETTER.pixels(8.0).unwrap(), (4896, 6336));
    }

    #[test]
    fn test_page_pixels_over_budget() {
        let largest = PageSize::new(MAX_PAGE_POINTS, MAX_PAGE_POINTS);
        assert!(matches!(largest.pixels(8.0), Err(IntakeError::Render(_))));

        let absurd = PageSize::new(2.0e9, 2.0e9);
        assert!(matches!(absurd.pixels(2.5), Err(IntakeError::Render(_))));
        assert!(matches!(
            PageSize::new(f64::INFINITY, 10.0).pixels(1.0),
            Err(IntakeError::Render(_))
        ));
    }

    #[test]
    fn test_pdf_limits() {
        assert!(LETTER.within_pdf_limits());
        assert!(PageSize::new(MAX_PAGE_POINTS, 1.0).within_pdf_limits());
        assert!(!PageSize::new(MAX_PAGE_POINTS + 1.0, 1.0).within_pdf_limits());
        assert!(!PageSize::new(2.0e9, 2.0e9).within_pdf_limits());
        assert!(!PageSize::new(f64::NAN, 10.0).within_pdf_limits());
    }
}
