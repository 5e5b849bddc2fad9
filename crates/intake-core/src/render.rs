//! Highlight renderer
//!
//! Rasterizes a page at a zoom factor and draws the outline of the selected
//! rectangle on top. Rectangles are page-space points; they are scaled by the
//! same zoom before drawing and clamped to the raster.

use std::io::Cursor;

use image::{ImageFormat, Rgba, RgbaImage};

use crate::document::Page;
use crate::error::{IntakeError, Result};
use crate::geometry::Rect;

/// Default rasterization scale
pub const DEFAULT_ZOOM: f32 = 2.5;

/// Outline appearance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HighlightStyle {
    pub color: Rgba<u8>,
    /// Stroke width in raster pixels
    pub stroke: u32,
}

impl HighlightStyle {
    pub fn new(rgba: [u8; 4], stroke: u32) -> Self {
        Self {
            color: Rgba(rgba),
            stroke,
        }
    }
}

impl Default for HighlightStyle {
    fn default() -> Self {
        Self {
            color: Rgba([255, 0, 0, 255]),
            stroke: 2,
        }
    }
}

/// Zoom must be finite and within `(0, max]`
pub fn validate_zoom(zoom: f32, max: f32) -> Result<()> {
    if zoom.is_finite() && zoom > 0.0 && zoom <= max {
        Ok(())
    } else {
        Err(IntakeError::InvalidZoom { zoom, max })
    }
}

/// Render `page` at `zoom`, outlining `highlight` when present.
///
/// The raster budget is checked against the page size before the engine
/// allocates anything.
pub fn render(
    page: &Page<'_>,
    highlight: Option<Rect>,
    zoom: f32,
    style: &HighlightStyle,
) -> Result<RgbaImage> {
    page.size()?.pixels(zoom)?;
    let mut image = page.rasterize(zoom)?;
    if let Some(rect) = highlight {
        draw_outline(&mut image, &rect, zoom, style);
    }
    Ok(image)
}

fn draw_outline(image: &mut RgbaImage, rect: &Rect, zoom: f32, style: &HighlightStyle) {
    let (width, height) = image.dimensions();
    let Some((left, top, right, bottom)) = rect.pixel_bounds(zoom, width, height) else {
        return;
    };
    let stroke = style.stroke.max(1);

    for y in top..=bottom {
        for x in left..=right {
            let on_edge = x - left < stroke
                || right - x < stroke
                || y - top < stroke
                || bottom - y < stroke;
            if on_edge {
                image.put_pixel(x, y, style.color);
            }
        }
    }
}

/// PNG bytes of a rendered preview
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| IntakeError::Render(e.to_string()))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::engine::text::TextDocument;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    fn blank_doc() -> TextDocument {
        TextDocument::from_pages([""])
    }

    #[test]
    fn test_plain_render_has_no_outline() {
        let doc = blank_doc();
        let doc: &dyn Document = &doc;
        let image = render(&doc.page(1).unwrap(), None, 1.0, &HighlightStyle::default()).unwrap();
        assert!(image.pixels().all(|p| *p == WHITE));
    }

    #[test]
    fn test_outline_is_scaled_by_zoom() {
        let doc = blank_doc();
        let doc: &dyn Document = &doc;
        let rect = Rect::new(100.0, 100.0, 200.0, 150.0);
        let image = render(&doc.page(1).unwrap(), Some(rect), 2.0, &HighlightStyle::default()).unwrap();

        assert_eq!(image.dimensions(), (1224, 1584));
        // Corners and edges at 2x
        assert_eq!(*image.get_pixel(200, 200), RED);
        assert_eq!(*image.get_pixel(201, 250), RED);
        assert_eq!(*image.get_pixel(400, 300), RED);
        assert_eq!(*image.get_pixel(300, 299), RED);
        // Interior and outside untouched
        assert_eq!(*image.get_pixel(300, 250), WHITE);
        assert_eq!(*image.get_pixel(100, 100), WHITE);
        assert_eq!(*image.get_pixel(202, 250), WHITE);
    }

    #[test]
    fn test_outline_clamped_to_raster() {
        let doc = blank_doc();
        let doc: &dyn Document = &doc;
        let rect = Rect::new(500.0, 700.0, 900.0, 1000.0);
        let image = render(&doc.page(1).unwrap(), Some(rect), 1.0, &HighlightStyle::default()).unwrap();
        assert_eq!(*image.get_pixel(500, 750), RED);
        assert_eq!(*image.get_pixel(611, 791), RED);
    }

    #[test]
    fn test_outline_outside_raster_is_skipped() {
        let doc = blank_doc();
        let doc: &dyn Document = &doc;
        let rect = Rect::new(2000.0, 2000.0, 2100.0, 2100.0);
        let image = render(&doc.page(1).unwrap(), Some(rect), 1.0, &HighlightStyle::default()).unwrap();
        assert!(image.pixels().all(|p| *p == WHITE));
    }

    /// Declares the largest legal page; rasterizing it at zoom 8 must never
    /// be attempted.
    struct PosterDocument;

    impl Document for PosterDocument {
        fn page_count(&self) -> u32 {
            1
        }

        fn page_size(&self, _page: u32) -> Result<crate::geometry::PageSize> {
            Ok(crate::geometry::PageSize::new(14_400.0, 14_400.0))
        }

        fn page_text(&self, _page: u32) -> Result<String> {
            Ok(String::new())
        }

        fn search_page(&self, _page: u32, _literal: &str) -> Result<Vec<Rect>> {
            Ok(Vec::new())
        }

        fn rasterize_page(&self, _page: u32, _zoom: f32) -> Result<RgbaImage> {
            panic!("rasterizer reached for an over-budget page");
        }
    }

    #[test]
    fn test_render_refuses_over_budget_page() {
        let doc = PosterDocument;
        let doc: &dyn Document = &doc;
        let result = render(&doc.page(1).unwrap(), None, 8.0, &HighlightStyle::default());
        assert!(matches!(result, Err(IntakeError::Render(_))));
    }

    #[test]
    fn test_validate_zoom() {
        assert!(validate_zoom(DEFAULT_ZOOM, 8.0).is_ok());
        assert!(validate_zoom(8.0, 8.0).is_ok());
        assert!(validate_zoom(0.0, 8.0).is_err());
        assert!(validate_zoom(-1.0, 8.0).is_err());
        assert!(validate_zoom(8.5, 8.0).is_err());
        assert!(validate_zoom(f32::NAN, 8.0).is_err());
        assert!(validate_zoom(f32::INFINITY, 8.0).is_err());
    }

    #[test]
    fn test_encode_png_signature() {
        let image = RgbaImage::from_pixel(4, 3, WHITE);
        let bytes = encode_png(&image).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }
}
