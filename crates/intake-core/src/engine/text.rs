//! Plain-text engine
//!
//! Treats the upload as UTF-8 text with pages separated by form feeds (the
//! separator PDF text extractors emit between pages). Each page is laid out on
//! a fixed monospace grid so that search returns real rectangles and previews
//! show where text sits. Used for fixtures and for plain-text intake.

use image::RgbaImage;

use super::layout::{fill_glyph, PAPER};
use crate::document::{Document, PageNumber, PdfEngine};
use crate::error::{IntakeError, Result};
use crate::geometry::{PageSize, Rect, LETTER};

/// Left and top margin of the layout grid, in points
pub const MARGIN: f64 = 36.0;
/// Width of one character cell, in points
pub const CHAR_WIDTH: f64 = 6.0;
/// Height of one line, in points
pub const LINE_HEIGHT: f64 = 12.0;

const PAGE_SEPARATOR: char = '\x0C';

#[derive(Debug, Default, Clone, Copy)]
pub struct TextEngine;

impl PdfEngine for TextEngine {
    fn name(&self) -> &'static str {
        "text"
    }

    fn open(&self, bytes: &[u8]) -> Result<Box<dyn Document>> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| IntakeError::MalformedUpload(format!("Upload is not UTF-8 text: {}", e)))?;
        Ok(Box::new(TextDocument::parse(text)))
    }
}

/// Text pages laid out on a monospace grid
#[derive(Debug, Clone, Default)]
pub struct TextDocument {
    pages: Vec<String>,
}

impl TextDocument {
    pub fn from_pages<I, S>(pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pages: pages.into_iter().map(Into::into).collect(),
        }
    }

    /// Split on form feeds. Empty input has zero pages; a trailing separator
    /// does not start a new page.
    pub fn parse(text: &str) -> Self {
        if text.is_empty() {
            return Self::default();
        }
        let body = text.strip_suffix(PAGE_SEPARATOR).unwrap_or(text);
        Self::from_pages(body.split(PAGE_SEPARATOR))
    }

    fn page_str(&self, page: PageNumber) -> Result<&str> {
        self.pages
            .get(page.wrapping_sub(1) as usize)
            .map(String::as_str)
            .ok_or(IntakeError::PageOutOfRange {
                page,
                page_count: self.page_count(),
            })
    }
}

/// Grid cell of the character at `(row, column)`
fn cell(row: usize, column: usize, len: usize) -> Rect {
    let x0 = MARGIN + column as f64 * CHAR_WIDTH;
    let y0 = MARGIN + row as f64 * LINE_HEIGHT;
    Rect::new(x0, y0, x0 + len as f64 * CHAR_WIDTH, y0 + LINE_HEIGHT)
}

impl Document for TextDocument {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page_size(&self, page: PageNumber) -> Result<PageSize> {
        self.page_str(page).map(|_| LETTER)
    }

    fn page_text(&self, page: PageNumber) -> Result<String> {
        self.page_str(page).map(str::to_string)
    }

    fn search_page(&self, page: PageNumber, literal: &str) -> Result<Vec<Rect>> {
        let text = self.page_str(page)?;
        if literal.is_empty() || literal.contains('\n') {
            return Ok(Vec::new());
        }

        let len = literal.chars().count();
        let mut hits = Vec::new();
        for (row, line) in text.lines().enumerate() {
            for (byte_idx, _) in line.match_indices(literal) {
                let column = line[..byte_idx].chars().count();
                hits.push(cell(row, column, len));
            }
        }
        Ok(hits)
    }

    fn rasterize_page(&self, page: PageNumber, zoom: f32) -> Result<RgbaImage> {
        let text = self.page_str(page)?;
        let (width, height) = LETTER.pixels(zoom)?;
        let mut image = RgbaImage::from_pixel(width, height, PAPER);

        for (row, line) in text.lines().enumerate() {
            for (column, ch) in line.chars().enumerate() {
                if ch.is_whitespace() {
                    continue;
                }
                fill_glyph(&mut image, &cell(row, column, 1), zoom);
            }
        }
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::layout::GLYPH_FILL;

    #[test]
    fn test_parse_splits_on_form_feed() {
        let doc = TextDocument::parse("first\x0Csecond\x0Cthird");
        assert_eq!(doc.page_count(), 3);
        assert_eq!(doc.page_text(2).unwrap(), "second");
    }

    #[test]
    fn test_parse_trailing_separator() {
        assert_eq!(TextDocument::parse("only\x0C").page_count(), 1);
        assert_eq!(TextDocument::parse("").page_count(), 0);
    }

    #[test]
    fn test_engine_rejects_binary() {
        let result = TextEngine.open(&[0xff, 0xfe, 0x00]);
        assert!(matches!(result, Err(IntakeError::MalformedUpload(_))));
    }

    #[test]
    fn test_search_reports_reading_order() {
        let doc = TextDocument::from_pages(["Email: a@b.io\nBackup Email: c@d.io"]);
        let hits = doc.search_page(1, "Email").unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0], Rect::new(36.0, 36.0, 66.0, 48.0));
        // Second line, column 7
        assert_eq!(hits[1], Rect::new(78.0, 48.0, 108.0, 60.0));
    }

    #[test]
    fn test_search_counts_columns_in_chars() {
        let doc = TextDocument::from_pages(["Né: Zoë"]);
        let hits = doc.search_page(1, "Zoë").unwrap();
        assert_eq!(hits, vec![Rect::new(60.0, 36.0, 78.0, 48.0)]);
    }

    #[test]
    fn test_rasterize_marks_glyphs() {
        let doc = TextDocument::from_pages(["X"]);
        let image = doc.rasterize_page(1, 1.0).unwrap();
        assert_eq!(image.dimensions(), (612, 792));
        assert_eq!(*image.get_pixel(39, 42), GLYPH_FILL);
        assert_eq!(*image.get_pixel(300, 300), PAPER);
    }
}
