//! lopdf-backed engine
//!
//! Pure-Rust parsing. Page sizes come from the (possibly inherited) MediaBox,
//! and text with per-character boxes from walking each page's content stream
//! (see [`super::layout`]). Search therefore yields real rectangles. lopdf has
//! no rasterizer, so pages rasterize as grey glyph boxes on white paper, which
//! is enough to show where a highlight sits.

use image::RgbaImage;
use lopdf::{Dictionary, Object};
use tracing::{debug, warn};

use super::layout::{fill_glyph, layout_page, MediaBox, PageLayout, PAPER};
use crate::document::{Document, PageNumber, PdfEngine};
use crate::error::{IntakeError, Result};
use crate::geometry::{PageSize, Rect, LETTER, MAX_PAGE_POINTS};

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfEngine;

impl PdfEngine for LopdfEngine {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    fn open(&self, bytes: &[u8]) -> Result<Box<dyn Document>> {
        if !bytes.starts_with(b"%PDF-") {
            return Err(IntakeError::MalformedUpload(
                "Not a valid PDF file (missing %PDF- header)".to_string(),
            ));
        }

        let doc = lopdf::Document::load_mem(bytes)
            .map_err(|e| IntakeError::MalformedUpload(format!("Failed to parse PDF: {}", e)))?;

        if doc.is_encrypted() {
            return Err(IntakeError::MalformedUpload(
                "Encrypted PDFs are not supported".to_string(),
            ));
        }

        let pages = doc.get_pages();
        let mut loaded = Vec::with_capacity(pages.len());
        for (&number, &page_id) in &pages {
            let media = doc
                .get_dictionary(page_id)
                .ok()
                .and_then(|dict| media_box(&doc, dict))
                .unwrap_or(MediaBox {
                    left: 0.0,
                    bottom: 0.0,
                    size: LETTER,
                });
            if !media.size.within_pdf_limits() {
                return Err(IntakeError::MalformedUpload(format!(
                    "Page {} declares a {}x{}pt MediaBox (limit {}pt per side)",
                    number, media.size.width, media.size.height, MAX_PAGE_POINTS
                )));
            }

            // One bad page must not sink the whole document
            let layout = layout_page(&doc, page_id, media).unwrap_or_else(|e| {
                warn!("Text layout failed on page {}: {}", number, e);
                PageLayout::default()
            });
            loaded.push(LoadedPage {
                size: media.size,
                layout,
            });
        }

        debug!("lopdf opened document with {} pages", loaded.len());
        Ok(Box::new(LopdfDocument { pages: loaded }))
    }
}

#[derive(Debug, Clone)]
struct LoadedPage {
    size: PageSize,
    layout: PageLayout,
}

/// Page sizes and text layout read once at open time; the parsed object tree
/// is not kept alive.
#[derive(Debug, Clone)]
pub struct LopdfDocument {
    pages: Vec<LoadedPage>,
}

impl LopdfDocument {
    fn loaded(&self, page: PageNumber) -> Result<&LoadedPage> {
        self.pages
            .get(page.wrapping_sub(1) as usize)
            .ok_or(IntakeError::PageOutOfRange {
                page,
                page_count: self.pages.len() as u32,
            })
    }
}

impl Document for LopdfDocument {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page_size(&self, page: PageNumber) -> Result<PageSize> {
        self.loaded(page).map(|p| p.size)
    }

    fn page_text(&self, page: PageNumber) -> Result<String> {
        self.loaded(page).map(|p| p.layout.text().to_string())
    }

    fn search_page(&self, page: PageNumber, literal: &str) -> Result<Vec<Rect>> {
        Ok(self.loaded(page)?.layout.find(literal))
    }

    fn rasterize_page(&self, page: PageNumber, zoom: f32) -> Result<RgbaImage> {
        let loaded = self.loaded(page)?;
        let (width, height) = loaded.size.pixels(zoom)?;
        let mut image = RgbaImage::from_pixel(width, height, PAPER);
        for glyph in loaded.layout.glyphs() {
            fill_glyph(&mut image, glyph, zoom);
        }
        Ok(image)
    }
}

/// MediaBox of a page, inheriting from the parent Pages node when absent
fn media_box(doc: &lopdf::Document, page_dict: &Dictionary) -> Option<MediaBox> {
    if let Some(media) = page_dict
        .get(b"MediaBox")
        .ok()
        .and_then(|obj| obj.as_array().ok())
        .and_then(|array| parse_box_array(array))
    {
        return Some(media);
    }

    let parent_id = page_dict.get(b"Parent").ok()?.as_reference().ok()?;
    let parent = doc.get_dictionary(parent_id).ok()?;
    media_box(doc, parent)
}

fn parse_box_array(array: &[Object]) -> Option<MediaBox> {
    if array.len() != 4 {
        return None;
    }
    let mut values = [0.0f64; 4];
    for (slot, obj) in values.iter_mut().zip(array) {
        *slot = match obj {
            Object::Integer(n) => *n as f64,
            Object::Real(n) => f64::from(*n),
            _ => return None,
        };
    }
    let [x0, y0, x1, y1] = values;
    Some(MediaBox {
        left: x0.min(x1),
        bottom: y0.min(y1),
        size: PageSize::new((x1 - x0).abs(), (y1 - y0).abs()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::layout::GLYPH_FILL;
    use crate::session::{Action, IntakeSession, Outcome};
    use crate::FieldTable;
    use lopdf::{dictionary, Dictionary, Object, Stream};
    use std::sync::Arc;

    /// Build a PDF whose pages each show one line of Helvetica text.
    /// Page size is set on the Pages node so pages inherit it.
    fn create_test_pdf(page_texts: &[&str], media_box: [i64; 4]) -> Vec<u8> {
        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.new_object_id();

        let mut font = Dictionary::new();
        font.set("Type", Object::Name(b"Font".to_vec()));
        font.set("Subtype", Object::Name(b"Type1".to_vec()));
        font.set("BaseFont", Object::Name(b"Helvetica".to_vec()));
        font.set("Encoding", Object::Name(b"WinAnsiEncoding".to_vec()));
        doc.objects.insert(font_id, Object::Dictionary(font));

        let mut fonts = Dictionary::new();
        fonts.set("F1", Object::Reference(font_id));
        let mut resources = Dictionary::new();
        resources.set("Font", Object::Dictionary(fonts));

        let mut kids = Vec::new();
        for text in page_texts {
            let content_id = doc.new_object_id();
            let page_id = doc.new_object_id();
            let content = format!("BT /F1 12 Tf 50 700 Td ({}) Tj ET", text);
            doc.objects.insert(
                content_id,
                Object::Stream(Stream::new(Dictionary::new(), content.into_bytes())),
            );

            let mut page = Dictionary::new();
            page.set("Type", Object::Name(b"Page".to_vec()));
            page.set("Parent", Object::Reference(pages_id));
            page.set("Contents", Object::Reference(content_id));
            page.set("Resources", Object::Dictionary(resources.clone()));
            doc.objects.insert(page_id, Object::Dictionary(page));
            kids.push(Object::Reference(page_id));
        }

        let mut pages = Dictionary::new();
        pages.set("Type", Object::Name(b"Pages".to_vec()));
        pages.set("Count", Object::Integer(page_texts.len() as i64));
        pages.set("Kids", Object::Array(kids));
        pages.set(
            "MediaBox",
            Object::Array(media_box.iter().map(|v| Object::Integer(*v)).collect()),
        );
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    #[test]
    fn test_rejects_non_pdf() {
        let result = LopdfEngine.open(b"hello world");
        assert!(matches!(result, Err(IntakeError::MalformedUpload(_))));
    }

    #[test]
    fn test_rejects_truncated_pdf() {
        let result = LopdfEngine.open(b"%PDF-1.5\n1 0 obj");
        assert!(matches!(result, Err(IntakeError::MalformedUpload(_))));
    }

    #[test]
    fn test_reads_pages_and_text() {
        let pdf = create_test_pdf(&["Applicant Name: Ada", "Email: ada@example.com"], [0, 0, 612, 792]);
        let doc = LopdfEngine.open(&pdf).unwrap();

        assert_eq!(doc.page_count(), 2);
        assert!(doc.page_text(1).unwrap().contains("Applicant Name"));
        assert!(doc.page_text(2).unwrap().contains("ada@example.com"));
    }

    #[test]
    fn test_inherits_media_box() {
        let pdf = create_test_pdf(&["A4 page"], [0, 0, 595, 842]);
        let doc = LopdfEngine.open(&pdf).unwrap();

        assert_eq!(doc.page_size(1).unwrap(), PageSize::new(595.0, 842.0));
        assert_eq!(doc.rasterize_page(1, 2.0).unwrap().dimensions(), (1190, 1684));
    }

    #[test]
    fn test_search_returns_glyph_boxes() {
        let pdf = create_test_pdf(&["Email: x@y.z"], [0, 0, 612, 792]);
        let doc = LopdfEngine.open(&pdf).unwrap();

        let hits = doc.search_page(1, "Email").unwrap();
        assert_eq!(hits.len(), 1);
        // 12pt Helvetica at (50, 700): "Email" is 2.5em wide
        let hit = hits[0];
        assert!((hit.x0 - 50.0).abs() < 1e-6);
        assert!((hit.x1 - 80.0).abs() < 1e-6);
        assert!((hit.y0 - (792.0 - 709.6)).abs() < 1e-6);
        assert!((hit.y1 - (792.0 - 697.6)).abs() < 1e-6);

        assert!(doc.search_page(1, "Phone").unwrap().is_empty());
        assert!(doc.search_page(2, "Email").is_err());
    }

    #[test]
    fn test_media_box_origin_is_subtracted() {
        let pdf = create_test_pdf(&["Email: x@y.z"], [100, 100, 712, 892]);
        let doc = LopdfEngine.open(&pdf).unwrap();

        assert_eq!(doc.page_size(1).unwrap(), PageSize::new(612.0, 792.0));
        // Text at (50, 700) in user space sits left of and below the box origin
        let hit = doc.search_page(1, "Email").unwrap()[0];
        assert!((hit.x0 + 50.0).abs() < 1e-6);
        assert!((hit.y1 - (792.0 - 597.6)).abs() < 1e-6);
    }

    #[test]
    fn test_rasterize_paints_glyphs() {
        let pdf = create_test_pdf(&["Email: x@y.z"], [0, 0, 612, 792]);
        let doc = LopdfEngine.open(&pdf).unwrap();
        let image = doc.rasterize_page(1, 1.0).unwrap();

        assert_eq!(image.dimensions(), (612, 792));
        // Middle of the "E" glyph
        assert_ne!(*image.get_pixel(54, 87), PAPER);
        assert_eq!(*image.get_pixel(300, 300), PAPER);
    }

    #[test]
    fn test_rejects_oversized_media_box() {
        let pdf = create_test_pdf(&["Email: a@b.io"], [0, 0, 2_000_000_000, 2_000_000_000]);
        let result = LopdfEngine.open(&pdf);
        assert!(matches!(result, Err(IntakeError::MalformedUpload(_))));

        let pdf = create_test_pdf(&["Email: a@b.io"], [0, 0, 14_401, 792]);
        assert!(matches!(LopdfEngine.open(&pdf), Err(IntakeError::MalformedUpload(_))));
    }

    #[test]
    fn test_largest_page_over_raster_budget() {
        let pdf = create_test_pdf(&["Email: a@b.io"], [0, 0, 14_400, 14_400]);
        let doc = LopdfEngine.open(&pdf).unwrap();
        assert!(matches!(doc.rasterize_page(1, 8.0), Err(IntakeError::Render(_))));
    }

    #[test]
    fn test_email_highlight_on_second_page() {
        let pdf = create_test_pdf(
            &["Applicant Name: Jane Doe", "Email: jane@example.org", "Signature"],
            [0, 0, 612, 792],
        );
        let mut session = IntakeSession::new(Arc::new(LopdfEngine), Arc::new(FieldTable::builtin()));
        session.load_document("form.pdf", &pdf).unwrap();

        let outcome = session
            .apply(Action::HighlightField("Email".to_string()))
            .unwrap();
        assert_eq!(outcome, Outcome::Highlighted { page: 2, located: true });
        assert_eq!(session.state().page_number, 2);
        let geometry = session.state().geometry.unwrap();
        assert!((geometry.x0 - 50.0).abs() < 1e-6);

        let preview = session.render_current(1.0).unwrap();
        assert!(preview.pixels().any(|p| *p == GLYPH_FILL));
        // Highlight outline drawn at the left edge of the match
        assert_eq!(*preview.get_pixel(50, 90), image::Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_session_preview_of_largest_page_fails_cleanly() {
        let pdf = create_test_pdf(&["Email: a@b.io"], [0, 0, 14_400, 14_400]);
        let mut session = IntakeSession::new(Arc::new(LopdfEngine), Arc::new(FieldTable::builtin()));
        session.load_document("poster.pdf", &pdf).unwrap();

        assert!(matches!(session.render_current(8.0), Err(IntakeError::Render(_))));
        assert_eq!(session.cached_previews(), 0);
        // Still usable at a zoom within budget
        assert!(session.render_current(0.1).is_ok());
    }
}
