//! PDFium-backed engine (feature `pdfium`)
//!
//! Full fidelity: glyph-accurate text search and real rasterization. PDFium
//! documents borrow the library binding and are not `Send`, so the document
//! keeps the uploaded bytes and binds a fresh instance for each operation.
//! Page text is read once at open time because extraction scans it repeatedly.

use std::path::PathBuf;

use image::RgbaImage;
use pdfium_render::prelude::*;
use tracing::debug;

use crate::document::{Document, PageNumber, PdfEngine};
use crate::error::{IntakeError, Result};
use crate::geometry::{PageSize, Rect, MAX_PAGE_POINTS};

#[derive(Debug, Clone, Default)]
pub struct PdfiumEngine {
    /// Directory holding the platform PDFium library; the system library is
    /// used when unset or when binding from it fails.
    library_dir: Option<PathBuf>,
}

impl PdfiumEngine {
    pub fn new(library_dir: Option<PathBuf>) -> Self {
        Self { library_dir }
    }
}

fn bind(library_dir: Option<&PathBuf>) -> Result<Pdfium> {
    let bindings = match library_dir {
        Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
            .or_else(|_| Pdfium::bind_to_system_library()),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| IntakeError::Engine(format!("Failed to load PDFium: {}", e)))?;
    Ok(Pdfium::new(bindings))
}

fn engine_err(e: PdfiumError) -> IntakeError {
    IntakeError::Engine(e.to_string())
}

impl PdfEngine for PdfiumEngine {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    fn open(&self, bytes: &[u8]) -> Result<Box<dyn Document>> {
        let pdfium = bind(self.library_dir.as_ref())?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| IntakeError::MalformedUpload(format!("Failed to parse PDF: {}", e)))?;

        let mut pages = Vec::new();
        for page in document.pages().iter() {
            let text = page.text().map_err(engine_err)?.all();
            let size = PageSize::new(f64::from(page.width().value), f64::from(page.height().value));
            if !size.within_pdf_limits() {
                return Err(IntakeError::MalformedUpload(format!(
                    "Page {} is {}x{}pt (limit {}pt per side)",
                    pages.len() + 1,
                    size.width,
                    size.height,
                    MAX_PAGE_POINTS
                )));
            }
            pages.push((text, size));
        }
        debug!("pdfium opened document with {} pages", pages.len());

        Ok(Box::new(PdfiumDocument {
            library_dir: self.library_dir.clone(),
            bytes: bytes.to_vec(),
            pages,
        }))
    }
}

pub struct PdfiumDocument {
    library_dir: Option<PathBuf>,
    bytes: Vec<u8>,
    pages: Vec<(String, PageSize)>,
}

impl PdfiumDocument {
    fn check(&self, page: PageNumber) -> Result<usize> {
        let index = page.wrapping_sub(1) as usize;
        if index >= self.pages.len() {
            return Err(IntakeError::PageOutOfRange {
                page,
                page_count: self.pages.len() as u32,
            });
        }
        Ok(index)
    }

    /// Run `f` against a freshly opened copy of the page
    fn with_page<R>(&self, page: PageNumber, f: impl FnOnce(&PdfPage) -> Result<R>) -> Result<R> {
        let index = self.check(page)?;
        let pdfium = bind(self.library_dir.as_ref())?;
        let document = pdfium
            .load_pdf_from_byte_slice(&self.bytes, None)
            .map_err(engine_err)?;
        let index = PdfPageIndex::try_from(index)
            .map_err(|_| IntakeError::Engine(format!("Page index {} exceeds PDFium range", index)))?;
        let pdf_page = document.pages().get(index).map_err(engine_err)?;
        f(&pdf_page)
    }
}

impl Document for PdfiumDocument {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page_size(&self, page: PageNumber) -> Result<PageSize> {
        let index = self.check(page)?;
        Ok(self.pages[index].1)
    }

    fn page_text(&self, page: PageNumber) -> Result<String> {
        let index = self.check(page)?;
        Ok(self.pages[index].0.clone())
    }

    fn search_page(&self, page: PageNumber, literal: &str) -> Result<Vec<Rect>> {
        let height = self.page_size(page)?.height;
        self.with_page(page, |pdf_page| {
            let text = pdf_page.text().map_err(engine_err)?;
            let search = text
                .search(literal, &PdfSearchOptions::new())
                .map_err(engine_err)?;

            let mut hits = Vec::new();
            for segments in search.iter(PdfSearchDirection::SearchForward) {
                // A match spanning several text segments becomes one box
                let bounds = segments.iter().map(|segment| {
                    let b = segment.bounds();
                    Rect::from_pdf_box(
                        f64::from(b.left().value),
                        f64::from(b.bottom().value),
                        f64::from(b.right().value),
                        f64::from(b.top().value),
                        height,
                    )
                });
                if let Some(rect) = bounds.reduce(|acc, r| acc.union(&r)) {
                    hits.push(rect);
                }
            }
            Ok(hits)
        })
    }

    fn rasterize_page(&self, page: PageNumber, zoom: f32) -> Result<RgbaImage> {
        self.page_size(page)?.pixels(zoom)?;
        self.with_page(page, |pdf_page| {
            let config = PdfRenderConfig::new()
                .scale_page_by_factor(zoom)
                .render_form_data(true)
                .set_format(PdfBitmapFormat::BGRA);
            let bitmap = pdf_page.render_with_config(&config).map_err(engine_err)?;

            let width = bitmap.width().max(0) as u32;
            let height = bitmap.height().max(0) as u32;
            let src = bitmap.as_raw_bytes();
            let stride = if height == 0 { 0 } else { src.len() / height as usize };

            let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
            for y in 0..height as usize {
                let row = y * stride;
                for x in 0..width as usize {
                    let idx = row + x * 4;
                    let b = src.get(idx).copied().unwrap_or(255);
                    let g = src.get(idx + 1).copied().unwrap_or(255);
                    let r = src.get(idx + 2).copied().unwrap_or(255);
                    let a = src.get(idx + 3).copied().unwrap_or(255);
                    pixels.extend_from_slice(&[r, g, b, a]);
                }
            }

            RgbaImage::from_raw(width, height, pixels)
                .ok_or_else(|| IntakeError::Render("PDFium bitmap has unexpected size".to_string()))
        })
    }
}
