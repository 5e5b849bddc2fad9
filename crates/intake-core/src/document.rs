//! Document model
//!
//! An opened PDF is an ordered sequence of 1-indexed pages. Each page exposes
//! its plain text, an in-page literal search that returns rectangles in reading
//! order, and rasterization at a zoom factor. Concrete parsing and rendering
//! live behind [`PdfEngine`] implementations in [`crate::engine`].
//!
//! A document handle is released when it is dropped; [`Document::close`] makes
//! that explicit at call sites that replace a handle.

use image::RgbaImage;

use crate::error::{IntakeError, Result};
use crate::geometry::{PageSize, Rect};

/// 1-indexed page number
pub type PageNumber = u32;

/// Opens uploaded bytes into a [`Document`]
pub trait PdfEngine: Send + Sync {
    /// Short engine name for logs and the health endpoint
    fn name(&self) -> &'static str;

    /// Parse `bytes` into a document.
    ///
    /// Unparseable input is reported as [`IntakeError::MalformedUpload`].
    fn open(&self, bytes: &[u8]) -> Result<Box<dyn Document>>;
}

/// An opened document
///
/// Page arguments are 1-indexed and already range-checked by [`Page`].
pub trait Document: Send {
    fn page_count(&self) -> u32;

    fn page_size(&self, page: PageNumber) -> Result<PageSize>;

    fn page_text(&self, page: PageNumber) -> Result<String>;

    /// Every occurrence of `literal` on the page, in reading order
    fn search_page(&self, page: PageNumber, literal: &str) -> Result<Vec<Rect>>;

    fn rasterize_page(&self, page: PageNumber, zoom: f32) -> Result<RgbaImage>;

    /// Release the underlying engine resources
    fn close(self: Box<Self>) {
        drop(self);
    }
}

impl dyn Document + '_ {
    /// Borrow a page, checking the page number against the page count
    pub fn page(&self, number: PageNumber) -> Result<Page<'_>> {
        let page_count = self.page_count();
        if number == 0 || number > page_count {
            return Err(IntakeError::PageOutOfRange {
                page: number,
                page_count,
            });
        }
        Ok(Page {
            document: self,
            number,
        })
    }

    /// Plain text of every page, in page order
    pub fn page_texts(&self) -> Result<Vec<String>> {
        (1..=self.page_count())
            .map(|number| self.page_text(number))
            .collect()
    }
}

/// A borrowed page of an open document
#[derive(Clone, Copy)]
pub struct Page<'a> {
    document: &'a dyn Document,
    number: PageNumber,
}

impl<'a> Page<'a> {
    pub fn number(&self) -> PageNumber {
        self.number
    }

    pub fn size(&self) -> Result<PageSize> {
        self.document.page_size(self.number)
    }

    pub fn text(&self) -> Result<String> {
        self.document.page_text(self.number)
    }

    pub fn search(&self, literal: &str) -> Result<Vec<Rect>> {
        self.document.search_page(self.number, literal)
    }

    pub fn rasterize(&self, zoom: f32) -> Result<RgbaImage> {
        self.document.rasterize_page(self.number, zoom)
    }
}

impl std::fmt::Debug for Page<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page").field("number", &self.number).finish()
    }
}
