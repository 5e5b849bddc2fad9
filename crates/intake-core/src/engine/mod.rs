//! PDF engine adapters
//!
//! - [`lopdf_engine::LopdfEngine`] - pure Rust, positioned text and glyph-box previews (default)
//! - [`text::TextEngine`] - form-feed separated UTF-8 text on a monospace grid
//! - `pdfium::PdfiumEngine` - full search and rendering (feature `pdfium`)

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::document::PdfEngine;
use crate::error::Result;

mod layout;
pub mod lopdf_engine;
#[cfg(feature = "pdfium")]
pub mod pdfium;
pub mod text;

/// Engine selection, as written in configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Lopdf,
    Text,
    Pdfium,
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineKind::Lopdf => write!(f, "lopdf"),
            EngineKind::Text => write!(f, "text"),
            EngineKind::Pdfium => write!(f, "pdfium"),
        }
    }
}

/// Build the configured engine.
///
/// `library_dir` is only consulted by the PDFium engine.
pub fn build_engine(kind: EngineKind, library_dir: Option<PathBuf>) -> Result<Arc<dyn PdfEngine>> {
    match kind {
        EngineKind::Lopdf => Ok(Arc::new(lopdf_engine::LopdfEngine)),
        EngineKind::Text => Ok(Arc::new(text::TextEngine)),
        #[cfg(feature = "pdfium")]
        EngineKind::Pdfium => Ok(Arc::new(pdfium::PdfiumEngine::new(library_dir))),
        #[cfg(not(feature = "pdfium"))]
        EngineKind::Pdfium => {
            let _ = library_dir;
            Err(crate::error::IntakeError::Engine(
                "the pdfium engine requires building with the `pdfium` feature".to_string(),
            ))
        }
    }
}
