//! First-match field extraction
//!
//! For every label in table order, pages are scanned from page 1 and the first
//! page whose text matches wins. A label that matches nowhere is reported with
//! an empty value and no page; that is a normal result, not an error.

use serde::Serialize;

use crate::document::{Document, PageNumber};
use crate::error::Result;
use crate::fields::FieldTable;

/// Extracted value of one label
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedField {
    pub label: String,
    /// Empty when nothing matched
    pub value: String,
    /// Page of the first match
    pub page: Option<PageNumber>,
}

impl ExtractedField {
    fn unmatched(label: &str) -> Self {
        Self {
            label: label.to_string(),
            value: String::new(),
            page: None,
        }
    }

    pub fn is_match(&self) -> bool {
        self.page.is_some()
    }
}

/// Extraction output, in field table order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ExtractionResult {
    fields: Vec<ExtractedField>,
}

impl ExtractionResult {
    pub fn get(&self, label: &str) -> Option<&ExtractedField> {
        self.fields.iter().find(|f| f.label == label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtractedField> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of labels that matched somewhere
    pub fn matched(&self) -> usize {
        self.fields.iter().filter(|f| f.is_match()).count()
    }
}

/// Run the table over every page of an open document
pub fn extract(document: &dyn Document, table: &FieldTable) -> Result<ExtractionResult> {
    let texts = document.page_texts()?;
    Ok(extract_from_texts(&texts, table))
}

/// Run the table over already-fetched page texts (index 0 is page 1)
pub fn extract_from_texts(pages: &[String], table: &FieldTable) -> ExtractionResult {
    let fields = table
        .iter()
        .map(|spec| {
            pages
                .iter()
                .enumerate()
                .find_map(|(idx, text)| {
                    spec.capture(text).map(|value| ExtractedField {
                        label: spec.label().to_string(),
                        value,
                        page: Some(idx as PageNumber + 1),
                    })
                })
                .unwrap_or_else(|| ExtractedField::unmatched(spec.label()))
        })
        .collect();

    ExtractionResult { fields }
}
