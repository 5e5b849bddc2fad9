//! Document intake core
//!
//! Turns an uploaded PDF into a set of labeled fields and keeps an
//! interactive preview consistent with the user's navigation:
//!
//! - [`fields`] - the label -> pattern table (swappable via TOML)
//! - [`extract`] - first-match field extraction over page text
//! - [`locate`] - literal text -> page-space rectangle
//! - [`render`] - page raster with the highlight outline drawn on top
//! - [`session`] - the navigation/highlight state machine
//! - [`quota`] - subscription snapshot and upload gate decisions
//!
//! PDF parsing and rasterization are delegated to a [`PdfEngine`]; see
//! [`engine`] for the available adapters.

pub mod document;
pub mod engine;
pub mod error;
pub mod extract;
pub mod fields;
pub mod geometry;
pub mod identity;
pub mod locate;
pub mod quota;
pub mod render;
pub mod session;

pub use document::{Document, Page, PageNumber, PdfEngine};
pub use engine::{build_engine, EngineKind};
pub use error::{IntakeError, Result};
pub use extract::{extract, extract_from_texts, ExtractedField, ExtractionResult};
pub use fields::{FieldDefinition, FieldSpec, FieldTable};
pub use geometry::{PageSize, Rect};
pub use identity::DocumentIdentity;
pub use locate::locate;
pub use quota::{QuotaDecision, SubscriptionSnapshot, DEFAULT_UPLOAD_LIMIT};
pub use render::{encode_png, render, validate_zoom, HighlightStyle, DEFAULT_ZOOM};
pub use session::{
    Action, FieldView, HighlightState, IntakeSession, NavDirection, NavigationAvailability,
    Outcome, SessionOptions,
};
