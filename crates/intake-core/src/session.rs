//! Interactive intake session
//!
//! One [`IntakeSession`] holds everything a single user works on: the open
//! document, its extraction result, user edits, the highlight state and a
//! small preview memo. Every UI action goes through [`IntakeSession::apply`].
//!
//! State rules:
//! - loading a different document resets to page 1 with nothing highlighted
//!   and drops edits and cached previews; a failed load changes nothing
//! - navigation clamps to the page range and clears the highlight, unless the
//!   target is the current page
//! - highlighting an unknown or unmatched label does nothing

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::document::{Document, PageNumber, PdfEngine};
use crate::error::{IntakeError, Result};
use crate::extract::{extract_from_texts, ExtractionResult};
use crate::fields::FieldTable;
use crate::geometry::Rect;
use crate::identity::DocumentIdentity;
use crate::locate::locate;
use crate::render::{render, validate_zoom, HighlightStyle};

/// What the preview is currently showing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HighlightState {
    /// Highlighted field label or search term
    pub active_label: Option<String>,
    pub page_number: PageNumber,
    /// `None` with a label set means the text was not located on the page
    pub geometry: Option<Rect>,
}

impl Default for HighlightState {
    fn default() -> Self {
        Self {
            active_label: None,
            page_number: 1,
            geometry: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavDirection {
    First,
    Previous,
    Next,
    Last,
}

/// Every operation a user can perform on a session
#[derive(Clone, PartialEq)]
pub enum Action {
    LoadDocument { name: String, bytes: Vec<u8> },
    Navigate(NavDirection),
    HighlightField(String),
    Search(String),
    EditField { label: String, value: String },
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::LoadDocument { name, bytes } => f
                .debug_struct("LoadDocument")
                .field("name", name)
                .field("bytes", &bytes.len())
                .finish(),
            Action::Navigate(direction) => f.debug_tuple("Navigate").field(direction).finish(),
            Action::HighlightField(label) => f.debug_tuple("HighlightField").field(label).finish(),
            Action::Search(term) => f.debug_tuple("Search").field(term).finish(),
            Action::EditField { label, .. } => {
                f.debug_struct("EditField").field("label", label).finish_non_exhaustive()
            }
        }
    }
}

/// Result of applying an [`Action`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Loaded { page_count: u32 },
    /// Same file as the one already open
    AlreadyLoaded,
    Moved { page: PageNumber },
    Unchanged,
    Highlighted { page: PageNumber, located: bool },
    /// Unknown label, or a label with no match
    Inert,
    NotFound { term: String },
    Edited,
}

/// Which navigation actions would change the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct NavigationAvailability {
    pub first: bool,
    pub previous: bool,
    pub next: bool,
    pub last: bool,
}

/// A field as shown to the user: extracted value with any edit applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldView {
    pub label: String,
    pub value: String,
    pub extracted_value: String,
    pub page: Option<PageNumber>,
    pub edited: bool,
}

/// Tunables for a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub max_zoom: f32,
    /// Maximum number of memoized previews
    pub preview_cache_size: usize,
    pub style: HighlightStyle,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_zoom: 8.0,
            preview_cache_size: 16,
            style: HighlightStyle::default(),
        }
    }
}

type PreviewKey = (PageNumber, Option<[u64; 4]>, u32);

/// FIFO-bounded memo of rendered previews
#[derive(Default)]
struct PreviewCache {
    capacity: usize,
    entries: HashMap<PreviewKey, Arc<RgbaImage>>,
    order: VecDeque<PreviewKey>,
}

impl PreviewCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    fn get(&self, key: &PreviewKey) -> Option<Arc<RgbaImage>> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: PreviewKey, image: Arc<RgbaImage>) {
        if self.capacity == 0 {
            return;
        }
        while self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key);
        self.entries.insert(key, image);
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

struct LoadedDocument {
    identity: DocumentIdentity,
    handle: Box<dyn Document>,
    page_texts: Vec<String>,
    extraction: ExtractionResult,
}

pub struct IntakeSession {
    engine: Arc<dyn PdfEngine>,
    table: Arc<FieldTable>,
    options: SessionOptions,
    loaded: Option<LoadedDocument>,
    edits: HashMap<String, String>,
    state: HighlightState,
    previews: PreviewCache,
    recorded: HashSet<DocumentIdentity>,
}

impl IntakeSession {
    pub fn new(engine: Arc<dyn PdfEngine>, table: Arc<FieldTable>) -> Self {
        Self::with_options(engine, table, SessionOptions::default())
    }

    pub fn with_options(
        engine: Arc<dyn PdfEngine>,
        table: Arc<FieldTable>,
        options: SessionOptions,
    ) -> Self {
        let previews = PreviewCache::new(options.preview_cache_size);
        Self {
            engine,
            table,
            options,
            loaded: None,
            edits: HashMap::new(),
            state: HighlightState::default(),
            previews,
            recorded: HashSet::new(),
        }
    }

    /// Single transition function for all user actions
    pub fn apply(&mut self, action: Action) -> Result<Outcome> {
        debug!(?action, "applying action");
        match action {
            Action::LoadDocument { name, bytes } => self.load_document(&name, &bytes),
            Action::Navigate(direction) => Ok(self.navigate(direction)),
            Action::HighlightField(label) => Ok(self.highlight_field(&label)),
            Action::Search(term) => Ok(self.search(&term)),
            Action::EditField { label, value } => Ok(self.edit_field(&label, value)),
        }
    }

    /// Open and extract a new document.
    ///
    /// The same identity as the open document is a no-op. On error the
    /// session is left exactly as it was.
    pub fn load_document(&mut self, name: &str, bytes: &[u8]) -> Result<Outcome> {
        let identity = DocumentIdentity::from_upload(name, bytes);
        if self.identity() == Some(&identity) {
            debug!(%identity, "document already loaded");
            return Ok(Outcome::AlreadyLoaded);
        }

        let handle = self.engine.open(bytes)?;
        let page_texts = handle.page_texts()?;
        let extraction = extract_from_texts(&page_texts, &self.table);
        let page_count = handle.page_count();

        info!(
            %identity,
            engine = self.engine.name(),
            page_count,
            matched = extraction.matched(),
            "document loaded"
        );

        let previous = self.loaded.replace(LoadedDocument {
            identity,
            handle,
            page_texts,
            extraction,
        });
        if let Some(previous) = previous {
            previous.handle.close();
        }
        self.state = HighlightState::default();
        self.edits.clear();
        self.previews.clear();

        Ok(Outcome::Loaded { page_count })
    }

    pub fn navigate(&mut self, direction: NavDirection) -> Outcome {
        let page_count = self.page_count();
        if page_count == 0 {
            return Outcome::Unchanged;
        }

        let current = self.state.page_number;
        let target = match direction {
            NavDirection::First => 1,
            NavDirection::Previous => current.saturating_sub(1).max(1),
            NavDirection::Next => current.saturating_add(1).min(page_count),
            NavDirection::Last => page_count,
        };

        if target == current {
            return Outcome::Unchanged;
        }

        debug!(from = current, to = target, "navigate");
        self.state = HighlightState {
            active_label: None,
            page_number: target,
            geometry: None,
        };
        Outcome::Moved { page: target }
    }

    /// Jump to the page where `label` matched and outline the label text
    pub fn highlight_field(&mut self, label: &str) -> Outcome {
        let Some(page) = self
            .loaded
            .as_ref()
            .and_then(|doc| doc.extraction.get(label))
            .and_then(|field| field.page)
        else {
            debug!(label, "highlight ignored");
            return Outcome::Inert;
        };

        self.focus(page, label)
    }

    /// Jump to the first page containing `term` verbatim
    pub fn search(&mut self, term: &str) -> Outcome {
        let not_found = || Outcome::NotFound {
            term: term.to_string(),
        };
        if term.trim().is_empty() {
            return not_found();
        }

        let Some(page) = self.loaded.as_ref().and_then(|doc| {
            doc.page_texts
                .iter()
                .position(|text| text.contains(term))
                .map(|idx| idx as PageNumber + 1)
        }) else {
            debug!(term, "search found nothing");
            return not_found();
        };

        self.focus(page, term)
    }

    fn focus(&mut self, page: PageNumber, literal: &str) -> Outcome {
        let geometry = self
            .loaded
            .as_ref()
            .and_then(|doc| doc.handle.page(page).ok())
            .and_then(|p| locate(&p, literal));

        debug!(page, literal, located = geometry.is_some(), "focus");
        self.state = HighlightState {
            active_label: Some(literal.to_string()),
            page_number: page,
            geometry,
        };
        Outcome::Highlighted {
            page,
            located: geometry.is_some(),
        }
    }

    /// Override the shown value of a known field
    pub fn edit_field(&mut self, label: &str, value: String) -> Outcome {
        let known = self
            .loaded
            .as_ref()
            .is_some_and(|doc| doc.extraction.get(label).is_some());
        if !known {
            return Outcome::Inert;
        }
        self.edits.insert(label.to_string(), value);
        Outcome::Edited
    }

    /// Render the current page with the current highlight
    pub fn render_current(&mut self, zoom: f32) -> Result<Arc<RgbaImage>> {
        validate_zoom(zoom, self.options.max_zoom)?;
        let doc = self.loaded.as_ref().ok_or(IntakeError::NoDocument)?;

        let key = (
            self.state.page_number,
            self.state.geometry.map(|r| r.cache_key()),
            zoom.to_bits(),
        );
        if let Some(image) = self.previews.get(&key) {
            debug!(page = key.0, "preview cache hit");
            return Ok(image);
        }

        let page = doc.handle.page(self.state.page_number)?;
        let image = Arc::new(render(
            &page,
            self.state.geometry,
            zoom,
            &self.options.style,
        )?);
        self.previews.insert(key, Arc::clone(&image));
        Ok(image)
    }

    pub fn state(&self) -> &HighlightState {
        &self.state
    }

    pub fn identity(&self) -> Option<&DocumentIdentity> {
        self.loaded.as_ref().map(|doc| &doc.identity)
    }

    pub fn page_count(&self) -> u32 {
        self.loaded
            .as_ref()
            .map(|doc| doc.handle.page_count())
            .unwrap_or(0)
    }

    pub fn extraction(&self) -> Option<&ExtractionResult> {
        self.loaded.as_ref().map(|doc| &doc.extraction)
    }

    /// Fields with user edits applied, in table order
    pub fn fields(&self) -> Vec<FieldView> {
        let Some(extraction) = self.extraction() else {
            return Vec::new();
        };
        extraction
            .iter()
            .map(|field| {
                let edit = self.edits.get(&field.label);
                FieldView {
                    label: field.label.clone(),
                    value: edit.cloned().unwrap_or_else(|| field.value.clone()),
                    extracted_value: field.value.clone(),
                    page: field.page,
                    edited: edit.is_some(),
                }
            })
            .collect()
    }

    pub fn navigation(&self) -> NavigationAvailability {
        let page_count = self.page_count();
        if page_count == 0 {
            return NavigationAvailability::default();
        }
        let page = self.state.page_number;
        NavigationAvailability {
            first: page > 1,
            previous: page > 1,
            next: page < page_count,
            last: page < page_count,
        }
    }

    /// All page text joined with newlines
    pub fn full_text(&self) -> Option<String> {
        self.loaded.as_ref().map(|doc| doc.page_texts.join("\n"))
    }

    /// Whether usage for `identity` has already been recorded in this session
    pub fn is_recorded(&self, identity: &DocumentIdentity) -> bool {
        self.recorded.contains(identity)
    }

    pub fn mark_recorded(&mut self, identity: DocumentIdentity) {
        self.recorded.insert(identity);
    }

    pub fn cached_previews(&self) -> usize {
        self.previews.len()
    }

    /// Release the open document
    pub fn close(mut self) {
        if let Some(doc) = self.loaded.take() {
            info!(identity = %doc.identity, "session closed");
            doc.handle.close();
        }
    }
}

impl std::fmt::Debug for IntakeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntakeSession")
            .field("engine", &self.engine.name())
            .field("identity", &self.identity())
            .field("state", &self.state)
            .field("edits", &self.edits.len())
            .field("previews", &self.previews.len())
            .finish()
    }
}
