//! Request and response models for the intake API

use intake_core::{
    Action, DocumentIdentity, FieldView, HighlightState, IntakeSession, NavDirection,
    NavigationAvailability, Outcome,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Upload of a document into a session
#[derive(Debug, Clone, Deserialize)]
pub struct UploadRequest {
    pub filename: String,
    pub pdf_base64: String,
}

/// Session actions accepted as JSON; uploads go through the document endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionRequest {
    Navigate { direction: NavDirection },
    HighlightField { label: String },
    Search { term: String },
    EditField { label: String, value: String },
}

impl From<ActionRequest> for Action {
    fn from(req: ActionRequest) -> Self {
        match req {
            ActionRequest::Navigate { direction } => Action::Navigate(direction),
            ActionRequest::HighlightField { label } => Action::HighlightField(label),
            ActionRequest::Search { term } => Action::Search(term),
            ActionRequest::EditField { label, value } => Action::EditField { label, value },
        }
    }
}

/// Everything a client needs to draw the session
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub document: Option<DocumentIdentity>,
    pub page_count: u32,
    pub state: HighlightState,
    pub fields: Vec<FieldView>,
    pub navigation: NavigationAvailability,
}

impl SessionView {
    pub fn new(id: Uuid, session: &IntakeSession) -> Self {
        Self {
            id,
            document: session.identity().cloned(),
            page_count: session.page_count(),
            state: session.state().clone(),
            fields: session.fields(),
            navigation: session.navigation(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionResponse {
    #[serde(flatten)]
    pub outcome: Outcome,
    pub session: SessionView,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Remaining uploads after this one, when the quota was consulted
    pub remaining_uploads: Option<u32>,
    pub session: SessionView,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewQuery {
    pub zoom: Option<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextResponse {
    pub filename: String,
    pub page_count: u32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionResponse {
    pub plan: String,
    pub upload_limit: u32,
    pub uploads_used: u32,
    pub remaining: u32,
    pub valid_until: Option<String>,
}

/// Row of `pdf_records`
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UploadRecord {
    pub id: i64,
    pub filename: String,
    pub status: String,
    pub user_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadHistory {
    pub uploads: Vec<UploadRecord>,
    pub count: usize,
}

/// Row of `subscriptions`
#[derive(Debug, Clone, FromRow)]
pub struct SubscriptionRow {
    pub plan: String,
    pub upload_limit: i64,
    pub valid_until: Option<String>,
}
