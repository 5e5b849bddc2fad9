//! HTTP handlers for the intake API
//!
//! Session work (extraction, search, rasterization) is blocking, so each
//! handler takes the session's lock and moves the guard onto the blocking
//! pool for the duration of the call. Requests against one session are
//! therefore serialized; different sessions run concurrently.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use intake_core::quota::{Plan, PLANS};
use intake_core::{encode_png, Action, DocumentIdentity, IntakeSession, Outcome, QuotaDecision};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::models::*;
use crate::state::AppState;
use crate::store;

type SessionGuard = OwnedMutexGuard<IntakeSession>;

/// Run `f` on the blocking pool while keeping the session locked
async fn run_blocking<R, F>(guard: SessionGuard, f: F) -> Result<(SessionGuard, R), ApiError>
where
    F: FnOnce(&mut IntakeSession) -> R + Send + 'static,
    R: Send + 'static,
{
    let (guard, result) = tokio::task::spawn_blocking(move || {
        let mut guard = guard;
        let result = f(&mut guard);
        (guard, result)
    })
    .await?;
    Ok((guard, result))
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub engine: &'static str,
    pub sessions: usize,
}

/// Handler: GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "intake-server",
        version: env!("CARGO_PKG_VERSION"),
        engine: state.engine.name(),
        sessions: state.session_count().await,
    })
}

/// Handler: GET /api/subscription
pub async fn get_subscription(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    let (snapshot, valid_until) =
        store::snapshot(&state.db, &user.id, state.default_upload_limit).await?;
    Ok(Json(SubscriptionResponse {
        remaining: snapshot.remaining(),
        plan: snapshot.plan_name,
        upload_limit: snapshot.upload_limit,
        uploads_used: snapshot.uploads_used,
        valid_until,
    }))
}

/// Handler: GET /api/plans
pub async fn list_plans() -> Json<&'static [Plan]> {
    Json(PLANS)
}

/// Handler: GET /api/uploads
pub async fn list_uploads(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<UploadHistory>, ApiError> {
    let uploads = store::list_uploads(&state.db, &user.id).await?;
    Ok(Json(UploadHistory {
        count: uploads.len(),
        uploads,
    }))
}

/// Handler: POST /api/sessions
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> (StatusCode, Json<SessionView>) {
    debug!(user_id = %user.id, name = ?user.name, email = ?user.email, "Session requested");
    let (id, session) = state.create_session(&user.id).await;
    let view = SessionView::new(id, &*session.lock().await);
    (StatusCode::CREATED, Json(view))
}

/// Handler: GET /api/sessions/:id
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state.session(id, &user.id).await?;
    let guard = session.lock().await;
    Ok(Json(SessionView::new(id, &guard)))
}

/// Handler: DELETE /api/sessions/:id
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let entry = state.remove_session(id, &user.id).await?;
    info!(%id, opened = %entry.created_at, "Closed session");

    // A request still holding the session releases the document when it finishes
    if let Ok(session) = Arc::try_unwrap(entry.session) {
        session.into_inner().close();
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Handler: POST /api/sessions/:id/document
///
/// The quota is consulted and usage recorded only the first time a file
/// identity is processed in the session.
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, ApiError> {
    if req.filename.trim().is_empty() {
        return Err(ApiError::InvalidRequest("filename must not be empty".to_string()));
    }
    let bytes = BASE64
        .decode(req.pdf_base64.trim())
        .map_err(|e| ApiError::InvalidRequest(format!("Invalid PDF base64: {}", e)))?;
    let identity = DocumentIdentity::from_upload(&req.filename, &bytes);

    let session = state.session(id, &user.id).await?;
    let guard = session.lock_owned().await;

    // Held across check, load and record so parallel sessions of one user
    // cannot both pass the same remaining slot
    let upload_lock = if guard.is_recorded(&identity) {
        None
    } else {
        Some(state.lock_uploads(&user.id).await)
    };

    let gate = if upload_lock.is_none() {
        None
    } else {
        let (snapshot, _) =
            store::snapshot(&state.db, &user.id, state.default_upload_limit).await?;
        if let QuotaDecision::Exhausted { limit } = snapshot.check() {
            warn!(user_id = %user.id, limit, "Upload quota exhausted");
            return Err(ApiError::QuotaExceeded {
                plan: snapshot.plan_name,
                limit,
            });
        }
        Some(snapshot)
    };

    let filename = req.filename.clone();
    let (mut guard, outcome) =
        run_blocking(guard, move |s| s.apply(Action::LoadDocument { name: filename, bytes })).await?;
    let outcome = outcome?;

    let mut remaining_uploads = None;
    if let Some(snapshot) = gate {
        store::record_upload(&state.db, &req.filename, "processed", &user.id).await?;
        guard.mark_recorded(identity);
        remaining_uploads = Some(snapshot.remaining().saturating_sub(1));
    }
    drop(upload_lock);

    if let Outcome::Loaded { page_count } = outcome {
        info!(%id, filename = %req.filename, page_count, "Document processed");
    }

    Ok(Json(UploadResponse {
        outcome,
        remaining_uploads,
        session: SessionView::new(id, &guard),
    }))
}

/// Handler: POST /api/sessions/:id/actions
pub async fn apply_action(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<ActionRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    let session = state.session(id, &user.id).await?;
    let guard = session.lock_owned().await;

    let action = Action::from(req);
    let (guard, outcome) = run_blocking(guard, move |s| s.apply(action)).await?;

    Ok(Json(ActionResponse {
        outcome: outcome?,
        session: SessionView::new(id, &guard),
    }))
}

/// Handler: GET /api/sessions/:id/preview?zoom=
pub async fn preview(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Query(query): Query<PreviewQuery>,
) -> Result<Response, ApiError> {
    let zoom = query.zoom.unwrap_or(state.default_zoom);
    let session = state.session(id, &user.id).await?;
    let guard = session.lock_owned().await;

    let (guard, png) = run_blocking(guard, move |s| {
        s.render_current(zoom).and_then(|image| encode_png(&image))
    })
    .await?;
    let png = png?;
    let page = guard.state().page_number.to_string();

    Ok((
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (header::HeaderName::from_static("x-page-number"), page),
        ],
        png,
    )
        .into_response())
}

/// Handler: GET /api/sessions/:id/text
pub async fn get_text(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<TextResponse>, ApiError> {
    let session = state.session(id, &user.id).await?;
    let guard = session.lock().await;

    let text = guard.full_text().ok_or(ApiError::NoDocument)?;
    let filename = guard
        .identity()
        .map(|identity| identity.filename.clone())
        .unwrap_or_default();

    Ok(Json(TextResponse {
        filename,
        page_count: guard.page_count(),
        text,
    }))
}

/// Handler: POST /api/sessions/:id/structure
///
/// Service failures come back verbatim as `{"error": ...}` with 502.
pub async fn structure(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let session = state.session(id, &user.id).await?;
    let text = session.lock().await.full_text().ok_or(ApiError::NoDocument)?;

    let value = state.structuring.structure(&text).await;
    let status = if value.get("error").is_some() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::OK
    };
    Ok((status, Json(value)))
}
