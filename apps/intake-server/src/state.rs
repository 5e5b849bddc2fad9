//! Application state for the intake server

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use intake_core::{build_engine, FieldTable, IntakeSession, PdfEngine, SessionOptions};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use crate::config::Config;
use crate::error::ApiError;
use crate::store;
use crate::structuring::StructuringClient;

/// A live session and its owner
pub struct SessionEntry {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    /// Milliseconds since the Unix epoch of the last lookup
    last_used: AtomicI64,
    pub session: Arc<Mutex<IntakeSession>>,
}

impl SessionEntry {
    fn touch(&self, now: DateTime<Utc>) {
        self.last_used.store(now.timestamp_millis(), Ordering::Relaxed);
    }

    fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now.timestamp_millis() - self.last_used.load(Ordering::Relaxed) >= ttl.num_milliseconds()
    }
}

pub struct AppState {
    pub db: SqlitePool,
    pub engine: Arc<dyn PdfEngine>,
    pub fields: Arc<FieldTable>,
    pub session_options: SessionOptions,
    pub default_zoom: f32,
    pub default_upload_limit: u32,
    pub structuring: StructuringClient,
    pub session_ttl: Duration,
    sessions: RwLock<HashMap<Uuid, SessionEntry>>,
    /// Serializes quota check, load and record per user across sessions
    upload_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AppState {
    pub async fn new(config: &Config) -> Result<Self> {
        tracing::info!("Connecting to database: {}", config.database.url);

        let pool = if config.database.url.contains(":memory:") {
            // Every connection to an in-memory database is a separate database
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect(&config.database.url)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(config.database.max_connections)
                .connect(&config.database.url)
                .await?
        };

        store::run_migrations(&pool).await?;
        Self::with_pool(pool, config)
    }

    pub fn with_pool(db: SqlitePool, config: &Config) -> Result<Self> {
        let engine = build_engine(config.engine.kind, config.engine.library_dir.clone())
            .context("Failed to initialise PDF engine")?;
        let fields = Arc::new(config.field_table()?);
        let session_options = config.session_options();
        intake_core::validate_zoom(config.preview.default_zoom, session_options.max_zoom)
            .context("preview.default_zoom is outside (0, max_zoom]")?;

        tracing::info!(
            engine = engine.name(),
            fields = fields.len(),
            "PDF engine ready"
        );

        Ok(Self {
            db,
            engine,
            fields,
            session_options,
            default_zoom: config.preview.default_zoom,
            default_upload_limit: config.quota.default_upload_limit,
            structuring: StructuringClient::new(config.structuring.clone()),
            session_ttl: config.session_ttl(),
            sessions: RwLock::new(HashMap::new()),
            upload_locks: Mutex::new(HashMap::new()),
        })
    }

    pub async fn create_session(&self, user_id: &str) -> (Uuid, Arc<Mutex<IntakeSession>>) {
        self.sweep_expired().await;

        let id = Uuid::new_v4();
        let now = Utc::now();
        let session = Arc::new(Mutex::new(IntakeSession::with_options(
            Arc::clone(&self.engine),
            Arc::clone(&self.fields),
            self.session_options.clone(),
        )));
        self.sessions.write().await.insert(
            id,
            SessionEntry {
                user_id: user_id.to_string(),
                created_at: now,
                last_used: AtomicI64::new(now.timestamp_millis()),
                session: Arc::clone(&session),
            },
        );
        tracing::info!(%id, user_id, "Created session");
        (id, session)
    }

    /// Session owned by `user_id`; other users' sessions look missing.
    ///
    /// A session idle for longer than the TTL is dropped on lookup and
    /// reported as expired.
    pub async fn session(&self, id: Uuid, user_id: &str) -> Result<Arc<Mutex<IntakeSession>>, ApiError> {
        let now = Utc::now();
        {
            let sessions = self.sessions.read().await;
            let entry = sessions
                .get(&id)
                .filter(|entry| entry.user_id == user_id)
                .ok_or_else(|| ApiError::SessionNotFound(id.to_string()))?;
            if !entry.is_expired(now, self.session_ttl) {
                entry.touch(now);
                return Ok(Arc::clone(&entry.session));
            }
        }

        let mut sessions = self.sessions.write().await;
        match sessions.get(&id) {
            // Touched by another request in between
            Some(entry) if !entry.is_expired(now, self.session_ttl) => {
                entry.touch(now);
                Ok(Arc::clone(&entry.session))
            }
            Some(_) => {
                sessions.remove(&id);
                tracing::info!(%id, "Session expired");
                Err(ApiError::SessionExpired(id.to_string()))
            }
            None => Err(ApiError::SessionExpired(id.to_string())),
        }
    }

    /// Drop every session idle for longer than the TTL, returning how many
    pub async fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let removed = {
            let mut sessions = self.sessions.write().await;
            let before = sessions.len();
            sessions.retain(|_, entry| !entry.is_expired(now, self.session_ttl));
            before - sessions.len()
        };

        // Locks nobody is holding or waiting on
        self.upload_locks
            .lock()
            .await
            .retain(|_, lock| Arc::strong_count(lock) > 1);

        if removed > 0 {
            tracing::info!(removed, "Swept idle sessions");
        }
        removed
    }

    /// Hold the user's upload lock; released when the guard drops
    pub async fn lock_uploads(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.upload_locks.lock().await;
            Arc::clone(locks.entry(user_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    pub async fn remove_session(&self, id: Uuid, user_id: &str) -> Result<SessionEntry, ApiError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get(&id) {
            Some(entry) if entry.user_id == user_id => {}
            _ => return Err(ApiError::SessionNotFound(id.to_string())),
        }
        sessions
            .remove(&id)
            .ok_or_else(|| ApiError::SessionNotFound(id.to_string()))
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
