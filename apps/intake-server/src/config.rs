//! Server configuration
//!
//! Loaded from an optional TOML file; every section has defaults so the
//! server starts without one. `DATABASE_URL`, `PORT` and `OPENAI_API_KEY`
//! override whatever the file says.
//!
//! ```toml
//! [server]
//! port = 3000
//!
//! [quota]
//! default_upload_limit = 5
//!
//! [[fields]]
//! label = "Policy Number"
//! pattern = 'Policy No\.?\s*([A-Z0-9\-]+)'
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use intake_core::{
    EngineKind, FieldDefinition, FieldTable, HighlightStyle, SessionOptions, DEFAULT_UPLOAD_LIMIT,
    DEFAULT_ZOOM,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub quota: QuotaConfig,
    pub preview: PreviewConfig,
    pub structuring: StructuringConfig,
    pub engine: EngineConfig,
    /// Field table; empty means the built-in application-form table
    pub fields: Vec<FieldDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Idle time after which a session and its open document are dropped
    pub session_ttl_secs: u64,
    /// How often idle sessions are swept
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            session_ttl_secs: 30 * 60,
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:intake.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Limit for users without a subscription row
    pub default_upload_limit: u32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            default_upload_limit: DEFAULT_UPLOAD_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub default_zoom: f32,
    pub max_zoom: f32,
    /// Memoized previews per session
    pub cache_size: usize,
    /// Outline color as `[r, g, b, a]`
    pub highlight_color: [u8; 4],
    pub stroke_width: u32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        let style = HighlightStyle::default();
        Self {
            default_zoom: DEFAULT_ZOOM,
            max_zoom: 8.0,
            cache_size: 16,
            highlight_color: style.color.0,
            stroke_width: style.stroke,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuringConfig {
    /// OpenAI-compatible chat completions endpoint
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for StructuringConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            max_tokens: 1000,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub kind: EngineKind,
    /// Directory holding the PDFium shared library
    pub library_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        toml::from_str(s).context("Failed to parse TOML configuration")
    }

    /// Apply `DATABASE_URL`, `PORT` and `OPENAI_API_KEY`
    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(url) = var("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(port) = var("PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid PORT value: {}", port))?;
        }
        if let Some(key) = var("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.structuring.api_key = Some(key);
        }
        Ok(())
    }

    /// Compile the configured field table
    pub fn field_table(&self) -> anyhow::Result<FieldTable> {
        if self.fields.is_empty() {
            return Ok(FieldTable::builtin());
        }
        FieldTable::new(self.fields.clone()).context("Invalid [[fields]] configuration")
    }

    /// Session idle timeout, capped at ten years
    pub fn session_ttl(&self) -> chrono::Duration {
        const CAP_SECS: u64 = 10 * 365 * 24 * 60 * 60;
        chrono::Duration::seconds(self.server.session_ttl_secs.min(CAP_SECS) as i64)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            max_zoom: self.preview.max_zoom,
            preview_cache_size: self.preview.cache_size,
            style: HighlightStyle::new(self.preview.highlight_color, self.preview.stroke_width),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_without_file() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.session_ttl_secs, 1800);
        assert_eq!(config.session_ttl(), chrono::Duration::minutes(30));
        assert_eq!(config.quota.default_upload_limit, 5);
        assert_eq!(config.preview.default_zoom, 2.5);
        assert_eq!(config.engine.kind, EngineKind::Lopdf);
        assert_eq!(config.field_table().unwrap().len(), 5);
    }

    #[test]
    fn test_sections_and_fields() {
        let config = Config::from_str(
            r#"
            [server]
            port = 8080
            session_ttl_secs = 120

            [preview]
            max_zoom = 4.0
            cache_size = 2

            [engine]
            kind = "text"

            [[fields]]
            label = "Policy Number"
            pattern = 'Policy No\.?\s*([A-Z0-9\-]+)'
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.session_ttl_secs, 120);
        assert_eq!(config.server.sweep_interval_secs, 60);
        assert_eq!(config.preview.max_zoom, 4.0);
        assert_eq!(config.session_options().preview_cache_size, 2);
        assert_eq!(config.engine.kind, EngineKind::Text);
        assert_eq!(config.field_table().unwrap().labels(), vec!["Policy Number"]);
    }

    #[test]
    fn test_invalid_field_table_is_rejected() {
        let config = Config::from_str(
            r#"
            [[fields]]
            label = "No group"
            pattern = 'Name: \w+'
            "#,
        )
        .unwrap();
        assert!(config.field_table().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("DATABASE_URL", "sqlite::memory:"),
            ("PORT", "4100"),
            ("OPENAI_API_KEY", "sk-test"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.server.port, 4100);
        assert_eq!(config.structuring.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_bad_port_override() {
        let mut config = Config::default();
        let result = config.apply_overrides(|key| (key == "PORT").then(|| "eighty".to_string()));
        assert!(result.is_err());
    }
}
