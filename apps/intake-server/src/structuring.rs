//! Structuring service client
//!
//! Sends extracted text to an OpenAI-compatible chat completions endpoint and
//! asks for a `structure_pdf_content` tool call. Any failure is returned as
//! `{"error": "..."}`; nothing is retried.

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::StructuringConfig;

#[derive(Debug, Error)]
pub enum StructuringError {
    #[error("structuring service is not configured")]
    NotConfigured,

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("structuring service returned {status}: {detail}")]
    Status {
        status: reqwest::StatusCode,
        detail: String,
    },

    #[error("Invalid response structure: {0}")]
    InvalidResponse(Value),

    #[error(transparent)]
    InvalidArguments(#[from] serde_json::Error),
}

pub const TOOL_NAME: &str = "structure_pdf_content";

const SYSTEM_PROMPT: &str = "Convert unstructured text into structured JSON with:
- title
- sections (array)
- skills (array)
- experience (array)
- summary";

#[derive(Clone)]
pub struct StructuringClient {
    http: reqwest::Client,
    config: StructuringConfig,
}

impl StructuringClient {
    pub fn new(config: StructuringConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    fn tool() -> Value {
        json!({
            "type": "function",
            "function": {
                "name": TOOL_NAME,
                "description": "Convert unstructured text into structured JSON format",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "title": {"type": "string", "description": "Document title"},
                        "sections": {"type": "array", "items": {"type": "string"}, "description": "Section headings"},
                        "skills": {"type": "array", "items": {"type": "string"}, "description": "Key skills"},
                        "experience": {"type": "array", "items": {"type": "string"}, "description": "Experience entries"},
                        "summary": {"type": "string", "description": "Brief summary"}
                    },
                    "required": ["title", "sections", "skills", "experience", "summary"]
                }
            }
        })
    }

    /// Structured JSON for `text`, or `{"error": ...}`
    pub async fn structure(&self, text: &str) -> Value {
        match self.request(text).await {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "structuring failed");
                json!({ "error": e.to_string() })
            }
        }
    }

    async fn request(&self, text: &str) -> Result<Value, StructuringError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(StructuringError::NotConfigured)?;

        let body = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": text},
            ],
            "tools": [Self::tool()],
            "tool_choice": "auto",
            "max_tokens": self.config.max_tokens,
        });

        debug!(endpoint = %self.config.endpoint, chars = text.len(), "calling structuring service");
        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let payload: Value = response.json().await?;
        if !status.is_success() {
            let detail = payload
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| payload.to_string());
            return Err(StructuringError::Status { status, detail });
        }

        parse_tool_arguments(&payload)
    }
}

/// Pull the first tool call's JSON arguments out of a completion
pub fn parse_tool_arguments(payload: &Value) -> Result<Value, StructuringError> {
    let arguments = payload
        .pointer("/choices/0/message/tool_calls/0/function/arguments")
        .and_then(Value::as_str)
        .ok_or_else(|| StructuringError::InvalidResponse(payload.clone()))?;
    Ok(serde_json::from_str(arguments)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_tool_arguments() {
        let payload = json!({
            "choices": [{
                "message": {
                    "tool_calls": [{
                        "function": {
                            "name": TOOL_NAME,
                            "arguments": "{\"title\": \"CV\", \"summary\": \"Engineer\"}"
                        }
                    }]
                }
            }]
        });
        assert_eq!(
            parse_tool_arguments(&payload).unwrap(),
            json!({"title": "CV", "summary": "Engineer"})
        );
    }

    #[test]
    fn test_parse_without_tool_call() {
        let payload = json!({"choices": [{"message": {"content": "plain answer"}}]});
        let err = parse_tool_arguments(&payload).unwrap_err();
        assert!(matches!(err, StructuringError::InvalidResponse(_)));
        assert!(err.to_string().starts_with("Invalid response structure: "));
    }

    #[test]
    fn test_parse_bad_arguments() {
        let payload = json!({
            "choices": [{"message": {"tool_calls": [{"function": {"arguments": "{not json"}}]}}]
        });
        assert!(matches!(
            parse_tool_arguments(&payload),
            Err(StructuringError::InvalidArguments(_))
        ));
    }

    #[test]
    fn test_status_error_message() {
        let err = StructuringError::Status {
            status: reqwest::StatusCode::UNAUTHORIZED,
            detail: "bad key".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "structuring service returned 401 Unauthorized: bad key"
        );
    }

    #[tokio::test]
    async fn test_unconfigured_client_reports_error() {
        let client = StructuringClient::new(StructuringConfig::default());
        assert!(!client.is_configured());
        let value = client.structure("some text").await;
        assert_eq!(value, json!({"error": "structuring service is not configured"}));
    }
}
