//! Wire types for the external AI provider.
//!
//! Request and response bodies for the chat-completion and
//! image-generation endpoints, plus the provider error envelope shared by
//! both. Only the fields this crate reads or writes are modeled.

use serde::{Deserialize, Serialize};

use crate::error::DalleError;

/// Cap on how much of an error body is kept for messages and logs.
pub const ERROR_BODY_LIMIT: usize = 512;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Chat-completion request body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub seed: i64,
    pub temperature: f64,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

/// Image-generation request body.
#[derive(Debug, Clone, Serialize)]
pub struct ImageRequest {
    pub prompt: String,
    pub n: u32,
    pub quality: String,
    pub model: String,
    pub style: String,
    pub size: String,
}

/// One generated image: a URL or, as a documented fallback, inline
/// base64.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageDatum {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub b64_json: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageResponse {
    #[serde(default)]
    pub data: Vec<ImageDatum>,
}

/// The provider's error envelope.
#[derive(Debug, Clone, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: ErrorBody,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    code: Option<String>,
}

/// The leading `ERROR_BODY_LIMIT` bytes of a body, on a char boundary.
pub fn truncated(body: &str) -> &str {
    if body.len() <= ERROR_BODY_LIMIT {
        return body;
    }
    let mut end = ERROR_BODY_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

/// Turn a non-2xx provider response into a typed error, extracting the
/// provider code when the envelope parses.
pub fn provider_error(status: u16, body: &str) -> DalleError {
    let body = truncated(body);
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) if !envelope.error.message.is_empty() || envelope.error.code.is_some() => {
            let code = envelope
                .error
                .code
                .filter(|c| !c.is_empty())
                .unwrap_or(envelope.error.kind);
            DalleError::api(status, code, envelope.error.message)
        }
        _ => DalleError::api(status, "unknown", body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_extracts_code_and_message() {
        let body = r#"{"error":{"message":"bad prompt","type":"invalid_request_error","code":"prompt_too_long"}}"#;
        match provider_error(400, body) {
            DalleError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 400);
                assert_eq!(code, "prompt_too_long");
                assert_eq!(message, "bad prompt");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn provider_error_falls_back_to_type_then_raw_body() {
        let body = r#"{"error":{"message":"nope","type":"server_error"}}"#;
        match provider_error(500, body) {
            DalleError::Api { code, .. } => assert_eq!(code, "server_error"),
            other => panic!("unexpected {other:?}"),
        }

        match provider_error(502, "<html>gateway</html>") {
            DalleError::Api { code, message, .. } => {
                assert_eq!(code, "unknown");
                assert_eq!(message, "<html>gateway</html>");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn policy_violations_get_their_own_variant() {
        let body = r#"{"error":{"message":"rejected","code":"content_policy_violation"}}"#;
        assert!(matches!(
            provider_error(400, body),
            DalleError::PolicyViolation { .. }
        ));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let long = "é".repeat(ERROR_BODY_LIMIT);
        let cut = truncated(&long);
        assert!(cut.len() <= ERROR_BODY_LIMIT);
        assert!(long.starts_with(cut));
        assert_eq!(truncated("short"), "short");
    }
}
