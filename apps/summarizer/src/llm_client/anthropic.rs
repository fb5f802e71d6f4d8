//! Anthropic Messages API transport. One HTTP request per `send`; retry policy lives in
//! `ModelClient`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::llm_client::{
    BackendResponse, ModelBackend, ModelError, ModelTier, RenderedPrompt, Usage,
};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// `stop_reason` the API reports when safety systems declined the request.
const STOP_REFUSAL: &str = "refusal";

/// Model names per tier. Hardcoded so a deploy cannot silently drift to another model.
pub const MODEL_ADVANCED: &str = "claude-sonnet-4-5";
pub const MODEL_BASIC: &str = "claude-haiku-4-5";

pub fn model_for(tier: ModelTier) -> &'static str {
    match tier {
        ModelTier::Basic => MODEL_BASIC,
        ModelTier::Advanced => MODEL_ADVANCED,
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

impl AnthropicResponse {
    /// Extracts the text content from the first text block.
    fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }

    /// A 200 can still be a content-policy refusal; that is rejected, never retried.
    fn into_backend_response(self, requested_model: &str) -> Result<BackendResponse, ModelError> {
        if self.stop_reason.as_deref() == Some(STOP_REFUSAL) {
            return Err(ModelError::Rejected {
                status: StatusCode::OK.as_u16(),
                message: "model refused the request".to_string(),
            });
        }

        let text = self.text().ok_or(ModelError::EmptyContent)?.to_string();
        if text.trim().is_empty() {
            return Err(ModelError::EmptyContent);
        }

        Ok(BackendResponse {
            text,
            model: self.model.unwrap_or_else(|| requested_model.to_string()),
            usage: self.usage,
        })
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

#[derive(Clone)]
pub struct AnthropicBackend {
    client: Client,
    api_key: String,
}

impl AnthropicBackend {
    /// `timeout` is a transport-level ceiling; `ModelClient` enforces its own per-call timeout.
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key,
        })
    }
}

#[async_trait]
impl ModelBackend for AnthropicBackend {
    async fn send(&self, prompt: &RenderedPrompt) -> Result<BackendResponse, ModelError> {
        let model = model_for(prompt.tier);
        let request_body = AnthropicRequest {
            model,
            max_tokens: prompt.max_tokens,
            temperature: prompt.temperature,
            system: &prompt.system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: &prompt.user,
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let parsed: AnthropicResponse = response.json().await.map_err(|e| ModelError::Transient {
            status: Some(status.as_u16()),
            message: format!("unreadable response body: {e}"),
        })?;

        parsed.into_backend_response(model)
    }
}

fn classify_transport_error(e: reqwest::Error) -> ModelError {
    if e.is_builder() {
        ModelError::InvalidPrompt(e.to_string())
    } else if e.is_timeout() {
        ModelError::Transient {
            status: None,
            message: format!("request timed out: {e}"),
        }
    } else {
        ModelError::Transient {
            status: None,
            message: e.to_string(),
        }
    }
}

/// 408, 429 and 5xx (including Anthropic's 529 "overloaded") are transient. Everything else
/// (400 malformed, 401/403 auth, content-policy refusals) is surfaced as rejected.
fn classify_status(status: StatusCode, body: String) -> ModelError {
    let message = serde_json::from_str::<AnthropicError>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);

    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
        || status.as_u16() == 529
    {
        ModelError::Transient {
            status: Some(status.as_u16()),
            message,
        }
    } else {
        ModelError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_and_overload_are_transient() {
        for code in [429u16, 408, 500, 503, 529] {
            let status = StatusCode::from_u16(code).unwrap();
            assert!(
                classify_status(status, String::new()).is_transient(),
                "{code} should be transient"
            );
        }
    }

    #[test]
    fn test_auth_and_bad_request_are_rejected_with_parsed_message() {
        let body = r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#;
        let err = classify_status(StatusCode::UNAUTHORIZED, body.to_string());
        match err {
            ModelError::Rejected { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "invalid x-api-key");
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
        assert!(!classify_status(StatusCode::BAD_REQUEST, "bad".to_string()).is_transient());
    }

    #[test]
    fn test_response_text_picks_first_text_block() {
        let json = r#"{
            "content": [
                {"type": "thinking", "text": null},
                {"type": "text", "text": "{\"pass\": true}"}
            ],
            "model": "claude-haiku-4-5",
            "usage": {"input_tokens": 12, "output_tokens": 7}
        }"#;
        let parsed: AnthropicResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.text(), Some("{\"pass\": true}"));
        assert_eq!(parsed.usage.output_tokens, 7);
    }

    #[test]
    fn test_refusal_is_rejected_not_transient() {
        let json = r#"{
            "content": [],
            "model": "claude-sonnet-4-5",
            "stop_reason": "refusal",
            "usage": {"input_tokens": 40, "output_tokens": 0}
        }"#;
        let parsed: AnthropicResponse = serde_json::from_str(json).unwrap();
        let err = parsed.into_backend_response(MODEL_ADVANCED).unwrap_err();
        assert!(matches!(err, ModelError::Rejected { status: 200, .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_empty_end_turn_is_transient_empty_content() {
        let json = r#"{
            "content": [{"type": "text", "text": "  "}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 40, "output_tokens": 1}
        }"#;
        let parsed: AnthropicResponse = serde_json::from_str(json).unwrap();
        let err = parsed.into_backend_response(MODEL_BASIC).unwrap_err();
        assert!(matches!(err, ModelError::EmptyContent));
        assert!(err.is_transient());
    }

    #[test]
    fn test_missing_model_falls_back_to_requested() {
        let json = r#"{
            "content": [{"type": "text", "text": "ok"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 1, "output_tokens": 1}
        }"#;
        let parsed: AnthropicResponse = serde_json::from_str(json).unwrap();
        let response = parsed.into_backend_response(MODEL_BASIC).unwrap();
        assert_eq!(response.model, MODEL_BASIC);
        assert_eq!(response.text, "ok");
    }

    #[test]
    fn test_tiers_map_to_models() {
        assert_eq!(model_for(ModelTier::Advanced), MODEL_ADVANCED);
        assert_eq!(model_for(ModelTier::Basic), MODEL_BASIC);
    }
}
