//! Stateless reqwest transport to `{base_url}/v1/chat/completions`.

use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::source::FramePayload;

use super::types::InferenceError;
use super::InferenceBackend;

/// Generation budget per request; keeps periodic sampling snappy.
const MAX_TOKENS: u32 = 100;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

// OpenAI-compatible request/response shapes.
#[derive(Serialize)]
struct ChatRequest {
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageBody,
}

#[derive(Deserialize)]
struct ChatMessageBody {
    content: String,
}

/// HTTP client for one configured endpoint.
pub struct InferenceClient {
    http: reqwest::Client,
    base_url: String,
}

impl InferenceClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send one instruction + frame and return the model's text.
    ///
    /// The message carries two parts: the instruction text and the frame as
    /// an embedded data URL.
    pub async fn describe_frame(
        &self,
        instruction: &str,
        frame: &FramePayload,
    ) -> Result<String, InferenceError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = ChatRequest {
            max_tokens: MAX_TOKENS,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![
                    ContentPart::Text {
                        text: instruction.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: frame.data_url().to_string(),
                        },
                    },
                ],
            }],
        };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(InferenceError::Network)?;

        let status = response.status();
        if !status.is_success() {
            debug!(%status, url, "Inference request rejected");
            return Err(InferenceError::Http {
                status: status.as_u16(),
            });
        }

        let text = response.text().await.map_err(InferenceError::Network)?;
        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|_| InferenceError::MalformedResponse)?;

        parsed
            .choices
            .first()
            .map(|choice| choice.message.content.clone())
            .ok_or(InferenceError::MalformedResponse)
    }
}

impl InferenceBackend for InferenceClient {
    fn describe<'a>(
        &'a self,
        instruction: &'a str,
        frame: &'a FramePayload,
    ) -> BoxFuture<'a, Result<String, InferenceError>> {
        Box::pin(self.describe_frame(instruction, frame))
    }
}
