//! Ollama-compatible structured inference client.
//!
//! Calls `/api/chat` with a JSON-schema `format`, so the model can only emit
//! `{label, confidence, reason}` with `label` drawn from the taxonomy.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{InferenceClient, InferenceError, LabelPrediction};

const SYSTEM_PROMPT: &str =
    "You are a strict classifier. Select exactly one label from the allowed list. Reply only with the JSON object.";

/// Cap on generated tokens; the structured object is small.
const MAX_OUTPUT_TOKENS: u32 = 128;

/// Error bodies are truncated to this many characters.
const MAX_ERROR_BODY: usize = 200;

pub struct OllamaInferenceClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaInferenceClient {
    pub fn new(
        base_url: &str,
        model: &str,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            // Whole-call bound on top of the per-read one.
            .timeout(connect_timeout + read_timeout)
            .build()
            .map_err(|e| InferenceError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        })
    }
}

/// Request body for /api/chat
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    format: serde_json::Value,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

/// Response body from /api/chat
#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

fn response_schema(taxonomy: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "label": { "type": "string", "enum": taxonomy },
            "confidence": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
            "reason": { "type": "string", "maxLength": 100 }
        },
        "required": ["label", "confidence", "reason"]
    })
}

fn user_prompt(text: &str, taxonomy: &[&str]) -> String {
    format!(
        "Allowed labels: {}\nGive a confidence between 0 and 1 and a reason of at most 12 words.\nClassify this snippet into one label. Snippet:\n{text}",
        taxonomy.join(" | ")
    )
}

fn map_transport_error(e: reqwest::Error) -> InferenceError {
    if e.is_timeout() {
        InferenceError::Timeout
    } else if e.is_connect() {
        InferenceError::Connection(e.to_string())
    } else if e.is_decode() {
        InferenceError::MalformedResponse(e.to_string())
    } else if e.is_request() || e.is_body() {
        InferenceError::Connection(e.to_string())
    } else {
        InferenceError::HttpClient(e.to_string())
    }
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl InferenceClient for OllamaInferenceClient {
    async fn classify(&self, text: &str, taxonomy: &[&str]) -> Result<LabelPrediction, InferenceError> {
        let url = format!("{}/api/chat", self.base_url);
        let prompt = user_prompt(text, taxonomy);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            stream: false,
            format: response_schema(taxonomy),
            options: ChatOptions {
                temperature: 0.0,
                num_predict: MAX_OUTPUT_TOKENS,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(InferenceError::Throttled {
                retry_after: parse_retry_after(response.headers()),
            });
        }
        if !status.is_success() {
            let body: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(MAX_ERROR_BODY)
                .collect();
            return Err(if status.is_server_error() {
                InferenceError::Server {
                    status: status.as_u16(),
                    body,
                }
            } else {
                InferenceError::Rejected {
                    status: status.as_u16(),
                    body,
                }
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(map_transport_error)?;
        serde_json::from_str::<LabelPrediction>(parsed.message.content.trim())
            .map_err(|e| InferenceError::MalformedResponse(e.to_string()))
    }
}

/// Test double returning a fixed result for every call.
#[cfg(test)]
pub struct MockInferenceClient {
    response: Result<LabelPrediction, InferenceError>,
}

#[cfg(test)]
impl MockInferenceClient {
    pub fn labelling(label: &str, confidence: f64) -> Self {
        Self {
            response: Ok(LabelPrediction {
                label: label.to_string(),
                confidence,
                reason: "mock".to_string(),
            }),
        }
    }

    pub fn failing(error: InferenceError) -> Self {
        Self {
            response: Err(error),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl InferenceClient for MockInferenceClient {
    async fn classify(&self, _text: &str, _taxonomy: &[&str]) -> Result<LabelPrediction, InferenceError> {
        self.response.clone()
    }
}

#[cfg(test)]
pub(crate) mod test_server {
    //! In-process stand-in for the inference endpoint.

    use axum::Router;

    /// Serve `router` on an ephemeral localhost port; returns the base URL.
    pub async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }
}
