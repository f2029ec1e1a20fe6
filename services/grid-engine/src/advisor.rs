//! Advisory model transport
//!
//! Thin client for the Anthropic Messages API shared by the generator and
//! the reviewer. Each gateway owns its own `AdvisoryClient`, so the two
//! never share model, temperature or token budget.

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{EngineError, Result};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Per-gateway request parameters
#[derive(Debug, Clone)]
pub struct AdvisoryParams {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Client for one advisory service
pub struct AdvisoryClient {
    client: Client,
    base_url: String,
    api_key: String,
    params: AdvisoryParams,
    service: &'static str,
}

impl AdvisoryClient {
    /// `service` names the caller in errors and logs ("generator", "reviewer")
    pub fn new(
        service: &'static str,
        base_url: &str,
        api_key: &str,
        params: AdvisoryParams,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| EngineError::transport(service, e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            params,
            service,
        })
    }

    pub fn model(&self) -> &str {
        &self.params.model
    }

    /// Send one user prompt and return the first text block
    ///
    /// Single attempt; any non-success status is surfaced verbatim.
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/messages", self.base_url);

        let request = MessagesRequest {
            model: &self.params.model,
            max_tokens: self.params.max_tokens,
            temperature: self.params.temperature,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        debug!("{} request to {} ({})", self.service, url, self.params.model);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| EngineError::transport(self.service, e))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(EngineError::http_status(self.service, status, &text));
        }

        let body: MessagesResponse =
            serde_json::from_str(&text).map_err(|e| EngineError::Parse {
                service: self.service,
                message: format!("malformed response envelope: {}", e),
                raw: text.clone(),
            })?;

        body.content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .ok_or_else(|| EngineError::Parse {
                service: self.service,
                message: "response has no text content".to_string(),
                raw: text,
            })
    }
}

/// Span from the first `{` to the last `}`; models often wrap JSON in prose
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Deserialize the embedded JSON object, keeping the raw text on failure
pub fn parse_advisory_json<T: DeserializeOwned>(service: &'static str, text: &str) -> Result<T> {
    let json = extract_json_object(text).ok_or_else(|| EngineError::Parse {
        service,
        message: "no JSON object found in response".to_string(),
        raw: text.to_string(),
    })?;

    serde_json::from_str(json).map_err(|e| EngineError::Parse {
        service,
        message: format!("invalid JSON: {}", e),
        raw: text.to_string(),
    })
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}
