//! Generation service client.
//!
//! The service exposes one operation: run a stored prompt template against
//! free prompt text. The HTTP flavour posts
//!
//! ```text
//! { "api_key": "...", "project_id": "<template id>", "prompt": "..." }
//! ```
//!
//! and answers `{ "data": [ { "output": "..." }, ... ] }`. Callers only use
//! the first output.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use scaffold::repair::strip_code_fences;

use crate::error::ClientError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub output: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(
        &self,
        template_id: &str,
        prompt: &str,
    ) -> Result<Vec<GenerationOutput>, ClientError>;
}

/// Text of the first output, or empty when the service returned none. An
/// empty answer is rejected by the retry controller like any other.
pub fn first_output(outputs: Vec<GenerationOutput>) -> String {
    outputs
        .into_iter()
        .next()
        .map(|o| o.output)
        .unwrap_or_default()
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    api_key: &'a str,
    project_id: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct CompletionEnvelope {
    data: Vec<GenerationOutput>,
}

/// Decode a response body and strip code fences from every output.
pub fn parse_envelope(body: &str) -> Result<Vec<GenerationOutput>, ClientError> {
    let envelope: CompletionEnvelope =
        serde_json::from_str(body).map_err(|e| ClientError::Envelope(e.to_string()))?;
    Ok(envelope
        .data
        .into_iter()
        .map(|o| GenerationOutput {
            output: strip_code_fences(&o.output).to_string(),
        })
        .collect())
}

pub struct HttpGenerationClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpGenerationClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl GenerationClient for HttpGenerationClient {
    async fn generate(
        &self,
        template_id: &str,
        prompt: &str,
    ) -> Result<Vec<GenerationOutput>, ClientError> {
        let request = CompletionRequest {
            api_key: &self.api_key,
            project_id: template_id,
            prompt,
        };
        debug!(template_id, prompt_len = prompt.len(), "generation request");

        let response = self.http.post(&self.endpoint).json(&request).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        parse_envelope(&body)
    }
}
