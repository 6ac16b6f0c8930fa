//! Target model invocation.
//!
//! The invoker is the pluggable seam between the pipeline and the model
//! under test: a deterministic stub for CI and tests, or an
//! OpenAI-compatible HTTP call for real endpoints. Calls are single-attempt
//! with no retry; any failure propagates and aborts the in-progress run.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::InvokerConfig;
use crate::error::{ConfigError, InvocationError};

/// Invokes the target model with a system prompt and a single test input.
#[async_trait]
pub trait TargetInvoker: Send + Sync {
    async fn invoke(
        &self,
        prompt: &str,
        input: &str,
        target_model: &str,
    ) -> Result<String, InvocationError>;
}

/// Deterministic invoker that echoes its arguments in a fixed template.
///
/// Keeps the whole pipeline runnable without network access; the CI smoke
/// suite asserts against this exact output shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubInvoker;

#[async_trait]
impl TargetInvoker for StubInvoker {
    async fn invoke(
        &self,
        prompt: &str,
        input: &str,
        target_model: &str,
    ) -> Result<String, InvocationError> {
        Ok(format!(
            "[model={target_model}] Prompt: {prompt}\nInput: {input}"
        ))
    }
}

/// Invoker that calls an OpenAI-compatible `/chat/completions` endpoint.
pub struct HttpInvoker {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpInvoker {
    /// Create an invoker from configuration.
    ///
    /// Reads the API key from the environment variable named in
    /// `config.api_key_env`.
    pub fn new(config: &InvokerConfig) -> Result<Self, ConfigError> {
        let api_key =
            std::env::var(&config.api_key_env).map_err(|_| ConfigError::MissingCredential {
                var: config.api_key_env.clone(),
            })?;
        Ok(Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl TargetInvoker for HttpInvoker {
    async fn invoke(
        &self,
        prompt: &str,
        input: &str,
        target_model: &str,
    ) -> Result<String, InvocationError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": target_model,
            "messages": [
                { "role": "system", "content": prompt },
                { "role": "user", "content": input },
            ],
            "stream": false,
        });

        debug!(url = %url, model = %target_model, "Sending target model request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| InvocationError::ApiRequest {
                message: format!("Request failed: {e}"),
            })?;

        let status = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|e| InvocationError::ApiRequest {
                message: format!("Failed to read response body: {e}"),
            })?;

        if !status.is_success() {
            return Err(InvocationError::HttpStatus {
                status: status.as_u16(),
                body: response_body,
            });
        }

        let value: Value =
            serde_json::from_str(&response_body).map_err(|e| InvocationError::ResponseParse {
                message: format!("Invalid JSON: {e}"),
            })?;

        value["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| InvocationError::ResponseParse {
                message: "Missing choices[0].message.content".to_string(),
            })
    }
}
