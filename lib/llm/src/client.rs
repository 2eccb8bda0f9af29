// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Minimal OpenAI-compatible HTTP client.

use std::time::Duration;

use dynkube_runtime::{CancellationToken, ChatConfig};
use serde::de::DeserializeOwned;
use url::Url;

use crate::protocols::openai::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ErrorResponse, ModelList,
};

/// Longest response body quoted in an error.
const ERROR_BODY_LIMIT: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid base URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },

    #[error("no models are served at {0}")]
    EmptyModels(String),

    #[error("response has no message content")]
    MissingContent,

    #[error("no model was served at {url} within {timeout:?}")]
    ModelsTimeout { url: String, timeout: Duration },

    #[error("cancelled")]
    Cancelled,
}

fn truncate(body: &str) -> String {
    match body.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

/// Talks to `<base>/v1/...`. A base URL that already ends in `/v1` is
/// accepted as well.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl OpenAiClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, ClientError> {
        let parsed = Url::parse(base_url).map_err(|source| ClientError::InvalidUrl {
            url: base_url.to_string(),
            source,
        })?;
        let base = parsed.as_str().trim_end_matches('/');
        let base = base.strip_suffix("/v1").unwrap_or(base).to_string();

        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|source| ClientError::Transport {
                url: base.clone(),
                source,
            })?;

        Ok(Self {
            http,
            base,
            temperature: None,
            max_tokens: None,
        })
    }

    pub fn from_config(config: &ChatConfig) -> Result<Self, ClientError> {
        Ok(Self::new(&config.base_url, config.request_timeout())?
            .with_sampling(config.temperature, config.max_tokens))
    }

    /// Sampling parameters applied by [`OpenAiClient::complete`].
    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = Some(temperature);
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base, path.trim_start_matches('/'))
    }

    async fn decode<T: DeserializeOwned>(
        url: &str,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();
        let body = response.text().await.map_err(|source| ClientError::Transport {
            url: url.to_string(),
            source,
        })?;

        if !status.is_success() {
            let body = serde_json::from_str::<ErrorResponse>(&body)
                .map(|err| err.error.message)
                .unwrap_or(body);
            return Err(ClientError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: truncate(&body),
            });
        }

        serde_json::from_str(&body).map_err(|err| ClientError::Malformed {
            url: url.to_string(),
            reason: format!("{err}; body: {}", truncate(&body)),
        })
    }

    /// GET /v1/models. An empty `data` list is an error.
    pub async fn list_models(&self) -> Result<Vec<String>, ClientError> {
        let url = self.endpoint("models");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                url: url.clone(),
                source,
            })?;
        let models: ModelList = Self::decode(&url, response).await?;
        let ids = models.ids();
        if ids.is_empty() {
            return Err(ClientError::EmptyModels(url));
        }
        Ok(ids)
    }

    /// `model` if given, otherwise the first served model.
    pub async fn resolve_model(&self, model: Option<&str>) -> Result<String, ClientError> {
        match model.filter(|m| !m.is_empty()) {
            Some(model) => Ok(model.to_string()),
            None => {
                let models = self.list_models().await?;
                tracing::debug!(?models, "served models");
                models
                    .into_iter()
                    .next()
                    .ok_or_else(|| ClientError::EmptyModels(self.endpoint("models")))
            }
        }
    }

    /// POST /v1/chat/completions
    pub async fn chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ClientError> {
        let url = self.endpoint("chat/completions");
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                url: url.clone(),
                source,
            })?;
        Self::decode(&url, response).await
    }

    /// One non-streaming completion with this client's sampling parameters.
    pub async fn complete(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
    ) -> Result<ChatCompletionResponse, ClientError> {
        let mut request = ChatCompletionRequest::new(model, messages);
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;
        self.chat_completion(&request).await
    }

    /// Poll /v1/models until at least one model is served.
    pub async fn wait_for_models(
        &self,
        timeout: Duration,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, ClientError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.list_models().await {
                Ok(models) => return Ok(models),
                Err(err) => tracing::debug!(error = %err, "models not available yet"),
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Err(ClientError::ModelsTimeout {
                    url: self.endpoint("models"),
                    timeout,
                });
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                _ = tokio::time::sleep(interval.min(deadline - now)) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("http://localhost:8000", "http://localhost:8000/v1/models")]
    #[case("http://localhost:8000/", "http://localhost:8000/v1/models")]
    #[case("http://10.0.0.1:30080/v1", "http://10.0.0.1:30080/v1/models")]
    #[case("http://gw.example.com/llm/v1/", "http://gw.example.com/llm/v1/models")]
    fn test_endpoint(#[case] base: &str, #[case] expected: &str) {
        let client = OpenAiClient::new(base, Duration::from_secs(1)).unwrap();
        assert_eq!(client.endpoint("models"), expected);
    }

    #[test]
    fn test_invalid_url() {
        let err = OpenAiClient::new("not a url", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ClientError::InvalidUrl { .. }));
    }

    #[test]
    fn test_truncate() {
        let long = "x".repeat(ERROR_BODY_LIMIT + 10);
        assert_eq!(truncate(&long).len(), ERROR_BODY_LIMIT + 3);
        assert_eq!(truncate("short"), "short");
    }
}
