// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! One-shot check that a deployed frontend answers a chat completion.

use std::fmt;
use std::time::Duration;

use dynkube_parsers::reasoning::contains_reasoning_markup;
use dynkube_runtime::CancellationToken;

use crate::client::{ClientError, OpenAiClient};
use crate::protocols::openai::{ChatCompletionResponse, ChatMessage, Usage};

pub const DEFAULT_PROMPT: &str = "In one sentence, what is Kubernetes?";

/// Poll interval while waiting for `/v1/models`.
const MODELS_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default)]
pub struct SmokeOptions {
    pub prompt: Option<String>,
    /// Defaults to the first served model
    pub model: Option<String>,
    /// Wait this long for a model to be served before sending the prompt
    pub wait: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmokeWarning {
    /// `finish_reason` was `length`
    Truncated,
    /// Content still carries `<think>` markup
    ReasoningMarkup,
}

impl fmt::Display for SmokeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmokeWarning::Truncated => {
                write!(f, "response was truncated (finish_reason=length); raise max_tokens")
            }
            SmokeWarning::ReasoningMarkup => write!(
                f,
                "response contains reasoning markup; is a reasoning parser configured on the frontend?"
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SmokeReport {
    pub model: String,
    pub content: String,
    pub finish_reason: Option<String>,
    pub warnings: Vec<SmokeWarning>,
    pub usage: Option<Usage>,
}

impl SmokeReport {
    pub fn passed_cleanly(&self) -> bool {
        self.warnings.is_empty()
    }
}

impl fmt::Display for SmokeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "model: {}", self.model)?;
        if let Some(reason) = &self.finish_reason {
            writeln!(f, "finish_reason: {reason}")?;
        }
        if let Some(usage) = &self.usage {
            writeln!(
                f,
                "tokens: prompt={} completion={}",
                usage.prompt_tokens, usage.completion_tokens
            )?;
        }
        write!(f, "{}", self.content)
    }
}

/// Validate a completion. Missing content is fatal; truncation and leftover
/// reasoning markup are warnings.
pub fn evaluate(model: &str, response: &ChatCompletionResponse) -> Result<SmokeReport, ClientError> {
    let content = response.content().ok_or(ClientError::MissingContent)?;

    let mut warnings = Vec::new();
    if response.is_truncated() {
        warnings.push(SmokeWarning::Truncated);
    }
    if contains_reasoning_markup(content) {
        warnings.push(SmokeWarning::ReasoningMarkup);
    }

    Ok(SmokeReport {
        model: response.model.clone().unwrap_or_else(|| model.to_string()),
        content: content.to_string(),
        finish_reason: response.finish_reason().map(str::to_string),
        warnings,
        usage: response.usage,
    })
}

pub async fn run_smoke_test(
    client: &OpenAiClient,
    options: &SmokeOptions,
    cancel: &CancellationToken,
) -> Result<SmokeReport, ClientError> {
    if let Some(wait) = options.wait {
        tracing::info!(base_url = client.base_url(), ?wait, "Waiting for a served model");
        client
            .wait_for_models(wait, MODELS_POLL_INTERVAL, cancel)
            .await?;
    }

    let model = client.resolve_model(options.model.as_deref()).await?;
    let prompt = options.prompt.as_deref().unwrap_or(DEFAULT_PROMPT);
    tracing::info!(%model, "Sending smoke-test prompt");

    let response = tokio::select! {
        _ = cancel.cancelled() => return Err(ClientError::Cancelled),
        response = client.complete(&model, vec![ChatMessage::user(prompt)]) => response?,
    };

    let report = evaluate(&model, &response)?;
    for warning in &report.warnings {
        tracing::warn!(%warning, "smoke test");
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(value: serde_json::Value) -> ChatCompletionResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_clean_response() {
        let report = evaluate(
            "m1",
            &response(json!({
                "choices": [{"message": {"content": "Hello"}, "finish_reason": "stop"}]
            })),
        )
        .unwrap();
        assert_eq!(report.model, "m1");
        assert_eq!(report.content, "Hello");
        assert!(report.passed_cleanly());
    }

    #[test]
    fn test_truncated_and_markup_are_warnings() {
        let report = evaluate(
            "m1",
            &response(json!({
                "model": "served",
                "choices": [{"message": {"content": "<think>hmm"}, "finish_reason": "length"}]
            })),
        )
        .unwrap();
        assert_eq!(report.model, "served");
        assert_eq!(
            report.warnings,
            [SmokeWarning::Truncated, SmokeWarning::ReasoningMarkup]
        );
    }

    #[test]
    fn test_missing_content_is_fatal() {
        for body in [
            json!({"choices": []}),
            json!({"choices": [{"message": {"content": null}}]}),
            json!({"choices": [{"message": {"content": "  "}}]}),
        ] {
            let err = evaluate("m1", &response(body)).unwrap_err();
            assert!(matches!(err, ClientError::MissingContent));
        }
    }
}
