// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Multi-turn chat that shows only the model's final answer.

use std::io::ErrorKind;

use dynkube_parsers::reasoning::{
    FinalAnswer, REPAIR_INSTRUCTION, extract_final_answer, resolve_repaired,
};
use dynkube_runtime::CancellationToken;

use crate::client::{ClientError, OpenAiClient};
use crate::protocols::openai::ChatMessage;

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant. Think as needed, then put your \
answer on its own line starting with 'FINAL:'.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    /// What the user sees
    pub answer: String,
    /// Content of the first reply, as returned
    pub raw: String,
    /// A repair request was needed to get an answer
    pub repaired: bool,
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct ChatSession {
    client: OpenAiClient,
    model: String,
    messages: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(client: OpenAiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            messages: vec![ChatMessage::system(SYSTEM_PROMPT)],
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Send one user turn. The history keeps the extracted answer rather than
    /// the raw reply so reasoning never feeds back into later turns.
    pub async fn send(&mut self, prompt: &str) -> Result<ChatTurn, ClientError> {
        self.messages.push(ChatMessage::user(prompt));
        let result = self.exchange().await;
        if result.is_err() {
            self.messages.pop();
        }
        let turn = result?;
        self.messages.push(ChatMessage::assistant(turn.answer.clone()));
        Ok(turn)
    }

    async fn exchange(&self) -> Result<ChatTurn, ClientError> {
        let response = self
            .client
            .complete(&self.model, self.messages.clone())
            .await?;
        let raw = response.content().unwrap_or_default().to_string();
        let truncated = response.is_truncated();

        match extract_final_answer(&raw) {
            FinalAnswer::Marker(answer) | FinalAnswer::AfterThink(answer) => Ok(ChatTurn {
                answer,
                raw,
                repaired: false,
                truncated,
            }),
            FinalAnswer::NeedsRepair => {
                tracing::debug!("no final answer found, asking the model to restate it");
                let mut repair = self.messages.clone();
                repair.push(ChatMessage::assistant(raw.clone()));
                repair.push(ChatMessage::user(REPAIR_INSTRUCTION));
                let response = self.client.complete(&self.model, repair).await?;
                let content = response.content().ok_or(ClientError::MissingContent)?;
                let answer = resolve_repaired(content);
                if answer.is_empty() {
                    return Err(ClientError::MissingContent);
                }
                Ok(ChatTurn {
                    answer,
                    raw,
                    repaired: true,
                    truncated: truncated || response.is_truncated(),
                })
            }
        }
    }
}

/// Read prompts from the terminal until Ctrl-C, Ctrl-D or cancellation.
/// `raw` also prints the unfiltered reply.
pub async fn run_interactive(
    mut session: ChatSession,
    raw: bool,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    tracing::info!(model = session.model(), "Ctrl-c to exit");
    let theme = dialoguer::theme::ColorfulTheme::default();
    let mut history = dialoguer::BasicHistory::default();

    while !cancel.is_cancelled() {
        let input_ui = dialoguer::Input::<String>::with_theme(&theme)
            .history_with(&mut history)
            .with_prompt("User");
        let prompt = match input_ui.interact_text() {
            Ok(prompt) => prompt,
            Err(dialoguer::Error::IO(err)) => {
                if err.kind() != ErrorKind::Interrupted {
                    tracing::info!("IO error: {}", err.kind());
                }
                break;
            }
        };
        if prompt.trim().is_empty() {
            continue;
        }

        let turn = tokio::select! {
            _ = cancel.cancelled() => break,
            turn = session.send(&prompt) => turn,
        };
        match turn {
            Ok(turn) => {
                if raw {
                    println!("--- raw ---\n{}\n-----------", turn.raw);
                }
                println!("{}", turn.answer);
                if turn.truncated {
                    tracing::warn!("reply was truncated; raise max_tokens");
                }
            }
            Err(err) => tracing::error!(%err, "Request failed."),
        }
    }
    println!();
    Ok(())
}
