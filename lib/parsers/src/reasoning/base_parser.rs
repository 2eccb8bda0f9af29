// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use super::{ParserResult, ReasoningParser};

/// Start/end marker parser, e.g. `<think>` / `</think>`.
///
/// Every reasoning span is removed from the normal text. An unclosed span runs to
/// the end of the input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BasicReasoningParser {
    think_start_token: String,
    think_end_token: String,
    force_reasoning: bool,
}

impl BasicReasoningParser {
    /// With `force_reasoning` the text is assumed to start inside a reasoning span
    /// (the opening marker was part of the prompt).
    pub fn new(
        think_start_token: impl Into<String>,
        think_end_token: impl Into<String>,
        force_reasoning: bool,
    ) -> Self {
        Self {
            think_start_token: think_start_token.into(),
            think_end_token: think_end_token.into(),
            force_reasoning,
        }
    }

    pub fn think_start_token(&self) -> &str {
        &self.think_start_token
    }

    pub fn think_end_token(&self) -> &str {
        &self.think_end_token
    }
}

impl ReasoningParser for BasicReasoningParser {
    fn detect_and_parse_reasoning(&self, text: &str) -> ParserResult {
        let mut normal_text = String::new();
        let mut reasoning_text = String::new();

        let mut rest = text;
        let mut in_reasoning = false;
        if self.force_reasoning {
            rest = rest
                .trim_start()
                .strip_prefix(self.think_start_token.as_str())
                .unwrap_or(rest);
            in_reasoning = rest.contains(self.think_end_token.as_str());
        }

        loop {
            if in_reasoning {
                match rest.find(self.think_end_token.as_str()) {
                    Some(end) => {
                        reasoning_text.push_str(&rest[..end]);
                        rest = &rest[end + self.think_end_token.len()..];
                        in_reasoning = false;
                    }
                    None => {
                        tracing::trace!("Unclosed reasoning span, treating the rest as reasoning");
                        reasoning_text.push_str(rest);
                        break;
                    }
                }
            } else {
                match rest.find(self.think_start_token.as_str()) {
                    Some(start) => {
                        normal_text.push_str(&rest[..start]);
                        rest = &rest[start + self.think_start_token.len()..];
                        in_reasoning = true;
                    }
                    None => {
                        normal_text.push_str(rest);
                        break;
                    }
                }
            }
        }

        ParserResult {
            normal_text: normal_text.trim().to_string(),
            reasoning_text: reasoning_text.trim().to_string(),
        }
    }
}
