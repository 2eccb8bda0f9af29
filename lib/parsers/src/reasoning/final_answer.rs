// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Pull the user-facing answer out of a reasoning model's reply.
//!
//! Precedence, first match wins:
//! 1. text after the first line starting with `FINAL:` outside `<think>` spans
//! 2. text after the last `</think>`
//! 3. nothing usable; the caller asks the model to restate its answer and runs
//!    the reply through [`resolve_repaired`].
//!
//! This is a heuristic over free text. Nested or unbalanced markers are handled
//! best-effort and not rejected.

use std::sync::OnceLock;

use regex::Regex;

use super::{ReasoningParser, THINK_END, THINK_START, think_parser};

pub const FINAL_MARKER: &str = "FINAL:";

/// Sent as a follow-up user turn when no answer could be extracted.
pub const REPAIR_INSTRUCTION: &str = "Rewrite your previous reply as the final answer only. \
Do not include any reasoning, analysis or <think> tags.";

fn final_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // safety: constant pattern
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*FINAL:[ \t]*").unwrap())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalAnswer {
    /// Found after a `FINAL:` marker line
    Marker(String),
    /// Found after the last `</think>`
    AfterThink(String),
    /// Neither marker produced text
    NeedsRepair,
}

impl FinalAnswer {
    pub fn text(&self) -> Option<&str> {
        match self {
            FinalAnswer::Marker(s) | FinalAnswer::AfterThink(s) => Some(s),
            FinalAnswer::NeedsRepair => None,
        }
    }
}

pub fn extract_final_answer(content: &str) -> FinalAnswer {
    let visible = strip_think_spans(content);
    if let Some(m) = final_marker_re().find(&visible) {
        let answer = visible[m.end()..].trim();
        if !answer.is_empty() {
            return FinalAnswer::Marker(answer.to_string());
        }
    }

    if let Some(idx) = content.rfind(THINK_END) {
        let answer = content[idx + THINK_END.len()..].trim();
        if !answer.is_empty() {
            return FinalAnswer::AfterThink(answer.to_string());
        }
    }

    FinalAnswer::NeedsRepair
}

/// Remove every `<think>...</think>` span (an unclosed one runs to the end), then
/// drop anything before a stray closing tag.
pub fn strip_think_spans(content: &str) -> String {
    let normal = think_parser().detect_and_parse_reasoning(content).normal_text;
    match normal.rfind(THINK_END) {
        Some(idx) => normal[idx + THINK_END.len()..].trim().to_string(),
        None => normal,
    }
}

/// Clean up the reply to [`REPAIR_INSTRUCTION`]. Models sometimes answer with a
/// `FINAL:` line anyway, so that marker is honored too.
pub fn resolve_repaired(reply: &str) -> String {
    let stripped = strip_think_spans(reply);
    match final_marker_re().find(&stripped) {
        Some(m) if !stripped[m.end()..].trim().is_empty() => {
            stripped[m.end()..].trim().to_string()
        }
        _ => stripped,
    }
}

pub fn contains_reasoning_markup(content: &str) -> bool {
    content.contains(THINK_START) || content.contains(THINK_END)
}
