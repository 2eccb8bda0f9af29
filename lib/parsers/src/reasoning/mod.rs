// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

mod base_parser;
mod final_answer;

pub use base_parser::BasicReasoningParser;
pub use final_answer::{
    FINAL_MARKER, FinalAnswer, REPAIR_INSTRUCTION, contains_reasoning_markup,
    extract_final_answer, resolve_repaired, strip_think_spans,
};

pub const THINK_START: &str = "<think>";
pub const THINK_END: &str = "</think>";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParserResult {
    /// The normal text outside of reasoning blocks.
    pub normal_text: String,

    /// The extracted reasoning text from within reasoning blocks.
    pub reasoning_text: String,
}

impl ParserResult {
    pub fn get_some_reasoning(&self) -> Option<String> {
        if self.reasoning_text.is_empty() {
            None
        } else {
            Some(self.reasoning_text.clone())
        }
    }

    pub fn get_some_normal_text(&self) -> Option<String> {
        if self.normal_text.is_empty() {
            None
        } else {
            Some(self.normal_text.clone())
        }
    }
}

pub trait ReasoningParser: Send + std::fmt::Debug {
    /// Split a complete model response into normal and reasoning text.
    /// Marker tokens must not be included in either output.
    fn detect_and_parse_reasoning(&self, text: &str) -> ParserResult;
}

/// `<think>...</think>` parser used for chat replies.
pub fn think_parser() -> BasicReasoningParser {
    BasicReasoningParser::new(THINK_START, THINK_END, false)
}
