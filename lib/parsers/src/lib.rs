// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Parsing of reasoning-model output: `<think>` spans and `FINAL:` answers.

pub mod reasoning;

pub use reasoning::{FinalAnswer, ParserResult, ReasoningParser, extract_final_answer};
