// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Client side of a deployed frontend: an OpenAI-compatible HTTP client, a
//! smoke test, an interactive chat and a concurrent multi-conversation driver.

pub mod chat;
pub mod client;
pub mod conversations;
pub mod protocols;
pub mod smoke;

pub use chat::{ChatSession, ChatTurn};
pub use client::{ClientError, OpenAiClient};
pub use conversations::{ConversationOptions, MultiChatReport, Transcript, run_conversations};
pub use smoke::{SmokeOptions, SmokeReport, SmokeWarning, run_smoke_test};
