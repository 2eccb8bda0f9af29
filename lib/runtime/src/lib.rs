// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Shared plumbing for the dynkube crates: layered configuration, logging,
//! external command execution and Ctrl-C cancellation.

pub mod config;
pub use config::{ChatConfig, DeployConfig};

pub mod logging;
pub mod utils;

pub use tokio_util::sync::CancellationToken;
