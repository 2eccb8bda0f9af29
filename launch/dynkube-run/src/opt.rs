// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::str::FromStr;

/// Inference backend a manifest deploys, used to pick one deployment group
/// when several match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Vllm,
    Sglang,
    Trtllm,
}

impl TryFrom<&str> for Backend {
    type Error = anyhow::Error;

    fn try_from(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "vllm" => Ok(Backend::Vllm),
            "sglang" => Ok(Backend::Sglang),
            "trtllm" | "tensorrt-llm" => Ok(Backend::Trtllm),
            e => Err(anyhow::anyhow!(
                "Invalid backend '{e}', expected one of vllm, sglang, trtllm"
            )),
        }
    }
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Backend::try_from(s)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Backend::Vllm => "vllm",
            Backend::Sglang => "sglang",
            Backend::Trtllm => "trtllm",
        };
        write!(f, "{s}")
    }
}

/// Serving topology, the suffix after the backend in a deployment name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Agg,
    AggRouter,
    Disagg,
    DisaggRouter,
}

impl TryFrom<&str> for Mode {
    type Error = anyhow::Error;

    fn try_from(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "agg" => Ok(Mode::Agg),
            "agg-router" => Ok(Mode::AggRouter),
            "disagg" => Ok(Mode::Disagg),
            "disagg-router" => Ok(Mode::DisaggRouter),
            e => Err(anyhow::anyhow!(
                "Invalid mode '{e}', expected one of agg, agg-router, disagg, disagg-router"
            )),
        }
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Mode::try_from(s)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Mode::Agg => "agg",
            Mode::AggRouter => "agg-router",
            Mode::Disagg => "disagg",
            Mode::DisaggRouter => "disagg-router",
        };
        write!(f, "{s}")
    }
}
