// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Mutex;

use async_trait::async_trait;
use dynkube_runtime::utils::{CommandOutput, CommandRunner, CommandSpec};

/// Records every command and exits 0, except for commands whose rendered
/// form contains one of the failure patterns, which exit 1.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    recorded: Mutex<Vec<String>>,
    fail_on: Vec<String>,
}

impl RecordingRunner {
    pub fn failing_on(pattern: &str) -> Self {
        Self::default().and_failing_on(pattern)
    }

    pub fn and_failing_on(mut self, pattern: &str) -> Self {
        self.fail_on.push(pattern.to_string());
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.recorded.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, cmd: &CommandSpec) -> anyhow::Result<CommandOutput> {
        let rendered = cmd.to_string();
        let fails = self.fail_on.iter().any(|p| rendered.contains(p.as_str()));
        self.recorded.lock().unwrap().push(rendered);
        Ok(CommandOutput {
            code: Some(if fails { 1 } else { 0 }),
            stderr: if fails { "simulated failure".into() } else { String::new() },
            ..Default::default()
        })
    }
}
