// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Install the Dynamo CRDs and platform charts with Helm.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use dynkube_runtime::DeployConfig;
use dynkube_runtime::utils::{CommandRunner, CommandSpec, find_in_path};

use crate::error::{DeployError, Result};
use crate::readiness::{ReadinessWaiter, WaitOutcome};

pub const CRDS_CHART: &str = "dynamo-crds";
pub const PLATFORM_CHART: &str = "dynamo-platform";
pub const CRDS_NAMESPACE: &str = "default";

/// Resolve `program` on PATH or fail with [`DeployError::MissingCommand`].
pub fn require_command(program: &str) -> Result<PathBuf> {
    find_in_path(program).ok_or_else(|| DeployError::MissingCommand(program.to_string()))
}

#[derive(Debug, Clone)]
pub struct PlatformOptions {
    pub namespace: String,
    pub release_version: String,
    pub chart_repository: String,
    /// Extra `--set key=value` overrides for the platform chart.
    pub set_values: Vec<String>,
    pub wait: bool,
    pub ready_timeout: Duration,
}

impl PlatformOptions {
    pub fn from_config(config: &DeployConfig) -> Self {
        Self {
            namespace: config.namespace.clone(),
            release_version: config.release_version.clone(),
            chart_repository: config.chart_repository.clone(),
            set_values: Vec::new(),
            wait: true,
            ready_timeout: config.platform_ready_timeout(),
        }
    }

    fn validate(&self) -> Result<()> {
        if let Some(bad) = self.set_values.iter().find(|kv| !kv.contains('=')) {
            return Err(anyhow::anyhow!("--set expects key=value, got '{bad}'").into());
        }
        Ok(())
    }
}

pub fn chart_archive(chart: &str, version: &str) -> String {
    format!("{chart}-{version}.tgz")
}

pub fn chart_url(repository: &str, chart: &str, version: &str) -> String {
    format!(
        "{}/{}",
        repository.trim_end_matches('/'),
        chart_archive(chart, version)
    )
}

/// The helm invocations, in order, with archives fetched into `workdir`.
pub fn install_commands(opts: &PlatformOptions, workdir: &Path) -> Vec<CommandSpec> {
    let version = &opts.release_version;
    let fetch = |chart: &str| {
        CommandSpec::new("helm")
            .arg("fetch")
            .arg(chart_url(&opts.chart_repository, chart, version))
            .arg("--destination")
            .arg(workdir.display().to_string())
    };
    let archive = |chart: &str| workdir.join(chart_archive(chart, version)).display().to_string();

    let crds = CommandSpec::new("helm").args([
        "upgrade".to_string(),
        "--install".to_string(),
        CRDS_CHART.to_string(),
        archive(CRDS_CHART),
        "--namespace".to_string(),
        CRDS_NAMESPACE.to_string(),
        "--wait".to_string(),
        "--atomic".to_string(),
    ]);

    let mut platform = CommandSpec::new("helm").args([
        "upgrade".to_string(),
        "--install".to_string(),
        PLATFORM_CHART.to_string(),
        archive(PLATFORM_CHART),
        "--namespace".to_string(),
        opts.namespace.clone(),
        "--create-namespace".to_string(),
    ]);
    for kv in &opts.set_values {
        platform = platform.arg("--set").arg(kv.clone());
    }

    vec![fetch(CRDS_CHART), fetch(PLATFORM_CHART), crds, platform]
}

/// Names of the platform's stateful components and operator for a release.
pub fn platform_components(release: &str) -> (Vec<String>, String) {
    (
        vec![format!("{release}-etcd"), format!("{release}-nats")],
        format!("{release}-dynamo-operator-controller-manager"),
    )
}

#[derive(Debug, Clone, Default)]
pub struct PlatformReport {
    pub commands: Vec<String>,
    pub waits: Vec<(String, WaitOutcome)>,
}

impl PlatformReport {
    pub fn all_ready(&self) -> bool {
        self.waits.iter().all(|(_, outcome)| outcome.is_ready())
    }
}

/// Run the helm steps, then wait for etcd, NATS and the operator when a
/// waiter is given and `opts.wait` is set.
pub async fn install_platform(
    runner: &dyn CommandRunner,
    waiter: Option<&ReadinessWaiter>,
    opts: &PlatformOptions,
) -> Result<PlatformReport> {
    opts.validate()?;
    let workdir = tempfile::Builder::new()
        .prefix("dynkube-charts-")
        .tempdir()
        .context("failed to create chart download directory")?;

    let mut report = PlatformReport::default();
    for cmd in install_commands(opts, workdir.path()) {
        tracing::info!(command = %cmd, "running");
        runner
            .run_checked(&cmd)
            .await
            .with_context(|| format!("platform install step failed: {cmd}"))?;
        report.commands.push(cmd.to_string());
    }

    let Some(waiter) = waiter.filter(|_| opts.wait) else {
        return Ok(report);
    };

    let (statefulsets, operator) = platform_components(PLATFORM_CHART);
    for sts in statefulsets {
        let outcome = waiter
            .wait_statefulset_ready(&opts.namespace, &sts, opts.ready_timeout)
            .await?;
        report.waits.push((sts, outcome));
        if outcome == WaitOutcome::Cancelled {
            return Ok(report);
        }
    }
    let outcome = waiter
        .wait_deployment_available(&opts.namespace, &operator, opts.ready_timeout)
        .await?;
    report.waits.push((operator, outcome));
    Ok(report)
}
