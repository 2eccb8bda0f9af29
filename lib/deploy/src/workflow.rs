// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! End-to-end `deploy`: patch, apply, discover, expose, wait.

use std::path::PathBuf;
use std::sync::Arc;

use dynkube_runtime::{CancellationToken, DeployConfig};
use regex::Regex;
use serde_yaml::Value;

use crate::apply::{AppliedObject, Applier};
use crate::cluster;
use crate::discovery::{DiscoveryContext, KubeInventory, Resolution, ResolverChain};
use crate::error::{DeployError, Result};
use crate::manifest::{ImageOverride, Manifest, NamePrefix, PatchReport, PatchRules, patch_manifest};
use crate::nodeport::{self, ExposedService, NodePort};
use crate::readiness::{ReadinessWaiter, WaitOutcome};
use crate::secrets::{self, WorkloadKind};

#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    pub manifest: PathBuf,
    pub namespace: Option<String>,
    pub model: Option<String>,
    /// Full image reference or bare tag for runtime containers
    pub image: Option<String>,
    pub name_prefix: Option<String>,
    pub hf_token: Option<String>,
    pub nodeport: Option<i64>,
    pub wait: bool,
    pub backend: Option<String>,
    pub mode: Option<String>,
    /// Keep the patched manifest instead of deleting it on exit
    pub keep_manifest: bool,
}

/// Options after validation; nothing here can fail any more.
#[derive(Debug, Clone)]
pub struct DeployPlan {
    pub namespace: String,
    pub rules: PatchRules,
    pub nodeport: Option<NodePort>,
}

/// Check every user input before the cluster is touched.
pub fn plan(config: &DeployConfig, opts: &DeployOptions) -> Result<DeployPlan> {
    let nodeport = opts.nodeport.map(NodePort::new).transpose()?;
    let name_prefix = opts
        .name_prefix
        .as_deref()
        .filter(|p| !p.is_empty())
        .map(NamePrefix::new)
        .transpose()?;
    let image = opts
        .image
        .as_deref()
        .or(config.runtime_image.as_deref())
        .and_then(ImageOverride::parse);
    if !opts.manifest.is_file() {
        return Err(DeployError::ManifestIo {
            path: opts.manifest.clone(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        });
    }
    Ok(DeployPlan {
        namespace: opts
            .namespace
            .clone()
            .unwrap_or_else(|| config.namespace.clone()),
        rules: PatchRules {
            model: opts.model.clone(),
            image,
            name_prefix,
        },
        nodeport,
    })
}

#[derive(Debug, Clone)]
pub struct DeployReport {
    pub namespace: String,
    pub patch: PatchReport,
    pub applied: Vec<AppliedObject>,
    pub resolution: Resolution,
    pub exposed: Vec<ExposedService>,
    pub waits: Vec<(String, WaitOutcome)>,
    pub kept_manifest: Option<PathBuf>,
    pub hints: Vec<String>,
}

/// Names of documents of `kind` in the manifest.
fn names_of_kind(manifest: &Manifest, kind: &str) -> Vec<String> {
    manifest
        .documents()
        .iter()
        .filter(|doc| doc.get("kind").and_then(Value::as_str) == Some(kind))
        .filter_map(|doc| doc.get("metadata")?.get("name")?.as_str().map(str::to_string))
        .collect()
}

/// How to reach what was deployed.
pub fn access_hints(namespace: &str, exposed: &[ExposedService]) -> Vec<String> {
    let names: Vec<String> = exposed.iter().map(|svc| svc.name.clone()).collect();
    let Some(primary) = nodeport::primary_service(&names) else {
        return cluster::remediation_hints(namespace);
    };
    let mut hints = Vec::new();
    if let Some(port) = exposed
        .iter()
        .find(|svc| svc.name == primary)
        .and_then(|svc| svc.node_ports.first())
    {
        hints.push(format!("curl http://<node-ip>:{port}/v1/models"));
        hints.push(format!(
            "dynkube smoke-test --base-url http://<node-ip>:{port}"
        ));
    }
    hints.push(format!(
        "kubectl port-forward svc/{primary} 8000:8000 -n {namespace}"
    ));
    hints
}

pub async fn deploy(
    config: &DeployConfig,
    opts: &DeployOptions,
    cancel: CancellationToken,
) -> Result<DeployReport> {
    let plan = plan(config, opts)?;
    let namespace = plan.namespace.as_str();
    let client = cluster::connect().await?;

    secrets::ensure_namespace(&client, namespace, &config.field_manager).await?;
    let secret_name = config.hf_secret_name.as_str();
    let hf_token = opts.hf_token.as_deref().filter(|t| !t.is_empty());
    if let Some(token) = hf_token {
        secrets::ensure_hf_token_secret(&client, namespace, secret_name, token, &config.field_manager)
            .await?;
    }

    let patched = patch_manifest(&opts.manifest, &plan.rules, hf_token.map(|_| secret_name))?;
    let manifest = patched.manifest().clone();
    let patch = patched.report().clone();
    let kept_manifest = if opts.keep_manifest {
        let path = patched.persist()?;
        tracing::info!(path = %path.display(), "kept patched manifest");
        Some(path)
    } else {
        drop(patched);
        None
    };

    let applied = Applier::new(client.clone(), config.field_manager.clone())
        .apply_manifest(&manifest, namespace)
        .await?;

    let graph = manifest.graph();
    if let (Some(graph), Some(_)) = (&graph, hf_token) {
        secrets::wire_dgd_env_from_secret(&client, namespace, graph, secret_name).await;
    }

    let mut ctx = DiscoveryContext::new(namespace, cancel.clone());
    ctx.graph = graph.clone();
    ctx.candidates = manifest.candidate_names();
    ctx.backend = opts.backend.clone();
    ctx.mode = opts.mode.clone();
    ctx.timeout = config.discovery_timeout();
    ctx.interval = config.discovery_interval();

    let chain = ResolverChain::standard(Arc::new(KubeInventory::new(client.clone())));
    let resolution = chain.resolve(&ctx).await?;

    let mut report = DeployReport {
        namespace: namespace.to_string(),
        patch,
        applied,
        resolution: resolution.clone(),
        exposed: Vec::new(),
        waits: Vec::new(),
        kept_manifest,
        hints: Vec::new(),
    };

    let found = match resolution {
        Resolution::Found(found) => found,
        Resolution::Ambiguous(names) => {
            tracing::warn!(?names, "more than one deployment group matched; pass --backend and --mode to pick one");
            report.hints = cluster::remediation_hints(namespace);
            return Ok(report);
        }
        Resolution::NotFound => {
            tracing::warn!(namespace, "could not find the workloads created by this manifest");
            report.hints = cluster::remediation_hints(namespace);
            return Ok(report);
        }
    };
    tracing::info!(%found, "discovered workloads");

    // graph services get the token through envFromSecret instead
    if let (None, Some(_)) = (&graph, hf_token) {
        for name in &found.deployments {
            secrets::patch_workload_env(&client, WorkloadKind::Deployment, namespace, name, secret_name)
                .await?;
        }
        for name in names_of_kind(&manifest, "StatefulSet") {
            secrets::patch_workload_env(&client, WorkloadKind::StatefulSet, namespace, &name, secret_name)
                .await?;
        }
    }

    report.exposed = nodeport::expose_services(&client, namespace, &found.services, plan.nodeport).await?;
    report.hints = access_hints(namespace, &report.exposed);

    if !opts.wait {
        return Ok(report);
    }

    let waiter = ReadinessWaiter::new(client.clone(), cancel);
    for deployment in &found.deployments {
        let pattern = Regex::new(&format!("^{}-", regex::escape(deployment)))
            .map_err(anyhow::Error::from)?;
        let outcome = waiter
            .wait_pod_ready(namespace, &pattern, config.pod_ready_timeout())
            .await?;
        report.waits.push((format!("pod/{deployment}"), outcome));
        if outcome == WaitOutcome::Cancelled {
            return Ok(report);
        }
    }
    let names: Vec<String> = report.exposed.iter().map(|svc| svc.name.clone()).collect();
    if let Some(primary) = nodeport::primary_service(&names) {
        let outcome = waiter
            .wait_endpoints(namespace, primary, config.endpoints_timeout())
            .await?;
        report.waits.push((format!("endpoints/{primary}"), outcome));
    }
    Ok(report)
}
