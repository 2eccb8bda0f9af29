// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::Instant;

use super::{ClusterInventory, DiscoveredResources, DiscoveryContext, Resolution, ResourceResolver};

/// Label the Dynamo operator sets on every object it creates for a graph.
pub const DYNAMO_NAMESPACE_LABEL: &str = "nvidia.com/dynamo-namespace";

pub const KNOWN_BACKENDS: &[&str] = &["vllm", "sglang", "trtllm"];
pub const KNOWN_MODES: &[&str] = &["agg", "agg-router", "disagg", "disagg-router"];

/// Objects owned by the platform install, never by a user manifest.
pub fn is_platform_internal(name: &str) -> bool {
    name.starts_with("dynamo-platform-")
        || name.contains("-operator-")
        || name.starts_with("etcd")
        || name.starts_with("nats")
}

pub fn matches_candidate(name: &str, candidates: &BTreeSet<String>) -> bool {
    candidates
        .iter()
        .any(|candidate| !candidate.is_empty() && name.starts_with(candidate.as_str()))
}

/// Split `<backend>-<mode>[-suffix]` into its group. The longest known mode
/// wins, so `vllm-agg-router-frontend` is `vllm`/`agg-router`.
pub fn backend_mode_group(name: &str) -> Option<(&'static str, &'static str)> {
    let (backend, rest) = KNOWN_BACKENDS.iter().find_map(|backend| {
        name.strip_prefix(backend)?
            .strip_prefix('-')
            .map(|rest| (*backend, rest))
    })?;
    KNOWN_MODES
        .iter()
        .filter(|mode| {
            rest.strip_prefix(**mode)
                .is_some_and(|tail| tail.is_empty() || tail.starts_with('-'))
        })
        .max_by_key(|mode| mode.len())
        .map(|mode| (backend, *mode))
}

/// Resolves the objects the operator created for a `DynamoGraphDeployment`
/// by its namespace label. The operator needs a moment to reconcile, so this
/// one polls until something shows up or the deadline passes.
pub struct DgdLabelResolver {
    inventory: Arc<dyn ClusterInventory>,
}

impl DgdLabelResolver {
    pub fn new(inventory: Arc<dyn ClusterInventory>) -> Self {
        Self { inventory }
    }
}

#[async_trait]
impl ResourceResolver for DgdLabelResolver {
    fn name(&self) -> &'static str {
        "dgd-label"
    }

    async fn resolve(&self, ctx: &DiscoveryContext) -> Result<Resolution> {
        let Some(graph) = ctx.graph.as_ref() else {
            return Ok(Resolution::NotFound);
        };
        let selector = format!(
            "{DYNAMO_NAMESPACE_LABEL}={}",
            graph.dynamo_namespace(&ctx.namespace)
        );
        let deadline = Instant::now() + ctx.timeout;
        tracing::info!(%selector, timeout = ?ctx.timeout, "waiting for the operator to create graph workloads");

        loop {
            let deployments = self
                .inventory
                .deployments(&ctx.namespace, Some(selector.as_str()))
                .await?;

            if !deployments.is_empty() {
                let mut services = self
                    .inventory
                    .services(&ctx.namespace, Some(selector.as_str()))
                    .await?;
                if services.is_empty() {
                    // older operators only label the workloads
                    services = self
                        .inventory
                        .services(&ctx.namespace, None)
                        .await?
                        .into_iter()
                        .filter(|svc| deployments.contains(svc))
                        .collect();
                }
                return Ok(Resolution::Found(DiscoveredResources {
                    strategy: self.name(),
                    deployments,
                    services,
                }));
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(%selector, "no workloads carry the graph label yet");
                return Ok(Resolution::NotFound);
            }

            tokio::select! {
                _ = ctx.cancel.cancelled() => {
                    tracing::debug!("graph label discovery cancelled");
                    return Ok(Resolution::NotFound);
                }
                _ = tokio::time::sleep(ctx.interval.min(deadline - now)) => {}
            }
        }
    }
}

/// Matches cluster objects against the names found in the manifest.
pub struct NamePrefixResolver {
    inventory: Arc<dyn ClusterInventory>,
}

impl NamePrefixResolver {
    pub fn new(inventory: Arc<dyn ClusterInventory>) -> Self {
        Self { inventory }
    }

    fn keep(names: Vec<String>, candidates: &BTreeSet<String>) -> Vec<String> {
        names
            .into_iter()
            .filter(|name| !is_platform_internal(name) && matches_candidate(name, candidates))
            .collect()
    }
}

#[async_trait]
impl ResourceResolver for NamePrefixResolver {
    fn name(&self) -> &'static str {
        "name-prefix"
    }

    async fn resolve(&self, ctx: &DiscoveryContext) -> Result<Resolution> {
        if ctx.candidates.is_empty() {
            return Ok(Resolution::NotFound);
        }
        let deployments = Self::keep(
            self.inventory.deployments(&ctx.namespace, None).await?,
            &ctx.candidates,
        );
        let services = Self::keep(
            self.inventory.services(&ctx.namespace, None).await?,
            &ctx.candidates,
        );
        if deployments.is_empty() && services.is_empty() {
            return Ok(Resolution::NotFound);
        }
        Ok(Resolution::Found(DiscoveredResources {
            strategy: self.name(),
            deployments,
            services,
        }))
    }
}

/// Falls back to the `<backend>-<mode>` naming used by the stock examples.
pub struct BackendModeResolver {
    inventory: Arc<dyn ClusterInventory>,
}

impl BackendModeResolver {
    pub fn new(inventory: Arc<dyn ClusterInventory>) -> Self {
        Self { inventory }
    }

    fn group_of(name: &str, ctx: &DiscoveryContext) -> Option<String> {
        let (backend, mode) = backend_mode_group(name)?;
        let backend_ok = ctx.backend.as_deref().is_none_or(|b| b == backend);
        let mode_ok = ctx.mode.as_deref().is_none_or(|m| m == mode);
        (backend_ok && mode_ok).then(|| format!("{backend}-{mode}"))
    }
}

#[async_trait]
impl ResourceResolver for BackendModeResolver {
    fn name(&self) -> &'static str {
        "backend-mode"
    }

    async fn resolve(&self, ctx: &DiscoveryContext) -> Result<Resolution> {
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for svc in self.inventory.services(&ctx.namespace, None).await? {
            if let Some(group) = Self::group_of(&svc, ctx) {
                groups.entry(group).or_default().push(svc);
            }
        }

        match groups.len() {
            0 => Ok(Resolution::NotFound),
            1 => {
                let Some((group, services)) = groups.into_iter().next() else {
                    return Ok(Resolution::NotFound);
                };
                let deployments = self
                    .inventory
                    .deployments(&ctx.namespace, None)
                    .await?
                    .into_iter()
                    .filter(|d| Self::group_of(d, ctx).as_deref() == Some(group.as_str()))
                    .collect();
                Ok(Resolution::Found(DiscoveredResources {
                    strategy: self.name(),
                    deployments,
                    services,
                }))
            }
            _ => {
                let mut names: Vec<String> = groups.into_values().flatten().collect();
                names.sort();
                Ok(Resolution::Ambiguous(names))
            }
        }
    }
}
