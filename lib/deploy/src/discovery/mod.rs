// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Find the Deployments and Services that an applied manifest produced.
//!
//! Resolvers are tried in priority order by a [`ResolverChain`]. Each one
//! answers with a [`Resolution`]; the first answer that is not
//! [`Resolution::NotFound`] wins. Nothing here is fatal: an empty or
//! ambiguous result is reported to the user along with hints.

mod inventory;
mod resolvers;

pub use inventory::{ClusterInventory, KubeInventory, StaticInventory, StaticObject};
pub use resolvers::{
    BackendModeResolver, DYNAMO_NAMESPACE_LABEL, DgdLabelResolver, KNOWN_BACKENDS, KNOWN_MODES,
    NamePrefixResolver, backend_mode_group, is_platform_internal, matches_candidate,
};

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use dynkube_runtime::CancellationToken;

use crate::manifest::GraphInfo;

/// Everything a resolver may look at.
#[derive(Debug, Clone)]
pub struct DiscoveryContext {
    pub namespace: String,
    pub graph: Option<GraphInfo>,
    pub candidates: BTreeSet<String>,
    pub backend: Option<String>,
    pub mode: Option<String>,
    pub timeout: Duration,
    pub interval: Duration,
    pub cancel: CancellationToken,
}

impl DiscoveryContext {
    pub fn new(namespace: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            namespace: namespace.into(),
            graph: None,
            candidates: BTreeSet::new(),
            backend: None,
            mode: None,
            timeout: Duration::from_secs(180),
            interval: Duration::from_secs(3),
            cancel,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredResources {
    pub strategy: &'static str,
    pub deployments: Vec<String>,
    pub services: Vec<String>,
}

impl DiscoveredResources {
    pub fn is_empty(&self) -> bool {
        self.deployments.is_empty() && self.services.is_empty()
    }
}

impl fmt::Display for DiscoveredResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "deployments=[{}] services=[{}] (via {})",
            self.deployments.join(", "),
            self.services.join(", "),
            self.strategy
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(DiscoveredResources),
    NotFound,
    /// Names that matched but belong to more than one candidate group.
    Ambiguous(Vec<String>),
}

#[async_trait]
pub trait ResourceResolver: Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve(&self, ctx: &DiscoveryContext) -> Result<Resolution>;
}

/// Resolvers in priority order.
pub struct ResolverChain {
    resolvers: Vec<Box<dyn ResourceResolver>>,
}

impl ResolverChain {
    pub fn new(resolvers: Vec<Box<dyn ResourceResolver>>) -> Self {
        Self { resolvers }
    }

    /// Graph label, then manifest names, then `<backend>-<mode>` naming.
    pub fn standard(inventory: Arc<dyn ClusterInventory>) -> Self {
        Self::new(vec![
            Box::new(DgdLabelResolver::new(inventory.clone())),
            Box::new(NamePrefixResolver::new(inventory.clone())),
            Box::new(BackendModeResolver::new(inventory)),
        ])
    }

    pub async fn resolve(&self, ctx: &DiscoveryContext) -> Result<Resolution> {
        for resolver in &self.resolvers {
            if ctx.cancel.is_cancelled() {
                break;
            }
            let resolution = resolver.resolve(ctx).await?;
            tracing::debug!(resolver = resolver.name(), ?resolution, "resolver finished");
            if resolution != Resolution::NotFound {
                return Ok(resolution);
            }
        }
        Ok(Resolution::NotFound)
    }
}
