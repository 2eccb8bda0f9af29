// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Server-side apply of arbitrary manifest documents.

use std::collections::HashMap;

use kube::{
    Api, Client,
    api::{ApiResource, DynamicObject, Patch, PatchParams},
    core::GroupVersionKind,
    discovery::{self, ApiCapabilities, Scope},
};
use serde_yaml::Value;

use crate::error::{DeployError, Result};
use crate::manifest::Manifest;

/// One applied document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedObject {
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
}

impl std::fmt::Display for AppliedObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{} (namespace {ns})", self.kind, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// Split `apiVersion` into group and version. Core resources have no group.
pub fn parse_gvk(api_version: &str, kind: &str) -> GroupVersionKind {
    match api_version.split_once('/') {
        Some((group, version)) => GroupVersionKind::gvk(group, version, kind),
        None => GroupVersionKind::gvk("", api_version, kind),
    }
}

fn type_of(index: usize, doc: &Value) -> Result<GroupVersionKind> {
    let field = |name: &str| {
        doc.get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| DeployError::ManifestShape {
                index,
                reason: format!("missing '{name}'"),
            })
    };
    Ok(parse_gvk(field("apiVersion")?, field("kind")?))
}

/// Applies manifest documents with a fixed field manager, resolving each
/// kind against the API server once.
pub struct Applier {
    client: Client,
    field_manager: String,
    resolved: HashMap<GroupVersionKind, (ApiResource, ApiCapabilities)>,
}

impl Applier {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
            resolved: HashMap::new(),
        }
    }

    async fn resolve(&mut self, gvk: &GroupVersionKind) -> Result<(ApiResource, ApiCapabilities)> {
        if let Some(found) = self.resolved.get(gvk) {
            return Ok(found.clone());
        }
        let found = discovery::pinned_kind(&self.client, gvk).await?;
        self.resolved.insert(gvk.clone(), found.clone());
        Ok(found)
    }

    /// Apply every document. Namespaced documents without an explicit
    /// namespace land in `namespace`.
    pub async fn apply_manifest(
        &mut self,
        manifest: &Manifest,
        namespace: &str,
    ) -> Result<Vec<AppliedObject>> {
        let mut applied = Vec::with_capacity(manifest.documents().len());
        for (index, doc) in manifest.documents().iter().enumerate() {
            applied.push(self.apply_document(index, doc, namespace).await?);
        }
        Ok(applied)
    }

    pub async fn apply_document(
        &mut self,
        index: usize,
        doc: &Value,
        namespace: &str,
    ) -> Result<AppliedObject> {
        let gvk = type_of(index, doc)?;
        let (resource, caps) = self.resolve(&gvk).await?;

        let mut object: DynamicObject = serde_yaml::from_value(doc.clone())?;
        let name = object
            .metadata
            .name
            .clone()
            .ok_or_else(|| DeployError::ManifestShape {
                index,
                reason: "missing 'metadata.name'".to_string(),
            })?;

        let api: Api<DynamicObject> = match caps.scope {
            Scope::Namespaced => {
                let ns = object
                    .metadata
                    .namespace
                    .get_or_insert_with(|| namespace.to_string())
                    .clone();
                Api::namespaced_with(self.client.clone(), &ns, &resource)
            }
            Scope::Cluster => {
                object.metadata.namespace = None;
                Api::all_with(self.client.clone(), &resource)
            }
        };

        let params = PatchParams::apply(&self.field_manager).force();
        api.patch(&name, &params, &Patch::Apply(&object)).await?;

        let applied = AppliedObject {
            kind: gvk.kind.clone(),
            name,
            namespace: object.metadata.namespace.clone(),
        };
        tracing::info!(object = %applied, "applied");
        Ok(applied)
    }
}
