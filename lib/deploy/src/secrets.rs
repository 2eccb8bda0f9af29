// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Namespace and Hugging Face token plumbing.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::Result;
use k8s_openapi::api::{
    apps::v1::{Deployment, StatefulSet},
    core::v1::{Namespace, PodTemplateSpec, Secret},
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{
    Api, Client,
    api::{Patch, PatchParams},
};
use serde_json::json;

use crate::crd::DynamoGraphDeployment;
use crate::manifest::GraphInfo;

/// Keys written to the token secret; different runtimes read different ones.
pub const HF_TOKEN_KEYS: &[&str] = &["HF_TOKEN", "HUGGING_FACE_HUB_TOKEN", "token"];

/// Env vars injected into plain workloads, each read from the same-named key.
pub const HF_TOKEN_ENV: &[&str] = &["HF_TOKEN", "HUGGING_FACE_HUB_TOKEN"];

pub fn namespace_object(name: &str) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn hf_token_secret(namespace: &str, name: &str, token: &str) -> Secret {
    let string_data: BTreeMap<String, String> = HF_TOKEN_KEYS
        .iter()
        .map(|key| (key.to_string(), token.to_string()))
        .collect();
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        string_data: Some(string_data),
        ..Default::default()
    }
}

pub async fn ensure_namespace(client: &Client, namespace: &str, field_manager: &str) -> Result<()> {
    let api: Api<Namespace> = Api::all(client.clone());
    let params = PatchParams::apply(field_manager).force();
    api.patch(namespace, &params, &Patch::Apply(&namespace_object(namespace)))
        .await?;
    tracing::info!(namespace, "namespace ready");
    Ok(())
}

pub async fn ensure_hf_token_secret(
    client: &Client,
    namespace: &str,
    name: &str,
    token: &str,
    field_manager: &str,
) -> Result<()> {
    let api: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let params = PatchParams::apply(field_manager).force();
    api.patch(
        name,
        &params,
        &Patch::Apply(&hf_token_secret(namespace, name, token)),
    )
    .await?;
    tracing::info!(namespace, secret = name, "HF token secret applied");
    Ok(())
}

/// Merge patch pointing `services` at `secret`.
pub fn dgd_env_patch(services: &[&str], secret: &str) -> serde_json::Value {
    let services: serde_json::Map<String, serde_json::Value> = services
        .iter()
        .map(|svc| (svc.to_string(), json!({ "envFromSecret": secret })))
        .collect();
    json!({ "spec": { "services": services } })
}

/// Set `envFromSecret` on the services of `graph` that take it. Returns the
/// services that were patched; failures are logged, not returned.
pub async fn wire_dgd_env_from_secret(
    client: &Client,
    namespace: &str,
    graph: &GraphInfo,
    secret: &str,
) -> Vec<String> {
    let present = graph.secret_services();
    if present.is_empty() {
        return Vec::new();
    }

    let api: Api<DynamoGraphDeployment> = Api::namespaced(client.clone(), namespace);
    let patch = dgd_env_patch(&present, secret);
    let dgd = graph.name.as_str();
    match api
        .patch(dgd, &PatchParams::default(), &Patch::Merge(&patch))
        .await
    {
        Ok(_) => {
            tracing::info!(dgd, services = ?present, secret, "wired envFromSecret");
            present.into_iter().map(str::to_string).collect()
        }
        Err(err) => {
            tracing::warn!(namespace, dgd, error = %err, "envFromSecret patch failed");
            Vec::new()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deployment => f.write_str("Deployment"),
            Self::StatefulSet => f.write_str("StatefulSet"),
        }
    }
}

fn container_names(template: &PodTemplateSpec) -> Vec<String> {
    template
        .spec
        .as_ref()
        .map(|spec| spec.containers.iter().map(|c| c.name.clone()).collect())
        .unwrap_or_default()
}

/// Strategic merge patch adding the token env vars to every container.
/// Containers and env entries merge by name, so re-applying is a no-op.
pub fn workload_env_patch(containers: &[String], secret: &str) -> serde_json::Value {
    let env: Vec<serde_json::Value> = HF_TOKEN_ENV
        .iter()
        .map(|var| {
            json!({
                "name": var,
                "valueFrom": { "secretKeyRef": { "name": secret, "key": var } }
            })
        })
        .collect();
    let containers: Vec<serde_json::Value> = containers
        .iter()
        .map(|name| json!({ "name": name, "env": env }))
        .collect();
    json!({ "spec": { "template": { "spec": { "containers": containers } } } })
}

/// Inject the token env into a Deployment or StatefulSet. Returns false if
/// the workload does not exist.
pub async fn patch_workload_env(
    client: &Client,
    kind: WorkloadKind,
    namespace: &str,
    name: &str,
    secret: &str,
) -> Result<bool> {
    let params = PatchParams::default();
    let patched = match kind {
        WorkloadKind::Deployment => {
            let api: Api<Deployment> = Api::namespaced(client.clone(), namespace);
            let Some(current) = api.get_opt(name).await? else {
                return Ok(false);
            };
            let containers = current
                .spec
                .as_ref()
                .map(|spec| container_names(&spec.template))
                .unwrap_or_default();
            let patch = workload_env_patch(&containers, secret);
            api.patch(name, &params, &Patch::Strategic(&patch)).await?;
            containers.len()
        }
        WorkloadKind::StatefulSet => {
            let api: Api<StatefulSet> = Api::namespaced(client.clone(), namespace);
            let Some(current) = api.get_opt(name).await? else {
                return Ok(false);
            };
            let containers = current
                .spec
                .as_ref()
                .map(|spec| container_names(&spec.template))
                .unwrap_or_default();
            let patch = workload_env_patch(&containers, secret);
            api.patch(name, &params, &Patch::Strategic(&patch)).await?;
            containers.len()
        }
    };
    tracing::info!(%kind, name, containers = patched, "injected HF token env");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_carries_all_keys() {
        let secret = hf_token_secret("dynamo-system", "hf-token-secret", "hf_abc");
        let data = secret.string_data.unwrap();
        assert_eq!(data.len(), 3);
        assert!(HF_TOKEN_KEYS.iter().all(|k| data[*k] == "hf_abc"));
        assert_eq!(secret.metadata.namespace.as_deref(), Some("dynamo-system"));

        let json = serde_json::to_value(hf_token_secret("ns", "s", "t")).unwrap();
        assert_eq!(json["apiVersion"], "v1");
        assert_eq!(json["kind"], "Secret");
    }

    #[test]
    fn test_dgd_env_patch() {
        let patch = dgd_env_patch(&["Frontend", "VllmDecodeWorker"], "hf-token-secret");
        assert_eq!(
            patch,
            json!({
                "spec": { "services": {
                    "Frontend": { "envFromSecret": "hf-token-secret" },
                    "VllmDecodeWorker": { "envFromSecret": "hf-token-secret" }
                }}
            })
        );
    }

    #[test]
    fn test_workload_env_patch() {
        let patch = workload_env_patch(&["main".to_string(), "sidecar".to_string()], "hf");
        let containers = patch["spec"]["template"]["spec"]["containers"]
            .as_array()
            .unwrap();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[1]["name"], "sidecar");
        assert_eq!(containers[0]["env"][1]["name"], "HUGGING_FACE_HUB_TOKEN");
        assert_eq!(
            containers[0]["env"][0]["valueFrom"]["secretKeyRef"],
            json!({ "name": "hf", "key": "HF_TOKEN" })
        );
    }
}
