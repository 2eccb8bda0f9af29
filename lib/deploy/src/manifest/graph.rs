// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use serde_yaml::{Mapping, Value};

use super::prefix::document_name;

pub const DGD_KIND: &str = "DynamoGraphDeployment";

/// Graph services that accept an `envFromSecret` reference.
pub const ENV_SECRET_SERVICES: &[&str] = &[
    "Frontend",
    "VllmDecodeWorker",
    "SglangDecodeWorker",
    "TrtllmDecodeWorker",
];

/// What the deploy workflow needs to know about a `DynamoGraphDeployment`
/// document before it is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphInfo {
    pub name: String,
    pub namespace: Option<String>,
    pub services: Vec<String>,
}

impl GraphInfo {
    pub fn from_document(doc: &Value) -> Option<Self> {
        if doc.get("kind").and_then(Value::as_str) != Some(DGD_KIND) {
            return None;
        }
        let name = document_name(doc)?.to_string();
        let namespace = doc
            .get("metadata")
            .and_then(|meta| meta.get("namespace"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let services = services(doc)
            .map(|services| {
                services
                    .keys()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Some(Self {
            name,
            namespace,
            services,
        })
    }

    /// Value of the `nvidia.com/dynamo-namespace` label the operator puts on
    /// everything it creates for this graph.
    pub fn dynamo_namespace(&self, k8s_namespace: &str) -> String {
        format!("{k8s_namespace}-{}", self.name)
    }

    /// Services present in the graph that take `envFromSecret`.
    pub fn secret_services(&self) -> Vec<&str> {
        ENV_SECRET_SERVICES
            .iter()
            .copied()
            .filter(|svc| self.services.iter().any(|s| s == svc))
            .collect()
    }
}

fn services(doc: &Value) -> Option<&Mapping> {
    doc.get("spec")?.get("services")?.as_mapping()
}

/// Point the known graph services at `secret` via `envFromSecret`.
pub(crate) fn inject_env_from_secret(doc: &mut Value, secret: &str) -> usize {
    let Some(services) = doc
        .get_mut("spec")
        .and_then(|spec| spec.get_mut("services"))
        .and_then(Value::as_mapping_mut)
    else {
        return 0;
    };

    let mut injected = 0;
    for name in ENV_SECRET_SERVICES {
        if let Some(Value::Mapping(service)) = services.get_mut(*name) {
            service.insert(Value::from("envFromSecret"), Value::from(secret));
            injected += 1;
        }
    }
    injected
}
