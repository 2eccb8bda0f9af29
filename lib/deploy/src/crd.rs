// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Client-side view of the DynamoGraphDeployment custom resource.
//!
//! The CRD itself is installed by the `dynamo-crds` chart and reconciled by
//! the platform operator; only the fields this tool reads or patches are
//! typed here.

use std::collections::BTreeMap;

use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Spec for DynamoGraphDeployment
/// Each entry of `services` is kept as raw JSON so that fields unknown to
/// this tool round-trip untouched.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize)]
#[kube(
    group = "nvidia.com",
    version = "v1alpha1",
    kind = "DynamoGraphDeployment",
    namespaced,
    schema = "disabled"
)]
pub struct DynamoGraphDeploymentSpec {
    #[serde(default)]
    pub services: BTreeMap<String, serde_json::Value>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl DynamoGraphDeploymentSpec {
    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::Resource;

    #[test]
    fn test_crd_metadata() {
        assert_eq!(DynamoGraphDeployment::group(&()), "nvidia.com");
        assert_eq!(DynamoGraphDeployment::version(&()), "v1alpha1");
        assert_eq!(DynamoGraphDeployment::kind(&()), "DynamoGraphDeployment");
        assert_eq!(DynamoGraphDeployment::plural(&()), "dynamographdeployments");
    }

    #[test]
    fn test_unknown_fields_survive() {
        let json = serde_json::json!({
            "apiVersion": "nvidia.com/v1alpha1",
            "kind": "DynamoGraphDeployment",
            "metadata": { "name": "vllm-agg" },
            "spec": {
                "backendFramework": "vllm",
                "services": {
                    "Frontend": { "replicas": 1 },
                    "VllmDecodeWorker": { "replicas": 1, "envFromSecret": "hf-token-secret" }
                }
            }
        });
        let dgd: DynamoGraphDeployment = serde_json::from_value(json.clone()).unwrap();
        let names: Vec<&str> = dgd.spec.service_names().collect();
        assert_eq!(names, ["Frontend", "VllmDecodeWorker"]);
        assert_eq!(dgd.spec.extra["backendFramework"], "vllm");

        let back = serde_json::to_value(&dgd).unwrap();
        assert_eq!(back["spec"], json["spec"]);
    }
}
