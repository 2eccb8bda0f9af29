// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use kube::Client;

use crate::error::{DeployError, Result};

/// Build a client from the ambient kubeconfig or in-cluster environment and
/// confirm the API server answers. Both failures map to
/// [`DeployError::ClusterUnreachable`].
pub async fn connect() -> Result<Client> {
    let client = Client::try_default()
        .await
        .map_err(|err| DeployError::ClusterUnreachable(err.to_string()))?;

    let version = client
        .apiserver_version()
        .await
        .map_err(|err| DeployError::ClusterUnreachable(err.to_string()))?;

    tracing::info!(
        version = %version.git_version,
        platform = %version.platform,
        "connected to Kubernetes API server"
    );
    Ok(client)
}

/// Hints printed when nothing could be found for the applied manifest.
pub fn remediation_hints(namespace: &str) -> Vec<String> {
    vec![
        format!("kubectl get dynamographdeployments -n {namespace}"),
        format!("kubectl get deploy,svc -n {namespace}"),
        format!("kubectl get pods -n {namespace} -o wide"),
        format!("kubectl get events -n {namespace} --sort-by=.lastTimestamp"),
    ]
}
