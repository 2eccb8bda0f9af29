// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

/// Errors surfaced at the deploy crate boundary.
///
/// Only preconditions are errors. Advisory outcomes such as a readiness
/// timeout or an empty discovery result are returned as values.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("NodePort {0} is outside the allowed range 30000-32767")]
    InvalidNodePort(i64),

    #[error(
        "invalid name prefix '{0}': use lowercase letters, digits and '-', starting and ending with an alphanumeric"
    )]
    InvalidNamePrefix(String),

    #[error("required command '{0}' was not found on PATH")]
    MissingCommand(String),

    #[error("cannot reach the Kubernetes API server: {0}")]
    ClusterUnreachable(String),

    #[error("failed to read manifest {}: {source}", path.display())]
    ManifestIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("manifest is not valid YAML: {0}")]
    ManifestParse(#[from] serde_yaml::Error),

    #[error("manifest document {index}: {reason}")]
    ManifestShape { index: usize, reason: String },

    #[error(transparent)]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T, E = DeployError> = std::result::Result<T, E>;
