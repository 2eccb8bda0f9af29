// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Deploy Dynamo inference graphs onto a single-node Kubernetes cluster.
//!
//! The crate drives external control planes only: the Kubernetes API via
//! `kube`, Helm and host package managers via subprocesses. Scheduling and
//! reconciliation stay with the Dynamo operator.

pub mod apply;
pub mod bootstrap;
pub mod cluster;
pub mod crd;
pub mod discovery;
pub mod error;
pub mod manifest;
pub mod nodeport;
pub mod platform;
pub mod readiness;
pub mod secrets;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use error::{DeployError, Result};
pub use manifest::{Manifest, NamePrefix, PatchReport, PatchRules, PatchedManifest};
pub use nodeport::NodePort;
pub use readiness::WaitOutcome;
pub use workflow::{DeployOptions, DeployReport, deploy};
