// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::time::Duration;

use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand};
use dynkube_deploy::DeployOptions;

use crate::opt::{Backend, Mode};

/// Deploy and exercise Dynamo inference graphs on a single-node Kubernetes cluster.
///
/// Every flag can also be set through the environment variable shown in its help.
/// Remaining tunables are read from `DYNKUBE_*` variables and
/// `/opt/dynkube/etc/{deploy,chat}.toml`.
#[derive(Parser, Debug, Clone)]
#[command(name = "dynkube", version, about, long_about = None)]
pub struct Flags {
    #[command(subcommand)]
    pub command: Command,
}

/// Exit status for a failed parse: 0 when help or the version was asked
/// for, 1 for any usage error.
pub fn parse_exit_code(err: &clap::Error) -> i32 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Patch a manifest template, apply it and expose the frontend.
    Deploy(DeployFlags),

    /// Install the Dynamo CRDs and platform Helm charts.
    InstallPlatform(PlatformFlags),

    /// Turn this host into a single-node kubeadm cluster.
    Bootstrap(BootstrapFlags),

    /// Send one prompt to the frontend and check the reply.
    SmokeTest(SmokeFlags),

    /// Interactive chat showing only the final answer.
    Chat(ChatFlags),

    /// Run several fixed conversations concurrently.
    MultiChat(MultiChatFlags),
}

#[derive(Args, Debug, Clone)]
pub struct DeployFlags {
    /// Manifest template (YAML, one or more documents).
    #[arg(long, env = "MANIFEST")]
    pub manifest: PathBuf,

    /// Target namespace. Defaults to DYNKUBE_NAMESPACE or dynamo-system.
    #[arg(long, env = "NAMESPACE")]
    pub namespace: Option<String>,

    /// Model to serve, replaces --model / --model-path flags and MODEL env values.
    #[arg(long, env = "MODEL")]
    pub model: Option<String>,

    /// Runtime image: a full reference, or a bare tag to keep the repository.
    #[arg(long, env = "IMAGE")]
    pub image: Option<String>,

    /// Prefix added to every object name, e.g. `alice`.
    #[arg(long, env = "NAME_PREFIX")]
    pub name_prefix: Option<String>,

    /// Hugging Face token stored in a Secret and wired into the workers.
    #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
    pub hf_token: Option<String>,

    /// Fixed NodePort for the frontend Service, 30000-32767.
    // range checked by the deploy workflow, not clap
    #[arg(long, env = "NODEPORT", allow_negative_numbers = true)]
    pub nodeport: Option<i64>,

    /// Return after applying, without waiting for pods and endpoints.
    #[arg(long)]
    pub no_wait: bool,

    /// Backend to pick when several deployment groups match.
    #[arg(long, env = "BACKEND")]
    pub backend: Option<Backend>,

    /// Mode to pick when several deployment groups match.
    #[arg(long, env = "MODE")]
    pub mode: Option<Mode>,

    /// Keep the patched manifest on disk and print its path.
    #[arg(long)]
    pub keep_manifest: bool,
}

impl DeployFlags {
    pub fn options(&self) -> DeployOptions {
        DeployOptions {
            manifest: self.manifest.clone(),
            namespace: self.namespace.clone(),
            model: self.model.clone(),
            image: self.image.clone(),
            name_prefix: self.name_prefix.clone(),
            hf_token: self.hf_token.clone(),
            nodeport: self.nodeport,
            wait: !self.no_wait,
            backend: self.backend.map(|b| b.to_string()),
            mode: self.mode.map(|m| m.to_string()),
            keep_manifest: self.keep_manifest,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct PlatformFlags {
    /// Namespace for the platform release.
    #[arg(long, env = "NAMESPACE")]
    pub namespace: Option<String>,

    /// Chart version to install.
    #[arg(long, env = "RELEASE_VERSION")]
    pub release_version: Option<String>,

    /// Extra `key=value` overrides for the platform chart. Repeatable.
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set_values: Vec<String>,

    /// Return after Helm, without waiting for etcd, NATS and the operator.
    #[arg(long)]
    pub no_wait: bool,
}

#[derive(Args, Debug, Clone)]
pub struct BootstrapFlags {
    /// Pod network CIDR passed to kubeadm and the CNI.
    #[arg(long, env = "POD_NETWORK_CIDR")]
    pub pod_network_cidr: Option<String>,

    /// Print the plan without running anything.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct EndpointFlags {
    /// Frontend URL, with or without the trailing `/v1`.
    #[arg(long, env = "BASE_URL")]
    pub base_url: Option<String>,

    /// Model to query. Defaults to the first one listed by /v1/models.
    #[arg(long, env = "MODEL")]
    pub model: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct SmokeFlags {
    #[command(flatten)]
    pub endpoint: EndpointFlags,

    /// Prompt to send.
    #[arg(long, env = "PROMPT")]
    pub prompt: Option<String>,

    /// Wait up to this long for a model to be served, e.g. `90s` or `5m`.
    #[arg(long, value_parser = humantime::parse_duration)]
    pub wait: Option<Duration>,
}

#[derive(Args, Debug, Clone)]
pub struct ChatFlags {
    #[command(flatten)]
    pub endpoint: EndpointFlags,

    /// Also print the unfiltered reply, reasoning included.
    #[arg(long)]
    pub raw: bool,
}

#[derive(Args, Debug, Clone)]
pub struct MultiChatFlags {
    #[command(flatten)]
    pub endpoint: EndpointFlags,

    /// Number of conversations.
    #[arg(long, env = "NUM_CONVOS")]
    pub num_convos: Option<usize>,

    /// Conversations in flight at once.
    #[arg(long, env = "CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Write transcripts here instead of a temporary directory.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}
