// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use derive_builder::Builder;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use validator::Validate;

pub mod environment_names;

use dynkube_config::env_is_truthy;
use environment_names::{chat as env_chat, deploy as env_deploy, logging as env_logging};

/// Default namespace for the platform and graph deployments
pub const DEFAULT_NAMESPACE: &str = "dynamo-system";

/// Helm chart release version installed by `install-platform`
pub const DEFAULT_RELEASE_VERSION: &str = "0.7.0";

/// NGC Helm repository serving the Dynamo charts
pub const DEFAULT_CHART_REPOSITORY: &str = "https://helm.ngc.nvidia.com/nvidia/ai-dynamo/charts";

/// Secret created from `--hf-token`
pub const DEFAULT_HF_SECRET_NAME: &str = "hf-token-secret";

/// Field manager for server-side apply
pub const DEFAULT_FIELD_MANAGER: &str = "dynkube";

pub const DEFAULT_POD_READY_TIMEOUT_SECS: u64 = 900;
pub const DEFAULT_ENDPOINTS_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_DISCOVERY_TIMEOUT_SECS: u64 = 180;
pub const DEFAULT_DISCOVERY_INTERVAL_SECS: u64 = 3;
pub const DEFAULT_PLATFORM_READY_TIMEOUT_SECS: u64 = 600;

pub const DEFAULT_POD_NETWORK_CIDR: &str = "10.244.0.0/16";
pub const DEFAULT_CNI_MANIFEST_URL: &str =
    "https://github.com/flannel-io/flannel/releases/latest/download/kube-flannel.yml";

pub const DEFAULT_CHAT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_CHAT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_CHAT_MAX_TOKENS: u32 = 512;
pub const DEFAULT_CHAT_REQUEST_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_NUM_CONVOS: usize = 5;
pub const DEFAULT_CONCURRENCY: usize = 2;

/// Env provider that drops blank variables, so `FOO= cmd` means "use the default".
fn non_empty_env(prefix: &'static str) -> Env {
    Env::prefixed(prefix).filter_map(move |k| {
        let full_key = format!("{prefix}{}", k.as_str());
        match std::env::var(&full_key) {
            Ok(v) if !v.trim().is_empty() => Some(k.into()),
            _ => None,
        }
    })
}

/// Cluster side configuration
///
/// Loaded from, lowest priority first:
/// 1. built-in defaults
/// 2. `/opt/dynkube/etc/deploy.toml`
/// 3. `DYNKUBE_*` environment variables
///
/// CLI flags are applied on top by the caller.
#[derive(Serialize, Deserialize, Validate, Debug, Builder, Clone)]
#[builder(build_fn(private, name = "build_internal"), derive(Debug, Serialize))]
pub struct DeployConfig {
    /// Set with DYNKUBE_NAMESPACE
    #[builder(default = "DEFAULT_NAMESPACE.to_string()", setter(into))]
    #[validate(length(min = 1, max = 63))]
    pub namespace: String,

    /// Set with DYNKUBE_RELEASE_VERSION
    #[builder(default = "DEFAULT_RELEASE_VERSION.to_string()", setter(into))]
    #[validate(length(min = 1))]
    pub release_version: String,

    /// Set with DYNKUBE_CHART_REPOSITORY
    #[builder(default = "DEFAULT_CHART_REPOSITORY.to_string()", setter(into))]
    pub chart_repository: String,

    /// Full image reference or a bare tag. Set with DYNKUBE_RUNTIME_IMAGE
    #[builder(default, setter(into, strip_option))]
    #[builder_field_attr(serde(skip_serializing_if = "Option::is_none"))]
    pub runtime_image: Option<String>,

    /// Set with DYNKUBE_HF_SECRET_NAME
    #[builder(default = "DEFAULT_HF_SECRET_NAME.to_string()", setter(into))]
    pub hf_secret_name: String,

    #[builder(default = "DEFAULT_FIELD_MANAGER.to_string()", setter(into))]
    pub field_manager: String,

    #[builder(default = "DEFAULT_POD_READY_TIMEOUT_SECS")]
    #[validate(range(min = 1))]
    pub pod_ready_timeout_secs: u64,

    #[builder(default = "DEFAULT_ENDPOINTS_TIMEOUT_SECS")]
    #[validate(range(min = 1))]
    pub endpoints_timeout_secs: u64,

    #[builder(default = "DEFAULT_DISCOVERY_TIMEOUT_SECS")]
    #[validate(range(min = 1))]
    pub discovery_timeout_secs: u64,

    #[builder(default = "DEFAULT_DISCOVERY_INTERVAL_SECS")]
    #[validate(range(min = 1))]
    pub discovery_interval_secs: u64,

    #[builder(default = "DEFAULT_PLATFORM_READY_TIMEOUT_SECS")]
    #[validate(range(min = 1))]
    pub platform_ready_timeout_secs: u64,

    #[builder(default = "DEFAULT_POD_NETWORK_CIDR.to_string()", setter(into))]
    pub pod_network_cidr: String,

    #[builder(default = "DEFAULT_CNI_MANIFEST_URL.to_string()", setter(into))]
    pub cni_manifest_url: String,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            release_version: DEFAULT_RELEASE_VERSION.to_string(),
            chart_repository: DEFAULT_CHART_REPOSITORY.to_string(),
            runtime_image: None,
            hf_secret_name: DEFAULT_HF_SECRET_NAME.to_string(),
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
            pod_ready_timeout_secs: DEFAULT_POD_READY_TIMEOUT_SECS,
            endpoints_timeout_secs: DEFAULT_ENDPOINTS_TIMEOUT_SECS,
            discovery_timeout_secs: DEFAULT_DISCOVERY_TIMEOUT_SECS,
            discovery_interval_secs: DEFAULT_DISCOVERY_INTERVAL_SECS,
            platform_ready_timeout_secs: DEFAULT_PLATFORM_READY_TIMEOUT_SECS,
            pod_network_cidr: DEFAULT_POD_NETWORK_CIDR.to_string(),
            cni_manifest_url: DEFAULT_CNI_MANIFEST_URL.to_string(),
        }
    }
}

impl fmt::Display for DeployConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "namespace={}, ", self.namespace)?;
        write!(f, "release_version={}, ", self.release_version)?;
        write!(f, "chart_repository={}, ", self.chart_repository)?;
        match &self.runtime_image {
            Some(image) => write!(f, "runtime_image={image}, ")?,
            None => write!(f, "runtime_image=unchanged, ")?,
        }
        write!(f, "hf_secret_name={}", self.hf_secret_name)?;
        write!(f, ", pod_ready_timeout_secs={}", self.pod_ready_timeout_secs)?;
        write!(f, ", endpoints_timeout_secs={}", self.endpoints_timeout_secs)?;
        write!(f, ", discovery_timeout_secs={}", self.discovery_timeout_secs)?;
        write!(f, ", discovery_interval_secs={}", self.discovery_interval_secs)
    }
}

impl DeployConfig {
    pub fn builder() -> DeployConfigBuilder {
        DeployConfigBuilder::default()
    }

    pub(crate) fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(DeployConfig::default()))
            .merge(Toml::file("/opt/dynkube/etc/deploy.toml"))
            .merge(non_empty_env(env_deploy::PREFIX))
    }

    /// Load the deploy configuration from defaults, TOML and the environment.
    pub fn from_settings() -> Result<DeployConfig> {
        let config: DeployConfig = Self::figment().extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn pod_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.pod_ready_timeout_secs)
    }

    pub fn endpoints_timeout(&self) -> Duration {
        Duration::from_secs(self.endpoints_timeout_secs)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery_interval_secs)
    }

    pub fn platform_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.platform_ready_timeout_secs)
    }
}

impl DeployConfigBuilder {
    /// Build and validate the deploy configuration
    pub fn build(&self) -> Result<DeployConfig> {
        let config = self.build_internal()?;
        config.validate()?;
        Ok(config)
    }
}

/// OpenAI endpoint client configuration
///
/// Same layering as [`DeployConfig`], with `/opt/dynkube/etc/chat.toml` and
/// `DYNKUBE_CHAT_*` variables.
#[derive(Serialize, Deserialize, Validate, Debug, Builder, Clone)]
#[builder(build_fn(private, name = "build_internal"), derive(Debug, Serialize))]
pub struct ChatConfig {
    #[builder(default = "DEFAULT_CHAT_BASE_URL.to_string()", setter(into))]
    #[validate(url)]
    pub base_url: String,

    /// When unset the first id from `/v1/models` is used
    #[builder(default, setter(into, strip_option))]
    #[builder_field_attr(serde(skip_serializing_if = "Option::is_none"))]
    pub model: Option<String>,

    #[builder(default = "DEFAULT_CHAT_TEMPERATURE")]
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: f32,

    #[builder(default = "DEFAULT_CHAT_MAX_TOKENS")]
    #[validate(range(min = 1))]
    pub max_tokens: u32,

    #[builder(default = "DEFAULT_CHAT_REQUEST_TIMEOUT_SECS")]
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,

    #[builder(default = "DEFAULT_NUM_CONVOS")]
    #[validate(range(min = 1))]
    pub num_convos: usize,

    #[builder(default = "DEFAULT_CONCURRENCY")]
    #[validate(range(min = 1))]
    pub concurrency: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CHAT_BASE_URL.to_string(),
            model: None,
            temperature: DEFAULT_CHAT_TEMPERATURE,
            max_tokens: DEFAULT_CHAT_MAX_TOKENS,
            request_timeout_secs: DEFAULT_CHAT_REQUEST_TIMEOUT_SECS,
            num_convos: DEFAULT_NUM_CONVOS,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl fmt::Display for ChatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "base_url={}, ", self.base_url)?;
        match &self.model {
            Some(model) => write!(f, "model={model}, ")?,
            None => write!(f, "model=auto, ")?,
        }
        write!(f, "temperature={}, ", self.temperature)?;
        write!(f, "max_tokens={}, ", self.max_tokens)?;
        write!(f, "num_convos={}, ", self.num_convos)?;
        write!(f, "concurrency={}", self.concurrency)
    }
}

impl ChatConfig {
    pub fn builder() -> ChatConfigBuilder {
        ChatConfigBuilder::default()
    }

    pub(crate) fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(ChatConfig::default()))
            .merge(Toml::file("/opt/dynkube/etc/chat.toml"))
            .merge(non_empty_env(env_chat::PREFIX))
    }

    pub fn from_settings() -> Result<ChatConfig> {
        let config: ChatConfig = Self::figment().extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl ChatConfigBuilder {
    pub fn build(&self) -> Result<ChatConfig> {
        let config = self.build_internal()?;
        config.validate()?;
        Ok(config)
    }
}

/// Check whether JSONL logging enabled
/// Set the `DYNKUBE_LOGGING_JSONL` environment variable a truthy value
pub fn jsonl_logging_enabled() -> bool {
    env_is_truthy(env_logging::DYNKUBE_LOGGING_JSONL)
}

/// Set `DYNKUBE_DISABLE_ANSI_LOGGING` to a truthy value to disable colors
pub fn disable_ansi_logging() -> bool {
    env_is_truthy(env_logging::DYNKUBE_DISABLE_ANSI_LOGGING)
}

/// Set `DYNKUBE_LOG_USE_LOCAL_TZ` to a truthy value to log in local time
pub fn use_local_timezone() -> bool {
    env_is_truthy(env_logging::DYNKUBE_LOG_USE_LOCAL_TZ)
}
