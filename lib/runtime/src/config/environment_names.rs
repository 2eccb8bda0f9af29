// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Environment variable name constants
//!
//! Organized by functional area:
//! - **Logging**: log level, config file, output format
//! - **Deploy**: cluster side tunables (namespace, charts, timeouts)
//! - **Chat**: OpenAI endpoint client tunables
//! - **Cli**: short aliases accepted by the CLI flags

/// Logging environment variables
pub mod logging {
    /// Log filter (e.g., "debug", "info,kube_client=debug")
    pub const DYNKUBE_LOG: &str = "DYNKUBE_LOG";

    /// Path to a logging TOML file
    pub const DYNKUBE_LOGGING_CONFIG_PATH: &str = "DYNKUBE_LOGGING_CONFIG_PATH";

    /// Enable JSONL logging format
    pub const DYNKUBE_LOGGING_JSONL: &str = "DYNKUBE_LOGGING_JSONL";

    /// Disable ANSI terminal colors in logs
    pub const DYNKUBE_DISABLE_ANSI_LOGGING: &str = "DYNKUBE_DISABLE_ANSI_LOGGING";

    /// Use local timezone for logging timestamps (default is UTC)
    pub const DYNKUBE_LOG_USE_LOCAL_TZ: &str = "DYNKUBE_LOG_USE_LOCAL_TZ";
}

/// Deployment environment variables
///
/// All of them map onto a field of [`crate::config::DeployConfig`].
pub mod deploy {
    /// Prefix stripped by figment, the rest is the field name
    pub const PREFIX: &str = "DYNKUBE_";

    /// Target namespace for the platform and the graph deployment
    pub const DYNKUBE_NAMESPACE: &str = "DYNKUBE_NAMESPACE";

    /// Helm chart release version
    pub const DYNKUBE_RELEASE_VERSION: &str = "DYNKUBE_RELEASE_VERSION";

    /// Helm repository that serves `dynamo-crds` and `dynamo-platform`
    pub const DYNKUBE_CHART_REPOSITORY: &str = "DYNKUBE_CHART_REPOSITORY";

    /// Runtime image (full reference) or bare tag used when patching manifests
    pub const DYNKUBE_RUNTIME_IMAGE: &str = "DYNKUBE_RUNTIME_IMAGE";

    /// Name of the secret holding the Hugging Face token
    pub const DYNKUBE_HF_SECRET_NAME: &str = "DYNKUBE_HF_SECRET_NAME";

    /// Timeouts, in seconds
    pub mod timeouts {
        pub const DYNKUBE_POD_READY_TIMEOUT_SECS: &str = "DYNKUBE_POD_READY_TIMEOUT_SECS";
        pub const DYNKUBE_ENDPOINTS_TIMEOUT_SECS: &str = "DYNKUBE_ENDPOINTS_TIMEOUT_SECS";
        pub const DYNKUBE_DISCOVERY_TIMEOUT_SECS: &str = "DYNKUBE_DISCOVERY_TIMEOUT_SECS";
        pub const DYNKUBE_DISCOVERY_INTERVAL_SECS: &str = "DYNKUBE_DISCOVERY_INTERVAL_SECS";
        pub const DYNKUBE_PLATFORM_READY_TIMEOUT_SECS: &str =
            "DYNKUBE_PLATFORM_READY_TIMEOUT_SECS";
    }

    /// Bootstrap
    pub mod bootstrap {
        pub const DYNKUBE_POD_NETWORK_CIDR: &str = "DYNKUBE_POD_NETWORK_CIDR";
        pub const DYNKUBE_CNI_MANIFEST_URL: &str = "DYNKUBE_CNI_MANIFEST_URL";
    }
}

/// Chat client environment variables
pub mod chat {
    pub const PREFIX: &str = "DYNKUBE_CHAT_";

    /// Base URL of the OpenAI compatible frontend, without `/v1`
    pub const DYNKUBE_CHAT_BASE_URL: &str = "DYNKUBE_CHAT_BASE_URL";

    pub const DYNKUBE_CHAT_MODEL: &str = "DYNKUBE_CHAT_MODEL";
    pub const DYNKUBE_CHAT_TEMPERATURE: &str = "DYNKUBE_CHAT_TEMPERATURE";
    pub const DYNKUBE_CHAT_MAX_TOKENS: &str = "DYNKUBE_CHAT_MAX_TOKENS";
    pub const DYNKUBE_CHAT_REQUEST_TIMEOUT_SECS: &str = "DYNKUBE_CHAT_REQUEST_TIMEOUT_SECS";
    pub const DYNKUBE_CHAT_NUM_CONVOS: &str = "DYNKUBE_CHAT_NUM_CONVOS";
    pub const DYNKUBE_CHAT_CONCURRENCY: &str = "DYNKUBE_CHAT_CONCURRENCY";
}

/// Short names accepted by CLI flags, kept for muscle memory
pub mod cli {
    pub const HF_TOKEN: &str = "HF_TOKEN";
    pub const BASE_URL: &str = "BASE_URL";
    pub const MODEL: &str = "MODEL";
    pub const NAMESPACE: &str = "NAMESPACE";
    pub const NODEPORT: &str = "NODEPORT";
    pub const NUM_CONVOS: &str = "NUM_CONVOS";
    pub const CONCURRENCY: &str = "CONCURRENCY";
    pub const RELEASE_VERSION: &str = "RELEASE_VERSION";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deploy_names_share_prefix() {
        for name in [
            deploy::DYNKUBE_NAMESPACE,
            deploy::DYNKUBE_RELEASE_VERSION,
            deploy::DYNKUBE_CHART_REPOSITORY,
            deploy::DYNKUBE_RUNTIME_IMAGE,
            deploy::DYNKUBE_HF_SECRET_NAME,
            deploy::timeouts::DYNKUBE_POD_READY_TIMEOUT_SECS,
            deploy::bootstrap::DYNKUBE_POD_NETWORK_CIDR,
        ] {
            assert!(name.starts_with(deploy::PREFIX), "{name}");
        }
    }

    #[test]
    fn test_chat_names_share_prefix() {
        for name in [
            chat::DYNKUBE_CHAT_BASE_URL,
            chat::DYNKUBE_CHAT_MODEL,
            chat::DYNKUBE_CHAT_NUM_CONVOS,
            chat::DYNKUBE_CHAT_CONCURRENCY,
        ] {
            assert!(name.starts_with(chat::PREFIX), "{name}");
        }
    }
}
