// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use anyhow::Context as _;
use dynkube_deploy::bootstrap::{BootstrapOptions, BootstrapPlan};
use dynkube_deploy::discovery::Resolution;
use dynkube_deploy::platform::{self, PlatformOptions};
use dynkube_deploy::readiness::ReadinessWaiter;
use dynkube_deploy::{DeployReport, cluster};
use dynkube_llm::chat::{self, ChatSession};
use dynkube_llm::{ConversationOptions, OpenAiClient, SmokeOptions};
use dynkube_runtime::utils::TokioCommandRunner;
use dynkube_runtime::{CancellationToken, ChatConfig, DeployConfig};

mod flags;
pub use flags::{Command, Flags, parse_exit_code};
mod opt;
pub use opt::{Backend, Mode};

pub async fn run(flags: Flags, cancel: CancellationToken) -> anyhow::Result<()> {
    match flags.command {
        Command::Deploy(f) => {
            let config = DeployConfig::from_settings()?;
            let report = dynkube_deploy::deploy(&config, &f.options(), cancel).await?;
            print_deploy_report(&report);
            Ok(())
        }
        Command::InstallPlatform(f) => {
            let config = DeployConfig::from_settings()?;
            let mut opts = PlatformOptions::from_config(&config);
            if let Some(ns) = f.namespace {
                opts.namespace = ns;
            }
            if let Some(version) = f.release_version {
                opts.release_version = version;
            }
            opts.set_values = f.set_values;
            opts.wait = !f.no_wait;

            platform::require_command("helm")?;
            let client = cluster::connect().await?;
            let waiter = ReadinessWaiter::new(client, cancel);
            let report = platform::install_platform(&TokioCommandRunner, Some(&waiter), &opts)
                .await?;
            for (name, outcome) in &report.waits {
                println!("{name}: {outcome:?}");
            }
            if !report.all_ready() {
                tracing::warn!(
                    namespace = %opts.namespace,
                    "platform is not ready yet; check `kubectl get pods -n {}`",
                    opts.namespace
                );
            }
            Ok(())
        }
        Command::Bootstrap(f) => {
            let config = DeployConfig::from_settings()?;
            let mut opts = BootstrapOptions::from_config(&config);
            if let Some(cidr) = f.pod_network_cidr {
                opts.pod_network_cidr = cidr;
            }
            let plan = BootstrapPlan::single_node(&opts);
            if f.dry_run {
                return plan.dry_run().await;
            }
            let report = plan.execute(&TokioCommandRunner).await?;
            tracing::info!(
                ran = report.ran(),
                skipped = report.steps.len() - report.ran(),
                "bootstrap complete"
            );
            Ok(())
        }
        Command::SmokeTest(f) => {
            let config = chat_config(f.endpoint.base_url)?;
            let client = OpenAiClient::from_config(&config)?;
            let options = SmokeOptions {
                prompt: f.prompt,
                model: f.endpoint.model.or(config.model),
                wait: f.wait,
            };
            let report = dynkube_llm::run_smoke_test(&client, &options, &cancel).await?;
            println!("{report}");
            Ok(())
        }
        Command::Chat(f) => {
            let config = chat_config(f.endpoint.base_url)?;
            let client = OpenAiClient::from_config(&config)?;
            let model = client
                .resolve_model(f.endpoint.model.or(config.model).as_deref())
                .await?;
            chat::run_interactive(ChatSession::new(client, model), f.raw, cancel).await
        }
        Command::MultiChat(f) => {
            let config = chat_config(f.endpoint.base_url)?;
            let client = OpenAiClient::from_config(&config)?;
            let model = client
                .resolve_model(f.endpoint.model.or(config.model).as_deref())
                .await?;
            let options = ConversationOptions {
                num_convos: f.num_convos.unwrap_or(config.num_convos),
                concurrency: f.concurrency.unwrap_or(config.concurrency),
                model,
                output_dir: f.output_dir,
            };
            let report = dynkube_llm::run_conversations(&client, &options, &cancel).await?;
            print!("{}", report.render());
            tracing::info!(
                max_in_flight = report.max_in_flight,
                "{} conversations finished",
                report.transcripts.len()
            );
            anyhow::ensure!(
                report.failed() == 0,
                "{} of {} conversations failed",
                report.failed(),
                report.transcripts.len()
            );
            Ok(())
        }
    }
}

/// Chat settings with the CLI's base URL applied on top.
fn chat_config(base_url: Option<String>) -> anyhow::Result<ChatConfig> {
    let mut config = ChatConfig::from_settings().context("loading chat settings")?;
    if let Some(url) = base_url {
        config.base_url = url;
    }
    Ok(config)
}

fn print_deploy_report(report: &DeployReport) {
    let patch = &report.patch;
    println!(
        "patched: images={} model-fields={} renamed={} env-from-secret={}",
        patch.images,
        patch.model_fields(),
        patch.renamed,
        patch.env_from_secret
    );
    for object in &report.applied {
        println!("applied {object}");
    }
    if let Some(path) = &report.kept_manifest {
        println!("patched manifest: {}", path.display());
    }
    match &report.resolution {
        Resolution::Found(found) => println!("discovered {found}"),
        Resolution::NotFound => println!("no workloads discovered"),
        Resolution::Ambiguous(names) => {
            println!("ambiguous workloads: {}", names.join(", "));
            println!("pass --backend and --mode to choose one");
        }
    }
    for svc in &report.exposed {
        let ports: Vec<String> = svc.node_ports.iter().map(ToString::to_string).collect();
        println!("service {} nodePort {}", svc.name, ports.join(","));
    }
    for (name, outcome) in &report.waits {
        println!("{name}: {outcome:?}");
    }
    if !report.hints.is_empty() {
        println!("next steps:");
        for hint in &report.hints {
            println!("  {hint}");
        }
    }
}
