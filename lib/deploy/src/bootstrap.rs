// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Single-node cluster bootstrap: container runtime, kubeadm, CNI and Helm
//! on a Debian/Ubuntu host.
//!
//! The plan is data. Each step carries an optional probe; a step whose probe
//! exits 0 is already done and is skipped, which makes re-running safe.

use std::fmt;

use anyhow::{Context, Result};
use dynkube_runtime::DeployConfig;
use dynkube_runtime::utils::{CommandRunner, CommandSpec, DryRunRunner};

pub const DEFAULT_KUBERNETES_MINOR: &str = "v1.31";
pub const HELM_INSTALL_SCRIPT: &str =
    "https://raw.githubusercontent.com/helm/helm/main/scripts/get-helm-3";
const CONTROL_PLANE_TAINT: &str = "node-role.kubernetes.io/control-plane";

#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    pub pod_network_cidr: String,
    pub cni_manifest_url: String,
    pub kubernetes_minor: String,
}

impl BootstrapOptions {
    pub fn from_config(config: &DeployConfig) -> Self {
        Self {
            pod_network_cidr: config.pod_network_cidr.clone(),
            cni_manifest_url: config.cni_manifest_url.clone(),
            kubernetes_minor: DEFAULT_KUBERNETES_MINOR.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BootstrapStep {
    pub name: &'static str,
    /// Exits 0 when the step is already done
    pub probe: Option<CommandSpec>,
    pub commands: Vec<CommandSpec>,
}

impl BootstrapStep {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            probe: None,
            commands: Vec::new(),
        }
    }

    fn probe(mut self, probe: CommandSpec) -> Self {
        self.probe = Some(probe);
        self
    }

    fn run(mut self, cmd: CommandSpec) -> Self {
        self.commands.push(cmd);
        self
    }
}

fn sudo(args: &[&str]) -> CommandSpec {
    CommandSpec::new("sudo").args(args.iter().copied())
}

fn has_command(program: &str) -> CommandSpec {
    CommandSpec::shell(format!("command -v {program}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Skipped,
    Ran,
}

#[derive(Debug, Clone, Default)]
pub struct BootstrapReport {
    pub steps: Vec<(&'static str, StepOutcome)>,
}

impl BootstrapReport {
    pub fn ran(&self) -> usize {
        self.steps
            .iter()
            .filter(|(_, outcome)| *outcome == StepOutcome::Ran)
            .count()
    }
}

#[derive(Debug, Clone)]
pub struct BootstrapPlan {
    steps: Vec<BootstrapStep>,
}

impl BootstrapPlan {
    pub fn single_node(opts: &BootstrapOptions) -> Self {
        let minor = &opts.kubernetes_minor;
        let apt_repo = format!("https://pkgs.k8s.io/core:/stable:/{minor}/deb/");

        let steps = vec![
            BootstrapStep::new("disable swap")
                .probe(CommandSpec::shell("[ -z \"$(swapon --show)\" ]"))
                .run(sudo(&["swapoff", "-a"]))
                .run(sudo(&["sed", "-i", "/ swap / s/^/#/", "/etc/fstab"])),
            BootstrapStep::new("kernel modules and sysctl")
                .probe(CommandSpec::shell(
                    "lsmod | grep -q br_netfilter && [ \"$(sysctl -n net.ipv4.ip_forward)\" = 1 ]",
                ))
                .run(CommandSpec::shell(
                    "printf 'overlay\\nbr_netfilter\\n' | sudo tee /etc/modules-load.d/k8s.conf",
                ))
                .run(sudo(&["modprobe", "overlay"]))
                .run(sudo(&["modprobe", "br_netfilter"]))
                .run(CommandSpec::shell(
                    "printf 'net.bridge.bridge-nf-call-iptables = 1\\nnet.bridge.bridge-nf-call-ip6tables = 1\\nnet.ipv4.ip_forward = 1\\n' | sudo tee /etc/sysctl.d/k8s.conf",
                ))
                .run(sudo(&["sysctl", "--system"])),
            BootstrapStep::new("containerd")
                .probe(has_command("containerd"))
                .run(sudo(&["apt-get", "update"]))
                .run(sudo(&["apt-get", "install", "-y", "containerd"]))
                .run(sudo(&["mkdir", "-p", "/etc/containerd"]))
                .run(CommandSpec::shell(
                    "containerd config default | sed 's/SystemdCgroup = false/SystemdCgroup = true/' | sudo tee /etc/containerd/config.toml >/dev/null",
                ))
                .run(sudo(&["systemctl", "restart", "containerd"]))
                .run(sudo(&["systemctl", "enable", "containerd"])),
            BootstrapStep::new("kubeadm, kubelet and kubectl")
                .probe(has_command("kubeadm"))
                .run(sudo(&[
                    "apt-get",
                    "install",
                    "-y",
                    "apt-transport-https",
                    "ca-certificates",
                    "curl",
                    "gpg",
                ]))
                .run(sudo(&["mkdir", "-p", "-m", "755", "/etc/apt/keyrings"]))
                .run(CommandSpec::shell(format!(
                    "curl -fsSL {apt_repo}Release.key | sudo gpg --batch --yes --dearmor -o /etc/apt/keyrings/kubernetes-apt-keyring.gpg"
                )))
                .run(CommandSpec::shell(format!(
                    "echo 'deb [signed-by=/etc/apt/keyrings/kubernetes-apt-keyring.gpg] {apt_repo} /' | sudo tee /etc/apt/sources.list.d/kubernetes.list"
                )))
                .run(sudo(&["apt-get", "update"]))
                .run(sudo(&["apt-get", "install", "-y", "kubelet", "kubeadm", "kubectl"]))
                .run(sudo(&["apt-mark", "hold", "kubelet", "kubeadm", "kubectl"]))
                .run(sudo(&["systemctl", "enable", "--now", "kubelet"])),
            BootstrapStep::new("control plane")
                .probe(CommandSpec::new("test").args(["-f", "/etc/kubernetes/admin.conf"]))
                .run(
                    sudo(&["kubeadm", "init"])
                        .arg(format!("--pod-network-cidr={}", opts.pod_network_cidr)),
                ),
            BootstrapStep::new("kubeconfig")
                .probe(CommandSpec::shell("test -f \"$HOME/.kube/config\""))
                .run(CommandSpec::shell(
                    "mkdir -p \"$HOME/.kube\" && sudo cp /etc/kubernetes/admin.conf \"$HOME/.kube/config\" && sudo chown \"$(id -u):$(id -g)\" \"$HOME/.kube/config\"",
                )),
            BootstrapStep::new("pod network")
                .probe(CommandSpec::new("kubectl").args([
                    "get",
                    "daemonset",
                    "-n",
                    "kube-flannel",
                    "kube-flannel-ds",
                ]))
                .run(CommandSpec::new("kubectl").args(["apply", "-f"]).arg(opts.cni_manifest_url.clone())),
            BootstrapStep::new("schedule on control plane")
                .probe(CommandSpec::shell(format!(
                    "! kubectl get nodes -o jsonpath='{{.items[*].spec.taints[*].key}}' | grep -q {CONTROL_PLANE_TAINT}"
                )))
                .run(CommandSpec::new("kubectl").args([
                    "taint".to_string(),
                    "nodes".to_string(),
                    "--all".to_string(),
                    format!("{CONTROL_PLANE_TAINT}-"),
                ])),
            BootstrapStep::new("helm")
                .probe(has_command("helm"))
                .run(CommandSpec::shell(format!(
                    "curl -fsSL {HELM_INSTALL_SCRIPT} | bash"
                ))),
        ];
        Self { steps }
    }

    pub fn steps(&self) -> &[BootstrapStep] {
        &self.steps
    }

    /// Run the plan, skipping steps whose probe passes. Stops at the first
    /// failing command.
    pub async fn execute(&self, runner: &dyn CommandRunner) -> Result<BootstrapReport> {
        let mut report = BootstrapReport::default();
        for step in &self.steps {
            if let Some(probe) = &step.probe {
                let done = runner.run(probe).await.is_ok_and(|out| out.success());
                if done {
                    tracing::info!(step = step.name, "already done, skipping");
                    report.steps.push((step.name, StepOutcome::Skipped));
                    continue;
                }
            }
            tracing::info!(step = step.name, "running");
            for cmd in &step.commands {
                runner
                    .run_checked(cmd)
                    .await
                    .with_context(|| format!("bootstrap step '{}' failed", step.name))?;
            }
            report.steps.push((step.name, StepOutcome::Ran));
        }
        Ok(report)
    }

    /// Print every command without running anything.
    pub async fn dry_run(&self) -> Result<()> {
        let runner = DryRunRunner;
        for step in &self.steps {
            println!("# {}", step.name);
            if let Some(probe) = &step.probe {
                println!("#   skipped when: {probe}");
            }
            for cmd in &step.commands {
                runner.run(cmd).await?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for BootstrapPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, step) in self.steps.iter().enumerate() {
            writeln!(f, "{}. {}", idx + 1, step.name)?;
            for cmd in &step.commands {
                writeln!(f, "   {cmd}")?;
            }
        }
        Ok(())
    }
}
