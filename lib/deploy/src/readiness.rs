// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Readiness waits built on watches.
//!
//! Each wait watches one kind of object, checks every update against a
//! predicate and stops at the first match, the deadline, or cancellation.
//! Running out of time is an outcome, not an error; the waiter logs what it
//! saw so the user can tell why.

use std::fmt;
use std::fmt::Debug;
use std::time::Duration;

use anyhow::Result;
use futures::StreamExt;
use k8s_openapi::api::{
    apps::v1::{Deployment, StatefulSet},
    core::v1::Pod,
    discovery::v1::EndpointSlice,
};
use kube::{
    Api, Client, Resource,
    api::ListParams,
    runtime::{WatchStreamExt, watcher},
};
use regex::Regex;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

/// Label the EndpointSlice controller puts on slices of a Service.
pub const SERVICE_NAME_LABEL: &str = "kubernetes.io/service-name";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    TimedOut,
    Cancelled,
}

impl WaitOutcome {
    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }
}

/// `(ready, total)` containers, the READY column of `kubectl get pods`.
pub fn ready_containers(pod: &Pod) -> (usize, usize) {
    let statuses = pod
        .status
        .as_ref()
        .and_then(|status| status.container_statuses.as_deref())
        .unwrap_or_default();
    let total = pod
        .spec
        .as_ref()
        .map(|spec| spec.containers.len())
        .unwrap_or(statuses.len())
        .max(statuses.len());
    (statuses.iter().filter(|cs| cs.ready).count(), total)
}

pub fn pod_phase(pod: &Pod) -> &str {
    pod.status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
        .unwrap_or("Unknown")
}

/// Running with every container ready.
pub fn pod_is_ready(pod: &Pod) -> bool {
    let (ready, total) = ready_containers(pod);
    pod_phase(pod) == "Running" && total > 0 && ready == total
}

pub fn slice_has_ready_address(slice: &EndpointSlice) -> bool {
    slice.endpoints.iter().any(|endpoint| {
        !endpoint.addresses.is_empty()
            && endpoint
                .conditions
                .as_ref()
                .and_then(|c| c.ready)
                .unwrap_or(false)
    })
}

pub fn statefulset_is_ready(sts: &StatefulSet) -> bool {
    let desired = sts.spec.as_ref().and_then(|spec| spec.replicas).unwrap_or(1);
    let ready = sts
        .status
        .as_ref()
        .and_then(|status| status.ready_replicas)
        .unwrap_or(0);
    desired > 0 && ready >= desired
}

pub fn deployment_is_available(deployment: &Deployment) -> bool {
    let Some(status) = deployment.status.as_ref() else {
        return false;
    };
    let available_condition = status.conditions.iter().flatten().any(|c| {
        c.type_ == "Available" && c.status == "True"
    });
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1);
    available_condition && status.available_replicas.unwrap_or(0) >= desired
}

/// One row of the diagnostic dump, the columns of `kubectl get pods -o wide`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodSummary {
    pub name: String,
    pub ready: (usize, usize),
    pub phase: String,
    pub restarts: i32,
    pub pod_ip: Option<String>,
    pub node: Option<String>,
}

impl From<&Pod> for PodSummary {
    fn from(pod: &Pod) -> Self {
        let restarts = pod
            .status
            .as_ref()
            .and_then(|status| status.container_statuses.as_ref())
            .map(|statuses| statuses.iter().map(|cs| cs.restart_count).sum())
            .unwrap_or(0);
        Self {
            name: pod.metadata.name.clone().unwrap_or_default(),
            ready: ready_containers(pod),
            phase: pod_phase(pod).to_string(),
            restarts,
            pod_ip: pod.status.as_ref().and_then(|s| s.pod_ip.clone()),
            node: pod.spec.as_ref().and_then(|s| s.node_name.clone()),
        }
    }
}

impl fmt::Display for PodSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<56} {}/{:<3} {:<10} {:<4} {:<16} {}",
            self.name,
            self.ready.0,
            self.ready.1,
            self.phase,
            self.restarts,
            self.pod_ip.as_deref().unwrap_or("<none>"),
            self.node.as_deref().unwrap_or("<none>"),
        )
    }
}

/// Watches objects through one client, sharing one cancellation token.
#[derive(Clone)]
pub struct ReadinessWaiter {
    client: Client,
    cancel: CancellationToken,
}

impl ReadinessWaiter {
    pub fn new(client: Client, cancel: CancellationToken) -> Self {
        Self { client, cancel }
    }

    async fn watch_until<K, F>(
        &self,
        api: Api<K>,
        config: watcher::Config,
        timeout: Duration,
        mut done: F,
    ) -> WaitOutcome
    where
        K: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
        F: FnMut(&K) -> bool,
    {
        let stream = watcher(api, config).default_backoff().applied_objects();
        let mut stream = std::pin::pin!(stream);

        let matched = async {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(obj) if done(&obj) => return true,
                    Ok(_) => {}
                    Err(err) => tracing::debug!(error = %err, "watch error, retrying"),
                }
            }
            false
        };

        tokio::select! {
            _ = self.cancel.cancelled() => WaitOutcome::Cancelled,
            result = tokio::time::timeout(timeout, matched) => match result {
                Ok(true) => WaitOutcome::Ready,
                Ok(false) | Err(_) => WaitOutcome::TimedOut,
            },
        }
    }

    /// Wait for a pod whose name matches `pattern` to be Running and fully
    /// ready. On timeout the matching pods are dumped to the log.
    pub async fn wait_pod_ready(
        &self,
        namespace: &str,
        pattern: &Regex,
        timeout: Duration,
    ) -> Result<WaitOutcome> {
        tracing::info!(namespace, pattern = %pattern, ?timeout, "waiting for pod readiness");
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let outcome = self
            .watch_until(api.clone(), watcher::Config::default(), timeout, |pod: &Pod| {
                pod.metadata
                    .name
                    .as_deref()
                    .is_some_and(|name| pattern.is_match(name))
                    && pod_is_ready(pod)
            })
            .await;

        match outcome {
            WaitOutcome::Ready => tracing::info!(pattern = %pattern, "pod ready"),
            WaitOutcome::TimedOut => {
                tracing::warn!(namespace, pattern = %pattern, "timed out waiting for pod readiness");
                self.dump_pods(&api, Some(pattern)).await;
            }
            WaitOutcome::Cancelled => tracing::info!("pod wait cancelled"),
        }
        Ok(outcome)
    }

    /// Wait until `service` has at least one ready endpoint address.
    pub async fn wait_endpoints(
        &self,
        namespace: &str,
        service: &str,
        timeout: Duration,
    ) -> Result<WaitOutcome> {
        tracing::info!(namespace, service, ?timeout, "waiting for service endpoints");
        let api: Api<EndpointSlice> = Api::namespaced(self.client.clone(), namespace);
        let selector = format!("{SERVICE_NAME_LABEL}={service}");
        let outcome = self
            .watch_until(
                api.clone(),
                watcher::Config::default().labels(&selector),
                timeout,
                slice_has_ready_address,
            )
            .await;

        if outcome == WaitOutcome::TimedOut {
            match api.list(&ListParams::default().labels(&selector)).await {
                Ok(slices) => {
                    let addresses: usize = slices
                        .items
                        .iter()
                        .flat_map(|slice| slice.endpoints.iter())
                        .map(|endpoint| endpoint.addresses.len())
                        .sum();
                    tracing::warn!(
                        namespace,
                        service,
                        slices = slices.items.len(),
                        addresses,
                        "timed out waiting for a ready endpoint"
                    );
                }
                Err(err) => tracing::warn!(
                    namespace,
                    service,
                    error = %err,
                    "timed out waiting for a ready endpoint; could not list endpoint slices"
                ),
            }
            let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
            self.dump_pods(&pods, None).await;
        }
        Ok(outcome)
    }

    pub async fn wait_statefulset_ready(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<WaitOutcome> {
        tracing::info!(namespace, statefulset = name, ?timeout, "waiting for statefulset");
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        let config = watcher::Config::default().fields(&format!("metadata.name={name}"));
        let outcome = self
            .watch_until(api, config, timeout, statefulset_is_ready)
            .await;
        if outcome == WaitOutcome::TimedOut {
            tracing::warn!(namespace, statefulset = name, "statefulset not ready before deadline");
        }
        Ok(outcome)
    }

    pub async fn wait_deployment_available(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<WaitOutcome> {
        tracing::info!(namespace, deployment = name, ?timeout, "waiting for deployment");
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let config = watcher::Config::default().fields(&format!("metadata.name={name}"));
        let outcome = self
            .watch_until(api, config, timeout, deployment_is_available)
            .await;
        if outcome == WaitOutcome::TimedOut {
            tracing::warn!(namespace, deployment = name, "deployment not available before deadline");
        }
        Ok(outcome)
    }

    async fn dump_pods(&self, api: &Api<Pod>, pattern: Option<&Regex>) {
        let pods = match api.list(&ListParams::default()).await {
            Ok(pods) => pods.items,
            Err(err) => {
                tracing::warn!(error = %err, "could not list pods for diagnostics");
                return;
            }
        };
        let matching: Vec<&Pod> = pods
            .iter()
            .filter(|pod| {
                pattern.is_none_or(|re| {
                    pod.metadata.name.as_deref().is_some_and(|name| re.is_match(name))
                })
            })
            .collect();
        let shown = if matching.is_empty() {
            pods.iter().collect()
        } else {
            matching
        };
        for pod in shown {
            tracing::warn!("{}", PodSummary::from(pod));
        }
    }
}
