// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Expose discovered Services through NodePort.

use std::fmt;
use std::str::FromStr;

use anyhow::Context;
use k8s_openapi::api::core::v1::Service;
use kube::{
    Api, Client,
    api::{Patch, PatchParams},
};
use serde_json::json;

use crate::error::{DeployError, Result};

pub const NODEPORT_MIN: u16 = 30000;
pub const NODEPORT_MAX: u16 = 32767;

/// A port inside the default Kubernetes NodePort range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodePort(u16);

impl NodePort {
    pub fn new(port: i64) -> Result<Self> {
        match u16::try_from(port) {
            Ok(port) if (NODEPORT_MIN..=NODEPORT_MAX).contains(&port) => Ok(Self(port)),
            _ => Err(DeployError::InvalidNodePort(port)),
        }
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

impl TryFrom<i64> for NodePort {
    type Error = DeployError;

    fn try_from(port: i64) -> Result<Self> {
        Self::new(port)
    }
}

impl FromStr for NodePort {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self> {
        let port: i64 = s
            .trim()
            .parse()
            .with_context(|| format!("NodePort '{s}' is not an integer"))?;
        Self::new(port)
    }
}

impl fmt::Display for NodePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What has to happen to a Service to expose it.
#[derive(Debug, Clone, PartialEq)]
pub enum NodePortAction {
    /// Headless services have no cluster IP to forward to.
    SkipHeadless,
    Unchanged,
    /// JSON merge patch to send.
    Patch(serde_json::Value),
}

pub fn is_headless(service: &Service) -> bool {
    service
        .spec
        .as_ref()
        .and_then(|spec| spec.cluster_ip.as_deref())
        == Some("None")
}

/// Node ports currently assigned to `service`, in port order.
pub fn node_ports(service: &Service) -> Vec<i32> {
    service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.as_ref())
        .map(|ports| ports.iter().filter_map(|p| p.node_port).collect())
        .unwrap_or_default()
}

/// Decide how to expose `service`. Only the first port is pinned to
/// `requested`; every other port keeps its value or gets one assigned.
pub fn plan_nodeport(service: &Service, requested: Option<NodePort>) -> NodePortAction {
    let Some(spec) = service.spec.as_ref() else {
        return NodePortAction::Unchanged;
    };
    if is_headless(service) {
        return NodePortAction::SkipHeadless;
    }

    let is_nodeport = spec.type_.as_deref() == Some("NodePort");
    let mut ports = spec.ports.clone().unwrap_or_default();
    let pin = match (requested, ports.first_mut()) {
        (Some(requested), Some(first)) if first.node_port != Some(i32::from(requested.get())) => {
            first.node_port = Some(i32::from(requested.get()));
            true
        }
        _ => false,
    };

    match (is_nodeport, pin) {
        (true, false) => NodePortAction::Unchanged,
        (_, true) => NodePortAction::Patch(json!({
            "spec": { "type": "NodePort", "ports": ports }
        })),
        (false, false) => NodePortAction::Patch(json!({ "spec": { "type": "NodePort" } })),
    }
}

/// Pick the service that receives a fixed port: the frontend if there is
/// one, otherwise the first by name.
pub fn primary_service(names: &[String]) -> Option<&str> {
    names
        .iter()
        .filter(|name| name.contains("frontend"))
        .min()
        .or_else(|| names.iter().min())
        .map(String::as_str)
}

/// Result of exposing one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposedService {
    pub name: String,
    pub node_ports: Vec<i32>,
    pub changed: bool,
}

/// Convert every named Service. A fixed port, if any, goes to the primary.
pub async fn expose_services(
    client: &Client,
    namespace: &str,
    services: &[String],
    requested: Option<NodePort>,
) -> Result<Vec<ExposedService>> {
    let api: Api<Service> = Api::namespaced(client.clone(), namespace);
    let primary = primary_service(services).map(str::to_string);
    let mut exposed = Vec::new();

    for name in services {
        let Some(service) = api.get_opt(name).await? else {
            tracing::warn!(service = %name, "service disappeared before it could be exposed");
            continue;
        };
        let fixed = requested.filter(|_| primary.as_deref() == Some(name.as_str()));

        match plan_nodeport(&service, fixed) {
            NodePortAction::SkipHeadless => {
                tracing::info!(service = %name, "skipping headless service");
            }
            NodePortAction::Unchanged => {
                tracing::debug!(service = %name, ports = ?node_ports(&service), "already exposed");
                exposed.push(ExposedService {
                    name: name.clone(),
                    node_ports: node_ports(&service),
                    changed: false,
                });
            }
            NodePortAction::Patch(body) => {
                let patched = api
                    .patch(name, &PatchParams::default(), &Patch::Merge(&body))
                    .await?;
                let ports = node_ports(&patched);
                tracing::info!(service = %name, ports = ?ports, "converted to NodePort");
                exposed.push(ExposedService {
                    name: name.clone(),
                    node_ports: ports,
                    changed: true,
                });
            }
        }
    }
    Ok(exposed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ServicePort, ServiceSpec};
    use rstest::rstest;

    fn service(type_: &str, cluster_ip: Option<&str>, node_port: Option<i32>) -> Service {
        Service {
            spec: Some(ServiceSpec {
                type_: Some(type_.to_string()),
                cluster_ip: cluster_ip.map(str::to_string),
                ports: Some(vec![
                    ServicePort {
                        port: 8000,
                        node_port,
                        ..Default::default()
                    },
                    ServicePort {
                        name: Some("metrics".to_string()),
                        port: 9090,
                        ..Default::default()
                    },
                ]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[rstest]
    #[case(30000, true)]
    #[case(32767, true)]
    #[case(31080, true)]
    #[case(29999, false)]
    #[case(32768, false)]
    #[case(-1, false)]
    #[case(80, false)]
    fn test_nodeport_range(#[case] port: i64, #[case] ok: bool) {
        assert_eq!(NodePort::new(port).is_ok(), ok);
    }

    #[test]
    fn test_nodeport_from_str() {
        assert_eq!("30080".parse::<NodePort>().unwrap().get(), 30080);
        assert!(matches!(
            "8080".parse::<NodePort>(),
            Err(DeployError::InvalidNodePort(8080))
        ));
        assert!("http".parse::<NodePort>().is_err());
    }

    #[test]
    fn test_headless_is_skipped() {
        let svc = service("ClusterIP", Some("None"), None);
        assert_eq!(plan_nodeport(&svc, None), NodePortAction::SkipHeadless);
    }

    #[test]
    fn test_cluster_ip_becomes_nodeport() {
        let svc = service("ClusterIP", Some("10.0.0.5"), None);
        assert_eq!(
            plan_nodeport(&svc, None),
            NodePortAction::Patch(json!({ "spec": { "type": "NodePort" } }))
        );
    }

    #[test]
    fn test_requested_port_pins_first_port_only() {
        let svc = service("ClusterIP", Some("10.0.0.5"), None);
        let NodePortAction::Patch(body) = plan_nodeport(&svc, Some(NodePort::new(30080).unwrap()))
        else {
            panic!("expected a patch");
        };
        assert_eq!(body["spec"]["type"], "NodePort");
        assert_eq!(body["spec"]["ports"][0]["nodePort"], 30080);
        assert!(body["spec"]["ports"][1].get("nodePort").is_none());
    }

    #[test]
    fn test_existing_nodeport_with_different_port() {
        let svc = service("NodePort", Some("10.0.0.5"), Some(31000));
        let NodePortAction::Patch(body) = plan_nodeport(&svc, Some(NodePort::new(30080).unwrap()))
        else {
            panic!("expected a patch");
        };
        assert_eq!(body["spec"]["ports"][0]["nodePort"], 30080);
    }

    #[rstest]
    #[case(None)]
    #[case(Some(31000))]
    fn test_nodeport_is_idempotent(#[case] requested: Option<i64>) {
        let svc = service("NodePort", Some("10.0.0.5"), Some(31000));
        let requested = requested.map(|p| NodePort::new(p).unwrap());
        assert_eq!(plan_nodeport(&svc, requested), NodePortAction::Unchanged);
    }

    #[test]
    fn test_primary_service() {
        let names = vec![
            "vllm-agg-vllmdecodeworker".to_string(),
            "vllm-agg-frontend".to_string(),
        ];
        assert_eq!(primary_service(&names), Some("vllm-agg-frontend"));

        let names = vec!["zeta".to_string(), "alpha".to_string()];
        assert_eq!(primary_service(&names), Some("alpha"));
        assert_eq!(primary_service(&[]), None);
    }
}
