// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use k8s_openapi::api::{apps::v1::Deployment, core::v1::Service};
use kube::{
    Api, Client, Resource,
    api::{ListParams, ObjectList},
};

/// Read-only view of the workloads in a namespace. Resolvers only need
/// names, so this is the seam between them and the API server.
#[async_trait]
pub trait ClusterInventory: Send + Sync {
    async fn deployments(&self, namespace: &str, selector: Option<&str>) -> Result<Vec<String>>;

    async fn services(&self, namespace: &str, selector: Option<&str>) -> Result<Vec<String>>;
}

fn names<K: Resource>(list: ObjectList<K>) -> Vec<String>
where
    K: Clone,
{
    let mut names: Vec<String> = list
        .items
        .iter()
        .filter_map(|obj| obj.meta().name.clone())
        .collect();
    names.sort();
    names
}

fn list_params(selector: Option<&str>) -> ListParams {
    match selector {
        Some(selector) => ListParams::default().labels(selector),
        None => ListParams::default(),
    }
}

/// Inventory backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeInventory {
    client: Client,
}

impl KubeInventory {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterInventory for KubeInventory {
    async fn deployments(&self, namespace: &str, selector: Option<&str>) -> Result<Vec<String>> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        Ok(names(api.list(&list_params(selector)).await?))
    }

    async fn services(&self, namespace: &str, selector: Option<&str>) -> Result<Vec<String>> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        Ok(names(api.list(&list_params(selector)).await?))
    }
}

/// A labelled workload held by [`StaticInventory`].
#[derive(Debug, Clone, Default)]
pub struct StaticObject {
    pub name: String,
    pub labels: Vec<(String, String)>,
}

impl StaticObject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: Vec::new(),
        }
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }

    /// Equality-based selectors only (`k=v,k2=v2`).
    fn matches(&self, selector: Option<&str>) -> bool {
        let Some(selector) = selector else {
            return true;
        };
        selector
            .split(',')
            .filter_map(|term| term.split_once('='))
            .all(|(key, value)| {
                self.labels
                    .iter()
                    .any(|(k, v)| k == key.trim() && v == value.trim())
            })
    }
}

#[derive(Debug, Default)]
struct StaticState {
    deployments: Vec<StaticObject>,
    services: Vec<StaticObject>,
    lists: usize,
}

/// In-memory inventory for tests and dry runs. Clones share state, so a
/// test can add objects while a resolver is polling.
#[derive(Debug, Clone, Default)]
pub struct StaticInventory {
    state: Arc<Mutex<StaticState>>,
}

impl StaticInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deployment(self, obj: StaticObject) -> Self {
        self.add_deployment(obj);
        self
    }

    pub fn with_service(self, obj: StaticObject) -> Self {
        self.add_service(obj);
        self
    }

    pub fn add_deployment(&self, obj: StaticObject) {
        if let Ok(mut state) = self.state.lock() {
            state.deployments.push(obj);
        }
    }

    pub fn add_service(&self, obj: StaticObject) {
        if let Ok(mut state) = self.state.lock() {
            state.services.push(obj);
        }
    }

    /// Number of list calls served so far.
    pub fn list_calls(&self) -> usize {
        self.state.lock().map(|state| state.lists).unwrap_or_default()
    }

    fn select(&self, services: bool, selector: Option<&str>) -> Vec<String> {
        let Ok(mut state) = self.state.lock() else {
            return Vec::new();
        };
        state.lists += 1;
        let objects = if services {
            &state.services
        } else {
            &state.deployments
        };
        let mut names: Vec<String> = objects
            .iter()
            .filter(|obj| obj.matches(selector))
            .map(|obj| obj.name.clone())
            .collect();
        names.sort();
        names
    }
}

#[async_trait]
impl ClusterInventory for StaticInventory {
    async fn deployments(&self, _namespace: &str, selector: Option<&str>) -> Result<Vec<String>> {
        Ok(self.select(false, selector))
    }

    async fn services(&self, _namespace: &str, selector: Option<&str>) -> Result<Vec<String>> {
        Ok(self.select(true, selector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_inventory_selectors() {
        let inventory = StaticInventory::new()
            .with_deployment(StaticObject::new("b").label("app", "x").label("tier", "web"))
            .with_deployment(StaticObject::new("a").label("app", "x"))
            .with_service(StaticObject::new("svc"));

        assert_eq!(inventory.deployments("ns", None).await.unwrap(), ["a", "b"]);
        assert_eq!(
            inventory.deployments("ns", Some("app=x,tier=web")).await.unwrap(),
            ["b"]
        );
        assert!(inventory.services("ns", Some("app=x")).await.unwrap().is_empty());
        assert_eq!(inventory.list_calls(), 3);
    }
}
