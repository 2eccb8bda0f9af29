// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Runs the cluster-facing code against a local axum server that answers the
//! handful of Kubernetes API paths it touches.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use dynkube_deploy::nodeport::{ExposedService, expose_services};
use dynkube_deploy::readiness::ReadinessWaiter;
use dynkube_deploy::{DeployError, DeployOptions, NodePort, WaitOutcome, cluster, deploy};
use dynkube_runtime::{CancellationToken, DeployConfig};
use regex::Regex;
use serde_json::{Value, json};

const SERVICES: &str = "/api/v1/namespaces/default/services/";
const PODS: &str = "/api/v1/namespaces/default/pods";
const SLICES: &str = "/apis/discovery.k8s.io/v1/namespaces/default/endpointslices";

#[derive(Default)]
struct FakeApi {
    services: Mutex<BTreeMap<String, Value>>,
    pods: Vec<Value>,
    fail_slices: bool,
    requests: Mutex<Vec<String>>,
    patches: Mutex<Vec<(String, Value)>>,
}

impl FakeApi {
    fn with_services(services: &[Value]) -> Self {
        let services = services
            .iter()
            .map(|svc| (svc["metadata"]["name"].as_str().unwrap().to_string(), svc.clone()))
            .collect();
        Self {
            services: Mutex::new(services),
            ..Default::default()
        }
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn patches(&self) -> Vec<(String, Value)> {
        self.patches.lock().unwrap().clone()
    }
}

fn status(code: StatusCode, reason: &str) -> Response {
    let body = json!({
        "apiVersion": "v1",
        "kind": "Status",
        "metadata": {},
        "status": "Failure",
        "message": reason,
        "reason": reason,
        "code": code.as_u16(),
    });
    (code, axum::Json(body)).into_response()
}

fn list(kind: &str, items: Vec<Value>) -> Response {
    axum::Json(json!({
        "apiVersion": "v1",
        "kind": kind,
        "metadata": { "resourceVersion": "1" },
        "items": items,
    }))
    .into_response()
}

/// RFC 7386 merge patch.
fn merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                if value.is_null() {
                    target.remove(key);
                } else {
                    merge(target.entry(key.clone()).or_insert(Value::Null), value);
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

/// Allocate node ports the way the API server does for NodePort services.
fn allocate_node_ports(service: &mut Value) {
    if service["spec"]["type"] != "NodePort" {
        return;
    }
    if let Some(ports) = service["spec"]["ports"].as_array_mut() {
        for (i, port) in ports.iter_mut().enumerate() {
            if port.get("nodePort").is_none() {
                port["nodePort"] = json!(31000 + i);
            }
        }
    }
}

async fn handle(State(api): State<Arc<FakeApi>>, method: Method, uri: Uri, body: Bytes) -> Response {
    let path = uri.path().to_string();
    let watch = uri.query().is_some_and(|q| q.contains("watch=true"));
    api.requests.lock().unwrap().push(format!(
        "{method} {}",
        uri.path_and_query().map(|pq| pq.as_str()).unwrap_or(&path)
    ));

    if watch {
        // nothing ever changes
        return std::future::pending().await;
    }
    if path == "/version" {
        return axum::Json(json!({
            "major": "1",
            "minor": "31",
            "gitVersion": "v1.31.0",
            "gitCommit": "abc",
            "gitTreeState": "clean",
            "buildDate": "2024-08-13T07:28:49Z",
            "goVersion": "go1.22.5",
            "compiler": "gc",
            "platform": "linux/amd64",
        }))
        .into_response();
    }
    if path == PODS && method == Method::GET {
        return list("PodList", api.pods.clone());
    }
    if path == SLICES && method == Method::GET {
        if api.fail_slices {
            return status(StatusCode::INTERNAL_SERVER_ERROR, "InternalError");
        }
        return list("EndpointSliceList", Vec::new());
    }
    if let Some(name) = path.strip_prefix(SERVICES) {
        let mut services = api.services.lock().unwrap();
        let Some(service) = services.get_mut(name) else {
            return status(StatusCode::NOT_FOUND, "NotFound");
        };
        if method == Method::PATCH {
            let patch: Value = serde_json::from_slice(&body).unwrap();
            merge(service, &patch);
            allocate_node_ports(service);
            api.patches.lock().unwrap().push((name.to_string(), patch));
        }
        return axum::Json(service.clone()).into_response();
    }
    status(StatusCode::NOT_FOUND, "NotFound")
}

async fn serve(api: FakeApi) -> (String, Arc<FakeApi>) {
    let api = Arc::new(api);
    let app = Router::new().fallback(handle).with_state(api.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), api)
}

fn client(base: &str) -> kube::Client {
    let config = kube::Config::new(base.parse().unwrap());
    kube::Client::try_from(config).unwrap()
}

fn service(name: &str, cluster_ip: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": { "name": name, "namespace": "default" },
        "spec": {
            "type": "ClusterIP",
            "clusterIP": cluster_ip,
            "ports": [{ "name": "http", "port": 8000, "targetPort": 8000, "protocol": "TCP" }],
        },
    })
}

fn ready_pod(name: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": { "name": name, "namespace": "default", "resourceVersion": "1" },
        "spec": { "containers": [{ "name": "main" }] },
        "status": {
            "phase": "Running",
            "containerStatuses": [{
                "name": "main",
                "ready": true,
                "restartCount": 0,
                "image": "nvcr.io/nvidia/ai-dynamo/vllm-runtime:0.6.1",
                "imageID": "",
            }],
        },
    })
}

fn names(services: &[&str]) -> Vec<String> {
    services.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_expose_sends_merge_patches() {
    let (base, api) = serve(FakeApi::with_services(&[
        service("vllm-agg-frontend", "10.96.0.10"),
        service("vllm-agg-worker", "10.96.0.11"),
        service("vllm-agg-worker-headless", "None"),
    ]))
    .await;
    let client = client(&base);
    let services = names(&["vllm-agg-worker", "vllm-agg-frontend", "vllm-agg-worker-headless"]);

    let exposed = expose_services(&client, "default", &services, Some(NodePort::new(30080).unwrap()))
        .await
        .unwrap();
    assert_eq!(
        exposed,
        [
            ExposedService {
                name: "vllm-agg-worker".into(),
                node_ports: vec![31000],
                changed: true,
            },
            ExposedService {
                name: "vllm-agg-frontend".into(),
                node_ports: vec![30080],
                changed: true,
            },
        ]
    );

    let patches = api.patches();
    assert_eq!(patches.len(), 2, "headless service must not be patched");
    assert_eq!(patches[0], ("vllm-agg-worker".to_string(), json!({ "spec": { "type": "NodePort" } })));
    assert_eq!(patches[1].0, "vllm-agg-frontend");
    assert_eq!(patches[1].1["spec"]["type"], "NodePort");
    assert_eq!(
        patches[1].1["spec"]["ports"],
        json!([{ "name": "http", "port": 8000, "targetPort": 8000, "protocol": "TCP", "nodePort": 30080 }])
    );
}

#[tokio::test]
async fn test_expose_twice_patches_once() {
    let (base, api) = serve(FakeApi::with_services(&[service("vllm-agg-frontend", "10.96.0.10")])).await;
    let client = client(&base);
    let services = names(&["vllm-agg-frontend"]);
    let port = Some(NodePort::new(30080).unwrap());

    expose_services(&client, "default", &services, port).await.unwrap();
    let again = expose_services(&client, "default", &services, port).await.unwrap();
    assert!(!again[0].changed);
    assert_eq!(again[0].node_ports, [30080]);
    assert_eq!(api.patches().len(), 1);
}

#[tokio::test]
async fn test_expose_skips_missing_service() {
    let (base, api) = serve(FakeApi::default()).await;
    let exposed = expose_services(&client(&base), "default", &names(&["gone"]), None)
        .await
        .unwrap();
    assert!(exposed.is_empty());
    assert!(api.patches().is_empty());
}

#[tokio::test]
async fn test_invalid_nodeport_never_reaches_cluster() {
    let (base, api) = serve(FakeApi::with_services(&[service("svc", "10.96.0.10")])).await;
    let dir = tempfile::tempdir().unwrap();
    let kubeconfig = dir.path().join("config");
    std::fs::write(
        &kubeconfig,
        format!(
            "apiVersion: v1\nkind: Config\ncurrent-context: fake\n\
             clusters:\n- name: fake\n  cluster:\n    server: {base}\n\
             contexts:\n- name: fake\n  context:\n    cluster: fake\n    user: fake\n\
             users:\n- name: fake\n  user: {{}}\n"
        ),
    )
    .unwrap();
    let manifest = dir.path().join("svc.yaml");
    std::fs::write(&manifest, "apiVersion: v1\nkind: Service\nmetadata:\n  name: svc\n").unwrap();

    temp_env::async_with_vars([("KUBECONFIG", Some(kubeconfig.as_os_str()))], async {
        let opts = DeployOptions {
            manifest: manifest.clone(),
            nodeport: Some(8080),
            ..Default::default()
        };
        let err = deploy(&DeployConfig::default(), &opts, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::InvalidNodePort(8080)));
        assert!(api.requests().is_empty(), "{:?}", api.requests());

        // the same kubeconfig does reach the server
        cluster::connect().await.unwrap();
        assert_eq!(api.requests(), ["GET /version"]);
    })
    .await;
    assert!(api.patches().is_empty());
}

#[tokio::test]
async fn test_pod_wait_ready() {
    let (base, _) = serve(FakeApi {
        pods: vec![ready_pod("vllm-agg-frontend-7d9c")],
        ..Default::default()
    })
    .await;
    let waiter = ReadinessWaiter::new(client(&base), CancellationToken::new());
    let pattern = Regex::new("^vllm-agg-frontend-").unwrap();
    let outcome = waiter
        .wait_pod_ready("default", &pattern, Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(outcome, WaitOutcome::Ready);
}

#[tokio::test]
async fn test_pod_wait_times_out_and_dumps_pods() {
    let (base, api) = serve(FakeApi {
        pods: vec![ready_pod("other-0")],
        ..Default::default()
    })
    .await;
    let waiter = ReadinessWaiter::new(client(&base), CancellationToken::new());
    let pattern = Regex::new("^vllm-agg-frontend-").unwrap();
    let outcome = waiter
        .wait_pod_ready("default", &pattern, Duration::from_millis(300))
        .await
        .unwrap();
    assert_eq!(outcome, WaitOutcome::TimedOut);

    let requests = api.requests();
    assert!(requests.iter().any(|r| r.contains("watch=true")), "{requests:?}");
    let last = requests.last().unwrap();
    assert!(last.starts_with(&format!("GET {PODS}")), "{last}");
    assert!(!last.contains("watch=true"), "{last}");
}

#[tokio::test]
async fn test_wait_cancelled() {
    let (base, _) = serve(FakeApi::default()).await;
    let cancel = CancellationToken::new();
    let waiter = ReadinessWaiter::new(client(&base), cancel.clone());
    cancel.cancel();
    let pattern = Regex::new("^never-").unwrap();
    let outcome = waiter
        .wait_pod_ready("default", &pattern, Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(outcome, WaitOutcome::Cancelled);
}

#[tokio::test]
async fn test_endpoint_wait_survives_list_failure() {
    let (base, api) = serve(FakeApi {
        fail_slices: true,
        ..Default::default()
    })
    .await;
    let waiter = ReadinessWaiter::new(client(&base), CancellationToken::new());
    let outcome = waiter
        .wait_endpoints("default", "vllm-agg-frontend", Duration::from_millis(300))
        .await
        .unwrap();
    assert_eq!(outcome, WaitOutcome::TimedOut);
    assert!(api.requests().iter().any(|r| r.starts_with(&format!("GET {SLICES}"))));
}
