use serde_json::{Value, json};
use sluice_client::ControlPlaneClient;
use sluice_controller::repository::{ApiPipelineResolver, ApiRunRepository};
use sluice_controller::validation::KindRegistry;
use sluice_controller::{
    ReconcileOutcome, Reconciler, ReferenceValidator, ValidationError,
};
use sluice_core::clock::SystemClock;
use sluice_core::config::Defaults;
use sluice_core::domain::{DynamicObject, NamespacedName};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TASKS_PATH: &str = "/apis/tekton.dev/v1beta1/namespaces/default/tasks";

fn v1beta1_task() -> DynamicObject {
    serde_json::from_value(json!({
        "apiVersion": "tekton.dev/v1beta1",
        "kind": "Task",
        "metadata": { "name": "lint", "namespace": "catalog" },
        "spec": { "steps": [{ "name": "run", "image": "alpine" }] }
    }))
    .unwrap()
}

fn validator(client: &ControlPlaneClient) -> ReferenceValidator {
    ReferenceValidator::new(KindRegistry::with_default_routes(client))
}

async fn reject_with(server: &MockServer, status: u16, reason: &str) {
    Mock::given(method("POST"))
        .and(path(TASKS_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({
            "kind": "Status",
            "status": "Failure",
            "message": "admission webhook denied the request",
            "reason": reason,
            "code": status
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_dry_run_success_returns_defaulted_object() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TASKS_PATH))
        .and(query_param("dryRun", "All"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "apiVersion": "tekton.dev/v1beta1",
            "kind": "Task",
            "metadata": { "name": "3f1c", "namespace": "default" },
            "spec": { "steps": [{ "name": "run", "image": "alpine", "computeResources": {} }] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ControlPlaneClient::new(server.uri());
    let admitted = validator(&client)
        .dry_run_validate(&CancellationToken::new(), "default", &v1beta1_task())
        .await
        .unwrap();

    assert_eq!(admitted.metadata.name, "lint");
    assert_eq!(admitted.metadata.namespace, "catalog");
    assert!(admitted.spec().unwrap()["steps"][0].get("computeResources").is_some());

    let requests = server.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_ne!(sent["metadata"]["name"], "lint");
    assert_eq!(sent["metadata"]["namespace"], "default");
}

#[tokio::test]
async fn test_dry_run_error_classes() {
    let cases: [(u16, &str, fn(&ValidationError) -> bool); 6] = [
        (400, "BadRequest", ValidationError::is_validation_failed),
        (422, "Invalid", ValidationError::is_permanent),
        (405, "MethodNotAllowed", ValidationError::is_permanent),
        (504, "Timeout", ValidationError::is_retryable),
        (500, "ServerTimeout", ValidationError::is_retryable),
        (429, "TooManyRequests", ValidationError::is_retryable),
    ];

    for (status, reason, check) in cases {
        let server = MockServer::start().await;
        reject_with(&server, status, reason).await;

        let client = ControlPlaneClient::new(server.uri());
        let err = validator(&client)
            .dry_run_validate(&CancellationToken::new(), "default", &v1beta1_task())
            .await
            .unwrap_err();
        assert!(check(&err), "{} {} classified as {:?}", status, reason, err);
    }
}

#[tokio::test]
async fn test_dry_run_internal_error_is_opaque() {
    let server = MockServer::start().await;
    reject_with(&server, 500, "InternalError").await;

    let client = ControlPlaneClient::new(server.uri());
    let err = validator(&client)
        .dry_run_validate(&CancellationToken::new(), "default", &v1beta1_task())
        .await
        .unwrap_err();

    assert!(matches!(err, ValidationError::Other(_)));
}

#[tokio::test]
async fn test_transport_timeout_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_millis(100))
        .build()
        .unwrap();
    let client = ControlPlaneClient::with_client(server.uri(), http);
    let err = validator(&client)
        .dry_run_validate(&CancellationToken::new(), "default", &v1beta1_task())
        .await
        .unwrap_err();

    assert!(err.is_retryable(), "got {:?}", err);
}

#[tokio::test]
async fn test_reconcile_through_api() {
    let server = MockServer::start().await;
    let run_path = "/apis/tekton.dev/v1/namespaces/ci/pipelineruns/pr-1";

    Mock::given(method("GET"))
        .and(path(run_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "apiVersion": "tekton.dev/v1",
            "kind": "PipelineRun",
            "metadata": { "name": "pr-1", "namespace": "ci" },
            "spec": {
                "pipelineRef": { "name": "build" },
                "taskRunTemplate": { "serviceAccountName": "builder" }
            },
            "status": {
                "childReferences": [{ "name": "pr-1-compile", "pipelineTaskName": "compile" }]
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/apis/tekton.dev/v1/namespaces/ci/pipelines/build"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "apiVersion": "tekton.dev/v1",
            "kind": "Pipeline",
            "metadata": { "name": "build", "namespace": "ci" },
            "spec": { "tasks": [{ "name": "compile" }] }
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("{}/status", run_path)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "metadata": { "name": "pr-1", "namespace": "ci" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ControlPlaneClient::new(server.uri());
    let reconciler = Reconciler::new(
        Arc::new(ApiRunRepository::new(client.clone())),
        Arc::new(ApiPipelineResolver::new(client.clone())),
        validator(&client),
        Defaults::default(),
        Arc::new(SystemClock),
    );

    let outcome = reconciler
        .reconcile(&CancellationToken::new(), &NamespacedName::new("ci", "pr-1"))
        .await
        .unwrap();

    let ReconcileOutcome::Running { plan, .. } = outcome else {
        panic!("expected a running outcome");
    };
    assert_eq!(plan.tasks.len(), 1);
    assert_eq!(plan.tasks[0].service_account_name, "builder");

    let requests = server.received_requests().await.unwrap();
    let put = requests
        .iter()
        .find(|r| r.method.as_str() == "PUT")
        .unwrap();
    let body: Value = serde_json::from_slice(&put.body).unwrap();
    let condition = &body["status"]["conditions"][0];
    assert_eq!(condition["type"], "Succeeded");
    assert_eq!(condition["status"], "Unknown");
    assert_eq!(condition["reason"], "Running");
    assert!(body["status"]["startTime"].is_string());
    assert_eq!(body["status"]["childReferences"][0]["name"], "pr-1-compile");
}

fn api_reconciler(client: &ControlPlaneClient) -> Reconciler {
    Reconciler::new(
        Arc::new(ApiRunRepository::new(client.clone())),
        Arc::new(ApiPipelineResolver::new(client.clone())),
        validator(client),
        Defaults::default(),
        Arc::new(SystemClock),
    )
}

async fn mount_run(server: &MockServer, spec: Value) {
    Mock::given(method("GET"))
        .and(path("/apis/tekton.dev/v1/namespaces/ci/pipelineruns/pr-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "apiVersion": "tekton.dev/v1",
            "kind": "PipelineRun",
            "metadata": { "name": "pr-1", "namespace": "ci" },
            "spec": spec
        })))
        .mount(server)
        .await;
}

async fn last_status_write(server: &MockServer) -> Value {
    let requests = server.received_requests().await.unwrap();
    let put = requests
        .iter()
        .rev()
        .find(|r| r.method.as_str() == "PUT")
        .unwrap();
    serde_json::from_slice(&put.body).unwrap()
}

#[tokio::test]
async fn test_unavailable_api_during_resolution_is_retried() {
    let server = MockServer::start().await;
    mount_run(&server, json!({ "pipelineRef": { "name": "build" } })).await;
    Mock::given(method("GET"))
        .and(path("/apis/tekton.dev/v1/namespaces/ci/pipelines/build"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "kind": "Status",
            "status": "Failure",
            "message": "etcd leader changed",
            "reason": "ServiceUnavailable",
            "code": 503
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let client = ControlPlaneClient::new(server.uri());
    let err = api_reconciler(&client)
        .reconcile(&CancellationToken::new(), &NamespacedName::new("ci", "pr-1"))
        .await
        .unwrap_err();

    assert!(err.is_retryable(), "got {:?}", err);
    assert!(format!("{:#}", err).contains("etcd leader changed"));

    let body = last_status_write(&server).await;
    let condition = &body["status"]["conditions"][0];
    assert_eq!(condition["status"], "Unknown");
    assert!(!condition["message"].as_str().unwrap_or_default().contains("[User error]"));
}

#[tokio::test]
async fn test_cluster_resolver_pipeline_is_dry_run_validated() {
    let server = MockServer::start().await;
    mount_run(
        &server,
        json!({
            "pipelineRef": {
                "resolver": "cluster",
                "params": [
                    { "name": "kind", "value": "pipeline" },
                    { "name": "name", "value": "build" },
                    { "name": "namespace", "value": "shared" }
                ]
            }
        }),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/apis/tekton.dev/v1/namespaces/shared/pipelines/build"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "apiVersion": "tekton.dev/v1",
            "kind": "Pipeline",
            "metadata": { "name": "build", "namespace": "shared", "generation": 2 },
            "spec": { "tasks": [{ "name": "compile" }, { "name": "unit" }] }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/apis/tekton.dev/v1/namespaces/ci/pipelines"))
        .and(query_param("dryRun", "All"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "apiVersion": "tekton.dev/v1",
            "kind": "Pipeline",
            "metadata": { "name": "generated", "namespace": "ci" },
            "spec": { "tasks": [{ "name": "compile" }, { "name": "unit" }] }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let client = ControlPlaneClient::new(server.uri());
    let outcome = api_reconciler(&client)
        .reconcile(&CancellationToken::new(), &NamespacedName::new("ci", "pr-1"))
        .await
        .unwrap();

    let ReconcileOutcome::Running { plan, .. } = outcome else {
        panic!("expected a running outcome");
    };
    assert_eq!(plan.tasks.len(), 2);

    let requests = server.received_requests().await.unwrap();
    let post = requests
        .iter()
        .find(|r| r.method.as_str() == "POST")
        .unwrap();
    let sent: Value = serde_json::from_slice(&post.body).unwrap();
    assert!(sent["metadata"].get("generation").is_none());
}

#[tokio::test]
async fn test_reconcile_missing_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "reason": "NotFound",
            "message": "not found",
            "code": 404
        })))
        .mount(&server)
        .await;

    let client = ControlPlaneClient::new(server.uri());
    let reconciler = Reconciler::new(
        Arc::new(ApiRunRepository::new(client.clone())),
        Arc::new(ApiPipelineResolver::new(client.clone())),
        validator(&client),
        Defaults::default(),
        Arc::new(SystemClock),
    );

    let outcome = reconciler
        .reconcile(&CancellationToken::new(), &NamespacedName::new("ci", "gone"))
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::NotFound);
}
