//! Black-box tests for the request dispatcher's HTTP surface.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use lintdock::config::EngineConfig;
use lintdock::engine::Engine;
use lintdock::error::Error;
use lintdock::pipeline::{
    AnalysisOutput, AnalysisPipeline, AnalysisRequest, EngineStatus, Warning,
};
use lintdock::server::{build_router, NO_LINTERS_RULE_ID, NO_LINTER_WARNINGS_RULE_ID};

/// Pipeline double: counts invocations, returns canned statuses and output.
struct StubPipeline {
    calls: AtomicUsize,
    statuses: Vec<EngineStatus>,
    response: Result<AnalysisOutput, String>,
}

impl StubPipeline {
    fn succeeding(statuses: Vec<EngineStatus>, output: AnalysisOutput) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            statuses,
            response: Ok(output),
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            statuses: Vec::new(),
            response: Err(message.to_string()),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisPipeline for StubPipeline {
    async fn analyze_file(
        &self,
        _request: &AnalysisRequest,
        statuses: &mut Vec<EngineStatus>,
    ) -> Result<AnalysisOutput, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        statuses.extend(self.statuses.iter().cloned());
        match &self.response {
            Ok(output) => Ok(output.clone()),
            Err(message) => Err(Error::Pipeline(message.clone())),
        }
    }
}

fn engine(name: &str, meta: Value) -> Engine {
    Engine::new(
        name,
        format!("{}-container", name),
        format!("host-{}", name),
        EngineConfig {
            image: format!("lintdock/{}:latest", name),
            meta,
            ..Default::default()
        },
    )
}

fn router_with(
    engines: Vec<Engine>,
    pipeline: Arc<dyn AnalysisPipeline>,
) -> axum::Router {
    let engines: HashMap<String, Engine> = engines
        .into_iter()
        .map(|engine| (engine.name().to_string(), engine))
        .collect();
    build_router(&engines, None, pipeline)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_file(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/file")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn version_reports_service_and_api() {
    let router = router_with(vec![], Arc::new(StubPipeline::succeeding(vec![], AnalysisOutput::default())));

    let response = router
        .oneshot(Request::builder().uri("/version").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["service"], json!(lintdock::VERSION));
    assert_eq!(body["api"], json!("v1"));
}

#[tokio::test]
async fn engines_lists_url_and_meta() {
    let router = router_with(
        vec![engine("eslint", json!({ "languages": ["javascript"] }))],
        Arc::new(StubPipeline::succeeding(vec![], AnalysisOutput::default())),
    );

    let response = router
        .oneshot(Request::builder().uri("/engines").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["eslint"]["url"], json!("http://host-eslint:80"));
    assert_eq!(body["eslint"]["meta"]["languages"], json!(["javascript"]));
}

#[tokio::test]
async fn file_without_language_is_rejected_before_the_pipeline() {
    let pipeline = Arc::new(StubPipeline::succeeding(vec![], AnalysisOutput::default()));
    let router = router_with(vec![], pipeline.clone());

    let response = router
        .oneshot(post_file(json!({ "hostPath": "/src/a.js" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(pipeline.calls(), 0);
}

#[tokio::test]
async fn file_with_empty_language_is_rejected_before_the_pipeline() {
    let pipeline = Arc::new(StubPipeline::succeeding(vec![], AnalysisOutput::default()));
    let router = router_with(vec![], pipeline.clone());

    let response = router
        .oneshot(post_file(json!({ "language": "  " })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(pipeline.calls(), 0);
}

#[tokio::test]
async fn unchecked_file_gets_a_single_informational_warning() {
    // The pipeline answered, but nobody claimed to have checked the code and
    // an engine still emitted the all-clear marker.
    let output = AnalysisOutput {
        warnings: Some(vec![Warning {
            kind: "Info".to_string(),
            rule_id: NO_LINTER_WARNINGS_RULE_ID.to_string(),
            message: "all clear".to_string(),
            file_path: None,
        }]),
        extra: Default::default(),
    };
    let statuses = vec![EngineStatus {
        engine: "eslint".to_string(),
        code_checked: false,
    }];
    let router = router_with(vec![], Arc::new(StubPipeline::succeeding(statuses, output)));

    let response = router
        .oneshot(post_file(json!({ "language": "cobol", "hostPath": "/src/x.cbl" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let warnings = body["warnings"].as_array().unwrap();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0]["ruleId"], json!(NO_LINTERS_RULE_ID));
    assert_eq!(warnings[0]["type"], json!("Info"));
    assert!(warnings[0]["message"]
        .as_str()
        .unwrap()
        .contains("[cobol]"));
    assert_eq!(warnings[0]["filePath"], json!("/src/x.cbl"));
}

#[tokio::test]
async fn checked_file_passes_warnings_through_untouched() {
    let output = AnalysisOutput {
        warnings: Some(vec![Warning {
            kind: "Error".to_string(),
            rule_id: "no-undef".to_string(),
            message: "x is not defined".to_string(),
            file_path: Some("/src/a.js".to_string()),
        }]),
        extra: Default::default(),
    };
    let statuses = vec![EngineStatus {
        engine: "eslint".to_string(),
        code_checked: true,
    }];
    let router = router_with(vec![], Arc::new(StubPipeline::succeeding(statuses, output)));

    let response = router
        .oneshot(post_file(json!({ "language": "javascript" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let warnings = body["warnings"].as_array().unwrap();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0]["ruleId"], json!("no-undef"));
}

#[tokio::test]
async fn pipeline_result_without_warnings_gains_an_empty_or_synthetic_list() {
    let statuses = vec![EngineStatus {
        engine: "eslint".to_string(),
        code_checked: true,
    }];
    let router = router_with(
        vec![],
        Arc::new(StubPipeline::succeeding(statuses, AnalysisOutput::default())),
    );

    let response = router
        .oneshot(post_file(json!({ "language": "javascript" })))
        .await
        .unwrap();

    let body = body_json(response).await;
    assert_eq!(body["warnings"], json!([]));
}

#[tokio::test]
async fn pipeline_failure_surfaces_as_server_error() {
    let router = router_with(vec![], Arc::new(StubPipeline::failing("engine unreachable")));

    let response = router
        .oneshot(post_file(json!({ "language": "javascript" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("engine unreachable"));
}

/// Stub engine: answers every request with the path it saw.
async fn spawn_echo_engine() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let app = axum::Router::new().fallback(|request: Request<Body>| async move {
        request.uri().path().to_string()
    });
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}

fn engine_at(name: &str, port: u16) -> Engine {
    Engine::new(
        name,
        format!("{}-container", name),
        "127.0.0.1",
        EngineConfig {
            image: format!("lintdock/{}:latest", name),
            port,
            ..Default::default()
        },
    )
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn engine_route_strips_prefix_and_forwards() {
    let port = spawn_echo_engine().await;
    let router = router_with(
        vec![engine_at("eslint", port)],
        Arc::new(StubPipeline::succeeding(vec![], AnalysisOutput::default())),
    );

    let response = router
        .oneshot(
            Request::builder()
                .uri("/engine/eslint/lint/run")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "/lint/run");
}

#[tokio::test]
async fn unmatched_path_reaches_the_ui_engine() {
    let port = spawn_echo_engine().await;
    let ui = engine_at("ui", port);
    let router = build_router(
        &HashMap::new(),
        Some(&ui),
        Arc::new(StubPipeline::succeeding(vec![], AnalysisOutput::default())),
    );

    let response = router
        .oneshot(
            Request::builder()
                .uri("/dashboard/settings")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "/dashboard/settings");
}

#[tokio::test]
async fn unmatched_path_is_404_without_a_ui_engine() {
    let router = router_with(vec![], Arc::new(StubPipeline::succeeding(vec![], AnalysisOutput::default())));

    let response = router
        .oneshot(Request::builder().uri("/nowhere").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
