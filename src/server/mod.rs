//! Request dispatcher: the HTTP surface built once from the engine snapshot.
//!
//! Routes:
//! - `GET /version` — service and api identifiers
//! - `GET /engines` — name → {url, meta}
//! - `POST /file` — merged analysis result (§ pipeline contract below)
//! - `/engine/<name>/*` — reverse proxy to that engine, prefix stripped,
//!   protocol upgrades passed through
//! - `/*` — catch-all proxy to the UI engine, if one is configured
//!
//! The route table is immutable after construction. Changing the engine set
//! requires restarting the manager and rebuilding the router; nothing here
//! is patched in place.

pub mod proxy;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::{error, info};

use crate::engine::{Engine, EngineSummary};
use crate::error::Error;
use crate::pipeline::{AnalysisPipeline, AnalysisOutput, AnalysisRequest, Warning};
use crate::VERSION;

/// Fixed API identifier reported by `GET /version`.
pub const API_VERSION: &str = "v1";

/// Rule id of the synthetic warning appended when no engine checked the
/// file. Spaces are part of the id so it cannot be disabled.
pub const NO_LINTERS_RULE_ID: &str = " lintdock-no-linters-defined ";

/// Marker warning some engines emit to say "checked, nothing found". It is
/// stripped when the file was never actually checked.
pub const NO_LINTER_WARNINGS_RULE_ID: &str = " lintdock-no-linter-warnings ";

#[derive(Clone)]
struct AppState {
    engines: Arc<HashMap<String, EngineSummary>>,
    pipeline: Arc<dyn AnalysisPipeline>,
}

/// Build the route table from the engine-collection snapshot. Called exactly
/// once, after the manager reaches its running state.
pub fn build_router(
    engines: &HashMap<String, Engine>,
    ui_engine: Option<&Engine>,
    pipeline: Arc<dyn AnalysisPipeline>,
) -> Router {
    let summaries: HashMap<String, EngineSummary> = engines
        .iter()
        .map(|(name, engine)| (name.clone(), engine.summary()))
        .collect();
    let state = AppState {
        engines: Arc::new(summaries),
        pipeline,
    };

    let mut router = Router::new()
        .route("/version", get(version))
        .route("/engines", get(list_engines))
        .route("/file", post(analyze_file))
        .with_state(state);

    let client = proxy::client();
    for engine in engines.values() {
        let path = format!("/engine/{}", engine.name());
        info!(engine = engine.name(), url = engine.url(), path = %path, "routing engine");
        router = router.nest_service(&path, proxy::proxy_to(client.clone(), engine.url()));
    }

    if let Some(ui) = ui_engine {
        info!(url = ui.url(), "routing unmatched traffic to ui engine");
        router = router.fallback_service(proxy::proxy_to(client, ui.url()));
    }

    router
}

async fn version() -> Json<serde_json::Value> {
    Json(json!({ "service": VERSION, "api": API_VERSION }))
}

async fn list_engines(State(state): State<AppState>) -> Json<serde_json::Value> {
    // BTreeMap for a stable listing.
    let engines: BTreeMap<&String, &EngineSummary> = state.engines.iter().collect();
    Json(json!(engines))
}

/// `POST /file`: validate, delegate to the pipeline, post-process.
///
/// The post-processing guarantees a warnings list and, when no consulted
/// engine reported checking the code, appends an informational warning and
/// strips any stale "nothing to report" marker.
async fn analyze_file(
    State(state): State<AppState>,
    Json(request): Json<AnalysisRequest>,
) -> Result<Json<AnalysisOutput>, Error> {
    if request.language.trim().is_empty() {
        return Err(Error::Validation("language is required".to_string()));
    }

    let mut statuses = Vec::new();
    let mut output = match state.pipeline.analyze_file(&request, &mut statuses).await {
        Ok(output) => output,
        Err(err) => {
            error!(error = %err, "file analysis failed");
            return Err(err);
        }
    };

    let warnings = output.warnings.get_or_insert_with(Vec::new);
    if !statuses.iter().any(|status| status.code_checked) {
        warnings.push(Warning {
            kind: "Info".to_string(),
            rule_id: NO_LINTERS_RULE_ID.to_string(),
            message: format!(
                "No engine registered for [{}]. This file has not been checked \
                 for language-specific warnings.",
                request.language
            ),
            file_path: request.host_path.clone(),
        });
        // The all-clear marker only means something if somebody checked.
        warnings.retain(|warning| warning.rule_id != NO_LINTER_WARNINGS_RULE_ID);
    }

    Ok(Json(output))
}
