//! Error taxonomy for the engine manager and dispatcher.
//!
//! Startup errors (`Provisioning`, `Teardown`, `Install`) are fatal to
//! `EngineManager::start` and are never retried internally; an external
//! supervisor restarts the whole process, which is safe because discovery and
//! teardown are idempotent. `Validation` and `Pipeline` are per-request and
//! never affect manager state.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::runtime::RuntimeError;

/// Errors surfaced by the manager, the dispatcher and the pipeline boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// A required request field is missing or empty. Maps to 400; the
    /// pipeline is never invoked for these.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Network, volume or own-container discovery failed during startup.
    #[error("failed to provision {resource}: {source}")]
    Provisioning {
        resource: &'static str,
        source: RuntimeError,
    },

    /// Stop/wait/delete failed for a stale container during crash recovery.
    #[error("failed to tear down container {container}: {source}")]
    Teardown {
        container: String,
        source: RuntimeError,
    },

    /// Image pull or container create/start failed for an engine. Fails the
    /// whole install batch; siblings already created are not rolled back.
    #[error("failed to install engine {engine}: {source}")]
    Install {
        engine: String,
        source: RuntimeError,
    },

    /// The analysis pipeline rejected a request. Isolated to that request.
    #[error("analysis pipeline failed: {0}")]
    Pipeline(String),
}

impl Error {
    fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
