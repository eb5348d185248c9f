//! Engine entity: one installed analysis service and its container.

use serde::Serialize;
use tracing::debug;

use crate::config::EngineConfig;
use crate::runtime::RuntimeError;

/// An installed engine. Created only after its full install chain (pull,
/// create, start, boot hook) has succeeded; destroyed only by the manager.
#[derive(Debug, Clone)]
pub struct Engine {
    name: String,
    container_id: String,
    url: String,
    config: EngineConfig,
}

/// Wire shape of one entry in `GET /engines`.
#[derive(Debug, Serialize)]
pub struct EngineSummary {
    pub url: String,
    pub meta: serde_json::Value,
}

impl Engine {
    /// Wrap a started container as an engine. The URL is derived from the
    /// container's DNS name on the manager network and the configured port.
    pub fn new(
        name: impl Into<String>,
        container_id: impl Into<String>,
        container_name: impl Into<String>,
        config: EngineConfig,
    ) -> Self {
        let name = name.into();
        let url = format!("http://{}:{}", container_name.into(), config.port);
        Self {
            name,
            container_id: container_id.into(),
            url,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn meta(&self) -> &serde_json::Value {
        &self.config.meta
    }

    pub fn summary(&self) -> EngineSummary {
        EngineSummary {
            url: self.url.clone(),
            meta: self.config.meta.clone(),
        }
    }

    /// Role-specific boot hook, invoked once after the container has started.
    ///
    /// Engines initialize themselves and the restart policy covers crashes,
    /// so there is nothing to block on here today; the hook is the seam where
    /// a readiness probe would go.
    pub async fn start(&self) -> Result<(), RuntimeError> {
        debug!(
            engine = %self.name,
            container = %self.container_id,
            url = %self.url,
            "engine boot hook"
        );
        Ok(())
    }
}
