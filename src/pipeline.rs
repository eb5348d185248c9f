//! Analysis-pipeline boundary.
//!
//! The dispatcher owns the pre/post-processing contract around file
//! analysis; the fan-out itself sits behind [`AnalysisPipeline`] so it can be
//! swapped out in tests. [`HttpPipeline`] is the production implementation:
//! it forwards the request to every engine that declares the file's language
//! and merges their findings.

use async_trait::async_trait;
use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::Engine;
use crate::error::Error;

/// A single finding, in the wire shape engines emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub rule_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

/// Body of `POST /file`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub host_path: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub context: serde_json::Value,
}

/// Merged analysis result. Extra top-level fields engines produce are kept
/// and passed through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<Warning>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Per-engine record of whether it actually checked the code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    pub engine: String,
    pub code_checked: bool,
}

/// Fans a file-analysis request out to capable engines and merges findings.
/// Status records for every consulted engine land in `statuses`.
#[async_trait]
pub trait AnalysisPipeline: Send + Sync {
    async fn analyze_file(
        &self,
        request: &AnalysisRequest,
        statuses: &mut Vec<EngineStatus>,
    ) -> Result<AnalysisOutput, Error>;
}

/// What an engine answers to `POST /file`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EngineResponse {
    #[serde(default)]
    warnings: Vec<Warning>,
    #[serde(default)]
    code_checked: bool,
}

/// HTTP fan-out over the engine collection snapshot taken at startup.
pub struct HttpPipeline {
    engines: Vec<Engine>,
    client: reqwest::Client,
}

impl HttpPipeline {
    pub fn new(engines: Vec<Engine>) -> Self {
        Self {
            engines,
            client: reqwest::Client::new(),
        }
    }

    /// Engines that declare the language in `meta.languages`.
    fn engines_for(&self, language: &str) -> Vec<&Engine> {
        self.engines
            .iter()
            .filter(|engine| {
                engine
                    .meta()
                    .get("languages")
                    .and_then(|languages| languages.as_array())
                    .map(|languages| {
                        languages
                            .iter()
                            .filter_map(|value| value.as_str())
                            .any(|declared| declared.eq_ignore_ascii_case(language))
                    })
                    .unwrap_or(false)
            })
            .collect()
    }

    async fn consult(
        &self,
        engine: &Engine,
        request: &AnalysisRequest,
    ) -> Result<(String, EngineResponse), Error> {
        let url = format!("{}/file", engine.url());
        debug!(engine = engine.name(), url = %url, "consulting engine");
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| Error::Pipeline(err.to_string()))?;
        let parsed: EngineResponse = response
            .json()
            .await
            .map_err(|err| Error::Pipeline(err.to_string()))?;
        Ok((engine.name().to_string(), parsed))
    }
}

#[async_trait]
impl AnalysisPipeline for HttpPipeline {
    async fn analyze_file(
        &self,
        request: &AnalysisRequest,
        statuses: &mut Vec<EngineStatus>,
    ) -> Result<AnalysisOutput, Error> {
        let consulted = self.engines_for(&request.language);
        if consulted.is_empty() {
            return Ok(AnalysisOutput::default());
        }

        let responses = try_join_all(
            consulted
                .iter()
                .map(|engine| self.consult(engine, request)),
        )
        .await?;

        let mut warnings = Vec::new();
        for (engine, response) in responses {
            statuses.push(EngineStatus {
                engine,
                code_checked: response.code_checked,
            });
            warnings.extend(response.warnings);
        }

        Ok(AnalysisOutput {
            warnings: Some(warnings),
            extra: Default::default(),
        })
    }
}
