use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::planner::{GenerationCapability, GenerationError, ScenarioDraft};

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    description: &'a str,
    max_cases: usize,
}

/// Accepts either `{"scenarios": [...]}` or a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GenerationResponse {
    Wrapped { scenarios: Vec<ScenarioDraft> },
    Bare(Vec<ScenarioDraft>),
}

impl GenerationResponse {
    fn into_drafts(self) -> Vec<ScenarioDraft> {
        match self {
            Self::Wrapped { scenarios } => scenarios,
            Self::Bare(drafts) => drafts,
        }
    }
}

/// HTTP client for the opaque scenario-generation endpoint.
///
/// The endpoint contract is a single POST carrying the game description and
/// the case-count bound; prompt templates and model choice live behind it.
pub struct HttpGenerationClient {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpGenerationClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            api_key,
            client,
        })
    }
}

#[async_trait::async_trait]
impl GenerationCapability for HttpGenerationClient {
    async fn generate(
        &self,
        description: &str,
        max_cases: usize,
    ) -> Result<Vec<ScenarioDraft>, GenerationError> {
        let mut request = self.client.post(&self.endpoint).json(&GenerationRequest {
            description,
            max_cases,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GenerationError::Unavailable(e.to_string()))?;

        let status = response.status();
        if quota_or_outage(status) {
            return Err(GenerationError::Unavailable(format!(
                "endpoint returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(GenerationError::Malformed(format!(
                "endpoint returned {status}"
            )));
        }

        let body: GenerationResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;
        Ok(body.into_drafts())
    }
}

/// Statuses that mean "try again later", not "the response is bad".
fn quota_or_outage(status: reqwest::StatusCode) -> bool {
    status.is_server_error()
        || matches!(
            status,
            reqwest::StatusCode::REQUEST_TIMEOUT
                | reqwest::StatusCode::TOO_MANY_REQUESTS
                | reqwest::StatusCode::PAYMENT_REQUIRED
        )
}

/// Capability used when no generation endpoint is configured; always
/// reports unavailable so the planner serves its template set.
pub struct NullGenerationClient;

#[async_trait::async_trait]
impl GenerationCapability for NullGenerationClient {
    async fn generate(
        &self,
        _description: &str,
        _max_cases: usize,
    ) -> Result<Vec<ScenarioDraft>, GenerationError> {
        Err(GenerationError::Unavailable(
            "no generation endpoint configured".to_string(),
        ))
    }
}
