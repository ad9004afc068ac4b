//! Text generation on Vertex AI Gemini.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use autoblog_shared::{AutoblogError, Result};

use crate::http_client;

/// A stateless text model: one prompt in, one completion out.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Vertex AI endpoint
// ---------------------------------------------------------------------------

/// Project, region and token shared by every Vertex AI model call.
#[derive(Clone)]
pub struct VertexEndpoint {
    base_url: String,
    project_id: String,
    location: String,
    access_token: String,
}

impl VertexEndpoint {
    pub fn new(
        project_id: impl Into<String>,
        location: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        let location = location.into();
        Self {
            base_url: format!("https://{location}-aiplatform.googleapis.com"),
            project_id: project_id.into(),
            location,
            access_token: access_token.into(),
        }
    }

    /// Point calls at a different host (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// `.../publishers/google/models/{model}:{method}`
    pub(crate) fn model_url(&self, model: &str, method: &str) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{model}:{method}",
            self.base_url, self.project_id, self.location
        )
    }

    pub(crate) fn access_token(&self) -> &str {
        &self.access_token
    }
}

// ---------------------------------------------------------------------------
// Gemini
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [RequestPart<'a>; 1],
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

/// A Gemini model served by Vertex AI `generateContent`.
pub struct VertexGemini {
    client: Client,
    endpoint: VertexEndpoint,
    model: String,
}

impl VertexGemini {
    pub fn new(endpoint: VertexEndpoint, model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client(std::time::Duration::from_secs(300))?,
            endpoint,
            model: model.into(),
        })
    }
}

#[async_trait]
impl LanguageModel for VertexGemini {
    #[instrument(skip_all, fields(model = %self.model, prompt_chars = prompt.len()))]
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = GenerateRequest {
            contents: [Content {
                role: "user",
                parts: [RequestPart { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(self.endpoint.model_url(&self.model, "generateContent"))
            .bearer_auth(self.endpoint.access_token())
            .json(&body)
            .send()
            .await
            .map_err(|e| AutoblogError::Network(format!("vertex ai: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AutoblogError::api("vertex ai", status.as_u16(), text));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AutoblogError::parse(format!("gemini response: {e}")))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(AutoblogError::Llm(format!(
                "{} returned no text candidates",
                self.model
            )));
        }
        debug!(chars = text.len(), "completion received");
        Ok(text)
    }
}
