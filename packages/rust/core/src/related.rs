//! Related documentation lookup through the Kapa chat API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use autoblog_shared::{BlogIdea, DocumentationLink, Result};

use crate::http_client;

/// Finds existing documentation worth linking from a new post.
#[async_trait]
pub trait RelatedContent: Send + Sync {
    /// `None` when the lookup failed; the caller treats it like no links.
    async fn find_links(&self, idea: &BlogIdea) -> Option<Vec<DocumentationLink>>;
}

/// Build the natural-language query sent to the knowledge service.
pub fn build_query(idea: &BlogIdea) -> String {
    format!(
        "I am writing a blog for below. Give existing documentation and blogs links only. \
         It should be with key, value pair (value pair being link) only, on what resources \
         would be helpful to link here. Don't add anything else.\n{}\n{}\n{}",
        idea.title(),
        idea.takeaway(),
        idea.search_summary()
    )
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    query: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    relevant_sources: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct Source {
    source_url: String,
    title: String,
}

/// Client for `POST /query/v1/projects/{project}/chat/`.
pub struct KapaClient {
    client: Client,
    base_url: String,
    project_id: String,
    api_key: String,
}

impl KapaClient {
    pub fn new(
        base_url: impl Into<String>,
        project_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(std::time::Duration::from_secs(120))?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project_id: project_id.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl RelatedContent for KapaClient {
    #[instrument(skip_all, fields(project = %self.project_id))]
    async fn find_links(&self, idea: &BlogIdea) -> Option<Vec<DocumentationLink>> {
        let url = format!(
            "{}/query/v1/projects/{}/chat/",
            self.base_url, self.project_id
        );
        let query = build_query(idea);

        let response = match self
            .client
            .post(&url)
            .header("X-API-KEY", &self.api_key)
            .json(&ChatRequest { query: &query })
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "related content request failed");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), %body, "related content lookup rejected");
            return None;
        }

        let parsed: ChatResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "related content response is not JSON");
                return None;
            }
        };

        // Items missing either field are dropped individually.
        let links: Vec<DocumentationLink> = parsed
            .relevant_sources
            .into_iter()
            .filter_map(|item| serde_json::from_value::<Source>(item).ok())
            .map(|s| DocumentationLink {
                url: s.source_url,
                title: s.title,
            })
            .collect();

        info!(count = links.len(), "related documentation found");
        Some(links)
    }
}
