//! Blog generation pipeline for Autoblog.
//!
//! This crate ties the source readers, the Vertex AI models, the related
//! documentation lookup and the docx exporter into one run (see
//! [`pipeline::run`]).

pub mod generator;
pub mod images;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod related;
pub mod summarize;

use std::time::Duration;

use reqwest::Client;

use autoblog_shared::{AutoblogError, Result};

pub use generator::{SourceMaterial, generate_blog_assets, recover_blog_assets};
pub use images::{ImageGenerator, MaterializedPost, VertexImagen, materialize_images};
pub use llm::{LanguageModel, VertexEndpoint, VertexGemini};
pub use pipeline::{
    PipelineSettings, ProgressReporter, RunOutcome, RunRequest, Services, SilentProgress, Stage,
    run,
};
pub use prompts::PromptSet;
pub use related::{KapaClient, RelatedContent};

/// User-Agent string for outgoing requests.
const USER_AGENT: &str = concat!("Autoblog/", env!("CARGO_PKG_VERSION"));

/// Build an HTTP client for the model and lookup APIs.
pub(crate) fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| AutoblogError::Network(format!("failed to build HTTP client: {e}")))
}
