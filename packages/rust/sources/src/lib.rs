//! Source readers: Slack threads, Google Docs, and the pages they link to.
//!
//! Every reader is an HTTP client with an overridable base URL so tests can
//! point it at a mock server. The pipeline consumes them through the
//! [`ThreadSource`] and [`DocumentSource`] traits.

pub mod gdocs;
pub mod links;
pub mod slack;
pub mod web;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use autoblog_shared::{AutoblogError, DocumentAssets, Result, ThreadMessage};

pub use gdocs::{GoogleDocsClient, ReadOptions, extract_doc_id};
pub use links::{LinkEnricher, LinkedContext};
pub use slack::{SlackClient, format_conversation, parse_permalink};
pub use web::WebPageFetcher;

/// User-Agent string for outgoing requests.
pub(crate) const USER_AGENT: &str = concat!("Autoblog/", env!("CARGO_PKG_VERSION"));

/// Build the shared HTTP client used by every reader.
pub(crate) fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(timeout)
        .build()
        .map_err(|e| AutoblogError::Network(format!("failed to build HTTP client: {e}")))
}

/// Something that can produce the messages of a chat thread.
#[async_trait]
pub trait ThreadSource: Send + Sync {
    /// Fetch every message of the thread behind `permalink`, oldest first.
    ///
    /// Failures are soft: they are logged and yield an empty list.
    async fn fetch_thread(&self, permalink: &str) -> Vec<ThreadMessage>;
}

/// Something that can read a document by ID.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Read a document. `Ok(None)` means access was denied.
    async fn read_document(&self, doc_id: &str, opts: ReadOptions)
    -> Result<Option<DocumentAssets>>;
}
