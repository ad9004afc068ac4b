//! Slack thread reader (`conversations.replies` with cursor pagination).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info, instrument};
use url::Url;

use autoblog_shared::{AutoblogError, Result, ThreadMessage};

use crate::{ThreadSource, http_client};

/// Production Slack Web API base.
pub const DEFAULT_BASE_URL: &str = "https://slack.com/api";

/// Split a thread permalink into `(channel_id, thread_ts)`.
///
/// `https://<ws>.slack.com/archives/C0123/p1234567890123456` yields
/// `("C0123", "1234567890.123456")`. Anything whose path is not exactly
/// `archives/<channel>/p<digits>` yields `None`.
pub fn parse_permalink(permalink: &str) -> Option<(String, String)> {
    let url = Url::parse(permalink).ok()?;
    let parts: Vec<&str> = url.path().trim_matches('/').split('/').collect();
    let [prefix, channel, stamp] = parts.as_slice() else {
        return None;
    };
    if *prefix != "archives" || channel.is_empty() {
        return None;
    }

    let digits = stamp.strip_prefix('p')?;
    if digits.len() <= 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let (secs, micros) = digits.split_at(digits.len() - 6);
    Some((channel.to_string(), format!("{secs}.{micros}")))
}

/// Render user messages as `From: <user>\n<text>\n` blocks joined by blank lines.
///
/// Bot posts, joins and other non-user entries are dropped.
pub fn format_conversation(messages: &[ThreadMessage]) -> String {
    messages
        .iter()
        .filter(|m| m.is_user_message())
        .map(|m| {
            format!(
                "From: {}\n{}\n",
                m.author_id.as_deref().unwrap_or_default(),
                m.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RepliesResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    messages: Vec<ThreadMessage>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

/// Reads Slack threads with a bot or user token.
pub struct SlackClient {
    client: Client,
    token: String,
    base_url: String,
    page_size: u32,
}

impl SlackClient {
    pub fn new(token: impl Into<String>, page_size: u32) -> Result<Self> {
        Ok(Self {
            client: http_client(Duration::from_secs(30))?,
            token: token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size,
        })
    }

    /// Point the client at a different API base (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Fetch all replies of a thread, following cursors until exhausted.
    #[instrument(skip(self))]
    pub async fn fetch_replies(&self, channel: &str, thread_ts: &str) -> Result<Vec<ThreadMessage>> {
        let endpoint = format!("{}/conversations.replies", self.base_url);
        let limit = self.page_size.to_string();
        let mut cursor: Option<String> = None;
        let mut messages = Vec::new();

        loop {
            let mut query = vec![
                ("channel", channel),
                ("ts", thread_ts),
                ("limit", limit.as_str()),
            ];
            if let Some(c) = cursor.as_deref() {
                query.push(("cursor", c));
            }

            let response = self
                .client
                .get(&endpoint)
                .bearer_auth(&self.token)
                .query(&query)
                .send()
                .await
                .map_err(|e| AutoblogError::Network(format!("slack: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(AutoblogError::api("slack", status.as_u16(), body));
            }

            let page: RepliesResponse = response
                .json()
                .await
                .map_err(|e| AutoblogError::parse(format!("slack response: {e}")))?;

            if !page.ok {
                return Err(AutoblogError::api(
                    "slack",
                    status.as_u16(),
                    page.error.unwrap_or_else(|| "unknown_error".into()),
                ));
            }

            debug!(count = page.messages.len(), has_more = page.has_more, "page received");
            messages.extend(page.messages);

            let next = page
                .response_metadata
                .map(|m| m.next_cursor)
                .filter(|c| !c.is_empty());
            match next {
                Some(next) if page.has_more => cursor = Some(next),
                _ => break,
            }
        }

        Ok(messages)
    }
}

#[async_trait]
impl ThreadSource for SlackClient {
    async fn fetch_thread(&self, permalink: &str) -> Vec<ThreadMessage> {
        let Some((channel, thread_ts)) = parse_permalink(permalink) else {
            error!(permalink, "not a Slack thread permalink");
            return Vec::new();
        };

        match self.fetch_replies(&channel, &thread_ts).await {
            Ok(messages) => {
                info!(%channel, count = messages.len(), "fetched Slack thread");
                messages
            }
            Err(e) => {
                error!(%channel, error = %e, "failed to fetch Slack thread");
                Vec::new()
            }
        }
    }
}
