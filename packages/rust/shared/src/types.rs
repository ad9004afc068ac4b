//! Core domain types for a single blog-generation run.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// SourceType
// ---------------------------------------------------------------------------

/// Where the raw material for a post comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Slack,
    Gdoc,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Slack => "slack",
            Self::Gdoc => "gdoc",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "slack" => Ok(Self::Slack),
            "gdoc" => Ok(Self::Gdoc),
            other => Err(format!("unknown source type '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one generated document (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Source material
// ---------------------------------------------------------------------------

/// One entry of a Slack thread, deserialized straight from the Web API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessage {
    /// Slack event type; only `"message"` entries are conversation content.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Author user ID. Bot and system entries have none.
    #[serde(rename = "user", default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(rename = "ts", default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl ThreadMessage {
    /// Whether this entry was written by a human participant.
    pub fn is_user_message(&self) -> bool {
        self.kind == "message" && self.author_id.is_some()
    }
}

/// Text, downloaded images and comments read from one Google Doc.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentAssets {
    /// Flattened document text with link URLs inlined in parentheses.
    pub text: String,
    /// Local paths of downloaded inline images, in document order.
    pub image_paths: Vec<PathBuf>,
    /// `"Comment from <author>: <content>"` strings.
    pub comments: Vec<String>,
}

// ---------------------------------------------------------------------------
// BlogIdea
// ---------------------------------------------------------------------------

/// Best-effort `Key: value` mapping parsed from model output.
///
/// No key is guaranteed to be present; accessors default to `""`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlogIdea {
    fields: HashMap<String, String>,
}

impl BlogIdea {
    pub const TITLE: &'static str = "Title";
    pub const AUDIENCE: &'static str = "Audience";
    pub const TAKEAWAY: &'static str = "Takeaway";
    pub const SEARCH_SUMMARY: &'static str = "KapaAIinput";

    /// Parse `Key: value` lines. Splits on the first colon only, ignores lines
    /// without one, and lets later duplicates overwrite earlier ones.
    pub fn parse(text: &str) -> Self {
        let mut fields = HashMap::new();
        for line in text.lines() {
            if let Some((key, value)) = line.split_once(':') {
                fields.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn title(&self) -> &str {
        self.get(Self::TITLE).unwrap_or_default()
    }

    pub fn audience(&self) -> &str {
        self.get(Self::AUDIENCE).unwrap_or_default()
    }

    pub fn takeaway(&self) -> &str {
        self.get(Self::TAKEAWAY).unwrap_or_default()
    }

    pub fn search_summary(&self) -> &str {
        self.get(Self::SEARCH_SUMMARY).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Related content and generated assets
// ---------------------------------------------------------------------------

/// A documentation page suggested by the related-content service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentationLink {
    pub url: String,
    pub title: String,
}

impl DocumentationLink {
    /// Render links as a JSON array of `[url, title]` pairs for prompts.
    pub fn to_prompt_json(links: &[DocumentationLink]) -> String {
        let pairs: Vec<[&str; 2]> = links
            .iter()
            .map(|l| [l.url.as_str(), l.title.as_str()])
            .collect();
        serde_json::to_string(&pairs).unwrap_or_else(|_| "[]".to_string())
    }
}

/// One `{placeholder, prompt}` pair requested by the generator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePrompt {
    #[serde(default)]
    pub placeholder: String,
    #[serde(default)]
    pub prompt: String,
}

/// The structured output of the generation step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogAssets {
    /// Post body in markdown, containing `[IMAGE_n]` placeholders.
    pub blog_markdown_content: String,
    #[serde(default)]
    pub image_prompts: Vec<ImagePrompt>,
}

/// An image rendered for one prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub prompt: String,
    pub output_path: PathBuf,
}

/// Registry record for one exported document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub id: RunId,
    pub source: SourceType,
    /// The Slack permalink or document URL that was processed.
    pub input: String,
    pub output_path: String,
    pub created_at: DateTime<Utc>,
}
