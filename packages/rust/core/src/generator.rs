//! Structured blog generation and recovery of its JSON output.
//!
//! Models do not reliably emit strict JSON. The outermost `{...}` span is
//! parsed as-is first. Recovery then runs in two tiers: normalize the span
//! and parse it, then fall back to slicing the markdown body out by its
//! surrounding keys.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, instrument, warn};

use autoblog_shared::{BlogAssets, DocumentationLink, ImagePrompt, Result, SourceType};

use crate::llm::LanguageModel;
use crate::prompts::{GdocPromptInput, PromptSet};

/// Placeholder synthesized when only the markdown body could be salvaged.
pub const FALLBACK_PLACEHOLDER: &str = "[IMAGE_1]";
/// Prompt synthesized when only the markdown body could be salvaged.
pub const FALLBACK_PROMPT: &str =
    "A technical diagram showing the main concept discussed in the blog post.";

static TRAILING_COMMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\s*[}\]])").expect("valid regex"));
static CONTROL_CHARS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\x00-\x08\x0b\x0c\x0e-\x1f\x7f-\x9f]").expect("valid regex")
});
static BODY_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""blog_markdown_content"\s*:\s*""#).expect("valid regex"));
static BODY_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""\s*,\s*"image_prompts""#).expect("valid regex"));

/// What the post is written from.
#[derive(Debug, Clone, Copy)]
pub enum SourceMaterial<'a> {
    /// A cleaned Slack conversation.
    Conversation(&'a str),
    /// A Google Doc with everything gathered from its links.
    Document {
        main_text: &'a str,
        linked_content: &'a str,
        comments: &'a [String],
    },
}

impl SourceMaterial<'_> {
    pub fn source_type(&self) -> SourceType {
        match self {
            Self::Conversation(_) => SourceType::Slack,
            Self::Document { .. } => SourceType::Gdoc,
        }
    }
}

/// Render the matching prompt, call the model once, and recover the assets.
///
/// `Ok(None)` means the model answered but neither recovery tier produced
/// a usable result.
#[instrument(skip_all, fields(source = %material.source_type(), links = links.len()))]
pub async fn generate_blog_assets(
    model: &dyn LanguageModel,
    prompts: &PromptSet,
    material: &SourceMaterial<'_>,
    links: &[DocumentationLink],
) -> Result<Option<BlogAssets>> {
    let links_json = if links.is_empty() {
        String::new()
    } else {
        DocumentationLink::to_prompt_json(links)
    };
    let prompt = match material {
        SourceMaterial::Conversation(text) => prompts.slack_assets(text, &links_json)?,
        SourceMaterial::Document {
            main_text,
            linked_content,
            comments,
        } => {
            let comments = comments.join("\n");
            prompts.gdoc_assets(&GdocPromptInput {
                main_document_text: main_text,
                linked_documents_content: linked_content,
                document_comments: &comments,
                documentation_links: &links_json,
            })?
        }
    };

    let raw = model.generate(&prompt).await?;
    let assets = recover_blog_assets(&raw);
    match &assets {
        Some(a) => info!(
            chars = a.blog_markdown_content.len(),
            image_prompts = a.image_prompts.len(),
            "blog assets generated"
        ),
        None => warn!(chars = raw.len(), "could not recover blog assets from model output"),
    }
    Ok(assets)
}

// ---------------------------------------------------------------------------
// Recovery
// ---------------------------------------------------------------------------

/// Recover [`BlogAssets`] from raw model output.
pub fn recover_blog_assets(raw: &str) -> Option<BlogAssets> {
    let span = json_span(raw)?;
    if let Ok(assets) = serde_json::from_str::<BlogAssets>(span) {
        return Some(assets);
    }

    let normalized = normalize_json(span);

    match serde_json::from_str::<BlogAssets>(&normalized) {
        Ok(assets) => Some(assets),
        Err(e) => {
            warn!(error = %e, "model output is not valid JSON, attempting salvage");
            salvage(&normalized)
        }
    }
}

/// The span from the first `{` to the last `}`, inclusive.
fn json_span(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (start < end).then(|| &raw[start..=end])
}

/// Repair typographic artifacts that break strict JSON.
///
/// Existing escape sequences are left untouched.
pub fn normalize_json(span: &str) -> String {
    let replaced: String = span
        .chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{2014}' | '\u{2013}' => '-',
            other => other,
        })
        .collect();
    let without_commas = TRAILING_COMMA_RE.replace_all(&replaced, "$1");
    CONTROL_CHARS_RE.replace_all(&without_commas, "").into_owned()
}

/// Slice the markdown body out by its key markers and attach one generic
/// image prompt.
fn salvage(normalized: &str) -> Option<BlogAssets> {
    let start = BODY_START_RE.find(normalized)?.end();
    let end = start + BODY_END_RE.find(&normalized[start..])?.start();
    let body = &normalized[start..end];

    warn!(
        chars = body.len(),
        "using salvaged blog body with a generic image prompt"
    );
    Some(BlogAssets {
        blog_markdown_content: decode_json_string(body).unwrap_or_else(|| body.to_string()),
        image_prompts: vec![ImagePrompt {
            placeholder: FALLBACK_PLACEHOLDER.into(),
            prompt: FALLBACK_PROMPT.into(),
        }],
    })
}

/// Decode the inside of a JSON string literal, tolerating raw line breaks
/// and tabs.
fn decode_json_string(body: &str) -> Option<String> {
    let escaped = body
        .replace('\r', "\\r")
        .replace('\n', "\\n")
        .replace('\t', "\\t");
    serde_json::from_str::<String>(&format!("\"{escaped}\"")).ok()
}
