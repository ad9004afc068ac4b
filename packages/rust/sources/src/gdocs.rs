//! Google Docs reader: document text, inline images, and Drive comments.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, error, info, instrument, warn};

use autoblog_shared::{AutoblogError, DocumentAssets, Result};

use crate::{DocumentSource, http_client};

/// Production Docs API base.
pub const DEFAULT_DOCS_BASE_URL: &str = "https://docs.googleapis.com/v1";
/// Production Drive API base.
pub const DEFAULT_DRIVE_BASE_URL: &str = "https://www.googleapis.com/drive/v3";

/// Pull the document ID out of a Google Docs URL.
///
/// Works with or without a trailing `/edit` or `/view` segment.
pub fn extract_doc_id(url: &str) -> Option<String> {
    static DOC_ID_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"/document/d/([a-zA-Z0-9_-]+)").expect("valid regex"));

    DOC_ID_RE.captures(url).map(|caps| caps[1].to_string())
}

/// Per-read switches.
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    /// Download inline images into the image directory.
    pub download_images: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            download_images: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Docs API resource (only the fields we read)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    #[serde(default)]
    body: Body,
    #[serde(default)]
    inline_objects: HashMap<String, InlineObject>,
}

#[derive(Debug, Default, Deserialize)]
struct Body {
    #[serde(default)]
    content: Vec<StructuralElement>,
}

#[derive(Debug, Default, Deserialize)]
struct StructuralElement {
    #[serde(default)]
    paragraph: Option<DocParagraph>,
}

#[derive(Debug, Default, Deserialize)]
struct DocParagraph {
    #[serde(default)]
    elements: Vec<ParagraphElement>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParagraphElement {
    #[serde(default)]
    text_run: Option<TextRun>,
    #[serde(default)]
    rich_link: Option<RichLink>,
    #[serde(default)]
    inline_object_element: Option<InlineObjectElement>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextRun {
    #[serde(default)]
    content: String,
    #[serde(default)]
    text_style: Option<TextStyle>,
}

#[derive(Debug, Default, Deserialize)]
struct TextStyle {
    #[serde(default)]
    link: Option<Link>,
}

#[derive(Debug, Default, Deserialize)]
struct Link {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RichLink {
    #[serde(default)]
    rich_link_properties: Option<RichLinkProperties>,
}

#[derive(Debug, Default, Deserialize)]
struct RichLinkProperties {
    #[serde(default)]
    uri: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineObjectElement {
    #[serde(default)]
    inline_object_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineObject {
    #[serde(default)]
    inline_object_properties: Option<InlineObjectProperties>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineObjectProperties {
    #[serde(default)]
    embedded_object: Option<EmbeddedObject>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmbeddedObject {
    #[serde(default)]
    image_properties: Option<ImageProperties>,
    #[serde(default)]
    smart_chip: Option<SmartChip>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageProperties {
    #[serde(default)]
    content_uri: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SmartChip {
    #[serde(default)]
    link: Option<Link>,
}

#[derive(Debug, Default, Deserialize)]
struct CommentList {
    #[serde(default)]
    comments: Vec<Comment>,
}

#[derive(Debug, Default, Deserialize)]
struct Comment {
    #[serde(default)]
    author: Option<CommentAuthor>,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentAuthor {
    #[serde(default)]
    display_name: Option<String>,
}

/// Text with link URLs inlined, plus the content URIs of inline images in order.
fn flatten(doc: &Document) -> (String, Vec<String>) {
    let mut text = String::new();
    let mut image_uris = Vec::new();

    let paragraphs = doc.body.content.iter().filter_map(|el| el.paragraph.as_ref());
    for element in paragraphs.flat_map(|p| p.elements.iter()) {
        if let Some(run) = &element.text_run {
            text.push_str(&run.content);
            let url = run
                .text_style
                .as_ref()
                .and_then(|s| s.link.as_ref())
                .and_then(|l| l.url.as_deref());
            if let Some(url) = url {
                text.push_str(&format!(" ({url}) "));
            }
        }

        if let Some(uri) = element
            .rich_link
            .as_ref()
            .and_then(|r| r.rich_link_properties.as_ref())
            .and_then(|p| p.uri.as_deref())
        {
            debug!(uri, "rich link");
            text.push_str(&format!(" ({uri}) "));
        }

        let Some(object_id) = element
            .inline_object_element
            .as_ref()
            .and_then(|e| e.inline_object_id.as_deref())
        else {
            continue;
        };

        let embedded = doc
            .inline_objects
            .get(object_id)
            .and_then(|o| o.inline_object_properties.as_ref())
            .and_then(|p| p.embedded_object.as_ref());

        match embedded {
            Some(EmbeddedObject {
                image_properties: Some(image),
                ..
            }) => {
                if let Some(uri) = &image.content_uri {
                    image_uris.push(uri.clone());
                }
            }
            Some(EmbeddedObject {
                smart_chip: Some(chip),
                ..
            }) => {
                if let Some(url) = chip.link.as_ref().and_then(|l| l.url.as_deref()) {
                    text.push_str(&format!(" ({url}) "));
                }
            }
            _ => debug!(object_id, "skipping non-image embedded object"),
        }
    }

    (text, image_uris)
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Reads Google Docs with an OAuth bearer token.
pub struct GoogleDocsClient {
    client: Client,
    token: String,
    docs_base: String,
    drive_base: String,
    image_dir: PathBuf,
}

impl GoogleDocsClient {
    pub fn new(token: impl Into<String>, image_dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            client: http_client(Duration::from_secs(60))?,
            token: token.into(),
            docs_base: DEFAULT_DOCS_BASE_URL.to_string(),
            drive_base: DEFAULT_DRIVE_BASE_URL.to_string(),
            image_dir: image_dir.into(),
        })
    }

    /// Point the client at different Docs/Drive API bases (used by tests).
    pub fn with_base_urls(mut self, docs: impl Into<String>, drive: impl Into<String>) -> Self {
        self.docs_base = docs.into().trim_end_matches('/').to_string();
        self.drive_base = drive.into().trim_end_matches('/').to_string();
        self
    }

    /// Fetch the document resource. `Ok(None)` on 403.
    async fn fetch_document(&self, doc_id: &str) -> Result<Option<Document>> {
        let response = self
            .client
            .get(format!("{}/documents/{doc_id}", self.docs_base))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| AutoblogError::Network(format!("docs {doc_id}: {e}")))?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            error!(doc_id, "permission denied; share the document with this account");
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AutoblogError::api("docs", status.as_u16(), body));
        }

        let doc = response
            .json()
            .await
            .map_err(|e| AutoblogError::parse(format!("document {doc_id}: {e}")))?;
        Ok(Some(doc))
    }

    /// Download inline images as `gdoc_image_<n>.png`, skipping failures.
    async fn download_images(&self, uris: &[String]) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        if uris.is_empty() {
            return Ok(paths);
        }
        tokio::fs::create_dir_all(&self.image_dir)
            .await
            .map_err(|e| AutoblogError::io(&self.image_dir, e))?;

        for uri in uris {
            let index = paths.len() + 1;
            match self.download_one(uri, &self.image_dir, index).await {
                Ok(path) => {
                    info!(path = %path.display(), "downloaded document image");
                    paths.push(path);
                }
                Err(AutoblogError::PermissionDenied(msg)) => {
                    warn!(%msg, "skipping image download (403)");
                }
                Err(e) => warn!(error = %e, "skipping image download"),
            }
        }
        Ok(paths)
    }

    async fn download_one(&self, uri: &str, dir: &Path, index: usize) -> Result<PathBuf> {
        let response = self
            .client
            .get(uri)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| AutoblogError::Network(format!("image: {e}")))?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            return Err(AutoblogError::PermissionDenied(uri.to_string()));
        }
        if status != StatusCode::OK {
            return Err(AutoblogError::api("image download", status.as_u16(), uri));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AutoblogError::Network(format!("image body: {e}")))?;
        let path = dir.join(format!("gdoc_image_{index}.png"));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| AutoblogError::io(&path, e))?;
        Ok(path)
    }

    /// Comments as `Comment from <author>: <content>`. Failures are logged
    /// and produce no comments.
    #[instrument(skip(self))]
    pub async fn fetch_comments(&self, doc_id: &str) -> Vec<String> {
        match self.try_fetch_comments(doc_id).await {
            Ok(comments) => {
                debug!(count = comments.len(), "fetched comments");
                comments
            }
            Err(e) => {
                warn!(error = %e, "could not fetch comments");
                Vec::new()
            }
        }
    }

    async fn try_fetch_comments(&self, doc_id: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/files/{doc_id}/comments", self.drive_base))
            .bearer_auth(&self.token)
            .query(&[("fields", "comments(author/displayName,content)")])
            .send()
            .await
            .map_err(|e| AutoblogError::Network(format!("drive comments: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AutoblogError::api("drive", status.as_u16(), body));
        }

        let list: CommentList = response
            .json()
            .await
            .map_err(|e| AutoblogError::parse(format!("comments: {e}")))?;

        Ok(list
            .comments
            .into_iter()
            .map(|c| {
                let author = c
                    .author
                    .and_then(|a| a.display_name)
                    .unwrap_or_else(|| "Unknown Author".to_string());
                format!("Comment from {author}: {}", c.content.replace('\n', " "))
            })
            .collect())
    }
}

#[async_trait]
impl DocumentSource for GoogleDocsClient {
    #[instrument(skip(self))]
    async fn read_document(
        &self,
        doc_id: &str,
        opts: ReadOptions,
    ) -> Result<Option<DocumentAssets>> {
        let Some(doc) = self.fetch_document(doc_id).await? else {
            return Ok(None);
        };

        let (text, image_uris) = flatten(&doc);
        let image_paths = if opts.download_images {
            self.download_images(&image_uris).await?
        } else {
            Vec::new()
        };
        let comments = self.fetch_comments(doc_id).await;

        info!(
            doc_id,
            chars = text.len(),
            images = image_paths.len(),
            comments = comments.len(),
            "read Google Doc"
        );

        Ok(Some(DocumentAssets {
            text,
            image_paths,
            comments,
        }))
    }
}
