//! Markdown in and out of the pipeline.
//!
//! - [`page_text`] turns a fetched HTML page into compact text for prompts
//!   (`htmd` conversion followed by cleanup passes).
//! - [`export_docx`] renders the finished post into a `.docx` file.

mod cleanup;
pub mod docx;

use scraper::{Html, Selector};
use tracing::{debug, instrument};

use autoblog_shared::{AutoblogError, Result};

pub use docx::export_docx;

/// Convert an HTML page into cleaned, prompt-ready text.
///
/// Chrome (nav, header, footer, scripts) is dropped, the main content is
/// converted to markdown, and links/images are flattened away.
#[instrument(skip(html), fields(len = html.len()))]
pub fn page_text(html: &str) -> Result<String> {
    let content_html = extract_content_html(html);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec![
            "script", "style", "nav", "header", "footer", "iframe", "noscript", "svg",
        ])
        .build();

    let raw_markdown = converter
        .convert(&content_html)
        .map_err(|e| AutoblogError::parse(format!("htmd conversion failed: {e}")))?;

    let text = cleanup::run_pipeline(&raw_markdown);
    debug!(raw_len = raw_markdown.len(), text_len = text.len(), "page converted");
    Ok(text)
}

/// Keep at most `max_chars` characters of `text` (never splits a char).
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Extract the main content HTML, falling back to `<body>`.
fn extract_content_html(html: &str) -> String {
    let doc = Html::parse_document(html);

    let selectors = ["article", "main", "[role=\"main\"]", ".content", "body"];

    for sel_str in &selectors {
        if let Ok(selector) = Selector::parse(sel_str) {
            if let Some(el) = doc.select(&selector).next() {
                return el.inner_html();
            }
        }
    }

    html.to_string()
}
