//! Link enrichment: pull in the content of pages a document points to.
//!
//! Linked Google Docs are read through the same [`DocumentSource`] (text
//! only, one level deep). Other links are fetched as web pages and capped
//! to a character budget.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, instrument, warn};

use crate::gdocs::{ReadOptions, extract_doc_id};
use crate::web::WebPageFetcher;
use crate::DocumentSource;

/// Marker identifying Google Docs links.
const GOOGLE_DOC_MARKER: &str = "docs.google.com/document";

/// Everything gathered from a document's links.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkedContext {
    /// Concatenated sections, one per successfully read link.
    pub text: String,
    /// Comments collected from linked documents.
    pub comments: Vec<String>,
}

/// All `http(s)` URLs in `text`, de-duplicated in first-seen order.
///
/// Sentence punctuation directly after a URL is not part of it.
pub fn extract_urls(text: &str) -> Vec<String> {
    static URL_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"https?://[^\s)]+").expect("valid regex"));

    let mut seen = HashSet::new();
    URL_RE
        .find_iter(text)
        .map(|m| {
            m.as_str()
                .trim_end_matches(['.', ',', ';', ':', '!', '?'])
                .to_string()
        })
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Resolves links found in document text.
pub struct LinkEnricher<'a> {
    docs: &'a dyn DocumentSource,
    web: &'a WebPageFetcher,
    ignored_domains: Vec<String>,
    content_limit: usize,
}

impl<'a> LinkEnricher<'a> {
    pub fn new(
        docs: &'a dyn DocumentSource,
        web: &'a WebPageFetcher,
        ignored_domains: Vec<String>,
        content_limit: usize,
    ) -> Self {
        Self {
            docs,
            web,
            ignored_domains,
            content_limit,
        }
    }

    fn is_ignored(&self, url: &str) -> bool {
        self.ignored_domains.iter().any(|d| url.contains(d.as_str()))
    }

    /// Read every non-ignored link in `text`. Individual failures are logged
    /// and skipped. Links back to `source_doc_id` are not re-read.
    #[instrument(skip_all)]
    pub async fn enrich(&self, text: &str, source_doc_id: Option<&str>) -> LinkedContext {
        let all = extract_urls(text);
        let (urls, ignored): (Vec<String>, Vec<String>) =
            all.into_iter().partition(|u| !self.is_ignored(u));
        if !ignored.is_empty() {
            info!(count = ignored.len(), "ignoring links on the denylist");
        }

        let (doc_urls, page_urls): (Vec<String>, Vec<String>) =
            urls.into_iter().partition(|u| u.contains(GOOGLE_DOC_MARKER));

        let mut context = LinkedContext::default();

        for url in &doc_urls {
            let Some(doc_id) = extract_doc_id(url) else {
                warn!(%url, "no document ID in Google Docs link");
                continue;
            };
            if Some(doc_id.as_str()) == source_doc_id {
                continue;
            }

            let opts = ReadOptions {
                download_images: false,
            };
            match self.docs.read_document(&doc_id, opts).await {
                Ok(Some(nested)) => {
                    context
                        .text
                        .push_str(&format!("\n\n--- CONTENT FROM LINKED DOC: {url} ---\n\n"));
                    context.text.push_str(&nested.text);
                    context.comments.extend(nested.comments);
                }
                Ok(None) => warn!(%url, "linked document is not accessible"),
                Err(e) => warn!(%url, error = %e, "failed to read linked document"),
            }
        }

        for url in &page_urls {
            match self.web.fetch_text(url).await {
                Ok(page) => {
                    let excerpt = autoblog_markdown::truncate_chars(&page, self.content_limit);
                    context
                        .text
                        .push_str(&format!("\n--- Content from {url} ---\n{excerpt}\n"));
                }
                Err(e) => warn!(%url, error = %e, "failed to fetch linked page"),
            }
        }

        info!(
            docs = doc_urls.len(),
            pages = page_urls.len(),
            chars = context.text.len(),
            "link enrichment complete"
        );
        context
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use autoblog_shared::{DocumentAssets, Result};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    /// Serves canned documents and records which IDs were requested.
    struct FakeDocs {
        requested: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DocumentSource for FakeDocs {
        async fn read_document(
            &self,
            doc_id: &str,
            opts: ReadOptions,
        ) -> Result<Option<DocumentAssets>> {
            assert!(!opts.download_images);
            self.requested
                .lock()
                .expect("lock")
                .push(doc_id.to_string());
            match doc_id {
                "NESTED" => Ok(Some(DocumentAssets {
                    text: "nested body".into(),
                    image_paths: Vec::new(),
                    comments: vec!["Comment from Bo: ship it".into()],
                })),
                _ => Ok(None),
            }
        }
    }

    #[test]
    fn urls_are_extracted_and_deduplicated() {
        let text = "see (https://a.dev/x) and https://b.dev/y, again https://a.dev/x.\n\
                    http://c.dev/q?id=1! Done: https://b.dev/y";
        assert_eq!(
            extract_urls(text),
            vec!["https://a.dev/x", "https://b.dev/y", "http://c.dev/q?id=1"]
        );
    }

    #[tokio::test]
    async fn enriches_docs_and_pages_skipping_denylist() {
        let server = MockServer::start().await;
        let long_body = "x".repeat(50);
        Mock::given(method("GET"))
            .and(path("/blog"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                "<html><body><main><p>{long_body}</p></main></body></html>"
            )))
            .expect(1)
            .mount(&server)
            .await;

        let docs = FakeDocs {
            requested: Mutex::new(Vec::new()),
        };
        let web = WebPageFetcher::new().expect("fetcher").allow_private();
        let enricher = LinkEnricher::new(
            &docs,
            &web,
            vec!["jira".into(), "atlassian.net".into()],
            10,
        );

        let page = format!("{}/blog", server.uri());
        let text = format!(
            "Spec (https://docs.google.com/document/d/NESTED/edit) \
             self (https://docs.google.com/document/d/MAIN/edit) \
             denied (https://docs.google.com/document/d/LOCKED/view) \
             ticket (https://acme.atlassian.net/browse/DB-1) \
             blog ({page}) again ({page})"
        );

        let context = enricher.enrich(&text, Some("MAIN")).await;

        assert!(context.text.contains(
            "--- CONTENT FROM LINKED DOC: https://docs.google.com/document/d/NESTED/edit ---\n\nnested body"
        ));
        assert!(context.text.contains(&format!("--- Content from {page} ---\nxxxxxxxxxx\n")));
        assert!(!context.text.contains("atlassian"));
        assert_eq!(context.comments, vec!["Comment from Bo: ship it".to_string()]);
        assert_eq!(
            *docs.requested.lock().expect("lock"),
            vec!["NESTED".to_string(), "LOCKED".to_string()]
        );
    }

    #[tokio::test]
    async fn text_without_links_yields_empty_context() {
        let docs = FakeDocs {
            requested: Mutex::new(Vec::new()),
        };
        let web = WebPageFetcher::new().expect("fetcher");
        let enricher = LinkEnricher::new(&docs, &web, Vec::new(), 1000);
        assert_eq!(enricher.enrich("no links here", None).await, LinkedContext::default());
    }
}
