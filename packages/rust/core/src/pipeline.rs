//! End-to-end run: source → clean → idea → links → generate → images → docx.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime, Utc};
use tracing::{info, instrument, warn};

use autoblog_shared::{
    AppConfig, AutoblogError, Credentials, GeneratedFile, Result, RunId, SourceType,
};
use autoblog_sources::{
    DocumentSource, GoogleDocsClient, LinkEnricher, ReadOptions, SlackClient, ThreadSource,
    WebPageFetcher, extract_doc_id, format_conversation,
};
use autoblog_storage::Registry;

use crate::generator::{SourceMaterial, generate_blog_assets};
use crate::images::{ImageGenerator, VertexImagen, materialize_images};
use crate::llm::{LanguageModel, VertexEndpoint, VertexGemini};
use crate::prompts::PromptSet;
use crate::related::{KapaClient, RelatedContent};
use crate::summarize::{clean_conversation, generate_idea};

/// Pipeline states, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Clean,
    Summarize,
    LookupLinks,
    Generate,
    MaterializeImages,
    Export,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Fetch => "Fetching source",
            Self::Clean => "Cleaning conversation",
            Self::Summarize => "Generating blog idea",
            Self::LookupLinks => "Looking up related documentation",
            Self::Generate => "Generating blog post",
            Self::MaterializeImages => "Generating images",
            Self::Export => "Exporting document",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// What to generate from, and where to write it.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub source: SourceType,
    /// Slack thread permalink or Google Doc URL.
    pub input: String,
    /// Explicit output file. Defaults to a timestamped name in `output_dir`.
    pub output: Option<PathBuf>,
}

/// Run-independent settings taken from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub output_dir: PathBuf,
    pub image_dir: PathBuf,
    pub ignored_domains: Vec<String>,
    pub link_content_limit: usize,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            output_dir: PathBuf::from(&config.output.output_dir),
            image_dir: PathBuf::from(&config.output.image_dir),
            ignored_domains: config.links.ignored_domains.clone(),
            link_content_limit: config.output.link_content_limit,
        }
    }
}

/// Collaborators used by a run.
pub struct Services {
    /// Absent when no Slack token was resolved.
    pub threads: Option<Box<dyn ThreadSource>>,
    pub documents: Box<dyn DocumentSource>,
    pub web: WebPageFetcher,
    /// Model for cleanup and idea generation.
    pub assistant: Box<dyn LanguageModel>,
    /// Model for structured blog generation.
    pub writer: Box<dyn LanguageModel>,
    pub related: Box<dyn RelatedContent>,
    pub images: Box<dyn ImageGenerator>,
    pub prompts: PromptSet,
    pub registry: Option<Registry>,
}

impl Services {
    /// Build the production clients. Opens the registry when configured.
    pub async fn connect(config: &AppConfig, credentials: &Credentials) -> Result<Self> {
        let threads = match credentials.slack_token.as_deref() {
            Some(token) => Some(
                Box::new(SlackClient::new(token, config.slack.page_size)?) as Box<dyn ThreadSource>
            ),
            None => None,
        };

        let endpoint = VertexEndpoint::new(
            &credentials.google_project_id,
            &config.google.location,
            &credentials.google_access_token,
        );

        let registry = match config.output.registry_path.as_deref() {
            Some(path) => Some(Registry::open(Path::new(path)).await?),
            None => None,
        };

        Ok(Self {
            threads,
            documents: Box::new(GoogleDocsClient::new(
                &credentials.google_access_token,
                &config.output.image_dir,
            )?),
            web: WebPageFetcher::new()?,
            assistant: Box::new(VertexGemini::new(endpoint.clone(), &config.google.model)?),
            writer: Box::new(VertexGemini::new(endpoint.clone(), &config.google.blog_model)?),
            related: Box::new(KapaClient::new(
                &config.kapa.base_url,
                &config.kapa.project_id,
                &credentials.kapa_api_key,
            )?),
            images: Box::new(VertexImagen::new(endpoint, &config.google.image_model)?),
            prompts: PromptSet::new(&config.blog.company)?,
            registry,
        })
    }
}

/// Result of a successful run.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub output_path: PathBuf,
    /// Images embedded in the document.
    pub images: usize,
    /// Placeholders replaced by a failure marker.
    pub image_failures: usize,
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new stage.
    fn phase(&self, stage: Stage);
    /// Called when the run completes.
    fn done(&self, outcome: &RunOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _stage: Stage) {}
    fn done(&self, _outcome: &RunOutcome) {}
}

/// `blog_post_<YYYYmmdd_HHMMSS>.docx` inside `output_dir`.
pub fn default_output_path(output_dir: &Path, now: NaiveDateTime) -> PathBuf {
    output_dir.join(now.format("blog_post_%Y%m%d_%H%M%S.docx").to_string())
}

fn enter(stage: Stage, progress: &dyn ProgressReporter) {
    info!(stage = ?stage, "{stage}");
    progress.phase(stage);
}

/// Text gathered in the fetch (and clean) stages.
enum Gathered {
    Conversation(String),
    Document {
        main_text: String,
        linked_content: String,
        comments: Vec<String>,
    },
}

/// Run the full pipeline once.
///
/// `Ok(None)` is a soft failure: the source yielded nothing or the model
/// output could not be recovered. Stages run in order and none is retried.
#[instrument(skip_all, fields(source = %request.source, input = %request.input))]
pub async fn run(
    request: &RunRequest,
    settings: &PipelineSettings,
    services: &Services,
    progress: &dyn ProgressReporter,
) -> Result<Option<RunOutcome>> {
    let start = Instant::now();
    let run_id = RunId::new();
    info!(%run_id, "starting blog generation");

    // --- Fetch / Clean ---
    let gathered = match request.source {
        SourceType::Slack => gather_thread(&request.input, services, progress).await?,
        SourceType::Gdoc => gather_document(&request.input, settings, services, progress).await?,
    };
    let Some(gathered) = gathered else {
        return Ok(None);
    };

    let material = match &gathered {
        Gathered::Conversation(text) => SourceMaterial::Conversation(text),
        Gathered::Document {
            main_text,
            linked_content,
            comments,
        } => SourceMaterial::Document {
            main_text,
            linked_content,
            comments,
        },
    };
    let idea_text = match &material {
        SourceMaterial::Conversation(text) => *text,
        SourceMaterial::Document { main_text, .. } => *main_text,
    };

    // --- Summarize ---
    enter(Stage::Summarize, progress);
    let idea = generate_idea(
        services.assistant.as_ref(),
        &services.prompts,
        request.source,
        idea_text,
    )
    .await?;

    // --- Related documentation ---
    enter(Stage::LookupLinks, progress);
    let links = services.related.find_links(&idea).await.unwrap_or_default();

    // --- Generate ---
    enter(Stage::Generate, progress);
    let Some(assets) = generate_blog_assets(
        services.writer.as_ref(),
        &services.prompts,
        &material,
        &links,
    )
    .await?
    else {
        warn!("blog generation produced no usable output");
        return Ok(None);
    };

    // --- Images ---
    enter(Stage::MaterializeImages, progress);
    let post = materialize_images(
        &assets.blog_markdown_content,
        &assets.image_prompts,
        services.images.as_ref(),
        &settings.image_dir,
    )
    .await;

    // --- Export ---
    enter(Stage::Export, progress);
    let output_path = request
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&settings.output_dir, Local::now().naive_local()));
    autoblog_markdown::export_docx(&post.markdown, &output_path)?;

    if let Some(registry) = &services.registry {
        let record = GeneratedFile {
            id: run_id.clone(),
            source: request.source,
            input: request.input.clone(),
            output_path: output_path.display().to_string(),
            created_at: Utc::now(),
        };
        if let Err(e) = registry.record(&record).await {
            warn!(error = %e, "failed to record generated file");
        }
    }

    let outcome = RunOutcome {
        run_id,
        output_path,
        images: post.images.len(),
        image_failures: post.failures,
        elapsed: start.elapsed(),
    };
    progress.done(&outcome);

    info!(
        run_id = %outcome.run_id,
        output = %outcome.output_path.display(),
        images = outcome.images,
        image_failures = outcome.image_failures,
        elapsed_ms = outcome.elapsed.as_millis() as u64,
        "blog generation complete"
    );

    Ok(Some(outcome))
}

async fn gather_thread(
    permalink: &str,
    services: &Services,
    progress: &dyn ProgressReporter,
) -> Result<Option<Gathered>> {
    enter(Stage::Fetch, progress);
    let threads = services
        .threads
        .as_deref()
        .ok_or_else(|| AutoblogError::config("no Slack token configured"))?;

    let messages = threads.fetch_thread(permalink).await;
    let conversation = format_conversation(&messages);
    if conversation.trim().is_empty() {
        warn!(
            messages = messages.len(),
            "Slack thread yielded no user messages"
        );
        return Ok(None);
    }

    enter(Stage::Clean, progress);
    let cleaned = clean_conversation(
        services.assistant.as_ref(),
        &services.prompts,
        &conversation,
    )
    .await?;
    Ok(Some(Gathered::Conversation(cleaned)))
}

async fn gather_document(
    url: &str,
    settings: &PipelineSettings,
    services: &Services,
    progress: &dyn ProgressReporter,
) -> Result<Option<Gathered>> {
    enter(Stage::Fetch, progress);
    let doc_id = extract_doc_id(url)
        .ok_or_else(|| AutoblogError::validation(format!("not a Google Doc URL: {url}")))?;

    let Some(document) = services
        .documents
        .read_document(&doc_id, ReadOptions::default())
        .await?
    else {
        warn!(%doc_id, "document is not accessible");
        return Ok(None);
    };

    let enricher = LinkEnricher::new(
        services.documents.as_ref(),
        &services.web,
        settings.ignored_domains.clone(),
        settings.link_content_limit,
    );
    let linked = enricher.enrich(&document.text, Some(&doc_id)).await;

    let mut comments = document.comments;
    comments.extend(linked.comments);

    Ok(Some(Gathered::Document {
        main_text: document.text,
        linked_content: linked.text,
        comments,
    }))
}


#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::NaiveDate;

    use autoblog_shared::{BlogIdea, DocumentAssets, DocumentationLink, ThreadMessage};

    use super::*;
    use crate::images::mock::FakeImages;
    use crate::llm::mock::ScriptedModel;

    const SLACK_URL: &str = "https://acme.slack.com/archives/C1/p1700000000123456";
    const IDEA: &str = "Title: Taming Replica Lag\nAudience: Platform engineers\n\
                        Takeaway: Follower reads cut latency\nKapaAIinput: follower reads, lag";
    const ASSETS: &str = r##"Here you go:
{
    "blog_markdown_content": "# Taming Replica Lag\n\nReplicas fall behind.\n\n[IMAGE_1]\n\n## Key Takeaways\n\n- Use follower reads",
    "image_prompts": [{"placeholder": "[IMAGE_1]", "prompt": "Leader and two followers"}]
}"##;

    struct FakeThread(Vec<ThreadMessage>);

    #[async_trait]
    impl ThreadSource for FakeThread {
        async fn fetch_thread(&self, _permalink: &str) -> Vec<ThreadMessage> {
            self.0.clone()
        }
    }

    /// Serves `MAIN` (which links to `NESTED`) and `NESTED`; anything else is denied.
    struct FakeDocs;

    #[async_trait]
    impl DocumentSource for FakeDocs {
        async fn read_document(
            &self,
            doc_id: &str,
            _opts: ReadOptions,
        ) -> Result<Option<DocumentAssets>> {
            Ok(match doc_id {
                "MAIN" => Some(DocumentAssets {
                    text: "Tablet splitting design. See (https://docs.google.com/document/d/NESTED/edit)"
                        .into(),
                    image_paths: Vec::new(),
                    comments: vec!["Comment from Ann: what about hot keys?".into()],
                }),
                "NESTED" => Some(DocumentAssets {
                    text: "Appendix on hot keys".into(),
                    image_paths: Vec::new(),
                    comments: vec!["Comment from Bo: covered".into()],
                }),
                _ => None,
            })
        }
    }

    /// Answers idea prompts with a fixed idea and echoes everything else.
    struct Assistant;

    #[async_trait]
    impl LanguageModel for Assistant {
        async fn generate(&self, prompt: &str) -> Result<String> {
            if prompt.contains("TASK: Generate Blog Idea") {
                Ok(IDEA.to_string())
            } else {
                Ok(prompt.to_string())
            }
        }
    }

    /// Lets a test keep a handle on the writer's recorded prompts.
    struct SharedModel(Arc<ScriptedModel>);

    #[async_trait]
    impl LanguageModel for SharedModel {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.0.generate(prompt).await
        }
    }

    struct FixedLinks(Option<Vec<DocumentationLink>>);

    #[async_trait]
    impl RelatedContent for FixedLinks {
        async fn find_links(&self, _idea: &BlogIdea) -> Option<Vec<DocumentationLink>> {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        stages: Mutex<Vec<Stage>>,
        finished: Mutex<bool>,
    }

    impl ProgressReporter for RecordingProgress {
        fn phase(&self, stage: Stage) {
            self.stages.lock().expect("lock").push(stage);
        }
        fn done(&self, _outcome: &RunOutcome) {
            *self.finished.lock().expect("lock") = true;
        }
    }

    fn message(user: &str, text: &str) -> ThreadMessage {
        ThreadMessage {
            kind: "message".into(),
            author_id: Some(user.into()),
            text: text.into(),
            timestamp: None,
        }
    }

    fn three_message_thread() -> FakeThread {
        FakeThread(vec![
            message("U1", "Replica lag spiked to 30s on the EU cluster"),
            message("U2", "Are you reading from followers?"),
            message("U1", "Switched to follower reads, lag is gone"),
        ])
    }

    fn one_link() -> FixedLinks {
        FixedLinks(Some(vec![DocumentationLink {
            url: "https://docs.acme.dev/follower-reads".into(),
            title: "Follower reads".into(),
        }]))
    }

    fn services(
        threads: Option<FakeThread>,
        writer: &Arc<ScriptedModel>,
        related: FixedLinks,
        images: FakeImages,
    ) -> Services {
        Services {
            threads: threads.map(|t| Box::new(t) as Box<dyn ThreadSource>),
            documents: Box::new(FakeDocs),
            web: WebPageFetcher::new().expect("fetcher"),
            assistant: Box::new(Assistant),
            writer: Box::new(SharedModel(Arc::clone(writer))),
            related: Box::new(related),
            images: Box::new(images),
            prompts: PromptSet::new("Acme").expect("prompts"),
            registry: None,
        }
    }

    fn settings(root: &Path) -> PipelineSettings {
        PipelineSettings {
            output_dir: root.join("output"),
            image_dir: root.join("images"),
            ignored_domains: vec!["jira".into()],
            link_content_limit: 1000,
        }
    }

    fn request(source: SourceType, input: &str, output: Option<PathBuf>) -> RunRequest {
        RunRequest {
            source,
            input: input.into(),
            output,
        }
    }

    fn document_xml(path: &Path) -> String {
        let file = std::fs::File::open(path).expect("open docx");
        let mut archive = zip::ZipArchive::new(file).expect("zip");
        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .expect("document.xml")
            .read_to_string(&mut xml)
            .expect("read");
        xml
    }

    #[tokio::test]
    async fn slack_thread_to_docx_with_failed_image() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = Arc::new(ScriptedModel::new(vec![ASSETS]));
        let mut services = services(
            Some(three_message_thread()),
            &writer,
            one_link(),
            FakeImages::always_failing(),
        );
        services.registry = Some(
            Registry::open(&dir.path().join("registry.db"))
                .await
                .expect("registry"),
        );
        let progress = RecordingProgress::default();
        let output = dir.path().join("post.docx");

        let outcome = run(
            &request(SourceType::Slack, SLACK_URL, Some(output.clone())),
            &settings(dir.path()),
            &services,
            &progress,
        )
        .await
        .expect("run")
        .expect("outcome");

        assert_eq!(outcome.output_path, output);
        assert_eq!(outcome.images, 0);
        assert_eq!(outcome.image_failures, 1);

        let xml = document_xml(&output);
        assert!(xml.contains("Taming Replica Lag"));
        assert!(xml.contains("Image generation failed"));
        assert!(!xml.contains("[IMAGE_1]"));

        assert_eq!(
            *progress.stages.lock().expect("lock"),
            vec![
                Stage::Fetch,
                Stage::Clean,
                Stage::Summarize,
                Stage::LookupLinks,
                Stage::Generate,
                Stage::MaterializeImages,
                Stage::Export,
            ]
        );
        assert!(*progress.finished.lock().expect("lock"));

        // The cleanup step echoes, so the writer sees the formatted thread.
        let prompts = writer.prompts.lock().expect("lock");
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("From: U2\nAre you reading from followers?"));
        assert!(prompts[0].contains(
            r#"[["https://docs.acme.dev/follower-reads","Follower reads"]]"#
        ));

        let recorded = services
            .registry
            .as_ref()
            .expect("registry")
            .list(10)
            .await
            .expect("list");
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].id, outcome.run_id);
        assert_eq!(recorded[0].source, SourceType::Slack);
        assert_eq!(recorded[0].input, SLACK_URL);
    }

    #[tokio::test]
    async fn empty_thread_stops_before_any_model_call() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = Arc::new(ScriptedModel::new(Vec::new()));
        let services = services(
            Some(FakeThread(Vec::new())),
            &writer,
            one_link(),
            FakeImages::default(),
        );
        let progress = RecordingProgress::default();

        let outcome = run(
            &request(SourceType::Slack, SLACK_URL, None),
            &settings(dir.path()),
            &services,
            &progress,
        )
        .await
        .expect("run");

        assert!(outcome.is_none());
        assert_eq!(*progress.stages.lock().expect("lock"), vec![Stage::Fetch]);
        assert_eq!(writer.call_count(), 0);
        assert!(!dir.path().join("output").exists());
    }

    #[tokio::test]
    async fn slack_source_requires_a_thread_reader() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = Arc::new(ScriptedModel::new(Vec::new()));
        let services = services(None, &writer, one_link(), FakeImages::default());

        let err = run(
            &request(SourceType::Slack, SLACK_URL, None),
            &settings(dir.path()),
            &services,
            &SilentProgress,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AutoblogError::Config { .. }));
    }

    #[tokio::test]
    async fn unrecoverable_generation_is_a_soft_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = Arc::new(ScriptedModel::new(vec!["I'd rather not."]));
        let services = services(
            Some(three_message_thread()),
            &writer,
            FixedLinks(None),
            FakeImages::default(),
        );

        let outcome = run(
            &request(SourceType::Slack, SLACK_URL, None),
            &settings(dir.path()),
            &services,
            &SilentProgress,
        )
        .await
        .expect("run");

        assert!(outcome.is_none());
        assert_eq!(writer.call_count(), 1);
        assert!(!dir.path().join("output").exists());
    }

    #[tokio::test]
    async fn google_doc_gathers_linked_docs_and_comments() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = Arc::new(ScriptedModel::new(vec![ASSETS]));
        let services = services(None, &writer, FixedLinks(None), FakeImages::default());
        let progress = RecordingProgress::default();

        let outcome = run(
            &request(
                SourceType::Gdoc,
                "https://docs.google.com/document/d/MAIN/edit",
                None,
            ),
            &settings(dir.path()),
            &services,
            &progress,
        )
        .await
        .expect("run")
        .expect("outcome");

        assert!(outcome.output_path.starts_with(dir.path().join("output")));
        assert_eq!(outcome.images, 1);
        assert!(!progress.stages.lock().expect("lock").contains(&Stage::Clean));

        let prompts = writer.prompts.lock().expect("lock");
        assert!(prompts[0].contains("Tablet splitting design."));
        assert!(prompts[0].contains(
            "--- CONTENT FROM LINKED DOC: https://docs.google.com/document/d/NESTED/edit ---"
        ));
        assert!(prompts[0].contains("Appendix on hot keys"));
        assert!(
            prompts[0].contains("Comment from Ann: what about hot keys?\nComment from Bo: covered")
        );
        assert!(!prompts[0].contains("Relevant Documentation Links:"));

        let xml = document_xml(&outcome.output_path);
        assert!(!xml.contains("[IMAGE_1]"));
    }

    #[tokio::test]
    async fn inaccessible_document_is_a_soft_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = Arc::new(ScriptedModel::new(Vec::new()));
        let services = services(None, &writer, FixedLinks(None), FakeImages::default());

        let outcome = run(
            &request(
                SourceType::Gdoc,
                "https://docs.google.com/document/d/LOCKED/view",
                None,
            ),
            &settings(dir.path()),
            &services,
            &SilentProgress,
        )
        .await
        .expect("run");
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn non_document_url_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = Arc::new(ScriptedModel::new(Vec::new()));
        let services = services(None, &writer, FixedLinks(None), FakeImages::default());

        let err = run(
            &request(SourceType::Gdoc, "https://example.com/not-a-doc", None),
            &settings(dir.path()),
            &services,
            &SilentProgress,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AutoblogError::Validation { .. }));
    }

    #[test]
    fn default_output_name_is_timestamped() {
        let now = NaiveDate::from_ymd_opt(2025, 3, 7)
            .and_then(|d| d.and_hms_opt(9, 5, 1))
            .expect("valid date");
        assert_eq!(
            default_output_path(Path::new("output"), now),
            PathBuf::from("output/blog_post_20250307_090501.docx")
        );
    }
}
