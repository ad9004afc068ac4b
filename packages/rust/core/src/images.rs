//! Diagram generation and placeholder substitution.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::seq::IndexedRandom;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use autoblog_shared::{AutoblogError, GeneratedImage, ImagePrompt, Result};

use crate::http_client;
use crate::llm::VertexEndpoint;

/// Steers the image model away from cluttered, unreadable diagrams.
pub const NEGATIVE_PROMPT: &str =
    "noisy, overlapped text, clutter, complex background, messy text, spelling mistakes, confusing arrows";

/// Aspect ratios picked from at random for each image.
pub const ASPECT_RATIOS: [&str; 3] = ["1:1", "4:3", "3:4"];

const GUIDANCE_SCALE: f32 = 10.0;

/// Characters of the prompt kept as alt text.
const ALT_TEXT_CHARS: usize = 50;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(IMAGE_\d+)\]").expect("valid regex"));

/// Renders one image for a text prompt.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Write a single image for `prompt` to `output`.
    async fn generate(&self, prompt: &str, output: &Path) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Imagen
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct PredictRequest<'a> {
    instances: [Instance<'a>; 1],
    parameters: Parameters<'a>,
}

#[derive(Serialize)]
struct Instance<'a> {
    prompt: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Parameters<'a> {
    sample_count: u32,
    negative_prompt: &'a str,
    aspect_ratio: &'a str,
    guidance_scale: f32,
}

#[derive(Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    #[serde(default)]
    bytes_base64_encoded: Option<String>,
}

/// An Imagen model served by Vertex AI `predict`.
pub struct VertexImagen {
    client: Client,
    endpoint: VertexEndpoint,
    model: String,
}

impl VertexImagen {
    pub fn new(endpoint: VertexEndpoint, model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client(std::time::Duration::from_secs(180))?,
            endpoint,
            model: model.into(),
        })
    }
}

#[async_trait]
impl ImageGenerator for VertexImagen {
    #[instrument(skip_all, fields(model = %self.model, output = %output.display()))]
    async fn generate(&self, prompt: &str, output: &Path) -> Result<()> {
        let aspect_ratio = ASPECT_RATIOS
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or(ASPECT_RATIOS[0]);

        let body = PredictRequest {
            instances: [Instance { prompt }],
            parameters: Parameters {
                sample_count: 1,
                negative_prompt: NEGATIVE_PROMPT,
                aspect_ratio,
                guidance_scale: GUIDANCE_SCALE,
            },
        };

        let response = self
            .client
            .post(self.endpoint.model_url(&self.model, "predict"))
            .bearer_auth(self.endpoint.access_token())
            .json(&body)
            .send()
            .await
            .map_err(|e| AutoblogError::Network(format!("imagen: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AutoblogError::api("imagen", status.as_u16(), text));
        }

        let parsed: PredictResponse = response
            .json()
            .await
            .map_err(|e| AutoblogError::parse(format!("imagen response: {e}")))?;

        // Filtered prompts come back with no predictions.
        let encoded = parsed
            .predictions
            .into_iter()
            .find_map(|p| p.bytes_base64_encoded)
            .ok_or_else(|| AutoblogError::Llm("imagen returned no image".into()))?;
        let bytes = STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| AutoblogError::parse(format!("imagen image payload: {e}")))?;

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AutoblogError::io(parent, e))?;
        }
        tokio::fs::write(output, &bytes)
            .await
            .map_err(|e| AutoblogError::io(output, e))?;

        debug!(aspect_ratio, bytes = bytes.len(), "image written");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Substitution
// ---------------------------------------------------------------------------

/// Markdown with every placeholder resolved, plus the images that were made.
#[derive(Debug, Clone, Default)]
pub struct MaterializedPost {
    pub markdown: String,
    pub images: Vec<GeneratedImage>,
    /// Placeholders replaced by a failure marker.
    pub failures: usize,
}

/// Inline marker left where an image could not be produced.
pub fn failure_marker(reason: impl std::fmt::Display) -> String {
    format!("*[Image generation failed: {reason}]*")
}

/// Generate an image per prompt, in order, and substitute its placeholder.
///
/// A failed image is replaced by [`failure_marker`] and the run continues.
/// Prompts whose placeholder never occurs are skipped. Any `[IMAGE_n]`
/// left without a prompt afterwards is also replaced by a marker.
#[instrument(skip_all, fields(prompts = prompts.len()))]
pub async fn materialize_images(
    markdown: &str,
    prompts: &[ImagePrompt],
    generator: &dyn ImageGenerator,
    image_dir: &Path,
) -> MaterializedPost {
    let mut post = MaterializedPost {
        markdown: markdown.to_string(),
        ..Default::default()
    };

    for (i, entry) in prompts.iter().enumerate() {
        if entry.placeholder.is_empty() || entry.prompt.is_empty() {
            debug!(index = i, "skipping incomplete image prompt");
            continue;
        }
        if !post.markdown.contains(&entry.placeholder) {
            warn!(placeholder = %entry.placeholder, "placeholder not found in post, skipping prompt");
            continue;
        }

        let path: PathBuf = image_dir.join(format!("blog_image_{}.png", i + 1));
        let replacement = match generator.generate(&entry.prompt, &path).await {
            Ok(()) => {
                info!(placeholder = %entry.placeholder, path = %path.display(), "image generated");
                let alt = alt_text(&entry.prompt);
                // Angle brackets keep paths with spaces parseable.
                let image_ref = format!("![{alt}...](<{}>)", path.display());
                post.images.push(GeneratedImage {
                    prompt: entry.prompt.clone(),
                    output_path: path,
                });
                image_ref
            }
            Err(e) => {
                warn!(placeholder = %entry.placeholder, error = %e, "image generation failed");
                post.failures += 1;
                failure_marker(e)
            }
        };
        post.markdown = post.markdown.replace(&entry.placeholder, &replacement);
    }

    let mut orphans = 0;
    let resolved = PLACEHOLDER_RE.replace_all(&post.markdown, |caps: &regex::Captures<'_>| {
        orphans += 1;
        failure_marker(format!("no prompt was provided for {}", &caps[1]))
    });
    if orphans > 0 {
        warn!(count = orphans, "placeholders without a prompt were replaced");
        post.markdown = resolved.into_owned();
        post.failures += orphans;
    }

    post
}

/// First characters of a prompt, with brackets dropped so the markdown
/// image syntax stays intact.
fn alt_text(prompt: &str) -> String {
    autoblog_markdown::truncate_chars(prompt, ALT_TEXT_CHARS)
        .chars()
        .filter(|c| !matches!(c, '[' | ']'))
        .collect()
}

#[cfg(test)]
pub(crate) mod mock {
    use std::sync::Mutex;

    use super::*;

    /// Records every request; fails for prompts containing `fail_on`.
    #[derive(Default)]
    pub struct FakeImages {
        pub fail_on: Option<&'static str>,
        pub requests: Mutex<Vec<(String, PathBuf)>>,
    }

    impl FakeImages {
        pub fn always_failing() -> Self {
            Self {
                fail_on: Some(""),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl ImageGenerator for FakeImages {
        async fn generate(&self, prompt: &str, output: &Path) -> Result<()> {
            self.requests
                .lock()
                .expect("lock")
                .push((prompt.to_string(), output.to_path_buf()));
            match self.fail_on {
                Some(needle) if prompt.contains(needle) => {
                    Err(AutoblogError::api("imagen", 400, "prompt blocked"))
                }
                _ => Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::mock::FakeImages;
    use super::*;

    fn prompt(placeholder: &str, text: &str) -> ImagePrompt {
        ImagePrompt {
            placeholder: placeholder.into(),
            prompt: text.into(),
        }
    }

    #[tokio::test]
    async fn success_replaces_placeholder_with_image() {
        let images = FakeImages::default();
        let post = materialize_images(
            "# Post\n\n[IMAGE_1]\n\nBody",
            &[prompt("[IMAGE_1]", "A [simple] diagram of two replicas")],
            &images,
            Path::new("images"),
        )
        .await;

        assert!(!post.markdown.contains("[IMAGE_1]"));
        assert_eq!(post.markdown.matches("![").count(), 1);
        assert!(
            post.markdown
                .contains("![A simple diagram of two replicas...](<images/blog_image_1.png>)")
        );
        assert_eq!(post.images.len(), 1);
        assert_eq!(post.failures, 0);
    }

    #[tokio::test]
    async fn failure_leaves_marker_and_continues() {
        let images = FakeImages {
            fail_on: Some("boom"),
            ..Default::default()
        };
        let post = materialize_images(
            "[IMAGE_1] then [IMAGE_2]",
            &[prompt("[IMAGE_1]", "boom"), prompt("[IMAGE_2]", "fine")],
            &images,
            Path::new("out"),
        )
        .await;

        assert!(!post.markdown.contains("[IMAGE_1]"));
        assert_eq!(post.markdown.matches("*[Image generation failed:").count(), 1);
        assert!(post.markdown.contains("prompt blocked"));
        assert!(post.markdown.contains("(<out/blog_image_2.png>)"));
        assert_eq!(post.failures, 1);
    }

    #[tokio::test]
    async fn repeated_placeholder_is_replaced_everywhere() {
        let images = FakeImages::default();
        let post = materialize_images(
            "[IMAGE_1] and again [IMAGE_1]",
            &[prompt("[IMAGE_1]", "diagram")],
            &images,
            Path::new("img"),
        )
        .await;
        assert_eq!(post.markdown.matches("](<img/blog_image_1.png>)").count(), 2);
        assert_eq!(images.requests.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn unused_prompts_are_skipped_and_orphans_marked() {
        let images = FakeImages::default();
        let post = materialize_images(
            "Intro [IMAGE_3] outro",
            &[prompt("[IMAGE_1]", "unused"), prompt("", "no placeholder")],
            &images,
            Path::new("img"),
        )
        .await;

        assert!(images.requests.lock().expect("lock").is_empty());
        assert_eq!(
            post.markdown,
            "Intro *[Image generation failed: no prompt was provided for IMAGE_3]* outro"
        );
        assert!(!PLACEHOLDER_RE.is_match(&post.markdown));
        assert_eq!(post.failures, 1);
    }

    #[tokio::test]
    async fn files_are_numbered_by_prompt_position() {
        let images = FakeImages::default();
        materialize_images(
            "[IMAGE_2]",
            &[prompt("[IMAGE_1]", "absent"), prompt("[IMAGE_2]", "present")],
            &images,
            Path::new("img"),
        )
        .await;
        let requests = images.requests.lock().expect("lock");
        assert_eq!(requests[0].1, PathBuf::from("img/blog_image_2.png"));
    }

    /// Writes a valid 1x1 PNG for every prompt.
    struct PngWriter;

    #[async_trait]
    impl ImageGenerator for PngWriter {
        async fn generate(&self, _prompt: &str, output: &Path) -> Result<()> {
            const TINY_PNG: &[u8] = &[
                0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49,
                0x48, 0x44, 0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06,
                0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44,
                0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D,
                0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42,
                0x60, 0x82,
            ];
            tokio::fs::create_dir_all(output.parent().expect("parent"))
                .await
                .expect("mkdir");
            tokio::fs::write(output, TINY_PNG).await.expect("write png");
            Ok(())
        }
    }

    #[tokio::test]
    async fn image_dir_with_spaces_is_embedded_on_export() {
        let dir = tempfile::tempdir().expect("tempdir");
        let image_dir = dir.path().join("my images");
        let post = materialize_images(
            "# Post\n\n[IMAGE_1]\n",
            &[prompt("[IMAGE_1]", "A diagram")],
            &PngWriter,
            &image_dir,
        )
        .await;
        assert_eq!(post.images.len(), 1);

        let out = dir.path().join("post.docx");
        autoblog_markdown::export_docx(&post.markdown, &out).expect("export");

        let archive = zip::ZipArchive::new(std::fs::File::open(&out).expect("open docx"))
            .expect("zip archive");
        assert!(archive.file_names().any(|name| name.starts_with("word/media/")));
    }

    #[tokio::test]
    async fn imagen_writes_decoded_prediction() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(
                "/v1/projects/p1/locations/us-central1/publishers/google/models/imagen-test:predict",
            ))
            .and(header("authorization", "Bearer tok"))
            .and(body_partial_json(serde_json::json!({
                "instances": [{"prompt": "two boxes"}],
                "parameters": {
                    "sampleCount": 1,
                    "negativePrompt": NEGATIVE_PROMPT,
                    "guidanceScale": 10.0
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "predictions": [{"mimeType": "image/png", "bytesBase64Encoded": STANDARD.encode(b"PNGDATA")}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        let output = dir.path().join("nested").join("blog_image_1.png");
        let imagen = VertexImagen::new(
            VertexEndpoint::new("p1", "us-central1", "tok").with_base_url(server.uri()),
            "imagen-test",
        )
        .expect("client");

        imagen.generate("two boxes", &output).await.expect("generate");
        assert_eq!(std::fs::read(&output).expect("read"), b"PNGDATA");

        let requests = server.received_requests().await.expect("recorded");
        let body: serde_json::Value = requests[0].body_json().expect("json body");
        let ratio = body["parameters"]["aspectRatio"].as_str().expect("ratio");
        assert!(ASPECT_RATIOS.contains(&ratio));
    }

    #[tokio::test]
    async fn imagen_without_predictions_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"predictions": []})),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        let imagen = VertexImagen::new(
            VertexEndpoint::new("p1", "us-central1", "tok").with_base_url(server.uri()),
            "imagen-test",
        )
        .expect("client");

        let err = imagen
            .generate("filtered", &dir.path().join("x.png"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no image"));
    }
}
