//! Application configuration for Autoblog.
//!
//! User config lives at `~/.autoblog/autoblog.toml`. Environment variables
//! override config file values, which override defaults. Secrets never live
//! in the file: it only names the environment variables that hold them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AutoblogError, Result};
use crate::types::SourceType;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "autoblog.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".autoblog";

// ---------------------------------------------------------------------------
// Config structs (matching autoblog.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Vertex AI (Gemini / Imagen) and Google Workspace settings.
    #[serde(default)]
    pub google: GoogleConfig,

    /// Slack Web API settings.
    #[serde(default)]
    pub slack: SlackConfig,

    /// Kapa related-content service settings.
    #[serde(default)]
    pub kapa: KapaConfig,

    /// Output locations.
    #[serde(default)]
    pub output: OutputConfig,

    /// Link enrichment policy.
    #[serde(default)]
    pub links: LinksConfig,

    /// Editorial settings injected into prompts.
    #[serde(default)]
    pub blog: BlogConfig,
}

/// `[google]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    /// Cloud project hosting the Vertex AI models.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    /// Vertex AI region.
    #[serde(default = "default_location")]
    pub location: String,

    /// Model used for the cleanup and idea steps.
    #[serde(default = "default_model")]
    pub model: String,

    /// Model used for structured blog generation.
    #[serde(default = "default_blog_model")]
    pub blog_model: String,

    /// Imagen model used for diagrams.
    #[serde(default = "default_image_model")]
    pub image_model: String,

    /// Name of the env var holding an OAuth access token. When unset, the
    /// token is minted with `gcloud auth print-access-token`.
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            location: default_location(),
            model: default_model(),
            blog_model: default_blog_model(),
            image_model: default_image_model(),
            access_token_env: default_access_token_env(),
        }
    }
}

fn default_location() -> String {
    "us-central1".into()
}
fn default_model() -> String {
    "gemini-2.0-flash-001".into()
}
fn default_blog_model() -> String {
    "gemini-2.5-pro".into()
}
fn default_image_model() -> String {
    "imagen-4.0-fast-generate-preview-06-06".into()
}
fn default_access_token_env() -> String {
    "GOOGLE_ACCESS_TOKEN".into()
}

/// `[slack]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    /// Name of the env var holding the bot/user token.
    #[serde(default = "default_slack_token_env")]
    pub token_env: String,

    /// Page size for `conversations.replies`.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            token_env: default_slack_token_env(),
            page_size: default_page_size(),
        }
    }
}

fn default_slack_token_env() -> String {
    "SLACK_TOKEN".into()
}
fn default_page_size() -> u32 {
    200
}

/// `[kapa]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KapaConfig {
    /// Name of the env var holding the API key.
    #[serde(default = "default_kapa_key_env")]
    pub api_key_env: String,

    /// Service base URL.
    #[serde(default = "default_kapa_base_url")]
    pub base_url: String,

    /// Kapa project to query.
    #[serde(default = "default_kapa_project_id")]
    pub project_id: String,
}

impl Default for KapaConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_kapa_key_env(),
            base_url: default_kapa_base_url(),
            project_id: default_kapa_project_id(),
        }
    }
}

fn default_kapa_key_env() -> String {
    "KAPA_API_KEY".into()
}
fn default_kapa_base_url() -> String {
    "https://api.kapa.ai".into()
}
fn default_kapa_project_id() -> String {
    "5e2862a7-aeac-4a87-8593-c1fd2842a7cd".into()
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for exported documents.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Directory for downloaded and generated images.
    #[serde(default = "default_image_dir")]
    pub image_dir: String,

    /// Path of the generated-file registry database. Disabled when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_path: Option<String>,

    /// Maximum characters kept from each linked web page.
    #[serde(default = "default_link_content_limit")]
    pub link_content_limit: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            image_dir: default_image_dir(),
            registry_path: None,
            link_content_limit: default_link_content_limit(),
        }
    }
}

fn default_output_dir() -> String {
    "output".into()
}
fn default_image_dir() -> String {
    "images".into()
}
fn default_link_content_limit() -> usize {
    1000
}

/// `[links]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinksConfig {
    /// Substrings of URLs that are never fetched during enrichment.
    #[serde(default = "default_ignored_domains")]
    pub ignored_domains: Vec<String>,
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            ignored_domains: default_ignored_domains(),
        }
    }
}

fn default_ignored_domains() -> Vec<String> {
    vec!["jira".into(), "atlassian.net".into(), "emojipedia".into()]
}

/// `[blog]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogConfig {
    /// Company the posts are written for.
    #[serde(default = "default_company")]
    pub company: String,
}

impl Default for BlogConfig {
    fn default() -> Self {
        Self {
            company: default_company(),
        }
    }
}

fn default_company() -> String {
    "Yugabyte".into()
}

// ---------------------------------------------------------------------------
// Environment overrides and credentials
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides using `lookup` to read variables.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(v) = get("GOOGLE_PROJECT_ID") {
            self.google.project_id = Some(v);
        }
        if let Some(v) = get("GOOGLE_LOCATION") {
            self.google.location = v;
        }
        if let Some(v) = get("VERTEX_AI_MODEL") {
            self.google.model = v;
        }
        if let Some(v) = get("OUTPUT_DIR") {
            self.output.output_dir = v;
        }
        if let Some(v) = get("IMAGE_OUTPUT_DIR") {
            self.output.image_dir = v;
        }
        if let Some(v) = get("KAPA_BASE_URL") {
            self.kapa.base_url = v;
        }
    }

    /// Resolve every secret the pipeline needs for `source`.
    ///
    /// Fails before any network call, listing all missing variables at once.
    pub fn credentials(&self, source: SourceType) -> Result<Credentials> {
        self.credentials_with(
            source,
            |name| std::env::var(name).ok(),
            gcloud_access_token,
        )
    }

    /// Like [`AppConfig::credentials`], with injectable env lookup and token minting.
    pub fn credentials_with(
        &self,
        source: SourceType,
        lookup: impl Fn(&str) -> Option<String>,
        mint_token: impl FnOnce() -> Result<String>,
    ) -> Result<Credentials> {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());
        let mut missing: Vec<&str> = Vec::new();

        let slack_token = match source {
            SourceType::Slack => {
                let token = get(&self.slack.token_env);
                if token.is_none() {
                    missing.push(&self.slack.token_env);
                }
                token
            }
            SourceType::Gdoc => None,
        };

        let project_id = self.google.project_id.clone().filter(|p| !p.is_empty());
        if project_id.is_none() {
            missing.push("GOOGLE_PROJECT_ID");
        }

        let kapa_api_key = get(&self.kapa.api_key_env);
        if kapa_api_key.is_none() {
            missing.push(&self.kapa.api_key_env);
        }

        if !missing.is_empty() {
            return Err(AutoblogError::config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let google_access_token = match get(&self.google.access_token_env) {
            Some(token) => token,
            None => mint_token().map_err(|e| {
                AutoblogError::config(format!(
                    "no Google access token: set {} or log in with gcloud ({e})",
                    self.google.access_token_env
                ))
            })?,
        };

        Ok(Credentials {
            slack_token,
            google_project_id: project_id.unwrap_or_default(),
            google_access_token,
            kapa_api_key: kapa_api_key.unwrap_or_default(),
        })
    }
}

/// Secrets resolved at startup and handed to each client.
#[derive(Clone)]
pub struct Credentials {
    /// Present only for the Slack source.
    pub slack_token: Option<String>,
    pub google_project_id: String,
    /// OAuth bearer token for Docs, Drive and Vertex AI.
    pub google_access_token: String,
    pub kapa_api_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("slack_token", &self.slack_token.as_ref().map(|_| "***"))
            .field("google_project_id", &self.google_project_id)
            .field("google_access_token", &"***")
            .field("kapa_api_key", &"***")
            .finish()
    }
}

/// Mint an access token from the local gcloud login.
fn gcloud_access_token() -> Result<String> {
    let output = std::process::Command::new("gcloud")
        .args(["auth", "print-access-token"])
        .output()
        .map_err(|e| AutoblogError::config(format!("failed to run gcloud: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AutoblogError::config(format!(
            "gcloud exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(AutoblogError::config("gcloud returned an empty token"));
    }
    tracing::debug!("minted Google access token via gcloud");
    Ok(token)
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.autoblog/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| AutoblogError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.autoblog/autoblog.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk and apply environment overrides.
/// Falls back to defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    let mut config = if path.exists() {
        load_config_from(&path)?
    } else {
        tracing::debug!(?path, "config file not found, using defaults");
        AppConfig::default()
    };
    config.apply_env_overrides();
    Ok(config)
}

/// Load the application config from a specific file path (no env overrides).
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| AutoblogError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| AutoblogError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| AutoblogError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| AutoblogError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| AutoblogError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn no_gcloud() -> Result<String> {
        Err(AutoblogError::config("gcloud unavailable in tests"))
    }

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("SLACK_TOKEN"));
        assert!(toml_str.contains("gemini-2.5-pro"));
        assert!(!toml_str.contains("registry_path"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let toml_str = r#"
[google]
project_id = "demo-project"

[output]
output_dir = "/tmp/blogs"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.google.project_id.as_deref(), Some("demo-project"));
        assert_eq!(config.google.location, "us-central1");
        assert_eq!(config.output.output_dir, "/tmp/blogs");
        assert_eq!(config.output.image_dir, "images");
        assert_eq!(config.links.ignored_domains.len(), 3);
    }

    #[test]
    fn env_overrides_win() {
        let mut config = AppConfig::default();
        config.apply_overrides_from(env(&[
            ("GOOGLE_PROJECT_ID", "p1"),
            ("VERTEX_AI_MODEL", "gemini-x"),
            ("IMAGE_OUTPUT_DIR", "/tmp/img"),
            ("KAPA_BASE_URL", ""),
        ]));
        assert_eq!(config.google.project_id.as_deref(), Some("p1"));
        assert_eq!(config.google.model, "gemini-x");
        assert_eq!(config.output.image_dir, "/tmp/img");
        // Empty values are ignored.
        assert_eq!(config.kapa.base_url, "https://api.kapa.ai");
    }

    #[test]
    fn credentials_list_every_missing_variable() {
        let config = AppConfig::default();
        let err = config
            .credentials_with(SourceType::Slack, env(&[]), no_gcloud)
            .unwrap_err()
            .to_string();
        assert!(err.contains("SLACK_TOKEN"));
        assert!(err.contains("GOOGLE_PROJECT_ID"));
        assert!(err.contains("KAPA_API_KEY"));
    }

    #[test]
    fn gdoc_source_does_not_need_slack_token() {
        let mut config = AppConfig::default();
        config.google.project_id = Some("p1".into());
        let creds = config
            .credentials_with(
                SourceType::Gdoc,
                env(&[("KAPA_API_KEY", "k"), ("GOOGLE_ACCESS_TOKEN", "t")]),
                no_gcloud,
            )
            .expect("credentials");
        assert!(creds.slack_token.is_none());
        assert_eq!(creds.google_access_token, "t");
        assert!(!format!("{creds:?}").contains("\"k\""));
    }

    #[test]
    fn falls_back_to_minted_token() {
        let mut config = AppConfig::default();
        config.google.project_id = Some("p1".into());
        let creds = config
            .credentials_with(
                SourceType::Slack,
                env(&[("KAPA_API_KEY", "k"), ("SLACK_TOKEN", "xoxb")]),
                || Ok("minted".to_string()),
            )
            .expect("credentials");
        assert_eq!(creds.google_access_token, "minted");
        assert_eq!(creds.slack_token.as_deref(), Some("xoxb"));
    }

    #[test]
    fn token_minting_failure_is_config_error() {
        let mut config = AppConfig::default();
        config.google.project_id = Some("p1".into());
        let err = config
            .credentials_with(SourceType::Gdoc, env(&[("KAPA_API_KEY", "k")]), no_gcloud)
            .unwrap_err();
        assert!(matches!(err, AutoblogError::Config { .. }));
        assert!(err.to_string().contains("GOOGLE_ACCESS_TOKEN"));
    }
}
