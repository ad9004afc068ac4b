//! Shared types, error model, and configuration for Autoblog.
//!
//! This crate is the foundation depended on by all other Autoblog crates.
//! It provides:
//! - [`AutoblogError`] as the unified error type
//! - Domain types ([`ThreadMessage`], [`DocumentAssets`], [`BlogIdea`], [`BlogAssets`], ...)
//! - Configuration ([`AppConfig`], [`Credentials`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BlogConfig, Credentials, GoogleConfig, KapaConfig, LinksConfig, OutputConfig,
    SlackConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{AutoblogError, Result};
pub use types::{
    BlogAssets, BlogIdea, DocumentAssets, DocumentationLink, GeneratedFile, GeneratedImage,
    ImagePrompt, RunId, SourceType, ThreadMessage,
};
