//! Conversation cleanup and blog idea generation.

use tracing::{info, instrument, warn};

use autoblog_shared::{BlogIdea, Result, SourceType};

use crate::llm::LanguageModel;
use crate::prompts::PromptSet;

/// Redact and anonymize a formatted Slack conversation.
///
/// The model output is returned as-is; it is only ever fed to later prompts.
#[instrument(skip_all, fields(chars = conversation.len()))]
pub async fn clean_conversation(
    model: &dyn LanguageModel,
    prompts: &PromptSet,
    conversation: &str,
) -> Result<String> {
    let prompt = prompts.slack_cleanup(conversation)?;
    let cleaned = model.generate(&prompt).await?;
    info!(chars = cleaned.len(), "conversation cleaned");
    Ok(cleaned)
}

/// Ask the model for a title, audience, takeaway and search summary.
///
/// Missing keys are tolerated; they read as empty strings downstream.
#[instrument(skip_all, fields(source = %source))]
pub async fn generate_idea(
    model: &dyn LanguageModel,
    prompts: &PromptSet,
    source: SourceType,
    text: &str,
) -> Result<BlogIdea> {
    let prompt = match source {
        SourceType::Slack => prompts.slack_idea(text)?,
        SourceType::Gdoc => prompts.gdoc_idea(text)?,
    };
    let raw = model.generate(&prompt).await?;
    let idea = BlogIdea::parse(&raw);

    let missing: Vec<&str> = [
        BlogIdea::TITLE,
        BlogIdea::AUDIENCE,
        BlogIdea::TAKEAWAY,
        BlogIdea::SEARCH_SUMMARY,
    ]
    .into_iter()
    .filter(|k| idea.get(k).is_none())
    .collect();
    if !missing.is_empty() {
        warn!(?missing, "blog idea is missing keys");
    }

    info!(title = idea.title(), "blog idea generated");
    Ok(idea)
}
