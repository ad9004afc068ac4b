//! Embedded prompt templates and their renderer.
//!
//! Templates are Handlebars strings with HTML escaping turned off, so
//! conversation text and JSON link lists are substituted verbatim.

use handlebars::Handlebars;
use serde_json::json;
use tracing::debug;

use autoblog_shared::{AutoblogError, Result};

const SLACK_CLEANUP: &str = "slack_cleanup";
const SLACK_IDEA: &str = "slack_idea";
const GDOC_IDEA: &str = "gdoc_idea";
const SLACK_ASSETS: &str = "slack_assets";
const GDOC_ASSETS: &str = "gdoc_assets";

const SLACK_CLEANUP_TEMPLATE: &str = r#"**ROLE AND GOAL:**
You are an expert data security officer and an expert level content strategist. Your goal is to process a raw Slack conversation and clean it of all sensitive information so a compelling blog post idea can be generated from the cleaned-up technical content.

**TASK: Clean and Anonymize**
Analyze the raw Slack conversation provided below. Your first job is to create a "Cleaned Version" of this conversation by following these strict rules:
- Remove all Personal Information: Delete all names, email addresses, and phone numbers.
- Remove all Confidential Information: Delete any company names, project code names, specific server names, IP addresses, or secret keys.
- Anonymize Participants: Replace the first participant's name/ID with "Dev A," the second with "Dev B," and so on, consistently throughout the conversation.
- Remove Filler: Delete conversational filler (e.g., "lol," "ok," "brb") that doesn't add to the technical story.
- Format as a Script: Present the cleaned text as a simple, readable script.

**OUTPUT FORMAT:**
Provide your entire response in 1 section: "--- CLEANED CONVERSATION ---"

**HERE IS THE RAW SLACK CONVERSATION:**
{{conversation_text}}
"#;

const IDEA_OUTPUT_FORMAT: &str = r#"**OUTPUT FORMAT:**
Provide your response with these exact keys, each on a new line:
Title: [The catchy title here]
Audience: [The target audience here]
Takeaway: [The key takeaway here]
KapaAIinput: [The input to Kapa AI here]"#;

const IDEA_TASK: &str = r#"**TASK: Generate Blog Idea**
Based *only* on the text below, propose one great angle for a blog post.
- **Title:** Create a catchy and professional title that reflects the main topic.
- **Audience:** Identify the target audience for this blog post.
- **Takeaway:** Summarize the key takeaway or insight that the blog post will provide.
- **KapaAIinput:** Generate a detailed 50 to 100 word summary, which will be used as input to Kapa AI for finding relevant existing public blogs and documentation links for this new blog."#;

const SLACK_IDEA_TEMPLATE: &str = r#"**ROLE AND GOAL:**
You are an expert tech blogger and content strategist for the '{{company}}' database company. Your goal is to analyze the provided technical conversation and propose a compelling blog post idea based on this cleaned-up technical content.

{{> idea_task}}

{{> idea_output_format}}

**HERE IS THE CLEANED CONVERSATION:**
{{cleaned_conversation}}
"#;

const GDOC_IDEA_TEMPLATE: &str = r#"**ROLE AND GOAL:**
You are an expert tech blogger and content strategist for the '{{company}}' database company. Your goal is to analyze the technical document provided under ORIGINAL DOCUMENT and propose a compelling blog post idea from a developer perspective.

{{> idea_task}}

{{> idea_output_format}}

**HERE IS THE TECHNICAL DOCUMENT TEXT:**
{{technical_document_text}}
"#;

const JSON_CONTRACT: &str = r#"**OUTPUT FORMAT:**
Your entire response MUST be a single, valid JSON object. Do not include any text, notes, or code fences before or after the JSON object. The JSON object must have these exact keys:
- "blog_markdown_content": A string containing the full blog post in Markdown, including the image placeholders. IMPORTANT: Use only standard ASCII characters. Avoid smart quotes, em dashes, or other special Unicode characters that can break JSON parsing.
- "image_prompts": An array of objects. Each object must have two keys:
    1. "placeholder": (e.g., "[IMAGE_1]")
    2. "prompt": A detailed, descriptive prompt for the AI image generator **Imagen**. The description should outline a simple, clean, minimalistic 2D technical diagram. Describe the components, the layout, and any exact text labels. If you generate more than one prompt, ensure they illustrate **different concepts**.

**CRITICAL JSON REQUIREMENTS:**
- Use only standard double quotes (") for strings, not smart quotes
- Use only standard apostrophes (') not curly apostrophes
- Use only standard hyphens (-) not em dashes or en dashes
- Escape any backslashes or quotes within strings properly
- Do not include trailing commas"#;

const LINKS_GUIDANCE: &str = "Use these resources to optionally hyperlink key technical terms in your blog, but only if they are relevant to the content. Insert the hyperlink at the first meaningful occurrence only. Format using standard Markdown: `[term](link)`.";

const SLACK_ASSETS_TEMPLATE: &str = r#"**ROLE:**
You are an expert tech blogger for the '{{company}}' database company.

**GOAL:**
Write a detailed, engaging, and well-structured blog post based on an internal technical discussion, without revealing direct messages. Also identify which technical diagrams would enhance the post.

**CONTEXT:**
- **Source Conversation:**
{{conversation_text}}
{{#if documentation_links}}
- **Relevant Documentation Links:** {{> links_guidance}}
{{documentation_links}}
{{/if}}

**TASK (MULTI-STEP):**
Write a complete blog post. Follow these instructions strictly:
1.  **Title:** The article must have a title, formatted as a main heading.
2.  **Introduction:** Write a compelling introduction that presents the business problem so that a novice would understand it.
3.  **The Challenge:** Create a section with a fitting heading. Use the source conversation to describe the specific problem.
4.  **The Proposed Solution:** Create a section with an engaging heading that explains the solution.
5.  **Conclusion:** Create a final section with the heading "Key Takeaways".
6.  **Tone:** Write in a clear, informative, and professional tone suitable for the {{company}} blog.
7.  **Formatting:** Format the entire output using Markdown syntax. Use # for the main title, ## for section headings, and ** for bold text.
8.  **Smart items:** Use code blocks, bullet points, and links to enhance readability. Always fence code in code blocks.
9.  **Length:** The blog post can be of any length. Use whatever is needed.
10. **Images:** When you identify an opportunity for an image or diagram, insert a **unique, numbered placeholder** in the text, such as `[IMAGE_1]`, `[IMAGE_2]`, and so on.

{{> json_contract}}
"#;

const GDOC_ASSETS_TEMPLATE: &str = r#"**ROLE:**
You are an expert tech blogger and technical writer for the '{{company}}' database company.

**GOAL:**
Distill a complex internal technical design document and its related discussions into a **simple, clear, and easy-to-read** blog post for a public audience, especially readers who are new to the topic.

**CONTEXT:**
You have been provided with three sources of information with a clear hierarchy:
1.  **Main Technical Document:** The primary source of truth. The core narrative and technical details must be derived from this document.
2.  **Linked Documents Content:** Supplementary material, used only when a point needs a reference.
3.  **Document Comments:** The discussion and clarification around the design.

- **Main Technical Document Content:**
{{main_document_text}}

- **Content from Linked Documents:**
{{linked_documents_content}}

- **Discussion from Document Comments:**
{{document_comments}}
{{#if documentation_links}}

- **Relevant Documentation Links:** {{> links_guidance}}
{{documentation_links}}
{{/if}}

**TASK (MULTI-STEP):**
Write a complete blog post. Follow these instructions strictly:
1.  **Title:** Devise a compelling, easy-to-understand title based on the main document and make it the main heading.
2.  **Introduction:** Present the business problem so a novice would understand the context. **Explain the core concepts in simple terms, avoiding jargon where possible.** Use an analogy if it helps.
3.  **The Challenge:** Create a section with an engaging heading that describes the specific problem, using the main document as the source.
4.  **The Proposed Solution:** Create a section with a creative heading that explains the architecture, based on the main document.
5.  **Discussion & Insights:** Weave insights from the **Document Comments** into the narrative to address potential questions or explain key decisions.
6.  **Conclusion:** Create a final section with the heading "Key Takeaways".
7.  **Tone:** Write in a clear, informative, and professional tone suitable for a company blog, highlighting {{company}}'s strengths.
8.  **Formatting:** Format the entire output using Markdown syntax. Use # for the main title, ## for section headings, and ** for bold text.
9.  **Smart items:** Use code blocks, bullet points, and links to enhance readability. Always fence code in code blocks.
10. **Length:** The blog post can be of any length. Use whatever is needed.
11. **Images:** When you identify an opportunity for an image or diagram, insert a **unique, numbered placeholder** in the text, such as `[IMAGE_1]`, `[IMAGE_2]`, and so on.

{{> json_contract}}
"#;

/// Inputs of the Google Doc generation prompt.
#[derive(Debug, Clone, Default)]
pub struct GdocPromptInput<'a> {
    pub main_document_text: &'a str,
    pub linked_documents_content: &'a str,
    /// Comments of the main and linked documents, one per line.
    pub document_comments: &'a str,
    /// Output of [`DocumentationLink::to_prompt_json`](autoblog_shared::DocumentationLink::to_prompt_json),
    /// or empty to leave the links section out.
    pub documentation_links: &'a str,
}

/// Renders every prompt the pipeline sends to a model.
pub struct PromptSet {
    hbs: Handlebars<'static>,
    company: String,
}

impl PromptSet {
    pub fn new(company: impl Into<String>) -> Result<Self> {
        let mut hbs = Handlebars::new();
        hbs.register_escape_fn(handlebars::no_escape);

        let partials = [
            ("idea_task", IDEA_TASK),
            ("idea_output_format", IDEA_OUTPUT_FORMAT),
            ("json_contract", JSON_CONTRACT),
            ("links_guidance", LINKS_GUIDANCE),
        ];
        for (name, body) in partials {
            hbs.register_partial(name, body)
                .map_err(|e| template_err(name, e))?;
        }

        let templates = [
            (SLACK_CLEANUP, SLACK_CLEANUP_TEMPLATE),
            (SLACK_IDEA, SLACK_IDEA_TEMPLATE),
            (GDOC_IDEA, GDOC_IDEA_TEMPLATE),
            (SLACK_ASSETS, SLACK_ASSETS_TEMPLATE),
            (GDOC_ASSETS, GDOC_ASSETS_TEMPLATE),
        ];
        for (name, body) in templates {
            hbs.register_template_string(name, body)
                .map_err(|e| template_err(name, e))?;
        }

        Ok(Self {
            hbs,
            company: company.into(),
        })
    }

    fn render(&self, name: &str, data: serde_json::Value) -> Result<String> {
        let rendered = self
            .hbs
            .render(name, &data)
            .map_err(|e| template_err(name, e))?;
        debug!(template = name, chars = rendered.len(), "prompt rendered");
        Ok(rendered)
    }

    pub fn slack_cleanup(&self, conversation_text: &str) -> Result<String> {
        self.render(
            SLACK_CLEANUP,
            json!({ "conversation_text": conversation_text }),
        )
    }

    pub fn slack_idea(&self, cleaned_conversation: &str) -> Result<String> {
        self.render(
            SLACK_IDEA,
            json!({
                "company": self.company,
                "cleaned_conversation": cleaned_conversation,
            }),
        )
    }

    pub fn gdoc_idea(&self, technical_document_text: &str) -> Result<String> {
        self.render(
            GDOC_IDEA,
            json!({
                "company": self.company,
                "technical_document_text": technical_document_text,
            }),
        )
    }

    pub fn slack_assets(&self, conversation_text: &str, documentation_links: &str) -> Result<String> {
        self.render(
            SLACK_ASSETS,
            json!({
                "company": self.company,
                "conversation_text": conversation_text,
                "documentation_links": documentation_links,
            }),
        )
    }

    pub fn gdoc_assets(&self, input: &GdocPromptInput<'_>) -> Result<String> {
        self.render(
            GDOC_ASSETS,
            json!({
                "company": self.company,
                "main_document_text": input.main_document_text,
                "linked_documents_content": input.linked_documents_content,
                "document_comments": input.document_comments,
                "documentation_links": input.documentation_links,
            }),
        )
    }
}

fn template_err(name: &str, e: impl std::fmt::Display) -> AutoblogError {
    AutoblogError::Llm(format!("prompt template '{name}': {e}"))
}
