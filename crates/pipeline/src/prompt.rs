//! Stage prompt templates.
//!
//! Prompts are plain text; providers wrap them in their model's chat template.

use docsmith_config::StageIntent;
use docsmith_core::context::{ProjectContext, truncate_on_char_boundary};
use serde::{Deserialize, Serialize};

const SUMMARY_SNIPPET_BYTES: usize = 800;
const DRAFT_PRIORITY_BYTES: usize = 3_000;
const REFINE_CODE_BYTES: usize = 2_000;

/// What the caller told us about the project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectBrief {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub domain: String,
}

impl ProjectBrief {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    fn header(&self) -> String {
        let mut header = format!("Project: {}\n", self.name);
        if !self.description.is_empty() {
            header.push_str(&format!("Description: {}\n", self.description));
        }
        if !self.domain.is_empty() {
            header.push_str(&format!("Domain: {}\n", self.domain));
        }
        header
    }
}

/// Prompt for one heading of a per-heading stage.
///
/// `prior` is the previous stage's output for the same heading.
pub fn section_prompt(
    intent: StageIntent,
    context: &ProjectContext,
    brief: &ProjectBrief,
    heading: &str,
    prior: Option<&str>,
) -> String {
    let prior = prior.unwrap_or_default();
    match intent {
        StageIntent::Summarize => format!(
            "{header}Task: Write one professional technical sentence describing the section '{heading}'.\n\
             Context snippet: {snippet}",
            header = brief.header(),
            snippet = truncate_on_char_boundary(context.priority_content(), SUMMARY_SNIPPET_BYTES),
        ),
        StageIntent::Draft => format!(
            "You are a Lead Technical Writer creating official documentation for a software project. \
             Write a precise, technically accurate section based strictly on the provided codebase analysis.\n\n\
             GUIDELINES:\n\
             1. Use a formal, objective tone (avoid 'I', 'we', 'here is').\n\
             2. Reference specific file names and libraries from the provided context.\n\
             3. Do not invent features; rely on the file structure and configuration context.\n\
             4. Format the output with clear headings and bullet points.\n\n\
             ### PROJECT CONTEXT\n{header}\n\
             **File Structure:**\n{structure}\n\n\
             **Tech Stack & Modules:**\n{modules}\n\n\
             **Critical Configurations:**\n{priority}\n\n\
             ### WRITING TASK\n\
             **Section Title:** {heading}\n\
             **Section Objective:** {prior}\n\n\
             **Required Output Structure:**\n\
             ## 1. Overview\n(Two paragraphs explaining the purpose of this section.)\n\n\
             ## 2. Key Capabilities\n(Three to five bullet points on features found in the code.)\n\n\
             ## 3. Technical Implementation\n(How the identified files and modules interact.)\n\n\
             Draft the content for '{heading}' now:",
            header = brief.header(),
            structure = context.structure_listing(),
            modules = context.modules_listing(),
            priority = truncate_on_char_boundary(context.priority_content(), DRAFT_PRIORITY_BYTES),
        ),
        StageIntent::Refine | StageIntent::Polish => format!(
            "You are a Senior Technical Editor. Format the raw draft into polished, publication-ready documentation.\n\
             STRICT RULES:\n\
             1. Use clean Markdown: '##' for main sections and '###' for subsections.\n\
             2. Professional, objective and concise. Remove conversational filler.\n\
             3. Convert feature lists or steps into bullet points.\n\
             4. Insert at most one concise code snippet (10-12 lines) taken from the code context. Do not invent code.\n\n\
             SECTION: {heading}\n\n\
             RAW DRAFT:\n{prior}\n\n\
             AVAILABLE CODE CONTEXT:\n{code}\n\n\
             TASK: Rewrite the raw draft into the final Markdown format now.",
            code = truncate_on_char_boundary(context.general_content(), REFINE_CODE_BYTES),
        ),
    }
}

/// Prompt for the terminal pass over the concatenated sections.
pub fn polish_prompt(brief: &ProjectBrief, combined: &str) -> String {
    format!(
        "You are a professional technical documentation writer.\n\
         {header}\
         Polish and combine these documentation sections into one comprehensive, professional document:\n\n\
         {combined}\n\n\
         Requirements:\n\
         1. Remove repetitions and duplicate information\n\
         2. Keep formatting and tone consistent\n\
         3. Add transitions between sections\n\
         4. Maintain technical accuracy\n\
         5. Fix grammatical errors\n\n\
         Provide the polished combined documentation:",
        header = brief.header(),
    )
}
