//! Prompt types for docent.
//!
//! An answer template is identified by an id plus an output language. The
//! pair is part of every response cache key, so two templates that render
//! differently must never share an identity.

use serde::{Deserialize, Serialize};

/// An answer template, either built in or loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Template identifier (e.g., "rag.answer")
    pub id: String,

    /// Output language tag (e.g., "en", "pt")
    pub language: String,

    /// Human-readable title
    #[serde(default)]
    pub title: String,

    /// Optional system message (Handlebars)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// User message template (Handlebars)
    pub template: String,

    /// Text returned verbatim when retrieval finds no sufficient evidence
    #[serde(rename = "notFoundMessage")]
    pub not_found_message: String,

    /// Bumped by authors whenever the wording changes
    #[serde(default = "default_revision")]
    pub revision: u32,
}

fn default_revision() -> u32 {
    1
}

impl PromptTemplate {
    /// Stable identity used in cache keys: `<id>@<language>#<revision>`.
    pub fn identity(&self) -> String {
        format!("{}@{}#{}", self.id, self.language, self.revision)
    }
}

/// One retrieved passage offered to the model as grounding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptPassage {
    /// 1-based position in the ranked list
    pub index: usize,

    /// Source document path
    pub source: String,

    /// Section heading, if the passage came from one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,

    pub text: String,
}

/// A previous conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    /// "user" or "assistant"
    pub role: String,
    pub content: String,
}

impl HistoryTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Values available to answer templates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptVariables {
    pub question: String,

    #[serde(default)]
    pub passages: Vec<PromptPassage>,

    #[serde(default)]
    pub history: Vec<HistoryTurn>,
}

/// A fully built prompt ready for LLM execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPrompt {
    /// System message (optional)
    pub system: Option<String>,

    /// User message (required)
    pub user: String,

    /// Metadata about the built prompt
    pub metadata: BuiltPromptMetadata,
}

/// Metadata about a built prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPromptMetadata {
    /// Identity of the template that produced this prompt
    #[serde(rename = "templateIdentity")]
    pub template_identity: String,

    /// Number of passages rendered into the prompt
    #[serde(rename = "passageCount")]
    pub passage_count: usize,

    /// Number of history turns rendered into the prompt
    #[serde(rename = "historyTurns")]
    pub history_turns: usize,
}
