//! Question and answer types.

use crate::retrieval::ScoreKind;
use crate::types::IndexVersionId;
use docent_prompt::HistoryTurn;
use serde::{Deserialize, Serialize};

/// A question plus per-request overrides of the knowledge base config.
#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    pub question: String,
    pub top_k: Option<usize>,
    pub rerank: Option<bool>,
    pub language: Option<String>,
    pub template: Option<String>,
    pub history: Vec<HistoryTurn>,
}

impl AskOptions {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_rerank(mut self, rerank: bool) -> Self {
        self.rerank = Some(rerank);
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_history(mut self, history: Vec<HistoryTurn>) -> Self {
        self.history = history;
        self
    }
}

/// Where part of an answer came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub source_path: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_anchor: Option<String>,

    /// Short excerpt of the evidence
    pub snippet: String,

    pub score: f32,
}

/// The outcome of a question.
///
/// `not_found` answers carry the template's not-found message and no
/// sources; they are produced without calling the generation model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub not_found: bool,
    pub sources: Vec<SourceRef>,
    pub index_version: IndexVersionId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_score: Option<f32>,

    pub score_kind: ScoreKind,

    /// Served from the response cache
    #[serde(default)]
    pub cached: bool,
}
