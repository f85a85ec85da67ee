//! Ask command handler.
//!
//! Answers one question from a knowledge base's published index.

use anyhow::Context;
use clap::Args;
use docent_core::config::AppConfig;
use docent_knowledge::{Answer, AskOptions};

/// Ask a question against a knowledge base
#[derive(Args, Debug)]
pub struct AskCommand {
    /// Knowledge base name
    pub base: String,

    /// The question to ask
    pub question: String,

    /// Number of passages to retrieve (default from the base config)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Re-rank retrieved passages with the generation model
    #[arg(long)]
    pub rerank: bool,

    /// Answer language (e.g. en, pt)
    #[arg(long)]
    pub language: Option<String>,

    /// Prompt template id
    #[arg(long)]
    pub template: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        tracing::info!("Asking knowledge base '{}'", self.base);

        let service = docent_knowledge::open_service(&config.workspace, &self.base, config)
            .with_context(|| format!("Cannot open knowledge base '{}'", self.base))?;

        let mut options = AskOptions::new(self.question.clone());
        if let Some(top_k) = self.top_k {
            options = options.with_top_k(top_k);
        }
        if self.rerank {
            options = options.with_rerank(true);
        }
        if let Some(ref language) = self.language {
            options = options.with_language(language.clone());
        }
        if let Some(ref template) = self.template {
            options = options.with_template(template.clone());
        }

        let answer = service.ask(options).await?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&answer).context("Failed to serialize answer")?
            );
        } else {
            print_answer(&answer);
        }
        Ok(())
    }
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.text);
    println!();

    if answer.not_found {
        println!("(no passage was relevant enough to answer from)");
    } else {
        println!("Sources:");
        for source in &answer.sources {
            match source.section_anchor {
                Some(ref anchor) => println!("- {}#{} ({:.2})", source.source_path, anchor, source.score),
                None => println!("- {} ({:.2})", source.source_path, source.score),
            }
        }
    }

    println!();
    println!("Index version: {}", answer.index_version);
}
