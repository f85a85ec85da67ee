//! Prompt builder for rendering answer templates.

use crate::types::{BuiltPrompt, BuiltPromptMetadata, PromptTemplate, PromptVariables};
use docent_core::{AppError, AppResult};
use handlebars::Handlebars;

/// Render a template with the question, passages and history.
///
/// # Example
/// ```no_run
/// use docent_prompt::{build_prompt, builtin_template, PromptVariables};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let template = builtin_template("rag.answer", "en").unwrap();
/// let vars = PromptVariables {
///     question: "What is Rust?".to_string(),
///     ..Default::default()
/// };
///
/// let built = build_prompt(&template, &vars)?;
/// println!("User prompt: {}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt(template: &PromptTemplate, variables: &PromptVariables) -> AppResult<BuiltPrompt> {
    tracing::debug!("Building prompt: {}", template.identity());

    let mut handlebars = Handlebars::new();

    // Prompts are plain text
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("user", &template.template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    let user = handlebars
        .render("user", variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))?;

    let system = match template.system {
        Some(ref system) => Some(
            handlebars
                .render_template(system, variables)
                .map_err(|e| AppError::Prompt(format!("Failed to render system message: {}", e)))?,
        ),
        None => None,
    };

    Ok(BuiltPrompt {
        system,
        user,
        metadata: BuiltPromptMetadata {
            template_identity: template.identity(),
            passage_count: variables.passages.len(),
            history_turns: variables.history.len(),
        },
    })
}
