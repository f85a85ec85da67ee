//! Template loader.
//!
//! Workspace overrides live in `.docent/prompts/<id>.<language>.yml` and win
//! over the built-in templates.

use crate::builtin::{builtin_languages, builtin_template, DEFAULT_TEMPLATE_ID};
use crate::types::PromptTemplate;
use docent_core::config::STATE_DIR;
use docent_core::{AppError, AppResult};
use std::path::{Path, PathBuf};

fn prompts_dir(workspace_path: &Path) -> PathBuf {
    workspace_path.join(STATE_DIR).join("prompts")
}

/// Load the template for `template_id` in `language`.
///
/// # Example
/// ```no_run
/// use docent_prompt::load_template;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let template = load_template(Path::new("."), "rag.answer", "pt")?;
/// println!("Loaded template: {}", template.identity());
/// # Ok(())
/// # }
/// ```
pub fn load_template(
    workspace_path: &Path,
    template_id: &str,
    language: &str,
) -> AppResult<PromptTemplate> {
    let prompt_file = prompts_dir(workspace_path).join(format!("{}.{}.yml", template_id, language));

    if prompt_file.exists() {
        tracing::debug!("Loading template from: {:?}", prompt_file);
        let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
            AppError::Prompt(format!(
                "Failed to read template file {:?}: {}",
                prompt_file, e
            ))
        })?;

        let template: PromptTemplate = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Prompt(format!(
                "Failed to parse template YAML {:?}: {}",
                prompt_file, e
            ))
        })?;

        validate_template(&template, template_id, language)?;
        return Ok(template);
    }

    builtin_template(template_id, language).ok_or_else(|| {
        AppError::Prompt(format!(
            "No template '{}' for language '{}' (looked in {:?}); available: {}",
            template_id,
            language,
            prompt_file,
            available_templates(workspace_path).join(", ")
        ))
    })
}

/// Built-in and workspace templates as `id@language`, sorted.
fn available_templates(workspace_path: &Path) -> Vec<String> {
    let overrides = list_templates(workspace_path).unwrap_or_else(|e| {
        tracing::warn!("Failed to list workspace templates: {}", e);
        Vec::new()
    });

    let mut available: Vec<String> = builtin_languages()
        .iter()
        .map(|lang| format!("{}@{}", DEFAULT_TEMPLATE_ID, lang))
        .chain(overrides.into_iter().map(|(id, lang)| format!("{}@{}", id, lang)))
        .collect();
    available.sort();
    available.dedup();
    available
}

/// List `(id, language)` pairs overridden in the workspace.
pub fn list_templates(workspace_path: &Path) -> AppResult<Vec<(String, String)>> {
    let dir = prompts_dir(workspace_path);

    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut found = Vec::new();

    for entry in walkdir::WalkDir::new(&dir)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("yml") {
            continue;
        }
        // "<id>.<lang>.yml": the id itself may contain dots
        if let Some((id, lang)) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|stem| stem.rsplit_once('.'))
        {
            found.push((id.to_string(), lang.to_string()));
        }
    }

    Ok(found)
}

fn validate_template(template: &PromptTemplate, id: &str, language: &str) -> AppResult<()> {
    if template.id != id || template.language != language {
        return Err(AppError::Prompt(format!(
            "Template file declares {}@{} but was loaded as {}@{}",
            template.id, template.language, id, language
        )));
    }

    if template.template.trim().is_empty() {
        return Err(AppError::Prompt(
            "Template body cannot be empty".to_string(),
        ));
    }

    if template.not_found_message.trim().is_empty() {
        return Err(AppError::Prompt(
            "Template notFoundMessage cannot be empty".to_string(),
        ));
    }

    Ok(())
}
