//! Structure-aware chunking.
//!
//! Markdown headings open sections; each section is split into windows of
//! at most `chunk_size` characters with `chunk_overlap` overlap. Every
//! chunk remembers the heading it sits under so answers can cite it.

use crate::types::SourceDocument;
use docent_core::{AppError, AppResult};
use std::collections::HashMap;
use text_splitter::{ChunkConfig, TextSplitter};

/// A piece of a document before embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    pub section_title: Option<String>,
    pub section_anchor: Option<String>,
    pub text: String,
}

#[derive(Debug)]
struct Section {
    title: Option<String>,
    anchor: Option<String>,
    body: String,
    has_content: bool,
}

impl Section {
    fn untitled() -> Self {
        Self {
            title: None,
            anchor: None,
            body: String::new(),
            has_content: false,
        }
    }
}

/// Split a document into chunks.
pub fn chunk_document(
    doc: &SourceDocument,
    chunk_size: usize,
    chunk_overlap: usize,
) -> AppResult<Vec<ChunkSpan>> {
    let config = ChunkConfig::new(chunk_size)
        .with_overlap(chunk_overlap)
        .map_err(|e| AppError::Config(format!("Invalid chunking parameters: {}", e)))?
        .with_trim(true);
    let splitter = TextSplitter::new(config);

    let sections = if doc.is_markdown() {
        split_markdown_sections(&doc.content)
    } else {
        let mut section = Section::untitled();
        section.body = doc.content.clone();
        section.has_content = !doc.content.trim().is_empty();
        vec![section]
    };

    let mut spans = Vec::new();
    for section in sections.into_iter().filter(|s| s.has_content) {
        for piece in splitter.chunks(&section.body) {
            if piece.trim().is_empty() {
                continue;
            }
            spans.push(ChunkSpan {
                section_title: section.title.clone(),
                section_anchor: section.anchor.clone(),
                text: piece.to_string(),
            });
        }
    }

    tracing::debug!("Chunked {} into {} spans", doc.path, spans.len());
    Ok(spans)
}

/// Group markdown lines into heading-delimited sections.
fn split_markdown_sections(content: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current = Section::untitled();
    let mut anchors: HashMap<String, usize> = HashMap::new();
    let mut fence: Option<&str> = None;

    for line in content.lines() {
        let trimmed = line.trim_start();

        if let Some(marker) = fence {
            if trimmed.starts_with(marker) {
                fence = None;
            }
        } else if trimmed.starts_with("```") {
            fence = Some("```");
        } else if trimmed.starts_with("~~~") {
            fence = Some("~~~");
        } else if let Some(title) = parse_heading(trimmed) {
            sections.push(std::mem::replace(&mut current, Section::untitled()));
            current.anchor = Some(unique_anchor(&mut anchors, &slugify(&title)));
            current.title = Some(title);
            current.body.push_str(line);
            current.body.push('\n');
            continue;
        }

        if !line.trim().is_empty() {
            current.has_content = true;
        }
        current.body.push_str(line);
        current.body.push('\n');
    }

    sections.push(current);
    sections
}

/// `# Title` .. `###### Title` (ATX headings; closing hashes dropped).
fn parse_heading(line: &str) -> Option<String> {
    let level = line.chars().take_while(|&c| c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }

    let rest = &line[level..];
    if !rest.is_empty() && !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }

    let title = rest.trim().trim_end_matches('#').trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

/// GitHub-style heading anchor.
pub fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                Some(c)
            } else if c.is_whitespace() {
                Some('-')
            } else {
                None
            }
        })
        .collect()
}

fn unique_anchor(seen: &mut HashMap<String, usize>, slug: &str) -> String {
    let count = seen.entry(slug.to_string()).or_insert(0);
    let anchor = if *count == 0 {
        slug.to_string()
    } else {
        format!("{}-{}", slug, count)
    };
    *count += 1;
    anchor
}
