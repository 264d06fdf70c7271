//! Export snapshot and prompt generation
//!
//! Projects the current document and its unresolved annotations into the
//! machine-readable export snapshot (`document.json`) and the natural-language
//! prompt embedded in it. Both are pure functions of the document: identical
//! input produces byte-identical output.

use crate::types::{
    Annotation, Category, Document, Severity, GENERAL_GROUP_LABEL,
};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::PathBuf;

/// Maximum selected-text length quoted in a feedback line, in characters
pub const SNIPPET_MAX_CHARS: usize = 50;

/// One unresolved annotation, reduced to its export form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportAnnotation {
    /// Annotation ID as a string, the key the agent responds with
    pub id: String,

    /// Selected text snapshot
    pub text: String,

    /// Feedback category, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,

    /// Severity of the feedback
    pub severity: Severity,

    /// Feedback comment
    pub comment: String,

    /// Range start offset
    pub start_offset: usize,

    /// Range end offset
    pub end_offset: usize,
}

impl From<&Annotation> for ExportAnnotation {
    fn from(a: &Annotation) -> Self {
        Self {
            id: a.id.to_string(),
            text: a.selected_text.clone(),
            category: a.category,
            severity: a.severity,
            comment: a.comment.clone(),
            start_offset: a.range.start_offset,
            end_offset: a.range.end_offset,
        }
    }
}

/// The externally-consumed projection of document + unresolved-annotation state
///
/// Resolved annotations are excluded by design; the agent only ever sees
/// outstanding feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSnapshot {
    /// Name of the backing file, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Path of the backing file, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filepath: Option<PathBuf>,

    /// Document title
    pub title: String,

    /// Full document content
    pub content: String,

    /// Whitespace-delimited word count
    pub word_count: usize,

    /// Unresolved annotations only
    pub annotations: Vec<ExportAnnotation>,

    /// Generated natural-language prompt
    pub prompt: String,
}

/// Build the export snapshot for a document
pub fn snapshot(document: &Document) -> ExportSnapshot {
    ExportSnapshot {
        filename: document.filename.clone(),
        filepath: document.filepath.clone(),
        title: document.title.clone(),
        content: document.content.clone(),
        word_count: document.word_count(),
        annotations: document
            .unresolved_annotations()
            .into_iter()
            .map(ExportAnnotation::from)
            .collect(),
        prompt: generate_prompt(document),
    }
}

/// Generate the natural-language prompt for a document
///
/// Structure: identity header, word-count line, then (if any unresolved
/// annotations exist) a "Feedback" section grouped by category in declared
/// order with a trailing "General" group, and a closing instruction line.
/// Within a group, annotations sort by severity (stable, so equal severities
/// keep creation order).
pub fn generate_prompt(document: &Document) -> String {
    let mut out = String::new();

    match &document.filename {
        Some(filename) => {
            let _ = writeln!(out, "Document: {} ({})", document.title, filename);
        }
        None => {
            let _ = writeln!(out, "Document: {}", document.title);
        }
    }
    let _ = writeln!(out, "The document is {} words long.", document.word_count());

    let unresolved = document.unresolved_annotations();
    if !unresolved.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Feedback:");

        for category in Category::all() {
            let group: Vec<&Annotation> = unresolved
                .iter()
                .copied()
                .filter(|a| a.category == Some(category))
                .collect();
            write_group(&mut out, category.label(), group);
        }

        let general: Vec<&Annotation> = unresolved
            .iter()
            .copied()
            .filter(|a| a.category.is_none())
            .collect();
        write_group(&mut out, GENERAL_GROUP_LABEL, general);

        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Please address each item of feedback above and return the complete revised document."
        );
    } else {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "There is no outstanding feedback. Review the document and suggest improvements."
        );
    }

    out
}

/// Write one category group, sorted by severity
fn write_group(out: &mut String, label: &str, mut group: Vec<&Annotation>) {
    if group.is_empty() {
        return;
    }
    group.sort_by_key(|a| a.severity);

    let _ = writeln!(out);
    let _ = writeln!(out, "{}:", label);
    for annotation in group {
        let _ = writeln!(
            out,
            "- [{}] \"{}\" - {}",
            annotation.severity.label(),
            snippet(&annotation.selected_text),
            annotation.comment
        );
    }
}

/// First `SNIPPET_MAX_CHARS` characters of the selected text
///
/// Char-boundary safe; an ellipsis marks truncation.
fn snippet(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(SNIPPET_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
