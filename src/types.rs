//! Core data types for the Marginalia annotation workspace
//!
//! This module defines the fundamental data structures shared between the
//! local process and the external agent: documents, annotations, agent
//! responses, and annotation threads. Everything that crosses the shared-file
//! boundary serializes as camelCase JSON, matching the wire schema the agent
//! reads and writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Unique identifier for annotations
///
/// Wraps a UUID to provide type safety and prevent mixing annotation IDs
/// with other UUID-based identifiers in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationId(pub Uuid);

impl AnnotationId {
    /// Create a new random annotation ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an annotation ID from a string
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for AnnotationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    /// Create a new random document ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Feedback category for an annotation
///
/// The declared order here is the grouping order used by prompt generation,
/// so it must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Tone and authorial voice
    Voice,

    /// Clarity of expression
    Clarity,

    /// Organization and flow
    Structure,

    /// Passage needs more detail
    Expand,

    /// Passage should be shortened
    Condense,

    /// Passage should be reworded
    Rephrase,
}

impl Category {
    /// All categories in their fixed declared order
    pub fn all() -> Vec<Category> {
        vec![
            Category::Voice,
            Category::Clarity,
            Category::Structure,
            Category::Expand,
            Category::Condense,
            Category::Rephrase,
        ]
    }

    /// Display name used as a prompt section heading
    pub fn label(&self) -> &'static str {
        match self {
            Category::Voice => "Voice",
            Category::Clarity => "Clarity",
            Category::Structure => "Structure",
            Category::Expand => "Expand",
            Category::Condense => "Condense",
            Category::Rephrase => "Rephrase",
        }
    }

    /// Default comment substituted when an annotation is created without one
    pub fn default_comment(&self) -> &'static str {
        match self {
            Category::Voice => "Adjust the voice of this passage",
            Category::Clarity => "Clarify this passage",
            Category::Structure => "Improve the structure here",
            Category::Expand => "Expand on this point",
            Category::Condense => "Condense this passage",
            Category::Rephrase => "Rephrase this passage",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Default comment for annotations with no category
pub const GENERAL_DEFAULT_COMMENT: &str = "Review this passage";

/// Heading used for the category-less group in prompts
pub const GENERAL_GROUP_LABEL: &str = "General";

/// Annotation severity
///
/// Declaration order doubles as sort order: MustFix sorts before ShouldFix,
/// which sorts before Consider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    /// Must be addressed before the document is done
    MustFix,

    /// Should be addressed unless there is a good reason not to
    ShouldFix,

    /// Optional suggestion
    Consider,
}

impl Severity {
    /// Label used in prompt feedback lines
    pub fn label(&self) -> &'static str {
        match self {
            Severity::MustFix => "MUST FIX",
            Severity::ShouldFix => "SHOULD FIX",
            Severity::Consider => "CONSIDER",
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::ShouldFix
    }
}

/// Half-open character range into a document's text content
///
/// Offsets are captured at annotation creation time and are never re-anchored
/// when the surrounding content changes. An edit upstream of an annotation
/// silently desyncs its range from the original passage; `selected_text`
/// preserves what the user actually marked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRange {
    /// Inclusive start offset in characters
    pub start_offset: usize,

    /// Exclusive end offset in characters
    pub end_offset: usize,
}

impl TextRange {
    /// Create a range, swapping the offsets if given in reverse order
    pub fn new(start_offset: usize, end_offset: usize) -> Self {
        if start_offset <= end_offset {
            Self {
                start_offset,
                end_offset,
            }
        } else {
            Self {
                start_offset: end_offset,
                end_offset: start_offset,
            }
        }
    }

    /// Length of the range in characters
    pub fn len(&self) -> usize {
        self.end_offset - self.start_offset
    }

    /// Whether the range covers no characters
    pub fn is_empty(&self) -> bool {
        self.start_offset == self.end_offset
    }
}

/// A human-authored comment anchored to a character range of the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    /// Stable identifier, generated once at creation
    pub id: AnnotationId,

    /// Character range the annotation covers
    pub range: TextRange,

    /// Snapshot of the selected text at creation time
    pub selected_text: String,

    /// Feedback category, or None for general feedback
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,

    /// Severity of the feedback
    pub severity: Severity,

    /// Feedback comment; never empty after construction
    pub comment: String,

    /// Whether the feedback has been addressed
    pub is_resolved: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl Annotation {
    /// Create a new unresolved annotation with the default severity
    ///
    /// If `comment` is empty or whitespace, a category-derived default is
    /// substituted so the comment is never empty after construction.
    pub fn new(
        range: TextRange,
        selected_text: impl Into<String>,
        category: Option<Category>,
        comment: impl Into<String>,
    ) -> Self {
        let comment = comment.into();
        let comment = if comment.trim().is_empty() {
            category
                .map(|c| c.default_comment().to_string())
                .unwrap_or_else(|| GENERAL_DEFAULT_COMMENT.to_string())
        } else {
            comment
        };

        let now = Utc::now();
        Self {
            id: AnnotationId::new(),
            range,
            selected_text: selected_text.into(),
            category,
            severity: Severity::default(),
            comment,
            is_resolved: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the annotation as resolved
    pub fn resolve(&mut self) {
        self.is_resolved = true;
        self.touch();
    }

    /// Mark the annotation as unresolved
    pub fn unresolve(&mut self) {
        self.is_resolved = false;
        self.touch();
    }

    /// Bump the updated timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// The live document and its annotations
///
/// Exactly one document is live at a time; opening a file or creating a new
/// document replaces it wholesale (annotations are not carried over).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Stable document identifier
    pub id: DocumentId,

    /// Document title
    pub title: String,

    /// Full text content
    pub content: String,

    /// Name of the backing file, if opened from disk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Path of the backing file, if opened from disk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filepath: Option<PathBuf>,

    /// Annotations in creation order
    pub annotations: Vec<Annotation>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Create an empty untitled document
    pub fn new() -> Self {
        Self::from_text("Untitled", "", None, None)
    }

    /// Create a document seeded with the given content
    pub fn from_text(
        title: impl Into<String>,
        content: impl Into<String>,
        filename: Option<String>,
        filepath: Option<PathBuf>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: DocumentId::new(),
            title: title.into(),
            content: content.into(),
            filename,
            filepath,
            annotations: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whitespace-delimited word count of the content
    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }

    /// Annotations that have not been resolved, in creation order
    pub fn unresolved_annotations(&self) -> Vec<&Annotation> {
        self.annotations.iter().filter(|a| !a.is_resolved).collect()
    }

    /// Look up an annotation by ID
    pub fn annotation(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    /// Look up an annotation by ID, mutably
    pub fn annotation_mut(&mut self, id: AnnotationId) -> Option<&mut Annotation> {
        self.annotations.iter_mut().find(|a| a.id == id)
    }

    /// Bump the updated timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// Action the agent took in response to an annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AgentAction {
    /// The agent considers the feedback addressed
    Resolve,

    /// The agent needs more information
    Clarify,

    /// The agent proposes replacement text for the passage
    Suggest,

    /// The agent disagrees with the feedback
    Reject,

    /// The agent has seen the feedback but taken no action yet
    Acknowledge,
}

/// Agent's response to a single annotation
///
/// Keyed by the annotation ID as a string; the agent may address annotations
/// that no longer exist locally, so the key is not parsed eagerly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentAnnotationResponse {
    /// ID of the annotation this response addresses
    pub annotation_id: String,

    /// Action taken
    pub action: AgentAction,

    /// Human-readable response message
    pub message: String,

    /// Replacement text, present only for Suggest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_text: Option<String>,

    /// When the response was produced
    pub timestamp: DateTime<Utc>,
}

/// Whole-document replacement proposed by the agent
///
/// This is a full content replacement, not a range-based patch; the agent
/// returns the complete revised text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDocumentUpdate {
    /// Complete revised document content
    pub content: String,

    /// Summary of what changed
    pub summary: String,

    /// Annotation IDs the update claims to address
    #[serde(default)]
    pub addressed_annotation_ids: Vec<String>,

    /// When the update was produced
    pub timestamp: DateTime<Utc>,
}

/// Author of a thread message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    Human,
    Agent,
}

/// One message in an annotation's conversation thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadMessage {
    /// Unique message identifier
    pub id: String,

    /// Who authored the message
    pub role: MessageRole,

    /// Message body
    pub message: String,

    /// When the message was written
    pub timestamp: DateTime<Utc>,
}

impl ThreadMessage {
    /// Create a message authored now
    pub fn new(role: MessageRole, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Ordered conversation attached to one annotation
///
/// Distinct from the single current `AgentAnnotationResponse` for the same
/// annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationThread {
    /// ID of the annotation the thread belongs to
    pub annotation_id: String,

    /// Messages in chronological order
    #[serde(default)]
    pub messages: Vec<ThreadMessage>,
}

/// The externally-owned aggregate written by the agent
///
/// Ownership is shared by convention only: the agent appends/overwrites, the
/// local process re-reads wholesale when the file's modification time
/// advances and only ever deletes it outright.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponseFile {
    /// Schema version
    pub version: u32,

    /// Per-annotation responses; a later entry for the same ID supersedes
    #[serde(default)]
    pub annotation_responses: Vec<AgentAnnotationResponse>,

    /// Proposed whole-document updates
    #[serde(default)]
    pub document_updates: Vec<AgentDocumentUpdate>,

    /// Per-annotation conversation threads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<Vec<AnnotationThread>>,

    /// When the agent last wrote the file
    pub last_updated: DateTime<Utc>,
}

impl AgentResponseFile {
    /// Current schema version
    pub const VERSION: u32 = 1;

    /// Create an empty response file view
    pub fn empty() -> Self {
        Self {
            version: Self::VERSION,
            annotation_responses: Vec::new(),
            document_updates: Vec::new(),
            threads: None,
            last_updated: Utc::now(),
        }
    }
}
