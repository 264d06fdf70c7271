//! Marginalia - Document Annotation Workspace for Coding Agents
//!
//! A Rust core for annotating passages of a text document and exchanging
//! those annotations with an external autonomous agent through a shared
//! directory of JSON files, with no direct call interface between the two
//! processes:
//! - Annotation/document data model with stable IDs and severity ordering
//! - Document store with debounced, atomic persistence
//! - Polling watcher for externally-written agent responses
//! - Deterministic prompt/export generation consumed by the agent CLI
//!
//! # Architecture
//!
//! The system is organized into several layers:
//! - **Types**: Core data structures (Document, Annotation, AgentResponseFile)
//! - **Store**: The single source of truth for the live document
//! - **Watcher**: Read-mostly view over the agent's response file
//! - **Export**: Pure projection of document state into prompt + snapshot
//!
//! # Example
//!
//! ```ignore
//! use marginalia_core::{AgentResponseWatcher, DocumentStore, SharedPaths, TextRange};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let paths = SharedPaths::resolve(None);
//!     let store = DocumentStore::new(paths.clone());
//!     store.load().await?;
//!
//!     store
//!         .add_annotation(TextRange::new(10, 42), "the marked passage", None, "tighten this")
//!         .await;
//!
//!     let watcher = AgentResponseWatcher::new(paths);
//!     watcher.start_watching().await;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod store;
pub mod types;
pub mod watcher;

// Re-export commonly used types
pub use config::SharedPaths;
pub use error::{MarginaliaError, Result};
pub use export::{generate_prompt, snapshot, ExportAnnotation, ExportSnapshot};
pub use store::DocumentStore;
pub use types::{
    AgentAction, AgentAnnotationResponse, AgentDocumentUpdate, AgentResponseFile, Annotation,
    AnnotationId, AnnotationThread, Category, Document, DocumentId, MessageRole, Severity,
    TextRange, ThreadMessage,
};
pub use watcher::AgentResponseWatcher;
