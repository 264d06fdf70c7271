//! Document store: the single source of truth for the live document
//!
//! All mutation of the document and its annotations goes through this store.
//! Every persisted mutation bumps the document's `updated_at`, notifies
//! subscribers through a revision channel, and schedules a debounced save:
//! the pending save task is aborted and re-spawned on each mutation, so the
//! write fires only after a quiet interval with no further changes.
//!
//! A save always writes both `state.json` (full document) and `document.json`
//! (export snapshot), each via temp-file-plus-rename so the external CLI
//! never observes a half-written file. Save failures are logged and never
//! roll back in-memory state.

use crate::config::{SharedPaths, DEFAULT_DEBOUNCE_MS};
use crate::error::{MarginaliaError, Result};
use crate::export;
use crate::types::{Annotation, AnnotationId, Category, Document, TextRange};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

struct StoreState {
    document: Document,
    selected: Option<AnnotationId>,
}

/// Handle to the live document and its annotations
///
/// Cheaply cloneable; all clones share the same state. Consumers observe
/// changes through [`DocumentStore::subscribe`] rather than reaching into
/// shared globals.
#[derive(Clone)]
pub struct DocumentStore {
    state: Arc<RwLock<StoreState>>,
    pending_save: Arc<Mutex<Option<JoinHandle<()>>>>,
    paths: SharedPaths,
    debounce: Duration,
    revision: Arc<watch::Sender<u64>>,
}

impl DocumentStore {
    /// Create a store over the given shared directory with the default
    /// 500 ms save debounce
    pub fn new(paths: SharedPaths) -> Self {
        Self::with_debounce(paths, Duration::from_millis(DEFAULT_DEBOUNCE_MS))
    }

    /// Create a store with an explicit debounce interval
    pub fn with_debounce(paths: SharedPaths, debounce: Duration) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            state: Arc::new(RwLock::new(StoreState {
                document: Document::new(),
                selected: None,
            })),
            pending_save: Arc::new(Mutex::new(None)),
            paths,
            debounce,
            revision: Arc::new(revision),
        }
    }

    /// Subscribe to change notifications
    ///
    /// The channel carries a revision counter that bumps on every mutation,
    /// including selection changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Snapshot of the current document
    pub async fn document(&self) -> Document {
        self.state.read().await.document.clone()
    }

    /// The currently selected annotation, if any
    pub async fn selected_annotation(&self) -> Option<AnnotationId> {
        self.state.read().await.selected
    }

    /// Load the document from `state.json`, if present
    ///
    /// Returns true when a previous state was restored. Called once at
    /// startup; any error leaves the in-memory document untouched.
    pub async fn load(&self) -> Result<bool> {
        let path = self.paths.state_path();
        if !path.exists() {
            return Ok(false);
        }

        let json = tokio::fs::read_to_string(&path).await?;
        let document: Document = serde_json::from_str(&json)?;
        debug!("Restored document '{}' from {}", document.title, path.display());

        let mut state = self.state.write().await;
        state.document = document;
        state.selected = None;
        drop(state);
        self.notify();
        Ok(true)
    }

    /// Replace the document title
    pub async fn update_title(&self, title: impl Into<String>) {
        let mut state = self.state.write().await;
        state.document.title = title.into();
        state.document.touch();
        drop(state);
        self.committed();
    }

    /// Replace the document content
    ///
    /// Annotation ranges are not re-anchored; annotations keep the offsets
    /// and text snapshot captured at creation time.
    pub async fn update_content(&self, content: impl Into<String>) {
        let mut state = self.state.write().await;
        state.document.content = content.into();
        state.document.touch();
        drop(state);
        self.committed();
    }

    /// Replace the document wholesale with the contents of a file
    ///
    /// Fails with an I/O error if the file is unreadable, or [`MarginaliaError::NotText`]
    /// if it is not valid UTF-8; the current document is left unchanged on
    /// failure. The new document's title is the filename without extension
    /// and it starts with no annotations.
    pub async fn open_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let content = String::from_utf8(bytes)
            .map_err(|_| MarginaliaError::NotText(path.display().to_string()))?;

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Untitled".to_string());
        let document = Document::from_text(title, content, filename, Some(path.to_path_buf()));

        let mut state = self.state.write().await;
        state.document = document;
        state.selected = None;
        drop(state);
        self.committed();
        Ok(())
    }

    /// Reset to an empty document, clearing any selection
    pub async fn new_document(&self) {
        let mut state = self.state.write().await;
        state.document = Document::new();
        state.selected = None;
        drop(state);
        self.committed();
    }

    /// Create an annotation and append it to the document
    ///
    /// Overlapping ranges are permitted; no de-duplication is attempted.
    /// Returns the new annotation's ID.
    pub async fn add_annotation(
        &self,
        range: TextRange,
        selected_text: impl Into<String>,
        category: Option<Category>,
        comment: impl Into<String>,
    ) -> AnnotationId {
        let annotation = Annotation::new(range, selected_text, category, comment);
        let id = annotation.id;

        let mut state = self.state.write().await;
        state.document.annotations.push(annotation);
        state.document.touch();
        drop(state);
        self.committed();
        id
    }

    /// Mark an annotation resolved; no-op if the ID does not exist
    pub async fn resolve_annotation(&self, id: AnnotationId) {
        self.set_resolved(id, true).await;
    }

    /// Mark an annotation unresolved; no-op if the ID does not exist
    pub async fn unresolve_annotation(&self, id: AnnotationId) {
        self.set_resolved(id, false).await;
    }

    async fn set_resolved(&self, id: AnnotationId, resolved: bool) {
        let mut state = self.state.write().await;
        let changed = match state.document.annotation_mut(id) {
            Some(annotation) if annotation.is_resolved != resolved => {
                if resolved {
                    annotation.resolve();
                } else {
                    annotation.unresolve();
                }
                true
            }
            _ => false,
        };
        if changed {
            state.document.touch();
        }
        drop(state);
        if changed {
            self.committed();
        }
    }

    /// Remove every resolved annotation
    pub async fn clear_resolved_annotations(&self) {
        let mut state = self.state.write().await;
        let before = state.document.annotations.len();
        state.document.annotations.retain(|a| !a.is_resolved);
        let removed = before - state.document.annotations.len();
        if removed > 0 {
            if let Some(selected) = state.selected {
                if state.document.annotation(selected).is_none() {
                    state.selected = None;
                }
            }
            state.document.touch();
        }
        drop(state);
        if removed > 0 {
            self.committed();
        }
    }

    /// Remove an annotation; clears the selection if it pointed at it
    pub async fn delete_annotation(&self, id: AnnotationId) {
        let mut state = self.state.write().await;
        let before = state.document.annotations.len();
        state.document.annotations.retain(|a| a.id != id);
        let removed = state.document.annotations.len() != before;
        if removed {
            if state.selected == Some(id) {
                state.selected = None;
            }
            state.document.touch();
        }
        drop(state);
        if removed {
            self.committed();
        }
    }

    /// Set or clear the current selection pointer
    ///
    /// No side effects beyond the pointer and a change notification; nothing
    /// is persisted for selection changes.
    pub async fn select_annotation(&self, id: Option<AnnotationId>) {
        let mut state = self.state.write().await;
        state.selected = id;
        drop(state);
        self.notify();
    }

    /// Move the selection to the next unresolved annotation
    ///
    /// Navigation orders unresolved annotations ascending by start offset and
    /// wraps circularly. With no current selection (or a selection no longer
    /// in the unresolved set) it jumps to the first. No-op when there are no
    /// unresolved annotations.
    pub async fn navigate_to_next(&self) {
        self.navigate(NavDirection::Next).await;
    }

    /// Move the selection to the previous unresolved annotation
    ///
    /// Mirror of [`DocumentStore::navigate_to_next`]: jumps to the last when
    /// nothing is selected, wraps from the first back to the last.
    pub async fn navigate_to_previous(&self) {
        self.navigate(NavDirection::Previous).await;
    }

    async fn navigate(&self, direction: NavDirection) {
        let mut state = self.state.write().await;

        let mut unresolved: Vec<(AnnotationId, usize)> = state
            .document
            .annotations
            .iter()
            .filter(|a| !a.is_resolved)
            .map(|a| (a.id, a.range.start_offset))
            .collect();
        if unresolved.is_empty() {
            return;
        }
        unresolved.sort_by_key(|(_, start)| *start);

        let len = unresolved.len();
        let current = state
            .selected
            .and_then(|sel| unresolved.iter().position(|(id, _)| *id == sel));
        let target = match (direction, current) {
            (NavDirection::Next, Some(i)) => (i + 1) % len,
            (NavDirection::Next, None) => 0,
            (NavDirection::Previous, Some(i)) => (i + len - 1) % len,
            (NavDirection::Previous, None) => len - 1,
        };

        state.selected = Some(unresolved[target].0);
        drop(state);
        self.notify();
    }

    /// Cancel any pending debounced save and persist immediately
    ///
    /// Used at shutdown and by tests; the debounced path logs failures
    /// instead of returning them.
    pub async fn save_now(&self) -> Result<()> {
        self.cancel_pending_save();
        let document = self.state.read().await.document.clone();
        persist(&self.paths, &document).await
    }

    /// Notify subscribers and schedule a debounced save
    fn committed(&self) {
        self.notify();
        self.schedule_save();
    }

    fn notify(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    fn cancel_pending_save(&self) {
        let mut pending = self
            .pending_save
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(handle) = pending.take() {
            handle.abort();
        }
    }

    /// Schedule a save after the quiet interval, cancelling any pending one
    ///
    /// Last mutation wins: a burst of mutations coalesces into a single
    /// write of the final state.
    fn schedule_save(&self) {
        let state = Arc::clone(&self.state);
        let paths = self.paths.clone();
        let delay = self.debounce;

        let mut pending = self
            .pending_save
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(handle) = pending.take() {
            handle.abort();
        }
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let document = state.read().await.document.clone();
            if let Err(e) = persist(&paths, &document).await {
                warn!("Debounced save failed (in-memory state preserved): {}", e);
            }
        }));
    }
}

#[derive(Clone, Copy)]
enum NavDirection {
    Next,
    Previous,
}

/// Write the full document state and the derived export snapshot
///
/// The export is re-derived on every save so the externally-visible
/// `document.json` is never more than one debounce interval stale.
async fn persist(paths: &SharedPaths, document: &Document) -> Result<()> {
    paths.ensure_dir()?;

    let state_json = serde_json::to_string_pretty(document)?;
    write_atomic(&paths.state_path(), &state_json).await?;

    let snapshot = export::snapshot(document);
    let export_json = serde_json::to_string_pretty(&snapshot)?;
    write_atomic(&paths.export_path(), &export_json).await?;

    debug!(
        "Persisted document '{}' ({} annotations)",
        document.title,
        document.annotations.len()
    );
    Ok(())
}

/// Write via a temp file and rename so readers never see a partial file
async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportSnapshot;
    use tempfile::TempDir;

    fn store_in(temp: &TempDir) -> DocumentStore {
        DocumentStore::with_debounce(
            SharedPaths::new(temp.path()),
            Duration::from_millis(20),
        )
    }

    async fn add(store: &DocumentStore, start: usize, comment: &str) -> AnnotationId {
        store
            .add_annotation(TextRange::new(start, start + 1), "x", None, comment)
            .await
    }

    #[tokio::test]
    async fn test_update_title_and_content() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        store.update_title("Draft").await;
        store.update_content("hello world").await;

        let doc = store.document().await;
        assert_eq!(doc.title, "Draft");
        assert_eq!(doc.content, "hello world");
        assert_eq!(doc.word_count(), 2);
    }

    #[tokio::test]
    async fn test_resolve_unresolve_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        let id = add(&store, 0, "c").await;

        store.resolve_annotation(id).await;
        store.resolve_annotation(id).await;
        assert!(store.document().await.annotation(id).unwrap().is_resolved);

        store.unresolve_annotation(id).await;
        store.unresolve_annotation(id).await;
        assert!(!store.document().await.annotation(id).unwrap().is_resolved);

        // Unknown IDs are silent no-ops.
        store.resolve_annotation(AnnotationId::new()).await;
    }

    #[tokio::test]
    async fn test_navigation_is_circular_and_offset_ordered() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        // Created out of offset order on purpose.
        let b = add(&store, 20, "b").await;
        let a = add(&store, 5, "a").await;
        let c = add(&store, 40, "c").await;

        store.navigate_to_next().await;
        assert_eq!(store.selected_annotation().await, Some(a));
        store.navigate_to_next().await;
        assert_eq!(store.selected_annotation().await, Some(b));
        store.navigate_to_next().await;
        assert_eq!(store.selected_annotation().await, Some(c));
        store.navigate_to_next().await;
        assert_eq!(store.selected_annotation().await, Some(a));

        store.navigate_to_previous().await;
        assert_eq!(store.selected_annotation().await, Some(c));
    }

    #[tokio::test]
    async fn test_navigation_next_then_previous_round_trips() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        let a = add(&store, 5, "a").await;
        let _b = add(&store, 20, "b").await;

        store.select_annotation(Some(a)).await;
        store.navigate_to_next().await;
        store.navigate_to_previous().await;
        assert_eq!(store.selected_annotation().await, Some(a));
    }

    #[tokio::test]
    async fn test_navigation_skips_resolved_and_empty_is_noop() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        store.navigate_to_next().await;
        assert_eq!(store.selected_annotation().await, None);

        let a = add(&store, 5, "a").await;
        let b = add(&store, 20, "b").await;
        store.resolve_annotation(a).await;

        store.navigate_to_next().await;
        assert_eq!(store.selected_annotation().await, Some(b));
        store.navigate_to_next().await;
        assert_eq!(store.selected_annotation().await, Some(b));

        store.resolve_annotation(b).await;
        store.navigate_to_next().await;
        // Selection untouched once nothing is unresolved.
        assert_eq!(store.selected_annotation().await, Some(b));
    }

    #[tokio::test]
    async fn test_delete_clears_selection() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        let id = add(&store, 0, "c").await;

        store.select_annotation(Some(id)).await;
        store.delete_annotation(id).await;

        assert_eq!(store.selected_annotation().await, None);
        assert!(store.document().await.annotations.is_empty());
    }

    #[tokio::test]
    async fn test_clear_resolved() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        let a = add(&store, 0, "a").await;
        let b = add(&store, 5, "b").await;
        store.resolve_annotation(a).await;

        store.clear_resolved_annotations().await;

        let doc = store.document().await;
        assert_eq!(doc.annotations.len(), 1);
        assert_eq!(doc.annotations[0].id, b);
    }

    #[tokio::test]
    async fn test_open_file_and_invalid_utf8() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        add(&store, 0, "stale").await;

        let text_path = temp.path().join("essay.txt");
        tokio::fs::write(&text_path, "fresh content").await.unwrap();
        store.open_file(&text_path).await.unwrap();

        let doc = store.document().await;
        assert_eq!(doc.title, "essay");
        assert_eq!(doc.filename.as_deref(), Some("essay.txt"));
        assert_eq!(doc.content, "fresh content");
        assert!(doc.annotations.is_empty());

        // A non-text file must fail and leave the document unchanged.
        let bin_path = temp.path().join("blob.bin");
        tokio::fs::write(&bin_path, [0xff, 0xfe, 0x00, 0x80])
            .await
            .unwrap();
        let err = store.open_file(&bin_path).await.unwrap_err();
        assert!(matches!(err, MarginaliaError::NotText(_)));
        assert_eq!(store.document().await.content, "fresh content");

        // Missing files surface as I/O errors.
        let err = store
            .open_file(temp.path().join("missing.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, MarginaliaError::Io(_)));
    }

    #[tokio::test]
    async fn test_new_document_resets_everything() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        let id = add(&store, 0, "c").await;
        store.select_annotation(Some(id)).await;
        store.update_content("text").await;

        store.new_document().await;

        let doc = store.document().await;
        assert_eq!(doc.title, "Untitled");
        assert!(doc.content.is_empty());
        assert!(doc.annotations.is_empty());
        assert_eq!(store.selected_annotation().await, None);
    }

    #[tokio::test]
    async fn test_offsets_are_not_reanchored_on_edit() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        store.update_content("hello brave world").await;
        let id = store
            .add_annotation(TextRange::new(6, 11), "brave", None, "c")
            .await;

        // Editing upstream of the annotation shifts the passage but not the range.
        store.update_content("PREFIX hello brave world").await;

        let doc = store.document().await;
        let ann = doc.annotation(id).unwrap();
        assert_eq!(ann.range, TextRange::new(6, 11));
        assert_eq!(ann.selected_text, "brave");
    }

    #[tokio::test]
    async fn test_save_now_writes_state_and_export() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        store.update_title("Essay").await;
        let keep = add(&store, 0, "keep").await;
        let gone = add(&store, 5, "gone").await;
        store.resolve_annotation(gone).await;

        store.save_now().await.unwrap();

        let paths = SharedPaths::new(temp.path());
        let state: Document = serde_json::from_str(
            &tokio::fs::read_to_string(paths.state_path()).await.unwrap(),
        )
        .unwrap();
        assert_eq!(state.title, "Essay");
        assert_eq!(state.annotations.len(), 2);

        let snapshot: ExportSnapshot = serde_json::from_str(
            &tokio::fs::read_to_string(paths.export_path()).await.unwrap(),
        )
        .unwrap();
        assert_eq!(snapshot.annotations.len(), 1);
        assert_eq!(snapshot.annotations[0].id, keep.to_string());
    }

    #[tokio::test]
    async fn test_debounce_coalesces_mutations() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        store.update_content("first").await;
        store.update_content("second").await;
        store.update_content("final").await;

        // Wait out the 20 ms debounce with margin.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let paths = SharedPaths::new(temp.path());
        let state: Document = serde_json::from_str(
            &tokio::fs::read_to_string(paths.state_path()).await.unwrap(),
        )
        .unwrap();
        assert_eq!(state.content, "final");
    }

    #[tokio::test]
    async fn test_load_restores_state() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        store.update_title("Persisted").await;
        add(&store, 0, "c").await;
        store.save_now().await.unwrap();

        let fresh = store_in(&temp);
        assert!(fresh.load().await.unwrap());
        let doc = fresh.document().await;
        assert_eq!(doc.title, "Persisted");
        assert_eq!(doc.annotations.len(), 1);

        let empty_dir = TempDir::new().unwrap();
        let other = store_in(&empty_dir);
        assert!(!other.load().await.unwrap());
    }

    #[tokio::test]
    async fn test_subscribe_sees_mutations() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        let mut rx = store.subscribe();
        let before = *rx.borrow_and_update();

        store.update_content("changed").await;

        rx.changed().await.unwrap();
        assert!(*rx.borrow() > before);
    }
}
