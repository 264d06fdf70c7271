//! Agent response watcher
//!
//! Detects externally-authored agent responses without any push channel:
//! the shared `agent-response.json` is polled on a fixed cadence, and the
//! file is re-read and fully re-parsed only when its modification time
//! advances past the last observed value. Reads are parse-all-or-nothing;
//! a malformed file keeps the previous valid in-memory view and records the
//! error, since stale-but-valid data beats no data.
//!
//! The watcher never modifies the shared file in place. Its only write-side
//! operation is `clear_responses`, which deletes the file outright; the
//! single-writer-per-file discipline is what makes lock-free cooperation
//! with the agent safe.

use crate::config::{SharedPaths, DEFAULT_POLL_INTERVAL_MS};
use crate::store::DocumentStore;
use crate::types::{
    AgentAnnotationResponse, AgentDocumentUpdate, AgentResponseFile, AnnotationId,
    AnnotationThread, MessageRole, ThreadMessage,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Default)]
struct WatcherState {
    /// Last complete parse of the shared file, if any
    view: Option<AgentResponseFile>,

    /// Modification time observed at the last read attempt
    last_modified: Option<SystemTime>,

    /// Annotation IDs whose response has been seen; process-local only,
    /// resets on restart
    seen: HashSet<String>,

    /// Most recent non-fatal read/parse error
    last_error: Option<String>,
}

struct PollHandle {
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

/// Watches the shared agent response file and surfaces its contents
///
/// Cheaply cloneable; all clones share the same view. Consumers observe view
/// changes through [`AgentResponseWatcher::subscribe`].
#[derive(Clone)]
pub struct AgentResponseWatcher {
    state: Arc<RwLock<WatcherState>>,
    paths: SharedPaths,
    poll_interval: Duration,
    poll_task: Arc<Mutex<Option<PollHandle>>>,
    updates: Arc<watch::Sender<u64>>,
}

impl AgentResponseWatcher {
    /// Create a watcher over the given shared directory with the default
    /// 1 s poll interval
    pub fn new(paths: SharedPaths) -> Self {
        Self::with_poll_interval(paths, Duration::from_millis(DEFAULT_POLL_INTERVAL_MS))
    }

    /// Create a watcher with an explicit poll interval
    pub fn with_poll_interval(paths: SharedPaths, poll_interval: Duration) -> Self {
        let (updates, _) = watch::channel(0);
        Self {
            state: Arc::new(RwLock::new(WatcherState::default())),
            paths,
            poll_interval,
            poll_task: Arc::new(Mutex::new(None)),
            updates: Arc::new(updates),
        }
    }

    /// Subscribe to view-change notifications
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.updates.subscribe()
    }

    /// Perform an immediate load, then start the poll loop
    ///
    /// Safe to call repeatedly; an already-running loop is restarted.
    pub async fn start_watching(&self) {
        self.stop_watching().await;
        self.refresh().await;

        let state = Arc::clone(&self.state);
        let paths = self.paths.clone();
        let updates = Arc::clone(&self.updates);
        let interval = self.poll_interval;
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

        let task = tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        poll_once(&state, &paths, &updates).await;
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Agent response watcher received shutdown signal");
                        break;
                    }
                }
            }
        });

        let mut slot = self
            .poll_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(PollHandle { shutdown_tx, task });
        info!(
            "Watching {} every {:?}",
            self.paths.response_path().display(),
            interval
        );
    }

    /// Stop the poll loop, leaving the in-memory view as last observed
    pub async fn stop_watching(&self) {
        let handle = {
            let mut slot = self
                .poll_task
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            slot.take()
        };
        if let Some(handle) = handle {
            let _ = handle.shutdown_tx.send(());
            let _ = handle.task.await;
        }
    }

    /// Check the shared file once, outside the poll loop
    pub async fn refresh(&self) {
        poll_once(&self.state, &self.paths, &self.updates).await;
    }

    /// Whether the poll loop is currently running
    pub fn is_watching(&self) -> bool {
        self.poll_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map(|h| !h.task.is_finished())
            .unwrap_or(false)
    }

    /// Clone of the current in-memory view, if any
    pub async fn view(&self) -> Option<AgentResponseFile> {
        self.state.read().await.view.clone()
    }

    /// All current annotation responses
    pub async fn responses(&self) -> Vec<AgentAnnotationResponse> {
        self.state
            .read()
            .await
            .view
            .as_ref()
            .map(|v| v.annotation_responses.clone())
            .unwrap_or_default()
    }

    /// All proposed document updates
    pub async fn document_updates(&self) -> Vec<AgentDocumentUpdate> {
        self.state
            .read()
            .await
            .view
            .as_ref()
            .map(|v| v.document_updates.clone())
            .unwrap_or_default()
    }

    /// The single current response for an annotation, if any
    ///
    /// When the agent wrote multiple entries for the same ID, the latest one
    /// supersedes.
    pub async fn response_for(&self, annotation_id: &str) -> Option<AgentAnnotationResponse> {
        self.state.read().await.view.as_ref().and_then(|v| {
            v.annotation_responses
                .iter()
                .rev()
                .find(|r| r.annotation_id == annotation_id)
                .cloned()
        })
    }

    /// The accumulated conversation thread for an annotation, if any
    pub async fn thread_for(&self, annotation_id: &str) -> Option<AnnotationThread> {
        self.state.read().await.view.as_ref().and_then(|v| {
            v.threads.as_ref().and_then(|threads| {
                threads
                    .iter()
                    .find(|t| t.annotation_id == annotation_id)
                    .cloned()
            })
        })
    }

    /// Most recent read/parse error, if the last check failed
    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.last_error.clone()
    }

    /// True iff some annotation response has not been marked read
    pub async fn has_unread_responses(&self) -> bool {
        let state = self.state.read().await;
        match &state.view {
            Some(view) => view
                .annotation_responses
                .iter()
                .any(|r| !state.seen.contains(&r.annotation_id)),
            None => false,
        }
    }

    /// Mark one annotation's response as seen
    pub async fn mark_read(&self, annotation_id: &str) {
        let mut state = self.state.write().await;
        state.seen.insert(annotation_id.to_string());
        drop(state);
        notify(&self.updates);
    }

    /// Mark every currently-present response as seen
    pub async fn mark_all_read(&self) {
        let mut state = self.state.write().await;
        let ids: Vec<String> = state
            .view
            .as_ref()
            .map(|v| {
                v.annotation_responses
                    .iter()
                    .map(|r| r.annotation_id.clone())
                    .collect()
            })
            .unwrap_or_default();
        state.seen.extend(ids);
        drop(state);
        notify(&self.updates);
    }

    /// Append a human-authored message to an annotation's thread
    ///
    /// This is a local-only addition to the in-memory view; persisting it
    /// back for the agent is the CLI bridge's concern.
    pub async fn add_human_reply(&self, annotation_id: &str, message: impl Into<String>) {
        let mut state = self.state.write().await;
        let view = state.view.get_or_insert_with(AgentResponseFile::empty);
        let threads = view.threads.get_or_insert_with(Vec::new);
        let entry = ThreadMessage::new(MessageRole::Human, message);

        match threads.iter_mut().find(|t| t.annotation_id == annotation_id) {
            Some(thread) => thread.messages.push(entry),
            None => threads.push(AnnotationThread {
                annotation_id: annotation_id.to_string(),
                messages: vec![entry],
            }),
        }
        drop(state);
        notify(&self.updates);
    }

    /// Apply an agent-proposed document update to the store
    ///
    /// Replaces the full document content, then resolves every addressed
    /// annotation; IDs that are unparseable or no longer exist are silently
    /// skipped.
    pub async fn accept_document_update(
        &self,
        update: &AgentDocumentUpdate,
        store: &DocumentStore,
    ) {
        store.update_content(update.content.clone()).await;

        for raw_id in &update.addressed_annotation_ids {
            match AnnotationId::from_string(raw_id) {
                Ok(id) => store.resolve_annotation(id).await,
                Err(_) => debug!("Skipping unparseable annotation ID '{}'", raw_id),
            }
        }
        info!(
            "Accepted document update addressing {} annotation(s): {}",
            update.addressed_annotation_ids.len(),
            update.summary
        );
    }

    /// Delete the shared file (best-effort) and reset all in-memory state
    pub async fn clear_responses(&self) {
        let path = self.paths.response_path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!("Removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }

        let mut state = self.state.write().await;
        *state = WatcherState::default();
        drop(state);
        notify(&self.updates);
    }
}

fn notify(updates: &watch::Sender<u64>) {
    updates.send_modify(|rev| *rev += 1);
}

/// One poll tick: bounded metadata check, then a conditional full re-parse
async fn poll_once(
    state: &RwLock<WatcherState>,
    paths: &SharedPaths,
    updates: &watch::Sender<u64>,
) {
    let path = paths.response_path();

    let metadata = match tokio::fs::metadata(&path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            // Absent file means an empty view, not an error.
            let mut guard = state.write().await;
            let had_view = guard.view.is_some() || guard.last_modified.is_some();
            guard.view = None;
            guard.last_modified = None;
            guard.last_error = None;
            drop(guard);
            if had_view {
                debug!("{} removed; view cleared", path.display());
                notify(updates);
            }
            return;
        }
        Err(e) => {
            let mut guard = state.write().await;
            guard.last_error = Some(format!("Failed to stat {}: {}", path.display(), e));
            return;
        }
    };

    let modified = metadata.modified().ok();
    {
        let guard = state.read().await;
        if let (Some(current), Some(previous)) = (modified, guard.last_modified) {
            if current <= previous {
                return;
            }
        }
    }

    let text = match tokio::fs::read_to_string(&path).await {
        Ok(text) => text,
        Err(e) => {
            let mut guard = state.write().await;
            guard.last_error = Some(format!("Failed to read {}: {}", path.display(), e));
            return;
        }
    };

    match serde_json::from_str::<AgentResponseFile>(&text) {
        Ok(parsed) => {
            let mut guard = state.write().await;
            debug!(
                "Reloaded {} ({} response(s), {} update(s))",
                path.display(),
                parsed.annotation_responses.len(),
                parsed.document_updates.len()
            );
            guard.view = Some(parsed);
            guard.last_modified = modified;
            guard.last_error = None;
            drop(guard);
            notify(updates);
        }
        Err(e) => {
            // Keep the stale-but-valid view; record the mtime so the broken
            // file is not re-parsed until the agent writes it again.
            warn!("Failed to parse {}: {}", path.display(), e);
            let mut guard = state.write().await;
            guard.last_modified = modified;
            guard.last_error = Some(format!("Failed to parse {}: {}", path.display(), e));
        }
    }
}
