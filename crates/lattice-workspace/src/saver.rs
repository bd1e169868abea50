//! Debounced per-tab save scheduling.
//!
//! Edits schedule a save that fires after a quiet period (≈ 300 ms); rapid
//! keystrokes keep pushing the deadline out. `flush_pending_saves` forces
//! everything to disk immediately — the host's shutdown and tab-close paths
//! must call it, otherwise the last keystroke burst is lost. Save failures
//! surface on the status channel as non-blocking notifications and never
//! roll back in-memory edits.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use lattice_types::TabId;

use crate::fs::{Content, FsAdapter};

/// Default quiet period before a scheduled save fires.
pub const SAVE_DEBOUNCE: Duration = Duration::from_millis(300);

/// Outcome of a save attempt, published on the status channel.
#[derive(Clone, Debug, PartialEq)]
pub struct SaveStatus {
    pub tab: TabId,
    pub path: String,
    /// `Err` carries a display message for the toast layer.
    pub result: Result<(), String>,
}

struct PendingSave {
    path: String,
    content: Content,
    /// Bumped on every reschedule; a sleeper only fires if it still owns
    /// the latest generation.
    generation: u64,
}

/// Per-tab debounced save scheduler.
pub struct SaveScheduler {
    fs: Arc<dyn FsAdapter>,
    pending: Arc<Mutex<HashMap<TabId, PendingSave>>>,
    debounce: Duration,
    status_tx: broadcast::Sender<SaveStatus>,
}

impl SaveScheduler {
    pub fn new(fs: Arc<dyn FsAdapter>) -> Self {
        Self::with_debounce(fs, SAVE_DEBOUNCE)
    }

    pub fn with_debounce(fs: Arc<dyn FsAdapter>, debounce: Duration) -> Self {
        let (status_tx, _) = broadcast::channel(64);
        Self {
            fs,
            pending: Arc::new(Mutex::new(HashMap::new())),
            debounce,
            status_tx,
        }
    }

    /// Subscribe to save outcomes (the toast channel).
    pub fn subscribe_status(&self) -> broadcast::Receiver<SaveStatus> {
        self.status_tx.subscribe()
    }

    /// Schedule (or reschedule) a save of `content` to `path` for `tab`.
    pub fn schedule_save(&self, tab: TabId, path: impl Into<String>, content: Content) {
        let path = path.into();
        let generation = {
            let mut pending = self.pending.lock();
            let entry = pending.entry(tab).or_insert_with(|| PendingSave {
                path: path.clone(),
                content: content.clone(),
                generation: 0,
            });
            entry.path = path;
            entry.content = content;
            entry.generation += 1;
            entry.generation
        };

        let fs = self.fs.clone();
        let pending = self.pending.clone();
        let status_tx = self.status_tx.clone();
        let debounce = self.debounce;
        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let claimed = {
                let mut map = pending.lock();
                if map.get(&tab).is_some_and(|p| p.generation == generation) {
                    map.remove(&tab)
                } else {
                    None // rescheduled or flushed meanwhile
                }
            };
            if let Some(save) = claimed {
                write_and_report(&*fs, &status_tx, tab, save.path, save.content).await;
            }
        });
    }

    /// Whether a save is pending for `tab`.
    pub fn has_pending(&self, tab: TabId) -> bool {
        self.pending.lock().contains_key(&tab)
    }

    /// Immediately flush the pending save for one tab, if any.
    pub async fn flush_tab(&self, tab: TabId) {
        let claimed = self.pending.lock().remove(&tab);
        if let Some(save) = claimed {
            write_and_report(&*self.fs, &self.status_tx, tab, save.path, save.content).await;
        }
    }

    /// Immediately flush every pending save. Called on shutdown and before
    /// tab close so dirty content is never lost.
    pub async fn flush_pending_saves(&self) {
        let drained: Vec<(TabId, PendingSave)> = {
            let mut map = self.pending.lock();
            map.drain().collect()
        };
        debug!(count = drained.len(), "flushing pending saves");
        for (tab, save) in drained {
            write_and_report(&*self.fs, &self.status_tx, tab, save.path, save.content).await;
        }
    }

    /// Drop a pending save without writing (tab closed with discard).
    pub fn discard(&self, tab: TabId) {
        self.pending.lock().remove(&tab);
    }
}

async fn write_and_report(
    fs: &dyn FsAdapter,
    status_tx: &broadcast::Sender<SaveStatus>,
    tab: TabId,
    path: String,
    content: Content,
) {
    let result = fs
        .write_file(&path, content)
        .await
        .map_err(|e| e.to_string());
    if let Err(msg) = &result {
        warn!(tab = %tab, path = %path, error = %msg, "save failed");
    }
    let _ = status_tx.send(SaveStatus { tab, path, result });
}

// ============================================================================
// Tests
// ============================================================================
