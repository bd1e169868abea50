//! Tab-keyed content cache.
//!
//! Entries are keyed by tab id, never by path: two tabs on the same file may
//! diverge during editing, and a path-keyed cache would silently cross their
//! contents. Loads are cancellable; a load completing after its tab closed
//! (or after a newer load started) drops its result silently.

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use lattice_types::TabId;

use crate::fs::Content;

/// Load state of a cache entry.
#[derive(Clone, Debug, PartialEq)]
pub enum LoadState {
    /// A load is in flight.
    Pending,
    /// Content is available.
    Ready(Content),
    /// The load failed.
    Error(String),
}

struct CacheEntry {
    state: LoadState,
    cancel: CancellationToken,
}

/// The content cache. Owned by the main reactor; readers get copies.
#[derive(Default)]
pub struct ContentCache {
    entries: DashMap<TabId, CacheEntry>,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a load as started and return the token the loader must check.
    ///
    /// A previous in-flight load for the same tab is cancelled.
    pub fn begin_load(&self, tab: TabId) -> CancellationToken {
        let cancel = CancellationToken::new();
        if let Some(old) = self.entries.insert(
            tab,
            CacheEntry { state: LoadState::Pending, cancel: cancel.clone() },
        ) {
            old.cancel.cancel();
        }
        cancel
    }

    /// Complete a load. No-op when the tab's entry is gone or the supplied
    /// token was superseded or cancelled.
    pub fn complete_load(
        &self,
        tab: TabId,
        token: &CancellationToken,
        result: Result<Content, String>,
    ) {
        if token.is_cancelled() {
            debug!(tab = %tab, "dropping cancelled load result");
            return;
        }
        if let Some(mut entry) = self.entries.get_mut(&tab) {
            if !entry.cancel.is_cancelled() {
                entry.state = match result {
                    Ok(content) => LoadState::Ready(content),
                    Err(msg) => LoadState::Error(msg),
                };
            }
        }
    }

    /// Overwrite an entry with edited content (marks it Ready).
    pub fn update(&self, tab: TabId, content: Content) {
        let cancel = self
            .entries
            .get(&tab)
            .map(|e| e.cancel.clone())
            .unwrap_or_default();
        self.entries.insert(tab, CacheEntry { state: LoadState::Ready(content), cancel });
    }

    /// Current load state, by copy.
    pub fn state(&self, tab: TabId) -> Option<LoadState> {
        self.entries.get(&tab).map(|e| e.state.clone())
    }

    /// Ready content, by copy.
    pub fn content(&self, tab: TabId) -> Option<Content> {
        self.entries.get(&tab).and_then(|e| match &e.state {
            LoadState::Ready(c) => Some(c.clone()),
            _ => None,
        })
    }

    /// Drop the entry and cancel any in-flight load. Called on tab close.
    pub fn invalidate(&self, tab: TabId) {
        if let Some((_, entry)) = self.entries.remove(&tab) {
            entry.cancel.cancel();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
