//! The workspace reactor: single owner of layout, cache, bus, and saver.
//!
//! All layout mutations go through here so they stay totally ordered and
//! their vault events reach the bus exactly once. In-memory mutations are
//! synchronous; only file I/O awaits. Content loads run on spawned tasks
//! and check their tab's cancel token before delivering.

use std::sync::Arc;

use tracing::{debug, info};

use lattice_types::{FileHandle, PaneId, TabId, VaultEvent};

use crate::bus::EventBus;
use crate::cache::ContentCache;
use crate::fs::{Content, FsAdapter};
use crate::layout::{LayoutError, LayoutTree, LayoutUpdate, Orientation};
use crate::saver::SaveScheduler;

/// The workbench's authoritative state.
pub struct Workspace {
    layout: LayoutTree,
    cache: Arc<ContentCache>,
    bus: Arc<EventBus<VaultEvent>>,
    fs: Arc<dyn FsAdapter>,
    saver: SaveScheduler,
}

impl Workspace {
    pub fn new(fs: Arc<dyn FsAdapter>) -> Self {
        Self {
            layout: LayoutTree::new(),
            cache: Arc::new(ContentCache::new()),
            bus: Arc::new(EventBus::new(256)),
            fs: fs.clone(),
            saver: SaveScheduler::new(fs),
        }
    }

    /// Current layout snapshot.
    pub fn layout(&self) -> &LayoutTree {
        &self.layout
    }

    /// The vault event bus.
    pub fn bus(&self) -> &Arc<EventBus<VaultEvent>> {
        &self.bus
    }

    /// The content cache.
    pub fn cache(&self) -> &Arc<ContentCache> {
        &self.cache
    }

    /// The save scheduler.
    pub fn saver(&self) -> &SaveScheduler {
        &self.saver
    }

    /// Announce the opened vault to subscribers.
    pub fn announce_open(&self, name: impl Into<String>) {
        self.bus.publish(VaultEvent::WorkspaceOpen { name: name.into() });
    }

    /// Commit a layout update: adopt the snapshot, publish its events.
    fn commit(&mut self, update: LayoutUpdate) -> Option<PaneId> {
        for event in &update.events {
            self.bus.publish(event.clone());
        }
        self.layout = update.tree;
        update.created_pane
    }

    /// Open a file in a pane and start loading its content.
    pub fn open_file(
        &mut self,
        pane: PaneId,
        handle: FileHandle,
        path: impl Into<String>,
    ) -> Result<TabId, LayoutError> {
        let path = path.into();
        let update = self.layout.open_file(pane, handle, path.clone())?;
        // The freshly appended tab is the pane's last.
        let tab = update
            .tree
            .pane(pane)?
            .tabs
            .last()
            .map(|t| t.id)
            .ok_or(LayoutError::PaneNotFound(pane))?;
        self.commit(update);

        let token = self.cache.begin_load(tab);
        let cache = self.cache.clone();
        let fs = self.fs.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = token.cancelled() => return, // tab closed mid-load
                r = fs.read_file(&path) => r.map_err(|e| e.to_string()),
            };
            cache.complete_load(tab, &token, result);
        });
        debug!(%tab, "opened file");
        Ok(tab)
    }

    /// Close a tab: flush its pending save, drop its cache entry, mutate.
    pub async fn close_tab(&mut self, pane: PaneId, index: usize) -> Result<(), LayoutError> {
        let tab = self
            .layout
            .pane(pane)?
            .tabs
            .get(index)
            .map(|t| t.id)
            .ok_or(LayoutError::TabIndexOutOfRange {
                pane,
                index,
                len: self.layout.pane(pane)?.tabs.len(),
            })?;
        self.saver.flush_tab(tab).await;
        let update = self.layout.close_tab(pane, index)?;
        self.cache.invalidate(tab);
        self.commit(update);
        Ok(())
    }

    /// Split a pane; returns the new pane id.
    pub fn split_pane(&mut self, pane: PaneId, direction: Orientation) -> Result<PaneId, LayoutError> {
        let update = self.layout.split_pane(pane, direction)?;
        self.commit(update)
            .ok_or(LayoutError::PaneNotFound(pane))
    }

    /// Close a pane, flushing and invalidating its tabs.
    pub async fn close_pane(&mut self, pane: PaneId) -> Result<(), LayoutError> {
        let tabs: Vec<TabId> = self.layout.pane(pane)?.tabs.iter().map(|t| t.id).collect();
        for tab in &tabs {
            self.saver.flush_tab(*tab).await;
        }
        let update = self.layout.close_pane(pane)?;
        for tab in tabs {
            self.cache.invalidate(tab);
        }
        self.commit(update);
        Ok(())
    }

    /// Record an edit: cache the new content, mark the tab dirty, and
    /// schedule a debounced save.
    pub fn edit_tab(&mut self, tab: TabId, content: Content) -> Result<(), LayoutError> {
        let (pane, index) = self
            .layout
            .find_tab(tab)
            .ok_or(LayoutError::TabIndexOutOfRange { pane: self.layout.active_pane(), index: 0, len: 0 })?;
        self.cache.update(tab, content.clone());
        let path = self.layout.pane(pane)?.tabs[index].path.clone();
        let update = self.layout.set_tab_dirty(tab, true)?;
        self.commit(update);
        self.saver.schedule_save(tab, path, content);
        Ok(())
    }

    /// Mark a tab clean (its save landed) and publish the save event.
    pub fn mark_saved(&mut self, tab: TabId) {
        if let Some((pane, index)) = self.layout.find_tab(tab) {
            let path = self
                .layout
                .pane(pane)
                .ok()
                .map(|p| p.tabs[index].path.clone());
            if let Ok(update) = self.layout.set_tab_dirty(tab, false) {
                self.commit(update);
            }
            if let Some(path) = path {
                self.bus.publish(VaultEvent::FileSave { path });
            }
        }
    }

    /// React to an external file deletion: close every tab on the path.
    pub fn handle_file_deleted(&mut self, path: &str) -> Result<(), LayoutError> {
        let update = self.layout.close_tabs_by_path(path)?;
        let closed: Vec<TabId> = self
            .layout
            .panes()
            .iter()
            .flat_map(|p| self.layout.pane(*p).into_iter())
            .flat_map(|p| p.tabs.iter())
            .filter(|t| t.path == path)
            .map(|t| t.id)
            .collect();
        for tab in closed {
            self.saver.discard(tab);
            self.cache.invalidate(tab);
        }
        self.commit(update);
        self.bus.publish(VaultEvent::FileDelete { path: path.to_string() });
        Ok(())
    }

    /// React to an external rename: rewrite tab paths, cache untouched.
    pub fn handle_file_renamed(&mut self, old: &str, new: &str) -> Result<(), LayoutError> {
        let update = self.layout.update_tabs_path(old, new)?;
        self.commit(update);
        self.bus.publish(VaultEvent::FileRename { old: old.to_string(), new: new.to_string() });
        Ok(())
    }

    /// Shutdown path: flush every pending save.
    pub async fn shutdown(&self) {
        info!("workspace shutdown: flushing saves");
        self.saver.flush_pending_saves().await;
    }
}

// ============================================================================
// Tests
// ============================================================================
