//! The pane layout tree: authoritative state for panes, tabs, and the
//! active-pane/active-tab cursor.
//!
//! The tree is an arena of nodes keyed by stable ids; parents and children
//! refer to each other by id, never by pointer. Every operation is
//! copy-on-write: it clones the arena, mutates the clone, and returns it as
//! a new snapshot together with the vault events the mutation produced.
//! Callers must re-resolve pane and tab references by id after every
//! operation. Invalid ids yield typed errors and never partial mutation.
//!
//! Invariants, checked by `debug_validate` in tests:
//! - every split has ≥ 2 children and per-child sizes summing to 100;
//! - removing a child down to one hoists the survivor in place of the split;
//! - pane ids are unique and the active-pane id names an existing pane;
//! - a pane's active-tab index is `None` iff it has no tabs, else in bounds.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use lattice_types::{FileHandle, NodeId, PaneId, Tab, TabId, VaultEvent};

/// Split orientation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// Minimum percentage share a split child may occupy.
pub const MIN_CHILD_SIZE: f32 = 5.0;
/// Maximum percentage share a split child may occupy.
pub const MAX_CHILD_SIZE: f32 = 95.0;

/// Errors from layout operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LayoutError {
    #[error("pane not found: {0}")]
    PaneNotFound(PaneId),
    #[error("split not found: {0}")]
    SplitNotFound(NodeId),
    #[error("tab index {index} out of range for pane {pane} (len {len})")]
    TabIndexOutOfRange { pane: PaneId, index: usize, len: usize },
    #[error("cannot close the last pane")]
    LastPane,
    #[error("size count {got} does not match child count {expected}")]
    SizeCountMismatch { expected: usize, got: usize },
}

/// A leaf of the layout tree: an ordered tab list plus the active index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pane {
    pub id: PaneId,
    pub tabs: Vec<Tab>,
    /// `None` iff `tabs` is empty; otherwise in bounds.
    pub active: Option<usize>,
}

impl Pane {
    fn new() -> Self {
        Self { id: PaneId::new(), tabs: Vec::new(), active: None }
    }

    /// The currently active tab, if any.
    pub fn active_tab(&self) -> Option<&Tab> {
        self.active.and_then(|i| self.tabs.get(i))
    }
}

/// An internal node: orientation plus sized, ordered children.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub orientation: Orientation,
    pub children: Vec<NodeId>,
    /// Percentage shares, one per child, summing to 100.
    pub sizes: Vec<f32>,
}

/// A node of the layout arena.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LayoutNode {
    Pane(Pane),
    Split(Split),
}

/// Result of a layout mutation: the new snapshot, the vault events it
/// produced, and the id of any pane the operation created.
#[derive(Clone, Debug)]
pub struct LayoutUpdate {
    pub tree: LayoutTree,
    pub events: Vec<VaultEvent>,
    pub created_pane: Option<PaneId>,
}

impl LayoutUpdate {
    fn new(tree: LayoutTree) -> Self {
        Self { tree, events: Vec::new(), created_pane: None }
    }
}

/// The layout tree snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LayoutTree {
    nodes: HashMap<NodeId, LayoutNode>,
    parent: HashMap<NodeId, NodeId>,
    pane_index: HashMap<PaneId, NodeId>,
    root: NodeId,
    active_pane: PaneId,
}

impl LayoutTree {
    /// A fresh layout: one empty pane, which is active.
    pub fn new() -> Self {
        let pane = Pane::new();
        let pane_id = pane.id;
        let node_id = NodeId::new();
        let mut nodes = HashMap::new();
        nodes.insert(node_id, LayoutNode::Pane(pane));
        let mut pane_index = HashMap::new();
        pane_index.insert(pane_id, node_id);
        Self {
            nodes,
            parent: HashMap::new(),
            pane_index,
            root: node_id,
            active_pane: pane_id,
        }
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    /// The active pane id.
    pub fn active_pane(&self) -> PaneId {
        self.active_pane
    }

    /// Resolve a pane by id.
    pub fn pane(&self, id: PaneId) -> Result<&Pane, LayoutError> {
        let node = self.pane_index.get(&id).ok_or(LayoutError::PaneNotFound(id))?;
        match self.nodes.get(node) {
            Some(LayoutNode::Pane(p)) => Ok(p),
            _ => Err(LayoutError::PaneNotFound(id)),
        }
    }

    /// Resolve a split by node id.
    pub fn split(&self, id: NodeId) -> Result<&Split, LayoutError> {
        match self.nodes.get(&id) {
            Some(LayoutNode::Split(s)) => Ok(s),
            _ => Err(LayoutError::SplitNotFound(id)),
        }
    }

    /// The root node id (a pane node when the tree has a single pane).
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Look up any node by id.
    pub fn node(&self, id: NodeId) -> Option<&LayoutNode> {
        self.nodes.get(&id)
    }

    /// Pane ids in deterministic pre-order (left-to-right over splits).
    pub fn panes(&self) -> Vec<PaneId> {
        let mut out = Vec::new();
        self.collect_panes(self.root, &mut out);
        out
    }

    fn collect_panes(&self, node: NodeId, out: &mut Vec<PaneId>) {
        match self.nodes.get(&node) {
            Some(LayoutNode::Pane(p)) => out.push(p.id),
            Some(LayoutNode::Split(s)) => {
                for child in &s.children {
                    self.collect_panes(*child, out);
                }
            }
            None => {}
        }
    }

    /// Locate a tab by id: the pane holding it and its index there.
    pub fn find_tab(&self, tab: TabId) -> Option<(PaneId, usize)> {
        for pane_id in self.panes() {
            if let Ok(pane) = self.pane(pane_id) {
                if let Some(index) = pane.tabs.iter().position(|t| t.id == tab) {
                    return Some((pane_id, index));
                }
            }
        }
        None
    }

    /// The path of the active tab of the active pane, if any.
    pub fn active_path(&self) -> Option<String> {
        self.pane(self.active_pane)
            .ok()
            .and_then(|p| p.active_tab())
            .map(|t| t.path.clone())
    }

    /// Every dirty tab in the tree, in pane pre-order.
    pub fn get_unsaved_tabs(&self) -> Vec<Tab> {
        let mut out = Vec::new();
        for pane_id in self.panes() {
            if let Ok(pane) = self.pane(pane_id) {
                out.extend(pane.tabs.iter().filter(|t| t.dirty).cloned());
            }
        }
        out
    }

    // ── Tab operations ──────────────────────────────────────────────────────

    /// Open a file as a new tab in `pane_id` and make it the active tab.
    pub fn open_file(
        &self,
        pane_id: PaneId,
        handle: FileHandle,
        path: impl Into<String>,
    ) -> Result<LayoutUpdate, LayoutError> {
        let path = path.into();
        self.pane(pane_id)?;
        let mut up = LayoutUpdate::new(self.clone());
        let before = up.tree.active_path();

        let pane = up.tree.pane_mut(pane_id)?;
        pane.tabs.push(Tab::new(handle, path.clone()));
        pane.active = Some(pane.tabs.len() - 1);

        up.events.push(VaultEvent::FileOpen { path });
        up.tree.push_active_change(before, &mut up.events);
        Ok(up)
    }

    /// Close the tab at `index` in `pane_id`. An emptied pane is preserved.
    pub fn close_tab(&self, pane_id: PaneId, index: usize) -> Result<LayoutUpdate, LayoutError> {
        let pane = self.pane(pane_id)?;
        if index >= pane.tabs.len() {
            return Err(LayoutError::TabIndexOutOfRange { pane: pane_id, index, len: pane.tabs.len() });
        }
        let mut up = LayoutUpdate::new(self.clone());
        let before = up.tree.active_path();

        let removed = up.tree.remove_tab_at(pane_id, index)?;
        up.events.push(VaultEvent::FileClose { path: removed.path });
        up.tree.push_active_change(before, &mut up.events);
        Ok(up)
    }

    /// Reorder a tab within a pane, keeping the same tab active.
    pub fn reorder_tabs(
        &self,
        pane_id: PaneId,
        from: usize,
        to: usize,
    ) -> Result<LayoutUpdate, LayoutError> {
        let pane = self.pane(pane_id)?;
        let len = pane.tabs.len();
        if from >= len {
            return Err(LayoutError::TabIndexOutOfRange { pane: pane_id, index: from, len });
        }
        if to >= len {
            return Err(LayoutError::TabIndexOutOfRange { pane: pane_id, index: to, len });
        }
        let mut up = LayoutUpdate::new(self.clone());
        let pane = up.tree.pane_mut(pane_id)?;
        let active_id = pane.active.map(|i| pane.tabs[i].id);
        let tab = pane.tabs.remove(from);
        pane.tabs.insert(to, tab);
        pane.active = active_id.and_then(|id| pane.tabs.iter().position(|t| t.id == id));
        Ok(up)
    }

    /// Move a tab to another pane, making it that pane's active tab.
    /// Dropping a tab onto its own pane is a no-op.
    pub fn move_tab_to_pane(
        &self,
        src_pane: PaneId,
        src_index: usize,
        dst_pane: PaneId,
    ) -> Result<LayoutUpdate, LayoutError> {
        let src = self.pane(src_pane)?;
        self.pane(dst_pane)?;
        if src_index >= src.tabs.len() {
            return Err(LayoutError::TabIndexOutOfRange { pane: src_pane, index: src_index, len: src.tabs.len() });
        }
        if src_pane == dst_pane {
            return Ok(LayoutUpdate::new(self.clone()));
        }
        let mut up = LayoutUpdate::new(self.clone());
        let before = up.tree.active_path();

        let tab = up.tree.remove_tab_at(src_pane, src_index)?;
        let dst = up.tree.pane_mut(dst_pane)?;
        dst.tabs.push(tab);
        dst.active = Some(dst.tabs.len() - 1);

        up.tree.push_active_change(before, &mut up.events);
        Ok(up)
    }

    /// Atomically split `dst_pane` and move the tab into the fresh pane,
    /// which becomes the active pane with the moved tab active.
    pub fn move_tab_to_new_split(
        &self,
        src_pane: PaneId,
        src_index: usize,
        dst_pane: PaneId,
        direction: Orientation,
    ) -> Result<LayoutUpdate, LayoutError> {
        let src = self.pane(src_pane)?;
        self.pane(dst_pane)?;
        if src_index >= src.tabs.len() {
            return Err(LayoutError::TabIndexOutOfRange { pane: src_pane, index: src_index, len: src.tabs.len() });
        }
        let mut up = LayoutUpdate::new(self.clone());
        let before = up.tree.active_path();

        let new_pane = up.tree.split_pane_in_place(dst_pane, direction)?;
        let tab = up.tree.remove_tab_at(src_pane, src_index)?;
        let pane = up.tree.pane_mut(new_pane)?;
        pane.tabs.push(tab);
        pane.active = Some(0);
        up.tree.active_pane = new_pane;
        up.created_pane = Some(new_pane);

        up.tree.push_active_change(before, &mut up.events);
        Ok(up)
    }

    // ── Pane operations ─────────────────────────────────────────────────────

    /// Split `pane_id`, producing a fresh empty pane after it. The new pane
    /// becomes active. Initial sizes are 50/50.
    pub fn split_pane(
        &self,
        pane_id: PaneId,
        direction: Orientation,
    ) -> Result<LayoutUpdate, LayoutError> {
        self.pane(pane_id)?;
        let mut up = LayoutUpdate::new(self.clone());
        let before = up.tree.active_path();

        let new_pane = up.tree.split_pane_in_place(pane_id, direction)?;
        up.tree.active_pane = new_pane;
        up.created_pane = Some(new_pane);

        up.tree.push_active_change(before, &mut up.events);
        Ok(up)
    }

    /// Close a pane, closing all of its tabs. The remaining sibling is
    /// hoisted when its split is reduced to one child. Closing the only pane
    /// fails with [`LayoutError::LastPane`].
    pub fn close_pane(&self, pane_id: PaneId) -> Result<LayoutUpdate, LayoutError> {
        let node_id = *self.pane_index.get(&pane_id).ok_or(LayoutError::PaneNotFound(pane_id))?;
        if node_id == self.root {
            return Err(LayoutError::LastPane);
        }
        let mut up = LayoutUpdate::new(self.clone());
        let before = up.tree.active_path();

        // Close events for every tab the pane held.
        if let Ok(pane) = up.tree.pane(pane_id) {
            for tab in &pane.tabs {
                up.events.push(VaultEvent::FileClose { path: tab.path.clone() });
            }
        }

        up.tree.detach_pane(pane_id, node_id)?;

        if up.tree.active_pane == pane_id {
            // Deterministic fallback: first pane in pre-order.
            up.tree.active_pane = up.tree.panes()[0];
        }
        up.tree.push_active_change(before, &mut up.events);
        debug!(pane = %pane_id, "closed pane");
        Ok(up)
    }

    /// Set per-child sizes of a split. Sizes are normalized to sum 100 with
    /// each child clamped to `[5, 95]`.
    pub fn resize(&self, split_id: NodeId, sizes: &[f32]) -> Result<LayoutUpdate, LayoutError> {
        let split = self.split(split_id)?;
        if sizes.len() != split.children.len() {
            return Err(LayoutError::SizeCountMismatch { expected: split.children.len(), got: sizes.len() });
        }
        let mut up = LayoutUpdate::new(self.clone());
        if let Some(LayoutNode::Split(s)) = up.tree.nodes.get_mut(&split_id) {
            s.sizes = normalize_sizes(sizes);
        }
        Ok(up)
    }

    // ── Selector operations ─────────────────────────────────────────────────

    /// Make `pane_id` the active pane. Pure selector update; emits no events.
    pub fn set_active_pane(&self, pane_id: PaneId) -> Result<LayoutUpdate, LayoutError> {
        self.pane(pane_id)?;
        let mut up = LayoutUpdate::new(self.clone());
        up.tree.active_pane = pane_id;
        Ok(up)
    }

    /// Make tab `index` active in `pane_id`. Emits `ActiveFileChange` only
    /// when the newly active tab differs from the previously active tab of
    /// the active pane.
    pub fn set_active_tab(&self, pane_id: PaneId, index: usize) -> Result<LayoutUpdate, LayoutError> {
        let pane = self.pane(pane_id)?;
        if index >= pane.tabs.len() {
            return Err(LayoutError::TabIndexOutOfRange { pane: pane_id, index, len: pane.tabs.len() });
        }
        let mut up = LayoutUpdate::new(self.clone());
        let before = up.tree.active_path();
        {
            let pane = up.tree.pane_mut(pane_id)?;
            pane.active = Some(index);
        }
        up.tree.active_pane = pane_id;
        up.tree.push_active_change(before, &mut up.events);
        Ok(up)
    }

    /// Set a tab's dirty flag, producing a new snapshot.
    pub fn set_tab_dirty(&self, tab: TabId, dirty: bool) -> Result<LayoutUpdate, LayoutError> {
        let (pane_id, index) = self
            .find_tab(tab)
            .ok_or(LayoutError::TabIndexOutOfRange { pane: self.active_pane, index: 0, len: 0 })?;
        let mut up = LayoutUpdate::new(self.clone());
        up.tree.pane_mut(pane_id)?.tabs[index].dirty = dirty;
        Ok(up)
    }

    // ── File-system reactions ───────────────────────────────────────────────

    /// Close every tab referencing `path`, across all panes. Invoked when the
    /// file-system adapter deletes a file.
    pub fn close_tabs_by_path(&self, path: &str) -> Result<LayoutUpdate, LayoutError> {
        let mut up = LayoutUpdate::new(self.clone());
        let before = up.tree.active_path();

        for pane_id in up.tree.panes() {
            loop {
                let Some(index) = up
                    .tree
                    .pane(pane_id)?
                    .tabs
                    .iter()
                    .position(|t| t.path == path)
                else {
                    break;
                };
                let removed = up.tree.remove_tab_at(pane_id, index)?;
                up.events.push(VaultEvent::FileClose { path: removed.path });
            }
        }
        up.tree.push_active_change(before, &mut up.events);
        Ok(up)
    }

    /// Rewrite the path of every tab referencing `old`. Dirty flags and tab
    /// ids (hence content-cache entries) are untouched.
    pub fn update_tabs_path(&self, old: &str, new: &str) -> Result<LayoutUpdate, LayoutError> {
        let mut up = LayoutUpdate::new(self.clone());
        for node in up.tree.nodes.values_mut() {
            if let LayoutNode::Pane(pane) = node {
                for tab in &mut pane.tabs {
                    if tab.path == old {
                        tab.path = new.to_string();
                    }
                }
            }
        }
        Ok(up)
    }

    // ── Batch operations ────────────────────────────────────────────────────

    /// Close every tab in every pane. Returns the dirty tabs that were lost
    /// so the caller can prompt before committing the new snapshot.
    pub fn close_all_tabs(&self) -> (LayoutUpdate, Vec<Tab>) {
        let dirty = self.get_unsaved_tabs();
        let mut up = LayoutUpdate::new(self.clone());
        let before = up.tree.active_path();
        for node in up.tree.nodes.values_mut() {
            if let LayoutNode::Pane(pane) = node {
                for tab in pane.tabs.drain(..) {
                    up.events.push(VaultEvent::FileClose { path: tab.path });
                }
                pane.active = None;
            }
        }
        up.tree.push_active_change(before, &mut up.events);
        (up, dirty)
    }

    /// Close every clean tab, keeping dirty ones (nothing can be lost).
    pub fn close_saved_tabs(&self) -> LayoutUpdate {
        let mut up = LayoutUpdate::new(self.clone());
        let before = up.tree.active_path();
        for node in up.tree.nodes.values_mut() {
            if let LayoutNode::Pane(pane) = node {
                let active_id = pane.active.map(|i| pane.tabs[i].id);
                let mut kept = Vec::new();
                for tab in pane.tabs.drain(..) {
                    if tab.dirty {
                        kept.push(tab);
                    } else {
                        up.events.push(VaultEvent::FileClose { path: tab.path });
                    }
                }
                pane.tabs = kept;
                pane.active = active_id
                    .and_then(|id| pane.tabs.iter().position(|t| t.id == id))
                    .or(if pane.tabs.is_empty() { None } else { Some(0) });
            }
        }
        up.tree.push_active_change(before, &mut up.events);
        up
    }

    /// Close every tab in `pane_id` except the one at `keep`. Returns the
    /// dirty tabs that were lost.
    pub fn close_other_tabs(
        &self,
        pane_id: PaneId,
        keep: usize,
    ) -> Result<(LayoutUpdate, Vec<Tab>), LayoutError> {
        let pane = self.pane(pane_id)?;
        if keep >= pane.tabs.len() {
            return Err(LayoutError::TabIndexOutOfRange { pane: pane_id, index: keep, len: pane.tabs.len() });
        }
        let dirty: Vec<Tab> = pane
            .tabs
            .iter()
            .enumerate()
            .filter(|(i, t)| *i != keep && t.dirty)
            .map(|(_, t)| t.clone())
            .collect();

        let mut up = LayoutUpdate::new(self.clone());
        let before = up.tree.active_path();
        {
            let pane = up.tree.pane_mut(pane_id)?;
            let keeper = pane.tabs[keep].clone();
            for (i, tab) in pane.tabs.drain(..).enumerate() {
                if i != keep {
                    up.events.push(VaultEvent::FileClose { path: tab.path });
                }
            }
            pane.tabs = vec![keeper];
            pane.active = Some(0);
        }
        up.tree.push_active_change(before, &mut up.events);
        Ok((up, dirty))
    }

    // ── Internal helpers ────────────────────────────────────────────────────

    fn pane_mut(&mut self, id: PaneId) -> Result<&mut Pane, LayoutError> {
        let node = *self.pane_index.get(&id).ok_or(LayoutError::PaneNotFound(id))?;
        match self.nodes.get_mut(&node) {
            Some(LayoutNode::Pane(p)) => Ok(p),
            _ => Err(LayoutError::PaneNotFound(id)),
        }
    }

    /// Remove the tab at `index`, fixing up the pane's active index:
    /// closing the active tab activates `min(index, len - 1)`; closing an
    /// earlier tab shifts the index left.
    fn remove_tab_at(&mut self, pane_id: PaneId, index: usize) -> Result<Tab, LayoutError> {
        let pane = self.pane_mut(pane_id)?;
        if index >= pane.tabs.len() {
            return Err(LayoutError::TabIndexOutOfRange { pane: pane_id, index, len: pane.tabs.len() });
        }
        let removed = pane.tabs.remove(index);
        pane.active = match pane.active {
            Some(_) if pane.tabs.is_empty() => None,
            Some(a) if a == index => Some(index.min(pane.tabs.len() - 1)),
            Some(a) if a > index => Some(a - 1),
            other => other,
        };
        Ok(removed)
    }

    /// Replace the pane's node with a split holding the pane and a fresh
    /// empty pane. Returns the new pane's id.
    fn split_pane_in_place(
        &mut self,
        pane_id: PaneId,
        direction: Orientation,
    ) -> Result<PaneId, LayoutError> {
        let pane_node = *self.pane_index.get(&pane_id).ok_or(LayoutError::PaneNotFound(pane_id))?;

        let new_pane = Pane::new();
        let new_pane_id = new_pane.id;
        let new_pane_node = NodeId::new();
        self.nodes.insert(new_pane_node, LayoutNode::Pane(new_pane));
        self.pane_index.insert(new_pane_id, new_pane_node);

        let split_node = NodeId::new();
        let split = Split {
            orientation: direction,
            children: vec![pane_node, new_pane_node],
            sizes: vec![50.0, 50.0],
        };

        // Splice the split into the old pane's position.
        if let Some(parent) = self.parent.get(&pane_node).copied() {
            if let Some(LayoutNode::Split(p)) = self.nodes.get_mut(&parent) {
                for child in &mut p.children {
                    if *child == pane_node {
                        *child = split_node;
                    }
                }
            }
            self.parent.insert(split_node, parent);
        } else {
            self.root = split_node;
        }
        self.nodes.insert(split_node, LayoutNode::Split(split));
        self.parent.insert(pane_node, split_node);
        self.parent.insert(new_pane_node, split_node);
        Ok(new_pane_id)
    }

    /// Remove a pane node from its parent split, hoisting a lone surviving
    /// child in place of the split.
    fn detach_pane(&mut self, pane_id: PaneId, node_id: NodeId) -> Result<(), LayoutError> {
        let parent_id = self.parent.get(&node_id).copied().ok_or(LayoutError::LastPane)?;

        self.nodes.remove(&node_id);
        self.parent.remove(&node_id);
        self.pane_index.remove(&pane_id);

        let survivors = {
            let Some(LayoutNode::Split(split)) = self.nodes.get_mut(&parent_id) else {
                return Err(LayoutError::SplitNotFound(parent_id));
            };
            let pos = split.children.iter().position(|c| *c == node_id);
            if let Some(pos) = pos {
                split.children.remove(pos);
                split.sizes.remove(pos);
                if split.children.len() >= 2 {
                    split.sizes = normalize_sizes(&split.sizes);
                }
            }
            split.children.clone()
        };

        if survivors.len() == 1 {
            self.hoist(parent_id, survivors[0]);
        }
        Ok(())
    }

    /// Replace the split `split_id` with its only remaining child.
    fn hoist(&mut self, split_id: NodeId, child: NodeId) {
        if let Some(grandparent) = self.parent.get(&split_id).copied() {
            if let Some(LayoutNode::Split(g)) = self.nodes.get_mut(&grandparent) {
                for c in &mut g.children {
                    if *c == split_id {
                        *c = child;
                    }
                }
            }
            self.parent.insert(child, grandparent);
        } else {
            self.root = child;
            self.parent.remove(&child);
        }
        self.nodes.remove(&split_id);
        self.parent.remove(&split_id);
    }

    /// Append an `ActiveFileChange` event when the active-file identity
    /// moved relative to `before`.
    fn push_active_change(&self, before: Option<String>, events: &mut Vec<VaultEvent>) {
        let after = self.active_path();
        if before != after {
            events.push(VaultEvent::ActiveFileChange { path: after });
        }
    }

    /// Validate every structural invariant. Test-only helper.
    #[cfg(test)]
    pub(crate) fn debug_validate(&self) {
        use std::collections::HashSet;
        let mut seen_panes = HashSet::new();
        let mut stack = vec![self.root];
        let mut reachable = HashSet::new();
        while let Some(node) = stack.pop() {
            assert!(reachable.insert(node), "node {node:?} reachable twice");
            match self.nodes.get(&node).expect("dangling child id") {
                LayoutNode::Pane(p) => {
                    assert!(seen_panes.insert(p.id), "duplicate pane id {:?}", p.id);
                    assert_eq!(self.pane_index.get(&p.id), Some(&node));
                    match p.active {
                        None => assert!(p.tabs.is_empty()),
                        Some(a) => assert!(a < p.tabs.len()),
                    }
                }
                LayoutNode::Split(s) => {
                    assert!(s.children.len() >= 2, "split with < 2 children");
                    assert_eq!(s.children.len(), s.sizes.len());
                    let sum: f32 = s.sizes.iter().sum();
                    assert!((sum - 100.0).abs() < 0.5, "sizes sum to {sum}");
                    for child in &s.children {
                        assert_eq!(self.parent.get(child), Some(&node));
                        stack.push(*child);
                    }
                }
            }
        }
        assert_eq!(reachable.len(), self.nodes.len(), "unreachable nodes in arena");
        assert!(seen_panes.contains(&self.active_pane), "active pane missing");
    }
}

impl Default for LayoutTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize percentage shares: scale to sum 100, clamp each child to
/// `[MIN_CHILD_SIZE, MAX_CHILD_SIZE]`, and redistribute any residue over the
/// children still inside their bounds.
pub fn normalize_sizes(sizes: &[f32]) -> Vec<f32> {
    let n = sizes.len();
    if n == 0 {
        return Vec::new();
    }
    let mut out: Vec<f32> = sizes
        .iter()
        .map(|s| if s.is_finite() && *s > 0.0 { *s } else { 1.0 })
        .collect();
    let sum: f32 = out.iter().sum();
    for v in &mut out {
        *v = *v / sum * 100.0;
    }
    for _ in 0..n {
        for v in &mut out {
            *v = v.clamp(MIN_CHILD_SIZE, MAX_CHILD_SIZE);
        }
        let total: f32 = out.iter().sum();
        let residue = 100.0 - total;
        if residue.abs() < 0.01 {
            break;
        }
        let adjustable: Vec<usize> = (0..n)
            .filter(|&i| {
                if residue > 0.0 {
                    out[i] < MAX_CHILD_SIZE
                } else {
                    out[i] > MIN_CHILD_SIZE
                }
            })
            .collect();
        if adjustable.is_empty() {
            break;
        }
        let share = residue / adjustable.len() as f32;
        for i in adjustable {
            out[i] += share;
        }
    }
    out
}

// ============================================================================
// Tests
// ============================================================================
