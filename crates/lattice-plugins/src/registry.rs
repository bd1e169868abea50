//! Process-wide command and panel registries, keyed by plugin id.
//!
//! Populated from the manifest when a plugin activates; invalidated as a
//! unit on deactivate or unload so a failed activation can roll back
//! without leaving stragglers.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::manifest::{CommandDecl, PanelDecl};

/// A registered command with its owner.
#[derive(Clone, Debug, PartialEq)]
pub struct CommandEntry {
    pub plugin: String,
    pub decl: CommandDecl,
}

/// A registered panel with its owner.
#[derive(Clone, Debug, PartialEq)]
pub struct PanelEntry {
    pub plugin: String,
    pub decl: PanelDecl,
}

/// The host's registries.
#[derive(Default)]
pub struct Registries {
    commands: RwLock<HashMap<String, Vec<CommandEntry>>>,
    panels: RwLock<HashMap<String, Vec<PanelEntry>>>,
}

impl Registries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a plugin's declared commands and panels.
    pub fn install(&self, plugin: &str, commands: &[CommandDecl], panels: &[PanelDecl]) {
        self.commands.write().insert(
            plugin.to_string(),
            commands
                .iter()
                .map(|decl| CommandEntry { plugin: plugin.to_string(), decl: decl.clone() })
                .collect(),
        );
        self.panels.write().insert(
            plugin.to_string(),
            panels
                .iter()
                .map(|decl| PanelEntry { plugin: plugin.to_string(), decl: decl.clone() })
                .collect(),
        );
    }

    /// Remove everything a plugin registered (deactivate, unload, rollback).
    pub fn remove_plugin(&self, plugin: &str) {
        self.commands.write().remove(plugin);
        self.panels.write().remove(plugin);
    }

    /// Find a command by plugin and command id.
    pub fn command(&self, plugin: &str, id: &str) -> Option<CommandEntry> {
        self.commands
            .read()
            .get(plugin)?
            .iter()
            .find(|entry| entry.decl.id == id)
            .cloned()
    }

    /// Every registered command, across plugins.
    pub fn all_commands(&self) -> Vec<CommandEntry> {
        let mut out: Vec<CommandEntry> =
            self.commands.read().values().flatten().cloned().collect();
        out.sort_by(|a, b| (&a.plugin, &a.decl.id).cmp(&(&b.plugin, &b.decl.id)));
        out
    }

    /// Every registered panel, across plugins.
    pub fn all_panels(&self) -> Vec<PanelEntry> {
        let mut out: Vec<PanelEntry> = self.panels.read().values().flatten().cloned().collect();
        out.sort_by(|a, b| (&a.plugin, &a.decl.id).cmp(&(&b.plugin, &b.decl.id)));
        out
    }
}

// ============================================================================
// Tests
// ============================================================================
