//! Plugin manifests and the capability model.
//!
//! A manifest declares what a plugin is and what it may do. Capabilities
//! are checked at the host end, never inside the plugin; an unknown
//! permission string is rejected when the manifest is parsed. Unknown
//! manifest fields are preserved but ignored.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::EnumString;

use crate::PluginError;

/// A capability a plugin may request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
pub enum Permission {
    #[serde(rename = "file:read")]
    #[strum(serialize = "file:read")]
    FileRead,
    #[serde(rename = "file:write")]
    #[strum(serialize = "file:write")]
    FileWrite,
    #[serde(rename = "ui:commands")]
    #[strum(serialize = "ui:commands")]
    UiCommands,
    #[serde(rename = "ui:panels")]
    #[strum(serialize = "ui:panels")]
    UiPanels,
    #[serde(rename = "ui:sidebar")]
    #[strum(serialize = "ui:sidebar")]
    UiSidebar,
    #[serde(rename = "ui:toolbar")]
    #[strum(serialize = "ui:toolbar")]
    UiToolbar,
    #[serde(rename = "ui:statusbar")]
    #[strum(serialize = "ui:statusbar")]
    UiStatusbar,
    #[serde(rename = "editor:extensions")]
    #[strum(serialize = "editor:extensions")]
    EditorExtensions,
    #[serde(rename = "themes")]
    #[strum(serialize = "themes")]
    Themes,
    #[serde(rename = "network")]
    #[strum(serialize = "network")]
    Network,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::FileRead => "file:read",
            Permission::FileWrite => "file:write",
            Permission::UiCommands => "ui:commands",
            Permission::UiPanels => "ui:panels",
            Permission::UiSidebar => "ui:sidebar",
            Permission::UiToolbar => "ui:toolbar",
            Permission::UiStatusbar => "ui:statusbar",
            Permission::EditorExtensions => "editor:extensions",
            Permission::Themes => "themes",
            Permission::Network => "network",
        }
    }

    /// Parse from string. Unknown permissions are rejected.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Schema of a data-driven panel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum PanelSchema {
    List,
    Table,
    Form,
    Markdown,
}

/// A command the plugin offers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandDecl {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortcut: Option<String>,
}

/// A panel the plugin offers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PanelDecl {
    pub id: String,
    pub title: String,
    pub schema: PanelSchema,
}

/// A plugin manifest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[serde(default)]
    pub network_allowlist: Vec<String>,
    /// Plugin ids that must activate before this one.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub commands: Vec<CommandDecl>,
    #[serde(default)]
    pub panels: Vec<PanelDecl>,
    /// Unknown fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PluginManifest {
    /// A minimal manifest (tests and builtin plugins).
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            permissions: Vec::new(),
            network_allowlist: Vec::new(),
            dependencies: Vec::new(),
            commands: Vec::new(),
            panels: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Whether the manifest grants a permission.
    pub fn grants(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}

/// Parse a manifest from JSON, rejecting unknown permissions.
pub fn parse_manifest(text: &str) -> Result<PluginManifest, PluginError> {
    let manifest: PluginManifest =
        serde_json::from_str(text).map_err(|e| PluginError::MalformedManifest(e.to_string()))?;
    if manifest.id.is_empty() {
        return Err(PluginError::MalformedManifest("empty plugin id".into()));
    }
    Ok(manifest)
}

// ============================================================================
// Tests
// ============================================================================
