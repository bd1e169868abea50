//! Plugin host errors.

use crate::manifest::Permission;

/// Errors from loading, activating, and serving plugins.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PluginError {
    #[error("plugin already loaded: {0}")]
    DuplicatePlugin(String),
    #[error("plugin not found: {0}")]
    PluginNotFound(String),
    #[error("malformed manifest: {0}")]
    MalformedManifest(String),
    #[error("cyclic plugin dependencies: {0:?}")]
    DependencyCycle(Vec<String>),
    #[error("plugin '{plugin}' depends on missing plugin '{dependency}'")]
    MissingDependency { plugin: String, dependency: String },
    #[error("plugin failed to load: {0}")]
    LoadFailed(String),
    #[error("plugin failed to activate: {0}")]
    ActivateFailed(String),
    #[error("command '{command}' not registered by plugin '{plugin}'")]
    CommandNotFound { plugin: String, command: String },
    #[error("permission denied: {permission}")]
    PermissionDenied { plugin: String, permission: Permission },
    #[error("host not allowed by network allowlist: {host}")]
    HostNotAllowed { host: String },
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("plugin sandbox is not responding: {0}")]
    SandboxDead(String),
}
