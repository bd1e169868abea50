//! The RPC bridge types: plugin → host requests and host → plugin
//! notifications, correlated by id.
//!
//! Wire values are JSON with a `{type, id}` header. Host replies carry
//! `{ok, result}` or `{ok: false, error}`. The plugin side blocks on its
//! reply; the host side never blocks.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Plugin → host request bodies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HostRequest {
    #[serde(rename = "workspace.listFiles")]
    ListFiles,
    #[serde(rename = "workspace.readFile")]
    ReadFile { path: String },
    #[serde(rename = "workspace.writeFile")]
    WriteFile { path: String, content: String },
    #[serde(rename = "workspace.createFile")]
    CreateFile { path: String, content: String },
    #[serde(rename = "workspace.deleteFile")]
    DeleteFile { path: String },
    #[serde(rename = "workspace.renameFile")]
    RenameFile {
        path: String,
        #[serde(rename = "newPath")]
        new_path: String,
    },
    #[serde(rename = "workspace.activeFile")]
    ActiveFile,
    #[serde(rename = "assets.getUrl")]
    AssetUrl { path: String },
    #[serde(rename = "annotations.list")]
    AnnotationsList { file_id: String },
    #[serde(rename = "annotations.add")]
    AnnotationsAdd { file_id: String, content: String, target: Value },
    #[serde(rename = "annotations.update")]
    AnnotationsUpdate { file_id: String, annotation_id: String, content: String },
    #[serde(rename = "annotations.remove")]
    AnnotationsRemove { file_id: String, annotation_id: String },
    #[serde(rename = "storage.get")]
    StorageGet { key: String },
    #[serde(rename = "storage.set")]
    StorageSet { key: String, value: Value },
    #[serde(rename = "storage.remove")]
    StorageRemove { key: String },
    #[serde(rename = "net.fetch")]
    Fetch { url: String },
    #[serde(rename = "host.log")]
    Log { message: String },
}

/// A correlated request envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: u64,
    #[serde(flatten)]
    pub body: HostRequest,
}

/// A correlated reply envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: u64,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RpcResponse {
    pub fn success(id: u64, result: Value) -> Self {
        Self { id, ok: true, result, error: None }
    }

    pub fn failure(id: u64, error: impl Into<String>) -> Self {
        Self { id, ok: false, result: Value::Null, error: Some(error.into()) }
    }
}

/// Host → plugin notifications.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostNotification {
    /// Deliver the plugin's main code to the isolate.
    Load { code: String },
    /// Grant the declared capabilities and start the plugin.
    Activate {
        permissions: Vec<String>,
        network_allowlist: Vec<String>,
    },
    /// Stop the plugin; registrations are rolled back host-side.
    Deactivate,
    /// Invoke a declared command.
    RunCommand { id: String, payload: Value },
    /// A vault lifecycle event the plugin subscribed to.
    Event {
        event: String,
        path: Option<String>,
        #[serde(rename = "newPath", default, skip_serializing_if = "Option::is_none")]
        new_path: Option<String>,
    },
    /// The allowlist changed at runtime.
    UpdateNetworkAllowlist { network_allowlist: Vec<String> },
}

// ============================================================================
// Tests
// ============================================================================
