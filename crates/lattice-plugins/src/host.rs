//! The plugin host: loads plugins into isolates, brokers capabilities,
//! serves the RPC bridge, and forwards vault events.
//!
//! Capability checks happen here, never in the plugin. The bridge is
//! served by a background task over shared host state, so a plugin blocked
//! on a reply never blocks the host and an `activate()` script may call
//! host APIs while the host awaits the activation acknowledgement.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use lattice_types::{Annotation, AnnotationSet, VaultEvent};
use lattice_workspace::{Content, FsAdapter};

use crate::audit::{AuditEvent, AuditLevel, AuditTrail};
use crate::error::PluginError;
use crate::manifest::{Permission, PluginManifest};
use crate::netgate::{NetworkDispatcher, StubDispatcher, check_allowlist, url_host};
use crate::registry::Registries;
use crate::rpc::{HostNotification, HostRequest, RpcRequest, RpcResponse};
use crate::sandbox::{BridgeRequest, BridgeSender, PluginSandbox};

/// Lifecycle state of a loaded plugin.
#[derive(Clone, Debug, PartialEq)]
pub enum PluginState {
    Loaded,
    Active,
    Failed(String),
}

struct PluginRecord {
    manifest: PluginManifest,
    sandbox: PluginSandbox,
    state: PluginState,
}

/// Per-plugin grants the bridge consults: permissions + network allowlist.
type Grants = HashMap<String, (HashSet<Permission>, Vec<String>)>;

/// Shared state the bridge-serving task dispatches against.
struct HostCore {
    fs: Arc<dyn FsAdapter>,
    audit: Arc<AuditTrail>,
    dispatcher: Arc<dyn NetworkDispatcher>,
    grants: RwLock<Grants>,
    /// Plugin-scoped key-value storage.
    storage: DashMap<(String, String), Value>,
    /// In-memory annotation sidecars keyed by file id.
    annotations: RwLock<HashMap<String, AnnotationSet>>,
    active_file: RwLock<Option<String>>,
}

impl HostCore {
    fn granted(&self, plugin: &str, permission: Permission) -> bool {
        self.grants
            .read()
            .get(plugin)
            .is_some_and(|(perms, _)| perms.contains(&permission))
    }

    fn allowlist(&self, plugin: &str) -> Vec<String> {
        self.grants
            .read()
            .get(plugin)
            .map(|(_, list)| list.clone())
            .unwrap_or_default()
    }

    /// Capability gate: audit the decision, produce the denial reply.
    fn gate(
        &self,
        plugin: &str,
        permission: Permission,
        action: &str,
        id: u64,
    ) -> Result<(), RpcResponse> {
        if self.granted(plugin, permission) {
            self.audit.record(
                plugin,
                AuditEvent::new(AuditLevel::Info, action, "granted", Value::Null),
            );
            Ok(())
        } else {
            self.audit.record(
                plugin,
                AuditEvent::new(
                    AuditLevel::Warn,
                    "permission-denied",
                    format!("{action} requires {permission}"),
                    json!({ "action": action }),
                ),
            );
            Err(RpcResponse::failure(id, format!("Permission denied: {permission}")))
        }
    }

    async fn dispatch(&self, plugin: &str, request: RpcRequest) -> RpcResponse {
        let id = request.id;
        match request.body {
            HostRequest::ListFiles => {
                if let Err(denied) = self.gate(plugin, Permission::FileRead, "workspace.listFiles", id) {
                    return denied;
                }
                match self.fs.list_files().await {
                    Ok(files) => RpcResponse::success(id, json!(files)),
                    Err(e) => RpcResponse::failure(id, e.to_string()),
                }
            }
            HostRequest::ReadFile { path } => {
                if let Err(denied) = self.gate(plugin, Permission::FileRead, "workspace.readFile", id) {
                    return denied;
                }
                match self.fs.read_file(&path).await {
                    Ok(Content::Text(text)) => RpcResponse::success(id, Value::String(text)),
                    Ok(Content::Bytes(_)) => RpcResponse::failure(id, "file is not text"),
                    Err(e) => RpcResponse::failure(id, e.to_string()),
                }
            }
            HostRequest::WriteFile { path, content } => {
                if let Err(denied) = self.gate(plugin, Permission::FileWrite, "workspace.writeFile", id) {
                    return denied;
                }
                match self.fs.write_file(&path, Content::Text(content)).await {
                    Ok(()) => RpcResponse::success(id, Value::Null),
                    Err(e) => RpcResponse::failure(id, e.to_string()),
                }
            }
            HostRequest::CreateFile { path, content } => {
                if let Err(denied) = self.gate(plugin, Permission::FileWrite, "workspace.createFile", id) {
                    return denied;
                }
                match self.fs.create_file(&path, Content::Text(content)).await {
                    Ok(()) => RpcResponse::success(id, Value::Null),
                    Err(e) => RpcResponse::failure(id, e.to_string()),
                }
            }
            HostRequest::DeleteFile { path } => {
                if let Err(denied) = self.gate(plugin, Permission::FileWrite, "workspace.deleteFile", id) {
                    return denied;
                }
                match self.fs.delete_file(&path).await {
                    Ok(()) => RpcResponse::success(id, Value::Null),
                    Err(e) => RpcResponse::failure(id, e.to_string()),
                }
            }
            HostRequest::RenameFile { path, new_path } => {
                if let Err(denied) = self.gate(plugin, Permission::FileWrite, "workspace.renameFile", id) {
                    return denied;
                }
                match self.fs.rename_file(&path, &new_path).await {
                    Ok(()) => RpcResponse::success(id, Value::Null),
                    Err(e) => RpcResponse::failure(id, e.to_string()),
                }
            }
            HostRequest::ActiveFile => {
                if let Err(denied) = self.gate(plugin, Permission::FileRead, "workspace.activeFile", id) {
                    return denied;
                }
                let path = self.active_file.read().clone();
                RpcResponse::success(id, path.map_or(Value::Null, Value::String))
            }
            HostRequest::AssetUrl { path } => {
                if let Err(denied) = self.gate(plugin, Permission::FileRead, "assets.getUrl", id) {
                    return denied;
                }
                RpcResponse::success(id, Value::String(format!("asset://{path}")))
            }
            HostRequest::AnnotationsList { file_id } => {
                if let Err(denied) = self.gate(plugin, Permission::FileRead, "annotations.list", id) {
                    return denied;
                }
                let annotations = self.annotations.read();
                let set = annotations.get(&file_id).cloned().unwrap_or_default();
                RpcResponse::success(id, serde_json::to_value(&set).unwrap_or(Value::Null))
            }
            HostRequest::AnnotationsAdd { file_id, content, target } => {
                if let Err(denied) = self.gate(plugin, Permission::FileWrite, "annotations.add", id) {
                    return denied;
                }
                let annotation = Annotation::new(target, content, plugin);
                let ann_id = annotation.id.clone();
                self.annotations
                    .write()
                    .entry(file_id)
                    .or_default()
                    .annotations
                    .push(annotation);
                RpcResponse::success(id, Value::String(ann_id))
            }
            HostRequest::AnnotationsUpdate { file_id, annotation_id, content } => {
                if let Err(denied) = self.gate(plugin, Permission::FileWrite, "annotations.update", id) {
                    return denied;
                }
                let mut annotations = self.annotations.write();
                let found = annotations
                    .get_mut(&file_id)
                    .and_then(|set| set.annotations.iter_mut().find(|a| a.id == annotation_id));
                match found {
                    Some(annotation) => {
                        annotation.content = content;
                        RpcResponse::success(id, Value::Null)
                    }
                    None => RpcResponse::failure(id, format!("annotation not found: {annotation_id}")),
                }
            }
            HostRequest::AnnotationsRemove { file_id, annotation_id } => {
                if let Err(denied) = self.gate(plugin, Permission::FileWrite, "annotations.remove", id) {
                    return denied;
                }
                let mut annotations = self.annotations.write();
                let removed = annotations
                    .get_mut(&file_id)
                    .map(|set| {
                        let before = set.annotations.len();
                        set.annotations.retain(|a| a.id != annotation_id);
                        before != set.annotations.len()
                    })
                    .unwrap_or(false);
                if removed {
                    RpcResponse::success(id, Value::Null)
                } else {
                    RpcResponse::failure(id, format!("annotation not found: {annotation_id}"))
                }
            }
            HostRequest::StorageGet { key } => {
                let value = self
                    .storage
                    .get(&(plugin.to_string(), key))
                    .map(|v| v.clone())
                    .unwrap_or(Value::Null);
                RpcResponse::success(id, value)
            }
            HostRequest::StorageSet { key, value } => {
                self.storage.insert((plugin.to_string(), key), value);
                RpcResponse::success(id, Value::Null)
            }
            HostRequest::StorageRemove { key } => {
                self.storage.remove(&(plugin.to_string(), key));
                RpcResponse::success(id, Value::Null)
            }
            HostRequest::Fetch { url } => self.dispatch_fetch(plugin, id, &url).await,
            HostRequest::Log { message } => {
                self.audit.record(
                    plugin,
                    AuditEvent::new(AuditLevel::Info, "plugin-log", message, Value::Null),
                );
                RpcResponse::success(id, Value::Null)
            }
        }
    }

    /// The network gate: permission, scheme/host validity, allowlist,
    /// audit on every decision.
    async fn dispatch_fetch(&self, plugin: &str, id: u64, url: &str) -> RpcResponse {
        if !self.granted(plugin, Permission::Network) {
            self.audit.record(
                plugin,
                AuditEvent::new(
                    AuditLevel::Warn,
                    "network-blocked",
                    "network permission denied",
                    json!({ "url": url }),
                ),
            );
            return RpcResponse::failure(id, "Network permission denied");
        }
        let host = match url_host(url) {
            Ok(host) => host,
            Err(e) => {
                self.audit.record(
                    plugin,
                    AuditEvent::new(
                        AuditLevel::Warn,
                        "network-blocked",
                        "invalid url",
                        json!({ "url": url }),
                    ),
                );
                return RpcResponse::failure(id, e.to_string());
            }
        };
        let allowlist = self.allowlist(plugin);
        if let Err(e) = check_allowlist(url, &allowlist) {
            self.audit.record(
                plugin,
                AuditEvent::new(
                    AuditLevel::Warn,
                    "network-blocked",
                    format!("host '{host}' not in allowlist"),
                    json!({ "url": url, "host": host }),
                ),
            );
            return RpcResponse::failure(id, e.to_string());
        }
        self.audit.record(
            plugin,
            AuditEvent::new(
                AuditLevel::Info,
                "network-request",
                format!("GET {host}"),
                json!({ "url": url, "host": host }),
            ),
        );
        match self.dispatcher.fetch(url).await {
            Ok(body) => RpcResponse::success(id, Value::String(body)),
            Err(e) => RpcResponse::failure(id, e),
        }
    }
}

/// The plugin host.
pub struct PluginHost {
    core: Arc<HostCore>,
    registries: Arc<Registries>,
    plugins: HashMap<String, PluginRecord>,
    bridge_tx: mpsc::UnboundedSender<BridgeRequest>,
}

impl PluginHost {
    /// Create a host serving the bridge on a background task. Must be
    /// called from within a tokio runtime.
    pub fn new(fs: Arc<dyn FsAdapter>) -> Self {
        Self::with_dispatcher(fs, Arc::new(StubDispatcher))
    }

    pub fn with_dispatcher(fs: Arc<dyn FsAdapter>, dispatcher: Arc<dyn NetworkDispatcher>) -> Self {
        let core = Arc::new(HostCore {
            fs,
            audit: Arc::new(AuditTrail::new()),
            dispatcher,
            grants: RwLock::new(HashMap::new()),
            storage: DashMap::new(),
            annotations: RwLock::new(HashMap::new()),
            active_file: RwLock::new(None),
        });
        let (bridge_tx, mut bridge_rx) = mpsc::unbounded_channel::<BridgeRequest>();
        let serve_core = core.clone();
        tokio::spawn(async move {
            while let Some(req) = bridge_rx.recv().await {
                let response = serve_core.dispatch(&req.plugin, req.request).await;
                let _ = req.reply.send(response);
            }
        });
        Self {
            core,
            registries: Arc::new(Registries::new()),
            plugins: HashMap::new(),
            bridge_tx,
        }
    }

    pub fn audit(&self) -> &Arc<AuditTrail> {
        &self.core.audit
    }

    pub fn registries(&self) -> &Arc<Registries> {
        &self.registries
    }

    pub fn state(&self, plugin: &str) -> Option<PluginState> {
        self.plugins.get(plugin).map(|r| r.state.clone())
    }

    /// Track the workspace's active file for `workspace.activeFile`.
    pub fn set_active_file(&self, path: Option<String>) {
        *self.core.active_file.write() = path;
    }

    /// Load a plugin into a fresh isolate. A compile failure marks the
    /// record failed but never blocks the workbench.
    pub async fn load_plugin(
        &mut self,
        manifest: PluginManifest,
        code: &str,
    ) -> Result<(), PluginError> {
        let id = manifest.id.clone();
        if self.plugins.contains_key(&id) {
            return Err(PluginError::DuplicatePlugin(id));
        }
        let sandbox = PluginSandbox::spawn(&id, BridgeSender::new(&id, self.bridge_tx.clone()));
        let load = sandbox
            .request(HostNotification::Load { code: code.to_string() })
            .await;
        let state = match &load {
            Ok(_) => PluginState::Loaded,
            Err(e) => PluginState::Failed(e.clone()),
        };
        info!(plugin = %id, ?state, "plugin loaded");
        self.plugins.insert(id.clone(), PluginRecord { manifest, sandbox, state });
        load.map(|_| ()).map_err(PluginError::LoadFailed)
    }

    /// Activation order: topological sort over declared dependencies.
    /// Cycles are a typed error; missing dependencies too.
    pub fn activation_order(&self) -> Result<Vec<String>, PluginError> {
        let mut indegree: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (id, record) in &self.plugins {
            indegree.entry(id).or_insert(0);
            for dep in &record.manifest.dependencies {
                if !self.plugins.contains_key(dep) {
                    return Err(PluginError::MissingDependency {
                        plugin: id.clone(),
                        dependency: dep.clone(),
                    });
                }
                *indegree.entry(id).or_insert(0) += 1;
                dependents.entry(dep).or_default().push(id);
            }
        }
        // Kept sorted descending so pop() always takes the smallest id.
        let mut queue: Vec<&str> = indegree
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(id, _)| *id)
            .collect();
        queue.reverse();
        let mut order = Vec::new();
        while let Some(id) = queue.pop() {
            order.push(id.to_string());
            for dependent in dependents.get(id).cloned().unwrap_or_default() {
                let n = indegree.entry(dependent).or_insert(1);
                *n -= 1;
                if *n == 0 {
                    queue.push(dependent);
                }
            }
            queue.sort();
            queue.reverse(); // pop smallest id first for determinism
        }
        if order.len() < self.plugins.len() {
            let mut cyclic: Vec<String> = indegree
                .iter()
                .filter(|(_, n)| **n > 0)
                .map(|(id, _)| id.to_string())
                .collect();
            cyclic.sort();
            return Err(PluginError::DependencyCycle(cyclic));
        }
        Ok(order)
    }

    /// Activate one plugin: grant capabilities, install registrations,
    /// run the script's `activate()`. A failure rolls everything back.
    pub async fn activate(&mut self, plugin: &str) -> Result<(), PluginError> {
        let record = self
            .plugins
            .get(plugin)
            .ok_or_else(|| PluginError::PluginNotFound(plugin.to_string()))?;
        if let PluginState::Failed(msg) = &record.state {
            return Err(PluginError::LoadFailed(msg.clone()));
        }
        let manifest = record.manifest.clone();

        // Grants and registrations first, so `activate()` can use them.
        self.core.grants.write().insert(
            plugin.to_string(),
            (
                manifest.permissions.iter().copied().collect(),
                manifest.network_allowlist.clone(),
            ),
        );
        self.registries.install(plugin, &manifest.commands, &manifest.panels);

        let result = record
            .sandbox
            .request(HostNotification::Activate {
                permissions: manifest.permissions.iter().map(|p| p.to_string()).collect(),
                network_allowlist: manifest.network_allowlist.clone(),
            })
            .await;

        match result {
            Ok(_) => {
                if let Some(record) = self.plugins.get_mut(plugin) {
                    record.state = PluginState::Active;
                }
                debug!(%plugin, "plugin active");
                Ok(())
            }
            Err(e) => {
                // Roll back: registrations, grants, state.
                self.registries.remove_plugin(plugin);
                self.core.grants.write().remove(plugin);
                if let Some(record) = self.plugins.get_mut(plugin) {
                    record.state = PluginState::Failed(e.clone());
                }
                warn!(%plugin, error = %e, "plugin activation failed, rolled back");
                Err(PluginError::ActivateFailed(e))
            }
        }
    }

    /// Activate every loaded plugin in dependency order. One plugin's
    /// failure never blocks the others.
    pub async fn activate_all(&mut self) -> Result<Vec<(String, Result<(), PluginError>)>, PluginError> {
        let order = self.activation_order()?;
        let mut results = Vec::with_capacity(order.len());
        for id in order {
            let result = self.activate(&id).await;
            results.push((id, result));
        }
        Ok(results)
    }

    /// Deactivate: notify the isolate, invalidate registrations and grants.
    pub fn deactivate(&mut self, plugin: &str) -> Result<(), PluginError> {
        let record = self
            .plugins
            .get_mut(plugin)
            .ok_or_else(|| PluginError::PluginNotFound(plugin.to_string()))?;
        record.sandbox.notify(HostNotification::Deactivate);
        record.state = PluginState::Loaded;
        self.registries.remove_plugin(plugin);
        self.core.grants.write().remove(plugin);
        Ok(())
    }

    /// Unload entirely: deactivate, stop the isolate, drop the audit tail.
    pub fn unload(&mut self, plugin: &str) -> Result<(), PluginError> {
        self.deactivate(plugin)?;
        if let Some(mut record) = self.plugins.remove(plugin) {
            record.sandbox.shutdown();
        }
        self.core.audit.forget(plugin);
        Ok(())
    }

    /// Invoke a declared command (host-UI-driven).
    pub async fn run_command(
        &self,
        plugin: &str,
        command: &str,
        payload: Value,
    ) -> Result<Value, PluginError> {
        let record = self
            .plugins
            .get(plugin)
            .ok_or_else(|| PluginError::PluginNotFound(plugin.to_string()))?;
        if self.registries.command(plugin, command).is_none() {
            return Err(PluginError::CommandNotFound {
                plugin: plugin.to_string(),
                command: command.to_string(),
            });
        }
        record
            .sandbox
            .request(HostNotification::RunCommand { id: command.to_string(), payload })
            .await
            .map_err(PluginError::SandboxDead)
    }

    /// Replace a plugin's permissions and allowlist at runtime.
    pub fn update_network(
        &mut self,
        plugin: &str,
        permissions: Vec<Permission>,
        allowlist: Vec<String>,
    ) -> Result<(), PluginError> {
        let record = self
            .plugins
            .get_mut(plugin)
            .ok_or_else(|| PluginError::PluginNotFound(plugin.to_string()))?;
        record.manifest.permissions = permissions.clone();
        record.manifest.network_allowlist = allowlist.clone();
        self.core.grants.write().insert(
            plugin.to_string(),
            (permissions.into_iter().collect(), allowlist.clone()),
        );
        record
            .sandbox
            .notify(HostNotification::UpdateNetworkAllowlist { network_allowlist: allowlist });
        Ok(())
    }

    /// Forward a vault event to every active plugin, in host order.
    pub fn broadcast_event(&self, event: &VaultEvent) {
        if let VaultEvent::ActiveFileChange { path } = event {
            *self.core.active_file.write() = path.clone();
        }
        let (path, new_path) = match event {
            VaultEvent::FileRename { old, new } => (Some(old.clone()), Some(new.clone())),
            other => (other.path().map(str::to_string), None),
        };
        for record in self.plugins.values() {
            if record.state == PluginState::Active {
                record.sandbox.notify(HostNotification::Event {
                    event: event.wire_name().to_string(),
                    path: path.clone(),
                    new_path: new_path.clone(),
                });
            }
        }
    }

    /// Direct bridge dispatch for tests and host-internal calls.
    pub async fn dispatch(&self, plugin: &str, request: RpcRequest) -> RpcResponse {
        self.core.dispatch(plugin, request).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLevel;
    use lattice_workspace::MemoryFs;

    fn manifest(id: &str) -> PluginManifest {
        PluginManifest::new(id, "1.0.0")
    }

    fn host() -> PluginHost {
        let fs = Arc::new(MemoryFs::new());
        fs.seed("notes/a.md", "# alpha");
        PluginHost::new(fs)
    }

    async fn loaded_host(m: PluginManifest, code: &str) -> PluginHost {
        let mut host = host();
        host.load_plugin(m, code).await.unwrap();
        host
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_network_gate_denies_then_allows() {
        // Manifest with no permissions and empty allowlist.
        let mut host = loaded_host(manifest("p1"), "fn activate() {}").await;
        host.activate("p1").await.unwrap();

        let resp = host
            .dispatch(
                "p1",
                RpcRequest { id: 1, body: HostRequest::Fetch { url: "https://api.example.com".into() } },
            )
            .await;
        assert!(!resp.ok);
        assert_eq!(resp.error.as_deref(), Some("Network permission denied"));
        let tail = host.audit().tail("p1", 10);
        let blocked = tail.iter().find(|e| e.action == "network-blocked").unwrap();
        assert_eq!(blocked.level, AuditLevel::Warn);
        assert_eq!(blocked.data["url"], "https://api.example.com");

        // Grant network + allowlist the host: the same call succeeds.
        host.update_network(
            "p1",
            vec![Permission::Network],
            vec!["api.example.com".into()],
        )
        .unwrap();
        let resp = host
            .dispatch(
                "p1",
                RpcRequest { id: 2, body: HostRequest::Fetch { url: "https://api.example.com".into() } },
            )
            .await;
        assert!(resp.ok);
        let tail = host.audit().tail("p1", 10);
        let request = tail.iter().find(|e| e.action == "network-request").unwrap();
        assert_eq!(request.level, AuditLevel::Info);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fetch_blocked_by_allowlist() {
        let mut m = manifest("p1");
        m.permissions = vec![Permission::Network];
        m.network_allowlist = vec!["api.example.com".into()];
        let mut host = loaded_host(m, "fn activate() {}").await;
        host.activate("p1").await.unwrap();

        let resp = host
            .dispatch(
                "p1",
                RpcRequest { id: 1, body: HostRequest::Fetch { url: "https://evil.com/x".into() } },
            )
            .await;
        assert!(!resp.ok);
        assert!(resp.error.unwrap().contains("evil.com"));
        let tail = host.audit().tail("p1", 10);
        assert!(tail.iter().any(|e| e.action == "network-blocked"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_file_read_capability_gate() {
        let mut host = loaded_host(manifest("p1"), "fn activate() {}").await;
        host.activate("p1").await.unwrap();

        // No file:read permission → denied, audited.
        let resp = host
            .dispatch(
                "p1",
                RpcRequest { id: 1, body: HostRequest::ReadFile { path: "notes/a.md".into() } },
            )
            .await;
        assert!(!resp.ok);
        assert!(host
            .audit()
            .tail("p1", 10)
            .iter()
            .any(|e| e.action == "permission-denied"));

        host.update_network("p1", vec![Permission::FileRead], vec![]).unwrap();
        let resp = host
            .dispatch(
                "p1",
                RpcRequest { id: 2, body: HostRequest::ReadFile { path: "notes/a.md".into() } },
            )
            .await;
        assert!(resp.ok);
        assert_eq!(resp.result, Value::String("# alpha".into()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_plugin_script_reads_file_through_bridge() {
        let mut m = manifest("p1");
        m.permissions = vec![Permission::FileRead];
        m.commands = vec![crate::manifest::CommandDecl {
            id: "read".into(),
            title: "Read".into(),
            shortcut: None,
        }];
        let mut host = loaded_host(
            m,
            r#"
                fn activate() { register_command("read", "do_read"); }
                fn do_read(payload) { read_file("notes/a.md") }
            "#,
        )
        .await;
        host.activate("p1").await.unwrap();

        let result = host.run_command("p1", "read", Value::Null).await.unwrap();
        assert_eq!(result, Value::String("# alpha".into()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_duplicate_plugin_rejected() {
        let mut host = loaded_host(manifest("p1"), "fn activate() {}").await;
        let err = host.load_plugin(manifest("p1"), "").await.unwrap_err();
        assert_eq!(err, PluginError::DuplicatePlugin("p1".into()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_activation_order_topological() {
        let mut host = host();
        let mut a = manifest("a");
        a.dependencies = vec!["b".into()];
        let mut b = manifest("b");
        b.dependencies = vec!["c".into()];
        let c = manifest("c");
        host.load_plugin(a, "fn activate() {}").await.unwrap();
        host.load_plugin(b, "fn activate() {}").await.unwrap();
        host.load_plugin(c, "fn activate() {}").await.unwrap();
        assert_eq!(host.activation_order().unwrap(), vec!["c", "b", "a"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dependency_cycle_rejected() {
        let mut host = host();
        let mut a = manifest("a");
        a.dependencies = vec!["b".into()];
        let mut b = manifest("b");
        b.dependencies = vec!["a".into()];
        host.load_plugin(a, "").await.unwrap();
        host.load_plugin(b, "").await.unwrap();
        assert!(matches!(
            host.activation_order(),
            Err(PluginError::DependencyCycle(ids)) if ids == vec!["a".to_string(), "b".to_string()]
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_dependency_rejected() {
        let mut host = host();
        let mut a = manifest("a");
        a.dependencies = vec!["ghost".into()];
        host.load_plugin(a, "").await.unwrap();
        assert!(matches!(
            host.activation_order(),
            Err(PluginError::MissingDependency { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_activate_failure_rolls_back_registrations() {
        let mut m = manifest("p1");
        m.commands = vec![crate::manifest::CommandDecl {
            id: "x".into(),
            title: "X".into(),
            shortcut: None,
        }];
        let mut host = loaded_host(m, r#"fn activate() { throw "nope"; }"#).await;
        let err = host.activate("p1").await.unwrap_err();
        assert!(matches!(err, PluginError::ActivateFailed(_)));
        // Registrations rolled back, plugin marked failed.
        assert!(host.registries().command("p1", "x").is_none());
        assert!(matches!(host.state("p1"), Some(PluginState::Failed(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_load_error_does_not_block_others() {
        let mut host = host();
        let _ = host.load_plugin(manifest("broken"), "fn activate( {").await;
        host.load_plugin(manifest("fine"), "fn activate() {}").await.unwrap();
        let results = host.activate_all().await.unwrap();
        let fine = results.iter().find(|(id, _)| id == "fine").unwrap();
        assert!(fine.1.is_ok());
        let broken = results.iter().find(|(id, _)| id == "broken").unwrap();
        assert!(broken.1.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_deactivate_invalidates_registries_and_grants() {
        let mut m = manifest("p1");
        m.permissions = vec![Permission::FileRead];
        m.commands = vec![crate::manifest::CommandDecl {
            id: "x".into(),
            title: "X".into(),
            shortcut: None,
        }];
        let mut host = loaded_host(m, "fn activate() {}").await;
        host.activate("p1").await.unwrap();
        assert!(host.registries().command("p1", "x").is_some());

        host.deactivate("p1").unwrap();
        assert!(host.registries().command("p1", "x").is_none());
        let resp = host
            .dispatch(
                "p1",
                RpcRequest { id: 9, body: HostRequest::ReadFile { path: "notes/a.md".into() } },
            )
            .await;
        assert!(!resp.ok);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_vault_events_reach_plugin_in_order() {
        let mut m = manifest("p1");
        m.commands = vec![crate::manifest::CommandDecl {
            id: "trace".into(),
            title: "Trace".into(),
            shortcut: None,
        }];
        let mut host = loaded_host(
            m,
            r#"
                fn activate() { register_command("trace", "get_trace"); }
                fn on_event(name, path, new_path) {
                    let seen = storage_get("trace");
                    storage_set("trace", seen + name + ":" + path + ";");
                }
                fn get_trace(payload) { storage_get("trace") }
            "#,
        )
        .await;
        host.activate("p1").await.unwrap();

        host.broadcast_event(&VaultEvent::FileOpen { path: "a.md".into() });
        host.broadcast_event(&VaultEvent::FileSave { path: "a.md".into() });
        host.broadcast_event(&VaultEvent::FileDelete { path: "a.md".into() });

        let trace = host.run_command("p1", "trace", Value::Null).await.unwrap();
        assert_eq!(
            trace,
            Value::String("file-open:a.md;file-save:a.md;vault-delete:a.md;".into())
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_storage_is_plugin_scoped() {
        let mut host = host();
        host.load_plugin(manifest("p1"), "fn activate() {}").await.unwrap();
        host.load_plugin(manifest("p2"), "fn activate() {}").await.unwrap();

        let resp = host
            .dispatch(
                "p1",
                RpcRequest {
                    id: 1,
                    body: HostRequest::StorageSet { key: "k".into(), value: json!("v1") },
                },
            )
            .await;
        assert!(resp.ok);
        let resp = host
            .dispatch("p2", RpcRequest { id: 2, body: HostRequest::StorageGet { key: "k".into() } })
            .await;
        assert_eq!(resp.result, Value::Null);
        let resp = host
            .dispatch("p1", RpcRequest { id: 3, body: HostRequest::StorageGet { key: "k".into() } })
            .await;
        assert_eq!(resp.result, json!("v1"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_annotations_lifecycle() {
        let mut m = manifest("p1");
        m.permissions = vec![Permission::FileRead, Permission::FileWrite];
        let mut host = loaded_host(m, "fn activate() {}").await;
        host.activate("p1").await.unwrap();

        let resp = host
            .dispatch(
                "p1",
                RpcRequest {
                    id: 1,
                    body: HostRequest::AnnotationsAdd {
                        file_id: "paper.pdf".into(),
                        content: "key claim".into(),
                        target: json!({"page": 2}),
                    },
                },
            )
            .await;
        assert!(resp.ok);
        let ann_id = resp.result.as_str().unwrap().to_string();
        assert!(lattice_types::is_annotation_id(&ann_id));

        let resp = host
            .dispatch(
                "p1",
                RpcRequest { id: 2, body: HostRequest::AnnotationsList { file_id: "paper.pdf".into() } },
            )
            .await;
        assert_eq!(resp.result["annotations"][0]["id"], json!(ann_id.clone()));

        let resp = host
            .dispatch(
                "p1",
                RpcRequest {
                    id: 3,
                    body: HostRequest::AnnotationsRemove {
                        file_id: "paper.pdf".into(),
                        annotation_id: ann_id,
                    },
                },
            )
            .await;
        assert!(resp.ok);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_active_file_follows_events() {
        let mut m = manifest("p1");
        m.permissions = vec![Permission::FileRead];
        let mut host = loaded_host(m, "fn activate() {}").await;
        host.activate("p1").await.unwrap();

        host.broadcast_event(&VaultEvent::ActiveFileChange { path: Some("notes/a.md".into()) });
        let resp = host
            .dispatch("p1", RpcRequest { id: 1, body: HostRequest::ActiveFile })
            .await;
        assert_eq!(resp.result, Value::String("notes/a.md".into()));

        host.broadcast_event(&VaultEvent::ActiveFileChange { path: None });
        let resp = host
            .dispatch("p1", RpcRequest { id: 2, body: HostRequest::ActiveFile })
            .await;
        assert!(resp.result.is_null());
    }
}
