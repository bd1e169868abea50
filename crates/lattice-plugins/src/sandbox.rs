//! The plugin isolate: one OS thread per plugin running a locked-down rhai
//! engine.
//!
//! The isolate has no handle to the host's memory or file system. Every
//! host API visible to the script forwards a request over the bridge
//! channel and blocks on the reply inside the isolate thread; the host end
//! services requests asynchronously and never blocks. Notifications flow
//! the other way over a plain channel, in order.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rhai::{AST, Dynamic, Engine, EvalAltResult, Scope};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::rpc::{HostNotification, HostRequest, RpcRequest, RpcResponse};

/// How long the isolate waits on a host reply before giving up.
const BRIDGE_TIMEOUT: Duration = Duration::from_secs(10);
/// How long the host waits on an isolate acknowledgement.
const SANDBOX_TIMEOUT: Duration = Duration::from_secs(10);

/// A correlated request in flight from an isolate to the host.
pub struct BridgeRequest {
    pub plugin: String,
    pub request: RpcRequest,
    pub reply: std::sync::mpsc::Sender<RpcResponse>,
}

/// The isolate's endpoint of the bridge. Cloneable; used from inside
/// registered rhai functions, which run on the isolate thread and may
/// block.
#[derive(Clone)]
pub struct BridgeSender {
    plugin: String,
    tx: mpsc::UnboundedSender<BridgeRequest>,
    next_id: Arc<AtomicU64>,
}

impl BridgeSender {
    pub fn new(plugin: impl Into<String>, tx: mpsc::UnboundedSender<BridgeRequest>) -> Self {
        Self { plugin: plugin.into(), tx, next_id: Arc::new(AtomicU64::new(1)) }
    }

    /// Send a request and block for the correlated reply.
    pub fn call(&self, body: HostRequest) -> RpcResponse {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = std::sync::mpsc::channel();
        let sent = self.tx.send(BridgeRequest {
            plugin: self.plugin.clone(),
            request: RpcRequest { id, body },
            reply: reply_tx,
        });
        if sent.is_err() {
            return RpcResponse::failure(id, "host is gone");
        }
        match reply_rx.recv_timeout(BRIDGE_TIMEOUT) {
            Ok(response) => response,
            Err(_) => RpcResponse::failure(id, "host timeout"),
        }
    }
}

/// A notification plus an optional completion acknowledgement.
struct SandboxMsg {
    notification: HostNotification,
    done: Option<oneshot::Sender<Result<Value, String>>>,
}

/// Handle to a running plugin isolate.
pub struct PluginSandbox {
    tx: std::sync::mpsc::Sender<SandboxMsg>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl PluginSandbox {
    /// Spawn the isolate thread for `plugin`.
    pub fn spawn(plugin: impl Into<String>, bridge: BridgeSender) -> Self {
        let plugin = plugin.into();
        let (tx, rx) = std::sync::mpsc::channel();
        let thread = std::thread::spawn(move || run_isolate(&plugin, rx, bridge));
        Self { tx, thread: Some(thread) }
    }

    /// Send a notification and await the isolate's acknowledgement.
    pub async fn request(&self, notification: HostNotification) -> Result<Value, String> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(SandboxMsg { notification, done: Some(done_tx) })
            .map_err(|_| "sandbox thread is gone".to_string())?;
        match tokio::time::timeout(SANDBOX_TIMEOUT, done_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err("sandbox dropped the request".into()),
            Err(_) => Err("sandbox timeout".into()),
        }
    }

    /// Fire-and-forget notification (events, deactivate, allowlist update).
    pub fn notify(&self, notification: HostNotification) {
        let _ = self.tx.send(SandboxMsg { notification, done: None });
    }

    /// Stop the isolate and join its thread.
    pub fn shutdown(&mut self) {
        let _ = self.tx.send(SandboxMsg { notification: HostNotification::Deactivate, done: None });
        // Closing the channel ends the isolate loop.
        if let Some(thread) = self.thread.take() {
            drop(std::mem::replace(&mut self.tx, std::sync::mpsc::channel().0));
            let _ = thread.join();
        }
    }
}

impl Drop for PluginSandbox {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.shutdown();
        }
    }
}

// ── Isolate internals ───────────────────────────────────────────────────────

fn run_isolate(
    plugin: &str,
    rx: std::sync::mpsc::Receiver<SandboxMsg>,
    bridge: BridgeSender,
) {
    // Plugin-local command map: command id → rhai function name.
    let commands: Arc<Mutex<HashMap<String, String>>> = Arc::default();
    let engine = build_engine(&bridge, &commands);
    let mut ast: Option<AST> = None;
    let mut scope = Scope::new();

    while let Ok(SandboxMsg { notification, done }) = rx.recv() {
        match notification {
            HostNotification::Load { code } => {
                let result = match engine.compile(&code) {
                    Ok(compiled) => {
                        ast = Some(compiled);
                        Ok(Value::Null)
                    }
                    Err(e) => Err(format!("compile error: {e}")),
                };
                ack(done, result);
            }
            HostNotification::Activate { .. } => {
                let result = match &ast {
                    Some(ast) => call_optional(&engine, &mut scope, ast, "activate", ())
                        .map(|_| Value::Null),
                    None => Err("no code loaded".to_string()),
                };
                ack(done, result);
            }
            HostNotification::Deactivate => {
                if let Some(ast) = &ast {
                    let _ = call_optional(&engine, &mut scope, ast, "deactivate", ());
                }
                commands.lock().clear();
                ack(done, Ok(Value::Null));
            }
            HostNotification::RunCommand { id, payload } => {
                let runner = commands.lock().get(&id).cloned();
                let result = match (&ast, runner) {
                    (Some(ast), Some(fn_name)) => engine
                        .call_fn::<Dynamic>(&mut scope, ast, &fn_name, (payload.to_string(),))
                        .map(dynamic_to_value)
                        .map_err(|e| e.to_string()),
                    (None, _) => Err("no code loaded".to_string()),
                    (_, None) => Err(format!("no runner registered for command '{id}'")),
                };
                ack(done, result);
            }
            HostNotification::Event { event, path, new_path } => {
                if let Some(ast) = &ast {
                    let args = (event, path.unwrap_or_default(), new_path.unwrap_or_default());
                    if let Err(e) = call_optional(&engine, &mut scope, ast, "on_event", args) {
                        warn!(%plugin, error = %e, "plugin event handler failed");
                    }
                }
                ack(done, Ok(Value::Null));
            }
            HostNotification::UpdateNetworkAllowlist { .. } => {
                // Enforcement is host-side; the isolate needs no state.
                ack(done, Ok(Value::Null));
            }
        }
    }
    debug!(%plugin, "plugin isolate stopped");
}

fn ack(done: Option<oneshot::Sender<Result<Value, String>>>, result: Result<Value, String>) {
    if let Some(done) = done {
        let _ = done.send(result);
    }
}

fn dynamic_to_value(d: Dynamic) -> Value {
    if d.is_unit() {
        Value::Null
    } else if let Ok(b) = d.as_bool() {
        Value::Bool(b)
    } else if let Ok(i) = d.as_int() {
        Value::Number(i.into())
    } else {
        Value::String(d.to_string())
    }
}

/// Call a script function that may legitimately not exist.
fn call_optional(
    engine: &Engine,
    scope: &mut Scope,
    ast: &AST,
    name: &str,
    args: impl rhai::FuncArgs,
) -> Result<(), String> {
    match engine.call_fn::<Dynamic>(scope, ast, name, args) {
        Ok(_) => Ok(()),
        Err(e) => match *e {
            EvalAltResult::ErrorFunctionNotFound(_, _) => Ok(()),
            other => Err(other.to_string()),
        },
    }
}

/// A locked-down engine with the host API registered.
fn build_engine(bridge: &BridgeSender, commands: &Arc<Mutex<HashMap<String, String>>>) -> Engine {
    let mut engine = Engine::new();

    // Safety limits.
    engine.set_max_expr_depths(64, 64);
    engine.set_max_operations(1_000_000);
    engine.set_max_modules(10);
    engine.set_max_string_size(1_000_000);
    engine.set_max_array_size(10_000);
    engine.set_max_map_size(10_000);

    // Command registration stays inside the isolate.
    {
        let commands = commands.clone();
        engine.register_fn("register_command", move |id: &str, fn_name: &str| {
            commands.lock().insert(id.to_string(), fn_name.to_string());
        });
    }

    // Host APIs: each forwards over the bridge and blocks on the reply.
    let b = bridge.clone();
    engine.register_fn("list_files", move || -> Result<rhai::Array, Box<EvalAltResult>> {
        let resp = b.call(HostRequest::ListFiles);
        let files = unwrap_reply(resp)?;
        Ok(files
            .as_array()
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(|s| Dynamic::from(s.to_string()))
                    .collect()
            })
            .unwrap_or_default())
    });

    let b = bridge.clone();
    engine.register_fn("read_file", move |path: &str| -> Result<String, Box<EvalAltResult>> {
        let resp = b.call(HostRequest::ReadFile { path: path.to_string() });
        let result = unwrap_reply(resp)?;
        Ok(result.as_str().unwrap_or_default().to_string())
    });

    let b = bridge.clone();
    engine.register_fn(
        "write_file",
        move |path: &str, content: &str| -> Result<(), Box<EvalAltResult>> {
            let resp = b.call(HostRequest::WriteFile {
                path: path.to_string(),
                content: content.to_string(),
            });
            unwrap_reply(resp).map(|_| ())
        },
    );

    let b = bridge.clone();
    engine.register_fn("active_file", move || -> Result<String, Box<EvalAltResult>> {
        let resp = b.call(HostRequest::ActiveFile);
        let result = unwrap_reply(resp)?;
        Ok(result.as_str().unwrap_or_default().to_string())
    });

    let b = bridge.clone();
    engine.register_fn("fetch", move |url: &str| -> Result<String, Box<EvalAltResult>> {
        let resp = b.call(HostRequest::Fetch { url: url.to_string() });
        let result = unwrap_reply(resp)?;
        Ok(result.as_str().unwrap_or_default().to_string())
    });

    let b = bridge.clone();
    engine.register_fn("storage_get", move |key: &str| -> Result<String, Box<EvalAltResult>> {
        let resp = b.call(HostRequest::StorageGet { key: key.to_string() });
        let result = unwrap_reply(resp)?;
        Ok(result.as_str().unwrap_or_default().to_string())
    });

    let b = bridge.clone();
    engine.register_fn(
        "storage_set",
        move |key: &str, value: &str| -> Result<(), Box<EvalAltResult>> {
            let resp = b.call(HostRequest::StorageSet {
                key: key.to_string(),
                value: Value::String(value.to_string()),
            });
            unwrap_reply(resp).map(|_| ())
        },
    );

    let b = bridge.clone();
    engine.register_fn("log", move |message: &str| {
        let _ = b.call(HostRequest::Log { message: message.to_string() });
    });

    engine
}

/// Convert an RPC response into the script's result-or-throw.
fn unwrap_reply(resp: RpcResponse) -> Result<Value, Box<EvalAltResult>> {
    if resp.ok {
        Ok(resp.result)
    } else {
        Err(resp
            .error
            .unwrap_or_else(|| "host error".to_string())
            .into())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// A host double that answers every bridge request with a canned
    /// response and records what it saw.
    fn serve_bridge(
        mut rx: mpsc::UnboundedReceiver<BridgeRequest>,
        respond: impl Fn(&HostRequest) -> RpcResponse + Send + 'static,
    ) -> tokio::task::JoinHandle<Vec<HostRequest>> {
        tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(req) = rx.recv().await {
                let mut resp = respond(&req.request.body);
                resp.id = req.request.id;
                seen.push(req.request.body.clone());
                let _ = req.reply.send(resp);
            }
            seen
        })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_load_and_activate_calls_script() {
        let (tx, rx) = mpsc::unbounded_channel();
        let server = serve_bridge(rx, |_| RpcResponse::success(0, Value::Null));
        let sandbox = PluginSandbox::spawn("p1", BridgeSender::new("p1", tx.clone()));

        sandbox
            .request(HostNotification::Load {
                code: r#"fn activate() { log("hello from plugin"); }"#.into(),
            })
            .await
            .unwrap();
        sandbox
            .request(HostNotification::Activate {
                permissions: vec![],
                network_allowlist: vec![],
            })
            .await
            .unwrap();

        drop(sandbox);
        drop(tx);
        let seen = server.await.unwrap();
        assert!(seen
            .iter()
            .any(|r| matches!(r, HostRequest::Log { message } if message == "hello from plugin")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_compile_error_reported() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let sandbox = PluginSandbox::spawn("p1", BridgeSender::new("p1", tx));
        let err = sandbox
            .request(HostNotification::Load { code: "fn activate( {".into() })
            .await
            .unwrap_err();
        assert!(err.contains("compile error"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_activate_without_hook_is_ok() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let sandbox = PluginSandbox::spawn("p1", BridgeSender::new("p1", tx));
        sandbox
            .request(HostNotification::Load { code: "fn helper() { 1 }".into() })
            .await
            .unwrap();
        // No activate() in the script: still fine.
        sandbox
            .request(HostNotification::Activate { permissions: vec![], network_allowlist: vec![] })
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_registered_command_runs() {
        let (tx, rx) = mpsc::unbounded_channel();
        let _server = serve_bridge(rx, |_| RpcResponse::success(0, Value::Null));
        let sandbox = PluginSandbox::spawn("p1", BridgeSender::new("p1", tx));

        sandbox
            .request(HostNotification::Load {
                code: r#"
                    fn activate() { register_command("greet", "do_greet"); }
                    fn do_greet(payload) { "hi " + payload }
                "#
                .into(),
            })
            .await
            .unwrap();
        sandbox
            .request(HostNotification::Activate { permissions: vec![], network_allowlist: vec![] })
            .await
            .unwrap();

        let result = sandbox
            .request(HostNotification::RunCommand {
                id: "greet".into(),
                payload: Value::String("world".into()),
            })
            .await
            .unwrap();
        assert_eq!(result, Value::String("hi \"world\"".into()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_command_errors() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let sandbox = PluginSandbox::spawn("p1", BridgeSender::new("p1", tx));
        sandbox
            .request(HostNotification::Load { code: "fn activate() {}".into() })
            .await
            .unwrap();
        let err = sandbox
            .request(HostNotification::RunCommand { id: "ghost".into(), payload: Value::Null })
            .await
            .unwrap_err();
        assert!(err.contains("ghost"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_deactivate_clears_command_map() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let sandbox = PluginSandbox::spawn("p1", BridgeSender::new("p1", tx));
        sandbox
            .request(HostNotification::Load {
                code: r#"fn activate() { register_command("x", "run_x"); } fn run_x(p) { p }"#
                    .into(),
            })
            .await
            .unwrap();
        sandbox
            .request(HostNotification::Activate { permissions: vec![], network_allowlist: vec![] })
            .await
            .unwrap();
        sandbox.notify(HostNotification::Deactivate);
        let err = sandbox
            .request(HostNotification::RunCommand { id: "x".into(), payload: Value::Null })
            .await
            .unwrap_err();
        assert!(err.contains("no runner"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_host_api_read_file_roundtrip() {
        let (tx, rx) = mpsc::unbounded_channel();
        let _server = serve_bridge(rx, |req| match req {
            HostRequest::ReadFile { path } => {
                RpcResponse::success(0, Value::String(format!("contents of {path}")))
            }
            _ => RpcResponse::success(0, Value::Null),
        });
        let sandbox = PluginSandbox::spawn("p1", BridgeSender::new("p1", tx));
        sandbox
            .request(HostNotification::Load {
                code: r#"
                    fn activate() { register_command("read", "do_read"); }
                    fn do_read(payload) { read_file("notes/a.md") }
                "#
                .into(),
            })
            .await
            .unwrap();
        sandbox
            .request(HostNotification::Activate { permissions: vec![], network_allowlist: vec![] })
            .await
            .unwrap();
        let result = sandbox
            .request(HostNotification::RunCommand { id: "read".into(), payload: Value::Null })
            .await
            .unwrap();
        assert_eq!(result, Value::String("contents of notes/a.md".into()));
    }
}
