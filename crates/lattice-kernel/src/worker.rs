//! Compute workers: the subprocess-backed Python kernel and the scripted
//! in-memory worker used by tests.
//!
//! A worker is spawned per kernel lifetime and killed on restart. The
//! production worker runs `python3 -u` with an embedded bootstrap that
//! speaks the newline-delimited JSON protocol of [`crate::protocol`].

use std::collections::VecDeque;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use crate::protocol::{WorkerReply, WorkerRequest};
use crate::state::KernelError;

/// A running compute worker.
#[async_trait]
pub trait KernelWorker: Send {
    /// Submit a request.
    async fn send(&mut self, request: WorkerRequest) -> Result<(), KernelError>;

    /// Next reply; `None` means the worker died.
    async fn recv(&mut self) -> Option<WorkerReply>;

    /// Terminate the worker. Idempotent.
    async fn kill(&mut self);
}

/// Spawns workers; the orchestrator keeps one spawner so `restart()` can
/// mint a fresh worker.
#[async_trait]
pub trait WorkerSpawner: Send + Sync {
    async fn spawn(&self) -> Result<Box<dyn KernelWorker>, KernelError>;
}

// ── Subprocess worker ───────────────────────────────────────────────────────

/// Python bootstrap for the subprocess worker. Reads one JSON request per
/// stdin line, executes in a persistent namespace, and emits JSON replies.
const PYTHON_BOOTSTRAP: &str = r#"
import sys, json, io, traceback, subprocess, contextlib

ns = {}

def send(obj):
    sys.stdout.write(json.dumps(obj) + "\n")
    sys.stdout.flush()

send({"type": "ready"})

for line in sys.stdin:
    line = line.strip()
    if not line:
        continue
    req = json.loads(line)
    kind = req.get("type")
    if kind == "shutdown":
        break
    if kind == "interrupt":
        continue
    if kind == "install":
        pkg = req["package"]
        proc = subprocess.run(
            [sys.executable, "-m", "pip", "install", "--quiet", pkg],
            capture_output=True, text=True)
        ok = proc.returncode == 0
        send({"type": "installed", "package": pkg, "ok": ok,
              "message": None if ok else proc.stderr[-2000:]})
        continue
    if kind == "execute":
        cell = req["cell_id"]
        out, err = io.StringIO(), io.StringIO()
        try:
            with contextlib.redirect_stdout(out), contextlib.redirect_stderr(err):
                code = compile(req["source"], "<cell>", "exec")
                exec(code, ns)
            if out.getvalue():
                send({"type": "stdout", "cell_id": cell, "text": out.getvalue()})
            if err.getvalue():
                send({"type": "stderr", "cell_id": cell, "text": err.getvalue()})
            send({"type": "result", "cell_id": cell, "value": None})
        except BaseException as exc:
            if out.getvalue():
                send({"type": "stdout", "cell_id": cell, "text": out.getvalue()})
            if err.getvalue():
                send({"type": "stderr", "cell_id": cell, "text": err.getvalue()})
            send({"type": "error", "cell_id": cell,
                  "ename": type(exc).__name__, "evalue": str(exc),
                  "traceback": traceback.format_exc().splitlines()})
"#;

/// A worker backed by a `python3 -u` subprocess.
pub struct SubprocessWorker {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl SubprocessWorker {
    /// Spawn the subprocess and wait for nothing — the first reply on the
    /// stream is `Ready` once the interpreter is up.
    pub fn spawn(python: &str) -> Result<Self, KernelError> {
        let mut child = Command::new(python)
            .arg("-u")
            .arg("-c")
            .arg(PYTHON_BOOTSTRAP)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| KernelError::WorkerUnavailable(e.to_string()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| KernelError::WorkerUnavailable("no stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| KernelError::WorkerUnavailable("no stdout".into()))?;
        debug!(%python, "spawned kernel worker");
        Ok(Self { child, stdin, stdout })
    }
}

#[async_trait]
impl KernelWorker for SubprocessWorker {
    async fn send(&mut self, request: WorkerRequest) -> Result<(), KernelError> {
        let mut line = serde_json::to_string(&request)
            .map_err(|e| KernelError::MalformedReply(e.to_string()))?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| KernelError::WorkerUnavailable(e.to_string()))
    }

    async fn recv(&mut self) -> Option<WorkerReply> {
        loop {
            let mut line = String::new();
            match self.stdout.read_line(&mut line).await {
                Ok(0) | Err(_) => return None,
                Ok(_) => {}
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str(trimmed) {
                Ok(reply) => return Some(reply),
                Err(e) => {
                    // Stray prints from native extensions; skip, don't die.
                    warn!(error = %e, "unparseable worker line");
                }
            }
        }
    }

    async fn kill(&mut self) {
        let _ = self.child.kill().await;
    }
}

/// Spawner for [`SubprocessWorker`].
pub struct SubprocessSpawner {
    python: String,
}

impl SubprocessSpawner {
    pub fn new(python: impl Into<String>) -> Self {
        Self { python: python.into() }
    }
}

impl Default for SubprocessSpawner {
    fn default() -> Self {
        Self::new("python3")
    }
}

#[async_trait]
impl WorkerSpawner for SubprocessSpawner {
    async fn spawn(&self) -> Result<Box<dyn KernelWorker>, KernelError> {
        Ok(Box::new(SubprocessWorker::spawn(&self.python)?))
    }
}

// ── Scripted worker (tests) ─────────────────────────────────────────────────

/// Behavior function for the scripted worker: source → replies.
pub type ScriptFn = dyn Fn(&str, &str) -> Vec<WorkerReply> + Send + Sync;

/// An in-memory worker whose replies are computed by a closure. Used by
/// orchestrator tests and by headless environments without a Python.
pub struct ScriptedWorker {
    script: std::sync::Arc<ScriptFn>,
    replies: VecDeque<WorkerReply>,
    alive: bool,
}

impl ScriptedWorker {
    pub fn new(script: std::sync::Arc<ScriptFn>) -> Self {
        let mut replies = VecDeque::new();
        replies.push_back(WorkerReply::Ready);
        Self { script, replies, alive: true }
    }
}

#[async_trait]
impl KernelWorker for ScriptedWorker {
    async fn send(&mut self, request: WorkerRequest) -> Result<(), KernelError> {
        if !self.alive {
            return Err(KernelError::WorkerUnavailable("killed".into()));
        }
        match request {
            WorkerRequest::Execute { cell_id, source } => {
                for reply in (self.script)(&cell_id, &source) {
                    self.replies.push_back(reply);
                }
            }
            WorkerRequest::Install { package } => {
                self.replies.push_back(WorkerReply::Installed {
                    package,
                    ok: true,
                    message: None,
                });
            }
            WorkerRequest::Interrupt | WorkerRequest::Shutdown => {}
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<WorkerReply> {
        if !self.alive {
            return None;
        }
        self.replies.pop_front()
    }

    async fn kill(&mut self) {
        self.alive = false;
    }
}

/// Spawner for [`ScriptedWorker`].
pub struct ScriptedSpawner {
    script: std::sync::Arc<ScriptFn>,
}

impl ScriptedSpawner {
    pub fn new(script: impl Fn(&str, &str) -> Vec<WorkerReply> + Send + Sync + 'static) -> Self {
        Self { script: std::sync::Arc::new(script) }
    }

    /// A worker that echoes a `Result` for everything, erroring on sources
    /// containing `raise`.
    pub fn plain() -> Self {
        Self::new(|cell_id, source| {
            if source.contains("raise") {
                vec![WorkerReply::Error {
                    cell_id: cell_id.to_string(),
                    ename: "ValueError".into(),
                    evalue: "boom".into(),
                    traceback: vec!["Traceback (most recent call last):".into()],
                }]
            } else {
                vec![WorkerReply::Result { cell_id: cell_id.to_string(), value: None }]
            }
        })
    }
}

#[async_trait]
impl WorkerSpawner for ScriptedSpawner {
    async fn spawn(&self) -> Result<Box<dyn KernelWorker>, KernelError> {
        Ok(Box::new(ScriptedWorker::new(self.script.clone())))
    }
}

// ============================================================================
// Tests
// ============================================================================
