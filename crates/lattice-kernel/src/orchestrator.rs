//! The execution orchestrator: run queue, lifecycle, streaming, batches.
//!
//! Executions are serialised: the orchestrator owns one worker, submits one
//! cell at a time, and fans the worker's tagged replies out to the
//! per-execution subscriber channel. Initialization is lazy — the first run
//! takes the kernel Idle → Loading → Ready and reuses the worker after
//! that. Stale replies from an abandoned execution are dropped by cell id.
//!
//! Back-pressure: each execution's stream output is capped; overflow drops
//! `Stream` messages first, never `Result`/`Error`, and the drop count is
//! reported on the completion message as a truncation marker.

use std::collections::VecDeque;

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lattice_types::{Metadata, MimeBundle, Output};

use crate::packages::{
    INSTALL_ATTEMPTS, INSTALL_BACKOFF, INSTALL_TIMEOUT, PackageEvent, PackageResolver,
};
use crate::protocol::{WorkerReply, WorkerRequest};
use crate::state::{KernelError, KernelStatus};
use crate::worker::{KernelWorker, WorkerSpawner};

/// Default cap on streamed `Stream` outputs per execution.
pub const STREAM_LIMIT: usize = 1000;

/// Messages delivered to a cell's execution subscriber.
#[derive(Clone, Debug, PartialEq)]
pub enum ExecMessage {
    /// The cell is about to run; the view clears its previous outputs now.
    Started { cell_id: String },
    /// One output, in worker emission order.
    Output { cell_id: String, output: Output },
    /// The execution finished; the subscription ends here.
    Completed {
        cell_id: String,
        execution_count: u32,
        ok: bool,
        /// Stream messages dropped by back-pressure (truncation marker).
        dropped_outputs: usize,
    },
}

/// Kernel-level events (status transitions, batch progress).
#[derive(Clone, Debug, PartialEq)]
pub enum KernelEvent {
    StatusChanged(KernelStatus),
    Progress { current: usize, total: usize },
}

/// A handle on one execution's output stream.
pub struct ExecHandle {
    pub cell_id: String,
    pub rx: mpsc::UnboundedReceiver<ExecMessage>,
}

impl ExecHandle {
    /// Drain every buffered message (the execution has completed).
    pub fn collect(mut self) -> Vec<ExecMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.push(msg);
        }
        out
    }
}

/// Cooperative interrupt trigger, safe to fire from any task.
#[derive(Clone)]
pub struct InterruptHandle(CancellationToken);

impl InterruptHandle {
    pub fn interrupt(&self) {
        self.0.cancel();
    }
}

struct QueuedRun {
    cell_id: String,
    source: String,
    tx: mpsc::UnboundedSender<ExecMessage>,
}

/// Next step of the execution loop, resolved under the worker borrow.
enum Step {
    Interrupted,
    Reply(Option<WorkerReply>),
}

/// Outcome of one install round-trip.
enum InstallOutcome {
    Ok,
    Failed(String),
    Crashed,
}

/// The notebook execution orchestrator.
pub struct Orchestrator {
    spawner: Box<dyn WorkerSpawner>,
    worker: Option<Box<dyn KernelWorker>>,
    status: KernelStatus,
    queue: VecDeque<QueuedRun>,
    packages: PackageResolver,
    execution_counter: u32,
    interrupt: CancellationToken,
    events: broadcast::Sender<KernelEvent>,
    stream_limit: usize,
    /// Whether `run_all` keeps going past a failing cell. Default: stop and
    /// clear the queue.
    pub continue_on_error: bool,
}

impl Orchestrator {
    pub fn new(spawner: Box<dyn WorkerSpawner>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            spawner,
            worker: None,
            status: KernelStatus::Idle,
            queue: VecDeque::new(),
            packages: PackageResolver::new(),
            execution_counter: 0,
            interrupt: CancellationToken::new(),
            events,
            stream_limit: STREAM_LIMIT,
            continue_on_error: false,
        }
    }

    pub fn with_stream_limit(mut self, limit: usize) -> Self {
        self.stream_limit = limit;
        self
    }

    pub fn status(&self) -> &KernelStatus {
        &self.status
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<KernelEvent> {
        self.events.subscribe()
    }

    /// A trigger that aborts the in-flight execution and drains the queue.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle(self.interrupt.clone())
    }

    /// Abort the current batch: pending runs are discarded (their
    /// subscriptions close), a running cell gets `KeyboardInterrupt`.
    pub fn interrupt(&mut self) {
        self.queue.clear();
        if self.status == KernelStatus::Running {
            self.interrupt.cancel();
        }
    }

    /// Terminate the worker, drop the queue, return to Idle. The next run
    /// re-initializes lazily.
    pub async fn restart(&mut self) {
        info!("kernel restart");
        if let Some(worker) = &mut self.worker {
            let _ = worker.send(WorkerRequest::Shutdown).await;
            worker.kill().await;
        }
        self.worker = None;
        self.queue.clear();
        self.packages.reset();
        self.execution_counter = 0;
        self.interrupt = CancellationToken::new();
        self.set_status(KernelStatus::Idle);
    }

    /// Run one cell. Lazily initializes the worker, executes, and returns
    /// the (already completed) execution's message stream.
    pub async fn run(&mut self, cell_id: &str, source: &str) -> Result<ExecHandle, KernelError> {
        self.check_accepts("run")?;
        self.ensure_worker().await?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.queue.push_back(QueuedRun {
            cell_id: cell_id.to_string(),
            source: source.to_string(),
            tx,
        });
        self.drain_queue(None).await;
        Ok(ExecHandle { cell_id: cell_id.to_string(), rx })
    }

    /// Run cells in order, awaiting each before submitting the next.
    /// Emits `Progress(current, total)` per started cell. On error the
    /// remaining queue is cleared unless `continue_on_error` is set.
    pub async fn run_all(
        &mut self,
        cells: &[(String, String)],
    ) -> Result<Vec<ExecHandle>, KernelError> {
        self.check_accepts("run_all")?;
        self.ensure_worker().await?;
        let mut handles = Vec::with_capacity(cells.len());
        for (cell_id, source) in cells {
            let (tx, rx) = mpsc::unbounded_channel();
            self.queue.push_back(QueuedRun {
                cell_id: cell_id.clone(),
                source: source.clone(),
                tx,
            });
            handles.push(ExecHandle { cell_id: cell_id.clone(), rx });
        }
        self.drain_queue(Some(cells.len())).await;
        Ok(handles)
    }

    /// Run every cell strictly before `cell_id`.
    pub async fn run_all_above(
        &mut self,
        cells: &[(String, String)],
        cell_id: &str,
    ) -> Result<Vec<ExecHandle>, KernelError> {
        let idx = cells
            .iter()
            .position(|(id, _)| id == cell_id)
            .ok_or_else(|| KernelError::CellNotFound(cell_id.to_string()))?;
        self.run_all(&cells[..idx]).await
    }

    /// Run `cell_id` and every cell after it.
    pub async fn run_all_below(
        &mut self,
        cells: &[(String, String)],
        cell_id: &str,
    ) -> Result<Vec<ExecHandle>, KernelError> {
        let idx = cells
            .iter()
            .position(|(id, _)| id == cell_id)
            .ok_or_else(|| KernelError::CellNotFound(cell_id.to_string()))?;
        self.run_all(&cells[idx..]).await
    }

    // ── Internals ───────────────────────────────────────────────────────────

    fn check_accepts(&self, operation: &'static str) -> Result<(), KernelError> {
        if !self.status.accepts_run() {
            return Err(KernelError::InvalidState { state: self.status.clone(), operation });
        }
        Ok(())
    }

    fn set_status(&mut self, status: KernelStatus) {
        if self.status != status {
            debug!(from = %self.status, to = %status, "kernel status");
            self.status = status;
            let _ = self.events.send(KernelEvent::StatusChanged(self.status.clone()));
        }
    }

    /// Lazy initialization: Idle → Loading → Ready.
    async fn ensure_worker(&mut self) -> Result<(), KernelError> {
        if self.worker.is_some() {
            return Ok(());
        }
        self.set_status(KernelStatus::Loading);
        let mut worker = match self.spawner.spawn().await {
            Ok(w) => w,
            Err(e) => {
                self.set_status(KernelStatus::Error("worker crashed".into()));
                return Err(e);
            }
        };
        loop {
            match worker.recv().await {
                Some(WorkerReply::Ready) => break,
                Some(_) => continue,
                None => {
                    self.set_status(KernelStatus::Error("worker crashed".into()));
                    return Err(KernelError::WorkerCrashed);
                }
            }
        }
        self.worker = Some(worker);
        self.set_status(KernelStatus::Ready);
        Ok(())
    }

    async fn drain_queue(&mut self, progress_total: Option<usize>) {
        let mut current = 0;
        while let Some(item) = self.queue.pop_front() {
            current += 1;
            if let Some(total) = progress_total {
                let _ = self.events.send(KernelEvent::Progress { current, total });
            }
            let ok = self.execute_into(item).await;
            if self.status.is_error() {
                self.queue.clear();
                break;
            }
            if !ok && !self.continue_on_error {
                // Stop-on-error default: pending runs are discarded.
                self.queue.clear();
                break;
            }
        }
        if !self.status.is_error() && self.worker.is_some() {
            self.set_status(KernelStatus::Ready);
        }
    }

    /// Execute one queued run, streaming into its subscriber. Returns
    /// whether the cell completed without error.
    async fn execute_into(&mut self, item: QueuedRun) -> bool {
        let QueuedRun { cell_id, source, tx } = item;
        let _ = tx.send(ExecMessage::Started { cell_id: cell_id.clone() });

        // Package resolution before execution.
        let (installs, events) = self.packages.plan(&source);
        for event in events {
            let _ = tx.send(package_event_output(&cell_id, &event));
        }
        for package in installs {
            if let Some(event) = self.install_package(&package).await {
                let _ = tx.send(package_event_output(&cell_id, &event));
            }
        }
        if self.status.is_error() || self.worker.is_none() {
            let _ = tx.send(ExecMessage::Completed {
                cell_id,
                execution_count: self.execution_counter,
                ok: false,
                dropped_outputs: 0,
            });
            return false;
        }

        self.set_status(KernelStatus::Running);
        let request = WorkerRequest::Execute { cell_id: cell_id.clone(), source };
        if let Some(worker) = &mut self.worker {
            if worker.send(request).await.is_err() {
                self.worker_crashed(&cell_id, &tx);
                return false;
            }
        }

        let mut streams_sent = 0usize;
        let mut dropped = 0usize;
        loop {
            let interrupt = self.interrupt.clone();
            // Resolve the next step with the worker borrow confined here.
            let step = match &mut self.worker {
                None => Step::Reply(None),
                Some(worker) => tokio::select! {
                    _ = interrupt.cancelled() => {
                        let _ = worker.send(WorkerRequest::Interrupt).await;
                        Step::Interrupted
                    }
                    r = worker.recv() => Step::Reply(r),
                },
            };
            let reply = match step {
                Step::Interrupted => {
                    // Abandon the current execution: outputs so far are
                    // kept, a synthetic KeyboardInterrupt is appended.
                    self.interrupt = CancellationToken::new();
                    self.queue.clear();
                    self.execution_counter += 1;
                    let _ = tx.send(ExecMessage::Output {
                        cell_id: cell_id.clone(),
                        output: Output::Error {
                            ename: "KeyboardInterrupt".into(),
                            evalue: String::new(),
                            traceback: Vec::new(),
                        },
                    });
                    let _ = tx.send(ExecMessage::Completed {
                        cell_id: cell_id.clone(),
                        execution_count: self.execution_counter,
                        ok: false,
                        dropped_outputs: dropped,
                    });
                    self.set_status(KernelStatus::Ready);
                    return false;
                }
                Step::Reply(None) => {
                    self.worker_crashed(&cell_id, &tx);
                    return false;
                }
                Step::Reply(Some(reply)) => reply,
            };
            // Replies from an abandoned execution are dropped by cell id.
            if reply.cell_id().is_some_and(|id| id != cell_id) {
                debug!(stale = ?reply.cell_id(), "dropping stale worker reply");
                continue;
            }
            match reply {
                WorkerReply::Stdout { text, .. } => {
                    stream(&tx, &cell_id, Output::stdout(text), self.stream_limit, &mut streams_sent, &mut dropped);
                }
                WorkerReply::Stderr { text, .. } => {
                    stream(&tx, &cell_id, Output::stderr(text), self.stream_limit, &mut streams_sent, &mut dropped);
                }
                WorkerReply::DisplayData { mime, data, .. } => {
                    let mut bundle = MimeBundle::new();
                    bundle.insert(mime, serde_json::Value::String(data));
                    let _ = tx.send(ExecMessage::Output {
                        cell_id: cell_id.clone(),
                        output: Output::DisplayData { data: bundle, metadata: Metadata::new() },
                    });
                }
                WorkerReply::Result { value, .. } => {
                    self.execution_counter += 1;
                    if let Some(value) = value {
                        let mut bundle = MimeBundle::new();
                        bundle.insert("text/plain".into(), serde_json::Value::String(value));
                        let _ = tx.send(ExecMessage::Output {
                            cell_id: cell_id.clone(),
                            output: Output::ExecuteResult {
                                data: bundle,
                                metadata: Metadata::new(),
                                execution_count: Some(self.execution_counter),
                            },
                        });
                    }
                    let _ = tx.send(ExecMessage::Completed {
                        cell_id: cell_id.clone(),
                        execution_count: self.execution_counter,
                        ok: true,
                        dropped_outputs: dropped,
                    });
                    self.set_status(KernelStatus::Ready);
                    return true;
                }
                WorkerReply::Error { ename, evalue, traceback, .. } => {
                    self.execution_counter += 1;
                    let _ = tx.send(ExecMessage::Output {
                        cell_id: cell_id.clone(),
                        output: Output::Error { ename, evalue, traceback },
                    });
                    let _ = tx.send(ExecMessage::Completed {
                        cell_id: cell_id.clone(),
                        execution_count: self.execution_counter,
                        ok: false,
                        dropped_outputs: dropped,
                    });
                    self.set_status(KernelStatus::Ready);
                    return false;
                }
                WorkerReply::Ready | WorkerReply::Installed { .. } => continue,
            }
        }
    }

    /// Install with retry and memoisation. Returns a failure event to
    /// surface on the cell's stderr, if the install could not complete.
    async fn install_package(&mut self, package: &str) -> Option<PackageEvent> {
        let mut last_error = String::from("unknown error");
        for attempt in 1..=INSTALL_ATTEMPTS {
            let outcome = match tokio::time::timeout(INSTALL_TIMEOUT, self.install_once(package)).await
            {
                Ok(outcome) => outcome,
                Err(_) => InstallOutcome::Failed("install timed out".into()),
            };
            match outcome {
                InstallOutcome::Ok => {
                    self.packages.mark_installed(package);
                    return None;
                }
                InstallOutcome::Failed(reason) => last_error = reason,
                InstallOutcome::Crashed => {
                    self.set_status(KernelStatus::Error("worker crashed".into()));
                    return Some(PackageEvent::InstallFailed {
                        package: package.to_string(),
                        reason: "worker crashed".into(),
                    });
                }
            }
            if attempt < INSTALL_ATTEMPTS {
                tokio::time::sleep(INSTALL_BACKOFF).await;
            }
        }
        warn!(%package, error = %last_error, "package install failed");
        Some(PackageEvent::InstallFailed { package: package.to_string(), reason: last_error })
    }

    /// One install round-trip against the worker.
    async fn install_once(&mut self, package: &str) -> InstallOutcome {
        let Some(worker) = self.worker.as_mut() else {
            return InstallOutcome::Crashed;
        };
        if worker
            .send(WorkerRequest::Install { package: package.to_string() })
            .await
            .is_err()
        {
            return InstallOutcome::Crashed;
        }
        loop {
            match worker.recv().await {
                Some(WorkerReply::Installed { package: p, ok, message }) if p == package => {
                    return if ok {
                        InstallOutcome::Ok
                    } else {
                        InstallOutcome::Failed(message.unwrap_or_else(|| "install failed".into()))
                    };
                }
                Some(_) => continue,
                None => return InstallOutcome::Crashed,
            }
        }
    }

    fn worker_crashed(&mut self, cell_id: &str, tx: &mpsc::UnboundedSender<ExecMessage>) {
        warn!(%cell_id, "worker died mid-execution");
        self.worker = None;
        self.set_status(KernelStatus::Error("worker crashed".into()));
        let _ = tx.send(ExecMessage::Output {
            cell_id: cell_id.to_string(),
            output: Output::Error {
                ename: "KernelCrashed".into(),
                evalue: "worker crashed".into(),
                traceback: Vec::new(),
            },
        });
        let _ = tx.send(ExecMessage::Completed {
            cell_id: cell_id.to_string(),
            execution_count: self.execution_counter,
            ok: false,
            dropped_outputs: 0,
        });
    }
}

/// Forward a stream output under the back-pressure cap.
fn stream(
    tx: &mpsc::UnboundedSender<ExecMessage>,
    cell_id: &str,
    output: Output,
    limit: usize,
    sent: &mut usize,
    dropped: &mut usize,
) {
    if *sent >= limit {
        *dropped += 1;
        return;
    }
    *sent += 1;
    let _ = tx.send(ExecMessage::Output { cell_id: cell_id.to_string(), output });
}

/// Package events surface as structured stderr on the owning cell.
fn package_event_output(cell_id: &str, event: &PackageEvent) -> ExecMessage {
    let text = match event {
        PackageEvent::UnsupportedWarning { symbol } => {
            format!("[lattice] module '{symbol}' is not available in this runtime; skipping install\n")
        }
        PackageEvent::InstallFailed { package, reason } => {
            format!("[lattice] failed to install '{package}': {reason}\n")
        }
    };
    ExecMessage::Output { cell_id: cell_id.to_string(), output: Output::stderr(text) }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::protocol::WorkerReply;
    use crate::worker::ScriptedSpawner;

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(Box::new(ScriptedSpawner::plain()))
    }

    fn cells(specs: &[(&str, &str)]) -> Vec<(String, String)> {
        specs
            .iter()
            .map(|(id, src)| (id.to_string(), src.to_string()))
            .collect()
    }

    /// Worker that streams one stdout chunk per execution and then never
    /// produces a terminal reply — the execution stays in flight until
    /// interrupted.
    struct HangingWorker {
        replies: VecDeque<WorkerReply>,
    }

    #[async_trait::async_trait]
    impl KernelWorker for HangingWorker {
        async fn send(&mut self, request: WorkerRequest) -> Result<(), KernelError> {
            if let WorkerRequest::Execute { cell_id, .. } = request {
                self.replies.push_back(WorkerReply::Stdout {
                    cell_id,
                    text: "partial\n".into(),
                });
            }
            Ok(())
        }

        async fn recv(&mut self) -> Option<WorkerReply> {
            match self.replies.pop_front() {
                Some(reply) => Some(reply),
                None => std::future::pending::<Option<WorkerReply>>().await,
            }
        }

        async fn kill(&mut self) {}
    }

    struct HangingSpawner;

    #[async_trait::async_trait]
    impl WorkerSpawner for HangingSpawner {
        async fn spawn(&self) -> Result<Box<dyn KernelWorker>, KernelError> {
            Ok(Box::new(HangingWorker {
                replies: VecDeque::from([WorkerReply::Ready]),
            }))
        }
    }

    /// What the scripted install worker does with each install request,
    /// in order. Executions always succeed.
    #[derive(Clone, Copy)]
    enum InstallStep {
        Succeed,
        Fail,
        /// Never reply, so the orchestrator's per-attempt timeout fires.
        Hang,
    }

    struct InstallWorker {
        plan: Arc<Vec<InstallStep>>,
        attempts: Arc<AtomicUsize>,
        replies: VecDeque<WorkerReply>,
    }

    #[async_trait::async_trait]
    impl KernelWorker for InstallWorker {
        async fn send(&mut self, request: WorkerRequest) -> Result<(), KernelError> {
            match request {
                WorkerRequest::Install { package } => {
                    let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
                    match self.plan.get(attempt).copied().unwrap_or(InstallStep::Succeed) {
                        InstallStep::Succeed => self.replies.push_back(WorkerReply::Installed {
                            package,
                            ok: true,
                            message: None,
                        }),
                        InstallStep::Fail => self.replies.push_back(WorkerReply::Installed {
                            package,
                            ok: false,
                            message: Some("no matching distribution".into()),
                        }),
                        InstallStep::Hang => {}
                    }
                }
                WorkerRequest::Execute { cell_id, .. } => {
                    self.replies.push_back(WorkerReply::Result { cell_id, value: None });
                }
                WorkerRequest::Interrupt | WorkerRequest::Shutdown => {}
            }
            Ok(())
        }

        async fn recv(&mut self) -> Option<WorkerReply> {
            match self.replies.pop_front() {
                Some(reply) => Some(reply),
                None => std::future::pending::<Option<WorkerReply>>().await,
            }
        }

        async fn kill(&mut self) {}
    }

    struct InstallSpawner {
        plan: Arc<Vec<InstallStep>>,
        attempts: Arc<AtomicUsize>,
    }

    impl InstallSpawner {
        fn new(plan: Vec<InstallStep>) -> (Self, Arc<AtomicUsize>) {
            let attempts = Arc::new(AtomicUsize::new(0));
            let spawner = Self { plan: Arc::new(plan), attempts: attempts.clone() };
            (spawner, attempts)
        }
    }

    #[async_trait::async_trait]
    impl WorkerSpawner for InstallSpawner {
        async fn spawn(&self) -> Result<Box<dyn KernelWorker>, KernelError> {
            Ok(Box::new(InstallWorker {
                plan: self.plan.clone(),
                attempts: self.attempts.clone(),
                replies: VecDeque::from([WorkerReply::Ready]),
            }))
        }
    }

    fn install_failures(messages: &[ExecMessage]) -> Vec<&str> {
        messages
            .iter()
            .filter_map(|m| match m {
                ExecMessage::Output { output: Output::Stream { text, .. }, .. }
                    if text.contains("failed to install") =>
                {
                    Some(text.as_str())
                }
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_lazy_initialization_on_first_run() {
        let mut orch = orchestrator();
        let mut events = orch.subscribe_events();
        assert_eq!(*orch.status(), KernelStatus::Idle);

        orch.run("c1", "x = 1").await.unwrap();
        assert_eq!(*orch.status(), KernelStatus::Ready);

        // Idle → Loading → Ready → Running → Ready.
        let mut seen = Vec::new();
        while let Ok(ev) = events.try_recv() {
            if let KernelEvent::StatusChanged(s) = ev {
                seen.push(s);
            }
        }
        assert_eq!(
            seen,
            vec![
                KernelStatus::Loading,
                KernelStatus::Ready,
                KernelStatus::Running,
                KernelStatus::Ready,
            ]
        );
    }

    #[tokio::test]
    async fn test_run_streams_started_then_outputs_then_completed() {
        let spawner = ScriptedSpawner::new(|cell_id, _| {
            vec![
                WorkerReply::Stdout { cell_id: cell_id.into(), text: "hi\n".into() },
                WorkerReply::Result { cell_id: cell_id.into(), value: Some("42".into()) },
            ]
        });
        let mut orch = Orchestrator::new(Box::new(spawner));
        let handle = orch.run("c1", "42").await.unwrap();
        let messages = handle.collect();
        assert_eq!(messages[0], ExecMessage::Started { cell_id: "c1".into() });
        assert_eq!(
            messages[1],
            ExecMessage::Output { cell_id: "c1".into(), output: Output::stdout("hi\n") }
        );
        assert!(matches!(
            &messages[2],
            ExecMessage::Output { output: Output::ExecuteResult { execution_count: Some(1), .. }, .. }
        ));
        assert_eq!(
            messages[3],
            ExecMessage::Completed {
                cell_id: "c1".into(),
                execution_count: 1,
                ok: true,
                dropped_outputs: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_run_all_stops_at_first_error() {
        let mut orch = orchestrator();
        let mut events = orch.subscribe_events();
        let cells = cells(&[
            ("c1", "x = 1"),
            ("c2", "raise ValueError(\"boom\")"),
            ("c3", "print(x)"),
        ]);
        let handles = orch.run_all(&cells).await.unwrap();

        let progress: Vec<(usize, usize)> = {
            let mut out = Vec::new();
            while let Ok(ev) = events.try_recv() {
                if let KernelEvent::Progress { current, total } = ev {
                    out.push((current, total));
                }
            }
            out
        };
        assert_eq!(progress, vec![(1, 3), (2, 3)]);

        let mut iter = handles.into_iter();
        let c1: Vec<ExecMessage> = iter.next().unwrap().collect();
        assert!(matches!(
            c1.last(),
            Some(ExecMessage::Completed { execution_count: 1, ok: true, .. })
        ));

        let c2 = iter.next().unwrap().collect();
        assert!(c2.iter().any(|m| matches!(
            m,
            ExecMessage::Output { output: Output::Error { ename, evalue, .. }, .. }
                if ename == "ValueError" && evalue == "boom"
        )));
        assert!(matches!(
            c2.last(),
            Some(ExecMessage::Completed { execution_count: 2, ok: false, .. })
        ));

        // c3 never ran: its subscription closed with no messages.
        let c3 = iter.next().unwrap().collect();
        assert!(c3.is_empty());

        assert_eq!(*orch.status(), KernelStatus::Ready);
    }

    #[tokio::test]
    async fn test_run_all_continue_on_error() {
        let mut orch = orchestrator();
        orch.continue_on_error = true;
        let cells = cells(&[("c1", "raise X"), ("c2", "y = 2")]);
        let handles = orch.run_all(&cells).await.unwrap();
        let c2 = handles.into_iter().nth(1).unwrap().collect();
        assert!(matches!(c2.last(), Some(ExecMessage::Completed { ok: true, .. })));
    }

    #[tokio::test]
    async fn test_run_all_above_and_below() {
        let mut orch = orchestrator();
        let all = cells(&[("a", "1"), ("b", "2"), ("c", "3")]);

        let handles = orch.run_all_above(&all, "c").await.unwrap();
        let ids: Vec<&str> = handles.iter().map(|h| h.cell_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let handles = orch.run_all_below(&all, "b").await.unwrap();
        let ids: Vec<&str> = handles.iter().map(|h| h.cell_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);

        assert!(matches!(
            orch.run_all_above(&all, "ghost").await,
            Err(KernelError::CellNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_error_state_requires_restart() {
        // A worker that dies immediately after Ready.
        let spawner = ScriptedSpawner::new(|_, _| vec![]);
        let mut orch = Orchestrator::new(Box::new(spawner));
        // The scripted worker returns no terminal reply: recv yields None
        // mid-execution, which is a crash.
        let handle = orch.run("c1", "x").await.unwrap();
        let messages = handle.collect();
        assert!(messages.iter().any(|m| matches!(
            m,
            ExecMessage::Output { output: Output::Error { ename, .. }, .. }
                if ename == "KernelCrashed"
        )));
        assert!(orch.status().is_error());

        // Further runs are refused until restart.
        assert!(matches!(
            orch.run("c2", "y").await,
            Err(KernelError::InvalidState { .. })
        ));
        orch.restart().await;
        assert_eq!(*orch.status(), KernelStatus::Idle);
        orch.run("c2", "y = 1").await.unwrap();
        assert_eq!(*orch.status(), KernelStatus::Ready);
    }

    #[tokio::test]
    async fn test_restart_resets_execution_counter() {
        let mut orch = orchestrator();
        orch.run("c1", "1").await.unwrap();
        orch.run("c2", "2").await.unwrap();
        orch.restart().await;
        let handle = orch.run("c3", "3").await.unwrap();
        let messages = handle.collect();
        assert!(matches!(
            messages.last(),
            Some(ExecMessage::Completed { execution_count: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_unsupported_import_warns_and_continues() {
        let mut orch = orchestrator();
        let handle = orch.run("c1", "import tkinter\nx = 1").await.unwrap();
        let messages = handle.collect();
        assert!(messages.iter().any(|m| matches!(
            m,
            ExecMessage::Output { output: Output::Stream { text, .. }, .. }
                if text.contains("tkinter")
        )));
        assert!(matches!(messages.last(), Some(ExecMessage::Completed { ok: true, .. })));
    }

    #[tokio::test]
    async fn test_stream_overflow_drops_and_marks() {
        let spawner = ScriptedSpawner::new(|cell_id, _| {
            let mut replies: Vec<WorkerReply> = (0..20)
                .map(|i| WorkerReply::Stdout { cell_id: cell_id.into(), text: format!("{i}\n") })
                .collect();
            replies.push(WorkerReply::Result { cell_id: cell_id.into(), value: None });
            replies
        });
        let mut orch = Orchestrator::new(Box::new(spawner)).with_stream_limit(5);
        let handle = orch.run("c1", "spam()").await.unwrap();
        let messages = handle.collect();
        let outputs = messages
            .iter()
            .filter(|m| matches!(m, ExecMessage::Output { .. }))
            .count();
        assert_eq!(outputs, 5);
        // Result preserved, truncation recorded.
        assert!(matches!(
            messages.last(),
            Some(ExecMessage::Completed { ok: true, dropped_outputs: 15, .. })
        ));
    }

    #[tokio::test]
    async fn test_interrupt_before_batch_clears_queue() {
        let mut orch = orchestrator();
        orch.run("c0", "warm = 1").await.unwrap();
        orch.interrupt(); // no-op on an idle kernel, queue already empty
        assert_eq!(*orch.status(), KernelStatus::Ready);
        // The kernel still runs afterwards.
        let handle = orch.run("c1", "x = 1").await.unwrap();
        assert!(matches!(
            handle.collect().last(),
            Some(ExecMessage::Completed { ok: true, .. })
        ));
    }

    #[tokio::test]
    async fn test_interrupt_aborts_running_execution() {
        let mut orch = Orchestrator::new(Box::new(HangingSpawner));
        let mut events = orch.subscribe_events();

        // Fire the interrupt from another task once the cell is in flight.
        let interrupt = orch.interrupt_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            interrupt.interrupt();
        });

        let handle = orch.run("c1", "while True: pass").await.unwrap();
        let messages = handle.collect();

        // Outputs streamed before the interrupt are preserved, then the
        // synthetic KeyboardInterrupt lands and the execution completes.
        assert_eq!(messages[0], ExecMessage::Started { cell_id: "c1".into() });
        assert_eq!(
            messages[1],
            ExecMessage::Output { cell_id: "c1".into(), output: Output::stdout("partial\n") }
        );
        assert_eq!(
            messages[2],
            ExecMessage::Output {
                cell_id: "c1".into(),
                output: Output::Error {
                    ename: "KeyboardInterrupt".into(),
                    evalue: String::new(),
                    traceback: Vec::new(),
                },
            }
        );
        // The abandoned execution still consumed an execution count.
        assert_eq!(
            messages[3],
            ExecMessage::Completed {
                cell_id: "c1".into(),
                execution_count: 1,
                ok: false,
                dropped_outputs: 0,
            }
        );
        assert_eq!(messages.len(), 4);
        assert_eq!(*orch.status(), KernelStatus::Ready);

        // The kernel really was Running when the interrupt hit.
        let mut saw_running = false;
        while let Ok(ev) = events.try_recv() {
            if ev == KernelEvent::StatusChanged(KernelStatus::Running) {
                saw_running = true;
            }
        }
        assert!(saw_running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_install_failure_is_retried_and_memoised() {
        let (spawner, attempts) = InstallSpawner::new(vec![InstallStep::Fail, InstallStep::Succeed]);
        let mut orch = Orchestrator::new(Box::new(spawner));

        let handle = orch.run("c1", "import numpy\nx = 1").await.unwrap();
        let messages = handle.collect();
        // First attempt failed, the backoff retry succeeded: nothing
        // surfaces on stderr and the cell runs.
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(install_failures(&messages).is_empty());
        assert!(matches!(messages.last(), Some(ExecMessage::Completed { ok: true, .. })));

        // The load is memoised for the kernel lifetime: no further attempts.
        let handle = orch.run("c2", "import numpy\ny = 2").await.unwrap();
        assert!(matches!(
            handle.collect().last(),
            Some(ExecMessage::Completed { ok: true, .. })
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_install_timeout_counts_as_failed_attempt() {
        // The first attempt never gets a reply; the soft per-attempt
        // timeout fires and the retry succeeds.
        let (spawner, attempts) = InstallSpawner::new(vec![InstallStep::Hang, InstallStep::Succeed]);
        let mut orch = Orchestrator::new(Box::new(spawner));

        let handle = orch.run("c1", "import numpy\nx = 1").await.unwrap();
        let messages = handle.collect();
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(install_failures(&messages).is_empty());
        assert!(matches!(messages.last(), Some(ExecMessage::Completed { ok: true, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_install_exhaustion_surfaces_on_stderr() {
        let (spawner, attempts) = InstallSpawner::new(vec![InstallStep::Fail, InstallStep::Fail]);
        let mut orch = Orchestrator::new(Box::new(spawner));

        let handle = orch.run("c1", "import numpy\nx = 1").await.unwrap();
        let messages = handle.collect();
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        // The failure names the package and the reason on the cell's
        // stderr, and execution still proceeds.
        let failures = install_failures(&messages);
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("'numpy'"));
        assert!(failures[0].contains("no matching distribution"));
        assert!(matches!(messages.last(), Some(ExecMessage::Completed { ok: true, .. })));
        assert_eq!(*orch.status(), KernelStatus::Ready);
    }

    #[tokio::test]
    async fn test_per_cell_fifo_order_preserved() {
        // Outputs observed per cell must match worker emission order.
        let spawner = ScriptedSpawner::new(|cell_id, _| {
            vec![
                WorkerReply::Stdout { cell_id: cell_id.into(), text: "1".into() },
                WorkerReply::Stderr { cell_id: cell_id.into(), text: "2".into() },
                WorkerReply::Stdout { cell_id: cell_id.into(), text: "3".into() },
                WorkerReply::Result { cell_id: cell_id.into(), value: None },
            ]
        });
        let mut orch = Orchestrator::new(Box::new(spawner));
        let handle = orch.run("c1", "go").await.unwrap();
        let texts: Vec<String> = handle
            .collect()
            .into_iter()
            .filter_map(|m| match m {
                ExecMessage::Output { output: Output::Stream { text, .. }, .. } => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["1", "2", "3"]);
    }
}
