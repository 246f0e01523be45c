use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::screen::{SourceScreen, REJECTION_MESSAGE};

/// Captured output of one execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Embedded Python runtime boundary.
///
/// The sandbox treats the runtime as a black box: source in, captured
/// stdout/stderr out. Tests substitute scripted engines here.
#[async_trait]
pub trait PythonEngine: Send + Sync {
    async fn execute(&self, source: &str) -> Result<ExecOutput>;
}

/// Engine that runs source through a Python interpreter process.
///
/// `-I` puts the interpreter in isolated mode (no site-packages, no
/// environment hooks, empty sys.path[0]).
pub struct PythonProcessEngine {
    python_bin: String,
}

impl PythonProcessEngine {
    pub fn new(python_bin: impl Into<String>) -> Self {
        Self {
            python_bin: python_bin.into(),
        }
    }
}

#[async_trait]
impl PythonEngine for PythonProcessEngine {
    async fn execute(&self, source: &str) -> Result<ExecOutput> {
        let output = Command::new(&self.python_bin)
            .arg("-I")
            .arg("-c")
            .arg(source)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;
        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Failure taxonomy for a sandbox run.
#[derive(Debug)]
pub enum SandboxError {
    /// Denylist match — the run never reached the interpreter.
    Rejected(String),
    /// Another run is in flight (reject-while-busy policy).
    Busy,
    /// The run exceeded the wall-clock budget; the worker was discarded.
    Timeout,
    /// The engine or worker itself failed.
    Engine(String),
}

impl fmt::Display for SandboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SandboxError::Rejected(_) => f.write_str(REJECTION_MESSAGE),
            SandboxError::Busy => f.write_str("A run is already in progress."),
            SandboxError::Timeout => f.write_str("Execution timed out"),
            SandboxError::Engine(e) => f.write_str(e),
        }
    }
}

impl std::error::Error for SandboxError {}

struct Job {
    source: String,
    reply: oneshot::Sender<Result<ExecOutput>>,
}

/// One worker task owning the engine; jobs arrive over a channel.
struct Worker {
    tx: mpsc::Sender<Job>,
    handle: JoinHandle<()>,
}

fn spawn_worker(engine: Arc<dyn PythonEngine>) -> Worker {
    let (tx, mut rx) = mpsc::channel::<Job>(1);
    let handle = tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            let result = engine.execute(&job.source).await;
            // The caller may have given up (timeout) — nothing to do then.
            let _ = job.reply.send(result);
        }
    });
    Worker { tx, handle }
}

/// Sandboxed Python execution with bounded risk and bounded time.
///
/// One worker task, created lazily on the first run and reused across
/// runs. Lifecycle: absent → ready (lazy spawn), busy while a job is in
/// flight, and busy (timed out) → absent — a stale worker is discarded,
/// never reused; the next run spawns a fresh one.
///
/// The denylist screen is a shallow fast-path layered in front of the
/// real isolation boundary (the worker's interpreter process). It must
/// not be advertised as a security guarantee.
pub struct PythonSandbox {
    engine: Arc<dyn PythonEngine>,
    screen: SourceScreen,
    timeout: Duration,
    slot: Mutex<Option<Worker>>,
}

impl PythonSandbox {
    pub fn new(engine: Arc<dyn PythonEngine>, timeout: Duration) -> Self {
        Self {
            engine,
            screen: SourceScreen::new(),
            timeout,
            slot: Mutex::new(None),
        }
    }

    /// Runs Python source: denylist screen, then a worker round-trip
    /// raced against the timeout.
    ///
    /// A second call while a run is in flight fails fast with
    /// [`SandboxError::Busy`] rather than queuing.
    pub async fn run(&self, source: &str) -> Result<ExecOutput, SandboxError> {
        if let Some(token) = self.screen.find_violation(source) {
            warn!("Run rejected by denylist (token: {token})");
            return Err(SandboxError::Rejected(token));
        }

        // The slot lock is held for the whole run — that is the busy state.
        let mut slot = self.slot.try_lock().map_err(|_| SandboxError::Busy)?;
        let worker = slot.get_or_insert_with(|| {
            debug!("Spawning Python sandbox worker");
            spawn_worker(self.engine.clone())
        });

        let (reply_tx, reply_rx) = oneshot::channel();
        let job = Job {
            source: source.to_string(),
            reply: reply_tx,
        };
        if worker.tx.send(job).await.is_err() {
            if let Some(w) = slot.take() {
                w.handle.abort();
            }
            return Err(SandboxError::Engine("sandbox worker is gone".to_string()));
        }

        match tokio::time::timeout(self.timeout, reply_rx).await {
            Ok(Ok(Ok(output))) => Ok(output),
            Ok(Ok(Err(e))) => Err(SandboxError::Engine(e.to_string())),
            Ok(Err(_)) => {
                if let Some(w) = slot.take() {
                    w.handle.abort();
                }
                Err(SandboxError::Engine(
                    "sandbox worker dropped the reply".to_string(),
                ))
            }
            Err(_) => {
                // Unresponsive worker: terminate and discard. The next
                // run starts from a fresh one.
                if let Some(w) = slot.take() {
                    w.handle.abort();
                }
                warn!(
                    "Python run exceeded {}ms, worker discarded",
                    self.timeout.as_millis()
                );
                Err(SandboxError::Timeout)
            }
        }
    }

    /// True if a worker currently exists (ready), false if absent.
    pub async fn has_worker(&self) -> bool {
        self.slot.lock().await.is_some()
    }
}
