//! Trailing-edge debounce with single-flight execution.
//!
//! [`Coalescer::schedule`] can be called from any thread at any rate. The
//! wrapped [`ReloadTask`] runs once the schedule signals have been quiet for
//! the configured window. Signals that arrive while the task is running are
//! held and produce one more run a full window after the current one ends;
//! two runs never overlap.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Work executed by the coalescer after a quiet window.
#[async_trait]
pub trait ReloadTask: Send + Sync {
    async fn reload(&self) -> Result<()>;

    fn name(&self) -> &str {
        "reload"
    }
}

/// Handle to a running debounce driver.
pub struct Coalescer {
    // capacity 1: one pending signal is enough to reset the window
    tx: mpsc::Sender<()>,
    stop: Arc<Notify>,
    runs: Arc<AtomicU64>,
    failures: Arc<AtomicU64>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Coalescer {
    /// Spawn the driver task on the current tokio runtime.
    pub fn spawn(window: Duration, task: Arc<dyn ReloadTask>) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let stop = Arc::new(Notify::new());
        let runs = Arc::new(AtomicU64::new(0));
        let failures = Arc::new(AtomicU64::new(0));
        let handle = tokio::spawn(drive(
            window,
            task,
            rx,
            Arc::clone(&stop),
            Arc::clone(&runs),
            Arc::clone(&failures),
        ));
        Self {
            tx,
            stop,
            runs,
            failures,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Request a run after the quiet window.
    pub fn schedule(&self) {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Closed(())) => {
                warn!("coalescer driver stopped, schedule ignored");
            }
        }
    }

    /// Number of runs started so far.
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    /// Number of runs whose task returned an error.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Stop the driver, running a pending signal first, and wait for it.
    ///
    /// Works while other handles to the coalescer are still alive; later
    /// `schedule()` calls are ignored. Calling it again is a no-op.
    pub async fn shutdown(&self) {
        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(handle) = handle else {
            return;
        };
        self.stop.notify_one();
        if let Err(e) = handle.await {
            warn!(error = %e, "coalescer driver task failed");
        }
    }
}

async fn drive(
    window: Duration,
    task: Arc<dyn ReloadTask>,
    mut rx: mpsc::Receiver<()>,
    stop: Arc<Notify>,
    runs: Arc<AtomicU64>,
    failures: Arc<AtomicU64>,
) {
    loop {
        // a pending signal wins over a stop request so it gets flushed
        tokio::select! {
            biased;
            signal = rx.recv() => {
                if signal.is_none() {
                    break;
                }
            }
            _ = stop.notified() => break,
        }

        // Wait until no signal arrives for a full window.
        let mut stopping = false;
        loop {
            tokio::select! {
                res = tokio::time::timeout(window, rx.recv()) => match res {
                    Ok(Some(())) => continue,
                    Ok(None) => {
                        stopping = true;
                        break;
                    }
                    Err(_) => break,
                },
                _ = stop.notified() => {
                    stopping = true;
                    break;
                }
            }
        }

        let n = runs.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(task = task.name(), run = n, "quiet window elapsed, running");
        if let Err(e) = task.reload().await {
            failures.fetch_add(1, Ordering::Relaxed);
            warn!(task = task.name(), run = n, error = %e, "reload failed");
        }

        if stopping {
            break;
        }
    }
    info!(task = task.name(), "coalescer stopped");
}
