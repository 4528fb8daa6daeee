//! Admission control in front of the executor
//!
//! At most `capacity` executions run at once (default 1); everyone else
//! waits in FIFO order on a fair semaphore.

use crate::{executor::SandboxExecutor, ExecutionResult, Result, SandboxError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Snapshot of gate occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateStatus {
    pub capacity: usize,
    pub in_flight: usize,
    pub waiting: usize,
    pub completed: u64,
}

#[derive(Debug, Default)]
struct GateStats {
    in_flight: usize,
    waiting: usize,
    completed: u64,
}

/// Limits how many executions may run concurrently
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    permits: Arc<Semaphore>,
    stats: Arc<Mutex<GateStats>>,
    capacity: usize,
}

impl AdmissionGate {
    /// Capacities below 1 are raised to 1
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            stats: Arc::new(Mutex::new(GateStats::default())),
            capacity,
        }
    }

    /// Wait for a slot. The slot is released when the returned
    /// [`Admission`] drops.
    pub async fn admit(&self) -> Result<Admission> {
        let waiting = Waiting::enter(&self.stats);
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| SandboxError::Execution("admission gate closed".into()))?;
        drop(waiting);

        self.stats.lock().in_flight += 1;
        Ok(Admission {
            _permit: permit,
            stats: Arc::clone(&self.stats),
        })
    }

    #[must_use]
    pub fn status(&self) -> GateStatus {
        let stats = self.stats.lock();
        GateStatus {
            capacity: self.capacity,
            in_flight: stats.in_flight,
            waiting: stats.waiting,
            completed: stats.completed,
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Counts a caller as waiting until dropped, including when the caller's
/// future is cancelled mid-wait.
struct Waiting<'a>(&'a Mutex<GateStats>);

impl<'a> Waiting<'a> {
    fn enter(stats: &'a Mutex<GateStats>) -> Self {
        stats.lock().waiting += 1;
        Self(stats)
    }
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        self.0.lock().waiting -= 1;
    }
}

/// A held execution slot
#[derive(Debug)]
pub struct Admission {
    _permit: OwnedSemaphorePermit,
    stats: Arc<Mutex<GateStats>>,
}

impl Drop for Admission {
    fn drop(&mut self) {
        let mut stats = self.stats.lock();
        stats.in_flight -= 1;
        stats.completed += 1;
    }
}

struct Inner {
    gate: AdmissionGate,
    executor: SandboxExecutor,
}

/// Executor shared by all connections, serialized through an [`AdmissionGate`]
#[derive(Clone)]
pub struct GatedExecutor {
    inner: Arc<Inner>,
}

impl GatedExecutor {
    #[must_use]
    pub fn new(executor: SandboxExecutor, capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                gate: AdmissionGate::new(capacity),
                executor,
            }),
        }
    }

    /// Wait for a slot, then run `code`.
    ///
    /// The run happens on its own task so that a caller going away
    /// mid-execution does not leave a half-cleaned working directory.
    pub async fn execute(&self, code: String) -> Result<ExecutionResult> {
        let admission = self.inner.gate.admit().await?;
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            let _admission = admission;
            inner.executor.execute(&code).await
        })
        .await
        .map_err(|e| SandboxError::Execution(format!("execution task failed: {e}")))?
    }

    #[must_use]
    pub fn status(&self) -> GateStatus {
        self.inner.gate.status()
    }
}

impl std::fmt::Debug for GatedExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatedExecutor")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn capacity_is_at_least_one() {
        assert_eq!(AdmissionGate::new(0).capacity(), 1);
        assert_eq!(AdmissionGate::default().capacity(), 1);
    }

    #[tokio::test]
    async fn one_admission_at_a_time() {
        let gate = AdmissionGate::new(1);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    let _admission = gate.admit().await.unwrap();
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        let status = gate.status();
        assert_eq!(status.completed, 8);
        assert_eq!(status.in_flight, 0);
        assert_eq!(status.waiting, 0);
    }

    #[tokio::test]
    async fn waiting_callers_are_counted() {
        let gate = AdmissionGate::new(1);
        let held = gate.admit().await.unwrap();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move {
                let _admission = gate.admit().await.unwrap();
            })
        };

        while gate.status().waiting == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(gate.status().in_flight, 1);

        drop(held);
        waiter.await.unwrap();

        let status = gate.status();
        assert_eq!(status.waiting, 0);
        assert_eq!(status.completed, 2);
    }

    #[tokio::test]
    async fn cancelled_waiter_is_not_left_counted() {
        let gate = AdmissionGate::new(1);
        let _held = gate.admit().await.unwrap();

        let timed_out = tokio::time::timeout(Duration::from_millis(20), gate.admit()).await;
        assert!(timed_out.is_err());
        assert_eq!(gate.status().waiting, 0);
        assert_eq!(gate.status().in_flight, 1);
    }

    #[tokio::test]
    async fn gated_executor_runs_sequentially() {
        let Some(python) = ["/usr/bin/python3", "/usr/local/bin/python3"]
            .iter()
            .map(std::path::PathBuf::from)
            .find(|p| p.exists())
        else {
            return;
        };
        let root = tempfile::tempdir().unwrap();
        let config = crate::SandboxConfig::builder()
            .python_path(python)
            .workdir_root(root.path())
            .build();
        let gated = GatedExecutor::new(SandboxExecutor::new(config).unwrap(), 1);

        let runs: Vec<_> = (0..3)
            .map(|i| {
                let gated = gated.clone();
                tokio::spawn(async move { gated.execute(format!("print({i} * 2)")).await })
            })
            .collect();

        let mut outputs = Vec::new();
        for run in runs {
            outputs.push(run.await.unwrap().unwrap().stdout);
        }
        outputs.sort();
        assert_eq!(outputs, vec!["0\n", "2\n", "4\n"]);
        assert_eq!(gated.status().completed, 3);
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }
}
