use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::process::ProcessHandle;

// ─── CancellationRegistry ─────────────────────────────────────────────────

/// Maps analysis ids to the live provider processes working on them.
///
/// Owned by whoever orchestrates a review and handed to providers at
/// construction. A user-triggered cancel marks the analysis as cancelled and
/// terminates its processes; the executor later asks [`is_analysis_cancelled`]
/// to tell an expected kill apart from a crash.
///
/// Analyses can be grouped under a run id so one call cancels every voice of
/// a multi-model review.
///
/// [`is_analysis_cancelled`]: CancellationRegistry::is_analysis_cancelled
#[derive(Default)]
pub struct CancellationRegistry {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    processes: HashMap<String, Vec<ProcessHandle>>,
    cancelled: HashSet<String>,
    runs: HashMap<String, HashSet<String>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Track `handle` under `analysis_id`. A process registered for an
    /// analysis that was already cancelled is terminated immediately.
    pub fn register_process(&self, analysis_id: &str, handle: ProcessHandle) {
        let mut inner = self.lock();
        if inner.cancelled.contains(analysis_id) {
            debug!(analysis_id, pid = ?handle.pid(), "analysis already cancelled; terminating new process");
            handle.terminate();
        }
        inner
            .processes
            .entry(analysis_id.to_string())
            .or_default()
            .push(handle);
    }

    pub fn unregister_process(&self, analysis_id: &str, handle: &ProcessHandle) {
        let mut inner = self.lock();
        if let Some(handles) = inner.processes.get_mut(analysis_id) {
            handles.retain(|h| h.id() != handle.id());
            if handles.is_empty() {
                inner.processes.remove(analysis_id);
            }
        }
    }

    /// Mark `analysis_id` cancelled and terminate its live processes.
    /// Returns how many processes were signalled.
    pub fn cancel_analysis(&self, analysis_id: &str) -> usize {
        let mut inner = self.lock();
        inner.cancelled.insert(analysis_id.to_string());
        let handles = inner.processes.get(analysis_id).cloned().unwrap_or_default();
        drop(inner);

        for h in &handles {
            h.terminate();
        }
        info!(analysis_id, processes = handles.len(), "analysis cancelled");
        handles.len()
    }

    pub fn is_analysis_cancelled(&self, analysis_id: &str) -> bool {
        self.lock().cancelled.contains(analysis_id)
    }

    /// Number of live processes tracked for `analysis_id`.
    pub fn active_processes(&self, analysis_id: &str) -> usize {
        self.lock()
            .processes
            .get(analysis_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn register_run(&self, run_id: &str, analysis_id: &str) {
        self.lock()
            .runs
            .entry(run_id.to_string())
            .or_default()
            .insert(analysis_id.to_string());
    }

    /// Number of run groups currently registered.
    pub fn active_runs(&self) -> usize {
        self.lock().runs.len()
    }

    /// Cancel every analysis grouped under `run_id`. Returns the number of
    /// processes signalled.
    pub fn cancel_run(&self, run_id: &str) -> usize {
        let analyses: Vec<String> = self
            .lock()
            .runs
            .get(run_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();
        analyses.iter().map(|id| self.cancel_analysis(id)).sum()
    }

    /// Forget the cancellation flag and any leftover handles for an analysis.
    pub fn clear_analysis(&self, analysis_id: &str) {
        let mut inner = self.lock();
        inner.cancelled.remove(analysis_id);
        inner.processes.remove(analysis_id);
    }

    /// Forget a run group and every analysis in it.
    pub fn clear_run(&self, run_id: &str) {
        let mut inner = self.lock();
        if let Some(ids) = inner.runs.remove(run_id) {
            for id in ids {
                inner.cancelled.remove(&id);
                inner.processes.remove(&id);
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_terminates_registered_handles() {
        let reg = CancellationRegistry::new();
        let h = ProcessHandle::new(Some(42));
        reg.register_process("a1", h.clone());
        assert_eq!(reg.active_processes("a1"), 1);
        assert!(!reg.is_analysis_cancelled("a1"));

        assert_eq!(reg.cancel_analysis("a1"), 1);
        assert!(reg.is_analysis_cancelled("a1"));
        // The permit is stored, so a later wait resolves immediately.
        tokio::time::timeout(std::time::Duration::from_secs(1), h.terminated())
            .await
            .expect("handle should have been signalled");
    }

    #[test]
    fn unregister_removes_only_matching_handle() {
        let reg = CancellationRegistry::new();
        let a = ProcessHandle::new(Some(1));
        let b = ProcessHandle::new(Some(2));
        reg.register_process("x", a.clone());
        reg.register_process("x", b.clone());
        reg.unregister_process("x", &a);
        assert_eq!(reg.active_processes("x"), 1);
        reg.unregister_process("x", &b);
        assert_eq!(reg.active_processes("x"), 0);
    }

    #[tokio::test]
    async fn late_registration_after_cancel_is_terminated() {
        let reg = CancellationRegistry::new();
        reg.cancel_analysis("gone");
        let h = ProcessHandle::new(None);
        reg.register_process("gone", h.clone());
        tokio::time::timeout(std::time::Duration::from_secs(1), h.terminated())
            .await
            .expect("late process should be terminated");
    }

    #[test]
    fn cancel_run_reaches_every_grouped_analysis() {
        let reg = CancellationRegistry::new();
        reg.register_run("run", "a");
        reg.register_run("run", "b");
        reg.register_run("other", "c");
        reg.register_process("a", ProcessHandle::new(None));
        reg.register_process("b", ProcessHandle::new(None));

        assert_eq!(reg.cancel_run("run"), 2);
        assert!(reg.is_analysis_cancelled("a"));
        assert!(reg.is_analysis_cancelled("b"));
        assert!(!reg.is_analysis_cancelled("c"));
    }

    #[test]
    fn clear_run_forgets_state() {
        let reg = CancellationRegistry::new();
        reg.register_run("run", "a");
        reg.cancel_run("run");
        reg.clear_run("run");
        assert!(!reg.is_analysis_cancelled("a"));
        assert_eq!(reg.cancel_run("run"), 0);
    }

    #[test]
    fn unknown_analysis_is_not_cancelled() {
        let reg = CancellationRegistry::new();
        assert!(!reg.is_analysis_cancelled("nope"));
        assert_eq!(reg.cancel_analysis("nope"), 0);
        reg.clear_analysis("nope");
        assert!(!reg.is_analysis_cancelled("nope"));
    }
}
