//! Synchronization barriers over in-flight process completions.
//!
//! A [`ProcessEvent`] is the completion handle of a process started in the
//! background. Barriers wait on a set of events:
//!
//! - [`SyncKind::All`] releases when every event has completed.
//! - [`SyncKind::Any`] releases at the first completion.
//! - [`SyncKind::Threshold`] releases at the n-th completion.
//!
//! Releasing never cancels the events that are still running. They keep going and
//! their results stay available through their own handles. An optional timeout races
//! the barrier against the environment's clock and fails with
//! [`FlowError::SyncTimeout`] when it expires first, again without cancelling
//! anything.
//!
//! ```text
//!  t=0      t=1      t=2      t=3      t=4
//!   ├─ a ───┤                                  Threshold(2)
//!   ├─ b ────────────┤ ◄── barrier releases here
//!   ├─ c ─────────────────────┤                (c, d keep running)
//!   ├─ d ──────────────────────────────┤
//! ```

use crate::error::{FlowError, Result};
use crate::result::ProcessResult;
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::stream::{FuturesUnordered, StreamExt};
use procflow_env::{SharedEnvironment, SimTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::task::AbortHandle;

/// Barrier release rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncKind {
    All,
    Any,
    Threshold,
}

/// A named barrier configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSpec {
    /// Barrier id
    pub id: String,
    /// Release rule
    pub kind: SyncKind,
    /// Completions needed for [`SyncKind::Threshold`]
    #[serde(default)]
    pub threshold: usize,
    /// Optional timeout in simulated time units
    #[serde(default)]
    pub timeout: Option<SimTime>,
}

impl SyncSpec {
    /// Wait for every event.
    pub fn all(id: impl Into<String>) -> Self {
        Self::new(id, SyncKind::All, 0)
    }

    /// Wait for the first event.
    pub fn any(id: impl Into<String>) -> Self {
        Self::new(id, SyncKind::Any, 0)
    }

    /// Wait for `n` events.
    pub fn threshold(id: impl Into<String>, n: usize) -> Self {
        Self::new(id, SyncKind::Threshold, n)
    }

    fn new(id: impl Into<String>, kind: SyncKind, threshold: usize) -> Self {
        Self {
            id: id.into(),
            kind,
            threshold,
            timeout: None,
        }
    }

    /// Give up after `timeout` units of simulated time.
    pub fn with_timeout(mut self, timeout: SimTime) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Completions required to release over `events` events.
    pub fn required(&self, events: usize) -> Result<usize> {
        match self.kind {
            SyncKind::All => Ok(events),
            SyncKind::Any => Ok(events.min(1)),
            SyncKind::Threshold if self.threshold > events => Err(FlowError::InvalidSync(format!(
                "'{}' needs {} completions but only {} events were given",
                self.id, self.threshold, events
            ))),
            SyncKind::Threshold => Ok(self.threshold),
        }
    }
}

/// Completion handle of a process running in the background.
///
/// Cloning shares the same completion. Awaiting it through [`ProcessEvent::wait`]
/// any number of times yields the same [`ProcessResult`].
#[derive(Clone)]
pub struct ProcessEvent {
    process_id: Arc<str>,
    name: Arc<str>,
    completion: Shared<BoxFuture<'static, ProcessResult>>,
    abort: AbortHandle,
}

impl ProcessEvent {
    /// Spawn `run` onto the runtime and track its completion.
    ///
    /// A task that is cancelled or panics completes with a failed result.
    pub fn spawn<F>(
        process_id: impl Into<String>,
        name: impl Into<String>,
        env: SharedEnvironment,
        run: F,
    ) -> Self
    where
        F: Future<Output = ProcessResult> + Send + 'static,
    {
        let process_id: Arc<str> = Arc::from(process_id.into());
        let name: Arc<str> = Arc::from(name.into());
        let started = env.now();

        let handle = tokio::spawn(run);
        let abort = handle.abort_handle();

        let (id, task_name) = (process_id.clone(), name.clone());
        let completion = async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => {
                    let error = if e.is_cancelled() {
                        FlowError::Cancelled {
                            process: task_name.to_string(),
                        }
                    } else {
                        FlowError::process_execution(&*task_name, "task panicked")
                    };
                    ProcessResult::failure(&*id, &*task_name, error, started, env.now())
                }
            }
        }
        .boxed()
        .shared();

        Self {
            process_id,
            name,
            completion,
            abort,
        }
    }

    /// Id of the tracked process.
    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    /// Name of the tracked process.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for completion.
    pub async fn wait(&self) -> ProcessResult {
        self.completion.clone().await
    }

    /// The result, if it has already been observed by a waiter.
    pub fn peek(&self) -> Option<ProcessResult> {
        self.completion.peek().cloned()
    }

    /// Whether the underlying task has finished.
    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }

    /// Request cancellation. Best effort: the process stops at its next suspension
    /// point and completes with a [`FlowError::Cancelled`] failure.
    pub fn cancel(&self) {
        tracing::debug!(process = %self.name, "Cancellation requested");
        self.abort.abort();
    }
}

impl fmt::Debug for ProcessEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessEvent")
            .field("process_id", &self.process_id)
            .field("name", &self.name)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Wait on `events` under `spec`.
///
/// Returns the results that completed before release, in completion order.
pub async fn synchronize(
    events: &[ProcessEvent],
    spec: &SyncSpec,
    env: &SharedEnvironment,
) -> Result<Vec<ProcessResult>> {
    let required = spec.required(events.len())?;
    if required == 0 {
        tracing::debug!(sync = %spec.id, "Barrier released immediately");
        return Ok(Vec::new());
    }

    let mut pending: FuturesUnordered<_> = events.iter().map(|e| e.wait()).collect();
    let mut completed = Vec::with_capacity(required);

    match spec.timeout {
        None => {
            while completed.len() < required {
                match pending.next().await {
                    Some(result) => completed.push(result),
                    None => break,
                }
            }
        }
        Some(limit) => {
            let mut expiry = env.timeout(limit);
            while completed.len() < required {
                tokio::select! {
                    biased;
                    next = pending.next() => match next {
                        Some(result) => completed.push(result),
                        None => break,
                    },
                    expired = &mut expiry => {
                        expired?;
                        tracing::warn!(
                            sync = %spec.id,
                            completed = completed.len(),
                            required,
                            timeout = limit,
                            "Barrier timed out"
                        );
                        return Err(FlowError::SyncTimeout {
                            sync: spec.id.clone(),
                            completed: completed.len(),
                            required,
                            timeout: limit,
                        });
                    }
                }
            }
        }
    }

    tracing::info!(
        sync = %spec.id,
        kind = ?spec.kind,
        completed = completed.len(),
        now = env.now(),
        "Barrier released"
    );
    Ok(completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use procflow_env::SimEnvironment;
    use serde_json::json;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    fn hold(env: &SharedEnvironment, name: &str, d: f64) -> ProcessEvent {
        let task_env = env.clone();
        let task_name = name.to_string();
        ProcessEvent::spawn(name, name, env.clone(), async move {
            let start = task_env.now();
            let _ = task_env.timeout(d).await;
            ProcessResult::success(&task_name, &task_name, json!(d), start, task_env.now())
        })
    }

    #[test]
    fn test_required_counts() {
        assert_eq!(SyncSpec::all("s").required(3).unwrap(), 3);
        assert_eq!(SyncSpec::any("s").required(3).unwrap(), 1);
        assert_eq!(SyncSpec::any("s").required(0).unwrap(), 0);
        assert_eq!(SyncSpec::threshold("s", 0).required(2).unwrap(), 0);
        assert!(matches!(
            SyncSpec::threshold("s", 3).required(2),
            Err(FlowError::InvalidSync(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_waits_for_every_event() {
        let env = SimEnvironment::shared();
        let events = vec![hold(&env, "a", 1.0), hold(&env, "b", 3.0)];

        let results = synchronize(&events, &SyncSpec::all("all"), &env).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].name, "a");
        assert!(approx(env.now(), 3.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_any_leaves_others_running() {
        let env = SimEnvironment::shared();
        let events = vec![hold(&env, "slow", 5.0), hold(&env, "fast", 1.0)];

        let results = synchronize(&events, &SyncSpec::any("any"), &env).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "fast");
        assert!(approx(env.now(), 1.0));

        let slow = events[0].wait().await;
        assert!(slow.success);
        assert!(approx(slow.end_time, 5.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_does_not_cancel() {
        let env = SimEnvironment::shared();
        let events = vec![hold(&env, "long", 10.0)];

        let err = synchronize(&events, &SyncSpec::any("gate").with_timeout(2.0), &env)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::SyncTimeout { completed: 0, required: 1, .. }));
        assert!(approx(env.now(), 2.0));

        assert!(events[0].wait().await.success);
        assert!(approx(env.now(), 10.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_set_releases_immediately() {
        let env = SimEnvironment::shared();
        let results = synchronize(&[], &SyncSpec::all("none"), &env).await.unwrap();
        assert!(results.is_empty());
        assert!(approx(env.now(), 0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_cancel() {
        let env = SimEnvironment::shared();
        let event = hold(&env, "doomed", 4.0);
        event.cancel();

        let result = event.wait().await;
        assert!(!result.success);
        assert!(result.error_message.unwrap().contains("cancelled"));
        assert!(event.is_finished());
        assert!(event.peek().is_some());
    }
}
