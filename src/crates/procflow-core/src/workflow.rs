//! Top-level orchestration: registry, workflow runs, worker pool and barriers.
//!
//! The [`WorkflowManager`] ties composed nodes to an environment:
//!
//! ```text
//!                ┌──────────────────────── WorkflowManager ───────────────────────┐
//!  register ───► │ registry (processes, chains, sync points)                      │
//!  run_workflow ►│ steps run in order ──► worker pool (max_workers permits) ──►   │
//!  execute ────► │                        node.execute(input)                     │
//!  start ──────► │ spawned ──► ProcessEvent ──► sync / wait_* barriers            │
//!                │ result log ──► statistics()                                    │
//!                └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every execution that goes through the manager holds one worker permit while it
//! runs and leaves one [`ProcessResult`] in the result log.

use crate::chain::ProcessChain;
use crate::compose::{Compose, Node, NodeKind};
use crate::config::WorkflowConfig;
use crate::error::{FlowError, Result};
use crate::group::MultiProcessGroup;
use crate::process::Payload;
use crate::result::ProcessResult;
use crate::sync::{synchronize, ProcessEvent, SyncSpec};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use procflow_env::{SharedEnvironment, SimTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Lifecycle state of a named workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Active,
    Completed,
    Failed,
}

/// Record of the latest run of a named workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub name: String,
    pub status: WorkflowStatus,
    pub steps: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub sim_start: SimTime,
    pub sim_end: Option<SimTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Aggregate counters reported by [`WorkflowManager::statistics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStatistics {
    pub total_processes: usize,
    pub total_chains: usize,
    pub active_workflows: usize,
    pub completed_workflows: usize,
    pub failed_workflows: usize,
    pub successful_executions: usize,
    pub failed_executions: usize,
    pub execution_results: usize,
}

struct ManagerInner {
    env: SharedEnvironment,
    config: WorkflowConfig,
    workers: Arc<Semaphore>,
    processes: Mutex<HashMap<String, Node>>,
    chains: Mutex<HashMap<String, ProcessChain>>,
    sync_points: Mutex<HashMap<String, SyncSpec>>,
    results: Mutex<Vec<ProcessResult>>,
    workflows: Mutex<HashMap<String, WorkflowRecord>>,
}

/// Registry, runner and synchronizer for composed processes.
///
/// Cloning is cheap and shares all state.
#[derive(Clone)]
pub struct WorkflowManager {
    inner: Arc<ManagerInner>,
}

impl WorkflowManager {
    /// Create a manager with default configuration.
    pub fn new(env: SharedEnvironment) -> Self {
        Self::build(env, WorkflowConfig::default())
    }

    /// Create a manager with validated configuration.
    pub fn with_config(env: SharedEnvironment, config: WorkflowConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(env, config))
    }

    fn build(env: SharedEnvironment, config: WorkflowConfig) -> Self {
        tracing::debug!(max_workers = config.max_workers, policy = %config.priority_policy, "Workflow manager created");
        Self {
            inner: Arc::new(ManagerInner {
                workers: Arc::new(Semaphore::new(config.max_workers)),
                env,
                config,
                processes: Mutex::new(HashMap::new()),
                chains: Mutex::new(HashMap::new()),
                sync_points: Mutex::new(HashMap::new()),
                results: Mutex::new(Vec::new()),
                workflows: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The environment barriers and timestamps use.
    pub fn environment(&self) -> &SharedEnvironment {
        &self.inner.env
    }

    /// Active configuration.
    pub fn config(&self) -> &WorkflowConfig {
        &self.inner.config
    }

    /// Worker permits currently free.
    pub fn available_workers(&self) -> usize {
        self.inner.workers.available_permits()
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Register a node under its id. Registering the same id again is a no-op.
    ///
    /// Chains are counted as chains; processes and groups as processes.
    pub fn register(&self, node: impl Into<Node>) -> String {
        let node = node.into();
        let id = node.id();

        match node {
            Node::Chain(chain) => {
                self.inner.chains.lock().entry(id.clone()).or_insert(chain);
            }
            other => {
                self.inner.processes.lock().entry(id.clone()).or_insert(other);
            }
        }

        tracing::debug!(id = %id, "Node registered");
        id
    }

    /// Register a named barrier configuration.
    pub fn register_sync_point(&self, spec: SyncSpec) -> String {
        let id = spec.id.clone();
        self.inner.sync_points.lock().insert(id.clone(), spec);
        id
    }

    /// Look up a registered node.
    pub fn node(&self, id: &str) -> Option<Node> {
        if let Some(node) = self.inner.processes.lock().get(id) {
            return Some(node.clone());
        }
        self.inner.chains.lock().get(id).cloned().map(Node::Chain)
    }

    /// Look up a registered barrier.
    pub fn sync_point(&self, id: &str) -> Option<SyncSpec> {
        self.inner.sync_points.lock().get(id).cloned()
    }

    fn operand(&self, id: &str, operation: &str) -> Result<Node> {
        if self.inner.sync_points.lock().contains_key(id) {
            return Err(FlowError::composition_type(
                format!("sync point '{id}'"),
                operation,
            ));
        }
        self.node(id)
            .ok_or_else(|| FlowError::NotFound(format!("node '{id}'")))
    }

    /// Chain two registered nodes and register the result.
    pub fn compose_then(&self, left_id: &str, right_id: &str) -> Result<ProcessChain> {
        let left = self.operand(left_id, "then")?;
        let right = self.operand(right_id, "then")?;

        let chain = left.then(right);
        self.register(chain.clone());
        Ok(chain)
    }

    /// Group two registered nodes and register the result.
    ///
    /// A new group takes the configured priority policy. A group on the left keeps
    /// its own.
    pub fn compose_parallel(&self, left_id: &str, right_id: &str) -> Result<MultiProcessGroup> {
        let left = self.operand(left_id, "parallel_with")?;
        let right = self.operand(right_id, "parallel_with")?;

        let left_is_group = left.kind() == NodeKind::Group;
        let mut group = left.parallel_with(right)?;
        if !left_is_group {
            group = group.with_policy(self.inner.config.priority_policy)?;
        }

        self.register(group.clone());
        Ok(group)
    }

    /// Build a group under the configured priority policy, bound to the manager's
    /// environment.
    pub fn group(&self, members: Vec<Node>) -> Result<MultiProcessGroup> {
        let members = members.into_iter().map(Node::into_process).collect();
        Ok(MultiProcessGroup::with_members(members, self.inner.config.priority_policy)?
            .with_environment(self.inner.env.clone()))
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Run one node under the worker pool and log its result.
    pub async fn execute(&self, node: impl Into<Node>, input: Payload) -> ProcessResult {
        let node = node.into();
        self.run_logged(&node, input).await.0
    }

    /// Start a node in the background and return its completion handle.
    pub fn start(&self, node: impl Into<Node>, input: Payload) -> ProcessEvent {
        let node = node.into();
        let manager = self.clone();
        ProcessEvent::spawn(node.id(), node.name(), self.inner.env.clone(), async move {
            manager.execute(node, input).await
        })
    }

    async fn run_logged(&self, node: &Node, input: Payload) -> (ProcessResult, Result<Payload>) {
        let env = &self.inner.env;
        let (id, name) = (node.id(), node.name());

        let outcome = match self.inner.workers.clone().acquire_owned().await {
            Ok(permit) => {
                let start = env.now();
                tracing::debug!(process = %name, now = start, "Worker acquired");
                let outcome = node.execute(input).await;
                drop(permit);
                (start, outcome)
            }
            Err(_) => (
                env.now(),
                Err(FlowError::Custom("worker pool closed".to_string())),
            ),
        };

        let (start, outcome) = outcome;
        let result = match &outcome {
            Ok(payload) => ProcessResult::success(&id, &name, payload.clone(), start, env.now()),
            Err(e) => ProcessResult::failure(&id, &name, e, start, env.now()),
        };
        self.inner.results.lock().push(result.clone());
        (result, outcome)
    }

    /// Run `steps` in order, threading each step's output into the next.
    ///
    /// The first failing step aborts the run and its error is returned. The run is
    /// tracked under `name` as active, then completed or failed.
    pub async fn run_workflow(
        &self,
        name: impl Into<String>,
        steps: Vec<Node>,
        input: Payload,
    ) -> Result<Payload> {
        let name = name.into();
        let env = self.inner.env.clone();

        self.inner.workflows.lock().insert(
            name.clone(),
            WorkflowRecord {
                name: name.clone(),
                status: WorkflowStatus::Active,
                steps: steps.len(),
                started_at: Utc::now(),
                finished_at: None,
                sim_start: env.now(),
                sim_end: None,
                error_message: None,
            },
        );
        tracing::info!(workflow = %name, steps = steps.len(), now = env.now(), "Workflow started");

        let mut data = input;
        for (index, step) in steps.iter().enumerate() {
            tracing::debug!(workflow = %name, step = index, node = %step.name(), "Workflow step");
            let (_, outcome) = self.run_logged(step, data).await;
            match outcome {
                Ok(output) => data = output,
                Err(e) => {
                    tracing::error!(workflow = %name, step = index, error = %e, "Workflow failed");
                    self.finish_workflow(&name, WorkflowStatus::Failed, Some(e.to_string()));
                    return Err(e);
                }
            }
        }

        tracing::info!(workflow = %name, now = env.now(), "Workflow completed");
        self.finish_workflow(&name, WorkflowStatus::Completed, None);
        Ok(data)
    }

    fn finish_workflow(&self, name: &str, status: WorkflowStatus, error: Option<String>) {
        let now = self.inner.env.now();
        if let Some(record) = self.inner.workflows.lock().get_mut(name) {
            record.status = status;
            record.finished_at = Some(Utc::now());
            record.sim_end = Some(now);
            record.error_message = error;
        }
    }

    /// Latest run record of a named workflow.
    pub fn workflow(&self, name: &str) -> Option<WorkflowRecord> {
        self.inner.workflows.lock().get(name).cloned()
    }

    // ------------------------------------------------------------------
    // Synchronization
    // ------------------------------------------------------------------

    /// Wait on `events` under `spec`. A spec without a timeout takes the configured
    /// default.
    pub async fn sync(&self, events: &[ProcessEvent], spec: &SyncSpec) -> Result<Vec<ProcessResult>> {
        match (spec.timeout, self.inner.config.default_sync_timeout) {
            (None, Some(default)) => {
                let spec = spec.clone().with_timeout(default);
                synchronize(events, &spec, &self.inner.env).await
            }
            _ => synchronize(events, spec, &self.inner.env).await,
        }
    }

    /// Wait on `events` at a registered barrier.
    pub async fn sync_at(&self, sync_id: &str, events: &[ProcessEvent]) -> Result<Vec<ProcessResult>> {
        let spec = self
            .sync_point(sync_id)
            .ok_or_else(|| FlowError::NotFound(format!("sync point '{sync_id}'")))?;
        self.sync(events, &spec).await
    }

    /// Wait for every event.
    pub async fn wait_all(
        &self,
        events: &[ProcessEvent],
        timeout: Option<SimTime>,
    ) -> Result<Vec<ProcessResult>> {
        self.sync(events, &with_optional_timeout(SyncSpec::all("wait_all"), timeout))
            .await
    }

    /// Wait for the first event. The rest keep running.
    pub async fn wait_any(
        &self,
        events: &[ProcessEvent],
        timeout: Option<SimTime>,
    ) -> Result<Vec<ProcessResult>> {
        self.sync(events, &with_optional_timeout(SyncSpec::any("wait_any"), timeout))
            .await
    }

    /// Wait for `n` events. The rest keep running.
    pub async fn wait_threshold(
        &self,
        events: &[ProcessEvent],
        n: usize,
        timeout: Option<SimTime>,
    ) -> Result<Vec<ProcessResult>> {
        self.sync(
            events,
            &with_optional_timeout(SyncSpec::threshold("wait_threshold", n), timeout),
        )
        .await
    }

    // ------------------------------------------------------------------
    // Reporting
    // ------------------------------------------------------------------

    /// Every logged result, oldest first.
    pub fn results(&self) -> Vec<ProcessResult> {
        self.inner.results.lock().clone()
    }

    /// Latest logged result of a process.
    pub fn result(&self, process_id: &str) -> Option<ProcessResult> {
        self.inner
            .results
            .lock()
            .iter()
            .rev()
            .find(|r| r.process_id == process_id)
            .cloned()
    }

    /// Aggregate counters over the registry, result log and workflow runs.
    pub fn statistics(&self) -> WorkflowStatistics {
        let mut stats = WorkflowStatistics {
            total_processes: self.inner.processes.lock().len(),
            total_chains: self.inner.chains.lock().len(),
            ..Default::default()
        };

        for result in self.inner.results.lock().iter() {
            stats.execution_results += 1;
            if result.success {
                stats.successful_executions += 1;
            } else {
                stats.failed_executions += 1;
            }
        }

        for record in self.inner.workflows.lock().values() {
            match record.status {
                WorkflowStatus::Active => stats.active_workflows += 1,
                WorkflowStatus::Completed => stats.completed_workflows += 1,
                WorkflowStatus::Failed => stats.failed_workflows += 1,
            }
        }

        stats
    }
}

fn with_optional_timeout(spec: SyncSpec, timeout: Option<SimTime>) -> SyncSpec {
    match timeout {
        Some(t) => spec.with_timeout(t),
        None => spec,
    }
}
