//! The process contract and the closure-backed [`SimProcess`].
//!
//! A process is a named unit of work that takes a [`Payload`], may suspend on the
//! environment (timeouts, resource queues), and produces a [`Payload`]. Chains,
//! wrapped groups and user processes all satisfy the same [`Process`] trait, so any
//! of them can stand wherever a single process is expected.
//!
//! ```rust,no_run
//! use procflow_core::{process, Process};
//! use procflow_env::SimEnvironment;
//! use serde_json::json;
//!
//! # async fn demo() -> procflow_core::Result<()> {
//! let env = SimEnvironment::shared();
//! let cut = process("cut", |ctx, mut part| Box::pin(async move {
//!     ctx.hold(1.5).await?;
//!     part["cut"] = json!(true);
//!     Ok(part)
//! }))
//! .with_environment(env);
//!
//! let part = cut.execute(json!({"id": 7})).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{FlowError, Result};
use async_trait::async_trait;
use procflow_env::{ResourceGuard, SharedEnvironment, SimResource, SimTime};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use uuid::Uuid;

/// Opaque data threaded between processes.
pub type Payload = serde_json::Value;

/// Type alias for process logic
pub type ProcessFn = Arc<
    dyn Fn(ProcessContext, Payload) -> Pin<Box<dyn Future<Output = Result<Payload>> + Send>>
        + Send
        + Sync,
>;

/// Predicate deciding whether a process may run on a given input
pub type ConditionFn = Arc<dyn Fn(&Payload) -> bool + Send + Sync>;

/// A unit of work that can be executed, chained and grouped.
#[async_trait]
pub trait Process: Send + Sync {
    /// Unique identifier.
    fn id(&self) -> &str;

    /// Display name.
    fn name(&self) -> &str;

    /// Whether this process may run concurrently with its group siblings.
    fn parallel_safe(&self) -> bool {
        true
    }

    /// The environment this process is bound to, if any.
    fn environment(&self) -> Option<SharedEnvironment>;

    /// Check that every resource requirement can eventually be satisfied.
    fn validate_resources(&self) -> Result<()> {
        Ok(())
    }

    /// Run the process on `input`.
    ///
    /// May suspend on the environment. Errors propagate to the immediate caller
    /// unmodified.
    async fn execute(&self, input: Payload) -> Result<Payload>;
}

impl fmt::Debug for dyn Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("id", &self.id())
            .field("name", &self.name())
            .finish()
    }
}

/// Handle given to process logic while it runs.
#[derive(Clone)]
pub struct ProcessContext {
    process_id: Arc<str>,
    name: Arc<str>,
    env: SharedEnvironment,
}

impl ProcessContext {
    /// Build a context for the named process on `env`.
    pub fn new(process_id: &str, name: &str, env: SharedEnvironment) -> Self {
        Self {
            process_id: Arc::from(process_id),
            name: Arc::from(name),
            env,
        }
    }

    /// Id of the running process.
    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    /// Name of the running process.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The environment the process runs on.
    pub fn env(&self) -> &SharedEnvironment {
        &self.env
    }

    /// Current simulated time.
    pub fn now(&self) -> SimTime {
        self.env.now()
    }

    /// Suspend for `duration` units of simulated time.
    pub async fn hold(&self, duration: SimTime) -> Result<()> {
        self.env.timeout(duration).await?;
        Ok(())
    }

    /// Suspend until a slot of `resource` is granted.
    pub async fn request(&self, resource: &SimResource) -> Result<ResourceGuard> {
        Ok(self.env.request(resource).await?)
    }
}

/// A process whose logic is a caller-supplied async closure.
///
/// Optional execution conditions gate the input, and resource requirements are
/// acquired in declaration order before the logic runs and released after it ends.
#[derive(Clone)]
pub struct SimProcess {
    id: String,
    name: String,
    parallel_safe: bool,
    env: Option<SharedEnvironment>,
    logic: ProcessFn,
    conditions: Vec<ConditionFn>,
    resources: Vec<SimResource>,
}

impl SimProcess {
    /// Create an unbound process with the given logic.
    pub fn new<F>(name: impl Into<String>, logic: F) -> Self
    where
        F: Fn(ProcessContext, Payload) -> Pin<Box<dyn Future<Output = Result<Payload>> + Send>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            parallel_safe: true,
            env: None,
            logic: Arc::new(logic),
            conditions: Vec::new(),
            resources: Vec::new(),
        }
    }

    /// A pass-through process that holds for `duration` and returns its input.
    pub fn timed(name: impl Into<String>, duration: SimTime) -> Self {
        Self::new(name, move |ctx, input| {
            Box::pin(async move {
                ctx.hold(duration).await?;
                Ok(input)
            })
        })
    }

    /// Override the generated id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Bind to an environment.
    pub fn with_environment(mut self, env: SharedEnvironment) -> Self {
        self.env = Some(env);
        self
    }

    /// Mark whether the process may run concurrently with group siblings.
    pub fn with_parallel_safe(mut self, parallel_safe: bool) -> Self {
        self.parallel_safe = parallel_safe;
        self
    }

    /// Add an execution condition. Every condition must hold for the process to run.
    pub fn with_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&Payload) -> bool + Send + Sync + 'static,
    {
        self.conditions.push(Arc::new(condition));
        self
    }

    /// Require a slot of `resource` for the whole execution.
    pub fn with_resource(mut self, resource: SimResource) -> Self {
        self.resources.push(resource);
        self
    }

    /// Whether every execution condition holds for `input`.
    pub fn can_execute(&self, input: &Payload) -> bool {
        self.conditions.iter().all(|condition| condition(input))
    }

    /// Declared resource requirements.
    pub fn resources(&self) -> &[SimResource] {
        &self.resources
    }
}

impl fmt::Debug for SimProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimProcess")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parallel_safe", &self.parallel_safe)
            .field("bound", &self.env.is_some())
            .field("conditions", &self.conditions.len())
            .field("resources", &self.resources)
            .finish()
    }
}

#[async_trait]
impl Process for SimProcess {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn parallel_safe(&self) -> bool {
        self.parallel_safe
    }

    fn environment(&self) -> Option<SharedEnvironment> {
        self.env.clone()
    }

    fn validate_resources(&self) -> Result<()> {
        for resource in &self.resources {
            if resource.capacity() == 0 {
                return Err(FlowError::resource_validation(
                    &self.name,
                    format!("resource '{}' has zero capacity", resource.name()),
                ));
            }
        }
        Ok(())
    }

    async fn execute(&self, input: Payload) -> Result<Payload> {
        let env = self
            .env
            .clone()
            .ok_or_else(|| FlowError::unbound(&self.name))?;

        if !self.can_execute(&input) {
            return Err(FlowError::ConditionNotMet {
                process: self.name.clone(),
            });
        }

        self.validate_resources()?;

        let mut held = Vec::with_capacity(self.resources.len());
        for resource in &self.resources {
            held.push(env.request(resource).await?);
        }

        tracing::debug!(process = %self.name, now = env.now(), "Process started");

        let ctx = ProcessContext::new(&self.id, &self.name, env.clone());
        let output = (self.logic)(ctx, input).await;
        drop(held);

        match &output {
            Ok(_) => tracing::debug!(process = %self.name, now = env.now(), "Process finished"),
            Err(e) => tracing::debug!(process = %self.name, error = %e, "Process failed"),
        }
        output
    }
}

/// Convenience function to create a process
///
/// ```rust,no_run
/// use procflow_core::process;
///
/// let inspect = process("inspect", |ctx, part| Box::pin(async move {
///     ctx.hold(0.5).await?;
///     Ok(part)
/// }));
/// ```
pub fn process<F>(name: impl Into<String>, logic: F) -> SimProcess
where
    F: Fn(ProcessContext, Payload) -> Pin<Box<dyn Future<Output = Result<Payload>> + Send>>
        + Send
        + Sync
        + 'static,
{
    SimProcess::new(name, logic)
}
