//! Sequential composition.
//!
//! A [`ProcessChain`] runs its members one after another, threading each member's
//! output into the next member's input:
//!
//! ```text
//!  input ──► cut ──► weld ──► paint ──► output
//! ```
//!
//! The first member error aborts the chain. Remaining members are never invoked and
//! the error reaches the caller unchanged.

use crate::error::{FlowError, Result};
use crate::process::{Payload, Process};
use async_trait::async_trait;
use procflow_env::SharedEnvironment;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Separator between member names in a chain's display name.
pub const CHAIN_SEPARATOR: &str = " → ";

/// An ordered sequence of processes executed back to back.
///
/// Chains are immutable. Composing a chain produces a new chain that shares the
/// member handles.
#[derive(Clone)]
pub struct ProcessChain {
    id: String,
    name: String,
    members: Vec<Arc<dyn Process>>,
    env: Option<SharedEnvironment>,
}

impl ProcessChain {
    /// Create a chain from members in execution order.
    pub fn new(members: Vec<Arc<dyn Process>>) -> Self {
        let name = display_name(&members);
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            members,
            env: None,
        }
    }

    /// Bind an explicit environment, taking precedence over the members' bindings.
    pub fn with_environment(mut self, env: SharedEnvironment) -> Self {
        self.env = Some(env);
        self
    }

    /// The explicitly bound environment, ignoring member bindings.
    pub fn explicit_environment(&self) -> Option<SharedEnvironment> {
        self.env.clone()
    }

    /// Members in execution order.
    pub fn members(&self) -> &[Arc<dyn Process>] {
        &self.members
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the chain has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// A new chain with `member` appended.
    pub fn appended(&self, member: Arc<dyn Process>) -> Self {
        self.extended(std::iter::once(member))
    }

    /// A new chain with `members` appended in order.
    pub fn extended(&self, members: impl IntoIterator<Item = Arc<dyn Process>>) -> Self {
        let mut all = self.members.clone();
        all.extend(members);
        let mut chain = ProcessChain::new(all);
        chain.env = self.env.clone();
        chain
    }
}

fn display_name(members: &[Arc<dyn Process>]) -> String {
    members
        .iter()
        .map(|m| m.name())
        .collect::<Vec<_>>()
        .join(CHAIN_SEPARATOR)
}

impl fmt::Debug for ProcessChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessChain")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("members", &self.members.len())
            .finish()
    }
}

#[async_trait]
impl Process for ProcessChain {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn parallel_safe(&self) -> bool {
        self.members.iter().all(|m| m.parallel_safe())
    }

    fn environment(&self) -> Option<SharedEnvironment> {
        self.env
            .clone()
            .or_else(|| self.members.iter().find_map(|m| m.environment()))
    }

    fn validate_resources(&self) -> Result<()> {
        self.members.iter().try_for_each(|m| m.validate_resources())
    }

    async fn execute(&self, input: Payload) -> Result<Payload> {
        let env = self
            .environment()
            .ok_or_else(|| FlowError::unbound(&self.name))?;

        tracing::info!(chain = %self.name, steps = self.members.len(), now = env.now(), "Chain started");

        let mut data = input;
        for (step, member) in self.members.iter().enumerate() {
            tracing::debug!(chain = %self.name, step, process = %member.name(), "Chain step");
            data = match member.execute(data).await {
                Ok(output) => output,
                Err(e) => {
                    tracing::error!(
                        chain = %self.name,
                        step,
                        process = %member.name(),
                        error = %e,
                        "Chain aborted"
                    );
                    return Err(e);
                }
            };
        }

        tracing::info!(chain = %self.name, now = env.now(), "Chain finished");
        Ok(data)
    }
}
