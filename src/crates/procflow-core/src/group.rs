//! Parallel composition with optional priority ordering.
//!
//! A [`MultiProcessGroup`] feeds the same input to every member and collects one
//! [`ProcessResult`] per member. How the members run depends on the group's state:
//!
//! ```text
//!                     priority mapping empty?
//!                      ┌────────┴────────┐
//!                     no                yes
//!                      │                 │
//!               Priority mode     all members parallel-safe?
//!           (sorted, one at a      ┌─────┴─────┐
//!             time, validated)    yes          no
//!                                  │            │
//!                           Concurrent     Sequential
//!                          (barrier join) (declaration order)
//! ```
//!
//! Member errors never abort the group. Each one is recorded in its member's slot
//! and the remaining members still run.

use crate::error::{FlowError, Result};
use crate::priority::{execution_indices, parse_priority, validate_priorities, PriorityPolicy};
use crate::process::{Payload, Process};
use crate::result::ProcessResult;
use futures::future::join_all;
use procflow_env::SharedEnvironment;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// How a group will run its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Sorted by priority, one at a time
    Priority,
    /// All members started together, joined at a barrier
    Concurrent,
    /// One at a time in declaration order
    Sequential,
}

/// A set of independent processes executed side by side.
#[derive(Clone)]
pub struct MultiProcessGroup {
    id: String,
    members: Vec<Arc<dyn Process>>,
    priority_mapping: HashMap<String, u32>,
    policy: PriorityPolicy,
    env: Option<SharedEnvironment>,
}

impl MultiProcessGroup {
    /// Create a group from members in declaration order.
    ///
    /// Each member's name is checked for a trailing `(<digits>)` priority. The
    /// resulting priorities are validated under [`PriorityPolicy::Unique`].
    pub fn new(members: Vec<Arc<dyn Process>>) -> Result<Self> {
        Self::with_members(members, PriorityPolicy::default())
    }

    /// Create a group validated under `policy`.
    pub fn with_members(members: Vec<Arc<dyn Process>>, policy: PriorityPolicy) -> Result<Self> {
        let mut group = Self::empty(policy);
        for member in members {
            group.record_member(member);
        }
        group.validate()?;
        Ok(group)
    }

    /// Create an empty group.
    pub fn empty(policy: PriorityPolicy) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            members: Vec::new(),
            priority_mapping: HashMap::new(),
            policy,
            env: None,
        }
    }

    /// Bind an explicit environment, taking precedence over the members' bindings.
    pub fn with_environment(mut self, env: SharedEnvironment) -> Self {
        self.env = Some(env);
        self
    }

    /// A copy with a fresh id, keeping members, priorities, policy and binding.
    pub fn fork(&self) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            ..self.clone()
        }
    }

    /// Switch the validation policy, re-validating the whole group.
    pub fn with_policy(mut self, policy: PriorityPolicy) -> Result<Self> {
        self.policy = policy;
        self.validate()?;
        Ok(self)
    }

    /// Assign `priority` to the member with id `member_id`, re-validating the whole group.
    pub fn with_priority(mut self, member_id: &str, priority: u32) -> Result<Self> {
        self.set_priority(member_id, priority)?;
        Ok(self)
    }

    /// Assign `priority` to a member in place. On validation failure the group is unchanged.
    pub fn set_priority(&mut self, member_id: &str, priority: u32) -> Result<()> {
        if !self.members.iter().any(|m| m.id() == member_id) {
            return Err(FlowError::NotFound(format!(
                "member '{member_id}' in group '{}'",
                self.display_name()
            )));
        }

        let previous = self.priority_mapping.insert(member_id.to_string(), priority);
        if let Err(e) = self.validate() {
            match previous {
                Some(p) => self.priority_mapping.insert(member_id.to_string(), p),
                None => self.priority_mapping.remove(member_id),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Append a member, parsing a priority from its name, then re-validate the whole
    /// group. On validation failure the group is unchanged.
    pub fn add_member(&mut self, member: Arc<dyn Process>) -> Result<()> {
        let snapshot = (self.members.len(), self.priority_mapping.clone());
        self.record_member(member);

        if let Err(e) = self.validate() {
            self.members.truncate(snapshot.0);
            self.priority_mapping = snapshot.1;
            return Err(e);
        }
        Ok(())
    }

    fn record_member(&mut self, member: Arc<dyn Process>) {
        let (_, priority) = parse_priority(member.name());
        if let Some(p) = priority {
            self.priority_mapping.insert(member.id().to_string(), p);
        }
        self.members.push(member);
    }

    /// Members in declaration order.
    pub fn members(&self) -> &[Arc<dyn Process>] {
        &self.members
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the group has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Group id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// `[a & b & c]` over member names.
    pub fn display_name(&self) -> String {
        let names: Vec<&str> = self.members.iter().map(|m| m.name()).collect();
        format!("[{}]", names.join(" & "))
    }

    /// Active validation policy.
    pub fn policy(&self) -> PriorityPolicy {
        self.policy
    }

    /// Assigned priority of a member.
    pub fn priority_of(&self, member_id: &str) -> Option<u32> {
        self.priority_mapping.get(member_id).copied()
    }

    /// The member-id to priority mapping.
    pub fn priority_mapping(&self) -> &HashMap<String, u32> {
        &self.priority_mapping
    }

    /// Validate every member's priority together.
    pub fn validate(&self) -> Result<()> {
        let entries: Vec<(&str, Option<u32>)> = self
            .members
            .iter()
            .map(|m| (m.name(), self.priority_of(m.id())))
            .collect();
        validate_priorities(&entries, self.policy)
    }

    /// Whether every member is parallel-safe.
    pub fn parallel_safe(&self) -> bool {
        self.members.iter().all(|m| m.parallel_safe())
    }

    /// The environment to run on: the explicit binding, else the first bound member's.
    pub fn environment(&self) -> Option<SharedEnvironment> {
        self.env
            .clone()
            .or_else(|| self.members.iter().find_map(|m| m.environment()))
    }

    /// How the next `execute` will run.
    pub fn execution_mode(&self) -> ExecutionMode {
        if !self.priority_mapping.is_empty() {
            ExecutionMode::Priority
        } else if self.parallel_safe() {
            ExecutionMode::Concurrent
        } else {
            ExecutionMode::Sequential
        }
    }

    /// Member names in the order the next `execute` will run them.
    ///
    /// For concurrent groups this is declaration order.
    pub fn execution_order(&self) -> Vec<String> {
        self.ordered_members()
            .iter()
            .map(|m| m.name().to_string())
            .collect()
    }

    fn ordered_members(&self) -> Vec<&Arc<dyn Process>> {
        if self.priority_mapping.is_empty() {
            return self.members.iter().collect();
        }
        let priorities: Vec<Option<u32>> = self
            .members
            .iter()
            .map(|m| self.priority_of(m.id()))
            .collect();
        execution_indices(&priorities)
            .into_iter()
            .map(|i| &self.members[i])
            .collect()
    }

    /// Run every member on `input`.
    ///
    /// Returns one result per member: in execution order for priority mode, in
    /// declaration order otherwise. An `Err` means the group could not run at all.
    pub async fn execute(&self, input: Payload) -> Result<Vec<ProcessResult>> {
        let name = self.display_name();
        let env = self.environment().ok_or_else(|| FlowError::unbound(&name))?;
        let mode = self.execution_mode();

        tracing::info!(group = %name, ?mode, members = self.members.len(), now = env.now(), "Group started");

        let results = match mode {
            ExecutionMode::Priority => {
                self.validate()?;
                let mut results = Vec::with_capacity(self.members.len());
                for member in self.ordered_members() {
                    tracing::debug!(
                        group = %name,
                        process = %member.name(),
                        priority = ?self.priority_of(member.id()),
                        "Priority member started"
                    );
                    results.push(run_member(member, input.clone(), &env).await);
                }
                results
            }
            ExecutionMode::Concurrent => {
                let runs = self
                    .members
                    .iter()
                    .map(|member| run_member(member, input.clone(), &env));
                join_all(runs).await
            }
            ExecutionMode::Sequential => {
                let mut results = Vec::with_capacity(self.members.len());
                for member in &self.members {
                    results.push(run_member(member, input.clone(), &env).await);
                }
                results
            }
        };

        let failed = results.iter().filter(|r| !r.success).count();
        tracing::info!(group = %name, failed, now = env.now(), "Group finished");
        Ok(results)
    }
}

/// Run one member, turning its error into a failed slot.
async fn run_member(
    member: &Arc<dyn Process>,
    input: Payload,
    env: &SharedEnvironment,
) -> ProcessResult {
    let start = env.now();
    match member.execute(input).await {
        Ok(output) => ProcessResult::success(member.id(), member.name(), output, start, env.now()),
        Err(e) => {
            tracing::warn!(process = %member.name(), error = %e, "Group member failed");
            ProcessResult::failure(member.id(), member.name(), e, start, env.now())
        }
    }
}

impl fmt::Debug for MultiProcessGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiProcessGroup")
            .field("id", &self.id)
            .field("name", &self.display_name())
            .field("priority_mapping", &self.priority_mapping)
            .field("policy", &self.policy)
            .finish()
    }
}
