//! The composition algebra: `then` and `parallel_with` over any node.
//!
//! Processes, chains and groups all convert into a [`Node`], and every node can be
//! composed with every other:
//!
//! - `then`: a process is appended, a chain is concatenated one level deep, and a
//!   group is appended as a [`GroupWrapper`].
//! - `parallel_with` with a group on the left: the group is forked and the right
//!   operand added to the copy.
//! - `parallel_with` otherwise: a new two-member group. Chains join as atomic
//!   members and groups join as wrappers.
//!
//! A group on the left of `then` is wrapped first, so the result is always a chain
//! and a group is never spliced member by member.
//!
//! ```rust,no_run
//! use procflow_core::{Compose, SimProcess};
//!
//! # fn demo() -> procflow_core::Result<()> {
//! let line = SimProcess::timed("cut", 1.5)
//!     .then(SimProcess::timed("weld", 2.0))
//!     .then(
//!         SimProcess::timed("drill(2)", 1.0)
//!             .parallel_with(SimProcess::timed("sand(1)", 1.0))?,
//!     );
//! # Ok(())
//! # }
//! ```

use crate::chain::ProcessChain;
use crate::error::Result;
use crate::group::MultiProcessGroup;
use crate::process::{Payload, Process, SimProcess};
use crate::wrapper::GroupWrapper;
use procflow_env::SharedEnvironment;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Anything that can take part in composition.
#[derive(Clone)]
pub enum Node {
    /// A single process, including already wrapped groups
    Process(Arc<dyn Process>),
    /// A sequential chain
    Chain(ProcessChain),
    /// A parallel group
    Group(MultiProcessGroup),
}

/// The shape of a [`Node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Process,
    Chain,
    Group,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Process => write!(f, "process"),
            NodeKind::Chain => write!(f, "chain"),
            NodeKind::Group => write!(f, "group"),
        }
    }
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Process(_) => NodeKind::Process,
            Node::Chain(_) => NodeKind::Chain,
            Node::Group(_) => NodeKind::Group,
        }
    }

    pub fn id(&self) -> String {
        match self {
            Node::Process(p) => p.id().to_string(),
            Node::Chain(c) => c.id().to_string(),
            Node::Group(g) => g.id().to_string(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Node::Process(p) => p.name().to_string(),
            Node::Chain(c) => c.name().to_string(),
            Node::Group(g) => g.display_name(),
        }
    }

    pub fn environment(&self) -> Option<SharedEnvironment> {
        match self {
            Node::Process(p) => p.environment(),
            Node::Chain(c) => c.environment(),
            Node::Group(g) => g.environment(),
        }
    }

    /// View the node as a single process. Groups come back wrapped.
    pub fn into_process(self) -> Arc<dyn Process> {
        match self {
            Node::Process(p) => p,
            Node::Chain(c) => Arc::new(c),
            Node::Group(g) => Arc::new(GroupWrapper::new(g)),
        }
    }

    /// Execute the node as a single process would.
    ///
    /// A group's result list comes back serialized, as from a [`GroupWrapper`].
    pub async fn execute(&self, input: Payload) -> Result<Payload> {
        match self {
            Node::Process(p) => p.execute(input).await,
            Node::Chain(c) => c.execute(input).await,
            Node::Group(g) => Ok(serde_json::to_value(g.execute(input).await?)?),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.kind())
            .field("id", &self.id())
            .field("name", &self.name())
            .finish()
    }
}

impl From<Arc<dyn Process>> for Node {
    fn from(process: Arc<dyn Process>) -> Self {
        Node::Process(process)
    }
}

impl From<SimProcess> for Node {
    fn from(process: SimProcess) -> Self {
        Node::Process(Arc::new(process))
    }
}

impl From<GroupWrapper> for Node {
    fn from(wrapper: GroupWrapper) -> Self {
        Node::Process(Arc::new(wrapper))
    }
}

impl From<ProcessChain> for Node {
    fn from(chain: ProcessChain) -> Self {
        Node::Chain(chain)
    }
}

impl From<MultiProcessGroup> for Node {
    fn from(group: MultiProcessGroup) -> Self {
        Node::Group(group)
    }
}

/// Composition operators available on every node type.
pub trait Compose: Into<Node> + Sized {
    /// Run `self`, then `next` on its output.
    fn then(self, next: impl Into<Node>) -> ProcessChain {
        then_nodes(self.into(), next.into())
    }

    /// Run `self` side by side with `other`.
    ///
    /// Fails when the combined priorities do not validate.
    fn parallel_with(self, other: impl Into<Node>) -> Result<MultiProcessGroup> {
        parallel_nodes(self.into(), other.into())
    }
}

impl<T: Into<Node>> Compose for T {}

fn then_nodes(left: Node, right: Node) -> ProcessChain {
    let base = match left {
        Node::Chain(chain) => chain,
        other => ProcessChain::new(vec![other.into_process()]),
    };

    let chain = match right {
        Node::Chain(tail) => {
            let inherited = tail.explicit_environment();
            let joined = base.extended(tail.members().iter().cloned());
            match (joined.explicit_environment(), inherited) {
                (None, Some(env)) => joined.with_environment(env),
                (_, _) => joined,
            }
        }
        other => base.appended(other.into_process()),
    };

    tracing::trace!(chain = %chain.name(), "Composed chain");
    chain
}

fn parallel_nodes(left: Node, right: Node) -> Result<MultiProcessGroup> {
    let group = match left {
        Node::Group(group) => {
            let mut forked = group.fork();
            forked.add_member(right.into_process())?;
            forked
        }
        other => MultiProcessGroup::new(vec![other.into_process(), right.into_process()])?,
    };

    tracing::trace!(group = %group.display_name(), "Composed group");
    Ok(group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlowError;
    use crate::group::ExecutionMode;
    use procflow_env::SimEnvironment;
    use serde_json::json;

    fn p(name: &str) -> SimProcess {
        SimProcess::timed(name, 1.0)
    }

    #[test]
    fn test_then_appends_processes() {
        let chain = p("a").then(p("b")).then(p("c"));
        assert_eq!(chain.len(), 3);
        assert_eq!(chain.name(), "a → b → c");
    }

    #[test]
    fn test_then_concatenates_chains_one_level() {
        let left = p("a").then(p("b"));
        let right = p("c").then(p("d"));
        let chain = left.clone().then(right);

        assert_eq!(chain.len(), 4);
        assert_eq!(left.len(), 2);
    }

    #[test]
    fn test_then_wraps_groups() {
        let group = p("x").parallel_with(p("y")).unwrap();
        let group_id = group.id().to_string();

        let chain = p("a").then(group.clone());
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.members()[1].id(), format!("wrapper_{group_id}"));

        let chain = group.then(p("b"));
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.name(), "[x & y] → b");
    }

    #[test]
    fn test_parallel_with_creates_group() {
        let group = p("drill(2)").parallel_with(p("sand(1)")).unwrap();
        assert_eq!(group.len(), 2);
        assert_eq!(group.execution_mode(), ExecutionMode::Priority);
        assert_eq!(group.execution_order(), vec!["sand(1)", "drill(2)"]);
    }

    #[test]
    fn test_parallel_with_on_group_forks() {
        let pair = p("b(2)").parallel_with(p("c(3)")).unwrap();
        let trio = pair.clone().parallel_with(p("a(1)")).unwrap();

        assert_eq!(pair.len(), 2);
        assert_eq!(trio.len(), 3);
        assert_ne!(pair.id(), trio.id());
        assert_eq!(trio.execution_order(), vec!["a(1)", "b(2)", "c(3)"]);
    }

    #[test]
    fn test_parallel_with_rejects_duplicate_priority() {
        let pair = p("a(1)").parallel_with(p("b(2)")).unwrap();
        let err = pair.parallel_with(p("c(2)")).unwrap_err();
        assert!(matches!(err, FlowError::PriorityValidation(_)));
    }

    #[test]
    fn test_chain_joins_group_atomically() {
        let chain = p("a").then(p("b"));
        let group = chain.parallel_with(p("c")).unwrap();
        assert_eq!(group.len(), 2);
        assert_eq!(group.members()[0].name(), "a → b");

        let nested = p("d").parallel_with(group).unwrap();
        assert_eq!(nested.len(), 2);
        assert!(nested.members()[1].id().starts_with("wrapper_"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_composed_tree_executes() {
        let env = SimEnvironment::shared();
        let bound = |name: &str, d: f64| SimProcess::timed(name, d).with_environment(env.clone());

        let line = bound("cut", 1.0)
            .then(bound("drill", 2.0).parallel_with(bound("sand", 3.0)).unwrap())
            .then(bound("pack", 1.0));

        let out = line.execute(json!({"lot": 1})).await.unwrap();
        let results = out.as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r["payload"] == json!({"lot": 1})));
        assert!((env.now() - 5.0).abs() < 1e-6);
    }
}
