//! # procflow-core
//!
//! Composition layer for discrete-event process simulation.
//!
//! Independently defined units of work ("processes") combine into sequential chains,
//! parallel groups with optional priority ordering, and multi-step workflows with
//! synchronization barriers. Every composite still behaves like a single process, so
//! compositions nest freely.
//!
//! ## Core Concepts
//!
//! - **[`Process`]**: a named async unit of work over a [`Payload`]
//! - **[`ProcessChain`]**: members in strict order, output threaded to input, fail-fast
//! - **[`MultiProcessGroup`]**: members side by side, failures isolated per member,
//!   optional priority ordering
//! - **[`GroupWrapper`]**: a group presented as a single process
//! - **[`WorkflowManager`]**: registry, bounded worker pool, workflow runs and
//!   ALL / ANY / THRESHOLD barriers
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      WorkflowManager                     │
//! │   registry · worker pool · result log · sync barriers    │
//! └────────────────────────────┬─────────────────────────────┘
//!                              │ execute / start
//!            ┌─────────────────┼─────────────────┐
//!            ▼                 ▼                 ▼
//!      ProcessChain    MultiProcessGroup    SimProcess
//!       (then)         (parallel_with)      (logic)
//!            │                 │                 │
//!            └────────► procflow-env ◄───────────┘
//!                 now · timeout · resource request
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use procflow_core::{Compose, Process, SimProcess};
//! use procflow_env::SimEnvironment;
//! use serde_json::json;
//!
//! SimEnvironment::run(None, |env| async move {
//!     let bound = |name: &str, d: f64| SimProcess::timed(name, d).with_environment(env.clone());
//!
//!     let line = bound("cut", 1.5)
//!         .then(bound("weld", 2.0))
//!         .then(bound("paint", 3.0));
//!
//!     line.execute(json!({"part": 1})).await
//! })?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod chain;
pub mod compose;
pub mod config;
pub mod error;
pub mod group;
pub mod priority;
pub mod process;
pub mod result;
pub mod sync;
pub mod workflow;
pub mod wrapper;

pub use chain::ProcessChain;
pub use compose::{Compose, Node, NodeKind};
pub use config::WorkflowConfig;
pub use error::{FlowError, Result};
pub use group::{ExecutionMode, MultiProcessGroup};
pub use priority::{parse_priority, validate_priorities, PriorityPolicy};
pub use process::{process, ConditionFn, Payload, Process, ProcessContext, ProcessFn, SimProcess};
pub use result::ProcessResult;
pub use sync::{synchronize, ProcessEvent, SyncKind, SyncSpec};
pub use workflow::{WorkflowManager, WorkflowRecord, WorkflowStatistics, WorkflowStatus};
pub use wrapper::GroupWrapper;

pub use procflow_env::{Environment, SharedEnvironment, SimEnvironment, SimResource, SimTime};
