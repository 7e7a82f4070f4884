//! Error types for process composition and workflow execution
//!
//! Every fallible operation in this crate returns [`Result<T>`], whose error type is
//! [`FlowError`]. Substrate failures from `procflow-env` convert automatically.
//!
//! # Error Hierarchy
//!
//! ```text
//! FlowError
//! ├── UnboundEnvironment  - Execution attempted with no environment
//! ├── CompositionType     - Operand cannot take part in composition
//! ├── PriorityValidation  - Group priorities violate the active policy
//! ├── ProcessExecution    - A process's own logic failed
//! ├── ConditionNotMet     - An execution condition rejected the input
//! ├── ResourceValidation  - A resource requirement can never be satisfied
//! ├── SyncTimeout         - A barrier expired before it was satisfied
//! ├── InvalidSync         - A barrier can never be satisfied
//! ├── NotFound            - Unknown registry id
//! ├── Cancelled           - An in-flight process was cancelled
//! ├── Configuration       - Invalid workflow configuration
//! ├── Environment         - Substrate errors
//! ├── Serialization/Yaml  - JSON/YAML errors
//! ├── Io                  - File access
//! └── Custom              - Application-defined errors
//! ```
//!
//! # Propagation
//!
//! - A [`ProcessChain`](crate::ProcessChain) stops at the first member error and returns
//!   that same error to its caller.
//! - A [`MultiProcessGroup`](crate::MultiProcessGroup) isolates member errors: each one is
//!   recorded in that member's [`ProcessResult`](crate::ProcessResult) and the rest keep
//!   running. Only structural problems (unbound environment, invalid priorities) are
//!   returned as errors from the group itself.
//!
//! ```rust
//! use procflow_core::error::FlowError;
//!
//! let err = FlowError::process_execution("weld", "torch offline");
//! assert_eq!(err.to_string(), "Process 'weld' execution failed: torch offline");
//! ```

use procflow_env::EnvError;
use thiserror::Error;

/// Result type for composition and workflow operations
pub type Result<T> = std::result::Result<T, FlowError>;

/// Errors that can occur while composing or executing processes
#[derive(Error, Debug)]
pub enum FlowError {
    /// No environment could be resolved for the node being executed
    ///
    /// A chain resolves its environment from an explicit binding or from the first
    /// member that has one. A standalone process must be bound directly.
    #[error("No environment bound to '{node}'")]
    UnboundEnvironment {
        /// Display name of the node
        node: String,
    },

    /// An operand cannot participate in the requested composition
    #[error("Cannot use {operand} as an operand of '{operation}'")]
    CompositionType {
        /// What the operand turned out to be
        operand: String,
        /// The composition that was attempted (`then` or `parallel_with`)
        operation: String,
    },

    /// Group priorities are malformed
    ///
    /// Raised when a member is added or a priority changes, and again before every
    /// priority-mode run.
    #[error("Priority validation failed: {0}")]
    PriorityValidation(String),

    /// A process's logic failed
    #[error("Process '{process}' execution failed: {error}")]
    ProcessExecution {
        /// Name of the process that failed
        process: String,
        /// Error message from the logic
        error: String,
    },

    /// An execution condition rejected the input
    #[error("Execution condition not met for process '{process}'")]
    ConditionNotMet {
        /// Name of the process
        process: String,
    },

    /// A resource requirement can never be satisfied
    #[error("Resource validation failed for process '{process}': {reason}")]
    ResourceValidation {
        /// Name of the process
        process: String,
        /// Why the requirement is invalid
        reason: String,
    },

    /// A synchronization barrier expired
    #[error("Synchronization '{sync}' timed out after {timeout} ({completed}/{required} completed)")]
    SyncTimeout {
        /// Barrier id
        sync: String,
        /// Completions observed before expiry
        completed: usize,
        /// Completions the barrier needed
        required: usize,
        /// Timeout in simulated time units
        timeout: f64,
    },

    /// A synchronization barrier can never be satisfied
    #[error("Invalid synchronization: {0}")]
    InvalidSync(String),

    /// Registry lookup failed
    #[error("Not found: {0}")]
    NotFound(String),

    /// An in-flight process was cancelled before it completed
    #[error("Process '{process}' was cancelled")]
    Cancelled {
        /// Name of the process
        process: String,
    },

    /// Invalid workflow configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Substrate error (invalid duration, closed resource, runtime)
    #[error("Environment error: {0}")]
    Environment(#[from] EnvError),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// File access error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Application-defined error
    #[error("{0}")]
    Custom(String),
}

impl FlowError {
    /// Create an unbound environment error
    pub fn unbound(node: impl Into<String>) -> Self {
        Self::UnboundEnvironment { node: node.into() }
    }

    /// Create a composition type error
    pub fn composition_type(operand: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::CompositionType {
            operand: operand.into(),
            operation: operation.into(),
        }
    }

    /// Create a process execution error
    pub fn process_execution(process: impl Into<String>, error: impl Into<String>) -> Self {
        Self::ProcessExecution {
            process: process.into(),
            error: error.into(),
        }
    }

    /// Create a resource validation error
    pub fn resource_validation(process: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ResourceValidation {
            process: process.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for structural errors that a group reports instead of isolating
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            FlowError::UnboundEnvironment { .. } | FlowError::PriorityValidation(_)
        )
    }
}
