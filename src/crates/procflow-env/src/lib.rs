//! # procflow-env
//!
//! Discrete-event substrate for procflow.
//!
//! This crate supplies the three things a composed process ever asks of the outside
//! world:
//!
//! - **time**: [`Environment::now`]
//! - **delay**: [`Environment::timeout`]
//! - **contention**: [`Environment::request`] on a FIFO [`SimResource`]
//!
//! [`SimEnvironment`] is the reference implementation. It runs on tokio's paused clock,
//! so a simulation of hours completes in microseconds and is fully deterministic.
//!
//! ```rust,no_run
//! use procflow_env::{Environment, SimEnvironment};
//!
//! let finished_at = SimEnvironment::run(None, |env| async move {
//!     env.timeout(2.5).await?;
//!     Ok::<_, procflow_env::EnvError>(env.now())
//! })?;
//! # Ok::<(), procflow_env::EnvError>(())
//! ```

pub mod environment;
pub mod error;
pub mod resource;

pub use environment::{to_duration, Environment, SharedEnvironment, SimEnvironment, SimTime};
pub use error::{EnvError, Result};
pub use resource::{ResourceGuard, SimResource};
