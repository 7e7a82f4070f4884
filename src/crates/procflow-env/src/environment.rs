//! The environment contract and its tokio-backed virtual clock.
//!
//! The composition layer never schedules anything itself. It asks an [`Environment`]
//! for the current simulated time, for timeouts, and for resource slots. Everything
//! else (the event calendar, run-until semantics) belongs to the environment.
//!
//! [`SimEnvironment`] implements the contract on a current-thread tokio runtime with a
//! paused clock. Time only moves when every task is parked on a timer, which is the
//! discrete-event rule: the calendar jumps straight to the next due event.
//!
//! ```text
//!  t=0.0          t=1.5               t=3.5            t=6.5
//!    │ cut.hold(1.5) │ weld.hold(2.0)    │ paint.hold(3.0)  │
//!    ├──────────────►├──────────────────►├─────────────────►│ done
//! ```

use crate::error::{EnvError, Result};
use crate::resource::{ResourceGuard, SimResource};
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Simulated time, in abstract units (one unit maps to one virtual second).
pub type SimTime = f64;

/// Shared handle to an environment, cloned into every process that binds to it.
pub type SharedEnvironment = Arc<dyn Environment>;

/// The discrete-event substrate consumed by processes.
#[async_trait]
pub trait Environment: Send + Sync + fmt::Debug {
    /// Current simulated time.
    fn now(&self) -> SimTime;

    /// Suspend the caller for `delay` units of simulated time.
    async fn timeout(&self, delay: SimTime) -> Result<()>;

    /// Suspend until a slot of `resource` is granted.
    async fn request(&self, resource: &SimResource) -> Result<ResourceGuard> {
        resource.request().await
    }
}

/// Convert a simulated delay into a tokio duration.
pub fn to_duration(delay: SimTime) -> Result<Duration> {
    if !delay.is_finite() || delay < 0.0 {
        return Err(EnvError::InvalidDuration(delay));
    }
    Ok(Duration::from_secs_f64(delay))
}

/// Virtual-clock environment backed by tokio's paused time.
///
/// Must be created and used inside a runtime whose clock is paused, either through
/// [`SimEnvironment::run`] or a `#[tokio::test(start_paused = true)]` test.
#[derive(Clone)]
pub struct SimEnvironment {
    origin: Instant,
}

impl SimEnvironment {
    /// Create an environment whose time zero is the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Create an environment already wrapped in a [`SharedEnvironment`].
    pub fn shared() -> SharedEnvironment {
        Arc::new(Self::new())
    }

    /// Drive a simulation to completion.
    ///
    /// Builds a paused-clock runtime, hands `root` a fresh environment, and runs it.
    /// With `until` set, the run stops at that simulated time and returns `None` if
    /// `root` has not finished by then.
    pub fn run<F, Fut, T>(until: Option<SimTime>, root: F) -> Result<Option<T>>
    where
        F: FnOnce(SharedEnvironment) -> Fut,
        Fut: Future<Output = T>,
    {
        let horizon = until.map(to_duration).transpose()?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()?;

        runtime.block_on(async move {
            let env = SimEnvironment::shared();
            tracing::debug!(until = ?until, "Simulation started");

            let outcome = match horizon {
                Some(limit) => tokio::time::timeout(limit, root(env.clone())).await.ok(),
                None => Some(root(env.clone()).await),
            };

            tracing::debug!(
                now = env.now(),
                finished = outcome.is_some(),
                "Simulation stopped"
            );
            Ok(outcome)
        })
    }
}

impl Default for SimEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SimEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimEnvironment")
            .field("now", &self.now())
            .finish()
    }
}

#[async_trait]
impl Environment for SimEnvironment {
    fn now(&self) -> SimTime {
        self.origin.elapsed().as_secs_f64()
    }

    async fn timeout(&self, delay: SimTime) -> Result<()> {
        let duration = to_duration(delay)?;
        tokio::time::sleep(duration).await;
        Ok(())
    }
}
