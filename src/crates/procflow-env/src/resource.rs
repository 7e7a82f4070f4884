//! FIFO resource queues with scoped acquire/release.
//!
//! A [`SimResource`] models a bounded pool (machines, workers, docks) that processes
//! queue on. Requests are granted strictly in arrival order, and the returned
//! [`ResourceGuard`] releases its slot when dropped, so a holder can never forget
//! to give a slot back.
//!
//! ```rust,ignore
//! let press = SimResource::new("press", 1);
//! let guard = press.request().await?;   // suspends while the press is busy
//! env.timeout(2.0).await?;              // work while holding it
//! drop(guard);                          // next waiter is admitted
//! ```

use crate::error::{EnvError, Result};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A named, capacity-bounded resource queue.
///
/// Cloning shares the underlying queue.
#[derive(Clone)]
pub struct SimResource {
    name: Arc<str>,
    capacity: usize,
    slots: Arc<Semaphore>,
}

impl SimResource {
    /// Create a resource with `capacity` concurrent slots.
    ///
    /// Capacities above [`Semaphore::MAX_PERMITS`] are clamped to it.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let name: String = name.into();
        if capacity > Semaphore::MAX_PERMITS {
            tracing::warn!(
                resource = %name,
                requested = capacity,
                capacity = Semaphore::MAX_PERMITS,
                "Resource capacity clamped"
            );
        }
        let capacity = capacity.min(Semaphore::MAX_PERMITS);
        Self {
            name: Arc::from(name),
            capacity,
            slots: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Resource name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Slots currently held.
    pub fn in_use(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }

    /// Wait for a slot.
    ///
    /// Suspends until a slot is free. Waiters are admitted in FIFO order.
    pub async fn request(&self) -> Result<ResourceGuard> {
        tracing::trace!(resource = %self.name, available = self.available(), "Resource requested");

        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EnvError::ResourceClosed(self.name.to_string()))?;

        tracing::trace!(resource = %self.name, "Resource granted");
        Ok(ResourceGuard {
            resource: self.name.clone(),
            _permit: permit,
        })
    }

    /// Close the queue. Pending and future requests fail with [`EnvError::ResourceClosed`].
    pub fn close(&self) {
        self.slots.close();
    }
}

impl fmt::Debug for SimResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimResource")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("available", &self.available())
            .finish()
    }
}

/// A held resource slot, released on drop.
pub struct ResourceGuard {
    resource: Arc<str>,
    _permit: OwnedSemaphorePermit,
}

impl ResourceGuard {
    /// Name of the resource this slot belongs to.
    pub fn resource(&self) -> &str {
        &self.resource
    }
}

impl fmt::Debug for ResourceGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceGuard")
            .field("resource", &self.resource)
            .finish()
    }
}
