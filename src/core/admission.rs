//! Process-wide admission control for balance mutations
//!
//! `AdmissionGate` bounds how many mutation requests run at once, independent
//! of which accounts they touch. It is built on `tokio::sync::Semaphore`, whose
//! waiters are served in FIFO order, so a sustained burst cannot starve an
//! early caller.
//!
//! Slots are handed out as [`AdmissionPermit`] guards. Dropping the guard
//! releases the slot, which covers the success, error and cancellation paths
//! alike: a request future dropped while holding a permit gives it back, and a
//! future dropped while still waiting leaves the queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::AdmissionConfig;
use crate::types::WalletError;

/// Bounded, fair concurrency limiter
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    timeout: Duration,
}

/// One admitted request. The slot is released when this is dropped.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionGate {
    pub fn new(config: &AdmissionConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.capacity)),
            capacity: config.capacity,
            timeout: config.timeout,
        }
    }

    /// Wait for a free slot
    ///
    /// Fails with `AdmissionTimeout` if none frees up within the configured
    /// timeout, and with `Shutdown` once the gate has been closed.
    pub async fn acquire(&self) -> Result<AdmissionPermit, WalletError> {
        let waiting = Arc::clone(&self.semaphore).acquire_owned();
        match tokio::time::timeout(self.timeout, waiting).await {
            Ok(Ok(permit)) => Ok(AdmissionPermit { _permit: permit }),
            Ok(Err(_closed)) => Err(WalletError::Shutdown),
            Err(_elapsed) => Err(WalletError::admission_timeout(self.timeout)),
        }
    }

    /// Stop admitting requests
    ///
    /// Waits, behind any callers already queued, until every in-flight request
    /// has released its slot, then closes the gate. Later `acquire` calls fail
    /// with `Shutdown`.
    pub async fn close(&self) {
        let all = u32::try_from(self.capacity).unwrap_or(u32::MAX);
        if let Ok(permits) = self.semaphore.acquire_many(all).await {
            permits.forget();
        }
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Slots currently free
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}
