//! Request lifecycle and graceful shutdown
//!
//! Every request holds a [`RequestGuard`] for as long as it runs. Shutdown
//! refuses new requests, waits until every guard has been dropped, then
//! lingers for a grace period so responses can reach their callers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::{ServiceError, ServiceResult};

/// Upper bound on concurrently running requests
pub const MAX_IN_FLIGHT: u32 = 1 << 20;

/// Default wait after the last request finishes
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Tracks in-flight requests and coordinates shutdown
#[derive(Debug)]
pub struct LifeManager {
    permits: Arc<Semaphore>,
    closing: AtomicBool,
    grace: Duration,
}

/// Proof that a request is in flight; released on drop
#[derive(Debug)]
pub struct RequestGuard {
    _permit: OwnedSemaphorePermit,
}

impl LifeManager {
    pub fn new(grace: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(MAX_IN_FLIGHT as usize)),
            closing: AtomicBool::new(false),
            grace,
        }
    }

    /// Register a new request
    pub fn enter(&self) -> ServiceResult<RequestGuard> {
        if self.is_closing() {
            return Err(ServiceError::ShuttingDown);
        }
        match self.permits.clone().try_acquire_owned() {
            Ok(permit) => Ok(RequestGuard { _permit: permit }),
            Err(TryAcquireError::Closed) => Err(ServiceError::ShuttingDown),
            Err(TryAcquireError::NoPermits) if self.is_closing() => Err(ServiceError::ShuttingDown),
            Err(TryAcquireError::NoPermits) => Err(ServiceError::Overloaded),
        }
    }

    /// Requests currently holding a guard
    pub fn in_flight(&self) -> usize {
        (MAX_IN_FLIGHT as usize).saturating_sub(self.permits.available_permits())
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Refuse new requests, wait for in-flight ones, then wait out the grace period.
    ///
    /// Calling it again after the first shutdown completed returns at once.
    pub async fn shutdown(&self) {
        if self.closing.swap(true, Ordering::SeqCst) && self.permits.is_closed() {
            return;
        }
        tracing::info!(in_flight = self.in_flight(), "shutting down, waiting for in-flight requests");

        match self.permits.acquire_many(MAX_IN_FLIGHT).await {
            Ok(all) => {
                tracing::info!(grace_ms = self.grace.as_millis() as u64, "all requests finished");
                tokio::time::sleep(self.grace).await;
                self.permits.close();
                drop(all);
            }
            // Another shutdown already closed the semaphore
            Err(_) => {}
        }
        tracing::info!("shutdown complete");
    }
}

impl Default for LifeManager {
    fn default() -> Self {
        Self::new(DEFAULT_SHUTDOWN_GRACE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_guards_count_in_flight_requests() {
        let manager = LifeManager::default();
        assert_eq!(manager.in_flight(), 0);

        let first = manager.enter().unwrap();
        let second = manager.enter().unwrap();
        assert_eq!(manager.in_flight(), 2);

        drop(first);
        assert_eq!(manager.in_flight(), 1);
        drop(second);
        assert_eq!(manager.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_in_flight_then_grace() {
        let manager = Arc::new(LifeManager::new(Duration::from_secs(5)));
        let guard = manager.enter().unwrap();

        let start = tokio::time::Instant::now();
        let shutdown = tokio::spawn({
            let manager = manager.clone();
            async move { manager.shutdown().await }
        });

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(manager.is_closing());
        assert!(!shutdown.is_finished());
        assert!(matches!(manager.enter(), Err(ServiceError::ShuttingDown)));

        drop(guard);
        shutdown.await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_without_requests_only_waits_grace() {
        let manager = LifeManager::new(Duration::from_secs(1));
        let start = tokio::time::Instant::now();

        manager.shutdown().await;

        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(matches!(manager.enter(), Err(ServiceError::ShuttingDown)));

        // A second call does not wait again
        let again = tokio::time::Instant::now();
        manager.shutdown().await;
        assert_eq!(again.elapsed(), Duration::ZERO);
    }
}
