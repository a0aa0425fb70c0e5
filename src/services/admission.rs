use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::services::compression::CompressionError;

/// Counting gate over the external tool. Shared by every executor clone and
/// every worker; the semaphore is the only cross-job synchronization point.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    permits: Arc<Semaphore>,
    capacity: usize,
    acquire_timeout: Duration,
}

/// One admission slot. Returned to the gate when dropped, on every exit path.
#[derive(Debug)]
pub struct AdmissionSlot {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionController {
    pub fn new(max_concurrent: usize, acquire_timeout: Duration) -> Self {
        let capacity = max_concurrent.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            acquire_timeout,
        }
    }

    /// Waits up to the configured timeout for a free slot.
    pub async fn acquire(&self) -> Result<AdmissionSlot, CompressionError> {
        let permit = tokio::time::timeout(
            self.acquire_timeout,
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await;

        match permit {
            Ok(Ok(permit)) => Ok(AdmissionSlot { _permit: permit }),
            Ok(Err(_closed)) => Err(CompressionError::Busy),
            Err(_elapsed) => {
                tracing::warn!(
                    "No compression slot freed within {:?} ({} in use)",
                    self.acquire_timeout,
                    self.capacity
                );
                Err(CompressionError::Busy)
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}
