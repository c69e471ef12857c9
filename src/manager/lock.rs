// ABOUTME: Per-domain deploy serialization with cancellable acquisition.
// ABOUTME: Lock entries are never deleted; one slot per domain ever seen.

use crate::manager::DeployError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

/// A held deploy lock; dropping it releases the domain for the next deploy.
pub type DeployGuard = OwnedMutexGuard<()>;

/// Process-wide map of per-domain deploy locks.
///
/// Entries are deliberately never removed: a removed domain may be redeployed
/// later, and an in-flight deploy must never observe a fresh lock created
/// underneath it. The cost is one small slot per domain ever seen.
#[derive(Default)]
pub struct DomainLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl DomainLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, domain: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(
            locks
                .entry(domain.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    /// Acquire the deploy lock for a domain, or fail with the cancellation
    /// reason if `cancel` fires first.
    ///
    /// Losing the race can never leak the lock: dropping the losing
    /// acquisition future hands the slot to the next waiter, and release is
    /// tied to the guard's drop, so a double release cannot be expressed.
    pub async fn acquire(
        &self,
        domain: &str,
        cancel: &CancellationToken,
    ) -> Result<DeployGuard, DeployError> {
        if cancel.is_cancelled() {
            return Err(DeployError::cancelled(format!(
                "waiting for deploy lock on {domain}"
            )));
        }

        let lock = self.lock_for(domain);

        tokio::select! {
            guard = lock.lock_owned() => Ok(guard),
            _ = cancel.cancelled() => Err(DeployError::cancelled(format!(
                "waiting for deploy lock on {domain}"
            ))),
        }
    }

    /// Number of domains ever locked. Diagnostic only.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}
