// ABOUTME: Seam to the upstream reverse proxy's route cache.
// ABOUTME: Invalidation is synchronous so the next request re-resolves.

use crate::types::Domain;
use async_trait::async_trait;

/// Drops the proxy's cached target for a domain.
///
/// The call must not return before the proxy's next request for `domain` is
/// guaranteed to re-resolve. The deploy pipeline invokes this between the
/// tracking swap and stopping the old container.
#[async_trait]
pub trait ProxyCacheInvalidator: Send + Sync {
    async fn invalidate_target(&self, domain: &Domain);
}
