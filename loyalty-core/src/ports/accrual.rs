//! Accrual authority port
//!
//! Defines the interface for asking the external accrual service about an
//! order. The reconciler depends only on this trait.

use async_trait::async_trait;

use crate::domain::result::Result;
use crate::domain::AccrualReport;

/// Client for the external service that awards points for orders
#[async_trait]
pub trait AccrualAuthority: Send + Sync {
    /// Fetch the authority's current view of an order.
    ///
    /// `Ok(None)` means the authority does not know the order (yet).
    /// Transient failures are `Error::AuthorityUnreachable`; throttling is
    /// `Error::RateLimited`.
    async fn order_status(&self, order_id: &str) -> Result<Option<AccrualReport>>;
}
