//! Oracle trait.

use async_trait::async_trait;
use lottery_types::RandomnessRequest;
use std::sync::Arc;
use thiserror::Error;

/// Errors issuing a request to the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    /// The oracle could not be reached.
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),

    /// The oracle refused the request.
    #[error("Oracle rejected request: {0}")]
    Rejected(String),
}

/// An external source of verifiable randomness.
///
/// `request` only issues the request; the value arrives later through the
/// oracle's own delivery mechanism as a
/// [`Fulfillment`](crate::Fulfillment). Requests cannot be cancelled.
#[async_trait]
pub trait RandomnessOracle: Send + Sync {
    /// Issue a randomness request.
    async fn request(&self, request: &RandomnessRequest) -> Result<(), OracleError>;
}

#[async_trait]
impl<T: RandomnessOracle + ?Sized> RandomnessOracle for Arc<T> {
    async fn request(&self, request: &RandomnessRequest) -> Result<(), OracleError> {
        (**self).request(request).await
    }
}
