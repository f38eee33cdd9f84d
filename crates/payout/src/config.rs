//! Payout configuration.

use std::time::Duration;

/// Configuration for payout execution.
#[derive(Debug, Clone)]
pub struct PayoutConfig {
    /// How long a single transfer may take before it is abandoned.
    pub transfer_timeout: Duration,
}

impl Default for PayoutConfig {
    fn default() -> Self {
        Self {
            transfer_timeout: Duration::from_secs(30),
        }
    }
}

impl PayoutConfig {
    /// Create a config with a custom transfer timeout.
    pub fn with_transfer_timeout(transfer_timeout: Duration) -> Self {
        Self { transfer_timeout }
    }
}
