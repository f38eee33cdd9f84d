//! Lottery configuration.

use crate::Amount;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Who may trigger `request_winner` on a closed round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinnerPolicy {
    /// Anyone may request the winner once the round is closed.
    #[default]
    Permissionless,
    /// Only the lottery owner may request the winner.
    OwnerOnly,
}

/// Parameters that govern a round.
///
/// Mutable only through the admin gateway, and only while the live round is
/// open with no entrants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotteryConfig {
    /// Exact amount every entry must pay.
    pub ticket_price: Amount,

    /// Capacity of a round. Reaching it closes the round.
    pub max_entrants: u32,

    /// How long a round stays open, measured from its first entry.
    pub duration: Duration,

    /// Who may request the winner.
    pub winner_policy: WinnerPolicy,

    /// How long a randomness request may stay unfulfilled before it is
    /// force-failed and the round returns to `Closed`. `None` waits forever.
    pub request_timeout: Option<Duration>,
}

impl Default for LotteryConfig {
    fn default() -> Self {
        Self {
            ticket_price: Amount(10),
            max_entrants: 100,
            duration: Duration::from_secs(3600),
            winner_policy: WinnerPolicy::Permissionless,
            request_timeout: Some(Duration::from_secs(300)),
        }
    }
}

impl LotteryConfig {
    /// Create a config with the given price, capacity and duration.
    pub fn new(ticket_price: Amount, max_entrants: u32, duration: Duration) -> Self {
        Self {
            ticket_price,
            max_entrants,
            duration,
            ..Default::default()
        }
    }

    /// Set the winner request policy.
    pub fn with_winner_policy(mut self, winner_policy: WinnerPolicy) -> Self {
        self.winner_policy = winner_policy;
        self
    }

    /// Set the randomness request timeout.
    pub fn with_request_timeout(mut self, request_timeout: Option<Duration>) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Largest pot a round can accumulate, or `None` if it overflows.
    pub fn max_pot(&self) -> Option<Amount> {
        self.ticket_price.checked_mul(u64::from(self.max_entrants))
    }

    /// Check that the parameters describe a playable round.
    pub fn validate(&self) -> Result<(), String> {
        if self.ticket_price.is_zero() {
            return Err("ticket price must be non-zero".to_string());
        }
        if self.max_entrants == 0 {
            return Err("max entrants must be at least 1".to_string());
        }
        if self.duration.is_zero() {
            return Err("round duration must be non-zero".to_string());
        }
        if self.request_timeout.is_some_and(|t| t.is_zero()) {
            return Err("request timeout must be non-zero when set".to_string());
        }
        if self.max_pot().is_none() {
            return Err(format!(
                "pot of {} entries at {} overflows",
                self.max_entrants, self.ticket_price
            ));
        }
        Ok(())
    }
}
