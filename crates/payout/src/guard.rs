//! Single-flight and timeout guard around a payout executor.

use crate::{PayoutConfig, PayoutExecutor};
use async_trait::async_trait;
use lottery_core::PayoutError;
use lottery_types::{Amount, ParticipantId, PayoutOrder, Receipt, RoundId};
use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Wraps an executor with per-round single-flight and a transfer timeout.
pub struct GuardedPayout<P> {
    inner: P,
    config: PayoutConfig,
    /// Rounds whose payout is currently executing.
    in_flight: Mutex<HashSet<RoundId>>,
}

impl<P: PayoutExecutor> GuardedPayout<P> {
    /// Wrap `inner` with the given configuration.
    pub fn new(inner: P, config: PayoutConfig) -> Self {
        Self {
            inner,
            config,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Get the wrapped executor.
    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Whether a payout for `round` is executing.
    pub fn is_in_flight(&self, round: RoundId) -> bool {
        self.in_flight.lock().contains(&round)
    }
}

/// Releases the round's single-flight slot on drop, including when the
/// payout future is cancelled.
struct InFlightSlot<'a> {
    in_flight: &'a Mutex<HashSet<RoundId>>,
    round: RoundId,
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.round);
    }
}

#[async_trait]
impl<P: PayoutExecutor> PayoutExecutor for GuardedPayout<P> {
    fn collect(&self, round: RoundId, payer: &ParticipantId, amount: Amount) {
        self.inner.collect(round, payer, amount)
    }

    async fn pay(&self, order: &PayoutOrder) -> Result<Receipt, PayoutError> {
        if !self.in_flight.lock().insert(order.round) {
            warn!(round = order.round.0, "Rejecting reentrant payout");
            return Err(PayoutError::AlreadyInFlight(order.round));
        }
        let _slot = InFlightSlot {
            in_flight: &self.in_flight,
            round: order.round,
        };

        debug!(
            round = order.round.0,
            recipient = %order.recipient,
            amount = order.amount.0,
            "Executing payout"
        );

        match tokio::time::timeout(self.config.transfer_timeout, self.inner.pay(order)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    round = order.round.0,
                    timeout = ?self.config.transfer_timeout,
                    "Payout transfer timed out"
                );
                Err(PayoutError::TransferTimeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryTreasury;
    use lottery_types::{RandomValue, RandomnessRequestId};
    use std::sync::Arc;
    use std::time::Duration;
    use tracing_test::traced_test;

    fn order(round: u64) -> PayoutOrder {
        PayoutOrder {
            round: RoundId(round),
            recipient: ParticipantId::new("winner"),
            amount: Amount(30),
            request: RandomnessRequestId(1),
            random_value: RandomValue::from_u64(7),
            winner_index: 1,
        }
    }

    #[traced_test]
    #[tokio::test(start_paused = true)]
    async fn test_reentrant_payout_rejected() {
        let treasury = Arc::new(InMemoryTreasury::new(Amount(100)).with_latency(Duration::from_secs(1)));
        let guard = Arc::new(GuardedPayout::new(treasury.clone(), PayoutConfig::default()));

        let first = {
            let guard = guard.clone();
            tokio::spawn(async move { guard.pay(&order(0)).await })
        };
        tokio::task::yield_now().await;
        assert!(guard.is_in_flight(RoundId(0)));

        let second = guard.pay(&order(0)).await;
        assert_eq!(second, Err(PayoutError::AlreadyInFlight(RoundId(0))));

        let receipt = first.await.unwrap().unwrap();
        assert_eq!(receipt.amount, Amount(30));
        assert!(!guard.is_in_flight(RoundId(0)));
        assert_eq!(treasury.balance(), Amount(70));
    }

    #[traced_test]
    #[tokio::test(start_paused = true)]
    async fn test_different_rounds_do_not_block_each_other() {
        let treasury = Arc::new(InMemoryTreasury::new(Amount(100)).with_latency(Duration::from_secs(1)));
        let guard = Arc::new(GuardedPayout::new(treasury, PayoutConfig::default()));

        let a = {
            let guard = guard.clone();
            tokio::spawn(async move { guard.pay(&order(0)).await })
        };
        let b = {
            let guard = guard.clone();
            tokio::spawn(async move { guard.pay(&order(1)).await })
        };

        assert!(a.await.unwrap().is_ok());
        assert!(b.await.unwrap().is_ok());
    }

    #[traced_test]
    #[tokio::test(start_paused = true)]
    async fn test_slow_transfer_times_out_without_moving_funds() {
        let treasury = Arc::new(InMemoryTreasury::new(Amount(100)).with_latency(Duration::from_secs(60)));
        let guard = GuardedPayout::new(
            treasury.clone(),
            PayoutConfig::with_transfer_timeout(Duration::from_secs(5)),
        );

        assert_eq!(guard.pay(&order(0)).await, Err(PayoutError::TransferTimeout));
        assert!(!guard.is_in_flight(RoundId(0)));
        assert_eq!(treasury.balance(), Amount(100));
        assert!(treasury.receipt(RoundId(0)).is_none());
    }
}
