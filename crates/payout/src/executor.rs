//! Payout executor trait.

use async_trait::async_trait;
use lottery_core::PayoutError;
use lottery_types::{Amount, ParticipantId, PayoutOrder, Receipt, RoundId};
use std::sync::Arc;

/// Moves funds to a round's winner.
///
/// Implementations must treat `order.round` as an idempotency key: paying an
/// already paid round returns the original receipt without moving funds
/// again. The coordinator re-drives in-flight payouts after a restart and
/// relies on this to never double-pay. An order for a paid round whose
/// recipient or amount differs from the recorded transfer must fail with
/// [`PayoutError::ConflictingPayout`].
///
/// Ticket payments flow the other way through [`collect`], so every pot the
/// coordinator pays out was first credited here.
///
/// [`collect`]: PayoutExecutor::collect
#[async_trait]
pub trait PayoutExecutor: Send + Sync {
    /// Credit an accepted ticket payment.
    ///
    /// Called once per accepted entry, after the entry is durable and
    /// before any payout for `round` can be staged.
    fn collect(&self, round: RoundId, payer: &ParticipantId, amount: Amount);

    /// Transfer `order.amount` to `order.recipient`.
    async fn pay(&self, order: &PayoutOrder) -> Result<Receipt, PayoutError>;
}

#[async_trait]
impl<T: PayoutExecutor + ?Sized> PayoutExecutor for Arc<T> {
    fn collect(&self, round: RoundId, payer: &ParticipantId, amount: Amount) {
        (**self).collect(round, payer, amount)
    }

    async fn pay(&self, order: &PayoutOrder) -> Result<Receipt, PayoutError> {
        (**self).pay(order).await
    }
}
