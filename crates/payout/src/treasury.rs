//! In-memory treasury.

use crate::PayoutExecutor;
use async_trait::async_trait;
use lottery_core::PayoutError;
use lottery_types::{Amount, ParticipantId, PayoutOrder, Receipt, RoundId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct TreasuryState {
    /// Funds held for prizes.
    balance: Amount,
    /// Ticket payments collected, per round.
    collected: HashMap<RoundId, Amount>,
    /// Funds paid out, per recipient.
    accounts: HashMap<ParticipantId, Amount>,
    /// Receipts per paid round.
    paid: HashMap<RoundId, Receipt>,
    /// Recipients that refuse transfers.
    rejecting: HashSet<ParticipantId>,
    /// Next transfer reference.
    next_reference: u64,
}

/// A payout executor backed by an in-memory balance.
///
/// Collected ticket payments are added to the balance, so a settled round
/// returns the balance to where it stood before the round opened. The
/// transfer itself happens under one lock, so a payout either completes
/// fully or leaves every balance untouched. An optional latency is awaited
/// before the lock is taken, which lets tests exercise timeouts and
/// reentrancy.
#[derive(Debug, Default)]
pub struct InMemoryTreasury {
    state: Mutex<TreasuryState>,
    latency: Duration,
}

impl InMemoryTreasury {
    /// Create a treasury holding `balance`.
    pub fn new(balance: Amount) -> Self {
        Self {
            state: Mutex::new(TreasuryState {
                balance,
                ..Default::default()
            }),
            latency: Duration::ZERO,
        }
    }

    /// Delay every transfer by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Add operator funds.
    pub fn deposit(&self, amount: Amount) {
        let mut state = self.state.lock();
        state.balance = state.balance.saturating_add(amount);
    }

    /// Take operator funds out of the balance.
    pub fn withdraw(&self, amount: Amount) -> Result<(), PayoutError> {
        let mut state = self.state.lock();
        let remaining = state
            .balance
            .checked_sub(amount)
            .ok_or(PayoutError::InsufficientFunds {
                needed: amount,
                available: state.balance,
            })?;
        state.balance = remaining;
        info!(amount = amount.0, balance = remaining.0, "Operator withdrawal");
        Ok(())
    }

    /// Make `recipient` refuse transfers.
    pub fn reject_recipient(&self, recipient: ParticipantId) {
        self.state.lock().rejecting.insert(recipient);
    }

    /// Let `recipient` receive transfers again.
    pub fn accept_recipient(&self, recipient: &ParticipantId) {
        self.state.lock().rejecting.remove(recipient);
    }

    /// Funds held for prizes.
    pub fn balance(&self) -> Amount {
        self.state.lock().balance
    }

    /// Total paid out to `recipient`.
    pub fn balance_of(&self, recipient: &ParticipantId) -> Amount {
        self.state
            .lock()
            .accounts
            .get(recipient)
            .copied()
            .unwrap_or_default()
    }

    /// Receipt of a paid round.
    pub fn receipt(&self, round: RoundId) -> Option<Receipt> {
        self.state.lock().paid.get(&round).cloned()
    }

    /// Ticket payments collected for `round`.
    pub fn collected(&self, round: RoundId) -> Amount {
        self.state
            .lock()
            .collected
            .get(&round)
            .copied()
            .unwrap_or_default()
    }

    /// Number of rounds paid out.
    pub fn payouts(&self) -> usize {
        self.state.lock().paid.len()
    }
}

#[async_trait]
impl PayoutExecutor for InMemoryTreasury {
    fn collect(&self, round: RoundId, payer: &ParticipantId, amount: Amount) {
        let mut state = self.state.lock();
        state.balance = state.balance.saturating_add(amount);
        let pot = state.collected.entry(round).or_default();
        *pot = pot.saturating_add(amount);
        debug!(round = round.0, payer = %payer, amount = amount.0, "Ticket payment collected");
    }

    async fn pay(&self, order: &PayoutOrder) -> Result<Receipt, PayoutError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut state = self.state.lock();

        if let Some(receipt) = state.paid.get(&order.round) {
            if receipt.recipient != order.recipient || receipt.amount != order.amount {
                warn!(
                    round = order.round.0,
                    paid_to = %receipt.recipient,
                    paid = receipt.amount.0,
                    recipient = %order.recipient,
                    amount = order.amount.0,
                    "Round already paid under a different order"
                );
                return Err(PayoutError::ConflictingPayout(order.round));
            }
            debug!(round = order.round.0, "Round already paid, returning receipt");
            return Ok(receipt.clone());
        }

        if state.rejecting.contains(&order.recipient) {
            return Err(PayoutError::RecipientRejected(order.recipient.clone()));
        }

        let remaining = state
            .balance
            .checked_sub(order.amount)
            .ok_or(PayoutError::InsufficientFunds {
                needed: order.amount,
                available: state.balance,
            })?;

        state.balance = remaining;
        let credited = state.accounts.entry(order.recipient.clone()).or_default();
        *credited = credited.saturating_add(order.amount);

        state.next_reference += 1;
        let receipt = Receipt {
            round: order.round,
            recipient: order.recipient.clone(),
            amount: order.amount,
            reference: format!("treasury-{}", state.next_reference),
        };
        state.paid.insert(order.round, receipt.clone());

        info!(
            round = order.round.0,
            recipient = %order.recipient,
            amount = order.amount.0,
            reference = %receipt.reference,
            "Prize transferred"
        );

        Ok(receipt)
    }
}
