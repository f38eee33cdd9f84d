//! Settlement records.

use crate::{Amount, ParticipantId, RandomValue, RandomnessRequestId, RoundId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Instruction to move a round's pot to its winner.
///
/// The round id doubles as the idempotency key: an executor must never move
/// funds twice for the same round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutOrder {
    /// Round being paid out.
    pub round: RoundId,
    /// Winner receiving the pot.
    pub recipient: ParticipantId,
    /// Full pot of the round.
    pub amount: Amount,
    /// Request whose randomness selected the winner.
    pub request: RandomnessRequestId,
    /// The random value used.
    pub random_value: RandomValue,
    /// Index of the winning slot.
    pub winner_index: u32,
}

/// Proof that a transfer happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Round the transfer paid out.
    pub round: RoundId,
    /// Who received the funds.
    pub recipient: ParticipantId,
    /// How much moved.
    pub amount: Amount,
    /// Executor-assigned transfer reference.
    pub reference: String,
}

/// The settled result of a round. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// Round identifier.
    pub round: RoundId,
    /// Winning participant.
    pub winner: ParticipantId,
    /// Prize paid.
    pub prize: Amount,
    /// When the outcome was committed.
    pub settled_at: Duration,
    /// Request whose randomness decided the round.
    pub request: RandomnessRequestId,
    /// Random value used for selection.
    pub random_value: RandomValue,
    /// Index of the winning slot among the round's entrants.
    pub winner_index: u32,
    /// Transfer receipt from the payout executor.
    pub receipt: Receipt,
}

impl Outcome {
    /// Build the outcome for a completed payout.
    pub fn from_payout(order: &PayoutOrder, receipt: Receipt, settled_at: Duration) -> Self {
        Self {
            round: order.round,
            winner: order.recipient.clone(),
            prize: order.amount,
            settled_at,
            request: order.request,
            random_value: order.random_value,
            winner_index: order.winner_index,
            receipt,
        }
    }
}
