//! Observable notifications.

use lottery_types::{
    Amount, LotteryConfig, Outcome, ParticipantId, PayoutOrder, RandomnessRequestId, RoundId,
};
use serde::{Deserialize, Serialize};

use crate::PayoutError;

/// Notifications published to subscribers.
///
/// The runner hands these to its subscribers; the state machine emits them
/// via `Action::Notify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notification {
    // ═══════════════════════════════════════════════════════════════════════
    // Round lifecycle
    // ═══════════════════════════════════════════════════════════════════════
    /// A new round accepts entries.
    RoundOpened {
        /// The new round.
        round: RoundId,
        /// Parameters it runs with.
        config: LotteryConfig,
    },

    /// An entry was accepted.
    PlayerEntered {
        /// The live round.
        round: RoundId,
        /// Who entered.
        participant: ParticipantId,
        /// Slots taken after this entry.
        entrants: u32,
    },

    /// Entry closed.
    RoundClosed {
        /// The closed round.
        round: RoundId,
        /// Final entrant count.
        entrants: u32,
        /// Final pot.
        pot: Amount,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Settlement
    // ═══════════════════════════════════════════════════════════════════════
    /// Randomness was requested for a closed round.
    WinnerRequested {
        /// The round.
        round: RoundId,
        /// The issued request.
        request: RandomnessRequestId,
    },

    /// A winner was paid and recorded.
    WinnerSettled {
        /// The recorded outcome.
        outcome: Outcome,
    },

    /// A randomness request was force-failed; the round is closed again.
    RandomnessExpired {
        /// The round.
        round: RoundId,
        /// The failed request.
        request: RandomnessRequestId,
    },

    /// A payout attempt failed; the round remains settleable.
    PayoutFailed {
        /// The order that failed.
        order: PayoutOrder,
        /// Why.
        error: PayoutError,
    },
}

impl Notification {
    /// Get a human-readable name for this notification type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Notification::RoundOpened { .. } => "RoundOpened",
            Notification::PlayerEntered { .. } => "PlayerEntered",
            Notification::RoundClosed { .. } => "RoundClosed",
            Notification::WinnerRequested { .. } => "WinnerRequested",
            Notification::WinnerSettled { .. } => "WinnerSettled",
            Notification::RandomnessExpired { .. } => "RandomnessExpired",
            Notification::PayoutFailed { .. } => "PayoutFailed",
        }
    }

    /// Round the notification is about.
    pub fn round(&self) -> RoundId {
        match self {
            Notification::RoundOpened { round, .. }
            | Notification::PlayerEntered { round, .. }
            | Notification::RoundClosed { round, .. }
            | Notification::WinnerRequested { round, .. }
            | Notification::RandomnessExpired { round, .. } => *round,
            Notification::WinnerSettled { outcome } => outcome.round,
            Notification::PayoutFailed { order, .. } => order.round,
        }
    }

    /// Check if this notification concerns settlement.
    pub fn is_settlement(&self) -> bool {
        matches!(
            self,
            Notification::WinnerRequested { .. }
                | Notification::WinnerSettled { .. }
                | Notification::RandomnessExpired { .. }
                | Notification::PayoutFailed { .. }
        )
    }
}
