//! Actions the runner performs for the state machine.

use crate::{LotteryError, Notification};
use lottery_types::{
    Amount, LotterySnapshot, Outcome, ParticipantId, PayoutOrder, RandomnessRequest,
    RandomnessRequestId, RoundId,
};
use std::time::Duration;

/// Timer identifiers.
///
/// Each timer names the round or request it guards, so a timer that fires
/// after its subject has moved on is recognised as stale and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// Entry deadline of a round.
    RoundClose(RoundId),
    /// Fulfillment deadline of a randomness request.
    RandomnessTimeout(RandomnessRequestId),
}

/// I/O requested by the state machine.
#[derive(Debug, Clone)]
pub enum Action {
    /// Deliver `Event::TimerFired(id)` after `duration`.
    SetTimer {
        /// Timer to fire.
        id: TimerId,
        /// Delay from now.
        duration: Duration,
    },

    /// Issue a randomness request to the oracle (fire-and-forget).
    RequestRandomness {
        /// The request to issue.
        request: RandomnessRequest,
    },

    /// Credit an accepted ticket payment to the funds prizes are paid from.
    CollectPayment {
        /// Round the ticket was bought for.
        round: RoundId,
        /// Who paid.
        payer: ParticipantId,
        /// Amount paid.
        amount: Amount,
    },

    /// Execute a payout outside the exclusion domain and report back with
    /// `Event::PayoutCompleted` or `Event::PayoutFailed`.
    ExecutePayout {
        /// The transfer to perform.
        order: PayoutOrder,
    },

    /// Publish a notification to subscribers.
    Notify(Notification),

    /// Write the aggregate to durable storage.
    Persist {
        /// State to write.
        snapshot: Box<LotterySnapshot>,
    },

    /// Answer the caller waiting on the settlement of `round`.
    EmitSettlementResult {
        /// Round whose settlement finished.
        round: RoundId,
        /// Recorded outcome, or why the attempt failed.
        result: Result<Outcome, LotteryError>,
    },
}

impl Action {
    /// Get a human-readable name for this action type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::SetTimer { .. } => "SetTimer",
            Action::RequestRandomness { .. } => "RequestRandomness",
            Action::CollectPayment { .. } => "CollectPayment",
            Action::ExecutePayout { .. } => "ExecutePayout",
            Action::Notify(_) => "Notify",
            Action::Persist { .. } => "Persist",
            Action::EmitSettlementResult { .. } => "EmitSettlementResult",
        }
    }
}
