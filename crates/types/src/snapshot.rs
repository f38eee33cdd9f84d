//! Persisted state of the coordinator.

use crate::{LotteryConfig, Outcome, ParticipantId, PayoutOrder, RandomnessRequest, Round};
use serde::{Deserialize, Serialize};

/// Everything needed to rebuild the coordinator after a restart.
///
/// Written after every mutating transition; the `version` counter increases
/// by one each time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotterySnapshot {
    /// Monotonic version stamp of the aggregate.
    pub version: u64,
    /// Owner allowed to perform admin operations.
    pub owner: ParticipantId,
    /// Active configuration.
    pub config: LotteryConfig,
    /// The live round.
    pub round: Round,
    /// Randomness request of the live round, if any.
    pub pending_request: Option<RandomnessRequest>,
    /// Whether a fulfillment for the pending request has been accepted.
    /// Once set, the request timeout no longer applies.
    pub settlement_attempted: bool,
    /// Payout handed to the executor and not yet acknowledged.
    pub payout_in_flight: Option<PayoutOrder>,
    /// Next randomness request id to allocate.
    pub next_request_id: u64,
    /// Settled rounds, in ascending round order.
    pub history: Vec<Outcome>,
}
