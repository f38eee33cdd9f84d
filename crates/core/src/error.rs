//! Error taxonomy.

use lottery_types::{Amount, ParticipantId, RandomnessRequestId, RoundId, RoundPhase};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad class of a failure, telling callers how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Operation invalid in the current phase. Try later.
    Phase,
    /// Bad amount, caller or configuration. Fix the input.
    Validation,
    /// Payout, oracle or storage failure. Retryable by the operator.
    Resource,
    /// Unknown or duplicate request/round. Signals a bug or a replay and is
    /// escalated, never retried.
    Consistency,
}

/// Typed payout failure. Nothing moved when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PayoutError {
    /// The treasury cannot cover the amount.
    #[error("Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds {
        /// Amount requested.
        needed: Amount,
        /// Amount available.
        available: Amount,
    },

    /// The recipient refused or cannot receive the transfer.
    #[error("Recipient {0} rejected the transfer")]
    RecipientRejected(ParticipantId),

    /// The transfer did not complete in time and was abandoned.
    #[error("Transfer timed out")]
    TransferTimeout,

    /// A payout for the same round is already executing.
    #[error("Payout for {0} already in flight")]
    AlreadyInFlight(RoundId),

    /// The round was already paid under a different recipient or amount.
    #[error("{0} was already paid under a different order")]
    ConflictingPayout(RoundId),
}

/// Errors returned by lottery operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LotteryError {
    // ═══════════════════════════════════════════════════════════════════════
    // Phase
    // ═══════════════════════════════════════════════════════════════════════
    /// Operation not valid in the current phase.
    #[error("Wrong phase: expected {expected}, round is {actual}")]
    WrongPhase {
        /// Phase the operation requires.
        expected: RoundPhase,
        /// Phase the round is in.
        actual: RoundPhase,
    },

    /// The round has no free slots.
    #[error("Round full at {max_entrants} entrants")]
    RoundFull {
        /// Capacity of the round.
        max_entrants: u32,
    },

    /// Configuration can only change while the round is open and empty.
    #[error("Configuration locked while {round} is in progress")]
    ConfigLocked {
        /// The live round.
        round: RoundId,
    },

    /// A payout for the round is executing.
    #[error("Settlement of {round} already in progress")]
    SettlementInProgress {
        /// The round being settled.
        round: RoundId,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Validation
    // ═══════════════════════════════════════════════════════════════════════
    /// Paid amount differs from the ticket price.
    #[error("Bad payment: ticket costs {expected}, paid {paid}")]
    BadPayment {
        /// Ticket price.
        expected: Amount,
        /// Amount offered.
        paid: Amount,
    },

    /// Caller lacks permission.
    #[error("Unauthorized caller {caller}")]
    Unauthorized {
        /// The rejected caller.
        caller: ParticipantId,
    },

    /// Proposed configuration is unusable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ═══════════════════════════════════════════════════════════════════════
    // Resource
    // ═══════════════════════════════════════════════════════════════════════
    /// Payout executor failed; the round stays settleable.
    #[error("Payout failed: {0}")]
    Payout(#[from] PayoutError),

    /// Randomness proof missing or invalid.
    #[error("Bad randomness for {request}: {reason}")]
    BadRandomness {
        /// Request the fulfillment claimed.
        request: RandomnessRequestId,
        /// Why it was dropped.
        reason: String,
    },

    /// The randomness oracle could not be reached.
    #[error("Oracle error: {0}")]
    Oracle(String),

    /// Persisting or loading state failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The coordinator is no longer running.
    #[error("Lottery service stopped")]
    ServiceStopped,

    // ═══════════════════════════════════════════════════════════════════════
    // Consistency
    // ═══════════════════════════════════════════════════════════════════════
    /// Request id is not the pending request of the live round.
    #[error("Unknown randomness request {request}")]
    UnknownRequest {
        /// The unrecognised request.
        request: RandomnessRequestId,
    },

    /// An outcome for the round is already recorded.
    #[error("Outcome for {round} already recorded")]
    DuplicateRound {
        /// The duplicated round.
        round: RoundId,
    },
}

impl LotteryError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LotteryError::WrongPhase { .. }
            | LotteryError::RoundFull { .. }
            | LotteryError::ConfigLocked { .. }
            | LotteryError::SettlementInProgress { .. } => ErrorKind::Phase,
            LotteryError::BadPayment { .. }
            | LotteryError::Unauthorized { .. }
            | LotteryError::InvalidConfig(_) => ErrorKind::Validation,
            LotteryError::Payout(_)
            | LotteryError::BadRandomness { .. }
            | LotteryError::Oracle(_)
            | LotteryError::Storage(_)
            | LotteryError::ServiceStopped => ErrorKind::Resource,
            LotteryError::UnknownRequest { .. } | LotteryError::DuplicateRound { .. } => {
                ErrorKind::Consistency
            }
        }
    }

    /// Whether this error should be escalated to operators.
    pub fn is_consistency_violation(&self) -> bool {
        self.kind() == ErrorKind::Consistency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let wrong_phase = LotteryError::WrongPhase {
            expected: RoundPhase::Open,
            actual: RoundPhase::Closed,
        };
        assert_eq!(wrong_phase.kind(), ErrorKind::Phase);

        let bad_payment = LotteryError::BadPayment {
            expected: Amount(10),
            paid: Amount(9),
        };
        assert_eq!(bad_payment.kind(), ErrorKind::Validation);

        let payout: LotteryError = PayoutError::TransferTimeout.into();
        assert_eq!(payout.kind(), ErrorKind::Resource);

        let unknown = LotteryError::UnknownRequest {
            request: RandomnessRequestId(4),
        };
        assert_eq!(unknown.kind(), ErrorKind::Consistency);
        assert!(unknown.is_consistency_violation());
    }

    #[test]
    fn test_error_messages_name_the_problem() {
        let err = LotteryError::RoundFull { max_entrants: 3 };
        assert_eq!(err.to_string(), "Round full at 3 entrants");

        let err = LotteryError::UnknownRequest {
            request: RandomnessRequestId(9),
        };
        assert_eq!(err.to_string(), "Unknown randomness request rand-9");
    }
}
