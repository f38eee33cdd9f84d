//! Asynchronous inputs to the state machine.

use crate::{PayoutError, TimerId};
use lottery_types::{PayoutOrder, RandomnessRequestId, Receipt};

/// Events delivered to the state machine's inbox by the runner.
///
/// Client commands (enter, request winner, settle, admin updates) are direct
/// method calls; events cover everything that arrives on its own schedule.
#[derive(Debug, Clone)]
pub enum Event {
    /// A timer set via `Action::SetTimer` fired.
    TimerFired(TimerId),

    /// The payout executor moved the funds.
    PayoutCompleted {
        /// The order that was executed.
        order: PayoutOrder,
        /// Executor receipt.
        receipt: Receipt,
    },

    /// The payout executor failed without moving funds.
    PayoutFailed {
        /// The order that failed.
        order: PayoutOrder,
        /// Why it failed.
        error: PayoutError,
    },

    /// The oracle refused to accept a randomness request.
    RandomnessRequestFailed {
        /// The rejected request.
        request: RandomnessRequestId,
        /// Oracle-provided reason.
        reason: String,
    },
}

impl Event {
    /// Get a human-readable name for this event type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::TimerFired(_) => "TimerFired",
            Event::PayoutCompleted { .. } => "PayoutCompleted",
            Event::PayoutFailed { .. } => "PayoutFailed",
            Event::RandomnessRequestFailed { .. } => "RandomnessRequestFailed",
        }
    }
}
