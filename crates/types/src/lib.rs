//! Core data model for the lottery coordinator.
//!
//! Everything here is plain data: identifiers, the live [`Round`], the
//! [`RandomnessRequest`] issued for it, the immutable [`Outcome`] recorded on
//! settlement, and the [`LotterySnapshot`] persisted between restarts.
//! Behaviour lives in the state machine crates.

mod config;
mod crypto;
mod hash;
mod identifiers;
mod outcome;
mod randomness;
mod round;
mod snapshot;

pub use config::{LotteryConfig, WinnerPolicy};
pub use crypto::{KeyPair, PublicKey, Signature, SignatureError};
pub use hash::{Hash, HexError};
pub use identifiers::{Amount, ParticipantId, RandomnessRequestId, RoundId};
pub use outcome::{Outcome, PayoutOrder, Receipt};
pub use randomness::{RandomValue, RandomnessRequest, RequestStatus};
pub use round::{Entrant, Round, RoundPhase};
pub use snapshot::LotterySnapshot;
