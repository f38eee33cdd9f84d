//! Append-only history of settled rounds.
//!
//! The [`RoundLedger`] owns every [`Outcome`](lottery_types::Outcome) ever
//! recorded. Entries are keyed by round id and can never be replaced, which
//! makes `record` the replay barrier for settlement.

mod ledger;

pub use ledger::{History, RoundLedger};
