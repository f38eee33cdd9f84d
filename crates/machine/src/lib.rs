//! Lottery round state machine.
//!
//! This crate provides the synchronous, deterministic core of the lottery
//! coordinator. It performs no I/O; every side effect is returned as an
//! [`Action`](lottery_core::Action) for the runner to execute.
//!
//! # Architecture
//!
//! ```text
//! enter ──► Open ──(capacity | deadline)──► Closed
//!                                             │
//!                                    request_winner
//!                                             ▼
//!                                    CalculatingWinner ──(timeout)──► Closed
//!                                             │
//!                                   settle(request, value)
//!                                             ▼
//!                                Action::ExecutePayout (outside the lock)
//!                                             │
//!                   PayoutFailed ◄────────────┴────────────► PayoutCompleted
//!             (stay CalculatingWinner,                     (record outcome,
//!               settle again)                               next round Open)
//! ```
//!
//! The [`AdminGateway`] owns the configuration and validates every change
//! against the live round.

mod admin;
mod selection;
mod state;

pub use admin::AdminGateway;
pub use selection::winner_index;
pub use state::{EntryReceipt, LotteryStateMachine, RoundView, SettleStep};
