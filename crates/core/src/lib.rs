//! Core types for the lottery coordinator.
//!
//! The coordinator is split into a synchronous state machine and an async
//! runner. This crate holds the vocabulary they share:
//!
//! - [`Event`]: asynchronous inputs (timers, payout results, oracle failures)
//! - [`Action`]: I/O the runner performs on the state machine's behalf
//! - [`Notification`]: observable events for subscribers
//! - [`LotteryError`]: the error taxonomy every operation reports through

mod action;
mod error;
mod event;
mod notification;
mod traits;

pub use action::{Action, TimerId};
pub use error::{ErrorKind, LotteryError, PayoutError};
pub use event::Event;
pub use notification::Notification;
pub use traits::StateMachine;
