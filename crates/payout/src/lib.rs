//! Prize payout.
//!
//! A [`PayoutExecutor`] moves a round's pot to its winner. Executors are
//! atomic from the caller's point of view: either a [`Receipt`] comes back
//! and the funds moved, or a typed [`PayoutError`] comes back and nothing
//! moved.
//!
//! [`GuardedPayout`] wraps any executor with the two protections the
//! coordinator relies on:
//!
//! - **Single-flight per round**: a second `pay` for a round whose payout is
//!   still executing fails with `AlreadyInFlight` instead of racing it.
//! - **Transfer timeout**: a transfer that does not finish within
//!   [`PayoutConfig::transfer_timeout`] is abandoned with `TransferTimeout`.
//!
//! [`InMemoryTreasury`] is a balance-holding executor for simulation and
//! tests. It is idempotent per round, as any production executor must be.
//!
//! [`Receipt`]: lottery_types::Receipt
//! [`PayoutError`]: lottery_core::PayoutError

mod config;
mod executor;
mod guard;
mod treasury;

pub use config::PayoutConfig;
pub use executor::PayoutExecutor;
pub use guard::GuardedPayout;
pub use treasury::InMemoryTreasury;
