//! Randomness oracle client.
//!
//! Randomness follows a request/fulfill contract:
//!
//! ```text
//! state machine ── Action::RequestRandomness ──► RandomnessClient::issue
//!                                                    │
//!                                                    ▼
//!                                          RandomnessOracle::request
//!                                           (fire-and-forget)
//!                                                    │
//!                                                   ...
//!                                                    ▼
//! state machine ◄── settle(request, value) ── RandomnessClient::verify
//!                                          ◄── oracle delivers Fulfillment
//! ```
//!
//! Verification checks the oracle's Ed25519 proof before anything reaches
//! the state machine. Stale or replayed fulfillments that carry a valid
//! proof are rejected later, by the state machine's pending-request check.

mod client;
mod local;
mod oracle;

pub use client::{Fulfillment, RandomnessClient};
pub use local::{LocalOracle, RecordingOracle};
pub use oracle::{OracleError, RandomnessOracle};
