//! Lottery coordinator service.
//!
//! Wraps the synchronous [`LotteryStateMachine`](lottery_machine::LotteryStateMachine)
//! in a single-writer tokio actor and exposes it through [`LotteryHandle`].
//!
//! ```no_run
//! # use lottery_node::{Clock, NodeBuilder};
//! # use lottery_payout::{GuardedPayout, InMemoryTreasury, PayoutConfig};
//! # use lottery_randomness::{LocalOracle, RandomnessClient};
//! # use lottery_types::{Amount, KeyPair, LotteryConfig, ParticipantId};
//! # use std::sync::Arc;
//! # async fn demo() -> Result<(), lottery_core::LotteryError> {
//! let (oracle, fulfillments) = LocalOracle::new(KeyPair::generate(), 7);
//! let key = oracle.public_key();
//! let payout = GuardedPayout::new(InMemoryTreasury::new(Amount(1_000)), PayoutConfig::default());
//!
//! let (lottery, _task) = NodeBuilder::new(ParticipantId::new("owner"), LotteryConfig::default())
//!     .spawn(RandomnessClient::new(Arc::new(oracle), key), Arc::new(payout))?;
//! lottery.forward_fulfillments(fulfillments);
//!
//! lottery.enter(ParticipantId::new("alice"), Amount(10)).await?;
//! # Ok(())
//! # }
//! ```

mod clock;
mod config;
mod handle;
mod runner;
mod store;
mod subscribers;

pub use clock::Clock;
pub use config::{
    ConfigError, LotterySection, OracleSection, PayoutSection, ServiceConfig, SimulationSection,
    StorageSection,
};
pub use handle::LotteryHandle;
pub use runner::NodeBuilder;
pub use store::{FileStore, MemoryStore, RoundStore, StoreError};
