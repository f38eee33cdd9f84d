//! In-process oracles for simulation and tests.

use crate::{Fulfillment, OracleError, RandomnessOracle};
use async_trait::async_trait;
use lottery_types::{KeyPair, PublicKey, RandomValue, RandomnessRequest, RandomnessRequestId};
use parking_lot::Mutex;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A signing oracle that fulfills every request itself.
///
/// Values come from a seeded ChaCha20 stream, so a simulation with the same
/// seed draws the same winners. Fulfillments are delivered on a channel after
/// an optional delay, mimicking an external callback.
pub struct LocalOracle {
    keypair: KeyPair,
    rng: Mutex<ChaCha20Rng>,
    delay: Duration,
    deliver: mpsc::UnboundedSender<Fulfillment>,
}

impl LocalOracle {
    /// Create an oracle and the receiver its fulfillments arrive on.
    pub fn new(keypair: KeyPair, seed: u64) -> (Self, mpsc::UnboundedReceiver<Fulfillment>) {
        let (deliver, fulfillments) = mpsc::unbounded_channel();
        let oracle = Self {
            keypair,
            rng: Mutex::new(ChaCha20Rng::seed_from_u64(seed)),
            delay: Duration::ZERO,
            deliver,
        };
        (oracle, fulfillments)
    }

    /// Delay every fulfillment by `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Key fulfillments are signed with.
    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    /// Build a signed fulfillment for an arbitrary value.
    pub fn sign(&self, request: RandomnessRequestId, value: RandomValue) -> Fulfillment {
        let digest = RandomnessRequest::proof_digest(request, &value);
        Fulfillment {
            request,
            value,
            proof: Some(self.keypair.sign(digest.as_bytes())),
        }
    }

    fn draw(&self) -> RandomValue {
        let mut bytes = [0u8; 32];
        self.rng.lock().fill_bytes(&mut bytes);
        RandomValue::from_bytes(bytes)
    }
}

#[async_trait]
impl RandomnessOracle for LocalOracle {
    async fn request(&self, request: &RandomnessRequest) -> Result<(), OracleError> {
        let fulfillment = self.sign(request.id, self.draw());
        let deliver = self.deliver.clone();
        let delay = self.delay;

        debug!(request = request.id.0, delay = ?delay, "Local oracle scheduled fulfillment");

        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if deliver.send(fulfillment).is_err() {
                warn!("Fulfillment receiver dropped");
            }
        });
        Ok(())
    }
}

/// An oracle that only records what it was asked for.
///
/// Tests deliver fulfillments by hand, which lets them choose the random
/// value, delay it past a timeout, or replay it.
#[derive(Debug, Default)]
pub struct RecordingOracle {
    requests: Mutex<Vec<RandomnessRequest>>,
    failing: Mutex<bool>,
}

impl RecordingOracle {
    /// Create a new recording oracle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent requests fail (or succeed again).
    pub fn fail_requests(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<RandomnessRequest> {
        self.requests.lock().clone()
    }

    /// Most recent request.
    pub fn last_request(&self) -> Option<RandomnessRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl RandomnessOracle for RecordingOracle {
    async fn request(&self, request: &RandomnessRequest) -> Result<(), OracleError> {
        if *self.failing.lock() {
            return Err(OracleError::Unavailable("oracle offline".to_string()));
        }
        self.requests.lock().push(request.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RandomnessClient;
    use lottery_types::RoundId;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_local_oracle_delivers_verifiable_fulfillment() {
        let (oracle, mut fulfillments) = LocalOracle::new(KeyPair::from_seed(&[9u8; 32]), 42);
        let oracle = Arc::new(oracle.with_delay(Duration::from_secs(2)));
        let client = RandomnessClient::new(oracle.clone(), oracle.public_key());

        let request = RandomnessRequest::new(RandomnessRequestId(5), RoundId(0), Duration::ZERO);
        client.issue(&request).await.unwrap();

        let fulfillment = fulfillments.recv().await.unwrap();
        assert_eq!(fulfillment.request, RandomnessRequestId(5));
        assert!(client.verify(fulfillment).is_ok());
    }

    #[tokio::test]
    async fn test_same_seed_draws_same_values() {
        let (a, mut rx_a) = LocalOracle::new(KeyPair::from_seed(&[1u8; 32]), 7);
        let (b, mut rx_b) = LocalOracle::new(KeyPair::from_seed(&[1u8; 32]), 7);
        let request = RandomnessRequest::new(RandomnessRequestId(1), RoundId(0), Duration::ZERO);

        a.request(&request).await.unwrap();
        b.request(&request).await.unwrap();

        assert_eq!(rx_a.recv().await.unwrap(), rx_b.recv().await.unwrap());
    }
}
