//! Randomness client: issuance and proof verification.

use crate::{OracleError, RandomnessOracle};
use lottery_core::LotteryError;
use lottery_types::{PublicKey, RandomValue, RandomnessRequest, RandomnessRequestId, Signature};
use std::sync::Arc;
use tracing::{debug, warn};

/// A fulfillment delivered by the oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fulfillment {
    /// Request being fulfilled.
    pub request: RandomnessRequestId,
    /// The random value.
    pub value: RandomValue,
    /// Oracle signature over
    /// [`RandomnessRequest::proof_digest`](lottery_types::RandomnessRequest::proof_digest).
    pub proof: Option<Signature>,
}

/// Adapter between the state machine and the oracle.
///
/// Holds no round state. Only issues requests and checks proofs.
pub struct RandomnessClient {
    oracle: Arc<dyn RandomnessOracle>,
    /// Key fulfillments must be signed with. `None` trusts the oracle.
    oracle_key: Option<PublicKey>,
}

impl RandomnessClient {
    /// Create a client that requires proofs signed by `oracle_key`.
    pub fn new(oracle: Arc<dyn RandomnessOracle>, oracle_key: PublicKey) -> Self {
        Self {
            oracle,
            oracle_key: Some(oracle_key),
        }
    }

    /// Create a client for an oracle that provides no proofs.
    pub fn trusted(oracle: Arc<dyn RandomnessOracle>) -> Self {
        Self {
            oracle,
            oracle_key: None,
        }
    }

    /// Whether fulfillments must carry a valid proof.
    pub fn requires_proof(&self) -> bool {
        self.oracle_key.is_some()
    }

    /// Issue a request to the oracle.
    pub async fn issue(&self, request: &RandomnessRequest) -> Result<(), OracleError> {
        debug!(
            request = request.id.0,
            round = request.round.0,
            "Issuing randomness request"
        );
        self.oracle.request(request).await.inspect_err(|e| {
            warn!(request = request.id.0, error = %e, "Randomness request not accepted");
        })
    }

    /// Check a fulfillment's proof.
    ///
    /// Returns the fulfillment unchanged when it may be forwarded to
    /// `settle`, or `BadRandomness` when it must be dropped.
    pub fn verify(&self, fulfillment: Fulfillment) -> Result<Fulfillment, LotteryError> {
        let Some(key) = &self.oracle_key else {
            return Ok(fulfillment);
        };

        let bad = |reason: String| {
            warn!(
                request = fulfillment.request.0,
                reason = %reason,
                "Dropping fulfillment with bad proof"
            );
            LotteryError::BadRandomness {
                request: fulfillment.request,
                reason,
            }
        };

        let Some(proof) = &fulfillment.proof else {
            return Err(bad("missing proof".to_string()));
        };

        let digest = RandomnessRequest::proof_digest(fulfillment.request, &fulfillment.value);
        key.verify(digest.as_bytes(), proof)
            .map_err(|e| bad(e.to_string()))?;

        Ok(fulfillment)
    }
}
