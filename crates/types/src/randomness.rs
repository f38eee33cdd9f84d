//! Randomness requests and values.

use crate::{Hash, RandomnessRequestId, RoundId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Lifecycle of a randomness request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    /// Issued to the oracle, not yet settled.
    Pending,
    /// Settled; the round it belongs to has an outcome.
    Fulfilled,
    /// Force-failed by timeout or rejected by the oracle.
    Failed,
}

/// A randomness request issued for one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomnessRequest {
    /// Request identifier.
    pub id: RandomnessRequestId,
    /// Round the randomness is for.
    pub round: RoundId,
    /// Current status.
    pub status: RequestStatus,
    /// When the request was issued.
    pub issued_at: Duration,
}

impl RandomnessRequest {
    /// Create a new pending request.
    pub fn new(id: RandomnessRequestId, round: RoundId, issued_at: Duration) -> Self {
        Self {
            id,
            round,
            status: RequestStatus::Pending,
            issued_at,
        }
    }

    /// Whether the request is still awaiting settlement.
    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    /// Digest the oracle signs when fulfilling request `request` with `value`.
    ///
    /// Request ids are never reused, so binding the id also binds the round.
    pub fn proof_digest(request: RandomnessRequestId, value: &RandomValue) -> Hash {
        Hash::tagged(
            "lottery-randomness",
            &[&request.0.to_le_bytes(), value.as_bytes()],
        )
    }
}

/// A 256-bit random value delivered by the oracle.
///
/// Interpreted as a big-endian unsigned integer for winner selection.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RandomValue([u8; 32]);

impl RandomValue {
    /// Wrap raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Build a value equal to the integer `value`.
    pub fn from_u64(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Reduce the value modulo `modulus`.
    ///
    /// Exact over the full 256 bits, so the result is uniform whenever the
    /// value is; the only bias is the unavoidable `modulus / 2^256`.
    ///
    /// # Panics
    ///
    /// Panics if `modulus` is zero.
    pub fn reduce(&self, modulus: u64) -> u64 {
        assert!(modulus > 0, "modulus must be non-zero");
        let m = u128::from(modulus);
        let rem = self
            .0
            .iter()
            .fold(0u128, |acc, &byte| ((acc << 8) | u128::from(byte)) % m);
        rem as u64
    }
}

impl fmt::Debug for RandomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RandomValue({})", hex::encode(self.0))
    }
}
