//! Domain-specific identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Round identifier.
///
/// Monotonic: every settled round hands over to `id.next()`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RoundId(pub u64);

impl RoundId {
    /// The round a fresh lottery starts with.
    pub const FIRST: Self = RoundId(0);

    /// Get the next round id.
    pub fn next(self) -> Self {
        RoundId(self.0 + 1)
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Round({})", self.0)
    }
}

/// Randomness request identifier.
///
/// Allocated from a single counter across all rounds, so an id from an
/// earlier round can never collide with the pending one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RandomnessRequestId(pub u64);

impl RandomnessRequestId {
    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RandomnessRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rand-{}", self.0)
    }
}

/// Participant identifier (an account or address in the value-transfer system).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    /// Create a participant id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// An amount of the settlement currency, in its smallest unit.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(pub u64);

impl Amount {
    /// Zero amount.
    pub const ZERO: Self = Amount(0);

    /// Get the raw value.
    pub fn get(&self) -> u64 {
        self.0
    }

    /// Checked addition. Returns `None` on overflow.
    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    /// Checked subtraction. Returns `None` on underflow.
    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Addition clamped at the maximum amount.
    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }

    /// Checked multiplication by a count. Returns `None` on overflow.
    pub fn checked_mul(self, count: u64) -> Option<Amount> {
        self.0.checked_mul(count).map(Amount)
    }

    /// Whether this is the zero amount.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_id_next() {
        assert_eq!(RoundId::FIRST.next(), RoundId(1));
        assert_eq!(RoundId(41).next(), RoundId(42));
    }

    #[test]
    fn test_amount_checked_arithmetic() {
        assert_eq!(Amount(10).checked_add(Amount(20)), Some(Amount(30)));
        assert_eq!(Amount(u64::MAX).checked_add(Amount(1)), None);
        assert_eq!(Amount(10).checked_mul(3), Some(Amount(30)));
        assert_eq!(Amount(u64::MAX).checked_mul(2), None);
        assert_eq!(Amount(5).checked_sub(Amount(6)), None);
    }

    #[test]
    fn test_identifiers_serialize_transparently() {
        let json = serde_json::to_string(&ParticipantId::new("alice")).unwrap();
        assert_eq!(json, "\"alice\"");

        let json = serde_json::to_string(&RoundId(7)).unwrap();
        assert_eq!(json, "7");
    }
}
