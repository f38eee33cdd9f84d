//! Round ledger.

use lottery_core::LotteryError;
use lottery_types::{Outcome, RandomnessRequestId, RoundId};
use std::collections::btree_map;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error};

/// Append-only log of outcomes keyed by round.
///
/// Maintains a secondary index from randomness request to round so a
/// replayed fulfillment can be matched to the outcome it already produced.
#[derive(Debug, Default, Clone)]
pub struct RoundLedger {
    /// round -> outcome, iterated in ascending round order.
    outcomes: BTreeMap<RoundId, Outcome>,
    /// Reverse index: request -> round it settled.
    rounds_by_request: HashMap<RandomnessRequestId, RoundId>,
}

impl RoundLedger {
    /// Create a new empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from previously recorded outcomes.
    ///
    /// Fails with `DuplicateRound` if the input repeats a round.
    pub fn from_outcomes(
        outcomes: impl IntoIterator<Item = Outcome>,
    ) -> Result<Self, LotteryError> {
        let mut ledger = Self::new();
        for outcome in outcomes {
            ledger.record(outcome)?;
        }
        Ok(ledger)
    }

    /// Append an outcome.
    ///
    /// Fails with `DuplicateRound` if the round already has one; the existing
    /// entry is left untouched.
    pub fn record(&mut self, outcome: Outcome) -> Result<(), LotteryError> {
        let round = outcome.round;
        let request = outcome.request;

        match self.outcomes.entry(round) {
            btree_map::Entry::Occupied(_) => {
                error!(round = round.0, "Refusing to overwrite recorded outcome");
                Err(LotteryError::DuplicateRound { round })
            }
            btree_map::Entry::Vacant(slot) => {
                debug!(
                    round = round.0,
                    winner = %outcome.winner,
                    prize = outcome.prize.0,
                    "Outcome recorded"
                );
                slot.insert(outcome);
                self.rounds_by_request.insert(request, round);
                Ok(())
            }
        }
    }

    /// Lazy, restartable iteration over outcomes in ascending round order.
    pub fn history(&self) -> History<'_> {
        History {
            inner: self.outcomes.values(),
        }
    }

    /// Get the outcome of a round.
    pub fn get(&self, round: RoundId) -> Option<&Outcome> {
        self.outcomes.get(&round)
    }

    /// Most recently settled outcome.
    pub fn latest(&self) -> Option<&Outcome> {
        self.outcomes.values().next_back()
    }

    /// Find the outcome a randomness request settled.
    pub fn find_by_request(&self, request: RandomnessRequestId) -> Option<&Outcome> {
        self.rounds_by_request
            .get(&request)
            .and_then(|round| self.outcomes.get(round))
    }

    /// Number of recorded rounds.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Check if the ledger is empty.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Iterator over recorded outcomes in ascending round order.
///
/// Nothing is materialised up front. A clone taken before consuming starts
/// from the same position, as does a fresh [`RoundLedger::history`] call.
#[derive(Debug, Clone)]
pub struct History<'a> {
    inner: btree_map::Values<'a, RoundId, Outcome>,
}

impl<'a> Iterator for History<'a> {
    type Item = &'a Outcome;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for History<'_> {}

impl DoubleEndedIterator for History<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lottery_types::{Amount, ParticipantId, RandomValue, Receipt};
    use std::time::Duration;
    use tracing_test::traced_test;

    fn outcome(round: u64, winner: &str) -> Outcome {
        let winner = ParticipantId::new(winner);
        Outcome {
            round: RoundId(round),
            winner: winner.clone(),
            prize: Amount(30),
            settled_at: Duration::from_secs(round),
            request: RandomnessRequestId(round + 100),
            random_value: RandomValue::from_u64(round),
            winner_index: 0,
            receipt: Receipt {
                round: RoundId(round),
                recipient: winner,
                amount: Amount(30),
                reference: format!("tx-{round}"),
            },
        }
    }

    #[traced_test]
    #[test]
    fn test_record_and_lookup() {
        let mut ledger = RoundLedger::new();
        assert!(ledger.is_empty());
        assert!(ledger.latest().is_none());

        ledger.record(outcome(0, "alice")).unwrap();
        ledger.record(outcome(1, "bob")).unwrap();

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.get(RoundId(0)).unwrap().winner.as_str(), "alice");
        assert_eq!(ledger.latest().unwrap().round, RoundId(1));
        assert_eq!(
            ledger
                .find_by_request(RandomnessRequestId(101))
                .map(|o| o.round),
            Some(RoundId(1))
        );
        assert!(ledger.find_by_request(RandomnessRequestId(7)).is_none());
    }

    #[traced_test]
    #[test]
    fn test_duplicate_round_rejected() {
        let mut ledger = RoundLedger::new();
        ledger.record(outcome(0, "alice")).unwrap();

        let err = ledger.record(outcome(0, "mallory")).unwrap_err();
        assert_eq!(err, LotteryError::DuplicateRound { round: RoundId(0) });
        assert_eq!(ledger.get(RoundId(0)).unwrap().winner.as_str(), "alice");
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_history_is_ordered_and_restartable() {
        let mut ledger = RoundLedger::new();
        for round in [2, 0, 1] {
            ledger.record(outcome(round, "p")).unwrap();
        }

        let history = ledger.history();
        let first_pass: Vec<u64> = history.clone().map(|o| o.round.0).collect();
        let second_pass: Vec<u64> = history.map(|o| o.round.0).collect();

        assert_eq!(first_pass, vec![0, 1, 2]);
        assert_eq!(first_pass, second_pass);
        assert_eq!(ledger.history().len(), 3);
    }

    #[test]
    fn test_from_outcomes_rejects_duplicates() {
        let rebuilt = RoundLedger::from_outcomes(vec![outcome(0, "a"), outcome(1, "b")]).unwrap();
        assert_eq!(rebuilt.len(), 2);

        let err = RoundLedger::from_outcomes(vec![outcome(0, "a"), outcome(0, "b")]).unwrap_err();
        assert_eq!(err, LotteryError::DuplicateRound { round: RoundId(0) });
    }
}
