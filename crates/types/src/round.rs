//! The live round.

use crate::{Amount, LotteryConfig, ParticipantId, RoundId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Phase of a round.
///
/// Transitions are strictly `Open -> Closed -> CalculatingWinner`, after
/// which the next round starts in `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoundPhase {
    /// Accepting entries.
    Open,
    /// Entry closed, waiting for a winner request.
    Closed,
    /// Randomness requested, waiting for settlement.
    CalculatingWinner,
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoundPhase::Open => "Open",
            RoundPhase::Closed => "Closed",
            RoundPhase::CalculatingWinner => "CalculatingWinner",
        };
        f.write_str(name)
    }
}

/// One paid slot in a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entrant {
    /// Who paid for the slot.
    pub participant: ParticipantId,
    /// When the entry was accepted.
    pub entered_at: Duration,
}

/// A single lottery round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    /// Round identifier.
    pub id: RoundId,
    /// Current phase.
    pub phase: RoundPhase,
    /// Entrants in entry order. A participant may hold several slots.
    pub entrants: Vec<Entrant>,
    /// Price of one slot, fixed when the round opened.
    pub ticket_price: Amount,
    /// Capacity of the round.
    pub max_entrants: u32,
    /// Time of the first entry. The round deadline counts from here.
    pub opened_at: Option<Duration>,
    /// How long the round stays open after its first entry.
    pub duration: Duration,
    /// Total paid in by entrants.
    pub pot: Amount,
}

impl Round {
    /// Open a fresh round with the given parameters.
    pub fn open(id: RoundId, config: &LotteryConfig) -> Self {
        Self {
            id,
            phase: RoundPhase::Open,
            entrants: Vec::new(),
            ticket_price: config.ticket_price,
            max_entrants: config.max_entrants,
            opened_at: None,
            duration: config.duration,
            pot: Amount::ZERO,
        }
    }

    /// Number of slots taken.
    pub fn len(&self) -> usize {
        self.entrants.len()
    }

    /// Whether no one has entered yet.
    pub fn is_empty(&self) -> bool {
        self.entrants.is_empty()
    }

    /// Whether the round has reached capacity.
    pub fn is_full(&self) -> bool {
        self.entrants.len() >= self.max_entrants as usize
    }

    /// When entry closes, if the round has started.
    pub fn deadline(&self) -> Option<Duration> {
        self.opened_at.map(|opened| opened + self.duration)
    }

    /// Whether the round's duration has elapsed at `now`.
    pub fn deadline_elapsed(&self, now: Duration) -> bool {
        self.deadline().is_some_and(|deadline| now >= deadline)
    }

    /// Re-stamp the round's parameters from a config.
    ///
    /// Only meaningful while the round is open and empty.
    pub fn apply_config(&mut self, config: &LotteryConfig) {
        self.ticket_price = config.ticket_price;
        self.max_entrants = config.max_entrants;
        self.duration = config.duration;
    }
}
