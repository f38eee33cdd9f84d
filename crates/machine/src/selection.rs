//! Winner selection.

use lottery_types::RandomValue;

/// Index of the winning slot among `entrants` slots.
///
/// `value mod entrants`, computed over the full 256-bit value. Selection is
/// uniform over slots, so a participant holding `k` of `n` slots wins with
/// probability `k / n`.
///
/// # Panics
///
/// Panics if `entrants` is zero. A round only reaches settlement with at
/// least one entrant.
pub fn winner_index(value: &RandomValue, entrants: usize) -> usize {
    value.reduce(entrants as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{RngCore, SeedableRng};
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_worked_example() {
        assert_eq!(winner_index(&RandomValue::from_u64(7), 3), 1);
    }

    #[test]
    fn test_single_entrant_always_wins() {
        for v in [0, 1, 99, u64::MAX] {
            assert_eq!(winner_index(&RandomValue::from_u64(v), 1), 0);
        }
    }

    #[test]
    fn test_selection_is_uniform() {
        const ENTRANTS: usize = 5;
        const TRIALS: usize = 50_000;
        const TOLERANCE: f64 = 0.01;

        let mut rng = ChaCha20Rng::seed_from_u64(0x5eed);
        let mut wins = [0usize; ENTRANTS];
        for _ in 0..TRIALS {
            let mut bytes = [0u8; 32];
            rng.fill_bytes(&mut bytes);
            wins[winner_index(&RandomValue::from_bytes(bytes), ENTRANTS)] += 1;
        }

        let expected = 1.0 / ENTRANTS as f64;
        for (index, count) in wins.iter().enumerate() {
            let observed = *count as f64 / TRIALS as f64;
            assert!(
                (observed - expected).abs() < TOLERANCE,
                "entrant {index} won {observed:.4}, expected {expected:.4}"
            );
        }
    }

    #[test]
    fn test_selection_is_ticket_weighted() {
        // Slots [a, a, a, b]: a should win about 3/4 of draws.
        let slots = ["a", "a", "a", "b"];
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let trials = 40_000;

        let a_wins = (0..trials)
            .filter(|_| {
                let mut bytes = [0u8; 32];
                rng.fill_bytes(&mut bytes);
                slots[winner_index(&RandomValue::from_bytes(bytes), slots.len())] == "a"
            })
            .count();

        let observed = a_wins as f64 / trials as f64;
        assert!((observed - 0.75).abs() < 0.01, "a won {observed:.4}");
    }
}
