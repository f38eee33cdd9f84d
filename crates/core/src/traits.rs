//! State machine contract.

use crate::{Action, Event};
use std::time::Duration;

/// Event-driven core of the coordinator.
///
/// Implementations never block, never await and never touch storage, the
/// oracle or the treasury. Anything that has to leave the process is
/// returned as an [`Action`]; anything that arrives later comes back as an
/// [`Event`]. Given the same state, clock and event, `handle` returns the
/// same actions, which is what lets tests drive the machine step by step.
///
/// ```ignore
/// machine.set_time(clock.now());
/// for action in machine.handle(Event::TimerFired(TimerId::RoundClose(round))) {
///     runner.execute(action);
/// }
/// ```
pub trait StateMachine {
    /// React to an asynchronous input.
    fn handle(&mut self, event: Event) -> Vec<Action>;

    /// Advance the clock the next transition will observe.
    ///
    /// Time is a duration on the runner's timeline; the machine only compares
    /// it against deadlines it derived from earlier readings.
    fn set_time(&mut self, now: Duration);

    /// Time last passed to `set_time`.
    fn now(&self) -> Duration;
}
