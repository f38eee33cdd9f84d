//! Lottery state machine.

use crate::{winner_index, AdminGateway};
use lottery_core::{Action, Event, LotteryError, Notification, PayoutError, StateMachine, TimerId};
use lottery_ledger::{History, RoundLedger};
use lottery_types::{
    Amount, Entrant, LotteryConfig, LotterySnapshot, Outcome, ParticipantId, PayoutOrder,
    RandomValue, RandomnessRequest, RandomnessRequestId, Receipt, RequestStatus, Round, RoundId,
    RoundPhase,
};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Acknowledgement of an accepted entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryReceipt {
    /// Round the entry belongs to.
    pub round: RoundId,
    /// Zero-based slot taken by the entry.
    pub slot: u32,
    /// Slots taken after this entry.
    pub entrants: u32,
    /// Whether this entry closed the round.
    pub closed: bool,
}

/// Read-only summary of the live round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundView {
    /// Round identifier.
    pub round: RoundId,
    /// Current phase.
    pub phase: RoundPhase,
    /// Slots taken.
    pub entrants: u32,
    /// Capacity.
    pub max_entrants: u32,
    /// Ticket price.
    pub ticket_price: Amount,
    /// Current pot.
    pub pot: Amount,
    /// When entry closes, once the round has started.
    pub deadline: Option<Duration>,
    /// Pending randomness request, if any.
    pub pending_request: Option<RandomnessRequestId>,
    /// Whether a payout is executing.
    pub payout_in_flight: bool,
    /// Aggregate version.
    pub version: u64,
}

/// Result of a `settle` call.
#[derive(Debug, Clone)]
pub enum SettleStep {
    /// A payout was staged. Execute `actions`; the outcome arrives through
    /// `Event::PayoutCompleted` / `Event::PayoutFailed`.
    Pay {
        /// The staged payout.
        order: PayoutOrder,
        /// Actions to execute.
        actions: Vec<Action>,
    },

    /// The request was already settled with the same value. Nothing to do.
    AlreadySettled(Outcome),
}

/// The lottery coordinator's core state machine.
///
/// Owns the live round, its randomness request and the round ledger. All
/// methods are synchronous; the runner serializes calls so that every
/// transition observes the state left by the previous one.
///
/// Cloning captures the whole aggregate; the runner keeps a clone as the
/// checkpoint to restore when a command's snapshot cannot be written.
#[derive(Clone)]
pub struct LotteryStateMachine {
    /// Configuration owner.
    admin: AdminGateway,

    /// The live round.
    round: Round,

    /// Randomness request of the live round.
    pending_request: Option<RandomnessRequest>,

    /// Whether a fulfillment for the pending request has been accepted.
    settlement_attempted: bool,

    /// Payout handed to the executor and not yet acknowledged.
    payout_in_flight: Option<PayoutOrder>,

    /// Settled rounds.
    ledger: RoundLedger,

    /// Next randomness request id.
    next_request_id: u64,

    /// Version stamp, bumped on every persisted transition.
    version: u64,

    /// Current time.
    now: Duration,
}

impl LotteryStateMachine {
    /// Create a fresh lottery starting at round 0.
    pub fn new(owner: ParticipantId, config: LotteryConfig) -> Result<Self, LotteryError> {
        let admin = AdminGateway::new(owner, config)?;
        let round = Round::open(RoundId::FIRST, admin.config());
        Ok(Self {
            admin,
            round,
            pending_request: None,
            settlement_attempted: false,
            payout_in_flight: None,
            ledger: RoundLedger::new(),
            next_request_id: 1,
            version: 0,
            now: Duration::ZERO,
        })
    }

    /// Actions announcing the initial round of a fresh lottery.
    pub fn start(&mut self) -> Vec<Action> {
        info!(round = self.round.id.0, "Lottery started");
        vec![
            Action::Notify(Notification::RoundOpened {
                round: self.round.id,
                config: self.admin.config().clone(),
            }),
            self.persist(),
        ]
    }

    /// Rebuild the machine from a persisted snapshot.
    ///
    /// Returns the actions that re-arm timers for the recovered phase and
    /// re-drive an in-flight payout. The executor is idempotent per round,
    /// so re-driving cannot pay twice.
    pub fn recover(
        snapshot: LotterySnapshot,
        now: Duration,
    ) -> Result<(Self, Vec<Action>), LotteryError> {
        let corrupt = |reason: &str| LotteryError::Storage(format!("corrupt snapshot: {reason}"));

        let admin = AdminGateway::new(snapshot.owner, snapshot.config)?;
        let ledger = RoundLedger::from_outcomes(snapshot.history)?;
        let round = snapshot.round;

        if round.len() > round.max_entrants as usize {
            return Err(corrupt("entrants exceed capacity"));
        }
        if round.phase != RoundPhase::Open && round.is_empty() {
            return Err(corrupt("closed round without entrants"));
        }
        if round.phase == RoundPhase::CalculatingWinner && snapshot.pending_request.is_none() {
            return Err(corrupt("calculating winner without a request"));
        }
        if ledger.get(round.id).is_some() {
            return Err(corrupt("live round already settled"));
        }

        let mut machine = Self {
            admin,
            round,
            pending_request: snapshot.pending_request,
            settlement_attempted: snapshot.settlement_attempted,
            payout_in_flight: snapshot.payout_in_flight,
            ledger,
            next_request_id: snapshot.next_request_id,
            version: snapshot.version,
            now,
        };

        let mut actions = Vec::new();
        match machine.round.phase {
            RoundPhase::Open => {
                if let Some(deadline) = machine.round.deadline() {
                    actions.push(Action::SetTimer {
                        id: TimerId::RoundClose(machine.round.id),
                        duration: deadline.saturating_sub(now),
                    });
                }
            }
            RoundPhase::Closed => {}
            RoundPhase::CalculatingWinner => {
                if let Some(order) = &machine.payout_in_flight {
                    info!(round = order.round.0, "Re-driving in-flight payout");
                    actions.push(Action::ExecutePayout {
                        order: order.clone(),
                    });
                } else if let Some(timer) = machine.request_timeout_timer() {
                    actions.push(timer);
                }
            }
        }

        info!(
            round = machine.round.id.0,
            phase = %machine.round.phase,
            entrants = machine.round.len(),
            version = machine.version,
            settled_rounds = machine.ledger.len(),
            "Recovered lottery state"
        );

        Ok((machine, actions))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Time
    // ═══════════════════════════════════════════════════════════════════════════

    /// Set the clock and close the round if its deadline has passed.
    ///
    /// The runner calls this before every command, so an entry arriving
    /// after the deadline finds the round already closed.
    pub fn advance_time(&mut self, now: Duration) -> Vec<Action> {
        self.now = now;
        if self.round.phase == RoundPhase::Open && self.round.deadline_elapsed(now) {
            let mut actions = self.close_round();
            actions.push(self.persist());
            return actions;
        }
        vec![]
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Entry
    // ═══════════════════════════════════════════════════════════════════════════

    /// Accept a paid entry.
    pub fn enter(
        &mut self,
        participant: ParticipantId,
        paid: Amount,
    ) -> Result<(EntryReceipt, Vec<Action>), LotteryError> {
        self.expect_phase(RoundPhase::Open)?;

        if paid != self.round.ticket_price {
            return Err(LotteryError::BadPayment {
                expected: self.round.ticket_price,
                paid,
            });
        }
        if self.round.is_full() {
            return Err(LotteryError::RoundFull {
                max_entrants: self.round.max_entrants,
            });
        }

        let pot = self
            .round
            .pot
            .checked_add(paid)
            .ok_or_else(|| LotteryError::InvalidConfig("pot overflow".to_string()))?;

        let mut actions = Vec::new();

        if self.round.opened_at.is_none() {
            self.round.opened_at = Some(self.now);
            actions.push(Action::SetTimer {
                id: TimerId::RoundClose(self.round.id),
                duration: self.round.duration,
            });
        }

        self.round.pot = pot;
        self.round.entrants.push(Entrant {
            participant: participant.clone(),
            entered_at: self.now,
        });
        let entrants = self.round.len() as u32;

        debug!(
            round = self.round.id.0,
            participant = %participant,
            entrants,
            pot = pot.0,
            "Entry accepted"
        );

        actions.push(Action::CollectPayment {
            round: self.round.id,
            payer: participant.clone(),
            amount: paid,
        });
        actions.push(Action::Notify(Notification::PlayerEntered {
            round: self.round.id,
            participant,
            entrants,
        }));

        let closed = self.round.is_full() || self.round.deadline_elapsed(self.now);
        if closed {
            actions.extend(self.close_round());
        }
        actions.push(self.persist());

        let receipt = EntryReceipt {
            round: self.round.id,
            slot: entrants - 1,
            entrants,
            closed,
        };
        Ok((receipt, actions))
    }

    /// Transition Open -> Closed. Callers persist.
    fn close_round(&mut self) -> Vec<Action> {
        self.round.phase = RoundPhase::Closed;

        info!(
            round = self.round.id.0,
            entrants = self.round.len(),
            pot = self.round.pot.0,
            "Round closed"
        );

        vec![Action::Notify(Notification::RoundClosed {
            round: self.round.id,
            entrants: self.round.len() as u32,
            pot: self.round.pot,
        })]
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Winner request
    // ═══════════════════════════════════════════════════════════════════════════

    /// Issue the randomness request for a closed round.
    pub fn request_winner(
        &mut self,
        caller: &ParticipantId,
    ) -> Result<(RandomnessRequestId, Vec<Action>), LotteryError> {
        self.expect_phase(RoundPhase::Closed)?;
        self.admin.authorize_winner_request(caller)?;

        let id = RandomnessRequestId(self.next_request_id);
        self.next_request_id += 1;

        let request = RandomnessRequest::new(id, self.round.id, self.now);
        self.pending_request = Some(request.clone());
        self.settlement_attempted = false;
        self.round.phase = RoundPhase::CalculatingWinner;

        info!(
            round = self.round.id.0,
            request = id.0,
            caller = %caller,
            "Winner requested"
        );

        // Durable before the oracle sees it.
        let mut actions = vec![self.persist(), Action::RequestRandomness { request }];
        actions.extend(self.request_timeout_timer());
        actions.push(Action::Notify(Notification::WinnerRequested {
            round: self.round.id,
            request: id,
        }));

        Ok((id, actions))
    }

    /// Timer for the pending request's timeout, if the policy sets one and
    /// the request can still expire.
    fn request_timeout_timer(&self) -> Option<Action> {
        let timeout = self.admin.config().request_timeout?;
        let request = self.pending_request.as_ref()?;
        if !request.is_pending() || self.settlement_attempted {
            return None;
        }
        let deadline = request.issued_at + timeout;
        Some(Action::SetTimer {
            id: TimerId::RandomnessTimeout(request.id),
            duration: deadline.saturating_sub(self.now),
        })
    }

    /// Force-fail the pending request and return the round to Closed.
    fn expire_request(&mut self, reason: &str) -> Vec<Action> {
        let Some(request) = self.pending_request.as_mut() else {
            return vec![];
        };
        request.status = RequestStatus::Failed;
        let id = request.id;
        self.round.phase = RoundPhase::Closed;

        warn!(
            round = self.round.id.0,
            request = id.0,
            reason,
            "Randomness request failed, round closed for re-request"
        );

        vec![
            Action::Notify(Notification::RandomnessExpired {
                round: self.round.id,
                request: id,
            }),
            self.persist(),
        ]
    }

    /// Whether `id` is the live round's request and can still expire.
    fn request_can_expire(&self, id: RandomnessRequestId) -> bool {
        self.round.phase == RoundPhase::CalculatingWinner
            && !self.settlement_attempted
            && self
                .pending_request
                .as_ref()
                .is_some_and(|r| r.id == id && r.is_pending())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Settlement
    // ═══════════════════════════════════════════════════════════════════════════

    /// Select the winner for a fulfilled request and stage its payout.
    ///
    /// Replaying an already settled `(request, value)` returns the recorded
    /// outcome and stages nothing. After a failed payout the same request
    /// may be settled again.
    pub fn settle(
        &mut self,
        request: RandomnessRequestId,
        value: RandomValue,
    ) -> Result<SettleStep, LotteryError> {
        if let Some(outcome) = self.ledger.find_by_request(request) {
            if outcome.random_value == value {
                debug!(
                    round = outcome.round.0,
                    request = request.0,
                    "Settlement replay, returning recorded outcome"
                );
                return Ok(SettleStep::AlreadySettled(outcome.clone()));
            }
            error!(
                round = outcome.round.0,
                request = request.0,
                "Settled request replayed with a different value"
            );
            return Err(LotteryError::UnknownRequest { request });
        }

        let is_pending = self
            .pending_request
            .as_ref()
            .is_some_and(|r| r.id == request && r.is_pending());
        if !is_pending {
            error!(
                round = self.round.id.0,
                request = request.0,
                pending = ?self.pending_request.as_ref().map(|r| r.id.0),
                "Fulfillment for unknown or stale request"
            );
            return Err(LotteryError::UnknownRequest { request });
        }

        self.expect_phase(RoundPhase::CalculatingWinner)?;

        if self.payout_in_flight.is_some() {
            return Err(LotteryError::SettlementInProgress {
                round: self.round.id,
            });
        }

        // Closed invariant: a round only closes with at least one entrant.
        let index = winner_index(&value, self.round.len());
        let winner = self.round.entrants[index].participant.clone();

        let order = PayoutOrder {
            round: self.round.id,
            recipient: winner,
            amount: self.round.pot,
            request,
            random_value: value,
            winner_index: index as u32,
        };

        info!(
            round = order.round.0,
            request = request.0,
            winner_index = index,
            winner = %order.recipient,
            prize = order.amount.0,
            "Winner selected, staging payout"
        );

        self.settlement_attempted = true;
        self.payout_in_flight = Some(order.clone());

        // Persist first so a restart re-drives the order instead of losing it.
        let actions = vec![
            self.persist(),
            Action::ExecutePayout {
                order: order.clone(),
            },
        ];
        Ok(SettleStep::Pay { order, actions })
    }

    fn on_payout_completed(&mut self, order: PayoutOrder, receipt: Receipt) -> Vec<Action> {
        if self.payout_in_flight.as_ref() != Some(&order) {
            warn!(round = order.round.0, "Ignoring completion of unknown payout");
            return vec![];
        }

        if receipt.round != order.round
            || receipt.recipient != order.recipient
            || receipt.amount != order.amount
        {
            error!(
                round = order.round.0,
                recipient = %order.recipient,
                amount = order.amount.0,
                paid_to = %receipt.recipient,
                paid = receipt.amount.0,
                reference = %receipt.reference,
                "Payout receipt does not match the order"
            );
            let round = order.round;
            return self.on_payout_failed(order, PayoutError::ConflictingPayout(round));
        }

        let outcome = Outcome::from_payout(&order, receipt, self.now);
        if let Err(e) = self.ledger.record(outcome.clone()) {
            error!(round = order.round.0, error = %e, "Payout completed for a recorded round");
            self.payout_in_flight = None;
            return vec![
                self.persist(),
                Action::EmitSettlementResult {
                    round: order.round,
                    result: Err(e),
                },
            ];
        }

        if let Some(request) = self.pending_request.as_mut() {
            request.status = RequestStatus::Fulfilled;
        }

        info!(
            round = outcome.round.0,
            winner = %outcome.winner,
            prize = outcome.prize.0,
            "Round settled"
        );

        self.payout_in_flight = None;
        self.pending_request = None;
        self.settlement_attempted = false;
        self.round = Round::open(self.round.id.next(), self.admin.config());

        vec![
            Action::Notify(Notification::WinnerSettled {
                outcome: outcome.clone(),
            }),
            Action::Notify(Notification::RoundOpened {
                round: self.round.id,
                config: self.admin.config().clone(),
            }),
            self.persist(),
            Action::EmitSettlementResult {
                round: outcome.round,
                result: Ok(outcome),
            },
        ]
    }

    fn on_payout_failed(&mut self, order: PayoutOrder, error: PayoutError) -> Vec<Action> {
        if self.payout_in_flight.as_ref() != Some(&order) {
            warn!(round = order.round.0, "Ignoring failure of unknown payout");
            return vec![];
        }

        warn!(
            round = order.round.0,
            recipient = %order.recipient,
            error = %error,
            "Payout failed, round remains settleable"
        );

        self.payout_in_flight = None;

        vec![
            Action::Notify(Notification::PayoutFailed {
                order: order.clone(),
                error: error.clone(),
            }),
            self.persist(),
            Action::EmitSettlementResult {
                round: order.round,
                result: Err(LotteryError::Payout(error)),
            },
        ]
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Timers
    // ═══════════════════════════════════════════════════════════════════════════

    fn on_timer(&mut self, id: TimerId) -> Vec<Action> {
        match id {
            TimerId::RoundClose(round) => {
                if round != self.round.id || self.round.phase != RoundPhase::Open {
                    debug!(round = round.0, "Stale round close timer");
                    return vec![];
                }
                match self.round.deadline() {
                    Some(deadline) if self.now >= deadline => self.advance_time(self.now),
                    Some(deadline) => vec![Action::SetTimer {
                        id,
                        duration: deadline - self.now,
                    }],
                    None => vec![],
                }
            }
            TimerId::RandomnessTimeout(request) => {
                if !self.request_can_expire(request) {
                    debug!(request = request.0, "Stale randomness timeout");
                    return vec![];
                }
                match self.request_timeout_timer() {
                    Some(Action::SetTimer { duration, .. }) if !duration.is_zero() => {
                        vec![Action::SetTimer { id, duration }]
                    }
                    _ => self.expire_request("timed out"),
                }
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Admin
    // ═══════════════════════════════════════════════════════════════════════════

    /// Change the ticket price.
    pub fn update_ticket_price(
        &mut self,
        caller: &ParticipantId,
        ticket_price: Amount,
    ) -> Result<Vec<Action>, LotteryError> {
        self.admin
            .update_ticket_price(caller, &self.round, ticket_price)?;
        Ok(self.config_changed())
    }

    /// Change the round capacity.
    pub fn update_max_entrants(
        &mut self,
        caller: &ParticipantId,
        max_entrants: u32,
    ) -> Result<Vec<Action>, LotteryError> {
        self.admin
            .update_max_entrants(caller, &self.round, max_entrants)?;
        Ok(self.config_changed())
    }

    /// Change the round duration.
    pub fn update_duration(
        &mut self,
        caller: &ParticipantId,
        duration: Duration,
    ) -> Result<Vec<Action>, LotteryError> {
        self.admin.update_duration(caller, &self.round, duration)?;
        Ok(self.config_changed())
    }

    /// Change the randomness request timeout.
    pub fn update_request_timeout(
        &mut self,
        caller: &ParticipantId,
        request_timeout: Option<Duration>,
    ) -> Result<Vec<Action>, LotteryError> {
        self.admin
            .update_request_timeout(caller, &self.round, request_timeout)?;
        Ok(self.config_changed())
    }

    fn config_changed(&mut self) -> Vec<Action> {
        self.round.apply_config(self.admin.config());
        vec![self.persist()]
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════════════════════

    /// Summary of the live round.
    pub fn state(&self) -> RoundView {
        RoundView {
            round: self.round.id,
            phase: self.round.phase,
            entrants: self.round.len() as u32,
            max_entrants: self.round.max_entrants,
            ticket_price: self.round.ticket_price,
            pot: self.round.pot,
            deadline: self.round.deadline(),
            pending_request: self
                .pending_request
                .as_ref()
                .filter(|r| r.is_pending())
                .map(|r| r.id),
            payout_in_flight: self.payout_in_flight.is_some(),
            version: self.version,
        }
    }

    /// The live round.
    pub fn round(&self) -> &Round {
        &self.round
    }

    /// Current phase.
    pub fn phase(&self) -> RoundPhase {
        self.round.phase
    }

    /// Entrants of the live round, in entry order.
    pub fn entrants(&self) -> &[Entrant] {
        &self.round.entrants
    }

    /// Randomness request of the live round.
    pub fn pending_request(&self) -> Option<&RandomnessRequest> {
        self.pending_request.as_ref()
    }

    /// Settled rounds in ascending order.
    pub fn history(&self) -> History<'_> {
        self.ledger.history()
    }

    /// Most recent outcome.
    pub fn recent_winner(&self) -> Option<&Outcome> {
        self.ledger.latest()
    }

    /// The round ledger.
    pub fn ledger(&self) -> &RoundLedger {
        &self.ledger
    }

    /// Active configuration.
    pub fn config(&self) -> &LotteryConfig {
        self.admin.config()
    }

    /// Current aggregate version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Capture the full aggregate.
    pub fn snapshot(&self) -> LotterySnapshot {
        LotterySnapshot {
            version: self.version,
            owner: self.admin.owner().clone(),
            config: self.admin.config().clone(),
            round: self.round.clone(),
            pending_request: self.pending_request.clone(),
            settlement_attempted: self.settlement_attempted,
            payout_in_flight: self.payout_in_flight.clone(),
            next_request_id: self.next_request_id,
            history: self.ledger.history().cloned().collect(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Helpers
    // ═══════════════════════════════════════════════════════════════════════════

    fn expect_phase(&self, expected: RoundPhase) -> Result<(), LotteryError> {
        if self.round.phase == expected {
            Ok(())
        } else {
            Err(LotteryError::WrongPhase {
                expected,
                actual: self.round.phase,
            })
        }
    }

    fn persist(&mut self) -> Action {
        self.version += 1;
        Action::Persist {
            snapshot: Box::new(self.snapshot()),
        }
    }
}

impl StateMachine for LotteryStateMachine {
    fn handle(&mut self, event: Event) -> Vec<Action> {
        match event {
            Event::TimerFired(id) => self.on_timer(id),
            Event::PayoutCompleted { order, receipt } => self.on_payout_completed(order, receipt),
            Event::PayoutFailed { order, error } => self.on_payout_failed(order, error),
            Event::RandomnessRequestFailed { request, reason } => {
                if self.request_can_expire(request) {
                    self.expire_request(&reason)
                } else {
                    debug!(request = request.0, "Ignoring failure of stale request");
                    vec![]
                }
            }
        }
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
    }

    fn now(&self) -> Duration {
        self.now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lottery_types::WinnerPolicy;
    use tracing_test::traced_test;

    const PRICE: Amount = Amount(10);

    fn owner() -> ParticipantId {
        ParticipantId::new("owner")
    }

    fn p(name: &str) -> ParticipantId {
        ParticipantId::new(name)
    }

    fn config() -> LotteryConfig {
        LotteryConfig::new(PRICE, 3, Duration::from_secs(60))
            .with_request_timeout(Some(Duration::from_secs(30)))
    }

    fn machine() -> LotteryStateMachine {
        let mut machine = LotteryStateMachine::new(owner(), config()).unwrap();
        machine.start();
        machine
    }

    fn notifications(actions: &[Action]) -> Vec<&'static str> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Notify(n) => Some(n.type_name()),
                _ => None,
            })
            .collect()
    }

    fn fill(machine: &mut LotteryStateMachine, names: &[&str]) {
        for name in names {
            machine.enter(p(name), PRICE).unwrap();
        }
    }

    fn staged_order(step: SettleStep) -> PayoutOrder {
        match step {
            SettleStep::Pay { order, .. } => order,
            SettleStep::AlreadySettled(outcome) => panic!("unexpected replay: {outcome:?}"),
        }
    }

    fn receipt_for(order: &PayoutOrder) -> Receipt {
        Receipt {
            round: order.round,
            recipient: order.recipient.clone(),
            amount: order.amount,
            reference: "tx-1".to_string(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Entry
    // ═══════════════════════════════════════════════════════════════════════

    #[traced_test]
    #[test]
    fn test_initial_state() {
        let machine = machine();
        let view = machine.state();
        assert_eq!(view.round, RoundId(0));
        assert_eq!(view.phase, RoundPhase::Open);
        assert_eq!(view.entrants, 0);
        assert_eq!(view.deadline, None);
        assert!(machine.recent_winner().is_none());
    }

    #[traced_test]
    #[test]
    fn test_enter_validates_payment() {
        let mut machine = machine();
        let err = machine.enter(p("a"), Amount(9)).unwrap_err();
        assert_eq!(
            err,
            LotteryError::BadPayment {
                expected: PRICE,
                paid: Amount(9)
            }
        );
        assert!(machine.entrants().is_empty());
    }

    #[traced_test]
    #[test]
    fn test_first_entry_starts_deadline() {
        let mut machine = machine();
        machine.set_time(Duration::from_secs(100));

        let (receipt, actions) = machine.enter(p("a"), PRICE).unwrap();
        assert_eq!(receipt.slot, 0);
        assert!(!receipt.closed);
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::SetTimer { id: TimerId::RoundClose(RoundId(0)), duration }
                if *duration == Duration::from_secs(60)
        )));
        assert_eq!(machine.state().deadline, Some(Duration::from_secs(160)));

        // Later entries do not move the deadline or re-arm the timer.
        machine.set_time(Duration::from_secs(110));
        let (_, actions) = machine.enter(p("b"), PRICE).unwrap();
        assert!(!actions.iter().any(|a| matches!(a, Action::SetTimer { .. })));
        assert_eq!(machine.state().deadline, Some(Duration::from_secs(160)));
    }

    #[traced_test]
    #[test]
    fn test_accepted_entry_collects_payment() {
        let mut machine = machine();
        let (_, actions) = machine.enter(p("a"), PRICE).unwrap();
        let collected: Vec<_> = actions
            .iter()
            .filter_map(|a| match a {
                Action::CollectPayment {
                    round,
                    payer,
                    amount,
                } => Some((*round, payer.clone(), *amount)),
                _ => None,
            })
            .collect();
        assert_eq!(collected, vec![(RoundId(0), p("a"), PRICE)]);

        // Rejected entries collect nothing.
        assert!(machine.enter(p("b"), Amount(1)).is_err());
    }

    #[traced_test]
    #[test]
    fn test_capacity_closes_round_exactly_once() {
        let mut machine = machine();
        fill(&mut machine, &["a", "b"]);

        let (receipt, actions) = machine.enter(p("c"), PRICE).unwrap();
        assert!(receipt.closed);
        assert_eq!(notifications(&actions), vec!["PlayerEntered", "RoundClosed"]);
        assert_eq!(machine.phase(), RoundPhase::Closed);
        assert_eq!(machine.round().pot, Amount(30));

        let err = machine.enter(p("d"), PRICE).unwrap_err();
        assert_eq!(
            err,
            LotteryError::WrongPhase {
                expected: RoundPhase::Open,
                actual: RoundPhase::Closed
            }
        );
        assert_eq!(machine.entrants().len(), 3);

        // The deadline passing later does not close it a second time.
        assert!(machine.advance_time(Duration::from_secs(1_000)).is_empty());
    }

    #[traced_test]
    #[test]
    fn test_deadline_closes_round() {
        let mut machine = machine();
        fill(&mut machine, &["a"]);

        assert!(machine.advance_time(Duration::from_secs(59)).is_empty());
        assert_eq!(machine.phase(), RoundPhase::Open);

        let actions = machine.advance_time(Duration::from_secs(60));
        assert_eq!(notifications(&actions), vec!["RoundClosed"]);
        assert_eq!(machine.phase(), RoundPhase::Closed);
        assert!(machine.enter(p("late"), PRICE).is_err());
    }

    #[traced_test]
    #[test]
    fn test_close_timer_ignored_when_stale() {
        let mut machine = machine();
        fill(&mut machine, &["a", "b", "c"]);

        machine.set_time(Duration::from_secs(60));
        let actions = machine.handle(Event::TimerFired(TimerId::RoundClose(RoundId(0))));
        assert!(actions.is_empty());
    }

    #[traced_test]
    #[test]
    fn test_close_timer_closes_idle_round() {
        let mut machine = machine();
        fill(&mut machine, &["a"]);

        machine.set_time(Duration::from_secs(60));
        let actions = machine.handle(Event::TimerFired(TimerId::RoundClose(RoundId(0))));
        assert_eq!(notifications(&actions), vec!["RoundClosed"]);
        assert_eq!(machine.phase(), RoundPhase::Closed);
    }

    #[traced_test]
    #[test]
    fn test_entrants_never_exceed_capacity() {
        let mut machine = machine();
        for i in 0..10 {
            let _ = machine.enter(p(&format!("p{i}")), PRICE);
            assert!(machine.entrants().len() <= 3);
        }
        assert_eq!(machine.entrants().len(), 3);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Winner request
    // ═══════════════════════════════════════════════════════════════════════

    #[traced_test]
    #[test]
    fn test_request_winner_requires_closed_round() {
        let mut machine = machine();
        fill(&mut machine, &["a"]);

        assert!(matches!(
            machine.request_winner(&owner()),
            Err(LotteryError::WrongPhase { .. })
        ));
    }

    #[traced_test]
    #[test]
    fn test_request_winner_issues_single_request() {
        let mut machine = machine();
        fill(&mut machine, &["a", "b", "c"]);

        let (id, actions) = machine.request_winner(&p("anyone")).unwrap();
        let issued: Vec<_> = actions
            .iter()
            .filter(|a| matches!(a, Action::RequestRandomness { .. }))
            .collect();
        assert_eq!(issued.len(), 1);
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::SetTimer { id: TimerId::RandomnessTimeout(r), .. } if *r == id
        )));
        assert_eq!(machine.phase(), RoundPhase::CalculatingWinner);
        assert_eq!(machine.state().pending_request, Some(id));

        let err = machine.request_winner(&p("anyone")).unwrap_err();
        assert_eq!(
            err,
            LotteryError::WrongPhase {
                expected: RoundPhase::Closed,
                actual: RoundPhase::CalculatingWinner
            }
        );
    }

    #[traced_test]
    #[test]
    fn test_request_persisted_before_issue() {
        let mut machine = machine();
        fill(&mut machine, &["a", "b", "c"]);

        let (_, actions) = machine.request_winner(&owner()).unwrap();
        let names: Vec<_> = actions.iter().map(Action::type_name).collect();
        assert_eq!(names[..2], ["Persist", "RequestRandomness"]);
        match &actions[0] {
            Action::Persist { snapshot } => {
                assert_eq!(snapshot.round.phase, RoundPhase::CalculatingWinner);
                assert!(snapshot.pending_request.is_some());
            }
            other => panic!("expected persist, got {other:?}"),
        }
    }

    #[traced_test]
    #[test]
    fn test_owner_only_policy() {
        let config = config().with_winner_policy(WinnerPolicy::OwnerOnly);
        let mut machine = LotteryStateMachine::new(owner(), config).unwrap();
        fill(&mut machine, &["a", "b", "c"]);

        assert!(matches!(
            machine.request_winner(&p("a")),
            Err(LotteryError::Unauthorized { .. })
        ));
        assert_eq!(machine.phase(), RoundPhase::Closed);
        assert!(machine.request_winner(&owner()).is_ok());
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Settlement
    // ═══════════════════════════════════════════════════════════════════════

    #[traced_test]
    #[test]
    fn test_worked_example() {
        let mut machine = machine();
        fill(&mut machine, &["A", "B", "C"]);
        assert_eq!(machine.phase(), RoundPhase::Closed);

        let (r1, _) = machine.request_winner(&owner()).unwrap();
        let order = staged_order(machine.settle(r1, RandomValue::from_u64(7)).unwrap());

        assert_eq!(order.winner_index, 1);
        assert_eq!(order.recipient, p("B"));
        assert_eq!(order.amount, Amount(30));
        assert!(machine.state().payout_in_flight);

        let receipt = receipt_for(&order);
        let actions = machine.handle(Event::PayoutCompleted { order, receipt });

        assert_eq!(notifications(&actions), vec!["WinnerSettled", "RoundOpened"]);
        let settled = actions.iter().find_map(|a| match a {
            Action::EmitSettlementResult { result, .. } => Some(result.clone()),
            _ => None,
        });
        let outcome = settled.unwrap().unwrap();
        assert_eq!(outcome.winner, p("B"));
        assert_eq!(outcome.prize, Amount(30));

        let view = machine.state();
        assert_eq!(view.round, RoundId(1));
        assert_eq!(view.phase, RoundPhase::Open);
        assert_eq!(view.entrants, 0);
        assert_eq!(view.pot, Amount::ZERO);
        assert_eq!(machine.recent_winner().map(|o| o.round), Some(RoundId(0)));
    }

    #[traced_test]
    #[test]
    fn test_settle_replay_returns_recorded_outcome() {
        let mut machine = machine();
        fill(&mut machine, &["A", "B", "C"]);
        let (r1, _) = machine.request_winner(&owner()).unwrap();
        let order = staged_order(machine.settle(r1, RandomValue::from_u64(7)).unwrap());
        let receipt = receipt_for(&order);
        machine.handle(Event::PayoutCompleted { order, receipt });
        let version = machine.version();

        match machine.settle(r1, RandomValue::from_u64(7)).unwrap() {
            SettleStep::AlreadySettled(outcome) => assert_eq!(outcome.winner, p("B")),
            SettleStep::Pay { .. } => panic!("replay staged a second payout"),
        }
        assert_eq!(machine.version(), version);

        // Same request, different value: a forged replay.
        assert_eq!(
            machine.settle(r1, RandomValue::from_u64(8)).unwrap_err(),
            LotteryError::UnknownRequest { request: r1 }
        );
    }

    #[traced_test]
    #[test]
    fn test_unknown_request_leaves_state_unchanged() {
        let mut machine = machine();
        fill(&mut machine, &["A", "B", "C"]);
        let (r1, _) = machine.request_winner(&owner()).unwrap();
        let before = machine.snapshot();

        let bogus = RandomnessRequestId(r1.0 + 10);
        assert_eq!(
            machine.settle(bogus, RandomValue::from_u64(1)).unwrap_err(),
            LotteryError::UnknownRequest { request: bogus }
        );
        assert_eq!(machine.snapshot(), before);
    }

    #[traced_test]
    #[test]
    fn test_settle_in_open_round_is_unknown_request() {
        let mut machine = machine();
        let err = machine
            .settle(RandomnessRequestId(1), RandomValue::from_u64(1))
            .unwrap_err();
        assert!(err.is_consistency_violation());
    }

    #[traced_test]
    #[test]
    fn test_payout_failure_keeps_round_settleable() {
        let mut machine = machine();
        fill(&mut machine, &["A", "B", "C"]);
        let (r1, _) = machine.request_winner(&owner()).unwrap();

        let order = staged_order(machine.settle(r1, RandomValue::from_u64(7)).unwrap());
        assert_eq!(
            machine.settle(r1, RandomValue::from_u64(7)).unwrap_err(),
            LotteryError::SettlementInProgress { round: RoundId(0) }
        );

        let actions = machine.handle(Event::PayoutFailed {
            order: order.clone(),
            error: PayoutError::RecipientRejected(p("B")),
        });
        assert_eq!(notifications(&actions), vec!["PayoutFailed"]);
        assert_eq!(machine.phase(), RoundPhase::CalculatingWinner);
        assert_eq!(machine.entrants().len(), 3);
        assert!(!machine.state().payout_in_flight);

        // Retry with the same inputs stages the same payout.
        let retry = staged_order(machine.settle(r1, RandomValue::from_u64(7)).unwrap());
        assert_eq!(retry, order);
        let receipt = receipt_for(&retry);
        machine.handle(Event::PayoutCompleted {
            order: retry,
            receipt,
        });
        assert_eq!(machine.state().round, RoundId(1));
        assert_eq!(machine.ledger().len(), 1);
    }

    #[traced_test]
    #[test]
    fn test_mismatched_receipt_fails_payout() {
        let mut machine = machine();
        fill(&mut machine, &["A", "B", "C"]);
        let (r1, _) = machine.request_winner(&owner()).unwrap();
        let order = staged_order(machine.settle(r1, RandomValue::from_u64(7)).unwrap());

        // The executor reports a transfer to someone else.
        let receipt = Receipt {
            recipient: p("A"),
            ..receipt_for(&order)
        };
        let actions = machine.handle(Event::PayoutCompleted {
            order: order.clone(),
            receipt,
        });

        assert_eq!(notifications(&actions), vec!["PayoutFailed"]);
        let result = actions.iter().find_map(|a| match a {
            Action::EmitSettlementResult { result, .. } => Some(result.clone()),
            _ => None,
        });
        assert_eq!(
            result,
            Some(Err(LotteryError::Payout(PayoutError::ConflictingPayout(
                RoundId(0)
            ))))
        );
        assert!(machine.ledger().is_empty());
        assert_eq!(machine.phase(), RoundPhase::CalculatingWinner);
        assert!(!machine.state().payout_in_flight);
        assert!(logs_contain("Payout receipt does not match the order"));
    }

    #[traced_test]
    #[test]
    fn test_stale_payout_events_ignored() {
        let mut machine = machine();
        fill(&mut machine, &["A", "B", "C"]);
        let (r1, _) = machine.request_winner(&owner()).unwrap();
        let order = staged_order(machine.settle(r1, RandomValue::from_u64(7)).unwrap());
        let receipt = receipt_for(&order);
        machine.handle(Event::PayoutCompleted {
            order: order.clone(),
            receipt: receipt.clone(),
        });

        // A duplicate completion after the round moved on changes nothing.
        let before = machine.snapshot();
        assert!(machine
            .handle(Event::PayoutCompleted { order, receipt })
            .is_empty());
        assert_eq!(machine.snapshot(), before);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Request timeout
    // ═══════════════════════════════════════════════════════════════════════

    #[traced_test]
    #[test]
    fn test_request_timeout_returns_round_to_closed() {
        let mut machine = machine();
        fill(&mut machine, &["A", "B", "C"]);
        machine.set_time(Duration::from_secs(10));
        let (r1, _) = machine.request_winner(&owner()).unwrap();

        // Early fire re-arms for the remainder.
        machine.set_time(Duration::from_secs(20));
        let actions = machine.handle(Event::TimerFired(TimerId::RandomnessTimeout(r1)));
        assert!(matches!(
            actions.as_slice(),
            [Action::SetTimer { duration, .. }] if *duration == Duration::from_secs(20)
        ));
        assert_eq!(machine.phase(), RoundPhase::CalculatingWinner);

        machine.set_time(Duration::from_secs(40));
        let actions = machine.handle(Event::TimerFired(TimerId::RandomnessTimeout(r1)));
        assert_eq!(notifications(&actions), vec!["RandomnessExpired"]);
        assert_eq!(machine.phase(), RoundPhase::Closed);
        assert_eq!(machine.state().pending_request, None);
        assert_eq!(machine.entrants().len(), 3);

        // The expired request is now stale; a re-request issues a fresh id.
        assert!(matches!(
            machine.settle(r1, RandomValue::from_u64(7)),
            Err(LotteryError::UnknownRequest { .. })
        ));
        let (r2, _) = machine.request_winner(&owner()).unwrap();
        assert_ne!(r1, r2);
        assert!(matches!(
            machine.settle(r2, RandomValue::from_u64(7)).unwrap(),
            SettleStep::Pay { .. }
        ));
    }

    #[traced_test]
    #[test]
    fn test_timeout_ignored_once_settlement_started() {
        let mut machine = machine();
        fill(&mut machine, &["A", "B", "C"]);
        let (r1, _) = machine.request_winner(&owner()).unwrap();
        let order = staged_order(machine.settle(r1, RandomValue::from_u64(7)).unwrap());
        machine.handle(Event::PayoutFailed {
            order,
            error: PayoutError::TransferTimeout,
        });

        machine.set_time(Duration::from_secs(1_000));
        assert!(machine
            .handle(Event::TimerFired(TimerId::RandomnessTimeout(r1)))
            .is_empty());
        assert_eq!(machine.phase(), RoundPhase::CalculatingWinner);
    }

    #[traced_test]
    #[test]
    fn test_oracle_rejection_returns_round_to_closed() {
        let mut machine = machine();
        fill(&mut machine, &["A", "B", "C"]);
        let (r1, _) = machine.request_winner(&owner()).unwrap();

        let actions = machine.handle(Event::RandomnessRequestFailed {
            request: r1,
            reason: "oracle offline".to_string(),
        });
        assert_eq!(notifications(&actions), vec!["RandomnessExpired"]);
        assert_eq!(machine.phase(), RoundPhase::Closed);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Admin
    // ═══════════════════════════════════════════════════════════════════════

    #[traced_test]
    #[test]
    fn test_config_updates_apply_to_empty_round() {
        let mut machine = machine();
        machine.update_ticket_price(&owner(), Amount(25)).unwrap();
        machine.update_max_entrants(&owner(), 2).unwrap();

        assert_eq!(machine.state().ticket_price, Amount(25));
        assert_eq!(machine.state().max_entrants, 2);

        machine.enter(p("a"), Amount(25)).unwrap();
        assert!(matches!(
            machine.update_duration(&owner(), Duration::from_secs(5)),
            Err(LotteryError::ConfigLocked { round: RoundId(0) })
        ));
    }

    #[traced_test]
    #[test]
    fn test_config_update_carries_into_next_round() {
        let mut machine = machine();
        fill(&mut machine, &["A", "B", "C"]);
        let (r1, _) = machine.request_winner(&owner()).unwrap();
        let order = staged_order(machine.settle(r1, RandomValue::from_u64(0)).unwrap());
        let receipt = receipt_for(&order);
        machine.handle(Event::PayoutCompleted { order, receipt });

        machine
            .update_request_timeout(&owner(), Some(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(
            machine.config().request_timeout,
            Some(Duration::from_secs(5))
        );
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Recovery
    // ═══════════════════════════════════════════════════════════════════════

    #[traced_test]
    #[test]
    fn test_recover_rearms_request_timeout() {
        let mut machine = machine();
        fill(&mut machine, &["A", "B", "C"]);
        machine.set_time(Duration::from_secs(100));
        let (r1, _) = machine.request_winner(&owner()).unwrap();
        let snapshot = machine.snapshot();

        let (recovered, actions) =
            LotteryStateMachine::recover(snapshot, Duration::from_secs(110)).unwrap();

        assert_eq!(recovered.phase(), RoundPhase::CalculatingWinner);
        assert_eq!(recovered.state().pending_request, Some(r1));
        assert!(matches!(
            actions.as_slice(),
            [Action::SetTimer { id: TimerId::RandomnessTimeout(r), duration }]
                if *r == r1 && *duration == Duration::from_secs(20)
        ));
    }

    #[traced_test]
    #[test]
    fn test_recover_redrives_in_flight_payout() {
        let mut machine = machine();
        fill(&mut machine, &["A", "B", "C"]);
        let (r1, _) = machine.request_winner(&owner()).unwrap();
        let order = staged_order(machine.settle(r1, RandomValue::from_u64(7)).unwrap());

        let (mut recovered, actions) =
            LotteryStateMachine::recover(machine.snapshot(), Duration::ZERO).unwrap();
        assert!(matches!(
            actions.as_slice(),
            [Action::ExecutePayout { order: o }] if *o == order
        ));

        let receipt = receipt_for(&order);
        recovered.handle(Event::PayoutCompleted { order, receipt });
        assert_eq!(recovered.state().round, RoundId(1));
    }

    #[traced_test]
    #[test]
    fn test_recover_open_round_rearms_close_timer() {
        let mut machine = machine();
        machine.set_time(Duration::from_secs(5));
        fill(&mut machine, &["A"]);

        let (_, actions) =
            LotteryStateMachine::recover(machine.snapshot(), Duration::from_secs(50)).unwrap();
        assert!(matches!(
            actions.as_slice(),
            [Action::SetTimer { id: TimerId::RoundClose(RoundId(0)), duration }]
                if *duration == Duration::from_secs(15)
        ));
    }

    #[test]
    fn test_recover_rejects_corrupt_snapshot() {
        let machine = machine();
        let mut snapshot = machine.snapshot();
        snapshot.round.phase = RoundPhase::CalculatingWinner;
        snapshot.round.entrants.push(Entrant {
            participant: p("a"),
            entered_at: Duration::ZERO,
        });

        assert!(matches!(
            LotteryStateMachine::recover(snapshot, Duration::ZERO),
            Err(LotteryError::Storage(_))
        ));
    }

    #[test]
    fn test_persist_bumps_version() {
        let mut machine = machine();
        let v0 = machine.version();
        let (_, actions) = machine.enter(p("a"), PRICE).unwrap();
        assert_eq!(machine.version(), v0 + 1);

        let persisted = actions.iter().find_map(|a| match a {
            Action::Persist { snapshot } => Some(snapshot.version),
            _ => None,
        });
        assert_eq!(persisted, Some(v0 + 1));
    }
}
