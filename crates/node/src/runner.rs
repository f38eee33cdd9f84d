//! Single-writer runner.
//!
//! One tokio task owns the [`LotteryStateMachine`]. Client commands and
//! asynchronous events share a single inbox, so every transition observes
//! the state left by the previous one. Side effects requested by the state
//! machine run in spawned tasks; their results come back through the same
//! inbox as events.
//!
//! Snapshots are written before any other effect of a transition. A command
//! whose snapshot cannot be written is rolled back to the state before it
//! and answered with `Storage`; none of its effects run. Events report
//! things that already happened outside (a timer fired, a transfer
//! finished), so their transitions stand even when the write fails and the
//! next successful write catches the store up.
//!
//! ```text
//!   LotteryHandle ──Command──┐
//!                            ▼
//!   timers ──────Event────► inbox ──► Runner ──► LotteryStateMachine
//!   payout tasks ──Event────┘          │
//!   oracle issuance ──Event─┘          ├── Persist ──► RoundStore
//!                                      ├── Notify ───► subscribers
//!                                      └── spawn timers / payouts / requests
//! ```

use crate::subscribers::Subscribers;
use crate::{Clock, LotteryHandle, MemoryStore, RoundStore};
use lottery_core::{Action, Event, LotteryError, StateMachine, TimerId};
use lottery_machine::{EntryReceipt, LotteryStateMachine, RoundView, SettleStep};
use lottery_payout::PayoutExecutor;
use lottery_randomness::{Fulfillment, RandomnessClient};
use lottery_types::{
    Amount, Entrant, LotteryConfig, Outcome, ParticipantId, PayoutOrder, RandomnessRequest,
    RandomnessRequestId, RoundId,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

pub(crate) type Reply<T> = oneshot::Sender<Result<T, LotteryError>>;

/// Inbox message.
pub(crate) enum Input {
    Command(Command),
    Event(Event),
}

/// Client request, answered on its reply channel.
pub(crate) enum Command {
    Enter {
        participant: ParticipantId,
        paid: Amount,
        reply: Reply<EntryReceipt>,
    },
    RequestWinner {
        caller: ParticipantId,
        reply: Reply<RandomnessRequestId>,
    },
    /// Answered once the payout finishes, not when it is staged.
    Fulfill {
        fulfillment: Fulfillment,
        reply: Reply<Outcome>,
    },
    UpdateConfig {
        caller: ParticipantId,
        update: ConfigUpdate,
        reply: Reply<()>,
    },
    Query(Query),
}

pub(crate) enum ConfigUpdate {
    TicketPrice(Amount),
    MaxEntrants(u32),
    Duration(Duration),
    RequestTimeout(Option<Duration>),
}

pub(crate) enum Query {
    State(oneshot::Sender<RoundView>),
    Entrants(oneshot::Sender<Vec<Entrant>>),
    History(oneshot::Sender<Vec<Outcome>>),
    RecentWinner(oneshot::Sender<Option<Outcome>>),
}

/// Builds and spawns a lottery runner.
///
/// On spawn the store is consulted first: a stored snapshot is recovered
/// (its owner and configuration win over the builder's), otherwise a fresh
/// lottery starts at round 0.
pub struct NodeBuilder {
    owner: ParticipantId,
    config: LotteryConfig,
    store: Arc<dyn RoundStore>,
    clock: Option<Clock>,
    inbox_capacity: usize,
}

impl NodeBuilder {
    /// Create a builder with an in-memory store and the system clock.
    pub fn new(owner: ParticipantId, config: LotteryConfig) -> Self {
        Self {
            owner,
            config,
            store: Arc::new(MemoryStore::new()),
            clock: None,
            inbox_capacity: 1024,
        }
    }

    /// Persist through `store`.
    pub fn with_store(mut self, store: Arc<dyn RoundStore>) -> Self {
        self.store = store;
        self
    }

    /// Read time from `clock`.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Bound on queued client commands. Callers wait while it is full.
    pub fn with_inbox_capacity(mut self, capacity: usize) -> Self {
        self.inbox_capacity = capacity;
        self
    }

    /// Load or create the lottery and spawn its runner.
    ///
    /// Must be called from within a tokio runtime. The runner stops once
    /// every [`LotteryHandle`] is dropped.
    pub fn spawn(
        self,
        randomness: RandomnessClient,
        payout: Arc<dyn PayoutExecutor>,
    ) -> Result<(LotteryHandle, JoinHandle<()>), LotteryError> {
        let clock = self.clock.unwrap_or_else(Clock::system);
        let now = clock.now();

        let (machine, startup) = match self.store.load()? {
            Some(snapshot) => LotteryStateMachine::recover(snapshot, now)?,
            None => {
                let mut machine = LotteryStateMachine::new(self.owner, self.config)?;
                machine.set_time(now);
                let actions = machine.start();
                (machine, actions)
            }
        };

        let (inbox_tx, inbox_rx) = mpsc::channel(self.inbox_capacity);
        let subscribers = Subscribers::new();

        let runner = Runner {
            machine,
            inbox: inbox_rx,
            events: inbox_tx.downgrade(),
            store: self.store,
            randomness: Arc::new(randomness),
            payout,
            subscribers: subscribers.clone(),
            clock,
            settlement_waiters: HashMap::new(),
        };

        let task = tokio::spawn(runner.run(startup));
        Ok((LotteryHandle::new(inbox_tx, subscribers), task))
    }
}

struct Runner {
    machine: LotteryStateMachine,
    inbox: mpsc::Receiver<Input>,
    /// Weak so that spawned tasks do not keep the runner alive.
    events: mpsc::WeakSender<Input>,
    store: Arc<dyn RoundStore>,
    randomness: Arc<RandomnessClient>,
    payout: Arc<dyn PayoutExecutor>,
    subscribers: Subscribers,
    clock: Clock,
    /// Fulfill callers waiting for their round's payout to finish.
    settlement_waiters: HashMap<RoundId, Vec<Reply<Outcome>>>,
}

impl Runner {
    async fn run(mut self, startup: Vec<Action>) {
        let view = self.machine.state();
        info!(
            round = view.round.0,
            phase = %view.phase,
            version = view.version,
            "Lottery runner started"
        );

        self.execute(startup);

        while let Some(input) = self.inbox.recv().await {
            match input {
                Input::Command(command) => self.on_command(command),
                Input::Event(event) => self.on_event(event),
            }
        }

        self.subscribers.close();
        info!(round = self.machine.state().round.0, "Lottery runner stopped");
    }

    fn on_command(&mut self, command: Command) {
        // A passed deadline is an event in its own right.
        let actions = self.machine.advance_time(self.clock.now());
        self.execute(actions);

        if let Command::Query(query) = command {
            self.on_query(query);
            return;
        }

        let checkpoint = self.machine.clone();
        match command {
            Command::Enter {
                participant,
                paid,
                reply,
            } => {
                let result = self.machine.enter(participant, paid);
                let _ = reply.send(self.apply(result, checkpoint));
            }
            Command::RequestWinner { caller, reply } => {
                let result = self.machine.request_winner(&caller);
                let _ = reply.send(self.apply(result, checkpoint));
            }
            Command::Fulfill { fulfillment, reply } => {
                self.on_fulfill(fulfillment, reply, checkpoint)
            }
            Command::UpdateConfig {
                caller,
                update,
                reply,
            } => {
                let result = match update {
                    ConfigUpdate::TicketPrice(price) => {
                        self.machine.update_ticket_price(&caller, price)
                    }
                    ConfigUpdate::MaxEntrants(max) => self.machine.update_max_entrants(&caller, max),
                    ConfigUpdate::Duration(duration) => {
                        self.machine.update_duration(&caller, duration)
                    }
                    ConfigUpdate::RequestTimeout(timeout) => {
                        self.machine.update_request_timeout(&caller, timeout)
                    }
                };
                let result = result.map(|actions| ((), actions));
                let _ = reply.send(self.apply(result, checkpoint));
            }
            Command::Query(_) => {}
        }
    }

    fn on_fulfill(
        &mut self,
        fulfillment: Fulfillment,
        reply: Reply<Outcome>,
        checkpoint: LotteryStateMachine,
    ) {
        let step = self
            .randomness
            .verify(fulfillment)
            .and_then(|f| self.machine.settle(f.request, f.value));

        match step {
            Ok(SettleStep::AlreadySettled(outcome)) => {
                let _ = reply.send(Ok(outcome));
            }
            Ok(SettleStep::Pay { order, actions }) => match self.commit(actions, checkpoint) {
                Ok(()) => self
                    .settlement_waiters
                    .entry(order.round)
                    .or_default()
                    .push(reply),
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
            Err(e) => {
                let _ = reply.send(Err(e));
            }
        }
    }

    fn on_query(&self, query: Query) {
        match query {
            Query::State(reply) => {
                let _ = reply.send(self.machine.state());
            }
            Query::Entrants(reply) => {
                let _ = reply.send(self.machine.entrants().to_vec());
            }
            Query::History(reply) => {
                let _ = reply.send(self.machine.history().cloned().collect());
            }
            Query::RecentWinner(reply) => {
                let _ = reply.send(self.machine.recent_winner().cloned());
            }
        }
    }

    fn on_event(&mut self, event: Event) {
        trace!(event = event.type_name(), "Handling event");
        self.machine.set_time(self.clock.now());
        let actions = self.machine.handle(event);
        self.execute(actions);
    }

    /// Commit a command's transition, then hand back its result.
    fn apply<T>(
        &mut self,
        result: Result<(T, Vec<Action>), LotteryError>,
        checkpoint: LotteryStateMachine,
    ) -> Result<T, LotteryError> {
        let (value, actions) = result?;
        self.commit(actions, checkpoint)?;
        Ok(value)
    }

    /// Make a command's transition durable, then perform its effects.
    ///
    /// If a snapshot cannot be written the machine is restored to
    /// `checkpoint` and no effect runs.
    fn commit(
        &mut self,
        actions: Vec<Action>,
        checkpoint: LotteryStateMachine,
    ) -> Result<(), LotteryError> {
        let (effects, saved) = self.save_snapshots(actions);
        if let Err(e) = saved {
            warn!(
                version = checkpoint.version(),
                error = %e,
                "Command rolled back, snapshot not written"
            );
            self.machine = checkpoint;
            return Err(e);
        }
        self.perform(effects);
        Ok(())
    }

    /// Perform an event's actions. A failed write is logged and the effects
    /// still run.
    fn execute(&mut self, actions: Vec<Action>) {
        let (effects, saved) = self.save_snapshots(actions);
        if let Err(e) = saved {
            error!(
                version = self.machine.version(),
                error = %e,
                "Event transition not persisted"
            );
        }
        self.perform(effects);
    }

    /// Write the snapshots among `actions`, returning the other actions in
    /// order. Stops at the first failed write.
    fn save_snapshots(&self, actions: Vec<Action>) -> (Vec<Action>, Result<(), LotteryError>) {
        let mut effects = Vec::with_capacity(actions.len());
        let mut saved = Ok(());
        for action in actions {
            match action {
                Action::Persist { snapshot } => {
                    if saved.is_err() {
                        continue;
                    }
                    if let Err(e) = self.store.save(&snapshot) {
                        error!(version = snapshot.version, error = %e, "Failed to persist snapshot");
                        saved = Err(e.into());
                    }
                }
                other => effects.push(other),
            }
        }
        (effects, saved)
    }

    fn perform(&mut self, effects: Vec<Action>) {
        for action in effects {
            trace!(action = action.type_name(), "Executing action");
            match action {
                Action::SetTimer { id, duration } => self.set_timer(id, duration),
                Action::RequestRandomness { request } => self.issue_request(request),
                Action::CollectPayment {
                    round,
                    payer,
                    amount,
                } => self.payout.collect(round, &payer, amount),
                Action::ExecutePayout { order } => self.execute_payout(order),
                Action::Notify(notification) => self.subscribers.publish(&notification),
                // Written before any effect runs.
                Action::Persist { .. } => {}
                Action::EmitSettlementResult { round, result } => {
                    let waiters = self.settlement_waiters.remove(&round).unwrap_or_default();
                    debug!(round = round.0, waiters = waiters.len(), "Settlement finished");
                    for waiter in waiters {
                        let _ = waiter.send(result.clone());
                    }
                }
            }
        }
    }

    fn set_timer(&self, id: TimerId, duration: Duration) {
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            post(&events, Event::TimerFired(id)).await;
        });
    }

    fn issue_request(&self, request: RandomnessRequest) {
        let client = Arc::clone(&self.randomness);
        let events = self.events.clone();
        tokio::spawn(async move {
            if let Err(e) = client.issue(&request).await {
                let event = Event::RandomnessRequestFailed {
                    request: request.id,
                    reason: e.to_string(),
                };
                post(&events, event).await;
            }
        });
    }

    fn execute_payout(&self, order: PayoutOrder) {
        let payout = Arc::clone(&self.payout);
        let events = self.events.clone();
        info!(
            round = order.round.0,
            recipient = %order.recipient,
            amount = order.amount.0,
            "Executing payout"
        );
        tokio::spawn(async move {
            let event = match payout.pay(&order).await {
                Ok(receipt) => Event::PayoutCompleted { order, receipt },
                Err(error) => Event::PayoutFailed { order, error },
            };
            post(&events, event).await;
        });
    }
}

async fn post(events: &mpsc::WeakSender<Input>, event: Event) {
    let Some(inbox) = events.upgrade() else {
        warn!(event = event.type_name(), "Runner stopped, dropping event");
        return;
    };
    if inbox.send(Input::Event(event)).await.is_err() {
        warn!("Runner stopped before event delivery");
    }
}
