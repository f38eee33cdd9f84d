//! Public API of a running lottery.

use crate::runner::{Command, ConfigUpdate, Input, Query, Reply};
use crate::subscribers::Subscribers;
use lottery_core::{LotteryError, Notification};
use lottery_machine::{EntryReceipt, RoundView};
use lottery_randomness::Fulfillment;
use lottery_types::{Amount, Entrant, Outcome, ParticipantId, RandomnessRequestId};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Cloneable handle to a running lottery.
///
/// Every call is a message to the runner's inbox. Calls fail with
/// `ServiceStopped` once the runner has exited.
#[derive(Clone)]
pub struct LotteryHandle {
    inbox: mpsc::Sender<Input>,
    subscribers: Subscribers,
}

impl LotteryHandle {
    pub(crate) fn new(inbox: mpsc::Sender<Input>, subscribers: Subscribers) -> Self {
        Self { inbox, subscribers }
    }

    // ─── Entry ──────────────────────────────────────────────────────────────

    /// Enter the live round, paying `paid`.
    pub async fn enter(
        &self,
        participant: ParticipantId,
        paid: Amount,
    ) -> Result<EntryReceipt, LotteryError> {
        self.call(|reply| Command::Enter {
            participant,
            paid,
            reply,
        })
        .await
    }

    // ─── Settlement ─────────────────────────────────────────────────────────

    /// Request randomness for the closed round.
    pub async fn request_winner(
        &self,
        caller: ParticipantId,
    ) -> Result<RandomnessRequestId, LotteryError> {
        self.call(|reply| Command::RequestWinner { caller, reply })
            .await
    }

    /// Deliver an oracle fulfillment.
    ///
    /// Resolves once the winner has been paid and recorded, or with the
    /// error that stopped it. A failed payout leaves the round settleable;
    /// calling again with the same fulfillment retries it. Replaying a
    /// fulfillment that already settled returns the recorded outcome.
    pub async fn fulfill(&self, fulfillment: Fulfillment) -> Result<Outcome, LotteryError> {
        self.call(|reply| Command::Fulfill { fulfillment, reply })
            .await
    }

    /// Feed fulfillments from an oracle delivery channel into the lottery.
    ///
    /// The forwarding task holds a handle, so the runner stays up until the
    /// channel closes or the task is aborted.
    pub fn forward_fulfillments(
        &self,
        mut fulfillments: mpsc::UnboundedReceiver<Fulfillment>,
    ) -> JoinHandle<()> {
        let handle = self.clone();
        tokio::spawn(async move {
            while let Some(fulfillment) = fulfillments.recv().await {
                let request = fulfillment.request;
                match handle.fulfill(fulfillment).await {
                    Ok(outcome) => debug!(
                        request = request.0,
                        round = outcome.round.0,
                        "Fulfillment settled"
                    ),
                    Err(LotteryError::ServiceStopped) => break,
                    Err(e) => warn!(request = request.0, error = %e, "Fulfillment not settled"),
                }
            }
        })
    }

    // ─── Admin ──────────────────────────────────────────────────────────────

    /// Change the ticket price. Owner only, open empty round only.
    pub async fn update_ticket_price(
        &self,
        caller: ParticipantId,
        ticket_price: Amount,
    ) -> Result<(), LotteryError> {
        self.update(caller, ConfigUpdate::TicketPrice(ticket_price))
            .await
    }

    /// Change the round capacity. Owner only, open empty round only.
    pub async fn update_max_entrants(
        &self,
        caller: ParticipantId,
        max_entrants: u32,
    ) -> Result<(), LotteryError> {
        self.update(caller, ConfigUpdate::MaxEntrants(max_entrants))
            .await
    }

    /// Change the round duration. Owner only, open empty round only.
    pub async fn update_duration(
        &self,
        caller: ParticipantId,
        duration: Duration,
    ) -> Result<(), LotteryError> {
        self.update(caller, ConfigUpdate::Duration(duration)).await
    }

    /// Change or disable the randomness request timeout.
    pub async fn update_request_timeout(
        &self,
        caller: ParticipantId,
        request_timeout: Option<Duration>,
    ) -> Result<(), LotteryError> {
        self.update(caller, ConfigUpdate::RequestTimeout(request_timeout))
            .await
    }

    async fn update(&self, caller: ParticipantId, update: ConfigUpdate) -> Result<(), LotteryError> {
        self.call(|reply| Command::UpdateConfig {
            caller,
            update,
            reply,
        })
        .await
    }

    // ─── Queries ────────────────────────────────────────────────────────────

    /// Summary of the live round.
    pub async fn state(&self) -> Result<RoundView, LotteryError> {
        self.query(Query::State).await
    }

    /// Entrants of the live round.
    pub async fn entrants(&self) -> Result<Vec<Entrant>, LotteryError> {
        self.query(Query::Entrants).await
    }

    /// Settled rounds in ascending order.
    pub async fn history(&self) -> Result<Vec<Outcome>, LotteryError> {
        self.query(Query::History).await
    }

    /// The most recent outcome.
    pub async fn recent_winner(&self) -> Result<Option<Outcome>, LotteryError> {
        self.query(Query::RecentWinner).await
    }

    /// Subscribe to notifications published from now on.
    ///
    /// Every notification is queued for the subscriber until it is read,
    /// however far behind the reader falls. The stream ends when the runner
    /// stops.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Notification> {
        self.subscribers.subscribe()
    }

    // ─── Plumbing ───────────────────────────────────────────────────────────

    async fn call<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T, LotteryError> {
        let (reply, response) = oneshot::channel();
        self.send(Input::Command(command(reply))).await?;
        response.await.map_err(|_| LotteryError::ServiceStopped)?
    }

    async fn query<T>(&self, query: impl FnOnce(oneshot::Sender<T>) -> Query) -> Result<T, LotteryError> {
        let (reply, response) = oneshot::channel();
        self.send(Input::Command(Command::Query(query(reply))))
            .await?;
        response.await.map_err(|_| LotteryError::ServiceStopped)
    }

    async fn send(&self, input: Input) -> Result<(), LotteryError> {
        self.inbox
            .send(input)
            .await
            .map_err(|_| LotteryError::ServiceStopped)
    }
}
