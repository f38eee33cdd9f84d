//! Admin gateway.

use lottery_core::LotteryError;
use lottery_types::{Amount, LotteryConfig, ParticipantId, Round, RoundPhase, WinnerPolicy};
use std::time::Duration;
use tracing::{info, warn};

/// Owns the lottery configuration and validates privileged changes.
///
/// Updates are checked in a fixed order: caller authorization, then the
/// config lock (live round open and empty), then the new values themselves.
/// A rejected update leaves the configuration untouched.
#[derive(Debug, Clone)]
pub struct AdminGateway {
    owner: ParticipantId,
    config: LotteryConfig,
}

impl AdminGateway {
    /// Create a gateway, validating the initial configuration.
    pub fn new(owner: ParticipantId, config: LotteryConfig) -> Result<Self, LotteryError> {
        config.validate().map_err(LotteryError::InvalidConfig)?;
        Ok(Self { owner, config })
    }

    /// The lottery owner.
    pub fn owner(&self) -> &ParticipantId {
        &self.owner
    }

    /// Active configuration.
    pub fn config(&self) -> &LotteryConfig {
        &self.config
    }

    /// Fail with `Unauthorized` unless `caller` is the owner.
    pub fn authorize(&self, caller: &ParticipantId) -> Result<(), LotteryError> {
        if caller == &self.owner {
            Ok(())
        } else {
            warn!(caller = %caller, "Rejected privileged call");
            Err(LotteryError::Unauthorized {
                caller: caller.clone(),
            })
        }
    }

    /// Check `caller` against the winner request policy.
    pub fn authorize_winner_request(&self, caller: &ParticipantId) -> Result<(), LotteryError> {
        match self.config.winner_policy {
            WinnerPolicy::Permissionless => Ok(()),
            WinnerPolicy::OwnerOnly => self.authorize(caller),
        }
    }

    /// Change the ticket price.
    pub fn update_ticket_price(
        &mut self,
        caller: &ParticipantId,
        round: &Round,
        ticket_price: Amount,
    ) -> Result<(), LotteryError> {
        self.update(caller, round, |config| config.ticket_price = ticket_price)?;
        info!(ticket_price = ticket_price.0, "Ticket price updated");
        Ok(())
    }

    /// Change the round capacity.
    pub fn update_max_entrants(
        &mut self,
        caller: &ParticipantId,
        round: &Round,
        max_entrants: u32,
    ) -> Result<(), LotteryError> {
        self.update(caller, round, |config| config.max_entrants = max_entrants)?;
        info!(max_entrants, "Max entrants updated");
        Ok(())
    }

    /// Change the round duration.
    pub fn update_duration(
        &mut self,
        caller: &ParticipantId,
        round: &Round,
        duration: Duration,
    ) -> Result<(), LotteryError> {
        self.update(caller, round, |config| config.duration = duration)?;
        info!(duration = ?duration, "Round duration updated");
        Ok(())
    }

    /// Change the randomness request timeout.
    pub fn update_request_timeout(
        &mut self,
        caller: &ParticipantId,
        round: &Round,
        request_timeout: Option<Duration>,
    ) -> Result<(), LotteryError> {
        self.update(caller, round, |config| {
            config.request_timeout = request_timeout
        })?;
        info!(request_timeout = ?request_timeout, "Request timeout updated");
        Ok(())
    }

    fn update(
        &mut self,
        caller: &ParticipantId,
        round: &Round,
        apply: impl FnOnce(&mut LotteryConfig),
    ) -> Result<(), LotteryError> {
        self.authorize(caller)?;

        if round.phase != RoundPhase::Open || !round.is_empty() {
            return Err(LotteryError::ConfigLocked { round: round.id });
        }

        let mut proposed = self.config.clone();
        apply(&mut proposed);
        proposed.validate().map_err(LotteryError::InvalidConfig)?;

        self.config = proposed;
        Ok(())
    }
}
