// engine/gamification_engine/src/lib.rs

//! # Gamification Engine
//!
//! Loyalty rules for an energy-utility customer app: customer actions turn
//! into XP, XP drives levels and unlocks discount credits, and monthly
//! challenges are completed automatically from recorded data.
//!
//! | Phase         | Entry Point(s)                                              |
//! |---------------|-------------------------------------------------------------|
//! | Actions       | [`Engine::apply`] with an [`Action`]                        |
//! | Consumption   | [`Action::RecordConsumption`]                               |
//! | Flat rewards  | [`Action::PayInvoice`], [`Action::ShareCode`]               |
//! | Challenges    | [`Action::EnrollChallenge`], [`Action::Refresh`]            |
//! | Discounts     | [`Action::RedeemDiscount`]                                  |
//! | Queries       | [`Engine::dashboard`]                                       |
//! | Persistence   | [`storage::encode`], [`storage::decode_or_default`]         |
//!
//! ## Architecture
//!
//! The engine owns no state. [`Engine::apply`] takes the current
//! [`Snapshot`] and returns a new one; on error the caller's snapshot is left
//! exactly as it was. XP accounting lives in [`ledger`], credits in
//! [`milestones`], challenges in [`challenges`] and usage reports in
//! [`consumption`]. This file only sequences them.

pub mod challenges;
pub mod clock;
pub mod config;
pub mod consumption;
pub mod ledger;
pub mod levels;
pub mod milestones;
pub mod storage;
pub mod types;
pub mod view;

#[cfg(test)]
mod test_challenges;
#[cfg(test)]
mod test_scenarios;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::EngineConfig;
pub use types::{
    AwardEntry, ChallengeKey, ChallengeProgress, ChallengeStatus, ConsumptionEntry, CounterKind,
    Counters, Notification, NotificationKind, Period, RedemptionEntry, Snapshot,
};
pub use view::{ChallengeView, DashboardView};

#[derive(Clone, Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid award: {0}")]
    InvalidAward(String),

    #[error("unknown challenge: {0}")]
    UnknownChallenge(String),

    #[error("no discount credits available")]
    NoCreditsAvailable,

    #[error("corrupt persisted state: {0}")]
    CorruptPersistedState(String),

    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("snapshot encoding failed: {0}")]
    Encode(String),
}

impl EngineError {
    /// Errors caused by the caller's input rather than engine state.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::InvalidAward(_) | Self::UnknownChallenge(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// One external event from the shell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    RecordConsumption { period: Period, usage: f64 },
    PayInvoice,
    ShareCode { period: Period },
    EnrollChallenge { challenge_id: String, period: Period },
    RedeemDiscount { period: Period },
    /// Re-check pending challenges, e.g. on navigation.
    Refresh { period: Period },
}

#[derive(Clone)]
pub struct Engine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn current_period(&self) -> Period {
        Period::current(self.clock.now())
    }

    /// Apply `action` to a copy of `snapshot`.
    ///
    /// All-or-nothing: the returned snapshot reflects the whole action, and
    /// an error means nothing changed.
    pub fn apply(&self, snapshot: &Snapshot, action: Action) -> Result<Snapshot> {
        let now = self.clock.now();
        let mut next = snapshot.clone();
        debug!(?action, "applying action");
        self.dispatch(&mut next, action, now)?;
        Ok(next)
    }

    fn dispatch(&self, snapshot: &mut Snapshot, action: Action, now: DateTime<Utc>) -> Result<()> {
        let config = &self.config;
        match action {
            Action::RecordConsumption { period, usage } => {
                consumption::record(snapshot, config, period.clone(), usage, now)?;
                challenges::evaluate_period(snapshot, config, &period, now)?;
            }
            Action::PayInvoice => {
                snapshot.counters.paid_invoices += 1;
                ledger::award(
                    snapshot,
                    config,
                    config.invoice_payment_xp,
                    "Invoice payment",
                    now,
                )?;
            }
            Action::ShareCode { period } => {
                snapshot.counters.shares += 1;
                ledger::award(
                    snapshot,
                    config,
                    config.referral_share_xp,
                    "Referral code shared",
                    now,
                )?;
                challenges::evaluate_period(snapshot, config, &period, now)?;
            }
            Action::EnrollChallenge {
                challenge_id,
                period,
            } => {
                challenges::enroll(snapshot, config, &challenge_id, &period, now)?;
                challenges::evaluate(snapshot, config, &challenge_id, &period, now)?;
            }
            Action::RedeemDiscount { period } => {
                milestones::redeem(
                    snapshot,
                    config,
                    period,
                    milestones::MILESTONE_DISCOUNT_SOURCE,
                    now,
                )?;
            }
            Action::Refresh { period } => {
                challenges::evaluate_period(snapshot, config, &period, now)?;
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────
    // Convenience entry points
    // ─────────────────────────────────────────────────────────

    pub fn record_consumption(
        &self,
        snapshot: &Snapshot,
        period: Period,
        usage: f64,
    ) -> Result<Snapshot> {
        self.apply(snapshot, Action::RecordConsumption { period, usage })
    }

    pub fn pay_invoice(&self, snapshot: &Snapshot) -> Result<Snapshot> {
        self.apply(snapshot, Action::PayInvoice)
    }

    /// Share the referral code during the current period.
    pub fn share_code(&self, snapshot: &Snapshot) -> Result<Snapshot> {
        let period = self.current_period();
        self.apply(snapshot, Action::ShareCode { period })
    }

    /// Join `challenge_id` for the current period.
    pub fn enroll_challenge(&self, snapshot: &Snapshot, challenge_id: &str) -> Result<Snapshot> {
        let period = self.current_period();
        self.apply(
            snapshot,
            Action::EnrollChallenge {
                challenge_id: challenge_id.to_string(),
                period,
            },
        )
    }

    pub fn redeem_discount(&self, snapshot: &Snapshot, period: Period) -> Result<Snapshot> {
        self.apply(snapshot, Action::RedeemDiscount { period })
    }

    pub fn available_credits(&self, snapshot: &Snapshot) -> usize {
        milestones::available_credits(snapshot, &self.config)
    }

    pub fn dashboard(&self, snapshot: &Snapshot, period: &Period) -> DashboardView {
        view::dashboard(snapshot, &self.config, period)
    }
}
