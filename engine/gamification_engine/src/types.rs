//! # Types
//!
//! Shared data structures used across all modules of the engine.
//!
//! ## Design decisions
//!
//! ### One owned snapshot
//!
//! Every piece of mutable state lives in a single [`Snapshot`] value. The
//! engine never holds it; callers pass it in and receive a new one back, so
//! the persistence collaborator only ever serializes this one struct.
//!
//! ### Challenge progress as a Finite-State Machine
//!
//! [`ChallengeStatus`] enforces a strict forward-only lifecycle per
//! [`ChallengeKey`]:
//!
//! ```text
//! NotEnrolled ──► Enrolled ──► Rewarded
//! ```
//!
//! `Rewarded` is terminal. The key is also recorded in
//! [`Snapshot::claimed`], which is consulted before any reward is granted.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EngineError, Result};

/// Calendar-month key (`YYYY-MM`).
///
/// Opaque to the engine apart from ordering: lexicographic order must match
/// chronological order.
/// Deserialising goes through [`Period::new`], so a blank period never
/// reaches the engine from JSON either.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period(String);

impl Period {
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(EngineError::InvalidInput("period must not be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The period containing `now`, formatted as `YYYY-MM`.
    pub fn current(now: DateTime<Utc>) -> Self {
        Self(now.format("%Y-%m").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Period {
    type Error = EngineError;

    fn try_from(raw: String) -> Result<Self> {
        Self::new(raw)
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.0
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of entry in the notification feed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Xp,
    #[serde(alias = "desconto")]
    Discount,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// One XP grant. Immutable once created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AwardEntry {
    pub timestamp: DateTime<Utc>,
    pub amount: u64,
    pub reason: String,
}

/// One consumed discount credit. Redemptions are permanent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RedemptionEntry {
    pub timestamp: DateTime<Utc>,
    /// Invoice period the discount was applied to.
    pub period: Period,
    pub source: String,
}

/// Monthly usage report. `period` is unique within the register.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionEntry {
    pub period: Period,
    /// Usage in kWh.
    pub usage: f64,
    /// XP granted for this report (0 when no tier matched).
    pub award: u64,
}

/// External activity counters that challenge rules can observe.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterKind {
    PaidInvoices,
    Shares,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Counters {
    pub paid_invoices: u64,
    pub shares: u64,
}

impl Counters {
    pub fn get(&self, kind: CounterKind) -> u64 {
        match kind {
            CounterKind::PaidInvoices => self.paid_invoices,
            CounterKind::Shares => self.shares,
        }
    }
}

/// Composite `(challenge, period)` key.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct ChallengeKey {
    pub challenge_id: String,
    pub period: Period,
}

impl ChallengeKey {
    pub fn new(challenge_id: impl Into<String>, period: Period) -> Self {
        Self {
            challenge_id: challenge_id.into(),
            period,
        }
    }
}

impl fmt::Display for ChallengeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.challenge_id, self.period)
    }
}

/// Display state of a challenge for one period.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    NotEnrolled,
    Enrolled,
    Rewarded,
}

/// Enrollment record for one [`ChallengeKey`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChallengeProgress {
    pub key: ChallengeKey,
    pub enrolled: bool,
    pub rewarded: bool,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Counter values captured at enrollment, for "gained since joining" rules.
    #[serde(default)]
    pub baseline: BTreeMap<CounterKind, u64>,
}

impl ChallengeProgress {
    pub fn status(&self) -> ChallengeStatus {
        if self.rewarded {
            ChallengeStatus::Rewarded
        } else if self.enrolled {
            ChallengeStatus::Enrolled
        } else {
            ChallengeStatus::NotEnrolled
        }
    }
}

/// The whole persisted state of one customer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub xp_total: u64,
    pub achievement_count: u64,
    pub counters: Counters,
    /// Newest first.
    pub award_history: Vec<AwardEntry>,
    /// Newest first.
    pub notifications: Vec<Notification>,
    /// Newest first. Never truncated: its length is the number of consumed credits.
    pub redemptions: Vec<RedemptionEntry>,
    /// Newest period first.
    pub consumption: Vec<ConsumptionEntry>,
    #[serde(with = "progress_map")]
    pub challenges: BTreeMap<ChallengeKey, ChallengeProgress>,
    pub claimed: BTreeSet<ChallengeKey>,
}

impl Snapshot {
    pub fn consumption_for(&self, period: &Period) -> Option<&ConsumptionEntry> {
        self.consumption.iter().find(|e| &e.period == period)
    }

    /// Most recent entry whose period is strictly earlier than `period`.
    pub fn consumption_before(&self, period: &Period) -> Option<&ConsumptionEntry> {
        self.consumption
            .iter()
            .filter(|e| &e.period < period)
            .max_by(|a, b| a.period.cmp(&b.period))
    }

    pub fn challenge_status(&self, key: &ChallengeKey) -> ChallengeStatus {
        self.challenges
            .get(key)
            .map(ChallengeProgress::status)
            .unwrap_or(ChallengeStatus::NotEnrolled)
    }
}

/// JSON objects need string keys, so progress is stored as a list and
/// re-keyed on load.
mod progress_map {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::{ChallengeKey, ChallengeProgress};

    pub fn serialize<S>(
        map: &BTreeMap<ChallengeKey, ChallengeProgress>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(map.values())
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> std::result::Result<BTreeMap<ChallengeKey, ChallengeProgress>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entries = Vec::<ChallengeProgress>::deserialize(deserializer)?;
        Ok(entries.into_iter().map(|p| (p.key.clone(), p)).collect())
    }
}
