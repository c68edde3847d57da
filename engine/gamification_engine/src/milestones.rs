//! Milestone-discount tracker.
//!
//! Credits are never stored. They are derived from the XP total and the
//! length of the redemption log:
//!
//! ```text
//! available = unlocked(xp_total) - redemptions.len()   (floored at 0)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::EngineConfig;
use crate::ledger::notify;
use crate::types::{NotificationKind, Period, RedemptionEntry, Snapshot};
use crate::{EngineError, Result};

/// Default label stored on redemptions made from XP milestones.
pub const MILESTONE_DISCOUNT_SOURCE: &str = "XP milestone discount";

/// Ascending XP thresholds, each unlocking one discount credit.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MilestoneSet(Vec<u64>);

impl Default for MilestoneSet {
    fn default() -> Self {
        Self::every(500, 10)
    }
}

impl MilestoneSet {
    /// `count` thresholds spaced `step` XP apart, starting at `step`.
    pub fn every(step: u64, count: u64) -> Self {
        Self((1..=count).map(|i| i * step).collect())
    }

    pub fn validate(&self) -> Result<()> {
        if self.0.iter().any(|t| *t == 0) {
            return Err(EngineError::InvalidConfig(
                "milestone thresholds must be positive".into(),
            ));
        }
        if self.0.windows(2).any(|w| w[0] >= w[1]) {
            return Err(EngineError::InvalidConfig(
                "milestone thresholds must be strictly ascending".into(),
            ));
        }
        Ok(())
    }

    pub fn thresholds(&self) -> &[u64] {
        &self.0
    }

    pub fn unlocked_count(&self, xp: u64) -> usize {
        self.0.iter().filter(|t| **t <= xp).count()
    }

    /// Thresholds with `previous < t <= current`, ascending.
    pub fn crossed(&self, previous: u64, current: u64) -> Vec<u64> {
        self.0
            .iter()
            .copied()
            .filter(|t| previous < *t && *t <= current)
            .collect()
    }
}

pub fn available_credits(snapshot: &Snapshot, config: &EngineConfig) -> usize {
    config
        .milestones
        .unlocked_count(snapshot.xp_total)
        .saturating_sub(snapshot.redemptions.len())
}

/// Money saved through redemptions so far.
pub fn total_savings(snapshot: &Snapshot, config: &EngineConfig) -> f64 {
    snapshot.redemptions.len() as f64 * config.discount_value
}

/// Consume one credit against the invoice of `period`.
pub fn redeem(
    snapshot: &mut Snapshot,
    config: &EngineConfig,
    period: Period,
    source: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    if available_credits(snapshot, config) == 0 {
        return Err(EngineError::NoCreditsAvailable);
    }

    let message = format!(
        "Applied a {:.2} discount to the {} invoice.",
        config.discount_value, period
    );
    snapshot.redemptions.insert(
        0,
        RedemptionEntry {
            timestamp: now,
            period: period.clone(),
            source: source.to_string(),
        },
    );
    notify(snapshot, config, NotificationKind::Discount, message, now);

    info!(
        %period,
        remaining = available_credits(snapshot, config),
        "discount credit redeemed"
    );
    Ok(())
}
