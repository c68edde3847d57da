//! Consumption register.
//!
//! Monthly usage reports, one per period, newest period first. Recording a
//! report may grant XP through the ledger; it never touches challenges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EngineConfig;
use crate::ledger::{award, check_award, notify};
use crate::types::{ConsumptionEntry, NotificationKind, Period, Snapshot};
use crate::{EngineError, Result};

/// Usage strictly below `below_kwh` earns `award_xp`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RewardTier {
    pub below_kwh: f64,
    pub award_xp: u64,
}

/// Reward step function, checked in ascending `below_kwh` order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RewardTiers(Vec<RewardTier>);

impl Default for RewardTiers {
    fn default() -> Self {
        Self(vec![
            RewardTier {
                below_kwh: 200.0,
                award_xp: 60,
            },
            RewardTier {
                below_kwh: 700.0,
                award_xp: 40,
            },
            RewardTier {
                below_kwh: 900.0,
                award_xp: 20,
            },
        ])
    }
}

impl RewardTiers {
    pub fn new(tiers: Vec<RewardTier>) -> Result<Self> {
        let tiers = Self(tiers);
        tiers.validate()?;
        Ok(tiers)
    }

    pub fn validate(&self) -> Result<()> {
        if self.0.iter().any(|t| !t.below_kwh.is_finite()) {
            return Err(EngineError::InvalidConfig(
                "reward tier ceilings must be finite".into(),
            ));
        }
        if self.0.windows(2).any(|w| w[0].below_kwh >= w[1].below_kwh) {
            return Err(EngineError::InvalidConfig(
                "reward tiers must be sorted by ascending ceiling".into(),
            ));
        }
        Ok(())
    }

    /// First tier whose ceiling is above `usage`, if any.
    pub fn tier_for(&self, usage: f64) -> Option<&RewardTier> {
        self.0.iter().find(|t| usage < t.below_kwh)
    }
}

/// Baseline and emission factor for the CO₂ estimate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Co2Factors {
    pub baseline_kwh: f64,
    pub kg_per_kwh: f64,
}

impl Default for Co2Factors {
    fn default() -> Self {
        Self {
            baseline_kwh: 700.0,
            kg_per_kwh: 0.12,
        }
    }
}

/// Record (or replace) the usage report for `period`.
///
/// Returns the XP granted for the report. On error the snapshot is left
/// untouched.
pub fn record(
    snapshot: &mut Snapshot,
    config: &EngineConfig,
    period: Period,
    usage: f64,
    now: DateTime<Utc>,
) -> Result<u64> {
    if !usage.is_finite() || usage < 0.0 {
        return Err(EngineError::InvalidInput(format!(
            "usage must be a non-negative number, got {usage}"
        )));
    }

    let bonus = config
        .consumption_tiers
        .tier_for(usage)
        .filter(|tier| tier.award_xp > 0)
        .map(|tier| {
            let reason = format!(
                "Monthly consumption ({period}) below {} kWh",
                tier.below_kwh
            );
            (tier.award_xp, reason)
        });
    if let Some((amount, reason)) = &bonus {
        check_award(snapshot, *amount, reason)?;
    }
    let award_xp = bonus.as_ref().map(|(amount, _)| *amount).unwrap_or(0);

    let replaced = match snapshot.consumption.iter().position(|e| e.period == period) {
        Some(idx) => {
            snapshot.consumption.remove(idx);
            true
        }
        None => false,
    };
    let at = snapshot
        .consumption
        .iter()
        .position(|e| e.period < period)
        .unwrap_or(snapshot.consumption.len());
    snapshot.consumption.insert(
        at,
        ConsumptionEntry {
            period: period.clone(),
            usage,
            award: award_xp,
        },
    );
    snapshot.consumption.truncate(config.limits.consumption);

    if replaced {
        notify(
            snapshot,
            config,
            NotificationKind::Info,
            format!("Consumption for {period} updated."),
            now,
        );
    }

    match bonus {
        Some((amount, reason)) => award(snapshot, config, amount, &reason, now)?,
        None => notify(
            snapshot,
            config,
            NotificationKind::Info,
            format!("Consumption {period} recorded without XP bonus."),
            now,
        ),
    }

    debug!(%period, usage, award_xp, replaced, "consumption recorded");
    Ok(award_xp)
}

/// Estimated CO₂ avoided, in kg, across the recorded months.
pub fn co2_saved_kg(snapshot: &Snapshot, config: &EngineConfig) -> f64 {
    let factors = &config.co2;
    snapshot
        .consumption
        .iter()
        .filter(|e| e.usage < factors.baseline_kwh)
        .map(|e| (factors.baseline_kwh - e.usage) * factors.kg_per_kwh)
        .sum()
}
