//! Engine tunables.
//!
//! Every product constant (tiers, milestones, challenge thresholds, flat
//! action rewards) lives here. [`EngineConfig::default`] reproduces the
//! stock programme; a deployment can override any field from JSON.

use serde::{Deserialize, Serialize};

use crate::challenges::{default_catalog, ChallengeDefinition, ChallengeRule};
use crate::consumption::{Co2Factors, RewardTiers};
use crate::levels::LevelTable;
use crate::milestones::MilestoneSet;
use crate::{EngineError, Result};

/// Length caps for the bounded history lists.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryLimits {
    pub awards: usize,
    pub notifications: usize,
    pub consumption: usize,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            awards: 40,
            notifications: 40,
            consumption: 12,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub levels: LevelTable,
    pub milestones: MilestoneSet,
    /// Monetary value of one discount credit.
    pub discount_value: f64,
    pub consumption_tiers: RewardTiers,
    pub co2: Co2Factors,
    pub invoice_payment_xp: u64,
    pub referral_share_xp: u64,
    pub challenges: Vec<ChallengeDefinition>,
    pub limits: HistoryLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            levels: LevelTable::default(),
            milestones: MilestoneSet::default(),
            discount_value: 5.0,
            consumption_tiers: RewardTiers::default(),
            co2: Co2Factors::default(),
            invoice_payment_xp: 50,
            referral_share_xp: 50,
            challenges: default_catalog(),
            limits: HistoryLimits::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a JSON override document; missing fields keep their defaults.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.levels.validate()?;
        self.milestones.validate()?;
        self.consumption_tiers.validate()?;

        if !self.discount_value.is_finite() || self.discount_value < 0.0 {
            return Err(EngineError::InvalidConfig(
                "discount_value must be a non-negative number".into(),
            ));
        }
        if self.invoice_payment_xp == 0 || self.referral_share_xp == 0 {
            return Err(EngineError::InvalidConfig(
                "flat action rewards must be positive".into(),
            ));
        }
        if self.limits.awards == 0 || self.limits.notifications == 0 || self.limits.consumption == 0
        {
            return Err(EngineError::InvalidConfig(
                "history limits must be positive".into(),
            ));
        }

        for (idx, challenge) in self.challenges.iter().enumerate() {
            if challenge.id.trim().is_empty() || challenge.reward_xp == 0 {
                return Err(EngineError::InvalidConfig(format!(
                    "challenge #{idx} needs an id and a positive reward"
                )));
            }
            if self.challenges[..idx].iter().any(|c| c.id == challenge.id) {
                return Err(EngineError::InvalidConfig(format!(
                    "duplicate challenge id {}",
                    challenge.id
                )));
            }
            if let ChallengeRule::ThresholdReduction { min_percent } = challenge.rule {
                if !min_percent.is_finite() {
                    return Err(EngineError::InvalidConfig(format!(
                        "challenge {} has a non-finite threshold",
                        challenge.id
                    )));
                }
            }
        }
        Ok(())
    }
}
