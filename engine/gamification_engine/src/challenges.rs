//! # Challenge engine
//!
//! Monthly opt-in challenges whose completion is detected from other state.
//!
//! Each `(challenge, period)` pair moves forward only:
//!
//! ```text
//! NotEnrolled ──enroll──► Enrolled ──evaluate (rule met)──► Rewarded
//! ```
//!
//! [`evaluate`] may be called as often as the caller likes. A reward is
//! granted only on the `Enrolled → Rewarded` edge, and only if the key is not
//! already in [`Snapshot::claimed`].
//!
//! New challenges are new [`ChallengeRule`] variants with their own
//! evaluation function; the state machine itself does not change.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::ledger::{award, check_award, notify};
use crate::types::{
    ChallengeKey, ChallengeProgress, ChallengeStatus, CounterKind, NotificationKind, Period,
    Snapshot,
};
use crate::{EngineError, Result};

/// How a challenge decides it has been completed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChallengeRule {
    /// Usage in the challenge period dropped by at least `min_percent`
    /// versus the most recent earlier period.
    ThresholdReduction { min_percent: f64 },
    /// `counter` grew by at least `min_gain` since enrollment.
    DeltaSinceEnrollment { counter: CounterKind, min_gain: u64 },
}

impl ChallengeRule {
    /// Counter values this rule needs captured at enrollment.
    fn baseline(&self, snapshot: &Snapshot) -> BTreeMap<CounterKind, u64> {
        match self {
            Self::ThresholdReduction { .. } => BTreeMap::new(),
            Self::DeltaSinceEnrollment { counter, .. } => {
                BTreeMap::from([(*counter, snapshot.counters.get(*counter))])
            }
        }
    }

    fn is_met(&self, snapshot: &Snapshot, progress: &ChallengeProgress) -> bool {
        match self {
            Self::ThresholdReduction { min_percent } => {
                threshold_reduction_met(snapshot, &progress.key.period, *min_percent)
            }
            Self::DeltaSinceEnrollment { counter, min_gain } => {
                delta_since_enrollment_met(snapshot, progress, *counter, *min_gain)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChallengeDefinition {
    pub id: String,
    pub label: String,
    pub reward_xp: u64,
    pub rule: ChallengeRule,
}

/// The stock monthly challenges.
pub fn default_catalog() -> Vec<ChallengeDefinition> {
    vec![
        ChallengeDefinition {
            id: "peak-reduction".into(),
            label: "Reduce peak-hour consumption by 10%".into(),
            reward_xp: 40,
            rule: ChallengeRule::ThresholdReduction { min_percent: 10.0 },
        },
        ChallengeDefinition {
            id: "saving-tip".into(),
            label: "Share a saving tip".into(),
            reward_xp: 65,
            rule: ChallengeRule::DeltaSinceEnrollment {
                counter: CounterKind::Shares,
                min_gain: 1,
            },
        },
    ]
}

/// Percentage drop from `prior` to `current`; `None` when `prior` is not
/// positive.
pub fn reduction_percent(prior: f64, current: f64) -> Option<f64> {
    if prior <= 0.0 {
        return None;
    }
    Some((prior - current) * 100.0 / prior)
}

fn threshold_reduction_met(snapshot: &Snapshot, period: &Period, min_percent: f64) -> bool {
    let (Some(current), Some(prior)) = (
        snapshot.consumption_for(period),
        snapshot.consumption_before(period),
    ) else {
        debug!(%period, "reduction check deferred, missing comparison months");
        return false;
    };
    match reduction_percent(prior.usage, current.usage) {
        Some(pct) => {
            debug!(%period, prior = %prior.period, pct, "reduction computed");
            pct >= min_percent
        }
        None => false,
    }
}

fn delta_since_enrollment_met(
    snapshot: &Snapshot,
    progress: &ChallengeProgress,
    counter: CounterKind,
    min_gain: u64,
) -> bool {
    let Some(baseline) = progress.baseline.get(&counter) else {
        debug!(key = %progress.key, ?counter, "no baseline captured, deferring");
        return false;
    };
    let live = snapshot.counters.get(counter);
    live > *baseline && live - baseline >= min_gain.max(1)
}

pub fn find<'a>(config: &'a EngineConfig, challenge_id: &str) -> Result<&'a ChallengeDefinition> {
    config
        .challenges
        .iter()
        .find(|c| c.id == challenge_id)
        .ok_or_else(|| EngineError::UnknownChallenge(challenge_id.to_string()))
}

pub fn status(snapshot: &Snapshot, challenge_id: &str, period: &Period) -> ChallengeStatus {
    snapshot.challenge_status(&ChallengeKey::new(challenge_id, period.clone()))
}

/// Opt in to `challenge_id` for `period`.
///
/// Returns `false` (and changes nothing) when already enrolled or rewarded.
pub fn enroll(
    snapshot: &mut Snapshot,
    config: &EngineConfig,
    challenge_id: &str,
    period: &Period,
    now: DateTime<Utc>,
) -> Result<bool> {
    let challenge = find(config, challenge_id)?;
    let key = ChallengeKey::new(challenge_id, period.clone());
    if snapshot.challenge_status(&key) != ChallengeStatus::NotEnrolled
        || snapshot.claimed.contains(&key)
    {
        return Ok(false);
    }

    let progress = ChallengeProgress {
        key: key.clone(),
        enrolled: true,
        rewarded: false,
        enrolled_at: now,
        completed_at: None,
        baseline: challenge.rule.baseline(snapshot),
    };
    snapshot.challenges.insert(key.clone(), progress);
    notify(
        snapshot,
        config,
        NotificationKind::Info,
        format!("Joined the challenge: {} ({period}).", challenge.label),
        now,
    );
    info!(%key, "challenge enrolled");
    Ok(true)
}

/// Check one enrolled challenge and reward it if its rule is met.
///
/// Returns `true` only on the call that performs the `Enrolled → Rewarded`
/// transition.
pub fn evaluate(
    snapshot: &mut Snapshot,
    config: &EngineConfig,
    challenge_id: &str,
    period: &Period,
    now: DateTime<Utc>,
) -> Result<bool> {
    let challenge = find(config, challenge_id)?;
    let key = ChallengeKey::new(challenge_id, period.clone());
    if snapshot.claimed.contains(&key) {
        return Ok(false);
    }
    let Some(progress) = snapshot.challenges.get(&key) else {
        return Ok(false);
    };
    if progress.status() != ChallengeStatus::Enrolled || !challenge.rule.is_met(snapshot, progress)
    {
        return Ok(false);
    }

    let reason = format!("Monthly challenge: {} ({period})", challenge.label);
    check_award(snapshot, challenge.reward_xp, &reason)?;

    if let Some(progress) = snapshot.challenges.get_mut(&key) {
        progress.rewarded = true;
        progress.completed_at = Some(now);
    }
    snapshot.claimed.insert(key.clone());
    award(snapshot, config, challenge.reward_xp, &reason, now)?;

    info!(%key, reward = challenge.reward_xp, "challenge completed");
    Ok(true)
}

/// Evaluate every catalog challenge for `period`. Returns how many were
/// rewarded by this call. If any evaluation fails, none of them apply.
pub fn evaluate_period(
    snapshot: &mut Snapshot,
    config: &EngineConfig,
    period: &Period,
    now: DateTime<Utc>,
) -> Result<usize> {
    let mut next = snapshot.clone();
    let mut rewarded = 0;
    for challenge in &config.challenges {
        if evaluate(&mut next, config, &challenge.id, period, now)? {
            rewarded += 1;
        }
    }
    *snapshot = next;
    Ok(rewarded)
}
