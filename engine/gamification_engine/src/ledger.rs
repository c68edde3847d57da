//! XP ledger.
//!
//! [`award`] is the only way XP enters a [`Snapshot`]. XP is never spent or
//! removed, so `xp_total` only grows.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::types::{AwardEntry, Notification, NotificationKind, Snapshot};
use crate::{EngineError, Result};

/// Grant `amount` XP for `reason`.
///
/// Also announces every milestone threshold crossed by this single award,
/// lowest first. Crossing a milestone only raises the available credits; no
/// redemption is created here.
pub fn award(
    snapshot: &mut Snapshot,
    config: &EngineConfig,
    amount: u64,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let current = check_award(snapshot, amount, reason)?;
    let reason = reason.trim();
    let previous = snapshot.xp_total;

    snapshot.xp_total = current;
    snapshot.achievement_count += 1;

    snapshot.award_history.insert(
        0,
        AwardEntry {
            timestamp: now,
            amount,
            reason: reason.to_string(),
        },
    );
    snapshot.award_history.truncate(config.limits.awards);

    notify(
        snapshot,
        config,
        NotificationKind::Xp,
        format!("+{amount} XP — {reason}"),
        now,
    );
    debug!(amount, previous, current, reason, "xp awarded");

    for milestone in config.milestones.crossed(previous, current) {
        info!(milestone, "milestone reached, discount unlocked");
        notify(
            snapshot,
            config,
            NotificationKind::Discount,
            format!(
                "Reached {milestone} XP! You earned a {:.2} discount on an invoice.",
                config.discount_value
            ),
            now,
        );
    }

    Ok(())
}

/// Check that [`award`] would accept `amount` and `reason` without touching
/// the snapshot. Returns the XP total the award would produce.
///
/// Callers that change other state before awarding run this first.
pub(crate) fn check_award(snapshot: &Snapshot, amount: u64, reason: &str) -> Result<u64> {
    if amount == 0 {
        return Err(EngineError::InvalidAward("amount must be positive".into()));
    }
    if reason.trim().is_empty() {
        return Err(EngineError::InvalidAward("reason must not be empty".into()));
    }
    snapshot
        .xp_total
        .checked_add(amount)
        .ok_or_else(|| EngineError::InvalidAward("XP total would overflow".into()))
}

/// Prepend a notification, keeping only the most recent ones.
pub(crate) fn notify(
    snapshot: &mut Snapshot,
    config: &EngineConfig,
    kind: NotificationKind,
    message: String,
    now: DateTime<Utc>,
) {
    snapshot.notifications.insert(
        0,
        Notification {
            kind,
            message,
            timestamp: now,
        },
    );
    snapshot.notifications.truncate(config.limits.notifications);
}
