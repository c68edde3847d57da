use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use crate::challenges::{enroll, evaluate, evaluate_period, reduction_percent, status};
use crate::consumption::record;
use crate::invariants::{assert_all_snapshot_invariants, assert_valid_status_transition};
use crate::{
    Action, ChallengeKey, ChallengeStatus, CounterKind, Engine, EngineConfig, EngineError,
    FixedClock, NotificationKind, Period, Snapshot,
};

const PEAK: &str = "peak-reduction";
const TIP: &str = "saving-tip";

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 20, 18, 0, 0).unwrap()
}

fn setup() -> (EngineConfig, Snapshot) {
    (EngineConfig::default(), Snapshot::default())
}

fn period(raw: &str) -> Period {
    Period::new(raw).unwrap()
}

fn engine() -> Engine {
    Engine::with_clock(EngineConfig::default(), Arc::new(FixedClock(now())))
}

#[test]
fn test_reduction_percent() {
    assert_eq!(reduction_percent(200.0, 180.0), Some(10.0));
    assert_eq!(reduction_percent(0.0, 10.0), None);
    assert!(reduction_percent(100.0, 120.0).unwrap() < 0.0);
}

#[test]
fn test_enroll_creates_progress_and_info_notification() {
    let (config, mut snapshot) = setup();
    let changed = enroll(&mut snapshot, &config, PEAK, &period("2024-02"), now()).unwrap();

    assert!(changed);
    assert_eq!(status(&snapshot, PEAK, &period("2024-02")), ChallengeStatus::Enrolled);
    assert_eq!(status(&snapshot, PEAK, &period("2024-03")), ChallengeStatus::NotEnrolled);
    assert_eq!(snapshot.notifications[0].kind, NotificationKind::Info);

    let key = ChallengeKey::new(PEAK, period("2024-02"));
    assert_eq!(snapshot.challenges[&key].enrolled_at, now());
    assert!(snapshot.challenges[&key].baseline.is_empty());
}

#[test]
fn test_enroll_twice_is_noop() {
    let (config, mut snapshot) = setup();
    enroll(&mut snapshot, &config, PEAK, &period("2024-02"), now()).unwrap();
    let before = snapshot.clone();

    let changed = enroll(&mut snapshot, &config, PEAK, &period("2024-02"), now()).unwrap();
    assert!(!changed);
    assert_eq!(snapshot, before);
}

#[test]
fn test_unknown_challenge_is_rejected() {
    let (config, mut snapshot) = setup();
    let err =
        enroll(&mut snapshot, &config, "moon-landing", &period("2024-02"), now()).unwrap_err();
    assert_eq!(err, EngineError::UnknownChallenge("moon-landing".into()));
    assert!(err.is_invalid_input());
    assert_eq!(snapshot, Snapshot::default());
}

#[test]
fn test_evaluate_without_enrollment_is_noop() {
    let (config, mut snapshot) = setup();
    record(&mut snapshot, &config, period("2024-01"), 150.0, now()).unwrap();
    record(&mut snapshot, &config, period("2024-02"), 100.0, now()).unwrap();
    let before = snapshot.clone();

    assert!(!evaluate(&mut snapshot, &config, PEAK, &period("2024-02"), now()).unwrap());
    assert_eq!(snapshot, before);
}

#[test]
fn test_reduction_defers_without_prior_month() {
    let (config, mut snapshot) = setup();
    record(&mut snapshot, &config, period("2024-02"), 100.0, now()).unwrap();
    enroll(&mut snapshot, &config, PEAK, &period("2024-02"), now()).unwrap();

    assert!(!evaluate(&mut snapshot, &config, PEAK, &period("2024-02"), now()).unwrap());
    assert_eq!(status(&snapshot, PEAK, &period("2024-02")), ChallengeStatus::Enrolled);
}

#[test]
fn test_reduction_defers_without_current_month() {
    let (config, mut snapshot) = setup();
    record(&mut snapshot, &config, period("2024-01"), 100.0, now()).unwrap();
    enroll(&mut snapshot, &config, PEAK, &period("2024-02"), now()).unwrap();

    assert!(!evaluate(&mut snapshot, &config, PEAK, &period("2024-02"), now()).unwrap());
    assert_eq!(status(&snapshot, PEAK, &period("2024-02")), ChallengeStatus::Enrolled);
}

#[test]
fn test_reduction_defers_when_prior_usage_is_zero() {
    let (config, mut snapshot) = setup();
    record(&mut snapshot, &config, period("2024-01"), 0.0, now()).unwrap();
    record(&mut snapshot, &config, period("2024-02"), 0.0, now()).unwrap();
    enroll(&mut snapshot, &config, PEAK, &period("2024-02"), now()).unwrap();

    assert!(!evaluate(&mut snapshot, &config, PEAK, &period("2024-02"), now()).unwrap());
}

#[test]
fn test_reduction_below_threshold_stays_enrolled() {
    let (config, mut snapshot) = setup();
    record(&mut snapshot, &config, period("2024-01"), 150.0, now()).unwrap();
    record(&mut snapshot, &config, period("2024-02"), 140.0, now()).unwrap();
    enroll(&mut snapshot, &config, PEAK, &period("2024-02"), now()).unwrap();

    assert!(!evaluate(&mut snapshot, &config, PEAK, &period("2024-02"), now()).unwrap());
    assert_eq!(status(&snapshot, PEAK, &period("2024-02")), ChallengeStatus::Enrolled);
}

#[test]
fn test_reduction_compares_against_most_recent_earlier_month() {
    let (config, mut snapshot) = setup();
    // 2023-11 would qualify, but 2024-01 is the comparison month.
    record(&mut snapshot, &config, period("2023-11"), 500.0, now()).unwrap();
    record(&mut snapshot, &config, period("2024-01"), 150.0, now()).unwrap();
    record(&mut snapshot, &config, period("2024-02"), 145.0, now()).unwrap();
    enroll(&mut snapshot, &config, PEAK, &period("2024-02"), now()).unwrap();

    assert!(!evaluate(&mut snapshot, &config, PEAK, &period("2024-02"), now()).unwrap());
}

#[test]
fn test_exact_threshold_counts_as_met() {
    let (config, mut snapshot) = setup();
    record(&mut snapshot, &config, period("2024-01"), 200.0, now()).unwrap();
    record(&mut snapshot, &config, period("2024-02"), 180.0, now()).unwrap();
    enroll(&mut snapshot, &config, PEAK, &period("2024-02"), now()).unwrap();

    assert!(evaluate(&mut snapshot, &config, PEAK, &period("2024-02"), now()).unwrap());
}

#[test]
fn test_evaluate_twice_rewards_once() {
    let (config, mut snapshot) = setup();
    record(&mut snapshot, &config, period("2024-01"), 150.0, now()).unwrap();
    record(&mut snapshot, &config, period("2024-02"), 130.0, now()).unwrap();
    enroll(&mut snapshot, &config, PEAK, &period("2024-02"), now()).unwrap();
    let xp_before = snapshot.xp_total;

    assert!(evaluate(&mut snapshot, &config, PEAK, &period("2024-02"), now()).unwrap());
    let after_first = snapshot.clone();
    assert!(!evaluate(&mut snapshot, &config, PEAK, &period("2024-02"), now()).unwrap());

    assert_eq!(snapshot, after_first);
    assert_eq!(snapshot.xp_total, xp_before + 40);
    let rewards = snapshot
        .award_history
        .iter()
        .filter(|a| a.reason.starts_with("Monthly challenge"))
        .count();
    assert_eq!(rewards, 1);
    assert_all_snapshot_invariants(&snapshot, &config);
}

#[test]
fn test_claimed_key_blocks_reward_even_if_progress_reset() {
    let (config, mut snapshot) = setup();
    record(&mut snapshot, &config, period("2024-01"), 150.0, now()).unwrap();
    record(&mut snapshot, &config, period("2024-02"), 100.0, now()).unwrap();
    enroll(&mut snapshot, &config, PEAK, &period("2024-02"), now()).unwrap();
    evaluate(&mut snapshot, &config, PEAK, &period("2024-02"), now()).unwrap();

    // A stale progress record must not re-open the reward.
    let key = ChallengeKey::new(PEAK, period("2024-02"));
    if let Some(progress) = snapshot.challenges.get_mut(&key) {
        progress.rewarded = false;
    }
    let xp = snapshot.xp_total;
    assert!(!evaluate(&mut snapshot, &config, PEAK, &period("2024-02"), now()).unwrap());
    assert!(!enroll(&mut snapshot, &config, PEAK, &period("2024-02"), now()).unwrap());
    assert_eq!(snapshot.xp_total, xp);
}

#[test]
fn test_share_delta_rule_uses_enrollment_baseline() {
    let (config, mut snapshot) = setup();
    snapshot.counters.shares = 3;
    enroll(&mut snapshot, &config, TIP, &period("2024-02"), now()).unwrap();

    let key = ChallengeKey::new(TIP, period("2024-02"));
    assert_eq!(snapshot.challenges[&key].baseline.get(&CounterKind::Shares), Some(&3));
    // Earlier shares do not count.
    assert!(!evaluate(&mut snapshot, &config, TIP, &period("2024-02"), now()).unwrap());

    snapshot.counters.shares += 1;
    assert!(evaluate(&mut snapshot, &config, TIP, &period("2024-02"), now()).unwrap());
    assert_eq!(status(&snapshot, TIP, &period("2024-02")), ChallengeStatus::Rewarded);
    assert_eq!(snapshot.xp_total, 65);
}

#[test]
fn test_missing_baseline_defers() {
    let (config, mut snapshot) = setup();
    enroll(&mut snapshot, &config, TIP, &period("2024-02"), now()).unwrap();
    let key = ChallengeKey::new(TIP, period("2024-02"));
    if let Some(progress) = snapshot.challenges.get_mut(&key) {
        progress.baseline.clear();
    }
    snapshot.counters.shares = 10;

    assert!(!evaluate(&mut snapshot, &config, TIP, &period("2024-02"), now()).unwrap());
}

#[test]
fn test_overflowing_reward_leaves_challenge_enrolled() {
    let (config, mut snapshot) = setup();
    enroll(&mut snapshot, &config, TIP, &period("2024-02"), now()).unwrap();
    snapshot.counters.shares += 1;
    snapshot.xp_total = u64::MAX - 10;
    let before = snapshot.clone();

    let err = evaluate(&mut snapshot, &config, TIP, &period("2024-02"), now()).unwrap_err();
    assert!(matches!(err, EngineError::InvalidAward(_)));
    assert_eq!(snapshot, before);
    assert_eq!(status(&snapshot, TIP, &period("2024-02")), ChallengeStatus::Enrolled);
}

#[test]
fn test_evaluate_period_failure_applies_no_reward() {
    let (config, mut snapshot) = setup();
    record(&mut snapshot, &config, period("2024-01"), 150.0, now()).unwrap();
    record(&mut snapshot, &config, period("2024-02"), 100.0, now()).unwrap();
    enroll(&mut snapshot, &config, PEAK, &period("2024-02"), now()).unwrap();
    enroll(&mut snapshot, &config, TIP, &period("2024-02"), now()).unwrap();
    snapshot.counters.shares += 1;
    // Room for the 40 XP reduction reward but not the 65 XP tip reward after it.
    snapshot.xp_total = u64::MAX - 50;
    let before = snapshot.clone();

    assert!(evaluate_period(&mut snapshot, &config, &period("2024-02"), now()).is_err());
    assert_eq!(snapshot, before);
    assert!(snapshot.claimed.is_empty());
}

#[test]
fn test_evaluate_period_checks_every_challenge() {
    let (config, mut snapshot) = setup();
    record(&mut snapshot, &config, period("2024-01"), 150.0, now()).unwrap();
    record(&mut snapshot, &config, period("2024-02"), 100.0, now()).unwrap();
    enroll(&mut snapshot, &config, PEAK, &period("2024-02"), now()).unwrap();
    enroll(&mut snapshot, &config, TIP, &period("2024-02"), now()).unwrap();
    snapshot.counters.shares += 1;

    assert_eq!(evaluate_period(&mut snapshot, &config, &period("2024-02"), now()).unwrap(), 2);
    assert_eq!(evaluate_period(&mut snapshot, &config, &period("2024-02"), now()).unwrap(), 0);
    assert_all_snapshot_invariants(&snapshot, &config);
}

#[test]
fn test_share_action_completes_saving_tip() {
    let engine = engine();
    let p = engine.current_period();
    let snapshot = engine.enroll_challenge(&Snapshot::default(), TIP).unwrap();
    let enrolled = snapshot.challenge_status(&ChallengeKey::new(TIP, p.clone()));

    let snapshot = engine.share_code(&snapshot).unwrap();
    let rewarded = snapshot.challenge_status(&ChallengeKey::new(TIP, p));

    assert_valid_status_transition(ChallengeStatus::NotEnrolled, enrolled);
    assert_valid_status_transition(enrolled, rewarded);
    assert_eq!(rewarded, ChallengeStatus::Rewarded);
    assert_eq!(snapshot.counters.shares, 1);
    assert_eq!(snapshot.xp_total, 50 + 65);
}

#[test]
fn test_enroll_action_rewards_immediately_when_already_met() {
    let engine = engine();
    let snapshot = engine
        .record_consumption(&Snapshot::default(), period("2024-01"), 150.0)
        .unwrap();
    let snapshot = engine
        .record_consumption(&snapshot, period("2024-02"), 100.0)
        .unwrap();
    let snapshot = engine
        .apply(
            &snapshot,
            Action::EnrollChallenge {
                challenge_id: PEAK.into(),
                period: period("2024-02"),
            },
        )
        .unwrap();

    assert_eq!(status(&snapshot, PEAK, &period("2024-02")), ChallengeStatus::Rewarded);
}

#[test]
fn test_refresh_action_picks_up_pending_challenge() {
    let engine = engine();
    let (config, mut snapshot) = setup();
    snapshot.counters.shares = 1;
    enroll(&mut snapshot, &config, TIP, &period("2024-02"), now()).unwrap();
    snapshot.counters.shares = 2;

    let refreshed = engine
        .apply(&snapshot, Action::Refresh { period: period("2024-02") })
        .unwrap();
    assert_eq!(status(&refreshed, TIP, &period("2024-02")), ChallengeStatus::Rewarded);
    // The input snapshot is untouched.
    assert_eq!(status(&snapshot, TIP, &period("2024-02")), ChallengeStatus::Enrolled);
}
