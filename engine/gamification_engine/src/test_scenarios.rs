use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use crate::invariants::{assert_all_snapshot_invariants, assert_xp_monotonic};
use crate::storage::{decode_or_default, encode};
use crate::{
    Action, ChallengeStatus, Engine, EngineConfig, EngineError, FixedClock, Period, Snapshot,
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 28, 20, 15, 0).unwrap()
}

fn setup() -> (Engine, Snapshot) {
    let engine = Engine::with_clock(EngineConfig::default(), Arc::new(FixedClock(now())));
    (engine, Snapshot::default())
}

fn period(raw: &str) -> Period {
    Period::new(raw).unwrap()
}

fn challenge_status(engine: &Engine, snapshot: &Snapshot, id: &str, p: &str) -> ChallengeStatus {
    engine
        .dashboard(snapshot, &period(p))
        .challenges
        .into_iter()
        .find(|c| c.id == id)
        .map(|c| c.status)
        .unwrap()
}

#[test]
fn test_reduction_challenge_end_to_end() {
    let (engine, fresh) = setup();

    let s1 = engine
        .record_consumption(&fresh, period("2024-01"), 150.0)
        .unwrap();
    assert_eq!(s1.xp_total, 60);
    assert_eq!(engine.dashboard(&s1, &period("2024-01")).level.name, "Green Spark");

    let s2 = engine
        .record_consumption(&s1, period("2024-02"), 130.0)
        .unwrap();
    assert_eq!(s2.xp_total, 120);
    // Nobody enrolled yet, so nothing was rewarded.
    assert_eq!(
        challenge_status(&engine, &s2, "peak-reduction", "2024-02"),
        ChallengeStatus::NotEnrolled
    );

    let s3 = engine
        .apply(
            &s2,
            Action::EnrollChallenge {
                challenge_id: "peak-reduction".into(),
                period: period("2024-02"),
            },
        )
        .unwrap();
    assert_eq!(
        challenge_status(&engine, &s3, "peak-reduction", "2024-02"),
        ChallengeStatus::Rewarded
    );
    assert_eq!(s3.xp_total, 160);

    let s4 = engine
        .apply(&s3, Action::Refresh { period: period("2024-02") })
        .unwrap();
    assert_eq!(s4.xp_total, 160);
    assert_eq!(s4.award_history, s3.award_history);

    for (before, after) in [(&fresh, &s1), (&s1, &s2), (&s2, &s3), (&s3, &s4)] {
        assert_xp_monotonic(before, after);
        assert_all_snapshot_invariants(after, engine.config());
    }
}

#[test]
fn test_failed_action_leaves_input_untouched() {
    let (engine, fresh) = setup();
    let seeded = engine.pay_invoice(&fresh).unwrap();

    let bad_usage = engine.record_consumption(&seeded, period("2024-02"), -5.0);
    assert!(matches!(bad_usage, Err(EngineError::InvalidInput(_))));

    let unknown = engine.apply(
        &seeded,
        Action::EnrollChallenge {
            challenge_id: "nope".into(),
            period: period("2024-02"),
        },
    );
    assert!(matches!(unknown, Err(EngineError::UnknownChallenge(_))));

    let no_credit = engine.redeem_discount(&seeded, period("2024-02"));
    assert_eq!(no_credit, Err(EngineError::NoCreditsAvailable));

    assert_eq!(seeded.xp_total, 50);
    assert_eq!(seeded.notifications.len(), 1);
}

#[test]
fn test_milestone_unlock_then_redeem_through_actions() {
    let (engine, mut snapshot) = setup();
    for _ in 0..10 {
        snapshot = engine.pay_invoice(&snapshot).unwrap();
    }
    assert_eq!(snapshot.xp_total, 500);
    assert_eq!(engine.available_credits(&snapshot), 1);

    snapshot = engine.redeem_discount(&snapshot, period("2024-03")).unwrap();
    let view = engine.dashboard(&snapshot, &period("2024-02"));
    assert_eq!(view.available_credits, 0);
    assert_eq!(view.total_savings, 5.0);
    assert_eq!(view.redemptions.len(), 1);
    assert_eq!(view.paid_invoices, 10);
    assert_all_snapshot_invariants(&snapshot, engine.config());
}

#[test]
fn test_dashboard_projection() {
    let (engine, fresh) = setup();
    let snapshot = engine
        .record_consumption(&fresh, period("2024-02"), 450.0)
        .unwrap();
    let snapshot = engine.share_code(&snapshot).unwrap();

    let view = engine.dashboard(&snapshot, &engine.current_period());
    assert_eq!(view.period, period("2024-02"));
    assert_eq!(view.xp_total, 90);
    assert_eq!(view.next_level.as_ref().map(|l| l.name.as_str()), Some("Eco Mode"));
    assert_eq!(view.xp_to_next_level, Some(411));
    assert_eq!(view.progress_percent, 18.0);
    assert_eq!(view.months_recorded, 1);
    assert_eq!(view.shares, 1);
    assert_eq!(view.challenges.len(), 2);
    assert!(view
        .challenges
        .iter()
        .all(|c| c.status == ChallengeStatus::NotEnrolled));
    assert!((view.co2_saved_kg - 30.0).abs() < 1e-9);
}

#[test]
fn test_state_survives_persistence_cycle() {
    let (engine, fresh) = setup();
    let snapshot = engine.enroll_challenge(&fresh, "saving-tip").unwrap();
    let raw = encode(&snapshot).unwrap();

    let restored = decode_or_default(Some(&raw), engine.now());
    let after = engine.share_code(&restored).unwrap();
    assert_eq!(
        challenge_status(&engine, &after, "saving-tip", "2024-02"),
        ChallengeStatus::Rewarded
    );
}

#[test]
fn test_configured_thresholds_change_rewards() {
    let raw = r#"{
        "consumption_tiers": [ { "below_kwh": 100.0, "award_xp": 10 } ],
        "milestones": [50]
    }"#;
    let config = EngineConfig::from_json(raw).unwrap();
    let engine = Engine::with_clock(config, Arc::new(FixedClock(now())));

    let snapshot = engine
        .record_consumption(&Snapshot::default(), period("2024-02"), 150.0)
        .unwrap();
    assert_eq!(snapshot.xp_total, 0);

    let snapshot = engine.pay_invoice(&snapshot).unwrap();
    assert_eq!(engine.available_credits(&snapshot), 1);
}

#[test]
fn test_deserialized_action_rejects_blank_period() {
    let raw = r#"{ "action": "record_consumption", "period": "", "usage": 10.0 }"#;
    assert!(serde_json::from_str::<Action>(raw).is_err());

    let raw = r#"{ "action": "redeem_discount", "period": "   " }"#;
    assert!(serde_json::from_str::<Action>(raw).is_err());
}

#[test]
fn test_deserialized_action_period_is_trimmed() {
    let (engine, fresh) = setup();
    let raw = r#"{ "action": "record_consumption", "period": " 2024-02 ", "usage": 10.0 }"#;
    let action: Action = serde_json::from_str(raw).unwrap();

    let snapshot = engine.apply(&fresh, action).unwrap();
    assert_eq!(snapshot.consumption[0].period, period("2024-02"));
    assert_eq!(snapshot.xp_total, 60);
    assert_eq!(
        serde_json::to_string(&snapshot.consumption[0].period).unwrap(),
        r#""2024-02""#
    );
}
