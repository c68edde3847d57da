//! Read-only projection of a [`Snapshot`] for the shell to render.

use serde::Serialize;

use crate::challenges;
use crate::config::EngineConfig;
use crate::consumption::co2_saved_kg;
use crate::levels::LevelDefinition;
use crate::milestones::{available_credits, total_savings};
use crate::types::{
    AwardEntry, ChallengeStatus, ConsumptionEntry, Notification, Period, RedemptionEntry, Snapshot,
};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChallengeView {
    pub id: String,
    pub label: String,
    pub reward_xp: u64,
    pub status: ChallengeStatus,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DashboardView {
    pub period: Period,
    pub xp_total: u64,
    pub level: LevelDefinition,
    pub next_level: Option<LevelDefinition>,
    pub progress_percent: f64,
    pub xp_to_next_level: Option<u64>,
    pub available_credits: usize,
    pub total_savings: f64,
    pub co2_saved_kg: f64,
    pub paid_invoices: u64,
    pub shares: u64,
    pub achievement_count: u64,
    pub months_recorded: usize,
    pub consumption: Vec<ConsumptionEntry>,
    pub awards: Vec<AwardEntry>,
    pub redemptions: Vec<RedemptionEntry>,
    pub notifications: Vec<Notification>,
    pub challenges: Vec<ChallengeView>,
}

pub fn dashboard(snapshot: &Snapshot, config: &EngineConfig, period: &Period) -> DashboardView {
    let xp = snapshot.xp_total;
    let levels = &config.levels;

    DashboardView {
        period: period.clone(),
        xp_total: xp,
        level: levels.current_level(xp).clone(),
        next_level: levels.next_level(xp).cloned(),
        progress_percent: levels.progress_percent(xp),
        xp_to_next_level: levels.xp_to_next_level(xp),
        available_credits: available_credits(snapshot, config),
        total_savings: total_savings(snapshot, config),
        co2_saved_kg: co2_saved_kg(snapshot, config),
        paid_invoices: snapshot.counters.paid_invoices,
        shares: snapshot.counters.shares,
        achievement_count: snapshot.achievement_count,
        months_recorded: snapshot.consumption.len(),
        consumption: snapshot.consumption.clone(),
        awards: snapshot.award_history.clone(),
        redemptions: snapshot.redemptions.clone(),
        notifications: snapshot.notifications.clone(),
        challenges: config
            .challenges
            .iter()
            .map(|c| ChallengeView {
                id: c.id.clone(),
                label: c.label.clone(),
                reward_xp: c.reward_xp,
                status: challenges::status(snapshot, &c.id, period),
            })
            .collect(),
    }
}
