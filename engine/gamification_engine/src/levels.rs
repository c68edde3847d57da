//! Level table.
//!
//! Levels are purely derived from the XP total and never stored.

use serde::{Deserialize, Serialize};

use crate::{EngineError, Result};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct LevelDefinition {
    pub name: String,
    pub min: u64,
    /// Soft cap for the top level; only used for progress display.
    pub max: u64,
}

impl LevelDefinition {
    pub fn new(name: &str, min: u64, max: u64) -> Self {
        Self {
            name: name.to_string(),
            min,
            max,
        }
    }

    fn contains(&self, xp: u64) -> bool {
        xp >= self.min && xp <= self.max
    }
}

/// Ordered, non-overlapping level definitions.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LevelTable(Vec<LevelDefinition>);

impl Default for LevelTable {
    fn default() -> Self {
        Self(vec![
            LevelDefinition::new("Green Spark", 0, 500),
            LevelDefinition::new("Eco Mode", 501, 1200),
            LevelDefinition::new("Turbo Efficiency", 1201, 2600),
            LevelDefinition::new("High Efficiency", 2601, 4000),
            LevelDefinition::new("Sustainable Legend", 4001, 7000),
        ])
    }
}

impl LevelTable {
    pub fn new(levels: Vec<LevelDefinition>) -> Result<Self> {
        let table = Self(levels);
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> Result<()> {
        let first = self
            .0
            .first()
            .ok_or_else(|| EngineError::InvalidConfig("level table is empty".into()))?;
        if first.min != 0 {
            return Err(EngineError::InvalidConfig(
                "first level must start at 0 XP".into(),
            ));
        }
        for level in &self.0 {
            if level.max < level.min {
                return Err(EngineError::InvalidConfig(format!(
                    "level {} has max below min",
                    level.name
                )));
            }
        }
        for pair in self.0.windows(2) {
            if pair[1].min <= pair[0].max {
                return Err(EngineError::InvalidConfig(format!(
                    "levels {} and {} overlap or are out of order",
                    pair[0].name, pair[1].name
                )));
            }
        }
        Ok(())
    }

    pub fn levels(&self) -> &[LevelDefinition] {
        &self.0
    }

    /// The level containing `xp`. Anything above the last max stays in the
    /// top tier; a gap between two levels resolves to the lower one.
    pub fn current_level(&self, xp: u64) -> &LevelDefinition {
        self.0
            .iter()
            .find(|level| level.contains(xp))
            .or_else(|| self.0.iter().rev().find(|level| level.min <= xp))
            .unwrap_or(&self.0[0])
    }

    pub fn next_level(&self, xp: u64) -> Option<&LevelDefinition> {
        self.0.iter().find(|level| level.min > xp)
    }

    /// Progress through the current level, in `[0, 100]`.
    pub fn progress_percent(&self, xp: u64) -> f64 {
        let level = self.current_level(xp);
        let span = level.max.saturating_sub(level.min).max(1) as f64;
        let done = xp.saturating_sub(level.min) as f64;
        (done * 100.0 / span).clamp(0.0, 100.0)
    }

    pub fn xp_to_next_level(&self, xp: u64) -> Option<u64> {
        self.next_level(xp).map(|next| next.min.saturating_sub(xp))
    }
}
