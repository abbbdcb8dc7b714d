//! Level calculation and reward resolution.
//!
//! Levels follow a tiered curve: the XP cost of going from level `n` to
//! `n + 1` depends on `n`:
//! - 1 → 4: 500 XP per level
//! - 4 → 7: 750 XP per level
//! - 7 → 11: 1000 XP per level
//! - 11 and beyond: 1500 XP per level
//!
//! Every function here is pure. The level is always recomputed from total
//! XP, and attributes are always recomputed from `(level, training)`, so
//! applying the same state twice never drifts.

use crate::types::{
    AttributeBlock, PlayerProgress, PlayerStats, Reward, TrainingGains, ATTRIBUTE_MAX,
};
use serde::Serialize;

/// First level of the open-ended 1500 XP tier
const OPEN_TIER_LEVEL: u32 = 11;

/// Attribute points gained every two levels
const ATTRIBUTE_STEP: f64 = 2.0;

const LEVEL_TITLES: [&str; 10] = [
    "Novice en Reprise",
    "Apprenti Athlète",
    "Guerrier en Devenir",
    "Force Montante",
    "Endurance Éveillée",
    "Souplesse Initiale",
    "Athlète Déterminé",
    "Maître de la Reprise",
    "Légende en Marche",
    "Gear 5",
];

/// XP needed to advance from `level` to `level + 1`
pub fn xp_cost_from(level: u32) -> u64 {
    match level {
        0..=3 => 500,
        4..=6 => 750,
        7..=10 => 1000,
        _ => 1500,
    }
}

/// Cumulative XP required to reach `level`
pub fn xp_to_reach(level: u32) -> u64 {
    if level <= OPEN_TIER_LEVEL {
        return (1..level.max(1)).map(xp_cost_from).sum();
    }
    let flat = u64::from(level - OPEN_TIER_LEVEL) * xp_cost_from(OPEN_TIER_LEVEL);
    xp_to_reach(OPEN_TIER_LEVEL) + flat
}

/// Highest level whose cumulative requirement is met by `xp`
pub fn level_for_xp(xp: u64) -> u32 {
    let mut level = 1;
    let mut remaining = xp;

    while level < OPEN_TIER_LEVEL {
        let cost = xp_cost_from(level);
        if remaining < cost {
            return level;
        }
        remaining -= cost;
        level += 1;
    }

    // Flat tier: no need to walk one level at a time
    let extra = remaining / xp_cost_from(OPEN_TIER_LEVEL);
    level.saturating_add(u32::try_from(extra).unwrap_or(u32::MAX))
}

/// Display title for a level, saturating at the last title
pub fn level_title(level: u32) -> &'static str {
    let idx = (level.max(1) as usize - 1).min(LEVEL_TITLES.len() - 1);
    LEVEL_TITLES[idx]
}

fn clamp_attribute(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, ATTRIBUTE_MAX)
}

/// Absolute attribute values for a level
///
/// force/endurance/speed grow by [`ATTRIBUTE_STEP`] every two levels on top
/// of the level 1 base, plus whatever training added. Assiduity is carried
/// through unchanged apart from clamping.
pub fn attributes_for_level(level: u32, training: &TrainingGains, assiduity: f64) -> AttributeBlock {
    let step = ATTRIBUTE_STEP * f64::from(level.saturating_sub(1) / 2);
    let base = AttributeBlock::BASE;

    AttributeBlock {
        force: clamp_attribute(base.force + step + training.force),
        endurance: clamp_attribute(base.endurance + step + training.endurance),
        speed: clamp_attribute(base.speed + step),
        assiduity: clamp_attribute(assiduity),
    }
}

/// Add XP, recomputing the level from the new total
///
/// Negative deltas are ignored: XP and level never decrease.
pub fn add_xp(current: &PlayerProgress, delta: i64) -> PlayerProgress {
    let Ok(delta) = u64::try_from(delta) else {
        tracing::warn!("Ignoring negative XP delta {}", delta);
        return current.clone();
    };

    let xp = current.xp.saturating_add(delta);
    PlayerProgress {
        level: level_for_xp(xp),
        xp,
        coins: current.coins,
    }
}

/// Add coins; negative deltas are ignored
pub fn add_coins(current: &PlayerProgress, delta: i64) -> PlayerProgress {
    let Ok(delta) = u64::try_from(delta) else {
        tracing::warn!("Ignoring negative coin delta {}", delta);
        return current.clone();
    };

    PlayerProgress {
        coins: current.coins.saturating_add(delta),
        ..current.clone()
    }
}

/// Recompute level-derived attributes, keeping training and totals
pub fn recompute_attributes(stats: &PlayerStats, level: u32) -> PlayerStats {
    PlayerStats {
        attributes: attributes_for_level(level, &stats.training, stats.attributes.assiduity),
        ..stats.clone()
    }
}

/// Outcome of applying a reward
#[derive(Clone, Debug, PartialEq)]
pub struct Resolution {
    pub progress: PlayerProgress,
    pub stats: PlayerStats,
    /// `(old, new)` when the reward crossed at least one level
    pub level_up: Option<(u32, u32)>,
}

/// Apply every delta of `reward` in one step
pub fn apply_reward(progress: &PlayerProgress, stats: &PlayerStats, reward: &Reward) -> Resolution {
    let gained = add_xp(progress, i64::try_from(reward.xp).unwrap_or(i64::MAX));
    let new_progress = add_coins(&gained, i64::try_from(reward.coins).unwrap_or(i64::MAX));

    let training = TrainingGains {
        force: clamp_attribute(stats.training.force + reward.force.max(0.0)),
        endurance: clamp_attribute(stats.training.endurance + reward.endurance.max(0.0)),
    };
    let assiduity = stats.attributes.assiduity + reward.assiduity.max(0.0);

    let new_stats = PlayerStats {
        attributes: attributes_for_level(new_progress.level, &training, assiduity),
        training,
        total_weight_lifted: stats.total_weight_lifted + reward.weight_lifted.max(0.0),
        total_workouts_completed: stats
            .total_workouts_completed
            .saturating_add(reward.workouts_completed),
        streak_days: clamp_attribute(stats.streak_days + reward.streak.max(0.0)),
    };

    let level_up = (new_progress.level > progress.level).then_some((progress.level, new_progress.level));
    if let Some((old, new)) = level_up {
        tracing::info!("Level up: {} -> {} ({})", old, new, level_title(new));
    }

    Resolution {
        progress: new_progress,
        stats: new_stats,
        level_up,
    }
}

/// Where a player stands on the level curve
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LevelInfo {
    pub level: u32,
    pub title: &'static str,
    /// Cumulative XP at which `level` is reached
    pub threshold: u64,
    /// XP earned since reaching `level`
    pub xp_into_level: u64,
    /// XP cost of the step from `level` to `level + 1`
    pub xp_for_next: u64,
    /// XP still missing before `level + 1`
    pub xp_to_next: u64,
    /// XP still missing before `level` itself (zero once reached)
    pub xp_needed: u64,
}

impl LevelInfo {
    fn at(level: u32, xp: u64) -> Self {
        let threshold = xp_to_reach(level);
        let next_threshold = threshold + xp_cost_from(level);
        Self {
            level,
            title: level_title(level),
            threshold,
            xp_into_level: xp.saturating_sub(threshold),
            xp_for_next: xp_cost_from(level),
            xp_to_next: next_threshold.saturating_sub(xp),
            xp_needed: threshold.saturating_sub(xp),
        }
    }

    /// Fraction of the current level completed, in `[0, 1)`
    pub fn progress_ratio(&self) -> f64 {
        self.xp_into_level as f64 / self.xp_for_next as f64
    }
}

/// Level info for the player's current XP
pub fn current_level_info(xp: u64) -> LevelInfo {
    LevelInfo::at(level_for_xp(xp), xp)
}

/// Level info for the level right after the current one
pub fn next_level_info(xp: u64) -> LevelInfo {
    LevelInfo::at(level_for_xp(xp).saturating_add(1), xp)
}
