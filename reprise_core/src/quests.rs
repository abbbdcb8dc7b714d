//! Daily quest progress and reset.
//!
//! Quests come in two flavours: binary quests are completed by one explicit
//! action, progress quests accumulate toward `max` and complete themselves
//! when they reach it. The reward is computed inside the same transition
//! that flips `completed`, so it is emitted exactly once.

use crate::types::{Quest, QuestKind, QuestSet, Reward};
use chrono::NaiveDate;

/// Id of the hydration quest in the default catalog
pub const HYDRATION_QUEST_ID: u32 = 2;

/// Assiduity gained per completed quest
const ASSIDUITY_PER_QUEST: f64 = 0.5;

/// Result of applying an operation to the day's quests
#[derive(Clone, Debug, PartialEq)]
pub struct QuestUpdate {
    pub quests: QuestSet,
    pub reward: Option<Reward>,
    pub changed: bool,
}

impl QuestUpdate {
    fn unchanged(quests: &QuestSet) -> Self {
        Self {
            quests: quests.clone(),
            reward: None,
            changed: false,
        }
    }
}

fn completion_reward(quest: &Quest) -> Reward {
    Reward {
        xp: quest.reward_xp,
        coins: quest.reward_coins,
        assiduity: ASSIDUITY_PER_QUEST,
        ..Reward::default()
    }
}

/// Owns the quest catalog and applies quest operations
#[derive(Clone, Debug)]
pub struct QuestTracker {
    catalog: Vec<Quest>,
    water_glass_liters: f64,
}

impl QuestTracker {
    pub fn new(catalog: Vec<Quest>, water_glass_liters: f64) -> Self {
        Self {
            catalog,
            water_glass_liters,
        }
    }

    pub fn catalog(&self) -> &[Quest] {
        &self.catalog
    }

    /// A zeroed quest set for `date`
    pub fn fresh_set(&self, date: NaiveDate) -> QuestSet {
        QuestSet {
            date,
            quests: self.catalog.iter().map(Quest::reset).collect(),
        }
    }

    /// Find-or-create the quest set for `today`
    ///
    /// An existing record for the same date is returned untouched. Returns
    /// the set and whether it was freshly created.
    pub fn reset_for_new_day(&self, existing: Option<QuestSet>, today: NaiveDate) -> (QuestSet, bool) {
        match existing {
            Some(set) if set.date == today => (set, false),
            Some(stale) => {
                tracing::info!("Quests rolled over from {} to {}", stale.date, today);
                (self.fresh_set(today), true)
            }
            None => {
                tracing::info!("Created quest set for {}", today);
                (self.fresh_set(today), true)
            }
        }
    }

    /// Mark a quest completed by explicit action
    ///
    /// Progress quests completed this way are filled up to their max.
    pub fn complete_quest(&self, quests: &QuestSet, id: u32) -> QuestUpdate {
        let Some(idx) = quests.quests.iter().position(|q| q.id == id) else {
            tracing::debug!("complete_quest ignored: unknown quest {}", id);
            return QuestUpdate::unchanged(quests);
        };
        if quests.quests[idx].completed {
            return QuestUpdate::unchanged(quests);
        }

        let mut next = quests.clone();
        let quest = &mut next.quests[idx];
        quest.completed = true;
        if let QuestKind::Progress { max } = quest.kind() {
            quest.progress = Some(max);
        }
        let reward = completion_reward(quest);
        tracing::info!("Quest {} ({}) completed", quest.id, quest.name);

        QuestUpdate {
            quests: next,
            reward: Some(reward),
            changed: true,
        }
    }

    /// Add progress to a progress quest, completing it on reaching max
    ///
    /// No-op for binary quests, completed quests, unknown ids and amounts
    /// that are not positive.
    pub fn progress_quest(&self, quests: &QuestSet, id: u32, amount: f64) -> QuestUpdate {
        if !amount.is_finite() || amount <= 0.0 {
            tracing::debug!("progress_quest ignored: invalid amount {}", amount);
            return QuestUpdate::unchanged(quests);
        }
        let Some(idx) = quests.quests.iter().position(|q| q.id == id) else {
            tracing::debug!("progress_quest ignored: unknown quest {}", id);
            return QuestUpdate::unchanged(quests);
        };
        let QuestKind::Progress { max } = quests.quests[idx].kind() else {
            return QuestUpdate::unchanged(quests);
        };
        if quests.quests[idx].completed {
            return QuestUpdate::unchanged(quests);
        }

        let mut next = quests.clone();
        let quest = &mut next.quests[idx];
        let progress = (quest.progress.unwrap_or(0.0) + amount).min(max);
        quest.progress = Some(progress);

        let reward = if progress >= max {
            quest.completed = true;
            tracing::info!("Quest {} ({}) completed at {}/{}", quest.id, quest.name, progress, max);
            Some(completion_reward(quest))
        } else {
            tracing::debug!("Quest {} progress {}/{}", quest.id, progress, max);
            None
        };

        QuestUpdate {
            quests: next,
            reward,
            changed: true,
        }
    }

    /// Log one glass of water against the hydration quest
    pub fn drink_water(&self, quests: &QuestSet) -> QuestUpdate {
        self.progress_quest(quests, HYDRATION_QUEST_ID, self.water_glass_liters)
    }
}
