//! Core domain types for the Reprise engine.
//!
//! This module defines the fundamental types used throughout the system:
//! - Player progress, attributes and lifetime statistics
//! - Workout definitions and the run-time session snapshot
//! - Daily quests
//! - Reward deltas handed to the reward resolver

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound for every attribute value
pub const ATTRIBUTE_MAX: f64 = 100.0;

// ============================================================================
// Player Types
// ============================================================================

/// Level, XP and coin balance of the player
///
/// Only the reward resolver mutates this; everything else reads snapshots.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerProgress {
    pub level: u32,
    pub xp: u64,
    pub coins: u64,
}

impl PlayerProgress {
    /// First-launch progress with the given coin balance
    pub fn new(starting_coins: u64) -> Self {
        Self {
            level: 1,
            xp: 0,
            coins: starting_coins,
        }
    }
}

impl Default for PlayerProgress {
    fn default() -> Self {
        Self::new(250)
    }
}

/// Character attributes, each within `[0, 100]`
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct AttributeBlock {
    pub force: f64,
    pub endurance: f64,
    pub speed: f64,
    pub assiduity: f64,
}

impl AttributeBlock {
    /// Attributes of a level 1 player with no training
    pub const BASE: AttributeBlock = AttributeBlock {
        force: 2.0,
        endurance: 3.0,
        speed: 2.0,
        assiduity: 0.0,
    };

    pub fn is_within_bounds(&self) -> bool {
        [self.force, self.endurance, self.speed, self.assiduity]
            .iter()
            .all(|v| (0.0..=ATTRIBUTE_MAX).contains(v))
    }
}

impl Default for AttributeBlock {
    fn default() -> Self {
        Self::BASE
    }
}

/// Force/endurance accumulated from finished workouts
///
/// Kept apart from the level-derived base so that recomputing attributes
/// after a level-up stays a pure function of `(level, training)`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct TrainingGains {
    pub force: f64,
    pub endurance: f64,
}

/// Attributes plus lifetime workout statistics
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct PlayerStats {
    pub attributes: AttributeBlock,
    #[serde(default)]
    pub training: TrainingGains,
    #[serde(default)]
    pub total_weight_lifted: f64,
    #[serde(default)]
    pub total_workouts_completed: u32,
    #[serde(default)]
    pub streak_days: f64,
}

/// A bundle of deltas to apply to progress and stats in one step
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reward {
    pub xp: u64,
    pub coins: u64,
    pub force: f64,
    pub endurance: f64,
    pub assiduity: f64,
    pub weight_lifted: f64,
    pub workouts_completed: u32,
    pub streak: f64,
}

impl Reward {
    /// Reward carrying only XP and coins
    pub fn currency(xp: u64, coins: u64) -> Self {
        Self {
            xp,
            coins,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Combine two rewards emitted by the same transition
    pub fn merge(mut self, other: Reward) -> Self {
        self.xp += other.xp;
        self.coins += other.coins;
        self.force += other.force;
        self.endurance += other.endurance;
        self.assiduity += other.assiduity;
        self.weight_lifted += other.weight_lifted;
        self.workouts_completed += other.workouts_completed;
        self.streak += other.streak;
        self
    }
}

// ============================================================================
// Workout Types
// ============================================================================

/// Load used for an exercise
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Load {
    #[default]
    Bodyweight,
    Kg(f64),
}

impl Load {
    /// Normalize a raw weight from the content provider
    ///
    /// Missing, zero, negative and non-finite weights mean bodyweight.
    pub fn from_kg(weight: Option<f64>) -> Self {
        match weight {
            Some(kg) if kg.is_finite() && kg > 0.0 => Load::Kg(kg),
            _ => Load::Bodyweight,
        }
    }

    pub fn kilograms(&self) -> Option<f64> {
        match self {
            Load::Kg(kg) if kg.is_finite() && *kg > 0.0 => Some(*kg),
            _ => None,
        }
    }
}

/// One exercise slot of a workout template
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExerciseSpec {
    pub exercise_id: String,
    pub sets: u32,
    pub reps: u32,
    #[serde(default)]
    pub weight: Load,
    #[serde(default)]
    pub rest_seconds: Option<u32>,
    #[serde(default)]
    pub xp_per_set: Option<u32>,
}

/// Immutable workout template supplied by the content provider
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkoutDefinition {
    pub id: String,
    pub day: String,
    pub kind: String,
    pub exercises: Vec<ExerciseSpec>,
}

impl WorkoutDefinition {
    /// Check that the template can drive a session
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.exercises.is_empty() {
            errors.push(format!("Workout {} has no exercises", self.id));
        }
        for (i, exercise) in self.exercises.iter().enumerate() {
            if exercise.sets == 0 {
                errors.push(format!(
                    "Workout {} exercise {} ({}) has zero sets",
                    self.id, i, exercise.exercise_id
                ));
            }
        }
        errors
    }
}

/// Phase of the workout state machine
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Loaded and previewed, not begun yet
    Idle,
    Exercising,
    Resting,
    Complete,
}

/// Run-time snapshot of a workout in progress
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkoutSession {
    pub id: Uuid,
    pub definition: WorkoutDefinition,
    pub exercise_index: usize,
    /// 1-based
    pub set_index: u32,
    pub phase: Phase,
    pub remaining_rest_seconds: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub earned_xp: u64,
    #[serde(default)]
    pub weight_lifted: f64,
}

impl WorkoutSession {
    pub fn current_exercise(&self) -> Option<&ExerciseSpec> {
        self.definition.exercises.get(self.exercise_index)
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase, Phase::Exercising | Phase::Resting)
    }
}

// ============================================================================
// Quest Types
// ============================================================================

/// A daily objective
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Quest {
    pub id: u32,
    pub name: String,
    pub reward_xp: u64,
    pub reward_coins: u64,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

/// How a quest is completed
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum QuestKind {
    /// Completed by a single explicit action
    Binary,
    /// Accumulates toward `max` and completes on reaching it
    Progress { max: f64 },
}

impl Quest {
    /// A quest without a usable `max` falls back to binary semantics
    pub fn kind(&self) -> QuestKind {
        match self.max {
            Some(max) if max.is_finite() && max > 0.0 => QuestKind::Progress { max },
            _ => QuestKind::Binary,
        }
    }

    /// Same quest with progress zeroed and completion cleared
    pub fn reset(&self) -> Self {
        let progress = match self.kind() {
            QuestKind::Progress { .. } => Some(0.0),
            QuestKind::Binary => None,
        };
        Self {
            completed: false,
            progress,
            ..self.clone()
        }
    }
}

/// The quest list for one calendar day
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct QuestSet {
    pub date: NaiveDate,
    pub quests: Vec<Quest>,
}

impl QuestSet {
    pub fn get(&self, id: u32) -> Option<&Quest> {
        self.quests.iter().find(|q| q.id == id)
    }

    pub fn completed_count(&self) -> usize {
        self.quests.iter().filter(|q| q.completed).count()
    }
}
