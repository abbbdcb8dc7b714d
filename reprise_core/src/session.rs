//! Workout session state machine.
//!
//! Phases run `Idle → Exercising → Resting → Exercising → … → Complete`.
//! Each operation is a pure transition from the current snapshot to the
//! next one plus the reward it earned; the caller owns persistence.
//! Operations that are not valid in the current phase return the snapshot
//! unchanged.

use crate::config::RewardConfig;
use crate::types::{ExerciseSpec, Phase, Reward, WorkoutDefinition, WorkoutSession};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Upper bound on force/endurance gained from a single workout
pub const MAX_ATTRIBUTE_GAIN_PER_WORKOUT: f64 = 2.0;

/// Streak points granted per finished workout
const STREAK_PER_WORKOUT: f64 = 0.2;

/// What a transition did to the session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Invalid in the current phase; nothing changed
    Unchanged,
    /// The session moved and must be persisted
    Updated,
    /// The last set of the last exercise was done
    Completed,
    /// The session was dropped without reward
    Cleared,
}

/// Result of applying an operation to a session
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub session: Option<WorkoutSession>,
    pub reward: Option<Reward>,
    pub outcome: Outcome,
}

impl Transition {
    fn unchanged(session: Option<&WorkoutSession>) -> Self {
        Self {
            session: session.cloned(),
            reward: None,
            outcome: Outcome::Unchanged,
        }
    }

    fn updated(session: WorkoutSession, reward: Option<Reward>) -> Self {
        Self {
            session: Some(session),
            reward,
            outcome: Outcome::Updated,
        }
    }
}

/// Drives workout sessions using the configured reward amounts
#[derive(Clone, Debug, Default)]
pub struct SessionController {
    rules: RewardConfig,
}

impl SessionController {
    pub fn new(rules: RewardConfig) -> Self {
        Self { rules }
    }

    /// Load a workout for preview without starting it
    ///
    /// Returns `None` for templates that cannot drive a session.
    pub fn prepare(&self, definition: WorkoutDefinition, now: DateTime<Utc>) -> Option<WorkoutSession> {
        let errors = definition.validate();
        if !errors.is_empty() {
            for error in errors {
                tracing::warn!("Rejecting workout: {}", error);
            }
            return None;
        }

        Some(WorkoutSession {
            id: Uuid::new_v4(),
            definition,
            exercise_index: 0,
            set_index: 1,
            phase: Phase::Idle,
            remaining_rest_seconds: 0,
            started_at: now,
            earned_xp: 0,
            weight_lifted: 0.0,
        })
    }

    /// Load and immediately begin a workout
    pub fn start(&self, definition: WorkoutDefinition, now: DateTime<Utc>) -> Transition {
        match self.prepare(definition, now) {
            Some(session) => self.begin(Some(&session)),
            None => Transition::unchanged(None),
        }
    }

    /// `Idle → Exercising`
    pub fn begin(&self, session: Option<&WorkoutSession>) -> Transition {
        match session {
            Some(s) if s.phase == Phase::Idle => {
                let mut next = s.clone();
                next.phase = Phase::Exercising;
                tracing::info!("Workout {} started", next.definition.id);
                Transition::updated(next, None)
            }
            _ => Transition::unchanged(session),
        }
    }

    /// Record the current set as done and advance
    pub fn complete_set(&self, session: Option<&WorkoutSession>) -> Transition {
        let Some(current) = session.filter(|s| s.phase == Phase::Exercising) else {
            tracing::debug!("complete_set ignored: no exercise in progress");
            return Transition::unchanged(session);
        };
        let Some(exercise) = current.current_exercise() else {
            tracing::warn!(
                "complete_set ignored: exercise index {} out of range",
                current.exercise_index
            );
            return Transition::unchanged(session);
        };

        let set_reward = self.set_reward(exercise);
        let mut next = current.clone();
        next.earned_xp += set_reward.xp;
        next.weight_lifted += set_reward.weight_lifted;

        if current.set_index < exercise.sets {
            next.set_index += 1;
            self.enter_rest(&mut next, self.rest_for(exercise));
            return Transition::updated(next, Some(set_reward));
        }

        let next_index = current.exercise_index + 1;
        if let Some(next_exercise) = current.definition.exercises.get(next_index) {
            next.exercise_index = next_index;
            next.set_index = 1;
            let rest = self.rest_for(next_exercise);
            self.enter_rest(&mut next, rest);
            return Transition::updated(next, Some(set_reward));
        }

        let bonus = self.completion_bonus(&current.definition);
        next.earned_xp += bonus.xp;
        next.phase = Phase::Complete;
        next.remaining_rest_seconds = 0;

        tracing::info!(
            "Workout {} complete: {} XP earned, {:.1} kg lifted",
            next.definition.id,
            next.earned_xp,
            next.weight_lifted
        );

        Transition {
            session: Some(next),
            reward: Some(set_reward.merge(bonus)),
            outcome: Outcome::Completed,
        }
    }

    /// Finish the workout now, skipping whatever sets remain
    ///
    /// Grants the completion bonus only; unfinished sets earn nothing.
    pub fn finish(&self, session: Option<&WorkoutSession>) -> Transition {
        let Some(current) = session.filter(|s| s.is_active()) else {
            tracing::debug!("finish ignored: no active workout");
            return Transition::unchanged(session);
        };

        let bonus = self.completion_bonus(&current.definition);
        let mut next = current.clone();
        next.earned_xp += bonus.xp;
        next.phase = Phase::Complete;
        next.remaining_rest_seconds = 0;
        tracing::info!("Workout {} finished early", next.definition.id);

        Transition {
            session: Some(next),
            reward: Some(bonus),
            outcome: Outcome::Completed,
        }
    }

    /// One second of rest elapsed
    pub fn tick(&self, session: Option<&WorkoutSession>) -> Transition {
        let Some(current) = session.filter(|s| s.phase == Phase::Resting) else {
            return Transition::unchanged(session);
        };

        let mut next = current.clone();
        next.remaining_rest_seconds = current.remaining_rest_seconds.saturating_sub(1);
        if next.remaining_rest_seconds == 0 {
            next.phase = Phase::Exercising;
        }
        Transition::updated(next, None)
    }

    /// End the rest phase now
    pub fn skip_rest(&self, session: Option<&WorkoutSession>) -> Transition {
        let Some(current) = session.filter(|s| s.phase == Phase::Resting) else {
            tracing::debug!("skip_rest ignored: not resting");
            return Transition::unchanged(session);
        };

        let mut next = current.clone();
        next.phase = Phase::Exercising;
        next.remaining_rest_seconds = 0;
        Transition::updated(next, None)
    }

    /// Jump to an exercise regardless of what was completed before it
    pub fn navigate_to(&self, session: Option<&WorkoutSession>, index: usize) -> Transition {
        let Some(current) = session.filter(|s| s.is_active()) else {
            tracing::debug!("navigate_to ignored: no active workout");
            return Transition::unchanged(session);
        };
        if index >= current.definition.exercises.len() {
            tracing::debug!(
                "navigate_to ignored: index {} out of range (0..{})",
                index,
                current.definition.exercises.len()
            );
            return Transition::unchanged(session);
        }

        let mut next = current.clone();
        next.exercise_index = index;
        next.set_index = 1;
        next.phase = Phase::Exercising;
        next.remaining_rest_seconds = 0;
        Transition::updated(next, None)
    }

    /// Drop the workout without reward
    pub fn abandon(&self, session: Option<&WorkoutSession>) -> Transition {
        match session {
            Some(s) if s.phase != Phase::Complete => {
                tracing::info!("Workout {} abandoned", s.definition.id);
                Transition {
                    session: None,
                    reward: None,
                    outcome: Outcome::Cleared,
                }
            }
            _ => Transition::unchanged(session),
        }
    }

    fn rest_for(&self, exercise: &ExerciseSpec) -> u32 {
        exercise.rest_seconds.unwrap_or(self.rules.default_rest_seconds)
    }

    fn enter_rest(&self, session: &mut WorkoutSession, seconds: u32) {
        session.remaining_rest_seconds = seconds;
        session.phase = if seconds == 0 {
            Phase::Exercising
        } else {
            Phase::Resting
        };
    }

    /// XP for one set plus the weight it moved
    pub fn set_reward(&self, exercise: &ExerciseSpec) -> Reward {
        let xp = exercise.xp_per_set.unwrap_or(self.rules.xp_per_set);
        let weight_lifted = exercise
            .weight
            .kilograms()
            .map(|kg| kg * f64::from(exercise.reps))
            .unwrap_or(0.0);

        Reward {
            xp: u64::from(xp),
            weight_lifted,
            ..Reward::default()
        }
    }

    /// Bonus granted once when the final set is done
    pub fn completion_bonus(&self, definition: &WorkoutDefinition) -> Reward {
        let exercises = definition.exercises.len() as u64;
        let gain = self
            .rules
            .attribute_gain_per_workout
            .clamp(0.0, MAX_ATTRIBUTE_GAIN_PER_WORKOUT);

        Reward {
            xp: self.rules.workout_base_xp + self.rules.xp_per_exercise * exercises,
            coins: self.rules.workout_base_coins + self.rules.coins_per_exercise_pair * (exercises / 2),
            force: gain,
            endurance: gain,
            workouts_completed: 1,
            streak: STREAK_PER_WORKOUT,
            ..Reward::default()
        }
    }
}
