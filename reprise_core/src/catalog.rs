//! Default content: the daily quest list and a weekly workout program.
//!
//! The engine treats this content as read-only. Programs can also be loaded
//! from a JSON file produced by an external content provider.

use crate::types::*;
use crate::Result;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::path::Path;

/// Cached default catalog - built once and reused across all operations
static DEFAULT_CATALOG: Lazy<Catalog> = Lazy::new(build_default_catalog);

/// Quests and workouts available to the player
#[derive(Clone, Debug)]
pub struct Catalog {
    pub quests: Vec<Quest>,
    pub program: Vec<WorkoutDefinition>,
}

/// Get a reference to the cached default catalog
pub fn get_default_catalog() -> &'static Catalog {
    &DEFAULT_CATALOG
}

fn binary(id: u32, name: &str, reward_xp: u64, reward_coins: u64) -> Quest {
    Quest {
        id,
        name: name.into(),
        reward_xp,
        reward_coins,
        completed: false,
        progress: None,
        max: None,
    }
}

/// The five daily quests
pub fn default_quests() -> Vec<Quest> {
    vec![
        binary(1, "Le Réveil Musculaire", 80, 40),
        Quest {
            id: 2,
            name: "Hydratation Champion".into(),
            reward_xp: 100,
            reward_coins: 50,
            completed: false,
            progress: Some(0.0),
            max: Some(2.0),
        },
        binary(3, "Le Défi Gainage", 120, 60),
        binary(4, "La Marche Active", 150, 75),
        binary(5, "Sommeil Réparateur", 100, 50),
    ]
}

fn slot(exercise_id: &str, sets: u32, reps: u32, weight: Option<f64>, rest: u32) -> ExerciseSpec {
    ExerciseSpec {
        exercise_id: exercise_id.into(),
        sets,
        reps,
        weight: Load::from_kg(weight),
        rest_seconds: Some(rest),
        xp_per_set: None,
    }
}

/// A three-day beginner program
pub fn default_program() -> Vec<WorkoutDefinition> {
    vec![
        WorkoutDefinition {
            id: "lundi-haut".into(),
            day: "Lundi".into(),
            kind: "Haut du corps".into(),
            exercises: vec![
                slot("pompes", 3, 10, None, 60),
                slot("developpe-couche", 3, 8, Some(40.0), 90),
                slot("rowing-halteres", 3, 10, Some(14.0), 60),
                slot("dips", 2, 8, None, 60),
            ],
        },
        WorkoutDefinition {
            id: "mercredi-bas".into(),
            day: "Mercredi".into(),
            kind: "Bas du corps".into(),
            exercises: vec![
                slot("squat", 4, 8, Some(50.0), 120),
                slot("fentes", 3, 12, None, 60),
                slot("souleve-de-terre-roumain", 3, 10, Some(40.0), 90),
            ],
        },
        WorkoutDefinition {
            id: "vendredi-full".into(),
            day: "Vendredi".into(),
            kind: "Full body".into(),
            exercises: vec![
                slot("burpees", 3, 10, None, 45),
                slot("tractions", 3, 5, None, 90),
                slot("gainage", 3, 1, None, 30),
                slot("kettlebell-swing", 3, 15, Some(16.0), 60),
            ],
        },
    ]
}

/// Builds the default catalog
///
/// **Note**: For production use, prefer `get_default_catalog()` which returns a
/// cached reference.
pub fn build_default_catalog() -> Catalog {
    Catalog {
        quests: default_quests(),
        program: default_program(),
    }
}

impl Catalog {
    /// Default quests with a program read from a JSON array of workouts
    pub fn with_program_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let program: Vec<WorkoutDefinition> = serde_json::from_str(&contents)?;
        tracing::info!("Loaded {} workouts from {:?}", program.len(), path);
        Ok(Self {
            quests: default_quests(),
            program,
        })
    }

    pub fn workout(&self, id: &str) -> Option<&WorkoutDefinition> {
        self.program.iter().find(|w| w.id == id)
    }

    /// Validate the catalog for consistency
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let mut quest_ids = HashSet::new();
        for quest in &self.quests {
            if !quest_ids.insert(quest.id) {
                errors.push(format!("Duplicate quest id {}", quest.id));
            }
        }

        let mut workout_ids = HashSet::new();
        for workout in &self.program {
            if !workout_ids.insert(workout.id.as_str()) {
                errors.push(format!("Duplicate workout id {}", workout.id));
            }
            errors.extend(workout.validate());
        }

        errors
    }
}
