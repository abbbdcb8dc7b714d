#![forbid(unsafe_code)]

//! Core progression and session engine for Reprise.
//!
//! This crate provides:
//! - Domain types (player progress, stats, workouts, sessions, quests)
//! - Level curve and reward resolution
//! - Workout session state machine and rest timer
//! - Daily quest tracking
//! - Two-tier persistence (local cache + remote record store)
//! - The [`Engine`] facade tying them together

pub mod types;
pub mod error;
pub mod catalog;
pub mod config;
pub mod logging;
pub mod clock;
pub mod leveling;
pub mod session;
pub mod quests;
pub mod store;
pub mod timer;
pub mod engine;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use catalog::{build_default_catalog, get_default_catalog, Catalog};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use engine::{CompletedWorkout, Engine, WorkoutCompletion};
pub use leveling::LevelInfo;
pub use store::{Reconciler, RecordKey, Table};
pub use timer::{RestClock, TimerTick};
