//! The progression engine facade.
//!
//! Dispatches player actions to the session and quest reducers, feeds the
//! rewards they emit through the level calculator, and persists every
//! changed snapshot through the [`Reconciler`] before returning it.
//!
//! Record layout, all keyed by player id unless noted:
//! - `players/<player>`: [`PlayerProgress`]
//! - `player_stats/<player>`: [`PlayerStats`]
//! - `workout_sessions/<player>`: the in-progress [`WorkoutSession`]
//! - `daily_quest_progress/<player>:<YYYY-MM-DD>`: the day's [`QuestSet`]
//! - `workouts/<session id>`: a [`CompletedWorkout`]
//! - `workouts/<player>:<monday YYYY-MM-DD>:<workout id>`: a [`WorkoutCompletion`]
//!
//! A finished or abandoned session leaves a JSON `null` under
//! `workout_sessions/<player>` in both tiers. The local null is kept so a
//! stale remote snapshot can never shadow it.

use crate::catalog::Catalog;
use crate::clock::Clock;
use crate::config::Config;
use crate::leveling::{self, LevelInfo};
use crate::quests::{QuestTracker, QuestUpdate};
use crate::session::{Outcome, SessionController, Transition};
use crate::store::{Reconciler, RecordKey, Table};
use crate::timer::{RestClock, TimerTick};
use crate::types::{
    Phase, PlayerProgress, PlayerStats, QuestSet, Reward, WorkoutDefinition, WorkoutSession,
};
use crate::Result;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// History record written once per finished workout
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CompletedWorkout {
    pub session_id: Uuid,
    pub player_id: String,
    pub workout_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub earned_xp: u64,
    pub weight_lifted: f64,
}

/// Marks a workout of the program as done for one calendar week
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkoutCompletion {
    pub workout_id: String,
    /// Monday of the week the workout was finished in
    pub week_start: NaiveDate,
    pub session_id: Uuid,
    pub completed_at: DateTime<Utc>,
}

/// Single entry point for player actions
pub struct Engine {
    player_id: String,
    reconciler: Reconciler,
    clock: Arc<dyn Clock>,
    sessions: SessionController,
    tracker: QuestTracker,
    progress: PlayerProgress,
    stats: PlayerStats,
    session: Option<WorkoutSession>,
    quests: QuestSet,
    rest_clock: Option<RestClock>,
}

impl Engine {
    /// Load the player's state, falling back to the remote store and then
    /// to first-launch defaults, and roll the quests over to today
    pub async fn open(
        config: &Config,
        catalog: &Catalog,
        reconciler: Reconciler,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let player_id = config.player.id.clone();
        let tracker = QuestTracker::new(catalog.quests.clone(), config.quests.water_glass_liters);

        let progress_key = RecordKey::new(Table::Players, player_id.as_str());
        let progress = match reconciler.read::<PlayerProgress>(&progress_key).await? {
            Some(stored) => {
                let level = leveling::level_for_xp(stored.xp);
                if level != stored.level {
                    tracing::warn!(
                        "Stored level {} does not match {} XP; using level {}",
                        stored.level,
                        stored.xp,
                        level
                    );
                }
                PlayerProgress { level, ..stored }
            }
            None => {
                tracing::info!("No progress found for {}; starting fresh", player_id);
                let fresh = PlayerProgress::new(config.player.starting_coins);
                reconciler.write(&progress_key, &fresh)?;
                fresh
            }
        };

        let stats_key = RecordKey::new(Table::PlayerStats, player_id.as_str());
        let stored_stats = reconciler
            .read::<PlayerStats>(&stats_key)
            .await?
            .unwrap_or_default();
        let stats = leveling::recompute_attributes(&stored_stats, progress.level);

        let session_key = RecordKey::new(Table::WorkoutSessions, player_id.as_str());
        let candidate = reconciler
            .read::<Option<WorkoutSession>>(&session_key)
            .await?
            .flatten();
        let session = match candidate {
            Some(candidate) => {
                // A history record means the null after it never landed
                let history = RecordKey::new(Table::Workouts, candidate.id.to_string());
                let finished = reconciler.read::<CompletedWorkout>(&history).await?.is_some();
                if !finished && restorable(&candidate) {
                    tracing::info!(
                        "Resuming workout {} at exercise {} set {}",
                        candidate.definition.id,
                        candidate.exercise_index,
                        candidate.set_index
                    );
                    Some(candidate)
                } else {
                    tracing::info!(
                        "Discarding finished or invalid workout {}",
                        candidate.definition.id
                    );
                    reconciler.write(&session_key, &None::<WorkoutSession>)?;
                    None
                }
            }
            None => None,
        };

        let today = clock.today();
        let existing = reconciler
            .read::<QuestSet>(&quest_key(&player_id, today))
            .await?;
        let (quests, created) = tracker.reset_for_new_day(existing, today);
        if created {
            reconciler.write(&quest_key(&player_id, today), &quests)?;
        }

        Ok(Self {
            player_id,
            reconciler,
            clock,
            sessions: SessionController::new(config.rewards.clone()),
            tracker,
            progress,
            stats,
            session,
            quests,
            rest_clock: None,
        })
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn progress(&self) -> &PlayerProgress {
        &self.progress
    }

    pub fn stats(&self) -> &PlayerStats {
        &self.stats
    }

    pub fn session(&self) -> Option<&WorkoutSession> {
        self.session.as_ref()
    }

    /// The loaded quest set; call [`Engine::refresh_day`] first to roll over
    pub fn quests(&self) -> &QuestSet {
        &self.quests
    }

    pub fn current_level_info(&self) -> LevelInfo {
        leveling::current_level_info(self.progress.xp)
    }

    pub fn next_level_info(&self) -> LevelInfo {
        leveling::next_level_info(self.progress.xp)
    }

    // ------------------------------------------------------------------
    // Rest timer
    // ------------------------------------------------------------------

    /// Drive rest countdowns from `clock`
    ///
    /// Arms it right away when a restored session is resting.
    pub fn attach_rest_clock(&mut self, clock: RestClock) {
        self.rest_clock = Some(clock);
        self.sync_rest_clock(false);
    }

    pub fn is_rest_timer_armed(&self) -> bool {
        self.rest_clock.as_ref().is_some_and(RestClock::is_armed)
    }

    /// Apply a tick from the attached rest clock; stale ticks are dropped
    pub fn on_timer_tick(&mut self, tick: TimerTick) -> Result<Option<WorkoutSession>> {
        let accepted = self
            .rest_clock
            .as_ref()
            .is_some_and(|clock| clock.accept(tick));
        if !accepted {
            tracing::debug!("Dropping stale timer tick (generation {})", tick.generation);
            return Ok(self.session.clone());
        }
        self.tick()
    }

    // ------------------------------------------------------------------
    // Workout session
    // ------------------------------------------------------------------

    /// Start `definition`, replacing any workout in progress
    ///
    /// A workout already finished this week is refused and the current
    /// session is returned unchanged.
    pub async fn start_workout(
        &mut self,
        definition: WorkoutDefinition,
    ) -> Result<Option<WorkoutSession>> {
        if self.is_completed_this_week(&definition.id).await? {
            tracing::info!("Workout {} already completed this week", definition.id);
            return Ok(self.session.clone());
        }
        if let Some(current) = self.session.as_ref().filter(|s| s.is_active()) {
            tracing::info!("Replacing workout {} in progress", current.definition.id);
        }
        let transition = self.sessions.start(definition, self.clock.now());
        if transition.outcome == Outcome::Unchanged {
            return Ok(self.session.clone());
        }
        self.commit(transition)
    }

    pub fn complete_set(&mut self) -> Result<Option<WorkoutSession>> {
        let transition = self.sessions.complete_set(self.session.as_ref());
        self.commit(transition)
    }

    /// End the workout now with the completion bonus only
    pub fn complete_workout(&mut self) -> Result<Option<WorkoutSession>> {
        let transition = self.sessions.finish(self.session.as_ref());
        self.commit(transition)
    }

    /// Advance the rest countdown by one second
    pub fn tick(&mut self) -> Result<Option<WorkoutSession>> {
        let transition = self.sessions.tick(self.session.as_ref());
        self.commit(transition)
    }

    pub fn skip_rest(&mut self) -> Result<Option<WorkoutSession>> {
        let transition = self.sessions.skip_rest(self.session.as_ref());
        self.commit(transition)
    }

    pub fn navigate_to_exercise(&mut self, index: usize) -> Result<Option<WorkoutSession>> {
        let transition = self.sessions.navigate_to(self.session.as_ref(), index);
        self.commit(transition)
    }

    pub fn abandon_workout(&mut self) -> Result<Option<WorkoutSession>> {
        let transition = self.sessions.abandon(self.session.as_ref());
        self.commit(transition)
    }

    /// Whether `workout_id` was finished during the current calendar week
    pub async fn is_completed_this_week(&self, workout_id: &str) -> Result<bool> {
        let key = completion_key(&self.player_id, week_start(self.clock.today()), workout_id);
        Ok(self
            .reconciler
            .read::<WorkoutCompletion>(&key)
            .await?
            .is_some())
    }

    // ------------------------------------------------------------------
    // Quests
    // ------------------------------------------------------------------

    /// Switch to today's quest set if the calendar day changed
    ///
    /// A set already recorded for the new day, locally or remotely, is kept.
    pub async fn refresh_day(&mut self) -> Result<&QuestSet> {
        let today = self.clock.today();
        if self.quests.date != today {
            let key = quest_key(&self.player_id, today);
            let existing = self.reconciler.read::<QuestSet>(&key).await?;
            let (quests, created) = self.tracker.reset_for_new_day(existing, today);
            if created {
                self.reconciler.write(&key, &quests)?;
            }
            self.quests = quests;
        }
        Ok(&self.quests)
    }

    pub async fn complete_quest(&mut self, id: u32) -> Result<QuestSet> {
        self.refresh_day().await?;
        let update = self.tracker.complete_quest(&self.quests, id);
        self.commit_quests(update)
    }

    pub async fn progress_quest(&mut self, id: u32, amount: f64) -> Result<QuestSet> {
        self.refresh_day().await?;
        let update = self.tracker.progress_quest(&self.quests, id, amount);
        self.commit_quests(update)
    }

    /// Log one glass of water
    pub async fn drink_water(&mut self) -> Result<QuestSet> {
        self.refresh_day().await?;
        let update = self.tracker.drink_water(&self.quests);
        self.commit_quests(update)
    }

    // ------------------------------------------------------------------
    // Currency
    // ------------------------------------------------------------------

    /// Grant XP; non-positive amounts are ignored
    pub fn add_xp(&mut self, amount: i64) -> Result<PlayerProgress> {
        match u64::try_from(amount) {
            Ok(xp) if xp > 0 => self.grant(&Reward::currency(xp, 0))?,
            _ => tracing::debug!("add_xp ignored: amount {}", amount),
        }
        Ok(self.progress.clone())
    }

    /// Grant muscle coins; non-positive amounts are ignored
    pub fn add_muscle_coins(&mut self, amount: i64) -> Result<PlayerProgress> {
        match u64::try_from(amount) {
            Ok(coins) if coins > 0 => self.grant(&Reward::currency(0, coins))?,
            _ => tracing::debug!("add_muscle_coins ignored: amount {}", amount),
        }
        Ok(self.progress.clone())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn key(&self, table: Table) -> RecordKey {
        RecordKey::new(table, self.player_id.as_str())
    }

    /// Persist a session transition and apply its reward
    fn commit(&mut self, transition: Transition) -> Result<Option<WorkoutSession>> {
        let was_resting = self.is_resting();
        let key = self.key(Table::WorkoutSessions);

        match transition.outcome {
            Outcome::Unchanged => return Ok(self.session.clone()),
            Outcome::Updated => {
                if let Some(session) = &transition.session {
                    self.reconciler.write(&key, session)?;
                }
                self.session = transition.session.clone();
                if let Some(reward) = &transition.reward {
                    self.grant(reward)?;
                }
            }
            Outcome::Completed | Outcome::Cleared => {
                if let Some(done) = transition.session.as_ref().filter(|s| s.phase == Phase::Complete) {
                    self.record_completion(done)?;
                }
                // The session is only dropped once its reward is stored
                if let Some(reward) = &transition.reward {
                    self.grant(reward)?;
                }
                self.session = None;
                self.reconciler.write(&key, &None::<WorkoutSession>)?;
            }
        }

        self.sync_rest_clock(was_resting);
        Ok(transition.session)
    }

    /// Write the history record and mark the workout done for the week
    fn record_completion(&self, done: &WorkoutSession) -> Result<()> {
        let completed_at = self.clock.now();
        let record = CompletedWorkout {
            session_id: done.id,
            player_id: self.player_id.clone(),
            workout_id: done.definition.id.clone(),
            started_at: done.started_at,
            completed_at,
            earned_xp: done.earned_xp,
            weight_lifted: done.weight_lifted,
        };
        self.reconciler
            .write(&RecordKey::new(Table::Workouts, done.id.to_string()), &record)?;

        let week = week_start(self.clock.today());
        let completion = WorkoutCompletion {
            workout_id: done.definition.id.clone(),
            week_start: week,
            session_id: done.id,
            completed_at,
        };
        self.reconciler.write(
            &completion_key(&self.player_id, week, &done.definition.id),
            &completion,
        )
    }

    fn commit_quests(&mut self, update: QuestUpdate) -> Result<QuestSet> {
        if update.changed {
            let key = quest_key(&self.player_id, update.quests.date);
            self.reconciler.write(&key, &update.quests)?;
            self.quests = update.quests;
        }
        if let Some(reward) = &update.reward {
            self.grant(reward)?;
        }
        Ok(self.quests.clone())
    }

    /// Apply a reward and persist progress and stats
    fn grant(&mut self, reward: &Reward) -> Result<()> {
        if reward.is_empty() {
            return Ok(());
        }
        let resolution = leveling::apply_reward(&self.progress, &self.stats, reward);
        self.reconciler
            .write(&self.key(Table::Players), &resolution.progress)?;
        self.reconciler
            .write(&self.key(Table::PlayerStats), &resolution.stats)?;
        self.progress = resolution.progress;
        self.stats = resolution.stats;
        Ok(())
    }

    fn is_resting(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.phase == Phase::Resting)
    }

    /// Keep the rest timer armed exactly while the session is resting
    fn sync_rest_clock(&mut self, was_resting: bool) {
        let resting = self.is_resting();
        let Some(clock) = self.rest_clock.as_mut() else {
            return;
        };
        if resting {
            if !was_resting || !clock.is_armed() {
                clock.restart();
            }
        } else {
            clock.cancel();
        }
    }
}

fn quest_key(player_id: &str, date: NaiveDate) -> RecordKey {
    RecordKey::new(
        Table::DailyQuestProgress,
        format!("{}:{}", player_id, date.format("%Y-%m-%d")),
    )
}

/// Monday of the week containing `day`
fn week_start(day: NaiveDate) -> NaiveDate {
    day - Duration::days(i64::from(day.weekday().num_days_from_monday()))
}

fn completion_key(player_id: &str, week: NaiveDate, workout_id: &str) -> RecordKey {
    RecordKey::new(
        Table::Workouts,
        format!("{}:{}:{}", player_id, week.format("%Y-%m-%d"), workout_id),
    )
}

/// A snapshot can be resumed if it is unfinished and points at a real set
fn restorable(session: &WorkoutSession) -> bool {
    if !session.is_active() && session.phase != Phase::Idle {
        return false;
    }
    session
        .current_exercise()
        .is_some_and(|exercise| session.set_index >= 1 && session.set_index <= exercise.sets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::build_default_catalog;
    use crate::clock::FixedClock;
    use crate::quests::HYDRATION_QUEST_ID;
    use crate::store::{LocalCache, MemoryCache, MemoryStore, RecordStore, RemoteSync};
    use crate::Error;
    use crate::types::{ExerciseSpec, Load};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, Ordering};
    use chrono::TimeZone;

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 14, 9, 0, 0).unwrap()))
    }

    async fn open(cache: &MemoryCache, remote: &MemoryStore, clock: Arc<FixedClock>) -> (Engine, RemoteSync) {
        open_with(Arc::new(cache.clone()), Arc::new(remote.clone()), clock).await
    }

    async fn open_with(
        cache: Arc<dyn LocalCache>,
        remote: Arc<dyn RecordStore>,
        clock: Arc<FixedClock>,
    ) -> (Engine, RemoteSync) {
        crate::logging::init_test();
        let (reconciler, sync) = Reconciler::new(cache, remote);
        let engine = Engine::open(&Config::default(), &build_default_catalog(), reconciler, clock)
            .await
            .unwrap();
        (engine, sync)
    }

    fn exercise(id: &str, sets: u32, rest: u32) -> ExerciseSpec {
        ExerciseSpec {
            exercise_id: id.into(),
            sets,
            reps: 10,
            weight: Load::Bodyweight,
            rest_seconds: Some(rest),
            xp_per_set: None,
        }
    }

    fn two_exercise_workout() -> WorkoutDefinition {
        WorkoutDefinition {
            id: "test-day".into(),
            day: "Lundi".into(),
            kind: "Full body".into(),
            exercises: vec![exercise("squat", 2, 30), exercise("plank", 1, 0)],
        }
    }

    fn session_key() -> RecordKey {
        RecordKey::new(Table::WorkoutSessions, Config::default().player.id)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    /// Remote that stores everything except a JSON null
    #[derive(Clone, Default)]
    struct NullRejectingStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl RecordStore for NullRejectingStore {
        async fn get(&self, key: &RecordKey) -> Result<Option<Value>> {
            self.inner.get(key).await
        }

        async fn upsert(&self, key: &RecordKey, record: Value) -> Result<Value> {
            if record.is_null() {
                return Err(Error::Store(format!("null rejected for {}", key)));
            }
            self.inner.upsert(key, record).await
        }
    }

    /// Cache whose player progress writes can be switched to fail
    #[derive(Clone, Default)]
    struct FlakyCache {
        inner: MemoryCache,
        fail_players: Arc<AtomicBool>,
    }

    impl LocalCache for FlakyCache {
        fn get(&self, key: &RecordKey) -> Result<Option<Value>> {
            self.inner.get(key)
        }

        fn set(&self, key: &RecordKey, value: &Value) -> Result<()> {
            if key.table == Table::Players && self.fail_players.load(Ordering::SeqCst) {
                return Err(Error::Store("disk full".into()));
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &RecordKey) -> Result<()> {
            self.inner.remove(key)
        }
    }

    /// Play `two_exercise_workout` up to its last set
    async fn reach_last_set(engine: &mut Engine) {
        engine.start_workout(two_exercise_workout()).await.unwrap();
        engine.complete_set().unwrap();
        engine.skip_rest().unwrap();
        let last = engine.complete_set().unwrap().unwrap();
        assert_eq!((last.exercise_index, last.phase), (1, Phase::Exercising));
    }

    #[tokio::test]
    async fn test_first_launch_defaults() {
        let cache = MemoryCache::new();
        let (engine, _sync) = open(&cache, &MemoryStore::new(), clock()).await;

        assert_eq!(engine.progress(), &PlayerProgress::new(250));
        assert_eq!(engine.stats().attributes.force, 2.0);
        assert!(engine.session().is_none());
        assert_eq!(engine.quests().date, NaiveDate::from_ymd_opt(2024, 3, 14).unwrap());
        assert_eq!(engine.quests().completed_count(), 0);

        // Progress and today's quests are written on first launch
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_full_workout_rewards_once() {
        let cache = MemoryCache::new();
        let (mut engine, _sync) = open(&cache, &MemoryStore::new(), clock()).await;

        engine.start_workout(two_exercise_workout()).await.unwrap();
        let resting = engine.complete_set().unwrap().unwrap();
        assert_eq!((resting.phase, resting.set_index), (Phase::Resting, 2));

        engine.skip_rest().unwrap();
        let next = engine.complete_set().unwrap().unwrap();
        // Zero rest before the plank: straight back to exercising
        assert_eq!((next.exercise_index, next.phase), (1, Phase::Exercising));

        let done = engine.complete_set().unwrap().unwrap();
        assert_eq!(done.phase, Phase::Complete);
        assert!(engine.session().is_none());

        // 3 sets x 10 XP, then 100 + 2 x 10 XP and 50 + 10 coins
        assert_eq!(engine.progress().xp, 150);
        assert_eq!(engine.progress().coins, 310);
        assert_eq!(engine.stats().total_workouts_completed, 1);
        assert_eq!(engine.stats().attributes.force, 3.0);
        assert_eq!(cache.get(&session_key()).unwrap(), Some(Value::Null));

        let history = RecordKey::new(Table::Workouts, done.id.to_string());
        let record: CompletedWorkout =
            serde_json::from_value(cache.get(&history).unwrap().unwrap()).unwrap();
        assert_eq!(record.workout_id, "test-day");
        assert_eq!(record.earned_xp, 150);

        // Nothing left to complete
        assert!(engine.complete_set().unwrap().is_none());
        assert!(engine.complete_workout().unwrap().is_none());
        assert_eq!(engine.progress().xp, 150);
    }

    #[tokio::test]
    async fn test_session_resumes_after_restart() {
        let cache = MemoryCache::new();
        let remote = MemoryStore::new();

        let (mut engine, _sync) = open(&cache, &remote, clock()).await;
        engine.start_workout(two_exercise_workout()).await.unwrap();
        let before = engine.complete_set().unwrap().unwrap();
        for _ in 0..10 {
            engine.tick().unwrap();
        }
        let before = WorkoutSession {
            remaining_rest_seconds: 20,
            ..before
        };
        assert_eq!(engine.session(), Some(&before));
        drop(engine);

        let (restored, _sync) = open(&cache, &remote, clock()).await;
        assert_eq!(restored.session(), Some(&before));
        assert_eq!(restored.progress().xp, 10);
    }

    #[tokio::test]
    async fn test_completed_session_is_not_restored() {
        let cache = MemoryCache::new();
        let controller = SessionController::default();
        let mut done = controller
            .start(two_exercise_workout(), Utc::now())
            .session
            .unwrap();
        done.phase = Phase::Complete;
        cache
            .set(&session_key(), &serde_json::to_value(Some(&done)).unwrap())
            .unwrap();

        let (engine, _sync) = open(&cache, &MemoryStore::new(), clock()).await;
        assert!(engine.session().is_none());
        assert_eq!(cache.get(&session_key()).unwrap(), Some(Value::Null));
    }

    #[tokio::test]
    async fn test_cold_start_reads_remote() {
        let remote = MemoryStore::new();
        let player = Config::default().player.id;
        // Stored level is stale; it is recomputed from XP
        remote
            .seed(
                RecordKey::new(Table::Players, player.as_str()),
                serde_json::json!({"level": 1, "xp": 1600, "coins": 900}),
            )
            .await;

        let cache = MemoryCache::new();
        let (engine, _sync) = open(&cache, &remote, clock()).await;
        assert_eq!(engine.progress().level, 4);
        assert_eq!(engine.progress().coins, 900);
        assert_eq!(engine.stats().attributes.force, 4.0);
        assert!(cache
            .get(&RecordKey::new(Table::Players, player.as_str()))
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_add_xp_levels_up_and_ignores_negatives() {
        let (mut engine, _sync) = open(&MemoryCache::new(), &MemoryStore::new(), clock()).await;

        let progress = engine.add_xp(1600).unwrap();
        assert_eq!(progress.level, 4);
        assert_eq!(engine.stats().attributes.force, 4.0);
        assert_eq!(engine.stats().attributes.speed, 4.0);
        assert_eq!(engine.current_level_info().level, 4);
        assert_eq!(engine.next_level_info().xp_needed, 2250 - 1600);

        assert_eq!(engine.add_xp(-500).unwrap().xp, 1600);
        assert_eq!(engine.add_muscle_coins(-10).unwrap().coins, 250);
        assert_eq!(engine.add_muscle_coins(40).unwrap().coins, 290);
    }

    #[tokio::test]
    async fn test_water_rewards_exactly_once() {
        let (mut engine, _sync) = open(&MemoryCache::new(), &MemoryStore::new(), clock()).await;

        for _ in 0..3 {
            engine.drink_water().await.unwrap();
        }
        assert_eq!(engine.progress().xp, 0);

        let quests = engine.drink_water().await.unwrap();
        assert!(quests.get(HYDRATION_QUEST_ID).unwrap().completed);
        assert_eq!(engine.progress().xp, 100);
        assert_eq!(engine.stats().attributes.assiduity, 0.5);

        engine.drink_water().await.unwrap();
        engine.complete_quest(HYDRATION_QUEST_ID).await.unwrap();
        assert_eq!(engine.progress().xp, 100);
        assert_eq!(engine.progress().coins, 300);
    }

    #[tokio::test]
    async fn test_unknown_quest_is_noop() {
        let (mut engine, _sync) = open(&MemoryCache::new(), &MemoryStore::new(), clock()).await;
        let before = engine.quests().clone();
        assert_eq!(engine.complete_quest(99).await.unwrap(), before);
        assert_eq!(engine.progress_quest(HYDRATION_QUEST_ID, -1.0).await.unwrap(), before);
        assert_eq!(engine.progress().xp, 0);
    }

    #[tokio::test]
    async fn test_day_rollover() {
        let cache = MemoryCache::new();
        let clock = clock();
        let (mut engine, _sync) = open(&cache, &MemoryStore::new(), clock.clone()).await;

        engine.drink_water().await.unwrap();
        engine.complete_quest(1).await.unwrap();

        // Same day: nothing is reset
        engine.refresh_day().await.unwrap();
        engine.refresh_day().await.unwrap();
        assert_eq!(engine.quests().completed_count(), 1);

        clock.advance(Duration::days(1));
        let today = engine.refresh_day().await.unwrap().clone();
        assert_eq!(today.date, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        assert_eq!(today.completed_count(), 0);
        assert_eq!(today.get(HYDRATION_QUEST_ID).unwrap().progress, Some(0.0));

        // Yesterday's record is kept
        let player = Config::default().player.id;
        let yesterday = quest_key(&player, NaiveDate::from_ymd_opt(2024, 3, 14).unwrap());
        let stored: QuestSet = serde_json::from_value(cache.get(&yesterday).unwrap().unwrap()).unwrap();
        assert_eq!(stored.completed_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_remote_matches_healthy_remote() {
        async fn play(remote: MemoryStore) -> (PlayerProgress, PlayerStats, QuestSet, RemoteSync) {
            let (mut engine, sync) = open(&MemoryCache::new(), &remote, clock()).await;
            engine.start_workout(two_exercise_workout()).await.unwrap();
            engine.complete_set().unwrap();
            engine.skip_rest().unwrap();
            engine.complete_set().unwrap();
            engine.complete_set().unwrap();
            engine.drink_water().await.unwrap();
            engine.complete_quest(3).await.unwrap();
            engine.add_xp(400).unwrap();
            (
                engine.progress().clone(),
                engine.stats().clone(),
                engine.quests().clone(),
                sync,
            )
        }

        let healthy = MemoryStore::new();
        let broken = MemoryStore::new();
        broken.set_failing(true);

        let (p1, s1, q1, sync1) = play(healthy.clone()).await;
        let (p2, s2, q2, sync2) = play(broken).await;
        assert_eq!(p1, p2);
        assert_eq!(s1, s2);
        assert_eq!(q1, q2);

        // Engines are dropped, so the workers drain and stop
        assert_eq!(sync1.run().await.failed, 0);
        let report = sync2.run().await;
        assert_eq!(report.synced, 0);
        assert!(report.failed > 0);
        assert!(healthy.upsert_count() > 0);
    }

    #[tokio::test]
    async fn test_abandon_clears_without_reward() {
        let cache = MemoryCache::new();
        let (mut engine, _sync) = open(&cache, &MemoryStore::new(), clock()).await;
        engine.start_workout(two_exercise_workout()).await.unwrap();
        engine.complete_set().unwrap();

        assert!(engine.abandon_workout().unwrap().is_none());
        assert!(engine.session().is_none());
        assert_eq!(cache.get(&session_key()).unwrap(), Some(Value::Null));
        assert_eq!(engine.progress().xp, 10);
        assert_eq!(engine.stats().total_workouts_completed, 0);
    }

    #[tokio::test]
    async fn test_navigation_out_of_range_is_noop() {
        let (mut engine, _sync) = open(&MemoryCache::new(), &MemoryStore::new(), clock()).await;
        let started = engine.start_workout(two_exercise_workout()).await.unwrap();
        assert_eq!(engine.navigate_to_exercise(7).unwrap(), started);

        let moved = engine.navigate_to_exercise(1).unwrap().unwrap();
        assert_eq!((moved.exercise_index, moved.set_index), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rest_timer_follows_phase() {
        let (mut engine, _sync) = open(&MemoryCache::new(), &MemoryStore::new(), clock()).await;
        let (rest_clock, mut ticks) = RestClock::new();
        engine.attach_rest_clock(rest_clock);

        let mut definition = two_exercise_workout();
        definition.exercises[0].rest_seconds = Some(2);
        engine.start_workout(definition).await.unwrap();
        assert!(!engine.is_rest_timer_armed());

        engine.complete_set().unwrap();
        assert!(engine.is_rest_timer_armed());

        let tick = ticks.recv().await.unwrap();
        let session = engine.on_timer_tick(tick).unwrap().unwrap();
        assert_eq!(session.remaining_rest_seconds, 1);

        let tick = ticks.recv().await.unwrap();
        let session = engine.on_timer_tick(tick).unwrap().unwrap();
        assert_eq!(session.phase, Phase::Exercising);
        assert!(!engine.is_rest_timer_armed());

        // A late tick from the cancelled timer changes nothing
        assert_eq!(engine.on_timer_tick(tick).unwrap(), Some(session));
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_rest_cancels_timer() {
        let (mut engine, _sync) = open(&MemoryCache::new(), &MemoryStore::new(), clock()).await;
        let (rest_clock, _ticks) = RestClock::new();
        engine.attach_rest_clock(rest_clock);

        engine.start_workout(two_exercise_workout()).await.unwrap();
        engine.complete_set().unwrap();
        assert!(engine.is_rest_timer_armed());

        engine.skip_rest().unwrap();
        assert!(!engine.is_rest_timer_armed());
    }

    #[tokio::test]
    async fn test_finished_session_stays_finished_when_remote_rejects_null() {
        let remote = NullRejectingStore::default();
        let cache = MemoryCache::new();
        let (mut engine, sync) =
            open_with(Arc::new(cache.clone()), Arc::new(remote.clone()), clock()).await;
        reach_last_set(&mut engine).await;
        let done = engine.complete_set().unwrap().unwrap();
        assert_eq!(done.phase, Phase::Complete);
        drop(engine);

        // Only the null is lost; the remote keeps the last-set snapshot
        assert_eq!(sync.run().await.failed, 1);
        let stale = remote.inner.snapshot(&session_key()).await.unwrap();
        assert_eq!(stale["exercise_index"], 1);

        // Same device: the local null wins
        let (mut same, _sync) =
            open_with(Arc::new(cache.clone()), Arc::new(remote.clone()), clock()).await;
        assert!(same.session().is_none());
        assert!(same.complete_set().unwrap().is_none());
        assert_eq!(same.progress().xp, 150);
        drop(same);

        // Fresh device: the history record outranks the stale snapshot
        let fresh = MemoryCache::new();
        let (mut other, _sync) =
            open_with(Arc::new(fresh.clone()), Arc::new(remote.clone()), clock()).await;
        assert!(other.session().is_none());
        assert_eq!(fresh.get(&session_key()).unwrap(), Some(Value::Null));
        assert!(other.complete_set().unwrap().is_none());
        assert_eq!(other.progress().xp, 150);
        assert_eq!(other.progress().coins, 310);
        assert_eq!(other.stats().total_workouts_completed, 1);
    }

    #[tokio::test]
    async fn test_failed_reward_write_keeps_session_for_retry() {
        let cache = FlakyCache::default();
        let (mut engine, _sync) =
            open_with(Arc::new(cache.clone()), Arc::new(MemoryStore::new()), clock()).await;
        reach_last_set(&mut engine).await;
        assert_eq!(engine.progress().xp, 20);

        cache.fail_players.store(true, Ordering::SeqCst);
        assert!(engine.complete_set().is_err());

        let kept = engine.session().unwrap().clone();
        assert_eq!((kept.exercise_index, kept.phase), (1, Phase::Exercising));
        let stored: Option<WorkoutSession> =
            serde_json::from_value(cache.get(&session_key()).unwrap().unwrap()).unwrap();
        assert_eq!(stored, Some(kept));
        assert_eq!(engine.progress().xp, 20);

        cache.fail_players.store(false, Ordering::SeqCst);
        let done = engine.complete_set().unwrap().unwrap();
        assert_eq!(done.phase, Phase::Complete);
        assert!(engine.session().is_none());
        assert_eq!(engine.progress().xp, 150);
        assert_eq!(engine.progress().coins, 310);
        assert_eq!(engine.stats().total_workouts_completed, 1);
        assert_eq!(cache.get(&session_key()).unwrap(), Some(Value::Null));
    }

    #[tokio::test]
    async fn test_day_rollover_picks_up_remote_quests() {
        let remote = MemoryStore::new();
        let clock = clock();
        let (mut engine, _sync) = open(&MemoryCache::new(), &remote, clock.clone()).await;

        // Another device already logged water for tomorrow
        let mut elsewhere = engine.quests().clone();
        elsewhere.date = day(15);
        if let Some(hydration) = elsewhere
            .quests
            .iter_mut()
            .find(|q| q.id == HYDRATION_QUEST_ID)
        {
            hydration.progress = Some(1.5);
        }
        let player = Config::default().player.id;
        remote
            .seed(quest_key(&player, day(15)), serde_json::to_value(&elsewhere).unwrap())
            .await;

        clock.advance(Duration::days(1));
        let today = engine.refresh_day().await.unwrap().clone();
        assert_eq!(today.date, day(15));
        assert_eq!(today.get(HYDRATION_QUEST_ID).unwrap().progress, Some(1.5));

        let quests = engine.drink_water().await.unwrap();
        assert!(quests.get(HYDRATION_QUEST_ID).unwrap().completed);
        assert_eq!(engine.progress().xp, 100);
    }

    #[test]
    fn test_week_starts_on_monday() {
        assert_eq!(week_start(day(11)), day(11));
        assert_eq!(week_start(day(14)), day(11));
        assert_eq!(week_start(day(17)), day(11));
        assert_eq!(week_start(day(18)), day(18));
    }

    #[tokio::test]
    async fn test_finished_workout_is_done_until_monday() {
        let cache = MemoryCache::new();
        let clock = clock();
        let (mut engine, _sync) = open(&cache, &MemoryStore::new(), clock.clone()).await;
        assert!(!engine.is_completed_this_week("test-day").await.unwrap());

        engine.start_workout(two_exercise_workout()).await.unwrap();
        let done = engine.complete_workout().unwrap().unwrap();
        assert!(engine.is_completed_this_week("test-day").await.unwrap());

        let player = Config::default().player.id;
        let key = completion_key(&player, day(11), "test-day");
        let stored: WorkoutCompletion =
            serde_json::from_value(cache.get(&key).unwrap().unwrap()).unwrap();
        assert_eq!(stored.session_id, done.id);
        assert_eq!(stored.week_start, day(11));

        // Refused for the rest of the week, with no reward
        let xp = engine.progress().xp;
        assert!(engine.start_workout(two_exercise_workout()).await.unwrap().is_none());
        assert!(engine.session().is_none());
        clock.advance(Duration::days(3));
        assert!(engine.start_workout(two_exercise_workout()).await.unwrap().is_none());
        assert_eq!(engine.progress().xp, xp);

        // Sunday to Monday opens a new week
        clock.advance(Duration::days(1));
        assert!(!engine.is_completed_this_week("test-day").await.unwrap());
        let started = engine.start_workout(two_exercise_workout()).await.unwrap().unwrap();
        assert_eq!(started.phase, Phase::Exercising);
    }

    #[tokio::test]
    async fn test_abandoned_workout_is_not_done_for_the_week() {
        let (mut engine, _sync) = open(&MemoryCache::new(), &MemoryStore::new(), clock()).await;
        engine.start_workout(two_exercise_workout()).await.unwrap();
        engine.abandon_workout().unwrap();

        assert!(!engine.is_completed_this_week("test-day").await.unwrap());
        assert!(engine.start_workout(two_exercise_workout()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_weekly_completion_read_from_remote() {
        let remote = MemoryStore::new();
        let (mut engine, sync) = open(&MemoryCache::new(), &remote, clock()).await;
        engine.start_workout(two_exercise_workout()).await.unwrap();
        engine.complete_workout().unwrap();
        drop(engine);
        assert_eq!(sync.run().await.failed, 0);

        let (mut other, _sync) = open(&MemoryCache::new(), &remote, clock()).await;
        assert!(other.is_completed_this_week("test-day").await.unwrap());
        assert!(other.start_workout(two_exercise_workout()).await.unwrap().is_none());
    }
}
