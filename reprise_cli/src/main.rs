use clap::{Parser, Subcommand};
use reprise_core::store::{FileCache, JournalStore, OfflineStore, RecordStore, Reconciler};
use reprise_core::*;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "reprise")]
#[command(about = "Gamified workout progression engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Run without the remote store; everything stays in the local cache
    #[arg(long, global = true)]
    offline: bool,

    /// Load the workout program from a JSON file instead of the bundled one
    #[arg(long, global = true)]
    program: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show level, attributes, workout and quests (default)
    Status,

    /// List the workouts of the program
    Program,

    /// Start a workout from the program
    Start {
        /// Workout id (see `reprise program`)
        workout_id: String,
    },

    /// Mark the current set as done
    Set,

    /// Finish the workout now, skipping the remaining sets
    Finish,

    /// End the rest period early
    SkipRest,

    /// Run the rest countdown until the next set
    Rest {
        /// Length of one countdown step in milliseconds
        #[arg(long, default_value_t = 1000, hide = true)]
        tick_ms: u64,
    },

    /// Jump to an exercise of the current workout (1-based)
    Goto { exercise: usize },

    /// Drop the current workout without reward
    Abandon,

    /// Complete a daily quest
    Quest { id: u32 },

    /// Log a glass of water
    Water,

    /// Grant XP directly
    Xp {
        #[arg(allow_negative_numbers = true)]
        amount: i64,
    },

    /// Grant muscle coins directly
    Coins {
        #[arg(allow_negative_numbers = true)]
        amount: i64,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    reprise_core::logging::init();

    let cli = Cli::parse();

    // Determine data directory
    let config = Config::load()?;
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| config.data.data_dir.clone());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(cli, config, data_dir))
}

async fn run(cli: Cli, config: Config, data_dir: PathBuf) -> Result<()> {
    let catalog = match &cli.program {
        Some(path) => Catalog::with_program_file(path)?,
        None => build_default_catalog(),
    };
    let errors = catalog.validate();
    if !errors.is_empty() {
        eprintln!("Program validation errors:");
        for error in errors {
            eprintln!("  - {}", error);
        }
        return Err(Error::Config("Invalid program".into()));
    }

    let local = Arc::new(FileCache::new(data_dir.join("cache")));
    let remote: Arc<dyn RecordStore> = if cli.offline {
        Arc::new(OfflineStore)
    } else {
        Arc::new(JournalStore::new(data_dir.join("remote.jsonl")))
    };
    let (reconciler, sync) = Reconciler::spawn(local, remote);

    let mut engine = Engine::open(&config, &catalog, reconciler, Arc::new(SystemClock)).await?;
    let result = dispatch(&mut engine, &catalog, cli.command.unwrap_or(Commands::Status)).await;

    // Dropping the engine closes the sync queue; wait for it to drain
    drop(engine);
    match sync.await {
        Ok(report) => tracing::debug!(
            "Remote sync: {} synced, {} failed",
            report.synced,
            report.failed
        ),
        Err(e) => tracing::warn!("Remote sync task failed: {}", e),
    }

    result
}

async fn dispatch(engine: &mut Engine, catalog: &Catalog, command: Commands) -> Result<()> {
    match command {
        Commands::Status => cmd_status(engine).await,
        Commands::Program => display_program(engine, catalog).await,
        Commands::Start { workout_id } => cmd_start(engine, catalog, &workout_id).await,
        Commands::Set => {
            let xp_before = engine.progress().xp;
            let session = engine.complete_set()?;
            report_session(engine, session.as_ref(), xp_before);
            Ok(())
        }
        Commands::Finish => {
            let xp_before = engine.progress().xp;
            let session = engine.complete_workout()?;
            report_session(engine, session.as_ref(), xp_before);
            Ok(())
        }
        Commands::SkipRest => {
            let xp_before = engine.progress().xp;
            let session = engine.skip_rest()?;
            report_session(engine, session.as_ref(), xp_before);
            Ok(())
        }
        Commands::Rest { tick_ms } => cmd_rest(engine, Duration::from_millis(tick_ms.max(1))).await,
        Commands::Goto { exercise } => {
            let xp_before = engine.progress().xp;
            let Some(index) = exercise.checked_sub(1) else {
                println!("Exercise {} is out of range.", exercise);
                report_session(engine, engine.session(), xp_before);
                return Ok(());
            };
            let session = engine.navigate_to_exercise(index)?;
            report_session(engine, session.as_ref(), xp_before);
            Ok(())
        }
        Commands::Abandon => {
            if engine.session().is_none() {
                println!("No workout in progress.");
                return Ok(());
            }
            engine.abandon_workout()?;
            println!("✓ Workout abandoned");
            Ok(())
        }
        Commands::Quest { id } => {
            let before = engine.progress().clone();
            let quests = engine.complete_quest(id).await?;
            report_quest(engine, &quests, id, &before);
            Ok(())
        }
        Commands::Water => {
            let before = engine.progress().clone();
            let quests = engine.drink_water().await?;
            report_quest(engine, &quests, reprise_core::quests::HYDRATION_QUEST_ID, &before);
            Ok(())
        }
        Commands::Xp { amount } => {
            let progress = engine.add_xp(amount)?;
            let info = engine.current_level_info();
            println!("XP: {} (Level {} · {})", progress.xp, info.level, info.title);
            Ok(())
        }
        Commands::Coins { amount } => {
            let progress = engine.add_muscle_coins(amount)?;
            println!("Coins: {}", progress.coins);
            Ok(())
        }
    }
}

async fn cmd_status(engine: &mut Engine) -> Result<()> {
    engine.refresh_day().await?;

    let info = engine.current_level_info();
    let progress = engine.progress();
    let stats = engine.stats();

    println!("\n╭─────────────────────────────────────────╮");
    println!("│  Level {} · {}", info.level, info.title);
    println!("╰─────────────────────────────────────────╯");
    println!();
    println!(
        "  XP: {} ({}/{} to level {})",
        progress.xp,
        info.xp_into_level,
        info.xp_for_next,
        info.level + 1
    );
    println!("  Coins: {}", progress.coins);
    println!(
        "  Force {:.1} · Endurance {:.1} · Speed {:.1} · Assiduity {:.1}",
        stats.attributes.force,
        stats.attributes.endurance,
        stats.attributes.speed,
        stats.attributes.assiduity
    );
    println!(
        "  Workouts: {} · Lifted: {:.1} kg",
        stats.total_workouts_completed, stats.total_weight_lifted
    );
    println!();

    match engine.session() {
        Some(session) => display_session(session),
        None => println!("  No workout in progress."),
    }
    println!();

    display_quests(engine.quests());
    println!();
    Ok(())
}

async fn cmd_start(engine: &mut Engine, catalog: &Catalog, workout_id: &str) -> Result<()> {
    let Some(definition) = catalog.workout(workout_id) else {
        eprintln!("Unknown workout: {}", workout_id);
        eprintln!("Run `reprise program` to list the available workouts.");
        return Err(Error::Other(format!("Unknown workout: {}", workout_id)));
    };

    if engine.is_completed_this_week(workout_id).await? {
        println!("{} is already done this week · Terminé ✓", workout_id);
        return Ok(());
    }

    let session = engine.start_workout(definition.clone()).await?;
    match session {
        Some(session) => {
            println!("\n✓ {} · {} started", session.definition.day, session.definition.kind);
            display_session(&session);
        }
        None => println!("Workout {} could not be started.", workout_id),
    }
    Ok(())
}

async fn cmd_rest(engine: &mut Engine, period: Duration) -> Result<()> {
    if engine.session().map(|s| s.phase) != Some(Phase::Resting) {
        println!("Not resting.");
        return Ok(());
    }

    let (clock, mut ticks) = RestClock::with_period(period);
    engine.attach_rest_clock(clock);

    while let Some(tick) = ticks.recv().await {
        match engine.on_timer_tick(tick)? {
            Some(session) if session.phase == Phase::Resting => {
                print!("\r  Rest: {:>3}s ", session.remaining_rest_seconds);
                io::stdout().flush()?;
            }
            _ => break,
        }
    }

    println!("\n✓ Rest over, next set!");
    if let Some(session) = engine.session() {
        display_session(session);
    }
    Ok(())
}

fn report_session(engine: &Engine, session: Option<&WorkoutSession>, xp_before: u64) {
    match session {
        Some(session) if session.phase == Phase::Complete => {
            println!("\n✓ Workout complete!");
            println!("  +{} XP this workout", session.earned_xp);
            println!("  Lifted: {:.1} kg", session.weight_lifted);
            let info = engine.current_level_info();
            if leveling::level_for_xp(xp_before) < info.level {
                println!("  ★ Level up! Level {} · {}", info.level, info.title);
            }
        }
        Some(session) => display_session(session),
        None => println!("No workout in progress."),
    }
}

fn report_quest(engine: &Engine, quests: &QuestSet, id: u32, before: &PlayerProgress) {
    let Some(quest) = quests.get(id) else {
        println!("Unknown quest: {}", id);
        return;
    };

    let progress = engine.progress();
    if progress.xp > before.xp {
        println!("\n✓ Quest complete: {}", quest.name);
        println!(
            "  +{} XP, +{} coins",
            progress.xp - before.xp,
            progress.coins.saturating_sub(before.coins)
        );
        if progress.level > before.level {
            let info = engine.current_level_info();
            println!("  ★ Level up! Level {} · {}", info.level, info.title);
        }
    } else {
        println!("{}", quest_line(quest));
    }
}

fn display_session(session: &WorkoutSession) {
    let total = session.definition.exercises.len();
    let Some(exercise) = session.current_exercise() else {
        println!("  Workout {}: no current exercise", session.definition.id);
        return;
    };

    println!(
        "  Workout {}: exercise {}/{} ({}), set {}/{}",
        session.definition.id,
        session.exercise_index + 1,
        total,
        exercise.exercise_id,
        session.set_index,
        exercise.sets
    );
    match exercise.weight.kilograms() {
        Some(kg) => println!("  → {} reps at {:.1} kg", exercise.reps, kg),
        None => println!("  → {} reps", exercise.reps),
    }
    match session.phase {
        Phase::Resting => println!("  Resting: {}s left", session.remaining_rest_seconds),
        Phase::Exercising => println!("  Go!"),
        Phase::Idle => println!("  Ready"),
        Phase::Complete => println!("  Complete"),
    }
}

async fn display_program(engine: &Engine, catalog: &Catalog) -> Result<()> {
    for workout in &catalog.program {
        let done = if engine.is_completed_this_week(&workout.id).await? {
            " · Terminé ✓"
        } else {
            ""
        };
        println!("{} · {} · {}{}", workout.id, workout.day, workout.kind, done);
        for exercise in &workout.exercises {
            let load = match exercise.weight.kilograms() {
                Some(kg) => format!(" @ {:.1} kg", kg),
                None => String::new(),
            };
            println!(
                "  - {}: {}x{}{}",
                exercise.exercise_id, exercise.sets, exercise.reps, load
            );
        }
    }
    Ok(())
}

fn display_quests(quests: &QuestSet) {
    println!(
        "  Quests for {} ({}/{}):",
        quests.date,
        quests.completed_count(),
        quests.quests.len()
    );
    for quest in &quests.quests {
        println!("{}", quest_line(quest));
    }
}

fn quest_line(quest: &Quest) -> String {
    let mark = if quest.completed { "x" } else { " " };
    match quest.kind() {
        QuestKind::Progress { max } => format!(
            "   [{}] {} {} {:.1}/{:.1}",
            mark,
            quest.id,
            quest.name,
            quest.progress.unwrap_or(0.0),
            max
        ),
        QuestKind::Binary => format!(
            "   [{}] {} {} (+{} XP, +{} coins)",
            mark, quest.id, quest.name, quest.reward_xp, quest.reward_coins
        ),
    }
}
