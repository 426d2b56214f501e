//! Binary entrypoint for the Mercator CLI.
//!
//! Commands:
//! - `init` - write a starter `mercator.toml`
//! - `simulate --hours <n> [--seed <s>] [--slot <name>]` - headless campaign run
//! - `slots` - list occupied save slots
//! - `inspect <slot>` - summarize one save envelope
//! - `status` - configuration and counter summary
//!
//! See the library crate docs for module-level details: `mercator::`.
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use mercator::config::Config;
use mercator::metrics;
use mercator::sim::{
    load_achievements_from_json, load_quests_from_json, CargoLine, Content, GameSession,
    PlayerState, Purse, SaveOrchestrator, SledSaveStore, AUTOSAVE_SLOT,
};

#[derive(Parser)]
#[command(name = "mercator")]
#[command(about = "Persistent simulation core for a historical trading game")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "mercator.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// Run the simulation headless for a number of in-game hours
    Simulate {
        /// In-game hours to advance
        #[arg(long, default_value_t = 72)]
        hours: u64,
        /// RNG seed (overrides [game].seed)
        #[arg(long)]
        seed: Option<u64>,
        /// Slot to resume from (if occupied) and save into
        #[arg(long, default_value = "slot_1")]
        slot: String,
    },
    /// List occupied save slots
    Slots,
    /// Print a summary of one save slot
    Inspect {
        /// Slot name (slot_1, slot_2, slot_3, autosave)
        slot: String,
    },
    /// Show configuration and counters
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    if !matches!(cli.command, Commands::Init) {
        init_logging(&pre_config, cli.verbose);
    }

    match cli.command {
        Commands::Init => {
            Config::create_default(&cli.config).await?;
            println!("Wrote default configuration to {}", cli.config);
        }
        Commands::Simulate { hours, seed, slot } => {
            let mut config = pre_config.unwrap_or_default();
            if seed.is_some() {
                config.game.seed = seed;
            }
            config.validate()?;
            simulate(&config, hours, &slot)?;
        }
        Commands::Slots => {
            let config = pre_config.unwrap_or_default();
            let saves = open_saves(&config)?;
            let slots = saves.list()?;
            if slots.is_empty() {
                println!("No saved games.");
            }
            for info in slots {
                println!(
                    "{:<9} day {:>4} hour {:>2}  saved {}  (v{})",
                    info.slot,
                    info.game_time / 24,
                    info.game_time % 24,
                    info.saved_at.format("%Y-%m-%d %H:%M:%S"),
                    info.version
                );
            }
        }
        Commands::Inspect { slot } => {
            let config = pre_config.unwrap_or_default();
            let saves = open_saves(&config)?;
            let envelope = saves
                .read(&slot)?
                .ok_or_else(|| anyhow!("slot {} is empty", slot))?;
            println!("slot:      {}", envelope.slot);
            println!("version:   {}", envelope.version);
            println!("saved at:  {}", envelope.saved_at.to_rfc3339());
            println!("game time: {} (day {})", envelope.game_time, envelope.game_time / 24);
            for section in mercator::sim::save::REQUIRED_SECTIONS {
                let fields = envelope
                    .section(section)
                    .and_then(|v| v.as_object())
                    .map_or(0, |o| o.len());
                println!("  {:<12} {} fields", section, fields);
            }
            if let Some(player) = &envelope.player {
                println!("player:    {}", serde_json::to_string(player)?);
            }
        }
        Commands::Status => {
            let config = match pre_config {
                Some(config) => config,
                None => {
                    println!("No configuration at {}; showing defaults.", cli.config);
                    Config::default()
                }
            };
            println!("Mercator v{}", env!("CARGO_PKG_VERSION"));
            println!("  data dir:        {}", config.storage.data_dir);
            println!(
                "  seed:            {}",
                config.game.seed.map_or("random".to_string(), |s| s.to_string())
            );
            println!("  starting gold:   {}", config.game.starting_gold);
            println!("  contract pool:   {}", config.contracts.pool_size);
            println!("  refresh days:    {}", config.contracts.refresh_days);
            println!("  autosave travel: {}", config.game.autosave_on_travel);
            match open_saves(&config).and_then(|s| Ok(s.list()?)) {
                Ok(slots) => println!("  saved slots:     {}", slots.len()),
                Err(e) => warn!("could not read save store: {}", e),
            }
            let snapshot = metrics::snapshot();
            println!("  events:          {}", snapshot.events_dispatched);
            println!(
                "  saves:           {} ok / {} failed",
                snapshot.saves_written, snapshot.saves_failed
            );
        }
    }

    Ok(())
}

fn open_saves(config: &Config) -> Result<SaveOrchestrator> {
    let store = SledSaveStore::open(&config.storage.data_dir)?;
    Ok(SaveOrchestrator::new(Box::new(store)))
}

fn load_content(config: &Config) -> Result<Content> {
    let mut content = Content::standard();
    if let Some(path) = &config.content.quests_file {
        content = content.with_quests(load_quests_from_json(path)?);
    }
    if let Some(path) = &config.content.achievements_file {
        content = content.with_achievements(load_achievements_from_json(path)?);
    }
    Ok(content)
}

fn simulate(config: &Config, hours: u64, slot: &str) -> Result<()> {
    let content = load_content(config)?;
    let purse = Purse::new(config.game.starting_gold)
        .with_item("good_wool", 20)
        .with_item("good_wine", 12)
        .with_item("good_timber", 25);
    let store = SledSaveStore::open(&config.storage.data_dir)?;
    let mut session = GameSession::new(
        content,
        Box::new(purse),
        Box::new(store),
        config.session_options(),
    )?;

    let tally: Rc<RefCell<BTreeMap<&'static str, u32>>> = Rc::new(RefCell::new(BTreeMap::new()));
    let sink = Rc::clone(&tally);
    session.subscribe(move |event| {
        *sink.borrow_mut().entry(event.kind()).or_insert(0) += 1;
    });

    let occupied = session.list_slots()?.iter().any(|info| info.slot == slot);
    if occupied && session.load(slot).is_some() {
        info!("resumed from {} at hour {}", slot, session.now());
    } else {
        // Fresh campaign: take what the board offers and send one ship out.
        let offered: Vec<String> = session
            .contracts()
            .available()
            .iter()
            .map(|t| t.id.clone())
            .collect();
        for id in offered {
            if session.accept_contract(&id).is_err() {
                break;
            }
        }
        let cargo = [CargoLine::new("good_wool", 10), CargoLine::new("good_wine", 6)];
        if let Err(e) = session.launch_expedition("levant", &cargo) {
            warn!("no expedition launched: {}", e);
        }
        session.travel("harbor");
    }

    let held: Vec<(String, String)> = session
        .contracts()
        .active()
        .iter()
        .map(|c| (c.id.clone(), c.good.clone()))
        .collect();
    for (id, good) in held {
        let quantity = session.player().item_quantity(&good);
        if quantity > 0 {
            match session.deliver_contract(&id, quantity) {
                Ok(status) => info!("delivered {} {} toward {}: {:?}", quantity, good, id, status),
                Err(e) => warn!("delivery toward {} refused: {}", id, e),
            }
        }
    }

    session.advance_hours(hours);
    let saved = session.save(slot);
    session.dispatch();
    if slot != AUTOSAVE_SLOT {
        session.quick_save();
    }

    let day = session.now() / 24;
    println!("Day {} hour {}", day, session.now() % 24);
    println!(
        "Gold {}  rank {} ({})",
        session.player().gold(),
        session.progression().profile().name,
        session.progression().rank()
    );
    for faction in session.factions().factions() {
        let value = session.factions().get(&faction.id).unwrap_or(0);
        let level = session
            .factions()
            .level(&faction.id)
            .map(|l| l.to_string())
            .unwrap_or_default();
        println!("  {:<22} {:>4} {}", faction.name, value, level);
    }
    println!(
        "Contracts: {} active, {} completed, {} failed",
        session.contracts().active().len(),
        session.contracts().completed_total(),
        session.contracts().failed_total()
    );
    println!(
        "Expeditions: {} in flight, {} home, {} lost",
        session.expeditions().in_flight(),
        session.expeditions().completed_total(),
        session.expeditions().lost_total()
    );
    println!("Achievements unlocked: {}", session.achievements().unlocked_count());
    println!("Events:");
    for (kind, count) in tally.borrow().iter() {
        println!("  {:<26} {}", kind, count);
    }
    println!(
        "{} {}",
        if saved { "Saved to" } else { "Could not save to" },
        slot
    );
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    let configured = config
        .as_ref()
        .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Warn);
    // CLI verbosity overrides config
    let level = match verbosity {
        0 => configured,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(level);

    let log_file = config.as_ref().and_then(|c| c.logging.file.clone());
    let opened = log_file.and_then(|file| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(file)
            .ok()
    });
    match opened {
        Some(f) => {
            let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
            // Mirror to the console only when attached to a terminal.
            let is_tty = atty::is(atty::Stream::Stdout);
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());
                if let Ok(mut guard) = write_mutex.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None => {
            builder.format(|fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
            });
        }
    }
    let _ = builder.try_init();
}
