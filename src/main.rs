use std::io::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use calmesh_sync::audit_log::AuditLog;
use calmesh_sync::backend::ics_dir::IcsDirBackend;
use calmesh_sync::backend::CalendarBackend;
use calmesh_sync::clock::SystemClock;
use calmesh_sync::config::Config;
use calmesh_sync::idgen::UuidGenerator;
use calmesh_sync::paths::Paths;
use calmesh_sync::reconciler::Reconciler;
use calmesh_sync::state::MeshStateStore;

#[derive(Parser)]
#[command(name = "calmesh-sync")]
#[command(about = "Keep a set of calendars in bidirectional mesh agreement")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Root directory holding one subdirectory of .ics files per calendar.
    /// Defaults to ~/.calendarsync/calendars.
    #[arg(long, global = true)]
    calendar_root: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run one reconciliation pass (default when no subcommand is given)
    Run,
    /// Force interactive calendar (re-)selection
    Init,
    /// Print a summary of the persisted mesh state without reconciling
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let paths = Paths::discover().context("resolving ~/.calendarsync")?;
    let calendar_root = cli.calendar_root.unwrap_or_else(|| paths.calendars_dir());
    let backend = IcsDirBackend::new(calendar_root, SystemClock, UuidGenerator);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => cmd_run(&paths, backend),
        Command::Init => cmd_init(&paths, backend),
        Command::Status => cmd_status(&paths),
    }
}

fn cmd_run(paths: &Paths, backend: IcsDirBackend<SystemClock, UuidGenerator>) -> Result<()> {
    let config = match Config::load(&paths.config_file())? {
        Some(config) => config,
        None => select_calendars_interactively(&backend, paths)?,
    };

    let known = backend.list_calendars()?;
    let selected: Vec<String> = config
        .selected_calendar_ids
        .iter()
        .filter(|id| known.iter().any(|c| &c.id == *id))
        .cloned()
        .collect();
    if selected.is_empty() {
        anyhow::bail!("none of the configured calendars exist any more; run `calmesh-sync init`");
    }

    let store = MeshStateStore::new(paths.state_file(), paths.backups_dir(), SystemClock);
    let state = store.load()?;
    let audit = AuditLog::new(paths.log_file());

    let mut reconciler = Reconciler::new(backend, SystemClock, UuidGenerator, audit);
    let state = reconciler.run(&selected, state)?;
    store.save(&state)?;

    println!("Reconciliation complete: {} sync group(s) tracked.", state.groups.len());
    Ok(())
}

fn cmd_init(paths: &Paths, backend: IcsDirBackend<SystemClock, UuidGenerator>) -> Result<()> {
    select_calendars_interactively(&backend, paths)?;
    Ok(())
}

fn cmd_status(paths: &Paths) -> Result<()> {
    let store = MeshStateStore::new(paths.state_file(), paths.backups_dir(), SystemClock);
    let state = store.load()?;

    let mut tombstoned = 0usize;
    let mut per_calendar: std::collections::BTreeMap<String, usize> = std::collections::BTreeMap::new();
    for group in &state.groups {
        for reference in &group.references {
            if reference.is_deleted {
                tombstoned += 1;
            } else {
                *per_calendar.entry(reference.calendar_id.clone()).or_default() += 1;
            }
        }
    }

    println!("Groups: {}", state.groups.len());
    println!("Tombstoned references: {tombstoned}");
    println!("Live references per calendar:");
    for (calendar_id, count) in per_calendar {
        println!("  {calendar_id}: {count}");
    }
    Ok(())
}

/// Prints discovered calendars with indices, reads a comma-separated
/// selection from stdin, requires at least two, and persists it.
fn select_calendars_interactively(backend: &impl CalendarBackend, paths: &Paths) -> Result<Config> {
    let calendars = backend.list_calendars()?;
    if calendars.len() < 2 {
        anyhow::bail!("need at least two calendars to form a mesh, found {}", calendars.len());
    }

    println!("Discovered calendars:");
    for (index, calendar) in calendars.iter().enumerate() {
        println!("  [{index}] {} ({})", calendar.name, calendar.id);
    }
    print!("Select at least two calendars by index, comma-separated: ");
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    let selected_ids: Vec<String> = input
        .trim()
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            let index: usize = s.trim().parse().context("invalid calendar index")?;
            calendars
                .get(index)
                .map(|c| c.id.clone())
                .context("calendar index out of range")
        })
        .collect::<Result<_>>()?;

    if selected_ids.len() < 2 {
        anyhow::bail!("at least two calendars are required, got {}", selected_ids.len());
    }

    let config = Config::new(selected_ids);
    config.save(&paths.config_file())?;
    Ok(config)
}
