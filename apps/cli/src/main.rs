#![deny(warnings)]

//! Headless CLI for the health progression engine: submit a daily log,
//! inspect status, and manage challenges against a local SQLite store.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use habit_core::{definition, next_challenge, BloodPressure, ChallengeId, DailyInput};
use habit_engine::{stage_message, ProgressionStore};
use persistence::{default_sqlite_url, init_db, SqliteRepository};
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

enum Command {
    Status,
    Log(DailyInput),
    Start(ChallengeId),
    Complete,
    Export(String),
}

struct Args {
    user: String,
    db: String,
    /// Evaluation date override; defaults to the local calendar day.
    date: Option<NaiveDate>,
    command: Command,
}

const USAGE: &str = "usage: habitctl [--user NAME] [--db URL] [--date YYYY-MM-DD] <command>
commands:
  status
  log [--meds] [--junk N] [--sleep N] [--midnight] [--move] [--bp SYS/DIA]
  start <7day|14day|30day>
  complete
  export <file>";

fn parse_args() -> Result<Args> {
    let mut user = "Sadman".to_string();
    let mut db = default_sqlite_url().to_string();
    let mut date: Option<NaiveDate> = None;
    let mut command: Option<Command> = None;
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--user" => user = it.next().context("--user needs a value")?,
            "--db" => db = it.next().context("--db needs a value")?,
            "--date" => {
                let raw = it.next().context("--date needs a value")?;
                date = Some(raw.parse().context("--date must be YYYY-MM-DD")?);
            }
            "--version" => {
                println!("habitctl {} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_SHA"));
                std::process::exit(0);
            }
            "status" => command = Some(Command::Status),
            "log" => command = Some(Command::Log(parse_log_flags(&mut it)?)),
            "start" => {
                let tier = it.next().context("start needs a challenge id")?;
                command = Some(Command::Start(tier.parse()?));
            }
            "complete" => command = Some(Command::Complete),
            "export" => {
                let path = it.next().context("export needs a file path")?;
                command = Some(Command::Export(path));
            }
            other => bail!("unknown argument: {other}\n{USAGE}"),
        }
    }
    let command = command.with_context(|| format!("no command given\n{USAGE}"))?;
    Ok(Args {
        user,
        db,
        date,
        command,
    })
}

fn parse_log_flags(it: &mut impl Iterator<Item = String>) -> Result<DailyInput> {
    let mut input = DailyInput {
        meds_taken: false,
        junk_score: 0,
        sleep_hours: 0,
        slept_past_midnight: false,
        moved: false,
        blood_pressure: None,
    };
    while let Some(flag) = it.next() {
        match flag.as_str() {
            "--meds" => input.meds_taken = true,
            "--midnight" => input.slept_past_midnight = true,
            "--move" => input.moved = true,
            "--junk" => {
                let raw = it.next().context("--junk needs a value")?;
                input.junk_score = raw.parse().context("--junk must be 0..=10")?;
            }
            "--sleep" => {
                let raw = it.next().context("--sleep needs a value")?;
                input.sleep_hours = raw.parse().context("--sleep must be 0..=24")?;
            }
            "--bp" => {
                let raw = it.next().context("--bp needs a SYS/DIA value")?;
                input.blood_pressure = Some(parse_bp(&raw)?);
            }
            other => bail!("unknown log flag: {other}\n{USAGE}"),
        }
    }
    Ok(input)
}

fn parse_bp(raw: &str) -> Result<BloodPressure> {
    let (sys, dia) = raw
        .split_once('/')
        .with_context(|| format!("--bp expects SYS/DIA, got {raw}"))?;
    Ok(BloodPressure {
        systolic: sys.trim().parse().context("systolic must be a number")?,
        diastolic: dia.trim().parse().context("diastolic must be a number")?,
    })
}

fn today_or(date: Option<NaiveDate>) -> NaiveDate {
    date.unwrap_or_else(|| chrono::Local::now().date_naive())
}

fn print_status(store: &ProgressionStore, today: NaiveDate) {
    let state = store.state();
    println!(
        "points: {} | streak: {} | rank: {}",
        state.points_total, state.streak, state.rank
    );
    match state.active_challenge {
        Some(id) => {
            let def = definition(id);
            let pct = store.current_progress_percent(today);
            println!(
                "active: {} ({}) | progress: {}% | \"{}\"",
                def.name,
                id,
                pct,
                stage_message(def, pct)
            );
        }
        None => {
            let next = next_challenge(&state.completed_challenges);
            println!(
                "no active challenge | next up: {} ({})",
                definition(next).name,
                next
            );
        }
    }
    match store.today_log(today) {
        Some(entry) => println!("today: logged, {} points", entry.points_awarded),
        None => println!("today: not logged yet"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .init();

    let args = parse_args()?;
    let today = today_or(args.date);
    info!(user = %args.user, %today, "starting habitctl");

    let pool = init_db(&args.db).await?;
    let repo = SqliteRepository::new(pool);
    let state = match repo.load_user(&args.user).await? {
        Some((record, logs)) => habit_core::ProgressionState::from_parts(&record, logs),
        None => habit_core::ProgressionState::default(),
    };
    let mut store = ProgressionStore::new(state);

    match args.command {
        Command::Status => print_status(&store, today),
        Command::Log(input) => {
            let outcome = store.submit_daily_log(&input, today, today)?;
            println!(
                "+{} points (meds {}, junk {}, sleep {}, move {}, bp {}, bonus {})",
                outcome.points_awarded,
                outcome.breakdown.meds,
                outcome.breakdown.junk,
                outcome.breakdown.sleep,
                outcome.breakdown.movement,
                outcome.breakdown.blood_pressure,
                outcome.breakdown.perfect_day
            );
            if let Some(id) = outcome.completed {
                let def = definition(id);
                println!("challenge complete: {}! {}", def.name, def.reward.message);
            }
            save_all(&repo, &store, &args.user, today).await;
            print_status(&store, today);
        }
        Command::Start(id) => {
            store.start_challenge(id)?;
            let def = definition(id);
            println!("started {}: \"{}\"", def.name, def.messages.start);
            save_all(&repo, &store, &args.user, today).await;
        }
        Command::Complete => {
            let Some(id) = store.state().active_challenge else {
                bail!("no active challenge to complete");
            };
            store.complete_challenge(id)?;
            let def = definition(id);
            println!("completed {}: {}", def.name, def.reward.message);
            save_all(&repo, &store, &args.user, today).await;
        }
        Command::Export(path) => {
            let record = store.state().to_record(&args.user);
            let logs: Vec<_> = store.logs().copied().collect();
            let file = std::fs::File::create(&path)?;
            persistence::snapshot_to_writer(file, &record, &logs)?;
            println!("exported {} log days to {}", logs.len(), path);
        }
    }

    Ok(())
}

/// Save-after-mutation. A persistence failure is a warning, never a
/// rollback: the in-memory aggregate stays authoritative and the next
/// successful save carries it forward.
async fn save_all(repo: &SqliteRepository, store: &ProgressionStore, user: &str, today: NaiveDate) {
    let record = store.state().to_record(user);
    if let Err(err) = repo.save_user(&record).await {
        warn!(%err, "failed to save user record; keeping in-memory state");
        return;
    }
    if let Some(entry) = store.today_log(today) {
        if let Err(err) = repo.upsert_log(user, entry).await {
            warn!(%err, "failed to save today's log; keeping in-memory state");
        }
    }
}
