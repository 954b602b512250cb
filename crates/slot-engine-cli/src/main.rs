//! `slots` CLI: resolve group availability, check calendar selections, and
//! book a slot from the command line.
//!
//! ## Usage
//!
//! ```sh
//! # Common free windows and candidate slots (stdin → stdout)
//! slots resolve < search.json
//!
//! # Hour-long meetings on a 30-minute grid
//! slots --granularity 30 --duration 60 resolve -i search.json
//!
//! # Settings from a TOML file
//! slots --config slots.toml resolve -i search.json -o result.json
//!
//! # Accept/reject drag ranges against allow/deny zones
//! slots check -i zones.json
//!
//! # Book the slot starting at `slotStart`
//! slots book -i booking.json
//!
//! # Show the engine's decisions on stderr
//! slots -vv resolve -i search.json
//! ```

use std::collections::BTreeMap;
use std::io::{self, Read};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{ArgAction, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use slot_engine::availability::{AvailabilityResolver, SearchCriteria};
use slot_engine::calendar::CalendarView;
use slot_engine::config::{EngineConfig, SlotPolicy};
use slot_engine::guard::{CellState, RangeDecision, ZonePolicy};
use slot_engine::interval::Interval;
use slot_engine::model::{AppointmentId, BusyInterval, ParticipantId};
use slot_engine::ports::{InMemoryAppointmentStore, InMemoryBusySource};
use slot_engine::slots::{discretize_with_policy, Slot};
use slot_engine::wire::{format_datetime, WindowDto};
use slot_engine::wizard::BookingWizard;

#[derive(Parser)]
#[command(
    name = "slots",
    version,
    about = "Group availability and slot booking CLI"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML file with engine settings
    #[arg(long, global = true)]
    config: Option<String>,

    /// Candidate grid step in minutes (overrides the config file)
    #[arg(long, global = true)]
    granularity: Option<i64>,

    /// Meeting length in minutes (overrides the config file)
    #[arg(long, global = true)]
    duration: Option<i64>,

    /// Increase log verbosity on stderr (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute common free windows and candidate slots
    Resolve {
        /// Input JSON file (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
        /// Output file (writes to stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Decide drag ranges and cell states against allow/deny zones
    Check {
        /// Input JSON file (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
        /// Output file (writes to stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Search, choose the slot starting at `slotStart`, and book it
    Book {
        /// Input JSON file (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
        /// Output file (writes to stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Input and output documents
// ---------------------------------------------------------------------------

/// One committed block in a participant's calendar.
#[derive(Debug, Deserialize)]
struct CalendarEntry {
    #[serde(default)]
    appointment: Option<AppointmentId>,
    #[serde(flatten)]
    interval: Interval,
}

/// Participants missing from `calendars` cannot be looked up and are
/// treated as busy for the whole range.
type Calendars = BTreeMap<ParticipantId, Vec<CalendarEntry>>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveInput {
    range: Interval,
    participants: Vec<ParticipantId>,
    #[serde(default)]
    exclude_appointment_id: Option<AppointmentId>,
    #[serde(default)]
    calendars: Calendars,
}

#[derive(Debug, Serialize)]
struct ResolveOutput {
    windows: Vec<WindowDto>,
    slots: Vec<Slot>,
}

#[derive(Debug, Deserialize)]
struct CheckInput {
    #[serde(default)]
    allow: Vec<Interval>,
    #[serde(default)]
    deny: Vec<Interval>,
    #[serde(default)]
    ranges: Vec<Interval>,
    /// When present, the cell states of this UTC day are reported too.
    #[serde(default)]
    day: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
struct RangeVerdict {
    start: String,
    end: String,
    decision: RangeDecision,
}

#[derive(Debug, Serialize)]
struct CellReport {
    start: String,
    state: CellState,
}

#[derive(Debug, Serialize)]
struct CheckOutput {
    policy: &'static str,
    decisions: Vec<RangeVerdict>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cells: Vec<CellReport>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookInput {
    range: Interval,
    participants: Vec<ParticipantId>,
    #[serde(default)]
    calendars: Calendars,
    name: String,
    #[serde(default)]
    notes: String,
    slot_start: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BookOutput {
    id: String,
    name: String,
    start: String,
    end: String,
    status: String,
    collaborators: String,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let policy = load_policy(
        cli.config.as_deref(),
        cli.granularity,
        cli.duration,
    )?;
    debug!(
        granularity = policy.granularity().num_minutes(),
        duration = policy.duration().num_minutes(),
        "slot policy loaded"
    );

    match cli.command {
        Commands::Resolve { input, output } => {
            let json = read_input(input.as_deref())?;
            let request: ResolveInput =
                serde_json::from_str(&json).context("Failed to parse resolve input")?;
            let result = resolve(request, &policy).await;
            write_json(output.as_deref(), &result)?;
        }
        Commands::Check { input, output } => {
            let json = read_input(input.as_deref())?;
            let request: CheckInput =
                serde_json::from_str(&json).context("Failed to parse check input")?;
            let result = check(request, &policy);
            write_json(output.as_deref(), &result)?;
        }
        Commands::Book { input, output } => {
            let json = read_input(input.as_deref())?;
            let request: BookInput =
                serde_json::from_str(&json).context("Failed to parse book input")?;
            let result = book(request, policy).await?;
            write_json(output.as_deref(), &result)?;
        }
    }

    Ok(())
}

/// Route logs to stderr so stdout stays machine-readable. `RUST_LOG` wins
/// over `-v` when set.
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Build the slot policy from the optional config file and CLI overrides.
fn load_policy(
    config_path: Option<&str>,
    granularity: Option<i64>,
    duration: Option<i64>,
) -> Result<SlotPolicy> {
    let mut config = match config_path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path))?;
            toml::from_str::<EngineConfig>(&text)
                .with_context(|| format!("Invalid config file: {}", path))?
        }
        None => EngineConfig::default(),
    };

    if let Some(minutes) = granularity {
        config.granularity_minutes = minutes;
    }
    if let Some(minutes) = duration {
        config.duration_minutes = minutes;
    }

    config.policy().context("Invalid slot settings")
}

fn busy_source(calendars: &Calendars) -> InMemoryBusySource {
    calendars
        .iter()
        .fold(InMemoryBusySource::new(), |source, (participant, entries)| {
            entries
                .iter()
                .fold(source.with_participant(participant.clone()), |source, entry| {
                    source.with_busy(BusyInterval {
                        participant: participant.clone(),
                        appointment: entry.appointment.clone(),
                        interval: entry.interval,
                    })
                })
        })
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

async fn resolve(input: ResolveInput, policy: &SlotPolicy) -> ResolveOutput {
    let resolver = AvailabilityResolver::new(busy_source(&input.calendars));
    let mut criteria = SearchCriteria::new(input.range, input.participants);
    if let Some(id) = input.exclude_appointment_id {
        criteria = criteria.excluding(id);
    }

    let windows = resolver.resolve(&criteria).await;
    let slots = discretize_with_policy(&windows, policy);
    info!(
        windows = windows.len(),
        slots = slots.len(),
        "availability resolved"
    );

    ResolveOutput {
        windows: windows.iter().map(WindowDto::from).collect(),
        slots,
    }
}

fn check(input: CheckInput, policy: &SlotPolicy) -> CheckOutput {
    let view = CalendarView::default()
        .with_allow_zones(input.allow)
        .with_deny_zones(input.deny);

    let policy_name = match view.guard().policy() {
        ZonePolicy::Unrestricted => "unrestricted",
        ZonePolicy::AllowOnly(_) => "allow-only",
        ZonePolicy::DenyListed(_) => "deny-listed",
    };

    let decisions = input
        .ranges
        .iter()
        .map(|range| RangeVerdict {
            start: format_datetime(range.start()),
            end: format_datetime(range.end()),
            decision: view.on_range_proposed(range),
        })
        .collect();

    let cells = input
        .day
        .map(|day| {
            view.day_cells(day, policy.granularity())
                .into_iter()
                .map(|(start, state)| CellReport {
                    start: format_datetime(start),
                    state,
                })
                .collect()
        })
        .unwrap_or_default();

    CheckOutput {
        policy: policy_name,
        decisions,
        cells,
    }
}

async fn book(input: BookInput, policy: SlotPolicy) -> Result<BookOutput> {
    let resolver = AvailabilityResolver::new(busy_source(&input.calendars));
    let store = InMemoryAppointmentStore::new();

    let mut wizard = BookingWizard::new(policy);
    wizard.set_range(input.range.start(), input.range.end())?;
    wizard.set_participants(input.participants)?;
    wizard.set_details(input.name, input.notes)?;
    wizard
        .search(&resolver)
        .await
        .context("Availability search failed")?;

    let Some(slot_id) = wizard
        .candidate_slots()
        .iter()
        .find(|slot| slot.start() == input.slot_start)
        .map(|slot| slot.id.clone())
    else {
        bail!(
            "No free slot starts at {} ({} candidates)",
            format_datetime(input.slot_start),
            wizard.candidate_slots().len()
        );
    };
    wizard.choose_slot(&slot_id)?;

    let appointment = wizard.submit(&store).await.context("Booking failed")?;
    Ok(BookOutput {
        id: appointment.id.to_string(),
        name: appointment.name.clone(),
        start: format_datetime(appointment.start()),
        end: format_datetime(appointment.end()),
        status: appointment.status.to_string(),
        collaborators: appointment.collaborators(),
    })
}

// ---------------------------------------------------------------------------
// I/O helpers
// ---------------------------------------------------------------------------

fn read_input(path: Option<&str>) -> Result<String> {
    match path {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path))
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}

fn write_json<T: Serialize>(path: Option<&str>, value: &T) -> Result<()> {
    let mut content = serde_json::to_string_pretty(value)?;
    content.push('\n');
    match path {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write file: {}", path))?;
        }
        None => {
            print!("{}", content);
        }
    }
    Ok(())
}
