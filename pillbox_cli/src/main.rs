use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use pillbox_core::alarm::AlarmSink;
use pillbox_core::dashboard;
use pillbox_core::outbox::deliver;
use pillbox_core::schedule::format_remaining;
use pillbox_core::speech::{CommandPlayer, SpeechQueue, GREETING};
use pillbox_core::watch::{TickReport, Watch, WatchOptions};
use pillbox_core::*;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "pillbox")]
#[command(about = "Medicine reminder and dispenser", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Evaluate as if it were this SGT time, e.g. "17/08/2025, 08:00:00 am".
    /// Not accepted by `watch`, which follows the system clock.
    #[arg(long, global = true)]
    at: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show every medicine's countdown (default)
    Status,

    /// Put a medicine on the list
    Add {
        #[arg(long)]
        name: String,

        #[arg(long, default_value = "")]
        dose: String,

        #[arg(long)]
        times_per_day: u32,

        #[arg(long, default_value_t = 0)]
        duration_days: u32,

        #[arg(long, default_value = "")]
        instructions: String,
    },

    /// Take a medicine off the list
    Remove { name: String },

    /// Reload a medicine's dispenser box
    Refill {
        name: String,

        /// Pills to load (defaults to the configured box size)
        #[arg(long)]
        pills: Option<u32>,
    },

    /// Pull the reminder sheet into the local list
    Sync {
        /// Drop medicines that are no longer on the sheet
        #[arg(long)]
        prune: bool,
    },

    /// Dispense one dose and log it
    Dispense {
        name: String,

        /// Do not contact the log sheet; queue the entry for later
        #[arg(long)]
        offline: bool,
    },

    /// Show the adherence log
    Logs {
        /// Only this medicine
        #[arg(long)]
        medicine: Option<String>,

        /// Also write the rows to a CSV file
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Show the per-dose timeline instead of the table
        #[arg(long, requires = "medicine")]
        timeline: bool,
    },

    /// Ask the voice agent a question
    Ask {
        #[arg(required = true)]
        question: Vec<String>,

        /// Language hint for the agent (defaults to config)
        #[arg(long)]
        language: Option<String>,

        /// Print the answer without speaking it
        #[arg(long)]
        no_speak: bool,
    },

    /// Speak a message through the TTS service
    Say { message: Option<String> },

    /// Retry log entries that could not be posted
    Flush,

    /// Run the once-a-second reminder loop
    Watch {
        /// Stop after this many ticks
        #[arg(long)]
        ticks: Option<u64>,

        /// Seconds between reminder-sheet refreshes
        #[arg(long, default_value_t = 300)]
        refresh_secs: u64,

        /// Never contact the webhooks
        #[arg(long)]
        no_refresh: bool,

        /// Do not speak reminders
        #[arg(long)]
        silent: bool,
    },
}

struct Paths {
    roster: PathBuf,
    outbox: PathBuf,
}

impl Paths {
    fn new(data_dir: &Path) -> Self {
        Self {
            roster: data_dir.join("roster.json"),
            outbox: data_dir.join("outbox.jsonl"),
        }
    }
}

fn main() -> Result<()> {
    // Initialize logging
    pillbox_core::logging::init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    std::fs::create_dir_all(&data_dir)?;
    tracing::debug!("Using data directory {:?}", data_dir);
    let paths = Paths::new(&data_dir);

    let now = match &cli.at {
        Some(text) => parse_sgt(text)?,
        None => Utc::now(),
    };

    match cli.command.unwrap_or(Commands::Status) {
        Commands::Status => cmd_status(&paths, now),
        Commands::Add {
            name,
            dose,
            times_per_day,
            duration_days,
            instructions,
        } => cmd_add(
            &paths,
            &config,
            NewMedicine {
                name,
                dose,
                times_per_day,
                duration_days,
                instructions,
            },
            now,
        ),
        Commands::Remove { name } => cmd_remove(&paths, &name),
        Commands::Refill { name, pills } => {
            cmd_refill(&paths, &name, pills.unwrap_or(config.dispenser.pills_per_box))
        }
        Commands::Sync { prune } => cmd_sync(&paths, &config, prune, now),
        Commands::Dispense { name, offline } => cmd_dispense(&paths, &config, &name, offline, now),
        Commands::Logs {
            medicine,
            csv,
            timeline,
        } => cmd_logs(&config, medicine, csv, timeline),
        Commands::Ask {
            question,
            language,
            no_speak,
        } => cmd_ask(&config, &question.join(" "), language, no_speak),
        Commands::Say { message } => cmd_say(&config, message.as_deref().unwrap_or(GREETING)),
        Commands::Flush => cmd_flush(&paths, &config),
        Commands::Watch {
            ticks,
            refresh_secs,
            no_refresh,
            silent,
        } => {
            if cli.at.is_some() {
                return Err(Error::Config(
                    "--at cannot be used with watch; it follows the system clock".into(),
                ));
            }
            cmd_watch(&paths, &config, ticks, refresh_secs, no_refresh, silent)
        }
    }
}

fn client(config: &Config) -> Result<Arc<WebhookClient>> {
    Ok(Arc::new(WebhookClient::new(&config.webhooks)?))
}

fn speech_queue(service: Arc<dyn CareService>, config: &Config) -> SpeechQueue {
    SpeechQueue::start(service, CommandPlayer::new(config.audio.player.clone()))
}

fn cmd_status(paths: &Paths, now: DateTime<Utc>) -> Result<()> {
    let roster = Roster::load(&paths.roster)?;
    if roster.medicines.is_empty() {
        println!("No medicines on the list. Add one with `pillbox add` or `pillbox sync`.");
        return Ok(());
    }

    println!("Now: {}", format_sgt(now));
    println!();
    for medicine in &roster.medicines {
        display_medicine(medicine, now);
    }
    Ok(())
}

fn display_medicine(medicine: &Medicine, now: DateTime<Utc>) {
    println!("  {}  ({})", medicine.name, medicine.dose);
    println!(
        "    {} times/day · {} days · {} pills left",
        medicine.times_per_day, medicine.duration_days, medicine.pills_remaining
    );
    if !medicine.instructions.is_empty() {
        println!("    {}", medicine.instructions);
    }
    match medicine.status(now) {
        Ok(status) if status.due => {
            println!("    ⏰ DUE since {}", format_sgt(medicine.next_dose_time));
        }
        Ok(status) => {
            println!(
                "    next {} · in {} · {:.0}% [{}]",
                format_sgt(medicine.next_dose_time),
                format_remaining(status.remaining),
                status.progress,
                tier_label(status.tier)
            );
        }
        Err(e) => println!("    ! {}", e),
    }
    println!();
}

fn tier_label(tier: ProgressTier) -> &'static str {
    match tier {
        ProgressTier::Green => "green",
        ProgressTier::Amber => "amber",
        ProgressTier::Red => "red",
    }
}

fn cmd_add(paths: &Paths, config: &Config, fields: NewMedicine, now: DateTime<Utc>) -> Result<()> {
    let pills = config.dispenser.pills_per_box;
    let name = Roster::update(&paths.roster, |roster| {
        roster.add(fields, pills, now).map(|m| m.name.clone())
    })?;
    println!("✓ Added {} (due now)", name);
    Ok(())
}

fn cmd_remove(paths: &Paths, name: &str) -> Result<()> {
    let removed = Roster::update(&paths.roster, |roster| roster.remove(name))?;
    println!("✓ Removed {}", removed.name);
    Ok(())
}

fn cmd_refill(paths: &Paths, name: &str, pills: u32) -> Result<()> {
    Roster::update(&paths.roster, |roster| roster.refill(name, pills))?;
    println!("✓ Loaded {} pills for {}", pills, name);
    Ok(())
}

fn cmd_sync(paths: &Paths, config: &Config, prune: bool, now: DateTime<Utc>) -> Result<()> {
    let service = client(config)?;
    let parsed = service.fetch_reminders()?;
    if !parsed.rejected.is_empty() {
        eprintln!("Skipped {} malformed reminder rows:", parsed.rejected.len());
        for error in &parsed.rejected {
            eprintln!("  - {}", error);
        }
    }

    let pills = config.dispenser.pills_per_box;
    let summary = Roster::update(&paths.roster, |roster| {
        roster.merge_reminders(parsed.records, pills, prune, now)
    })?;

    println!(
        "✓ Synced reminders: {} added, {} updated, {} removed",
        summary.added, summary.updated, summary.removed
    );
    Ok(())
}

fn cmd_dispense(
    paths: &Paths,
    config: &Config,
    name: &str,
    offline: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    // Resolved before the dispense commits; without a client the entry is queued
    let service = if offline {
        None
    } else {
        client(config)
            .map_err(|e| tracing::warn!("Webhook client unavailable: {}", e))
            .ok()
    };

    let policy = config.dispense_policy();
    let entry = Roster::update(&paths.roster, |roster| roster.dispense(name, now, &policy))?;

    display_log_entry(&entry);

    let mut outbox = Outbox::new(&paths.outbox);
    let delivery = deliver(service.as_deref(), &mut outbox, &entry)?;

    match delivery {
        Delivery::Sent => println!("✓ Logged to adherence sheet"),
        Delivery::Queued => println!("✓ Queued for the adherence sheet (run `pillbox flush`)"),
    }

    let roster = Roster::load(&paths.roster)?;
    if let Some(medicine) = roster.find(name) {
        println!("  Next dose: {}", format_sgt(medicine.next_dose_time));
        println!("  Pills left: {}", medicine.pills_remaining);
    }
    Ok(())
}

fn display_log_entry(entry: &LogEntry) {
    let verdict = match (entry.is_miss, entry.is_early_dispense) {
        (true, true) => "MISSED (too early)",
        (true, false) => "MISSED",
        (false, true) => "early",
        (false, false) => "on time",
    };
    println!("\n  {} dispensed: {}", entry.medicine_name, verdict);
    println!("  Supposed: {}", format_sgt(entry.supposed_last_taken_time));
    println!("  Actual:   {}", format_sgt(entry.actual_last_taken_time));
}

fn cmd_logs(
    config: &Config,
    medicine: Option<String>,
    csv: Option<PathBuf>,
    timeline: bool,
) -> Result<()> {
    let service = client(config)?;
    let parsed = service.fetch_logs()?;
    if !parsed.rejected.is_empty() {
        eprintln!("Skipped {} malformed log rows", parsed.rejected.len());
    }
    let records = parsed.records;

    let selected: Vec<&AdherenceRecord> = match &medicine {
        Some(name) => {
            let exact = dashboard::unique_medicines(&records)
                .into_iter()
                .find(|m| dashboard::medicine_label(m).eq_ignore_ascii_case(name.trim()))
                .unwrap_or_else(|| name.clone());
            dashboard::for_medicine(&records, &exact)
        }
        None => records.iter().collect(),
    };

    if timeline {
        display_timeline(&dashboard::timeline(&selected));
    } else {
        display_log_table(&selected);
    }

    let summary = dashboard::summarize(selected.iter().copied());
    println!();
    match summary.adherence_percent() {
        Some(pct) => println!(
            "  {} doses · {} missed · {} early · {:.0}% adherence",
            summary.total, summary.missed, summary.early, pct
        ),
        None => println!("  No doses logged yet"),
    }

    if let Some(path) = csv {
        let count = dashboard::export_csv(selected.iter().copied(), &path)?;
        println!("✓ Wrote {} rows to {}", count, path.display());
    }
    Ok(())
}

fn display_log_table(records: &[&AdherenceRecord]) {
    println!(
        "{:>4}  {:<20}  {:<24}  {:<24}  {:<7}  {}",
        "#", "Medicine", "Supposed", "Actual", "Missed", "Early"
    );
    for record in records {
        let entry = &record.entry;
        println!(
            "{:>4}  {:<20}  {:<24}  {:<24}  {:<7}  {}",
            record.row_number.saturating_sub(1),
            dashboard::medicine_label(&entry.medicine_name),
            format_sgt(entry.supposed_last_taken_time),
            format_sgt(entry.actual_last_taken_time),
            yes_no(entry.is_miss),
            yes_no(entry.is_early_dispense)
        );
    }
}

fn display_timeline(points: &[dashboard::TimelinePoint]) {
    for point in points {
        let diff = point
            .diff_seconds
            .map(|s| format!("{}s off", s))
            .unwrap_or_else(|| "✗".to_string());
        println!(
            "  Day {:<3} {}  supposed {}  actual {}  {}",
            point.day_index + 1,
            point.date,
            point.supposed_label,
            point.actual_label,
            diff
        );
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

fn cmd_ask(config: &Config, question: &str, language: Option<String>, no_speak: bool) -> Result<()> {
    let service = client(config)?;
    let language = language.unwrap_or_else(|| config.agent.language.clone());
    let answer = service.query_agent(&language, question)?;
    println!("{}", answer);

    if !no_speak {
        let queue = speech_queue(service, config);
        queue.speak(answer);
        queue.finish();
    }
    Ok(())
}

fn cmd_say(config: &Config, message: &str) -> Result<()> {
    let queue = speech_queue(client(config)?, config);
    queue.speak(message);
    if queue.finish() == 0 {
        return Err(Error::Other("nothing was spoken".into()));
    }
    Ok(())
}

fn cmd_flush(paths: &Paths, config: &Config) -> Result<()> {
    let outbox = Outbox::new(&paths.outbox);
    if outbox.pending()?.is_empty() {
        println!("Nothing queued.");
        return Ok(());
    }

    let service = client(config)?;
    let report = outbox.flush(|entry| service.post_log(entry))?;
    println!("✓ Sent {} queued entries, {} still waiting", report.sent, report.remaining);
    Ok(())
}

/// Rings the terminal bell while doses are due
struct TerminalAlarm;

impl AlarmSink for TerminalAlarm {
    fn play_loop(&mut self) {
        println!("\x07⏰ Dose due!");
    }

    fn stop_and_rewind(&mut self) {
        println!("✓ All doses taken");
    }
}

fn cmd_watch(
    paths: &Paths,
    config: &Config,
    ticks: Option<u64>,
    refresh_secs: u64,
    no_refresh: bool,
    silent: bool,
) -> Result<()> {
    let service = client(config)?;
    let speech = (!silent && !no_refresh).then(|| speech_queue(service.clone(), config));
    let options = WatchOptions {
        roster_path: paths.roster.clone(),
        outbox_path: paths.outbox.clone(),
        pills_per_box: config.dispenser.pills_per_box,
        prune: false,
    };
    let mut watch = Watch::new(options, service, TerminalAlarm, speech);

    let refresh_every = refresh_secs.max(1);
    let mut tick: u64 = 0;
    loop {
        if !no_refresh && tick % refresh_every == 0 {
            watch.request_refresh();
        }

        let report = watch.tick(Utc::now())?;
        display_tick(&report, watch.alarm().is_playing())?;

        tick += 1;
        if ticks.is_some_and(|limit| tick >= limit) {
            break;
        }
        std::thread::sleep(std::time::Duration::from_secs(1));
    }

    watch.finish();
    Ok(())
}

fn display_tick(report: &TickReport, alarm_playing: bool) -> Result<()> {
    if let Some(summary) = &report.refreshed {
        println!(
            "↻ Reminders refreshed: {} added, {} updated",
            summary.added, summary.updated
        );
    }

    let line = report
        .rows
        .iter()
        .map(|row| match &row.status {
            Some(status) if status.due => format!("{} DUE", row.name),
            Some(status) => format!("{} {}", row.name, format_remaining(status.remaining)),
            None => format!("{} ?", row.name),
        })
        .collect::<Vec<_>>()
        .join(" | ");

    let bell = if alarm_playing { "\x07" } else { "" };
    println!("{}{} {}", bell, Utc::now().with_timezone(&sgt::offset()).format("%I:%M:%S %P"), line);
    io::stdout().flush()?;
    Ok(())
}
