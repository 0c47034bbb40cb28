use chrono::{Duration, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use medtrack_core::*;
use std::path::PathBuf;
use std::rc::Rc;

#[derive(Parser)]
#[command(name = "medtrack")]
#[command(about = "Medication dose tracker and reminder scheduler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Use a specific config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List medications with today's progress (default)
    List,

    /// Add a medication
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        dosage: String,
        #[arg(long)]
        purpose: String,
        #[arg(long)]
        prescribed_by: String,
        /// once, twice, thrice or custom
        #[arg(long, default_value = "once")]
        frequency: Frequency,
        /// Declared doses per day for custom schedules
        #[arg(long)]
        custom_count: Option<u32>,
        /// Dose time (HH:MM), repeatable; defaults follow the frequency
        #[arg(long = "time")]
        times: Vec<TimeOfDay>,
        #[arg(long)]
        start_date: Option<NaiveDate>,
        #[arg(long)]
        end_date: Option<NaiveDate>,
        /// Course length in days
        #[arg(long)]
        duration: Option<u32>,
        #[arg(long)]
        with_food: bool,
        #[arg(long)]
        no_reminder: bool,
        #[arg(long)]
        instructions: Option<String>,
    },

    /// Edit a medication; dose history is kept
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        dosage: Option<String>,
        #[arg(long)]
        purpose: Option<String>,
        #[arg(long)]
        prescribed_by: Option<String>,
        #[arg(long)]
        frequency: Option<Frequency>,
        #[arg(long)]
        custom_count: Option<u32>,
        /// Replace all dose times (HH:MM), repeatable
        #[arg(long = "time")]
        times: Vec<TimeOfDay>,
        #[arg(long, conflicts_with = "clear_instructions")]
        instructions: Option<String>,
        #[arg(long)]
        clear_instructions: bool,
        #[arg(long)]
        start_date: Option<NaiveDate>,
        #[arg(long, conflicts_with = "clear_end_date")]
        end_date: Option<NaiveDate>,
        #[arg(long)]
        clear_end_date: bool,
        /// Course length in days
        #[arg(long, conflicts_with = "clear_duration")]
        duration: Option<u32>,
        #[arg(long)]
        clear_duration: bool,
        #[arg(long, conflicts_with = "without_food")]
        with_food: bool,
        #[arg(long)]
        without_food: bool,
        #[arg(long, conflicts_with = "disable_reminder")]
        enable_reminder: bool,
        #[arg(long)]
        disable_reminder: bool,
    },

    /// Permanently delete a medication and its history
    Delete {
        id: String,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Mark a dose taken (or untaken again)
    Take {
        id: String,
        /// Slot index, starting at 0
        slot: usize,
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Append a 09:00 slot to a custom schedule
    AddSlot { id: String },

    /// Remove a slot from a custom schedule
    RemoveSlot { id: String, index: usize },

    /// Per-day dose status
    Status {
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Adherence over all tracked days
    Adherence,

    /// Export a report
    Export {
        #[arg(long, value_enum, default_value_t = ExportFormat::Text)]
        format: ExportFormat,
        /// Write to a file instead of stdout (required for csv)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Deliver today's reminders as they come due
    Remind {
        /// Show today's remaining reminders and exit
        #[arg(long)]
        once: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Json,
    Text,
    Csv,
}

type Tracker = MedicationTracker<JsonFileStore, TimerQueue>;

/// Longest sleep of the reminder loop, so edits from other commands are
/// picked up promptly
const POLL_INTERVAL_SECS: i64 = 60;

fn main() -> Result<()> {
    // Initialize logging
    medtrack_core::logging::init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(data_dir) = cli.data_dir {
        config.data.data_dir = data_dir;
    }

    let mut tracker = open_tracker(&config)?;

    match cli.command.unwrap_or(Commands::List) {
        Commands::List => cmd_list(&tracker),
        Commands::Add {
            name,
            dosage,
            purpose,
            prescribed_by,
            frequency,
            custom_count,
            times,
            start_date,
            end_date,
            duration,
            with_food,
            no_reminder,
            instructions,
        } => {
            let mut draft = MedicationDraft::new(name, dosage, purpose, prescribed_by, frequency);
            draft.custom_frequency = custom_count;
            draft.time_slots = (!times.is_empty()).then_some(times);
            draft.start_date = start_date;
            draft.end_date = end_date;
            draft.duration = duration;
            draft.with_food = with_food;
            draft.reminder_enabled = !no_reminder;
            draft.instructions = instructions;

            let medication = tracker.create(draft)?;
            println!("✓ Added {} ({})", medication.name, medication.id);
            print_slots(&medication);
            Ok(())
        }
        Commands::Edit {
            id,
            name,
            dosage,
            purpose,
            prescribed_by,
            frequency,
            custom_count,
            times,
            instructions,
            clear_instructions,
            start_date,
            end_date,
            clear_end_date,
            duration,
            clear_duration,
            with_food,
            without_food,
            enable_reminder,
            disable_reminder,
        } => {
            let patch = MedicationPatch {
                name,
                dosage,
                purpose,
                prescribed_by,
                frequency,
                custom_frequency: custom_count,
                time_slots: (!times.is_empty()).then_some(times),
                start_date,
                end_date: clearable(end_date, clear_end_date),
                duration: clearable(duration, clear_duration),
                with_food: toggle_flag(with_food, without_food),
                reminder_enabled: toggle_flag(enable_reminder, disable_reminder),
                instructions: clearable(instructions, clear_instructions),
            };
            let medication = tracker.update(&id, patch)?;
            println!("✓ Updated {}", medication.name);
            print_slots(&medication);
            Ok(())
        }
        Commands::Delete { id, yes } => {
            if !yes {
                eprintln!("Deleting removes the medication and all of its history.");
                eprintln!("Re-run with --yes to confirm.");
                return Err(Error::Other("deletion not confirmed".into()));
            }
            let medication = tracker.delete(&id)?;
            println!("✓ Deleted {}", medication.name);
            Ok(())
        }
        Commands::Take { id, slot, date } => {
            let date = date.unwrap_or_else(|| tracker.repository().today());
            match tracker.toggle_dose(&id, date, slot)? {
                Some(true) => println!("✓ Slot {} marked taken for {}", slot, date),
                Some(false) => println!("✓ Slot {} marked not taken for {}", slot, date),
                None => println!("Slot {} does not exist on {}; nothing changed", slot, date),
            }
            Ok(())
        }
        Commands::AddSlot { id } => {
            let medication = tracker.add_slot(&id)?;
            print_slots(&medication);
            Ok(())
        }
        Commands::RemoveSlot { id, index } => {
            let medication = tracker.remove_slot(&id, index)?;
            print_slots(&medication);
            Ok(())
        }
        Commands::Status { date } => cmd_status(&tracker, date),
        Commands::Adherence => cmd_adherence(&tracker),
        Commands::Export { format, output } => cmd_export(&tracker, format, output),
        Commands::Remind { once } => cmd_remind(&mut tracker, once),
    }
}

fn open_tracker(config: &Config) -> Result<Tracker> {
    let clock: Rc<dyn Clock> = Rc::new(SystemClock);
    let store = JsonFileStore::new(config.data.medications_path());
    let repository =
        MedicationRepository::open(store, clock).with_retention(config.history.retention_days);

    let permission = if config.reminders.enabled {
        Permission::Granted
    } else {
        Permission::Denied
    };
    let reminders = ReminderScheduler::new(
        TimerQueue::with_permission(permission),
        config.reminders.default_instructions.clone(),
    );

    MedicationTracker::start(repository, reminders)
}

/// `Some(value)` sets a field, `Some(None)` clears it, `None` keeps it
fn clearable<T>(value: Option<T>, clear: bool) -> Option<Option<T>> {
    if clear {
        Some(None)
    } else {
        value.map(Some)
    }
}

fn toggle_flag(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

fn badge(status: DayStatus) -> &'static str {
    match status {
        DayStatus::Complete => "complete",
        DayStatus::InProgress => "in progress",
        DayStatus::Pending => "pending",
    }
}

fn print_slots(medication: &Medication) {
    let slots: Vec<String> = medication
        .time_slots
        .iter()
        .enumerate()
        .map(|(i, t)| format!("[{}] {}", i, t))
        .collect();
    println!("  Times: {}", slots.join("  "));
}

fn cmd_list(tracker: &Tracker) -> Result<()> {
    let medications = tracker.list();
    if medications.is_empty() {
        println!("No medications yet. Add one with `medtrack add`.");
        return Ok(());
    }

    let today = tracker.repository().today();
    let overview = daily_overview(medications, today);
    println!(
        "Today: {}/{} doses taken ({}%)",
        overview.taken, overview.scheduled, overview.percentage
    );

    for medication in medications {
        let row = ledger::day(medication, today).unwrap_or(&[]);
        println!();
        println!("  {} ({})", medication.name, medication.id);
        println!(
            "  {} • {}{}",
            medication.dosage,
            export::frequency_label(medication),
            if medication.with_food { " • with food" } else { "" }
        );
        print_slots(medication);
        println!(
            "  Today: {} | Adherence: {}%",
            badge(ledger::day_status(row)),
            adherence(medication)
        );
    }
    Ok(())
}

fn cmd_status(tracker: &Tracker, date: Option<NaiveDate>) -> Result<()> {
    let date = date.unwrap_or_else(|| tracker.repository().today());

    for medication in tracker.list() {
        // Days never opened read as all slots pending
        let row = ledger::day(medication, date)
            .map(<[bool]>::to_vec)
            .unwrap_or_else(|| vec![false; medication.time_slots.len()]);
        let marks: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, taken)| {
                let time = medication
                    .time_slots
                    .get(i)
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "--:--".into());
                format!("[{}] {} {}", i, time, if *taken { "✓" } else { "·" })
            })
            .collect();
        println!(
            "{}: {} ({})",
            medication.name,
            marks.join("  "),
            badge(ledger::day_status(&row))
        );
    }

    let overview = daily_overview(tracker.list(), date);
    println!(
        "{}: {}/{} doses taken ({}%)",
        date, overview.taken, overview.scheduled, overview.percentage
    );
    Ok(())
}

fn cmd_adherence(tracker: &Tracker) -> Result<()> {
    for medication in tracker.list() {
        println!(
            "{}: {}% adherence over {} day(s)",
            medication.name,
            adherence(medication),
            days_tracked(medication)
        );
    }
    Ok(())
}

fn cmd_export(tracker: &Tracker, format: ExportFormat, output: Option<PathBuf>) -> Result<()> {
    let medications = tracker.list();
    let contents = match format {
        ExportFormat::Json => export::to_json(medications)?,
        ExportFormat::Text => export::to_text(medications),
        ExportFormat::Csv => {
            let path = output
                .ok_or_else(|| Error::Other("csv export needs --output".into()))?;
            let rows = export::write_history_csv(medications, &path)?;
            println!("✓ Wrote {} rows to {}", rows, path.display());
            return Ok(());
        }
    };

    match output {
        Some(path) => {
            std::fs::write(&path, contents)?;
            println!("✓ Report written to {}", path.display());
        }
        None => println!("{}", contents),
    }
    Ok(())
}

fn cmd_remind(tracker: &mut Tracker, once: bool) -> Result<()> {
    if tracker.reminders().timer().permission() != Permission::Granted {
        println!("Reminders are disabled.");
        return Ok(());
    }

    if once {
        let pending: Vec<_> = tracker.reminders().timer().pending().collect();
        if pending.is_empty() {
            println!("No more reminders today.");
        }
        for reminder in pending {
            println!(
                "{}  {} | {}",
                reminder.fire_at.format("%H:%M"),
                reminder.notification.title,
                reminder.notification.body
            );
        }
        return Ok(());
    }

    println!("Waiting for reminders (Ctrl+C to stop)...");
    let clock = tracker.repository().clock().clone();
    loop {
        match tracker.fire_due() {
            Ok(delivered) => {
                for notification in delivered {
                    println!("\n🔔 {}", notification.title);
                    println!("   {}", notification.body);
                }
            }
            // Retried on the next wake
            Err(e) => tracing::warn!("Failed to refresh medications: {}", e),
        }

        let now = clock.now();
        let mut wake_at = now + Duration::seconds(POLL_INTERVAL_SECS);
        if let Some(deadline) = tracker.reminders().timer().next_deadline() {
            wake_at = wake_at.min(deadline);
        }
        if let Some(midnight) = now.date().succ_opt().and_then(|d| d.and_hms_opt(0, 0, 0)) {
            wake_at = wake_at.min(midnight);
        }
        let wait = (wake_at - now).to_std().unwrap_or_default();
        tracing::debug!("Sleeping until {}", wake_at);
        std::thread::sleep(wait);
    }
}
