use std::path::PathBuf;

use anyhow::Context;
use chrono::{Local, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use task_ledger::config::Config;
use task_ledger::export::{self, ExportError, ExportFormat};
use task_ledger::identity::{Identity, Role};
use task_ledger::ledger::{LedgerError, TaskLedger};
use task_ledger::report::{ReportFilter, format_long_date};
use task_ledger::store::Storage;
use task_ledger::task::{TaskText, UpsertOutcome, parse_date};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Daily internship task log")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
enum Commands {
    /// Save the task for a day, today by default.
    Save {
        text: String,
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
        /// Overwrite an existing entry without asking.
        #[arg(long)]
        yes: bool,
    },
    /// Show the entry for a day.
    Show {
        #[arg(value_parser = parse_date)]
        date: NaiveDate,
    },
    /// List entries, newest first.
    List {
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Replace the text of an entry.
    Edit { id: u32, text: String },
    /// Delete an entry.
    Delete {
        id: u32,
        /// Delete without showing the entry first.
        #[arg(long)]
        yes: bool,
    },
    /// Delete every entry.
    Clear {
        #[arg(long)]
        yes: bool,
    },
    /// Show counts and progress.
    Stats,
    /// Show or change day 1 of the tracked period.
    StartDate {
        #[arg(value_parser = parse_date)]
        date: Option<NaiveDate>,
    },
    /// Print the chronological report.
    Report {
        #[arg(long)]
        min_day: Option<u32>,
        #[arg(long)]
        max_day: Option<u32>,
        #[arg(long)]
        search: Option<String>,
    },
    /// Write the report to a file.
    Export {
        #[arg(value_enum)]
        format: FormatArg,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Check credentials.
    Login {
        username: String,
        #[arg(long)]
        password: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Csv,
    Json,
    Xlsx,
}

impl From<FormatArg> for ExportFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Csv => ExportFormat::Csv,
            FormatArg::Json => ExportFormat::Json,
            FormatArg::Xlsx => ExportFormat::Xlsx,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;

    let storage = Storage::connect(&config).await;
    if storage.mode().is_degraded() {
        eprintln!("Warning: storage {}", storage.mode());
    }
    let identity = Identity::new(storage.users());
    identity.seed(&config.accounts()).await?;

    let ledger = TaskLedger::from_storage(&storage).with_total_days(config.total_days);
    let today = Local::now().date_naive();
    let start_date = ledger.ensure_start_date(today).await?;

    match run(args.command, &ledger, &identity, start_date, today).await {
        Err(err) => match err.downcast_ref::<LedgerError>() {
            Some(LedgerError::NotFound(id)) => {
                println!("No task entry with ID {}", id);
                Ok(())
            }
            _ => Err(err),
        },
        ok => ok,
    }
}

async fn run(
    command: Commands,
    ledger: &TaskLedger,
    identity: &Identity,
    start_date: NaiveDate,
    today: NaiveDate,
) -> anyhow::Result<()> {
    match command {
        Commands::Save { text, date, yes } => {
            let text = TaskText::parse(&text)?;
            let date = date.unwrap_or(today);
            if let Some(existing) = ledger.peek(date).await? {
                if !yes {
                    println!(
                        "{} already has a task (ID {}):\n  {}",
                        date,
                        existing.id(),
                        existing.text()
                    );
                    println!("Re-run with --yes to overwrite it.");
                    return Ok(());
                }
            }
            let upserted = ledger.upsert(date, text.as_str()).await?;
            match upserted.outcome() {
                UpsertOutcome::Created => {
                    println!("Task saved for {} (ID {})", date, upserted.entry().id())
                }
                UpsertOutcome::Updated => println!(
                    "Task for {} updated (was: {})",
                    date,
                    upserted.previous_text().unwrap_or_default()
                ),
            }
        }
        Commands::Show { date } => match ledger.peek(date).await? {
            Some(entry) => {
                let day = task_ledger::compute_day_number(date, start_date)
                    .map(|day| format!("Day {day}"))
                    .unwrap_or_else(|| "Before start".to_string());
                println!("{} | {} | ID {}", day, format_long_date(date), entry.id());
                println!("{}", entry.text());
            }
            None => println!("No task recorded for {}", date),
        },
        Commands::List { date, limit } => {
            let entries = ledger.list(date, limit).await?;
            if entries.is_empty() {
                println!("No tasks found");
            }
            for entry in entries {
                println!("[{}] {}  {}", entry.id(), entry.task_date(), entry.text());
            }
        }
        Commands::Edit { id, text } => {
            let text = TaskText::parse(&text)?;
            let entry = ledger.update_by_id(id, text.as_str()).await?;
            println!("Task {} for {} updated", entry.id(), entry.task_date());
        }
        Commands::Delete { id, yes } => {
            if !yes {
                let entry = ledger.get_by_id(id).await?;
                println!(
                    "Task {} for {}:\n  {}",
                    entry.id(),
                    entry.task_date(),
                    entry.text()
                );
                println!("Re-run with --yes to delete it.");
                return Ok(());
            }
            let entry = ledger.delete_by_id(id).await?;
            println!("Deleted task {} for {}", entry.id(), entry.task_date());
        }
        Commands::Clear { yes } => {
            if !yes {
                println!("This deletes every task. Re-run with --yes to confirm.");
                return Ok(());
            }
            let removed = ledger.clear_all().await?;
            println!("Deleted {} tasks", removed);
        }
        Commands::Stats => {
            let stats = ledger.stats().await?;
            println!("Total tasks:  {}", stats.total_tasks);
            println!("Active days:  {}", stats.active_days);
            if let (Some(first), Some(last)) = (stats.first_date, stats.last_date) {
                println!("Date range:   {} to {}", first, last);
            }
            if let Some(progress) = ledger.progress(today).await? {
                println!("Start date:   {}", start_date);
                if !progress.is_started() {
                    println!("Progress:     starts on {}", start_date);
                    return Ok(());
                }
                println!(
                    "Progress:     {} of {} days ({:.1}%), {} remaining",
                    progress.completed,
                    ledger.total_days(),
                    progress.percent,
                    progress.remaining
                );
            }
        }
        Commands::StartDate { date } => match date {
            Some(date) => {
                ledger.set_start_date(date).await?;
                println!("Start date set to {}", date);
            }
            None => println!("Start date: {}", start_date),
        },
        Commands::Report {
            min_day,
            max_day,
            search,
        } => {
            let Some(report) = ledger.build_report(start_date).await? else {
                println!("No tasks recorded yet");
                return Ok(());
            };
            let filter = ReportFilter {
                min_day,
                max_day,
                search,
            };
            let report = report.filter(&filter);
            println!("Day 1 is {}", report.start_date());
            for row in report.rows() {
                let day = row.day_number.map(|day| day.to_string()).unwrap_or_default();
                println!("{:>4}  {}  {}", day, row.formatted_date, row.task);
            }
            println!("{} tasks", report.len());
        }
        Commands::Export { format, output } => {
            let format = ExportFormat::from(format);
            let Some(report) = ledger.build_report(start_date).await? else {
                println!("No tasks to export");
                return Ok(());
            };
            let path = output.unwrap_or_else(|| export::default_file_name(format, today).into());
            match export::write_report(&report, format, &path, Utc::now()).await {
                Ok(()) => println!("Exported {} tasks to {}", report.len(), path.display()),
                Err(ExportError::SpreadsheetUnavailable) => {
                    println!("Spreadsheet export is not available in this build; use csv or json")
                }
                Err(err) => return Err(err.into()),
            }
        }
        Commands::Login { username, password } => {
            match identity.authenticate(&username, &password).await? {
                Some(user) if user.role() == Role::Admin => {
                    println!("Logged in as {} (admin)", user.username())
                }
                Some(user) => println!("Logged in as {} (read-only view)", user.username()),
                None => println!("Invalid username or password"),
            }
        }
    }
    Ok(())
}
