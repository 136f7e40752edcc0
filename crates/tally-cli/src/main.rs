use anyhow::Result;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tally_core::provider::{default_model_dir, resolve_provider};
use tally_store::Store;

#[derive(Parser)]
#[command(name = "tally", about = "Tally attendance kiosk CLI")]
struct Cli {
    /// Path to the kiosk database (defaults to the daemon's).
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an incremental enrollment scan now
    Scan {
        /// Enrollment source tree (`<dir>/<id>_<name>/*.jpg`)
        #[arg(short, long)]
        source: PathBuf,
        /// Directory containing the face model files
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
    /// List the identity roster
    Roster,
    /// Show attendance records for a date (defaults to today)
    Log {
        /// Date as YYYY-MM-DD
        #[arg(short, long)]
        date: Option<NaiveDate>,
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
    /// Show records still waiting to sync
    Unsynced {
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
    /// Show store status
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let db_path = cli
        .db
        .or_else(|| std::env::var("TALLY_DB_PATH").map(PathBuf::from).ok())
        .unwrap_or_else(tally_store::default_db_path);
    let store = Store::open(&db_path)?;

    match cli.command {
        Commands::Scan { source, model_dir } => {
            let model_dir = model_dir.unwrap_or_else(default_model_dir);
            let mut provider = resolve_provider(&model_dir);
            let summary = store.scan_and_update(&source, provider.as_mut())?;
            println!(
                "scan complete: {} added, {} removed, {} skipped",
                summary.added, summary.removed, summary.skipped
            );
        }
        Commands::Roster => {
            let roster = store.roster()?;
            if roster.is_empty() {
                println!("roster is empty");
            }
            for entry in roster {
                println!("{:<12} {}", entry.identity_id, entry.display_name);
            }
        }
        Commands::Log { date, limit } => {
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            let records = store.records_for_date(date, limit)?;
            if records.is_empty() {
                println!("no records for {date}");
            }
            for rec in records {
                println!(
                    "{} {:>4} {:<20} {:<16} late={} early={} ot={}",
                    rec.punch_clock,
                    rec.punch_type.as_str(),
                    rec.display_name,
                    rec.status.as_str(),
                    rec.late_minutes,
                    rec.early_departure_minutes,
                    rec.overtime_minutes,
                );
            }
        }
        Commands::Unsynced { limit } => {
            let records = store.unsynced_records(limit)?;
            println!("{} record(s) pending", store.unsynced_count()?);
            for rec in records {
                println!(
                    "#{} {} {} {} {}",
                    rec.id,
                    rec.punch_time,
                    rec.display_name,
                    rec.punch_type.as_str(),
                    rec.status.as_str(),
                );
            }
        }
        Commands::Status => {
            let gallery = store.load_gallery()?;
            let identities: std::collections::HashSet<_> =
                gallery.iter().map(|e| e.identity_id.as_str()).collect();
            println!("db:          {}", db_path.display());
            println!("embeddings:  {}", gallery.len());
            println!("identities:  {}", identities.len());
            println!("roster rows: {}", store.roster()?.len());
            println!("unsynced:    {}", store.unsynced_count()?);
        }
    }

    Ok(())
}
