use std::sync::Arc;

use chrono::NaiveDate;
use clap::Subcommand;
use tickmark_core::{
    data_dir, AnalyticsLedger, FileLedgerStore, Period, SystemClock, TrackerConfig,
};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Total seconds recorded for a tag over an inclusive date range
    Sum {
        #[arg(long)]
        tag: String,
        /// First day, YYYY-MM-DD
        #[arg(long)]
        from: NaiveDate,
        /// Last day, YYYY-MM-DD
        #[arg(long)]
        to: NaiveDate,
    },
    /// All entries inside the retention window
    List,
    /// Set a day's displayed total for a tag via a compensating
    /// adjustment entry
    Adjust {
        #[arg(long)]
        tag: String,
        /// New total in seconds (non-negative)
        #[arg(long)]
        total: i64,
        /// Day to adjust, YYYY-MM-DD
        #[arg(long)]
        day: NaiveDate,
    },
    /// Physically remove entries past the retention window
    Prune,
}

fn open_ledger() -> Result<AnalyticsLedger, Box<dyn std::error::Error>> {
    let config = TrackerConfig::load_or_default();
    let path = data_dir()?.join(&config.ledger_file);
    Ok(AnalyticsLedger::new(
        Box::new(FileLedgerStore::new(path)),
        config.retention_days,
        Arc::new(SystemClock),
    ))
}

pub fn run(action: StatsAction) -> Result<(), Box<dyn std::error::Error>> {
    let ledger = open_ledger()?;
    match action {
        StatsAction::Sum { tag, from, to } => {
            let start = Period::day(from).start;
            let end = Period::day(to).end;
            let seconds = ledger.sum_in_range(&tag, start, end)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "tag": tag,
                    "from": from,
                    "to": to,
                    "seconds": seconds,
                }))?
            );
        }
        StatsAction::List => {
            let entries = ledger.read_all()?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        StatsAction::Adjust { tag, total, day } => {
            let period = Period::day(day);
            let appended = ledger.set_total_for_period(&tag, total, &period, period.anchor())?;
            println!("{}", serde_json::to_string_pretty(&appended)?);
        }
        StatsAction::Prune => {
            let removed = ledger.prune()?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({ "removed": removed }))?
            );
        }
    }
    Ok(())
}
