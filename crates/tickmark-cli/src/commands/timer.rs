use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Subcommand;
use tickmark_core::{
    data_dir, DocumentHandle, FileDocument, FileLedgerStore, MarkerId, SystemClock, TimeTracker,
    TrackerConfig,
};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start a new timer on a line of the document
    Start {
        #[arg(long)]
        file: PathBuf,
        /// Zero-based line to insert the marker on
        #[arg(long, default_value = "0")]
        line: usize,
    },
    /// Pause a running timer
    Pause {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        id: String,
    },
    /// Continue a paused timer
    Continue {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        id: String,
    },
    /// Re-register a marker from a reopened document without crediting
    /// the downtime
    Restore {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        id: String,
    },
    /// Stop a timer without crediting time
    ForcePause {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        id: String,
    },
    /// Flush and remove a timer
    Delete {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        id: String,
    },
    /// Print every marker in the document as JSON
    Status {
        #[arg(long)]
        file: PathBuf,
    },
    /// Restore running markers and drive the tick scheduler until Ctrl-C
    Watch {
        #[arg(long)]
        file: PathBuf,
    },
}

fn build_tracker() -> Result<TimeTracker, Box<dyn std::error::Error>> {
    let config = TrackerConfig::load_or_default();
    let ledger_path = data_dir()?.join(&config.ledger_file);
    Ok(TimeTracker::new(
        config,
        Arc::new(SystemClock),
        Box::new(FileLedgerStore::new(ledger_path)),
    ))
}

pub fn run(action: TimerAction) -> Result<(), Box<dyn std::error::Error>> {
    // The registry spawns its interval tasks on the ambient runtime, so
    // even one-shot actions run inside one.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_action(action))
}

async fn run_action(action: TimerAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut tracker = build_tracker()?;
    match action {
        TimerAction::Start { file, line } => {
            let doc = FileDocument::new(&file);
            let outcome =
                tracker.start(&mut DocumentHandle::Store(&doc), &lossy(&file), line)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        TimerAction::Pause { file, id } => {
            let doc = FileDocument::new(&file);
            let outcome =
                tracker.pause(&mut DocumentHandle::Store(&doc), &lossy(&file), &MarkerId::new(id))?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        TimerAction::Continue { file, id } => {
            let doc = FileDocument::new(&file);
            let outcome = tracker.continue_timer(
                &mut DocumentHandle::Store(&doc),
                &lossy(&file),
                &MarkerId::new(id),
            )?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        TimerAction::Restore { file, id } => {
            let doc = FileDocument::new(&file);
            let outcome = tracker.restore(
                &mut DocumentHandle::Store(&doc),
                &lossy(&file),
                &MarkerId::new(id),
            )?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        TimerAction::ForcePause { file, id } => {
            let doc = FileDocument::new(&file);
            let outcome = tracker.force_pause(
                &mut DocumentHandle::Store(&doc),
                &lossy(&file),
                &MarkerId::new(id),
            )?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        TimerAction::Delete { file, id } => {
            let doc = FileDocument::new(&file);
            let outcome = tracker.delete(
                &mut DocumentHandle::Store(&doc),
                &lossy(&file),
                &MarkerId::new(id),
            )?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        TimerAction::Status { file } => {
            let doc = FileDocument::new(&file);
            let markers = tracker.scan_markers(&mut DocumentHandle::Store(&doc))?;
            let report: Vec<serde_json::Value> = markers
                .iter()
                .map(|(state, loc)| {
                    serde_json::json!({
                        "line": loc.line_index,
                        "state": state,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        TimerAction::Watch { file } => watch(tracker, &file).await?,
    }
    Ok(())
}

async fn watch(mut tracker: TimeTracker, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let doc = FileDocument::new(file);
    let path = lossy(file);

    let markers = tracker.scan_markers(&mut DocumentHandle::Store(&doc))?;
    for (state, _) in markers {
        if state.is_running() {
            tracker.restore(&mut DocumentHandle::Store(&doc), &path, &state.id)?;
        }
    }

    let mut ticks = tracker
        .take_tick_receiver()
        .ok_or("tick receiver already taken")?;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(id) = ticks.recv() => {
                tracker.on_tick(&mut DocumentHandle::Store(&doc), &path, &id);
            }
        }
    }

    let flushed = tracker.shutdown();
    println!("{}", serde_json::to_string_pretty(&flushed)?);
    Ok(())
}

fn lossy(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
