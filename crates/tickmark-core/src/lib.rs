//! # Tickmark Core Library
//!
//! Tracks elapsed time against inline markers embedded directly in freeform
//! text documents. A marker toggles between running and paused, its visible
//! text is rewritten in place every tick, and completed intervals are
//! recorded into a durable, tag-keyed analytics ledger. The document itself
//! is the only persistent store for current timer state; the ledger is an
//! independent append-only log.
//!
//! ## Architecture
//!
//! - **Accrual engine**: a pure, wall-clock-delta state machine. Gaps
//!   larger than the sleep threshold are discarded (suspend is not work),
//!   single steps are capped.
//! - **Marker codec**: encodes a timer into an embeddable span and decodes
//!   it back, with an ordered chain of legacy decoders for old documents.
//! - **Registry**: in-memory map of active timers plus one interval task
//!   per id, funneled through a single tick channel.
//! - **Document sync**: rewrites markers in place, relocates them by id
//!   when the document was edited underneath, inserts new ones per policy.
//! - **Analytics ledger**: append-only JSON log with retention pruning,
//!   range aggregation and non-destructive total adjustment.
//!
//! ## Key Components
//!
//! - [`TimeTracker`]: action entry points over one engine instance
//! - [`MarkerCodec`]: marker wire format
//! - [`AnalyticsLedger`]: tag-keyed aggregation queries
//! - [`TrackerConfig`]: TOML-backed configuration

pub mod clock;
pub mod config;
pub mod document;
pub mod error;
pub mod ledger;
pub mod marker;
pub mod timer;
pub mod tracker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{data_dir, AutoStopPolicy, TrackerConfig};
pub use document::{
    DocumentBuffer, DocumentHandle, DocumentStore, DocumentSync, FileDocument, InsertPosition,
    Location, TextBuffer,
};
pub use error::{ConfigError, CoreError, DocumentError, LedgerError, Result, ValidationError};
pub use ledger::{
    AnalyticsLedger, EntryKind, FileLedgerStore, LedgerEntry, LedgerStore, MemoryLedgerStore,
    Period,
};
pub use marker::{DecodedMarker, MarkerCodec, MarkerId};
pub use timer::{AccrualConfig, TimerRegistry, TimerState, TimerStatus};
pub use tracker::{ActionOutcome, TimeTracker};
