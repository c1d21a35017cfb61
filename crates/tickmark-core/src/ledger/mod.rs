//! Append-only analytics ledger.
//!
//! Completed intervals are recorded as immutable, tag-keyed duration
//! entries. Corrections are made by appending signed `adjust` entries,
//! never by mutating history. Reads apply the retention window fresh each
//! time; `prune` physically removes what fell out of it.

pub mod store;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{LedgerError, ValidationError};

pub use store::{FileLedgerStore, LedgerStore, MemoryLedgerStore};

/// `file` value for entries not produced from a document.
pub const MANUAL_EDIT_FILE: &str = "manual-edit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Adjust,
}

/// One immutable ledger record.
///
/// `duration` is non-negative for normal entries; adjustment entries carry
/// a signed delta so a period total can be corrected without rewriting
/// history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub timestamp: DateTime<Utc>,
    pub duration: i64,
    pub file: String,
    pub tags: Vec<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<EntryKind>,
}

impl LedgerEntry {
    pub fn normal(
        timestamp: DateTime<Utc>,
        duration_secs: u64,
        file: impl Into<String>,
        tags: Vec<String>,
    ) -> Self {
        Self {
            timestamp,
            duration: duration_secs as i64,
            file: file.into(),
            tags,
            kind: None,
        }
    }

    pub fn adjustment(timestamp: DateTime<Utc>, delta_secs: i64, tag: impl Into<String>) -> Self {
        Self {
            timestamp,
            duration: delta_secs,
            file: MANUAL_EDIT_FILE.to_string(),
            tags: vec![tag.into()],
            kind: Some(EntryKind::Adjust),
        }
    }

    pub fn is_adjustment(&self) -> bool {
        self.kind == Some(EntryKind::Adjust)
    }
}

/// A day- or week-long aggregation and anchoring window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Period {
    /// The whole UTC day containing `date`.
    pub fn day(date: NaiveDate) -> Self {
        let start = date.and_time(NaiveTime::MIN).and_utc();
        Self {
            start,
            end: start + Duration::days(1) - Duration::seconds(1),
        }
    }

    /// The Monday-to-Sunday UTC week containing `date`.
    pub fn week(date: NaiveDate) -> Self {
        let offset = date.weekday().num_days_from_monday();
        let monday = date - Duration::days(i64::from(offset));
        let start = monday.and_time(NaiveTime::MIN).and_utc();
        Self {
            start,
            end: start + Duration::days(7) - Duration::seconds(1),
        }
    }

    /// Midday of the period's first day; adjustment entries are anchored
    /// here so they land unambiguously inside the period.
    pub fn anchor(&self) -> DateTime<Utc> {
        self.start + Duration::hours(12)
    }
}

/// Tag-keyed analytics over an append-only store.
pub struct AnalyticsLedger {
    store: Box<dyn LedgerStore>,
    retention_days: i64,
    clock: Arc<dyn Clock>,
}

impl AnalyticsLedger {
    pub fn new(store: Box<dyn LedgerStore>, retention_days: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            retention_days,
            clock,
        }
    }

    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.clock.epoch_secs(), 0).unwrap_or_default()
    }

    fn cutoff(&self) -> DateTime<Utc> {
        self.now() - Duration::days(self.retention_days)
    }

    /// Append one entry to the end of the durable log.
    pub fn append(&self, entry: LedgerEntry) -> Result<(), LedgerError> {
        let mut entries = self.store.load()?;
        entries.push(entry);
        self.store.save(&entries)
    }

    /// All entries inside the retention window, computed fresh on each
    /// read. Does not require prior pruning.
    pub fn read_all(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let cutoff = self.cutoff();
        let mut entries = self.store.load()?;
        entries.retain(|entry| entry.timestamp >= cutoff);
        Ok(entries)
    }

    /// Physically remove entries older than the retention cutoff. Writes
    /// back only if something changed; returns the removed count.
    pub fn prune(&self) -> Result<usize, LedgerError> {
        let cutoff = self.cutoff();
        let entries = self.store.load()?;
        let before = entries.len();
        let kept: Vec<LedgerEntry> = entries
            .into_iter()
            .filter(|entry| entry.timestamp >= cutoff)
            .collect();
        let removed = before - kept.len();
        if removed > 0 {
            self.store.save(&kept)?;
        }
        Ok(removed)
    }

    /// Sum of durations for entries whose tag set contains `tag` and whose
    /// timestamp falls within `[start, end]` inclusive, floored at 0.
    pub fn sum_in_range(
        &self,
        tag: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64, LedgerError> {
        let total: i64 = self
            .read_all()?
            .iter()
            .filter(|entry| {
                entry.timestamp >= start
                    && entry.timestamp <= end
                    && entry.tags.iter().any(|t| t == tag)
            })
            .map(|entry| entry.duration)
            .sum();
        Ok(total.max(0) as u64)
    }

    /// Set the displayed total for `tag` over `period` to `new_total` by
    /// appending one compensating adjustment entry at `anchor`.
    ///
    /// A negative `new_total` is rejected before any mutation; a delta of
    /// zero appends nothing. Returns the appended entry, if any.
    pub fn set_total_for_period(
        &self,
        tag: &str,
        new_total: i64,
        period: &Period,
        anchor: DateTime<Utc>,
    ) -> Result<Option<LedgerEntry>, crate::error::CoreError> {
        if new_total < 0 {
            return Err(ValidationError::NegativeTotal { value: new_total }.into());
        }
        if period.end < period.start {
            return Err(ValidationError::InvalidTimeRange {
                start: period.start,
                end: period.end,
            }
            .into());
        }
        let current = self.sum_in_range(tag, period.start, period.end)? as i64;
        let delta = new_total - current;
        if delta == 0 {
            return Ok(None);
        }
        let entry = LedgerEntry::adjustment(anchor, delta, tag);
        self.append(entry.clone())?;
        Ok(Some(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    const NOW_SECS: i64 = 1_767_225_600; // 2026-01-01T00:00:00Z

    fn ledger() -> AnalyticsLedger {
        AnalyticsLedger::new(
            Box::new(MemoryLedgerStore::new()),
            30,
            Arc::new(ManualClock::new(NOW_SECS)),
        )
    }

    fn ts(days_ago: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(NOW_SECS, 0).unwrap() - Duration::days(days_ago)
    }

    #[test]
    fn read_all_applies_retention_without_pruning() {
        let ledger = ledger();
        ledger
            .append(LedgerEntry::normal(ts(1), 60, "a.md", vec!["x".into()]))
            .unwrap();
        ledger
            .append(LedgerEntry::normal(ts(40), 60, "a.md", vec!["x".into()]))
            .unwrap();

        let visible = ledger.read_all().unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].timestamp, ts(1));
        // The old entry is still physically present.
        assert_eq!(ledger.store.load().unwrap().len(), 2);
    }

    #[test]
    fn prune_removes_exactly_the_expired_entries() {
        let ledger = ledger();
        let fresh = LedgerEntry::normal(ts(5), 60, "a.md", vec!["x".into()]);
        ledger
            .append(LedgerEntry::normal(ts(31), 10, "a.md", vec!["x".into()]))
            .unwrap();
        ledger.append(fresh.clone()).unwrap();
        ledger
            .append(LedgerEntry::normal(ts(99), 20, "b.md", vec!["y".into()]))
            .unwrap();

        assert_eq!(ledger.prune().unwrap(), 2);
        // Survivors are unchanged.
        assert_eq!(ledger.store.load().unwrap(), vec![fresh]);
        // Nothing left to prune; no rewrite.
        assert_eq!(ledger.prune().unwrap(), 0);
    }

    #[test]
    fn sum_is_tag_and_range_scoped() {
        let ledger = ledger();
        ledger
            .append(LedgerEntry::normal(ts(2), 100, "a.md", vec!["work".into()]))
            .unwrap();
        ledger
            .append(LedgerEntry::normal(
                ts(2),
                50,
                "a.md",
                vec!["work".into(), "deep".into()],
            ))
            .unwrap();
        ledger
            .append(LedgerEntry::normal(ts(2), 999, "a.md", vec!["other".into()]))
            .unwrap();
        ledger
            .append(LedgerEntry::normal(ts(20), 7, "a.md", vec!["work".into()]))
            .unwrap();

        assert_eq!(ledger.sum_in_range("work", ts(3), ts(1)).unwrap(), 150);
        assert_eq!(ledger.sum_in_range("deep", ts(3), ts(1)).unwrap(), 50);
        assert_eq!(ledger.sum_in_range("work", ts(30), ts(1)).unwrap(), 157);
        assert_eq!(ledger.sum_in_range("absent", ts(30), ts(1)).unwrap(), 0);
    }

    #[test]
    fn sum_range_is_inclusive_and_floored() {
        let ledger = ledger();
        let exact = ts(3);
        ledger
            .append(LedgerEntry::normal(exact, 30, "a.md", vec!["x".into()]))
            .unwrap();
        assert_eq!(ledger.sum_in_range("x", exact, exact).unwrap(), 30);

        // A lone negative adjustment floors at zero.
        ledger
            .append(LedgerEntry::adjustment(ts(2), -500, "neg"))
            .unwrap();
        assert_eq!(ledger.sum_in_range("neg", ts(3), ts(1)).unwrap(), 0);
    }

    #[test]
    fn adjustment_is_idempotent_when_total_matches() {
        let ledger = ledger();
        let period = Period::day(ts(2).date_naive());
        ledger
            .append(LedgerEntry::normal(period.anchor(), 120, "a.md", vec!["work".into()]))
            .unwrap();

        let appended = ledger
            .set_total_for_period("work", 120, &period, period.anchor())
            .unwrap();
        assert!(appended.is_none());
        assert_eq!(ledger.store.load().unwrap().len(), 1);
    }

    #[test]
    fn adjustment_moves_total_to_requested_value() {
        let ledger = ledger();
        let period = Period::day(ts(2).date_naive());
        ledger
            .append(LedgerEntry::normal(period.anchor(), 120, "a.md", vec!["work".into()]))
            .unwrap();

        let entry = ledger
            .set_total_for_period("work", 45, &period, period.anchor())
            .unwrap()
            .unwrap();
        assert_eq!(entry.duration, -75);
        assert!(entry.is_adjustment());
        assert_eq!(entry.file, MANUAL_EDIT_FILE);
        assert_eq!(
            ledger.sum_in_range("work", period.start, period.end).unwrap(),
            45
        );

        // Zeroing out works the same way.
        ledger
            .set_total_for_period("work", 0, &period, period.anchor())
            .unwrap()
            .unwrap();
        assert_eq!(
            ledger.sum_in_range("work", period.start, period.end).unwrap(),
            0
        );
    }

    #[test]
    fn negative_total_is_rejected_before_mutation() {
        let ledger = ledger();
        let period = Period::day(ts(2).date_naive());
        let result = ledger.set_total_for_period("work", -1, &period, period.anchor());
        assert!(result.is_err());
        assert!(ledger.store.load().unwrap().is_empty());
    }

    #[test]
    fn period_windows_cover_day_and_week() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 7).unwrap(); // a Wednesday
        let day = Period::day(date);
        assert_eq!(day.start, Utc.with_ymd_and_hms(2026, 1, 7, 0, 0, 0).unwrap());
        assert_eq!(day.end, Utc.with_ymd_and_hms(2026, 1, 7, 23, 59, 59).unwrap());
        assert_eq!(day.anchor(), Utc.with_ymd_and_hms(2026, 1, 7, 12, 0, 0).unwrap());

        let week = Period::week(date);
        assert_eq!(week.start, Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap());
        assert_eq!(week.end, Utc.with_ymd_and_hms(2026, 1, 11, 23, 59, 59).unwrap());
    }

    #[test]
    fn wire_format_fields() {
        let entry = LedgerEntry::adjustment(
            Utc.with_ymd_and_hms(2026, 1, 2, 12, 0, 0).unwrap(),
            -30,
            "work",
        );
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "adjust");
        assert_eq!(json["duration"], -30);
        assert_eq!(json["file"], "manual-edit");
        assert!(json["timestamp"].as_str().unwrap().starts_with("2026-01-02T12:00:00"));

        let normal = LedgerEntry::normal(entry.timestamp, 60, "a.md", vec![]);
        let json = serde_json::to_value(&normal).unwrap();
        assert!(json.get("type").is_none());
    }
}
