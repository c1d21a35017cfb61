//! Marker wire codec.
//!
//! A marker is a tagged span embedded in one line of a document:
//!
//! ```text
//! <span class="running" id="SLKyxDZ" data-dur="123" data-ts="1700000000">[00:02:03] ⏳</span>
//! ```
//!
//! The attributes are authoritative; the inner bracketed duration and the
//! alternating glyph are decorative, regenerated on every render and ignored
//! on parse. Decoding tries the current format first, then an ordered chain
//! of legacy decoders.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::marker::legacy::LegacyAttrDecoder;
use crate::marker::MarkerId;
use crate::timer::{TimerState, TimerStatus};

/// A state decoded from a line, with the byte offsets of exactly the
/// matched substring so callers can replace it without touching
/// surrounding text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMarker {
    pub state: TimerState,
    pub span: Range<usize>,
}

/// One strategy in the decode chain. A span that matches the outer shape
/// but fails field extraction is absence (`None`), never an error.
pub trait MarkerDecoder: Send + Sync {
    fn decode(&self, line: &str, target: Option<&MarkerId>) -> Option<DecodedMarker>;
}

static CURRENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"<span class="(running|paused)" id="([0-9a-zA-Z]+)" data-dur="([0-9]+)" data-ts="([0-9]+)">[^<]*</span>"#,
    )
    .expect("current marker pattern")
});

/// Hourglass flips on every credited second, so a ticking marker is
/// visibly alive even when the duration text is momentarily unchanged.
const GLYPHS: [&str; 2] = ["⏳", "⌛"];

fn format_hms(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Encodes and decodes markers; holds the legacy decoder chain in fixed
/// priority order. New legacy formats are added by appending a strategy.
pub struct MarkerCodec {
    legacy: Vec<Box<dyn MarkerDecoder>>,
}

impl Default for MarkerCodec {
    fn default() -> Self {
        Self {
            legacy: vec![Box::new(LegacyAttrDecoder)],
        }
    }
}

impl MarkerCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a legacy decoder to the end of the chain.
    pub fn push_legacy(&mut self, decoder: Box<dyn MarkerDecoder>) {
        self.legacy.push(decoder);
    }

    /// Deterministic encoding of a state, re-parseable by [`parse`].
    ///
    /// [`parse`]: MarkerCodec::parse
    pub fn render(&self, state: &TimerState) -> String {
        let status = match state.status {
            TimerStatus::Running => "running",
            TimerStatus::Paused => "paused",
        };
        let glyph = GLYPHS[(state.accumulated_secs % 2) as usize];
        format!(
            r#"<span class="{status}" id="{id}" data-dur="{dur}" data-ts="{ts}">[{label}] {glyph}</span>"#,
            id = state.id,
            dur = state.accumulated_secs,
            ts = state.last_event_epoch_secs,
            label = format_hms(state.accumulated_secs),
        )
    }

    /// Scan a line for marker spans. With `target`, only the match whose id
    /// equals it is returned; otherwise the first match. Falls back to the
    /// legacy chain when the current format yields nothing.
    pub fn parse(&self, line: &str, target: Option<&MarkerId>) -> Option<DecodedMarker> {
        if let Some(found) = parse_current(line, target) {
            return Some(found);
        }
        self.legacy
            .iter()
            .find_map(|decoder| decoder.decode(line, target))
    }
}

fn parse_current(line: &str, target: Option<&MarkerId>) -> Option<DecodedMarker> {
    for caps in CURRENT.captures_iter(line) {
        let id = MarkerId::new(caps.get(2)?.as_str());
        if let Some(wanted) = target {
            if *wanted != id {
                continue;
            }
        }
        // Field extraction failure (e.g. an overflowing integer) skips the
        // span, same as any other malformed marker.
        let Ok(accumulated_secs) = caps.get(3)?.as_str().parse::<u64>() else {
            continue;
        };
        let Ok(last_event_epoch_secs) = caps.get(4)?.as_str().parse::<i64>() else {
            continue;
        };
        let status = match caps.get(1)?.as_str() {
            "running" => TimerStatus::Running,
            _ => TimerStatus::Paused,
        };
        let whole = caps.get(0)?;
        return Some(DecodedMarker {
            state: TimerState {
                id,
                status,
                accumulated_secs,
                last_event_epoch_secs,
            },
            span: whole.start()..whole.end(),
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn state(id: &str, status: TimerStatus, dur: u64, ts: i64) -> TimerState {
        TimerState {
            id: MarkerId::new(id),
            status,
            accumulated_secs: dur,
            last_event_epoch_secs: ts,
        }
    }

    #[test]
    fn render_is_deterministic() {
        let codec = MarkerCodec::new();
        let s = state("abc", TimerStatus::Running, 123, 1_700_000_000);
        assert_eq!(codec.render(&s), codec.render(&s));
        assert_eq!(
            codec.render(&s),
            r#"<span class="running" id="abc" data-dur="123" data-ts="1700000000">[00:02:03] ⌛</span>"#
        );
    }

    #[test]
    fn roundtrip_ignores_decoration() {
        let codec = MarkerCodec::new();
        for s in [
            state("1", TimerStatus::Running, 0, 0),
            state("SLKyxDZ", TimerStatus::Paused, 359_999, 1_700_000_000),
            state("z9", TimerStatus::Running, 42, 500),
        ] {
            let decoded = codec.parse(&codec.render(&s), None).unwrap();
            assert_eq!(decoded.state, s);
        }
    }

    #[test]
    fn parse_returns_exact_span() {
        let codec = MarkerCodec::new();
        let s = state("abc", TimerStatus::Paused, 7, 99);
        let rendered = codec.render(&s);
        let line = format!("- [ ] write report {rendered} #work");
        let decoded = codec.parse(&line, None).unwrap();
        assert_eq!(&line[decoded.span.clone()], rendered);
    }

    #[test]
    fn parse_selects_by_target_id() {
        let codec = MarkerCodec::new();
        let a = state("aaa", TimerStatus::Running, 1, 10);
        let b = state("bbb", TimerStatus::Paused, 2, 20);
        let line = format!("{} and {}", codec.render(&a), codec.render(&b));

        let found = codec
            .parse(&line, Some(&MarkerId::new("bbb")))
            .unwrap();
        assert_eq!(found.state, b);

        // No target: first match wins.
        assert_eq!(codec.parse(&line, None).unwrap().state, a);

        assert!(codec.parse(&line, Some(&MarkerId::new("ccc"))).is_none());
    }

    #[test]
    fn malformed_span_is_absence() {
        let codec = MarkerCodec::new();
        // Outer shape without the data attributes.
        let line = r#"<span class="running" id="abc">[00:00:00] ⏳</span>"#;
        assert!(codec.parse(line, None).is_none());
        assert!(codec.parse("no markers here", None).is_none());
    }

    #[test]
    fn overlong_duration_is_skipped() {
        let codec = MarkerCodec::new();
        let line = r#"<span class="running" id="abc" data-dur="99999999999999999999999" data-ts="1">[x] ⏳</span>"#;
        assert!(codec.parse(line, None).is_none());
    }

    #[test]
    fn glyph_alternates_by_parity() {
        let codec = MarkerCodec::new();
        let even = codec.render(&state("a", TimerStatus::Running, 2, 0));
        let odd = codec.render(&state("a", TimerStatus::Running, 3, 0));
        assert!(even.contains('⏳'));
        assert!(odd.contains('⌛'));
    }

    #[test]
    fn hms_label_formats_long_durations() {
        assert_eq!(format_hms(0), "00:00:00");
        assert_eq!(format_hms(123), "00:02:03");
        assert_eq!(format_hms(360_000), "100:00:00");
    }

    proptest! {
        #[test]
        fn roundtrip_any_state(
            id in "[1-9a-zA-Z][0-9a-zA-Z]{0,10}",
            running in any::<bool>(),
            dur in 0u64..1_000_000_000,
            ts in 0i64..4_102_444_800,
        ) {
            let codec = MarkerCodec::new();
            let s = state(
                &id,
                if running { TimerStatus::Running } else { TimerStatus::Paused },
                dur,
                ts,
            );
            let decoded = codec.parse(&codec.render(&s), None).unwrap();
            prop_assert_eq!(decoded.state, s);
        }
    }
}
