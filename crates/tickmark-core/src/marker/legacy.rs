//! Legacy marker formats, decode-only.
//!
//! Kept for one-time migration of documents written by earlier releases.
//! A legacy numeric id maps into the current id space through
//! [`MarkerId::from_legacy`], so re-decoding the same document always
//! produces the same ids.

use std::sync::LazyLock;

use regex::Regex;

use crate::marker::codec::{DecodedMarker, MarkerDecoder};
use crate::marker::MarkerId;
use crate::timer::{TimerState, TimerStatus};

static LEGACY_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"<span data-timer="([0-9]+)" data-state="([A-Za-z]+)" data-acc="([0-9]+)" data-start="([0-9]+)">[^<]*</span>"#,
    )
    .expect("legacy marker pattern")
});

/// The attribute-based span format: numeric id, a status string where
/// exactly `Running` means running, accumulated seconds and a start
/// timestamp.
pub struct LegacyAttrDecoder;

impl MarkerDecoder for LegacyAttrDecoder {
    fn decode(&self, line: &str, target: Option<&MarkerId>) -> Option<DecodedMarker> {
        for caps in LEGACY_ATTR.captures_iter(line) {
            let Ok(numeric) = caps.get(1)?.as_str().parse::<u64>() else {
                continue;
            };
            let id = MarkerId::from_legacy(numeric);
            if let Some(wanted) = target {
                if *wanted != id {
                    continue;
                }
            }
            let Ok(accumulated_secs) = caps.get(3)?.as_str().parse::<u64>() else {
                continue;
            };
            let Ok(last_event_epoch_secs) = caps.get(4)?.as_str().parse::<i64>() else {
                continue;
            };
            let status = if caps.get(2)?.as_str() == "Running" {
                TimerStatus::Running
            } else {
                TimerStatus::Paused
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::id::base62_encode;
    use crate::marker::MarkerCodec;

    #[test]
    fn legacy_decode_maps_numeric_id() {
        let codec = MarkerCodec::new();
        let line =
            r#"see <span data-timer="12345" data-state="Running" data-acc="99" data-start="500">old</span>"#;
        let decoded = codec.parse(line, None).unwrap();
        assert_eq!(decoded.state.id.as_str(), base62_encode(12345));
        assert_eq!(decoded.state.status, TimerStatus::Running);
        assert_eq!(decoded.state.accumulated_secs, 99);
        assert_eq!(decoded.state.last_event_epoch_secs, 500);
        assert_eq!(&line[decoded.span.clone()], &line[4..]);
    }

    #[test]
    fn legacy_non_running_status_is_paused() {
        let codec = MarkerCodec::new();
        let line =
            r#"<span data-timer="7" data-state="Stopped" data-acc="10" data-start="20">x</span>"#;
        let decoded = codec.parse(line, None).unwrap();
        assert_eq!(decoded.state.status, TimerStatus::Paused);
    }

    #[test]
    fn legacy_decode_by_converted_target_id() {
        let codec = MarkerCodec::new();
        let line =
            r#"<span data-timer="12345" data-state="Running" data-acc="1" data-start="2">x</span>"#;
        let target = MarkerId::from_legacy(12345);
        assert!(codec.parse(line, Some(&target)).is_some());
        assert!(codec.parse(line, Some(&MarkerId::new("nope"))).is_none());
    }

    #[test]
    fn current_format_takes_priority() {
        let codec = MarkerCodec::new();
        let line = concat!(
            r#"<span data-timer="1" data-state="Running" data-acc="1" data-start="1">old</span> "#,
            r#"<span class="paused" id="new" data-dur="5" data-ts="9">[00:00:05] ⌛</span>"#,
        );
        let decoded = codec.parse(line, None).unwrap();
        assert_eq!(decoded.state.id.as_str(), "new");
    }
}
