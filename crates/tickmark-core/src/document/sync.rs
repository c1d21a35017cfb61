//! Marker placement inside documents.
//!
//! `DocumentSync` rewrites a marker in place using its last-known location,
//! relocates by id via full-document scan when that location has gone stale
//! (the document is being edited by a human at the same time), and chooses
//! an insertion point for brand-new markers. Locations are a cache, never a
//! source of truth.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::document::access::{DocumentBuffer, DocumentStore, Position, TextBuffer};
use crate::error::DocumentError;
use crate::marker::{MarkerCodec, MarkerId};
use crate::timer::TimerState;

/// Where a brand-new marker lands on its line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InsertPosition {
    /// After list/heading/blockquote prefixes.
    LineStart,
    #[default]
    LineEnd,
    /// At the host cursor, falling back to line end without one.
    Cursor,
}

/// Last known position of a marker. May go stale after unrelated edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub line_index: usize,
    pub span: Range<usize>,
}

/// Either document-access mode, passed per action.
pub enum DocumentHandle<'a> {
    Buffer(&'a mut dyn DocumentBuffer),
    Store(&'a dyn DocumentStore),
}

/// Ordered leading-pattern rules; the first match decides where a line's
/// prefix ends. Task-list items must come before plain list items.
static LEADING_RULES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^\s*(?:[-*+]|[0-9]+[.)])\s+\[.\]\s+",
        r"^\s*(?:[-*+]|[0-9]+[.)])\s+",
        r"^#+\s+",
        r"^>\s*",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("leading pattern"))
    .collect()
});

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#(\w+)").expect("tag pattern"));

/// Hashtag-like classification keys found on a line, in order, deduplicated.
pub fn extract_tags(line: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for caps in TAG.captures_iter(line) {
        let tag = caps[1].to_string();
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

pub struct DocumentSync {
    codec: MarkerCodec,
    insert_position: InsertPosition,
    locations: HashMap<MarkerId, Location>,
}

impl DocumentSync {
    pub fn new(insert_position: InsertPosition) -> Self {
        Self {
            codec: MarkerCodec::new(),
            insert_position,
            locations: HashMap::new(),
        }
    }

    pub fn codec(&self) -> &MarkerCodec {
        &self.codec
    }

    pub fn cached_location(&self, id: &MarkerId) -> Option<&Location> {
        self.locations.get(id)
    }

    pub fn forget(&mut self, id: &MarkerId) {
        self.locations.remove(id);
    }

    /// Persist `state` into the document.
    ///
    /// Replaces the existing marker in place when it can be found (cached
    /// location first, exhaustive scan second). Otherwise, with
    /// `insert_at`, inserts a brand-new marker on that line per the
    /// configured [`InsertPosition`]; without it the marker is reported
    /// unresolvable. Updates the location cache on success.
    pub fn write_timer(
        &mut self,
        doc: &mut DocumentHandle<'_>,
        state: &TimerState,
        insert_at: Option<usize>,
    ) -> Result<Location, DocumentError> {
        match doc {
            DocumentHandle::Buffer(buf) => self.write_buffer(&mut **buf, state, insert_at),
            DocumentHandle::Store(store) => self.write_persisted(&**store, state, insert_at),
        }
    }

    /// Resolve a marker's current location, scanning every line when the
    /// cache is stale. `None` after a full scan means the caller must
    /// decide to stop the timer.
    pub fn locate(
        &mut self,
        doc: &mut DocumentHandle<'_>,
        id: &MarkerId,
    ) -> Result<Option<Location>, DocumentError> {
        Ok(self.read_state(doc, id)?.map(|(_, loc)| loc))
    }

    /// Decode a marker's current state along with its location.
    pub fn read_state(
        &mut self,
        doc: &mut DocumentHandle<'_>,
        id: &MarkerId,
    ) -> Result<Option<(TimerState, Location)>, DocumentError> {
        match doc {
            DocumentHandle::Buffer(buf) => Ok(self.find_buffer(&**buf, id)),
            DocumentHandle::Store(store) => {
                let text = store.read_document()?;
                let buf = TextBuffer::new(&text);
                Ok(self.find_buffer(&buf, id))
            }
        }
    }

    /// Decode every marker in the document, in document order. Used on
    /// reopen to restore or force-pause whatever was left ticking.
    pub fn scan_markers(
        &self,
        doc: &mut DocumentHandle<'_>,
    ) -> Result<Vec<(TimerState, Location)>, DocumentError> {
        match doc {
            DocumentHandle::Buffer(buf) => Ok(scan_all(&**buf, &self.codec)),
            DocumentHandle::Store(store) => {
                let text = store.read_document()?;
                let buf = TextBuffer::new(&text);
                Ok(scan_all(&buf, &self.codec))
            }
        }
    }

    /// Delete the marker substring (and one adjacent padding space) from
    /// its line. Returns whether anything was removed.
    pub fn remove_timer(
        &mut self,
        doc: &mut DocumentHandle<'_>,
        id: &MarkerId,
    ) -> Result<bool, DocumentError> {
        match doc {
            DocumentHandle::Buffer(buf) => self.remove_buffer(&mut **buf, id),
            DocumentHandle::Store(store) => {
                let store = &**store;
                let mut outcome: Result<bool, DocumentError> = Ok(false);
                store.modify(&mut |text| {
                    let mut buf = TextBuffer::new(text);
                    match self.remove_buffer(&mut buf, id) {
                        Ok(true) => {
                            outcome = Ok(true);
                            Some(buf.text())
                        }
                        Ok(false) => {
                            outcome = Ok(false);
                            None
                        }
                        Err(err) => {
                            outcome = Err(err);
                            None
                        }
                    }
                })?;
                outcome
            }
        }
    }

    /// Tags on one line, captured at the moment of flush.
    pub fn line_tags(
        &self,
        doc: &mut DocumentHandle<'_>,
        line_index: usize,
    ) -> Result<Vec<String>, DocumentError> {
        let line = match doc {
            DocumentHandle::Buffer(buf) => buf.line(line_index).unwrap_or("").to_string(),
            DocumentHandle::Store(store) => {
                let text = store.read_document()?;
                text.split('\n').nth(line_index).unwrap_or("").to_string()
            }
        };
        Ok(extract_tags(&line))
    }

    // ── Buffer-mode internals ────────────────────────────────────────

    fn write_buffer(
        &mut self,
        buf: &mut dyn DocumentBuffer,
        state: &TimerState,
        insert_at: Option<usize>,
    ) -> Result<Location, DocumentError> {
        let rendered = self.codec.render(state);

        if let Some(existing) = self.locate_buffer(&*buf, &state.id) {
            buf.replace_in_line(existing.line_index, existing.span.clone(), &rendered)?;
            let loc = Location {
                line_index: existing.line_index,
                span: existing.span.start..existing.span.start + rendered.len(),
            };
            self.locations.insert(state.id.clone(), loc.clone());
            return Ok(loc);
        }

        let Some(line_index) = insert_at else {
            return Err(DocumentError::MarkerNotFound {
                id: state.id.to_string(),
            });
        };
        self.insert_buffer(buf, state, &rendered, line_index)
    }

    fn insert_buffer(
        &mut self,
        buf: &mut dyn DocumentBuffer,
        state: &TimerState,
        rendered: &str,
        line_index: usize,
    ) -> Result<Location, DocumentError> {
        let (line_index, offset) = self.insertion_point(buf, line_index)?;
        let line = buf
            .line(line_index)
            .ok_or(DocumentError::LineOutOfRange {
                line: line_index,
                len: buf.line_count(),
            })?
            .to_string();

        let pad_before = offset > 0 && !line[..offset].ends_with(char::is_whitespace);
        let pad_after = offset < line.len() && !line[offset..].starts_with(char::is_whitespace);
        let text = format!(
            "{}{rendered}{}",
            if pad_before { " " } else { "" },
            if pad_after { " " } else { "" },
        );
        buf.replace_in_line(line_index, offset..offset, &text)?;

        let start = offset + usize::from(pad_before);
        let loc = Location {
            line_index,
            span: start..start + rendered.len(),
        };
        self.locations.insert(state.id.clone(), loc.clone());
        Ok(loc)
    }

    fn insertion_point(
        &self,
        buf: &dyn DocumentBuffer,
        line_index: usize,
    ) -> Result<(usize, usize), DocumentError> {
        let line_at = |index: usize| {
            buf.line(index).ok_or(DocumentError::LineOutOfRange {
                line: index,
                len: buf.line_count(),
            })
        };
        match self.insert_position {
            InsertPosition::LineStart => {
                let line = line_at(line_index)?;
                Ok((line_index, line_content_start(line)))
            }
            InsertPosition::LineEnd => {
                let line = line_at(line_index)?;
                Ok((line_index, line.len()))
            }
            InsertPosition::Cursor => match buf.cursor() {
                Some(Position { line, column }) if line < buf.line_count() => {
                    let text = line_at(line)?;
                    Ok((line, clamp_to_boundary(text, column)))
                }
                _ => {
                    let line = line_at(line_index)?;
                    Ok((line_index, line.len()))
                }
            },
        }
    }

    fn locate_buffer(&mut self, buf: &dyn DocumentBuffer, id: &MarkerId) -> Option<Location> {
        self.find_buffer(buf, id).map(|(_, loc)| loc)
    }

    fn find_buffer(
        &mut self,
        buf: &dyn DocumentBuffer,
        id: &MarkerId,
    ) -> Option<(TimerState, Location)> {
        let cached_line = self.locations.get(id).map(|loc| loc.line_index);
        if let Some(index) = cached_line {
            if let Some(found) = buf.line(index).and_then(|l| self.codec.parse(l, Some(id))) {
                let loc = Location {
                    line_index: index,
                    span: found.span,
                };
                self.locations.insert(id.clone(), loc.clone());
                return Some((found.state, loc));
            }
        }
        match scan_buffer(buf, &self.codec, id) {
            Some((state, loc)) => {
                self.locations.insert(id.clone(), loc.clone());
                Some((state, loc))
            }
            None => {
                self.locations.remove(id);
                None
            }
        }
    }

    fn remove_buffer(
        &mut self,
        buf: &mut dyn DocumentBuffer,
        id: &MarkerId,
    ) -> Result<bool, DocumentError> {
        let Some(loc) = self.locate_buffer(&*buf, id) else {
            return Ok(false);
        };
        let line = buf.line(loc.line_index).unwrap_or("").to_string();
        let mut start = loc.span.start;
        let mut end = loc.span.end;
        if start > 0 && line[..start].ends_with(' ') {
            start -= 1;
        } else if line[end..].starts_with(' ') {
            end += 1;
        }
        buf.replace_in_line(loc.line_index, start..end, "")?;
        self.locations.remove(id);
        Ok(true)
    }

    // ── Persisted-mode internals ─────────────────────────────────────

    fn write_persisted(
        &mut self,
        store: &dyn DocumentStore,
        state: &TimerState,
        insert_at: Option<usize>,
    ) -> Result<Location, DocumentError> {
        let mut outcome: Result<Location, DocumentError> = Err(DocumentError::MarkerNotFound {
            id: state.id.to_string(),
        });
        store.modify(&mut |text| {
            let mut buf = TextBuffer::new(text);
            match self.write_buffer(&mut buf, state, insert_at) {
                Ok(loc) => {
                    outcome = Ok(loc);
                    Some(buf.text())
                }
                Err(err) => {
                    outcome = Err(err);
                    None
                }
            }
        })?;
        outcome
    }
}

fn scan_buffer(
    buf: &dyn DocumentBuffer,
    codec: &MarkerCodec,
    id: &MarkerId,
) -> Option<(TimerState, Location)> {
    for index in 0..buf.line_count() {
        if let Some(found) = buf.line(index).and_then(|l| codec.parse(l, Some(id))) {
            return Some((
                found.state,
                Location {
                    line_index: index,
                    span: found.span,
                },
            ));
        }
    }
    None
}

fn scan_all(buf: &dyn DocumentBuffer, codec: &MarkerCodec) -> Vec<(TimerState, Location)> {
    let mut markers = Vec::new();
    for index in 0..buf.line_count() {
        let Some(line) = buf.line(index) else { continue };
        let mut offset = 0;
        while let Some(found) = codec.parse(&line[offset..], None) {
            let span = offset + found.span.start..offset + found.span.end;
            offset = span.end;
            markers.push((
                found.state,
                Location {
                    line_index: index,
                    span,
                },
            ));
        }
    }
    markers
}

fn line_content_start(line: &str) -> usize {
    LEADING_RULES
        .iter()
        .find_map(|rule| rule.find(line))
        .map(|m| m.end())
        .unwrap_or(0)
}

fn clamp_to_boundary(line: &str, column: usize) -> usize {
    let mut column = column.min(line.len());
    while column > 0 && !line.is_char_boundary(column) {
        column -= 1;
    }
    column
}
