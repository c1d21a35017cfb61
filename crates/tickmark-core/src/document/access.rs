//! Document access abstractions.
//!
//! Two modes are supported: a live line-addressable editable buffer
//! ([`DocumentBuffer`], precise sub-range replacement) and a persisted
//! whole-document mode ([`DocumentStore`], atomic read-modify-write so
//! concurrent unrelated writers to the same file are not silently
//! clobbered). The sync layer treats both uniformly via
//! [`DocumentHandle`](crate::document::DocumentHandle).

use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::error::DocumentError;

/// A cursor position inside a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

/// Live, line-addressable editable buffer.
pub trait DocumentBuffer {
    fn line_count(&self) -> usize;

    fn line(&self, index: usize) -> Option<&str>;

    /// Replace exactly `range` (byte offsets) on one line, preserving all
    /// other content.
    fn replace_in_line(
        &mut self,
        index: usize,
        range: Range<usize>,
        replacement: &str,
    ) -> Result<(), DocumentError>;

    /// Current cursor, when the host has one.
    fn cursor(&self) -> Option<Position> {
        None
    }
}

/// Persisted whole-document mode.
pub trait DocumentStore {
    fn path(&self) -> &Path;

    fn read_document(&self) -> Result<String, DocumentError>;

    /// Atomic read-modify-write cycle: `f` receives the freshly read
    /// content and returns the replacement, or `None` to leave the file
    /// untouched. Returns whether a write happened.
    fn modify(
        &self,
        f: &mut dyn FnMut(&str) -> Option<String>,
    ) -> Result<bool, DocumentError>;
}

/// String-backed [`DocumentBuffer`], used by tests, the watch loop and as
/// the scratch buffer inside persisted-mode rewrites.
#[derive(Debug, Clone, Default)]
pub struct TextBuffer {
    lines: Vec<String>,
    cursor: Option<Position>,
}

impl TextBuffer {
    pub fn new(text: &str) -> Self {
        Self {
            lines: text.split('\n').map(str::to_string).collect(),
            cursor: None,
        }
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn set_cursor(&mut self, cursor: Option<Position>) {
        self.cursor = cursor;
    }
}

impl DocumentBuffer for TextBuffer {
    fn line_count(&self) -> usize {
        self.lines.len()
    }

    fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    fn replace_in_line(
        &mut self,
        index: usize,
        range: Range<usize>,
        replacement: &str,
    ) -> Result<(), DocumentError> {
        let len = self.lines.len();
        let line = self
            .lines
            .get_mut(index)
            .ok_or(DocumentError::LineOutOfRange { line: index, len })?;
        if range.start > range.end
            || range.end > line.len()
            || !line.is_char_boundary(range.start)
            || !line.is_char_boundary(range.end)
        {
            return Err(DocumentError::SpanOutOfRange {
                line: index,
                start: range.start,
                end: range.end,
            });
        }
        line.replace_range(range, replacement);
        Ok(())
    }

    fn cursor(&self) -> Option<Position> {
        self.cursor
    }
}

/// File-backed [`DocumentStore`]. Writes go through a sibling temp file
/// and an atomic rename.
#[derive(Debug, Clone)]
pub struct FileDocument {
    path: PathBuf,
}

impl FileDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl DocumentStore for FileDocument {
    fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<String, DocumentError> {
        std::fs::read_to_string(&self.path).map_err(|source| DocumentError::ReadFailed {
            path: self.path.clone(),
            source,
        })
    }

    fn modify(
        &self,
        f: &mut dyn FnMut(&str) -> Option<String>,
    ) -> Result<bool, DocumentError> {
        let current = self.read_document()?;
        let Some(updated) = f(&current) else {
            return Ok(false);
        };
        let temp = self.temp_path();
        std::fs::write(&temp, &updated).map_err(|source| DocumentError::WriteFailed {
            path: temp.clone(),
            source,
        })?;
        std::fs::rename(&temp, &self.path).map_err(|source| DocumentError::WriteFailed {
            path: self.path.clone(),
            source,
        })?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_buffer_roundtrips_lines() {
        let buf = TextBuffer::new("alpha\nbeta\n\ngamma");
        assert_eq!(buf.line_count(), 4);
        assert_eq!(buf.line(1), Some("beta"));
        assert_eq!(buf.line(2), Some(""));
        assert_eq!(buf.line(4), None);
        assert_eq!(buf.text(), "alpha\nbeta\n\ngamma");
    }

    #[test]
    fn replace_in_line_is_exact() {
        let mut buf = TextBuffer::new("one two three");
        buf.replace_in_line(0, 4..7, "2").unwrap();
        assert_eq!(buf.text(), "one 2 three");
    }

    #[test]
    fn replace_rejects_bad_addresses() {
        let mut buf = TextBuffer::new("héllo");
        assert!(matches!(
            buf.replace_in_line(3, 0..0, "x"),
            Err(DocumentError::LineOutOfRange { .. })
        ));
        assert!(matches!(
            buf.replace_in_line(0, 0..99, "x"),
            Err(DocumentError::SpanOutOfRange { .. })
        ));
        // Inside the two-byte 'é'.
        assert!(matches!(
            buf.replace_in_line(0, 2..3, "x"),
            Err(DocumentError::SpanOutOfRange { .. })
        ));
    }

    #[test]
    fn file_document_modify_is_read_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.md");
        std::fs::write(&path, "a\nb").unwrap();
        let doc = FileDocument::new(&path);

        let wrote = doc
            .modify(&mut |text| {
                // Simulate a concurrent unrelated writer between our read
                // and this modify cycle: the closure sees fresh content.
                Some(format!("{text}\nc"))
            })
            .unwrap();
        assert!(wrote);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\nb\nc");

        let wrote = doc.modify(&mut |_| None).unwrap();
        assert!(!wrote);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\nb\nc");
    }

    #[test]
    fn file_document_read_missing_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let doc = FileDocument::new(dir.path().join("absent.md"));
        assert!(matches!(
            doc.read_document(),
            Err(DocumentError::ReadFailed { .. })
        ));
    }
}
