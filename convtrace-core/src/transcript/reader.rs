//! Incremental line reader for growing transcript files
//!
//! Transcripts are append-only, so progress is tracked as a line offset: the
//! reader yields only lines at or beyond the caller's offset and reports the
//! file's new total. Correctness is line-granular; the file as a whole is
//! never assumed to be valid JSON-Lines.

use crate::error::Result;
use std::path::Path;

/// New lines read from a transcript, starting at a given offset.
#[derive(Debug)]
pub struct TranscriptSlice {
    /// Lines from `start` to end of file, in order
    pub lines: Vec<String>,
    /// Offset of `lines[0]` within the file
    pub start: usize,
    /// Total line count of the file
    pub total_lines: usize,
}

impl TranscriptSlice {
    /// True when the file has not grown past the caller's offset.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Whether the given absolute offset is the last line of this batch.
    pub fn is_last_line(&self, offset: usize) -> bool {
        offset + 1 == self.total_lines
    }
}

/// Read all lines from `start` to end of file.
///
/// A trailing line not terminated by a newline is still yielded; whether it is
/// a partial write is decided by the classifier. A final empty segment (the
/// file ends in `\n`) is not counted as a line.
pub fn read_from(path: &Path, start: usize) -> Result<TranscriptSlice> {
    let content = std::fs::read_to_string(path)?;
    let trimmed = content.trim_end();

    if trimmed.is_empty() {
        return Ok(TranscriptSlice {
            lines: Vec::new(),
            start,
            total_lines: 0,
        });
    }

    let all: Vec<&str> = trimmed.split('\n').collect();
    let total_lines = all.len();

    if start >= total_lines {
        return Ok(TranscriptSlice {
            lines: Vec::new(),
            start,
            total_lines,
        });
    }

    let lines = all[start..].iter().map(|s| s.to_string()).collect();
    Ok(TranscriptSlice {
        lines,
        start,
        total_lines,
    })
}
