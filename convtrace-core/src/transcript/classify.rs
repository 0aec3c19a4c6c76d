//! Message classification for decoded transcript events
//!
//! Two layers of decisions live here:
//!
//! 1. **Line decoding** with the partial-write rule: a decode failure strictly
//!    before the last line of a batch is permanent (skip, count, advance past);
//!    a failure on the last line may be an in-flight append, so the line is
//!    skipped without advancing the cursor and retried on the next run.
//!
//! 2. **Role classification**: a `user`-tagged event whose content carries a
//!    `tool_result` block is a tool result, not a user utterance. This
//!    reclassification happens before the turn assembler ever sees the event.

use crate::error::{Error, Result};
use crate::transcript::reader::TranscriptSlice;
use crate::types::{ContentBlock, EventRecord};

/// Classification of one decoded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// A genuine user utterance
    User,
    /// One part of an assistant message; parts sharing an id merge later
    AssistantPart { message_id: Option<String> },
    /// A user-tagged event carrying tool_result blocks
    ToolResultCarrier,
    /// Summaries, snapshots, and other record types the assembler ignores
    Other,
}

/// Decode one transcript line.
pub fn decode(line: &str) -> Result<EventRecord> {
    serde_json::from_str(line).map_err(Error::from)
}

/// Classify a decoded event per the transcript's role rules.
pub fn classify(record: &EventRecord) -> Classified {
    match record.role() {
        Some("user") => {
            let carries_result = record
                .blocks()
                .unwrap_or_default()
                .iter()
                .any(|b| matches!(b, ContentBlock::ToolResult { .. }));
            if carries_result {
                Classified::ToolResultCarrier
            } else {
                Classified::User
            }
        }
        Some("assistant") => Classified::AssistantPart {
            message_id: record.message_id().map(String::from),
        },
        _ => Classified::Other,
    }
}

/// One batch of decoded events plus the cursor bookkeeping for it.
#[derive(Debug)]
pub struct DecodedBatch {
    /// Decoded events with their absolute line offsets, in file order
    pub records: Vec<(usize, EventRecord)>,
    /// Line offset the cursor may advance to once the batch is fully
    /// processed; a malformed trailing line is excluded so it is retried
    pub consumed_through: usize,
    /// Permanently malformed lines skipped in this batch. The trailing line
    /// is never counted here: it may be a partial write that completes later.
    pub malformed_lines: u64,
    /// Whether the batch ended in a suspect (possibly partial) line
    pub partial_tail: bool,
}

/// Decode a batch of new lines, applying the partial-write tail rule.
pub fn decode_batch(slice: &TranscriptSlice) -> DecodedBatch {
    let mut records = Vec::new();
    let mut consumed_through = slice.start;
    let mut malformed_lines = 0u64;
    let mut partial_tail = false;

    for (i, line) in slice.lines.iter().enumerate() {
        let offset = slice.start + i;
        match decode(line) {
            Ok(record) => {
                records.push((offset, record));
                consumed_through = offset + 1;
            }
            Err(e) => {
                if slice.is_last_line(offset) {
                    // Possible partial write: leave the cursor before this
                    // line so the next run re-attempts it.
                    partial_tail = true;
                    tracing::warn!(
                        line = offset + 1,
                        "Skipping incomplete tail line (may be partial write): {}",
                        e
                    );
                } else {
                    malformed_lines += 1;
                    tracing::warn!(line = offset + 1, "Malformed transcript line: {}", e);
                    consumed_through = offset + 1;
                }
            }
        }
    }

    DecodedBatch {
        records,
        consumed_through,
        malformed_lines,
        partial_tail,
    }
}
