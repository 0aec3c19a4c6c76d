//! Export coordination across sessions
//!
//! One run discovers every transcript, processes each incrementally (oldest
//! modification time first), and persists cursors after each session's turns
//! have been delivered. Failures degrade: a failing session is logged and
//! skipped, never aborting the run, and partial progress within a session is
//! still persisted.

use std::path::PathBuf;

use crate::cursor::CursorStore;
use crate::emit;
use crate::error::{Error, Result};
use crate::redact::Redactor;
use crate::sink::TraceSink;
use crate::transcript::assembler::{SessionContext, TurnAssembler};
use crate::transcript::{classify, reader, TranscriptFile};
use crate::types::{Cursor, Turn};
use chrono::Utc;

/// Result of a full export run across all sessions.
#[derive(Debug, Default)]
pub struct ExportSummary {
    /// Transcripts discovered
    pub sessions_seen: usize,
    /// Sessions with new turns emitted
    pub sessions_processed: usize,
    /// Sessions with no new content
    pub sessions_skipped: usize,
    /// Sessions aborted by an error (logged, not fatal)
    pub sessions_failed: usize,
    /// Turns emitted across all sessions
    pub turns_emitted: u64,
    /// Permanently malformed lines skipped
    pub malformed_lines: u64,
}

/// Result of processing a single session.
#[derive(Debug)]
pub struct SessionReport {
    pub session_id: String,
    pub turns_emitted: u64,
    pub malformed_lines: u64,
    /// True when the transcript had not grown
    pub skipped: bool,
}

/// Drives the incremental pipeline: cursor -> reader -> classifier ->
/// assembler -> emitter -> cursor.
pub struct ExportCoordinator {
    root: PathBuf,
    store: CursorStore,
    redactor: Redactor,
}

impl ExportCoordinator {
    pub fn new(root: PathBuf, store: CursorStore, redactor: Redactor) -> Self {
        Self {
            root,
            store,
            redactor,
        }
    }

    /// Process every discovered transcript. Never fails the run: per-session
    /// errors are logged and the next session proceeds.
    pub fn run(&self, sink: &mut dyn TraceSink) -> ExportSummary {
        let mut summary = ExportSummary::default();

        let transcripts = match crate::transcript::discover(&self.root) {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(root = %self.root.display(), "Transcript discovery failed: {}", e);
                return summary;
            }
        };

        summary.sessions_seen = transcripts.len();
        tracing::info!(count = transcripts.len(), "Found transcripts to process");

        for transcript in &transcripts {
            match self.process_session(sink, transcript) {
                Ok(report) if report.skipped => {
                    summary.sessions_skipped += 1;
                }
                Ok(report) => {
                    summary.sessions_processed += 1;
                    summary.turns_emitted += report.turns_emitted;
                    summary.malformed_lines += report.malformed_lines;
                    if report.turns_emitted > 0 {
                        tracing::info!(
                            session_id = %report.session_id,
                            turns = report.turns_emitted,
                            "Session exported"
                        );
                    }
                }
                Err(e) => {
                    summary.sessions_failed += 1;
                    tracing::warn!(
                        session_id = %transcript.session_id,
                        "Session failed, moving to next: {}",
                        e
                    );
                }
            }
        }

        summary
    }

    /// Process one session's new transcript lines.
    ///
    /// The cursor is persisted only after the session's turns have been
    /// delivered. When delivery fails partway, the cursor still reflects the
    /// turns that made it out; the remainder is retried on the next run.
    pub fn process_session(
        &self,
        sink: &mut dyn TraceSink,
        transcript: &TranscriptFile,
    ) -> Result<SessionReport> {
        let cursor = self.store.load(&transcript.session_id);
        let slice = reader::read_from(&transcript.path, cursor.last_line)?;

        if slice.is_empty() {
            tracing::debug!(
                session_id = %transcript.session_id,
                last_line = cursor.last_line,
                total = slice.total_lines,
                "No new lines to process"
            );
            return Ok(SessionReport {
                session_id: transcript.session_id.clone(),
                turns_emitted: 0,
                malformed_lines: 0,
                skipped: true,
            });
        }

        let batch = classify::decode_batch(&slice);
        if batch.malformed_lines > 0 {
            tracing::info!(
                session_id = %transcript.session_id,
                malformed = batch.malformed_lines,
                new_lines = slice.lines.len(),
                "Skipped malformed lines"
            );
        }

        // Fold the classified stream into turns
        let mut assembler = TurnAssembler::new(SessionContext {
            session_id: transcript.session_id.clone(),
            project_label: transcript.project_label.clone(),
            turn_count_base: cursor.turn_count,
        });
        let mut turns: Vec<Turn> = Vec::new();
        for (offset, record) in batch.records {
            if let Some(turn) = assembler.push(offset, record) {
                turns.push(turn);
            }
        }
        let outcome = assembler.finish(batch.consumed_through);
        let final_resume = outcome.resume_line;
        if let Some(turn) = outcome.turn {
            turns.push(turn);
        }

        // Deliver turns in order, stopping at the first failure
        let mut emitted: u64 = 0;
        let mut failure: Option<Error> = None;
        for turn in &turns {
            match emit::emit_turn(sink, &self.redactor, turn) {
                Ok(()) => emitted += 1,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        if let Some(e) = failure {
            // Persist progress up to the last delivered turn. Undelivered
            // lines (and their malformed-line counts) are re-read next run.
            if emitted > 0 {
                let partial = Cursor {
                    last_line: turns[emitted as usize - 1].resume_line,
                    turn_count: cursor.turn_count + emitted,
                    malformed_line_count: cursor.malformed_line_count,
                    updated_at: Utc::now(),
                };
                self.store.update(&transcript.session_id, partial)?;
            }
            return Err(e);
        }

        // Full batch delivered: advance past everything consumed
        if final_resume > cursor.last_line || emitted > 0 {
            let updated = Cursor {
                last_line: final_resume,
                turn_count: cursor.turn_count + emitted,
                malformed_line_count: cursor.malformed_line_count + batch.malformed_lines,
                updated_at: Utc::now(),
            };
            self.store.update(&transcript.session_id, updated)?;
        }

        Ok(SessionReport {
            session_id: transcript.session_id.clone(),
            turns_emitted: emitted,
            malformed_lines: batch.malformed_lines,
            skipped: false,
        })
    }
}
