//! Transcript discovery and the incremental parsing pipeline
//!
//! Transcripts are append-only JSONL session logs under
//! `<root>/projects/<encoded-project-dir>/<session>.jsonl`. Discovery returns
//! them oldest-modified first so the oldest session progresses first and a
//! consistent global emission order exists across sessions.

pub mod assembler;
pub mod classify;
pub mod reader;

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// One discovered transcript file.
#[derive(Debug, Clone)]
pub struct TranscriptFile {
    /// Opaque session identifier
    pub session_id: String,
    /// Path to the JSONL log
    pub path: PathBuf,
    /// Human-readable project label derived from the containing directory
    pub project_label: String,
    /// File modification time, used for cross-session ordering
    pub modified_at: DateTime<Utc>,
}

/// Discover all transcripts under `root`, sorted by mtime ascending.
///
/// Unreadable files are skipped with a debug log entry; discovery itself only
/// fails on an invalid root.
pub fn discover(root: &Path) -> Result<Vec<TranscriptFile>> {
    let pattern = root.join("projects/*/*.jsonl");
    let pattern_str = pattern.to_string_lossy();

    let entries = glob::glob(&pattern_str)
        .map_err(|e| Error::Config(format!("invalid transcript glob pattern: {}", e)))?;

    let mut transcripts = Vec::new();
    for path in entries.flatten() {
        let metadata = match std::fs::metadata(&path) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(path = %path.display(), "Skipping unreadable transcript: {}", e);
                continue;
            }
        };
        let modified_at = metadata
            .modified()
            .ok()
            .map(DateTime::from)
            .unwrap_or_else(Utc::now);

        let session_id = match session_id_for(&path) {
            Some(id) => id,
            None => {
                tracing::debug!(path = %path.display(), "Skipping transcript with no usable session id");
                continue;
            }
        };

        let project_label = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .map(project_label)
            .unwrap_or_default();

        transcripts.push(TranscriptFile {
            session_id,
            path,
            project_label,
            modified_at,
        });
    }

    // Oldest first, so the newest cursor state is written last
    transcripts.sort_by_key(|t| t.modified_at);
    Ok(transcripts)
}

/// Session id for a transcript: the first line's `sessionId` field, falling
/// back to the file stem.
fn session_id_for(path: &Path) -> Option<String> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(String::from);

    let file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return stem,
    };
    let mut first_line = String::new();
    if BufReader::new(file).read_line(&mut first_line).is_err() {
        return stem;
    }

    match classify::decode(first_line.trim_end()) {
        Ok(record) => record.session_id.or(stem),
        Err(_) => stem,
    }
}

/// Extract a human-readable project label from a transcript directory name.
///
/// Project directories encode the working directory path with dashes, e.g.
/// `-Users-dev-myproject`. The fixed-length prefix (machine root and user
/// name) is stripped and the remainder rejoined.
pub fn project_label(dir_name: &str) -> String {
    let parts: Vec<&str> = dir_name.split('-').collect();
    if parts.len() > 3 {
        parts[3..].join("-")
    } else {
        dir_name.to_string()
    }
}
