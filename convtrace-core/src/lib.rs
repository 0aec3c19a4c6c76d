//! # convtrace-core
//!
//! Core library for convtrace - an incremental exporter that turns
//! append-only agent conversation transcripts into structured observability
//! traces.
//!
//! This library provides:
//! - Transcript discovery and an incremental line reader
//! - Message classification and the turn-assembly state machine
//! - Crash-safe per-session cursors with cross-process locking
//! - A pluggable trace sink contract with a Langfuse implementation
//! - Configuration and logging infrastructure
//!
//! ## Architecture
//!
//! ```text
//! Cursor Store ──resume offset──► Line Reader ──new lines──► Classifier
//!       ▲                                                        │
//!       │                                                 tagged events
//!  new cursor                                                    ▼
//!       └────────────── Export Coordinator ◄──turns──── Turn Assembler
//!                              │
//!                              ▼
//!                        Trace Sink (Langfuse)
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use convtrace_core::{Config, CursorStore, ExportCoordinator, LangfuseSink, Redactor, TraceSink};
//!
//! let config = Config::load().expect("failed to load config");
//! let mut sink = LangfuseSink::new(config.sink.clone()).expect("failed to create sink");
//! let coordinator = ExportCoordinator::new(
//!     config.export.transcript_root(),
//!     CursorStore::new(Config::cursor_path()),
//!     Redactor::new(config.export.redact),
//! );
//! let summary = coordinator.run(&mut sink);
//! sink.shutdown().expect("failed to flush sink");
//! println!("emitted {} turn(s)", summary.turns_emitted);
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use cursor::CursorStore;
pub use error::{Error, Result};
pub use export::{ExportCoordinator, ExportSummary};
pub use redact::Redactor;
pub use sink::{LangfuseSink, TraceHandle, TraceSink};
pub use types::*;

// Public modules
pub mod config;
pub mod cursor;
pub mod emit;
pub mod error;
pub mod export;
pub mod logging;
pub mod redact;
pub mod sink;
pub mod transcript;
pub mod types;
