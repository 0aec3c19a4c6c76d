//! Core domain types for convtrace
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Transcript** | Append-only per-session JSONL event log written by the assistant |
//! | **Event** | One decoded transcript line (user or assistant, text or blocks) |
//! | **Continuation part** | One fragment of a logical assistant message split across events sharing an id |
//! | **Turn** | One user-to-assistant exchange, including tool invocations in between |
//! | **Cursor** | Persisted per-session progress marker (line offset + turn count) |
//!
//! Transcript content is loosely typed at the source; here it is modeled as a
//! closed tagged enum ([`ContentBlock`]) so downstream code is exhaustive and
//! new block types fail loudly instead of silently vanishing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Raw transcript events (serde deserialization)
// ============================================

/// Represents a single decoded line from a transcript.
///
/// Uses `#[serde(default)]` liberally to handle missing fields gracefully.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct EventRecord {
    /// Session identifier, present on most records
    pub session_id: Option<String>,
    /// Record type ("user", "assistant", "summary", ...)
    #[serde(rename = "type")]
    pub record_type: Option<String>,
    /// RFC 3339 timestamp of the event
    pub timestamp: Option<String>,
    /// Nested message payload
    pub message: Option<MessageBody>,
    /// Some records carry content at the top level instead of under `message`
    pub content: Option<MessageContent>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct MessageBody {
    pub role: Option<String>,
    pub model: Option<String>,
    pub id: Option<String>,
    pub content: Option<MessageContent>,
}

/// Message content is either a plain string or an ordered list of typed blocks.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// One typed content block inside a message.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: serde_json::Value,
        #[serde(default)]
        is_error: bool,
    },
    // Catch-all for unknown block types
    #[serde(other)]
    Unknown,
}

impl EventRecord {
    /// Effective role of this record: the top-level `type` tag, falling back
    /// to the nested message role.
    pub fn role(&self) -> Option<&str> {
        self.record_type
            .as_deref()
            .or_else(|| self.message.as_ref().and_then(|m| m.role.as_deref()))
    }

    /// Message content, preferring the nested `message.content` payload.
    pub fn content(&self) -> Option<&MessageContent> {
        match self.message.as_ref() {
            Some(msg) => msg.content.as_ref(),
            None => self.content.as_ref(),
        }
    }

    /// Content blocks, if the content is block-structured.
    pub fn blocks(&self) -> Option<&[ContentBlock]> {
        match self.content() {
            Some(MessageContent::Blocks(blocks)) => Some(blocks),
            _ => None,
        }
    }

    /// Assistant message id used to detect continuation parts.
    pub fn message_id(&self) -> Option<&str> {
        self.message.as_ref().and_then(|m| m.id.as_deref())
    }

    /// Backing model recorded on assistant messages.
    pub fn model(&self) -> Option<&str> {
        self.message.as_ref().and_then(|m| m.model.as_deref())
    }

    /// Concatenated text content: all `text` blocks in order joined by
    /// newline; plain-string content passes through unchanged; anything
    /// else yields the empty string.
    pub fn text_content(&self) -> String {
        match self.content() {
            Some(MessageContent::Text(text)) => text.clone(),
            Some(MessageContent::Blocks(blocks)) => {
                let parts: Vec<&str> = blocks
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect();
                parts.join("\n")
            }
            None => String::new(),
        }
    }

    /// Ordered tool calls contained in this record's content blocks.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.blocks()
            .unwrap_or_default()
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                    name: name.clone(),
                    input: input.clone(),
                    call_id: id.clone(),
                }),
                _ => None,
            })
            .collect()
    }
}

// ============================================
// Cursor
// ============================================

/// Per-session progress marker persisted by the cursor store.
///
/// `last_line` only ever advances past lines that were successfully decoded;
/// a malformed trailing line is not counted as consumed so a concurrent
/// partial write can be retried on the next run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cursor {
    /// Number of transcript lines consumed so far
    pub last_line: usize,
    /// Number of turns emitted so far
    pub turn_count: u64,
    /// Lifetime count of permanently malformed lines skipped
    #[serde(default)]
    pub malformed_line_count: u64,
    /// When this cursor was last persisted
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Default for Cursor {
    fn default() -> Self {
        Self {
            last_line: 0,
            turn_count: 0,
            malformed_line_count: 0,
            updated_at: Utc::now(),
        }
    }
}

// ============================================
// Assembled turns
// ============================================

/// A tool call extracted from an assistant message.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub input: serde_json::Value,
    pub call_id: String,
}

/// A tool call paired with its result (if one arrived).
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub name: String,
    pub input: serde_json::Value,
    pub call_id: String,
    /// Absent when no matching tool result was observed; never an error.
    pub output: Option<serde_json::Value>,
}

/// A logical assistant message: one or more continuation parts merged by
/// concatenating their content blocks in arrival order.
#[derive(Debug, Clone)]
pub struct AssistantMessage {
    pub message_id: Option<String>,
    pub model: Option<String>,
    pub blocks: Vec<ContentBlock>,
}

impl AssistantMessage {
    /// Merge continuation parts into a single logical message.
    ///
    /// Plain-string content becomes a single text block so later parts can
    /// still be appended uniformly.
    pub fn merge(message_id: Option<String>, parts: &[EventRecord]) -> Self {
        let model = parts.first().and_then(|p| p.model().map(String::from));
        let mut blocks = Vec::new();
        for part in parts {
            match part.content() {
                Some(MessageContent::Text(text)) if !text.is_empty() => {
                    blocks.push(ContentBlock::Text { text: text.clone() });
                }
                Some(MessageContent::Blocks(bs)) => blocks.extend(bs.iter().cloned()),
                _ => {}
            }
        }
        Self {
            message_id,
            model,
            blocks,
        }
    }

    /// Concatenated text of this message's text blocks.
    pub fn text(&self) -> String {
        let parts: Vec<&str> = self
            .blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        parts.join("\n")
    }
}

/// The unit of output: one complete user-to-assistant exchange.
#[derive(Debug, Clone)]
pub struct Turn {
    pub session_id: String,
    pub project_label: String,
    /// Session-scoped, strictly increasing, continues from the persisted cursor
    pub turn_number: u64,
    pub user: EventRecord,
    pub assistants: Vec<AssistantMessage>,
    pub tool_results: Vec<EventRecord>,
    /// Line offset the cursor may safely advance to once this turn has been
    /// delivered: the offset of the user line that closed the turn, or the
    /// last consumed line for a turn closed by end of input.
    pub resume_line: usize,
}

impl Turn {
    /// Text of the user utterance that opened this turn.
    pub fn user_text(&self) -> String {
        self.user.text_content()
    }

    /// Text of the last assistant message, used as the trace's final output.
    pub fn final_output(&self) -> String {
        self.assistants
            .last()
            .map(|a| a.text())
            .unwrap_or_default()
    }

    /// Backing model, taken from the first assistant message.
    pub fn model(&self) -> Option<&str> {
        self.assistants.first().and_then(|a| a.model.as_deref())
    }

    /// Pair every tool call across this turn's assistant messages with its
    /// result. Carriers are scanned in arrival order and the first block whose
    /// `tool_use_id` matches wins; a missing result yields `None` output.
    pub fn resolve_tool_calls(&self) -> Vec<ToolInvocation> {
        let mut invocations = Vec::new();
        for assistant in &self.assistants {
            for block in &assistant.blocks {
                let (id, name, input) = match block {
                    ContentBlock::ToolUse { id, name, input } => (id, name, input),
                    _ => continue,
                };
                let output = self.tool_results.iter().find_map(|carrier| {
                    carrier.blocks().unwrap_or_default().iter().find_map(|b| match b {
                        ContentBlock::ToolResult {
                            tool_use_id,
                            content,
                            ..
                        } if tool_use_id == id => Some(content.clone()),
                        _ => None,
                    })
                });
                invocations.push(ToolInvocation {
                    name: name.clone(),
                    input: input.clone(),
                    call_id: id.clone(),
                    output,
                });
            }
        }
        invocations
    }
}
