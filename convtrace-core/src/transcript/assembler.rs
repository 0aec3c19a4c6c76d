//! Turn assembly state machine
//!
//! Folds a stream of classified transcript events into complete [`Turn`]s.
//! A turn opens with a user utterance, accumulates assistant messages (merging
//! continuation parts by message-id) and tool-result carriers, and closes when
//! the next user utterance arrives or input ends.
//!
//! All buffering lives in the assembler's own state; nothing is global. The
//! states are implicit in the buffers: no pending user (idle), pending user
//! with no assistants (awaiting a response), pending user with assistants
//! (open, emittable).

use crate::transcript::classify::{classify, Classified};
use crate::types::{AssistantMessage, EventRecord, Turn};

/// Session-scoped context threaded into every emitted turn.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub project_label: String,
    /// Persisted turn count; emitted turns continue numbering from here
    pub turn_count_base: u64,
}

/// Result of draining the assembler at end of input.
#[derive(Debug)]
pub struct FinishOutcome {
    /// Final turn, when a user message and at least one assistant are pending
    pub turn: Option<Turn>,
    /// Line offset the cursor may advance to. When a user message is pending
    /// without any assistant response, this holds at the user line so the
    /// turn assembles intact on the next run.
    pub resume_line: usize,
}

/// The turn assembly state machine.
pub struct TurnAssembler {
    ctx: SessionContext,
    emitted: u64,
    /// Pending user utterance and its line offset
    pending_user: Option<(usize, EventRecord)>,
    /// Completed assistant messages of the open turn
    assistants: Vec<AssistantMessage>,
    /// Continuation parts of the assistant message being accumulated
    group: Vec<EventRecord>,
    group_id: Option<String>,
    /// Tool-result carriers buffered for the open turn
    tool_results: Vec<EventRecord>,
}

impl TurnAssembler {
    pub fn new(ctx: SessionContext) -> Self {
        Self {
            ctx,
            emitted: 0,
            pending_user: None,
            assistants: Vec::new(),
            group: Vec::new(),
            group_id: None,
            tool_results: Vec::new(),
        }
    }

    /// Process one decoded event at the given absolute line offset, in file
    /// order. Returns a turn when this event closed one.
    pub fn push(&mut self, offset: usize, record: EventRecord) -> Option<Turn> {
        match classify(&record) {
            Classified::ToolResultCarrier => {
                self.tool_results.push(record);
                None
            }
            Classified::User => {
                self.flush_group();
                let turn = self.complete_turn(offset);

                // The new utterance opens the next turn; all buffers reset
                self.pending_user = Some((offset, record));
                self.assistants.clear();
                self.tool_results.clear();
                self.group_id = None;
                turn
            }
            Classified::AssistantPart { message_id } => {
                let starts_new_message = match (&message_id, &self.group_id) {
                    // An event with no message-id is its own single-part message
                    (None, _) => true,
                    (Some(id), Some(current)) => id != current,
                    // The accumulating group was started by an id-less part
                    (Some(_), None) => !self.group.is_empty(),
                };
                if starts_new_message {
                    self.flush_group();
                }
                self.group_id = message_id;
                self.group.push(record);
                None
            }
            Classified::Other => None,
        }
    }

    /// Drain the assembler at end of input.
    pub fn finish(mut self, consumed_through: usize) -> FinishOutcome {
        self.flush_group();
        if let Some(turn) = self.complete_turn(consumed_through) {
            return FinishOutcome {
                turn: Some(turn),
                resume_line: consumed_through,
            };
        }

        let resume_line = match &self.pending_user {
            Some((offset, _)) => *offset,
            None => consumed_through,
        };
        FinishOutcome {
            turn: None,
            resume_line,
        }
    }

    /// Merge the in-progress part group into the assistant list.
    fn flush_group(&mut self) {
        if self.group.is_empty() {
            return;
        }
        let parts = std::mem::take(&mut self.group);
        let id = self.group_id.take();
        self.assistants.push(AssistantMessage::merge(id, &parts));
    }

    /// Emit the open turn if it is complete (user + at least one assistant).
    fn complete_turn(&mut self, resume_line: usize) -> Option<Turn> {
        if self.assistants.is_empty() {
            return None;
        }
        let (_, user) = self.pending_user.take()?;
        self.emitted += 1;
        Some(Turn {
            session_id: self.ctx.session_id.clone(),
            project_label: self.ctx.project_label.clone(),
            turn_number: self.ctx.turn_count_base + self.emitted,
            user,
            assistants: std::mem::take(&mut self.assistants),
            tool_results: std::mem::take(&mut self.tool_results),
            resume_line,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assembler(base: u64) -> TurnAssembler {
        TurnAssembler::new(SessionContext {
            session_id: "session-1".to_string(),
            project_label: "myproject".to_string(),
            turn_count_base: base,
        })
    }

    fn user(text: &str) -> EventRecord {
        serde_json::from_str(&format!(
            r#"{{"type":"user","message":{{"role":"user","content":"{}"}}}}"#,
            text
        ))
        .unwrap()
    }

    fn assistant_part(id: Option<&str>, text: &str) -> EventRecord {
        let id_field = match id {
            Some(id) => format!(r#""id":"{}","#, id),
            None => String::new(),
        };
        serde_json::from_str(&format!(
            r#"{{"type":"assistant","message":{{{}"content":[{{"type":"text","text":"{}"}}]}}}}"#,
            id_field, text
        ))
        .unwrap()
    }

    fn carrier(tool_use_id: &str, output: &str) -> EventRecord {
        serde_json::from_str(&format!(
            r#"{{"type":"user","message":{{"content":[
                {{"type":"tool_result","tool_use_id":"{}","content":"{}"}}
            ]}}}}"#,
            tool_use_id, output
        ))
        .unwrap()
    }

    #[test]
    fn test_turn_completeness_multipart_merge() {
        let mut asm = assembler(0);
        assert!(asm.push(0, user("question")).is_none());
        assert!(asm.push(1, assistant_part(Some("m1"), "part one")).is_none());
        assert!(asm.push(2, assistant_part(Some("m1"), "part two")).is_none());

        let turn = asm.push(3, user("next question")).expect("turn should close");
        assert_eq!(turn.turn_number, 1);
        assert_eq!(turn.assistants.len(), 1);
        assert_eq!(turn.assistants[0].text(), "part one\npart two");
        assert_eq!(turn.user_text(), "question");
        assert_eq!(turn.resume_line, 3);
    }

    #[test]
    fn test_distinct_ids_are_distinct_messages() {
        let mut asm = assembler(0);
        asm.push(0, user("q"));
        asm.push(1, assistant_part(Some("m1"), "first"));
        asm.push(2, assistant_part(Some("m2"), "second"));

        let outcome = asm.finish(3);
        let turn = outcome.turn.expect("final turn");
        assert_eq!(turn.assistants.len(), 2);
        assert_eq!(turn.final_output(), "second");
        assert_eq!(outcome.resume_line, 3);
    }

    #[test]
    fn test_idless_parts_do_not_merge() {
        let mut asm = assembler(0);
        asm.push(0, user("q"));
        asm.push(1, assistant_part(None, "one"));
        asm.push(2, assistant_part(None, "two"));
        asm.push(3, assistant_part(Some("m1"), "three"));

        let turn = asm.finish(4).turn.expect("final turn");
        assert_eq!(turn.assistants.len(), 3);
        assert_eq!(turn.assistants[0].text(), "one");
        assert_eq!(turn.assistants[1].text(), "two");
        assert_eq!(turn.assistants[2].message_id.as_deref(), Some("m1"));
    }

    #[test]
    fn test_tool_results_attach_to_open_turn() {
        let mut asm = assembler(0);
        asm.push(0, user("run pwd"));
        let part: EventRecord = serde_json::from_str(
            r#"{"type":"assistant","message":{"id":"m1","content":[
                {"type":"tool_use","id":"t1","name":"Bash","input":{"command":"pwd"}}
            ]}}"#,
        )
        .unwrap();
        asm.push(1, part);
        asm.push(2, carrier("t1", "/home/dev"));
        asm.push(3, assistant_part(Some("m2"), "done"));

        let turn = asm.finish(4).turn.expect("final turn");
        let calls = turn.resolve_tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].output, Some(serde_json::json!("/home/dev")));
    }

    #[test]
    fn test_buffers_reset_on_new_user() {
        let mut asm = assembler(0);
        asm.push(0, user("first"));
        asm.push(1, assistant_part(Some("m1"), "answer"));
        asm.push(2, carrier("t0", "stale"));
        let turn = asm.push(3, user("second")).expect("first turn closes");
        assert_eq!(turn.tool_results.len(), 1);

        asm.push(4, assistant_part(Some("m2"), "fresh answer"));
        let turn = asm.finish(5).turn.expect("second turn");
        // The stale carrier went with the first turn, not this one
        assert!(turn.tool_results.is_empty());
        assert_eq!(turn.turn_number, 2);
    }

    #[test]
    fn test_numbering_continues_from_base() {
        let mut asm = assembler(5);
        asm.push(0, user("a"));
        asm.push(1, assistant_part(Some("m1"), "ra"));
        let first = asm.push(2, user("b")).expect("turn");
        asm.push(3, assistant_part(Some("m2"), "rb"));
        let second = asm.finish(4).turn.expect("turn");

        assert_eq!(first.turn_number, 6);
        assert_eq!(second.turn_number, 7);
    }

    #[test]
    fn test_pending_user_holds_resume_line() {
        let mut asm = assembler(0);
        asm.push(0, user("a"));
        asm.push(1, assistant_part(Some("m1"), "ra"));
        asm.push(2, user("unanswered"));

        let outcome = asm.finish(3);
        // First turn closed at line 2; the unanswered user is not emitted and
        // the cursor holds at its line.
        assert!(outcome.turn.is_none());
        assert_eq!(outcome.resume_line, 2);
    }

    #[test]
    fn test_user_without_assistant_is_not_a_turn() {
        let mut asm = assembler(0);
        asm.push(0, user("a"));
        assert!(asm.push(1, user("b")).is_none());
        asm.push(2, assistant_part(Some("m1"), "rb"));
        let turn = asm.finish(3).turn.expect("turn for second user");
        assert_eq!(turn.user_text(), "b");
        assert_eq!(turn.turn_number, 1);
    }

    #[test]
    fn test_other_records_are_ignored() {
        let mut asm = assembler(0);
        asm.push(0, user("q"));
        let summary: EventRecord =
            serde_json::from_str(r#"{"type":"summary","summary":"compacted"}"#).unwrap();
        asm.push(1, summary);
        asm.push(2, assistant_part(Some("m1"), "answer"));
        let turn = asm.finish(3).turn.expect("turn");
        assert_eq!(turn.assistants.len(), 1);
    }
}
