//! Turn-to-trace translation
//!
//! Maps one assembled [`Turn`] onto the sink contract: a trace per turn, one
//! generation span for the assistant response, and one span per resolved tool
//! invocation. All outbound text and JSON passes through the redactor.

use crate::error::Result;
use crate::redact::Redactor;
use crate::sink::TraceSink;
use crate::types::Turn;

/// Default model label when the transcript carries none.
const DEFAULT_MODEL: &str = "claude";

/// Emit one turn to the sink.
pub fn emit_turn(sink: &mut dyn TraceSink, redactor: &Redactor, turn: &Turn) -> Result<()> {
    let user_text = redactor.text(&turn.user_text());
    let final_output = redactor.text(&turn.final_output());
    let model = turn.model().unwrap_or(DEFAULT_MODEL);
    let invocations = turn.resolve_tool_calls();

    let mut tags = vec!["claude-code".to_string()];
    if !turn.project_label.is_empty() {
        tags.push(turn.project_label.clone());
    }

    let metadata = serde_json::json!({
        "source": "claude-code",
        "turn_number": turn.turn_number,
        "session_id": turn.session_id,
        "project": turn.project_label,
    });

    let trace = sink.begin_trace(
        &turn.session_id,
        turn.turn_number,
        &user_text,
        &tags,
        metadata,
    )?;

    sink.record_generation(
        &trace,
        model,
        &user_text,
        &final_output,
        serde_json::json!({ "tool_count": invocations.len() }),
    )?;

    for call in &invocations {
        let input = redactor.value(&call.input);
        let output = call.output.as_ref().map(|v| redactor.value(v));
        sink.record_tool_span(
            &trace,
            &call.name,
            &input,
            output.as_ref(),
            serde_json::json!({
                "tool_name": call.name,
                "tool_id": call.call_id,
            }),
        )?;
        tracing::debug!(tool = %call.name, "Recorded tool span");
    }

    sink.close_trace(&trace, &final_output)?;
    tracing::debug!(turn = turn.turn_number, "Emitted trace for turn");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::TraceHandle;
    use crate::types::{AssistantMessage, EventRecord};

    /// Records every sink call for assertions.
    #[derive(Default)]
    struct RecordingSink {
        calls: Vec<String>,
        trace_inputs: Vec<String>,
        tool_outputs: Vec<Option<serde_json::Value>>,
    }

    impl TraceSink for RecordingSink {
        fn begin_trace(
            &mut self,
            session_id: &str,
            turn_number: u64,
            input: &str,
            _tags: &[String],
            _metadata: serde_json::Value,
        ) -> Result<TraceHandle> {
            self.calls.push(format!("begin:{}", turn_number));
            self.trace_inputs.push(input.to_string());
            Ok(TraceHandle {
                trace_id: format!("{}-{}", session_id, turn_number),
                session_id: session_id.to_string(),
                turn_number,
            })
        }

        fn record_generation(
            &mut self,
            _trace: &TraceHandle,
            model: &str,
            _input: &str,
            _output: &str,
            _metadata: serde_json::Value,
        ) -> Result<()> {
            self.calls.push(format!("generation:{}", model));
            Ok(())
        }

        fn record_tool_span(
            &mut self,
            _trace: &TraceHandle,
            name: &str,
            _input: &serde_json::Value,
            output: Option<&serde_json::Value>,
            _metadata: serde_json::Value,
        ) -> Result<()> {
            self.calls.push(format!("tool:{}", name));
            self.tool_outputs.push(output.cloned());
            Ok(())
        }

        fn close_trace(&mut self, _trace: &TraceHandle, _final_output: &str) -> Result<()> {
            self.calls.push("close".to_string());
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }

        fn shutdown(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn decode(line: &str) -> EventRecord {
        serde_json::from_str(line).unwrap()
    }

    fn sample_turn() -> Turn {
        let user = decode(r#"{"type":"user","message":{"content":"list files"}}"#);
        let assistant = decode(
            r#"{"type":"assistant","message":{"model":"claude-sonnet-4","content":[
                {"type":"text","text":"running ls"},
                {"type":"tool_use","id":"t1","name":"Bash","input":{"command":"ls"}}
            ]}}"#,
        );
        let carrier = decode(
            r#"{"type":"user","message":{"content":[
                {"type":"tool_result","tool_use_id":"t1","content":"a.txt"}
            ]}}"#,
        );
        Turn {
            session_id: "s1".to_string(),
            project_label: "demo".to_string(),
            turn_number: 4,
            user,
            assistants: vec![AssistantMessage::merge(None, &[assistant])],
            tool_results: vec![carrier],
            resume_line: 3,
        }
    }

    #[test]
    fn test_emit_turn_call_sequence() {
        let mut sink = RecordingSink::default();
        let redactor = Redactor::new(true);
        emit_turn(&mut sink, &redactor, &sample_turn()).unwrap();

        assert_eq!(
            sink.calls,
            vec!["begin:4", "generation:claude-sonnet-4", "tool:Bash", "close"]
        );
        assert_eq!(sink.tool_outputs[0], Some(serde_json::json!("a.txt")));
    }

    #[test]
    fn test_emit_redacts_user_text() {
        let mut turn = sample_turn();
        turn.user = decode(
            r#"{"type":"user","message":{"content":"my key is sk-abcdefghijklmnopqrstuvwxyz123456"}}"#,
        );
        let mut sink = RecordingSink::default();
        let redactor = Redactor::new(true);
        emit_turn(&mut sink, &redactor, &turn).unwrap();

        assert!(sink.trace_inputs[0].contains("sk-[REDACTED]"));
        assert!(!sink.trace_inputs[0].contains("sk-abcdef"));
    }
}
