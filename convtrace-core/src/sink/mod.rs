//! Outbound trace sink contract
//!
//! The export pipeline never depends on a tracing backend beyond this
//! contract; any backend satisfying it is substitutable. The shipped
//! implementation is [`langfuse::LangfuseSink`].

pub mod langfuse;

pub use langfuse::LangfuseSink;

use crate::error::Result;

/// Handle for one trace being built, passed back into span recording calls.
#[derive(Debug, Clone)]
pub struct TraceHandle {
    pub trace_id: String,
    pub session_id: String,
    pub turn_number: u64,
}

/// Contract for the external tracing backend.
///
/// One trace is created per conversation turn, with one generation span for
/// the assistant response and one span per tool invocation.
pub trait TraceSink {
    /// Open a trace for a turn.
    fn begin_trace(
        &mut self,
        session_id: &str,
        turn_number: u64,
        input: &str,
        tags: &[String],
        metadata: serde_json::Value,
    ) -> Result<TraceHandle>;

    /// Record the assistant generation for a trace.
    fn record_generation(
        &mut self,
        trace: &TraceHandle,
        model: &str,
        input: &str,
        output: &str,
        metadata: serde_json::Value,
    ) -> Result<()>;

    /// Record one tool invocation for a trace.
    fn record_tool_span(
        &mut self,
        trace: &TraceHandle,
        name: &str,
        input: &serde_json::Value,
        output: Option<&serde_json::Value>,
        metadata: serde_json::Value,
    ) -> Result<()>;

    /// Close a trace with its final output.
    fn close_trace(&mut self, trace: &TraceHandle, final_output: &str) -> Result<()>;

    /// Deliver anything still buffered.
    fn flush(&mut self) -> Result<()>;

    /// Flush and release resources; the sink is not used afterwards.
    fn shutdown(&mut self) -> Result<()>;
}
