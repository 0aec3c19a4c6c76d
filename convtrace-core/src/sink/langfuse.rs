//! Langfuse trace sink
//!
//! Implements [`TraceSink`] against the Langfuse batch ingestion API
//! (`POST /api/public/ingestion`). Events are buffered locally and shipped in
//! batches; transient failures (5xx, timeouts) retry with exponential
//! backoff.
//!
//! Trace and span ids are derived deterministically from session id and turn
//! number, so re-delivering a turn after a crash upserts the same trace
//! instead of duplicating it.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::SinkConfig;
use crate::error::{Error, Result};

use super::{TraceHandle, TraceSink};

/// One event in an ingestion batch.
#[derive(Debug, Clone, Serialize)]
struct IngestionEvent {
    /// Envelope id (deduplication key on the server)
    id: String,
    #[serde(rename = "type")]
    event_type: &'static str,
    timestamp: String,
    body: serde_json::Value,
}

/// Response from POST /api/public/ingestion (207 multi-status)
#[derive(Debug, Deserialize, Default)]
struct IngestionResponse {
    #[serde(default)]
    successes: Vec<serde_json::Value>,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

/// Blocking HTTP sink for a Langfuse server.
pub struct LangfuseSink {
    config: SinkConfig,
    client: reqwest::blocking::Client,
    base_url: String,
    queue: Vec<IngestionEvent>,
}

impl LangfuseSink {
    /// Create a sink from configuration.
    ///
    /// Returns an error if the configuration is invalid or missing required
    /// credentials.
    pub fn new(config: SinkConfig) -> Result<Self> {
        config.validate()?;
        if !config.is_ready() {
            return Err(Error::Config(
                "sink credentials are required to create a Langfuse sink".to_string(),
            ));
        }

        let base_url = config.host.trim_end_matches('/').to_string();
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            base_url,
            queue: Vec::new(),
        })
    }

    fn enqueue(&mut self, event_type: &'static str, body: serde_json::Value) -> Result<()> {
        self.queue.push(IngestionEvent {
            id: uuid::Uuid::new_v4().to_string(),
            event_type,
            timestamp: Utc::now().to_rfc3339(),
            body,
        });

        if self.queue.len() >= self.config.batch_size {
            self.flush_queue()?;
        }
        Ok(())
    }

    /// Ship everything buffered, one batch at a time. On failure the unsent
    /// events go back on the queue so a later flush can retry them.
    fn flush_queue(&mut self) -> Result<()> {
        let mut pending = std::mem::take(&mut self.queue);
        while !pending.is_empty() {
            let rest = pending.split_off(pending.len().min(self.config.batch_size));
            let batch = pending;
            pending = rest;

            if let Err(e) = self.send_with_retry(&batch) {
                self.queue = batch;
                self.queue.extend(pending);
                return Err(e);
            }
        }
        Ok(())
    }

    fn send_with_retry(&self, batch: &[IngestionEvent]) -> Result<()> {
        let mut last_error = None;
        let mut delay = Duration::from_millis(500);

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::debug!(
                    "Retrying ingestion (attempt {}/{}), waiting {:?}",
                    attempt + 1,
                    self.config.max_retries + 1,
                    delay
                );
                std::thread::sleep(delay);
                delay = std::cmp::min(delay * 2, Duration::from_secs(30));
            }

            match self.send_batch(batch) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    if is_retryable_error(&e) {
                        tracing::warn!("Transient error sending traces: {}", e);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Sink("max retries exceeded".to_string())))
    }

    fn send_batch(&self, batch: &[IngestionEvent]) -> Result<()> {
        let url = format!("{}/api/public/ingestion", self.base_url);
        let body = serde_json::json!({ "batch": batch });

        let response = self
            .client
            .post(&url)
            .basic_auth(
                self.config.public_key.as_deref().unwrap_or_default(),
                self.config.secret_key.as_deref(),
            )
            .json(&body)
            .send()
            .map_err(|e| Error::Sink(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            let result: IngestionResponse = response.json().unwrap_or_default();
            if !result.errors.is_empty() {
                // Rejected events are validation failures; resending the same
                // payload cannot fix them, so log and move on.
                tracing::warn!(
                    accepted = result.successes.len(),
                    rejected = result.errors.len(),
                    "Langfuse rejected some ingestion events"
                );
            }
            Ok(())
        } else {
            let error_text = response.text().unwrap_or_else(|_| "unknown".to_string());
            Err(Error::Sink(format!("API error ({}): {}", status, error_text)))
        }
    }
}

impl TraceSink for LangfuseSink {
    fn begin_trace(
        &mut self,
        session_id: &str,
        turn_number: u64,
        input: &str,
        tags: &[String],
        metadata: serde_json::Value,
    ) -> Result<TraceHandle> {
        let trace_id = stable_id(&format!("trace:{}:{}", session_id, turn_number));
        self.enqueue(
            "trace-create",
            serde_json::json!({
                "id": trace_id,
                "name": format!("Turn {}", turn_number),
                "sessionId": session_id,
                "input": { "role": "user", "content": input },
                "tags": tags,
                "metadata": metadata,
            }),
        )?;

        Ok(TraceHandle {
            trace_id,
            session_id: session_id.to_string(),
            turn_number,
        })
    }

    fn record_generation(
        &mut self,
        trace: &TraceHandle,
        model: &str,
        input: &str,
        output: &str,
        metadata: serde_json::Value,
    ) -> Result<()> {
        let id = stable_id(&format!("generation:{}", trace.trace_id));
        self.enqueue(
            "generation-create",
            serde_json::json!({
                "id": id,
                "traceId": trace.trace_id,
                "name": "Claude Response",
                "model": model,
                "input": { "role": "user", "content": input },
                "output": { "role": "assistant", "content": output },
                "metadata": metadata,
            }),
        )
    }

    fn record_tool_span(
        &mut self,
        trace: &TraceHandle,
        name: &str,
        input: &serde_json::Value,
        output: Option<&serde_json::Value>,
        metadata: serde_json::Value,
    ) -> Result<()> {
        // The call id (when present) keeps repeated invocations of the same
        // tool within one turn from colliding.
        let discriminator = metadata
            .get("tool_id")
            .and_then(|v| v.as_str())
            .unwrap_or(name)
            .to_string();
        let id = stable_id(&format!("span:{}:{}", trace.trace_id, discriminator));
        self.enqueue(
            "span-create",
            serde_json::json!({
                "id": id,
                "traceId": trace.trace_id,
                "name": format!("Tool: {}", name),
                "input": input,
                "output": output,
                "metadata": metadata,
            }),
        )
    }

    fn close_trace(&mut self, trace: &TraceHandle, final_output: &str) -> Result<()> {
        // Same trace id: the server merges this into the open trace.
        self.enqueue(
            "trace-create",
            serde_json::json!({
                "id": trace.trace_id,
                "output": { "role": "assistant", "content": final_output },
            }),
        )
    }

    fn flush(&mut self) -> Result<()> {
        self.flush_queue()
    }

    fn shutdown(&mut self) -> Result<()> {
        self.flush_queue()
    }
}

/// Deterministic 32-hex-char id derived from a seed string.
fn stable_id(seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    let hash = hasher.finalize();
    hex::encode(&hash[..16])
}

/// Check if an error is retryable (transient)
fn is_retryable_error(error: &Error) -> bool {
    match error {
        Error::Sink(msg) => {
            // Retry on 5xx errors
            msg.contains("API error (5")
                // Retry on network/timeout errors
                || msg.contains("timeout")
                || msg.contains("connection")
                || msg.contains("request failed")
        }
        _ => false,
    }
}
