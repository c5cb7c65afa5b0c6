//! Streaming execution events.
//!
//! `execute_stream` emits these down a bounded channel; the orchestrator
//! is the sole producer and the front-end the sole consumer. A dropped
//! receiver never fails the pipeline.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::api::results::PipelineResult;
use crate::core::config::PhaseId;
use crate::core::findings::FrameStatus;

/// Recommended bound for event channels.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// One structured execution event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A phase began
    PhaseStarted {
        /// Phase identifier
        phase: PhaseId,
    },
    /// A phase finished
    PhaseCompleted {
        /// Phase identifier
        phase: PhaseId,
        /// Wall-clock duration
        duration_ms: u64,
        /// Frame invocations performed
        frames_executed: usize,
    },
    /// One frame invocation began
    FrameStarted {
        /// Frame identifier
        frame_id: String,
        /// File under analysis, absent for repository scope
        file: Option<String>,
    },
    /// One frame invocation finished
    FrameCompleted {
        /// Frame identifier
        frame_id: String,
        /// Outcome
        status: FrameStatus,
        /// Wall-clock duration (0 for cache hits)
        duration_ms: u64,
        /// Findings after normalization
        issues_found: usize,
    },
    /// A non-fatal advisory was recorded
    Advisory {
        /// Advisory text
        message: String,
    },
    /// Terminal event carrying the full result
    Result {
        /// The pipeline result
        result: Box<PipelineResult>,
    },
}

/// Fire-and-forget sender wrapper used by the orchestrator.
#[derive(Clone)]
pub struct EventSink {
    tx: Option<mpsc::Sender<PipelineEvent>>,
}

impl EventSink {
    /// Sink over an optional channel.
    pub fn new(tx: Option<mpsc::Sender<PipelineEvent>>) -> Self {
        Self { tx }
    }

    /// A sink that drops everything (plain `execute`).
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Emit one event. Receiver loss is silently tolerated.
    pub async fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event).await;
        }
    }
}
