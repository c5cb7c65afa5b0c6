//! Validation pipeline: phased orchestration of frames over a file set.
//!
//! ## Execution model
//!
//! Six sequential phases (pre-analysis, analysis, classification,
//! validation, verification, fortification, cleaning — with verification
//! as phase 3.5) run under a wall-clock budget. Frame execution inside the
//! validation phase fans out across (frame, file) pairs up to a bounded
//! worker count; repository-scope frames run sequentially alongside and
//! are memoized by the repository cache. Every frame anomaly collapses
//! into an `error` frame result plus advisories; only cancellation and
//! timeout terminate the run itself.

mod cache;
mod context;
mod events;
mod orchestrator;
mod phases;
mod runner;

pub use cache::RepositoryCache;
pub use context::{CapabilityBundle, FileAnalysis, PipelineContext, PipelineState};
pub use events::{EventSink, PipelineEvent, EVENT_CHANNEL_CAPACITY};
pub use orchestrator::ValidationPipeline;
pub use runner::{FrameRunner, RunOutcome};
