//! # Warden-RS: Validation Pipeline Core
//!
//! A Rust implementation of the warden static-analysis validation
//! pipeline. Given a set of source files, the core discovers and
//! classifies them, runs a configurable set of validation frames under a
//! phased orchestrator, deduplicates and ranks their findings, and
//! produces a structured result suitable for CI annotation, SARIF export,
//! and baseline diffing.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        API Layer                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Core Engine   │   Frames    │  LLM Helper │  I/O & Select  │
//! │                │             │             │                │
//! │ • Orchestrator │ • Registry  │ • Sanitize  │ • FileSystem   │
//! │ • Runner       │ • Builtins  │ • Budget    │ • VCS diff     │
//! │ • Aggregator   │ • Manifests │ • Verify    │ • Baselines    │
//! │ • Normalizer   │             │             │                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use warden_rs::{CapabilityBundle, PipelineConfig, WardenEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = WardenEngine::new(PipelineConfig::default(), CapabilityBundle::new())?;
//!     let result = engine.analyze_root("./src".as_ref()).await?;
//!
//!     println!(
//!         "scan {} finished: {} findings",
//!         result.scan_id,
//!         result.findings.len()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Guarantees
//!
//! - The public surface never raises past construction: callers always
//!   receive a `PipelineResult`, with frame failures captured as `error`
//!   results and anomalies as advisories.
//! - A `scan_id` is bound to the logging span for the whole execution and
//!   released on every exit path.
//! - Repository-scope frames execute at most once per pipeline instance.

#![warn(missing_docs)]
#![warn(unsafe_code)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::too_many_arguments)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

// Core pipeline modules
pub mod core {
    //! Core pipeline algorithms and data structures.

    pub mod aggregate;
    pub mod config;
    pub mod correlation;
    pub mod errors;
    pub mod files;
    pub mod findings;
    pub mod normalize;
    pub mod pipeline;
}

// Validation frames: traits, registry, builtins, manifests
pub mod frames;

// LLM verification helper
pub mod llm;

// Collaborator capabilities and default implementations
pub mod io;

// Incremental file selection
pub mod select;

// Public API and engine interface
pub mod api {
    //! High-level API and engine interface.

    pub mod engine;
    pub mod results;
}

// Re-export primary types for convenience
pub use crate::api::engine::{EngineStatus, WardenEngine};
pub use crate::api::results::{PipelineMetrics, PipelineResult, PipelineStatus};
pub use crate::core::config::{ExecutionStrategy, PhaseId, PipelineConfig};
pub use crate::core::errors::{Result, ResultExt, WardenError};
pub use crate::core::files::CodeFile;
pub use crate::core::findings::{Finding, FrameResult, Severity};
pub use crate::core::pipeline::{CapabilityBundle, PipelineEvent, ValidationPipeline};
pub use crate::frames::{Frame, FrameContext, FrameMetadata, FrameOutput, FrameRegistry};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
