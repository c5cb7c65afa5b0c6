//! Report emitter capability.
//!
//! Concrete SARIF/JUnit serializers live with the front-ends; the core
//! defines the trait and ships the plain JSON emitter used by tests and
//! simple embedders.

use serde::{Deserialize, Serialize};

use crate::api::results::PipelineResult;
use crate::core::errors::{Result, WardenError};

/// Supported report formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Plain JSON (the result's canonical serialization)
    Json,
    /// SARIF 2.1.0
    Sarif,
    /// JUnit XML
    Junit,
}

impl std::str::FromStr for ReportFormat {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ReportFormat::Json),
            "sarif" => Ok(ReportFormat::Sarif),
            "junit" => Ok(ReportFormat::Junit),
            other => Err(WardenError::validation(format!(
                "unknown report format '{other}'"
            ))),
        }
    }
}

/// Capability trait for report serialization.
pub trait ReportEmitter: Send + Sync {
    /// Serialize a result into the requested format.
    fn emit(&self, result: &PipelineResult, format: ReportFormat) -> Result<Vec<u8>>;
}

/// Emitter for the canonical JSON layout.
#[derive(Debug, Default, Clone)]
pub struct JsonReportEmitter;

impl ReportEmitter for JsonReportEmitter {
    fn emit(&self, result: &PipelineResult, format: ReportFormat) -> Result<Vec<u8>> {
        match format {
            ReportFormat::Json => Ok(serde_json::to_vec_pretty(result)?),
            other => Err(WardenError::capability_unavailable(
                "report_emitter",
                format!("{other:?} emission is provided by the front-end"),
            )),
        }
    }
}
