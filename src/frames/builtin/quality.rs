//! Built-in quality frame: maintainability heuristics over raw source.

use async_trait::async_trait;

use crate::core::errors::{Result, WardenError};
use crate::core::findings::{FrameCategory, FramePriority, FrameScope, Severity};
use crate::core::normalize::RawFinding;
use crate::frames::{Applicability, Frame, FrameContext, FrameMetadata, FrameOutput};

/// Lines longer than this are flagged.
const MAX_LINE_LENGTH: usize = 160;

/// Files longer than this are flagged for splitting.
const MAX_FILE_LINES: usize = 800;

/// Indentation deeper than this suggests over-nesting.
const MAX_INDENT_SPACES: usize = 24;

/// TODO density above this ratio (markers per 100 lines) is flagged.
const TODO_DENSITY_PER_100: f64 = 5.0;

/// Non-blocker frame reporting maintainability heuristics.
pub struct QualityFrame {
    metadata: FrameMetadata,
}

impl QualityFrame {
    /// Construct with canonical metadata.
    pub fn new() -> Self {
        let metadata = FrameMetadata::new(
            "quality_heuristics",
            "Quality heuristics",
            "Line length, file size, nesting depth, and TODO density checks",
            FrameCategory::Quality,
            FrameScope::File,
        )
        .with_priority(FramePriority::Medium)
        .with_applicability(Applicability::any());

        Self { metadata }
    }
}

impl Default for QualityFrame {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Frame for QualityFrame {
    fn metadata(&self) -> &FrameMetadata {
        &self.metadata
    }

    async fn execute(&self, ctx: &FrameContext) -> Result<FrameOutput> {
        let file = ctx.file().ok_or_else(|| {
            WardenError::frame_execution(&self.metadata.id, "missing code_file in context")
        })?;
        if !file.is_analyzable() {
            return Ok(FrameOutput::skipped());
        }

        let mut findings = Vec::new();
        let mut todo_count = 0usize;
        let mut line_count = 0usize;

        for (idx, line) in file.content.lines().enumerate() {
            line_count += 1;
            let lineno = idx + 1;

            if line.chars().count() > MAX_LINE_LENGTH {
                findings.push(
                    RawFinding::new(format!(
                        "Line exceeds {MAX_LINE_LENGTH} characters",
                    ))
                    .with_severity(Severity::Low)
                    .with_location(file.location(lineno)),
                );
            }

            let indent = line.len() - line.trim_start_matches(' ').len();
            if indent > MAX_INDENT_SPACES && !line.trim().is_empty() {
                findings.push(
                    RawFinding::new("Deeply nested code; consider extracting a function")
                        .with_severity(Severity::Medium)
                        .with_location(file.location(lineno)),
                );
            }

            if line.contains("TODO") || line.contains("FIXME") || line.contains("XXX") {
                todo_count += 1;
            }
        }

        if line_count > MAX_FILE_LINES {
            findings.push(
                RawFinding::new(format!(
                    "File has {line_count} lines; consider splitting it",
                ))
                .with_severity(Severity::Medium)
                .with_location(file.location(1))
                .with_suggestion("Split the file along cohesive responsibilities"),
            );
        }

        if line_count > 0 {
            let density = (todo_count as f64) * 100.0 / (line_count as f64);
            if density > TODO_DENSITY_PER_100 && todo_count >= 3 {
                findings.push(
                    RawFinding::new(format!(
                        "High TODO/FIXME density: {todo_count} markers in {line_count} lines",
                    ))
                    .with_severity(Severity::Low)
                    .with_location(file.location(1)),
                );
            }
        }

        Ok(FrameOutput::warning_if_findings(findings))
    }
}
