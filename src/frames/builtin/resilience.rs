//! Built-in resilience frame: error-swallowing and fault-handling checks.

use aho_corasick::AhoCorasick;
use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::core::errors::{Result, WardenError};
use crate::core::findings::{FrameCategory, FramePriority, FrameScope, Severity};
use crate::core::normalize::RawFinding;
use crate::frames::manifest::{line_of_offset, snippet_at};
use crate::frames::{Applicability, Frame, FrameContext, FrameMetadata, FrameOutput};

struct ResilienceRule {
    pattern: &'static str,
    severity: Severity,
    message: &'static str,
}

const RULES: &[ResilienceRule] = &[
    ResilienceRule {
        pattern: "except:",
        severity: Severity::Medium,
        message: "Bare except swallows every error including KeyboardInterrupt",
    },
    ResilienceRule {
        pattern: "except Exception: pass",
        severity: Severity::High,
        message: "Exception caught and silently discarded",
    },
    ResilienceRule {
        pattern: "catch {}",
        severity: Severity::High,
        message: "Empty catch block silently discards the error",
    },
    ResilienceRule {
        pattern: "catch (e) {}",
        severity: Severity::High,
        message: "Empty catch block silently discards the error",
    },
    ResilienceRule {
        pattern: ".unwrap()",
        severity: Severity::Low,
        message: "unwrap() panics on the error path",
    },
    ResilienceRule {
        pattern: "panic!(",
        severity: Severity::Low,
        message: "Explicit panic in library code",
    },
    ResilienceRule {
        pattern: "time.sleep(",
        severity: Severity::Info,
        message: "Blocking sleep; prefer retry/backoff primitives",
    },
];

static MATCHER: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::new(RULES.iter().map(|r| r.pattern)).expect("resilience patterns are valid")
});

/// Non-blocker frame reporting fault-handling weaknesses.
pub struct ResilienceFrame {
    metadata: FrameMetadata,
}

impl ResilienceFrame {
    /// Construct with canonical metadata.
    pub fn new() -> Self {
        let metadata = FrameMetadata::new(
            "resilience_checks",
            "Resilience checks",
            "Flags swallowed errors, bare excepts, and panic-prone patterns",
            FrameCategory::Resilience,
            FrameScope::File,
        )
        .with_priority(FramePriority::High)
        .with_applicability(Applicability::any());

        Self { metadata }
    }
}

impl Default for ResilienceFrame {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Frame for ResilienceFrame {
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

        let findings: Vec<RawFinding> = MATCHER
            .find_iter(file.content.as_bytes())
            .map(|mat| {
                let rule = &RULES[mat.pattern().as_usize()];
                let line = line_of_offset(&file.content, mat.start());
                RawFinding::new(rule.message)
                    .with_severity(rule.severity)
                    .with_location(file.location(line))
                    .with_snippet(snippet_at(&file.content, line))
            })
            .collect();

        Ok(FrameOutput::warning_if_findings(findings))
    }
}
