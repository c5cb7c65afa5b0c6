//! Finding normalization — the single ingress point for `Finding`
//! construction.
//!
//! Frames hand back [`RawFinding`] records (or equivalent JSON maps);
//! everything downstream — aggregation, persistence, reporting — consumes
//! only normalized [`Finding`]s produced here.

use serde::{Deserialize, Serialize};

use crate::core::findings::{Finding, Severity, UNKNOWN_LOCATION};

/// Maximum message length after normalization (2 KiB).
pub const MAX_MESSAGE_BYTES: usize = 2048;

/// Maximum code-snippet length after normalization (1 KiB).
pub const MAX_SNIPPET_BYTES: usize = 1024;

/// Per-frame findings cap; excess is dropped with an advisory.
pub const MAX_FINDINGS_PER_FRAME: usize = 1000;

/// Unvalidated finding as produced inside a frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawFinding {
    /// Optional frame-supplied id; assigned sequentially when absent
    #[serde(default)]
    pub id: Option<String>,

    /// Textual severity label, coerced case-insensitively
    #[serde(default)]
    pub severity: Option<String>,

    /// Issue description
    #[serde(default)]
    pub message: String,

    /// `path:line[:col]`; empty becomes `"unknown:0"`
    #[serde(default)]
    pub location: Option<String>,

    /// Optional offending snippet
    #[serde(default)]
    pub code_snippet: Option<String>,

    /// Optional remediation suggestion
    #[serde(default)]
    pub suggestion: Option<String>,

    /// Optional free-form detail
    #[serde(default)]
    pub detail: Option<String>,
}

impl RawFinding {
    /// Start a raw finding with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Set the severity label.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity.as_str().to_string());
        self
    }

    /// Set the location string.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the code snippet.
    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.code_snippet = Some(snippet.into());
        self
    }

    /// Set the remediation suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Set the detail field.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Stateful normalizer for one frame invocation's findings.
///
/// Keeps the sequential id counter and collects advisories for anything
/// it had to coerce.
pub struct FindingNormalizer {
    frame_id: String,
    is_blocker: bool,
    counter: usize,
    advisories: Vec<String>,
}

impl FindingNormalizer {
    /// Create a normalizer for the given frame.
    pub fn new(frame_id: impl Into<String>, is_blocker: bool) -> Self {
        Self {
            frame_id: frame_id.into(),
            is_blocker,
            counter: 0,
            advisories: Vec::new(),
        }
    }

    /// Normalize a full batch, enforcing the per-frame cap.
    pub fn normalize_all(&mut self, raws: Vec<RawFinding>) -> Vec<Finding> {
        let total = raws.len();
        if total > MAX_FINDINGS_PER_FRAME {
            self.advisories.push(format!(
                "findings_truncated: frame '{}' reported {} findings, capped at {}",
                self.frame_id, total, MAX_FINDINGS_PER_FRAME
            ));
        }

        raws.into_iter()
            .take(MAX_FINDINGS_PER_FRAME)
            .map(|raw| self.normalize(raw))
            .collect()
    }

    /// Normalize one raw finding into a canonical [`Finding`].
    pub fn normalize(&mut self, raw: RawFinding) -> Finding {
        let severity = match raw.severity.as_deref() {
            Some(label) => match Severity::parse(label) {
                Some(severity) => severity,
                None => {
                    self.advisories.push(format!(
                        "unknown severity '{}' from frame '{}' coerced to low",
                        label, self.frame_id
                    ));
                    Severity::Low
                }
            },
            None => {
                self.advisories.push(format!(
                    "missing severity from frame '{}' coerced to low",
                    self.frame_id
                ));
                Severity::Low
            }
        };

        let location = raw
            .location
            .map(|loc| loc.trim().to_string())
            .filter(|loc| !loc.is_empty())
            .unwrap_or_else(|| UNKNOWN_LOCATION.to_string());

        let id = raw.id.filter(|id| !id.trim().is_empty()).unwrap_or_else(|| {
            let id = format!("{}:{}", self.frame_id, self.counter);
            id
        });
        self.counter += 1;

        Finding {
            id,
            frame_id: self.frame_id.clone(),
            severity,
            message: truncate_to_bytes(&raw.message, MAX_MESSAGE_BYTES),
            location,
            code_snippet: raw
                .code_snippet
                .map(|snippet| truncate_to_bytes(&snippet, MAX_SNIPPET_BYTES)),
            suggestion: raw.suggestion,
            detail: raw.detail,
            is_blocker_source: self.is_blocker,
        }
    }

    /// Normalize a JSON map shaped like a finding; returns `None` (with an
    /// advisory) for values that are not objects.
    pub fn normalize_value(&mut self, value: serde_json::Value) -> Option<Finding> {
        if !value.is_object() {
            self.advisories.push(format!(
                "non-object finding from frame '{}' skipped",
                self.frame_id
            ));
            return None;
        }
        match serde_json::from_value::<RawFinding>(value) {
            Ok(raw) => Some(self.normalize(raw)),
            Err(err) => {
                self.advisories.push(format!(
                    "malformed finding from frame '{}' skipped: {err}",
                    self.frame_id
                ));
                None
            }
        }
    }

    /// Advisories collected while normalizing; drained by the runner.
    pub fn take_advisories(&mut self) -> Vec<String> {
        std::mem::take(&mut self.advisories)
    }
}

/// Truncate a string to at most `max_bytes` bytes on a UTF-8 character
/// boundary.
pub fn truncate_to_bytes(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// Truncate a string to at most `max_chars` characters.
pub fn truncate_to_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
