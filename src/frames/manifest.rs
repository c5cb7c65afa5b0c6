//! Loose frame definitions loaded from YAML manifests.
//!
//! A manifest declares frame metadata plus a list of literal patterns with
//! per-pattern severity and message. Patterns are compiled once into an
//! Aho-Corasick automaton at load time; matches resolve to `path:line`
//! locations.

use std::path::Path;
use std::sync::Arc;

use aho_corasick::AhoCorasick;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::errors::{Result, WardenError};
use crate::core::files::CodeFile;
use crate::core::findings::{FrameCategory, FramePriority, FrameScope};
use crate::core::normalize::RawFinding;

use super::{Applicability, Frame, FrameContext, FrameMetadata, FrameOutput};

/// One declarative pattern rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRule {
    /// Literal substring to match
    pub pattern: String,

    /// Severity label for findings from this rule
    pub severity: String,

    /// Finding message
    pub message: String,

    /// Optional remediation suggestion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// On-disk frame definition.
#[derive(Debug, Clone, Deserialize)]
pub struct FrameManifest {
    /// Frame identifier (normalized to snake_case at load)
    pub id: String,

    /// Display name
    pub name: String,

    /// What the frame checks
    #[serde(default)]
    pub description: String,

    /// Category label
    #[serde(default)]
    pub category: FrameCategory,

    /// Priority label
    #[serde(default)]
    pub priority: FramePriority,

    /// Scope label
    #[serde(default)]
    pub scope: FrameScope,

    /// Failure forces pipeline `failed`
    #[serde(default)]
    pub is_blocker: bool,

    /// Frame version
    #[serde(default = "FrameManifest::default_version")]
    pub version: String,

    /// Language tags; empty plus `always: false` means never applicable
    #[serde(default)]
    pub languages: Vec<String>,

    /// Frame applies to every language
    #[serde(default)]
    pub always: bool,

    /// Minimum compatible core version
    #[serde(default)]
    pub min_core_version: Option<String>,

    /// Maximum compatible core version
    #[serde(default)]
    pub max_core_version: Option<String>,

    /// Pattern rules; at least one is required
    #[serde(default)]
    pub patterns: Vec<PatternRule>,
}

impl FrameManifest {
    fn default_version() -> String {
        "1.0.0".to_string()
    }
}

/// A frame compiled from a manifest.
pub struct PatternFrame {
    metadata: FrameMetadata,
    automaton: AhoCorasick,
    rules: Vec<PatternRule>,
}

impl PatternFrame {
    /// Compile a manifest into an executable frame.
    pub fn from_manifest(manifest: FrameManifest) -> Result<Self> {
        if manifest.id.trim().is_empty() {
            return Err(WardenError::frame_load("<unnamed>", "manifest is missing 'id'"));
        }
        if manifest.name.trim().is_empty() {
            return Err(WardenError::frame_load(&manifest.id, "manifest is missing 'name'"));
        }
        if manifest.patterns.is_empty() {
            return Err(WardenError::frame_load(
                &manifest.id,
                "manifest declares no patterns",
            ));
        }
        for rule in &manifest.patterns {
            if rule.pattern.is_empty() {
                return Err(WardenError::frame_load(&manifest.id, "empty pattern"));
            }
        }

        let automaton = AhoCorasick::new(manifest.patterns.iter().map(|r| r.pattern.as_bytes()))
            .map_err(|e| {
                WardenError::frame_load(&manifest.id, format!("pattern compilation failed: {e}"))
            })?;

        let applicability = if manifest.always || manifest.languages.is_empty() {
            Applicability::any()
        } else {
            Applicability::languages(manifest.languages.clone())
        };

        let metadata = FrameMetadata {
            id: super::canonical_frame_id(&manifest.id),
            name: manifest.name,
            description: manifest.description,
            category: manifest.category,
            priority: manifest.priority,
            scope: manifest.scope,
            is_blocker: manifest.is_blocker,
            version: manifest.version,
            applicability,
            min_core_version: manifest.min_core_version,
            max_core_version: manifest.max_core_version,
        };

        Ok(Self {
            metadata,
            automaton,
            rules: manifest.patterns,
        })
    }

    /// Scan one file and emit a raw finding per match.
    fn scan_file(&self, file: &CodeFile, findings: &mut Vec<RawFinding>) {
        for mat in self.automaton.find_iter(file.content.as_bytes()) {
            let rule = &self.rules[mat.pattern().as_usize()];
            let line = line_of_offset(&file.content, mat.start());
            let mut raw = RawFinding::new(rule.message.clone())
                .with_location(file.location(line))
                .with_snippet(snippet_at(&file.content, line));
            raw.severity = Some(rule.severity.clone());
            raw.suggestion = rule.suggestion.clone();
            raw.detail = Some(format!("pattern: {}", rule.pattern));
            findings.push(raw);
        }
    }
}

#[async_trait]
impl Frame for PatternFrame {
    fn metadata(&self) -> &FrameMetadata {
        &self.metadata
    }

    async fn execute(&self, ctx: &FrameContext) -> Result<FrameOutput> {
        let mut findings = Vec::new();

        match self.metadata.scope {
            FrameScope::File => {
                let file = ctx.file().ok_or_else(|| {
                    WardenError::frame_execution(&self.metadata.id, "missing code_file in context")
                })?;
                self.scan_file(file, &mut findings);
            }
            FrameScope::Repository => {
                for file in ctx.code_files.iter() {
                    if ctx.is_cancelled() {
                        return Err(WardenError::cancelled(self.metadata.id.clone()));
                    }
                    if file.is_analyzable() && self.metadata.applicability.matches(&file.language) {
                        self.scan_file(file, &mut findings);
                    }
                }
            }
        }

        Ok(if self.metadata.is_blocker {
            FrameOutput::failed_if_findings(findings)
        } else {
            FrameOutput::warning_if_findings(findings)
        })
    }
}

/// 1-based line number containing the byte offset.
pub(crate) fn line_of_offset(content: &str, offset: usize) -> usize {
    content.as_bytes()[..offset.min(content.len())]
        .iter()
        .filter(|&&b| b == b'\n')
        .count()
        + 1
}

/// The (trimmed) source line at a 1-based line number.
pub(crate) fn snippet_at(content: &str, line: usize) -> String {
    content
        .lines()
        .nth(line.saturating_sub(1))
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Load every `*.yml`/`*.yaml` manifest in a directory.
///
/// Unreadable or invalid manifests are logged at warning level and
/// reported back as advisories; they never abort discovery.
pub fn load_manifest_dir(dir: &Path) -> (Vec<Arc<dyn Frame>>, Vec<String>) {
    let mut frames: Vec<Arc<dyn Frame>> = Vec::new();
    let mut advisories = Vec::new();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("cannot read frame directory {}: {e}", dir.display());
            advisories.push(format!("frame directory unreadable: {}", dir.display()));
            return (frames, advisories);
        }
    };

    let mut paths: Vec<_> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yml") | Some("yaml")
            )
        })
        .collect();
    paths.sort();

    for path in paths {
        match load_manifest_file(&path) {
            Ok(frame) => frames.push(frame),
            Err(e) => {
                warn!("skipping invalid frame manifest {}: {e}", path.display());
                advisories.push(format!("invalid frame manifest {}: {e}", path.display()));
            }
        }
    }

    (frames, advisories)
}

fn load_manifest_file(path: &Path) -> Result<Arc<dyn Frame>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| WardenError::io(format!("failed to read {}", path.display()), e))?;
    let manifest: FrameManifest = serde_yaml::from_str(&raw)?;
    Ok(Arc::new(PatternFrame::from_manifest(manifest)?))
}
