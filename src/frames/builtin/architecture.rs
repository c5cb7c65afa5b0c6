//! Built-in architecture frame: repository-level structure checks.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::core::errors::Result;
use crate::core::findings::{FrameCategory, FramePriority, FrameScope, Severity};
use crate::core::normalize::RawFinding;
use crate::frames::{Applicability, Frame, FrameContext, FrameMetadata, FrameOutput};

/// Files longer than this are repository-level split candidates.
const HUGE_FILE_LINES: usize = 1200;

/// Directories holding more than this many files are flagged.
const MAX_FILES_PER_DIR: usize = 40;

/// Duplicate basenames beyond this count suggest naming drift.
const MAX_DUPLICATE_BASENAMES: usize = 4;

/// Repository-scope frame reporting structural hot spots.
pub struct ArchitectureFrame {
    metadata: FrameMetadata,
}

impl ArchitectureFrame {
    /// Construct with canonical metadata.
    pub fn new() -> Self {
        let metadata = FrameMetadata::new(
            "architecture_review",
            "Architecture review",
            "Repository-level checks: oversized files, crowded directories, duplicate names",
            FrameCategory::Architectural,
            FrameScope::Repository,
        )
        .with_priority(FramePriority::Medium)
        .with_applicability(Applicability::any());

        Self { metadata }
    }
}

impl Default for ArchitectureFrame {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Frame for ArchitectureFrame {
    fn metadata(&self) -> &FrameMetadata {
        &self.metadata
    }

    async fn execute(&self, ctx: &FrameContext) -> Result<FrameOutput> {
        let mut findings = Vec::new();
        let mut per_dir: HashMap<String, usize> = HashMap::new();
        let mut per_basename: HashMap<String, usize> = HashMap::new();

        for file in ctx.code_files.iter() {
            if file.is_binary {
                continue;
            }

            if let Some(lines) = file.line_count {
                if lines > HUGE_FILE_LINES {
                    findings.push(
                        RawFinding::new(format!(
                            "File has {lines} lines; a structural split is overdue",
                        ))
                        .with_severity(Severity::Medium)
                        .with_location(file.location(1))
                        .with_suggestion("Split along cohesive responsibilities"),
                    );
                }
            }

            let (dir, base) = match file.path.rsplit_once('/') {
                Some((dir, base)) => (dir.to_string(), base.to_string()),
                None => (String::new(), file.path.clone()),
            };
            *per_dir.entry(dir).or_insert(0) += 1;
            *per_basename.entry(base).or_insert(0) += 1;
        }

        let mut crowded: Vec<(&String, &usize)> = per_dir
            .iter()
            .filter(|(_, &count)| count > MAX_FILES_PER_DIR)
            .collect();
        crowded.sort();
        for (dir, count) in crowded {
            let label = if dir.is_empty() { "<root>" } else { dir };
            findings.push(
                RawFinding::new(format!(
                    "Directory '{label}' holds {count} files; consider subpackages",
                ))
                .with_severity(Severity::Low),
            );
        }

        let mut duplicated: Vec<(&String, &usize)> = per_basename
            .iter()
            .filter(|(_, &count)| count > MAX_DUPLICATE_BASENAMES)
            .collect();
        duplicated.sort();
        for (base, count) in duplicated {
            findings.push(
                RawFinding::new(format!(
                    "Basename '{base}' repeats {count} times across the repository",
                ))
                .with_severity(Severity::Info),
            );
        }

        Ok(FrameOutput::warning_if_findings(findings))
    }
}
