//! AST provider capability.
//!
//! Concrete parser plugins live outside the core. Phase 1 uses this
//! capability, when present, to attach an AST summary to each file's
//! analysis record; absence degrades to line-based metrics only.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::Result;

/// Shallow structural summary of one parsed file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AstSummary {
    /// Total node count
    pub node_count: usize,

    /// Number of function-like definitions
    pub function_count: usize,

    /// Maximum nesting depth observed
    pub max_depth: usize,
}

impl AstSummary {
    /// Compact single-line rendering stored on analysis records.
    pub fn render(&self) -> String {
        format!(
            "nodes={} functions={} depth={}",
            self.node_count, self.function_count, self.max_depth
        )
    }
}

/// Capability trait for AST parser plugins.
#[async_trait]
pub trait AstProvider: Send + Sync {
    /// Parse `content` as `language` and summarize its structure.
    async fn parse(&self, content: &str, language: &str) -> Result<AstSummary>;
}
