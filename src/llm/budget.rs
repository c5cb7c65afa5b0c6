//! Token budgeting for LLM content slices.
//!
//! Before every call the helper bounds the file content it sends: when the
//! content exceeds the budget, the first 50 and last 20 lines are kept and
//! the middle is compressed into an elision marker. That preserves imports
//! and module tails, which carry the locality most rule categories need.

use crate::core::normalize::truncate_to_bytes;

/// Lines kept from the top of an over-budget file.
const HEAD_LINES: usize = 50;

/// Lines kept from the bottom of an over-budget file.
const TAIL_LINES: usize = 20;

/// Rough bytes-per-token ratio used for estimation.
const BYTES_PER_TOKEN: usize = 4;

/// Token budget applied to every outbound content slice.
#[derive(Debug, Clone, Copy)]
pub struct TokenBudget {
    max_tokens: usize,
}

impl TokenBudget {
    /// Budget of `max_tokens` tokens.
    pub fn new(max_tokens: usize) -> Self {
        Self { max_tokens }
    }

    /// Configured token ceiling.
    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Estimate the token count of a text.
    pub fn estimate_tokens(text: &str) -> usize {
        text.len() / BYTES_PER_TOKEN
    }

    /// True when the text fits the budget as-is.
    pub fn fits(&self, text: &str) -> bool {
        Self::estimate_tokens(text) <= self.max_tokens
    }

    /// Bound `content` to the budget, keeping head and tail lines and
    /// compressing the middle.
    pub fn bound_content(&self, content: &str) -> String {
        if self.fits(content) {
            return content.to_string();
        }

        let lines: Vec<&str> = content.lines().collect();
        let bounded = if lines.len() > HEAD_LINES + TAIL_LINES {
            let head = lines[..HEAD_LINES].join("\n");
            let tail = lines[lines.len() - TAIL_LINES..].join("\n");
            let omitted = lines.len() - HEAD_LINES - TAIL_LINES;
            format!("{head}\n... [{omitted} lines omitted] ...\n{tail}")
        } else {
            content.to_string()
        };

        if self.fits(&bounded) {
            return bounded;
        }

        // Still over budget (very long lines): hard cut on a char boundary.
        truncate_to_bytes(&bounded, self.max_tokens * BYTES_PER_TOKEN)
    }
}
