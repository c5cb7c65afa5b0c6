//! Built-in security frame: dangerous-sink pattern checks.

use aho_corasick::AhoCorasick;
use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::core::errors::{Result, WardenError};
use crate::core::findings::{FrameCategory, FramePriority, FrameScope, Severity};
use crate::core::normalize::RawFinding;
use crate::frames::manifest::{line_of_offset, snippet_at};
use crate::frames::{Applicability, Frame, FrameContext, FrameMetadata, FrameOutput};

struct SinkRule {
    pattern: &'static str,
    severity: Severity,
    message: &'static str,
    suggestion: &'static str,
}

/// Dangerous sinks that warrant a finding wherever they appear.
const SINK_RULES: &[SinkRule] = &[
    SinkRule {
        pattern: "os.system(",
        severity: Severity::Critical,
        message: "Direct shell execution via os.system",
        suggestion: "Use subprocess.run with a list argument and shell disabled",
    },
    SinkRule {
        pattern: "shell=True",
        severity: Severity::High,
        message: "Subprocess invoked with shell=True",
        suggestion: "Pass the command as an argument list without a shell",
    },
    SinkRule {
        pattern: "eval(",
        severity: Severity::Critical,
        message: "Dynamic code evaluation via eval",
        suggestion: "Replace eval with explicit parsing of the expected input",
    },
    SinkRule {
        pattern: "exec(",
        severity: Severity::Critical,
        message: "Dynamic code execution via exec",
        suggestion: "Remove exec; dispatch to named functions instead",
    },
    SinkRule {
        pattern: "pickle.loads(",
        severity: Severity::High,
        message: "Deserialization of untrusted data via pickle",
        suggestion: "Use a schema-validated format such as JSON",
    },
    SinkRule {
        pattern: "yaml.load(",
        severity: Severity::High,
        message: "yaml.load without SafeLoader",
        suggestion: "Use yaml.safe_load",
    },
    SinkRule {
        pattern: "innerHTML",
        severity: Severity::High,
        message: "Direct innerHTML assignment enables DOM XSS",
        suggestion: "Use textContent or a sanitizing template API",
    },
    SinkRule {
        pattern: "child_process.exec(",
        severity: Severity::Critical,
        message: "Shell execution via child_process.exec",
        suggestion: "Use execFile with an argument array",
    },
    SinkRule {
        pattern: "dangerouslySetInnerHTML",
        severity: Severity::High,
        message: "dangerouslySetInnerHTML bypasses React escaping",
        suggestion: "Render the content as text or sanitize it first",
    },
    SinkRule {
        pattern: "Runtime.getRuntime().exec(",
        severity: Severity::Critical,
        message: "Shell execution via Runtime.exec",
        suggestion: "Use ProcessBuilder with an argument list",
    },
];

/// Weaker signals only reported for files classified as security-sensitive.
const SENSITIVE_RULES: &[SinkRule] = &[
    SinkRule {
        pattern: "md5(",
        severity: Severity::Medium,
        message: "MD5 used in a security-sensitive file",
        suggestion: "Use SHA-256 or a dedicated password hash",
    },
    SinkRule {
        pattern: "hashlib.md5",
        severity: Severity::Medium,
        message: "MD5 used in a security-sensitive file",
        suggestion: "Use hashlib.sha256 or a dedicated password hash",
    },
    SinkRule {
        pattern: "random.random(",
        severity: Severity::Medium,
        message: "Non-cryptographic RNG in a security-sensitive file",
        suggestion: "Use the secrets module for tokens and keys",
    },
    SinkRule {
        pattern: "verify=False",
        severity: Severity::High,
        message: "TLS certificate verification disabled",
        suggestion: "Leave certificate verification enabled",
    },
];

static SINK_MATCHER: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::new(SINK_RULES.iter().map(|r| r.pattern)).expect("sink patterns are valid")
});

static SENSITIVE_MATCHER: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::new(SENSITIVE_RULES.iter().map(|r| r.pattern))
        .expect("sensitive patterns are valid")
});

/// Blocker frame flagging dangerous sinks in source files.
pub struct SecurityFrame {
    metadata: FrameMetadata,
}

impl SecurityFrame {
    /// Construct with canonical metadata.
    pub fn new() -> Self {
        let metadata = FrameMetadata::new(
            "security_patterns",
            "Security pattern audit",
            "Flags dangerous sinks: shell execution, dynamic eval, unsafe deserialization, XSS",
            FrameCategory::Security,
            FrameScope::File,
        )
        .with_priority(FramePriority::Critical)
        .with_applicability(Applicability::any())
        .blocker();

        Self { metadata }
    }

    fn scan(rules: &[SinkRule], matcher: &AhoCorasick, ctx: &FrameContext) -> Vec<RawFinding> {
        let file = match ctx.file() {
            Some(file) => file,
            None => return Vec::new(),
        };

        matcher
            .find_iter(file.content.as_bytes())
            .map(|mat| {
                let rule = &rules[mat.pattern().as_usize()];
                let line = line_of_offset(&file.content, mat.start());
                RawFinding::new(rule.message)
                    .with_severity(rule.severity)
                    .with_location(file.location(line))
                    .with_snippet(snippet_at(&file.content, line))
                    .with_suggestion(rule.suggestion)
                    .with_detail(format!("pattern: {}", rule.pattern))
            })
            .collect()
    }
}

impl Default for SecurityFrame {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Frame for SecurityFrame {
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

        let mut findings = Self::scan(SINK_RULES, &SINK_MATCHER, ctx);

        // The weaker signals only fire when classification marked the file
        // as security-sensitive; without characteristics they stay off.
        let sensitive = ctx
            .characteristics
            .map(|c| c.is_security_sensitive())
            .unwrap_or(false);
        if sensitive {
            findings.extend(Self::scan(SENSITIVE_RULES, &SENSITIVE_MATCHER, ctx));
        }

        Ok(FrameOutput::failed_if_findings(findings))
    }
}
