//! Phase implementations for the six-phase orchestrator.
//!
//! The validation phase (frame fan-out) lives in the orchestrator itself;
//! everything else — pre-analysis, analysis, classification, verification,
//! fortification, cleaning — is implemented here as functions over the
//! shared pipeline context.

use std::collections::HashMap;
use std::sync::Arc;

use aho_corasick::AhoCorasick;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::core::files::CodeFile;
use crate::core::findings::{CodeCharacteristics, Finding, Severity};
use crate::io::ast::AstProvider;
use crate::llm::VerificationHelper;

use super::context::{FileAnalysis, PipelineContext};

/// Phase 0 — file metadata: line counts, sizes, binary tallies.
///
/// Hashing and binary detection already happened at `CodeFile`
/// construction; this phase materializes the per-file analysis records
/// later phases extend.
pub fn run_pre_analysis(ctx: &mut PipelineContext) {
    let files = ctx.files.clone();
    for file in files.iter() {
        if !file.is_analyzable() {
            continue;
        }
        let line_count = file
            .line_count
            .unwrap_or_else(|| file.content.lines().count());
        let avg_line_length = if line_count == 0 {
            0.0
        } else {
            file.content.chars().count() as f64 / line_count as f64
        };

        ctx.analysis.insert(
            file.path.clone(),
            FileAnalysis {
                line_count,
                avg_line_length,
                ast: None,
            },
        );
    }

    let binaries = files.iter().filter(|f| f.is_binary).count();
    if binaries > 0 {
        debug!("{binaries} binary files excluded from per-file phases");
    }
}

/// Phase 1 — per-file quality metrics and AST summaries.
///
/// The AST provider is optional; absence is recorded once as an advisory
/// and the phase degrades to the line-based metrics from phase 0.
pub async fn run_analysis(shared: &Mutex<PipelineContext>, ast: Option<Arc<dyn AstProvider>>) {
    let files: Vec<Arc<CodeFile>> = {
        let mut ctx = shared.lock();
        // Phase 0 may have been skipped; make sure the records exist.
        run_pre_analysis(&mut ctx);
        ctx.analyzable_files()
    };

    let Some(ast) = ast else {
        shared
            .lock()
            .advise("ast_provider_unavailable: analysis limited to line metrics");
        return;
    };

    for file in files {
        match ast.parse(&file.content, &file.language).await {
            Ok(summary) => {
                let mut ctx = shared.lock();
                if let Some(record) = ctx.analysis.get_mut(&file.path) {
                    record.ast = Some(summary);
                }
            }
            Err(err) => {
                debug!("AST parse failed for {}: {err}", file.path);
                shared
                    .lock()
                    .advise(format!("ast_parse_failed: {}", file.path));
            }
        }
    }
}

fn trait_matcher(patterns: &[&str]) -> AhoCorasick {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(patterns)
        .expect("classification patterns are valid")
}

static ASYNC_TRAITS: Lazy<AhoCorasick> = Lazy::new(|| {
    trait_matcher(&[
        "async ", "await ", "asyncio", "tokio::", "promise.", "settimeout(", ".then(",
    ])
});

static DATABASE_TRAITS: Lazy<AhoCorasick> = Lazy::new(|| {
    trait_matcher(&[
        "select ", "insert into", "delete from", "sqlalchemy", "cursor.execute", "sqlx::",
        "mongoose.", "prisma.", "create table",
    ])
});

static INPUT_TRAITS: Lazy<AhoCorasick> = Lazy::new(|| {
    trait_matcher(&[
        "input(", "request.", "req.body", "req.query", "sys.argv", "stdin", "getenv", "form[",
    ])
});

static AUTH_TRAITS: Lazy<AhoCorasick> = Lazy::new(|| {
    trait_matcher(&[
        "password", "passwd", "jwt", "oauth", "login", "session", "authenticate", "api_key",
    ])
});

static CRYPTO_TRAITS: Lazy<AhoCorasick> = Lazy::new(|| {
    trait_matcher(&[
        "hashlib", "crypto", "hmac", "bcrypt", "argon2", "sha256", "aes_", "rsa_", "cipher",
    ])
});

/// Phase 2 — compute `CodeCharacteristics` for every analyzable file.
pub fn run_classification(ctx: &mut PipelineContext) {
    let files = ctx.files.clone();
    for file in files.iter() {
        if !file.is_analyzable() {
            continue;
        }

        let content = &file.content;
        let line_count = ctx
            .analysis
            .get(&file.path)
            .map(|a| a.line_count)
            .unwrap_or_else(|| content.lines().count());

        let characteristics = CodeCharacteristics {
            has_async_operations: ASYNC_TRAITS.is_match(content),
            has_database_operations: DATABASE_TRAITS.is_match(content),
            has_user_input: INPUT_TRAITS.is_match(content),
            has_authentication_logic: AUTH_TRAITS.is_match(content),
            has_cryptographic_operations: CRYPTO_TRAITS.is_match(content),
            complexity_score: complexity_score(content, line_count),
        };

        ctx.characteristics.insert(file.path.clone(), characteristics);
    }

    info!(
        "classified {} files ({} security-sensitive)",
        ctx.characteristics.len(),
        ctx.characteristics
            .values()
            .filter(|c| c.is_security_sensitive())
            .count()
    );
}

/// Heuristic 1..=10 complexity score from size and nesting depth.
fn complexity_score(content: &str, line_count: usize) -> u8 {
    let max_indent = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .max()
        .unwrap_or(0);

    let score = 1 + line_count / 150 + max_indent / 8;
    score.clamp(1, 10) as u8
}

/// Phase 3.5 — post-process findings through the LLM helper, dropping
/// likely false positives and tagging uncertain ones.
pub async fn run_verification(shared: &Mutex<PipelineContext>, helper: &VerificationHelper) {
    // Snapshot the findings grouped by file; the lock is never held across
    // an LLM call.
    let (by_path, files_by_path) = {
        let ctx = shared.lock();
        let files_by_path: HashMap<String, Arc<CodeFile>> = ctx
            .files
            .iter()
            .map(|f| (f.path.clone(), Arc::clone(f)))
            .collect();

        let mut by_path: HashMap<String, Vec<Finding>> = HashMap::new();
        for result in &ctx.frame_results {
            for finding in &result.findings {
                if let Some(path) = finding.location_path() {
                    if files_by_path.contains_key(path) {
                        by_path
                            .entry(path.to_string())
                            .or_default()
                            .push(finding.clone());
                    }
                }
            }
        }
        (by_path, files_by_path)
    };

    if by_path.is_empty() {
        return;
    }

    // id -> None (dropped) | Some(replacement).
    let mut rewrites: HashMap<String, Option<Finding>> = HashMap::new();
    let mut advisories = Vec::new();
    let mut dropped_total = 0usize;

    let mut paths: Vec<&String> = by_path.keys().collect();
    paths.sort();
    for path in paths {
        let findings = &by_path[path];
        let file = &files_by_path[path];
        let outcome = helper.verify(findings, file).await;

        advisories.extend(outcome.advisories);
        dropped_total += outcome.dropped;

        let surviving: HashMap<&str, &Finding> =
            outcome.findings.iter().map(|f| (f.id.as_str(), f)).collect();
        for original in findings {
            match surviving.get(original.id.as_str()) {
                Some(survivor) => {
                    rewrites.insert(original.id.clone(), Some((*survivor).clone()));
                }
                None => {
                    rewrites.insert(original.id.clone(), None);
                }
            }
        }
    }

    let mut ctx = shared.lock();
    for result in &mut ctx.frame_results {
        result.findings = result
            .findings
            .drain(..)
            .filter_map(|finding| match rewrites.get(&finding.id) {
                Some(Some(replacement)) => Some(replacement.clone()),
                Some(None) => None,
                None => Some(finding),
            })
            .collect();
        result.issues_found = result.findings.len();
    }
    for advisory in advisories {
        ctx.advise(advisory);
    }
    if dropped_total > 0 {
        ctx.advise(format!(
            "llm_verification: {dropped_total} findings dropped as false positives"
        ));
    }
}

/// Suggestion cap for LLM-generated fixes per run.
const MAX_LLM_SUGGESTIONS: usize = 5;

/// Phase 4 — fill in fix suggestions for findings that lack one.
///
/// With an LLM helper available the most severe findings get generated
/// suggestions (bounded); everything else falls back to a static
/// per-severity recommendation.
pub async fn run_fortification(
    shared: &Mutex<PipelineContext>,
    helper: Option<&VerificationHelper>,
) {
    let candidates: Vec<(String, Finding, Arc<CodeFile>)> = {
        let ctx = shared.lock();
        let files_by_path: HashMap<&str, &Arc<CodeFile>> =
            ctx.files.iter().map(|f| (f.path.as_str(), f)).collect();

        let mut candidates: Vec<(String, Finding, Arc<CodeFile>)> = Vec::new();
        for result in &ctx.frame_results {
            for finding in &result.findings {
                if finding.suggestion.is_some() {
                    continue;
                }
                if let Some(file) = finding.location_path().and_then(|p| files_by_path.get(p)) {
                    candidates.push((finding.id.clone(), finding.clone(), Arc::clone(file)));
                }
            }
        }
        candidates
    };

    let mut generated: HashMap<String, String> = HashMap::new();
    if let Some(helper) = helper {
        let mut severe: Vec<&(String, Finding, Arc<CodeFile>)> = candidates
            .iter()
            .filter(|(_, f, _)| f.severity >= Severity::High)
            .collect();
        severe.sort_by(|a, b| b.1.severity.cmp(&a.1.severity).then(a.0.cmp(&b.0)));

        for (id, finding, file) in severe.into_iter().take(MAX_LLM_SUGGESTIONS) {
            match helper.explain(finding, file).await {
                Ok(suggestion) if !suggestion.is_empty() => {
                    generated.insert(id.clone(), suggestion);
                }
                Ok(_) => {}
                Err(err) => {
                    debug!("suggestion generation failed for '{id}': {err}");
                }
            }
        }
    }

    let mut ctx = shared.lock();
    for result in &mut ctx.frame_results {
        for finding in &mut result.findings {
            if finding.suggestion.is_some() {
                continue;
            }
            finding.suggestion = Some(
                generated
                    .remove(&finding.id)
                    .unwrap_or_else(|| static_suggestion(finding.severity).to_string()),
            );
        }
    }
}

fn static_suggestion(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "Remove or replace the flagged construct before merging",
        Severity::High => "Fix within this change and add a regression test",
        Severity::Medium => "Refactor the flagged code when next touching this file",
        Severity::Low | Severity::Info => "Track as cleanup",
    }
}

/// Complexity score at or above this triggers a cleaning suggestion.
const CLEANING_COMPLEXITY_THRESHOLD: u8 = 8;

/// Phase 5 — repository hygiene suggestions derived from classification.
pub fn run_cleaning(ctx: &mut PipelineContext) {
    let mut flagged: Vec<(String, u8)> = ctx
        .characteristics
        .iter()
        .filter(|(_, c)| c.complexity_score >= CLEANING_COMPLEXITY_THRESHOLD)
        .map(|(path, c)| (path.clone(), c.complexity_score))
        .collect();
    flagged.sort();

    for (path, score) in flagged {
        ctx.advise(format!(
            "cleaning_suggestion: {path} has complexity {score}/10; consider simplifying"
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared_ctx(files: Vec<CodeFile>) -> Mutex<PipelineContext> {
        Mutex::new(PipelineContext::new(
            "cafe0123".to_string(),
            files.into_iter().map(Arc::new).collect(),
        ))
    }

    #[test]
    fn pre_analysis_records_line_metrics() {
        let shared = shared_ctx(vec![
            CodeFile::from_text("a.py", "import os\nos.system('ls')\n"),
            CodeFile::from_bytes("b.bin", &[0u8, 1, 2]),
        ]);
        let mut ctx = shared.lock();
        run_pre_analysis(&mut ctx);

        assert_eq!(ctx.analysis.len(), 1);
        let record = &ctx.analysis["a.py"];
        assert_eq!(record.line_count, 2);
        assert!(record.avg_line_length > 0.0);
    }

    #[tokio::test]
    async fn analysis_without_provider_degrades_with_advisory() {
        let shared = shared_ctx(vec![CodeFile::from_text("a.py", "x = 1\n")]);
        run_analysis(&shared, None).await;

        let ctx = shared.lock();
        assert!(ctx
            .advisories
            .iter()
            .any(|a| a.contains("ast_provider_unavailable")));
        assert!(ctx.analysis["a.py"].ast.is_none());
    }

    #[test]
    fn classification_detects_traits() {
        let shared = shared_ctx(vec![
            CodeFile::from_text(
                "auth.py",
                "import hashlib\nasync def login(password):\n    cursor.execute(q)\n",
            ),
            CodeFile::from_text("plain.py", "def add(a, b):\n    return a + b\n"),
        ]);
        let mut ctx = shared.lock();
        run_classification(&mut ctx);

        let auth = &ctx.characteristics["auth.py"];
        assert!(auth.has_async_operations);
        assert!(auth.has_database_operations);
        assert!(auth.has_authentication_logic);
        assert!(auth.has_cryptographic_operations);
        assert!(auth.is_security_sensitive());

        let plain = &ctx.characteristics["plain.py"];
        assert!(!plain.is_security_sensitive());
        assert_eq!(plain.complexity_score, 1);
    }

    #[test]
    fn complexity_score_is_clamped() {
        assert_eq!(complexity_score("x = 1\n", 1), 1);
        let deep = " ".repeat(200) + "x = 1";
        assert_eq!(complexity_score(&deep, 1), 10);
    }

    #[test]
    fn cleaning_flags_complex_files() {
        let shared = shared_ctx(vec![CodeFile::from_text("gnarly.py", "x = 1\n")]);
        let mut ctx = shared.lock();
        ctx.characteristics.insert(
            "gnarly.py".to_string(),
            CodeCharacteristics {
                complexity_score: 9,
                ..CodeCharacteristics::default()
            },
        );

        run_cleaning(&mut ctx);
        assert!(ctx
            .advisories
            .iter()
            .any(|a| a.contains("cleaning_suggestion: gnarly.py")));
    }

    #[tokio::test]
    async fn fortification_fills_static_suggestions() {
        use crate::core::findings::{FrameResult, FrameStatus};

        let shared = shared_ctx(vec![CodeFile::from_text("a.py", "x = 1\n")]);
        {
            let mut ctx = shared.lock();
            ctx.frame_results.push(FrameResult {
                frame_id: "security_patterns".to_string(),
                frame_name: "Security".to_string(),
                status: FrameStatus::Failed,
                duration_ms: 1,
                issues_found: 1,
                is_blocker: true,
                findings: vec![Finding {
                    id: "security_patterns:0".to_string(),
                    frame_id: "security_patterns".to_string(),
                    severity: Severity::Critical,
                    message: "dangerous".to_string(),
                    location: "a.py:1".to_string(),
                    code_snippet: None,
                    suggestion: None,
                    detail: None,
                    is_blocker_source: true,
                }],
                metadata: Default::default(),
            });
        }

        run_fortification(&shared, None).await;

        let ctx = shared.lock();
        let suggestion = ctx.frame_results[0].findings[0].suggestion.as_deref();
        assert_eq!(
            suggestion,
            Some("Remove or replace the flagged construct before merging")
        );
    }
}
