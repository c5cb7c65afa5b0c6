//! Phase orchestrator: the six-phase state machine with partial-failure
//! semantics.
//!
//! One `ValidationPipeline` owns a frame registry view, a repository
//! cache, and a cancellation token. `execute` runs the phase list under a
//! wall-clock budget; every anomaly short of cancellation or timeout is
//! captured into frame results and advisories, and the caller always gets
//! a `PipelineResult` back.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::StreamExt;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument};

use crate::api::results::{
    PhaseStatus, PhaseSummary, PipelineMetrics, PipelineResult, PipelineStatus,
};
use crate::core::aggregate::ResultAggregator;
use crate::core::config::{ExecutionStrategy, PhaseId, PipelineConfig};
use crate::core::correlation::ScanContext;
use crate::core::errors::Result;
use crate::core::files::CodeFile;
use crate::core::findings::{Finding, FrameResult, FrameStatus};
use crate::core::normalize::MAX_FINDINGS_PER_FRAME;
use crate::frames::{Frame, FrameRegistry};
use crate::llm::VerificationHelper;

use super::cache::RepositoryCache;
use super::context::{CapabilityBundle, PipelineContext, PipelineState};
use super::events::{EventSink, PipelineEvent};
use super::phases;
use super::runner::FrameRunner;

/// Grace period for outstanding tasks after timeout or cancellation.
const SETTLE_GRACE: Duration = Duration::from_millis(50);

enum Terminal {
    Ran,
    TimedOut,
    Cancelled,
}

/// The core execution surface front-ends call.
pub struct ValidationPipeline {
    registry: Arc<FrameRegistry>,
    config: PipelineConfig,
    capabilities: CapabilityBundle,
    cache: Arc<RepositoryCache>,
    cancel: CancellationToken,
}

impl ValidationPipeline {
    /// Build a pipeline. The only fatal error path: invalid configuration.
    pub fn new(
        registry: Arc<FrameRegistry>,
        config: PipelineConfig,
        capabilities: CapabilityBundle,
    ) -> Result<Self> {
        config.validate()?;
        let cache = Arc::new(RepositoryCache::new(config.repository_cache_enabled));
        Ok(Self {
            registry,
            config,
            capabilities,
            cache,
            cancel: CancellationToken::new(),
        })
    }

    /// Token callers can trip to cancel in-flight executions.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The active configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Execute the pipeline over a prepared file inventory.
    pub async fn execute(&self, files: Vec<Arc<CodeFile>>) -> Result<PipelineResult> {
        self.run(files, EventSink::disabled()).await
    }

    /// Execute while streaming structured events down a bounded channel.
    /// The final event carries the full result.
    pub async fn execute_stream(
        &self,
        files: Vec<Arc<CodeFile>>,
        tx: mpsc::Sender<PipelineEvent>,
    ) -> Result<PipelineResult> {
        self.run(files, EventSink::new(Some(tx))).await
    }

    async fn run(&self, files: Vec<Arc<CodeFile>>, events: EventSink) -> Result<PipelineResult> {
        let scan = ScanContext::new();
        let span = scan.span();
        let scan_id = scan.scan_id().to_string();

        // The span carries scan_id across every await point; dropping the
        // instrumented future unbinds it on all exit paths.
        self.run_inner(scan_id, files, events).instrument(span).await
    }

    async fn run_inner(
        &self,
        scan_id: String,
        files: Vec<Arc<CodeFile>>,
        events: EventSink,
    ) -> Result<PipelineResult> {
        info!("pipeline starting: {} files", files.len());
        let shared = Arc::new(Mutex::new(PipelineContext::new(scan_id, files)));

        if shared.lock().files.is_empty() {
            shared.lock().advise("no files to analyze");
        }

        let frame_token = self.cancel.child_token();
        let budget = Duration::from_millis(self.config.pipeline_timeout_ms);

        let terminal = {
            let phases_fut = self.run_phases(&shared, &frame_token, &events);
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Terminal::Cancelled,
                outcome = tokio::time::timeout(budget, phases_fut) => match outcome {
                    Ok(()) => Terminal::Ran,
                    Err(_) => Terminal::TimedOut,
                },
            }
        };

        match &terminal {
            Terminal::Ran => {}
            Terminal::TimedOut => {
                warn!(
                    "pipeline budget of {} ms exhausted",
                    self.config.pipeline_timeout_ms
                );
                frame_token.cancel();
                shared.lock().advise("pipeline_timeout");
                tokio::time::sleep(SETTLE_GRACE).await;
            }
            Terminal::Cancelled => {
                warn!("pipeline cancelled by caller");
                frame_token.cancel();
                shared.lock().advise("pipeline_cancelled");
                tokio::time::sleep(SETTLE_GRACE).await;
            }
        }

        let result = self.finish(&shared, terminal);
        info!(
            "pipeline finished: status={} findings={} advisories={}",
            result.status.as_str(),
            result.findings.len(),
            result.advisories.len()
        );

        events
            .emit(PipelineEvent::Result {
                result: Box::new(result.clone()),
            })
            .await;

        Ok(result)
    }

    async fn run_phases(
        &self,
        shared: &Arc<Mutex<PipelineContext>>,
        token: &CancellationToken,
        events: &EventSink,
    ) {
        for phase in PhaseId::ORDER {
            if token.is_cancelled() {
                break;
            }

            if !self.should_run(phase, shared) {
                shared.lock().phases.push(PhaseSummary::skipped(phase));
                continue;
            }

            events.emit(PipelineEvent::PhaseStarted { phase }).await;
            shared.lock().transition(PipelineState::Running(phase));
            let started = Instant::now();

            let frames_executed = match phase {
                PhaseId::PreAnalysis => {
                    phases::run_pre_analysis(&mut shared.lock());
                    0
                }
                PhaseId::Analysis => {
                    phases::run_analysis(shared, self.capabilities.ast.clone()).await;
                    0
                }
                PhaseId::Classification => {
                    let mut ctx = shared.lock();
                    // Classification needs the line metrics even when the
                    // opt-in pre-analysis phase was disabled.
                    if ctx.analysis.is_empty() {
                        phases::run_pre_analysis(&mut ctx);
                    }
                    phases::run_classification(&mut ctx);
                    0
                }
                PhaseId::Validation => self.run_validation(shared, token, events).await,
                PhaseId::Verification => {
                    let helper = self
                        .capabilities
                        .llm
                        .clone()
                        .map(|llm| VerificationHelper::new(llm, self.config.llm_token_budget));
                    if let Some(helper) = helper {
                        phases::run_verification(shared, &helper).await;
                    }
                    0
                }
                PhaseId::Fortification => {
                    let helper = self
                        .capabilities
                        .llm
                        .clone()
                        .map(|llm| VerificationHelper::new(llm, self.config.llm_token_budget));
                    phases::run_fortification(shared, helper.as_ref()).await;
                    0
                }
                PhaseId::Cleaning => {
                    phases::run_cleaning(&mut shared.lock());
                    0
                }
            };

            let duration_ms = started.elapsed().as_millis() as u64;
            {
                let mut ctx = shared.lock();
                ctx.transition(PipelineState::Awaiting(phase));
                ctx.phases.push(PhaseSummary {
                    phase,
                    status: PhaseStatus::Completed,
                    duration_ms,
                    frames_executed,
                });
            }
            events
                .emit(PipelineEvent::PhaseCompleted {
                    phase,
                    duration_ms,
                    frames_executed,
                })
                .await;
        }
    }

    /// Phase skip logic: classification and validation are mandatory,
    /// verification is gated on the LLM capability and config, the rest
    /// are opt-in.
    fn should_run(&self, phase: PhaseId, shared: &Arc<Mutex<PipelineContext>>) -> bool {
        match phase {
            PhaseId::Verification => {
                if self.config.llm_enabled == Some(false) {
                    return false;
                }
                if self.capabilities.llm.is_none() {
                    if self.config.llm_enabled == Some(true)
                        || self.config.phase_enabled(PhaseId::Verification)
                    {
                        shared
                            .lock()
                            .advise("llm_unavailable: verification phase skipped");
                    }
                    return false;
                }
                true
            }
            other => self.config.phase_enabled(other),
        }
    }

    /// Phase 3 — frame fan-out.
    async fn run_validation(
        &self,
        shared: &Arc<Mutex<PipelineContext>>,
        token: &CancellationToken,
        events: &EventSink,
    ) -> usize {
        if self.registry.is_empty() {
            shared.lock().advise("no frames available");
            return 0;
        }

        let selected = self.selected_frame_ids();
        if selected.is_empty() {
            shared.lock().advise("no frames selected");
            return 0;
        }

        let files = {
            let mut files = shared.lock().analyzable_files();
            files.sort_by(|a, b| a.path.cmp(&b.path));
            files
        };

        // Findings from earlier phases of this run (re-executions, prior
        // repo frames) — snapshotted once so fan-out stays deterministic.
        let prior: Vec<Finding> = {
            let ctx = shared.lock();
            ctx.frame_results
                .iter()
                .flat_map(|r| r.findings.iter().cloned())
                .collect()
        };

        let runner = Arc::new(FrameRunner::new(Arc::clone(&self.cache)));

        let mut pairs: Vec<(Arc<dyn Frame>, Arc<CodeFile>)> = Vec::new();
        for file in &files {
            for frame in self.registry.applicable(&selected, file) {
                pairs.push((frame, Arc::clone(file)));
            }
        }
        let repo_frames = self.registry.repository_scope(&selected);

        let mut executed = 0usize;
        match self.config.execution_strategy {
            ExecutionStrategy::Sequential | ExecutionStrategy::FailFast => {
                let fail_fast = self.config.execution_strategy == ExecutionStrategy::FailFast;
                let mut halted = false;

                for (frame, file) in pairs {
                    if token.is_cancelled() {
                        break;
                    }
                    let status = self
                        .invoke(&runner, frame, Some(file), shared, token, events, &prior)
                        .await;
                    executed += 1;
                    if fail_fast && status.is_failure() {
                        shared.lock().advise("fail_fast: halting after first failure");
                        halted = true;
                        break;
                    }
                }

                if !halted {
                    for frame in repo_frames {
                        if token.is_cancelled() {
                            break;
                        }
                        let status = self
                            .invoke(&runner, frame, None, shared, token, events, &prior)
                            .await;
                        executed += 1;
                        if fail_fast && status.is_failure() {
                            shared.lock().advise("fail_fast: halting after first failure");
                            break;
                        }
                    }
                }
            }
            ExecutionStrategy::Parallel => {
                let executed_count = std::sync::atomic::AtomicUsize::new(0);

                // File-scope pairs fan out up to the worker bound while
                // repository frames run sequentially alongside them.
                let file_work = async {
                    futures::stream::iter(pairs)
                        .for_each_concurrent(self.config.parallel_workers, |(frame, file)| {
                            let executed_count = &executed_count;
                            let runner = &runner;
                            let prior = prior.as_slice();
                            async move {
                                if token.is_cancelled() {
                                    return;
                                }
                                self.invoke(runner, frame, Some(file), shared, token, events, prior)
                                    .await;
                                executed_count
                                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                            }
                        })
                        .await;
                };

                let repo_work = async {
                    for frame in repo_frames {
                        if token.is_cancelled() {
                            break;
                        }
                        self.invoke(&runner, frame, None, shared, token, events, &prior)
                            .await;
                        executed_count.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    }
                };

                tokio::join!(file_work, repo_work);
                executed = executed_count.load(std::sync::atomic::Ordering::Relaxed);
            }
        }

        executed
    }

    /// One frame invocation: context assembly, execution, result capture.
    #[allow(clippy::too_many_arguments)]
    async fn invoke(
        &self,
        runner: &FrameRunner,
        frame: Arc<dyn Frame>,
        file: Option<Arc<CodeFile>>,
        shared: &Arc<Mutex<PipelineContext>>,
        token: &CancellationToken,
        events: &EventSink,
        prior: &[Finding],
    ) -> FrameStatus {
        let frame_id = frame.id().to_string();
        let scope = frame.metadata().scope;
        let file_label = file.as_ref().map(|f| f.path.clone());

        events
            .emit(PipelineEvent::FrameStarted {
                frame_id: frame_id.clone(),
                file: file_label,
            })
            .await;

        let (characteristics, files_arc) = {
            let ctx = shared.lock();
            let characteristics = file
                .as_ref()
                .and_then(|f| ctx.characteristics.get(&f.path).copied());
            (characteristics, ctx.files.clone())
        };

        let frame_config = self.config.frame_config.get(&frame_id).cloned();
        let (frame_ctx, ctx_advisories) = runner.build_context(
            file,
            files_arc,
            characteristics,
            prior,
            &self.capabilities,
            token.clone(),
            frame_config,
        );

        let timeout_ms = self.config.frame_timeout_ms(scope);
        let outcome = runner.run(frame, Arc::new(frame_ctx), timeout_ms).await;
        let status = outcome.result.status;

        events
            .emit(PipelineEvent::FrameCompleted {
                frame_id,
                status,
                duration_ms: outcome.result.duration_ms,
                issues_found: outcome.result.issues_found,
            })
            .await;
        for advisory in outcome
            .advisories
            .iter()
            .chain(ctx_advisories.iter())
        {
            events
                .emit(PipelineEvent::Advisory {
                    message: advisory.clone(),
                })
                .await;
        }

        let mut ctx = shared.lock();
        ctx.advisories.extend(ctx_advisories);
        ctx.advisories.extend(outcome.advisories);
        ctx.frame_results.push(outcome.result);
        status
    }

    /// Requested frame ids: configured set (or full registry) minus the
    /// disabled list, canonicalized.
    fn selected_frame_ids(&self) -> Vec<String> {
        let disabled: HashSet<String> = self
            .config
            .disabled_frames
            .iter()
            .map(|id| crate::frames::canonical_frame_id(id))
            .collect();

        let base = if self.config.enabled_frames.is_empty() {
            self.registry.frame_ids()
        } else {
            self.config
                .enabled_frames
                .iter()
                .map(|id| crate::frames::canonical_frame_id(id))
                .collect()
        };

        base.into_iter().filter(|id| !disabled.contains(id)).collect()
    }

    /// Build the final result: deterministic ordering, dedup, metrics.
    fn finish(&self, shared: &Arc<Mutex<PipelineContext>>, terminal: Terminal) -> PipelineResult {
        let mut ctx = shared.lock();
        ctx.transition(PipelineState::Finishing);

        let status = match terminal {
            Terminal::Cancelled => PipelineStatus::Cancelled,
            Terminal::TimedOut => PipelineStatus::TimedOut,
            Terminal::Ran => {
                if ctx.has_blocking_failure() {
                    PipelineStatus::Failed
                } else if ctx.has_nonblocking_failure() {
                    PipelineStatus::CompletedWithFailures
                } else {
                    PipelineStatus::Completed
                }
            }
        };
        ctx.transition(PipelineState::Done(status));

        let invocations = std::mem::take(&mut ctx.frame_results);
        let invocation_count = invocations.len();
        let mut status_counts = (0usize, 0usize, 0usize, 0usize); // passed, failed, errored, skipped
        for invocation in &invocations {
            match invocation.status {
                FrameStatus::Passed | FrameStatus::Warning => status_counts.0 += 1,
                FrameStatus::Failed => status_counts.1 += 1,
                FrameStatus::Error => status_counts.2 += 1,
                FrameStatus::Skipped => status_counts.3 += 1,
            }
        }

        let (frame_results, merge_advisories) = merge_frame_results(invocations);
        let ordered: Vec<FrameResult> = frame_results.values().cloned().collect();
        let aggregation = ResultAggregator::new().aggregate(&ordered);

        let total_files = ctx.files.len();
        let binary_files = ctx.files.iter().filter(|f| f.is_binary).count();
        let findings_reported: usize = ordered.iter().map(|r| r.issues_found).sum();

        let mut phases = std::mem::take(&mut ctx.phases);
        if let Some(running) = phases_interrupted_at(&ctx.state, &phases) {
            phases.push(PhaseSummary {
                phase: running,
                status: PhaseStatus::Interrupted,
                duration_ms: 0,
                frames_executed: 0,
            });
        }
        for phase in PhaseId::ORDER {
            if !phases.iter().any(|p| p.phase == phase) {
                phases.push(PhaseSummary::skipped(phase));
            }
        }
        phases.sort_by_key(|p| PhaseId::ORDER.iter().position(|o| *o == p.phase));

        let mut advisories: Vec<String> = self.registry.advisories().to_vec();
        advisories.extend(std::mem::take(&mut ctx.advisories));
        advisories.extend(merge_advisories);
        advisories.extend(aggregation.advisories.clone());

        let ended_at = Utc::now();
        let duration_ms = (ended_at - ctx.started_at).num_milliseconds().max(0) as u64;

        let mut metadata = std::collections::HashMap::new();
        metadata.insert(
            "scan_id".to_string(),
            serde_json::Value::String(ctx.scan_id.clone()),
        );
        metadata.insert(
            "engine_version".to_string(),
            serde_json::Value::String(crate::VERSION.to_string()),
        );

        PipelineResult {
            scan_id: ctx.scan_id.clone(),
            pipeline_id: ctx.pipeline_id,
            status,
            started_at: ctx.started_at,
            ended_at,
            phases,
            findings: aggregation.findings,
            frame_results,
            metrics: PipelineMetrics {
                total_files,
                files_analyzed: total_files - binary_files,
                binary_files,
                frames_executed: invocation_count,
                frames_passed: status_counts.0,
                frames_failed: status_counts.1,
                frames_errored: status_counts.2,
                frames_skipped: status_counts.3,
                findings_reported,
                findings_deduplicated: aggregation.deduplicated,
                findings_by_severity: aggregation.by_severity,
                findings_by_frame: aggregation.by_frame,
                duration_ms,
            },
            advisories,
            metadata,
        }
    }
}

/// The phase that was mid-flight when a timeout or cancel fired, if any.
fn phases_interrupted_at(state: &PipelineState, phases: &[PhaseSummary]) -> Option<PhaseId> {
    match state {
        PipelineState::Running(phase) if !phases.iter().any(|p| p.phase == *phase) => Some(*phase),
        _ => None,
    }
}

/// Rank used when merging per-file invocation statuses into one per-frame
/// status: the worst outcome wins.
fn status_rank(status: FrameStatus) -> u8 {
    match status {
        FrameStatus::Error => 4,
        FrameStatus::Failed => 3,
        FrameStatus::Warning => 2,
        FrameStatus::Passed => 1,
        FrameStatus::Skipped => 0,
    }
}

/// Merge per-invocation results into one `FrameResult` per frame id,
/// sorted by frame id for deterministic aggregation.
fn merge_frame_results(
    invocations: Vec<FrameResult>,
) -> (IndexMap<String, FrameResult>, Vec<String>) {
    let mut sorted = invocations;
    sorted.sort_by(|a, b| a.frame_id.cmp(&b.frame_id));

    let mut merged: IndexMap<String, FrameResult> = IndexMap::new();
    let mut advisories = Vec::new();

    for invocation in sorted {
        match merged.get_mut(&invocation.frame_id) {
            None => {
                merged.insert(invocation.frame_id.clone(), invocation);
            }
            Some(existing) => {
                if status_rank(invocation.status) > status_rank(existing.status) {
                    existing.status = invocation.status;
                }
                existing.duration_ms += invocation.duration_ms;
                existing.findings.extend(invocation.findings);
                existing.metadata.extend(invocation.metadata);

                if existing.findings.len() > MAX_FINDINGS_PER_FRAME {
                    existing.findings.truncate(MAX_FINDINGS_PER_FRAME);
                    advisories.push(format!(
                        "findings_truncated: frame '{}' capped at {MAX_FINDINGS_PER_FRAME} findings across files",
                        existing.frame_id
                    ));
                }
                existing.issues_found = existing.findings.len();
            }
        }
    }

    (merged, advisories)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(frame_id: &str, status: FrameStatus, findings: usize) -> FrameResult {
        use crate::core::findings::Severity;
        FrameResult {
            frame_id: frame_id.to_string(),
            frame_name: frame_id.to_string(),
            status,
            duration_ms: 5,
            issues_found: findings,
            is_blocker: false,
            findings: (0..findings)
                .map(|i| Finding {
                    id: format!("{frame_id}:{i}"),
                    frame_id: frame_id.to_string(),
                    severity: Severity::Low,
                    message: format!("issue {i}"),
                    location: format!("f{i}.py:1"),
                    code_snippet: None,
                    suggestion: None,
                    detail: None,
                    is_blocker_source: false,
                })
                .collect(),
            metadata: Default::default(),
        }
    }

    #[test]
    fn merge_keeps_worst_status_and_sums_durations() {
        let merged = merge_frame_results(vec![
            result("quality", FrameStatus::Passed, 0),
            result("quality", FrameStatus::Error, 0),
            result("quality", FrameStatus::Warning, 1),
        ])
        .0;

        let quality = &merged["quality"];
        assert_eq!(quality.status, FrameStatus::Error);
        assert_eq!(quality.duration_ms, 15);
        assert_eq!(quality.issues_found, 1);
    }

    #[test]
    fn merge_orders_by_frame_id() {
        let merged = merge_frame_results(vec![
            result("zeta", FrameStatus::Passed, 0),
            result("alpha", FrameStatus::Passed, 0),
        ])
        .0;

        let keys: Vec<&String> = merged.keys().collect();
        assert_eq!(keys, vec!["alpha", "zeta"]);
    }

    #[test]
    fn merge_enforces_cross_file_cap() {
        let a = result("noisy", FrameStatus::Warning, 900);
        let b = result("noisy", FrameStatus::Warning, 900);
        let (merged, advisories) = merge_frame_results(vec![a, b]);

        assert_eq!(merged["noisy"].issues_found, MAX_FINDINGS_PER_FRAME);
        assert!(advisories.iter().any(|a| a.contains("findings_truncated")));
    }
}
