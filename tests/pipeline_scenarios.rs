//! End-to-end pipeline scenarios: blocker failures, deduplication,
//! repository caching, timeouts, and incremental fallback.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use warden_rs::core::errors::Result;
use warden_rs::core::findings::{FrameCategory, FrameScope, FrameStatus, UNKNOWN_LOCATION};
use warden_rs::core::normalize::RawFinding;
use warden_rs::core::pipeline::{CapabilityBundle, PipelineEvent, ValidationPipeline};
use warden_rs::frames::{
    Applicability, Frame, FrameContext, FrameMetadata, FrameOutput, FrameProvider, FrameRegistry,
};
use warden_rs::{CodeFile, PipelineConfig, PipelineStatus, Severity};

/// A frame whose behavior is scripted per test.
struct ScriptedFrame {
    metadata: FrameMetadata,
    findings: Vec<RawFinding>,
    sleep_ms: u64,
    executions: AtomicUsize,
}

impl ScriptedFrame {
    fn file_scope(id: &str, findings: Vec<RawFinding>) -> Arc<Self> {
        Self::build(id, FrameScope::File, false, findings, 0)
    }

    fn blocker(id: &str, findings: Vec<RawFinding>) -> Arc<Self> {
        Self::build(id, FrameScope::File, true, findings, 0)
    }

    fn repo_scope(id: &str, findings: Vec<RawFinding>) -> Arc<Self> {
        Self::build(id, FrameScope::Repository, false, findings, 0)
    }

    fn sleeper(id: &str, sleep_ms: u64) -> Arc<Self> {
        Self::build(id, FrameScope::File, false, Vec::new(), sleep_ms)
    }

    fn build(
        id: &str,
        scope: FrameScope,
        is_blocker: bool,
        findings: Vec<RawFinding>,
        sleep_ms: u64,
    ) -> Arc<Self> {
        let mut metadata = FrameMetadata::new(
            id,
            format!("{id} (scripted)"),
            "scripted test frame",
            FrameCategory::Custom,
            scope,
        )
        .with_applicability(Applicability::any());
        if is_blocker {
            metadata = metadata.blocker();
        }

        Arc::new(Self {
            metadata,
            findings,
            sleep_ms,
            executions: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Frame for ScriptedFrame {
    fn metadata(&self) -> &FrameMetadata {
        &self.metadata
    }

    async fn execute(&self, _ctx: &FrameContext) -> Result<FrameOutput> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        if self.sleep_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.sleep_ms)).await;
        }
        if self.metadata.is_blocker {
            Ok(FrameOutput::failed_if_findings(self.findings.clone()))
        } else {
            Ok(FrameOutput::warning_if_findings(self.findings.clone()))
        }
    }
}

struct ScriptedProvider {
    frames: Vec<Arc<dyn Frame>>,
}

impl FrameProvider for ScriptedProvider {
    fn source_name(&self) -> &str {
        "scripted_tests"
    }

    fn provide(&self) -> Vec<Arc<dyn Frame>> {
        self.frames.clone()
    }
}

/// Registry with only the scripted frames selectable (builtins stay
/// loaded but the config restricts execution to the scripted set).
fn pipeline_with(
    frames: Vec<Arc<dyn Frame>>,
    mut config: PipelineConfig,
) -> ValidationPipeline {
    let ids: Vec<String> = frames.iter().map(|f| f.id().to_string()).collect();
    if config.enabled_frames.is_empty() {
        config.enabled_frames = ids;
    }

    let mut registry = FrameRegistry::new().with_user_dir(None);
    registry.register_provider(Arc::new(ScriptedProvider { frames }));
    registry.load_all();

    ValidationPipeline::new(Arc::new(registry), config, CapabilityBundle::new()).unwrap()
}

fn python_file() -> Arc<CodeFile> {
    Arc::new(CodeFile::from_text("a.py", "import os\nos.system('ls')"))
}

#[tokio::test]
async fn scenario_two_frames_one_file_blocker_fails_pipeline() {
    let security = ScriptedFrame::blocker(
        "security",
        vec![RawFinding::new("os.system call enables shell injection")
            .with_severity(Severity::Critical)
            .with_location("a.py:2")],
    );
    let quality = ScriptedFrame::file_scope("quality", Vec::new());

    let pipeline = pipeline_with(
        vec![security as Arc<dyn Frame>, quality as Arc<dyn Frame>],
        PipelineConfig::default(),
    );
    let result = pipeline.execute(vec![python_file()]).await.unwrap();

    assert_eq!(result.status, PipelineStatus::Failed);
    assert_eq!(result.findings.len(), 1);
    assert_eq!(result.findings[0].severity, Severity::Critical);
    assert_eq!(result.findings[0].location, "a.py:2");
    assert_eq!(result.scan_id.len(), 8);

    let security_result = &result.frame_results["security"];
    assert_eq!(security_result.status, FrameStatus::Failed);
    assert!(security_result.is_blocker);
    let quality_result = &result.frame_results["quality"];
    assert_eq!(quality_result.status, FrameStatus::Passed);
}

#[tokio::test]
async fn scenario_dedup_keeps_highest_severity() {
    let first = ScriptedFrame::file_scope(
        "a_frame",
        vec![RawFinding::new("duplicate sink detected in handler")
            .with_severity(Severity::Critical)
            .with_location("x.py:5")],
    );
    let second = ScriptedFrame::file_scope(
        "b_frame",
        vec![RawFinding::new("duplicate sink detected in handler")
            .with_severity(Severity::High)
            .with_location("x.py:5")],
    );

    let pipeline = pipeline_with(
        vec![first as Arc<dyn Frame>, second as Arc<dyn Frame>],
        PipelineConfig::default(),
    );
    let file = Arc::new(CodeFile::from_text("x.py", "line\n".repeat(6)));
    let result = pipeline.execute(vec![file]).await.unwrap();

    assert_eq!(result.findings.len(), 1);
    assert_eq!(result.findings[0].severity, Severity::Critical);
    assert_eq!(result.metrics.findings_deduplicated, 1);
}

#[tokio::test]
async fn scenario_unlocalized_findings_do_not_collide() {
    let first = ScriptedFrame::file_scope(
        "a_frame",
        vec![RawFinding::new("unknown issue").with_severity(Severity::Low)],
    );
    let second = ScriptedFrame::file_scope(
        "b_frame",
        vec![RawFinding::new("unknown issue").with_severity(Severity::Low)],
    );

    let pipeline = pipeline_with(
        vec![first as Arc<dyn Frame>, second as Arc<dyn Frame>],
        PipelineConfig::default(),
    );
    let result = pipeline.execute(vec![python_file()]).await.unwrap();

    assert_eq!(result.findings.len(), 2);
    assert!(result
        .findings
        .iter()
        .all(|f| f.location == UNKNOWN_LOCATION));
    assert_ne!(result.findings[0].id, result.findings[1].id);
}

#[tokio::test]
async fn scenario_repository_frame_is_cached_across_executions() {
    let repo = ScriptedFrame::repo_scope(
        "repo_audit",
        vec![RawFinding::new("repository-wide issue").with_severity(Severity::Medium)],
    );
    let counter = Arc::clone(&repo);

    let pipeline = pipeline_with(vec![repo as Arc<dyn Frame>], PipelineConfig::default());

    let first = pipeline.execute(vec![python_file()]).await.unwrap();
    let second = pipeline.execute(vec![python_file()]).await.unwrap();

    assert_eq!(counter.executions.load(Ordering::SeqCst), 1);
    assert_eq!(second.frame_results["repo_audit"].duration_ms, 0);
    assert_eq!(
        first.frame_results["repo_audit"].findings,
        second.frame_results["repo_audit"].findings
    );
}

#[tokio::test]
async fn scenario_pipeline_timeout_preserves_completed_work() {
    let quick = ScriptedFrame::file_scope(
        "quick",
        vec![RawFinding::new("fast finding")
            .with_severity(Severity::Low)
            .with_location("a.py:1")],
    );
    let sleeper = ScriptedFrame::sleeper("sleeper", 500);

    let config = PipelineConfig {
        pipeline_timeout_ms: 150,
        ..PipelineConfig::default()
    };
    let pipeline = pipeline_with(
        vec![quick as Arc<dyn Frame>, sleeper as Arc<dyn Frame>],
        config,
    );
    let result = pipeline.execute(vec![python_file()]).await.unwrap();

    assert_eq!(result.status, PipelineStatus::TimedOut);
    assert!(result.advisories.iter().any(|a| a == "pipeline_timeout"));
    assert!(result
        .findings
        .iter()
        .any(|f| f.message == "fast finding"));
    assert_eq!(result.exit_code(&PipelineConfig::default()), 2);
}

#[tokio::test]
async fn scenario_caller_cancellation_maps_to_cancelled() {
    let sleeper = ScriptedFrame::sleeper("sleeper", 5_000);
    let pipeline = Arc::new(pipeline_with(
        vec![sleeper as Arc<dyn Frame>],
        PipelineConfig::default(),
    ));

    let token = pipeline.cancellation_token();
    let exec = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.execute(vec![python_file()]).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    token.cancel();

    let result = exec.await.unwrap().unwrap();
    assert_eq!(result.status, PipelineStatus::Cancelled);
    assert!(result.advisories.iter().any(|a| a == "pipeline_cancelled"));
    assert_eq!(result.exit_code(&PipelineConfig::default()), 130);
}

#[tokio::test]
async fn zero_files_completes_with_advisory() {
    let pipeline = pipeline_with(Vec::new(), PipelineConfig::default());
    let result = pipeline.execute(Vec::new()).await.unwrap();

    assert_eq!(result.status, PipelineStatus::Completed);
    assert!(result.findings.is_empty());
    assert!(result.advisories.iter().any(|a| a.contains("no files")));
}

#[tokio::test]
async fn noisy_frame_is_capped_at_one_thousand_findings() {
    let raws: Vec<RawFinding> = (0..10_000)
        .map(|i| {
            RawFinding::new(format!("noise {i}"))
                .with_severity(Severity::Info)
                .with_location(format!("a.py:{}", i + 1))
        })
        .collect();
    let noisy = ScriptedFrame::file_scope("noisy", raws);

    let pipeline = pipeline_with(vec![noisy as Arc<dyn Frame>], PipelineConfig::default());
    let result = pipeline.execute(vec![python_file()]).await.unwrap();

    assert_eq!(result.frame_results["noisy"].issues_found, 1000);
    assert!(result
        .advisories
        .iter()
        .any(|a| a.contains("findings_truncated")));
}

#[tokio::test]
async fn deterministic_reruns_produce_identical_findings() {
    let build = || {
        let security = ScriptedFrame::blocker(
            "security",
            vec![RawFinding::new("os.system call enables shell injection")
                .with_severity(Severity::Critical)
                .with_location("a.py:2")],
        );
        let quality = ScriptedFrame::file_scope(
            "quality",
            vec![RawFinding::new("long line")
                .with_severity(Severity::Low)
                .with_location("a.py:1")],
        );
        pipeline_with(
            vec![security as Arc<dyn Frame>, quality as Arc<dyn Frame>],
            PipelineConfig::default(),
        )
    };

    let first = build().execute(vec![python_file()]).await.unwrap();
    let second = build().execute(vec![python_file()]).await.unwrap();

    assert_eq!(first.status, second.status);
    assert_eq!(first.findings, second.findings);
    assert_eq!(
        first.frame_results.keys().collect::<Vec<_>>(),
        second.frame_results.keys().collect::<Vec<_>>()
    );
    assert_ne!(first.scan_id, second.scan_id);
    assert_ne!(first.pipeline_id, second.pipeline_id);
}

#[tokio::test]
async fn sequential_and_parallel_strategies_agree_on_findings() {
    let build = |strategy| {
        let a = ScriptedFrame::file_scope(
            "a_frame",
            vec![RawFinding::new("issue a")
                .with_severity(Severity::Medium)
                .with_location("a.py:1")],
        );
        let b = ScriptedFrame::file_scope(
            "b_frame",
            vec![RawFinding::new("issue b")
                .with_severity(Severity::Low)
                .with_location("a.py:2")],
        );
        pipeline_with(
            vec![a as Arc<dyn Frame>, b as Arc<dyn Frame>],
            PipelineConfig {
                execution_strategy: strategy,
                ..PipelineConfig::default()
            },
        )
    };

    let sequential = build(warden_rs::ExecutionStrategy::Sequential)
        .execute(vec![python_file()])
        .await
        .unwrap();
    let parallel = build(warden_rs::ExecutionStrategy::Parallel)
        .execute(vec![python_file()])
        .await
        .unwrap();

    assert_eq!(sequential.findings, parallel.findings);
    assert_eq!(sequential.status, parallel.status);
}

#[tokio::test]
async fn fail_fast_halts_after_first_failure() {
    let failing = ScriptedFrame::blocker(
        "a_failing",
        vec![RawFinding::new("fails first")
            .with_severity(Severity::Critical)
            .with_location("a.py:1")],
    );
    let later = ScriptedFrame::file_scope(
        "b_later",
        vec![RawFinding::new("should not run")
            .with_severity(Severity::Low)
            .with_location("a.py:2")],
    );
    let later_counter = Arc::clone(&later);

    let pipeline = pipeline_with(
        vec![failing as Arc<dyn Frame>, later as Arc<dyn Frame>],
        PipelineConfig {
            execution_strategy: warden_rs::ExecutionStrategy::FailFast,
            ..PipelineConfig::default()
        },
    );
    let result = pipeline.execute(vec![python_file()]).await.unwrap();

    assert_eq!(result.status, PipelineStatus::Failed);
    assert_eq!(later_counter.executions.load(Ordering::SeqCst), 0);
    assert!(result.advisories.iter().any(|a| a.contains("fail_fast")));
}

#[tokio::test]
async fn execute_stream_emits_lifecycle_events_and_result() {
    let security = ScriptedFrame::blocker(
        "security",
        vec![RawFinding::new("os.system call enables shell injection")
            .with_severity(Severity::Critical)
            .with_location("a.py:2")],
    );
    let pipeline = pipeline_with(vec![security as Arc<dyn Frame>], PipelineConfig::default());

    let (tx, mut rx) = tokio::sync::mpsc::channel(64);
    let result = pipeline
        .execute_stream(vec![python_file()], tx)
        .await
        .unwrap();

    let mut saw_phase_started = false;
    let mut saw_frame_completed = false;
    let mut final_status = None;
    while let Some(event) = rx.recv().await {
        match event {
            PipelineEvent::PhaseStarted { .. } => saw_phase_started = true,
            PipelineEvent::FrameCompleted { .. } => saw_frame_completed = true,
            PipelineEvent::Result { result } => final_status = Some(result.status),
            _ => {}
        }
    }

    assert!(saw_phase_started);
    assert!(saw_frame_completed);
    assert_eq!(final_status, Some(PipelineStatus::Failed));
    assert_eq!(result.status, PipelineStatus::Failed);
}

#[tokio::test]
async fn disabled_frames_are_excluded() {
    let a = ScriptedFrame::file_scope(
        "a_frame",
        vec![RawFinding::new("from a")
            .with_severity(Severity::Low)
            .with_location("a.py:1")],
    );
    let b = ScriptedFrame::file_scope(
        "b_frame",
        vec![RawFinding::new("from b")
            .with_severity(Severity::Low)
            .with_location("a.py:2")],
    );

    let pipeline = pipeline_with(
        vec![a as Arc<dyn Frame>, b as Arc<dyn Frame>],
        PipelineConfig {
            disabled_frames: vec!["b_frame".to_string()],
            ..PipelineConfig::default()
        },
    );
    let result = pipeline.execute(vec![python_file()]).await.unwrap();

    assert!(result.frame_results.contains_key("a_frame"));
    assert!(!result.frame_results.contains_key("b_frame"));
}

#[tokio::test]
async fn phase_summaries_cover_every_phase() {
    let quality = ScriptedFrame::file_scope("quality", Vec::new());
    let pipeline = pipeline_with(vec![quality as Arc<dyn Frame>], PipelineConfig::default());
    let result = pipeline.execute(vec![python_file()]).await.unwrap();

    assert_eq!(result.phases.len(), 7);
    let validation = result
        .phases
        .iter()
        .find(|p| p.phase == warden_rs::PhaseId::Validation)
        .unwrap();
    assert_eq!(validation.frames_executed, 1);
}
