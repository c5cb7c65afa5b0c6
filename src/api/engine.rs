//! High-level engine wrapper.
//!
//! `WardenEngine` wires the registry, the incremental selector, and the
//! orchestrator together for embedders that want a one-call surface.
//! Front-ends that manage their own file inventories construct a
//! [`ValidationPipeline`] directly instead.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use crate::api::results::PipelineResult;
use crate::core::config::PipelineConfig;
use crate::core::errors::{Result, WardenError};
use crate::core::files::CodeFile;
use crate::core::pipeline::{
    CapabilityBundle, PipelineEvent, ValidationPipeline, EVENT_CHANNEL_CAPACITY,
};
use crate::frames::{FrameProvider, FrameRegistry};
use crate::io::fs::LocalFileSystem;
use crate::select::FileSelector;

/// Engine status snapshot for doctor-style front-end commands.
#[derive(Debug)]
pub struct EngineStatus {
    /// Frames loaded into the registry
    pub frames_loaded: usize,

    /// Frame ids, sorted
    pub frame_ids: Vec<String>,

    /// Discovery advisories from registry load
    pub registry_advisories: Vec<String>,

    /// Whether the configuration validates
    pub config_valid: bool,
}

/// Main warden analysis engine.
pub struct WardenEngine {
    registry: Arc<FrameRegistry>,
    pipeline: ValidationPipeline,
    config: PipelineConfig,
    capabilities: CapabilityBundle,
}

impl WardenEngine {
    /// Create an engine: validate config, discover frames, build the
    /// pipeline.
    pub fn new(config: PipelineConfig, capabilities: CapabilityBundle) -> Result<Self> {
        Self::with_providers(config, capabilities, Vec::new())
    }

    /// Create an engine with programmatic frame providers registered
    /// before discovery.
    pub fn with_providers(
        config: PipelineConfig,
        capabilities: CapabilityBundle,
        providers: Vec<Arc<dyn FrameProvider>>,
    ) -> Result<Self> {
        config.validate()?;

        let mut registry = FrameRegistry::new();
        if let Some(custom) = &config.custom_rules_path {
            registry = registry.with_extra_dir(custom.clone());
        }
        for provider in providers {
            registry.register_provider(provider);
        }
        let report = registry.load_all();
        info!(
            "warden engine initialized: {} frames ({} rejected)",
            report.loaded, report.rejected
        );

        let registry = Arc::new(registry);
        let pipeline =
            ValidationPipeline::new(Arc::clone(&registry), config.clone(), capabilities.clone())?;

        Ok(Self {
            registry,
            pipeline,
            config,
            capabilities,
        })
    }

    /// Analyze a project root: select files (full or incremental), then
    /// execute the pipeline.
    pub async fn analyze_root(&self, root: &Path) -> Result<PipelineResult> {
        if !root.exists() {
            return Err(WardenError::io(
                format!("path does not exist: {}", root.display()),
                std::io::Error::new(std::io::ErrorKind::NotFound, "path not found"),
            ));
        }
        if !root.is_dir() {
            return Err(WardenError::validation(format!(
                "path is not a directory: {}",
                root.display()
            )));
        }

        let fs = self
            .capabilities
            .fs
            .clone()
            .unwrap_or_else(|| Arc::new(LocalFileSystem));
        let selector = FileSelector::new(fs);
        let selection = selector
            .select(root, &self.config, self.capabilities.vcs.as_deref())
            .await?;

        info!(
            "selected {} files for analysis ({:?} mode)",
            selection.files.len(),
            selection.mode
        );

        let mut result = self.pipeline.execute(selection.files).await?;
        // Selector advisories (incremental fallback, unreadable files)
        // belong on the result like every other anomaly.
        result.advisories.extend(selection.advisories);
        Ok(result)
    }

    /// Execute over an already-prepared inventory.
    pub async fn execute(&self, files: Vec<Arc<CodeFile>>) -> Result<PipelineResult> {
        self.pipeline.execute(files).await
    }

    /// Execute with streaming events. Returns the receiver half; the
    /// final event carries the result.
    pub fn execute_stream(
        self: Arc<Self>,
        files: Vec<Arc<CodeFile>>,
    ) -> mpsc::Receiver<PipelineEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let _ = self.pipeline.execute_stream(files, tx).await;
        });
        rx
    }

    /// Cancellation token for in-flight executions.
    pub fn cancellation_token(&self) -> tokio_util::sync::CancellationToken {
        self.pipeline.cancellation_token()
    }

    /// Registry view for front-ends listing frames.
    pub fn registry(&self) -> &FrameRegistry {
        &self.registry
    }

    /// Status snapshot for doctor-style commands.
    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            frames_loaded: self.registry.len(),
            frame_ids: self.registry.frame_ids(),
            registry_advisories: self.registry.advisories().to_vec(),
            config_valid: self.config.validate().is_ok(),
        }
    }
}
