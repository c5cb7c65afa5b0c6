//! Frame registry: discovery, validation, conflict resolution, and
//! applicability filtering.
//!
//! Discovery sources are evaluated in a fixed order; a later source wins
//! an id conflict, which is logged at warning level and surfaced as an
//! advisory on the pipeline result.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::errors::WardenError;
use crate::core::files::CodeFile;

use super::manifest::load_manifest_dir;
use super::{builtin, core_version_compatible, Frame, FrameProvider, FrameScope};

/// Environment variable listing extra manifest directories (colon-separated).
pub const FRAME_PATH_ENV: &str = "WARDEN_FRAME_PATH";

/// Default loose-frame directory under the user's home.
const USER_FRAME_DIR: &str = ".warden/frames";

/// Where a frame came from; later variants override earlier ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoverySource {
    /// Compiled into the core
    Builtin,
    /// Registered programmatically by the embedding application
    Provider(String),
    /// Loose manifest from the user frame directory
    UserDir(PathBuf),
    /// Loose manifest from a `WARDEN_FRAME_PATH` directory
    EnvDir(PathBuf),
}

impl std::fmt::Display for DiscoverySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoverySource::Builtin => f.write_str("builtin"),
            DiscoverySource::Provider(name) => write!(f, "provider:{name}"),
            DiscoverySource::UserDir(path) => write!(f, "user_dir:{}", path.display()),
            DiscoverySource::EnvDir(path) => write!(f, "env_dir:{}", path.display()),
        }
    }
}

struct RegisteredFrame {
    frame: Arc<dyn Frame>,
    source: DiscoverySource,
}

/// What `load_all` observed: counts plus the advisories to carry onto
/// pipeline results.
#[derive(Debug, Default, Clone)]
pub struct RegistryLoadReport {
    /// Frames accepted into the registry
    pub loaded: usize,

    /// Candidates rejected by validation
    pub rejected: usize,

    /// Id conflicts resolved (later source won)
    pub conflicts: usize,

    /// Discovery advisories
    pub advisories: Vec<String>,
}

/// Owns every discovered frame for the process lifetime.
#[derive(Default)]
pub struct FrameRegistry {
    frames: HashMap<String, RegisteredFrame>,
    providers: Vec<Arc<dyn FrameProvider>>,
    user_dir: Option<PathBuf>,
    extra_dirs: Vec<PathBuf>,
    report: RegistryLoadReport,
}

impl FrameRegistry {
    /// Empty registry with the default user directory.
    pub fn new() -> Self {
        Self {
            user_dir: dirs::home_dir().map(|home| home.join(USER_FRAME_DIR)),
            ..Self::default()
        }
    }

    /// Override the user frame directory (tests, embedders).
    pub fn with_user_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.user_dir = dir;
        self
    }

    /// Add an extra manifest directory (e.g. `custom_rules_path`).
    pub fn with_extra_dir(mut self, dir: PathBuf) -> Self {
        self.extra_dirs.push(dir);
        self
    }

    /// Register a programmatic frame provider; evaluated after builtins.
    pub fn register_provider(&mut self, provider: Arc<dyn FrameProvider>) {
        self.providers.push(provider);
    }

    /// Scan all discovery sources and populate the registry.
    ///
    /// Discovery errors never abort the load; an empty registry is usable
    /// and the pipeline completes with a "no frames available" advisory.
    pub fn load_all(&mut self) -> RegistryLoadReport {
        self.frames.clear();
        self.report = RegistryLoadReport::default();

        // 1. Built-in frames.
        for frame in builtin::all() {
            self.admit(frame, DiscoverySource::Builtin);
        }

        // 2. Programmatic providers.
        for provider in self.providers.clone() {
            let source = DiscoverySource::Provider(provider.source_name().to_string());
            for frame in provider.provide() {
                self.admit(frame, source.clone());
            }
        }

        // 3. Loose manifests in the user directory.
        if let Some(user_dir) = self.user_dir.clone() {
            if user_dir.is_dir() {
                self.load_dir(&user_dir, DiscoverySource::UserDir(user_dir.clone()));
            } else {
                debug!("user frame directory {} absent", user_dir.display());
            }
        }
        for dir in self.extra_dirs.clone() {
            self.load_dir(&dir, DiscoverySource::UserDir(dir.clone()));
        }

        // 4. Extra directories from the environment.
        if let Ok(raw) = std::env::var(FRAME_PATH_ENV) {
            for part in raw.split(':').filter(|p| !p.is_empty()) {
                let dir = PathBuf::from(part);
                self.load_dir(&dir, DiscoverySource::EnvDir(dir.clone()));
            }
        }

        info!(
            "frame registry loaded: {} frames, {} rejected, {} conflicts",
            self.report.loaded, self.report.rejected, self.report.conflicts
        );
        self.report.clone()
    }

    fn load_dir(&mut self, dir: &Path, source: DiscoverySource) {
        let (frames, advisories) = load_manifest_dir(dir);
        self.report.rejected += advisories.len();
        self.report.advisories.extend(advisories);
        for frame in frames {
            self.admit(frame, source.clone());
        }
    }

    /// Validate and insert one candidate. Later sources win conflicts.
    fn admit(&mut self, frame: Arc<dyn Frame>, source: DiscoverySource) {
        if let Err(err) = self.validate(&frame) {
            warn!("rejecting frame from {source}: {err}");
            self.report.rejected += 1;
            self.report.advisories.push(format!("frame rejected: {err}"));
            return;
        }

        let id = frame.id().to_string();
        if let Some(previous) = self.frames.get(&id) {
            warn!(
                "frame id conflict on '{id}': {} overrides {}",
                source, previous.source
            );
            self.report.conflicts += 1;
            self.report.advisories.push(format!(
                "frame conflict: '{id}' from {} overrides {}",
                source, previous.source
            ));
            self.report.loaded -= 1;
        }

        self.frames.insert(id, RegisteredFrame { frame, source });
        self.report.loaded += 1;
    }

    fn validate(&self, frame: &Arc<dyn Frame>) -> Result<(), WardenError> {
        let metadata = frame.metadata();

        if metadata.id.trim().is_empty() {
            return Err(WardenError::frame_load("<unnamed>", "missing frame id"));
        }
        if metadata.name.trim().is_empty() {
            return Err(WardenError::frame_load(&metadata.id, "missing frame name"));
        }
        if metadata.version.trim().is_empty() {
            return Err(WardenError::frame_load(&metadata.id, "missing frame version"));
        }
        if !core_version_compatible(metadata, crate::VERSION) {
            return Err(WardenError::frame_load(
                &metadata.id,
                format!(
                    "incompatible with core {} (requires {}..{})",
                    crate::VERSION,
                    metadata.min_core_version.as_deref().unwrap_or("*"),
                    metadata.max_core_version.as_deref().unwrap_or("*"),
                ),
            ));
        }

        Ok(())
    }

    /// Look up a frame by canonical id.
    pub fn get(&self, frame_id: &str) -> Option<Arc<dyn Frame>> {
        self.frames.get(frame_id).map(|r| Arc::clone(&r.frame))
    }

    /// The discovery source of a loaded frame.
    pub fn source_of(&self, frame_id: &str) -> Option<&DiscoverySource> {
        self.frames.get(frame_id).map(|r| &r.source)
    }

    /// All loaded frame ids, sorted.
    pub fn frame_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.frames.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of loaded frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True when discovery found nothing.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Advisories from the last `load_all`.
    pub fn advisories(&self) -> &[String] {
        &self.report.advisories
    }

    /// Filter a requested id set down to the file-scope frames applicable
    /// to a file's language, ordered by priority then id.
    pub fn applicable(&self, frame_ids: &[String], file: &CodeFile) -> Vec<Arc<dyn Frame>> {
        let mut frames: Vec<Arc<dyn Frame>> = frame_ids
            .iter()
            .filter_map(|id| self.get(id))
            .filter(|frame| frame.metadata().scope == FrameScope::File)
            .filter(|frame| frame.metadata().applicability.matches(&file.language))
            .collect();
        frames.sort_by(|a, b| {
            a.metadata()
                .priority
                .sort_key()
                .cmp(&b.metadata().priority.sort_key())
                .then_with(|| a.id().cmp(b.id()))
        });
        frames
    }

    /// All repository-scope frames among the requested ids, ordered by
    /// priority then id.
    pub fn repository_scope(&self, frame_ids: &[String]) -> Vec<Arc<dyn Frame>> {
        let mut frames: Vec<Arc<dyn Frame>> = frame_ids
            .iter()
            .filter_map(|id| self.get(id))
            .filter(|frame| frame.metadata().scope == FrameScope::Repository)
            .collect();
        frames.sort_by(|a, b| {
            a.metadata()
                .priority
                .sort_key()
                .cmp(&b.metadata().priority.sort_key())
                .then_with(|| a.id().cmp(b.id()))
        });
        frames
    }

    /// Every repository-scope frame in the registry.
    pub fn all_repository_scope(&self) -> Vec<Arc<dyn Frame>> {
        self.repository_scope(&self.frame_ids())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::findings::FrameCategory;
    use crate::frames::{FrameContext, FrameMetadata, FrameOutput};
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;

    struct StubFrame {
        metadata: FrameMetadata,
    }

    impl StubFrame {
        fn boxed(id: &str, scope: FrameScope) -> Arc<dyn Frame> {
            Arc::new(Self {
                metadata: FrameMetadata::new(id, id, "stub", FrameCategory::Custom, scope),
            })
        }
    }

    #[async_trait]
    impl Frame for StubFrame {
        fn metadata(&self) -> &FrameMetadata {
            &self.metadata
        }

        async fn execute(&self, _ctx: &FrameContext) -> crate::core::errors::Result<FrameOutput> {
            Ok(FrameOutput::passed())
        }
    }

    struct StubProvider {
        frames: Vec<Arc<dyn Frame>>,
    }

    impl FrameProvider for StubProvider {
        fn source_name(&self) -> &str {
            "stub_pkg"
        }

        fn provide(&self) -> Vec<Arc<dyn Frame>> {
            self.frames.clone()
        }
    }

    fn isolated_registry() -> FrameRegistry {
        FrameRegistry::new().with_user_dir(None)
    }

    #[test]
    fn loads_builtin_frames() {
        let mut registry = isolated_registry();
        let report = registry.load_all();
        assert!(report.loaded >= 4);
        assert!(registry.get("security_patterns").is_some());
        assert!(registry.get("quality_heuristics").is_some());
        assert!(!registry.all_repository_scope().is_empty());
    }

    #[test]
    fn provider_overrides_builtin_with_advisory() {
        let mut registry = isolated_registry();
        registry.register_provider(Arc::new(StubProvider {
            frames: vec![StubFrame::boxed("security_patterns", FrameScope::File)],
        }));

        let report = registry.load_all();
        assert_eq!(report.conflicts, 1);
        assert!(report
            .advisories
            .iter()
            .any(|a| a.contains("frame conflict") && a.contains("security_patterns")));
        assert_eq!(
            registry.source_of("security_patterns"),
            Some(&DiscoverySource::Provider("stub_pkg".to_string()))
        );
    }

    #[test]
    fn manifest_dir_frames_are_discovered() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("custom.yaml"),
            r#"
id: custom_check
name: Custom check
patterns:
  - pattern: "forbidden("
    severity: medium
    message: "forbidden call"
"#,
        )
        .unwrap();

        let mut registry =
            isolated_registry().with_extra_dir(temp.path().to_path_buf());
        registry.load_all();
        assert!(registry.get("custom_check").is_some());
    }

    #[test]
    fn incompatible_core_version_is_rejected() {
        struct FutureFrame {
            metadata: FrameMetadata,
        }

        #[async_trait]
        impl Frame for FutureFrame {
            fn metadata(&self) -> &FrameMetadata {
                &self.metadata
            }

            async fn execute(
                &self,
                _ctx: &FrameContext,
            ) -> crate::core::errors::Result<FrameOutput> {
                Ok(FrameOutput::passed())
            }
        }

        let mut metadata = FrameMetadata::new(
            "from_the_future",
            "Future",
            "requires a newer core",
            FrameCategory::Custom,
            FrameScope::File,
        );
        metadata.min_core_version = Some("99.0.0".to_string());

        let mut registry = isolated_registry();
        registry.register_provider(Arc::new(StubProvider {
            frames: vec![Arc::new(FutureFrame { metadata })],
        }));

        let report = registry.load_all();
        assert!(registry.get("from_the_future").is_none());
        assert!(report
            .advisories
            .iter()
            .any(|a| a.contains("from_the_future") && a.contains("incompatible")));
    }

    #[test]
    fn applicable_filters_by_language_and_scope() {
        let mut registry = isolated_registry();
        registry.load_all();

        let python = CodeFile::from_text("a.py", "import os\n");
        let ids = registry.frame_ids();
        let applicable = registry.applicable(&ids, &python);
        assert!(!applicable.is_empty());
        assert!(applicable
            .iter()
            .all(|f| f.metadata().scope == FrameScope::File));
        // Priority ordering: critical frames first.
        let keys: Vec<u8> = applicable
            .iter()
            .map(|f| f.metadata().priority.sort_key())
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn empty_registry_is_usable() {
        // No builtins are loaded until load_all; query the empty state.
        let registry = FrameRegistry::default().with_user_dir(None);
        assert!(registry.is_empty());
        assert!(registry.get("anything").is_none());
        assert!(registry.applicable(&[], &CodeFile::from_text("a.py", "")).is_empty());
    }
}
