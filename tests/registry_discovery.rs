//! Frame discovery across sources: manifest directories, the environment
//! path list, and conflict resolution order.

use std::fs;
use std::sync::Arc;

use serial_test::serial;
use tempfile::TempDir;

use warden_rs::frames::{Frame, FrameProvider, FrameRegistry, FRAME_PATH_ENV};

const MANIFEST: &str = r#"
id: env_discovered
name: Env discovered frame
category: security
priority: high
languages: [python]
patterns:
  - pattern: "forbidden_call("
    severity: high
    message: "forbidden call detected"
"#;

#[test]
#[serial]
fn env_path_directories_are_scanned() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("env_frame.yaml"), MANIFEST).unwrap();

    std::env::set_var(FRAME_PATH_ENV, temp.path());
    let mut registry = FrameRegistry::new().with_user_dir(None);
    registry.load_all();
    std::env::remove_var(FRAME_PATH_ENV);

    assert!(registry.get("env_discovered").is_some());
}

#[test]
#[serial]
fn env_path_overrides_user_dir_manifest() {
    let user_dir = TempDir::new().unwrap();
    let env_dir = TempDir::new().unwrap();

    fs::write(
        user_dir.path().join("shared.yaml"),
        r#"
id: shared_frame
name: From user dir
patterns:
  - pattern: "user_dir_pattern("
    severity: low
    message: "user dir rule"
"#,
    )
    .unwrap();
    fs::write(
        env_dir.path().join("shared.yaml"),
        r#"
id: shared_frame
name: From env dir
patterns:
  - pattern: "env_dir_pattern("
    severity: low
    message: "env dir rule"
"#,
    )
    .unwrap();

    std::env::set_var(FRAME_PATH_ENV, env_dir.path());
    let mut registry =
        FrameRegistry::new().with_user_dir(Some(user_dir.path().to_path_buf()));
    let report = registry.load_all();
    std::env::remove_var(FRAME_PATH_ENV);

    let frame = registry.get("shared_frame").unwrap();
    assert_eq!(frame.metadata().name, "From env dir");
    assert_eq!(report.conflicts, 1);
    assert!(report
        .advisories
        .iter()
        .any(|a| a.contains("frame conflict") && a.contains("shared_frame")));
}

#[test]
#[serial]
fn colon_separated_env_path_loads_every_directory() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();

    fs::write(
        first.path().join("one.yaml"),
        r#"
id: frame_one
name: One
patterns:
  - pattern: "one("
    severity: low
    message: "one"
"#,
    )
    .unwrap();
    fs::write(
        second.path().join("two.yaml"),
        r#"
id: frame_two
name: Two
patterns:
  - pattern: "two("
    severity: low
    message: "two"
"#,
    )
    .unwrap();

    std::env::set_var(
        FRAME_PATH_ENV,
        format!("{}:{}", first.path().display(), second.path().display()),
    );
    let mut registry = FrameRegistry::new().with_user_dir(None);
    registry.load_all();
    std::env::remove_var(FRAME_PATH_ENV);

    assert!(registry.get("frame_one").is_some());
    assert!(registry.get("frame_two").is_some());
}

#[test]
#[serial]
fn discovery_errors_never_abort_loading() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("broken.yaml"), "][ definitely not yaml").unwrap();
    fs::write(temp.path().join("good.yaml"), MANIFEST).unwrap();

    std::env::set_var(FRAME_PATH_ENV, temp.path());
    let mut registry = FrameRegistry::new().with_user_dir(None);
    let report = registry.load_all();
    std::env::remove_var(FRAME_PATH_ENV);

    // The broken manifest is an advisory; the good one and the builtins load.
    assert!(registry.get("env_discovered").is_some());
    assert!(registry.len() >= 5);
    assert!(report.advisories.iter().any(|a| a.contains("broken.yaml")));
}

struct NullProvider;

impl FrameProvider for NullProvider {
    fn source_name(&self) -> &str {
        "null"
    }

    fn provide(&self) -> Vec<Arc<dyn Frame>> {
        Vec::new()
    }
}

#[test]
#[serial]
fn provider_returning_nothing_is_harmless() {
    std::env::remove_var(FRAME_PATH_ENV);
    let mut registry = FrameRegistry::new().with_user_dir(None);
    registry.register_provider(Arc::new(NullProvider));
    let report = registry.load_all();

    assert_eq!(report.conflicts, 0);
    assert!(registry.len() >= 4);
}
