//! Declarative CI ref detection for incremental mode.
//!
//! One centralized table maps well-known CI environment variables to base
//! and head refs. A platform missing from the table produces no refs and
//! the selector falls back to a full scan.

/// Base/head pair resolved from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiRefs {
    /// Platform label for logs and advisories
    pub platform: &'static str,

    /// Base ref (merge target or previous commit)
    pub base: String,

    /// Head ref
    pub head: String,
}

/// One detection rule: the variable that identifies the platform/event and
/// the variables that carry the refs.
struct CiRule {
    platform: &'static str,
    marker: (&'static str, Option<&'static str>),
    base_var: &'static str,
    head_var: &'static str,
    head_default: Option<&'static str>,
}

/// The declarative mapping. Order matters: more specific events first.
const CI_RULES: &[CiRule] = &[
    CiRule {
        platform: "github_pull_request",
        marker: ("GITHUB_EVENT_NAME", Some("pull_request")),
        base_var: "GITHUB_BASE_REF",
        head_var: "GITHUB_SHA",
        head_default: Some("HEAD"),
    },
    CiRule {
        platform: "github_push",
        marker: ("GITHUB_EVENT_NAME", Some("push")),
        base_var: "GITHUB_EVENT_BEFORE",
        head_var: "GITHUB_SHA",
        head_default: Some("HEAD"),
    },
    CiRule {
        platform: "gitlab_merge_request",
        marker: ("CI_MERGE_REQUEST_IID", None),
        base_var: "CI_MERGE_REQUEST_TARGET_BRANCH_NAME",
        head_var: "CI_COMMIT_SHA",
        head_default: Some("HEAD"),
    },
    CiRule {
        platform: "generic",
        marker: ("WARDEN_BASE_REF", None),
        base_var: "WARDEN_BASE_REF",
        head_var: "WARDEN_HEAD_REF",
        head_default: Some("HEAD"),
    },
];

/// Resolve base/head refs from an environment lookup.
///
/// The lookup is injected so tests never touch process-global state
/// directly; production callers pass [`process_env`].
pub fn detect_refs<F>(env: F) -> Option<CiRefs>
where
    F: Fn(&str) -> Option<String>,
{
    for rule in CI_RULES {
        let (marker_var, expected) = rule.marker;
        let Some(marker_value) = env(marker_var) else {
            continue;
        };
        if let Some(expected) = expected {
            if marker_value != expected {
                continue;
            }
        }

        let Some(base) = env(rule.base_var).filter(|v| !v.is_empty()) else {
            continue;
        };
        let head = env(rule.head_var)
            .filter(|v| !v.is_empty())
            .or_else(|| rule.head_default.map(|d| d.to_string()))?;

        return Some(CiRefs {
            platform: rule.platform,
            base,
            head,
        });
    }
    None
}

/// Process-environment lookup for production use.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
