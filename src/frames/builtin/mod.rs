//! Frames compiled into the core.
//!
//! These are the first discovery source; providers and manifest
//! directories may override them by id.

mod architecture;
mod quality;
mod resilience;
mod security;

use std::sync::Arc;

pub use architecture::ArchitectureFrame;
pub use quality::QualityFrame;
pub use resilience::ResilienceFrame;
pub use security::SecurityFrame;

use super::Frame;

/// Every built-in frame, in registration order.
pub fn all() -> Vec<Arc<dyn Frame>> {
    vec![
        Arc::new(SecurityFrame::new()),
        Arc::new(QualityFrame::new()),
        Arc::new(ResilienceFrame::new()),
        Arc::new(ArchitectureFrame::new()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn builtin_ids_are_unique_snake_case() {
        let frames = all();
        let ids: HashSet<String> = frames.iter().map(|f| f.id().to_string()).collect();
        assert_eq!(ids.len(), frames.len());
        for id in &ids {
            assert!(id.chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }
}
