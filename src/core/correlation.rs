//! Scan-id correlation for structured logging.
//!
//! Every pipeline execution generates an 8-character scan id and binds it
//! to a `tracing` span for the pipeline's lifetime. Log records emitted
//! inside the span carry the `scan_id` field; the binding is released when
//! the guard drops, on every exit path (success, error, timeout, cancel).

use tracing::Span;
use uuid::Uuid;

/// Length of the correlation identifier.
pub const SCAN_ID_LEN: usize = 8;

/// Generate a fresh 8-character scan id from a v4 UUID.
pub fn new_scan_id() -> String {
    Uuid::new_v4().simple().to_string()[..SCAN_ID_LEN].to_string()
}

/// Span binding for one pipeline execution.
///
/// Constructed at the very start of `execute`; the pipeline runs
/// instrumented with [`ScanContext::span`], so the binding survives across
/// await points and is unbound exactly when the instrumented future is
/// dropped.
#[derive(Debug)]
pub struct ScanContext {
    scan_id: String,
    span: Span,
}

impl ScanContext {
    /// Create a context with a freshly generated scan id.
    pub fn new() -> Self {
        Self::with_scan_id(new_scan_id())
    }

    /// Create a context for a known scan id (resumed or test runs).
    pub fn with_scan_id(scan_id: String) -> Self {
        let span = tracing::info_span!("pipeline", scan_id = %scan_id);
        Self { scan_id, span }
    }

    /// The bound scan id.
    pub fn scan_id(&self) -> &str {
        &self.scan_id
    }

    /// The span carrying the `scan_id` field.
    pub fn span(&self) -> Span {
        self.span.clone()
    }
}

impl Default for ScanContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing::subscriber::with_default;
    use tracing_subscriber::fmt;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn scan_id_has_fixed_length_and_is_unique() {
        let a = new_scan_id();
        let b = new_scan_id();
        assert_eq!(a.len(), SCAN_ID_LEN);
        assert_eq!(b.len(), SCAN_ID_LEN);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn span_carries_scan_id_and_unbinds_on_exit() {
        let buf = SharedBuf::default();
        let writer = buf.clone();
        let subscriber = fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let ctx = ScanContext::with_scan_id("cafe0123".to_string());
        with_default(subscriber, || {
            {
                let _guard = ctx.span().entered();
                tracing::info!("inside pipeline");
            }
            tracing::info!("outside pipeline");
        });

        let output = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let inside = output.lines().find(|l| l.contains("inside pipeline")).unwrap();
        let outside = output.lines().find(|l| l.contains("outside pipeline")).unwrap();
        assert!(inside.contains("cafe0123"));
        assert!(!outside.contains("cafe0123"));
    }
}
