//! Progress-callback trait for per-stage analysis events.
//!
//! Inject an [`Arc<dyn AnalysisProgressCallback>`] via
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] to receive
//! events as the pipeline moves through its stages. The CLI uses it to drive
//! a spinner; a server could forward the same events to a log or a socket.
//!
//! # Example
//!
//! ```rust
//! use icd10_extract::{AnalysisConfig, AnalysisProgressCallback, AnalysisStep};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl AnalysisProgressCallback for Printer {
//!     fn on_step_start(&self, step: AnalysisStep) {
//!         eprintln!("→ {step}");
//!     }
//! }
//!
//! let config = AnalysisConfig::builder()
//!     .progress_callback(Arc::new(Printer) as Arc<dyn AnalysisProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::fmt;
use std::sync::Arc;

/// The observable steps of one analysis, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStep {
    /// Reading the findings off the image.
    Extract,
    /// Turning findings into code records.
    Resolve,
    /// Querying the terminology service for each diagnosis.
    CrossReference,
}

impl fmt::Display for AnalysisStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisStep::Extract => f.write_str("reading document"),
            AnalysisStep::Resolve => f.write_str("resolving ICD-10 codes"),
            AnalysisStep::CrossReference => f.write_str("cross-referencing terminology"),
        }
    }
}

/// Called by the pipeline as it processes an image.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Implementations must be `Send + Sync` because an
/// analyzer may be shared between tasks.
pub trait AnalysisProgressCallback: Send + Sync {
    /// Called just before a step begins.
    fn on_step_start(&self, step: AnalysisStep) {
        let _ = step;
    }

    /// Called when a step finishes.
    ///
    /// # Arguments
    /// * `step`       — the finished step
    /// * `items`      — findings length in chars for `Extract`, records for
    ///   `Resolve`, total matches for `CrossReference`
    /// * `elapsed_ms` — wall-clock duration of the step
    fn on_step_complete(&self, step: AnalysisStep, items: usize, elapsed_ms: u64) {
        let _ = (step, items, elapsed_ms);
    }

    /// Called when a step aborts the analysis.
    fn on_step_error(&self, step: AnalysisStep, error: &str) {
        let _ = (step, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnalysisConfig`].
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl AnalysisProgressCallback for TrackingCallback {
        fn on_step_start(&self, _step: AnalysisStep) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_step_complete(&self, _step: AnalysisStep, _items: usize, _elapsed_ms: u64) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_step_error(&self, _step: AnalysisStep, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_step_start(AnalysisStep::Extract);
        cb.on_step_complete(AnalysisStep::Extract, 120, 900);
        cb.on_step_error(AnalysisStep::Resolve, "timeout");
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_step_start(AnalysisStep::Extract);
        tracker.on_step_complete(AnalysisStep::Extract, 80, 10);
        tracker.on_step_start(AnalysisStep::Resolve);
        tracker.on_step_error(AnalysisStep::Resolve, "503");

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn step_display_is_human_readable() {
        assert_eq!(AnalysisStep::Resolve.to_string(), "resolving ICD-10 codes");
    }
}
