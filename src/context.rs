//! Progress reporting and cancellation shared by every engine.
//!
//! A [`ScanContext`] is cheap to clone. Progress callbacks are optional and any
//! panic they raise is swallowed so a faulty UI hook cannot abort a scan.
//! Cancellation combines a [`CancellationToken`] (used by the cascade watchdog)
//! with an optional caller-supplied predicate.
//!
//! ## Usage Example
//!
//! ```rust
//! use rsdkit::ScanContext;
//!
//! let ctx = ScanContext::new().with_progress(|pct, msg| println!("{pct:5.1}% {msg}"));
//! ctx.report(50.0, "Scanning...");
//! assert!(!ctx.is_cancelled());
//! ctx.cancel();
//! assert!(ctx.is_cancelled());
//! ```

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Progress callback: percentage in `[0, 100]` and a short message.
pub type ProgressFn = dyn Fn(f64, &str) + Send + Sync;

/// Caller-supplied cancellation check.
pub type CancelFn = dyn Fn() -> bool + Send + Sync;

#[derive(Clone, Default)]
pub struct ScanContext {
    progress: Option<Arc<ProgressFn>>,
    cancel_predicate: Option<Arc<CancelFn>>,
    token: CancellationToken,
}

impl ScanContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, progress: impl Fn(f64, &str) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    pub fn with_cancel_predicate(
        mut self,
        predicate: impl Fn() -> bool + Send + Sync + 'static,
    ) -> Self {
        self.cancel_predicate = Some(Arc::new(predicate));
        self
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// Same callbacks, with a token cancelled whenever this one is.
    pub fn child(&self) -> Self {
        Self {
            progress: self.progress.clone(),
            cancel_predicate: self.cancel_predicate.clone(),
            token: self.token.child_token(),
        }
    }

    /// Forward progress to the callback, if any. Percentages are clamped.
    pub fn report(&self, percent: f64, message: &str) {
        if let Some(progress) = &self.progress {
            let percent = if percent.is_nan() { 0.0 } else { percent.clamp(0.0, 100.0) };
            let _ = catch_unwind(AssertUnwindSafe(|| progress(percent, message)));
        }
    }

    pub fn is_cancelled(&self) -> bool {
        if self.token.is_cancelled() {
            return true;
        }
        match &self.cancel_predicate {
            Some(predicate) => catch_unwind(AssertUnwindSafe(|| predicate())).unwrap_or(false),
            None => false,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl fmt::Debug for ScanContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanContext")
            .field("progress", &self.progress.is_some())
            .field("cancel_predicate", &self.cancel_predicate.is_some())
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn progress_is_clamped() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let ctx = ScanContext::new().with_progress(move |pct, msg| {
            sink.lock().unwrap().push((pct, msg.to_string()));
        });
        ctx.report(-5.0, "a");
        ctx.report(250.0, "b");
        ctx.report(f64::NAN, "c");
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(0.0, "a".to_string()), (100.0, "b".to_string()), (0.0, "c".to_string())]
        );
    }

    #[test]
    fn panicking_callbacks_are_ignored() {
        let ctx = ScanContext::new()
            .with_progress(|_, _| panic!("progress hook failed"))
            .with_cancel_predicate(|| panic!("cancel hook failed"));
        ctx.report(10.0, "still running");
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn predicate_cancels() {
        let flag = Arc::new(AtomicBool::new(false));
        let watched = Arc::clone(&flag);
        let ctx = ScanContext::new().with_cancel_predicate(move || watched.load(Ordering::Relaxed));
        assert!(!ctx.is_cancelled());
        flag.store(true, Ordering::Relaxed);
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn child_follows_parent_cancellation() {
        let parent = ScanContext::new();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());

        let second = parent.child();
        parent.cancel();
        assert!(second.is_cancelled());
    }
}
