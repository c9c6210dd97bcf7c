use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};

use crate::core_api::CoreError;
use crate::identity::ExcludedPlugins;
use crate::store::RecordStore;

/// Cooperative cancellation flag shared between a pass and its caller.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub fn check(&self, stage: &str) -> Result<(), CoreError> {
        if self.is_cancelled() {
            return Err(CoreError::cancelled(stage));
        }
        Ok(())
    }
}

/// Receives human-readable status lines. Purely observational.
pub trait ProgressSink {
    fn report(&self, status: &str);
}

impl<F: Fn(&str)> ProgressSink for F {
    fn report(&self, status: &str) {
        self(status)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _status: &str) {}
}

/// Forwards status lines to the `tracing` subscriber at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, status: &str) {
        tracing::info!(domain = "progress", "{status}");
    }
}

/// Everything a candidate provider needs for one pass.
pub struct ExtractionContext<'a> {
    pub store: &'a dyn RecordStore,
    pub cancel: &'a CancellationToken,
    pub progress: &'a dyn ProgressSink,
    pub started_at: DateTime<Utc>,
    pub excluded: &'a ExcludedPlugins,
}

impl<'a> ExtractionContext<'a> {
    pub fn new(
        store: &'a dyn RecordStore,
        cancel: &'a CancellationToken,
        progress: &'a dyn ProgressSink,
        excluded: &'a ExcludedPlugins,
    ) -> Self {
        Self {
            store,
            cancel,
            progress,
            started_at: Utc::now(),
            excluded,
        }
    }

    pub fn checkpoint(&self, stage: &str) -> Result<(), CoreError> {
        self.cancel.check(stage)
    }

    pub fn is_excluded(&self, plugin: &str) -> bool {
        self.excluded.contains(plugin)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::core_api::CoreErrorCode;

    #[test]
    fn token_clones_share_state() {
        let token = CancellationToken::new();
        let observer = token.clone();
        assert!(observer.check("scan").is_ok());
        token.cancel();
        let err = observer.check("scan").expect_err("cancelled token should fail");
        assert_eq!(err.code, CoreErrorCode::Cancelled);
    }

    #[test]
    fn closures_are_progress_sinks() {
        let seen = RefCell::new(Vec::new());
        let sink = |status: &str| seen.borrow_mut().push(status.to_string());
        sink.report("indexing");
        assert_eq!(seen.borrow().as_slice(), ["indexing".to_string()]);
    }
}
