//! Cooperative cancellation and progress plumbing shared by solver phases.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use types::SolverProgress;

use crate::SolveError;

/// Cancellation flag polled at loop boundaries.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub trait ProgressSink: Send {
    fn emit(&mut self, progress: SolverProgress);
}

impl<F> ProgressSink for F
where
    F: FnMut(SolverProgress) + Send,
{
    fn emit(&mut self, progress: SolverProgress) {
        self(progress)
    }
}

/// Per-run handle passed down through construction and search.
pub struct RunContext {
    cancel: CancelToken,
    started: Instant,
    sink: Box<dyn ProgressSink>,
}

impl RunContext {
    pub fn new(cancel: CancelToken, sink: impl ProgressSink + 'static) -> Self {
        Self {
            cancel,
            started: Instant::now(),
            sink: Box::new(sink),
        }
    }

    /// A context nobody listens to and nobody cancels.
    pub fn detached() -> Self {
        Self::new(CancelToken::new(), |_: SolverProgress| {})
    }

    pub fn checkpoint(&self) -> Result<(), SolveError> {
        if self.cancel.is_cancelled() {
            return Err(SolveError::Aborted);
        }
        Ok(())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn report(&mut self, progress: SolverProgress) {
        self.sink.emit(progress);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use types::Phase;

    #[test]
    fn checkpoint_fails_after_cancel() {
        let token = CancelToken::new();
        let ctx = RunContext::new(token.clone(), |_: SolverProgress| {});
        assert!(ctx.checkpoint().is_ok());
        token.cancel();
        assert!(matches!(ctx.checkpoint(), Err(SolveError::Aborted)));
    }

    #[test]
    fn report_reaches_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            move |p: SolverProgress| seen.lock().unwrap().push(p.placed_count)
        };
        let mut ctx = RunContext::new(CancelToken::new(), sink);
        ctx.report(SolverProgress {
            phase_label: Phase::Construct,
            placed_count: 3,
            total_komas: 5,
            pattern_index: 0,
            total_patterns: 1,
            score: 0,
            elapsed_ms: 0,
            message: None,
        });
        assert_eq!(*seen.lock().unwrap(), vec![3]);
    }
}
