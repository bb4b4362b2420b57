//! Run Controller: one background solver run at a time.
//!
//! `idle -> running -> (completed | errored | aborted)`. A run executes on
//! tokio's blocking pool and talks to its caller only through a bounded
//! channel of [`SolverMessage`]s. Progress is best effort and dropped when
//! the channel is full; the final result or error is always delivered
//! unless the run was aborted.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use timetable_core::{CancelToken, RunContext, SolveError, Solver};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use types::{SolverConfig, SolverInput, SolverMessage, SolverProgress};
use utoipa::ToSchema;

pub const CHANNEL_CAPACITY: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Errored,
    Aborted,
}

pub struct RunHandle {
    pub run: u64,
    pub messages: mpsc::Receiver<SolverMessage>,
}

struct Shared {
    state: RunState,
    run: u64,
}

struct Active {
    run: u64,
    cancel: CancelToken,
    task: JoinHandle<()>,
}

pub struct RunController<S: Solver> {
    solver: Arc<S>,
    shared: Arc<Mutex<Shared>>,
    active: Mutex<Option<Active>>,
}

impl<S: Solver> RunController<S> {
    pub fn new(solver: S) -> Self {
        Self {
            solver: Arc::new(solver),
            shared: Arc::new(Mutex::new(Shared {
                state: RunState::Idle,
                run: 0,
            })),
            active: Mutex::new(None),
        }
    }

    pub fn state(&self) -> RunState {
        self.shared.lock().state
    }

    /// Starts a run, first stopping and awaiting the previous one.
    pub async fn start(&self, input: SolverInput, config: SolverConfig) -> RunHandle {
        self.abort_and_wait().await;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let cancel = CancelToken::new();
        let run = {
            let mut s = self.shared.lock();
            s.run += 1;
            s.state = RunState::Running;
            s.run
        };
        info!(run, patterns = config.max_patterns, max_time_ms = config.max_time_ms, "run started");

        let solver = self.solver.clone();
        let shared = self.shared.clone();
        let token = cancel.clone();
        let task = tokio::task::spawn_blocking(move || {
            let progress_tx = tx.clone();
            let mut ctx = RunContext::new(token.clone(), move |p: SolverProgress| {
                let _ = progress_tx.try_send(SolverMessage::Progress(p));
            });
            let outcome = catch_unwind(AssertUnwindSafe(|| solver.solve(&input, &config, &mut ctx)))
                .unwrap_or_else(|_| Err(SolveError::Internal("solver panicked".into())));
            let (state, message) = match outcome {
                Ok(patterns) if !token.is_cancelled() => {
                    (RunState::Completed, Some(SolverMessage::Result { patterns }))
                }
                Ok(_) | Err(SolveError::Aborted) => (RunState::Aborted, None),
                Err(e) => {
                    warn!(run, error = %e, "run failed");
                    (
                        RunState::Errored,
                        Some(SolverMessage::Error {
                            message: e.to_string(),
                        }),
                    )
                }
            };
            if settle(&shared, run, state) {
                info!(run, ?state, "run finished");
                if let Some(m) = message {
                    let _ = tx.blocking_send(m);
                }
            }
        });

        *self.active.lock() = Some(Active { run, cancel, task });
        RunHandle { run, messages: rx }
    }

    /// Requests the active run to stop. Returns false if nothing was running.
    pub fn abort(&self) -> bool {
        let active = self.active.lock();
        let Some(a) = active.as_ref() else {
            return false;
        };
        a.cancel.cancel();
        let aborted = settle(&self.shared, a.run, RunState::Aborted);
        if aborted {
            info!(run = a.run, "run aborted");
        }
        aborted
    }

    async fn abort_and_wait(&self) {
        let prev = self.active.lock().take();
        if let Some(a) = prev {
            a.cancel.cancel();
            settle(&self.shared, a.run, RunState::Aborted);
            if let Err(e) = a.task.await {
                warn!(run = a.run, error = %e, "previous run did not join cleanly");
            }
        }
    }
}

/// Moves run `run` out of `running`; a no-op if a newer run took over or
/// the run already settled.
fn settle(shared: &Mutex<Shared>, run: u64, to: RunState) -> bool {
    let mut s = shared.lock();
    if s.run != run || s.state != RunState::Running {
        return false;
    }
    s.state = to;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use solver_heur::HeurSolver;
    use std::time::Duration;
    use test_support::{quick_config, school_week, InputBuilder};
    use tokio::time::timeout;

    async fn drain(rx: &mut mpsc::Receiver<SolverMessage>) -> Vec<SolverMessage> {
        let mut out = Vec::new();
        while let Some(m) = rx.recv().await {
            out.push(m);
        }
        out
    }

    fn big_config() -> SolverConfig {
        SolverConfig {
            max_time_ms: 300_000,
            max_patterns: 10,
            ils_restarts: 20,
            seed: 0,
        }
    }

    #[tokio::test]
    async fn completed_run_delivers_one_result() {
        let ctl = RunController::new(HeurSolver::new());
        assert_eq!(ctl.state(), RunState::Idle);
        let input = InputBuilder::new(5, 6)
            .koma("m", "math", &["t1"], &["1A"], 2)
            .build();
        let mut h = ctl.start(input, quick_config(1)).await;
        let msgs = timeout(Duration::from_secs(20), drain(&mut h.messages)).await.unwrap();
        let results = msgs
            .iter()
            .filter(|m| matches!(m, SolverMessage::Result { .. }))
            .count();
        assert_eq!(results, 1);
        assert!(matches!(msgs.last(), Some(SolverMessage::Result { .. })));
        assert!(msgs.iter().any(|m| matches!(m, SolverMessage::Progress(_))));
        assert_eq!(ctl.state(), RunState::Completed);
    }

    #[tokio::test]
    async fn abort_soon_after_start_emits_no_result() {
        let ctl = RunController::new(HeurSolver::new());
        let mut h = ctl.start(school_week(8, 10), big_config()).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(ctl.abort());
        assert_eq!(ctl.state(), RunState::Aborted);

        let msgs = timeout(Duration::from_millis(500), drain(&mut h.messages))
            .await
            .expect("run winds down promptly");
        assert!(msgs.iter().all(|m| matches!(m, SolverMessage::Progress(_))));
        assert_eq!(ctl.state(), RunState::Aborted);
        assert!(!ctl.abort(), "already settled");
    }

    #[tokio::test]
    async fn new_run_replaces_the_active_one() {
        let ctl = RunController::new(HeurSolver::new());
        let mut first = ctl.start(school_week(8, 10), big_config()).await;
        let input = InputBuilder::new(5, 6)
            .koma("m", "math", &["t1"], &["1A"], 1)
            .build();
        let mut second = ctl.start(input, quick_config(1)).await;
        assert_eq!(second.run, first.run + 1);

        let old = drain(&mut first.messages).await;
        assert!(old.iter().all(|m| matches!(m, SolverMessage::Progress(_))));
        let new = timeout(Duration::from_secs(20), drain(&mut second.messages)).await.unwrap();
        assert!(matches!(new.last(), Some(SolverMessage::Result { .. })));
        assert_eq!(ctl.state(), RunState::Completed);
    }

    #[tokio::test]
    async fn invalid_input_errors() {
        let ctl = RunController::new(HeurSolver::new());
        let mut input = school_week(1, 1);
        input.komas[0].count = 0;
        let mut h = ctl.start(input, quick_config(1)).await;
        let msgs = timeout(Duration::from_secs(5), drain(&mut h.messages)).await.unwrap();
        match msgs.last() {
            Some(SolverMessage::Error { message }) => assert!(message.contains("count=0"), "{message}"),
            other => panic!("expected error, got {other:?}"),
        }
        assert_eq!(ctl.state(), RunState::Errored);
    }
}
