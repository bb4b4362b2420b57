pub mod controller;

use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use timetable_core::Solver;
use tracing::{debug, error, info};
use types::{SolverConfig, SolverInput, SolverMessage, SolverProgress, SolverResult};
use utoipa::ToSchema;
use uuid::Uuid;

pub use controller::{RunController, RunHandle, RunState};

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, ToSchema)]
pub struct JobId(pub String);

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum JobStatus {
    Queued,
    Running { progress: Option<SolverProgress> },
    Solved { patterns: Vec<SolverResult> },
    Failed { message: String },
    Aborted,
}

impl JobStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Running { .. })
    }
}

/// Settled jobs kept for lookup before the oldest are dropped.
pub const DEFAULT_RETAINED_JOBS: usize = 32;

/// Job table fed by a [`RunController`]. Only the newest job runs;
/// enqueueing another aborts it. At most `retain` jobs are remembered.
pub struct InMemJobs<S: Solver> {
    inner: Arc<RwLock<HashMap<String, JobStatus>>>,
    controller: Arc<RunController<S>>,
    current: Arc<Mutex<Option<String>>>,
    order: Arc<Mutex<VecDeque<String>>>,
    retain: usize,
}

impl<S: Solver> Clone for InMemJobs<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            controller: self.controller.clone(),
            current: self.current.clone(),
            order: self.order.clone(),
            retain: self.retain,
        }
    }
}

impl<S: Solver> InMemJobs<S> {
    pub fn new(solver: S) -> Self {
        Self {
            inner: Default::default(),
            controller: Arc::new(RunController::new(solver)),
            current: Default::default(),
            order: Default::default(),
            retain: DEFAULT_RETAINED_JOBS,
        }
    }

    pub fn with_retention(mut self, retain: usize) -> Self {
        self.retain = retain.max(1);
        self
    }

    pub async fn enqueue(&self, input: SolverInput, config: SolverConfig) -> JobId {
        let id = Uuid::new_v4().to_string();
        self.inner.write().insert(id.clone(), JobStatus::Queued);
        let prev = self.current.lock().replace(id.clone());
        if let Some(prev) = prev {
            settle(&self.inner, &prev, JobStatus::Aborted);
        }
        self.order.lock().push_back(id.clone());
        self.prune();

        let mut handle = self.controller.start(input, config).await;
        self.update(&id, |s| {
            if matches!(s, JobStatus::Queued) {
                *s = JobStatus::Running { progress: None };
            }
        });
        info!(job = %id, run = handle.run, "job started");

        let map = self.inner.clone();
        let id_for_task = id.clone();
        tokio::spawn(async move {
            while let Some(msg) = handle.messages.recv().await {
                let mut w = map.write();
                let Some(status) = w.get_mut(&id_for_task) else {
                    break;
                };
                if !status.is_active() {
                    continue;
                }
                *status = match msg {
                    SolverMessage::Progress(p) => JobStatus::Running { progress: Some(p) },
                    SolverMessage::Result { patterns } => JobStatus::Solved { patterns },
                    SolverMessage::Error { message } => {
                        error!(job = %id_for_task, %message, "job failed");
                        JobStatus::Failed { message }
                    }
                };
            }
            settle(&map, &id_for_task, JobStatus::Aborted);
        });

        JobId(id)
    }

    /// Aborts job `id` if it is the active one. Returns its status after
    /// the request, or `None` for an unknown id.
    pub fn abort(&self, id: &str) -> Option<JobStatus> {
        if self.current.lock().as_deref() == Some(id) && self.controller.abort() {
            settle(&self.inner, id, JobStatus::Aborted);
        }
        self.get(id)
    }

    pub fn get(&self, id: &str) -> Option<JobStatus> {
        self.inner.read().get(id).cloned()
    }

    pub fn run_state(&self) -> RunState {
        self.controller.state()
    }

    /// Forgets the oldest settled jobs beyond the retention cap.
    fn prune(&self) {
        let mut order = self.order.lock();
        let mut map = self.inner.write();
        while order.len() > self.retain {
            let Some(pos) = order
                .iter()
                .position(|id| map.get(id).map_or(true, |s| !s.is_active()))
            else {
                break;
            };
            if let Some(id) = order.remove(pos) {
                map.remove(&id);
                debug!(job = %id, "job forgotten");
            }
        }
    }

    fn update(&self, id: &str, f: impl FnOnce(&mut JobStatus)) {
        if let Some(s) = self.inner.write().get_mut(id) {
            f(s);
        }
    }
}

/// Replaces a still-active status with `to`.
fn settle(map: &RwLock<HashMap<String, JobStatus>>, id: &str, to: JobStatus) {
    if let Some(s) = map.write().get_mut(id) {
        if s.is_active() {
            *s = to;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solver_heur::HeurSolver;
    use std::time::Duration;
    use test_support::{quick_config, school_week, InputBuilder};

    async fn wait_settled(jobs: &InMemJobs<HeurSolver>, id: &str) -> JobStatus {
        for _ in 0..400 {
            match jobs.get(id) {
                Some(s) if !s.is_active() => return s,
                _ => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
        panic!("job {id} never settled");
    }

    #[tokio::test]
    async fn job_runs_to_solved() {
        let jobs = InMemJobs::new(HeurSolver::new());
        let input = InputBuilder::new(5, 6)
            .koma("m", "math", &["t1"], &["1A"], 3)
            .build();
        let id = jobs.enqueue(input, quick_config(1)).await;
        match wait_settled(&jobs, &id.0).await {
            JobStatus::Solved { patterns } => assert!(patterns[0].is_complete),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(jobs.run_state(), RunState::Completed);
        assert!(jobs.get("nope").is_none());
    }

    #[tokio::test]
    async fn abort_and_replacement_mark_jobs_aborted() {
        let jobs = InMemJobs::new(HeurSolver::new());
        let config = SolverConfig {
            max_time_ms: 300_000,
            max_patterns: 10,
            ils_restarts: 20,
            seed: 0,
        };
        let a = jobs.enqueue(school_week(8, 10), config.clone()).await;
        let b = jobs.enqueue(school_week(8, 10), config).await;
        assert!(matches!(jobs.get(&a.0), Some(JobStatus::Aborted)));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(jobs.abort(&b.0), Some(JobStatus::Aborted)));
        assert!(matches!(wait_settled(&jobs, &b.0).await, JobStatus::Aborted));
        assert_eq!(jobs.run_state(), RunState::Aborted);
    }

    #[tokio::test]
    async fn oldest_settled_jobs_are_forgotten() {
        let jobs = InMemJobs::new(HeurSolver::new()).with_retention(2);
        let input = InputBuilder::new(5, 6)
            .koma("m", "math", &["t1"], &["1A"], 2)
            .build();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let id = jobs.enqueue(input.clone(), quick_config(1)).await;
            wait_settled(&jobs, &id.0).await;
            ids.push(id.0);
        }
        assert!(jobs.get(&ids[0]).is_none());
        assert!(matches!(jobs.get(&ids[1]), Some(JobStatus::Solved { .. })));
        assert!(matches!(jobs.get(&ids[2]), Some(JobStatus::Solved { .. })));
        assert_eq!(jobs.order.lock().len(), 2);
    }
}
