pub mod telemetry;

use anyhow::Context;
use parking_lot::{Mutex, RwLock};
use sched_core::{Allocator, Catalog, GenerateError, StoreError, TimetableStore};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use types::{
    ConflictReport, GenerateRequest, Generated, Horizon, RoomId, SessionId, TimeInterval,
    Timetable,
};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct JobId(pub String);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "status")]
pub enum JobStatus {
    Queued,
    Running,
    Completed { summary: String, result: Generated },
    Cancelled,
    Failed { message: String },
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, JobStatus::Queued | JobStatus::Running)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("a generation run for {0} is already in flight")]
    HorizonBusy(Horizon),
    #[error("no timetable has been published for {0}")]
    NotPublished(Horizon),
    #[error(transparent)]
    Store(#[from] StoreError),
}

struct Job {
    horizon: Horizon,
    status: watch::Sender<JobStatus>,
    cancel: CancellationToken,
}

type Published = Arc<RwLock<HashMap<Horizon, Arc<TimetableStore>>>>;

/// Background generation runs, one in flight per horizon.
///
/// A finished run replaces the horizon's published store in one swap; a
/// failed or cancelled run leaves it untouched. Readers always get a
/// consistent snapshot.
pub struct Registry<A: Allocator> {
    allocator: Arc<A>,
    jobs: Arc<RwLock<HashMap<String, Job>>>,
    in_flight: Arc<Mutex<HashMap<Horizon, String>>>,
    published: Published,
}

impl<A: Allocator> Registry<A> {
    pub fn new(allocator: A) -> Self {
        Self {
            allocator: Arc::new(allocator),
            jobs: Default::default(),
            in_flight: Default::default(),
            published: Default::default(),
        }
    }

    /// Queues a generation run for the request's horizon.
    pub fn enqueue(&self, request: GenerateRequest) -> Result<JobId, RegistryError> {
        let horizon = request.horizon.clone();
        let id = Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        {
            let mut in_flight = self.in_flight.lock();
            if in_flight.contains_key(&horizon) {
                return Err(RegistryError::HorizonBusy(horizon));
            }
            in_flight.insert(horizon.clone(), id.clone());
        }
        let (status, _) = watch::channel(JobStatus::Queued);
        self.jobs.write().insert(
            id.clone(),
            Job {
                horizon: horizon.clone(),
                status,
                cancel: cancel.clone(),
            },
        );
        info!(job = %id, %horizon, "generation queued");

        let task = RunTask {
            id: id.clone(),
            horizon,
            allocator: self.allocator.clone(),
            jobs: self.jobs.clone(),
            in_flight: self.in_flight.clone(),
            published: self.published.clone(),
        };
        tokio::spawn(task.run(request, cancel));
        Ok(JobId(id))
    }

    /// Requests cancellation. Returns false for unknown or finished jobs.
    pub fn cancel(&self, id: &JobId) -> bool {
        match self.jobs.read().get(&id.0) {
            Some(job) if !job.status.borrow().is_finished() => {
                job.cancel.cancel();
                info!(job = %id, horizon = %job.horizon, "cancellation requested");
                true
            }
            _ => false,
        }
    }

    pub fn status(&self, id: &JobId) -> Option<JobStatus> {
        self.jobs.read().get(&id.0).map(|j| j.status.borrow().clone())
    }

    /// Waits until the job reaches a final status. Any number of callers
    /// may wait on the same job.
    pub async fn wait(&self, id: &JobId) -> Option<JobStatus> {
        let mut rx = self.jobs.read().get(&id.0)?.status.subscribe();
        let finished = rx
            .wait_for(JobStatus::is_finished)
            .await
            .map(|status| status.clone());
        Some(match finished {
            Ok(status) => status,
            Err(_) => rx.borrow().clone(),
        })
    }

    pub fn is_busy(&self, horizon: &Horizon) -> bool {
        self.in_flight.lock().contains_key(horizon)
    }

    pub fn store(&self, horizon: &Horizon) -> Option<Arc<TimetableStore>> {
        self.published.read().get(horizon).cloned()
    }

    /// Snapshot of the published timetable.
    pub fn timetable(&self, horizon: &Horizon) -> Option<Timetable> {
        self.store(horizon).map(|s| s.snapshot())
    }

    pub fn edit_placement(
        &self,
        horizon: &Horizon,
        session_id: &SessionId,
        room_id: RoomId,
        interval: TimeInterval,
    ) -> Result<ConflictReport, RegistryError> {
        self.modify(horizon, |store| store.edit(session_id, room_id, interval))
    }

    pub fn remove_placement(
        &self,
        horizon: &Horizon,
        session_id: &SessionId,
    ) -> Result<(), RegistryError> {
        self.modify(horizon, |store| store.remove(session_id).map(|_| ()))
    }

    pub fn set_cancelled(
        &self,
        horizon: &Horizon,
        session_id: &SessionId,
        cancelled: bool,
    ) -> Result<(), RegistryError> {
        self.modify(horizon, |store| store.set_cancelled(session_id, cancelled))
    }

    // Lock order: in_flight, then published.
    fn modify<R>(
        &self,
        horizon: &Horizon,
        f: impl FnOnce(&mut TimetableStore) -> Result<R, StoreError>,
    ) -> Result<R, RegistryError> {
        let in_flight = self.in_flight.lock();
        if in_flight.contains_key(horizon) {
            return Err(RegistryError::HorizonBusy(horizon.clone()));
        }
        let mut published = self.published.write();
        let current = published
            .get(horizon)
            .ok_or_else(|| RegistryError::NotPublished(horizon.clone()))?;
        let mut next = TimetableStore::clone(current);
        let out = f(&mut next)?;
        published.insert(horizon.clone(), Arc::new(next));
        Ok(out)
    }
}

struct RunTask<A: Allocator> {
    id: String,
    horizon: Horizon,
    allocator: Arc<A>,
    jobs: Arc<RwLock<HashMap<String, Job>>>,
    in_flight: Arc<Mutex<HashMap<Horizon, String>>>,
    published: Published,
}

impl<A: Allocator> RunTask<A> {
    async fn run(self, request: GenerateRequest, cancel: CancellationToken) {
        if cancel.is_cancelled() {
            info!(job = %self.id, horizon = %self.horizon, "cancelled before start");
            self.finish(JobStatus::Cancelled, None);
            return;
        }
        self.set(JobStatus::Running);

        let catalog = Arc::new(Catalog::new(
            request.sessions.clone(),
            request.rooms.clone(),
        ));
        // A panicking allocator must not leave the horizon busy.
        let allocator = self.allocator.clone();
        let outcome =
            tokio::spawn(async move { allocator.generate(request, cancel).await }).await;
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(join) => {
                self.fail(anyhow::anyhow!(
                    "generation for {} aborted: {join}",
                    self.horizon
                ));
                return;
            }
        };
        match outcome {
            Ok(generated) => match rebuild(catalog, &generated) {
                Ok(store) => {
                    let summary = sched_core::summary::summary_line(&generated);
                    info!(job = %self.id, %summary, "timetable published");
                    self.finish(
                        JobStatus::Completed {
                            summary,
                            result: generated,
                        },
                        Some(store),
                    );
                }
                Err(e) => self.fail(e),
            },
            Err(GenerateError::Cancelled) => {
                warn!(job = %self.id, horizon = %self.horizon, "generation cancelled");
                self.finish(JobStatus::Cancelled, None);
            }
            Err(e) => {
                if e.is_structural() {
                    warn!(job = %self.id, horizon = %self.horizon, "catalog rejected");
                }
                let e = anyhow::Error::new(e)
                    .context(format!("generation for {} failed", self.horizon));
                self.fail(e);
            }
        }
    }

    fn fail(&self, e: anyhow::Error) {
        error!(job = %self.id, error = %format!("{e:#}"), "job failed");
        self.finish(
            JobStatus::Failed {
                message: format!("{e:#}"),
            },
            None,
        );
    }

    fn set(&self, status: JobStatus) {
        if let Some(job) = self.jobs.read().get(&self.id) {
            job.status.send_replace(status);
        }
    }

    // Status, publication and release of the horizon happen under one lock.
    fn finish(&self, status: JobStatus, store: Option<TimetableStore>) {
        {
            let mut in_flight = self.in_flight.lock();
            if let Some(store) = store {
                self.published
                    .write()
                    .insert(self.horizon.clone(), Arc::new(store));
            }
            self.set(status);
            in_flight.remove(&self.horizon);
        }
    }
}

fn rebuild(catalog: Arc<Catalog>, generated: &Generated) -> anyhow::Result<TimetableStore> {
    TimetableStore::from_timetable(catalog, generated.timetable.clone())
        .context("generated timetable does not fit its catalog")
}
