//! Durable job queue for asynchronous registrations.
//!
//! Every job is a [`JobRecord`] persisted through a [`JobStore`]. Each state
//! the orchestrator enters is written back to the record, so a caller can
//! poll progress and a restarted process can pick up unfinished jobs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use provena_types::{
    JobKind, JobRecord, JobStatus, ModelRunRecord, ProvenaError, RegistrationState, Result,
};

use crate::orchestrator::{LifecycleOrchestrator, RegistrationRequest, TransitionSink};

// ---------------------------------------------------------------------------
// Job storage
// ---------------------------------------------------------------------------

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<JobRecord>>;
    async fn put(&self, job: &JobRecord) -> Result<()>;
    async fn list(&self) -> Result<Vec<JobRecord>>;
}

/// One pretty-printed JSON file per job under a root directory.
pub struct FileJobStore {
    root: PathBuf,
}

impl FileJobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &str) -> PathBuf {
        let mut name = String::with_capacity(id.len() + 5);
        for byte in id.bytes() {
            if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.') {
                name.push(byte as char);
            } else {
                name.push_str(&format!("%{byte:02X}"));
            }
        }
        name.push_str(".json");
        self.root.join(name)
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn get(&self, id: &str) -> Result<Option<JobRecord>> {
        match tokio::fs::read_to_string(self.path_for(id)).await {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, job: &JobRecord) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.path_for(&job.id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(job)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!(job_id = %job.id, status = ?job.status, stage = ?job.stage, "Job saved");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<JobRecord>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut jobs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let json = tokio::fs::read_to_string(&path).await?;
            jobs.push(serde_json::from_str::<JobRecord>(&json)?);
        }
        jobs.sort_by(|a, b| {
            a.created_timestamp
                .cmp(&b.created_timestamp)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(jobs)
    }
}

// ---------------------------------------------------------------------------
// Transition recording
// ---------------------------------------------------------------------------

/// Writes each registration state onto the job record.
struct JobTransitions {
    store: Arc<dyn JobStore>,
    job_id: String,
}

#[async_trait]
impl TransitionSink for JobTransitions {
    async fn record(
        &self,
        state: RegistrationState,
        record_id: Option<&str>,
        info: Option<&str>,
    ) -> Result<()> {
        let mut job = self
            .store
            .get(&self.job_id)
            .await?
            .ok_or_else(|| ProvenaError::JobNotFound {
                id: self.job_id.clone(),
            })?;
        // Final status is written by the worker after `execute` returns.
        job.stage = Some(state);
        job.status = JobStatus::InProgress;
        if let Some(info) = info {
            job.info = Some(info.to_string());
        }
        if let Some(record_id) = record_id {
            job.result = Some(serde_json::json!({ "record_id": record_id }));
        }
        job.touch();
        self.store.put(&job).await
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// Accepts registration jobs and runs them one at a time on a worker task.
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn JobStore>,
    sender: mpsc::Sender<String>,
    submit_lock: Arc<Mutex<()>>,
}

impl JobQueue {
    /// Spawn the worker and re-enqueue jobs left pending or in progress.
    pub async fn start(
        orchestrator: LifecycleOrchestrator,
        store: Arc<dyn JobStore>,
        capacity: usize,
    ) -> Result<(Self, JoinHandle<()>)> {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(orchestrator, store.clone(), receiver));

        let queue = Self {
            store,
            sender,
            submit_lock: Arc::new(Mutex::new(())),
        };
        for job in queue.store.list().await? {
            if job.status.is_active() {
                tracing::info!(job_id = %job.id, "Resuming unfinished job");
                queue.enqueue(job.id).await?;
            }
        }
        Ok((queue, worker))
    }

    /// Queue a new model run registration under a fresh job id.
    pub async fn submit_registration(&self, record: ModelRunRecord) -> Result<JobRecord> {
        let id = uuid::Uuid::new_v4().to_string();
        self.submit(id, RegistrationRequest::New { record }).await
    }

    /// Queue a re-lodge of `record_id`. At most one such job runs per record.
    pub async fn submit_relodge(
        &self,
        record_id: impl Into<String>,
        record: ModelRunRecord,
    ) -> Result<JobRecord> {
        let record_id = record_id.into();
        let id = format!("relodge-{record_id}");
        self.submit(id, RegistrationRequest::Relodge { record_id, record })
            .await
    }

    /// Queue `request` as job `id`.
    ///
    /// If a job with that id is pending, running or has succeeded, it is
    /// returned unchanged and nothing is queued. A failed job is reset and
    /// queued again.
    pub async fn submit(&self, id: String, request: RegistrationRequest) -> Result<JobRecord> {
        let _guard = self.submit_lock.lock().await;

        let kind = match request {
            RegistrationRequest::New { .. } | RegistrationRequest::Resume { .. } => {
                JobKind::RegisterModelRun
            }
            RegistrationRequest::Relodge { .. } => JobKind::RelodgeModelRun,
        };
        let payload = serde_json::to_value(&request)?;

        let job = match self.store.get(&id).await? {
            Some(existing) if existing.status != JobStatus::Failed => {
                tracing::info!(job_id = %id, status = ?existing.status, "Job already submitted");
                return Ok(existing);
            }
            Some(failed) => {
                tracing::info!(job_id = %id, "Re-queueing failed job");
                let mut job = JobRecord::pending(id.clone(), kind, payload);
                job.created_timestamp = failed.created_timestamp;
                // Keep the handle minted by the failed attempt.
                if minted_record_id(&failed).is_some() {
                    job.result = failed.result;
                }
                job
            }
            None => JobRecord::pending(id.clone(), kind, payload),
        };

        self.store.put(&job).await?;
        self.enqueue(id).await?;
        Ok(job)
    }

    pub async fn status(&self, id: &str) -> Result<JobRecord> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| ProvenaError::JobNotFound { id: id.to_string() })
    }

    pub async fn list(&self) -> Result<Vec<JobRecord>> {
        self.store.list().await
    }

    async fn enqueue(&self, id: String) -> Result<()> {
        self.sender
            .send(id)
            .await
            .map_err(|_| ProvenaError::Other("job queue worker has stopped".into()))
    }
}

async fn run_worker(
    orchestrator: LifecycleOrchestrator,
    store: Arc<dyn JobStore>,
    mut receiver: mpsc::Receiver<String>,
) {
    while let Some(job_id) = receiver.recv().await {
        if let Err(e) = process(&orchestrator, &store, &job_id).await {
            tracing::error!(job_id = %job_id, error = %e, "Job processing failed");
        }
    }
    tracing::debug!("Job queue worker stopped");
}

async fn process(
    orchestrator: &LifecycleOrchestrator,
    store: &Arc<dyn JobStore>,
    job_id: &str,
) -> Result<()> {
    let Some(job) = store.get(job_id).await? else {
        return Err(ProvenaError::JobNotFound {
            id: job_id.to_string(),
        });
    };
    if !job.status.is_active() {
        tracing::debug!(job_id, status = ?job.status, "Skipping job that is no longer active");
        return Ok(());
    }

    let request: RegistrationRequest = match serde_json::from_value(job.payload.clone()) {
        Ok(request) => resume_request(&job, request),
        Err(e) => {
            let mut job = job;
            job.status = JobStatus::Failed;
            job.stage = Some(RegistrationState::Failed);
            job.info = Some(format!("Unreadable job payload: {e}"));
            job.touch();
            return store.put(&job).await;
        }
    };

    let sink = JobTransitions {
        store: store.clone(),
        job_id: job_id.to_string(),
    };
    let outcome = orchestrator.execute(&request, job_id, &sink).await;

    let mut job = store
        .get(job_id)
        .await?
        .ok_or_else(|| ProvenaError::JobNotFound {
            id: job_id.to_string(),
        })?;
    match outcome {
        Ok(outcome) => {
            job.status = JobStatus::Succeeded;
            job.info = None;
            job.result = Some(serde_json::to_value(&outcome)?);
        }
        Err(e) => {
            job.status = JobStatus::Failed;
            job.info = Some(e.to_string());
        }
    }
    job.touch();
    store.put(&job).await?;
    tracing::info!(job_id, status = ?job.status, "Job finished");
    Ok(())
}

/// Handle recorded on the job by an earlier attempt, if one was minted.
fn minted_record_id(job: &JobRecord) -> Option<&str> {
    job.result.as_ref()?.get("record_id")?.as_str()
}

/// A new registration that already owns a handle continues under it.
fn resume_request(job: &JobRecord, request: RegistrationRequest) -> RegistrationRequest {
    match (request, minted_record_id(job)) {
        (RegistrationRequest::New { record }, Some(record_id)) => {
            tracing::info!(job_id = %job.id, record_id, "Resuming registration under minted handle");
            RegistrationRequest::Resume {
                record_id: record_id.to_string(),
                record,
            }
        }
        (request, _) => request,
    }
}
