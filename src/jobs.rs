//! # Background Receipt Jobs
//!
//! Runs pipeline invocations as tokio tasks so a caller can hand off an
//! upload and poll for the draft later.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::draft::ReceiptDraft;
use crate::pipeline::ReceiptPipeline;
use crate::receipt_errors::ReceiptError;

/// Handle for a submitted job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "receipt-job-{}", self.0)
    }
}

/// Where a job stands
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Pending,
    Completed(ReceiptDraft),
    Failed(ReceiptError),
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

/// Registry of background pipeline runs
#[derive(Clone)]
pub struct ReceiptJobs {
    pipeline: Arc<ReceiptPipeline>,
    jobs: Arc<Mutex<HashMap<JobId, JobStatus>>>,
    next_id: Arc<AtomicU64>,
}

impl ReceiptJobs {
    pub fn new(pipeline: Arc<ReceiptPipeline>) -> Self {
        Self {
            pipeline,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Start processing `image_path` in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, image_path: PathBuf, deadline: Option<Duration>) -> JobId {
        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.jobs.lock().insert(id, JobStatus::Pending);

        let pipeline = Arc::clone(&self.pipeline);
        let jobs = Arc::clone(&self.jobs);
        info!(job_id = %id, image_path = %image_path.display(), "Receipt job submitted");

        tokio::spawn(async move {
            let status = match pipeline.process(&image_path, deadline).await {
                Ok(draft) => JobStatus::Completed(draft),
                Err(error) => JobStatus::Failed(error),
            };
            debug!(job_id = %id, finished = status.is_finished(), "Receipt job finished");

            // A job taken out while pending is not put back.
            let mut jobs = jobs.lock();
            if let Some(slot) = jobs.get_mut(&id) {
                *slot = status;
            }
        });

        id
    }

    /// Current status, leaving the entry in place
    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        self.jobs.lock().get(&id).cloned()
    }

    /// Remove and return a finished job. Pending jobs stay registered and
    /// are reported as `Pending`.
    pub fn take(&self, id: JobId) -> Option<JobStatus> {
        let mut jobs = self.jobs.lock();
        match jobs.get(&id) {
            Some(JobStatus::Pending) => Some(JobStatus::Pending),
            Some(_) => jobs.remove(&id),
            None => None,
        }
    }

    /// Drop a job regardless of its state; a running job finishes unobserved
    pub fn forget(&self, id: JobId) -> bool {
        self.jobs.lock().remove(&id).is_some()
    }

    /// Number of jobs still running
    pub fn pending_count(&self) -> usize {
        self.jobs
            .lock()
            .values()
            .filter(|status| !status.is_finished())
            .count()
    }

    /// Number of registered jobs, finished or not
    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}
