// DownloadQueue - accepts jobs and runs them on a bounded set of workers

use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error};
use uuid::Uuid;

use super::jobs::JobStore;
use super::orchestrator::Orchestrator;

#[derive(Clone)]
pub struct DownloadQueue {
    jobs: JobStore,
    orchestrator: Arc<Orchestrator>,
    permits: Arc<Semaphore>,
}

impl DownloadQueue {
    /// At most `max_concurrent` jobs download at once; the rest wait in `processing`
    pub fn new(orchestrator: Arc<Orchestrator>, max_concurrent: usize) -> Self {
        Self {
            jobs: orchestrator.jobs().clone(),
            orchestrator,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub fn jobs(&self) -> &JobStore {
        &self.jobs
    }

    /// Registers the job and returns its id without waiting for any work.
    /// The record exists before this returns, so an immediate poll finds it.
    pub fn submit(&self, url: &str, quality: &str) -> String {
        let job_id = loop {
            let candidate = format!("dl-{}", Uuid::new_v4().simple());
            if self.jobs.create(&candidate) {
                break candidate;
            }
        };

        let jobs = self.jobs.clone();
        let orchestrator = Arc::clone(&self.orchestrator);
        let permits = Arc::clone(&self.permits);
        let url = url.to_string();
        let quality = quality.to_string();
        let id = job_id.clone();

        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                jobs.fail(&id, "Download queue is shut down");
                return;
            };
            debug!(job_id = %id, "worker slot acquired");

            // Inner task so a panic still lands the job in a terminal state
            let worker_id = id.clone();
            let result = tokio::spawn(async move {
                orchestrator.run(&url, &quality, &worker_id).await;
            })
            .await;

            if let Err(e) = result {
                error!(job_id = %id, "download task aborted: {}", e);
                jobs.fail(&id, format!("Internal error: {}", e));
            }
        });

        job_id
    }
}
