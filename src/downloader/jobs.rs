// JobStore - in-memory job tracking
//
// One record per download request. The orchestrator task owning a job is its
// only writer; status polls read snapshots. Every access to the map goes
// through a single mutex (insert, update, lookup, sweep).

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use super::errors::DownloadError;
use super::models::{DownloadedFile, VideoCatalog};
use super::utils::remove_file_if_exists;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Duration in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub views: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub filepath: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Output size in MB
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filesize: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    /// Download progress in percent while processing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f32>,
    #[serde(with = "time::serde::timestamp")]
    pub created_at: OffsetDateTime,
}

impl JobRecord {
    fn new(job_id: String, created_at: OffsetDateTime) -> Self {
        Self {
            job_id,
            title: None,
            author: None,
            length: None,
            views: None,
            thumbnail: None,
            status: JobStatus::Processing,
            error: None,
            filepath: None,
            filename: None,
            filesize: None,
            resolution: None,
            progress: None,
            created_at,
        }
    }
}

/// Result of a cleanup sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanupReport {
    pub deleted_files: Vec<String>,
    pub pruned_jobs: usize,
}

/// Shared handle to the job map
#[derive(Debug, Clone, Default)]
pub struct JobStore {
    jobs: Arc<Mutex<HashMap<String, JobRecord>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new job in `processing` state. Returns `false` if the id is taken.
    pub fn create(&self, job_id: &str) -> bool {
        self.create_at(job_id, OffsetDateTime::now_utc())
    }

    fn create_at(&self, job_id: &str, created_at: OffsetDateTime) -> bool {
        let mut jobs = self.jobs.lock();
        if jobs.contains_key(job_id) {
            return false;
        }
        jobs.insert(
            job_id.to_string(),
            JobRecord::new(job_id.to_string(), created_at),
        );
        true
    }

    pub fn get(&self, job_id: &str) -> Option<JobRecord> {
        self.jobs.lock().get(job_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    pub fn attach_metadata(&self, job_id: &str, catalog: &VideoCatalog) {
        self.update_processing(job_id, |job| {
            job.title = Some(catalog.title.clone());
            job.author = Some(catalog.author.clone());
            job.length = Some(catalog.length_seconds);
            job.views = Some(catalog.views);
            job.thumbnail = Some(catalog.thumbnail_url.clone());
        });
    }

    pub fn set_progress(&self, job_id: &str, percent: f32) {
        self.update_processing(job_id, |job| {
            job.progress = Some(percent.clamp(0.0, 100.0));
        });
    }

    /// Marks the job completed. Returns `false` if it was unknown or already terminal.
    pub fn complete(&self, job_id: &str, output: &DownloadedFile) -> bool {
        let done = self.update_processing(job_id, |job| {
            job.status = JobStatus::Completed;
            job.filepath = Some(output.filepath.clone());
            job.filename = Some(output.filename.clone());
            job.filesize = Some(output.filesize_mb);
            job.resolution = Some(output.resolution.clone());
            job.progress = Some(100.0);
        });
        if done {
            info!(job_id, filename = %output.filename, "download completed");
        }
        done
    }

    /// Marks the job failed. Returns `false` if it was unknown or already terminal.
    pub fn fail(&self, job_id: &str, message: impl Into<String>) -> bool {
        let message = message.into();
        let done = self.update_processing(job_id, |job| {
            job.status = JobStatus::Error;
            job.error = Some(message.clone());
        });
        if done {
            warn!(job_id, error = %message, "download failed");
        }
        done
    }

    fn update_processing(&self, job_id: &str, f: impl FnOnce(&mut JobRecord)) -> bool {
        let mut jobs = self.jobs.lock();
        match jobs.get_mut(job_id) {
            Some(job) if !job.status.is_terminal() => {
                f(job);
                true
            }
            Some(_) => {
                debug!(job_id, "ignoring update to finished job");
                false
            }
            None => false,
        }
    }

    /// Deletes files older than `max_age` and forgets finished jobs whose file is gone
    pub fn sweep(&self, download_dir: &Path, max_age: Duration) -> Result<CleanupReport, DownloadError> {
        self.sweep_at(download_dir, max_age, OffsetDateTime::now_utc())
    }

    fn sweep_at(
        &self,
        download_dir: &Path,
        max_age: Duration,
        now: OffsetDateTime,
    ) -> Result<CleanupReport, DownloadError> {
        let now_sys = SystemTime::from(now);
        let mut report = CleanupReport::default();

        for entry in std::fs::read_dir(download_dir)? {
            let entry = entry?;
            let path = entry.path();
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            let age = now_sys.duration_since(modified).unwrap_or(Duration::ZERO);
            if age <= max_age {
                continue;
            }
            // A concurrent sweep or job may already have removed it
            if remove_file_if_exists(&path)? {
                report
                    .deleted_files
                    .push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        // Snapshot finished jobs, check the filesystem without holding the lock
        let finished: Vec<(String, JobStatus, Option<PathBuf>, OffsetDateTime)> = self
            .jobs
            .lock()
            .values()
            .filter(|job| job.status.is_terminal())
            .map(|job| (job.job_id.clone(), job.status, job.filepath.clone(), job.created_at))
            .collect();

        let stale: Vec<String> = finished
            .into_iter()
            .filter(|(_, status, filepath, created_at)| {
                let file_gone = filepath.as_deref().map_or(true, |p| !p.exists());
                let expired = now - *created_at > max_age;
                file_gone && (*status == JobStatus::Completed || expired)
            })
            .map(|(job_id, ..)| job_id)
            .collect();

        {
            let mut jobs = self.jobs.lock();
            for job_id in &stale {
                if jobs.remove(job_id).is_some() {
                    report.pruned_jobs += 1;
                }
            }
        }

        info!(
            deleted = report.deleted_files.len(),
            pruned = report.pruned_jobs,
            "cleanup sweep finished"
        );
        Ok(report)
    }
}
