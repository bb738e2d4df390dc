// Muxer trait definition and job progress reporting

use async_trait::async_trait;
use std::path::Path;

use super::errors::DownloadError;
use super::jobs::JobStore;

/// Combines a video-only and an audio-only file into one container
#[async_trait]
pub trait Muxer: Send + Sync {
    /// Name of the muxer (for logging)
    fn name(&self) -> &'static str;

    /// Merge without re-encoding. On error no output file is left behind.
    async fn merge(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), DownloadError>;
}

/// Progress emitter writing into a job record
///
/// A stage maps 0..100 of one fetch onto `start..start + span` of the job, so
/// the two fetches of an adaptive pair report one continuous percentage.
#[derive(Debug, Clone)]
pub struct ProgressEmitter {
    jobs: JobStore,
    job_id: String,
    start: f32,
    span: f32,
}

impl ProgressEmitter {
    pub fn new(jobs: JobStore, job_id: impl Into<String>) -> Self {
        Self {
            jobs,
            job_id: job_id.into(),
            start: 0.0,
            span: 100.0,
        }
    }

    pub fn stage(&self, start: f32, span: f32) -> Self {
        Self {
            jobs: self.jobs.clone(),
            job_id: self.job_id.clone(),
            start,
            span,
        }
    }

    pub fn emit(&self, percent: f32) {
        let scaled = self.start + percent.clamp(0.0, 100.0) * self.span / 100.0;
        self.jobs.set_progress(&self.job_id, scaled);
    }
}
