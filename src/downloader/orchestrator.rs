// Orchestrator - drives one job from catalog lookup to a finished file

use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{info, warn};

use super::errors::DownloadError;
use super::extractors::StreamCatalog;
use super::format_selector::{select, QualityRequest};
use super::jobs::JobStore;
use super::models::{bytes_to_mb, DownloadedFile, Selection, StreamDescriptor};
use super::muxer::{merged_container, TempFileGuard};
use super::traits::{Muxer, ProgressEmitter};

pub struct Orchestrator {
    catalog: Arc<dyn StreamCatalog>,
    muxer: Arc<dyn Muxer>,
    jobs: JobStore,
    download_dir: PathBuf,
}

impl Orchestrator {
    pub fn new(
        catalog: Arc<dyn StreamCatalog>,
        muxer: Arc<dyn Muxer>,
        jobs: JobStore,
        download_dir: PathBuf,
    ) -> Self {
        Self {
            catalog,
            muxer,
            jobs,
            download_dir,
        }
    }

    pub fn jobs(&self) -> &JobStore {
        &self.jobs
    }

    /// Runs the job to completion. Every failure is recorded on the job;
    /// nothing is returned because nothing awaits this task.
    pub async fn run(&self, url: &str, quality: &str, job_id: &str) {
        info!(job_id, url, quality, "download started");

        match self.execute(url, quality, job_id).await {
            Ok(output) => {
                self.jobs.complete(job_id, &output);
            }
            Err(e) => {
                self.jobs.fail(job_id, e.to_string());
            }
        }
    }

    async fn execute(
        &self,
        url: &str,
        quality: &str,
        job_id: &str,
    ) -> Result<DownloadedFile, DownloadError> {
        let catalog = self.catalog.fetch_catalog(url).await?;
        self.jobs.attach_metadata(job_id, &catalog);

        let request = QualityRequest::parse(quality);
        let selection = select(&catalog.streams, &request)?;
        info!(
            job_id,
            adaptive = selection.is_adaptive(),
            format = %selection.primary().id,
            "stream selected"
        );

        let base = format!("{}_{}", job_id, timestamp());
        let progress = ProgressEmitter::new(self.jobs.clone(), job_id);

        match selection {
            Selection::Progressive(stream) => {
                self.fetch_progressive(url, &stream, &base, &request, &progress)
                    .await
            }
            Selection::Adaptive { video, audio } => {
                self.fetch_adaptive(url, &video, &audio, &base, &progress)
                    .await
            }
        }
    }

    async fn fetch_progressive(
        &self,
        url: &str,
        stream: &StreamDescriptor,
        base: &str,
        request: &QualityRequest,
        progress: &ProgressEmitter,
    ) -> Result<DownloadedFile, DownloadError> {
        let extension = progressive_extension(stream, request);
        // yt-dlp writes straight to the final name (--no-part); a failed
        // fetch must not leave a servable partial file behind
        let dest = TempFileGuard::new(
            self.download_dir.join(format!("{}.{}", base, extension)),
        );

        let fetched = self
            .catalog
            .fetch_stream(url, stream, dest.path(), progress)
            .await?;
        let written = written_guard(&fetched, &dest);
        let filepath = normalize_extension(&fetched, &extension)?;

        dest.keep();
        if let Some(guard) = written {
            guard.keep();
        }

        let filesize_mb = match stream.filesize {
            Some(bytes) => bytes_to_mb(bytes),
            None => file_size_mb(&filepath),
        };
        let resolution = if stream.is_audio_only() {
            "audio".to_string()
        } else {
            stream.resolution.clone().unwrap_or_else(|| "Unknown".to_string())
        };

        Ok(DownloadedFile {
            filename: file_name(&filepath),
            filepath,
            filesize_mb,
            resolution,
        })
    }

    async fn fetch_adaptive(
        &self,
        url: &str,
        video: &StreamDescriptor,
        audio: &StreamDescriptor,
        base: &str,
        progress: &ProgressEmitter,
    ) -> Result<DownloadedFile, DownloadError> {
        let video_ext = non_empty_or(&video.container, "mp4");
        let audio_ext = non_empty_or(&audio.container, "m4a");

        // Guards delete both temporaries on every return path below
        let video_tmp = TempFileGuard::new(
            self.download_dir
                .join(format!("{}_video.{}", base, video_ext)),
        );
        let audio_tmp = TempFileGuard::new(
            self.download_dir
                .join(format!("{}_audio.{}", base, audio_ext)),
        );

        let video_path = self
            .catalog
            .fetch_stream(url, video, video_tmp.path(), &progress.stage(0.0, 80.0))
            .await?;
        let _video_written = written_guard(&video_path, &video_tmp);

        let audio_path = self
            .catalog
            .fetch_stream(url, audio, audio_tmp.path(), &progress.stage(80.0, 15.0))
            .await?;
        let _audio_written = written_guard(&audio_path, &audio_tmp);

        let container = merged_container(&video_ext, &audio_ext);
        let output = self.download_dir.join(format!("{}.{}", base, container));

        if let Err(e) = self.muxer.merge(&video_path, &audio_path, &output).await {
            warn!("[Orchestrator] {} merge failed: {}", self.muxer.name(), e);
            return Err(match e {
                DownloadError::MergeFailure(_) => e,
                other => DownloadError::MergeFailure(other.to_string()),
            });
        }
        progress.emit(100.0);

        let estimated = video.filesize_mb() + audio.filesize_mb();
        let filesize_mb = match std::fs::metadata(&output) {
            Ok(meta) if meta.len() > 0 => bytes_to_mb(meta.len()),
            _ => estimated,
        };

        Ok(DownloadedFile {
            filename: file_name(&output),
            resolution: video
                .resolution
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
            filepath: output,
            filesize_mb,
        })
    }
}

/// Extension for a single-stream download
fn progressive_extension(stream: &StreamDescriptor, request: &QualityRequest) -> String {
    if !stream.container.is_empty() {
        return stream.container.clone();
    }
    if *request == QualityRequest::Audio || stream.is_audio_only() {
        "webm".to_string()
    } else {
        "mp4".to_string()
    }
}

/// Renames `path` so it ends in `.{extension}`; returns the final path
fn normalize_extension(path: &Path, extension: &str) -> Result<PathBuf, DownloadError> {
    let actual = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if actual == extension {
        return Ok(path.to_path_buf());
    }

    let target = path.with_extension(extension);
    if target.exists() {
        std::fs::remove_file(&target)?;
    }
    std::fs::rename(path, &target)?;
    Ok(target)
}

/// yt-dlp may write under a different extension than requested
fn written_guard(written: &Path, requested: &TempFileGuard) -> Option<TempFileGuard> {
    (written != requested.path()).then(|| TempFileGuard::new(written.to_path_buf()))
}

fn non_empty_or(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_size_mb(path: &Path) -> f64 {
    std::fs::metadata(path)
        .map(|m| bytes_to_mb(m.len()))
        .unwrap_or(0.0)
}

fn timestamp() -> String {
    let format = format_description!("[year][month][day]_[hour][minute][second]");
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(format)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::jobs::JobStatus;
    use crate::downloader::models::StreamKind;
    use crate::downloader::testing::{FakeCatalog, FakeMuxer};

    fn progressive(id: &str, res: &str) -> StreamDescriptor {
        StreamDescriptor::new(id, StreamKind::Video, Some(res.to_string()), Some("96kbps".to_string()), "mp4", Some(2 * 1024 * 1024), true)
    }

    fn video(id: &str, res: &str, container: &str) -> StreamDescriptor {
        StreamDescriptor::new(id, StreamKind::Video, Some(res.to_string()), None, container, Some(1024 * 1024), false)
    }

    fn audio(id: &str, abr: &str, container: &str) -> StreamDescriptor {
        StreamDescriptor::new(id, StreamKind::Audio, None, Some(abr.to_string()), container, Some(1024 * 1024), false)
    }

    fn dir_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn orchestrator(
        catalog: FakeCatalog,
        muxer: FakeMuxer,
        dir: &Path,
    ) -> Orchestrator {
        let jobs = JobStore::new();
        Orchestrator::new(Arc::new(catalog), Arc::new(muxer), jobs, dir.to_path_buf())
    }

    #[tokio::test]
    async fn test_progressive_download_completes() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            FakeCatalog::new(vec![progressive("18", "360p"), progressive("22", "720p")]),
            FakeMuxer::succeeding(),
            dir.path(),
        );
        orch.jobs().create("dl-1");

        orch.run("https://youtu.be/x", "highest", "dl-1").await;

        let job = orch.jobs().get("dl-1").unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.title.as_deref(), Some("Fake Video"));
        assert_eq!(job.resolution.as_deref(), Some("720p"));
        assert_eq!(job.filesize, Some(2.0));
        let filename = job.filename.unwrap();
        assert!(filename.starts_with("dl-1_"));
        assert!(filename.ends_with(".mp4"));
        assert_eq!(dir_names(dir.path()), vec![filename]);
    }

    #[tokio::test]
    async fn test_progressive_extension_is_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            FakeCatalog::new(vec![audio("251", "160kbps", "webm")]).writing_extension("part"),
            FakeMuxer::succeeding(),
            dir.path(),
        );
        orch.jobs().create("dl-a");

        orch.run("https://youtu.be/x", "audio", "dl-a").await;

        let job = orch.jobs().get("dl-a").unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.resolution.as_deref(), Some("audio"));
        let filename = job.filename.unwrap();
        assert!(filename.ends_with(".webm"), "{}", filename);
        assert_eq!(dir_names(dir.path()), vec![filename]);
    }

    #[tokio::test]
    async fn test_adaptive_download_merges_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let muxer = FakeMuxer::succeeding();
        let orch = orchestrator(
            FakeCatalog::new(vec![
                progressive("18", "360p"),
                video("137", "1080p", "mp4"),
                audio("140", "128kbps", "m4a"),
            ]),
            muxer.clone(),
            dir.path(),
        );
        orch.jobs().create("dl-2");

        orch.run("https://youtu.be/x", "highest", "dl-2").await;

        let job = orch.jobs().get("dl-2").unwrap();
        assert_eq!(job.status, JobStatus::Completed, "{:?}", job.error);
        assert_eq!(job.resolution.as_deref(), Some("1080p"));
        assert_eq!(job.progress, Some(100.0));
        assert_eq!(muxer.calls(), 1);
        // Only the merged output survives
        assert_eq!(dir_names(dir.path()), vec![job.filename.unwrap()]);
    }

    #[tokio::test]
    async fn test_merge_failure_marks_error_and_removes_temporaries() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            FakeCatalog::new(vec![video("137", "1080p", "webm"), audio("251", "160kbps", "webm")]),
            FakeMuxer::failing(),
            dir.path(),
        );
        orch.jobs().create("dl-3");

        orch.run("https://youtu.be/x", "1080p", "dl-3").await;

        let job = orch.jobs().get("dl-3").unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert!(job
            .error
            .unwrap()
            .starts_with("Failed to merge video and audio streams"));
        assert!(dir_names(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            FakeCatalog::new(vec![video("137", "1080p", "mp4"), audio("140", "128kbps", "m4a")])
                .failing_fetch_of("140"),
            FakeMuxer::succeeding(),
            dir.path(),
        );
        orch.jobs().create("dl-4");

        orch.run("https://youtu.be/x", "highest", "dl-4").await;

        let job = orch.jobs().get("dl-4").unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert!(job.error.unwrap().starts_with("Fetch failed"));
        // The video temporary fetched before the failure is gone too
        assert!(dir_names(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_failed_progressive_fetch_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            FakeCatalog::new(vec![progressive("18", "360p")])
                .failing_fetch_of("18")
                .leaving_partial(),
            FakeMuxer::succeeding(),
            dir.path(),
        );
        orch.jobs().create("dl-p");

        orch.run("https://youtu.be/x", "highest", "dl-p").await;

        let job = orch.jobs().get("dl-p").unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert!(job.filename.is_none());
        assert!(dir_names(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_catalog_failure_and_no_match_are_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(FakeCatalog::unavailable(), FakeMuxer::succeeding(), dir.path());
        orch.jobs().create("dl-5");
        orch.run("https://youtu.be/x", "highest", "dl-5").await;
        assert_eq!(orch.jobs().get("dl-5").unwrap().status, JobStatus::Error);

        let orch = orchestrator(
            FakeCatalog::new(vec![video("137", "1080p", "mp4")]),
            FakeMuxer::succeeding(),
            dir.path(),
        );
        orch.jobs().create("dl-6");
        orch.run("https://youtu.be/x", "audio", "dl-6").await;
        let job = orch.jobs().get("dl-6").unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(
            job.error.as_deref(),
            Some("No suitable stream found for quality 'audio'")
        );
    }

    #[test]
    fn test_normalize_extension_renames() {
        let dir = tempfile::tempdir().unwrap();
        let fetched = dir.path().join("dl-1_x");
        std::fs::write(&fetched, b"x").unwrap();

        let path = normalize_extension(&fetched, "mp4").unwrap();
        assert_eq!(path, dir.path().join("dl-1_x.mp4"));
        assert!(path.exists());
        assert!(!fetched.exists());

        assert_eq!(normalize_extension(&path, "mp4").unwrap(), path);
    }
}
