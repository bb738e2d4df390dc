// ffmpeg muxer and scoped temporary files

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use super::errors::DownloadError;
use super::traits::Muxer;
use super::utils::{remove_file_if_exists, run_output_with_timeout};

/// Deletes its path when dropped, on every exit path of the owning scope
#[derive(Debug)]
pub struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    pub fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keeps the file; returns its path
    pub fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = remove_file_if_exists(&self.path) {
            warn!("Failed to remove temporary file {}: {}", self.path.display(), e);
        }
    }
}

/// Copy-remux via the ffmpeg binary
pub struct FfmpegMuxer {
    ffmpeg_path: PathBuf,
    timeout: Duration,
}

impl FfmpegMuxer {
    pub fn new(ffmpeg_path: PathBuf, timeout: Duration) -> Self {
        Self {
            ffmpeg_path,
            timeout,
        }
    }

    fn build_args(video: &Path, audio: &Path, output: &Path) -> Vec<String> {
        vec![
            "-i".to_string(),
            video.to_string_lossy().into_owned(),
            "-i".to_string(),
            audio.to_string_lossy().into_owned(),
            "-c:v".to_string(),
            "copy".to_string(),
            "-c:a".to_string(),
            "copy".to_string(),
            "-y".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            output.to_string_lossy().into_owned(),
        ]
    }

    async fn run(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), DownloadError> {
        for (label, input) in [("Video", video), ("Audio", audio)] {
            if !input.exists() {
                return Err(DownloadError::MergeFailure(format!(
                    "{} file not found: {}",
                    label,
                    input.display()
                )));
            }
        }

        let program = self.ffmpeg_path.to_string_lossy().into_owned();
        let args = Self::build_args(video, audio, output);
        debug!("[FfmpegMuxer] {} {}", program, args.join(" "));

        let out = run_output_with_timeout(&program, args, self.timeout.as_secs().max(1))
            .await
            .map_err(|e| match e {
                DownloadError::Timeout(secs) => {
                    DownloadError::MergeFailure(format!("ffmpeg timed out after {}s", secs))
                }
                other => DownloadError::MergeFailure(other.to_string()),
            })?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
            return Err(DownloadError::MergeFailure(format!(
                "ffmpeg exited with {}: {}",
                out.status, stderr
            )));
        }

        if !output.exists() {
            return Err(DownloadError::MergeFailure(
                "output file was not created".to_string(),
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn merge(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), DownloadError> {
        let result = self.run(video, audio, output).await;
        if result.is_err() {
            // Partial output from a killed or failed ffmpeg
            let _ = remove_file_if_exists(output);
        }
        result
    }
}

/// Container for the merged file. webm only holds VP8/VP9/AV1 with Opus/Vorbis,
/// so a webm video paired with non-webm audio goes into Matroska.
pub fn merged_container(video_container: &str, audio_container: &str) -> String {
    match (video_container, audio_container) {
        ("", _) => "mp4".to_string(),
        ("webm", audio) if audio != "webm" => "mkv".to_string(),
        ("mp4", "webm") => "mkv".to_string(),
        (video, _) => video.to_string(),
    }
}
