// CLI StreamCatalog - uses native `yt-dlp` binary
//
// Catalog lookup runs `yt-dlp --dump-json` under a timeout and maps each
// entry of `formats` onto a StreamDescriptor. Stream fetch runs
// `yt-dlp -f <format_id>` and follows its `--newline` progress output.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use super::traits::{ExtractorConfig, StreamCatalog};
use crate::downloader::errors::DownloadError;
use crate::downloader::models::{StreamDescriptor, StreamKind, VideoCatalog};
use crate::downloader::traits::ProgressEmitter;
use crate::downloader::utils::{parse_ytdlp_progress, run_output_with_timeout, spawn_error};

/// CLI-based stream catalog using the yt-dlp binary
pub struct CliStreamCatalog {
    config: ExtractorConfig,
}

impl CliStreamCatalog {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    fn program(&self) -> String {
        self.config.ytdlp_path.to_string_lossy().into_owned()
    }

    /// Arguments shared by lookup and fetch
    fn common_args(&self) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            self.config.timeout_seconds.to_string(),
            "--retries".to_string(),
            "2".to_string(),
        ];

        if let Some(path) = &self.config.cookies_path {
            args.push("--cookies".to_string());
            args.push(path.to_string_lossy().into_owned());
        }

        if let Some(proxy) = &self.config.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }

        args
    }

    fn catalog_args(&self, url: &str) -> Vec<String> {
        let mut args = vec!["--dump-json".to_string()];
        args.extend(self.common_args());
        args.push(url.to_string());
        args
    }

    fn fetch_args(&self, url: &str, format_id: &str, dest: &Path) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            format_id.to_string(),
            "--newline".to_string(),
            // Sweep ages files by mtime; keep it at download time
            "--no-mtime".to_string(),
            "--no-part".to_string(),
            "-o".to_string(),
            dest.to_string_lossy().into_owned(),
        ];
        args.extend(self.common_args());
        args.push(url.to_string());
        args
    }

    /// Parse `--dump-json` output
    pub(crate) fn parse_json(stdout: &[u8]) -> Result<VideoCatalog, DownloadError> {
        let json: serde_json::Value = serde_json::from_slice(stdout)
            .map_err(|e| DownloadError::ParseError(format!("Invalid JSON: {}", e)))?;

        let formats = json["formats"]
            .as_array()
            .ok_or_else(|| DownloadError::ParseError("No formats array in JSON".to_string()))?;

        Ok(VideoCatalog {
            title: json["title"].as_str().unwrap_or("Unknown").to_string(),
            author: json["uploader"]
                .as_str()
                .or_else(|| json["channel"].as_str())
                .unwrap_or("Unknown")
                .to_string(),
            length_seconds: json["duration"].as_f64().unwrap_or(0.0) as u64,
            views: json["view_count"].as_u64().unwrap_or(0),
            thumbnail_url: json["thumbnail"].as_str().unwrap_or("").to_string(),
            streams: formats.iter().filter_map(Self::parse_format).collect(),
        })
    }

    fn parse_format(f: &serde_json::Value) -> Option<StreamDescriptor> {
        let has_track = |key: &str| f[key].as_str().map_or(false, |c| c != "none" && !c.is_empty());
        let has_video = has_track("vcodec");
        let has_audio = has_track("acodec");

        // Storyboards and other non-media entries
        if !has_video && !has_audio {
            return None;
        }

        let kind = if has_video {
            StreamKind::Video
        } else {
            StreamKind::Audio
        };
        let resolution = if has_video {
            f["height"].as_u64().map(|h| format!("{}p", h))
        } else {
            None
        };
        let bitrate = if has_audio {
            f["abr"].as_f64().map(|abr| format!("{}kbps", abr.round() as u64))
        } else {
            None
        };

        Some(StreamDescriptor::new(
            f["format_id"].as_str().unwrap_or("").to_string(),
            kind,
            resolution,
            bitrate,
            f["ext"].as_str().unwrap_or("").to_string(),
            f["filesize"].as_u64().or_else(|| f["filesize_approx"].as_u64()),
            has_video && has_audio,
        ))
    }

    /// yt-dlp occasionally appends its own extension; find what was written
    fn locate_output(dest: &Path) -> Option<PathBuf> {
        if dest.exists() {
            return Some(dest.to_path_buf());
        }
        let dir = dest.parent()?;
        let stem = dest.file_stem()?.to_string_lossy().into_owned();
        std::fs::read_dir(dir)
            .ok()?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .find(|path| {
                path.file_stem()
                    .map_or(false, |s| s.to_string_lossy() == stem.as_str())
                    && path.is_file()
            })
    }
}

#[async_trait]
impl StreamCatalog for CliStreamCatalog {
    fn name(&self) -> &'static str {
        "cli-yt-dlp"
    }

    async fn fetch_catalog(&self, url: &str) -> Result<VideoCatalog, DownloadError> {
        let program = self.program();
        let args = self.catalog_args(url);
        debug!("[CliStreamCatalog] {} {}", program, args.join(" "));

        let output = run_output_with_timeout(&program, args, self.config.timeout_seconds)
            .await
            .map_err(|e| match e {
                DownloadError::Timeout(secs) => {
                    DownloadError::FetchFailure(format!("catalog lookup timed out after {}s", secs))
                }
                other => other,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(url, "yt-dlp catalog lookup failed: {}", stderr);
            return Err(DownloadError::from(stderr));
        }

        Self::parse_json(&output.stdout)
    }

    async fn fetch_stream(
        &self,
        url: &str,
        stream: &StreamDescriptor,
        dest: &Path,
        progress: &ProgressEmitter,
    ) -> Result<PathBuf, DownloadError> {
        let program = self.program();
        let args = self.fetch_args(url, &stream.id, dest);
        debug!("[CliStreamCatalog] {} {}", program, args.join(" "));

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(&program, e))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            DownloadError::ExecutionError("Failed to capture yt-dlp stdout".to_string())
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| {
            DownloadError::ExecutionError("Failed to capture yt-dlp stderr".to_string())
        })?;

        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            buf
        });

        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(percent) = parse_ytdlp_progress(&line) {
                progress.emit(percent);
            }
        }

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr).trim().to_string();
            return Err(match DownloadError::from(stderr) {
                DownloadError::FetchFailure(msg) if msg.is_empty() => {
                    DownloadError::FetchFailure(format!("yt-dlp exited with {}", status))
                }
                other => other,
            });
        }

        Self::locate_output(dest).ok_or_else(|| {
            DownloadError::FetchFailure(format!(
                "yt-dlp reported success but {} was not written",
                dest.display()
            ))
        })
    }
}
