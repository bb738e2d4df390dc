// Service configuration from command-line flags and environment

use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_jobs must be at least 1")]
    NoWorkers,
    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
    #[error("cookies file not found: {0}")]
    MissingCookies(PathBuf),
}

#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "YouTube downloader web service", long_about = None)]
pub struct AppConfig {
    /// Address to bind
    #[arg(long, env = "YTDL_WEB_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    #[arg(long, env = "YTDL_WEB_PORT", default_value_t = 5001)]
    pub port: u16,

    /// Directory for finished and in-progress downloads
    #[arg(long, env = "YTDL_WEB_DOWNLOAD_DIR", default_value = "downloads")]
    pub download_dir: PathBuf,

    /// yt-dlp binary; discovered on common paths and PATH when unset
    #[arg(long, env = "YTDLP_PATH")]
    pub ytdlp_path: Option<PathBuf>,

    /// ffmpeg binary; discovered on common paths and PATH when unset
    #[arg(long, env = "FFMPEG_PATH")]
    pub ffmpeg_path: Option<PathBuf>,

    /// Downloads running at once
    #[arg(long, env = "YTDL_WEB_MAX_JOBS", default_value_t = 3)]
    pub max_jobs: usize,

    /// Seconds before an ffmpeg merge is killed
    #[arg(long, env = "YTDL_WEB_MERGE_TIMEOUT", default_value_t = 300)]
    pub merge_timeout: u64,

    /// Seconds allowed for a catalog lookup
    #[arg(long, env = "YTDL_WEB_EXTRACT_TIMEOUT", default_value_t = 30)]
    pub extract_timeout: u64,

    #[arg(long, env = "YTDL_WEB_MAX_FILE_AGE_HOURS", default_value_t = 24)]
    pub max_file_age_hours: u64,

    /// Seconds between automatic cleanup sweeps, 0 to disable
    #[arg(long, env = "YTDL_WEB_CLEANUP_INTERVAL", default_value_t = 3600)]
    pub cleanup_interval: u64,

    /// SOCKS5/HTTP proxy passed to yt-dlp
    #[arg(long, env = "YTDL_WEB_PROXY")]
    pub proxy: Option<String>,

    /// cookies.txt passed to yt-dlp
    #[arg(long, env = "YTDL_WEB_COOKIES")]
    pub cookies: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: 5001,
            download_dir: PathBuf::from("downloads"),
            ytdlp_path: None,
            ffmpeg_path: None,
            max_jobs: 3,
            merge_timeout: 300,
            extract_timeout: 30,
            max_file_age_hours: 24,
            cleanup_interval: 3600,
            proxy: None,
            cookies: None,
        }
    }
}

impl AppConfig {
    pub fn with_max_jobs(mut self, max_jobs: usize) -> Self {
        self.max_jobs = max_jobs;
        self
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn merge_timeout(&self) -> Duration {
        Duration::from_secs(self.merge_timeout)
    }

    pub fn max_file_age(&self) -> Duration {
        Duration::from_secs(self.max_file_age_hours * 3600)
    }

    /// `None` when periodic cleanup is disabled
    pub fn cleanup_interval(&self) -> Option<Duration> {
        (self.cleanup_interval > 0).then(|| Duration::from_secs(self.cleanup_interval))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_jobs == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.merge_timeout == 0 {
            return Err(ConfigError::ZeroTimeout("merge_timeout"));
        }
        if self.extract_timeout == 0 {
            return Err(ConfigError::ZeroTimeout("extract_timeout"));
        }
        if let Some(path) = &self.cookies {
            if !path.is_file() {
                return Err(ConfigError::MissingCookies(path.clone()));
            }
        }
        Ok(())
    }
}
