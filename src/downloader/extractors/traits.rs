// StreamCatalog trait and extractor configuration

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::downloader::errors::DownloadError;
use crate::downloader::models::{StreamDescriptor, VideoCatalog};
use crate::downloader::traits::ProgressEmitter;

/// Configuration for the yt-dlp extractor
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Path or name of the yt-dlp binary
    pub ytdlp_path: PathBuf,
    /// SOCKS5/HTTP proxy URL
    pub proxy: Option<String>,
    /// Path to cookies.txt file
    pub cookies_path: Option<PathBuf>,
    /// Catalog lookup timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: PathBuf::from("yt-dlp"),
            proxy: None,
            cookies_path: None,
            timeout_seconds: 30,
        }
    }
}

impl ExtractorConfig {
    pub fn with_ytdlp_path(mut self, path: PathBuf) -> Self {
        self.ytdlp_path = path;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_cookies_path(mut self, path: Option<PathBuf>) -> Self {
        self.cookies_path = path;
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }
}

/// Source of stream catalogs and stream bytes
#[async_trait]
pub trait StreamCatalog: Send + Sync {
    /// Name of the extractor (for logging)
    fn name(&self) -> &'static str;

    /// Video metadata and every available stream
    async fn fetch_catalog(&self, url: &str) -> Result<VideoCatalog, DownloadError>;

    /// Download one stream to `dest`; returns the path actually written
    async fn fetch_stream(
        &self,
        url: &str,
        stream: &StreamDescriptor,
        dest: &Path,
        progress: &ProgressEmitter,
    ) -> Result<PathBuf, DownloadError>;
}
