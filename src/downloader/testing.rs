// In-memory stand-ins for the extractor and muxer

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::errors::DownloadError;
use super::extractors::StreamCatalog;
use super::models::{StreamDescriptor, VideoCatalog};
use super::traits::{Muxer, ProgressEmitter};

/// Serves a fixed catalog and writes a few bytes for every fetched stream
#[derive(Clone, Default)]
pub struct FakeCatalog {
    streams: Vec<StreamDescriptor>,
    unavailable: bool,
    failing_id: Option<String>,
    leave_partial: bool,
    written_extension: Option<String>,
    delay: Duration,
}

impl FakeCatalog {
    pub fn new(streams: Vec<StreamDescriptor>) -> Self {
        Self {
            streams,
            ..Self::default()
        }
    }

    /// Catalog lookup always fails
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn failing_fetch_of(mut self, id: &str) -> Self {
        self.failing_id = Some(id.to_string());
        self
    }

    /// A failing fetch writes some bytes to `dest` before erroring
    pub fn leaving_partial(mut self) -> Self {
        self.leave_partial = true;
        self
    }

    /// Writes fetched streams under this extension instead of the requested one
    pub fn writing_extension(mut self, extension: &str) -> Self {
        self.written_extension = Some(extension.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn catalog(&self) -> VideoCatalog {
        VideoCatalog {
            title: "Fake Video".to_string(),
            author: "Fake Channel".to_string(),
            length_seconds: 245,
            views: 1234567,
            thumbnail_url: "https://i.ytimg.com/vi/fake/hq.jpg".to_string(),
            streams: self.streams.clone(),
        }
    }
}

#[async_trait]
impl StreamCatalog for FakeCatalog {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn fetch_catalog(&self, url: &str) -> Result<VideoCatalog, DownloadError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.unavailable {
            return Err(DownloadError::FetchFailure(format!("Video unavailable: {}", url)));
        }
        Ok(self.catalog())
    }

    async fn fetch_stream(
        &self,
        _url: &str,
        stream: &StreamDescriptor,
        dest: &Path,
        progress: &ProgressEmitter,
    ) -> Result<PathBuf, DownloadError> {
        if self.failing_id.as_deref() == Some(stream.id.as_str()) {
            if self.leave_partial {
                std::fs::write(dest, b"partial")?;
            }
            return Err(DownloadError::FetchFailure(format!(
                "HTTP Error 403 on format {}",
                stream.id
            )));
        }

        let path = match &self.written_extension {
            Some(ext) => dest.with_extension(ext),
            None => dest.to_path_buf(),
        };
        progress.emit(50.0);
        std::fs::write(&path, stream.id.as_bytes())?;
        progress.emit(100.0);
        Ok(path)
    }
}

/// Concatenates its inputs, or fails without writing anything
#[derive(Clone, Default)]
pub struct FakeMuxer {
    fail: bool,
    calls: Arc<AtomicUsize>,
}

impl FakeMuxer {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Muxer for FakeMuxer {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn merge(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DownloadError::MergeFailure("codec not supported".to_string()));
        }

        let mut bytes = std::fs::read(video)?;
        bytes.extend(std::fs::read(audio)?);
        std::fs::write(output, bytes)?;
        Ok(())
    }
}
