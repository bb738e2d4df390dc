// Error types for catalog lookup, fetching and merging

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DownloadError {
    /// Request was missing a field or carried an unusable value
    #[error("{0}")]
    InvalidRequest(String),

    /// No stream in the catalog satisfies the requested quality
    #[error("No suitable stream found for quality '{0}'")]
    NoMatchingStream(String),

    /// yt-dlp failed to resolve or transfer a stream
    #[error("Fetch failed: {0}")]
    FetchFailure(String),

    /// ffmpeg timed out, exited non-zero or produced no output
    #[error("Failed to merge video and audio streams: {0}")]
    MergeFailure(String),

    /// Unknown job id or file
    #[error("{0}")]
    NotFound(String),

    /// yt-dlp or ffmpeg not found on this host
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Failed to parse yt-dlp JSON output
    #[error("Parse error: {0}")]
    ParseError(String),

    /// External command exceeded its time budget
    #[error("Timed out after {0}s")]
    Timeout(u64),

    /// Command execution or filesystem failure
    #[error("Execution error: {0}")]
    ExecutionError(String),
}

impl From<std::io::Error> for DownloadError {
    fn from(err: std::io::Error) -> Self {
        Self::ExecutionError(err.to_string())
    }
}

// Classifies raw stderr from yt-dlp
impl From<String> for DownloadError {
    fn from(s: String) -> Self {
        let lower = s.to_lowercase();

        if lower.contains("command not found") || lower.contains("no such file or directory") {
            return Self::ToolNotFound(s);
        }

        if lower.contains("unsupported url")
            || lower.contains("invalid url")
            || lower.contains("is not a valid url")
        {
            return Self::InvalidRequest(s);
        }

        if lower.contains("json") && lower.contains("parse") {
            return Self::ParseError(s);
        }

        Self::FetchFailure(s)
    }
}
