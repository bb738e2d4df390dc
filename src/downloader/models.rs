// Common data models for the catalog, selection and downloaded output

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::utils::parse_leading_int;

/// Whether a stream carries a video track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
}

/// One media stream offered by the extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Format ID (e.g., "18", "137", "140")
    pub id: String,
    pub kind: StreamKind,
    /// Resolution label (e.g., "720p")
    pub resolution: Option<String>,
    /// Audio bitrate label (e.g., "128kbps")
    pub bitrate: Option<String>,
    /// Container / subtype (mp4, webm, m4a)
    pub container: String,
    /// File size in bytes (exact or approximate)
    pub filesize: Option<u64>,
    /// Video and audio in one stream
    pub progressive: bool,
    /// Numeric height parsed from `resolution`, 0 when missing or unparsable
    pub height: u32,
    /// Numeric bitrate parsed from `bitrate`, 0 when missing or unparsable
    pub abr_kbps: u32,
}

impl StreamDescriptor {
    pub fn new(
        id: impl Into<String>,
        kind: StreamKind,
        resolution: Option<String>,
        bitrate: Option<String>,
        container: impl Into<String>,
        filesize: Option<u64>,
        progressive: bool,
    ) -> Self {
        let height = resolution.as_deref().map(parse_leading_int).unwrap_or(0);
        let abr_kbps = bitrate.as_deref().map(parse_leading_int).unwrap_or(0);

        Self {
            id: id.into(),
            kind,
            resolution,
            bitrate,
            container: container.into(),
            filesize,
            // An audio-only stream can never be progressive
            progressive: progressive && kind == StreamKind::Video,
            height,
            abr_kbps,
        }
    }

    /// Video track without audio (adaptive)
    pub fn is_video_only(&self) -> bool {
        self.kind == StreamKind::Video && !self.progressive
    }

    /// Audio track without video (adaptive)
    pub fn is_audio_only(&self) -> bool {
        self.kind == StreamKind::Audio
    }

    pub fn filesize_mb(&self) -> f64 {
        self.filesize.map(bytes_to_mb).unwrap_or(0.0)
    }
}

/// Video metadata together with every stream the extractor offers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoCatalog {
    pub title: String,
    pub author: String,
    pub length_seconds: u64,
    pub views: u64,
    pub thumbnail_url: String,
    pub streams: Vec<StreamDescriptor>,
}

/// Outcome of quality selection
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// One stream, fetched as-is
    Progressive(StreamDescriptor),
    /// Video-only and audio-only streams that must be merged
    Adaptive {
        video: StreamDescriptor,
        audio: StreamDescriptor,
    },
}

impl Selection {
    /// Builds an adaptive pair; `None` when the audio member has a video track
    /// or the video member has none.
    pub fn adaptive(video: StreamDescriptor, audio: StreamDescriptor) -> Option<Self> {
        if video.kind != StreamKind::Video || !audio.is_audio_only() {
            return None;
        }
        Some(Self::Adaptive { video, audio })
    }

    pub fn is_adaptive(&self) -> bool {
        matches!(self, Self::Adaptive { .. })
    }

    /// The stream that determines the output resolution
    pub fn primary(&self) -> &StreamDescriptor {
        match self {
            Self::Progressive(stream) => stream,
            Self::Adaptive { video, .. } => video,
        }
    }
}

/// File produced by a finished job
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedFile {
    pub filepath: PathBuf,
    pub filename: String,
    pub filesize_mb: f64,
    pub resolution: String,
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
