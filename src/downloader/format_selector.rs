// FormatSelector - quality selection over the stream catalog
//
// Picks the stream(s) to fetch for a quality token:
// - highest: best progressive, or an adaptive pair when its video is taller
// - lowest: smallest progressive only (no merge needed)
// - audio: highest-bitrate audio-only stream
// - "480p": exact progressive, exact adaptive, next taller, then tallest
//
// Also builds the UI-facing quality list returned by `/info`.

use serde::{Deserialize, Serialize};

use super::errors::DownloadError;
use super::models::{Selection, StreamDescriptor, VideoCatalog};

/// Parsed quality token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualityRequest {
    Highest,
    Lowest,
    Audio,
    /// Explicit resolution label (e.g., "720p")
    Resolution(String),
}

impl QualityRequest {
    pub fn parse(token: &str) -> Self {
        let token = token.trim().to_lowercase();
        match token.as_str() {
            "" | "highest" | "best" => Self::Highest,
            "lowest" | "worst" => Self::Lowest,
            "audio" => Self::Audio,
            _ if token.chars().all(|c| c.is_ascii_digit()) => {
                Self::Resolution(format!("{}p", token))
            }
            _ => Self::Resolution(token),
        }
    }

    pub fn as_token(&self) -> &str {
        match self {
            Self::Highest => "highest",
            Self::Lowest => "lowest",
            Self::Audio => "audio",
            Self::Resolution(res) => res,
        }
    }
}

/// Quality option for UI display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityOption {
    /// Value sent back with `/download` (e.g., "highest", "720p", "audio")
    pub value: String,

    /// Display label (e.g., "Video (1080p) [HD] - 52.3MB")
    pub label: String,

    /// "video" or "audio"
    #[serde(rename = "type")]
    pub kind: String,

    /// "progressive" or "adaptive"; absent for audio
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_type: Option<String>,
}

/// Select the stream(s) to download for `request`
pub fn select(
    streams: &[StreamDescriptor],
    request: &QualityRequest,
) -> Result<Selection, DownloadError> {
    let no_match = || DownloadError::NoMatchingStream(request.as_token().to_string());

    if streams.is_empty() {
        return Err(no_match());
    }

    let selection = match request {
        QualityRequest::Highest => select_highest(streams),
        QualityRequest::Lowest => {
            first_min_by_key(progressive(streams), |s| s.height).cloned().map(Selection::Progressive)
        }
        QualityRequest::Audio => best_audio(streams).cloned().map(Selection::Progressive),
        QualityRequest::Resolution(res) => select_resolution(streams, res),
    };

    selection.ok_or_else(no_match)
}

fn select_highest(streams: &[StreamDescriptor]) -> Option<Selection> {
    let best_progressive = first_max_by_key(progressive(streams), |s| s.height);
    let best_video = first_max_by_key(video_only(streams), |s| s.height);
    let best_audio = best_audio(streams);

    if let (Some(video), Some(audio)) = (best_video, best_audio) {
        let progressive_height = best_progressive.map_or(0, |s| s.height);
        if video.height > progressive_height {
            return Selection::adaptive(video.clone(), audio.clone());
        }
    }

    if let Some(stream) = best_progressive {
        return Some(Selection::Progressive(stream.clone()));
    }

    // No progressive stream: fall back to the single best stream on offer
    first_max_by_key(streams.iter().filter(|s| !s.is_audio_only()), |s| s.height)
        .or(best_audio)
        .cloned()
        .map(Selection::Progressive)
}

fn select_resolution(streams: &[StreamDescriptor], res: &str) -> Option<Selection> {
    let matches_res = |s: &&StreamDescriptor| s.resolution.as_deref() == Some(res);

    if let Some(stream) = progressive(streams).find(matches_res) {
        return Some(Selection::Progressive(stream.clone()));
    }

    if let (Some(video), Some(audio)) = (video_only(streams).find(matches_res), best_audio(streams))
    {
        return Selection::adaptive(video.clone(), audio.clone());
    }

    let target = super::utils::parse_leading_int(res);
    let mut ascending: Vec<&StreamDescriptor> = progressive(streams).collect();
    // Stable sort keeps catalog order among equal heights
    ascending.sort_by_key(|s| s.height);

    ascending
        .into_iter()
        .find(|s| s.height >= target)
        .or_else(|| first_max_by_key(progressive(streams), |s| s.height))
        .map(|s| Selection::Progressive(s.clone()))
}

/// Build quality options from the catalog, ordered for display:
/// highest, distinct resolutions (descending), audio, lowest
pub fn build_quality_options(catalog: &VideoCatalog) -> Vec<QualityOption> {
    let streams = &catalog.streams;
    let best_audio_mb = best_audio(streams).map_or(0.0, |a| a.filesize_mb());
    let has_adaptive_audio = best_audio(streams).is_some();

    // Progressive streams first so that at equal height the option describes
    // the stream `select` picks; then video-only streams that can be merged
    let mut videos: Vec<&StreamDescriptor> = progressive(streams)
        .chain(video_only(streams).filter(|_| has_adaptive_audio))
        .filter(|s| s.resolution.is_some())
        .collect();
    // Stable sort: progressive before adaptive at equal height
    videos.sort_by(|a, b| b.height.cmp(&a.height));

    let estimated_mb = |s: &StreamDescriptor| {
        if s.progressive {
            s.filesize_mb()
        } else {
            s.filesize_mb() + best_audio_mb
        }
    };

    let mut options = Vec::new();

    if let Some(highest) = videos.first() {
        let res = highest.resolution.as_deref().unwrap_or("Unknown");
        options.push(QualityOption {
            value: "highest".to_string(),
            label: format!(
                "Highest Quality ({}){} - {:.1}MB",
                res,
                hd_suffix(highest),
                estimated_mb(highest)
            ),
            kind: "video".to_string(),
            stream_type: Some(stream_type(highest).to_string()),
        });
    }

    let mut seen: Vec<&str> = Vec::new();
    for stream in &videos {
        let Some(res) = stream.resolution.as_deref() else {
            continue;
        };
        if seen.contains(&res) {
            continue;
        }
        seen.push(res);

        options.push(QualityOption {
            value: res.to_string(),
            label: format!(
                "Video ({}){} - {:.1}MB",
                res,
                hd_suffix(stream),
                estimated_mb(stream)
            ),
            kind: "video".to_string(),
            stream_type: Some(stream_type(stream).to_string()),
        });
    }

    if let Some(audio) = best_audio(streams) {
        let container = if audio.container.is_empty() {
            "webm"
        } else {
            audio.container.as_str()
        };
        options.push(QualityOption {
            value: "audio".to_string(),
            label: format!(
                "Audio Only ({}) - {:.1}MB",
                container.to_uppercase(),
                audio.filesize_mb()
            ),
            kind: "audio".to_string(),
            stream_type: None,
        });
    }

    if !videos.is_empty() {
        let lowest = first_min_by_key(
            progressive(streams).filter(|s| s.resolution.is_some()),
            |s| s.height,
        );
        if let Some(lowest) = lowest {
            options.push(QualityOption {
                value: "lowest".to_string(),
                label: format!(
                    "Lowest Quality ({}) - {:.1}MB",
                    lowest.resolution.as_deref().unwrap_or("Unknown"),
                    lowest.filesize_mb()
                ),
                kind: "video".to_string(),
                stream_type: Some("progressive".to_string()),
            });
        }
    }

    options
}

fn progressive(streams: &[StreamDescriptor]) -> impl Iterator<Item = &StreamDescriptor> {
    streams.iter().filter(|s| s.progressive)
}

fn video_only(streams: &[StreamDescriptor]) -> impl Iterator<Item = &StreamDescriptor> {
    streams.iter().filter(|s| s.is_video_only())
}

fn best_audio(streams: &[StreamDescriptor]) -> Option<&StreamDescriptor> {
    first_max_by_key(streams.iter().filter(|s| s.is_audio_only()), |s| s.abr_kbps)
}

fn stream_type(stream: &StreamDescriptor) -> &'static str {
    if stream.progressive {
        "progressive"
    } else {
        "adaptive"
    }
}

fn hd_suffix(stream: &StreamDescriptor) -> &'static str {
    if stream.progressive {
        ""
    } else {
        " [HD]"
    }
}

/// Maximum by key; the earliest element wins ties
fn first_max_by_key<'a, I, F>(iter: I, key: F) -> Option<&'a StreamDescriptor>
where
    I: Iterator<Item = &'a StreamDescriptor>,
    F: Fn(&StreamDescriptor) -> u32,
{
    iter.fold(None, |best, s| match best {
        Some(b) if key(s) <= key(b) => Some(b),
        _ => Some(s),
    })
}

/// Minimum by key; the earliest element wins ties
fn first_min_by_key<'a, I, F>(iter: I, key: F) -> Option<&'a StreamDescriptor>
where
    I: Iterator<Item = &'a StreamDescriptor>,
    F: Fn(&StreamDescriptor) -> u32,
{
    iter.min_by_key(|s| key(s))
}
