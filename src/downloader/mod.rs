// Downloader module - catalog, selection, fetch, merge and job tracking

pub mod errors;
pub mod extractors;
pub mod format_selector;
pub mod jobs;
pub mod models;
pub mod muxer;
pub mod orchestrator;
pub mod queue;
pub mod tools;
pub mod traits;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::DownloadError;
pub use extractors::{CliStreamCatalog, ExtractorConfig, StreamCatalog};
pub use format_selector::{build_quality_options, select, QualityOption, QualityRequest};
pub use jobs::{CleanupReport, JobRecord, JobStatus, JobStore};
pub use models::{DownloadedFile, Selection, StreamDescriptor, StreamKind, VideoCatalog};
pub use muxer::FfmpegMuxer;
pub use orchestrator::Orchestrator;
pub use queue::DownloadQueue;
pub use tools::{ToolInfo, ToolLocator, ToolType};
pub use traits::{Muxer, ProgressEmitter};
