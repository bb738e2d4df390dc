// Stream catalog adapters
//
// `StreamCatalog` is the seam between selection/orchestration and the
// extraction tool. The production implementation shells out to yt-dlp.

mod cli;
mod traits;

pub use cli::CliStreamCatalog;
pub use traits::{ExtractorConfig, StreamCatalog};
