use clap::Parser;
use youtube_downloader_web::config::AppConfig;
use youtube_downloader_web::logging::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = AppConfig::parse();
    youtube_downloader_web::run(config).await
}
