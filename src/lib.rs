pub mod config;
pub mod downloader;
pub mod logging;
pub mod server;

use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use config::AppConfig;
use downloader::{
    CliStreamCatalog, DownloadQueue, ExtractorConfig, FfmpegMuxer, JobStore, Orchestrator,
    StreamCatalog, ToolLocator, ToolType,
};
use server::AppState;

/// Wires the components together and serves until Ctrl+C
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    config.validate()?;

    std::fs::create_dir_all(&config.download_dir).with_context(|| {
        format!("creating download directory {}", config.download_dir.display())
    })?;

    let locator = ToolLocator::new(config.ytdlp_path.clone(), config.ffmpeg_path.clone());
    let tools = tokio::task::spawn_blocking({
        let locator = locator.clone();
        move || {
            locator.report();
            locator.get_all_tools()
        }
    })
    .await
    .context("probing external tools")?;

    let extractor = ExtractorConfig::default()
        .with_ytdlp_path(locator.resolve(ToolType::YtDlp))
        .with_proxy(config.proxy.clone())
        .with_cookies_path(config.cookies.clone())
        .with_timeout(config.extract_timeout);
    let catalog: Arc<dyn StreamCatalog> = Arc::new(CliStreamCatalog::new(extractor));
    let muxer = Arc::new(FfmpegMuxer::new(
        locator.resolve(ToolType::Ffmpeg),
        config.merge_timeout(),
    ));

    let jobs = JobStore::new();
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&catalog),
        muxer,
        jobs.clone(),
        config.download_dir.clone(),
    ));
    let queue = DownloadQueue::new(orchestrator, config.max_jobs);

    if let Some(interval) = config.cleanup_interval() {
        spawn_periodic_sweep(
            jobs.clone(),
            config.download_dir.clone(),
            config.max_file_age(),
            interval,
        );
    }

    let state = AppState {
        jobs,
        queue,
        catalog,
        download_dir: Arc::new(config.download_dir.clone()),
        max_file_age: config.max_file_age(),
        tools: Arc::new(tools),
    };

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    info!(
        "Listening on http://{} (downloads in {}, {} workers)",
        addr,
        config.download_dir.display(),
        config.max_jobs
    );

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(server::shutdown_signal())
        .await
        .context("running HTTP server")?;

    info!("Server stopped");
    Ok(())
}

fn spawn_periodic_sweep(jobs: JobStore, dir: PathBuf, max_age: Duration, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // First tick fires immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let jobs = jobs.clone();
            let dir = dir.clone();
            match tokio::task::spawn_blocking(move || jobs.sweep(&dir, max_age)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!("Periodic cleanup failed: {}", e),
                Err(e) => warn!("Periodic cleanup task panicked: {}", e),
            }
        }
    });
}
