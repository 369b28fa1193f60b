use clap::Parser;
use dotenvy::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use thumbnail_uploader::infrastructure::http;
use thumbnail_uploader::{Asset, UploadCoordinator, UploadEvent, UploaderConfig};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use validator::Validate;

/// Upload an image to the thumbnail pipeline and wait for the result
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Image to upload
    file: PathBuf,

    /// Title rendered onto the thumbnail
    #[arg(short, long)]
    title: String,

    /// Pipeline API base URL (overrides API_BASE_URL)
    #[arg(long)]
    api_base: Option<String>,

    /// Save the finished thumbnail to this path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Maximum status checks (overrides POLL_MAX_ATTEMPTS)
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Delay between status checks in milliseconds (overrides POLL_INTERVAL_MS)
    #[arg(long)]
    interval_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing with EnvFilter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "thumbnail_uploader=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = UploaderConfig::from_env();
    if let Some(api_base) = cli.api_base {
        config.api_base_url = api_base;
    }
    if let Some(max_attempts) = cli.max_attempts {
        config.poll_max_attempts = max_attempts;
    }
    if let Some(interval_ms) = cli.interval_ms {
        config.poll_interval_ms = interval_ms;
    }
    config.validate()?;

    info!(
        "🚀 Thumbnail uploader: Poll={}x{}ms, Timeout={}s",
        config.poll_max_attempts, config.poll_interval_ms, config.request_timeout_secs
    );

    let client = http::setup_pipeline_client(&config)?;
    let coordinator = Arc::new(UploadCoordinator::new(client.clone(), config.poll_policy()));

    // Render state and progress the way a UI would
    let mut states = coordinator.subscribe_state();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            info!("📋 {}", state);
        }
    });

    let mut events = coordinator.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let UploadEvent::TransferProgress(progress) = event {
                info!(
                    "⏫ {}% ({}/{} bytes)",
                    progress.percent(),
                    progress.sent,
                    progress.total
                );
            }
        }
    });

    // Ctrl+C abandons the submission
    {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!("⌨️  Ctrl+C received, cancelling submission...");
                coordinator.reset().await;
            }
        });
    }

    let asset = Asset::from_path(&cli.file).await?;
    let artifact = coordinator.submit(Some(asset), &cli.title).await?;

    info!("✅ Thumbnail: {}", artifact.url);
    println!("{}", artifact.url);

    if let Some(output) = cli.output {
        let url = match client.download_url(&artifact.storage_key).await {
            Ok(Some(fresh)) => fresh,
            Ok(None) => artifact.url.clone(),
            Err(e) => {
                warn!("Could not refresh download URL, using status URL: {}", e);
                artifact.url.clone()
            }
        };
        let data = client.download_artifact(&url).await?;
        tokio::fs::write(&output, &data).await?;
        info!("💾 Saved thumbnail to {}", output.display());
    }

    Ok(())
}
