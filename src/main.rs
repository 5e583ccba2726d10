use std::path::PathBuf;
use std::time::Instant;
use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;
use media_uplink::config::Config;
use media_uplink::utils::{format_bytes, format_duration};
use media_uplink::{ContentMetadata, SourceAsset, UploadEvent, UploadManager, UploadRequest};

/// Upload a video or image to the media provider and register it with the backend
#[derive(Parser, Debug)]
#[command(name = "media-uplink", version, about)]
struct Args {
    /// Config file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Video or image to upload
    file: PathBuf,

    /// Thumbnail image sent with a video
    #[arg(long)]
    thumbnail: Option<PathBuf>,

    /// Content title registered with the catalog
    #[arg(long)]
    title: String,

    #[arg(long, default_value = "")]
    description: String,

    #[arg(long)]
    category: Option<String>,
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    init_tracing(config.log_level.as_deref().unwrap_or("info"));

    let asset = SourceAsset::from_path(&args.file)
        .await
        .with_context(|| format!("Cannot read {}", args.file.display()))?;
    let mut metadata = ContentMetadata::new(args.title).with_description(args.description);
    metadata.category = args.category;
    let mut request = UploadRequest::new(asset.clone(), asset.resource_type()).with_metadata(metadata);

    if let Some(path) = &args.thumbnail {
        let thumbnail = SourceAsset::from_path(path)
            .await
            .with_context(|| format!("Cannot read thumbnail {}", path.display()))?;
        request = request.with_thumbnail(thumbnail);
    }

    let manager = UploadManager::from_config(&config).context("Failed to set up upload clients")?;
    let mut events = manager.subscribe_events();
    let total = asset.size_bytes;

    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(UploadEvent::Progress { percentage, bytes_sent, .. }) => {
                    println!("{:>3}%  {} / {}", percentage, format_bytes(bytes_sent), format_bytes(total));
                }
                Ok(UploadEvent::StateChanged { new_state, .. }) => println!("status: {:?}", new_state),
                Ok(UploadEvent::Completed { .. }) | Ok(UploadEvent::Failed { .. }) => break,
                Ok(UploadEvent::Added { .. }) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    });

    let started = Instant::now();
    let handle = manager.submit(request).await.context("Upload rejected")?;

    let cancel = handle.cancellation_token();
    let outcome = tokio::select! {
        outcome = handle.wait() => outcome,
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            anyhow::bail!("Interrupted");
        }
    };
    let _ = printer.await;

    let outcome = outcome.context("Upload failed")?;
    println!("finished in {}", format_duration(started.elapsed()));
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    Ok(())
}
