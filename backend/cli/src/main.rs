mod api;
mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{info, warn};

use voicenotes_media::MediaStore;
use voicenotes_provider::SpeechClient;
use voicenotes_store::{RecordStore, SqliteRecordStore};
use voicenotes_transcriber::{RunRegistry, Transcriber};

use api::AppState;
use config::Config;

#[derive(Parser)]
#[command(name = "voicenotes")]
#[command(about = "Voice notes API with background audio transcription")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the voice notes HTTP server
    Serve {
        /// Port to bind the HTTP server to
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();

    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port } => serve(config, port).await,
    }
}

async fn serve(mut config: Config, port_override: Option<u16>) -> Result<()> {
    if let Some(port) = port_override {
        config.port = port;
    }
    if config.assemblyai_api_key.is_empty() {
        warn!("ASSEMBLYAI_API_KEY is not set; transcription runs will fail at upload");
    }

    let store: Arc<dyn RecordStore> = Arc::new(SqliteRecordStore::open(&config.db_path)?);
    let media = Arc::new(MediaStore::new(
        config.upload_dir.clone().into(),
        config.max_upload_bytes,
        config.allowed_extensions.clone(),
    ));
    let provider = Arc::new(SpeechClient::new(config.assemblyai_api_key.clone())?);
    let registry = Arc::new(RunRegistry::new());
    let transcriber = Arc::new(Transcriber::new(
        Arc::clone(&store),
        provider,
        Arc::clone(&registry),
    ));

    let state = Arc::new(AppState {
        store,
        media,
        transcriber,
        registry,
        // Leave headroom for multipart framing around the file itself.
        body_limit: config.max_upload_bytes as usize + 64 * 1024,
    });
    let app = api::build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
        .parse()
        .context("Invalid bind address")?;
    info!(%addr, db = %config.db_path, uploads = %config.upload_dir, "Voice notes server listening");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
