use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use voice_pipeline::{create_router, AppState, Config, VoicePipeline};

#[derive(Parser)]
#[command(name = "voice-pipeline", version, about = "Voice interaction pipeline")]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/voice-pipeline")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP control surface
    Serve,
    /// Record one voice turn and print the transcript and reply
    Turn {
        /// Stop recording after this many seconds if the recognizer has not ended it
        #[arg(long)]
        max_seconds: Option<u64>,
    },
    /// Print the live input level
    Level {
        #[arg(long, default_value_t = 5)]
        seconds: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("Voice Pipeline v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    let pipeline = Arc::new(VoicePipeline::from_config(&cfg)?);

    match cli.command {
        Command::Serve => serve(&cfg, pipeline).await,
        Command::Turn { max_seconds } => turn(pipeline, max_seconds).await,
        Command::Level { seconds } => level(pipeline, seconds).await,
    }
}

async fn serve(cfg: &Config, pipeline: Arc<VoicePipeline>) -> Result<()> {
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);

    let app = create_router(AppState::new(Arc::clone(&pipeline)));
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")?;

    pipeline.shutdown().await;
    Ok(())
}

async fn turn(pipeline: Arc<VoicePipeline>, max_seconds: Option<u64>) -> Result<()> {
    if let Some(limit) = max_seconds {
        let stopper = Arc::clone(&pipeline);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(limit)).await;
            stopper.request_stop().await;
        });
    }

    let outcome = match pipeline.voice_turn().await {
        Ok(Some(outcome)) => outcome,
        Ok(None) => anyhow::bail!("a voice session is already active"),
        Err(e) => {
            let message = pipeline.banner().unwrap_or_else(|| e.user_message());
            anyhow::bail!(message);
        }
    };

    println!("You: {}", outcome.user.text());
    println!(
        "     (intensity {:.1}, {:?})",
        outcome.user.meta().emotional_intensity,
        outcome.user.meta().transcript_source
    );
    match &outcome.reply {
        Some(reply) => println!("Assistant: {}", reply.text()),
        None => println!("Assistant: <no reply>"),
    }
    if let Some(banner) = pipeline.banner() {
        warn!("{}", banner);
        println!("! {}", banner);
    }

    pipeline.playback().wait_idle().await;
    pipeline.shutdown().await;
    Ok(())
}

async fn level(pipeline: Arc<VoicePipeline>, seconds: u64) -> Result<()> {
    let capture = Arc::clone(pipeline.coordinator().capture());
    let session = capture
        .start()
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?
        .context("capture already active")?;

    info!("Metering session {} for {}s", session.session_id, seconds);

    let mut level = capture.level();
    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    let deadline = tokio::time::Instant::now() + Duration::from_secs(seconds);

    while tokio::time::Instant::now() < deadline {
        ticker.tick().await;
        let value = *level.borrow_and_update();
        let filled = (value * 40.0).round() as usize;
        println!("[{:<40}] {:.2}", "#".repeat(filled.min(40)), value);
    }

    if let Some(finalized) = capture.stop().await {
        let summary = &finalized.summary;
        println!(
            "duration {}ms, average {:.1} dB, peak {:.1} dB",
            summary.duration_ms, summary.average_loudness_db, summary.peak_loudness_db
        );
    }
    Ok(())
}
