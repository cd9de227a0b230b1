//! Headless host bridge binary for stdin/stdout JSON communication.
//!
//! This binary reads `CommandEnvelope` messages as newline-delimited JSON
//! from stdin, routes them into the turn controller, and writes
//! `ResponseEnvelope` and `EventEnvelope` messages to stdout.
//!
//! All tracing/diagnostic output goes to stderr so that stdout remains a
//! clean JSON protocol channel.

use clap::Parser;
use parley::SpeechConfig;
use parley::audio::SpeakerOutput;
use parley::host::stdio::run_stdio_bridge;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "parley-host", version, about = "Voice turn-taking bridge over stdin/stdout JSON")]
struct Cli {
    /// Config file path (defaults to the platform config directory).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the available output devices and exit.
    #[arg(long)]
    list_devices: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialise tracing to stderr only (stdout is reserved for the JSON
    // protocol).
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("parley=info")),
        )
        .init();

    if cli.list_devices {
        for name in SpeakerOutput::list_output_devices()? {
            println!("{name}");
        }
        return Ok(());
    }

    let config_path = cli.config.unwrap_or_else(SpeechConfig::default_config_path);
    let config = if config_path.exists() {
        SpeechConfig::from_file(&config_path)
            .map_err(|e| anyhow::anyhow!("failed to load {}: {e}", config_path.display()))?
    } else {
        tracing::info!(path = %config_path.display(), "no config file; using defaults");
        SpeechConfig::default()
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    tracing::info!("parley-host starting");
    runtime.block_on(run_stdio_bridge(config)).map_err(|e| {
        tracing::error!(error = %e, "parley-host exited with error");
        anyhow::anyhow!("parley-host failed: {e}")
    })?;

    tracing::info!("parley-host shut down cleanly");
    Ok(())
}
