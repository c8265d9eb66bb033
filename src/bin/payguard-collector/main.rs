//! payguard-collector CLI entry point.

mod cli;

use clap::Parser;
use cli::{Cli, Command, OutputFormat};
use payguard::collector::{DiagnosticStore, FileStore};
use payguard::{CollectorBuilder, CollectorConfig, DetectorConfig};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing; stdout is reserved for command output
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let layer = fmt::layer().with_writer(std::io::stderr);
    match cli.log_format {
        OutputFormat::Text => tracing_subscriber::registry().with(layer).with(filter).init(),
        OutputFormat::Json => tracing_subscriber::registry()
            .with(layer.json())
            .with(filter)
            .init(),
    }

    info!("payguard-collector v{}", env!("CARGO_PKG_VERSION"));

    // Build configuration
    let (config, command) = cli.into_config()?;

    match command {
        Command::Serve { .. } => {
            let mut collector = CollectorBuilder::new(config).build()?;
            collector.run().await?;
            info!("Goodbye!");
        }
        Command::Show { format } => show(&config, format)?,
        Command::Token { length } => println!("{}", generate_token(usize::from(length))),
        Command::CheckConfig { path } => {
            let detector = DetectorConfig::from_file(&path)?;
            println!(
                "{} is valid (reporting {})",
                path.display(),
                if detector.reporting_enabled() { "enabled" } else { "disabled" }
            );
        }
    }

    Ok(())
}

fn show(config: &CollectorConfig, format: OutputFormat) -> color_eyre::Result<()> {
    let store = FileStore::new(config.store_path());
    let Some(record) = store.load()? else {
        println!("No diagnostic recorded yet.");
        return Ok(());
    };
    match format {
        OutputFormat::Text => {
            println!("Received: {}", record.received_at.to_rfc3339());
            println!("{}", record.summary());
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&record)?),
    }
    Ok(())
}

fn generate_token(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}
