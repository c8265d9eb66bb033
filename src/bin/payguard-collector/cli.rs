//! Command-line interface definition.

use clap::{Parser, Subcommand, ValueEnum};
use payguard::config::CollectorConfig;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Collector for blocked payment-widget diagnostics.
#[derive(Parser, Debug)]
#[command(name = "payguard-collector")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding the stored diagnostic.
    #[arg(long, global = true, env = "PAYGUARD_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Log level.
    #[arg(long, global = true, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Log line format.
    #[arg(long, global = true, value_enum, default_value = "text", env = "PAYGUARD_LOG_FORMAT")]
    pub log_format: OutputFormat,

    /// Path to configuration file.
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the diagnostic endpoint until Ctrl-C.
    Serve {
        /// Address to listen on.
        #[arg(long, short, env = "PAYGUARD_LISTEN")]
        listen: Option<SocketAddr>,

        /// Shared access token expected in every report.
        #[arg(long, env = "PAYGUARD_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Request path accepting diagnostics.
        #[arg(long, env = "PAYGUARD_PATH")]
        path: Option<String>,
    },

    /// Print the last stored diagnostic.
    Show {
        /// Output format.
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Generate a random access token.
    Token {
        /// Token length.
        #[arg(long, default_value_t = 32, value_parser = clap::value_parser!(u16).range(16..=256))]
        length: u16,
    },

    /// Validate a detector configuration file.
    CheckConfig {
        /// Detector configuration (TOML).
        path: PathBuf,
    },
}

/// Output format of `show` and of log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// JSON.
    Json,
}

impl Cli {
    /// Resolve the collector configuration and the command to run.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded.
    pub fn into_config(self) -> color_eyre::Result<(CollectorConfig, Command)> {
        // Start with default config or load from file
        let mut config = if let Some(ref path) = self.config {
            CollectorConfig::from_file(path)?
        } else {
            CollectorConfig::default()
        };

        // Override with CLI arguments
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        config.log_level = self.log_level;

        if let Command::Serve {
            listen,
            token,
            path,
        } = &self.command
        {
            if let Some(listen) = listen {
                config.listen = *listen;
            }
            if let Some(token) = token {
                config.token.clone_from(token);
            }
            if let Some(path) = path {
                config.path.clone_from(path);
            }
        }

        Ok((config, self.command))
    }
}
