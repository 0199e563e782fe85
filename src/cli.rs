//! CLI definitions for the keyneg daemon.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use keyneg::config::DEFAULT_CONFIG_PATH;
use keyneg::VERSION;

/// Local key-negotiation daemon
#[derive(Parser)]
#[command(name = "keynegd")]
#[command(author, version = VERSION, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, short = 'L', default_value = "info", global = true)]
    pub log_level: LogLevel,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the keyneg daemon
    #[command(alias = "start")]
    Run {
        /// Path to configuration file
        #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },

    /// Print a default configuration
    #[command(alias = "genconf")]
    GenerateConfig,
}
