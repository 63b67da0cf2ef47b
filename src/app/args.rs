//! Command line arguments
//!
//! Every flag is optional; anything not given falls back to the
//! configuration file and then to built-in defaults.

use clap::{ArgAction, Parser};
use std::path::PathBuf;

use crate::core::config::MessagingConfig;

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "gridmq")]
#[command(about = "Partitioned publish/subscribe and queue messaging demo")]
#[command(version)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long = "config-file", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Force colored output (overrides TTY detection)
    #[arg(long = "color", action = ArgAction::SetTrue, conflicts_with = "no_color")]
    pub color: bool,

    /// Disable colored output
    #[arg(long = "no-color", action = ArgAction::SetTrue)]
    pub no_color: bool,

    /// Log level
    #[arg(short = 'l', long = "log-level", value_name = "LEVEL", value_parser = ["trace", "debug", "info", "warn", "error", "off"])]
    pub log_level: Option<String>,

    /// Log file path
    #[arg(short = 'f', long = "log-file", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Log output format
    #[arg(short = 'o', long = "log-format", value_name = "FORMAT", value_parser = ["text", "ext", "json"])]
    pub log_format: Option<String>,

    /// Number of partitions per cache
    #[arg(short = 'p', long = "partitions", value_name = "COUNT")]
    pub partitions: Option<u32>,

    /// Messages to publish to each destination
    #[arg(short = 'm', long = "messages", value_name = "COUNT", default_value_t = 8)]
    pub messages: usize,

    /// Subscribers attached to the demo topic
    #[arg(short = 't', long = "topic-subscribers", value_name = "COUNT", default_value_t = 2)]
    pub topic_subscribers: usize,

    /// Workers competing on the demo queue
    #[arg(short = 'w', long = "queue-workers", value_name = "COUNT", default_value_t = 2)]
    pub queue_workers: usize,

    /// Move one partition out and back in half way through
    #[arg(long = "transfer")]
    pub transfer: bool,

    /// Print destination statistics as JSON instead of a table
    #[arg(long = "json")]
    pub json: bool,
}

impl Args {
    /// Layer command line overrides over a loaded configuration
    pub fn apply_to(&self, config: &mut MessagingConfig) {
        if let Some(partitions) = self.partitions {
            config.partition_count = partitions;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.logging.format = format.clone();
        }
        if let Some(file) = &self.log_file {
            config.logging.file = Some(file.display().to_string());
        }
    }

    /// Color when forced or when stdout is a terminal, unless disabled
    pub fn use_color(&self) -> bool {
        use std::io::IsTerminal;
        (self.color || std::io::stdout().is_terminal()) && !self.no_color
    }
}
