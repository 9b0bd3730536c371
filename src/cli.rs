//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using the
//! `clap` crate. These arguments are parsed at startup and then merged on top
//! of the configuration file and environment variables.

use clap::Parser;
use figment::{
    providers::Serialized,
    value::{Dict, Map},
    Error, Figment, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Multi-channel alert relay with health and heartbeat endpoints.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Port for the HTTP listener.
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Logging level (error, warn, info, debug, trace).
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Deployment label reported by the status endpoints.
    #[arg(long, value_name = "MODE")]
    pub mode: Option<String>,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut figment = Figment::new();

        if let Some(port) = self.port {
            figment = figment.merge(Serialized::default("server.port", port));
        }

        if let Some(level) = &self.log_level {
            figment = figment.merge(Serialized::default("log_level", level));
        }

        if let Some(mode) = &self.mode {
            figment = figment.merge(Serialized::default("mode", mode));
        }

        figment.data()
    }
}
