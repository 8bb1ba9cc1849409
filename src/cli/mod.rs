//! CLI argument parsing and command routing

pub mod repl;

use std::{net::SocketAddr, path::PathBuf};

use clap::{Parser, Subcommand};

/// vidchat: chat with a generative model about a video
#[derive(Debug, Parser)]
#[command(name = "vidchat")]
#[command(about = "Video-aware AI chat relay and terminal client", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Read settings from this file instead of the global config
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Run the relay server
    Serve {
        /// Address to listen on
        #[arg(long, value_name = "ADDR")]
        bind: Option<SocketAddr>,
    },

    /// Start an interactive chat against a relay (default)
    Chat {
        /// Base URL of the relay server
        #[arg(long, value_name = "URL")]
        relay: Option<String>,
    },

    /// Show version information
    Version,
}

impl Cli {
    /// Parse CLI arguments from environment
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Subcommand to run, defaulting to an interactive chat
    #[must_use]
    pub fn resolved_command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or(Commands::Chat { relay: None })
    }
}
