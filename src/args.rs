use clap::{Parser, Subcommand};
use std::path::PathBuf;

use camlink::config;

#[derive(Parser, Debug)]
#[command(name = "camlink")]
#[command(version)]
#[command(about = "Live-view relay for cloud cameras", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/camlink.toml")]
    pub config: PathBuf,

    /// Verbose logging
    #[arg(short, long, action)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the HTTP API (default)
    Serve {
        /// HTTP bind address
        #[arg(long)]
        host: Option<String>,

        /// HTTP port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Try every handshake format against a live-view reference and print
    /// what the endpoint answered
    Probe {
        /// Live-view reference, e.g. immis://host:443/path?session=...
        reference: String,

        /// Camera whose credentials to use (defaults to the first configured)
        #[arg(long)]
        camera: Option<String>,
    },
}

impl Args {
    pub fn load_config(&self) -> Result<config::Config, Box<dyn std::error::Error>> {
        config::Config::load(&self.config)
    }
}
