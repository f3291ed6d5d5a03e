pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gptproxy")]
#[command(author, version, about = "Reverse proxy for the ChatGPT backend API with arkose token injection")]
pub struct Cli {
    /// Path to config file (checked in order: local config.toml, ~/.config/gptproxy/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the proxy server
    Start {
        /// Address to bind (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show effective configuration and whether the server answers
    Status,

    /// Fetch a single arkose token with the configured strategy and print it
    Token,
}
