pub mod ask;
pub mod config;
pub mod serve;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "medassist")]
#[command(
    author,
    version,
    about = "Medical image and symptom analysis backed by a hosted vision/chat model"
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file
    #[arg(short, long, global = true, env = "MEDASSIST_CONFIG")]
    pub config: Option<String>,
}

impl Cli {
    /// The `--config` override with `~` expanded
    pub fn config_path(&self) -> Option<PathBuf> {
        self.config
            .as_deref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).to_string()))
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the web UI
    Serve(serve::ServeArgs),

    /// Analyze an image or a symptom description from the terminal
    Ask(ask::AskArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}
