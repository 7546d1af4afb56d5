use anyhow::{Context, Result};
use clap::Args;
use std::path::Path;
use std::sync::Arc;

use medassist::config::Config;
use medassist::gateway::OpenAiGateway;
use medassist::prompts::PromptSet;
use medassist::server::Server;

#[derive(Args)]
pub struct ServeArgs {
    /// Address to bind (overrides server.bind)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Port to listen on (overrides server.port)
    #[arg(short, long)]
    pub port: Option<u16>,
}

pub async fn run(args: ServeArgs, config_path: Option<&Path>) -> Result<()> {
    let mut config = Config::load(config_path)?;

    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let prompts = PromptSet::from_config(&config.prompts)?;
    // Refuse to start without an API key
    let gateway = OpenAiGateway::from_config(&config, prompts)
        .context("Cannot start the web UI")?;

    println!(
        "medassist {} listening on http://{}:{}",
        env!("CARGO_PKG_VERSION"),
        config.server.bind,
        config.server.port
    );
    println!(
        "Vision model: {}, text model: {}",
        config.model.vision_model, config.model.text_model
    );

    Server::new(&config, Arc::new(gateway)).run().await
}
