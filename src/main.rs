use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Commands};
use medassist::config::{Config, LoggingConfig};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Secrets may live in a .env file next to where we run
    dotenvy::dotenv().ok();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();

    // Commands load the config again and report errors themselves
    let logging = Config::load(config_path.as_deref())
        .map(|c| c.logging)
        .unwrap_or_default();
    init_logging(cli.verbose, &logging);

    match cli.command {
        Commands::Serve(args) => cli::serve::run(args, config_path.as_deref()).await,
        Commands::Ask(args) => cli::ask::run(args, config_path.as_deref()).await,
        Commands::Config(args) => cli::config::run(args, config_path.as_deref()).await,
    }
}

fn init_logging(verbose: bool, logging: &LoggingConfig) {
    let log_level = if verbose { "debug" } else { logging.level.as_str() };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}
