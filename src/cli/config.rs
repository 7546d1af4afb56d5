use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

use medassist::config::Config;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration (API key masked)
    Show,

    /// Print the config file location
    Path,

    /// Write the default config template
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print a single value
    Get {
        /// Dotted key, e.g. model.vision_model
        key: String,
    },

    /// Change a single value and save
    Set { key: String, value: String },
}

pub async fn run(args: ConfigArgs, config_path: Option<&Path>) -> Result<()> {
    match args.command {
        ConfigCommands::Show => show(config_path),
        ConfigCommands::Path => {
            println!("{}", resolve(config_path)?.display());
            Ok(())
        }
        ConfigCommands::Init { force } => init(config_path, force),
        ConfigCommands::Get { key } => {
            let config = Config::load(config_path)?;
            println!("{}", config.get_value(&key)?);
            Ok(())
        }
        ConfigCommands::Set { key, value } => set(config_path, &key, &value),
    }
}

fn resolve(config_path: Option<&Path>) -> Result<PathBuf> {
    match config_path {
        Some(p) => Ok(p.to_path_buf()),
        None => Ok(Config::config_path()?),
    }
}

fn show(config_path: Option<&Path>) -> Result<()> {
    let mut config = Config::load(config_path)?;

    let key = &mut config.providers.openai.api_key;
    if !key.is_empty() {
        *key = "********".to_string();
    }

    let source = resolve(config_path)?;
    if source.exists() {
        println!("# {}", source.display());
    } else {
        println!("# {} (not found, showing defaults)", source.display());
    }
    println!("{}", toml::to_string_pretty(&config)?);

    Ok(())
}

fn init(config_path: Option<&Path>, force: bool) -> Result<()> {
    let path = resolve(config_path)?;
    if path.exists() && !force {
        bail!(
            "Config file already exists at {} (use --force to overwrite)",
            path.display()
        );
    }

    let written = Config::save_template(Some(&path))?;
    println!("Wrote {}", written.display());
    Ok(())
}

fn set(config_path: Option<&Path>, key: &str, value: &str) -> Result<()> {
    let path = resolve(config_path)?;

    // Read the raw file so `${VAR}` references are saved back unexpanded
    let mut config = if path.exists() {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Config::from_toml(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?
    } else {
        Config::default()
    };

    config.set_value(key, value)?;
    let written = config.save(Some(&path))?;
    println!("{} = {} ({})", key, config.get_value(key)?, written.display());

    Ok(())
}
