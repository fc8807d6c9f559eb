//! Config command implementation.

use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::cli::ConfigAction;
use crate::config::Config;

pub fn cmd_config(action: ConfigAction, path: &Path, config: &Config) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
            println!("# {}", path.display());
            print!("{}", content);
        }
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Init {
            device,
            name,
            force,
        } => {
            if path.exists() && !force {
                bail!(
                    "Config file already exists: {}\nUse --force to overwrite.",
                    path.display()
                );
            }
            let config = Config {
                device,
                name,
                ..Default::default()
            };
            config.validate()?;
            config.save(path)?;
            println!("Wrote {}", path.display());
        }
        ConfigAction::Validate => {
            Config::load_validated(path)?;
            println!("{} is valid", path.display());
        }
    }
    Ok(())
}
