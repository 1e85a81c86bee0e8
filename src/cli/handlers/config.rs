//! Configuration management handler

use super::super::{CliContext, ConfigAction};
use anyhow::{Context, Result};
use apns_push::config::ConfigManager;

/// Handler for `init` and `config`
pub struct ConfigHandler<'a> {
    context: &'a CliContext,
}

impl<'a> ConfigHandler<'a> {
    pub fn new(context: &'a CliContext) -> Self {
        Self { context }
    }

    /// Write a default configuration file
    pub fn handle_init(&self, force: bool) -> Result<()> {
        let config_path = self.context.config_manager.path().to_path_buf();

        if config_path.exists() && !force {
            println!("Configuration already initialized at: {}", config_path.display());
            println!("Use --force to overwrite");
            return Ok(());
        }

        ConfigManager::with_defaults(config_path.clone())
            .save()
            .context("Failed to write configuration")?;

        println!("Configuration initialized successfully at: {}", config_path.display());
        println!();
        println!("Fill in the [apns] section before sending:");
        println!("  team_id   = Apple Developer team id");
        println!("  key_id    = id of the .p8 auth key");
        println!("  key_path  = path to AuthKey_<key_id>.p8");
        println!("  bundle_id = app bundle id (used as apns-topic)");

        Ok(())
    }

    pub fn handle_config(&self, action: ConfigAction) -> Result<()> {
        let manager = &self.context.config_manager;

        match action {
            ConfigAction::Show => {
                println!("# {}", manager.path().display());
                if !manager.is_loaded() {
                    println!("# file not found, showing defaults");
                }
                println!("{}", manager.redacted_toml()?);
            }
            ConfigAction::Path => {
                println!("{}", manager.path().display());
            }
        }

        Ok(())
    }
}
