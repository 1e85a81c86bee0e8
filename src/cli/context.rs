//! CLI context holding the loaded configuration and verbosity

use anyhow::Result;
use apns_push::config::ConfigManager;
use std::path::PathBuf;

/// CLI execution context shared by all handlers
pub struct CliContext {
    pub verbose: bool,
    pub config_manager: ConfigManager,
}

impl CliContext {
    /// Load the configuration from `config_path`, or from the default location
    pub fn new(config_path: Option<PathBuf>, verbose: bool) -> Result<Self> {
        let config_manager = ConfigManager::new(config_path)?;

        Ok(Self {
            verbose,
            config_manager,
        })
    }

    /// Initialize logging subsystem based on verbosity and configuration
    pub fn init_logging(&self) -> Result<()> {
        let log_level = if self.verbose {
            "debug"
        } else {
            self.config_manager.config().logging.level.as_str()
        };

        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env().add_directive(
                    log_level
                        .parse()
                        .unwrap_or_else(|_| tracing::Level::INFO.into()),
                ),
            )
            .init();

        if self.verbose {
            tracing::debug!("Verbose logging enabled");
            tracing::debug!("Config path: {}", self.config_manager.path().display());
        }

        Ok(())
    }
}
