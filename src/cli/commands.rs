//! Command definitions and structures for the CLI
//!
//! clap-based argument definitions: the top-level `Cli`, its subcommands,
//! and the argument groups shared between them.

use apns_push::config::ApnsConfig;
use apns_push::request::{Priority, PushType};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Main CLI structure
#[derive(Parser)]
#[command(name = "apns-push")]
#[command(about = "Send Apple Push Notifications with token-based authentication")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the configuration file
    #[arg(short, long, global = true, env = "APNS_PUSH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Send a notification to one or more device tokens
    Send(SendArgs),

    /// Write a default configuration file
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration inspection actions
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration (key material redacted)
    Show,

    /// Print the configuration file path
    Path,
}

/// Arguments of the `send` command
#[derive(Args, Debug)]
pub struct SendArgs {
    /// Hex-encoded device tokens
    #[arg(required = true)]
    pub tokens: Vec<String>,

    /// Alert title
    #[arg(short, long)]
    pub title: Option<String>,

    /// Alert subtitle
    #[arg(long)]
    pub subtitle: Option<String>,

    /// Alert body
    #[arg(short, long)]
    pub body: Option<String>,

    /// Sound name, e.g. "default"
    #[arg(long)]
    pub sound: Option<String>,

    /// Badge count
    #[arg(long)]
    pub badge: Option<u32>,

    /// Custom payload entry as key=value; values that parse as JSON are kept typed
    #[arg(short, long = "data", value_parser = parse_key_value)]
    pub data: Vec<(String, String)>,

    /// Wake the app in the background
    #[arg(long)]
    pub content_available: bool,

    /// apns-push-type header
    #[arg(long, default_value = "alert")]
    pub push_type: PushType,

    /// apns-priority header (10 immediate, 5 power-considerate)
    #[arg(short, long, default_value_t = 10, value_parser = parse_priority)]
    pub priority: u8,

    /// apns-expiration header as a unix timestamp
    #[arg(long)]
    pub expiration: Option<i64>,

    /// apns-collapse-id header
    #[arg(long)]
    pub collapse_id: Option<String>,

    /// Read timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Retries after retryable failures
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Print the request instead of sending it
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub credentials: CredentialArgs,
}

/// Overrides for the `[apns]` section of the config file
#[derive(Args, Debug, Default)]
pub struct CredentialArgs {
    /// Apple Developer team id
    #[arg(long, env = "APNS_TEAM_ID")]
    pub team_id: Option<String>,

    /// Auth key id
    #[arg(long, env = "APNS_KEY_ID")]
    pub key_id: Option<String>,

    /// Path to the .p8 auth key
    #[arg(long, env = "APNS_KEY_PATH")]
    pub key_path: Option<PathBuf>,

    /// App bundle id
    #[arg(long, env = "APNS_BUNDLE_ID")]
    pub bundle_id: Option<String>,

    /// apns-topic override (defaults to the bundle id)
    #[arg(long, env = "APNS_TOPIC")]
    pub topic: Option<String>,

    /// Use the sandbox (development) environment
    #[arg(long)]
    pub sandbox: bool,

    /// Custom endpoint URL
    #[arg(long, env = "APNS_ENDPOINT")]
    pub endpoint: Option<String>,
}

impl CredentialArgs {
    /// Layer the command-line values over the file configuration
    pub fn apply(&self, mut config: ApnsConfig) -> ApnsConfig {
        if let Some(team_id) = &self.team_id {
            config.team_id = team_id.clone();
        }
        if let Some(key_id) = &self.key_id {
            config.key_id = key_id.clone();
        }
        if let Some(key_path) = &self.key_path {
            config.key_path = Some(key_path.clone());
            config.key_pem = None;
        }
        if let Some(bundle_id) = &self.bundle_id {
            config.bundle_id = bundle_id.clone();
        }
        if let Some(topic) = &self.topic {
            config.topic = Some(topic.clone());
        }
        if self.sandbox {
            config.use_sandbox = true;
        }
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = Some(endpoint.clone());
        }
        config
    }
}

fn parse_priority(s: &str) -> Result<u8, String> {
    let value: u8 = s.parse().map_err(|_| format!("'{s}' is not a number"))?;
    if Priority::from(value).is_documented() {
        Ok(value)
    } else {
        Err("priority must be 10 (immediate) or 5 (power-considerate)".to_string())
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=value: no '=' found in '{s}'"))?;
    if key.is_empty() {
        return Err(format!("invalid KEY=value: empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}
