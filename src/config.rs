//! Configuration module for nio-echo.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;

/// Default echo port.
pub const DEFAULT_PORT: u16 = 8899;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "nio-echo")]
#[command(author = "nio-echo authors")]
#[command(version = "0.1.0")]
#[command(about = "Line-delimited echo server and client on a hand-rolled reactor", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: RoleArgs,
}

/// Which side of the protocol to run
#[derive(Subcommand, Debug)]
pub enum RoleArgs {
    /// Accept connections and echo every line back
    Server {
        /// Address to bind to (e.g., 0.0.0.0:8899)
        #[arg(short = 'l', long)]
        listen: Option<String>,
    },
    /// Send console lines to a server and print the replies
    Client {
        /// Server address (e.g., 127.0.0.1:8899)
        #[arg(short = 'a', long)]
        connect: Option<String>,
    },
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// Client-related configuration
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    /// Server address to connect to
    #[serde(default = "default_connect")]
    pub connect: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect: default_connect(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    format!("0.0.0.0:{DEFAULT_PORT}")
}

fn default_connect() -> String {
    format!("127.0.0.1:{DEFAULT_PORT}")
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Role selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub role: Role,
    pub listen: String,
    pub connect: String,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    /// Merge parsed CLI args with the TOML file they point at, if any.
    /// CLI arguments take precedence over TOML file values.
    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        let (role, listen, connect) = match cli.command {
            RoleArgs::Server { listen } => (
                Role::Server,
                listen.unwrap_or(toml_config.server.listen),
                toml_config.client.connect,
            ),
            RoleArgs::Client { connect } => (
                Role::Client,
                toml_config.server.listen,
                connect.unwrap_or(toml_config.client.connect),
            ),
        };

        Ok(Config {
            role,
            listen,
            connect,
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        })
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
