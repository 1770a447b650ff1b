//! Configuration for the DAPI daemon
//!
//! Loads configuration from TOML file at `~/.config/dapi/config.toml`
//! Auto-generates default config file on first run if missing.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub browser: BrowserConfig,
    pub mail: MailConfig,
    pub desktop: DesktopConfig,
}

impl Config {
    /// Load configuration from file, or use defaults if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            // Auto-generate default config file
            if let Err(e) = Self::save_default(&config_path) {
                warn!("Failed to create default config file: {}", e);
            }
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path; the file must exist
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Configuration loaded from {:?}", path);
        debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Get the path to the config file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("dapi");

        Ok(config_dir.join("config.toml"))
    }

    /// Save default configuration to file
    fn save_default(path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let default_config = Self::default();
        let toml_string = toml::to_string_pretty(&default_config)
            .context("Failed to serialize default config")?;

        fs::write(path, toml_string).context("Failed to write default config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }

    /// Socket to listen on: configured path, else `$DAPI_SOCKET`, else the runtime dir
    pub fn socket_path(&self) -> PathBuf {
        self.server
            .socket_path
            .clone()
            .unwrap_or_else(dapi_ipc::socket_path)
    }
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket path override
    pub socket_path: Option<PathBuf>,
    /// Largest string or list accepted from a client, per argument
    pub max_payload_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            max_payload_len: dapi_ipc::wire::DEFAULT_MAX_PAYLOAD_LEN,
        }
    }
}

/// Browser launch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Commands tried in order; the URL is appended as last argument
    pub commands: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            commands: ["xdg-open", "firefox", "mozilla", "netscape", "opera"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Mail composer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// Command taking xdg-email style arguments
    pub command: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            command: "xdg-email".to_string(),
        }
    }
}

/// Desktop integration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DesktopConfig {
    /// Dialog button order reported to clients
    pub button_order: i32,
    /// Connect to the X server (screensaver control)
    pub x11: bool,
}

impl Default for DesktopConfig {
    fn default() -> Self {
        Self {
            button_order: 1,
            x11: true,
        }
    }
}
