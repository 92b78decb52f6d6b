//! CLI configuration

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tessera_core::DerivationOptions;
use tracing::info;

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "TESSERA_CONFIG";

/// CLI configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Derivation used when no path or index flags are given
    pub derivation: DerivationOptions,

    /// Log filter used when RUST_LOG is unset
    pub log_filter: String,

    /// Pretty-print JSON output
    pub pretty: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            derivation: DerivationOptions::default(),
            log_filter: "tessera=info".to_string(),
            pretty: true,
        }
    }
}

impl CliConfig {
    /// `$TESSERA_CONFIG`, else `<config dir>/tessera/cli.json`
    pub fn default_path() -> PathBuf {
        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("tessera")
                    .join("cli.json")
            })
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load `path`, writing the defaults there first if it does not exist
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        let config = Self::default();
        config.save(path)?;
        info!("Created default config at {:?}", path);
        Ok(config)
    }
}
