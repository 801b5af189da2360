pub use onair_core::config::{Config, DatabaseConfig, PlayoutConfig};

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Default config locations, tried in order.
pub const DEFAULT_PATHS: [&str; 3] = [
    "./onair.toml",
    "~/.config/onair/config.toml",
    "/etc/onair/config.toml",
];

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    config.database.path = expand_path(&config.database.path);

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    for path_str in DEFAULT_PATHS {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Expand `~` and environment variables in a configured path.
fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(&raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(e) => {
            tracing::warn!("Could not expand path {:?}: {}", path, e);
            path.to_path_buf()
        }
    }
}

/// Validate configuration
fn validate_config(config: &Config) -> Result<()> {
    if config.database.path.as_os_str().is_empty() {
        anyhow::bail!("database.path cannot be empty");
    }

    if !(config.playout.rank_epsilon > 0.0) {
        anyhow::bail!(
            "playout.rank_epsilon must be positive, got {}",
            config.playout.rank_epsilon
        );
    }

    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    Ok(())
}
