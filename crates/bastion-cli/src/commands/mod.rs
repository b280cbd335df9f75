//! Subcommand implementations

pub mod keygen;
pub mod serve;
pub mod token;

use std::path::Path;

use anyhow::{Context, Result};

use bastion_core::config::{default_config_path, load_config, GatewayConfig};

/// Load the gateway configuration.
///
/// An explicit path must exist. Without one, the default location is used
/// when present and built-in defaults otherwise.
pub fn load_gateway_config(path: Option<&Path>) -> Result<GatewayConfig> {
    match path {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => {
            let default_path = default_config_path();
            if default_path.exists() {
                tracing::debug!("Using config at {}", default_path.display());
                load_config(&default_path).with_context(|| {
                    format!("Failed to load config from {}", default_path.display())
                })
            } else {
                Ok(GatewayConfig::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_missing_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_gateway_config(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_explicit_config_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "bind_address = \"127.0.0.1:9000\"\n").unwrap();
        let config = load_gateway_config(Some(&path)).unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:9000");
    }
}
