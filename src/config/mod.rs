mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Smallest header limit that can hold a frame's size and tag.
const MIN_HEADER_SIZE: usize = 8;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<PlayerConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: PlayerConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<PlayerConfig> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = ["./warp.toml", "~/.config/warp/config.toml"];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(PlayerConfig::default())
}

/// Validate configuration
pub fn validate_config(config: &PlayerConfig) -> crate::Result<()> {
    if config.playback.tick_interval_ms == 0 {
        return Err(crate::Error::config("playback.tick_interval_ms cannot be 0"));
    }

    if config.protocol.max_header_size < MIN_HEADER_SIZE {
        return Err(crate::Error::config(format!(
            "protocol.max_header_size must be at least {}",
            MIN_HEADER_SIZE
        )));
    }

    if config.protocol.max_atom_size < MIN_HEADER_SIZE {
        return Err(crate::Error::config(format!(
            "protocol.max_atom_size must be at least {}",
            MIN_HEADER_SIZE
        )));
    }

    if config.protocol.read_chunk_size == 0 {
        return Err(crate::Error::config("protocol.read_chunk_size cannot be 0"));
    }

    if config.session.stream_backlog == 0 {
        return Err(crate::Error::config("session.stream_backlog cannot be 0"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PlayerConfig::default();
        assert_eq!(config.protocol.max_header_size, 65536);
        assert_eq!(config.protocol.read_chunk_size, 16384);
        assert_eq!(config.protocol.max_atom_size, 64 * 1024 * 1024);
        assert_eq!(config.playback.tick_interval_ms, 100);
        assert_eq!(config.session.stream_backlog, 64);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: PlayerConfig = toml::from_str(
            r#"
            [playback]
            tick_interval_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.playback.tick_interval_ms, 250);
        assert_eq!(config.protocol.max_header_size, 65536);
        assert_eq!(
            config.playback.tick_interval(),
            std::time::Duration::from_millis(250)
        );
    }

    #[test]
    fn test_validate_rejects_zero_tick() {
        let mut config = PlayerConfig::default();
        config.playback.tick_interval_ms = 0;
        assert!(matches!(
            validate_config(&config),
            Err(crate::Error::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_tiny_header_limit() {
        let mut config = PlayerConfig::default();
        config.protocol.max_header_size = 4;
        assert!(validate_config(&config).is_err());
    }
}
