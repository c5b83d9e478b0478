//! Integration tests for configuration loading.

use std::io::Write;
use tempfile::NamedTempFile;
use warp_player::config::{load_config, load_config_or_default, validate_config, PlayerConfig};

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn load_full_config() {
    let file = write_config(
        r#"
        [protocol]
        max_header_size = 1024
        read_chunk_size = 4096
        max_atom_size = 1048576

        [playback]
        tick_interval_ms = 50

        [session]
        stream_backlog = 8
        "#,
    );

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.protocol.max_header_size, 1024);
    assert_eq!(config.protocol.read_chunk_size, 4096);
    assert_eq!(config.protocol.max_atom_size, 1048576);
    assert_eq!(config.playback.tick_interval_ms, 50);
    assert_eq!(config.session.stream_backlog, 8);
}

#[test]
fn empty_file_uses_defaults() {
    let file = write_config("");
    let config = load_config(file.path()).unwrap();
    let defaults = PlayerConfig::default();

    assert_eq!(config.protocol.max_header_size, defaults.protocol.max_header_size);
    assert_eq!(config.playback.tick_interval_ms, defaults.playback.tick_interval_ms);
}

#[test]
fn invalid_values_are_rejected_on_load() {
    for content in [
        "[playback]\ntick_interval_ms = 0",
        "[protocol]\nmax_header_size = 7",
        "[protocol]\nmax_atom_size = 0",
        "[protocol]\nread_chunk_size = 0",
        "[session]\nstream_backlog = 0",
    ] {
        let file = write_config(content);
        assert!(load_config(file.path()).is_err(), "accepted {:?}", content);
    }
}

#[test]
fn malformed_toml_is_rejected() {
    let file = write_config("[playback\ntick_interval_ms = ");
    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_config(&dir.path().join("missing.toml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn explicit_path_wins_over_defaults() {
    let file = write_config("[session]\nstream_backlog = 3");
    let config = load_config_or_default(Some(file.path())).unwrap();
    assert_eq!(config.session.stream_backlog, 3);
    assert!(validate_config(&config).is_ok());
}
