use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PlayerConfig {
    #[serde(default)]
    pub protocol: ProtocolConfig,

    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

/// Limits applied while decoding inbound streams.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProtocolConfig {
    /// Largest accepted JSON header, in bytes
    #[serde(default = "default_max_header_size")]
    pub max_header_size: usize,

    /// Bytes requested per read when forwarding init payloads
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,

    /// Largest accepted top-level atom, in bytes
    #[serde(default = "default_max_atom_size")]
    pub max_atom_size: usize,
}

fn default_max_header_size() -> usize {
    64 * 1024
}
fn default_read_chunk_size() -> usize {
    16 * 1024
}
fn default_max_atom_size() -> usize {
    64 * 1024 * 1024
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_header_size: default_max_header_size(),
            read_chunk_size: default_read_chunk_size(),
            max_atom_size: default_max_atom_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaybackConfig {
    /// Period of the seek/skip control loop (default: 100ms)
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

fn default_tick_interval_ms() -> u64 {
    100
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl PlaybackConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Capacity of the inbound stream channel
    #[serde(default = "default_stream_backlog")]
    pub stream_backlog: usize,
}

fn default_stream_backlog() -> usize {
    64
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stream_backlog: default_stream_backlog(),
        }
    }
}
