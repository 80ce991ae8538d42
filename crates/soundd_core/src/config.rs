//! Runtime configuration, loaded from the two JSON sections a daemon
//! deployment reads: `server` (listener/protocol knobs) and `sound`
//! (engine/device knobs). Every field has a `Default` matching the hard
//! constants of §6 of the protocol contract, so a missing or partial
//! config file still boots the daemon with documented behavior, mirroring
//! the teacher's `EngineConfig`/`StreamConfig` `Default` + `validate()`
//! pair in spirit.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{BASE_SAMPLE_RATE, DEFAULT_PORT, MAX_BYTES_ON_MESSAGE, NETWORK_BUFFER_SIZE};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub max_bytes_on_message: u32,
    pub network_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_bytes_on_message: MAX_BYTES_ON_MESSAGE,
            network_buffer_size: NETWORK_BUFFER_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_bytes_on_message == 0 {
            return Err("max_bytes_on_message must be nonzero".into());
        }
        if self.network_buffer_size == 0 {
            return Err("network_buffer_size must be nonzero".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SoundConfig {
    pub base_sample_rate: u32,
    pub bass_band: (f32, f32),
    pub preferred_backend_substring: Option<String>,
    pub prebuffer_frames: u32,
    pub worker_pool_size: usize,
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            base_sample_rate: BASE_SAMPLE_RATE,
            bass_band: (20.0, 250.0),
            preferred_backend_substring: None,
            prebuffer_frames: BASE_SAMPLE_RATE,
            worker_pool_size: 1,
        }
    }
}

impl SoundConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.bass_band.0 >= self.bass_band.1 {
            return Err(format!(
                "bass_band lower {} must be < higher {}",
                self.bass_band.0, self.bass_band.1
            ));
        }
        if self.worker_pool_size == 0 {
            return Err("worker_pool_size must be nonzero".into());
        }
        Ok(())
    }
}

/// The parsed contents of both config sections, as published by
/// [`crate::settings::ConfigWatcher`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DaemonConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sound: SoundConfig,
}

impl DaemonConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.sound.validate()?;
        Ok(())
    }

    /// Parse a `DaemonConfig` out of the JSON file at `path`. Missing
    /// sections fall back to their `Default`; a missing file is not an
    /// error here — callers that require one present should check first.
    pub fn load_from_file(path: &Path) -> Result<Self, String> {
        let contents = fs::read_to_string(path).map_err(|e| e.to_string())?;
        serde_json::from_str(&contents).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_defaults_match_hard_constants() {
        let config = ServerConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.max_bytes_on_message, MAX_BYTES_ON_MESSAGE);
        assert_eq!(config.network_buffer_size, NETWORK_BUFFER_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sound_config_defaults_match_hard_constants() {
        let config = SoundConfig::default();
        assert_eq!(config.base_sample_rate, BASE_SAMPLE_RATE);
        assert_eq!(config.bass_band, (20.0, 250.0));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sound_config_rejects_inverted_band() {
        let config = SoundConfig {
            bass_band: (300.0, 100.0),
            ..SoundConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_daemon_config_partial_json_fills_defaults() {
        let json = r#"{"server": {"port": 9999}}"#;
        let parsed: DaemonConfig = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.server.port, 9999);
        assert_eq!(parsed.server.max_bytes_on_message, MAX_BYTES_ON_MESSAGE);
        assert_eq!(parsed.sound, SoundConfig::default());
    }

    #[test]
    fn test_daemon_config_empty_json_is_all_defaults() {
        let parsed: DaemonConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, DaemonConfig::default());
    }

    #[test]
    fn test_load_from_file_missing_path_errors() {
        let err = DaemonConfig::load_from_file(Path::new("/nonexistent/soundd.json"));
        assert!(err.is_err());
    }
}
