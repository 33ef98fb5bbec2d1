//! Emulation configuration carried by the `Config` protocol record.

use crate::error::{IpcError, Result};
use serde::{Deserialize, Serialize};

/// Global emulation configuration, applied once when the worker
/// processes the initial `Config` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmuConfig {
    /// Output sample rate in Hz.
    pub frequency: u32,
    /// Emulate the power-LED audio filter.
    pub filter: bool,
    /// NTSC timing instead of PAL.
    pub ntsc: bool,
    /// Stereo separation, 0.0 (mono) to 1.0 (hard-panned).
    pub panning: f32,
}

impl Default for EmuConfig {
    fn default() -> Self {
        Self {
            frequency: eagleplay_common::DEFAULT_SAMPLE_RATE,
            filter: true,
            ntsc: false,
            panning: 0.7,
        }
    }
}

impl EmuConfig {
    /// Serialize for the `Config` record payload.
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| IpcError::Config(e.to_string()))
    }

    /// Deserialize from a `Config` record payload.
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(|e| IpcError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_round_trip() {
        let config = EmuConfig { frequency: 48_000, filter: false, ..Default::default() };
        let payload = config.to_payload().unwrap();
        assert_eq!(EmuConfig::from_payload(&payload).unwrap(), config);
    }

    #[test]
    fn test_malformed_payload_is_config_error() {
        assert!(matches!(
            EmuConfig::from_payload(b"not json"),
            Err(IpcError::Config(_))
        ));
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config = EmuConfig::from_payload(b"{\"frequency\":22050}").unwrap();
        assert_eq!(config.frequency, 22_050);
        assert!(config.filter);
    }
}
