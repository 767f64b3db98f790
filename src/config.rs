use log::warn;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::container::DEFAULT_IO_BUFFER_SIZE;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read configuration: {0}")]
    Read(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub const DEFAULT_FRAME_RATE: f64 = 30.0;
pub const DEFAULT_DRIFT_CORRECTION: f64 = 0.05;

fn valid_frame_rate(fps: f64) -> bool {
    fps.is_finite() && fps > 0.0
}

fn valid_drift_correction(step: f64) -> bool {
    (0.0..1.0).contains(&step)
}

/// Runtime settings shared by the demux, mux and decode components.
///
/// Every field has a default, so a partial JSON file only overrides what
/// it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Size of the buffer bridging callback sources and sinks
    pub io_buffer_size: usize,
    /// Container used for demuxed audio
    pub audio_output_format: String,
    /// Video rate assumed by the muxer when the source states none
    pub default_frame_rate: f64,
    /// Fraction by which the video frame interval is shortened or stretched
    /// while audio drifts, in `[0, 1)`
    pub drift_correction: f64,
    pub decoder: DecoderConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub hardware: bool,
    /// Tried in order before falling back to software decoding
    pub hardware_backends: Vec<String>,
    pub format_hint: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            io_buffer_size: DEFAULT_IO_BUFFER_SIZE,
            audio_output_format: "adts".into(),
            default_frame_rate: DEFAULT_FRAME_RATE,
            drift_correction: DEFAULT_DRIFT_CORRECTION,
            decoder: DecoderConfig::default(),
        }
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        DecoderConfig {
            hardware: true,
            hardware_backends: vec!["mediacodec".into(), "cuvid".into(), "qsv".into()],
            format_hint: None,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from a JSON file and validate them.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !valid_frame_rate(self.default_frame_rate) {
            return Err(ConfigError::Invalid {
                field: "default_frame_rate",
                reason: format!("{} is not a positive rate", self.default_frame_rate),
            });
        }
        if !valid_drift_correction(self.drift_correction) {
            return Err(ConfigError::Invalid {
                field: "drift_correction",
                reason: format!("{} is outside [0, 1)", self.drift_correction),
            });
        }
        Ok(())
    }

    /// The same settings with invalid timing values reset to their defaults.
    pub fn sanitized(mut self) -> Self {
        if !valid_frame_rate(self.default_frame_rate) {
            warn!(
                "Config: default_frame_rate {} ignored, using {}",
                self.default_frame_rate, DEFAULT_FRAME_RATE
            );
            self.default_frame_rate = DEFAULT_FRAME_RATE;
        }
        if !valid_drift_correction(self.drift_correction) {
            warn!(
                "Config: drift_correction {} ignored, using {}",
                self.drift_correction, DEFAULT_DRIFT_CORRECTION
            );
            self.drift_correction = DEFAULT_DRIFT_CORRECTION;
        }
        self
    }
}

/// Returns a version as specified in Cargo.toml
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn app_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.io_buffer_size, 4 * 1024 * 1024);
        assert_eq!(config.audio_output_format, "adts");
        assert_eq!(config.drift_correction, 0.05);
        assert!(config.decoder.hardware);
        assert_eq!(
            config.decoder.hardware_backends,
            vec!["mediacodec", "cuvid", "qsv"]
        );
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: Config = serde_json::from_str(
            r#"{ "drift_correction": 0.02, "decoder": { "hardware_backends": ["vaapi"] } }"#,
        )
        .unwrap();

        assert_eq!(config.drift_correction, 0.02);
        assert_eq!(config.default_frame_rate, 30.0);
        assert_eq!(config.decoder.hardware_backends, vec!["vaapi"]);
        assert!(config.decoder.hardware);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/no/such/avsplice.json");
        assert!(matches!(result, Err(ConfigError::Read(_))));
    }

    #[test]
    fn test_load_rejects_zero_frame_rate() {
        let path = std::env::temp_dir().join(format!("avsplice-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "default_frame_rate": 0 }"#).unwrap();
        let result = Config::load(&path);
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                field: "default_frame_rate",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_drift_correction() {
        let mut config = Config::default();
        config.validate().unwrap();

        for step in [1.0, 1.5, -0.1, f64::NAN] {
            config.drift_correction = step;
            assert!(matches!(
                config.validate(),
                Err(ConfigError::Invalid {
                    field: "drift_correction",
                    ..
                })
            ));
        }
        config.drift_correction = 0.0;
        config.validate().unwrap();
    }

    #[test]
    fn test_sanitized_resets_timing_values() {
        let config = Config {
            default_frame_rate: f64::INFINITY,
            drift_correction: 1.0,
            io_buffer_size: 1024,
            ..Config::default()
        }
        .sanitized();

        assert_eq!(config.default_frame_rate, DEFAULT_FRAME_RATE);
        assert_eq!(config.drift_correction, DEFAULT_DRIFT_CORRECTION);
        assert_eq!(config.io_buffer_size, 1024);
    }
}
