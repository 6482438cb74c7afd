//! Pipeline configuration and derived buffer constants.
//! The derived values size every buffer in the pipeline and must match the
//! parameters the wake classifier was trained with; a mismatch desynchronizes
//! the feature stream from the model silently.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;

/// Parameters for audio capture and feature windowing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioParams {
    /// Samples recorded each second.
    pub sample_rate: u32,
    /// Samples delivered per read from the capture stream. The core tolerates
    /// frames of other lengths; this sets the processing cadence.
    pub chunk_size: usize,
    /// Length of one feature window in seconds.
    pub window_t: f32,
    /// Stride between consecutive windows in seconds.
    pub hop_t: f32,
    /// Length of audio summarized by one feature matrix in seconds.
    pub features_t: f32,
    /// FFT size, consumed by the spectral transform implementation.
    pub n_fft: usize,
    /// Filter count, consumed by the spectral transform implementation.
    pub n_filt: usize,
    /// Coefficients per feature row.
    pub n_mfcc: usize,
    /// Capture ring buffer length in seconds.
    pub ring_buffer_secs: f32,
}

impl Default for AudioParams {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            chunk_size: 1024,
            window_t: 0.1,
            hop_t: 0.05,
            features_t: 1.5,
            n_fft: 512,
            n_filt: 20,
            n_mfcc: 13,
            ring_buffer_secs: 3.0,
        }
    }
}

impl AudioParams {
    /// Samples used to compute one feature row.
    pub fn window_samples(&self) -> usize {
        (f64::from(self.window_t) * f64::from(self.sample_rate)).ceil() as usize
    }

    /// Samples the window advances between feature rows.
    pub fn hop_samples(&self) -> usize {
        (f64::from(self.hop_t) * f64::from(self.sample_rate)).ceil() as usize
    }

    /// Samples covered by one full feature matrix, rounded down to a whole
    /// number of hops.
    pub fn feature_span_samples(&self) -> usize {
        let hop = self.hop_samples();
        if hop == 0 {
            return 0;
        }
        let samples = (f64::from(self.features_t) * f64::from(self.sample_rate)).ceil() as usize;
        (samples / hop) * hop
    }

    /// Rows in the feature matrix: windows that fit inside the feature span
    /// at the configured hop.
    pub fn n_features(&self) -> usize {
        let hop = self.hop_samples() as i64;
        if hop <= 0 {
            return 0;
        }
        let span = self.feature_span_samples() as i64;
        let window = self.window_samples() as i64;
        (((span - window) / hop) + 1).max(0) as usize
    }

    /// Frames read per second at the configured chunk size.
    pub fn chunks_per_sec(&self) -> f64 {
        f64::from(self.sample_rate) / self.chunk_size as f64
    }

    /// Check the derived constants for consistency. Called by every component
    /// that sizes buffers from these values, so inconsistencies surface at
    /// construction and never during a push.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 || self.chunk_size == 0 {
            return Err(ConfigError::ZeroRate);
        }
        let hop = self.hop_samples();
        if hop == 0 {
            return Err(ConfigError::ZeroHop);
        }
        let window = self.window_samples();
        if window < hop {
            return Err(ConfigError::WindowShorterThanHop {
                window_samples: window,
                hop_samples: hop,
            });
        }
        if self.n_mfcc == 0 {
            return Err(ConfigError::ZeroCoeffs);
        }
        let span = self.feature_span_samples();
        if span < window {
            return Err(ConfigError::FeatureSpanTooShort {
                feature_span_samples: span,
                window_samples: window,
            });
        }
        let n = self.n_features();
        if n == 0 {
            return Err(ConfigError::FeatureSpanTooShort {
                feature_span_samples: span,
                window_samples: window,
            });
        }
        if window > hop * n {
            return Err(ConfigError::WindowExceedsFeatureAudio {
                window_samples: window,
                feature_audio_samples: hop * n,
            });
        }
        Ok(())
    }
}

/// Hysteresis trigger tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WakeParams {
    /// Probability threshold is `1.0 - sensitivity`; higher is more eager.
    pub sensitivity: f32,
    /// Consecutive above-threshold chunks required before a trigger fires.
    pub trigger_level: i32,
    /// Chunks of refractory suppression after a trigger.
    pub activation_delay: i32,
}

impl Default for WakeParams {
    fn default() -> Self {
        Self {
            sensitivity: 0.3,
            trigger_level: 3,
            activation_delay: 8,
        }
    }
}

impl WakeParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sensitivity > 0.0 && self.sensitivity < 1.0) {
            return Err(ConfigError::SensitivityOutOfRange(self.sensitivity));
        }
        if self.trigger_level < 1 || self.activation_delay < 0 {
            return Err(ConfigError::BadTriggerLevels {
                trigger_level: self.trigger_level,
                activation_delay: self.activation_delay,
            });
        }
        Ok(())
    }
}

/// Command boundary detection tuning. All timing is in frame counts so
/// behavior is deterministic under test regardless of scheduling jitter.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommandParams {
    /// Minimum frame volume (raw i16 units) that counts as speech.
    pub volume_threshold: f32,
    /// Quiet frames allowed before giving up on hearing a command at all.
    pub begin_timeout_frames: u32,
    /// Quiet frames that end a command once one has started.
    pub end_silence_frames: u32,
    /// Hard cap on buffered command frames.
    pub max_command_frames: usize,
}

impl Default for CommandParams {
    fn default() -> Self {
        // 5s begin wait, 1s end silence, 10s max length at the default
        // 1024-sample / 16 kHz frame cadence.
        Self {
            volume_threshold: 200.0,
            begin_timeout_frames: 78,
            end_silence_frames: 15,
            max_command_frames: 156,
        }
    }
}

impl CommandParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_command_frames == 0 {
            return Err(ConfigError::ZeroMaxCommandFrames);
        }
        Ok(())
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub audio: AudioParams,
    pub wake: WakeParams,
    pub command: CommandParams,
}

impl Config {
    /// Load a configuration from a JSON file. Missing fields fall back to
    /// the defaults.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.audio.validate()?;
        self.wake.validate()?;
        self.command.validate()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    ZeroRate,
    ZeroHop,
    ZeroCoeffs,
    ZeroMaxCommandFrames,
    WindowShorterThanHop {
        window_samples: usize,
        hop_samples: usize,
    },
    FeatureSpanTooShort {
        feature_span_samples: usize,
        window_samples: usize,
    },
    WindowExceedsFeatureAudio {
        window_samples: usize,
        feature_audio_samples: usize,
    },
    SensitivityOutOfRange(f32),
    BadTriggerLevels {
        trigger_level: i32,
        activation_delay: i32,
    },
    Io(String),
    Parse(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroRate => write!(f, "sample_rate and chunk_size must be non-zero"),
            ConfigError::ZeroHop => write!(f, "hop_t too small: derived hop_samples is zero"),
            ConfigError::ZeroCoeffs => write!(f, "n_mfcc must be at least 1"),
            ConfigError::ZeroMaxCommandFrames => {
                write!(f, "max_command_frames must be at least 1")
            }
            ConfigError::WindowShorterThanHop {
                window_samples,
                hop_samples,
            } => write!(
                f,
                "window_samples ({window_samples}) shorter than hop_samples ({hop_samples})"
            ),
            ConfigError::FeatureSpanTooShort {
                feature_span_samples,
                window_samples,
            } => write!(
                f,
                "feature span ({feature_span_samples} samples) cannot fit one window ({window_samples} samples)"
            ),
            ConfigError::WindowExceedsFeatureAudio {
                window_samples,
                feature_audio_samples,
            } => write!(
                f,
                "window_samples ({window_samples}) exceeds the feature audio buffer ({feature_audio_samples} samples)"
            ),
            ConfigError::SensitivityOutOfRange(s) => {
                write!(f, "sensitivity must be inside (0, 1), got {s}")
            }
            ConfigError::BadTriggerLevels {
                trigger_level,
                activation_delay,
            } => write!(
                f,
                "trigger_level must be >= 1 and activation_delay >= 0, got {trigger_level}/{activation_delay}"
            ),
            ConfigError::Io(msg) => write!(f, "config read failed: {msg}"),
            ConfigError::Parse(msg) => write!(f, "config parse failed: {msg}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_derived_constants() {
        let ap = AudioParams::default();
        assert_eq!(ap.window_samples(), 1600);
        assert_eq!(ap.hop_samples(), 800);
        assert_eq!(ap.feature_span_samples(), 24000);
        assert_eq!(ap.n_features(), 29);
        assert!(ap.validate().is_ok());
    }

    #[test]
    fn test_zero_hop_rejected() {
        let ap = AudioParams {
            hop_t: 0.0,
            ..AudioParams::default()
        };
        assert_eq!(ap.validate(), Err(ConfigError::ZeroHop));
    }

    #[test]
    fn test_window_shorter_than_hop_rejected() {
        let ap = AudioParams {
            window_t: 0.02,
            hop_t: 0.05,
            ..AudioParams::default()
        };
        assert!(matches!(
            ap.validate(),
            Err(ConfigError::WindowShorterThanHop { .. })
        ));
    }

    #[test]
    fn test_span_shorter_than_window_rejected() {
        let ap = AudioParams {
            features_t: 0.05,
            ..AudioParams::default()
        };
        assert!(matches!(
            ap.validate(),
            Err(ConfigError::FeatureSpanTooShort { .. })
        ));
    }

    #[test]
    fn test_window_exceeding_feature_audio_rejected() {
        // span fits exactly one window: feature audio holds hop * 1 = 800
        // samples, shorter than the 1600-sample window.
        let ap = AudioParams {
            features_t: 0.1,
            ..AudioParams::default()
        };
        assert!(matches!(
            ap.validate(),
            Err(ConfigError::WindowExceedsFeatureAudio { .. })
        ));
    }

    #[test]
    fn test_wake_params_bounds() {
        assert!(WakeParams::default().validate().is_ok());
        let bad = WakeParams {
            sensitivity: 1.0,
            ..WakeParams::default()
        };
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::SensitivityOutOfRange(_))
        ));
        let bad = WakeParams {
            trigger_level: 0,
            ..WakeParams::default()
        };
        assert!(matches!(bad.validate(), Err(ConfigError::BadTriggerLevels { .. })));
    }

    #[test]
    fn test_config_json_roundtrip() {
        let parsed: Config = serde_json::from_str(
            r#"{"audio": {"chunk_size": 512}, "wake": {"sensitivity": 0.5}}"#,
        )
        .unwrap();
        assert_eq!(parsed.audio.chunk_size, 512);
        assert_eq!(parsed.audio.sample_rate, 16000);
        assert!((parsed.wake.sensitivity - 0.5).abs() < f32::EPSILON);
        assert!(parsed.validate().is_ok());
    }
}
