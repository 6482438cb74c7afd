//! Wake word listening.
//! Composes the feature window, a classifier adapter, and the activation
//! trigger into a per-frame "was that the wake word" answer, and remembers
//! the audio that caused the last trigger.

use ndarray::ArrayView2;
use tracing::debug;

use crate::audio::features::{FeatureWindow, SpectralExtractor};
use crate::audio::trigger::ActivationTrigger;
use crate::config::{AudioParams, ConfigError, WakeParams};

/// Wake classifier adapter (model backend port).
/// Scores one feature matrix; 1.0 means certain wake word.
pub trait WakeClassifier: Send {
    fn predict(&mut self, features: ArrayView2<'_, f32>) -> Result<f32, PredictError>;

    /// Reset internal state (e.g., between sessions).
    fn reset(&mut self);
}

/// Classifier adapter failure. Recoverable per frame: the feature buffers
/// keep their state and the next frame gets a fresh prediction.
#[derive(Debug)]
pub enum PredictError {
    /// The feature matrix shape does not match what the model expects.
    BadShape { rows: usize, cols: usize },
    /// Backend inference failure.
    Backend(String),
}

impl std::fmt::Display for PredictError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PredictError::BadShape { rows, cols } => {
                write!(f, "unexpected feature shape {rows}x{cols}")
            }
            PredictError::Backend(msg) => write!(f, "classifier backend failed: {msg}"),
        }
    }
}

#[derive(Debug)]
pub enum WakeError {
    /// No trigger has ever fired, so there is no activation audio to return.
    NoActivation,
    Predict(PredictError),
}

impl std::fmt::Display for WakeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WakeError::NoActivation => write!(f, "no activation recorded yet"),
            WakeError::Predict(e) => write!(f, "{e}"),
        }
    }
}

impl From<PredictError> for WakeError {
    fn from(e: PredictError) -> Self {
        WakeError::Predict(e)
    }
}

/// Per-frame wake word listener.
///
/// Every observed frame is committed to the feature window first; only then
/// is the classifier consulted. A failed prediction therefore never
/// desynchronizes the buffers — the frame simply does not contribute to a
/// trigger decision.
pub struct WakeListener {
    window: FeatureWindow,
    trigger: ActivationTrigger,
    classifier: Box<dyn WakeClassifier>,
    last_activation: Option<Vec<f32>>,
    last_probability: f32,
}

impl WakeListener {
    pub fn new(
        audio: &AudioParams,
        wake: &WakeParams,
        extractor: Box<dyn SpectralExtractor>,
        classifier: Box<dyn WakeClassifier>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            window: FeatureWindow::new(audio, extractor)?,
            trigger: ActivationTrigger::new(wake)?,
            classifier,
            last_activation: None,
            last_probability: 0.0,
        })
    }

    /// Feed one frame. Returns true exactly when a wake trigger fires, in
    /// which case the audio behind the current feature matrix is snapshotted
    /// as the last activation.
    pub fn observe(&mut self, frame: &[i16]) -> Result<bool, WakeError> {
        self.window.push(frame);
        let probability = self
            .classifier
            .predict(self.window.features())?
            .clamp(0.0, 1.0);
        self.last_probability = probability;

        let triggered = self.trigger.check(probability);
        if triggered {
            debug!(probability, "wake trigger fired");
            self.last_activation = Some(self.window.feature_audio().to_vec());
        }
        Ok(triggered)
    }

    /// Probability from the most recent successful prediction.
    pub fn last_probability(&self) -> f32 {
        self.last_probability
    }

    /// The audio snapshot from the last trigger as raw samples.
    pub fn last_activation_samples(&self) -> Result<Vec<i16>, WakeError> {
        let audio = self
            .last_activation
            .as_ref()
            .ok_or(WakeError::NoActivation)?;
        Ok(audio.iter().map(|&s| pcm_from_f32(s)).collect())
    }

    /// The audio snapshot from the last trigger as 16-bit little-endian PCM
    /// bytes, `n_features * hop_samples * 2` bytes long.
    pub fn last_activation_bytes(&self) -> Result<Vec<u8>, WakeError> {
        let samples = self.last_activation_samples()?;
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        Ok(bytes)
    }

    /// Clear feature, trigger, and classifier state. The last activation
    /// snapshot is kept; it describes the past, not the current stream.
    pub fn reset(&mut self) {
        self.window.reset();
        self.trigger.reset();
        self.classifier.reset();
        self.last_probability = 0.0;
    }
}

/// Convert a normalized sample back to 16-bit PCM, saturating at the rails.
#[inline]
fn pcm_from_f32(s: f32) -> i16 {
    (s * 32768.0)
        .round()
        .clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}

/// Placeholder classifier scoring sudden rises in feature energy.
/// Keeps the pipeline runnable without a trained model; production
/// deployments implement [`WakeClassifier`] over a real inference backend.
pub struct EnergySpikeClassifier {
    /// Smoothed energy of the newest feature row.
    prev_energy: f32,
    spike_ratio_threshold: f32,
}

impl EnergySpikeClassifier {
    pub fn new() -> Self {
        Self {
            prev_energy: 0.0,
            spike_ratio_threshold: 3.0,
        }
    }
}

impl Default for EnergySpikeClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl WakeClassifier for EnergySpikeClassifier {
    fn predict(&mut self, features: ArrayView2<'_, f32>) -> Result<f32, PredictError> {
        let (rows, cols) = features.dim();
        if rows == 0 || cols == 0 {
            return Err(PredictError::BadShape { rows, cols });
        }
        let newest = features.row(rows - 1);
        let energy = newest.iter().map(|c| c.abs()).sum::<f32>() / cols as f32;

        let score = if self.prev_energy > 0.5
            && energy > self.prev_energy * self.spike_ratio_threshold
        {
            let ratio = energy / self.prev_energy;
            ((ratio - self.spike_ratio_threshold) / self.spike_ratio_threshold).clamp(0.0, 1.0)
        } else {
            0.0
        };

        // Exponential moving average for energy tracking
        self.prev_energy = self.prev_energy * 0.9 + energy * 0.1;
        Ok(score)
    }

    fn reset(&mut self) {
        self.prev_energy = 0.0;
    }
}
