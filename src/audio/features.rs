//! Incremental feature windowing.
//! Keeps a raw-audio carry buffer, a fixed-shape feature matrix, and the
//! exact audio that produced the matrix, all advancing in lock-step no matter
//! how the input stream is chunked.

use ndarray::{Array2, ArrayView2};

use crate::config::{AudioParams, ConfigError};

/// Spectral transform adapter. Implementations must be pure and stateless:
/// for `samples.len() >= window_samples` the output has exactly
/// `(samples.len() - window_samples) / hop_samples + 1` rows, one per window
/// position, and a fixed coefficient count per row.
pub trait SpectralExtractor: Send {
    fn extract(&self, samples: &[f32], window_samples: usize, hop_samples: usize) -> Array2<f32>;
}

/// Sliding feature state over a continuous sample stream.
///
/// `push` accepts frames of any length. Whenever the carried audio holds at
/// least one full window, every complete window is converted to feature rows
/// in a single extractor call, the consumed audio leaves the carry buffer,
/// and the matrix plus its paired audio buffer shift by exactly the produced
/// row count. Splitting the same audio into different frame sizes therefore
/// yields identical state.
pub struct FeatureWindow {
    extractor: Box<dyn SpectralExtractor>,
    /// Normalized samples not yet consumed into a feature row.
    carry: Vec<f32>,
    /// Newest `n_features` rows, oldest first. All zeros until audio arrives.
    features: Array2<f32>,
    /// The raw audio behind `features`, oldest first. Fixed length
    /// `n_features * hop_samples`.
    feature_audio: Vec<f32>,
    window_samples: usize,
    hop_samples: usize,
    n_features: usize,
    n_mfcc: usize,
}

impl FeatureWindow {
    pub fn new(
        params: &AudioParams,
        extractor: Box<dyn SpectralExtractor>,
    ) -> Result<Self, ConfigError> {
        params.validate()?;
        let n_features = params.n_features();
        let hop_samples = params.hop_samples();
        Ok(Self {
            extractor,
            carry: Vec::with_capacity(params.chunk_size + params.window_samples()),
            features: Array2::zeros((n_features, params.n_mfcc)),
            feature_audio: vec![0.0; n_features * hop_samples],
            window_samples: params.window_samples(),
            hop_samples,
            n_features,
            n_mfcc: params.n_mfcc,
        })
    }

    /// Feed one frame of raw PCM and return the current feature matrix.
    /// The returned view is always `n_features x n_mfcc`.
    pub fn push(&mut self, frame: &[i16]) -> ArrayView2<'_, f32> {
        self.carry
            .extend(frame.iter().map(|&s| f32::from(s) / 32768.0));

        if self.carry.len() >= self.window_samples {
            let new_rows =
                self.extractor
                    .extract(&self.carry, self.window_samples, self.hop_samples);
            debug_assert_eq!(new_rows.ncols(), self.n_mfcc);
            let rows = new_rows.nrows();
            if rows > 0 {
                let consumed = rows * self.hop_samples;
                self.shift_feature_audio(consumed);
                self.shift_features(&new_rows);
                self.carry.drain(..consumed);
            }
        }

        self.features.view()
    }

    /// Current feature matrix without pushing audio.
    pub fn features(&self) -> ArrayView2<'_, f32> {
        self.features.view()
    }

    /// The raw audio corresponding to the current feature matrix, oldest
    /// sample first. Length is always `n_features * hop_samples`.
    pub fn feature_audio(&self) -> &[f32] {
        &self.feature_audio
    }

    /// Drop all carried audio and return to the cold-start all-zero state.
    pub fn reset(&mut self) {
        self.carry.clear();
        self.features.fill(0.0);
        self.feature_audio.fill(0.0);
    }

    /// Shift the paired audio buffer left and append the first `consumed`
    /// carried samples, keeping the fixed length. When one push consumes more
    /// than the buffer holds, only the newest samples survive, mirroring the
    /// row truncation in `shift_features`.
    fn shift_feature_audio(&mut self, consumed: usize) {
        let cap = self.feature_audio.len();
        let fresh = &self.carry[..consumed];
        if consumed >= cap {
            self.feature_audio.copy_from_slice(&fresh[consumed - cap..]);
        } else {
            self.feature_audio.copy_within(consumed.., 0);
            self.feature_audio[cap - consumed..].copy_from_slice(fresh);
        }
    }

    /// Evict the oldest rows and append the new ones, keeping the fixed
    /// shape. Rows beyond `n_features` in one batch would be evicted
    /// immediately, so only the newest `n_features` are kept.
    fn shift_features(&mut self, new_rows: &Array2<f32>) {
        let m = self.n_mfcc;
        let n = self.n_features;
        let keep = new_rows.nrows().min(n);
        let skipped = new_rows.nrows() - keep;

        let src = new_rows
            .as_slice()
            .expect("extractor output is standard layout");
        let src = &src[skipped * m..];
        let dst = self
            .features
            .as_slice_mut()
            .expect("feature matrix is standard layout");

        if keep == n {
            dst.copy_from_slice(src);
        } else {
            dst.copy_within(keep * m.., 0);
            dst[(n - keep) * m..].copy_from_slice(src);
        }
    }
}

/// Placeholder spectral transform: log energy of equal sub-bands of each
/// window. Deterministic and shape-correct, so the pipeline and tests run
/// end to end; production deployments plug a real MFCC/mel implementation
/// in behind the same trait.
pub struct BandEnergyExtractor {
    bands: usize,
}

impl BandEnergyExtractor {
    pub fn new(bands: usize) -> Self {
        Self { bands }
    }
}

impl SpectralExtractor for BandEnergyExtractor {
    fn extract(&self, samples: &[f32], window_samples: usize, hop_samples: usize) -> Array2<f32> {
        if samples.len() < window_samples {
            return Array2::zeros((0, self.bands));
        }
        let rows = (samples.len() - window_samples) / hop_samples + 1;
        let mut out = Array2::zeros((rows, self.bands));
        for r in 0..rows {
            let window = &samples[r * hop_samples..r * hop_samples + window_samples];
            for b in 0..self.bands {
                let start = b * window_samples / self.bands;
                let end = ((b + 1) * window_samples / self.bands).max(start + 1);
                let energy =
                    window[start..end].iter().map(|s| s * s).sum::<f32>() / (end - start) as f32;
                out[[r, b]] = (energy + 1e-10).ln();
            }
        }
        out
    }
}
