//! Hearken: the real-time front end of a voice assistant.
//! Turns a continuous stream of raw PCM frames into a rolling feature
//! representation, debounced wake triggers with the audio that caused them,
//! and start/end boundaries of the spoken command that follows.

pub mod audio;
pub mod config;
pub mod metrics;
pub mod saver;
pub mod state_machine;

pub use audio::features::{BandEnergyExtractor, FeatureWindow, SpectralExtractor};
pub use audio::trigger::ActivationTrigger;
pub use audio::vad::{CommandListener, CommandOutcome, VolumeMetric};
pub use audio::wake::{EnergySpikeClassifier, PredictError, WakeClassifier, WakeError, WakeListener};
pub use audio::{
    start_pipeline, ActivationSlot, FrontEnd, PipelineError, PipelineEvent, PipelineHandle,
};
pub use config::{AudioParams, CommandParams, Config, ConfigError, WakeParams};
pub use state_machine::{ListenState, StateMachine};
