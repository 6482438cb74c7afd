//! Audio pipeline coordinator.
//! Capture device → frame ring → processing thread → wake/command events.
//! The cpal callback only writes samples; everything else happens on one
//! dedicated processing thread that owns all listening state.

pub mod features;
pub mod ring_buffer;
pub mod trigger;
pub mod vad;
pub mod wake;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel as cb;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{Config, ConfigError};
use crate::metrics::{metric_names, MetricsRegistry};
use crate::state_machine::{ListenState, StateMachine};
use features::SpectralExtractor;
use ring_buffer::FrameRing;
use vad::{CommandListener, CommandOutcome, VolumeMetric};
use wake::{WakeClassifier, WakeListener};

/// Events leaving the real-time thread. Sent over an unbounded channel so
/// the sender never blocks.
#[derive(Debug)]
pub enum PipelineEvent {
    /// The wake trigger fired; the activation snapshot was published.
    WakeDetected { probability: f32 },
    /// A complete spoken command, concatenated.
    CommandCaptured { audio: Vec<i16> },
    /// Awake but nothing was spoken before the begin timeout.
    CommandTimedOut,
}

/// Shared snapshot of the most recent activation audio. The control thread
/// reads this copy; the live feature buffers never cross threads.
#[derive(Clone, Default)]
pub struct ActivationSlot(Arc<Mutex<Option<Vec<i16>>>>);

impl ActivationSlot {
    pub fn publish(&self, samples: Vec<i16>) {
        *self.0.lock() = Some(samples);
    }

    pub fn snapshot(&self) -> Option<Vec<i16>> {
        self.0.lock().clone()
    }
}

#[derive(Debug)]
pub enum PipelineError {
    Config(ConfigError),
    NoInputDevice,
    Stream(String),
    Spawn(String),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Config(e) => write!(f, "{e}"),
            PipelineError::NoInputDevice => write!(f, "no audio input device available"),
            PipelineError::Stream(msg) => write!(f, "audio stream failed: {msg}"),
            PipelineError::Spawn(msg) => write!(f, "thread spawn failed: {msg}"),
        }
    }
}

impl From<ConfigError> for PipelineError {
    fn from(e: ConfigError) -> Self {
        PipelineError::Config(e)
    }
}

/// Per-frame driver composing wake listening and command capture under the
/// asleep/awake state machine. Owns no I/O; the pipeline thread (or a test)
/// feeds it frames.
pub struct FrontEnd {
    wake: WakeListener,
    command: CommandListener,
    state: Arc<StateMachine>,
    metrics: Arc<MetricsRegistry>,
}

impl FrontEnd {
    pub fn new(
        config: &Config,
        state: Arc<StateMachine>,
        metrics: Arc<MetricsRegistry>,
        extractor: Box<dyn SpectralExtractor>,
        classifier: Box<dyn WakeClassifier>,
        metric: VolumeMetric,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            wake: WakeListener::new(&config.audio, &config.wake, extractor, classifier)?,
            command: CommandListener::new(config.command.clone(), metric)?,
            state,
            metrics,
        })
    }

    /// Process one frame, returning at most one event. Asleep frames feed
    /// the wake listener; awake frames feed the command listener. A failed
    /// prediction drops only this frame's trigger decision.
    pub fn process_frame(&mut self, frame: &[i16]) -> Option<PipelineEvent> {
        match self.state.current() {
            ListenState::Asleep => {
                let span = self.metrics.span(metric_names::WAKE_FRAME);
                let result = self.wake.observe(frame);
                span.finish();
                match result {
                    Ok(true) => {
                        let _ = self.state.transition(ListenState::Awake);
                        self.command.reset();
                        Some(PipelineEvent::WakeDetected {
                            probability: self.wake.last_probability(),
                        })
                    }
                    Ok(false) => None,
                    Err(e) => {
                        warn!(error = %e, "prediction failed; frame skipped for trigger decision");
                        None
                    }
                }
            }
            ListenState::Awake => {
                let span = self.metrics.span(metric_names::COMMAND_FRAME);
                let outcome = self.command.observe(frame);
                span.finish();
                match outcome {
                    CommandOutcome::Pending => None,
                    CommandOutcome::TimedOut => {
                        let _ = self.state.transition(ListenState::Asleep);
                        Some(PipelineEvent::CommandTimedOut)
                    }
                    CommandOutcome::Complete(audio) => {
                        let _ = self.state.transition(ListenState::Asleep);
                        Some(PipelineEvent::CommandCaptured { audio })
                    }
                }
            }
        }
    }

    /// The wake listener's last activation snapshot as raw samples.
    pub fn last_activation_samples(&self) -> Result<Vec<i16>, wake::WakeError> {
        self.wake.last_activation_samples()
    }
}

/// Shared audio state between capture callback and processing thread.
struct SharedAudioState {
    ring_buffer: Mutex<FrameRing>,
}

/// Running pipeline. Dropping the handle stops the processing thread and
/// tears down the capture stream.
pub struct PipelineHandle {
    stop: CancellationToken,
    events: cb::Receiver<PipelineEvent>,
    activation: ActivationSlot,
    processing_thread: Option<thread::JoinHandle<()>>,
    _stream: cpal::Stream,
}

impl PipelineHandle {
    /// Clone of the event receiver; safe to hand to another thread.
    pub fn events(&self) -> cb::Receiver<PipelineEvent> {
        self.events.clone()
    }

    /// Clone of the cooperative stop signal.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Copy of the most recent activation audio, if any trigger has fired.
    pub fn last_activation(&self) -> Option<Vec<i16>> {
        self.activation.snapshot()
    }

    /// Shared slot holding the last activation snapshot.
    pub fn activation_slot(&self) -> ActivationSlot {
        self.activation.clone()
    }

    pub fn stop(&self) {
        self.stop.cancel();
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.processing_thread.take() {
            let _ = handle.join();
        }
    }
}

/// Start the full pipeline: capture stream plus processing thread.
pub fn start_pipeline(
    config: &Config,
    state: Arc<StateMachine>,
    metrics: Arc<MetricsRegistry>,
    extractor: Box<dyn SpectralExtractor>,
    classifier: Box<dyn WakeClassifier>,
    metric: VolumeMetric,
) -> Result<PipelineHandle, PipelineError> {
    config.validate()?;
    let front_end = FrontEnd::new(
        config,
        state,
        Arc::clone(&metrics),
        extractor,
        classifier,
        metric,
    )?;

    let ring = FrameRing::for_duration(config.audio.sample_rate, config.audio.ring_buffer_secs);
    let shared = Arc::new(SharedAudioState {
        ring_buffer: Mutex::new(ring),
    });

    let stream = start_capture_stream(config, Arc::clone(&shared))?;

    let stop = CancellationToken::new();
    let (event_tx, event_rx) = cb::unbounded();
    let activation = ActivationSlot::default();

    let chunk_size = config.audio.chunk_size;
    let shared_proc = Arc::clone(&shared);
    let stop_proc = stop.clone();
    let slot_proc = activation.clone();
    let processing_thread = thread::Builder::new()
        .name("audio-processing".into())
        .spawn(move || {
            run_processing_loop(shared_proc, chunk_size, stop_proc, front_end, event_tx, slot_proc, metrics);
        })
        .map_err(|e| PipelineError::Spawn(e.to_string()))?;

    Ok(PipelineHandle {
        stop,
        events: event_rx,
        activation,
        processing_thread: Some(processing_thread),
        _stream: stream,
    })
}

/// Build and start the cpal input stream. The callback writes straight into
/// the ring buffer: no allocation, no blocking beyond the ring mutex.
fn start_capture_stream(
    config: &Config,
    shared: Arc<SharedAudioState>,
) -> Result<cpal::Stream, PipelineError> {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(PipelineError::NoInputDevice)?;

    let stream_config = cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(config.audio.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let mut rb = shared.ring_buffer.lock();
                rb.write(data);
            },
            |err| {
                error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| PipelineError::Stream(e.to_string()))?;

    stream
        .play()
        .map_err(|e| PipelineError::Stream(e.to_string()))?;
    info!("audio capture stream started");

    Ok(stream)
}

/// Processing loop: reads whole frames from the ring buffer and drives the
/// front end until the stop token fires.
fn run_processing_loop(
    shared: Arc<SharedAudioState>,
    chunk_size: usize,
    stop: CancellationToken,
    mut front_end: FrontEnd,
    event_tx: cb::Sender<PipelineEvent>,
    slot: ActivationSlot,
    metrics: Arc<MetricsRegistry>,
) {
    let mut frame_buf = vec![0i16; chunk_size];
    let mut reported_overruns = 0u64;
    let sleep_between = Duration::from_millis(20);

    info!("audio processing loop started");

    loop {
        if stop.is_cancelled() {
            info!("audio processing loop stopping");
            break;
        }

        let (got_frame, overruns) = {
            let mut rb = shared.ring_buffer.lock();
            (rb.read_frame(&mut frame_buf), rb.overruns())
        };

        if overruns > reported_overruns {
            warn!(lost = overruns - reported_overruns, "capture overrun, samples dropped");
            reported_overruns = overruns;
        }

        if !got_frame {
            thread::sleep(sleep_between);
            continue;
        }

        let span = metrics.span(metric_names::FRAME_TOTAL);
        if let Some(event) = front_end.process_frame(&frame_buf) {
            if matches!(event, PipelineEvent::WakeDetected { .. }) {
                if let Ok(samples) = front_end.last_activation_samples() {
                    slot.publish(samples);
                }
            }
            let _ = event_tx.send(event);
        }
        span.finish();
    }
}
