//! Interactive listener binary.
//! Runs the capture pipeline, saves completed command audio, and drives a
//! small stdin control plane: `f` saves the last activation, `q` quits.

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use hearken::audio::vad::VolumeMetric;
use hearken::audio::{start_pipeline, PipelineEvent};
use hearken::metrics::MetricsRegistry;
use hearken::saver::ActivationSaver;
use hearken::state_machine::StateMachine;
use hearken::{BandEnergyExtractor, Config, EnergySpikeClassifier};

const ACTIVATION_DIR: &str = "./activations";
const COMMAND_DIR: &str = "./commands";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hearken=debug".parse().unwrap()),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => match Config::load_from_file(Path::new(&path)) {
            Ok(config) => {
                info!(path, "configuration loaded");
                config
            }
            Err(e) => {
                error!(error = %e, path, "failed to load configuration");
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    let state = Arc::new(StateMachine::new());
    let metrics = Arc::new(MetricsRegistry::new());

    let handle = match start_pipeline(
        &config,
        Arc::clone(&state),
        Arc::clone(&metrics),
        Box::new(BandEnergyExtractor::new(config.audio.n_mfcc)),
        Box::new(EnergySpikeClassifier::new()),
        VolumeMetric::Peak,
    ) {
        Ok(handle) => handle,
        Err(e) => {
            error!(error = %e, "failed to start audio pipeline");
            std::process::exit(1);
        }
    };

    info!(
        sample_rate = config.audio.sample_rate,
        chunk_size = config.audio.chunk_size,
        n_features = config.audio.n_features(),
        "listening for the wake word (f = save last activation, q = quit)"
    );

    // Log listening-state changes as they happen.
    let mut state_rx = state.subscribe();
    tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let current = *state_rx.borrow();
            info!(state = %current, "listen state changed");
        }
    });

    // Consume pipeline events; completed commands land on disk for
    // downstream transcription.
    let events = handle.events();
    let sample_rate = config.audio.sample_rate;
    tokio::task::spawn_blocking(move || {
        let mut commands = match ActivationSaver::new(COMMAND_DIR, sample_rate) {
            Ok(saver) => Some(saver),
            Err(e) => {
                warn!(error = %e, "command saving disabled");
                None
            }
        };
        for event in events.iter() {
            match event {
                PipelineEvent::WakeDetected { probability } => {
                    info!(probability, "wake word detected");
                }
                PipelineEvent::CommandCaptured { audio } => {
                    info!(samples = audio.len(), "command captured");
                    if let Some(saver) = commands.as_mut() {
                        if let Err(e) = saver.save(&audio) {
                            warn!(error = %e, "failed to save command audio");
                        }
                    }
                }
                PipelineEvent::CommandTimedOut => {
                    info!("no command heard, going back to sleep");
                }
            }
        }
    });

    // Control plane: stdin commands, decoupled from the audio loop through
    // the cancellation token and the activation snapshot slot.
    let stop = handle.stop_token();
    let slot = handle.activation_slot();
    let stdin_stop = stop.clone();
    tokio::task::spawn_blocking(move || {
        let stdin = std::io::stdin();
        let mut saver: Option<ActivationSaver> = None;
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match line.trim() {
                "q" => {
                    stdin_stop.cancel();
                    break;
                }
                "f" => match slot.snapshot() {
                    Some(samples) => {
                        if saver.is_none() {
                            saver = ActivationSaver::new(ACTIVATION_DIR, sample_rate)
                                .map_err(|e| warn!(error = %e, "activation saving disabled"))
                                .ok();
                        }
                        if let Some(saver) = saver.as_mut() {
                            match saver.save(&samples) {
                                Ok(path) => info!(path = %path.display(), "activation saved"),
                                Err(e) => warn!(error = %e, "failed to save activation"),
                            }
                        }
                    }
                    None => info!("no activation recorded yet"),
                },
                "" => {}
                other => info!(input = other, "unknown command (f = save, q = quit)"),
            }
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
        }
        _ = stop.cancelled() => {
            info!("quit requested, shutting down");
        }
    }

    handle.stop();
    drop(handle);

    for (name, summary) in metrics.summary() {
        info!(
            metric = %name,
            p50_us = summary.p50_us,
            p95_us = summary.p95_us,
            p99_us = summary.p99_us,
            count = summary.count,
            "timing summary"
        );
    }
    info!("done");
}
