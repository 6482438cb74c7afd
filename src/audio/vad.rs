//! Voice activity boundary detection for command capture.
//! Active only while the pipeline is awake: accumulates frames and decides
//! when a spoken command has ended via begin-wait, end-silence, and
//! max-length frame counters. All timing is frame counts, never wall clock.

use std::mem;

use tracing::debug;

use crate::config::{CommandParams, ConfigError};

/// Peak absolute amplitude of a frame, in raw i16 units.
#[inline]
pub fn peak_volume(samples: &[i16]) -> f32 {
    samples
        .iter()
        .map(|&s| (s as i32).unsigned_abs())
        .max()
        .unwrap_or(0) as f32
}

/// RMS amplitude of a frame, in raw i16 units.
#[inline]
pub fn compute_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples
        .iter()
        .map(|&s| {
            let f = f64::from(s);
            f * f
        })
        .sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// How frame volume is measured. Fixed per listener instance so thresholds
/// stay comparable across a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeMetric {
    /// Peak absolute amplitude.
    Peak,
    /// Root mean square amplitude.
    Rms,
}

impl VolumeMetric {
    #[inline]
    pub fn volume(self, samples: &[i16]) -> f32 {
        match self {
            VolumeMetric::Peak => peak_volume(samples),
            VolumeMetric::Rms => compute_rms(samples),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenPhase {
    /// Awake but nothing loud heard yet.
    Waiting,
    /// Command speech started; buffering frames.
    Recording,
}

/// Per-frame result of command boundary detection. Exactly one outcome is
/// reported per frame, and completed audio is handed out exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Still waiting for speech, or still recording it.
    Pending,
    /// Nothing loud enough arrived before the begin timeout; no audio.
    TimedOut,
    /// The command ended (trailing silence or max length); the concatenated
    /// audio of every buffered frame, starting with the first loud one.
    Complete(Vec<i16>),
}

/// Command boundary state machine.
pub struct CommandListener {
    params: CommandParams,
    metric: VolumeMetric,
    phase: ListenPhase,
    quiet_frames: u32,
    begin_wait_frames: u32,
    frames_buffered: usize,
    buffer: Vec<i16>,
}

impl CommandListener {
    pub fn new(params: CommandParams, metric: VolumeMetric) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self {
            params,
            metric,
            phase: ListenPhase::Waiting,
            quiet_frames: 0,
            begin_wait_frames: 0,
            frames_buffered: 0,
            buffer: Vec::new(),
        })
    }

    /// Feed one frame while awake.
    pub fn observe(&mut self, frame: &[i16]) -> CommandOutcome {
        let volume = self.metric.volume(frame);

        match self.phase {
            ListenPhase::Waiting => {
                if volume > self.params.volume_threshold {
                    debug!(volume, "command speech started");
                    self.phase = ListenPhase::Recording;
                    self.buffer.extend_from_slice(frame);
                    self.frames_buffered = 1;
                    self.quiet_frames = 0;
                    CommandOutcome::Pending
                } else {
                    self.begin_wait_frames += 1;
                    if self.begin_wait_frames > self.params.begin_timeout_frames {
                        debug!(
                            waited = self.begin_wait_frames,
                            "no command heard before begin timeout"
                        );
                        self.begin_wait_frames = 0;
                        CommandOutcome::TimedOut
                    } else {
                        CommandOutcome::Pending
                    }
                }
            }
            ListenPhase::Recording => {
                self.buffer.extend_from_slice(frame);
                self.frames_buffered += 1;

                if volume < self.params.volume_threshold {
                    self.quiet_frames += 1;
                } else {
                    self.quiet_frames = 0;
                }

                let silence_ended = self.quiet_frames > self.params.end_silence_frames;
                let length_capped = self.frames_buffered > self.params.max_command_frames;
                if silence_ended || length_capped {
                    debug!(
                        frames = self.frames_buffered,
                        samples = self.buffer.len(),
                        length_capped,
                        "command complete"
                    );
                    self.phase = ListenPhase::Waiting;
                    self.quiet_frames = 0;
                    self.begin_wait_frames = 0;
                    self.frames_buffered = 0;
                    CommandOutcome::Complete(mem::take(&mut self.buffer))
                } else {
                    CommandOutcome::Pending
                }
            }
        }
    }

    /// Whether command speech has started.
    pub fn is_recording(&self) -> bool {
        self.phase == ListenPhase::Recording
    }

    /// Discard any buffered audio and counters without reporting anything.
    /// Used when the pipeline re-enters the awake state.
    pub fn reset(&mut self) {
        self.phase = ListenPhase::Waiting;
        self.quiet_frames = 0;
        self.begin_wait_frames = 0;
        self.frames_buffered = 0;
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listener(params: CommandParams) -> CommandListener {
        CommandListener::new(params, VolumeMetric::Peak).unwrap()
    }

    fn loud(len: usize) -> Vec<i16> {
        vec![500; len]
    }

    fn quiet(len: usize) -> Vec<i16> {
        vec![10; len]
    }

    #[test]
    fn test_volume_metrics() {
        let frame = [100i16, -400, 300];
        assert_eq!(peak_volume(&frame), 400.0);
        let rms = compute_rms(&frame);
        let expected = ((100.0f64 * 100.0 + 400.0 * 400.0 + 300.0 * 300.0) / 3.0).sqrt() as f32;
        assert!((rms - expected).abs() < 1e-3);
        assert_eq!(peak_volume(&[]), 0.0);
        assert_eq!(compute_rms(&[]), 0.0);
        assert_eq!(peak_volume(&[i16::MIN]), 32768.0);
    }

    #[test]
    fn test_one_loud_then_silence_completes() {
        let mut l = listener(CommandParams {
            volume_threshold: 200.0,
            end_silence_frames: 3,
            max_command_frames: 100,
            ..CommandParams::default()
        });

        assert_eq!(l.observe(&loud(64)), CommandOutcome::Pending);
        assert!(l.is_recording());
        for _ in 0..3 {
            assert_eq!(l.observe(&quiet(64)), CommandOutcome::Pending);
        }
        // 4th quiet frame pushes quiet_frames past 3: complete with all
        // five buffered frames
        match l.observe(&quiet(64)) {
            CommandOutcome::Complete(audio) => assert_eq!(audio.len(), 5 * 64),
            other => panic!("expected completion, got {other:?}"),
        }
        assert!(!l.is_recording());
    }

    #[test]
    fn test_max_length_cutoff() {
        let mut l = listener(CommandParams {
            max_command_frames: 100,
            ..CommandParams::default()
        });

        for i in 0..100 {
            assert_eq!(l.observe(&loud(32)), CommandOutcome::Pending, "frame {i}");
        }
        match l.observe(&loud(32)) {
            CommandOutcome::Complete(audio) => assert_eq!(audio.len(), 101 * 32),
            other => panic!("expected completion at frame 101, got {other:?}"),
        }
    }

    #[test]
    fn test_begin_timeout_reports_empty() {
        let mut l = listener(CommandParams {
            begin_timeout_frames: 2,
            ..CommandParams::default()
        });

        assert_eq!(l.observe(&quiet(32)), CommandOutcome::Pending);
        assert_eq!(l.observe(&quiet(32)), CommandOutcome::Pending);
        assert_eq!(l.observe(&quiet(32)), CommandOutcome::TimedOut);
        // counter was reset; the wait starts over
        assert_eq!(l.observe(&quiet(32)), CommandOutcome::Pending);
    }

    #[test]
    fn test_speech_resets_quiet_count() {
        let mut l = listener(CommandParams {
            end_silence_frames: 2,
            ..CommandParams::default()
        });

        l.observe(&loud(16));
        l.observe(&quiet(16));
        l.observe(&quiet(16));
        // speech again: quiet run is forgotten
        assert_eq!(l.observe(&loud(16)), CommandOutcome::Pending);
        l.observe(&quiet(16));
        l.observe(&quiet(16));
        match l.observe(&quiet(16)) {
            CommandOutcome::Complete(audio) => assert_eq!(audio.len(), 7 * 16),
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn test_buffer_returned_once_then_cleared() {
        let mut l = listener(CommandParams {
            end_silence_frames: 1,
            ..CommandParams::default()
        });

        l.observe(&loud(8));
        l.observe(&quiet(8));
        let first = l.observe(&quiet(8));
        assert!(matches!(first, CommandOutcome::Complete(_)));
        // back in waiting with an empty buffer; a new command starts fresh
        l.observe(&loud(8));
        l.observe(&quiet(8));
        match l.observe(&quiet(8)) {
            CommandOutcome::Complete(audio) => assert_eq!(audio.len(), 3 * 8),
            other => panic!("expected fresh completion, got {other:?}"),
        }
    }

    #[test]
    fn test_reset_discards_partial_command() {
        let mut l = listener(CommandParams {
            end_silence_frames: 2,
            ..CommandParams::default()
        });
        l.observe(&loud(16));
        assert!(l.is_recording());
        l.reset();
        assert!(!l.is_recording());
        // nothing left over from before the reset
        l.observe(&loud(16));
        l.observe(&quiet(16));
        l.observe(&quiet(16));
        match l.observe(&quiet(16)) {
            CommandOutcome::Complete(audio) => assert_eq!(audio.len(), 4 * 16),
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn test_rms_metric_instance() {
        let mut l = CommandListener::new(
            CommandParams {
                volume_threshold: 200.0,
                ..CommandParams::default()
            },
            VolumeMetric::Rms,
        )
        .unwrap();
        // peak 500 but RMS ~ 158: not loud enough under the RMS metric
        let mut frame = vec![0i16; 100];
        frame[..10].fill(500);
        l.observe(&frame);
        assert!(!l.is_recording());
        // uniform 500 has RMS 500: loud
        l.observe(&vec![500i16; 100]);
        assert!(l.is_recording());
    }
}
