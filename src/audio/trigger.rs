//! Hysteresis trigger over the wake probability stream.
//! Requires sustained above-threshold probability before firing and holds a
//! refractory period afterwards so one utterance cannot fire twice.

use crate::config::{ConfigError, WakeParams};

/// Debounced trigger with refractory suppression.
///
/// The counter climbs while the probability stays above
/// `1.0 - sensitivity` and fires once it exceeds `trigger_level`. After a
/// fire the counter is pinned to `-activation_delay`; while input stays
/// loud the pin is re-applied every chunk, so sustained sound extends the
/// cool-down instead of re-triggering. A positive counter that never
/// reached the trigger level decays by one per quiet chunk.
pub struct ActivationTrigger {
    sensitivity: f32,
    trigger_level: i32,
    activation_delay: i32,
    counter: i32,
}

impl ActivationTrigger {
    pub fn new(params: &WakeParams) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self {
            sensitivity: params.sensitivity,
            trigger_level: params.trigger_level,
            activation_delay: params.activation_delay,
            counter: 0,
        })
    }

    /// Feed one probability. Returns true exactly on the chunk where the
    /// trigger fires. O(1), no side effects beyond the counter.
    #[inline]
    pub fn check(&mut self, probability: f32) -> bool {
        let chunk_activated = probability > 1.0 - self.sensitivity;

        if chunk_activated || self.counter < 0 {
            self.counter += 1;
            let has_activated = self.counter > self.trigger_level;
            if has_activated || (chunk_activated && self.counter < 0) {
                self.counter = -self.activation_delay;
            }
            has_activated
        } else {
            if self.counter > 0 {
                self.counter -= 1;
            }
            false
        }
    }

    /// Return the counter to baseline, forgetting any partial activation or
    /// refractory state.
    pub fn reset(&mut self) {
        self.counter = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger() -> ActivationTrigger {
        ActivationTrigger::new(&WakeParams::default()).unwrap()
    }

    #[test]
    fn test_fires_on_fourth_loud_chunk() {
        let mut t = trigger();
        let results: Vec<bool> = (0..4).map(|_| t.check(0.9)).collect();
        assert_eq!(results, vec![false, false, false, true]);
    }

    #[test]
    fn test_sustained_loudness_extends_refractory() {
        let mut t = trigger();
        for _ in 0..4 {
            t.check(0.9);
        }
        // still loud: the refractory pin is re-applied every chunk
        for _ in 0..8 {
            assert!(!t.check(0.9));
        }
        // even many more loud chunks never re-fire while pinned
        for _ in 0..20 {
            assert!(!t.check(0.9));
        }
    }

    #[test]
    fn test_retrigger_after_recovery() {
        let mut t = trigger();
        for _ in 0..4 {
            t.check(0.9);
        }
        // quiet chunks walk the counter back from -8 to 0
        for _ in 0..8 {
            assert!(!t.check(0.1));
        }
        // fresh activation accumulates from baseline again
        let results: Vec<bool> = (0..4).map(|_| t.check(0.9)).collect();
        assert_eq!(results, vec![false, false, false, true]);
    }

    #[test]
    fn test_near_miss_decays() {
        let mut t = trigger();
        // two loud chunks, below the trigger level
        t.check(0.9);
        t.check(0.9);
        // two quiet chunks decay the partial count back to zero
        t.check(0.1);
        t.check(0.1);
        // so four more loud chunks are needed again
        let results: Vec<bool> = (0..4).map(|_| t.check(0.9)).collect();
        assert_eq!(results, vec![false, false, false, true]);
    }

    #[test]
    fn test_threshold_is_one_minus_sensitivity() {
        let mut t = trigger();
        // 0.7 is not strictly above the 0.7 threshold
        for _ in 0..10 {
            assert!(!t.check(0.7));
        }
        for _ in 0..3 {
            assert!(!t.check(0.71));
        }
        assert!(t.check(0.71));
    }

    #[test]
    fn test_reset_clears_partial_and_refractory_state() {
        let mut t = trigger();
        for _ in 0..4 {
            t.check(0.9);
        }
        t.reset();
        let results: Vec<bool> = (0..4).map(|_| t.check(0.9)).collect();
        assert_eq!(results, vec![false, false, false, true]);
    }
}
