//! Threshold/floor hysteresis beat trigger over a band-range meter, with
//! an optional tap-tempo fan-out.
use std::time::Duration;

use luminar_lib::tap_sync::TapSync;

/// Receives a rate estimate whenever `BandGate`'s tap-tempo side channel
/// produces one. The concrete tempo clock this feeds is out of scope
/// here; callers inject their own sink.
pub trait TempoSink {
    fn on_tap_rate(&mut self, beats_per_second: f64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Ready to trigger on the next threshold crossing.
    Armed,
    /// Triggered; waiting for the signal to fall below `threshold * floor`
    /// before re-arming.
    WaitingForFloor,
}

pub struct BandGateConfig {
    pub threshold: f64,
    pub floor: f64,
    pub decay_ms: f64,
    pub tap_tempo: bool,
}

impl Default for BandGateConfig {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            floor: 0.75,
            decay_ms: 400.0,
            tap_tempo: false,
        }
    }
}

/// After this many taps with tap-tempo enabled, tap tempo turns itself
/// off -- matching the spec's "stop listening once the tempo is locked
/// in" semantics.
const TAP_TEMPO_AUTO_DISABLE_COUNT: usize = 4;

pub struct BandGate {
    config: BandGateConfig,
    state: State,
    envelope: f64,
    tap_sync: TapSync,
}

impl BandGate {
    pub fn new(config: BandGateConfig) -> Self {
        Self {
            config,
            state: State::Armed,
            envelope: 0.0,
            tap_sync: TapSync::new(),
        }
    }

    pub fn envelope(&self) -> f64 {
        self.envelope
    }

    pub fn set_tap_tempo(&mut self, enabled: bool) {
        self.config.tap_tempo = enabled;
        if enabled {
            self.tap_sync.reset();
        }
    }

    pub fn tap_tempo(&self) -> bool {
        self.config.tap_tempo
    }

    pub fn threshold(&self) -> f64 {
        self.config.threshold
    }

    pub fn floor(&self) -> f64 {
        self.config.floor
    }

    pub fn set_threshold(&mut self, threshold: f64) {
        self.config.threshold = threshold;
    }

    pub fn set_floor(&mut self, floor: f64) {
        self.config.floor = floor;
    }

    pub fn set_decay_ms(&mut self, decay_ms: f64) {
        self.config.decay_ms = decay_ms;
    }

    /// Advance the gate by `delta_t` against the band-range value `v`,
    /// which must be the *pre-clamp* smoothed average (see
    /// `BandMeter::range_pre_clamp`). Returns `true` exactly on ticks
    /// where the trigger pulse fires.
    pub fn tick(&mut self, v: f64, delta_t: Duration, tempo_sink: Option<&mut dyn TempoSink>) -> bool {
        // Decay runs against the envelope as it stood before this tick's
        // transition, so a trigger's `envelope <- 1` always lands exactly
        // on 1.0 rather than 1.0 minus one tick's worth of decay.
        if self.config.decay_ms > 0.0 {
            self.envelope = (self.envelope - delta_t.as_secs_f64() * 1000.0 / self.config.decay_ms).max(0.0);
        }

        let mut triggered = false;
        match self.state {
            State::Armed => {
                if v >= self.config.threshold && self.config.threshold > 0.0 {
                    triggered = true;
                    self.envelope = 1.0;
                    self.state = State::WaitingForFloor;
                }
            }
            State::WaitingForFloor => {
                if v < self.config.threshold * self.config.floor {
                    self.state = State::Armed;
                }
            }
        }

        if triggered && self.config.tap_tempo {
            if let Some(rate) = self.tap_sync.tap() {
                if let Some(sink) = tempo_sink {
                    sink.on_tap_rate(rate);
                }
            }
            if self.tap_sync.tap_count() >= TAP_TEMPO_AUTO_DISABLE_COUNT {
                self.config.tap_tempo = false;
            }
        }

        triggered
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct RecordingSink {
        rates: Vec<f64>,
    }
    impl TempoSink for RecordingSink {
        fn on_tap_rate(&mut self, beats_per_second: f64) {
            self.rates.push(beats_per_second);
        }
    }

    #[test]
    fn hysteresis_over_a_mixed_sequence() {
        let mut gate = BandGate::new(BandGateConfig {
            threshold: 0.8,
            floor: 0.75,
            decay_ms: 400.0,
            tap_tempo: false,
        });
        // threshold*floor = 0.6: index 3 (0.5) dips below that and re-arms
        // the gate, so the rise back to 0.9 at index 4 is a legitimate
        // second crossing, not a re-trigger of the same pulse.
        let samples = [0.7, 0.9, 0.9, 0.5, 0.9, 0.2, 0.9];
        let dt = Duration::from_millis(1);
        let mut triggers = Vec::new();
        for (i, &v) in samples.iter().enumerate() {
            if gate.tick(v, dt, None) {
                triggers.push(i);
            }
        }
        assert_eq!(triggers, vec![1, 4, 6]);
        assert_eq!(gate.envelope(), 1.0);
    }

    #[test]
    fn envelope_hits_one_on_trigger_then_decays() {
        let mut gate = BandGate::new(BandGateConfig {
            threshold: 0.8,
            floor: 0.75,
            decay_ms: 400.0,
            tap_tempo: false,
        });
        assert!(gate.tick(0.9, Duration::from_millis(1), None));
        assert_eq!(gate.envelope(), 1.0);

        // One more millisecond decays by 1/400 before the next sample is
        // below the trigger threshold again (still above floor so state
        // stays waiting).
        gate.tick(0.85, Duration::from_millis(1), None);
        let expected = 1.0 - 1.0 / 400.0;
        assert!((gate.envelope() - expected).abs() < 1e-9);
    }

    #[test]
    fn no_retrigger_until_floor_reached() {
        let mut gate = BandGate::new(BandGateConfig {
            threshold: 0.8,
            floor: 0.5,
            decay_ms: 400.0,
            tap_tempo: false,
        });
        let dt = Duration::from_millis(1);
        assert!(gate.tick(0.9, dt, None));
        // Still above threshold*floor=0.4, should not re-trigger even
        // though it's above threshold again.
        assert!(!gate.tick(0.95, dt, None));
        assert!(!gate.tick(0.9, dt, None));
        // Drop below floor, re-arm, then cross again.
        assert!(!gate.tick(0.3, dt, None));
        assert!(gate.tick(0.9, dt, None));
    }

    #[test]
    fn tap_tempo_disables_after_four_taps() {
        let mut gate = BandGate::new(BandGateConfig {
            threshold: 0.5,
            floor: 0.4,
            decay_ms: 100.0,
            tap_tempo: true,
        });
        let mut sink = RecordingSink { rates: Vec::new() };
        let dt = Duration::from_millis(500);
        for _ in 0..4 {
            gate.tick(0.9, dt, Some(&mut sink));
            gate.tick(0.1, dt, Some(&mut sink));
        }
        assert!(!gate.tap_tempo());
        // First tap never yields a rate (needs at least two taps); the
        // rest should, though outlier rejection may reset some.
        assert!(sink.rates.len() <= 3);
    }
}
