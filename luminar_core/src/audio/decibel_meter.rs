//! RMS envelope follower with attack/release, peak hold, and dB
//! normalization.
use augmented_atomics::AtomicF32;
use std::sync::Arc;
use std::time::Duration;

use super::buffer::MeterSink;

/// How long a peak is held before it starts decaying at the release rate.
pub const PEAK_HOLD_MS: f64 = 250.0;

/// Tunable parameters for a [`DecibelMeter`], stored behind atomics so the
/// engine thread can mutate them without locking the audio thread that
/// reads them every fill.
pub struct DecibelMeterHandle {
    pub gain_db: AtomicF32,
    pub range_db: AtomicF32,
    pub attack_ms: AtomicF32,
    pub release_ms: AtomicF32,
}

impl Default for DecibelMeterHandle {
    fn default() -> Self {
        Self {
            gain_db: AtomicF32::new(0.0),
            range_db: AtomicF32::new(48.0),
            attack_ms: AtomicF32::new(10.0),
            release_ms: AtomicF32::new(250.0),
        }
    }
}

struct CachedCoefficients {
    attack_ms: f32,
    release_ms: f32,
    sample_rate: u32,
    buffer_len: usize,
    attack_coef: f64,
    release_coef: f64,
}

/// A `DecibelMeter` subscribes to one [`AudioBuffer`](super::buffer::AudioBuffer)
/// and derives a smoothed, gain/range-normalized dB level from its raw RMS.
///
/// The attack/release envelope runs on the audio thread inside
/// `on_audio_frame` (called once per buffer fill); `update_state` runs on
/// the engine tick and only converts the envelope to a normalized output,
/// per the spec's split between audio-period-derived coefficients and
/// control-tick-derived normalization.
pub struct DecibelMeter {
    handle: Arc<DecibelMeterHandle>,
    inner: std::sync::Mutex<Inner>,
}

struct Inner {
    rms_env: f64,
    rms_peak: f64,
    peak_held_ms: f64,
    coefficients: Option<CachedCoefficients>,
    db_env: f64,
    normalized: f64,
}

impl DecibelMeter {
    pub fn new(handle: Arc<DecibelMeterHandle>) -> Self {
        Self {
            handle,
            inner: std::sync::Mutex::new(Inner {
                rms_env: 0.0,
                rms_peak: 0.0,
                peak_held_ms: 0.0,
                coefficients: None,
                db_env: f64::NEG_INFINITY,
                normalized: 0.0,
            }),
        }
    }

    pub fn handle(&self) -> Arc<DecibelMeterHandle> {
        self.handle.clone()
    }

    /// Stop the meter, resetting all envelopes to zero.
    pub fn stop(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.rms_env = 0.0;
        inner.rms_peak = 0.0;
        inner.peak_held_ms = 0.0;
        inner.db_env = f64::NEG_INFINITY;
        inner.normalized = 0.0;
    }

    /// Re-derive the normalized dB output for the current engine tick from
    /// the envelope state accumulated on the audio thread.
    pub fn update_state(&self) {
        let mut inner = self.inner.lock().unwrap();
        let gain = self.handle.gain_db.get() as f64;
        let range = self.handle.range_db.get() as f64;
        let db_env = if inner.rms_env > 0.0 {
            20.0 * inner.rms_env.log10() + gain
        } else {
            f64::NEG_INFINITY
        };
        inner.db_env = db_env;
        inner.normalized = (1.0 + db_env / range).clamp(0.0, 1.0);
    }

    pub fn normalized(&self) -> f64 {
        self.inner.lock().unwrap().normalized
    }

    pub fn db(&self) -> f64 {
        self.inner.lock().unwrap().db_env
    }

    fn coefficients(&self, inner: &mut Inner, buffer_len: usize, sample_rate: u32) -> (f64, f64) {
        let attack_ms = self.handle.attack_ms.get();
        let release_ms = self.handle.release_ms.get();
        let stale = match &inner.coefficients {
            Some(c) => {
                c.attack_ms != attack_ms
                    || c.release_ms != release_ms
                    || c.sample_rate != sample_rate
                    || c.buffer_len != buffer_len
            }
            None => true,
        };
        if stale {
            let attack_coef = attack_release_coef(attack_ms as f64, buffer_len, sample_rate);
            let release_coef = attack_release_coef(release_ms as f64, buffer_len, sample_rate);
            inner.coefficients = Some(CachedCoefficients {
                attack_ms,
                release_ms,
                sample_rate,
                buffer_len,
                attack_coef,
                release_coef,
            });
        }
        let c = inner.coefficients.as_ref().unwrap();
        (c.attack_coef, c.release_coef)
    }
}

/// `exp(-N / (timeMs * sampleRate * 1e-3))`, the single-pole smoothing
/// coefficient derived from the *audio* period (samples per buffer), not
/// the control tick.
fn attack_release_coef(time_ms: f64, buffer_len: usize, sample_rate: u32) -> f64 {
    if time_ms <= 0.0 {
        return 0.0;
    }
    (-(buffer_len as f64) / (time_ms * sample_rate as f64 * 1e-3)).exp()
}

impl MeterSink for DecibelMeter {
    fn on_audio_frame(&self, samples: &[f32], _rms: f64, sample_rate: u32) {
        let mut inner = self.inner.lock().unwrap();
        let n = samples.len();
        // sum-of-squares RMS per spec 4.A; recomputed here because the
        // buffer's own `rms()` may have been superseded by a concurrent
        // fill by the time this runs on a slow listener.
        let raw: f64 = {
            let sum_sq: f64 = samples.iter().map(|s| (*s as f64) * (*s as f64)).sum();
            (sum_sq / n as f64).sqrt()
        };

        let (attack_coef, release_coef) = self.coefficients(&mut inner, n, sample_rate);
        let coef = if raw >= inner.rms_env {
            attack_coef
        } else {
            release_coef
        };
        inner.rms_env = raw + coef * (inner.rms_env - raw);

        let ms_per_buffer = n as f64 * 1000.0 / sample_rate as f64;
        if raw > inner.rms_peak {
            inner.rms_peak = raw;
            inner.peak_held_ms = 0.0;
        } else {
            inner.peak_held_ms += ms_per_buffer;
            if inner.peak_held_ms > PEAK_HOLD_MS {
                inner.rms_peak = raw + release_coef * (inner.rms_peak - raw);
            }
        }
    }
}

/// Duration helper for constructing a meter handle with explicit attack
/// and release times.
pub fn handle_with(attack: Duration, release: Duration) -> Arc<DecibelMeterHandle> {
    Arc::new(DecibelMeterHandle {
        gain_db: AtomicF32::new(0.0),
        range_db: AtomicF32::new(48.0),
        attack_ms: AtomicF32::new(attack.as_secs_f32() * 1000.0),
        release_ms: AtomicF32::new(release.as_secs_f32() * 1000.0),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn envelope_update_stays_between_raw_and_previous() {
        // For all raw inputs x in [0,1] and coefficient c in [0,1], the
        // update y' = x + c*(y - x) satisfies min(x,y) <= y' <= max(x,y).
        for x in [0.0, 0.1, 0.3, 0.7, 1.0] {
            for y in [0.0, 0.2, 0.5, 0.9, 1.0] {
                for c in [0.0, 0.25, 0.5, 0.75, 1.0] {
                    let y_prime = x + c * (y - x);
                    assert!(y_prime >= x.min(y) - 1e-12);
                    assert!(y_prime <= x.max(y) + 1e-12);
                }
            }
        }
    }

    #[test]
    fn db_normalization_matches_spec_examples() {
        let handle = handle_with(Duration::from_millis(10), Duration::from_millis(250));
        handle.range_db.set(48.0);
        let meter = DecibelMeter::new(handle);
        {
            let mut inner = meter.inner.lock().unwrap();
            inner.rms_env = 1.0;
        }
        meter.update_state();
        assert!((meter.normalized() - 1.0).abs() < 1e-9);

        {
            let mut inner = meter.inner.lock().unwrap();
            inner.rms_env = 10f64.powf(-48.0 / 20.0);
        }
        meter.update_state();
        assert!((meter.normalized() - 0.0).abs() < 1e-9);
    }

    #[test]
    fn silence_converges_toward_zero() {
        let handle = handle_with(Duration::from_millis(10), Duration::from_millis(100));
        let meter = DecibelMeter::new(handle);
        let n = 512;
        // Prime the envelope with a loud signal.
        meter.on_audio_frame(&vec![1.0f32; n], 1.0, 48_000);
        let loud_env = meter.inner.lock().unwrap().rms_env;
        assert!(loud_env > 0.5);

        // Feed silence for a while; envelope should monotonically decay
        // toward zero.
        let silence = vec![0.0f32; n];
        let mut last = loud_env;
        for _ in 0..200 {
            meter.on_audio_frame(&silence, 0.0, 48_000);
            let now = meter.inner.lock().unwrap().rms_env;
            assert!(now <= last + 1e-9);
            last = now;
        }
        assert!(last < 1e-3);
    }
}
