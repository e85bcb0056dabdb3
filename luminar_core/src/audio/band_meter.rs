//! Octave-band graphic equalizer metering: an FFT front end (`GraphicMeter`)
//! feeding smoothed, slope-compensated per-band envelopes (`BandMeter`).
use augmented_atomics::AtomicF32;
use std::sync::{Arc, Mutex};

use super::buffer::MeterSink;
use super::fft::{FourierTransform, BASE_HZ};
use crate::error::ContractViolation;

/// Wraps a [`FourierTransform`] as a meter: each completed audio frame is
/// windowed, transformed, and octave-banded, and the raw (unsmoothed)
/// band amplitudes are published for `BandMeter` to consume.
pub struct GraphicMeter {
    inner: Mutex<FourierTransform>,
    raw_bands: Mutex<Vec<f32>>,
}

impl GraphicMeter {
    pub fn new(n: usize, sample_rate: u32, num_bands: usize) -> Result<Self, ContractViolation> {
        let transform = FourierTransform::new(n, sample_rate, num_bands)?;
        Ok(Self {
            raw_bands: Mutex::new(vec![0.0; transform.num_bands()]),
            inner: Mutex::new(transform),
        })
    }

    /// Most recent octave-band amplitude snapshot.
    pub fn raw_bands(&self) -> Vec<f32> {
        self.raw_bands.lock().unwrap().clone()
    }

    pub fn num_bands(&self) -> usize {
        self.inner.lock().unwrap().num_bands()
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.lock().unwrap().sample_rate()
    }

    pub fn bin_for_hz(&self, hz: f64) -> usize {
        self.inner.lock().unwrap().bin_for_hz(hz)
    }

    /// Raw spectrum amplitudes, for computing a band-range average over an
    /// arbitrary [minHz, maxHz] window that doesn't line up with the fixed
    /// octave bands.
    pub fn amplitudes(&self) -> Vec<f32> {
        self.inner.lock().unwrap().amplitudes().to_vec()
    }
}

impl MeterSink for GraphicMeter {
    fn on_audio_frame(&self, samples: &[f32], _rms: f64, _sample_rate: u32) {
        let mut transform = self.inner.lock().unwrap();
        if samples.len() != transform.size() {
            // A buffer capacity mismatch with the configured FFT size is a
            // wiring error upstream; skip this frame rather than panic on
            // the audio thread.
            return;
        }
        if transform.compute(samples).is_ok() {
            self.raw_bands.lock().unwrap().copy_from_slice(transform.bands());
        }
    }
}

/// Tunable parameters shared by the per-band envelopes and the band-range
/// average, mutable from the engine thread without locking the reader.
pub struct BandMeterHandle {
    pub gain_db: AtomicF32,
    pub range_db: AtomicF32,
    pub attack_ms: AtomicF32,
    pub release_ms: AtomicF32,
    /// dB/octave slope compensation applied per band index.
    pub slope: AtomicF32,
}

impl Default for BandMeterHandle {
    fn default() -> Self {
        Self {
            gain_db: AtomicF32::new(0.0),
            range_db: AtomicF32::new(48.0),
            attack_ms: AtomicF32::new(10.0),
            release_ms: AtomicF32::new(250.0),
            slope: AtomicF32::new(0.0),
        }
    }
}

/// Per-band envelope follower over a [`GraphicMeter`]'s raw band output,
/// plus an independent band-range average over an arbitrary Hz window
/// (used by `BandGate`).
pub struct BandMeter {
    handle: Arc<BandMeterHandle>,
    graphic: Arc<GraphicMeter>,
    octave_ratio: f64,
    rms_bands: Vec<f64>,
    normalized_bands: Vec<f64>,
    range_rms: f64,
    range_normalized: f64,
    range_pre_clamp: f64,
}

impl BandMeter {
    pub fn new(handle: Arc<BandMeterHandle>, graphic: Arc<GraphicMeter>) -> Self {
        let num_bands = graphic.num_bands();
        let sample_rate = graphic.sample_rate();
        let nyquist_ratio = (sample_rate as f64 / 2.0) / BASE_HZ;
        let band_range = nyquist_ratio.log2();
        let octave_ratio = if num_bands > 1 {
            band_range / (num_bands as f64 - 1.0)
        } else {
            0.0
        };
        Self {
            handle,
            graphic,
            octave_ratio,
            rms_bands: vec![0.0; num_bands],
            normalized_bands: vec![0.0; num_bands],
            range_rms: 0.0,
            range_normalized: 0.0,
            range_pre_clamp: 0.0,
        }
    }

    fn coef(&self, time_ms: f32, buffer_len: usize) -> f64 {
        let sample_rate = self.graphic.sample_rate();
        if time_ms <= 0.0 {
            return 0.0;
        }
        (-(buffer_len as f64) / (time_ms as f64 * sample_rate as f64 * 1e-3)).exp()
    }

    /// Advance the per-band envelopes from the `GraphicMeter`'s latest raw
    /// bands. `buffer_len` is the FFT window size, used to derive the
    /// attack/release coefficients from the audio period.
    pub fn update_state(&mut self, buffer_len: usize) {
        let raw_bands = self.graphic.raw_bands();
        let gain = self.handle.gain_db.get() as f64;
        let range = self.handle.range_db.get() as f64;
        let slope = self.handle.slope.get() as f64;
        let attack_coef = self.coef(self.handle.attack_ms.get(), buffer_len);
        let release_coef = self.coef(self.handle.release_ms.get(), buffer_len);

        for (k, &raw) in raw_bands.iter().enumerate() {
            let raw = raw as f64;
            let prev = self.rms_bands[k];
            let coef = if raw >= prev { attack_coef } else { release_coef };
            let rms = raw + coef * (prev - raw);
            self.rms_bands[k] = rms;
            let db = if rms > 0.0 {
                20.0 * rms.log10() + gain + k as f64 * slope * self.octave_ratio
            } else {
                f64::NEG_INFINITY
            };
            self.normalized_bands[k] = (1.0 + db / range).clamp(0.0, 1.0);
        }
    }

    pub fn bands(&self) -> &[f64] {
        &self.normalized_bands
    }

    /// Average the raw spectrum amplitudes over `[min_hz, max_hz]`, smooth
    /// with the same attack/release pair as the per-band envelopes, and
    /// convert to a normalized value with an additional slope term keyed
    /// to the band range's own octave offset from `BASE_HZ`.
    pub fn update_range(&mut self, min_hz: f64, max_hz: f64, buffer_len: usize) {
        let sample_rate = self.graphic.sample_rate();
        let amps = self.graphic.amplitudes();
        let n = (buffer_len).max(1);
        let low = ((min_hz * n as f64 / sample_rate as f64).round() as usize).min(amps.len());
        let high = ((max_hz * n as f64 / sample_rate as f64).round() as usize).min(amps.len());
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        let slice = &amps[low..high.max(low + 1).min(amps.len())];
        let raw = if slice.is_empty() {
            0.0
        } else {
            slice.iter().map(|v| *v as f64).sum::<f64>() / slice.len() as f64
        };

        let attack_coef = self.coef(self.handle.attack_ms.get(), buffer_len);
        let release_coef = self.coef(self.handle.release_ms.get(), buffer_len);
        let coef = if raw >= self.range_rms { attack_coef } else { release_coef };
        self.range_rms = raw + coef * (self.range_rms - raw);

        let gain = self.handle.gain_db.get() as f64;
        let range = self.handle.range_db.get() as f64;
        let slope = self.handle.slope.get() as f64;
        let average_octave = (((min_hz + max_hz) / 2.0) / BASE_HZ).log2();
        let db = if self.range_rms > 0.0 {
            20.0 * self.range_rms.log10() + gain + slope * average_octave
        } else {
            f64::NEG_INFINITY
        };
        let pre_clamp = 1.0 + db / range;
        self.range_pre_clamp = pre_clamp;
        self.range_normalized = pre_clamp.clamp(0.0, 1.0);
    }

    pub fn range_normalized(&self) -> f64 {
        self.range_normalized
    }

    /// The band-range average before clamping to `[0,1]`. `BandGate`'s
    /// hysteresis compares against this value rather than the clamped
    /// output; see the floor-comparison decision recorded in `DESIGN.md`.
    pub fn range_pre_clamp(&self) -> f64 {
        self.range_pre_clamp
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn silent_spectrum_yields_zero_bands() {
        let graphic = Arc::new(GraphicMeter::new(1024, 44_100, 8).unwrap());
        let handle = Arc::new(BandMeterHandle::default());
        let mut meter = BandMeter::new(handle, graphic.clone());
        graphic.on_audio_frame(&vec![0.0f32; 1024], 0.0, 44_100);
        meter.update_state(1024);
        for v in meter.bands() {
            assert_eq!(*v, 0.0);
        }
    }

    #[test]
    fn loud_tone_band_rises_above_others() {
        let n = 2048;
        let sample_rate = 44_100;
        let graphic = Arc::new(GraphicMeter::new(n, sample_rate, 10).unwrap());
        let handle = Arc::new(BandMeterHandle::default());
        let mut meter = BandMeter::new(handle, graphic.clone());

        let samples: Vec<f32> = (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * 1000.0 * i as f64 / sample_rate as f64).sin() as f32)
            .collect();
        // Repeated fills let the attack envelope catch up from zero.
        for _ in 0..20 {
            graphic.on_audio_frame(&samples, 0.0, sample_rate);
            meter.update_state(n);
        }
        let bands = meter.bands();
        let (peak_idx, peak_val) = bands
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap();
        for (i, v) in bands.iter().enumerate() {
            if i != peak_idx {
                assert!(v <= peak_val);
            }
        }
    }

    #[test]
    fn range_average_tracks_a_tone_inside_its_window() {
        let n = 2048;
        let sample_rate = 44_100;
        let graphic = Arc::new(GraphicMeter::new(n, sample_rate, 10).unwrap());
        let handle = Arc::new(BandMeterHandle::default());
        let mut meter = BandMeter::new(handle, graphic.clone());

        let samples: Vec<f32> = (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * 100.0 * i as f64 / sample_rate as f64).sin() as f32)
            .collect();
        for _ in 0..20 {
            graphic.on_audio_frame(&samples, 0.0, sample_rate);
            meter.update_range(60.0, 250.0, n);
        }
        assert!(meter.range_normalized() > 0.0);
    }
}
