//! Windowed FFT with octave-band aggregation for the graphic equalizer.
use rustfft::{num_complex::Complex32, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

use crate::error::ContractViolation;

/// Base frequency for octave banding: C2, 65.41 Hz.
pub const BASE_HZ: f64 = 65.41;

/// A windowed, power-of-two FFT that also derives a fixed set of
/// log-spaced octave bands from the resulting amplitude spectrum.
pub struct FourierTransform {
    n: usize,
    sample_rate: u32,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex32>,
    amplitudes: Vec<f32>,
    num_bands: usize,
    band_offsets: Vec<usize>,
    bands: Vec<f32>,
}

impl FourierTransform {
    /// Construct a new transform. `n` must be a power of two or
    /// construction fails, as FFT size is a compile-time contract, not
    /// input data.
    pub fn new(n: usize, sample_rate: u32, num_bands: usize) -> Result<Self, ContractViolation> {
        if n == 0 || !n.is_power_of_two() {
            return Err(ContractViolation::NotPowerOfTwo(n));
        }
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n);

        let window: Vec<f32> = (0..n)
            .map(|i| {
                // Hamming window.
                0.54 - 0.46 * (2.0 * PI * i as f32 / (n as f32 - 1.0)).cos()
            })
            .collect();

        let band_offsets = octave_band_offsets(n, sample_rate, num_bands);

        Ok(Self {
            n,
            sample_rate,
            window,
            fft,
            scratch: vec![Complex32::new(0.0, 0.0); n],
            amplitudes: vec![0.0; n / 2 + 1],
            num_bands,
            band_offsets,
            bands: vec![0.0; num_bands],
        })
    }

    pub fn size(&self) -> usize {
        self.n
    }

    pub fn num_bands(&self) -> usize {
        self.num_bands
    }

    /// Run the transform over a window of exactly `size()` samples.
    /// Fails if the input length does not match.
    pub fn compute(&mut self, samples: &[f32]) -> Result<(), ContractViolation> {
        if samples.len() != self.n {
            return Err(ContractViolation::NotPowerOfTwo(samples.len()));
        }
        for i in 0..self.n {
            self.scratch[i] = Complex32::new(samples[i] * self.window[i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        for i in 0..=self.n / 2 {
            self.amplitudes[i] = self.scratch[i].norm();
        }

        for k in 0..self.num_bands {
            let lo = self.band_offsets[k];
            let hi = self.band_offsets[k + 1].max(lo + 1);
            let hi = hi.min(self.amplitudes.len());
            let lo = lo.min(hi.saturating_sub(1));
            let slice = &self.amplitudes[lo..hi];
            self.bands[k] = if slice.is_empty() {
                0.0
            } else {
                slice.iter().sum::<f32>() / slice.len() as f32
            };
        }
        Ok(())
    }

    /// Full amplitude spectrum from the most recent `compute()`, bins
    /// `0..=n/2`.
    pub fn amplitudes(&self) -> &[f32] {
        &self.amplitudes
    }

    /// Octave-band averages from the most recent `compute()`.
    pub fn bands(&self) -> &[f32] {
        &self.bands
    }

    /// Convert a frequency in Hz to the nearest FFT bin index at this
    /// transform's sample rate.
    pub fn bin_for_hz(&self, hz: f64) -> usize {
        ((hz * self.n as f64 / self.sample_rate as f64).round() as usize).min(self.n / 2)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Compute the lower-bin boundary for each of `num_bands` log-spaced
/// octave bands plus one trailing boundary, per spec §4.B:
/// `bandOffset[k] = round(N/sampleRate * baseHz * 2^(k*octaveRatio))`.
fn octave_band_offsets(n: usize, sample_rate: u32, num_bands: usize) -> Vec<usize> {
    let nyquist_ratio = (sample_rate as f64 / 2.0) / BASE_HZ;
    let band_range = nyquist_ratio.log2();
    let octave_ratio = if num_bands > 1 {
        band_range / (num_bands as f64 - 1.0)
    } else {
        0.0
    };
    let max_bin = n / 2;
    (0..=num_bands)
        .map(|k| {
            let hz_ratio = BASE_HZ * 2f64.powf(k as f64 * octave_ratio);
            let bin = (n as f64 / sample_rate as f64 * hz_ratio).round() as usize;
            bin.min(max_bin)
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn sine_window(n: usize, freq_hz: f64, sample_rate: u32) -> Vec<f32> {
        (0..n)
            .map(|i| {
                (2.0 * std::f64::consts::PI * freq_hz * i as f64 / sample_rate as f64).sin() as f32
            })
            .collect()
    }

    #[test]
    fn rejects_non_power_of_two() {
        assert!(FourierTransform::new(100, 44_100, 16).is_err());
    }

    #[test]
    fn pure_tone_peaks_at_its_bin() {
        let n = 4096;
        let sample_rate = 44_100;
        let mut fft = FourierTransform::new(n, sample_rate, 16).unwrap();
        let freq = 440.0;
        let samples = sine_window(n, freq, sample_rate);
        fft.compute(&samples).unwrap();

        let target_bin = fft.bin_for_hz(freq);
        let amps = fft.amplitudes();
        let peak_bin = amps
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        // Windowed FFTs spread energy across adjacent bins; the true peak
        // should land within a bin or two of the exact target.
        assert!((peak_bin as i64 - target_bin as i64).abs() <= 2);

        // Adjacent bins should be strictly lower than the peak.
        let peak_amp = amps[peak_bin];
        if peak_bin > 0 {
            assert!(amps[peak_bin - 1] < peak_amp);
        }
        if peak_bin + 1 < amps.len() {
            assert!(amps[peak_bin + 1] < peak_amp);
        }
    }

    #[test]
    fn band_containing_tone_is_largest() {
        let n = 4096;
        let sample_rate = 44_100;
        let num_bands = 16;
        let mut fft = FourierTransform::new(n, sample_rate, num_bands).unwrap();
        let samples = sine_window(n, 440.0, sample_rate);
        fft.compute(&samples).unwrap();

        let bands = fft.bands();
        let (peak_idx, _) = bands
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap();

        // 440 Hz should land in a low-to-mid band, and be the clear
        // maximum across all bands.
        let max_val = bands[peak_idx];
        for (i, v) in bands.iter().enumerate() {
            if i != peak_idx {
                assert!(*v < max_val, "band {i} ({v}) >= peak band {peak_idx} ({max_val})");
            }
        }
    }
}
