//! Estimate a periodic rate from a series of tap events.
use std::time::{Duration, Instant};

/// Estimate rate from a series of taps.
///
/// Used by anything driven by a user- or signal-triggered periodic pulse
/// (a tap-tempo button, a beat-detector trigger) that wants to converge on
/// a stable rate estimate while discarding one-off outlier intervals.
#[derive(Debug, Clone)]
pub struct TapSync {
    taps: Vec<Instant>,
    rate: Option<f64>,
    period: Option<Duration>,
}

impl Default for TapSync {
    fn default() -> Self {
        Self::new()
    }
}

impl TapSync {
    /// Fractional threshold at which we'll discard the current tap buffer and
    /// start a new one.
    const RESET_THRESHOLD: f64 = 0.1;

    pub fn new() -> Self {
        Self {
            taps: Vec::new(),
            rate: None,
            period: None,
        }
    }

    fn reset_buffer(&mut self, tap: Instant) {
        self.taps.clear();
        self.taps.push(tap);
        self.rate = None;
        self.period = None;
    }

    fn add_tap(&mut self, tap: Instant) {
        self.taps.push(tap);
        if self.taps.len() < 2 {
            return;
        }
        // compute rate if we have at least two taps
        if let (Some(first), Some(last)) = (self.taps.first(), self.taps.last()) {
            let period = (*last - *first) / (self.taps.len() as u32 - 1);
            self.period = Some(period);
            self.rate = Some(1.0 / period.as_secs_f64());
        }
    }

    /// Process a tap event at the current instant. Return the new rate
    /// estimate in Hz if we have one.
    pub fn tap(&mut self) -> Option<f64> {
        self.tap_at(Instant::now())
    }

    /// Process a tap event at an explicit instant (for testing).
    /// Return our new rate estimate if we have one.
    pub fn tap_at(&mut self, tap: Instant) -> Option<f64> {
        match self.period {
            Some(period) => {
                let dt = tap - *self.taps.last().unwrap();

                // if this single estimate of tempo is within +-10% of current, use it
                // otherwise, empty the buffer and start over
                let fractional_difference = (period - dt).as_secs_f64() / period.as_secs_f64();

                if fractional_difference.abs() > Self::RESET_THRESHOLD {
                    self.reset_buffer(tap);
                } else {
                    self.add_tap(tap);
                }
            }
            None => self.add_tap(tap),
        }
        self.rate
    }

    /// Number of taps currently accumulated in the buffer.
    pub fn tap_count(&self) -> usize {
        self.taps.len()
    }

    /// Discard all accumulated taps.
    pub fn reset(&mut self) {
        self.taps.clear();
        self.rate = None;
        self.period = None;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_converges_on_steady_taps() {
        let mut sync = TapSync::new();
        let start = Instant::now();
        let period = Duration::from_millis(500);
        assert_eq!(sync.tap_at(start), None);
        assert!(sync.tap_at(start + period).is_some());
        let rate = sync.tap_at(start + period * 2).unwrap();
        assert!((rate - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_outlier_resets_buffer() {
        let mut sync = TapSync::new();
        let start = Instant::now();
        let period = Duration::from_millis(500);
        sync.tap_at(start);
        sync.tap_at(start + period);
        sync.tap_at(start + period * 2);
        assert_eq!(sync.tap_count(), 3);
        // A tap way outside the 10% window should reset the buffer.
        sync.tap_at(start + period * 2 + Duration::from_millis(2000));
        assert_eq!(sync.tap_count(), 1);
    }
}
