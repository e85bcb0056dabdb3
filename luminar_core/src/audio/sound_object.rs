//! Positional audio object: polar/cartesian position plus a smoothed
//! level sourced from a selectable meter or external collaborator.
use std::time::Duration;

use luminar_lib::number::UnipolarFloat;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Polar {
    /// Azimuth, degrees.
    pub azimuth: f64,
    /// Elevation, degrees.
    pub elevation: f64,
    /// Distance, normalized [0,1].
    pub distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cartesian {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Where a `SoundObject`'s `input` value comes from each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    /// `input` is copied from an attached meter's normalized output.
    Audio,
    /// An external collaborator (OSC, Envelop, Reaper) writes `input`
    /// directly; this component only maps and smooths it.
    Osc,
    Envelop,
    Reaper,
}

/// Position (polar, dirtied lazily into cartesian) plus a smoothed,
/// range-mapped level.
pub struct SoundObject {
    polar: Polar,
    polar_dirty: bool,
    cartesian: Cartesian,

    source_mode: SourceMode,
    input: f64,

    floor: f64,
    ceiling: f64,

    current: UnipolarFloat,
    attack_ms: f64,
    release_ms: f64,
}

impl SoundObject {
    pub fn new(source_mode: SourceMode) -> Self {
        let polar = Polar {
            azimuth: 0.0,
            elevation: 0.0,
            distance: 0.0,
        };
        Self {
            polar,
            polar_dirty: true,
            cartesian: cartesian_from_polar(polar),
            source_mode,
            input: 0.0,
            floor: 0.0,
            ceiling: 1.0,
            current: UnipolarFloat::ZERO,
            attack_ms: 0.0,
            release_ms: 0.0,
        }
    }

    pub fn set_polar(&mut self, polar: Polar) {
        if polar != self.polar {
            self.polar = polar;
            self.polar_dirty = true;
        }
    }

    pub fn cartesian(&self) -> Cartesian {
        self.cartesian
    }

    pub fn source_mode(&self) -> SourceMode {
        self.source_mode
    }

    pub fn set_source_mode(&mut self, mode: SourceMode) {
        self.source_mode = mode;
    }

    /// Write `input` directly; only takes effect when `source_mode` is not
    /// `Audio` (the external collaborator owns this value in that case).
    pub fn set_input(&mut self, value: f64) {
        self.input = value;
    }

    pub fn set_range(&mut self, floor: f64, ceiling: f64) {
        self.floor = floor;
        self.ceiling = ceiling;
    }

    pub fn set_smoothing(&mut self, attack_ms: Duration, release_ms: Duration) {
        self.attack_ms = attack_ms.as_secs_f64() * 1000.0;
        self.release_ms = release_ms.as_secs_f64() * 1000.0;
    }

    pub fn level(&self) -> UnipolarFloat {
        self.current
    }

    /// Advance one engine tick. `audio_level`, if the source mode is
    /// `Audio`, is the normalized level read from the attached meter.
    pub fn tick(&mut self, delta_t: Duration, audio_level: Option<f64>) {
        if self.polar_dirty {
            self.cartesian = cartesian_from_polar(self.polar);
            self.polar_dirty = false;
        }

        if self.source_mode == SourceMode::Audio {
            if let Some(level) = audio_level {
                self.input = level;
            }
        }

        let range = self.ceiling - self.floor;
        let target = if range.abs() > f64::EPSILON {
            ((self.input - self.floor) / range).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let current = self.current.val();
        let next = if target > current {
            if self.attack_ms > 0.0 {
                (current + delta_t.as_secs_f64() * 1000.0 / self.attack_ms).min(target)
            } else {
                target
            }
        } else if target < current {
            if self.release_ms > 0.0 {
                (current - delta_t.as_secs_f64() * 1000.0 / self.release_ms).max(target)
            } else {
                target
            }
        } else {
            current
        };
        self.current = UnipolarFloat::new(next);
    }
}

/// Normalize an azimuth/elevation pair arriving from an ADM-OSC collaborator
/// into this crate's internal convention: ADM delivers azimuth
/// counter-clockwise, the engine stores it clockwise, so ingress negates it.
/// An elevation outside `[-90, 90]` is folded back in by reflecting through
/// the pole and rotating azimuth 180 degrees, which is then re-wrapped into
/// `[-180, 180]`.
pub fn normalize_adm_position(azimuth_ccw: f64, elevation_deg: f64) -> (f64, f64) {
    let mut azimuth = -azimuth_ccw;
    let mut elevation = elevation_deg;

    while elevation > 90.0 || elevation < -90.0 {
        if elevation > 90.0 {
            elevation = 180.0 - elevation;
        } else {
            elevation = -180.0 - elevation;
        }
        azimuth += 180.0;
    }

    (wrap_azimuth(azimuth), elevation)
}

/// Wrap an azimuth in degrees into `[-180, 180]`.
fn wrap_azimuth(azimuth: f64) -> f64 {
    let mut a = azimuth % 360.0;
    if a > 180.0 {
        a -= 360.0;
    } else if a < -180.0 {
        a += 360.0;
    }
    a
}

fn cartesian_from_polar(polar: Polar) -> Cartesian {
    let azimuth = polar.azimuth.to_radians();
    let elevation = polar.elevation.to_radians();
    let dist = polar.distance;
    Cartesian {
        x: 0.5 * (1.0 + azimuth.sin() * elevation.cos() * dist),
        y: 0.5 * (1.0 + elevation.sin() * dist),
        z: 0.5 * (1.0 + azimuth.cos() * elevation.cos() * dist),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use luminar_lib::assert_almost_eq;

    fn cart_for(azimuth: f64, elevation: f64, distance: f64) -> Cartesian {
        cartesian_from_polar(Polar {
            azimuth,
            elevation,
            distance,
        })
    }

    #[test]
    fn cartesian_mapping_matches_reference_points() {
        let c = cart_for(0.0, 0.0, 1.0);
        assert_almost_eq(c.x, 0.5);
        assert_almost_eq(c.y, 0.5);
        assert_almost_eq(c.z, 1.0);

        let c = cart_for(90.0, 0.0, 1.0);
        assert_almost_eq(c.x, 1.0);
        assert_almost_eq(c.y, 0.5);
        assert_almost_eq(c.z, 0.5);

        let c = cart_for(0.0, 90.0, 1.0);
        assert_almost_eq(c.x, 0.5);
        assert_almost_eq(c.y, 1.0);
        assert_almost_eq(c.z, 0.5);
    }

    #[test]
    fn polar_dirty_flag_gates_recompute() {
        let mut obj = SoundObject::new(SourceMode::Osc);
        obj.set_polar(Polar {
            azimuth: 90.0,
            elevation: 0.0,
            distance: 1.0,
        });
        obj.tick(Duration::from_millis(10), None);
        let first = obj.cartesian();
        assert_almost_eq(first.x, 1.0);

        // Setting the same polar again should not mark dirty or change
        // the cartesian snapshot.
        obj.set_polar(Polar {
            azimuth: 90.0,
            elevation: 0.0,
            distance: 1.0,
        });
        assert!(!obj.polar_dirty);
    }

    #[test]
    fn snaps_to_target_when_times_are_zero() {
        let mut obj = SoundObject::new(SourceMode::Osc);
        obj.set_range(0.0, 1.0);
        obj.set_input(0.75);
        obj.tick(Duration::from_millis(16), None);
        assert_almost_eq(obj.level().val(), 0.75);
    }

    #[test]
    fn attack_slews_toward_target_over_time() {
        let mut obj = SoundObject::new(SourceMode::Osc);
        obj.set_range(0.0, 1.0);
        obj.set_smoothing(Duration::from_millis(100), Duration::from_millis(100));
        obj.set_input(1.0);
        obj.tick(Duration::from_millis(10), None);
        assert_almost_eq(obj.level().val(), 0.1);
        obj.tick(Duration::from_millis(10), None);
        assert_almost_eq(obj.level().val(), 0.2);
    }

    #[test]
    fn audio_source_mode_copies_meter_level() {
        let mut obj = SoundObject::new(SourceMode::Audio);
        obj.set_range(0.0, 1.0);
        obj.tick(Duration::from_millis(10), Some(0.5));
        assert_almost_eq(obj.level().val(), 0.5);
    }

    #[test]
    fn adm_ingress_negates_azimuth_for_in_range_elevation() {
        let (az, el) = normalize_adm_position(30.0, 45.0);
        assert_almost_eq(az, -30.0);
        assert_almost_eq(el, 45.0);
    }

    #[test]
    fn adm_ingress_reflects_out_of_range_elevation_through_the_pole() {
        // Elevation of 100 degrees overshoots the pole by 10; it reflects
        // back to 80 and the azimuth rotates 180 degrees (then negates).
        let (az, el) = normalize_adm_position(0.0, 100.0);
        assert_almost_eq(el, 80.0);
        assert_almost_eq(az, 180.0);

        let (az, el) = normalize_adm_position(0.0, -100.0);
        assert_almost_eq(el, -80.0);
        assert_almost_eq(az, 180.0);
    }
}
