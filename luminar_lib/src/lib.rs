//! Numeric and timing primitives shared across the audio pipeline and MIDI
//! plane. Dependency-free aside from `serde`/`derive_more`, so that any
//! downstream consumer (show state, a beam renderer, a project serializer)
//! can depend on it without pulling in audio or MIDI IO crates.

pub mod number;
pub mod prompt;
pub mod smooth;
pub mod tap_sync;
pub mod transient;

use derive_more::{Add, Display, Div, Mul, Sub};
use serde::{Deserialize, Serialize};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

/// Timestamp used for expressing moments in time, has units of microseconds.
/// Normally computed by the engine as the number of microseconds since
/// the engine launched.
/// Signed type to support possible situations where we need to subtract one
/// timestamp from another and end up with a negative result.
#[derive(
    Copy,
    Eq,
    PartialEq,
    Hash,
    Serialize,
    Deserialize,
    Debug,
    Display,
    Clone,
    Add,
    Sub,
    Mul,
    Div,
    Ord,
    PartialOrd,
)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn since(start: Instant) -> Self {
        Self::from_duration(start.elapsed())
    }

    pub fn from_duration(d: Duration) -> Self {
        Self(d.as_micros() as i64)
    }

    // Step mutably increments this timestamp by the provided step.
    pub fn step(&mut self, step: Duration) {
        *self = *self + Self::from_duration(step);
    }
}

impl num_traits::cast::ToPrimitive for Timestamp {
    fn to_i64(&self) -> Option<i64> {
        return Some(self.0);
    }

    fn to_u64(&self) -> Option<u64> {
        if self.0 >= 0 {
            return Some(self.0 as u64);
        }
        None
    }
}

/// A helper wrapper around an atomically-reference-counted atomic boolean.
/// Used to control program flow across multiple threads.
#[derive(Debug, Clone)]
pub struct RunFlag(Arc<AtomicBool>);

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl RunFlag {
    /// Create a flag set to run.
    pub fn new() -> Self {
        RunFlag(Arc::new(AtomicBool::new(true)))
    }

    /// Return true if the program should continue.
    pub fn should_run(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Command the program to stop.
    pub fn stop(&mut self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

const ALMOST_EQ_TOLERANCE: f64 = 0.000_000_1;

/// Return True if two f64 are within 10^-6 of each other.
#[inline(always)]
pub fn almost_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < ALMOST_EQ_TOLERANCE
}

/// Panic if a and b are not almost equal.
pub fn assert_almost_eq(a: f64, b: f64) {
    assert!(almost_eq(a, b), "{} != {}", a, b);
}
