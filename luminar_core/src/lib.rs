//! Audio analysis and MIDI dispatch core for a lighting-control engine:
//! capture/playback into shared buffers, FFT and envelope metering,
//! beat-trigger gating, positional sound objects, and a MIDI plane
//! (device hotplug, wire decoding, selectors, filters, mappings) that
//! drives engine parameters from controller input.
pub mod audio;
pub mod engine;
pub mod error;
pub mod midi;

pub use engine::Engine;
