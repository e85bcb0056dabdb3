//! Audio analysis pipeline: capture/playback into shared buffers, FFT and
//! envelope metering over those buffers, a beat-trigger gate, and
//! positional sound objects driven from any of the above.
pub mod band_gate;
pub mod band_meter;
pub mod buffer;
pub mod capture;
pub mod decibel_meter;
pub mod fft;
pub mod playback;
pub mod sound_object;

pub use band_gate::{BandGate, BandGateConfig, TempoSink};
pub use band_meter::{BandMeter, BandMeterHandle, GraphicMeter};
pub use buffer::{AudioBuffer, MeterSink};
pub use capture::{
    scan_devices_in_background, AudioCapture, ChannelBuffers, DeviceDescriptor, DeviceList,
};
pub use decibel_meter::{DecibelMeter, DecibelMeterHandle};
pub use fft::FourierTransform;
pub use playback::AudioPlayback;
pub use sound_object::{normalize_adm_position, Cartesian, Polar, SoundObject, SourceMode};
