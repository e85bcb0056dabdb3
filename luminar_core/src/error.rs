//! Error taxonomy for the audio pipeline and MIDI plane.
//!
//! Recoverable device errors are reported as state transitions (a
//! `connected` flag flipping to false), not as propagated `Result`s -- see
//! `audio::capture` and `midi::engine`. The types here cover the remaining
//! cases: format rejection at file-open time and the small set of
//! construction-time contract violations that are programmer errors.

use thiserror::Error;

/// A PCM file or stream does not match the shape this system can consume:
/// 16-bit little-endian signed PCM, mono or stereo, at a supported sample
/// rate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("unsupported sample encoding: {0}")]
    UnsupportedEncoding(String),
    #[error("unsupported sample rate {0} Hz")]
    UnsupportedSampleRate(u32),
    #[error("big-endian PCM is not supported")]
    WrongEndianness,
    #[error("{0} channels is more than the supported maximum of 2")]
    TooManyChannels(u16),
}

/// A contract violation caught at construction time: these are programmer
/// errors (not input data problems) and are appropriate to fail loudly on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContractViolation {
    #[error("FFT buffer size {0} is not a power of two")]
    NotPowerOfTwo(usize),
    #[error("cannot map a parameter with no parent component")]
    OrphanParameter,
    #[error("duplicate control mapping registered for the same key")]
    DuplicateMapping,
}
