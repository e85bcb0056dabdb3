//! File-backed PCM playback: decode, loop/trigger/pause, and demux into
//! the same L/R/Mix buffer contract as live capture.
use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig, StreamError};
use hound::{SampleFormat as HoundSampleFormat, WavReader};
use log::{info, warn};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::capture::ChannelBuffers;
use crate::error::FormatError;

type Reader = WavReader<BufReader<File>>;

/// Sample rates this system's audio pipeline supports, per spec §6.
const SUPPORTED_SAMPLE_RATES: [u32; 2] = [44_100, 48_000];

/// A RIFF container's first four bytes are `RIFF` for little-endian data
/// and `RIFX` for big-endian; hound only ever decodes the former, but we
/// check explicitly so a big-endian file is rejected with our own typed
/// error rather than hound's generic IO failure.
fn is_big_endian_riff(path: &Path) -> Result<bool> {
    let mut magic = [0u8; 4];
    let mut file =
        File::open(path).with_context(|| format!("opening {}", path.display()))?;
    if file.read_exact(&mut magic).is_err() {
        return Ok(false);
    }
    Ok(&magic == b"RIFX")
}

/// Validate a WAV file's format against the spec's supported shape: 16-bit
/// signed PCM, mono or stereo, little-endian, at 44100 or 48000 Hz.
fn open_and_validate(path: &Path) -> Result<(Reader, u32, u16)> {
    if is_big_endian_riff(path)? {
        return Err(FormatError::WrongEndianness.into());
    }

    let reader = WavReader::open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let spec = reader.spec();
    if spec.sample_format != HoundSampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(FormatError::UnsupportedEncoding(format!(
            "{:?}/{}-bit",
            spec.sample_format, spec.bits_per_sample
        ))
        .into());
    }
    if spec.channels > 2 {
        return Err(FormatError::TooManyChannels(spec.channels).into());
    }
    if !SUPPORTED_SAMPLE_RATES.contains(&spec.sample_rate) {
        return Err(FormatError::UnsupportedSampleRate(spec.sample_rate).into());
    }
    Ok((reader, spec.sample_rate, spec.channels))
}

struct PlaybackState {
    path: PathBuf,
    reader: Option<Reader>,
    sample_rate: u32,
    channels: u16,
    looping: bool,
    paused: bool,
}

impl PlaybackState {
    fn rewind(&mut self) -> Result<()> {
        let (reader, sample_rate, channels) = open_and_validate(&self.path)?;
        self.reader = Some(reader);
        self.sample_rate = sample_rate;
        self.channels = channels;
        Ok(())
    }

    /// Pull up to `frame_count` frames (one sample per channel) from the
    /// file, zero-filling past EOF. Returns `false` once the file is
    /// exhausted and (if not looping) playback should pause.
    fn fill(&mut self, out: &mut Vec<i16>, frame_count: usize) -> bool {
        out.clear();
        let channels = self.channels.max(1) as usize;
        out.resize(frame_count * channels, 0);
        let mut filled = 0usize;
        if let Some(reader) = self.reader.as_mut() {
            let mut samples = reader.samples::<i16>();
            while filled < frame_count * channels {
                match samples.next() {
                    Some(Ok(s)) => {
                        out[filled] = s;
                        filled += 1;
                    }
                    Some(Err(e)) => {
                        warn!("Error decoding playback sample: {e}");
                        break;
                    }
                    None => break,
                }
            }
        }
        if filled < frame_count * channels {
            if self.looping {
                if self.rewind().is_ok() {
                    info!("Playback reached EOF; looping {}.", self.path.display());
                }
            } else {
                self.paused = true;
            }
            return false;
        }
        true
    }
}

/// Owns a file-backed playback stream feeding an output device, matching
/// the L/R/Mix fill contract shared with live capture so meters don't care
/// which source is live.
pub struct AudioPlayback {
    state: Arc<Mutex<PlaybackState>>,
    playing: Arc<AtomicBool>,
    _stream: Option<Stream>,
}

impl AudioPlayback {
    pub fn open(path: impl AsRef<Path>, looping: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (reader, sample_rate, channels) = open_and_validate(&path)?;
        Ok(Self {
            state: Arc::new(Mutex::new(PlaybackState {
                path,
                reader: Some(reader),
                sample_rate,
                channels,
                looping,
                paused: false,
            })),
            playing: Arc::new(AtomicBool::new(false)),
            _stream: None,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.state.lock().unwrap().sample_rate
    }

    pub fn set_looping(&self, looping: bool) {
        self.state.lock().unwrap().looping = looping;
    }

    pub fn paused(&self) -> bool {
        self.state.lock().unwrap().paused
    }

    pub fn pause(&self) {
        self.playing.store(false, Ordering::SeqCst);
        self.state.lock().unwrap().paused = true;
    }

    /// Resume (or start) playback, rewinding if the file had already
    /// reached EOF and is not set to loop.
    pub fn trigger(&mut self, buffers: ChannelBuffers) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            if state.paused {
                state.rewind()?;
            }
            state.paused = false;
        }
        self.playing.store(true, Ordering::SeqCst);
        self._stream = Some(open_output_stream(self.state.clone(), self.playing.clone(), buffers)?);
        Ok(())
    }
}

fn open_output_stream(
    state: Arc<Mutex<PlaybackState>>,
    playing: Arc<AtomicBool>,
    buffers: ChannelBuffers,
) -> Result<Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .context("no default audio output device")?;
    let (sample_rate, channels) = {
        let state = state.lock().unwrap();
        (state.sample_rate, state.channels.max(1))
    };
    let config = StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let mut scratch: Vec<i16> = Vec::new();
    let handle_output = move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
        if !playing.load(Ordering::SeqCst) {
            data.fill(0);
            return;
        }
        let frame_count = data.len() / channels as usize;
        let mut state = state.lock().unwrap();
        state.fill(&mut scratch, frame_count);
        let channels_usize = channels as usize;

        data.copy_from_slice(&scratch);
        let mut raw = Vec::with_capacity(scratch.len() * 2);
        for &s in &scratch {
            raw.extend_from_slice(&s.to_le_bytes());
        }
        let byte_len = raw.len();
        if channels_usize <= 1 {
            buffers.left.lock().unwrap().fill_from_interleaved(
                &raw,
                0,
                byte_len,
                2,
                sample_rate,
            );
            let left = buffers.left.lock().unwrap().samples().to_vec();
            buffers.right.lock().unwrap().fill_from_interleaved(
                &raw,
                0,
                byte_len,
                2,
                sample_rate,
            );
            buffers.mix.lock().unwrap().compute_mix(&left, &left, sample_rate);
        } else {
            buffers.left.lock().unwrap().fill_from_interleaved(
                &raw,
                0,
                byte_len,
                4,
                sample_rate,
            );
            buffers.right.lock().unwrap().fill_from_interleaved(
                &raw,
                2,
                byte_len,
                4,
                sample_rate,
            );
            let left = buffers.left.lock().unwrap().samples().to_vec();
            let right = buffers.right.lock().unwrap().samples().to_vec();
            buffers.mix.lock().unwrap().compute_mix(&left, &right, sample_rate);
        }
    };

    let handle_error = |err: StreamError| {
        warn!("Audio playback stream error: {err}");
    };

    let stream = device.build_output_stream(&config, handle_output, handle_error, None)?;
    stream.play()?;
    Ok(stream)
}
