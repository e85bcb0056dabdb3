//! Device enumeration, capture-thread management, and L/R/Mix buffer
//! demuxing for live audio input, grounded on the teacher's reconnect-on-
//! disconnect control loop.
use anyhow::{bail, Result};
use arc_swap::ArcSwap;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Stream, StreamConfig, StreamError, SupportedBufferSize};
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use super::buffer::AudioBuffer;

/// Target audio buffer size in multiples of the device's reported period,
/// trading latency for fewer wakeups.
pub const BUFFER_FRAMES: usize = 4;

const UNAVAILABLE: &str = "Unavailable";

/// Formats probed in priority order: prefer stereo and the higher sample
/// rate, fall back to mono / the lower rate.
const FORMAT_PRIORITY: [(u16, u32); 4] = [(2, 48_000), (2, 44_100), (1, 48_000), (1, 44_100)];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub name: String,
    pub connected: bool,
}

/// Published device list, refreshed by a background enumeration task since
/// scanning capture endpoints can be slow.
pub struct DeviceList {
    devices: ArcSwap<Vec<DeviceDescriptor>>,
}

impl DeviceList {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            devices: ArcSwap::from_pointee(vec![DeviceDescriptor {
                name: UNAVAILABLE.to_string(),
                connected: false,
            }]),
        })
    }

    pub fn snapshot(&self) -> Vec<DeviceDescriptor> {
        (**self.devices.load()).clone()
    }

    fn publish(&self, devices: Vec<DeviceDescriptor>) {
        self.devices.store(Arc::new(devices));
    }
}

/// Scan available capture endpoints in a background thread and publish the
/// result to `list`, falling back to a single "Unavailable" placeholder
/// when enumeration fails or no devices exist.
pub fn scan_devices_in_background(list: Arc<DeviceList>) {
    thread::spawn(move || {
        let descriptors = enumerate_devices().unwrap_or_default();
        let descriptors = if descriptors.is_empty() {
            vec![DeviceDescriptor {
                name: UNAVAILABLE.to_string(),
                connected: false,
            }]
        } else {
            descriptors
        };
        list.publish(descriptors);
    });
}

fn enumerate_devices() -> Result<Vec<DeviceDescriptor>> {
    let host = cpal::default_host();
    let devices = host.input_devices()?;
    Ok(devices
        .filter_map(|d| d.name().ok())
        .map(|name| DeviceDescriptor {
            name,
            connected: true,
        })
        .collect())
}

fn open_input_device(name: &str) -> Result<cpal::Device> {
    let host = cpal::default_host();
    for device in host.input_devices()? {
        if device.name().map(|n| n == name).unwrap_or(false) {
            return Ok(device);
        }
    }
    bail!("audio input {name} not found");
}

/// Probe `device` for the highest-priority supported (channels, sample
/// rate) pair, falling back to its default input config.
fn negotiate_format(device: &cpal::Device) -> Result<StreamConfig> {
    let supported: Vec<_> = device.supported_input_configs()?.collect();
    for &(channels, rate) in FORMAT_PRIORITY.iter() {
        if let Some(range) = supported.iter().find(|r| {
            r.channels() == channels
                && r.min_sample_rate().0 <= rate
                && r.max_sample_rate().0 >= rate
        }) {
            let config = range.clone().with_sample_rate(cpal::SampleRate(rate));
            return Ok(config.into());
        }
    }
    warn!("No prioritized input format matched; falling back to device default.");
    Ok(device.default_input_config()?.into())
}

fn buffer_size_for(config: &StreamConfig, device: &cpal::Device) -> Result<BufferSize> {
    let target = (config.sample_rate.0 as usize / 1000 * BUFFER_FRAMES)
        .max(64)
        .next_power_of_two() as u32;
    let supported = device.default_input_config()?;
    let clamped = match supported.buffer_size() {
        SupportedBufferSize::Unknown => target,
        SupportedBufferSize::Range { min, max } => target.clamp(*min, *max),
    };
    Ok(BufferSize::Fixed(clamped))
}

/// Destination buffers a capture line demuxes into: separate left/right
/// channels and their averaged mix, matching the contract shared with
/// `AudioPlayback` so meters don't care which source is live.
#[derive(Clone)]
pub struct ChannelBuffers {
    pub left: Arc<Mutex<AudioBuffer>>,
    pub right: Arc<Mutex<AudioBuffer>>,
    pub mix: Arc<Mutex<AudioBuffer>>,
}

impl ChannelBuffers {
    pub fn new(capacity: usize) -> Self {
        Self {
            left: Arc::new(Mutex::new(AudioBuffer::new(capacity))),
            right: Arc::new(Mutex::new(AudioBuffer::new(capacity))),
            mix: Arc::new(Mutex::new(AudioBuffer::new(capacity))),
        }
    }

    fn demux(&self, raw: &[u8], channels: u16, sample_rate: u32) {
        let byte_len = raw.len();
        if channels <= 1 {
            self.left
                .lock()
                .unwrap()
                .fill_from_interleaved(raw, 0, byte_len, 2, sample_rate);
            let left_samples = self.left.lock().unwrap().samples().to_vec();
            self.right
                .lock()
                .unwrap()
                .fill_from_interleaved(raw, 0, byte_len, 2, sample_rate);
            self.mix
                .lock()
                .unwrap()
                .compute_mix(&left_samples, &left_samples, sample_rate);
        } else {
            self.left
                .lock()
                .unwrap()
                .fill_from_interleaved(raw, 0, byte_len, 4, sample_rate);
            self.right
                .lock()
                .unwrap()
                .fill_from_interleaved(raw, 2, byte_len, 4, sample_rate);
            let left_samples = self.left.lock().unwrap().samples().to_vec();
            let right_samples = self.right.lock().unwrap().samples().to_vec();
            self.mix
                .lock()
                .unwrap()
                .compute_mix(&left_samples, &right_samples, sample_rate);
        }
    }
}

/// A self-reconnecting audio capture line: owns a background thread that
/// (re)opens the named device whenever it disconnects, demuxing each
/// completed period into `ChannelBuffers`.
pub struct AudioCapture {
    connected: Arc<AtomicBool>,
    stop: Option<Sender<Cmd>>,
    join: Option<thread::JoinHandle<()>>,
}

enum Cmd {
    Stop,
    Disconnected,
}

/// How long to wait before retrying a failed reopen.
const RECONNECT_INTERVAL: Duration = Duration::from_secs(1);

impl AudioCapture {
    pub fn new(device_name: String, buffers: ChannelBuffers) -> Self {
        let connected = Arc::new(AtomicBool::new(false));
        let (send, recv) = channel::<Cmd>();
        send.send(Cmd::Disconnected).unwrap();
        let disconnected_sender = send.clone();
        let connected_thread = connected.clone();

        let join = thread::spawn(move || {
            let mut _stream: Option<Stream> = None;
            for event in recv {
                match event {
                    Cmd::Stop => {
                        info!("Audio capture thread for {device_name} is stopping.");
                        return;
                    }
                    Cmd::Disconnected => {
                        _stream = None;
                        connected_thread.store(false, Ordering::SeqCst);
                        let sender = disconnected_sender.clone();
                        let connected_open = connected_thread.clone();
                        match open_stream(&device_name, buffers.clone(), move || {
                            sender.send(Cmd::Disconnected).ok();
                            warn!("Audio capture device disconnected.");
                        }) {
                            Ok(stream) => {
                                info!("Opened audio capture device {device_name}.");
                                connected_open.store(true, Ordering::SeqCst);
                                _stream = Some(stream);
                            }
                            Err(e) => {
                                warn!("Unable to open audio capture device {device_name}: {e}");
                                let sender = disconnected_sender.clone();
                                thread::spawn(move || {
                                    thread::sleep(RECONNECT_INTERVAL);
                                    sender.send(Cmd::Disconnected).ok();
                                });
                            }
                        }
                    }
                }
            }
        });

        Self {
            connected,
            stop: Some(send),
            join: Some(join),
        }
    }

    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(Cmd::Stop);
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn open_stream<F>(device_name: &str, buffers: ChannelBuffers, mut on_disconnect: F) -> Result<Stream>
where
    F: FnMut() + Send + 'static,
{
    let device = open_input_device(device_name)?;
    let config = negotiate_format(&device)?;
    let mut config = config;
    config.buffer_size = buffer_size_for(&config, &device)?;
    let sample_rate = config.sample_rate.0;
    let channels = config.channels;

    let handle_samples = move |data: &[i16], _: &cpal::InputCallbackInfo| {
        let mut raw = Vec::with_capacity(data.len() * 2);
        for sample in data {
            raw.extend_from_slice(&sample.to_le_bytes());
        }
        buffers.demux(&raw, channels, sample_rate);
    };

    let handle_error = move |err: StreamError| match err {
        StreamError::BackendSpecific { err } => {
            warn!("Audio capture backend error: {err}");
        }
        StreamError::DeviceNotAvailable => on_disconnect(),
    };

    let stream = device.build_input_stream(&config, handle_samples, handle_error, None)?;
    stream.play()?;
    Ok(stream)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mono_demux_copies_to_both_channels_and_averages_to_mix() {
        let buffers = ChannelBuffers::new(4);
        let mut raw = Vec::new();
        for v in [1000i16, -1000, 500, -500] {
            raw.extend_from_slice(&v.to_le_bytes());
        }
        buffers.demux(&raw, 1, 48_000);
        let left = buffers.left.lock().unwrap().samples().to_vec();
        let right = buffers.right.lock().unwrap().samples().to_vec();
        let mix = buffers.mix.lock().unwrap().samples().to_vec();
        assert_eq!(left, right);
        assert_eq!(mix, left);
    }

    #[test]
    fn stereo_demux_splits_interleaved_channels() {
        let buffers = ChannelBuffers::new(2);
        let mut raw = Vec::new();
        // Frame 0: L=1000, R=-1000; Frame 1: L=2000, R=-2000.
        for (l, r) in [(1000i16, -1000i16), (2000, -2000)] {
            raw.extend_from_slice(&l.to_le_bytes());
            raw.extend_from_slice(&r.to_le_bytes());
        }
        buffers.demux(&raw, 2, 48_000);
        let left = buffers.left.lock().unwrap().samples().to_vec();
        let right = buffers.right.lock().unwrap().samples().to_vec();
        assert!(left[0] > 0.0 && right[0] < 0.0);
        assert!((left[0] + right[0]).abs() < 1e-6);
    }

    #[test]
    fn device_list_falls_back_to_unavailable_placeholder() {
        let list = DeviceList::new();
        assert_eq!(list.snapshot()[0].name, UNAVAILABLE);
    }
}
