//! Thin demonstration binary: prompts for a live audio input device, wires
//! it into an `Engine`, and runs the tick loop at a fixed control rate,
//! logging band-gate triggers and MIDI activity as they occur.
use anyhow::Result;
use log::info;
use simplelog::{Config as LogConfig, LevelFilter, SimpleLogger};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use luminar_core::audio::{
    scan_devices_in_background, AudioBuffer, AudioCapture, ChannelBuffers, DeviceList,
};
use luminar_core::audio::{BandGateConfig, SoundObject, SourceMode};
use luminar_core::Engine;
use luminar_lib::prompt::{prompt_bool, prompt_indexed_value};

const BUFFER_CAPACITY: usize = 1024;
const FFT_SIZE: usize = 1024;
const SAMPLE_RATE: u32 = 48_000;
const NUM_BANDS: usize = 24;

/// Matches the teacher's `RENDER_INTERVAL`-style fixed control-loop rate,
/// scaled down since this crate's work per tick is metering and MIDI
/// dispatch rather than frame rendering.
const TICK_INTERVAL: Duration = Duration::from_millis(16);

fn main() -> Result<()> {
    SimpleLogger::init(LevelFilter::Info, LogConfig::default())?;

    let mut engine = Engine::new(BUFFER_CAPACITY, FFT_SIZE, SAMPLE_RATE, NUM_BANDS)?;
    engine.add_gate(60.0, 250.0, BandGateConfig::default());
    engine.add_sound_object(SoundObject::new(SourceMode::Audio));

    let _capture = if prompt_bool("Use a live audio input?")? {
        Some(open_audio_capture(&engine)?)
    } else {
        None
    };

    info!("luminar_cli running; press Ctrl+C to stop.");
    run(engine)
}

/// Drive `engine.tick` forever at `TICK_INTERVAL`, the way an external show
/// loop is expected to.
fn run(mut engine: Engine) -> Result<()> {
    let mut last = Instant::now();
    loop {
        thread::sleep(TICK_INTERVAL);
        let now = Instant::now();
        let delta_t = now.duration_since(last);
        last = now;
        engine.tick(delta_t, None);
    }
}

/// Enumerate capture devices, prompt for one, and wire it so its averaged
/// mix buffer is the same buffer the engine's meters are attached to.
fn open_audio_capture(engine: &Engine) -> Result<AudioCapture> {
    let devices = DeviceList::new();
    scan_devices_in_background(devices.clone());
    thread::sleep(Duration::from_millis(500));

    let names: Vec<String> = devices.snapshot().into_iter().map(|d| d.name).collect();
    for (index, name) in names.iter().enumerate() {
        println!("{index}: {name}");
    }
    let chosen = prompt_indexed_value("Select an audio input device by index", &names)?;

    let buffers = ChannelBuffers {
        left: Arc::new(Mutex::new(AudioBuffer::new(BUFFER_CAPACITY))),
        right: Arc::new(Mutex::new(AudioBuffer::new(BUFFER_CAPACITY))),
        mix: engine.buffer().clone(),
    };
    Ok(AudioCapture::new(chosen, buffers))
}
