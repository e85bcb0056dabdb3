//! Top-level tick glue: owns one of each pipeline component and defines
//! the order they run in, matching the dependency chain
//! AudioBuffer -> DecibelMeter -> GraphicMeter -> BandMeter/BandGate ->
//! SoundObject -> listeners. This crate does not own the scheduling loop,
//! only the tick body — an external show loop calls `Engine::tick` the
//! same way `show.rs::run` drives `Show::update_state` in the teacher.
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::audio::{
    AudioBuffer, BandGate, BandGateConfig, BandMeter, BandMeterHandle, DecibelMeter,
    DecibelMeterHandle, GraphicMeter, SoundObject, TempoSink,
};
use crate::midi::{ChannelBus, MidiEngine, MidiFilter, MidiFilterConfig, MidiMapping, TickOutcome};

/// One band-range gate watching a configured frequency window, paired
/// with the range it watches.
pub struct GateChannel {
    pub min_hz: f64,
    pub max_hz: f64,
    pub gate: BandGate,
}

pub struct Engine {
    buffer: Arc<Mutex<AudioBuffer>>,
    decibel: Arc<DecibelMeter>,
    graphic: Arc<GraphicMeter>,
    band_meter: BandMeter,
    gates: Vec<GateChannel>,
    sound_objects: Vec<SoundObject>,
    midi: MidiEngine,
    channel_buses: Vec<ChannelBus>,
    mappings: Vec<MidiMapping>,
}

impl Engine {
    pub fn new(
        buffer_capacity: usize,
        fft_size: usize,
        sample_rate: u32,
        num_bands: usize,
    ) -> Result<Self, crate::error::ContractViolation> {
        let buffer = Arc::new(Mutex::new(AudioBuffer::new(buffer_capacity)));
        let decibel = Arc::new(DecibelMeter::new(Arc::new(DecibelMeterHandle::default())));
        let graphic = Arc::new(GraphicMeter::new(fft_size, sample_rate, num_bands)?);
        let band_meter = BandMeter::new(Arc::new(BandMeterHandle::default()), graphic.clone());

        {
            let guard = buffer.lock().unwrap();
            guard.attach(Arc::downgrade(&decibel) as std::sync::Weak<dyn crate::audio::MeterSink>);
            guard.attach(Arc::downgrade(&graphic) as std::sync::Weak<dyn crate::audio::MeterSink>);
        }

        Ok(Self {
            buffer,
            decibel,
            graphic,
            band_meter,
            gates: Vec::new(),
            sound_objects: Vec::new(),
            midi: MidiEngine::new(),
            // One default, omni-source channel bus so a caller that never
            // touches channel routing still sees admitted MIDI traffic;
            // `channel_buses_mut` lets a caller replace or extend this.
            channel_buses: vec![ChannelBus::new(None, MidiFilter::new(MidiFilterConfig::default()))],
            mappings: Vec::new(),
        })
    }

    pub fn buffer(&self) -> &Arc<Mutex<AudioBuffer>> {
        &self.buffer
    }

    pub fn decibel_meter(&self) -> &Arc<DecibelMeter> {
        &self.decibel
    }

    pub fn graphic_meter(&self) -> &Arc<GraphicMeter> {
        &self.graphic
    }

    pub fn add_gate(&mut self, min_hz: f64, max_hz: f64, config: BandGateConfig) {
        self.gates.push(GateChannel {
            min_hz,
            max_hz,
            gate: BandGate::new(config),
        });
    }

    pub fn add_sound_object(&mut self, object: SoundObject) {
        self.sound_objects.push(object);
    }

    pub fn sound_objects(&self) -> &[SoundObject] {
        &self.sound_objects
    }

    pub fn add_mapping(&mut self, mapping: MidiMapping) {
        self.mappings.push(mapping);
    }

    /// The default channel bus's filter, for callers that don't need
    /// more than one routing destination.
    pub fn midi_filter_mut(&mut self) -> &mut MidiFilter {
        &mut self.channel_buses[0].filter
    }

    pub fn channel_buses_mut(&mut self) -> &mut Vec<ChannelBus> {
        &mut self.channel_buses
    }

    pub fn midi_engine_mut(&mut self) -> &mut MidiEngine {
        &mut self.midi
    }

    /// Advance every owned component by one control-loop step, in
    /// dependency order: the meters consume whatever audio arrived since
    /// the last tick, the gates react to the freshly updated band
    /// average, and the sound objects react to the freshly updated
    /// decibel envelope. MIDI dispatch runs last so a same-tick gate
    /// trigger routed to a tap-tempo sink and a same-tick MIDI mapping
    /// update are both visible to this tick's listeners.
    pub fn tick(
        &mut self,
        delta_t: Duration,
        mut tempo_sink: Option<&mut dyn TempoSink>,
    ) -> TickOutcome {
        let buffer_len = self.buffer.lock().unwrap().samples().len();

        self.decibel.update_state();
        self.band_meter.update_state(buffer_len);

        for gate_channel in &mut self.gates {
            self.band_meter
                .update_range(gate_channel.min_hz, gate_channel.max_hz, buffer_len);
            let value = self.band_meter.range_pre_clamp();
            gate_channel
                .gate
                .tick(value, delta_t, tempo_sink.as_mut().map(|s| &mut **s));
        }

        let level = self.decibel.normalized();
        for object in &mut self.sound_objects {
            object.tick(delta_t, Some(level));
        }

        let now = Instant::now();
        self.midi.tick(
            &mut self.mappings,
            &mut self.channel_buses,
            tempo_sink.as_mut().map(|s| &mut **s),
            now,
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn construction_wires_meters_to_buffer() {
        let engine = Engine::new(256, 256, 44_100, 16);
        assert!(engine.is_ok());
    }

    #[test]
    fn tick_runs_the_full_pipeline_without_panicking() {
        let mut engine = Engine::new(256, 256, 44_100, 16).unwrap();
        engine.add_gate(60.0, 250.0, BandGateConfig::default());
        engine.add_sound_object(SoundObject::new(crate::audio::SourceMode::Audio));
        let outcome = engine.tick(Duration::from_millis(16), None);
        assert!(outcome.dispatched.is_empty());
    }
}
