//! Device enumeration, hotplug tracking, and the single-threaded engine
//! tick that decodes, filters, and dispatches incoming MIDI traffic.
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, info, warn};
use midir::{MidiInput, MidiInputConnection};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::filter::MidiFilter;
use super::mapping::MidiMapping;
use super::message::{DeviceId, MidiMessage, Source, VirtualSourceKind};
use super::selector::Terminal;
use super::wire::{decode, realtime, ClockAggregator};
use crate::audio::TempoSink;

/// How often the hotplug thread re-enumerates input ports, mirroring the
/// reconnect-polling interval the teacher uses for audio device recovery.
const ENUMERATION_INTERVAL: Duration = Duration::from_secs(5);

const CLIENT_NAME: &str = "luminar";

fn enumerate_terminals() -> Vec<Terminal> {
    match MidiInput::new(CLIENT_NAME) {
        Ok(input) => input
            .ports()
            .iter()
            .enumerate()
            .filter_map(|(index, port)| {
                input.port_name(port).ok().map(|name| Terminal {
                    device_id: DeviceId(port.id()),
                    name,
                    index,
                })
            })
            .collect(),
        Err(e) => {
            warn!("Unable to enumerate MIDI inputs: {e}.");
            Vec::new()
        }
    }
}

enum HotplugCmd {
    Stop,
    Rescan,
}

/// A routable destination for admitted MIDI traffic: messages whose
/// `Source` matches (or any source, for `None`) and that pass `filter`
/// are routed here (§4.I step 5).
pub struct ChannelBus {
    pub source: Option<Source>,
    pub filter: MidiFilter,
}

impl ChannelBus {
    pub fn new(source: Option<Source>, filter: MidiFilter) -> Self {
        Self { source, filter }
    }

    fn admits(&mut self, message: &MidiMessage) -> bool {
        let source_matches = match &self.source {
            None => true,
            Some(want) => message.source() == Some(want),
        };
        source_matches && self.filter.admit(message)
    }
}

/// Everything one `MidiEngine::tick` dispatch pass produced, split by the
/// step of §4.I's contract that generated it.
#[derive(Debug, Default)]
pub struct TickOutcome {
    /// Messages that matched at least one mapping, paired with whether
    /// applying it started a new coalesced action (step 2, see
    /// `CcMapping::apply`).
    pub dispatched: Vec<(MidiMessage, bool)>,
    /// Messages diverted to mapping capture instead of being applied,
    /// because the engine was in capture mode and the source allows
    /// control (step 1).
    pub captured: Vec<MidiMessage>,
    /// Per-channel-bus admitted messages, indexed identically to the
    /// `channel_buses` slice passed to `tick` (step 5).
    pub bus_admitted: Vec<Vec<MidiMessage>>,
}

/// Owns live device connections, the decoded-message queue, and the
/// one-shot `whenReady` latch. Runs no scheduling loop of its own beyond
/// the background enumeration/hotplug threads; dispatch happens on
/// `tick`, called by an external show loop exactly as the rest of this
/// crate's components expect.
pub struct MidiEngine {
    terminals: Arc<Mutex<Vec<Terminal>>>,
    incoming: Receiver<MidiMessage>,
    sender: Sender<MidiMessage>,
    connections: Arc<Mutex<Vec<(Terminal, MidiInputConnection<()>)>>>,
    clock: Arc<Mutex<ClockAggregator>>,
    ready: Arc<AtomicBool>,
    when_ready: Vec<Box<dyn FnOnce(&mut MidiEngine) + Send>>,
    hotplug_stop: Option<Sender<HotplugCmd>>,
    hotplug_thread: Option<JoinHandle<()>>,
    enumeration_thread: Option<JoinHandle<()>>,
    capture_mode: bool,
    control_enabled: HashSet<Source>,
    sync_enabled: bool,
    listeners: Vec<Box<dyn Fn(&MidiMessage) + Send>>,
}

impl MidiEngine {
    pub fn new() -> Self {
        let (sender, incoming) = unbounded();
        let terminals = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(Mutex::new(Vec::new()));
        let clock = Arc::new(Mutex::new(ClockAggregator::new()));
        let ready = Arc::new(AtomicBool::new(false));

        // The first enumeration pass is allowed to stall (slow driver
        // probing, a misbehaving backend) per spec, so it runs on its own
        // thread rather than blocking construction; the engine starts
        // with an empty terminal set and `ready=false` until it
        // completes. The recurring hotplug thread below reconciles
        // independently and concurrently; both share the same
        // mutex-guarded state.
        let enum_terminals = terminals.clone();
        let enum_connections = connections.clone();
        let enum_clock = clock.clone();
        let enum_sender = sender.clone();
        let enum_ready = ready.clone();
        let enumeration_thread = thread::spawn(move || {
            reconcile(&enum_terminals, &enum_connections, &enum_clock, &enum_sender);
            enum_ready.store(true, Ordering::SeqCst);
        });

        let (stop_send, stop_recv) = unbounded::<HotplugCmd>();
        let hotplug_terminals = terminals.clone();
        let hotplug_connections = connections.clone();
        let hotplug_clock = clock.clone();
        let hotplug_sender = sender.clone();
        let join = thread::spawn(move || loop {
            match stop_recv.recv_timeout(ENUMERATION_INTERVAL) {
                Ok(HotplugCmd::Stop) => {
                    debug!("MIDI hotplug thread stopping.");
                    return;
                }
                Ok(HotplugCmd::Rescan) | Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                    reconcile(
                        &hotplug_terminals,
                        &hotplug_connections,
                        &hotplug_clock,
                        &hotplug_sender,
                    );
                }
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => return,
            }
        });

        Self {
            terminals,
            incoming,
            sender,
            connections,
            clock,
            ready,
            when_ready: Vec::new(),
            hotplug_stop: Some(stop_send),
            hotplug_thread: Some(join),
            enumeration_thread: Some(enumeration_thread),
            capture_mode: false,
            control_enabled: HashSet::new(),
            sync_enabled: false,
            listeners: Vec::new(),
        }
    }

    /// Snapshot of currently known input terminals.
    pub fn terminals(&self) -> Vec<Terminal> {
        self.terminals.lock().unwrap().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Force an immediate re-enumeration rather than waiting for the next
    /// background poll, e.g. right after a UI action that's expected to
    /// have changed the device set.
    pub fn rescan_now(&self) {
        if let Some(stop) = &self.hotplug_stop {
            let _ = stop.send(HotplugCmd::Rescan);
        }
    }

    /// Register a one-shot callback to run once device enumeration has
    /// completed at least once. If enumeration has already completed, the
    /// callback runs immediately on the calling thread; otherwise it's
    /// queued and runs on the engine thread (i.e. whichever thread next
    /// calls `tick`) in FIFO order, right after the first pass completes.
    pub fn when_ready(&mut self, thunk: impl FnOnce(&mut MidiEngine) + Send + 'static) {
        if self.ready.load(Ordering::SeqCst) {
            thunk(self);
        } else {
            self.when_ready.push(Box::new(thunk));
        }
    }

    /// Put the engine into (or take it out of) MIDI-mapping capture mode:
    /// while on, messages from a control-enabled source are diverted into
    /// `TickOutcome::captured` instead of being applied against mappings.
    pub fn set_capture_mode(&mut self, capture: bool) {
        self.capture_mode = capture;
    }

    pub fn capture_mode(&self) -> bool {
        self.capture_mode
    }

    /// Mark (or unmark) a source as allowed to participate in mapping
    /// capture. Mirrors spec §4.I step 1's "Source whose controlEnabled
    /// is on".
    pub fn set_control_enabled(&mut self, source: Source, enabled: bool) {
        if enabled {
            self.control_enabled.insert(source);
        } else {
            self.control_enabled.remove(&source);
        }
    }

    fn is_control_enabled(&self, source: Option<&Source>) -> bool {
        source.is_some_and(|s| self.control_enabled.contains(s))
    }

    /// Enable or disable driving tempo from MIDI clock `Beat` messages
    /// (§4.I step 3).
    pub fn set_sync_enabled(&mut self, enabled: bool) {
        self.sync_enabled = enabled;
    }

    pub fn sync_enabled(&self) -> bool {
        self.sync_enabled
    }

    /// Register a global listener notified of every dispatched message
    /// (§4.I step 4), in addition to any per-channel-bus routing.
    pub fn add_listener(&mut self, listener: impl Fn(&MidiMessage) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Inject a synthetic note event, bypassing device IO entirely — the
    /// OSC-originated `note` path the external bridge collaborator drives
    /// (§6), tagged `Source::Virtual(VirtualSourceKind::Osc)`.
    pub fn inject_note(&self, pitch: u8, velocity: u8, channel: u8) {
        self.inject_note_from(pitch, velocity, channel, VirtualSourceKind::Osc);
    }

    /// As `inject_note`, but tagged as originating from the computer
    /// keyboard virtual source (§3) rather than the OSC bridge.
    pub fn inject_note_from_keyboard(&self, pitch: u8, velocity: u8, channel: u8) {
        self.inject_note_from(pitch, velocity, channel, VirtualSourceKind::Keyboard);
    }

    fn inject_note_from(&self, pitch: u8, velocity: u8, channel: u8, kind: VirtualSourceKind) {
        let source = Some(Source::Virtual(kind));
        let message = if velocity == 0 {
            MidiMessage::NoteOff {
                source,
                channel,
                pitch,
                velocity,
            }
        } else {
            MidiMessage::NoteOn {
                source,
                channel,
                pitch,
                velocity,
            }
        };
        let _ = self.sender.send(message);
    }

    /// Inject a synthetic CC event via the OSC bridge's `cc` path (§6).
    pub fn inject_cc(&self, channel: u8, cc: u8, value: u8) {
        let _ = self.sender.send(MidiMessage::ControlChange {
            source: Some(Source::Virtual(VirtualSourceKind::Osc)),
            channel,
            cc,
            value,
        });
    }

    /// Inject a synthetic pitch-bend event via the OSC bridge's
    /// `pitchbend` path (§6).
    pub fn inject_pitchbend(&self, channel: u8, value: u16) {
        let _ = self.sender.send(MidiMessage::PitchBend {
            source: Some(Source::Virtual(VirtualSourceKind::Osc)),
            channel,
            value,
        });
    }

    /// Drain all messages queued since the last tick and dispatch each
    /// through the five-step contract of spec §4.I:
    /// 1. Capture-mode diversion for control-enabled sources.
    /// 2. Mapping application (returning whether it started a new
    ///    coalesced action).
    /// 3. Tempo-sync forwarding of MIDI-clock `Beat` messages.
    /// 4. Global listener notification.
    /// 5. Per-channel-bus source+filter routing.
    pub fn tick(
        &mut self,
        mappings: &mut [MidiMapping],
        channel_buses: &mut [ChannelBus],
        mut tempo_sink: Option<&mut dyn TempoSink>,
        now: Instant,
    ) -> TickOutcome {
        if self.ready.load(Ordering::SeqCst) && !self.when_ready.is_empty() {
            let pending: Vec<_> = self.when_ready.drain(..).collect();
            for thunk in pending {
                thunk(self);
            }
        }

        let mut outcome = TickOutcome {
            dispatched: Vec::new(),
            captured: Vec::new(),
            bus_admitted: vec![Vec::new(); channel_buses.len()],
        };

        for message in self.incoming.try_iter() {
            // Step 1: divert to capture instead of applying.
            if self.capture_mode && self.is_control_enabled(message.source()) {
                outcome.captured.push(message);
                continue;
            }

            // Step 2: apply matching mappings.
            let mut starts_new_action = None;
            for mapping in mappings.iter_mut() {
                if mapping.matches(&message) {
                    starts_new_action = Some(mapping.apply(&message, now));
                }
            }
            if let Some(flag) = starts_new_action {
                outcome.dispatched.push((message.clone(), flag));
            }

            // Step 3: MIDI clock drives tempo when sync is enabled. The
            // existing tap-tempo sink is reused as the tempo subsystem's
            // entry point; a beat's inter-beat period becomes a rate.
            if self.sync_enabled {
                if let MidiMessage::Beat {
                    period: Some(period),
                    ..
                } = &message
                {
                    let secs = period.as_secs_f64();
                    if secs > 0.0 {
                        if let Some(sink) = tempo_sink.as_mut() {
                            sink.on_tap_rate(1.0 / secs);
                        }
                    }
                }
            }

            // Step 4: global listeners see every message that reached
            // dispatch.
            for listener in &self.listeners {
                listener(&message);
            }

            // Step 5: channel-bus routing by source + per-bus filter.
            for (bus, admitted) in channel_buses.iter_mut().zip(outcome.bus_admitted.iter_mut()) {
                if bus.admits(&message) {
                    admitted.push(message.clone());
                }
            }
        }
        outcome
    }
}

impl Default for MidiEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MidiEngine {
    fn drop(&mut self) {
        if let Some(stop) = self.hotplug_stop.take() {
            let _ = stop.send(HotplugCmd::Stop);
        }
        if let Some(join) = self.hotplug_thread.take() {
            let _ = join.join();
        }
        if let Some(join) = self.enumeration_thread.take() {
            let _ = join.join();
        }
    }
}

/// Re-enumerate input ports, tearing down connections to ports that
/// disappeared, refreshing (name, index) in place for ports whose exact
/// handle identity (`device_id`) is still present, and opening
/// connections to ports that appeared since the last reconciliation.
fn reconcile(
    terminals: &Arc<Mutex<Vec<Terminal>>>,
    connections: &Arc<Mutex<Vec<(Terminal, MidiInputConnection<()>)>>>,
    clock: &Arc<Mutex<ClockAggregator>>,
    sender: &Sender<MidiMessage>,
) {
    let current = enumerate_terminals();
    {
        let mut conns = connections.lock().unwrap();
        conns.retain(|(terminal, _)| current.contains(terminal));
        for (terminal, _) in conns.iter_mut() {
            if let Some(refreshed) = current.iter().find(|t| *t == terminal) {
                *terminal = refreshed.clone();
            }
        }
        for terminal in &current {
            if conns.iter().any(|(t, _)| t == terminal) {
                continue;
            }
            match connect_input(terminal.clone(), clock.clone(), sender.clone()) {
                Ok(conn) => {
                    info!("Connected MIDI input {}.", terminal.name);
                    conns.push((terminal.clone(), conn));
                }
                Err(e) => {
                    warn!("Unable to connect MIDI input {}: {e}.", terminal.name);
                }
            }
        }
    }
    *terminals.lock().unwrap() = current;
}

fn connect_input(
    terminal: Terminal,
    clock: Arc<Mutex<ClockAggregator>>,
    sender: Sender<MidiMessage>,
) -> anyhow::Result<MidiInputConnection<()>> {
    let input = MidiInput::new(CLIENT_NAME)?;
    let port = input
        .ports()
        .into_iter()
        .find(|p| p.id() == terminal.device_id.0)
        .ok_or_else(|| anyhow::anyhow!("device {} not found among current ports", terminal.device_id.0))?;
    let source = terminal.source();
    let handler_name = terminal.name.clone();

    let conn = input
        .connect(
            &port,
            &terminal.name,
            move |timestamp_us, raw, _| {
                dispatch_raw(
                    raw,
                    timestamp_us,
                    &source,
                    &clock,
                    &sender,
                    &handler_name,
                );
            },
            (),
        )
        .map_err(|e| anyhow::anyhow!("failed to connect MIDI input: {e}"))?;
    Ok(conn)
}

fn dispatch_raw(
    raw: &[u8],
    _timestamp_us: u64,
    source: &Source,
    clock: &Arc<Mutex<ClockAggregator>>,
    sender: &Sender<MidiMessage>,
    handler_name: &str,
) {
    let Some(&status) = raw.first() else { return };
    let is_realtime = matches!(
        status,
        realtime::CLOCK | realtime::START | realtime::STOP | realtime::SONG_POSITION
    );
    if is_realtime {
        let now = Instant::now();
        let message = clock
            .lock()
            .unwrap()
            .feed(status, Some(source.clone()), now);
        if let Some(message) = message {
            let _ = sender.send(message);
        }
        return;
    }
    match decode(raw, Some(source.clone())) {
        Ok(message) => {
            let _ = sender.send(message);
        }
        Err(e) => debug!("Dropping undecodable MIDI message on {handler_name}: {e}."),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::midi::{MidiFilterConfig, NoteAction, NoteMapping, NoteMode, ParameterTarget};
    use std::sync::atomic::{AtomicBool as StdAtomicBool, Ordering as StdOrdering};
    use std::sync::Arc as StdArc;

    #[test]
    fn inject_note_round_trips_through_tick_to_a_channel_bus() {
        let mut engine = MidiEngine::new();
        let mut buses = vec![ChannelBus::new(
            None,
            MidiFilter::new(MidiFilterConfig::default()),
        )];
        engine.inject_note(60, 100, 0);
        let outcome = engine.tick(&mut [], &mut buses, None, Instant::now());
        assert_eq!(outcome.bus_admitted[0].len(), 1);
        assert!(matches!(
            outcome.bus_admitted[0][0],
            MidiMessage::NoteOn { pitch: 60, .. }
        ));
    }

    #[test]
    fn inject_note_zero_velocity_is_note_off_and_matches_mapping() {
        let mut engine = MidiEngine::new();
        let handle = StdArc::new(StdAtomicBool::new(true));
        let mut mappings = vec![MidiMapping::Note(
            NoteMapping::new(
                0,
                60,
                ParameterTarget::Boolean(handle.clone()),
                NoteAction::Bool(NoteMode::Momentary),
            )
            .unwrap(),
        )];
        engine.inject_note(60, 0, 0);
        let outcome = engine.tick(&mut mappings, &mut [], None, Instant::now());
        assert_eq!(outcome.dispatched.len(), 1);
        assert!(matches!(
            outcome.dispatched[0].0,
            MidiMessage::NoteOff { .. }
        ));
        assert!(!handle.load(StdOrdering::SeqCst));
    }

    #[test]
    fn when_ready_runs_queued_thunk_once_async_enumeration_completes() {
        let mut engine = MidiEngine::new();
        let flag = StdArc::new(StdAtomicBool::new(false));
        let flag2 = flag.clone();
        // Racy at construction: the enumeration thread almost certainly
        // hasn't finished yet, so this queues rather than running inline.
        engine.when_ready(move |_| flag2.store(true, StdOrdering::SeqCst));

        let deadline = Instant::now() + Duration::from_secs(2);
        while !flag.load(StdOrdering::SeqCst) && Instant::now() < deadline {
            engine.tick(&mut [], &mut [], None, Instant::now());
            thread::sleep(Duration::from_millis(5));
        }
        assert!(flag.load(StdOrdering::SeqCst), "whenReady thunk never ran");
        assert!(engine.is_ready());
    }

    #[test]
    fn capture_mode_diverts_control_enabled_source_instead_of_applying() {
        let mut engine = MidiEngine::new();
        let source = Source::Virtual(VirtualSourceKind::Osc);
        engine.set_capture_mode(true);
        engine.set_control_enabled(source, true);
        engine.inject_cc(0, 7, 64);

        let outcome = engine.tick(&mut [], &mut [], None, Instant::now());
        assert_eq!(outcome.captured.len(), 1);
        assert!(outcome.dispatched.is_empty());
    }

    #[test]
    fn global_listener_observes_injected_messages() {
        let mut engine = MidiEngine::new();
        let seen = StdArc::new(StdAtomicBool::new(false));
        let seen2 = seen.clone();
        engine.add_listener(move |_| seen2.store(true, StdOrdering::SeqCst));
        engine.inject_cc(0, 1, 10);
        engine.tick(&mut [], &mut [], None, Instant::now());
        assert!(seen.load(StdOrdering::SeqCst));
    }

    #[test]
    fn channel_bus_routes_by_source_and_filter() {
        let mut engine = MidiEngine::new();
        let osc = Source::Virtual(VirtualSourceKind::Osc);
        let keyboard = Source::Virtual(VirtualSourceKind::Keyboard);
        let mut buses = vec![
            ChannelBus::new(Some(osc), MidiFilter::new(MidiFilterConfig::default())),
            ChannelBus::new(Some(keyboard), MidiFilter::new(MidiFilterConfig::default())),
        ];
        engine.inject_note(60, 100, 0);
        let outcome = engine.tick(&mut [], &mut buses, None, Instant::now());
        assert_eq!(outcome.bus_admitted[0].len(), 1);
        assert_eq!(outcome.bus_admitted[1].len(), 0);
    }

    #[test]
    fn sync_enabled_forwards_beat_period_to_tempo_sink() {
        struct RecordingSink {
            rate: Option<f64>,
        }
        impl TempoSink for RecordingSink {
            fn on_tap_rate(&mut self, beats_per_second: f64) {
                self.rate = Some(beats_per_second);
            }
        }
        let mut engine = MidiEngine::new();
        engine.set_sync_enabled(true);
        let _ = engine.sender.send(MidiMessage::Beat {
            source: Some(Source::Virtual(VirtualSourceKind::Osc)),
            ordinal: 1,
            period: Some(Duration::from_millis(500)),
        });
        let mut sink = RecordingSink { rate: None };
        engine.tick(&mut [], &mut [], Some(&mut sink), Instant::now());
        assert_eq!(sink.rate, Some(2.0));
    }
}
