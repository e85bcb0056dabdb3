//! The internal, platform-independent MIDI message representation and the
//! terminal identity ("Source") that tags where a message originated.
use std::time::Duration;

/// Opaque, backend-specific stable identity for a hardware MIDI port --
/// the "exact handle identity" used for hotplug comparison, distinct from
/// the `(name, index)` display identity a `MidiSelector` resolves against
/// (`midi::selector::Terminal`). Derived from `midir::MidiInputPort::id`,
/// which is stable across re-enumeration for the same physical port even
/// if its display name or list position changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(pub String);

/// A virtual (non-hardware) message source this process itself originates
/// or terminates, as opposed to a physical device port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VirtualSourceKind {
    /// The OSC bridge collaborator (§6: `note`/`cc`/`pitchbend` paths).
    Osc,
    /// A computer-keyboard virtual controller.
    Keyboard,
}

/// Identifies where a message came from, or that an output mapping
/// targets: a hardware port (by its stable `DeviceId`), a virtual source
/// this process owns, or `Unknown` for messages with no meaningful origin
/// (e.g. synthesized in a test harness).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    Hardware(DeviceId),
    Virtual(VirtualSourceKind),
    Unknown,
}

impl Source {
    pub fn unknown() -> Self {
        Source::Unknown
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn {
        source: Option<Source>,
        channel: u8,
        pitch: u8,
        velocity: u8,
    },
    NoteOff {
        source: Option<Source>,
        channel: u8,
        pitch: u8,
        velocity: u8,
    },
    ControlChange {
        source: Option<Source>,
        channel: u8,
        cc: u8,
        value: u8,
    },
    ProgramChange {
        source: Option<Source>,
        channel: u8,
        program: u8,
    },
    PitchBend {
        source: Option<Source>,
        channel: u8,
        value: u16,
    },
    Aftertouch {
        source: Option<Source>,
        channel: u8,
        pressure: u8,
    },
    Sysex {
        source: Option<Source>,
        data: Vec<u8>,
    },
    /// Synthesized from 24-PPQ MIDI clock pulses aggregated to quarter-note
    /// boundaries, or emitted synthetically on STOP.
    Beat {
        source: Option<Source>,
        ordinal: u64,
        period: Option<Duration>,
    },
    Panic { source: Option<Source> },
}

impl MidiMessage {
    pub fn source(&self) -> Option<&Source> {
        match self {
            MidiMessage::NoteOn { source, .. }
            | MidiMessage::NoteOff { source, .. }
            | MidiMessage::ControlChange { source, .. }
            | MidiMessage::ProgramChange { source, .. }
            | MidiMessage::PitchBend { source, .. }
            | MidiMessage::Aftertouch { source, .. }
            | MidiMessage::Sysex { source, .. }
            | MidiMessage::Beat { source, .. }
            | MidiMessage::Panic { source } => source.as_ref(),
        }
    }

    pub fn channel(&self) -> Option<u8> {
        match self {
            MidiMessage::NoteOn { channel, .. }
            | MidiMessage::NoteOff { channel, .. }
            | MidiMessage::ControlChange { channel, .. }
            | MidiMessage::ProgramChange { channel, .. }
            | MidiMessage::PitchBend { channel, .. }
            | MidiMessage::Aftertouch { channel, .. } => Some(*channel),
            MidiMessage::Sysex { .. } | MidiMessage::Beat { .. } | MidiMessage::Panic { .. } => None,
        }
    }

    pub fn with_source(mut self, new_source: Option<Source>) -> Self {
        let slot = match &mut self {
            MidiMessage::NoteOn { source, .. }
            | MidiMessage::NoteOff { source, .. }
            | MidiMessage::ControlChange { source, .. }
            | MidiMessage::ProgramChange { source, .. }
            | MidiMessage::PitchBend { source, .. }
            | MidiMessage::Aftertouch { source, .. }
            | MidiMessage::Sysex { source, .. }
            | MidiMessage::Beat { source, .. }
            | MidiMessage::Panic { source } => source,
        };
        *slot = new_source;
        self
    }
}
