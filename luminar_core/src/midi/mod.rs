//! MIDI plane: device enumeration and hotplug, wire decoding and clock
//! aggregation, selectors that survive reconnection, admission filtering,
//! and the mappings that drive engine parameters.
pub mod engine;
pub mod filter;
pub mod mapping;
pub mod message;
pub mod selector;
pub mod wire;

pub use engine::{ChannelBus, MidiEngine, TickOutcome};
pub use filter::{ChannelFilter, MidiFilter, MidiFilterConfig};
pub use mapping::{
    CcMapping, CoalescingWindow, DiscreteNoteMode, MidiMapping, NoteAction, NoteMapping, NoteMode,
    ParameterTarget,
};
pub use message::{DeviceId, MidiMessage, Source, VirtualSourceKind};
pub use selector::{MidiSelector, Terminal};
pub use wire::{decode, identity_request, ClockAggregator, MidiDecodeError, IDENTITY_REQUEST};
