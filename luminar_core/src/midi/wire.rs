//! Raw platform MIDI byte decoding into the internal [`MidiMessage`]
//! representation, plus 24-PPQ clock aggregation into quarter-note `Beat`
//! messages.
use log::debug;
use std::time::{Duration, Instant};

use super::message::{MidiMessage, Source};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum MidiDecodeError {
    #[error("empty MIDI message")]
    Empty,
    #[error("unrecognized status byte 0x{0:x}")]
    UnrecognizedStatus(u8),
    #[error("message too short for its status byte: {0:?}")]
    Truncated(Vec<u8>),
}

/// Decode one raw short message (realtime bytes are handled separately by
/// [`ClockAggregator`]; this only covers channel-voice and sysex messages).
pub fn decode(raw: &[u8], source: Option<Source>) -> Result<MidiMessage, MidiDecodeError> {
    let status = *raw.first().ok_or(MidiDecodeError::Empty)?;
    if status == 0xF0 {
        return Ok(MidiMessage::Sysex {
            source,
            data: raw.to_vec(),
        });
    }

    let kind = status >> 4;
    let channel = status & 0x0F;
    let need = |n: usize| -> Result<(), MidiDecodeError> {
        if raw.len() < n {
            Err(MidiDecodeError::Truncated(raw.to_vec()))
        } else {
            Ok(())
        }
    };

    match kind {
        0x8 => {
            need(3)?;
            Ok(MidiMessage::NoteOff {
                source,
                channel,
                pitch: raw[1],
                velocity: raw[2],
            })
        }
        0x9 => {
            need(3)?;
            // Many controllers send NoteOn velocity 0 in place of NoteOff.
            if raw[2] == 0 {
                Ok(MidiMessage::NoteOff {
                    source,
                    channel,
                    pitch: raw[1],
                    velocity: 0,
                })
            } else {
                Ok(MidiMessage::NoteOn {
                    source,
                    channel,
                    pitch: raw[1],
                    velocity: raw[2],
                })
            }
        }
        0xB => {
            need(3)?;
            Ok(MidiMessage::ControlChange {
                source,
                channel,
                cc: raw[1],
                value: raw[2],
            })
        }
        0xC => {
            need(2)?;
            Ok(MidiMessage::ProgramChange {
                source,
                channel,
                program: raw[1],
            })
        }
        0xD => {
            need(2)?;
            Ok(MidiMessage::Aftertouch {
                source,
                channel,
                pressure: raw[1],
            })
        }
        0xE => {
            need(3)?;
            let value = (raw[1] as u16) | ((raw[2] as u16) << 7);
            Ok(MidiMessage::PitchBend {
                source,
                channel,
                value,
            })
        }
        _ => Err(MidiDecodeError::UnrecognizedStatus(status)),
    }
}

/// Universal Non-Realtime SysEx identity-request pattern (device ID 0x7F,
/// "all call"), a convenience utility per spec §6 for devices that reply
/// with their make/model over SysEx rather than exposing it any other way.
pub const IDENTITY_REQUEST: [u8; 6] = [0xF0, 0x7E, 0x7F, 0x06, 0x01, 0xF7];

/// Build the identity-request SysEx message as a [`MidiMessage::Sysex`]
/// ready to send to a device, tagged with the destination `source` if
/// known.
pub fn identity_request(source: Option<Source>) -> MidiMessage {
    MidiMessage::Sysex {
        source,
        data: IDENTITY_REQUEST.to_vec(),
    }
}

/// System realtime status bytes, handled outside [`decode`] since they
/// carry no channel and drive clock aggregation instead of dispatch.
pub mod realtime {
    pub const CLOCK: u8 = 0xF8;
    pub const START: u8 = 0xFA;
    pub const STOP: u8 = 0xFC;
    pub const SONG_POSITION: u8 = 0xF2;
}

/// 24 pulses-per-quarter-note MIDI clock aggregation into quarter-note
/// `Beat` events, with the beat period reported from inter-beat wall-clock
/// deltas (mirroring the tap-interval logic in `luminar_lib::tap_sync`,
/// but driven by a fixed pulse count rather than arbitrary tap events).
pub struct ClockAggregator {
    pulses_per_beat: u32,
    pulse_count: u32,
    ordinal: u64,
    last_beat_at: Option<Instant>,
}

impl ClockAggregator {
    const PPQ: u32 = 24;

    pub fn new() -> Self {
        Self {
            pulses_per_beat: Self::PPQ,
            pulse_count: 0,
            ordinal: 0,
            last_beat_at: None,
        }
    }

    /// Feed one realtime status byte. Returns a `Beat` message if this
    /// pulse landed on a quarter-note boundary, or if it was a STOP byte
    /// (which emits a synthetic beat).
    pub fn feed(&mut self, status: u8, source: Option<Source>, now: Instant) -> Option<MidiMessage> {
        match status {
            realtime::CLOCK => {
                self.pulse_count += 1;
                if self.pulse_count >= self.pulses_per_beat {
                    self.pulse_count = 0;
                    let period = self.last_beat_at.map(|prev| now.duration_since(prev));
                    self.last_beat_at = Some(now);
                    self.ordinal += 1;
                    Some(MidiMessage::Beat {
                        source,
                        ordinal: self.ordinal,
                        period,
                    })
                } else {
                    None
                }
            }
            realtime::START => {
                self.pulse_count = 0;
                self.ordinal = 0;
                self.last_beat_at = None;
                None
            }
            realtime::STOP => {
                self.pulse_count = 0;
                Some(MidiMessage::Beat {
                    source,
                    ordinal: self.ordinal,
                    period: Some(Duration::ZERO),
                })
            }
            realtime::SONG_POSITION => {
                // Updates the counter's phase without emitting a beat; we
                // have no sub-beat position to track beyond the pulse
                // count, so just reset it.
                self.pulse_count = 0;
                None
            }
            other => {
                debug!("Ignoring unhandled realtime status 0x{other:x}.");
                None
            }
        }
    }
}

impl Default for ClockAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decodes_note_on_and_off() {
        let msg = decode(&[0x90, 60, 100], None).unwrap();
        assert_eq!(
            msg,
            MidiMessage::NoteOn {
                source: None,
                channel: 0,
                pitch: 60,
                velocity: 100
            }
        );
        let msg = decode(&[0x80, 60, 0], None).unwrap();
        assert_eq!(
            msg,
            MidiMessage::NoteOff {
                source: None,
                channel: 0,
                pitch: 60,
                velocity: 0
            }
        );
    }

    #[test]
    fn note_on_with_zero_velocity_is_note_off() {
        let msg = decode(&[0x91, 64, 0], None).unwrap();
        assert_eq!(
            msg,
            MidiMessage::NoteOff {
                source: None,
                channel: 1,
                pitch: 64,
                velocity: 0
            }
        );
    }

    #[test]
    fn rejects_unrecognized_status() {
        assert!(decode(&[0xF6], None).is_err());
    }

    #[test]
    fn clock_aggregates_24_pulses_into_one_beat() {
        let mut clock = ClockAggregator::new();
        let start = Instant::now();
        let mut last = None;
        for i in 0..24 {
            last = clock.feed(realtime::CLOCK, None, start + Duration::from_millis(i));
        }
        assert!(matches!(last, Some(MidiMessage::Beat { ordinal: 1, .. })));
    }

    #[test]
    fn start_resets_pulse_counter() {
        let mut clock = ClockAggregator::new();
        let start = Instant::now();
        for i in 0..10 {
            clock.feed(realtime::CLOCK, None, start + Duration::from_millis(i));
        }
        clock.feed(realtime::START, None, start);
        let mut last = None;
        for i in 0..24 {
            last = clock.feed(realtime::CLOCK, None, start + Duration::from_millis(100 + i));
        }
        assert!(matches!(last, Some(MidiMessage::Beat { ordinal: 1, .. })));
    }

    #[test]
    fn stop_emits_synthetic_beat() {
        let mut clock = ClockAggregator::new();
        let msg = clock.feed(realtime::STOP, None, Instant::now());
        assert!(matches!(msg, Some(MidiMessage::Beat { .. })));
    }

    #[test]
    fn identity_request_wraps_the_universal_sysex_pattern() {
        let msg = identity_request(None);
        match msg {
            MidiMessage::Sysex { data, .. } => assert_eq!(data, IDENTITY_REQUEST.to_vec()),
            _ => panic!("expected Sysex"),
        }
    }
}
