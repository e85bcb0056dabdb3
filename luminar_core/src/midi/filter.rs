//! Channel/note/velocity admission filtering, with note-off admitted
//! strictly in lockstep with the note-on that was (or wasn't) admitted
//! for the same pitch.
use super::message::MidiMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelFilter {
    Omni,
    Channel(u8),
}

/// A single counter per pitch tracking how many note-ons at that pitch
/// were rejected by the velocity filter and are still awaiting their
/// matching (also-to-be-rejected) note-off. Saturates at 127 rather than
/// overflowing on a pathological stream of unmatched note-ons.
#[derive(Debug, Default)]
struct PitchCounters {
    rejected: [u8; 128],
}

impl PitchCounters {
    fn note_on_rejected(&mut self, pitch: u8) {
        let slot = &mut self.rejected[pitch as usize];
        *slot = slot.saturating_add(1);
    }

    /// Returns true if this note-off should be suppressed (its matching
    /// note-on was rejected), decrementing the counter.
    fn note_off_should_suppress(&mut self, pitch: u8) -> bool {
        let slot = &mut self.rejected[pitch as usize];
        if *slot > 0 {
            *slot -= 1;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MidiFilterConfig {
    pub enabled: bool,
    pub channel: ChannelFilter,
    pub min_note: u8,
    pub note_range: u8,
    pub min_velocity: u8,
    pub velocity_range: u8,
}

impl Default for MidiFilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel: ChannelFilter::Omni,
            min_note: 0,
            note_range: 128,
            min_velocity: 0,
            velocity_range: 128,
        }
    }
}

pub struct MidiFilter {
    config: MidiFilterConfig,
    counters: PitchCounters,
}

impl MidiFilter {
    pub fn new(config: MidiFilterConfig) -> Self {
        Self {
            config,
            counters: PitchCounters::default(),
        }
    }

    pub fn config(&self) -> &MidiFilterConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: MidiFilterConfig) {
        self.config = config;
    }

    fn channel_matches(&self, channel: u8) -> bool {
        match self.config.channel {
            ChannelFilter::Omni => true,
            ChannelFilter::Channel(c) => c == channel,
        }
    }

    fn note_in_range(&self, pitch: u8) -> bool {
        pitch >= self.config.min_note
            && (pitch as u16) < self.config.min_note as u16 + self.config.note_range as u16
    }

    fn velocity_in_range(&self, velocity: u8) -> bool {
        velocity >= self.config.min_velocity
            && (velocity as u16) < self.config.min_velocity as u16 + self.config.velocity_range as u16
    }

    /// Decide whether `message` is admitted through this filter. Note-off
    /// messages are always admitted if their corresponding note-on was
    /// admitted; a note-off whose note-on was rejected by the velocity
    /// filter is itself suppressed, in lockstep.
    pub fn admit(&mut self, message: &MidiMessage) -> bool {
        if !self.config.enabled {
            return true;
        }
        match message {
            MidiMessage::NoteOn {
                channel,
                pitch,
                velocity,
                ..
            } => {
                if !self.channel_matches(*channel) || !self.note_in_range(*pitch) {
                    return false;
                }
                if !self.velocity_in_range(*velocity) {
                    self.counters.note_on_rejected(*pitch);
                    return false;
                }
                true
            }
            MidiMessage::NoteOff { channel, pitch, .. } => {
                if !self.channel_matches(*channel) || !self.note_in_range(*pitch) {
                    return false;
                }
                !self.counters.note_off_should_suppress(*pitch)
            }
            MidiMessage::ControlChange { channel, .. }
            | MidiMessage::ProgramChange { channel, .. }
            | MidiMessage::PitchBend { channel, .. }
            | MidiMessage::Aftertouch { channel, .. } => self.channel_matches(*channel),
            MidiMessage::Sysex { .. } | MidiMessage::Beat { .. } | MidiMessage::Panic { .. } => true,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn note_on(channel: u8, pitch: u8, velocity: u8) -> MidiMessage {
        MidiMessage::NoteOn {
            source: None,
            channel,
            pitch,
            velocity,
        }
    }
    fn note_off(channel: u8, pitch: u8) -> MidiMessage {
        MidiMessage::NoteOff {
            source: None,
            channel,
            pitch,
            velocity: 0,
        }
    }

    #[test]
    fn admits_note_on_and_matching_off_within_range() {
        let mut filter = MidiFilter::new(MidiFilterConfig {
            enabled: true,
            channel: ChannelFilter::Channel(0),
            min_note: 60,
            note_range: 1,
            min_velocity: 90,
            velocity_range: 10,
            ..MidiFilterConfig::default()
        });
        assert!(filter.admit(&note_on(0, 60, 100)));
        assert!(filter.admit(&note_off(0, 60)));
    }

    #[test]
    fn suppresses_note_off_when_note_on_was_velocity_rejected() {
        let mut filter = MidiFilter::new(MidiFilterConfig {
            enabled: true,
            channel: ChannelFilter::Channel(0),
            min_note: 60,
            note_range: 1,
            min_velocity: 110,
            velocity_range: 18,
            ..MidiFilterConfig::default()
        });
        assert!(!filter.admit(&note_on(0, 60, 100)));
        assert!(!filter.admit(&note_off(0, 60)));
        // A second, independent note-off at the same pitch (counter back
        // to zero) is admitted.
        assert!(filter.admit(&note_off(0, 60)));
    }

    #[test]
    fn fifo_per_pitch_across_interleaved_rejections() {
        let mut filter = MidiFilter::new(MidiFilterConfig {
            enabled: true,
            channel: ChannelFilter::Omni,
            min_note: 0,
            note_range: 128,
            min_velocity: 100,
            velocity_range: 28,
            ..MidiFilterConfig::default()
        });
        // Two rejected note-ons at the same pitch...
        assert!(!filter.admit(&note_on(0, 40, 10)));
        assert!(!filter.admit(&note_on(0, 40, 20)));
        // ...the next two note-offs at that pitch are also rejected.
        assert!(!filter.admit(&note_off(0, 40)));
        assert!(!filter.admit(&note_off(0, 40)));
        // Counter is back to zero: further note-offs are admitted.
        assert!(filter.admit(&note_off(0, 40)));
    }
}
