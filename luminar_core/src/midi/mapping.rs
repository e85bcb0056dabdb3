//! Polymorphic MIDI-to-parameter mappings: note-triggered and
//! continuous-controller-driven, dispatched against shared atomic
//! parameter handles.
use augmented_atomics::AtomicF32;
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::message::MidiMessage;
use crate::error::ContractViolation;

/// The parameter a mapping drives, polymorphic over the three shapes the
/// spec names. Each variant wraps a handle shared with the owning
/// component so the mapping can mutate it without locking.
#[derive(Clone)]
pub enum ParameterTarget {
    Boolean(Arc<AtomicBool>),
    /// A clamped index in `0..=max`.
    Discrete { value: Arc<AtomicUsize>, max: usize },
    Normalized(Arc<AtomicF32>),
}

impl ParameterTarget {
    fn require_parent(&self) -> Result<(), ContractViolation> {
        // `Arc` strong_count == 0 can't happen for a live handle; the
        // contract this guards is a handle constructed with no owner at
        // all, represented here by a discrete target with `max == 0`
        // (no valid index exists to map onto).
        if let ParameterTarget::Discrete { max, .. } = self {
            if *max == 0 {
                return Err(ContractViolation::OrphanParameter);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteMode {
    Toggle,
    Momentary,
    On,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscreteNoteMode {
    Increment,
    Decrement,
    Fixed(usize),
    Random,
}

pub enum NoteAction {
    Bool(NoteMode),
    Discrete(DiscreteNoteMode),
    /// Normalized-continuous targets driven by a note mapping toggle
    /// between two fixed values using the same boolean-style modes.
    NormalizedToggle {
        mode: NoteMode,
        on_value: f32,
        off_value: f32,
    },
}

pub struct NoteMapping {
    pub channel: u8,
    pub pitch: u8,
    target: ParameterTarget,
    action: NoteAction,
    /// Runtime-only toggle state for `NoteMode::Toggle`; not persisted
    /// across mapping reconstruction.
    toggle_state: bool,
}

impl NoteMapping {
    pub fn new(
        channel: u8,
        pitch: u8,
        target: ParameterTarget,
        action: NoteAction,
    ) -> Result<Self, ContractViolation> {
        target.require_parent()?;
        Ok(Self {
            channel,
            pitch,
            target,
            action,
            toggle_state: false,
        })
    }

    pub fn matches(&self, message: &MidiMessage) -> bool {
        match message {
            MidiMessage::NoteOn { channel, pitch, .. }
            | MidiMessage::NoteOff { channel, pitch, .. } => {
                *channel == self.channel && *pitch == self.pitch
            }
            _ => false,
        }
    }

    pub fn apply(&mut self, message: &MidiMessage) {
        let is_on = matches!(message, MidiMessage::NoteOn { .. });
        match (&self.target, &self.action) {
            (ParameterTarget::Boolean(handle), NoteAction::Bool(mode)) => {
                let value = match mode {
                    NoteMode::Momentary => is_on,
                    NoteMode::Toggle => {
                        if is_on {
                            self.toggle_state = !self.toggle_state;
                        }
                        self.toggle_state
                    }
                    NoteMode::On => is_on || handle.load(Ordering::SeqCst),
                    NoteMode::Off => false,
                };
                if matches!(mode, NoteMode::Momentary) || is_on {
                    handle.store(value, Ordering::SeqCst);
                }
            }
            (ParameterTarget::Discrete { value, max }, NoteAction::Discrete(mode)) => {
                if !is_on {
                    return;
                }
                let current = value.load(Ordering::SeqCst);
                let next = match mode {
                    DiscreteNoteMode::Increment => (current + 1).min(*max),
                    DiscreteNoteMode::Decrement => current.saturating_sub(1),
                    DiscreteNoteMode::Fixed(v) => (*v).min(*max),
                    DiscreteNoteMode::Random => rand::thread_rng().gen_range(0..=*max),
                };
                value.store(next, Ordering::SeqCst);
            }
            (
                ParameterTarget::Normalized(handle),
                NoteAction::NormalizedToggle {
                    mode,
                    on_value,
                    off_value,
                },
            ) => {
                let value = match mode {
                    NoteMode::Momentary => {
                        if is_on {
                            *on_value
                        } else {
                            *off_value
                        }
                    }
                    NoteMode::Toggle => {
                        if is_on {
                            self.toggle_state = !self.toggle_state;
                        }
                        if self.toggle_state {
                            *on_value
                        } else {
                            *off_value
                        }
                    }
                    NoteMode::On => *on_value,
                    NoteMode::Off => *off_value,
                };
                if matches!(mode, NoteMode::Momentary) || is_on {
                    handle.set(value);
                }
            }
            _ => (),
        }
    }
}

fn lerp(min: f64, max: f64, n: f64) -> f64 {
    min + (max - min) * n
}

/// Groups consecutive CC updates to the same mapping arriving within
/// `COALESCE_WINDOW` into one logical action, so a controller's fader
/// sweep doesn't flood an undo history with one entry per message.
pub struct CoalescingWindow {
    last_update: Option<Instant>,
}

impl CoalescingWindow {
    const WINDOW: Duration = Duration::from_secs(1);

    pub fn new() -> Self {
        Self { last_update: None }
    }

    /// Record an update at `now`, returning `true` if it starts a new
    /// coalesced action (the window since the last update had elapsed).
    pub fn record(&mut self, now: Instant) -> bool {
        let starts_new = match self.last_update {
            Some(prev) => now.duration_since(prev) > Self::WINDOW,
            None => true,
        };
        self.last_update = Some(now);
        starts_new
    }
}

impl Default for CoalescingWindow {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CcMapping {
    pub channel: u8,
    pub cc: u8,
    target: ParameterTarget,
    min_norm: f64,
    max_norm: f64,
    coalescing: CoalescingWindow,
}

impl CcMapping {
    pub fn new(
        channel: u8,
        cc: u8,
        target: ParameterTarget,
        min_norm: f64,
        max_norm: f64,
    ) -> Result<Self, ContractViolation> {
        target.require_parent()?;
        Ok(Self {
            channel,
            cc,
            target,
            min_norm,
            max_norm,
            coalescing: CoalescingWindow::new(),
        })
    }

    pub fn matches(&self, message: &MidiMessage) -> bool {
        matches!(
            message,
            MidiMessage::ControlChange { channel, cc, .. }
                if *channel == self.channel && *cc == self.cc
        )
    }

    /// Apply a CC message at wall-clock time `now`, returning whether this
    /// update starts a new coalesced undo action.
    pub fn apply(&mut self, message: &MidiMessage, now: Instant) -> bool {
        let MidiMessage::ControlChange { value, .. } = message else {
            return false;
        };
        let n = *value as f64 / 127.0;
        match &self.target {
            ParameterTarget::Normalized(handle) => {
                let output = lerp(self.min_norm, self.max_norm, n);
                handle.set(output as f32);
            }
            ParameterTarget::Boolean(handle) => {
                let (lo, hi) = if self.min_norm <= self.max_norm {
                    (self.min_norm, self.max_norm)
                } else {
                    (self.max_norm, self.min_norm)
                };
                handle.store(n >= lo && n <= hi, Ordering::SeqCst);
            }
            ParameterTarget::Discrete { value: handle, max } => {
                let index = (self.min_norm + (self.max_norm - self.min_norm + 1.0) * n)
                    .clamp(0.0, *max as f64) as usize;
                handle.store(index.min(*max), Ordering::SeqCst);
            }
        }
        self.coalescing.record(now)
    }
}

pub enum MidiMapping {
    Note(NoteMapping),
    Cc(CcMapping),
}

impl MidiMapping {
    pub fn matches(&self, message: &MidiMessage) -> bool {
        match self {
            MidiMapping::Note(m) => m.matches(message),
            MidiMapping::Cc(m) => m.matches(message),
        }
    }

    /// Apply a matching message, returning whether this starts a new
    /// coalesced action. Note mappings have no coalescing window — each
    /// application is its own action, so this always returns `true` for
    /// them; CC mappings defer to `CcMapping::apply`'s 1-s window.
    pub fn apply(&mut self, message: &MidiMessage, now: Instant) -> bool {
        match self {
            MidiMapping::Note(m) => {
                m.apply(message);
                true
            }
            MidiMapping::Cc(m) => m.apply(message, now),
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
    fn cc(channel: u8, num: u8, value: u8) -> MidiMessage {
        MidiMessage::ControlChange {
            source: None,
            channel,
            cc: num,
            value,
        }
    }

    #[test]
    fn momentary_boolean_tracks_note_state() {
        let handle = Arc::new(AtomicBool::new(false));
        let mut mapping = NoteMapping::new(
            0,
            60,
            ParameterTarget::Boolean(handle.clone()),
            NoteAction::Bool(NoteMode::Momentary),
        )
        .unwrap();
        mapping.apply(&note_on(0, 60, 100));
        assert!(handle.load(Ordering::SeqCst));
        mapping.apply(&note_off(0, 60));
        assert!(!handle.load(Ordering::SeqCst));
    }

    #[test]
    fn toggle_boolean_flips_only_on_note_on() {
        let handle = Arc::new(AtomicBool::new(false));
        let mut mapping = NoteMapping::new(
            0,
            60,
            ParameterTarget::Boolean(handle.clone()),
            NoteAction::Bool(NoteMode::Toggle),
        )
        .unwrap();
        mapping.apply(&note_on(0, 60, 100));
        assert!(handle.load(Ordering::SeqCst));
        mapping.apply(&note_off(0, 60));
        assert!(handle.load(Ordering::SeqCst));
        mapping.apply(&note_on(0, 60, 100));
        assert!(!handle.load(Ordering::SeqCst));
    }

    #[test]
    fn discrete_increment_clamps_at_max() {
        let handle = Arc::new(AtomicUsize::new(0));
        let mut mapping = NoteMapping::new(
            0,
            10,
            ParameterTarget::Discrete {
                value: handle.clone(),
                max: 2,
            },
            NoteAction::Discrete(DiscreteNoteMode::Increment),
        )
        .unwrap();
        for _ in 0..5 {
            mapping.apply(&note_on(0, 10, 100));
        }
        assert_eq!(handle.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cc_lerp_maps_into_normalized_range() {
        let handle = Arc::new(AtomicF32::new(0.0));
        let mut mapping =
            CcMapping::new(0, 7, ParameterTarget::Normalized(handle.clone()), 0.0, 1.0).unwrap();
        mapping.apply(&cc(0, 7, 127), Instant::now());
        assert!((handle.get() - 1.0).abs() < 1e-4);
        mapping.apply(&cc(0, 7, 0), Instant::now());
        assert!((handle.get() - 0.0).abs() < 1e-4);
    }

    #[test]
    fn cc_inverts_when_min_exceeds_max() {
        let handle = Arc::new(AtomicF32::new(0.0));
        let mut mapping =
            CcMapping::new(0, 7, ParameterTarget::Normalized(handle.clone()), 1.0, 0.0).unwrap();
        mapping.apply(&cc(0, 7, 127), Instant::now());
        assert!((handle.get() - 0.0).abs() < 1e-4);
        mapping.apply(&cc(0, 7, 0), Instant::now());
        assert!((handle.get() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn coalescing_window_starts_new_action_after_gap() {
        let mut window = CoalescingWindow::new();
        let t0 = Instant::now();
        assert!(window.record(t0));
        assert!(!window.record(t0 + Duration::from_millis(100)));
        assert!(window.record(t0 + Duration::from_secs(2)));
    }

    #[test]
    fn orphan_discrete_target_is_rejected_at_construction() {
        let handle = Arc::new(AtomicUsize::new(0));
        let result = NoteMapping::new(
            0,
            10,
            ParameterTarget::Discrete {
                value: handle,
                max: 0,
            },
            NoteAction::Discrete(DiscreteNoteMode::Increment),
        );
        assert!(result.is_err());
    }
}
