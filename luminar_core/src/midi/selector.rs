//! Persistent (name, index) references to MIDI terminals that re-resolve
//! as the terminal set changes, surviving disconnect/reconnect.
use super::message::{DeviceId, Source};

/// A terminal reference a `MidiSelector` can bind to: either a concrete
/// device port or a virtual endpoint this process created.
///
/// `device_id` is the "exact handle identity" (stable across
/// re-enumeration, opaque, backend-specific -- see
/// `message::DeviceId`); `name`/`index` are the display identity used
/// for `(name, index)` lookup when the handle identity can't be matched
/// (e.g. after a full disconnect/reconnect cycle that issues a new
/// handle). Equality compares `device_id` only, so a terminal whose
/// display position shifts between enumerations is still recognized as
/// the same terminal.
#[derive(Debug, Clone)]
pub struct Terminal {
    pub device_id: DeviceId,
    pub name: String,
    pub index: usize,
}

impl PartialEq for Terminal {
    fn eq(&self, other: &Self) -> bool {
        self.device_id == other.device_id
    }
}
impl Eq for Terminal {}

impl Terminal {
    pub fn source(&self) -> Source {
        Source::Hardware(self.device_id.clone())
    }
}

/// Persists `{name, index}` and re-resolves against the current terminal
/// set whenever it changes. If the previously bound terminal's exact
/// handle identity (`device_id`) is still present, it's retained (and
/// refreshed to the new snapshot's name/index, which may have shifted);
/// otherwise the selector falls back to looking up by `(name, index)`
/// among the new set, and if nothing matches, flags `missing_device`
/// while preserving the saved identity for a future re-resolution.
#[derive(Debug, Clone)]
pub struct MidiSelector {
    name: String,
    index: usize,
    terminal: Option<Terminal>,
    missing_device: bool,
}

impl MidiSelector {
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
            terminal: None,
            missing_device: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn terminal(&self) -> Option<&Terminal> {
        self.terminal.as_ref()
    }

    pub fn missing_device(&self) -> bool {
        self.missing_device
    }

    /// Re-resolve against a new terminal snapshot. First tries the bound
    /// terminal's exact handle identity (`device_id`); if that's no
    /// longer present, falls back to a `(name, index)` scan; if neither
    /// matches, marks missing and keeps the saved `(name, index)` so a
    /// later appearance re-binds.
    pub fn resolve(&mut self, terminals: &[Terminal]) {
        if let Some(bound) = &self.terminal {
            if let Some(refreshed) = terminals.iter().find(|t| t.device_id == bound.device_id) {
                self.terminal = Some(refreshed.clone());
                self.missing_device = false;
                return;
            }
        }
        match terminals
            .iter()
            .find(|t| t.name == self.name && t.index == self.index)
        {
            Some(found) => {
                self.terminal = Some(found.clone());
                self.missing_device = false;
            }
            None => {
                self.terminal = None;
                self.missing_device = true;
            }
        }
    }
}
