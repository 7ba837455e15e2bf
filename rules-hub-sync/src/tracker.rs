//! One-shot dirty flag for an editing surface

/// Tracks whether the editor content changed since load
///
/// The first change event is load noise and is ignored. The next one marks
/// the session dirty and stops listening.
#[derive(Debug, Clone, Default)]
pub struct DirtyTracker {
    primed: bool,
    dirty: bool,
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one change event; returns true when it made the session dirty
    pub fn on_change(&mut self) -> bool {
        if self.dirty {
            return false;
        }
        if !self.primed {
            self.primed = true;
            return false;
        }
        self.dirty = true;
        true
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_listening(&self) -> bool {
        !self.dirty
    }

    /// Start over after a save; the editor reloads and emits load noise again
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
