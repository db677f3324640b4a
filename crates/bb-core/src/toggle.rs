//! Profile page block toggle

use crate::types::{ToggleState, Verdict};

/// Block/unblock button state for the subject a profile page shows.
#[derive(Debug, Clone)]
pub struct SubjectToggle {
    subject: String,
    state: ToggleState,
}

impl SubjectToggle {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            state: ToggleState::Hidden,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn state(&self) -> ToggleState {
        self.state
    }

    /// Service has not answered for the subject yet.
    pub fn is_unresolved(&self) -> bool {
        self.state == ToggleState::Hidden
    }

    /// Apply a verdict for `id`. Returns `true` if the rendered state changed.
    pub fn apply(&mut self, id: &str, verdict: Verdict) -> bool {
        if id != self.subject {
            return false;
        }
        let next = match verdict {
            Verdict::Blocked => ToggleState::Blocked,
            Verdict::NotBlocked => ToggleState::NotBlocked,
        };
        let changed = next != self.state;
        self.state = next;
        changed
    }
}
