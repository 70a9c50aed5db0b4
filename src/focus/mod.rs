// Audio focus negotiation
// Tracks whether this player may be audible and what the player should do
// when the host takes focus away or hands it back.

use std::sync::Arc;
use tracing::debug;

use crate::error::{PlaybackError, Result};

/// Focus change reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusChange {
    /// Focus returned after a transient loss
    Gain,
    /// Another source is briefly audible (a call, a notification sound)
    LossTransient,
    /// Another player took over for good
    Loss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FocusState {
    #[default]
    Unfocused,
    Focused,
    TransientlyLost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusRequestResult {
    Granted,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioUsage {
    Media,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioContentType {
    Music,
}

/// Describes the audio we want focus for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioAttributes {
    pub usage: AudioUsage,
    pub content_type: AudioContentType,
}

impl Default for AudioAttributes {
    fn default() -> Self {
        Self {
            usage: AudioUsage::Media,
            content_type: AudioContentType::Music,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FocusRequest {
    pub attributes: AudioAttributes,
}

/// Host-side audio focus arbiter
pub trait AudioFocus: Send + Sync {
    fn request_focus(&self, request: &FocusRequest) -> FocusRequestResult;
    fn abandon_focus(&self, request: &FocusRequest);
}

/// Desktop mixers do not arbitrate between applications, so every request is granted
pub struct DesktopAudioFocus;

impl AudioFocus for DesktopAudioFocus {
    fn request_focus(&self, request: &FocusRequest) -> FocusRequestResult {
        debug!(attributes = ?request.attributes, "Audio focus granted");
        FocusRequestResult::Granted
    }

    fn abandon_focus(&self, _request: &FocusRequest) {
        debug!("Audio focus abandoned");
    }
}

/// Opaque token for a focus grant. Only the tracker holds one.
#[derive(Debug, PartialEq, Eq)]
pub struct FocusHandle {
    grant: u64,
}

/// What the player has to do after a focus change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusAction {
    Ignore,
    Pause,
    Resume,
    Teardown,
}

pub struct FocusTracker {
    focus: Arc<dyn AudioFocus>,
    request: FocusRequest,
    state: FocusState,
    handle: Option<FocusHandle>,
    grants: u64,
}

impl FocusTracker {
    pub fn new(focus: Arc<dyn AudioFocus>) -> Self {
        Self {
            focus,
            request: FocusRequest::default(),
            state: FocusState::Unfocused,
            handle: None,
            grants: 0,
        }
    }

    pub fn state(&self) -> FocusState {
        self.state
    }

    pub fn is_held(&self) -> bool {
        self.handle.is_some()
    }

    /// Ask the host for focus. Holding a handle already counts as success.
    pub fn acquire(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }

        match self.focus.request_focus(&self.request) {
            FocusRequestResult::Granted => {
                self.grants += 1;
                self.handle = Some(FocusHandle { grant: self.grants });
                self.state = FocusState::Focused;
                debug!(grant = self.grants, "Focus acquired");
                Ok(())
            }
            FocusRequestResult::Denied => {
                debug!("Focus request denied");
                Err(PlaybackError::FocusDenied)
            }
        }
    }

    /// Give focus back to the host. Returns false when nothing was held.
    pub fn release(&mut self) -> bool {
        self.state = FocusState::Unfocused;
        match self.handle.take() {
            Some(handle) => {
                self.focus.abandon_focus(&self.request);
                debug!(grant = handle.grant, "Focus released");
                true
            }
            None => false,
        }
    }

    pub fn on_change(&mut self, change: FocusChange) -> FocusAction {
        let action = match (self.state, change) {
            (FocusState::Unfocused, _) => FocusAction::Ignore,
            (FocusState::Focused, FocusChange::LossTransient) => {
                self.state = FocusState::TransientlyLost;
                FocusAction::Pause
            }
            (FocusState::TransientlyLost, FocusChange::Gain) => {
                self.state = FocusState::Focused;
                FocusAction::Resume
            }
            (_, FocusChange::Loss) => {
                self.release();
                FocusAction::Teardown
            }
            (FocusState::Focused, FocusChange::Gain)
            | (FocusState::TransientlyLost, FocusChange::LossTransient) => FocusAction::Ignore,
        };

        debug!(?change, state = ?self.state, ?action, "Focus change handled");
        action
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Scriptable focus arbiter for tests
    #[derive(Default)]
    pub struct FakeFocus {
        pub deny: AtomicBool,
        pub requests: AtomicUsize,
        pub abandons: AtomicUsize,
    }

    impl FakeFocus {
        pub fn denying() -> Self {
            let focus = Self::default();
            focus.deny.store(true, Ordering::SeqCst);
            focus
        }

        pub fn set_deny(&self, deny: bool) {
            self.deny.store(deny, Ordering::SeqCst);
        }

        pub fn abandon_count(&self) -> usize {
            self.abandons.load(Ordering::SeqCst)
        }
    }

    impl AudioFocus for FakeFocus {
        fn request_focus(&self, _request: &FocusRequest) -> FocusRequestResult {
            self.requests.fetch_add(1, Ordering::SeqCst);
            if self.deny.load(Ordering::SeqCst) {
                FocusRequestResult::Denied
            } else {
                FocusRequestResult::Granted
            }
        }

        fn abandon_focus(&self, _request: &FocusRequest) {
            self.abandons.fetch_add(1, Ordering::SeqCst);
        }
    }
}
