// Typed messages flowing into and out of the playback service
use serde::Serialize;
use tokio::sync::mpsc;

use crate::commands::Command;
use crate::error::PlaybackError;
use crate::focus::FocusChange;

/// Identifies one preparation of the stream; events carrying a stale id are dropped
pub type PreparationId = u64;

/// Sender half of the service's serialized event queue
pub type EventSender = mpsc::UnboundedSender<ServiceEvent>;

/// Events sent from the service to the UI layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum UiEvent {
    /// Playback started, show the active artwork
    SetActive,
    /// Playback was torn down, show the inactive artwork
    SetInactive,
    /// Short-lived message for the user
    Notice { message: String },
    /// The notification was activated; bring the player UI forward
    ShowPlayer,
}

impl UiEvent {
    pub fn notice(message: impl Into<String>) -> Self {
        Self::Notice {
            message: message.into(),
        }
    }
}

/// Completion of an asynchronous stream preparation
#[derive(Debug)]
pub enum PlayerEvent {
    Prepared(PreparationId),
    Failed(PreparationId, PlaybackError),
}

impl PlayerEvent {
    pub fn id(&self) -> PreparationId {
        match self {
            PlayerEvent::Prepared(id) | PlayerEvent::Failed(id, _) => *id,
        }
    }
}

/// Everything the service event loop reacts to, in arrival order
#[derive(Debug)]
pub enum ServiceEvent {
    /// A start request from the UI, optionally naming an action
    StartCommand(Option<Command>),
    FocusChanged(FocusChange),
    /// The connectivity monitor observed a change; carries the probe result
    ConnectivityChanged { reachable: bool },
    Player(PlayerEvent),
    /// Host asked the service to shut down
    Destroy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ui_event_wire_names() {
        assert_eq!(
            serde_json::to_string(&UiEvent::SetActive).unwrap(),
            r#"{"command":"setActive"}"#
        );
        assert_eq!(
            serde_json::to_string(&UiEvent::SetInactive).unwrap(),
            r#"{"command":"setInactive"}"#
        );
        assert_eq!(
            serde_json::to_string(&UiEvent::notice("No Network Connection")).unwrap(),
            r#"{"command":"notice","message":"No Network Connection"}"#
        );
    }

    #[test]
    fn test_player_event_id() {
        assert_eq!(PlayerEvent::Prepared(7).id(), 7);
        assert_eq!(
            PlayerEvent::Failed(3, PlaybackError::preparation("x")).id(),
            3
        );
    }
}
