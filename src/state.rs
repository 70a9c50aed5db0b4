// Application state management
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use url::Url;

use crate::error::Result;
use crate::events::{EventSender, ServiceEvent, UiEvent};

/// Playback flags read by the UI. Only the controller writes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub is_playing: bool,
    pub is_preparing: bool,
    pub is_muted: bool,
    pub has_connection: bool,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            is_playing: false,
            is_preparing: false,
            is_muted: false,
            has_connection: true,
        }
    }
}

/// The station URL. Set once when the service is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSource {
    url: Url,
}

impl StreamSource {
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self {
            url: Url::parse(url)?,
        })
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn host(&self) -> Option<&str> {
        self.url.host_str()
    }

    pub fn port(&self) -> Option<u16> {
        self.url.port_or_known_default()
    }

    /// File extension of the stream path, used as a decoder hint
    pub fn extension(&self) -> Option<&str> {
        self.url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty())
    }
}

/// UI-side handle to a running playback service
#[derive(Clone)]
pub struct AppState {
    events: EventSender,
    state: watch::Receiver<PlaybackState>,
    ui: broadcast::Sender<UiEvent>,
}

impl AppState {
    pub fn new(
        events: EventSender,
        state: watch::Receiver<PlaybackState>,
        ui: broadcast::Sender<UiEvent>,
    ) -> Self {
        Self { events, state, ui }
    }

    pub fn player_state(&self) -> PlaybackState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<PlaybackState> {
        self.state.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.ui.subscribe()
    }

    pub(crate) fn send(&self, event: ServiceEvent) -> std::result::Result<(), String> {
        self.events
            .send(event)
            .map_err(|_| "Playback service is not running".to_string())
    }
}
