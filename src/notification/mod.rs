// Foreground notification shown while the service is playing
// The notification itself is plain data built from settings and state;
// presenters decide how the host displays it.

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::events::UiEvent;
use crate::settings::NotificationSettings;
use crate::smtc::{SmtcButton, SmtcManager, SmtcStatus};
use crate::state::PlaybackState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Importance {
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Low,
}

/// What happens when the user activates the notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentAction {
    OpenPlayer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationChannel {
    pub id: String,
    pub name: String,
    pub importance: Importance,
    pub sound: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: u32,
    pub channel: NotificationChannel,
    pub title: Option<String>,
    pub text: Option<String>,
    pub small_icon: String,
    pub priority: Priority,
    pub silent: bool,
    pub content_action: ContentAction,
    pub playing: bool,
}

/// Minimal, silent, low-priority notification that opens the player when tapped
pub fn build_notification(settings: &NotificationSettings, state: &PlaybackState) -> Notification {
    Notification {
        id: settings.foreground_id,
        channel: NotificationChannel {
            id: settings.channel_id.clone(),
            name: settings.channel_name.clone(),
            importance: Importance::Low,
            sound: None,
        },
        title: None,
        text: None,
        small_icon: settings.small_icon.clone(),
        priority: Priority::Low,
        silent: true,
        content_action: ContentAction::OpenPlayer,
        playing: state.is_playing,
    }
}

pub trait NotificationPresenter: Send {
    /// Show the notification, or update it if it is already showing
    fn start_foreground(&mut self, notification: &Notification);
    fn stop_foreground(&mut self);
}

/// Presents the notification through the system media overlay
pub struct SystemMediaPresenter {
    station_name: String,
    ui: broadcast::Sender<UiEvent>,
    manager: Option<SmtcManager>,
}

impl SystemMediaPresenter {
    pub fn new(station_name: impl Into<String>, ui: broadcast::Sender<UiEvent>) -> Self {
        Self {
            station_name: station_name.into(),
            ui,
            manager: None,
        }
    }

    fn manager(&mut self) -> Option<&SmtcManager> {
        if self.manager.is_none() {
            match SmtcManager::new() {
                Ok(manager) => {
                    let ui = self.ui.clone();
                    let registered = manager.set_button_callback(move |button: SmtcButton| {
                        debug!(?button, "Media overlay activated");
                        let _ = ui.send(UiEvent::ShowPlayer);
                    });
                    if let Err(e) = registered {
                        warn!("Failed to register media overlay callback: {}", e);
                    }
                    self.manager = Some(manager);
                }
                Err(e) => {
                    warn!("Media overlay unavailable: {}", e);
                    return None;
                }
            }
        }
        self.manager.as_ref()
    }
}

impl NotificationPresenter for SystemMediaPresenter {
    fn start_foreground(&mut self, notification: &Notification) {
        let title = notification
            .title
            .clone()
            .unwrap_or_else(|| self.station_name.clone());
        let status = if notification.playing {
            SmtcStatus::Playing
        } else {
            SmtcStatus::Paused
        };

        let Some(manager) = self.manager() else {
            return;
        };
        let shown = manager
            .update_metadata(&title, notification.text.as_deref())
            .and_then(|_| manager.set_playback_status(status));
        if let Err(e) = shown {
            warn!("Failed to update media overlay: {}", e);
        }
    }

    fn stop_foreground(&mut self) {
        if let Some(manager) = self.manager.take() {
            if let Err(e) = manager.set_enabled(false) {
                warn!("Failed to hide media overlay: {}", e);
            }
            info!("Left foreground");
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Keeps every notification it was asked to show
    #[derive(Clone, Default)]
    pub struct RecordingPresenter {
        pub shown: Arc<Mutex<Vec<Notification>>>,
        pub dismissed: Arc<Mutex<usize>>,
    }

    impl NotificationPresenter for RecordingPresenter {
        fn start_foreground(&mut self, notification: &Notification) {
            self.shown.lock().push(notification.clone());
        }

        fn stop_foreground(&mut self) {
            *self.dismissed.lock() += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_is_minimal_and_silent() {
        let notification =
            build_notification(&NotificationSettings::default(), &PlaybackState::default());

        assert_eq!(notification.id, 1);
        assert_eq!(notification.channel.id, "AudioPlaybackChannel");
        assert_eq!(notification.channel.name, "Music Player");
        assert_eq!(notification.channel.importance, Importance::Low);
        assert_eq!(notification.channel.sound, None);
        assert_eq!(notification.title, None);
        assert_eq!(notification.text, None);
        assert_eq!(notification.small_icon, "music_note");
        assert_eq!(notification.priority, Priority::Low);
        assert!(notification.silent);
        assert_eq!(notification.content_action, ContentAction::OpenPlayer);
    }

    #[test]
    fn test_notification_follows_playing_flag() {
        let state = PlaybackState {
            is_playing: true,
            ..PlaybackState::default()
        };
        let notification = build_notification(&NotificationSettings::default(), &state);
        assert!(notification.playing);
    }

    #[test]
    fn test_notification_uses_configured_channel() {
        let settings = NotificationSettings {
            channel_id: "radio".to_string(),
            foreground_id: 7,
            ..NotificationSettings::default()
        };
        let notification = build_notification(&settings, &PlaybackState::default());
        assert_eq!(notification.channel.id, "radio");
        assert_eq!(notification.id, 7);
    }
}
