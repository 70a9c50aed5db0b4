// Windows SMTC implementation using windows-rs crate

use std::sync::{Arc, Mutex};
use windows::Foundation::TypedEventHandler;
use windows::Media::Playback::MediaPlayer;
use windows::Media::{
    MediaPlaybackStatus, MediaPlaybackType, SystemMediaTransportControls,
    SystemMediaTransportControlsButton, SystemMediaTransportControlsButtonPressedEventArgs,
};

use super::{SmtcButton, SmtcStatus};

type ButtonCallback = Arc<Mutex<Option<Box<dyn Fn(SmtcButton) + Send + Sync + 'static>>>>;

/// Manager for Windows System Media Transport Controls
pub struct SmtcManager {
    _media_player: MediaPlayer,
    smtc: SystemMediaTransportControls,
    button_callback: ButtonCallback,
}

impl SmtcManager {
    pub fn new() -> Result<Self, String> {
        // A MediaPlayer is the way to get at the SMTC from a desktop app
        let media_player = MediaPlayer::new()
            .map_err(|e| format!("Failed to create MediaPlayer: {}", e))?;

        // Manual mode: we drive the overlay ourselves
        media_player.CommandManager()
            .map_err(|e| format!("Failed to get CommandManager: {}", e))?
            .SetIsEnabled(false)
            .map_err(|e| format!("Failed to disable CommandManager: {}", e))?;

        let smtc = media_player.SystemMediaTransportControls()
            .map_err(|e| format!("Failed to get SMTC: {}", e))?;

        smtc.SetIsEnabled(true)
            .map_err(|e| format!("Failed to enable SMTC: {}", e))?;

        // A live station has nothing to skip to
        smtc.SetIsPlayEnabled(true)
            .map_err(|e| format!("Failed to enable play button: {}", e))?;
        smtc.SetIsPauseEnabled(true)
            .map_err(|e| format!("Failed to enable pause button: {}", e))?;
        smtc.SetIsStopEnabled(true)
            .map_err(|e| format!("Failed to enable stop button: {}", e))?;
        smtc.SetIsNextEnabled(false)
            .map_err(|e| format!("Failed to disable next button: {}", e))?;
        smtc.SetIsPreviousEnabled(false)
            .map_err(|e| format!("Failed to disable previous button: {}", e))?;

        let button_callback: ButtonCallback = Arc::new(Mutex::new(None));

        let callback_clone = button_callback.clone();
        let handler = TypedEventHandler::new(
            move |_sender: &Option<SystemMediaTransportControls>,
                  args: &Option<SystemMediaTransportControlsButtonPressedEventArgs>| {
                let button = args.as_ref().and_then(|args| args.Button().ok());
                let smtc_button = match button {
                    Some(SystemMediaTransportControlsButton::Play) => Some(SmtcButton::Play),
                    Some(SystemMediaTransportControlsButton::Pause) => Some(SmtcButton::Pause),
                    Some(SystemMediaTransportControlsButton::Stop) => Some(SmtcButton::Stop),
                    _ => None,
                };

                if let Some(btn) = smtc_button {
                    if let Ok(guard) = callback_clone.lock() {
                        if let Some(ref cb) = *guard {
                            cb(btn);
                        }
                    }
                }
                Ok(())
            },
        );

        smtc.ButtonPressed(&handler)
            .map_err(|e| format!("Failed to register button handler: {}", e))?;

        Ok(Self {
            _media_player: media_player,
            smtc,
            button_callback,
        })
    }

    /// Show the station in the overlay
    pub fn update_metadata(&self, title: &str, subtitle: Option<&str>) -> Result<(), String> {
        let updater = self.smtc.DisplayUpdater()
            .map_err(|e| format!("Failed to get display updater: {}", e))?;

        updater.SetType(MediaPlaybackType::Music)
            .map_err(|e| format!("Failed to set type: {}", e))?;

        let music_props = updater.MusicProperties()
            .map_err(|e| format!("Failed to get music properties: {}", e))?;

        music_props.SetTitle(&windows::core::HSTRING::from(title))
            .map_err(|e| format!("Failed to set title: {}", e))?;

        if let Some(subtitle) = subtitle {
            music_props.SetArtist(&windows::core::HSTRING::from(subtitle))
                .map_err(|e| format!("Failed to set artist: {}", e))?;
        }

        updater.Update()
            .map_err(|e| format!("Failed to update display: {}", e))
    }

    pub fn set_playback_status(&self, status: SmtcStatus) -> Result<(), String> {
        let status = match status {
            SmtcStatus::Playing => MediaPlaybackStatus::Playing,
            SmtcStatus::Paused => MediaPlaybackStatus::Paused,
            SmtcStatus::Stopped => MediaPlaybackStatus::Stopped,
        };

        self.smtc.SetPlaybackStatus(status)
            .map_err(|e| format!("Failed to set playback status: {}", e))
    }

    /// Hide or show the overlay
    pub fn set_enabled(&self, enabled: bool) -> Result<(), String> {
        if !enabled {
            self.set_playback_status(SmtcStatus::Stopped)?;
        }
        self.smtc.SetIsEnabled(enabled)
            .map_err(|e| format!("Failed to toggle SMTC: {}", e))
    }

    pub fn set_button_callback<F>(&self, callback: F) -> Result<(), String>
    where
        F: Fn(SmtcButton) + Send + Sync + 'static,
    {
        let mut guard = self.button_callback.lock()
            .map_err(|e| format!("Failed to lock callback: {}", e))?;
        *guard = Some(Box::new(callback));
        Ok(())
    }
}

// The WinRT objects are agile; the service moves the manager onto its own task
unsafe impl Send for SmtcManager {}
unsafe impl Sync for SmtcManager {}
