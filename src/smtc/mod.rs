// Windows System Media Transport Controls (SMTC) integration
// Backs the foreground notification with the media overlay on Windows

#[cfg(windows)]
mod windows_smtc;

#[cfg(windows)]
pub use windows_smtc::*;

/// Button events from SMTC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtcButton {
    Play,
    Pause,
    Stop,
}

/// Playback status shown by the overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtcStatus {
    Playing,
    Paused,
    Stopped,
}

// Logging stand-in for non-Windows platforms
#[cfg(not(windows))]
mod stub {
    use super::{SmtcButton, SmtcStatus};
    use tracing::debug;

    pub struct SmtcManager;

    impl SmtcManager {
        pub fn new() -> Result<Self, String> {
            Ok(Self)
        }

        pub fn update_metadata(&self, title: &str, subtitle: Option<&str>) -> Result<(), String> {
            debug!(title, ?subtitle, "Media overlay metadata");
            Ok(())
        }

        pub fn set_playback_status(&self, status: SmtcStatus) -> Result<(), String> {
            debug!(?status, "Media overlay status");
            Ok(())
        }

        pub fn set_enabled(&self, enabled: bool) -> Result<(), String> {
            debug!(enabled, "Media overlay enabled");
            Ok(())
        }

        pub fn set_button_callback<F>(&self, _callback: F) -> Result<(), String>
        where
            F: Fn(SmtcButton) + Send + Sync + 'static,
        {
            Ok(())
        }
    }
}

#[cfg(not(windows))]
pub use stub::*;
