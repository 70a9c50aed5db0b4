// Settings management and persistence
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub const DEFAULT_STREAM_URL: &str = "https://audio-mp3.ibiblio.org/wxyc.mp3";

/// Station settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub url: String,
    pub station_name: String,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_STREAM_URL.to_string(),
            station_name: "WXYC Stream".to_string(),
        }
    }
}

/// Foreground notification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub channel_id: String,
    pub channel_name: String,
    pub foreground_id: u32,
    pub small_icon: String,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            channel_id: "AudioPlaybackChannel".to_string(),
            channel_name: "Music Player".to_string(),
            foreground_id: 1,
            small_icon: "music_note".to_string(),
        }
    }
}

/// Reachability probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivitySettings {
    pub probe_host: Option<String>, // Defaults to the stream host
    pub probe_port: Option<u16>,    // Defaults to the stream port
    pub probe_interval_ms: u64,
    pub probe_timeout_ms: u64,
}

impl Default for ConnectivitySettings {
    fn default() -> Self {
        Self {
            probe_host: None,
            probe_port: None,
            probe_interval_ms: 5000,
            probe_timeout_ms: 2000,
        }
    }
}

impl ConnectivitySettings {
    /// Poll period; never zero
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms.max(1))
    }
}

/// Playback settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    pub unmuted_volume: f32, // 0.0-1.0
    pub start_muted: bool,   // A start request without an action starts muted
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            unmuted_volume: 1.0,
            start_muted: true,
        }
    }
}

impl PlaybackSettings {
    pub fn volume(&self) -> f32 {
        if self.unmuted_volume.is_nan() {
            return 1.0;
        }
        self.unmuted_volume.clamp(0.0, 1.0)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub version: i32, // Settings schema version for future migrations
    pub stream: StreamSettings,
    pub notification: NotificationSettings,
    pub connectivity: ConnectivitySettings,
    pub playback: PlaybackSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            version: 1,
            stream: StreamSettings::default(),
            notification: NotificationSettings::default(),
            connectivity: ConnectivitySettings::default(),
            playback: PlaybackSettings::default(),
        }
    }
}

impl AppSettings {
    /// Get the settings file path
    pub fn get_settings_path(app_dir: &Path) -> PathBuf {
        app_dir.join("settings.json")
    }

    /// Load settings from file, or return defaults if file doesn't exist
    pub fn load(app_dir: &Path) -> Result<Self, String> {
        let path = Self::get_settings_path(app_dir);

        if !path.exists() {
            info!("No settings file found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read settings file: {}", e))?;

        let settings: AppSettings = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse settings: {}", e))?;

        info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to file
    pub fn save(&self, app_dir: &Path) -> Result<(), String> {
        // Ensure directory exists
        fs::create_dir_all(app_dir)
            .map_err(|e| format!("Failed to create settings directory: {}", e))?;

        let path = Self::get_settings_path(app_dir);
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        fs::write(&path, content)
            .map_err(|e| format!("Failed to write settings file: {}", e))?;

        info!("Saved settings to {:?}", path);
        Ok(())
    }
}
