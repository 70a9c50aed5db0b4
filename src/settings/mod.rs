// Settings module
// Station, notification and connectivity configuration persisted as JSON

mod settings;

pub use settings::{
    AppSettings, ConnectivitySettings, NotificationSettings, PlaybackSettings, StreamSettings,
    DEFAULT_STREAM_URL,
};
