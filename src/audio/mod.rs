// Audio playback module
// Fetches the station over HTTP, decodes with Symphonia, resamples with
// rubato and plays through cpal

pub mod decoder;
pub mod fetch;
pub mod output;
pub mod player;
pub mod resampler;

pub use player::{MediaPlayer, PlayerFactory, StreamPlayer, StreamPlayerFactory};
