// Stream player
// One player instance plays one station connection. Preparation (HTTP
// connect, format probe, device open) runs on a dedicated decoder thread and
// reports back to the service event queue; the controller drives the rest.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{Builder, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::decoder::StreamDecoder;
use super::fetch::HttpStream;
use super::output::AudioOutput;
use super::resampler::StreamResampler;
use crate::error::{PlaybackError, Result};
use crate::events::{EventSender, PlayerEvent, PreparationId, ServiceEvent};
use crate::state::StreamSource;

/// Single-stream player owned by the controller
pub trait MediaPlayer: Send {
    /// Begin preparing the stream. Completion arrives as a `PlayerEvent` tagged with `id`.
    fn prepare_async(&mut self, id: PreparationId, events: EventSender);
    fn start(&mut self);
    fn pause(&mut self);
    fn set_volume(&mut self, volume: f32);
    /// Stop output and free the stream. Calling it again does nothing.
    fn release(&mut self);
}

pub trait PlayerFactory: Send + Sync {
    fn create(&self, source: &StreamSource) -> Box<dyn MediaPlayer>;
}

/// Builds players that fetch, decode and play over HTTP
pub struct StreamPlayerFactory;

impl PlayerFactory for StreamPlayerFactory {
    fn create(&self, source: &StreamSource) -> Box<dyn MediaPlayer> {
        Box::new(StreamPlayer::new(source.clone()))
    }
}

/// Shared between the controller side and the decoder thread
struct PlayerControl {
    volume: Mutex<f32>,
    playing: AtomicBool,
    cancel: CancellationToken,
}

pub struct StreamPlayer {
    source: StreamSource,
    control: Arc<PlayerControl>,
    worker: Option<JoinHandle<()>>,
    released: bool,
}

impl StreamPlayer {
    pub fn new(source: StreamSource) -> Self {
        Self {
            source,
            control: Arc::new(PlayerControl {
                volume: Mutex::new(1.0),
                playing: AtomicBool::new(false),
                cancel: CancellationToken::new(),
            }),
            worker: None,
            released: false,
        }
    }
}

impl MediaPlayer for StreamPlayer {
    fn prepare_async(&mut self, id: PreparationId, events: EventSender) {
        if self.worker.is_some() || self.released {
            warn!(id, "Player already prepared or released, ignoring prepare");
            return;
        }

        let builder = Builder::new().name("stream-decoder".to_string());
        self.worker = spawn_decoder(builder, self.source.clone(), self.control.clone(), id, events);
    }

    fn start(&mut self) {
        self.control.playing.store(true, Ordering::SeqCst);
    }

    fn pause(&mut self) {
        self.control.playing.store(false, Ordering::SeqCst);
    }

    fn set_volume(&mut self, volume: f32) {
        *self.control.volume.lock() = volume.clamp(0.0, 1.0);
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        // Closes the connection, which unblocks a decoder waiting on the
        // socket; the decoder then drops the output device itself.
        self.control.cancel.cancel();
        self.control.playing.store(false, Ordering::SeqCst);
        self.worker.take();
        debug!(url = self.source.as_str(), "Player released");
    }
}

impl Drop for StreamPlayer {
    fn drop(&mut self) {
        self.release();
    }
}

/// Everything between the socket and the speaker
struct Pipeline {
    decoder: StreamDecoder,
    resampler: StreamResampler,
    output: AudioOutput,
}

impl Pipeline {
    fn open(source: &StreamSource, cancel: &CancellationToken) -> Result<Self> {
        let body = HttpStream::open(source, cancel.clone())?;
        let mime_type = body.mime_type().map(str::to_string);

        let decoder = StreamDecoder::open(body, source.extension(), mime_type.as_deref())?;
        let output = AudioOutput::new()?;
        let resampler = StreamResampler::new(
            decoder.sample_rate(),
            output.sample_rate(),
            decoder.channels(),
            output.channels() as usize,
        )?;

        Ok(Self {
            decoder,
            resampler,
            output,
        })
    }

    /// Pump audio until the player is released or the stream breaks
    fn pump(mut self, control: &PlayerControl) -> Result<()> {
        let mut was_playing = false;

        loop {
            if control.cancel.is_cancelled() {
                return Ok(());
            }

            let playing = control.playing.load(Ordering::SeqCst);
            if was_playing && !playing {
                self.output.clear();
            }
            was_playing = playing;
            self.output.set_volume(*control.volume.lock());

            let samples = self
                .decoder
                .decode_next()?
                .ok_or_else(|| PlaybackError::Decode("Stream ended".to_string()))?;

            // Live radio: audio decoded while paused is dropped so resume is live
            if playing {
                let converted = self.resampler.process(&samples)?;
                self.output.write_blocking(&converted, &control.cancel);
            }
        }
    }
}

/// Start the decoder thread. A thread that cannot be started counts as a
/// failed preparation.
fn spawn_decoder(
    builder: Builder,
    source: StreamSource,
    control: Arc<PlayerControl>,
    id: PreparationId,
    events: EventSender,
) -> Option<JoinHandle<()>> {
    let failures = events.clone();
    match builder.spawn(move || run_stream(source, control, id, events)) {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(id, "Failed to spawn decoder thread: {}", e);
            let error = PlaybackError::preparation(format!("Failed to spawn decoder thread: {}", e));
            let _ = failures.send(ServiceEvent::Player(PlayerEvent::Failed(id, error)));
            None
        }
    }
}

fn run_stream(
    source: StreamSource,
    control: Arc<PlayerControl>,
    id: PreparationId,
    events: EventSender,
) {
    let report = |event: PlayerEvent| {
        if !control.cancel.is_cancelled() {
            let _ = events.send(ServiceEvent::Player(event));
        }
    };

    let pipeline = match Pipeline::open(&source, &control.cancel) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            report(PlayerEvent::Failed(id, e));
            return;
        }
    };

    info!(id, url = source.as_str(), "Stream prepared");
    report(PlayerEvent::Prepared(id));

    if let Err(e) = pipeline.pump(&control) {
        report(PlayerEvent::Failed(id, e));
    }
    debug!(id, "Decoder thread finished");
}
