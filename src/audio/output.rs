// Audio output using cpal
// Handles cross-platform audio output with a ring buffer. The cpal stream is
// not Send on every platform, so an AudioOutput lives and dies on the thread
// that created it.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use parking_lot::Mutex;
use ringbuf::{HeapRb, traits::{Consumer, Producer, Split}};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::{PlaybackError, Result};

const RING_BUFFER_SIZE: usize = 48000 * 2 / 4; // ~250ms of stereo audio at 48kHz

type RingProducer = ringbuf::HeapProd<f32>;
type RingConsumer = ringbuf::HeapCons<f32>;

pub struct AudioOutput {
    _stream: Stream,
    producer: RingProducer,
    sample_rate: u32,
    channels: u16,
    volume: Arc<Mutex<f32>>,
    clear_flag: Arc<AtomicBool>,
}

impl AudioOutput {
    /// Open the default output device and start it (silent until samples arrive)
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host.default_output_device()
            .ok_or_else(|| PlaybackError::Output("No output device available".to_string()))?;

        let config = device.default_output_config()
            .map_err(|e| PlaybackError::Output(format!("Failed to get default output config: {}", e)))?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels();

        let rb = HeapRb::<f32>::new(RING_BUFFER_SIZE);
        let (producer, consumer) = rb.split();
        let consumer = Arc::new(Mutex::new(consumer));

        let volume = Arc::new(Mutex::new(1.0f32));
        let clear_flag = Arc::new(AtomicBool::new(false));

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &config.into(), consumer, volume.clone(), clear_flag.clone())?
            }
            cpal::SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &config.into(), consumer, volume.clone(), clear_flag.clone())?
            }
            cpal::SampleFormat::U16 => {
                Self::build_stream::<u16>(&device, &config.into(), consumer, volume.clone(), clear_flag.clone())?
            }
            format => {
                return Err(PlaybackError::Output(format!("Unsupported sample format: {:?}", format)))
            }
        };

        stream.play()
            .map_err(|e| PlaybackError::Output(format!("Failed to start stream: {}", e)))?;

        debug!(sample_rate, channels, "Audio output opened");

        Ok(Self {
            _stream: stream,
            producer,
            sample_rate,
            channels,
            volume,
            clear_flag,
        })
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &cpal::Device,
        config: &StreamConfig,
        consumer: Arc<Mutex<RingConsumer>>,
        volume: Arc<Mutex<f32>>,
        clear_flag: Arc<AtomicBool>,
    ) -> Result<Stream> {
        device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut consumer = consumer.lock();
                let vol = *volume.lock();

                // Drop whatever is buffered so a pause takes effect immediately
                if clear_flag.swap(false, Ordering::SeqCst) {
                    consumer.clear();
                }

                for sample in data.iter_mut() {
                    let value = consumer.try_pop().unwrap_or(0.0) * vol;
                    *sample = T::from_sample(value);
                }
            },
            move |err| {
                error!("Audio output error: {}", err);
            },
            None,
        ).map_err(|e| PlaybackError::Output(format!("Failed to build output stream: {}", e)))
    }

    /// Write samples, waiting for buffer space until all are written or `cancel` fires
    pub fn write_blocking(&mut self, samples: &[f32], cancel: &CancellationToken) {
        let mut remaining = samples;

        while !remaining.is_empty() {
            if cancel.is_cancelled() {
                return;
            }

            let written = self.producer.push_slice(remaining);
            if written > 0 {
                remaining = &remaining[written..];
            } else {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }

    /// Discard buffered audio on the next device callback
    pub fn clear(&self) {
        self.clear_flag.store(true, Ordering::SeqCst);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Set the output volume (0.0 to 1.0)
    pub fn set_volume(&self, vol: f32) {
        *self.volume.lock() = vol.clamp(0.0, 1.0);
    }
}
