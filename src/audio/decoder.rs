// Audio decoder using Symphonia
// Decodes a live network stream to interleaved f32 PCM

use parking_lot::Mutex;
use std::io::Read;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSourceStream, ReadOnlySource};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::error::{PlaybackError, Result};

/// Gives a Send-only network body the Sync bound symphonia asks for.
/// Only the decoder thread ever touches it.
struct NetworkReader<R> {
    inner: Mutex<R>,
}

impl<R: Read + Send> Read for NetworkReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.get_mut().read(buf)
    }
}

pub struct StreamDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
}

impl StreamDecoder {
    /// Probe a non-seekable stream and set up a decoder for its first audio track
    pub fn open<R>(reader: R, extension: Option<&str>, mime_type: Option<&str>) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        let source = ReadOnlySource::new(NetworkReader {
            inner: Mutex::new(reader),
        });
        let mss = MediaSourceStream::new(Box::new(source), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }
        if let Some(mime) = mime_type {
            hint.mime_type(mime);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| PlaybackError::preparation(format!("Failed to probe stream format: {}", e)))?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| PlaybackError::preparation("No audio track found"))?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
        let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2);

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| PlaybackError::preparation(format!("Failed to create decoder: {}", e)))?;

        debug!(sample_rate, channels, "Stream probed");

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Decode the next packet into interleaved samples.
    /// Returns None once the server closes the stream.
    pub fn decode_next(&mut self) -> Result<Option<Vec<f32>>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    // Chained ogg streams start a new logical stream per song
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(PlaybackError::Decode(format!("Failed to read packet: {}", e))),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    buf.copy_interleaved_ref(decoded);

                    return Ok(Some(buf.samples().to_vec()));
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Decode error (skipping): {}", e);
                    continue;
                }
                Err(e) => return Err(PlaybackError::Decode(format!("Decode failed: {}", e))),
            }
        }
    }
}
