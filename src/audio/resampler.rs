// Sample rate and channel conversion between the stream and the output device
// Uses rubato's FFT resampler on fixed input chunks; decoded packets are
// buffered until a full chunk is available.

use rubato::{FftFixedIn, Resampler};
use tracing::debug;

use crate::error::{PlaybackError, Result};

const CHUNK_FRAMES: usize = 1024;

pub struct StreamResampler {
    resampler: Option<FftFixedIn<f32>>,
    in_channels: usize,
    out_channels: usize,
    pending: Vec<Vec<f32>>, // Planar frames waiting for a full chunk
}

impl StreamResampler {
    pub fn new(in_rate: u32, out_rate: u32, in_channels: usize, out_channels: usize) -> Result<Self> {
        if in_channels == 0 || out_channels == 0 {
            return Err(PlaybackError::preparation("Stream or device reports zero channels"));
        }

        let resampler = if in_rate != out_rate {
            debug!(in_rate, out_rate, out_channels, "Resampling stream");
            let resampler = FftFixedIn::<f32>::new(
                in_rate as usize,
                out_rate as usize,
                CHUNK_FRAMES,
                2,
                out_channels,
            )
            .map_err(|e| PlaybackError::preparation(format!("Failed to create resampler: {}", e)))?;
            Some(resampler)
        } else {
            None
        };

        Ok(Self {
            resampler,
            in_channels,
            out_channels,
            pending: vec![Vec::new(); out_channels],
        })
    }

    /// Convert one decoded packet. May return fewer frames than it was given
    /// (or none) while a resampling chunk fills up.
    pub fn process(&mut self, interleaved: &[f32]) -> Result<Vec<f32>> {
        let frames = interleaved.len() / self.in_channels;

        let Some(resampler) = self.resampler.as_mut() else {
            let mut out = Vec::with_capacity(frames * self.out_channels);
            for frame in interleaved.chunks_exact(self.in_channels) {
                for ch in 0..self.out_channels {
                    out.push(frame[ch % self.in_channels]);
                }
            }
            return Ok(out);
        };

        for frame in interleaved.chunks_exact(self.in_channels) {
            for (ch, plane) in self.pending.iter_mut().enumerate() {
                plane.push(frame[ch % self.in_channels]);
            }
        }

        let mut out = Vec::new();
        loop {
            let needed = resampler.input_frames_next();
            if self.pending[0].len() < needed {
                break;
            }

            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|plane| plane.drain(..needed).collect())
                .collect();

            let planar = resampler
                .process(&chunk, None)
                .map_err(|e| PlaybackError::Decode(format!("Resampling failed: {}", e)))?;

            let produced = planar.first().map(|p| p.len()).unwrap_or(0);
            out.reserve(produced * self.out_channels);
            for i in 0..produced {
                for plane in &planar {
                    out.push(plane[i]);
                }
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_rate_passes_through() {
        let mut resampler = StreamResampler::new(44100, 44100, 2, 2).unwrap();
        let input = vec![0.1, 0.2, 0.3, 0.4];
        assert_eq!(resampler.process(&input).unwrap(), input);
    }

    #[test]
    fn test_mono_is_duplicated_to_stereo() {
        let mut resampler = StreamResampler::new(48000, 48000, 1, 2).unwrap();
        let out = resampler.process(&[0.5, -0.5]).unwrap();
        assert_eq!(out, vec![0.5, 0.5, -0.5, -0.5]);
    }

    #[test]
    fn test_stereo_to_mono_keeps_left() {
        let mut resampler = StreamResampler::new(48000, 48000, 2, 1).unwrap();
        let out = resampler.process(&[0.1, 0.9, 0.2, 0.8]).unwrap();
        assert_eq!(out, vec![0.1, 0.2]);
    }

    #[test]
    fn test_resampling_buffers_until_chunk_is_full() {
        let mut resampler = StreamResampler::new(44100, 48000, 2, 2).unwrap();

        let small = vec![0.0; 100 * 2];
        assert!(resampler.process(&small).unwrap().is_empty());

        let rest = vec![0.0; 2000 * 2];
        let out = resampler.process(&rest).unwrap();
        assert!(!out.is_empty());
        assert_eq!(out.len() % 2, 0);
    }

    #[test]
    fn test_zero_channels_rejected() {
        assert!(StreamResampler::new(44100, 48000, 0, 2).is_err());
    }
}
