use crate::error::{Result, SoundError};
use rubato::{FftFixedIn, Resampler};

/// Converts uploaded PCM to the output device rate.
///
/// Each call resamples one complete buffer; output is trimmed to the length
/// implied by the rate ratio so chunk padding never reaches the mixer.
pub struct AudioResampler {
    source_rate: u32,
    target_rate: u32,
    channels: u16,
    chunk_size: usize,
}

impl AudioResampler {
    pub fn new(
        source_rate: u32,
        target_rate: u32,
        channels: u16,
        chunk_size: Option<usize>,
    ) -> Result<Self> {
        if source_rate == 0 || target_rate == 0 {
            return Err(SoundError::Configuration(
                "Sample rates must be greater than 0".to_string(),
            ));
        }

        if channels == 0 {
            return Err(SoundError::Configuration(
                "Channel count must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            source_rate,
            target_rate,
            channels,
            chunk_size: chunk_size.unwrap_or(1024),
        })
    }

    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    pub fn ratio(&self) -> f64 {
        self.target_rate as f64 / self.source_rate as f64
    }

    /// Number of output frames produced for `frames` input frames
    pub fn output_frames(&self, frames: usize) -> usize {
        (frames as f64 * self.ratio()).round() as usize
    }

    pub fn resample_channel(&self, samples: &[f32]) -> Result<Vec<f32>> {
        if self.source_rate == self.target_rate || samples.is_empty() {
            return Ok(samples.to_vec());
        }

        let mut resampler = FftFixedIn::<f32>::new(
            self.source_rate as usize,
            self.target_rate as usize,
            self.chunk_size,
            2,
            1,
        )
        .map_err(|e| SoundError::AudioLoading(format!("Failed to create resampler: {}", e)))?;

        let expected = self.output_frames(samples.len());
        let delay = resampler.output_delay();
        let mut output = Vec::with_capacity(expected + delay + self.chunk_size);
        let mut waves_in = vec![vec![0.0f32; self.chunk_size]];

        for chunk in samples.chunks(self.chunk_size) {
            waves_in[0][..chunk.len()].copy_from_slice(chunk);
            waves_in[0][chunk.len()..].fill(0.0);

            let waves_out = resampler
                .process(&waves_in, None)
                .map_err(|e| SoundError::AudioLoading(format!("Resampling error: {}", e)))?;
            if let Some(channel) = waves_out.first() {
                output.extend_from_slice(channel);
            }
        }

        // Flush the filter delay so the tail of the input is not lost.
        waves_in[0].fill(0.0);
        while output.len() < expected + delay {
            let waves_out = resampler
                .process(&waves_in, None)
                .map_err(|e| SoundError::AudioLoading(format!("Resampling error: {}", e)))?;
            match waves_out.first() {
                Some(channel) if !channel.is_empty() => output.extend_from_slice(channel),
                _ => break,
            }
        }

        let delay = delay.min(output.len());
        output.drain(..delay);
        output.resize(expected, 0.0);
        Ok(output)
    }

    pub fn resample_interleaved(&self, interleaved: &[f32]) -> Result<Vec<f32>> {
        if self.source_rate == self.target_rate {
            return Ok(interleaved.to_vec());
        }

        let channels = self.channels as usize;
        let mut resampled = Vec::with_capacity(channels);
        for ch in 0..channels {
            let channel: Vec<f32> = interleaved
                .chunks(channels)
                .map(|frame| frame.get(ch).copied().unwrap_or(0.0))
                .collect();
            resampled.push(self.resample_channel(&channel)?);
        }

        let frames = resampled.first().map(Vec::len).unwrap_or(0);
        let mut output = Vec::with_capacity(frames * channels);
        for frame in 0..frames {
            for channel in &resampled {
                output.push(channel[frame]);
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resampler_creation() {
        let resampler = AudioResampler::new(44100, 48000, 2, None).unwrap();
        assert_eq!(resampler.source_rate(), 44100);
        assert_eq!(resampler.target_rate(), 48000);
        assert!(AudioResampler::new(0, 48000, 2, None).is_err());
        assert!(AudioResampler::new(44100, 0, 2, None).is_err());
        assert!(AudioResampler::new(44100, 48000, 0, None).is_err());
    }

    #[test]
    fn test_same_rate_is_passthrough() {
        let resampler = AudioResampler::new(44100, 44100, 1, None).unwrap();
        let samples = vec![0.1, 0.2, 0.3, 0.4];
        assert_eq!(resampler.resample_channel(&samples).unwrap(), samples);
    }

    #[test]
    fn test_output_length_follows_ratio() {
        let resampler = AudioResampler::new(22050, 44100, 2, Some(256)).unwrap();
        let input = vec![0.25f32; 1000 * 2];
        let output = resampler.resample_interleaved(&input).unwrap();
        assert_eq!(output.len(), 2000 * 2);
    }
}
