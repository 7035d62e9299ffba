//! Audio resources consumed by the sound system.
//!
//! A [`SoundResource`] exposes its whole PCM payload at once and is uploaded
//! into a single hardware buffer. A [`StreamingSoundResource`] is pulled in
//! chunks and played through two alternating buffers.

mod load_options;
mod loader;

pub use load_options::{ConvertToMono, LoadOptions};
pub use loader::{FileStream, load_pcm_file};

use crate::error::{Result, SoundError};
use std::sync::{Arc, Mutex};

/// Immutable PCM audio held entirely in memory.
pub trait SoundResource: Send + Sync {
    fn channels(&self) -> u16;

    fn bits_per_sample(&self) -> u16;

    /// Sample rate in Hz
    fn frequency(&self) -> u32;

    /// Interleaved little-endian PCM bytes
    fn data(&self) -> &[u8];

    /// Number of sample frames
    fn sample_count(&self) -> u64 {
        let frame_bytes = self.channels() as u64 * (self.bits_per_sample() as u64 / 8);
        if frame_bytes == 0 {
            0
        } else {
            self.data().len() as u64 / frame_bytes
        }
    }
}

/// PCM audio read incrementally.
pub trait StreamingSoundResource: Send {
    fn channels(&self) -> u16;

    fn bits_per_sample(&self) -> u16;

    fn frequency(&self) -> u32;

    /// Total number of sample frames, or 0 when unknown
    fn sample_count(&self) -> u64;

    /// Reads the next bytes of the stream into `out`.
    ///
    /// Returns the number of bytes written; fewer than `out.len()` means the
    /// end of the stream was reached. Reads always end on a frame boundary.
    fn next_chunk(&mut self, out: &mut [u8]) -> Result<usize>;

    /// Moves the read position to `byte_offset` from the start.
    fn seek(&mut self, byte_offset: u64) -> Result<()>;
}

/// Streaming resource shared between its owner and the sound system.
pub type SharedStream = Arc<Mutex<dyn StreamingSoundResource>>;

/// In-memory PCM resource.
#[derive(Debug, Clone)]
pub struct PcmResource {
    data: Vec<u8>,
    channels: u16,
    bits_per_sample: u16,
    frequency: u32,
}

impl PcmResource {
    pub fn new(data: Vec<u8>, channels: u16, bits_per_sample: u16, frequency: u32) -> Self {
        Self {
            data,
            channels,
            bits_per_sample,
            frequency,
        }
    }

    /// Builds a 16-bit resource from interleaved samples.
    pub fn from_i16_samples(samples: &[i16], channels: u16, frequency: u32) -> Self {
        let data = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::new(data, channels, 16, frequency)
    }

    /// De-interleaves a stereo resource into its left and right channels.
    ///
    /// # Errors
    ///
    /// Returns [`SoundError::UnsupportedSoundFormat`] if the resource is not
    /// stereo and [`SoundError::UnsupportedFormat`] if its samples are not 8
    /// or 16 bits wide.
    pub fn split_stereo(&self) -> Result<(PcmResource, PcmResource)> {
        split_stereo(self)
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl SoundResource for PcmResource {
    fn channels(&self) -> u16 {
        self.channels
    }

    fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    fn frequency(&self) -> u32 {
        self.frequency
    }

    fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Splits any stereo resource into two mono resources.
pub(crate) fn split_stereo(resource: &dyn SoundResource) -> Result<(PcmResource, PcmResource)> {
    if resource.channels() != 2 {
        return Err(SoundError::UnsupportedSoundFormat(resource.channels()));
    }
    let sample_bytes = match resource.bits_per_sample() {
        8 => 1,
        16 => 2,
        bits => {
            return Err(SoundError::UnsupportedFormat {
                channels: 2,
                bits_per_sample: bits,
            });
        }
    };

    let data = resource.data();
    let mut left = Vec::with_capacity(data.len() / 2);
    let mut right = Vec::with_capacity(data.len() / 2);
    for frame in data.chunks_exact(sample_bytes * 2) {
        left.extend_from_slice(&frame[..sample_bytes]);
        right.extend_from_slice(&frame[sample_bytes..]);
    }

    let bits = resource.bits_per_sample();
    let frequency = resource.frequency();
    Ok((
        PcmResource::new(left, 1, bits, frequency),
        PcmResource::new(right, 1, bits, frequency),
    ))
}

/// Streaming resource over PCM bytes in memory.
#[derive(Debug, Clone)]
pub struct MemoryStream {
    pcm: PcmResource,
    cursor: usize,
}

impl MemoryStream {
    pub fn new(pcm: PcmResource) -> Self {
        Self { pcm, cursor: 0 }
    }

    /// Current read position in bytes
    pub fn position(&self) -> u64 {
        self.cursor as u64
    }

    /// Wraps the stream for use with [`SoundSystem::create_stream`](crate::SoundSystem::create_stream).
    pub fn shared(self) -> SharedStream {
        Arc::new(Mutex::new(self))
    }

    fn frame_bytes(&self) -> usize {
        (self.pcm.channels as usize * (self.pcm.bits_per_sample as usize / 8)).max(1)
    }
}

impl StreamingSoundResource for MemoryStream {
    fn channels(&self) -> u16 {
        self.pcm.channels
    }

    fn bits_per_sample(&self) -> u16 {
        self.pcm.bits_per_sample
    }

    fn frequency(&self) -> u32 {
        self.pcm.frequency
    }

    fn sample_count(&self) -> u64 {
        self.pcm.sample_count()
    }

    fn next_chunk(&mut self, out: &mut [u8]) -> Result<usize> {
        let frame_bytes = self.frame_bytes();
        let remaining = self.pcm.data.len() - self.cursor;
        let n = remaining.min(out.len()) / frame_bytes * frame_bytes;
        out[..n].copy_from_slice(&self.pcm.data[self.cursor..self.cursor + n]);
        self.cursor += n;
        Ok(n)
    }

    fn seek(&mut self, byte_offset: u64) -> Result<()> {
        let frame_bytes = self.frame_bytes() as u64;
        let aligned = byte_offset / frame_bytes * frame_bytes;
        self.cursor = aligned.min(self.pcm.data.len() as u64) as usize;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_count() {
        let pcm = PcmResource::new(vec![0; 88200], 1, 16, 44100);
        assert_eq!(pcm.sample_count(), 44100);
        let pcm = PcmResource::new(vec![0; 100], 2, 8, 8000);
        assert_eq!(pcm.sample_count(), 50);
    }

    #[test]
    fn test_split_stereo_8_bit() {
        let pcm = PcmResource::new(vec![1, 2, 3, 4, 5, 6], 2, 8, 22050);
        let (left, right) = pcm.split_stereo().unwrap();
        assert_eq!(left.data(), &[1, 3, 5]);
        assert_eq!(right.data(), &[2, 4, 6]);
        assert_eq!(left.channels(), 1);
        assert_eq!(right.frequency(), 22050);
    }

    #[test]
    fn test_split_stereo_16_bit_keeps_sample_pairs() {
        let pcm = PcmResource::from_i16_samples(&[100, -100, 200, -200], 2, 44100);
        let (left, right) = pcm.split_stereo().unwrap();
        assert_eq!(left.data(), PcmResource::from_i16_samples(&[100, 200], 1, 44100).data());
        assert_eq!(right.data(), PcmResource::from_i16_samples(&[-100, -200], 1, 44100).data());
        assert_eq!(left.bits_per_sample(), 16);
    }

    #[test]
    fn test_split_rejects_mono() {
        let pcm = PcmResource::new(vec![0; 4], 1, 16, 44100);
        assert!(matches!(
            pcm.split_stereo(),
            Err(SoundError::UnsupportedSoundFormat(1))
        ));
    }

    #[test]
    fn test_memory_stream_reads_and_seeks() {
        let mut stream = MemoryStream::new(PcmResource::new((0..10).collect(), 1, 16, 8000));
        let mut out = [0u8; 4];
        assert_eq!(stream.next_chunk(&mut out).unwrap(), 4);
        assert_eq!(out, [0, 1, 2, 3]);
        stream.seek(7).unwrap();
        assert_eq!(stream.position(), 6);
        assert_eq!(stream.next_chunk(&mut out).unwrap(), 4);
        assert_eq!(out, [6, 7, 8, 9]);
        assert_eq!(stream.next_chunk(&mut out).unwrap(), 0);
    }

    #[test]
    fn test_memory_stream_reads_whole_frames() {
        let mut stream = MemoryStream::new(PcmResource::new(vec![9; 8], 2, 16, 8000));
        let mut out = [0u8; 6];
        assert_eq!(stream.next_chunk(&mut out).unwrap(), 4);
    }
}
