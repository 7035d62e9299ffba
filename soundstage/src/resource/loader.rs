use super::{ConvertToMono, LoadOptions, PcmResource, StreamingSoundResource};
use crate::error::{Result, SoundError};
use std::collections::VecDeque;
use std::fs::File;
use std::path::Path;
use symphonia::{
    core::{
        audio::SampleBuffer,
        codecs::{Decoder, DecoderOptions},
        errors::Error,
        formats::{FormatOptions, FormatReader, SeekMode, SeekTo},
        io::MediaSourceStream,
        meta::MetadataOptions,
        probe::Hint,
    },
    default::{get_codecs, get_probe},
};

/// Decodes an audio file into a 16-bit in-memory resource.
///
/// Any container and codec supported by symphonia can be loaded.
///
/// # Errors
///
/// Returns [`SoundError::Io`] if the file cannot be opened,
/// [`SoundError::AudioLoading`] if it cannot be decoded and
/// [`SoundError::UnsupportedSoundFormat`] if it has more than two channels
/// and `options` keep the original layout.
pub fn load_pcm_file(path: impl AsRef<Path>, options: &LoadOptions) -> Result<PcmResource> {
    let mut stream = FileStream::open(path, options)?;
    let frame_bytes = stream.frame_bytes();
    let mut data = Vec::with_capacity(stream.sample_count() as usize * frame_bytes);
    let mut chunk = vec![0u8; 64 * 1024];
    loop {
        let n = stream.next_chunk(&mut chunk)?;
        data.extend_from_slice(&chunk[..n]);
        if n < chunk.len() {
            break;
        }
    }
    Ok(PcmResource::new(
        data,
        stream.channels(),
        16,
        stream.frequency(),
    ))
}

/// Streaming resource decoding a file on demand.
///
/// Packets are decoded only as far as the next requested chunk needs, so a
/// long file never has to fit in memory. Output is 16-bit PCM.
pub struct FileStream {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    source_channels: usize,
    channels: u16,
    frequency: u32,
    total_frames: u64,
    pending: VecDeque<u8>,
    skip_frames: u64,
    finished: bool,
}

impl FileStream {
    /// Opens `path` and prepares its default track for decoding.
    ///
    /// # Errors
    ///
    /// Same as [`load_pcm_file`].
    pub fn open(path: impl AsRef<Path>, options: &LoadOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| SoundError::AudioLoading(format!("Failed to probe audio format: {:?}", e)))?;
        let format = probed.format;

        let track = format
            .default_track()
            .ok_or_else(|| SoundError::AudioLoading("No default audio track found".to_string()))?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let frequency = params
            .sample_rate
            .ok_or_else(|| SoundError::AudioLoading("Sample rate not found".to_string()))?;
        let source_channels = params
            .channels
            .ok_or_else(|| SoundError::AudioLoading("Channel count not found".to_string()))?
            .count();

        let channels = match options.convert_to_mono {
            ConvertToMono::ForceMono => 1,
            ConvertToMono::Original if source_channels <= 2 => source_channels as u16,
            ConvertToMono::Original => {
                return Err(SoundError::UnsupportedSoundFormat(source_channels as u16));
            }
        };

        let decoder = get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| SoundError::AudioLoading(format!("Failed to create decoder: {:?}", e)))?;

        log::debug!(
            "Opened {} ({} Hz, {} -> {} channel(s))",
            path.display(),
            frequency,
            source_channels,
            channels
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            source_channels,
            channels,
            frequency,
            total_frames: params.n_frames.unwrap_or(0),
            pending: VecDeque::new(),
            skip_frames: 0,
            finished: false,
        })
    }

    fn frame_bytes(&self) -> usize {
        self.channels as usize * 2
    }

    /// Decodes the next packet of the track into `pending`.
    ///
    /// Returns `false` once the end of the file is reached.
    fn decode_next_packet(&mut self) -> Result<bool> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(_)) => return Ok(false),
                Err(Error::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => {
                    return Err(SoundError::AudioLoading(format!(
                        "Error reading packet: {:?}",
                        e
                    )));
                }
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(Error::IoError(_)) => return Ok(false),
                Err(Error::DecodeError(_)) => continue,
                Err(e) => {
                    return Err(SoundError::AudioLoading(format!(
                        "Error decoding packet: {:?}",
                        e
                    )));
                }
            };

            let spec = *decoded.spec();
            let mut samples = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
            samples.copy_interleaved_ref(decoded);

            let source_channels = self.source_channels.max(1);
            for frame in samples.samples().chunks_exact(source_channels) {
                if self.skip_frames > 0 {
                    self.skip_frames -= 1;
                    continue;
                }
                if self.channels == 1 && source_channels > 1 {
                    let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                    let mixed = (sum / source_channels as i32) as i16;
                    self.pending.extend(mixed.to_le_bytes());
                } else {
                    for sample in frame {
                        self.pending.extend(sample.to_le_bytes());
                    }
                }
            }
            return Ok(true);
        }
    }
}

impl StreamingSoundResource for FileStream {
    fn channels(&self) -> u16 {
        self.channels
    }

    fn bits_per_sample(&self) -> u16 {
        16
    }

    fn frequency(&self) -> u32 {
        self.frequency
    }

    fn sample_count(&self) -> u64 {
        self.total_frames
    }

    fn next_chunk(&mut self, out: &mut [u8]) -> Result<usize> {
        let frame_bytes = self.frame_bytes();
        let wanted = out.len() / frame_bytes * frame_bytes;
        while self.pending.len() < wanted && !self.finished {
            if !self.decode_next_packet()? {
                self.finished = true;
            }
        }

        let n = self.pending.len().min(wanted);
        for (dst, src) in out[..n].iter_mut().zip(self.pending.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn seek(&mut self, byte_offset: u64) -> Result<()> {
        let frame = byte_offset / self.frame_bytes() as u64;
        let seeked = self
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: frame,
                    track_id: self.track_id,
                },
            )
            .map_err(|e| SoundError::AudioLoading(format!("Failed to seek: {:?}", e)))?;

        self.decoder.reset();
        self.pending.clear();
        self.skip_frames = seeked.required_ts.saturating_sub(seeked.actual_ts);
        self.finished = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::SoundResource;

    #[test]
    fn test_missing_file_is_io_error() {
        let result = load_pcm_file("does/not/exist.wav", &LoadOptions::default());
        assert!(matches!(result, Err(SoundError::Io(_))));
    }

    #[test]
    fn test_loads_generated_wav() {
        let path = std::env::temp_dir().join(format!("soundstage-test-{}.wav", std::process::id()));
        let samples: Vec<i16> = (0..800).map(|i| (i * 10) as i16).collect();
        std::fs::write(&path, wav_bytes(&samples, 2, 8000)).unwrap();

        let pcm = load_pcm_file(&path, &LoadOptions::default()).unwrap();
        assert_eq!(pcm.channels(), 2);
        assert_eq!(pcm.frequency(), 8000);
        assert_eq!(pcm.sample_count(), 400);
        assert_eq!(pcm.data()[..4], [0, 0, 10, 0]);

        let mono = load_pcm_file(
            &path,
            &LoadOptions::new().convert_to_mono(ConvertToMono::ForceMono),
        )
        .unwrap();
        assert_eq!(mono.channels(), 1);
        assert_eq!(mono.sample_count(), 400);

        std::fs::remove_file(&path).ok();
    }

    fn wav_bytes(samples: &[i16], channels: u16, rate: u32) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVEfmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&rate.to_le_bytes());
        out.extend_from_slice(&(rate * channels as u32 * 2).to_le_bytes());
        out.extend_from_slice(&(channels * 2).to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }
}
