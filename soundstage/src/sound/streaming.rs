use super::{ShadowState, Transport, apply_shadow};
use crate::backend::{
    AudioBackend, BufferFormat, BufferId, SourceFlag, SourceFloat, SourceId, SourceState,
    SourceVector,
};
use crate::cache::{BufferSet, ResourceKey};
use crate::config::SoundSystemDesc;
use crate::error::{Result, SoundError};
use crate::math::Vec3;
use crate::resource::{SharedStream, StreamingSoundResource};
use std::collections::VecDeque;
use std::sync::MutexGuard;

/// A chunk of the stream currently queued on the source.
#[derive(Debug, Clone, Copy)]
struct QueuedChunk {
    buffer: BufferId,
    /// Byte offset of the chunk within the stream
    start: u64,
}

/// Result of one refill pass over a streaming sound.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RefillOutcome {
    /// Number of chunks pulled from the stream
    pub pulls: usize,
    /// The stream wrapped back to its start
    pub looped: bool,
    /// Every queued chunk has played and nothing is left to queue
    pub finished: bool,
}

fn lock(stream: &SharedStream) -> Result<MutexGuard<'_, dyn StreamingSoundResource + 'static>> {
    stream.lock().map_err(|_| SoundError::poisoned("stream"))
}

/// A sound fed incrementally from a streaming resource through two
/// alternating hardware buffers.
///
/// Looping is handled here by rewinding the stream on a short read; the
/// hardware looping flag is never set on a streaming source.
pub struct StreamingSound {
    stream: SharedStream,
    key: ResourceKey,
    shadow: ShadowState,
    format: BufferFormat,
    frequency: u32,
    length: u64,
    source: Option<SourceId>,
    buffers: Option<[BufferId; 2]>,
    queued: VecDeque<QueuedChunk>,
    idle: VecDeque<BufferId>,
    /// Stream position of the next read, in bytes
    read_offset: u64,
    prime_bytes: usize,
    exhausted: bool,
    playing: bool,
    needs_rewind: bool,
    scratch: Vec<u8>,
}

impl StreamingSound {
    pub(crate) fn new(stream: SharedStream, key: ResourceKey, shadow: ShadowState) -> Result<Self> {
        let (format, frequency, length) = {
            let guard = lock(&stream)?;
            if !matches!(guard.channels(), 1 | 2) {
                return Err(SoundError::UnsupportedSoundFormat(guard.channels()));
            }
            (
                BufferFormat::from_layout(guard.channels(), guard.bits_per_sample())?,
                guard.frequency(),
                guard.sample_count(),
            )
        };
        Ok(Self {
            stream,
            key,
            shadow,
            format,
            frequency,
            length,
            source: None,
            buffers: None,
            queued: VecDeque::new(),
            idle: VecDeque::new(),
            read_offset: 0,
            prime_bytes: 0,
            exhausted: false,
            playing: false,
            needs_rewind: false,
            scratch: Vec::new(),
        })
    }

    pub fn stream(&self) -> &SharedStream {
        &self.stream
    }

    pub(crate) fn key(&self) -> ResourceKey {
        self.key
    }

    pub fn shadow(&self) -> &ShadowState {
        &self.shadow
    }

    pub fn source(&self) -> Option<SourceId> {
        self.source
    }

    /// Total length in sample frames, 0 when the stream does not know it
    pub fn length_in_samples(&self) -> u64 {
        self.length
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    pub fn format(&self) -> BufferFormat {
        self.format
    }

    /// True once the stream ran dry and playback was not looping
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn frame_bytes(&self) -> u64 {
        self.format.bytes_per_frame() as u64
    }

    fn live_source(&self) -> Result<SourceId> {
        self.source
            .ok_or_else(|| SoundError::Consistency("streaming sound has no source".to_string()))
    }

    /// Creates the source and queues the chunks primed by the buffer cache.
    pub(crate) fn bind<B: AudioBackend + ?Sized>(
        &mut self,
        hw: &mut B,
        set: BufferSet,
        desc: &SoundSystemDesc,
    ) -> Result<()> {
        let (buffers, lengths) = set.double()?;
        let source = hw.gen_source()?;
        self.source = Some(source);
        self.buffers = Some(buffers);
        self.prime_bytes = desc.initial_chunk_bytes;
        self.queued.clear();
        self.idle.clear();
        self.exhausted = false;
        self.playing = false;
        self.needs_rewind = false;

        let mut offset = 0;
        let mut primed = Vec::with_capacity(2);
        for (&buffer, &len) in buffers.iter().zip(lengths.iter()) {
            if len == 0 {
                self.idle.push_back(buffer);
                continue;
            }
            self.queued.push_back(QueuedChunk {
                buffer,
                start: offset,
            });
            primed.push(buffer);
            offset += len as u64;
        }
        if !primed.is_empty() {
            hw.queue_buffers(source, &primed)?;
        }
        self.read_offset = offset;
        let prime = self.format.align_chunk(desc.initial_chunk_bytes);
        if lengths.iter().any(|&len| len < prime) {
            self.reached_end()?;
        }

        apply_shadow(hw, source, &self.shadow, desc)?;
        if self.shadow.elapsed_samples > 0 {
            self.restart_at(hw, self.shadow.elapsed_samples * self.frame_bytes())?;
        }
        log::trace!(
            "Bound streaming sound to source {} with {} primed bytes",
            source,
            offset
        );
        Ok(())
    }

    pub(crate) fn detach<B: AudioBackend + ?Sized>(&mut self, hw: Option<&mut B>) -> Result<()> {
        let Some(source) = self.source else {
            return Ok(());
        };
        let released = match hw {
            Some(hw) => self.release_source(hw, source),
            None => Ok(()),
        };
        self.source = None;
        self.buffers = None;
        self.queued.clear();
        self.idle.clear();
        self.playing = false;
        self.needs_rewind = false;
        released
    }

    /// Keeps the offset of a playing or paused stream; a stopped or finished
    /// one starts over.
    fn release_source<B: AudioBackend + ?Sized>(&mut self, hw: &mut B, source: SourceId) -> Result<()> {
        self.shadow.elapsed_samples = if self.needs_rewind {
            0
        } else {
            self.elapsed_samples(Some(&*hw))?
        };
        hw.stop_sources(&[source])?;
        let queued = hw.buffers_queued(source)?;
        hw.unqueue_buffers(source, queued)?;
        hw.delete_source(source)
    }

    /// Pulls one chunk of at most `bytes` into the scratch buffer.
    fn pull(&mut self, bytes: usize) -> Result<usize> {
        self.scratch.resize(bytes, 0);
        let n = lock(&self.stream)?.next_chunk(&mut self.scratch[..bytes])?;
        self.read_offset += n as u64;
        Ok(n)
    }

    /// Handles a short read: rewinds when looping, otherwise marks the stream
    /// exhausted. Returns whether the stream wrapped.
    fn reached_end(&mut self) -> Result<bool> {
        if self.shadow.looping {
            lock(&self.stream)?.seek(0)?;
            self.read_offset = 0;
            Ok(true)
        } else {
            self.exhausted = true;
            Ok(false)
        }
    }

    /// Fills idle buffers with fresh chunks and queues them on `source`.
    fn fill_idle<B: AudioBackend + ?Sized>(
        &mut self,
        hw: &mut B,
        source: SourceId,
        chunk_bytes: usize,
    ) -> Result<(usize, bool)> {
        let chunk_bytes = self.format.align_chunk(chunk_bytes);
        let mut pulls = 0;
        let mut looped = false;
        while !self.exhausted {
            let Some(buffer) = self.idle.pop_front() else {
                break;
            };
            let start = self.read_offset;
            let n = self.pull(chunk_bytes)?;
            pulls += 1;
            if n < chunk_bytes {
                looped |= self.reached_end()?;
            }
            if n == 0 {
                self.idle.push_front(buffer);
                if start == 0 {
                    // Nothing to play at all.
                    self.exhausted = true;
                }
                continue;
            }
            hw.buffer_data(buffer, self.format, &self.scratch[..n], self.frequency)?;
            hw.queue_buffers(source, &[buffer])?;
            self.queued.push_back(QueuedChunk { buffer, start });
        }
        Ok((pulls, looped))
    }

    /// Stops the source, discards queued chunks and primes again from
    /// `byte_offset`.
    fn restart_at<B: AudioBackend + ?Sized>(&mut self, hw: &mut B, byte_offset: u64) -> Result<()> {
        let source = self.live_source()?;
        let buffers = self
            .buffers
            .ok_or_else(|| SoundError::Consistency("streaming sound has no buffers".to_string()))?;

        hw.stop_sources(&[source])?;
        let queued = hw.buffers_queued(source)?;
        hw.unqueue_buffers(source, queued)?;
        self.queued.clear();
        self.idle = buffers.into_iter().collect();

        lock(&self.stream)?.seek(byte_offset)?;
        self.read_offset = byte_offset;
        self.exhausted = false;
        self.fill_idle(hw, source, self.prime_bytes)?;
        Ok(())
    }

    /// Recycles processed buffers with fresh chunks of `chunk_bytes`.
    pub(crate) fn refill<B: AudioBackend + ?Sized>(
        &mut self,
        hw: &mut B,
        chunk_bytes: usize,
    ) -> Result<RefillOutcome> {
        let source = self.live_source()?;
        let processed = hw.buffers_processed(source)?;
        if processed > 0 {
            for buffer in hw.unqueue_buffers(source, processed)? {
                self.queued.pop_front();
                self.idle.push_back(buffer);
            }
        }

        let (pulls, looped) = self.fill_idle(hw, source, chunk_bytes)?;
        let finished = self.queued.is_empty();
        if finished {
            self.playing = false;
            self.needs_rewind = true;
        } else if hw.source_state(source)? != SourceState::Playing {
            // Starved: the source ran out before fresh chunks arrived.
            log::debug!("Restarting starved stream on source {}", source);
            hw.play_sources(&[source])?;
        }
        Ok(RefillOutcome {
            pulls,
            looped,
            finished,
        })
    }

    pub(crate) fn set_looping_flag(&mut self, looping: bool) {
        self.shadow.looping = looping;
    }

    fn with_source<B: AudioBackend + ?Sized>(
        &self,
        hw: Option<&mut B>,
        f: impl FnOnce(&mut B, SourceId) -> Result<()>,
    ) -> Result<()> {
        match (hw, self.source) {
            (Some(hw), Some(source)) => f(hw, source),
            _ => Ok(()),
        }
    }

    pub(crate) fn set_position<B: AudioBackend + ?Sized>(
        &mut self,
        hw: Option<&mut B>,
        position: Vec3,
    ) -> Result<()> {
        self.shadow.position = position;
        self.with_source(hw, |hw, source| {
            hw.set_source_vec3(source, SourceVector::Position, position)
        })
    }

    pub(crate) fn set_velocity<B: AudioBackend + ?Sized>(
        &mut self,
        hw: Option<&mut B>,
        velocity: Vec3,
    ) -> Result<()> {
        self.shadow.velocity = velocity;
        self.with_source(hw, |hw, source| {
            hw.set_source_vec3(source, SourceVector::Velocity, velocity)
        })
    }

    pub(crate) fn set_relative<B: AudioBackend + ?Sized>(
        &mut self,
        hw: Option<&mut B>,
        relative: bool,
    ) -> Result<()> {
        self.shadow.relative = relative;
        self.with_source(hw, |hw, source| {
            hw.set_source_flag(source, SourceFlag::Relative, relative)
        })
    }

    pub(crate) fn set_max_distance<B: AudioBackend + ?Sized>(
        &mut self,
        hw: Option<&mut B>,
        distance: f32,
    ) -> Result<()> {
        self.shadow.max_distance = distance;
        self.with_source(hw, |hw, source| {
            hw.set_source_f32(source, SourceFloat::MaxDistance, distance)
        })
    }

    /// Seeks the stream; a live source is primed again from the new offset
    /// and keeps playing if it was.
    pub(crate) fn set_elapsed_samples<B: AudioBackend + ?Sized>(
        &mut self,
        hw: Option<&mut B>,
        samples: u64,
    ) -> Result<()> {
        let samples = if self.length > 0 {
            samples.min(self.length)
        } else {
            samples
        };
        self.shadow.elapsed_samples = samples;
        let (Some(hw), Some(source)) = (hw, self.source) else {
            return Ok(());
        };
        self.restart_at(hw, samples * self.frame_bytes())?;
        self.needs_rewind = false;
        if self.playing {
            hw.play_sources(&[source])?;
        }
        Ok(())
    }

    pub(crate) fn elapsed_samples<B: AudioBackend + ?Sized>(&self, hw: Option<&B>) -> Result<u64> {
        let (Some(hw), Some(source)) = (hw, self.source) else {
            return Ok(self.shadow.elapsed_samples);
        };
        let frames = match self.queued.front() {
            Some(chunk) => chunk.start / self.frame_bytes() + hw.sample_offset(source)?,
            None => self.read_offset / self.frame_bytes(),
        };
        Ok(match self.length {
            0 => frames,
            length if self.shadow.looping => frames % length,
            length => frames.min(length),
        })
    }
}

impl Transport for StreamingSound {
    fn play<B: AudioBackend + ?Sized>(&mut self, hw: &mut B) -> Result<()> {
        let source = self.live_source()?;
        if self.playing {
            return Ok(());
        }
        if self.needs_rewind {
            self.restart_at(hw, 0)?;
            self.needs_rewind = false;
        }
        hw.play_sources(&[source])?;
        self.playing = true;
        Ok(())
    }

    fn stop<B: AudioBackend + ?Sized>(&mut self, hw: &mut B) -> Result<()> {
        hw.stop_sources(&[self.live_source()?])?;
        self.shadow.elapsed_samples = 0;
        self.playing = false;
        self.needs_rewind = true;
        Ok(())
    }

    fn pause<B: AudioBackend + ?Sized>(&mut self, hw: &mut B) -> Result<()> {
        hw.pause_sources(&[self.live_source()?])?;
        self.playing = false;
        Ok(())
    }

    fn apply_looping<B: AudioBackend + ?Sized>(
        &mut self,
        _hw: &mut B,
        looping: bool,
    ) -> Result<()> {
        self.shadow.looping = looping;
        if looping && self.exhausted {
            lock(&self.stream)?.seek(0)?;
            self.read_offset = 0;
            self.exhausted = false;
        }
        Ok(())
    }

    fn set_gain<B: AudioBackend + ?Sized>(&mut self, hw: Option<&mut B>, gain: f32) -> Result<()> {
        self.shadow.gain = gain;
        self.with_source(hw, |hw, source| {
            hw.set_source_f32(source, SourceFloat::Gain, gain.max(0.0))
        })
    }

    fn gain(&self) -> f32 {
        self.shadow.gain
    }

    fn is_playing<B: AudioBackend + ?Sized>(&self, hw: Option<&B>) -> Result<bool> {
        Ok(hw.is_some() && self.source.is_some() && self.playing)
    }
}
