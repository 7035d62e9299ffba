// Software implementation of the source/buffer model, mixed on the audio
// callback thread of the cpal backend.

use super::{
    BufferFormat, BufferId, DistanceModel, SourceFlag, SourceFloat, SourceId, SourceState,
    SourceVector, error_code,
};
use crate::error::{Result, SoundError};
use crate::math::Vec3;
use std::collections::{HashMap, VecDeque};
use std::f32::consts::FRAC_PI_2;

/// Decodes little-endian PCM bytes into interleaved `f32` samples.
pub(crate) fn pcm_to_f32(format: BufferFormat, data: &[u8]) -> Vec<f32> {
    match format.bits_per_sample() {
        8 => data.iter().map(|&b| (b as f32 - 128.0) / 128.0).collect(),
        _ => data
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
            .collect(),
    }
}

struct MixBuffer {
    channels: u16,
    /// Interleaved samples at the mixer output rate
    samples: Vec<f32>,
    source_frequency: u32,
}

impl MixBuffer {
    fn frame_count(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    fn frame(&self, index: usize) -> (f32, f32) {
        if self.channels == 1 {
            let s = self.samples[index];
            (s, s)
        } else {
            let base = index * self.channels as usize;
            (self.samples[base], self.samples[base + 1])
        }
    }
}

struct MixSource {
    state: SourceState,
    is_static: bool,
    queue: VecDeque<BufferId>,
    current: usize,
    cursor: usize,
    gain: f32,
    max_distance: f32,
    rolloff: f32,
    reference_distance: f32,
    position: Vec3,
    looping: bool,
    relative: bool,
}

impl MixSource {
    fn new() -> Self {
        Self {
            state: SourceState::Initial,
            is_static: false,
            queue: VecDeque::new(),
            current: 0,
            cursor: 0,
            gain: 1.0,
            max_distance: f32::MAX,
            rolloff: 1.0,
            reference_distance: 1.0,
            position: Vec3::ZERO,
            looping: false,
            relative: false,
        }
    }

    fn processed(&self) -> usize {
        if self.is_static {
            0
        } else if self.state == SourceState::Stopped {
            self.queue.len()
        } else {
            self.current.min(self.queue.len())
        }
    }

    fn current_buffer<'a>(&self, buffers: &'a HashMap<BufferId, MixBuffer>) -> Option<&'a MixBuffer> {
        self.queue.get(self.current).and_then(|id| buffers.get(id))
    }

    /// Left and right gain for the current buffer.
    ///
    /// Mono buffers are attenuated by distance and panned with constant power;
    /// stereo buffers only receive the source gain.
    fn channel_gains(
        &self,
        listener: &Listener,
        model: DistanceModel,
        buffers: &HashMap<BufferId, MixBuffer>,
    ) -> (f32, f32) {
        let gain = self.gain.max(0.0);
        let spatial = self
            .current_buffer(buffers)
            .map(|b| b.channels == 1)
            .unwrap_or(true);
        if !spatial {
            return (gain, gain);
        }

        let offset = if self.relative {
            self.position
        } else {
            self.position - listener.position
        };
        let attenuation = model.attenuation(
            offset.length(),
            self.reference_distance,
            self.max_distance,
            self.rolloff,
        );
        let right = listener.forward.cross(listener.up).normalize_or_zero();
        let pan = offset.normalize_or_zero().dot(right);
        let angle = (pan + 1.0) * 0.5 * FRAC_PI_2;
        let gain = gain * attenuation;
        (gain * angle.cos(), gain * angle.sin())
    }

    /// Advances the play cursor by one frame, moving through the queue.
    fn next_frame(&mut self, buffers: &HashMap<BufferId, MixBuffer>) -> Option<(f32, f32)> {
        let mut hops = 0;
        loop {
            let Some(buffer) = self.current_buffer(buffers) else {
                self.state = SourceState::Stopped;
                self.current = self.queue.len();
                return None;
            };
            if self.cursor < buffer.frame_count() {
                let frame = buffer.frame(self.cursor);
                self.cursor += 1;
                return Some(frame);
            }

            self.cursor = 0;
            hops += 1;
            if hops > self.queue.len() {
                self.state = SourceState::Stopped;
                self.current = self.queue.len();
                return None;
            }
            if self.current + 1 < self.queue.len() {
                self.current += 1;
            } else if self.looping {
                self.current = 0;
            } else {
                self.state = SourceState::Stopped;
                self.current = self.queue.len();
                return None;
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Listener {
    position: Vec3,
    forward: Vec3,
    up: Vec3,
}

/// Software mixer holding every source and buffer of a device context.
///
/// Buffers are stored as `f32` at the output rate; [`mix`](Self::mix)
/// renders all playing sources into an interleaved output block.
pub struct SoftwareMixer {
    output_rate: u32,
    next_name: u32,
    buffers: HashMap<BufferId, MixBuffer>,
    sources: HashMap<SourceId, MixSource>,
    listener: Listener,
    distance_model: DistanceModel,
}

impl SoftwareMixer {
    pub fn new(output_rate: u32) -> Self {
        Self {
            output_rate,
            next_name: 1,
            buffers: HashMap::new(),
            sources: HashMap::new(),
            listener: Listener {
                position: Vec3::ZERO,
                forward: -Vec3::Z,
                up: Vec3::Y,
            },
            distance_model: DistanceModel::Linear,
        }
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Drops every source and buffer and switches to a new output rate.
    pub fn reset(&mut self, output_rate: u32) {
        self.output_rate = output_rate;
        self.buffers.clear();
        self.sources.clear();
    }

    fn next_name(&mut self) -> u32 {
        let name = self.next_name;
        self.next_name += 1;
        name
    }

    fn source(&self, source: SourceId, operation: &'static str) -> Result<&MixSource> {
        self.sources
            .get(&source)
            .ok_or(SoundError::hardware(operation, error_code::INVALID_NAME))
    }

    fn source_mut(&mut self, source: SourceId, operation: &'static str) -> Result<&mut MixSource> {
        self.sources
            .get_mut(&source)
            .ok_or(SoundError::hardware(operation, error_code::INVALID_NAME))
    }

    pub fn set_distance_model(&mut self, model: DistanceModel) {
        self.distance_model = model;
    }

    pub fn set_listener_position(&mut self, position: Vec3) {
        self.listener.position = position;
    }

    pub fn set_listener_orientation(&mut self, forward: Vec3, up: Vec3) {
        self.listener.forward = forward;
        self.listener.up = up;
    }

    pub fn gen_source(&mut self) -> SourceId {
        let source = SourceId::new(self.next_name());
        self.sources.insert(source, MixSource::new());
        source
    }

    pub fn delete_source(&mut self, source: SourceId) -> Result<()> {
        self.sources
            .remove(&source)
            .map(|_| ())
            .ok_or(SoundError::hardware("delete source", error_code::INVALID_NAME))
    }

    pub fn gen_buffer(&mut self) -> BufferId {
        let buffer = BufferId::new(self.next_name());
        self.buffers.insert(
            buffer,
            MixBuffer {
                channels: 1,
                samples: Vec::new(),
                source_frequency: self.output_rate,
            },
        );
        buffer
    }

    pub fn delete_buffer(&mut self, buffer: BufferId) -> Result<()> {
        if self.sources.values().any(|s| s.queue.contains(&buffer)) {
            return Err(SoundError::hardware(
                "delete buffer",
                error_code::INVALID_OPERATION,
            ));
        }
        self.buffers
            .remove(&buffer)
            .map(|_| ())
            .ok_or(SoundError::hardware("delete buffer", error_code::INVALID_NAME))
    }

    /// Stores samples already converted to the output rate.
    pub fn store_buffer(
        &mut self,
        buffer: BufferId,
        channels: u16,
        samples: Vec<f32>,
        source_frequency: u32,
    ) -> Result<()> {
        let stored = self
            .buffers
            .get_mut(&buffer)
            .ok_or(SoundError::hardware("buffer data", error_code::INVALID_NAME))?;
        stored.channels = channels;
        stored.samples = samples;
        stored.source_frequency = source_frequency;
        Ok(())
    }

    pub fn attach_buffer(&mut self, source: SourceId, buffer: Option<BufferId>) -> Result<()> {
        if let Some(buffer) = buffer {
            if !self.buffers.contains_key(&buffer) {
                return Err(SoundError::hardware("attach buffer", error_code::INVALID_NAME));
            }
        }
        let s = self.source_mut(source, "attach buffer")?;
        s.queue.clear();
        s.queue.extend(buffer);
        s.is_static = buffer.is_some();
        s.current = 0;
        s.cursor = 0;
        Ok(())
    }

    pub fn queue_buffers(&mut self, source: SourceId, buffers: &[BufferId]) -> Result<()> {
        if buffers.iter().any(|b| !self.buffers.contains_key(b)) {
            return Err(SoundError::hardware("queue buffers", error_code::INVALID_NAME));
        }
        let s = self.source_mut(source, "queue buffers")?;
        if s.is_static {
            return Err(SoundError::hardware(
                "queue buffers",
                error_code::INVALID_OPERATION,
            ));
        }
        s.queue.extend(buffers.iter().copied());
        Ok(())
    }

    pub fn unqueue_buffers(&mut self, source: SourceId, count: usize) -> Result<Vec<BufferId>> {
        let s = self.source_mut(source, "unqueue buffers")?;
        if count > s.processed() {
            return Err(SoundError::hardware(
                "unqueue buffers",
                error_code::INVALID_VALUE,
            ));
        }
        let removed = s.queue.drain(..count).collect();
        s.current = s.current.saturating_sub(count);
        Ok(removed)
    }

    pub fn buffers_processed(&self, source: SourceId) -> Result<usize> {
        Ok(self.source(source, "query processed buffers")?.processed())
    }

    pub fn buffers_queued(&self, source: SourceId) -> Result<usize> {
        Ok(self.source(source, "query queued buffers")?.queue.len())
    }

    pub fn set_source_f32(&mut self, source: SourceId, param: SourceFloat, value: f32) -> Result<()> {
        let s = self.source_mut(source, "set source float")?;
        match param {
            SourceFloat::Gain => s.gain = value,
            SourceFloat::MaxDistance => s.max_distance = value,
            SourceFloat::RolloffFactor => s.rolloff = value,
            SourceFloat::ReferenceDistance => s.reference_distance = value,
        }
        Ok(())
    }

    pub fn set_source_vec3(&mut self, source: SourceId, param: SourceVector, value: Vec3) -> Result<()> {
        let s = self.source_mut(source, "set source vector")?;
        match param {
            SourceVector::Position => s.position = value,
            // No doppler shift in software mixing.
            SourceVector::Velocity => {}
        }
        Ok(())
    }

    pub fn set_source_flag(&mut self, source: SourceId, param: SourceFlag, value: bool) -> Result<()> {
        let s = self.source_mut(source, "set source flag")?;
        match param {
            SourceFlag::Looping => s.looping = value,
            SourceFlag::Relative => s.relative = value,
        }
        Ok(())
    }

    pub fn set_sample_offset(&mut self, source: SourceId, samples: u64) -> Result<()> {
        let output_rate = self.output_rate as u64;
        let s = self
            .sources
            .get_mut(&source)
            .ok_or(SoundError::hardware("set sample offset", error_code::INVALID_NAME))?;
        let buffer = s
            .current_buffer(&self.buffers)
            .ok_or(SoundError::hardware("set sample offset", error_code::INVALID_OPERATION))?;
        let cursor = (samples * output_rate / buffer.source_frequency.max(1) as u64) as usize;
        if cursor > buffer.frame_count() {
            return Err(SoundError::hardware(
                "set sample offset",
                error_code::INVALID_VALUE,
            ));
        }
        s.cursor = cursor;
        Ok(())
    }

    pub fn sample_offset(&self, source: SourceId) -> Result<u64> {
        let s = self.source(source, "query sample offset")?;
        Ok(s.current_buffer(&self.buffers)
            .map(|b| s.cursor as u64 * b.source_frequency as u64 / self.output_rate.max(1) as u64)
            .unwrap_or(0))
    }

    pub fn source_state(&self, source: SourceId) -> Result<SourceState> {
        Ok(self.source(source, "query source state")?.state)
    }

    pub fn play(&mut self, source: SourceId) -> Result<()> {
        let s = self.source_mut(source, "play source")?;
        if s.state != SourceState::Paused {
            s.current = 0;
            s.cursor = 0;
        }
        s.state = SourceState::Playing;
        Ok(())
    }

    pub fn stop(&mut self, source: SourceId) -> Result<()> {
        let s = self.source_mut(source, "stop source")?;
        s.state = SourceState::Stopped;
        s.current = s.queue.len();
        s.cursor = 0;
        Ok(())
    }

    pub fn pause(&mut self, source: SourceId) -> Result<()> {
        let s = self.source_mut(source, "pause source")?;
        if s.state == SourceState::Playing {
            s.state = SourceState::Paused;
        }
        Ok(())
    }

    /// Mixes every playing source into `out`.
    ///
    /// `out` is interleaved with `channels` channels and is added to, not
    /// overwritten. Returns the number of sources that contributed.
    pub fn mix(&mut self, out: &mut [f32], channels: usize) -> usize {
        let channels = channels.max(1);
        let frames = out.len() / channels;
        let listener = self.listener;
        let model = self.distance_model;
        let buffers = &self.buffers;
        let mut active = 0;

        for source in self.sources.values_mut() {
            if source.state != SourceState::Playing {
                continue;
            }
            active += 1;
            let (left_gain, right_gain) = source.channel_gains(&listener, model, buffers);
            for frame in 0..frames {
                let Some((left, right)) = source.next_frame(buffers) else {
                    break;
                };
                let base = frame * channels;
                if channels == 1 {
                    out[base] += (left * left_gain + right * right_gain) * 0.5;
                } else {
                    out[base] += left * left_gain;
                    out[base + 1] += right * right_gain;
                }
            }
        }

        active
    }
}
