//! Hardware audio API abstraction.
//!
//! [`AudioBackend`] is shaped after the classic source/buffer/listener audio
//! APIs: buffers hold PCM data, sources play either one attached buffer or a
//! queue of buffers, and a single listener receives every source.

mod cpal_backend;
mod headless;
mod mixer;
mod resampler;

pub use cpal_backend::CpalBackend;
pub use headless::{HardwareCall, HeadlessBackend};
pub use mixer::SoftwareMixer;
pub use resampler::AudioResampler;

use crate::error::{Result, SoundError};
use crate::math::Vec3;
use std::fmt;

/// Error codes reported through [`SoundError::HardwareCall`].
pub mod error_code {
    pub const INVALID_NAME: i32 = 0xA001;
    pub const INVALID_ENUM: i32 = 0xA002;
    pub const INVALID_VALUE: i32 = 0xA003;
    pub const INVALID_OPERATION: i32 = 0xA004;
    pub const OUT_OF_MEMORY: i32 = 0xA005;
}

/// Hardware source name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u32);

impl SourceId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceId({})", self.0)
    }
}

/// Hardware buffer name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u32);

impl BufferId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BufferId({})", self.0)
    }
}

/// PCM layout of an uploaded buffer.
///
/// 8-bit samples are unsigned, 16-bit samples are signed little-endian.
/// Stereo data is interleaved left/right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferFormat {
    Mono8,
    Mono16,
    Stereo8,
    Stereo16,
}

impl BufferFormat {
    /// Maps a channel count and bit depth to a buffer format.
    ///
    /// # Errors
    ///
    /// Returns [`SoundError::UnsupportedFormat`] unless the layout is mono or
    /// stereo at 8 or 16 bits per sample.
    pub fn from_layout(channels: u16, bits_per_sample: u16) -> Result<Self> {
        match (channels, bits_per_sample) {
            (1, 8) => Ok(Self::Mono8),
            (1, 16) => Ok(Self::Mono16),
            (2, 8) => Ok(Self::Stereo8),
            (2, 16) => Ok(Self::Stereo16),
            _ => Err(SoundError::UnsupportedFormat {
                channels,
                bits_per_sample,
            }),
        }
    }

    pub fn channels(&self) -> u16 {
        match self {
            Self::Mono8 | Self::Mono16 => 1,
            Self::Stereo8 | Self::Stereo16 => 2,
        }
    }

    pub fn bits_per_sample(&self) -> u16 {
        match self {
            Self::Mono8 | Self::Stereo8 => 8,
            Self::Mono16 | Self::Stereo16 => 16,
        }
    }

    /// Bytes occupied by one sample frame across all channels
    pub fn bytes_per_frame(&self) -> usize {
        self.channels() as usize * (self.bits_per_sample() as usize / 8)
    }

    /// Rounds `bytes` down to whole frames, never below one frame.
    pub fn align_chunk(&self, bytes: usize) -> usize {
        let frame = self.bytes_per_frame();
        (bytes / frame).max(1) * frame
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceState {
    Initial,
    Playing,
    Paused,
    Stopped,
}

/// How source gain falls off with distance from the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistanceModel {
    /// No attenuation
    None,
    Inverse,
    /// Linear falloff from the reference distance to the max distance
    Linear,
    Exponent,
}

impl DistanceModel {
    /// Gain factor for a source `distance` units away from the listener.
    ///
    /// Distances are clamped to `[reference, max]` before evaluation.
    pub fn attenuation(&self, distance: f32, reference: f32, max: f32, rolloff: f32) -> f32 {
        let upper = max.max(reference);
        let distance = distance.clamp(reference, upper);
        let gain = match self {
            Self::None => 1.0,
            Self::Linear => {
                if upper <= reference {
                    1.0
                } else {
                    1.0 - rolloff * (distance - reference) / (upper - reference)
                }
            }
            Self::Inverse => {
                let denominator = reference + rolloff * (distance - reference);
                if denominator <= 0.0 {
                    1.0
                } else {
                    reference / denominator
                }
            }
            Self::Exponent => {
                if reference <= 0.0 {
                    1.0
                } else {
                    (distance / reference).powf(-rolloff)
                }
            }
        };
        gain.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFloat {
    Gain,
    MaxDistance,
    RolloffFactor,
    ReferenceDistance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceVector {
    Position,
    Velocity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFlag {
    Looping,
    /// Position is interpreted relative to the listener
    Relative,
}

/// A hardware audio API.
///
/// Every call returns [`SoundError::HardwareCall`] when the underlying API
/// reports an error. Source and buffer calls are only valid while a context
/// is active.
pub trait AudioBackend {
    /// Names of the output devices that can be opened
    fn device_names(&self) -> Vec<String>;

    /// Opens the named device, or the default one when `name` is `None`.
    ///
    /// Returns the name of the opened device.
    ///
    /// # Errors
    ///
    /// Returns [`SoundError::DeviceUnavailable`] if no device can be opened.
    fn open_device(&mut self, name: Option<&str>) -> Result<String>;

    /// Creates and activates a rendering context on the open device.
    fn create_context(&mut self) -> Result<()>;

    fn destroy_context(&mut self);

    fn close_device(&mut self);

    fn set_distance_model(&mut self, model: DistanceModel) -> Result<()>;

    fn set_listener_position(&mut self, position: Vec3) -> Result<()>;

    fn set_listener_orientation(&mut self, forward: Vec3, up: Vec3) -> Result<()>;

    fn set_listener_velocity(&mut self, velocity: Vec3) -> Result<()>;

    fn gen_source(&mut self) -> Result<SourceId>;

    fn delete_source(&mut self, source: SourceId) -> Result<()>;

    fn gen_buffer(&mut self) -> Result<BufferId>;

    fn delete_buffer(&mut self, buffer: BufferId) -> Result<()>;

    /// Replaces the contents of `buffer` with PCM `data`.
    fn buffer_data(
        &mut self,
        buffer: BufferId,
        format: BufferFormat,
        data: &[u8],
        frequency: u32,
    ) -> Result<()>;

    /// Attaches a single static buffer, or detaches everything with `None`.
    fn attach_buffer(&mut self, source: SourceId, buffer: Option<BufferId>) -> Result<()>;

    fn queue_buffers(&mut self, source: SourceId, buffers: &[BufferId]) -> Result<()>;

    /// Removes `count` processed buffers from the front of the queue.
    fn unqueue_buffers(&mut self, source: SourceId, count: usize) -> Result<Vec<BufferId>>;

    /// Number of queued buffers that have finished playing
    fn buffers_processed(&self, source: SourceId) -> Result<usize>;

    fn buffers_queued(&self, source: SourceId) -> Result<usize>;

    fn set_source_f32(&mut self, source: SourceId, param: SourceFloat, value: f32) -> Result<()>;

    fn set_source_vec3(&mut self, source: SourceId, param: SourceVector, value: Vec3)
    -> Result<()>;

    fn set_source_flag(&mut self, source: SourceId, param: SourceFlag, value: bool) -> Result<()>;

    /// Moves the play cursor, in sample frames of the current buffer
    fn set_sample_offset(&mut self, source: SourceId, samples: u64) -> Result<()>;

    fn sample_offset(&self, source: SourceId) -> Result<u64>;

    fn source_state(&self, source: SourceId) -> Result<SourceState>;

    /// Starts all `sources` together
    fn play_sources(&mut self, sources: &[SourceId]) -> Result<()>;

    fn stop_sources(&mut self, sources: &[SourceId]) -> Result<()>;

    fn pause_sources(&mut self, sources: &[SourceId]) -> Result<()>;

    /// Drains errors reported asynchronously by the device
    fn take_errors(&mut self) -> Vec<String>;
}
