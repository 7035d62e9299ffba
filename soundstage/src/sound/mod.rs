//! Sound handles.
//!
//! A handle keeps a shadow copy of every playback attribute so it can be
//! configured while no device exists. Once bound to a hardware source, each
//! mutation updates the shadow copy and is forwarded to the hardware.

mod mono;
mod stereo;
mod streaming;

pub use mono::MonoSound;
pub use stereo::StereoSound;
pub use streaming::StreamingSound;

pub(crate) use streaming::RefillOutcome;

use crate::backend::{AudioBackend, SourceFlag, SourceFloat, SourceId, SourceVector};
use crate::config::SoundSystemDesc;
use crate::error::Result;
use crate::math::Vec3;
use std::fmt;

/// Identifier of a sound created by a [`SoundSystem`](crate::SoundSystem).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SoundId(u64);

impl SoundId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SoundId({})", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundKind {
    Mono,
    Stereo,
    Streaming,
}

/// Playback attributes tracked independently of the hardware.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowState {
    /// Stored as given; clamped to zero when sent to the hardware
    pub gain: f32,
    pub position: Vec3,
    pub velocity: Vec3,
    /// Position is relative to the listener
    pub relative: bool,
    pub max_distance: f32,
    pub looping: bool,
    /// Playback offset in sample frames, used while no source is bound
    pub elapsed_samples: u64,
}

impl ShadowState {
    pub(crate) fn new(max_distance: f32) -> Self {
        Self {
            gain: 1.0,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            relative: false,
            max_distance,
            looping: false,
            elapsed_samples: 0,
        }
    }
}

/// Sends the shadow attributes of a freshly bound source to the hardware.
pub(crate) fn apply_shadow<B: AudioBackend + ?Sized>(
    hw: &mut B,
    source: SourceId,
    shadow: &ShadowState,
    desc: &SoundSystemDesc,
) -> Result<()> {
    hw.set_source_f32(source, SourceFloat::Gain, shadow.gain.max(0.0))?;
    hw.set_source_f32(source, SourceFloat::MaxDistance, shadow.max_distance)?;
    hw.set_source_f32(source, SourceFloat::RolloffFactor, desc.rolloff_factor)?;
    hw.set_source_f32(source, SourceFloat::ReferenceDistance, desc.reference_distance)?;
    hw.set_source_flag(source, SourceFlag::Relative, shadow.relative)?;
    hw.set_source_vec3(source, SourceVector::Position, shadow.position)?;
    hw.set_source_vec3(source, SourceVector::Velocity, shadow.velocity)?;
    Ok(())
}

/// Transport operations shared by every kind of sound.
///
/// Play, stop, pause and looping need a live device and are only called by
/// the system's dispatch once the device is ready. Gain and play state work
/// in every state: `hw` is `None` while the device is not ready.
pub trait Transport {
    fn play<B: AudioBackend + ?Sized>(&mut self, hw: &mut B) -> Result<()>;

    fn stop<B: AudioBackend + ?Sized>(&mut self, hw: &mut B) -> Result<()>;

    fn pause<B: AudioBackend + ?Sized>(&mut self, hw: &mut B) -> Result<()>;

    fn apply_looping<B: AudioBackend + ?Sized>(&mut self, hw: &mut B, looping: bool)
    -> Result<()>;

    fn set_gain<B: AudioBackend + ?Sized>(&mut self, hw: Option<&mut B>, gain: f32) -> Result<()>;

    fn gain(&self) -> f32;

    fn is_playing<B: AudioBackend + ?Sized>(&self, hw: Option<&B>) -> Result<bool>;
}

/// A sound of any kind.
pub enum SoundHandle {
    Mono(MonoSound),
    Stereo(StereoSound),
    Streaming(StreamingSound),
}

impl SoundHandle {
    pub fn kind(&self) -> SoundKind {
        match self {
            Self::Mono(_) => SoundKind::Mono,
            Self::Stereo(_) => SoundKind::Stereo,
            Self::Streaming(_) => SoundKind::Streaming,
        }
    }

    /// Shadow attributes; for stereo sounds those of the left channel, which
    /// always match the right one.
    pub fn shadow(&self) -> &ShadowState {
        match self {
            Self::Mono(s) => s.shadow(),
            Self::Stereo(s) => s.left().shadow(),
            Self::Streaming(s) => s.shadow(),
        }
    }

    /// True once a hardware source is bound
    pub fn is_live(&self) -> bool {
        match self {
            Self::Mono(s) => s.source().is_some(),
            Self::Stereo(s) => s.left().source().is_some(),
            Self::Streaming(s) => s.source().is_some(),
        }
    }

    pub fn length_in_samples(&self) -> u64 {
        match self {
            Self::Mono(s) => s.length_in_samples(),
            Self::Stereo(s) => s.left().length_in_samples(),
            Self::Streaming(s) => s.length_in_samples(),
        }
    }

    pub fn frequency(&self) -> u32 {
        match self {
            Self::Mono(s) => s.frequency(),
            Self::Stereo(s) => s.left().frequency(),
            Self::Streaming(s) => s.frequency(),
        }
    }

    pub(crate) fn set_looping_flag(&mut self, looping: bool) {
        match self {
            Self::Mono(s) => s.set_looping_flag(looping),
            Self::Stereo(s) => s.set_looping_flag(looping),
            Self::Streaming(s) => s.set_looping_flag(looping),
        }
    }

    pub(crate) fn set_position<B: AudioBackend + ?Sized>(
        &mut self,
        hw: Option<&mut B>,
        position: Vec3,
    ) -> Result<()> {
        match self {
            Self::Mono(s) => s.set_position(hw, position),
            Self::Stereo(s) => s.set_position(hw, position),
            Self::Streaming(s) => s.set_position(hw, position),
        }
    }

    pub(crate) fn set_velocity<B: AudioBackend + ?Sized>(
        &mut self,
        hw: Option<&mut B>,
        velocity: Vec3,
    ) -> Result<()> {
        match self {
            Self::Mono(s) => s.set_velocity(hw, velocity),
            Self::Stereo(s) => s.set_velocity(hw, velocity),
            Self::Streaming(s) => s.set_velocity(hw, velocity),
        }
    }

    pub(crate) fn set_relative<B: AudioBackend + ?Sized>(
        &mut self,
        hw: Option<&mut B>,
        relative: bool,
    ) -> Result<()> {
        match self {
            Self::Mono(s) => s.set_relative(hw, relative),
            Self::Stereo(s) => s.set_relative(hw, relative),
            Self::Streaming(s) => s.set_relative(hw, relative),
        }
    }

    pub(crate) fn set_max_distance<B: AudioBackend + ?Sized>(
        &mut self,
        hw: Option<&mut B>,
        distance: f32,
    ) -> Result<()> {
        match self {
            Self::Mono(s) => s.set_max_distance(hw, distance),
            Self::Stereo(s) => s.set_max_distance(hw, distance),
            Self::Streaming(s) => s.set_max_distance(hw, distance),
        }
    }

    pub(crate) fn set_elapsed_samples<B: AudioBackend + ?Sized>(
        &mut self,
        hw: Option<&mut B>,
        samples: u64,
    ) -> Result<()> {
        match self {
            Self::Mono(s) => s.set_elapsed_samples(hw, samples),
            Self::Stereo(s) => s.set_elapsed_samples(hw, samples),
            Self::Streaming(s) => s.set_elapsed_samples(hw, samples),
        }
    }

    pub(crate) fn elapsed_samples<B: AudioBackend + ?Sized>(&self, hw: Option<&B>) -> Result<u64> {
        match self {
            Self::Mono(s) => s.elapsed_samples(hw),
            Self::Stereo(s) => s.elapsed_samples(hw),
            Self::Streaming(s) => s.elapsed_samples(hw),
        }
    }

    /// Releases the hardware source, keeping the playback offset in shadow
    /// state. With `hw` of `None` the source is simply forgotten.
    pub(crate) fn detach<B: AudioBackend + ?Sized>(&mut self, hw: Option<&mut B>) -> Result<()> {
        match self {
            Self::Mono(s) => s.detach(hw),
            Self::Stereo(s) => s.detach(hw),
            Self::Streaming(s) => s.detach(hw),
        }
    }
}

impl Transport for SoundHandle {
    fn play<B: AudioBackend + ?Sized>(&mut self, hw: &mut B) -> Result<()> {
        match self {
            Self::Mono(s) => s.play(hw),
            Self::Stereo(s) => s.play(hw),
            Self::Streaming(s) => s.play(hw),
        }
    }

    fn stop<B: AudioBackend + ?Sized>(&mut self, hw: &mut B) -> Result<()> {
        match self {
            Self::Mono(s) => s.stop(hw),
            Self::Stereo(s) => s.stop(hw),
            Self::Streaming(s) => s.stop(hw),
        }
    }

    fn pause<B: AudioBackend + ?Sized>(&mut self, hw: &mut B) -> Result<()> {
        match self {
            Self::Mono(s) => s.pause(hw),
            Self::Stereo(s) => s.pause(hw),
            Self::Streaming(s) => s.pause(hw),
        }
    }

    fn apply_looping<B: AudioBackend + ?Sized>(
        &mut self,
        hw: &mut B,
        looping: bool,
    ) -> Result<()> {
        match self {
            Self::Mono(s) => s.apply_looping(hw, looping),
            Self::Stereo(s) => s.apply_looping(hw, looping),
            Self::Streaming(s) => s.apply_looping(hw, looping),
        }
    }

    fn set_gain<B: AudioBackend + ?Sized>(&mut self, hw: Option<&mut B>, gain: f32) -> Result<()> {
        match self {
            Self::Mono(s) => s.set_gain(hw, gain),
            Self::Stereo(s) => s.set_gain(hw, gain),
            Self::Streaming(s) => s.set_gain(hw, gain),
        }
    }

    fn gain(&self) -> f32 {
        match self {
            Self::Mono(s) => s.gain(),
            Self::Stereo(s) => s.gain(),
            Self::Streaming(s) => s.gain(),
        }
    }

    fn is_playing<B: AudioBackend + ?Sized>(&self, hw: Option<&B>) -> Result<bool> {
        match self {
            Self::Mono(s) => s.is_playing(hw),
            Self::Stereo(s) => s.is_playing(hw),
            Self::Streaming(s) => s.is_playing(hw),
        }
    }
}
