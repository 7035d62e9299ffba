use super::{MonoSound, ShadowState, Transport};
use crate::backend::{AudioBackend, BufferId, SourceId};
use crate::cache::ResourceKey;
use crate::config::SoundSystemDesc;
use crate::error::{Result, SoundError};
use crate::math::Vec3;

/// A stereo sound played as two mono halves kept in lockstep.
///
/// Every operation is applied to both channels; play, stop and pause reach
/// the hardware as a single call covering both sources.
pub struct StereoSound {
    parent_key: ResourceKey,
    left: MonoSound,
    right: MonoSound,
}

impl StereoSound {
    pub(crate) fn new(parent_key: ResourceKey, left: MonoSound, right: MonoSound) -> Self {
        Self {
            parent_key,
            left,
            right,
        }
    }

    pub fn left(&self) -> &MonoSound {
        &self.left
    }

    pub fn right(&self) -> &MonoSound {
        &self.right
    }

    /// Key of the stereo resource both halves were split from
    pub(crate) fn parent_key(&self) -> ResourceKey {
        self.parent_key
    }

    pub fn shadow(&self) -> &ShadowState {
        self.left.shadow()
    }

    pub(crate) fn bind<B: AudioBackend + ?Sized>(
        &mut self,
        hw: &mut B,
        left: BufferId,
        right: BufferId,
        desc: &SoundSystemDesc,
    ) -> Result<()> {
        self.left.bind(hw, left, desc)?;
        self.right.bind(hw, right, desc)
    }

    /// Detaches both halves even if the first one fails.
    pub(crate) fn detach<B: AudioBackend + ?Sized>(&mut self, mut hw: Option<&mut B>) -> Result<()> {
        let left = self.left.detach(hw.as_deref_mut());
        let right = self.right.detach(hw);
        left.and(right)
    }

    fn sources(&self) -> Result<[SourceId; 2]> {
        match (self.left.source(), self.right.source()) {
            (Some(left), Some(right)) => Ok([left, right]),
            _ => Err(SoundError::Consistency(
                "stereo sound has no sources".to_string(),
            )),
        }
    }

    pub(crate) fn set_looping_flag(&mut self, looping: bool) {
        self.left.set_looping_flag(looping);
        self.right.set_looping_flag(looping);
    }

    pub(crate) fn set_position<B: AudioBackend + ?Sized>(
        &mut self,
        mut hw: Option<&mut B>,
        position: Vec3,
    ) -> Result<()> {
        self.left.set_position(hw.as_deref_mut(), position)?;
        self.right.set_position(hw, position)
    }

    pub(crate) fn set_velocity<B: AudioBackend + ?Sized>(
        &mut self,
        mut hw: Option<&mut B>,
        velocity: Vec3,
    ) -> Result<()> {
        self.left.set_velocity(hw.as_deref_mut(), velocity)?;
        self.right.set_velocity(hw, velocity)
    }

    pub(crate) fn set_relative<B: AudioBackend + ?Sized>(
        &mut self,
        mut hw: Option<&mut B>,
        relative: bool,
    ) -> Result<()> {
        self.left.set_relative(hw.as_deref_mut(), relative)?;
        self.right.set_relative(hw, relative)
    }

    pub(crate) fn set_max_distance<B: AudioBackend + ?Sized>(
        &mut self,
        mut hw: Option<&mut B>,
        distance: f32,
    ) -> Result<()> {
        self.left.set_max_distance(hw.as_deref_mut(), distance)?;
        self.right.set_max_distance(hw, distance)
    }

    pub(crate) fn set_elapsed_samples<B: AudioBackend + ?Sized>(
        &mut self,
        mut hw: Option<&mut B>,
        samples: u64,
    ) -> Result<()> {
        self.left.set_elapsed_samples(hw.as_deref_mut(), samples)?;
        self.right.set_elapsed_samples(hw, samples)
    }

    pub(crate) fn elapsed_samples<B: AudioBackend + ?Sized>(&self, hw: Option<&B>) -> Result<u64> {
        self.left.elapsed_samples(hw)
    }
}

impl Transport for StereoSound {
    fn play<B: AudioBackend + ?Sized>(&mut self, hw: &mut B) -> Result<()> {
        hw.play_sources(&self.sources()?)
    }

    fn stop<B: AudioBackend + ?Sized>(&mut self, hw: &mut B) -> Result<()> {
        let sources = self.sources()?;
        self.left.set_elapsed_samples(None::<&mut B>, 0)?;
        self.right.set_elapsed_samples(None::<&mut B>, 0)?;
        hw.stop_sources(&sources)
    }

    fn pause<B: AudioBackend + ?Sized>(&mut self, hw: &mut B) -> Result<()> {
        hw.pause_sources(&self.sources()?)
    }

    fn apply_looping<B: AudioBackend + ?Sized>(
        &mut self,
        hw: &mut B,
        looping: bool,
    ) -> Result<()> {
        self.left.apply_looping(hw, looping)?;
        self.right.apply_looping(hw, looping)
    }

    fn set_gain<B: AudioBackend + ?Sized>(&mut self, mut hw: Option<&mut B>, gain: f32) -> Result<()> {
        self.left.set_gain(hw.as_deref_mut(), gain)?;
        self.right.set_gain(hw, gain)
    }

    fn gain(&self) -> f32 {
        self.left.gain()
    }

    /// Fails with [`SoundError::Consistency`] if the two halves disagree.
    fn is_playing<B: AudioBackend + ?Sized>(&self, hw: Option<&B>) -> Result<bool> {
        let left = self.left.is_playing(hw)?;
        let right = self.right.is_playing(hw)?;
        if left != right {
            return Err(SoundError::Consistency(format!(
                "stereo channels diverged: left playing {}, right playing {}",
                left, right
            )));
        }
        Ok(left)
    }
}
