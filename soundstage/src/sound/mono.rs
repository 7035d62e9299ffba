use super::{ShadowState, Transport, apply_shadow};
use crate::backend::{AudioBackend, BufferId, SourceFlag, SourceFloat, SourceId, SourceState, SourceVector};
use crate::cache::ResourceKey;
use crate::config::SoundSystemDesc;
use crate::error::{Result, SoundError};
use crate::math::Vec3;
use crate::resource::SoundResource;
use std::sync::Arc;

/// A single-channel sound played from one shared static buffer.
pub struct MonoSound {
    resource: Arc<dyn SoundResource>,
    key: ResourceKey,
    shadow: ShadowState,
    source: Option<SourceId>,
}

impl MonoSound {
    pub(crate) fn new(resource: Arc<dyn SoundResource>, key: ResourceKey, shadow: ShadowState) -> Self {
        Self {
            resource,
            key,
            shadow,
            source: None,
        }
    }

    pub fn resource(&self) -> &Arc<dyn SoundResource> {
        &self.resource
    }

    pub(crate) fn key(&self) -> ResourceKey {
        self.key
    }

    pub fn shadow(&self) -> &ShadowState {
        &self.shadow
    }

    /// Hardware source, once bound
    pub fn source(&self) -> Option<SourceId> {
        self.source
    }

    pub fn length_in_samples(&self) -> u64 {
        self.resource.sample_count()
    }

    pub fn frequency(&self) -> u32 {
        self.resource.frequency()
    }

    /// Creates the hardware source, attaches `buffer` and replays shadow state,
    /// including the looping flag.
    pub(crate) fn bind<B: AudioBackend + ?Sized>(
        &mut self,
        hw: &mut B,
        buffer: BufferId,
        desc: &SoundSystemDesc,
    ) -> Result<()> {
        let source = hw.gen_source()?;
        self.source = Some(source);
        hw.attach_buffer(source, Some(buffer))?;
        apply_shadow(hw, source, &self.shadow, desc)?;
        if self.shadow.looping {
            hw.set_source_flag(source, SourceFlag::Looping, true)?;
        }
        if self.shadow.elapsed_samples > 0 {
            hw.set_sample_offset(source, self.shadow.elapsed_samples)?;
        }
        log::trace!("Bound mono sound to source {}", source);
        Ok(())
    }

    pub(crate) fn detach<B: AudioBackend + ?Sized>(&mut self, hw: Option<&mut B>) -> Result<()> {
        let Some(source) = self.source.take() else {
            return Ok(());
        };
        if let Some(hw) = hw {
            self.shadow.elapsed_samples = match hw.source_state(source)? {
                SourceState::Playing | SourceState::Paused => hw.sample_offset(source)?,
                _ => 0,
            };
            hw.stop_sources(&[source])?;
            hw.delete_source(source)?;
        }
        Ok(())
    }

    fn live_source(&self) -> Result<SourceId> {
        self.source
            .ok_or_else(|| SoundError::Consistency("mono sound has no source".to_string()))
    }

    /// Runs `f` only when both a device and a bound source exist.
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

    pub(crate) fn set_looping_flag(&mut self, looping: bool) {
        self.shadow.looping = looping;
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

    pub(crate) fn set_elapsed_samples<B: AudioBackend + ?Sized>(
        &mut self,
        hw: Option<&mut B>,
        samples: u64,
    ) -> Result<()> {
        let samples = samples.min(self.length_in_samples());
        self.shadow.elapsed_samples = samples;
        self.with_source(hw, |hw, source| hw.set_sample_offset(source, samples))
    }

    pub(crate) fn elapsed_samples<B: AudioBackend + ?Sized>(&self, hw: Option<&B>) -> Result<u64> {
        match (hw, self.source) {
            (Some(hw), Some(source)) => hw.sample_offset(source),
            _ => Ok(self.shadow.elapsed_samples),
        }
    }
}

impl Transport for MonoSound {
    fn play<B: AudioBackend + ?Sized>(&mut self, hw: &mut B) -> Result<()> {
        hw.play_sources(&[self.live_source()?])
    }

    fn stop<B: AudioBackend + ?Sized>(&mut self, hw: &mut B) -> Result<()> {
        self.shadow.elapsed_samples = 0;
        hw.stop_sources(&[self.live_source()?])
    }

    fn pause<B: AudioBackend + ?Sized>(&mut self, hw: &mut B) -> Result<()> {
        hw.pause_sources(&[self.live_source()?])
    }

    fn apply_looping<B: AudioBackend + ?Sized>(
        &mut self,
        hw: &mut B,
        looping: bool,
    ) -> Result<()> {
        hw.set_source_flag(self.live_source()?, SourceFlag::Looping, looping)
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
        match (hw, self.source) {
            (Some(hw), Some(source)) => Ok(hw.source_state(source)? == SourceState::Playing),
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{HeadlessBackend, error_code};
    use crate::resource::PcmResource;

    fn ready_backend() -> HeadlessBackend {
        let mut hw = HeadlessBackend::new();
        hw.open_device(None).unwrap();
        hw.create_context().unwrap();
        hw
    }

    fn sound() -> MonoSound {
        let resource: Arc<dyn SoundResource> =
            Arc::new(PcmResource::new(vec![0; 2000], 1, 16, 1000));
        let key = ResourceKey::of_resource(&resource);
        MonoSound::new(resource, key, ShadowState::new(100.0))
    }

    fn uploaded(hw: &mut HeadlessBackend, sound: &MonoSound) -> BufferId {
        let buffer = hw.gen_buffer().unwrap();
        let data = sound.resource().data().to_vec();
        hw.buffer_data(buffer, crate::backend::BufferFormat::Mono16, &data, 1000)
            .unwrap();
        buffer
    }

    #[test]
    fn test_unbound_sound_updates_shadow_only() {
        let mut sound = sound();
        sound
            .set_position(None::<&mut HeadlessBackend>, Vec3::new(1.0, 2.0, 3.0))
            .unwrap();
        sound.set_gain(None::<&mut HeadlessBackend>, 0.5).unwrap();
        assert_eq!(sound.shadow().position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(sound.gain(), 0.5);
        assert!(!sound.is_playing(None::<&HeadlessBackend>).unwrap());
    }

    #[test]
    fn test_bind_replays_shadow_state() {
        let mut hw = ready_backend();
        let desc = SoundSystemDesc::default();
        let mut sound = sound();
        sound
            .set_position(None::<&mut HeadlessBackend>, Vec3::new(4.0, 0.0, 0.0))
            .unwrap();
        sound.set_gain(None::<&mut HeadlessBackend>, -2.0).unwrap();
        sound.set_elapsed_samples(None::<&mut HeadlessBackend>, 300).unwrap();

        let buffer = uploaded(&mut hw, &sound);
        sound.bind(&mut hw, buffer, &desc).unwrap();
        let source = sound.source().unwrap();

        assert_eq!(hw.attached_buffer(source), Some(buffer));
        assert_eq!(
            hw.source_vec3(source, SourceVector::Position),
            Some(Vec3::new(4.0, 0.0, 0.0))
        );
        assert_eq!(hw.source_f32(source, SourceFloat::Gain), Some(0.0));
        assert_eq!(sound.gain(), -2.0);
        assert_eq!(hw.source_f32(source, SourceFloat::MaxDistance), Some(100.0));
        assert_eq!(hw.sample_offset(source).unwrap(), 300);
        assert_eq!(hw.source_flag(source, SourceFlag::Looping), None);
    }

    #[test]
    fn test_bind_applies_looping_flag() {
        let mut hw = ready_backend();
        let mut sound = sound();
        sound.set_looping_flag(true);
        let buffer = uploaded(&mut hw, &sound);
        sound.bind(&mut hw, buffer, &SoundSystemDesc::default()).unwrap();
        let source = sound.source().unwrap();
        assert_eq!(hw.source_flag(source, SourceFlag::Looping), Some(true));
    }

    #[test]
    fn test_elapsed_is_clamped_to_length() {
        let mut sound = sound();
        sound
            .set_elapsed_samples(None::<&mut HeadlessBackend>, 5000)
            .unwrap();
        assert_eq!(
            sound.elapsed_samples(None::<&HeadlessBackend>).unwrap(),
            1000
        );
    }

    #[test]
    fn test_detach_keeps_offset() {
        let mut hw = ready_backend();
        let mut sound = sound();
        let buffer = uploaded(&mut hw, &sound);
        sound.bind(&mut hw, buffer, &SoundSystemDesc::default()).unwrap();
        sound.play(&mut hw).unwrap();
        let source = sound.source().unwrap();
        hw.set_sample_offset(source, 250).unwrap();

        sound.detach(Some(&mut hw)).unwrap();
        assert!(sound.source().is_none());
        assert_eq!(sound.shadow().elapsed_samples, 250);
        assert_eq!(hw.live_sources(), 0);
    }

    #[test]
    fn test_hardware_failure_propagates() {
        let mut hw = ready_backend();
        let mut sound = sound();
        let buffer = uploaded(&mut hw, &sound);
        sound.bind(&mut hw, buffer, &SoundSystemDesc::default()).unwrap();
        hw.fail_next_call(error_code::INVALID_VALUE);
        assert!(matches!(
            sound.set_gain(Some(&mut hw), 0.3),
            Err(SoundError::HardwareCall {
                code: error_code::INVALID_VALUE,
                ..
            })
        ));
    }
}
