use super::{DeviceState, SoundSystem, ready};
use crate::backend::AudioBackend;
use crate::error::{Result, SoundError};
use crate::math::Vec3;
use crate::queue::Action;
use crate::sound::{SoundHandle, SoundId, SoundKind, Transport};
use std::time::Duration;

/// A sound borrowed from its [`SoundSystem`] for control.
///
/// Every method works whatever the device state. Attribute setters update the
/// shadow state and, when the sound has a live source, the hardware too.
/// Transport methods go through [`SoundSystem::dispatch`] so they are queued
/// until the device is ready.
pub struct SoundMut<'a, B: AudioBackend> {
    system: &'a mut SoundSystem<B>,
    id: SoundId,
}

impl<'a, B: AudioBackend> SoundMut<'a, B> {
    pub(super) fn new(system: &'a mut SoundSystem<B>, id: SoundId) -> Self {
        Self { system, id }
    }

    pub fn id(&self) -> SoundId {
        self.id
    }

    fn handle(&self) -> Result<&SoundHandle> {
        self.system
            .sounds
            .get(&self.id)
            .ok_or(SoundError::UnknownSound(self.id))
    }

    /// The handle plus the backend when the device is ready.
    fn parts(&mut self) -> Result<(&mut SoundHandle, Option<&mut B>)> {
        let SoundSystem {
            sounds,
            backend,
            state,
            ..
        } = &mut *self.system;
        let handle = sounds
            .get_mut(&self.id)
            .ok_or(SoundError::UnknownSound(self.id))?;
        Ok((handle, ready(*state, backend)))
    }

    fn shared_backend(&self) -> Option<&B> {
        (self.system.state == DeviceState::Ready).then_some(&self.system.backend)
    }

    pub fn kind(&self) -> Result<SoundKind> {
        Ok(self.handle()?.kind())
    }

    pub fn play(&mut self) -> Result<()> {
        self.system.dispatch(self.id, Action::Play)
    }

    pub fn stop(&mut self) -> Result<()> {
        self.system.dispatch(self.id, Action::Stop)
    }

    pub fn pause(&mut self) -> Result<()> {
        self.system.dispatch(self.id, Action::Pause)
    }

    /// Sets the looping flag at once and dispatches the matching action.
    pub fn set_looping(&mut self, looping: bool) -> Result<()> {
        self.parts()?.0.set_looping_flag(looping);
        let action = if looping { Action::Loop } else { Action::NoLoop };
        self.system.dispatch(self.id, action)
    }

    pub fn looping(&self) -> Result<bool> {
        Ok(self.handle()?.shadow().looping)
    }

    /// Ramps gain to 1.0 over the configured fade duration.
    pub fn fade_up(&mut self) -> Result<()> {
        self.system.dispatch(self.id, Action::FadeUp)
    }

    /// Ramps gain to 0.0 over the configured fade duration.
    pub fn fade_down(&mut self) -> Result<()> {
        self.system.dispatch(self.id, Action::FadeDown)
    }

    /// Negative values are kept but reach the hardware as 0.
    pub fn set_gain(&mut self, gain: f32) -> Result<()> {
        let (handle, hw) = self.parts()?;
        handle.set_gain(hw, gain)
    }

    pub fn gain(&self) -> Result<f32> {
        Ok(self.handle()?.gain())
    }

    pub fn set_position(&mut self, position: Vec3) -> Result<()> {
        let (handle, hw) = self.parts()?;
        handle.set_position(hw, position)
    }

    pub fn position(&self) -> Result<Vec3> {
        Ok(self.handle()?.shadow().position)
    }

    pub fn set_velocity(&mut self, velocity: Vec3) -> Result<()> {
        let (handle, hw) = self.parts()?;
        handle.set_velocity(hw, velocity)
    }

    pub fn velocity(&self) -> Result<Vec3> {
        Ok(self.handle()?.shadow().velocity)
    }

    /// Interprets the position relative to the listener.
    pub fn set_relative_position(&mut self, relative: bool) -> Result<()> {
        let (handle, hw) = self.parts()?;
        handle.set_relative(hw, relative)
    }

    pub fn relative_position(&self) -> Result<bool> {
        Ok(self.handle()?.shadow().relative)
    }

    pub fn set_max_distance(&mut self, distance: f32) -> Result<()> {
        let (handle, hw) = self.parts()?;
        handle.set_max_distance(hw, distance)
    }

    pub fn max_distance(&self) -> Result<f32> {
        Ok(self.handle()?.shadow().max_distance)
    }

    /// Moves playback to `samples` frames from the start.
    pub fn set_elapsed_samples(&mut self, samples: u64) -> Result<()> {
        let (handle, hw) = self.parts()?;
        handle.set_elapsed_samples(hw, samples)
    }

    pub fn elapsed_samples(&self) -> Result<u64> {
        self.handle()?.elapsed_samples(self.shared_backend())
    }

    pub fn set_elapsed_time(&mut self, elapsed: Duration) -> Result<()> {
        let frequency = self.handle()?.frequency();
        let samples = (elapsed.as_secs_f64() * frequency as f64).round() as u64;
        self.set_elapsed_samples(samples)
    }

    pub fn elapsed_time(&self) -> Result<Duration> {
        let samples = self.elapsed_samples()?;
        Ok(samples_to_duration(samples, self.handle()?.frequency()))
    }

    /// Length in sample frames, 0 for streams of unknown length
    pub fn length_in_samples(&self) -> Result<u64> {
        Ok(self.handle()?.length_in_samples())
    }

    pub fn length(&self) -> Result<Duration> {
        let handle = self.handle()?;
        Ok(samples_to_duration(
            handle.length_in_samples(),
            handle.frequency(),
        ))
    }

    pub fn time_left(&self) -> Result<Duration> {
        Ok(self.length()?.saturating_sub(self.elapsed_time()?))
    }

    /// True when the playback offset has reached the end of a sound of known
    /// length.
    pub fn is_at_end(&self) -> Result<bool> {
        let length = self.length_in_samples()?;
        Ok(length > 0 && self.elapsed_samples()? >= length)
    }

    /// Always false while the device is not ready.
    ///
    /// # Errors
    ///
    /// [`SoundError::Consistency`] if the halves of a stereo sound disagree.
    pub fn is_playing(&self) -> Result<bool> {
        self.handle()?.is_playing(self.shared_backend())
    }

    /// Destroys the sound; see [`SoundSystem::destroy_sound`].
    pub fn destroy(self) -> Result<()> {
        self.system.destroy_sound(self.id)
    }
}

fn samples_to_duration(samples: u64, frequency: u32) -> Duration {
    if frequency == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(samples as f64 / frequency as f64)
}
