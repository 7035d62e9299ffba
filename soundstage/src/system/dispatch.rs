use super::{DeviceState, SoundSystem};
use crate::backend::AudioBackend;
use crate::error::{Result, SoundError};
use crate::queue::Action;
use crate::sound::{SoundId, SoundKind, Transport};

impl<B: AudioBackend> SoundSystem<B> {
    /// Runs a transport action now, or queues it until the device is ready
    /// and the sound is bound.
    pub fn dispatch(&mut self, id: SoundId, action: Action) -> Result<()> {
        let kind = self
            .sounds
            .get(&id)
            .ok_or(SoundError::UnknownSound(id))?
            .kind();
        if self.state != DeviceState::Ready || self.pending.contains(&id) {
            self.queues.push(kind, action, id);
            return Ok(());
        }
        self.execute(id, action)
    }

    /// Applies an action against the live device.
    pub(super) fn execute(&mut self, id: SoundId, action: Action) -> Result<()> {
        let Self {
            sounds,
            backend,
            fades,
            streaming,
            desc,
            clock,
            ..
        } = self;
        let handle = sounds.get_mut(&id).ok_or(SoundError::UnknownSound(id))?;
        log::trace!("Executing {:?} on {}", action, id);

        match action {
            Action::Play => {
                handle.play(backend)?;
                if handle.kind() == SoundKind::Streaming && !streaming.contains(&id) {
                    streaming.push(id);
                }
            }
            Action::Stop => {
                handle.stop(backend)?;
                streaming.retain(|playing| *playing != id);
            }
            Action::Pause => {
                handle.pause(backend)?;
                streaming.retain(|playing| *playing != id);
            }
            Action::Loop => handle.apply_looping(backend, true)?,
            Action::NoLoop => handle.apply_looping(backend, false)?,
            Action::FadeUp => fades.add(id, handle.gain(), 1.0, desc.fade_duration, *clock),
            Action::FadeDown => fades.add(id, handle.gain(), 0.0, desc.fade_duration, *clock),
        }
        Ok(())
    }
}
