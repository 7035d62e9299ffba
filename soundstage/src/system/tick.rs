use super::{DeviceState, SoundSystem, ready};
use crate::backend::AudioBackend;
use crate::error::Result;
use crate::events::SoundEvent;
use crate::math::{Pose, Vec3};
use crate::scene::{SceneTraversal, SoundNodeVisitor};
use crate::sound::{SoundHandle, SoundId, Transport};
use std::time::{Duration, Instant};

impl<B: AudioBackend> SoundSystem<B> {
    /// Advances the system clock by `delta` and runs one tick.
    pub fn process(&mut self, delta: Duration) -> Result<()> {
        let now = self.clock + delta;
        self.process_at(now)
    }

    /// Runs one tick at `now`: collects backend errors, advances fades and
    /// refills playing streams.
    ///
    /// The clock never moves backwards; an earlier `now` is ignored.
    pub fn process_at(&mut self, now: Instant) -> Result<()> {
        if now > self.clock {
            self.clock = now;
        }
        for error in self.backend.take_errors() {
            log::error!("Audio backend error: {}", error);
            self.events.push(SoundEvent::BackendError { error });
        }
        if self.state != DeviceState::Ready {
            return Ok(());
        }
        self.advance_fades()?;
        self.refill_streams()
    }

    fn advance_fades(&mut self) -> Result<()> {
        let Self {
            sounds,
            backend,
            fades,
            events,
            clock,
            ..
        } = self;
        for step in fades.advance(*clock) {
            let Some(handle) = sounds.get_mut(&step.sound) else {
                continue;
            };
            handle.set_gain(Some(&mut *backend), step.gain)?;
            if step.finished {
                log::debug!("Fade on {} completed at gain {}", step.sound, step.gain);
                events.push(SoundEvent::FadeCompleted {
                    sound: step.sound,
                    gain: step.gain,
                });
            }
        }
        Ok(())
    }

    fn refill_streams(&mut self) -> Result<()> {
        let Self {
            sounds,
            backend,
            streaming,
            events,
            desc,
            ..
        } = self;
        let mut finished: Vec<SoundId> = Vec::new();
        for &id in streaming.iter() {
            let Some(SoundHandle::Streaming(sound)) = sounds.get_mut(&id) else {
                finished.push(id);
                continue;
            };
            let outcome = sound.refill(backend, desc.refill_chunk_bytes)?;
            if outcome.pulls > 0 {
                log::trace!("Refilled {} with {} chunk(s)", id, outcome.pulls);
            }
            if outcome.looped {
                events.push(SoundEvent::StreamLooped { sound: id });
            }
            if outcome.finished {
                log::debug!("Stream {} finished", id);
                events.push(SoundEvent::StreamFinished { sound: id });
                finished.push(id);
            }
        }
        streaming.retain(|id| !finished.contains(id));
        Ok(())
    }

    /// Sets the listener velocity used for doppler shift. Kept across device
    /// restarts.
    pub fn set_listener_velocity(&mut self, velocity: Vec3) -> Result<()> {
        self.listener_velocity = velocity;
        if let Some(backend) = ready(self.state, &mut self.backend) {
            backend.set_listener_velocity(velocity)?;
        }
        Ok(())
    }

    pub fn listener_velocity(&self) -> Vec3 {
        self.listener_velocity
    }

    /// Places the listener at `listener` and every sound of `scene` at its
    /// accumulated position.
    ///
    /// Sounds without a source only have their shadow position updated.
    /// Scene entries naming unknown sounds are skipped.
    pub fn render<S: SceneTraversal + ?Sized>(&mut self, listener: &Pose, scene: &S) -> Result<()> {
        if self.state == DeviceState::Ready {
            self.backend.set_listener_position(listener.position)?;
            self.backend
                .set_listener_orientation(listener.forward(), listener.up())?;
        }

        let mut visitor = SoundNodeVisitor::new();
        scene.accept(&mut visitor);

        let Self {
            sounds,
            backend,
            state,
            ..
        } = self;
        for (id, position) in visitor.into_placements() {
            let Some(handle) = sounds.get_mut(&id) else {
                log::trace!("Scene references unknown sound {}", id);
                continue;
            };
            handle.set_position(ready(*state, backend), position)?;
        }
        Ok(())
    }

    /// Whether `id` is in the set of streams refilled each tick
    pub fn is_streaming(&self, id: SoundId) -> bool {
        self.streaming.contains(&id)
    }
}
