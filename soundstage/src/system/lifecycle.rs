use super::{DeviceState, SoundSystem};
use crate::backend::AudioBackend;
use crate::error::{Result, SoundError};
use crate::events::SoundEvent;
use crate::math::Vec3;
use crate::queue::QueuedAction;
use crate::sound::{SoundHandle, SoundId};

impl<B: AudioBackend> SoundSystem<B> {
    /// Opens the device and brings every pending sound to life.
    ///
    /// Resources of pending sounds are uploaded, their sources bound with
    /// the shadow state applied, and queued actions replayed in order. If the
    /// device cannot be opened the system stays uninitialized and keeps
    /// tracking shadow state; this is reported as
    /// [`SoundEvent::DeviceUnavailable`], not as an error. Calling this on a
    /// ready system does nothing.
    ///
    /// # Errors
    ///
    /// The first error met while uploading, binding or replaying. The device
    /// stays ready and every other sound is brought up; a sound that could
    /// not be bound stays pending together with its queued actions.
    pub fn initialize(&mut self) -> Result<()> {
        if self.state == DeviceState::Ready {
            log::debug!("Sound system already initialized");
            return Ok(());
        }

        let device_name = match self.backend.open_device(self.selected_device.as_deref()) {
            Ok(name) => name,
            Err(e) => {
                self.degrade(e);
                return Ok(());
            }
        };
        if let Err(e) = self.backend.create_context() {
            self.backend.close_device();
            self.degrade(e);
            return Ok(());
        }
        self.backend.set_listener_position(Vec3::ZERO)?;
        self.backend.set_listener_velocity(self.listener_velocity)?;
        self.backend.set_distance_model(self.desc.distance_model)?;
        self.state = DeviceState::Ready;
        log::info!("Sound device ready: {}", device_name);

        let mut first_error = None;
        let mut uploaded = Vec::with_capacity(self.pending.len());
        for id in self.pending.clone() {
            match self.upload_sound(id) {
                Ok(()) => uploaded.push(id),
                Err(e) => {
                    log::warn!("Failed to upload {}: {}", id, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        for id in uploaded {
            match self.bind_sound(id) {
                Ok(()) => self.pending.retain(|pending| *pending != id),
                Err(e) => {
                    log::warn!("Failed to bind {}: {}", id, e);
                    self.unbind(id);
                    first_error.get_or_insert(e);
                }
            }
        }
        log::debug!("{} sound(s) left pending", self.pending.len());

        let queued = self.queues.drain();
        log::debug!("Replaying {} queued action(s)", queued.len());
        for QueuedAction { action, target } in queued {
            if self.pending.contains(&target) {
                if let Some(handle) = self.sounds.get(&target) {
                    self.queues.push(handle.kind(), action, target);
                }
                continue;
            }
            if let Err(e) = self.execute(target, action) {
                log::warn!("Failed to replay {:?} on {}: {}", action, target, e);
                first_error.get_or_insert(e);
            }
        }

        self.events.push(SoundEvent::DeviceReady { device_name });
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Drops a half-bound source, keeping the shadow offset.
    fn unbind(&mut self, id: SoundId) {
        let Some(handle) = self.sounds.get_mut(&id) else {
            return;
        };
        let offset = handle.shadow().elapsed_samples;
        if let Err(e) = handle.detach(Some(&mut self.backend)) {
            log::warn!("Failed to release source of {}: {}", id, e);
        }
        if let Err(e) = handle.set_elapsed_samples(None::<&mut B>, offset) {
            log::warn!("Failed to restore offset of {}: {}", id, e);
        }
    }

    fn degrade(&mut self, error: SoundError) {
        log::warn!("Audio device unavailable, continuing without sound: {}", error);
        self.events.push(SoundEvent::DeviceUnavailable {
            reason: error.to_string(),
        });
    }

    /// Closes the device.
    ///
    /// Every live sound keeps its playback offset in shadow state and goes
    /// back to the pending list, so a later [`initialize`](Self::initialize)
    /// binds it again. Buffers are deleted and will be uploaded again. The
    /// device is closed even when releasing a source fails; the first such
    /// error is returned.
    pub fn deinitialize(&mut self) -> Result<()> {
        if self.state != DeviceState::Ready {
            return Ok(());
        }
        self.state = DeviceState::ShuttingDown;
        log::info!("Shutting down sound device");

        let released = self.release_hardware();
        self.backend.destroy_context();
        self.backend.close_device();
        self.state = DeviceState::Uninitialized;
        self.events.push(SoundEvent::DeviceClosed);
        released
    }

    fn release_hardware(&mut self) -> Result<()> {
        self.fades.clear();
        self.streaming.clear();

        let Self {
            sounds,
            backend,
            cache,
            pending,
            ..
        } = self;
        let mut result = Ok(());
        let mut ids: Vec<SoundId> = sounds.keys().copied().collect();
        ids.sort();
        for id in ids {
            let Some(handle) = sounds.get_mut(&id) else {
                continue;
            };
            if !handle.is_live() {
                continue;
            }
            if let Err(e) = handle.detach(Some(&mut *backend)) {
                log::warn!("Failed to release source of {}: {}", id, e);
                result = result.and(Err(e));
            }
            if !pending.contains(&id) {
                pending.push(id);
            }
        }
        result.and(cache.invalidate(Some(&mut *backend)))
    }

    /// Uploads the resources a sound plays from.
    pub(super) fn upload_sound(&mut self, id: SoundId) -> Result<()> {
        let Self {
            sounds,
            backend,
            cache,
            desc,
            ..
        } = self;
        let handle = sounds.get(&id).ok_or(SoundError::UnknownSound(id))?;
        let chunk = desc.initial_chunk_bytes;
        match handle {
            SoundHandle::Mono(sound) => {
                cache.ensure_uploaded(sound.key(), backend, chunk)?;
            }
            SoundHandle::Stereo(sound) => {
                cache.ensure_uploaded(sound.left().key(), backend, chunk)?;
                cache.ensure_uploaded(sound.right().key(), backend, chunk)?;
            }
            SoundHandle::Streaming(sound) => {
                cache.ensure_uploaded(sound.key(), backend, chunk)?;
            }
        }
        Ok(())
    }

    /// Binds a hardware source to an uploaded sound.
    pub(super) fn bind_sound(&mut self, id: SoundId) -> Result<()> {
        let Self {
            sounds,
            backend,
            cache,
            desc,
            ..
        } = self;
        let handle = sounds.get_mut(&id).ok_or(SoundError::UnknownSound(id))?;
        let chunk = desc.initial_chunk_bytes;
        match handle {
            SoundHandle::Mono(sound) => {
                let buffer = cache.ensure_uploaded(sound.key(), backend, chunk)?.single()?;
                sound.bind(backend, buffer, desc)
            }
            SoundHandle::Stereo(sound) => {
                let left = cache
                    .ensure_uploaded(sound.left().key(), backend, chunk)?
                    .single()?;
                let right = cache
                    .ensure_uploaded(sound.right().key(), backend, chunk)?
                    .single()?;
                sound.bind(backend, left, right, desc)
            }
            SoundHandle::Streaming(sound) => {
                let set = cache.ensure_uploaded(sound.key(), backend, chunk)?;
                sound.bind(backend, set, desc)
            }
        }
    }
}
