//! The sound system: device lifecycle, sound table and per-tick processing.

mod dispatch;
mod handle;
mod lifecycle;
mod tick;

#[cfg(test)]
mod tests;

pub use handle::SoundMut;

use crate::backend::{AudioBackend, BufferFormat, CpalBackend};
use crate::cache::BufferCache;
use crate::config::SoundSystemDesc;
use crate::error::{Result, SoundError};
use crate::events::SoundEvent;
use crate::math::Vec3;
use crate::fade::FadeScheduler;
use crate::queue::ActionQueues;
use crate::resource::{SharedStream, SoundResource};
use crate::sound::{MonoSound, ShadowState, SoundHandle, SoundId, StereoSound, StreamingSound};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Lifecycle state of the output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceState {
    #[default]
    Uninitialized,
    Ready,
    /// Sources and buffers are being released
    ShuttingDown,
}

/// Owns the output device and every sound played on it.
///
/// Sounds can be created, configured and told to play before the device
/// exists. Transport actions issued while the device is not ready are queued
/// and replayed in order by [`initialize`](Self::initialize); attribute
/// changes are kept in each sound's shadow state and applied when its source
/// is bound.
///
/// The system is driven from a single thread: call
/// [`process`](Self::process) once per tick to refill streams and advance
/// fades, and [`render`](Self::render) to place the listener and sounds.
pub struct SoundSystem<B: AudioBackend = CpalBackend> {
    desc: SoundSystemDesc,
    backend: B,
    state: DeviceState,
    selected_device: Option<String>,
    sounds: HashMap<SoundId, SoundHandle>,
    next_sound_id: u64,
    /// Sounds waiting for a device, in creation order
    pending: Vec<SoundId>,
    cache: BufferCache,
    queues: ActionQueues,
    fades: FadeScheduler,
    /// Streaming sounds refilled every tick
    streaming: Vec<SoundId>,
    events: Vec<SoundEvent>,
    listener_velocity: Vec3,
    /// Time as seen by the last tick
    clock: Instant,
}

/// The backend, but only while the device is ready.
fn ready<B: AudioBackend>(state: DeviceState, backend: &mut B) -> Option<&mut B> {
    (state == DeviceState::Ready).then_some(backend)
}

impl SoundSystem<CpalBackend> {
    /// Creates a system that plays through the default cpal host.
    pub fn with_default_backend(desc: SoundSystemDesc) -> Result<Self> {
        Self::new(desc, CpalBackend::new())
    }
}

impl<B: AudioBackend> SoundSystem<B> {
    pub fn new(desc: SoundSystemDesc, backend: B) -> Result<Self> {
        desc.validate()?;
        Ok(Self {
            selected_device: desc.device_name.clone(),
            desc,
            backend,
            state: DeviceState::Uninitialized,
            sounds: HashMap::new(),
            next_sound_id: 0,
            pending: Vec::new(),
            cache: BufferCache::new(),
            queues: ActionQueues::new(),
            fades: FadeScheduler::new(),
            streaming: Vec::new(),
            events: Vec::new(),
            listener_velocity: Vec3::ZERO,
            clock: Instant::now(),
        })
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == DeviceState::Ready
    }

    pub fn desc(&self) -> &SoundSystemDesc {
        &self.desc
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Direct backend access, mainly for inspecting a
    /// [`HeadlessBackend`](crate::backend::HeadlessBackend) in tests.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn device_count(&self) -> usize {
        self.backend.device_names().len()
    }

    pub fn device_name(&self, index: usize) -> Option<String> {
        self.backend.device_names().into_iter().nth(index)
    }

    /// Selects the output device opened by the next [`initialize`](Self::initialize).
    pub fn set_device(&mut self, index: usize) -> Result<()> {
        let name = self.device_name(index).ok_or_else(|| {
            SoundError::Configuration(format!("No output device at index {}", index))
        })?;
        log::info!("Selected output device {}: {}", index, name);
        self.selected_device = Some(name);
        Ok(())
    }

    pub fn selected_device(&self) -> Option<&str> {
        self.selected_device.as_deref()
    }

    pub fn sound_count(&self) -> usize {
        self.sounds.len()
    }

    pub fn contains(&self, id: SoundId) -> bool {
        self.sounds.contains_key(&id)
    }

    /// Number of sounds waiting for the device
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Number of transport actions waiting for the device
    pub fn queued_action_count(&self) -> usize {
        self.queues.len()
    }

    /// Hardware uploads performed so far
    pub fn upload_count(&self) -> usize {
        self.cache.upload_count()
    }

    /// Drains the events collected since the last call.
    pub fn poll_events(&mut self) -> Vec<SoundEvent> {
        std::mem::take(&mut self.events)
    }

    fn shadow(&self) -> ShadowState {
        ShadowState::new(self.desc.max_distance)
    }

    /// Creates a sound from an in-memory resource.
    ///
    /// Mono resources play from one shared buffer; stereo resources are split
    /// into two mono halves driven together. When the device is ready the
    /// resource is uploaded and a source bound at once, otherwise both happen
    /// on the next [`initialize`](Self::initialize).
    ///
    /// # Errors
    ///
    /// [`SoundError::UnsupportedSoundFormat`] for more than two channels and
    /// [`SoundError::UnsupportedFormat`] for sample widths other than 8 or 16
    /// bits, whatever the device state.
    pub fn create_sound(&mut self, resource: Arc<dyn SoundResource>) -> Result<SoundId> {
        let channels = resource.channels();
        if !matches!(channels, 1 | 2) {
            return Err(SoundError::UnsupportedSoundFormat(channels));
        }
        BufferFormat::from_layout(channels, resource.bits_per_sample())?;

        let handle = if channels == 1 {
            let key = self.cache.register_static(&resource);
            SoundHandle::Mono(MonoSound::new(resource, key, self.shadow()))
        } else {
            let (parent_key, left, right) = self.cache.split_stereo(&resource)?;
            let left_key = self.cache.register_static(&left);
            let right_key = self.cache.register_static(&right);
            SoundHandle::Stereo(StereoSound::new(
                parent_key,
                MonoSound::new(left, left_key, self.shadow()),
                MonoSound::new(right, right_key, self.shadow()),
            ))
        };
        self.insert(handle)
    }

    /// Creates a sound played incrementally from `stream`.
    ///
    /// # Errors
    ///
    /// [`SoundError::StreamInUse`] if the stream already backs a sound, and
    /// the format errors of [`create_sound`](Self::create_sound).
    pub fn create_stream(&mut self, stream: SharedStream) -> Result<SoundId> {
        let key = self.cache.register_stream(&stream)?;
        let sound = match StreamingSound::new(stream, key, self.shadow()) {
            Ok(sound) => sound,
            Err(e) => {
                self.cache.release(key, None::<&mut B>)?;
                return Err(e);
            }
        };
        self.insert(SoundHandle::Streaming(sound))
    }

    fn insert(&mut self, handle: SoundHandle) -> Result<SoundId> {
        let id = SoundId::new(self.next_sound_id);
        self.next_sound_id += 1;
        log::debug!("Created {:?} sound {}", handle.kind(), id);
        self.sounds.insert(id, handle);

        if self.state != DeviceState::Ready {
            self.pending.push(id);
            return Ok(id);
        }
        if let Err(e) = self.upload_sound(id).and_then(|()| self.bind_sound(id)) {
            if let Err(cleanup) = self.destroy_sound(id) {
                log::warn!("Failed to clean up {} after bind error: {}", id, cleanup);
            }
            return Err(e);
        }
        Ok(id)
    }

    /// Destroys a sound, releasing its source and, for the last user of a
    /// resource, its buffers.
    ///
    /// Actions still queued for the sound are discarded first.
    pub fn destroy_sound(&mut self, id: SoundId) -> Result<()> {
        if !self.sounds.contains_key(&id) {
            return Err(SoundError::UnknownSound(id));
        }
        let purged = self.queues.purge(id);
        self.pending.retain(|pending| *pending != id);
        self.streaming.retain(|playing| *playing != id);
        self.fades.cancel(id);

        let Some(mut handle) = self.sounds.remove(&id) else {
            return Err(SoundError::UnknownSound(id));
        };
        let Self {
            backend,
            state,
            cache,
            ..
        } = self;
        let mut hw = ready(*state, backend);
        // Buffers are released even when the source could not be
        let mut result = handle.detach(hw.as_deref_mut());
        let keys = match &handle {
            SoundHandle::Mono(sound) => vec![sound.key()],
            SoundHandle::Stereo(sound) => {
                cache.release_split(sound.parent_key());
                vec![sound.left().key(), sound.right().key()]
            }
            SoundHandle::Streaming(sound) => vec![sound.key()],
        };
        for key in keys {
            result = result.and(cache.release(key, hw.as_deref_mut()).map(|_| ()));
        }
        log::debug!("Destroyed sound {} ({} queued actions dropped)", id, purged);
        result
    }

    /// Borrows a sound for control.
    pub fn sound(&mut self, id: SoundId) -> Result<SoundMut<'_, B>> {
        if !self.sounds.contains_key(&id) {
            return Err(SoundError::UnknownSound(id));
        }
        Ok(SoundMut::new(self, id))
    }

    /// Read-only view of a sound's handle.
    pub fn handle(&self, id: SoundId) -> Option<&SoundHandle> {
        self.sounds.get(&id)
    }
}

impl<B: AudioBackend> Drop for SoundSystem<B> {
    fn drop(&mut self) {
        if let Err(e) = self.deinitialize() {
            log::warn!("Failed to shut down sound device cleanly: {}", e);
        }
    }
}
