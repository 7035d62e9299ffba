//! Spatial sound system with deferred device initialization.
//!
//! Sounds can be created, positioned and told to play before an output
//! device exists. Attribute changes are kept in per-sound shadow state and
//! transport actions are queued; [`SoundSystem::initialize`] uploads the
//! pending resources, binds sources and replays the queue in order. Long
//! sounds stream through two alternating hardware buffers refilled by
//! [`SoundSystem::process`].
//!
//! ```no_run
//! use soundstage::{HeadlessBackend, PcmResource, SoundSystem, SoundSystemDesc};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn main() -> soundstage::Result<()> {
//! let mut system = SoundSystem::new(SoundSystemDesc::default(), HeadlessBackend::new())?;
//! let beep = Arc::new(PcmResource::from_i16_samples(&[0; 44100], 1, 44100));
//! let id = system.create_sound(beep)?;
//! system.sound(id)?.play()?;
//!
//! system.initialize()?;
//! system.process(Duration::from_millis(16))?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod fade;
pub mod math;
pub mod queue;
pub mod resource;
pub mod scene;
pub mod sound;
mod system;

pub use backend::{AudioBackend, CpalBackend, DistanceModel, HeadlessBackend};
pub use config::SoundSystemDesc;
pub use error::{Result, SoundError};
pub use events::SoundEvent;
pub use math::{Pose, Quat, Vec3};
pub use queue::Action;
pub use resource::{
    ConvertToMono, FileStream, LoadOptions, MemoryStream, PcmResource, SharedStream,
    SoundResource, StreamingSoundResource, load_pcm_file,
};
pub use scene::{SceneNode, SceneTraversal, SceneVisitor, SoundNodeVisitor};
pub use sound::{SoundHandle, SoundId, SoundKind};
pub use system::{DeviceState, SoundMut, SoundSystem};
