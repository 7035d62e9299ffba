//! Hardware buffer cache keyed by resource identity.

use crate::backend::{AudioBackend, BufferFormat, BufferId};
use crate::error::{Result, SoundError};
use crate::resource::{SharedStream, SoundResource, StreamingSoundResource, split_stereo};
use std::collections::HashMap;
use std::sync::Arc;

/// Identity of a resource: the address of its `Arc` allocation.
///
/// Two resources with identical contents get different keys. The cache keeps
/// a clone of the `Arc` so an address is never reused while it is a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceKey(usize);

impl ResourceKey {
    pub fn of_resource(resource: &Arc<dyn SoundResource>) -> Self {
        Self(Arc::as_ptr(resource) as *const () as usize)
    }

    pub fn of_stream(stream: &SharedStream) -> Self {
        Self(Arc::as_ptr(stream) as *const () as usize)
    }
}

/// Hardware buffers holding a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferSet {
    /// A whole static resource
    Single(BufferId),
    /// The two primed chunks of a stream and their byte lengths
    Double {
        buffers: [BufferId; 2],
        lengths: [usize; 2],
    },
}

impl BufferSet {
    pub fn single(&self) -> Result<BufferId> {
        match self {
            Self::Single(buffer) => Ok(*buffer),
            Self::Double { .. } => Err(SoundError::Consistency(
                "expected a single buffer, found a streaming pair".to_string(),
            )),
        }
    }

    pub fn double(&self) -> Result<([BufferId; 2], [usize; 2])> {
        match self {
            Self::Double { buffers, lengths } => Ok((*buffers, *lengths)),
            Self::Single(_) => Err(SoundError::Consistency(
                "expected a streaming buffer pair, found a single buffer".to_string(),
            )),
        }
    }

    pub fn ids(&self) -> Vec<BufferId> {
        match self {
            Self::Single(buffer) => vec![*buffer],
            Self::Double { buffers, .. } => buffers.to_vec(),
        }
    }
}

enum CachedResource {
    Static(Arc<dyn SoundResource>),
    Stream(SharedStream),
}

struct CacheEntry {
    resource: CachedResource,
    /// `None` until uploaded
    buffers: Option<BufferSet>,
    users: usize,
}

struct StereoSplit {
    // Keeps the parent allocation alive so its address stays a valid key.
    _parent: Arc<dyn SoundResource>,
    left: Arc<dyn SoundResource>,
    right: Arc<dyn SoundResource>,
    users: usize,
}

/// Maps resources to their hardware buffers, uploading each at most once.
#[derive(Default)]
pub struct BufferCache {
    entries: HashMap<ResourceKey, CacheEntry>,
    splits: HashMap<ResourceKey, StereoSplit>,
    uploads: usize,
}

impl BufferCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one more user of a static resource.
    pub fn register_static(&mut self, resource: &Arc<dyn SoundResource>) -> ResourceKey {
        let key = ResourceKey::of_resource(resource);
        self.entries
            .entry(key)
            .or_insert_with(|| CacheEntry {
                resource: CachedResource::Static(resource.clone()),
                buffers: None,
                users: 0,
            })
            .users += 1;
        key
    }

    /// Registers a stream. A stream has a single read position, so it can
    /// back only one sound at a time.
    pub fn register_stream(&mut self, stream: &SharedStream) -> Result<ResourceKey> {
        let key = ResourceKey::of_stream(stream);
        if self.entries.contains_key(&key) {
            return Err(SoundError::StreamInUse);
        }
        self.entries.insert(
            key,
            CacheEntry {
                resource: CachedResource::Stream(stream.clone()),
                buffers: None,
                users: 1,
            },
        );
        Ok(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of uploads performed
    pub fn upload_count(&self) -> usize {
        self.uploads
    }

    pub fn buffers(&self, key: ResourceKey) -> Option<BufferSet> {
        self.entries.get(&key).and_then(|entry| entry.buffers)
    }

    /// Uploads the resource behind `key` unless it already is.
    ///
    /// Streams are rewound and two chunks of `initial_chunk_bytes`, rounded
    /// down to whole frames, are primed from their head.
    pub fn ensure_uploaded<B: AudioBackend + ?Sized>(
        &mut self,
        key: ResourceKey,
        hw: &mut B,
        initial_chunk_bytes: usize,
    ) -> Result<BufferSet> {
        let entry = self
            .entries
            .get_mut(&key)
            .ok_or_else(|| SoundError::Consistency(format!("{:?} is not registered", key)))?;
        if let Some(set) = entry.buffers {
            return Ok(set);
        }

        let set = match &entry.resource {
            CachedResource::Static(resource) => {
                let format =
                    BufferFormat::from_layout(resource.channels(), resource.bits_per_sample())?;
                let buffer = hw.gen_buffer()?;
                if let Err(e) = hw.buffer_data(buffer, format, resource.data(), resource.frequency())
                {
                    hw.delete_buffer(buffer)?;
                    return Err(e);
                }
                log::debug!(
                    "Uploaded {} bytes of {:?} into buffer {}",
                    resource.data().len(),
                    format,
                    buffer
                );
                BufferSet::Single(buffer)
            }
            CachedResource::Stream(stream) => {
                let mut stream = stream.lock().map_err(|_| SoundError::poisoned("stream"))?;
                let format = BufferFormat::from_layout(stream.channels(), stream.bits_per_sample())?;
                let frequency = stream.frequency();
                stream.seek(0)?;

                let mut chunk = vec![0u8; format.align_chunk(initial_chunk_bytes)];
                let mut buffers = [BufferId::new(0); 2];
                let mut lengths = [0; 2];
                for (buffer, length) in buffers.iter_mut().zip(lengths.iter_mut()) {
                    let n = stream.next_chunk(&mut chunk)?;
                    *buffer = hw.gen_buffer()?;
                    hw.buffer_data(*buffer, format, &chunk[..n], frequency)?;
                    *length = n;
                }
                log::debug!(
                    "Primed stream buffers {} and {} with {:?} bytes",
                    buffers[0],
                    buffers[1],
                    lengths
                );
                BufferSet::Double { buffers, lengths }
            }
        };

        entry.buffers = Some(set);
        self.uploads += 1;
        Ok(set)
    }

    /// Drops one user of `key`. The last user deletes the buffers when a
    /// device is given and removes the entry.
    ///
    /// Returns whether the entry was removed.
    pub fn release<B: AudioBackend + ?Sized>(
        &mut self,
        key: ResourceKey,
        hw: Option<&mut B>,
    ) -> Result<bool> {
        let Some(entry) = self.entries.get_mut(&key) else {
            return Ok(false);
        };
        entry.users = entry.users.saturating_sub(1);
        if entry.users > 0 {
            return Ok(false);
        }

        if let Some(entry) = self.entries.remove(&key) {
            if let (Some(hw), Some(set)) = (hw, entry.buffers) {
                for buffer in set.ids() {
                    hw.delete_buffer(buffer)?;
                }
            }
        }
        Ok(true)
    }

    /// De-interleaves a stereo resource, reusing an earlier split of the same
    /// resource.
    ///
    /// Returns the parent key and the left and right halves.
    pub fn split_stereo(
        &mut self,
        parent: &Arc<dyn SoundResource>,
    ) -> Result<(ResourceKey, Arc<dyn SoundResource>, Arc<dyn SoundResource>)> {
        let key = ResourceKey::of_resource(parent);
        if let Some(split) = self.splits.get_mut(&key) {
            split.users += 1;
            return Ok((key, split.left.clone(), split.right.clone()));
        }

        let (left, right) = split_stereo(parent.as_ref())?;
        let left: Arc<dyn SoundResource> = Arc::new(left);
        let right: Arc<dyn SoundResource> = Arc::new(right);
        self.splits.insert(
            key,
            StereoSplit {
                _parent: parent.clone(),
                left: left.clone(),
                right: right.clone(),
                users: 1,
            },
        );
        Ok((key, left, right))
    }

    pub fn release_split(&mut self, key: ResourceKey) {
        if let Some(split) = self.splits.get_mut(&key) {
            split.users = split.users.saturating_sub(1);
            if split.users == 0 {
                self.splits.remove(&key);
            }
        }
    }

    /// Deletes every uploaded buffer and marks all entries as not uploaded.
    pub fn invalidate<B: AudioBackend + ?Sized>(&mut self, mut hw: Option<&mut B>) -> Result<()> {
        let mut result = Ok(());
        for entry in self.entries.values_mut() {
            let Some(set) = entry.buffers.take() else {
                continue;
            };
            if let Some(hw) = hw.as_deref_mut() {
                for buffer in set.ids() {
                    if let Err(e) = hw.delete_buffer(buffer) {
                        log::warn!("Failed to delete buffer {}: {}", buffer, e);
                        result = result.and(Err(e));
                    }
                }
            }
        }
        result
    }
}
