use super::{
    AudioBackend, BufferFormat, BufferId, DistanceModel, SourceFlag, SourceFloat, SourceId,
    SourceState, SourceVector, error_code,
};
use crate::error::{Result, SoundError};
use crate::math::Vec3;
use std::collections::{HashMap, VecDeque};

/// One call observed by a [`HeadlessBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum HardwareCall {
    OpenDevice(Option<String>),
    CreateContext,
    DestroyContext,
    CloseDevice,
    DistanceModel(DistanceModel),
    ListenerPosition(Vec3),
    ListenerOrientation { forward: Vec3, up: Vec3 },
    ListenerVelocity(Vec3),
    GenSource(SourceId),
    DeleteSource(SourceId),
    GenBuffer(BufferId),
    DeleteBuffer(BufferId),
    BufferData {
        buffer: BufferId,
        format: BufferFormat,
        bytes: usize,
        frequency: u32,
    },
    AttachBuffer {
        source: SourceId,
        buffer: Option<BufferId>,
    },
    QueueBuffers {
        source: SourceId,
        buffers: Vec<BufferId>,
    },
    UnqueueBuffers {
        source: SourceId,
        buffers: Vec<BufferId>,
    },
    SetFloat {
        source: SourceId,
        param: SourceFloat,
        value: f32,
    },
    SetVector {
        source: SourceId,
        param: SourceVector,
        value: Vec3,
    },
    SetFlag {
        source: SourceId,
        param: SourceFlag,
        value: bool,
    },
    SetSampleOffset {
        source: SourceId,
        samples: u64,
    },
    Play(Vec<SourceId>),
    Stop(Vec<SourceId>),
    Pause(Vec<SourceId>),
}

#[derive(Debug)]
struct HeadlessSource {
    state: SourceState,
    static_buffer: Option<BufferId>,
    queue: VecDeque<BufferId>,
    processed: usize,
    floats: HashMap<SourceFloat, f32>,
    vectors: HashMap<SourceVector, Vec3>,
    flags: HashMap<SourceFlag, bool>,
    sample_offset: u64,
}

impl HeadlessSource {
    fn new() -> Self {
        Self {
            state: SourceState::Initial,
            static_buffer: None,
            queue: VecDeque::new(),
            processed: 0,
            floats: HashMap::new(),
            vectors: HashMap::new(),
            flags: HashMap::new(),
            sample_offset: 0,
        }
    }
}

/// Backend without audio output.
///
/// Simulates sources, buffers and queues without rendering anything and
/// records every call in order. Useful on machines without an audio device
/// and for inspecting exactly what a [`SoundSystem`](crate::SoundSystem)
/// sends to the hardware. Playback never progresses on its own; use
/// [`mark_processed`](Self::mark_processed) and
/// [`set_source_state`](Self::set_source_state) to simulate it.
#[derive(Debug)]
pub struct HeadlessBackend {
    devices: Vec<String>,
    available: bool,
    device_open: bool,
    context_active: bool,
    next_name: u32,
    sources: HashMap<SourceId, HeadlessSource>,
    buffers: HashMap<BufferId, Vec<u8>>,
    calls: Vec<HardwareCall>,
    pending_failure: Option<i32>,
    pending_errors: Vec<String>,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::with_devices(vec!["Headless Output".to_string()])
    }

    pub fn with_devices(devices: Vec<String>) -> Self {
        Self {
            devices,
            available: true,
            device_open: false,
            context_active: false,
            next_name: 1,
            sources: HashMap::new(),
            buffers: HashMap::new(),
            calls: Vec::new(),
            pending_failure: None,
            pending_errors: Vec::new(),
        }
    }

    /// A backend whose device can never be opened
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> &[HardwareCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn is_context_active(&self) -> bool {
        self.context_active
    }

    pub fn live_sources(&self) -> usize {
        self.sources.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Last value set for a float parameter of `source`
    pub fn source_f32(&self, source: SourceId, param: SourceFloat) -> Option<f32> {
        self.sources.get(&source)?.floats.get(&param).copied()
    }

    pub fn source_vec3(&self, source: SourceId, param: SourceVector) -> Option<Vec3> {
        self.sources.get(&source)?.vectors.get(&param).copied()
    }

    pub fn source_flag(&self, source: SourceId, param: SourceFlag) -> Option<bool> {
        self.sources.get(&source)?.flags.get(&param).copied()
    }

    pub fn attached_buffer(&self, source: SourceId) -> Option<BufferId> {
        self.sources.get(&source)?.static_buffer
    }

    pub fn queued_buffers(&self, source: SourceId) -> Vec<BufferId> {
        self.sources
            .get(&source)
            .map(|s| s.queue.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Bytes most recently uploaded into `buffer`
    pub fn buffer_bytes(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(Vec::as_slice)
    }

    /// Marks up to `count` more queued buffers of `source` as played.
    pub fn mark_processed(&mut self, source: SourceId, count: usize) {
        if let Some(s) = self.sources.get_mut(&source) {
            s.processed = (s.processed + count).min(s.queue.len());
        }
    }

    /// Forces the state of `source`, e.g. to simulate a starved queue.
    pub fn set_source_state(&mut self, source: SourceId, state: SourceState) {
        if let Some(s) = self.sources.get_mut(&source) {
            s.state = state;
        }
    }

    /// Makes the next source or buffer call fail with `code`.
    pub fn fail_next_call(&mut self, code: i32) {
        self.pending_failure = Some(code);
    }

    /// Queues an asynchronous device error for [`AudioBackend::take_errors`].
    pub fn push_device_error(&mut self, error: impl Into<String>) {
        self.pending_errors.push(error.into());
    }

    /// Validates that a source/buffer call may run.
    fn check(&mut self, operation: &'static str) -> Result<()> {
        if let Some(code) = self.pending_failure.take() {
            return Err(SoundError::hardware(operation, code));
        }
        if !self.context_active {
            return Err(SoundError::hardware(operation, error_code::INVALID_OPERATION));
        }
        Ok(())
    }

    fn source(&self, source: SourceId, operation: &'static str) -> Result<&HeadlessSource> {
        self.sources
            .get(&source)
            .ok_or(SoundError::hardware(operation, error_code::INVALID_NAME))
    }

    fn source_mut(
        &mut self,
        source: SourceId,
        operation: &'static str,
    ) -> Result<&mut HeadlessSource> {
        self.sources
            .get_mut(&source)
            .ok_or(SoundError::hardware(operation, error_code::INVALID_NAME))
    }

    fn next_name(&mut self) -> u32 {
        let name = self.next_name;
        self.next_name += 1;
        name
    }
}

impl AudioBackend for HeadlessBackend {
    fn device_names(&self) -> Vec<String> {
        if self.available {
            self.devices.clone()
        } else {
            Vec::new()
        }
    }

    fn open_device(&mut self, name: Option<&str>) -> Result<String> {
        self.calls.push(HardwareCall::OpenDevice(name.map(str::to_string)));
        if !self.available {
            return Err(SoundError::DeviceUnavailable(
                "headless device disabled".to_string(),
            ));
        }
        let opened = match name {
            Some(name) => self
                .devices
                .iter()
                .find(|d| d.as_str() == name)
                .cloned()
                .ok_or_else(|| SoundError::DeviceUnavailable(format!("no device named {}", name)))?,
            None => self
                .devices
                .first()
                .cloned()
                .ok_or_else(|| SoundError::DeviceUnavailable("no devices".to_string()))?,
        };
        self.device_open = true;
        Ok(opened)
    }

    fn create_context(&mut self) -> Result<()> {
        self.calls.push(HardwareCall::CreateContext);
        if !self.device_open {
            return Err(SoundError::hardware(
                "create context",
                error_code::INVALID_OPERATION,
            ));
        }
        self.context_active = true;
        Ok(())
    }

    fn destroy_context(&mut self) {
        self.calls.push(HardwareCall::DestroyContext);
        self.context_active = false;
        self.sources.clear();
        self.buffers.clear();
    }

    fn close_device(&mut self) {
        self.calls.push(HardwareCall::CloseDevice);
        self.device_open = false;
    }

    fn set_distance_model(&mut self, model: DistanceModel) -> Result<()> {
        self.check("set distance model")?;
        self.calls.push(HardwareCall::DistanceModel(model));
        Ok(())
    }

    fn set_listener_position(&mut self, position: Vec3) -> Result<()> {
        self.check("set listener position")?;
        self.calls.push(HardwareCall::ListenerPosition(position));
        Ok(())
    }

    fn set_listener_orientation(&mut self, forward: Vec3, up: Vec3) -> Result<()> {
        self.check("set listener orientation")?;
        self.calls
            .push(HardwareCall::ListenerOrientation { forward, up });
        Ok(())
    }

    fn set_listener_velocity(&mut self, velocity: Vec3) -> Result<()> {
        self.check("set listener velocity")?;
        self.calls.push(HardwareCall::ListenerVelocity(velocity));
        Ok(())
    }

    fn gen_source(&mut self) -> Result<SourceId> {
        self.check("generate source")?;
        let source = SourceId::new(self.next_name());
        self.sources.insert(source, HeadlessSource::new());
        self.calls.push(HardwareCall::GenSource(source));
        Ok(source)
    }

    fn delete_source(&mut self, source: SourceId) -> Result<()> {
        self.check("delete source")?;
        self.sources
            .remove(&source)
            .ok_or(SoundError::hardware("delete source", error_code::INVALID_NAME))?;
        self.calls.push(HardwareCall::DeleteSource(source));
        Ok(())
    }

    fn gen_buffer(&mut self) -> Result<BufferId> {
        self.check("generate buffer")?;
        let buffer = BufferId::new(self.next_name());
        self.buffers.insert(buffer, Vec::new());
        self.calls.push(HardwareCall::GenBuffer(buffer));
        Ok(buffer)
    }

    fn delete_buffer(&mut self, buffer: BufferId) -> Result<()> {
        self.check("delete buffer")?;
        self.buffers
            .remove(&buffer)
            .ok_or(SoundError::hardware("delete buffer", error_code::INVALID_NAME))?;
        self.calls.push(HardwareCall::DeleteBuffer(buffer));
        Ok(())
    }

    fn buffer_data(
        &mut self,
        buffer: BufferId,
        format: BufferFormat,
        data: &[u8],
        frequency: u32,
    ) -> Result<()> {
        self.check("buffer data")?;
        if frequency == 0 || data.len() % format.bytes_per_frame() != 0 {
            return Err(SoundError::hardware("buffer data", error_code::INVALID_VALUE));
        }
        let stored = self
            .buffers
            .get_mut(&buffer)
            .ok_or(SoundError::hardware("buffer data", error_code::INVALID_NAME))?;
        stored.clear();
        stored.extend_from_slice(data);
        self.calls.push(HardwareCall::BufferData {
            buffer,
            format,
            bytes: data.len(),
            frequency,
        });
        Ok(())
    }

    fn attach_buffer(&mut self, source: SourceId, buffer: Option<BufferId>) -> Result<()> {
        self.check("attach buffer")?;
        if let Some(buffer) = buffer {
            if !self.buffers.contains_key(&buffer) {
                return Err(SoundError::hardware("attach buffer", error_code::INVALID_NAME));
            }
        }
        let s = self.source_mut(source, "attach buffer")?;
        s.static_buffer = buffer;
        s.queue.clear();
        s.processed = 0;
        self.calls.push(HardwareCall::AttachBuffer { source, buffer });
        Ok(())
    }

    fn queue_buffers(&mut self, source: SourceId, buffers: &[BufferId]) -> Result<()> {
        self.check("queue buffers")?;
        if buffers.iter().any(|b| !self.buffers.contains_key(b)) {
            return Err(SoundError::hardware("queue buffers", error_code::INVALID_NAME));
        }
        let s = self.source_mut(source, "queue buffers")?;
        if s.static_buffer.is_some() {
            return Err(SoundError::hardware(
                "queue buffers",
                error_code::INVALID_OPERATION,
            ));
        }
        s.queue.extend(buffers.iter().copied());
        self.calls.push(HardwareCall::QueueBuffers {
            source,
            buffers: buffers.to_vec(),
        });
        Ok(())
    }

    fn unqueue_buffers(&mut self, source: SourceId, count: usize) -> Result<Vec<BufferId>> {
        self.check("unqueue buffers")?;
        let s = self.source_mut(source, "unqueue buffers")?;
        if count > s.processed {
            return Err(SoundError::hardware(
                "unqueue buffers",
                error_code::INVALID_VALUE,
            ));
        }
        let removed: Vec<BufferId> = s.queue.drain(..count).collect();
        s.processed -= count;
        self.calls.push(HardwareCall::UnqueueBuffers {
            source,
            buffers: removed.clone(),
        });
        Ok(removed)
    }

    fn buffers_processed(&self, source: SourceId) -> Result<usize> {
        Ok(self.source(source, "query processed buffers")?.processed)
    }

    fn buffers_queued(&self, source: SourceId) -> Result<usize> {
        let s = self.source(source, "query queued buffers")?;
        Ok(s.queue.len() + usize::from(s.static_buffer.is_some()))
    }

    fn set_source_f32(&mut self, source: SourceId, param: SourceFloat, value: f32) -> Result<()> {
        self.check("set source float")?;
        if !value.is_finite() && param != SourceFloat::MaxDistance {
            return Err(SoundError::hardware("set source float", error_code::INVALID_VALUE));
        }
        self.source_mut(source, "set source float")?
            .floats
            .insert(param, value);
        self.calls.push(HardwareCall::SetFloat {
            source,
            param,
            value,
        });
        Ok(())
    }

    fn set_source_vec3(
        &mut self,
        source: SourceId,
        param: SourceVector,
        value: Vec3,
    ) -> Result<()> {
        self.check("set source vector")?;
        self.source_mut(source, "set source vector")?
            .vectors
            .insert(param, value);
        self.calls.push(HardwareCall::SetVector {
            source,
            param,
            value,
        });
        Ok(())
    }

    fn set_source_flag(&mut self, source: SourceId, param: SourceFlag, value: bool) -> Result<()> {
        self.check("set source flag")?;
        self.source_mut(source, "set source flag")?
            .flags
            .insert(param, value);
        self.calls.push(HardwareCall::SetFlag {
            source,
            param,
            value,
        });
        Ok(())
    }

    fn set_sample_offset(&mut self, source: SourceId, samples: u64) -> Result<()> {
        self.check("set sample offset")?;
        self.source_mut(source, "set sample offset")?.sample_offset = samples;
        self.calls
            .push(HardwareCall::SetSampleOffset { source, samples });
        Ok(())
    }

    fn sample_offset(&self, source: SourceId) -> Result<u64> {
        Ok(self.source(source, "query sample offset")?.sample_offset)
    }

    fn source_state(&self, source: SourceId) -> Result<SourceState> {
        Ok(self.source(source, "query source state")?.state)
    }

    fn play_sources(&mut self, sources: &[SourceId]) -> Result<()> {
        self.check("play sources")?;
        for &source in sources {
            let s = self.source_mut(source, "play sources")?;
            if s.state != SourceState::Paused {
                s.processed = 0;
                s.sample_offset = 0;
            }
            s.state = SourceState::Playing;
        }
        self.calls.push(HardwareCall::Play(sources.to_vec()));
        Ok(())
    }

    fn stop_sources(&mut self, sources: &[SourceId]) -> Result<()> {
        self.check("stop sources")?;
        for &source in sources {
            let s = self.source_mut(source, "stop sources")?;
            s.state = SourceState::Stopped;
            s.processed = s.queue.len();
        }
        self.calls.push(HardwareCall::Stop(sources.to_vec()));
        Ok(())
    }

    fn pause_sources(&mut self, sources: &[SourceId]) -> Result<()> {
        self.check("pause sources")?;
        for &source in sources {
            let s = self.source_mut(source, "pause sources")?;
            if s.state == SourceState::Playing {
                s.state = SourceState::Paused;
            }
        }
        self.calls.push(HardwareCall::Pause(sources.to_vec()));
        Ok(())
    }

    fn take_errors(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending_errors)
    }
}
