use super::mixer::pcm_to_f32;
use super::{
    AudioBackend, AudioResampler, BufferFormat, BufferId, DistanceModel, SoftwareMixer, SourceFlag,
    SourceFloat, SourceId, SourceState, SourceVector, error_code,
};
use crate::error::{Result, SoundError};
use crate::math::Vec3;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::{Arc, Mutex, MutexGuard};

/// Backend rendering through the default cpal host.
///
/// Sources and buffers live in a [`SoftwareMixer`] shared with the output
/// stream callback. Uploaded PCM is resampled to the device rate once, at
/// upload time.
pub struct CpalBackend {
    host: cpal::Host,
    device: Option<cpal::Device>,
    output_config: Option<cpal::SupportedStreamConfig>,
    stream: Option<cpal::Stream>,
    mixer: Arc<Mutex<SoftwareMixer>>,
    error_sender: Sender<String>,
    error_receiver: Receiver<String>,
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalBackend {
    pub fn new() -> Self {
        let (error_sender, error_receiver) = unbounded();
        Self {
            host: cpal::default_host(),
            device: None,
            output_config: None,
            stream: None,
            mixer: Arc::new(Mutex::new(SoftwareMixer::new(48000))),
            error_sender,
            error_receiver,
        }
    }

    /// Sample rate of the open device, if any
    pub fn output_rate(&self) -> Option<u32> {
        self.output_config.as_ref().map(|c| c.sample_rate().0)
    }

    fn mixer(&self) -> Result<MutexGuard<'_, SoftwareMixer>> {
        self.mixer.lock().map_err(|_| SoundError::poisoned("mixer"))
    }

    fn require_context(&self, operation: &'static str) -> Result<()> {
        if self.stream.is_none() {
            return Err(SoundError::hardware(operation, error_code::INVALID_OPERATION));
        }
        Ok(())
    }

    /// Create a typed output stream that mixes into `T` samples
    fn create_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mixer: Arc<Mutex<SoftwareMixer>>,
        errors: Sender<String>,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = config.channels as usize;
        let mut scratch: Vec<f32> = Vec::new();

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    scratch.clear();
                    scratch.resize(data.len(), 0.0);

                    // Contended lock: output silence for this block.
                    if let Ok(mut mixer) = mixer.try_lock() {
                        mixer.mix(&mut scratch, channels);
                    }

                    for (out, sample) in data.iter_mut().zip(scratch.iter()) {
                        *out = T::from_sample(sample.clamp(-1.0, 1.0));
                    }
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                    let _ = errors.send(err.to_string());
                },
                None,
            )
            .map_err(|e| SoundError::DeviceUnavailable(format!("Failed to build stream: {}", e)))
    }
}

impl AudioBackend for CpalBackend {
    fn device_names(&self) -> Vec<String> {
        match self.host.output_devices() {
            Ok(devices) => devices.filter_map(|d| d.name().ok()).collect(),
            Err(e) => {
                log::warn!("Failed to enumerate output devices: {}", e);
                Vec::new()
            }
        }
    }

    fn open_device(&mut self, name: Option<&str>) -> Result<String> {
        let device = match name {
            Some(name) => self
                .host
                .output_devices()
                .map_err(|e| SoundError::DeviceUnavailable(e.to_string()))?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false)),
            None => self.host.default_output_device(),
        }
        .ok_or_else(|| {
            SoundError::DeviceUnavailable(match name {
                Some(name) => format!("No output device named {}", name),
                None => "No default output device available".to_string(),
            })
        })?;

        let config = device.default_output_config().map_err(|e| {
            SoundError::DeviceUnavailable(format!("Failed to get default config: {}", e))
        })?;
        let device_name = device
            .name()
            .unwrap_or_else(|_| "Unknown Device".to_string());

        log::info!(
            "Opened output device {} ({} Hz, {} channels, {:?})",
            device_name,
            config.sample_rate().0,
            config.channels(),
            config.sample_format()
        );

        self.mixer()?.reset(config.sample_rate().0);
        self.device = Some(device);
        self.output_config = Some(config);
        Ok(device_name)
    }

    fn create_context(&mut self) -> Result<()> {
        let (Some(device), Some(supported)) = (&self.device, &self.output_config) else {
            return Err(SoundError::hardware(
                "create context",
                error_code::INVALID_OPERATION,
            ));
        };
        let config = supported.config();
        let mixer = self.mixer.clone();
        let errors = self.error_sender.clone();

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => Self::create_stream::<f32>(device, &config, mixer, errors)?,
            cpal::SampleFormat::I16 => Self::create_stream::<i16>(device, &config, mixer, errors)?,
            cpal::SampleFormat::U16 => Self::create_stream::<u16>(device, &config, mixer, errors)?,
            other => {
                return Err(SoundError::DeviceUnavailable(format!(
                    "Unsupported sample format: {:?}",
                    other
                )));
            }
        };

        stream
            .play()
            .map_err(|e| SoundError::DeviceUnavailable(format!("Failed to start stream: {}", e)))?;

        self.stream = Some(stream);
        Ok(())
    }

    fn destroy_context(&mut self) {
        // Dropping the stream stops the callback.
        self.stream = None;
        let rate = self.output_rate().unwrap_or(48000);
        match self.mixer() {
            Ok(mut mixer) => mixer.reset(rate),
            Err(e) => log::warn!("Failed to reset mixer: {}", e),
        }
    }

    fn close_device(&mut self) {
        self.device = None;
        self.output_config = None;
    }

    fn set_distance_model(&mut self, model: DistanceModel) -> Result<()> {
        self.require_context("set distance model")?;
        self.mixer()?.set_distance_model(model);
        Ok(())
    }

    fn set_listener_position(&mut self, position: Vec3) -> Result<()> {
        self.require_context("set listener position")?;
        self.mixer()?.set_listener_position(position);
        Ok(())
    }

    fn set_listener_orientation(&mut self, forward: Vec3, up: Vec3) -> Result<()> {
        self.require_context("set listener orientation")?;
        self.mixer()?.set_listener_orientation(forward, up);
        Ok(())
    }

    fn set_listener_velocity(&mut self, _velocity: Vec3) -> Result<()> {
        self.require_context("set listener velocity")
    }

    fn gen_source(&mut self) -> Result<SourceId> {
        self.require_context("generate source")?;
        Ok(self.mixer()?.gen_source())
    }

    fn delete_source(&mut self, source: SourceId) -> Result<()> {
        self.require_context("delete source")?;
        self.mixer()?.delete_source(source)
    }

    fn gen_buffer(&mut self) -> Result<BufferId> {
        self.require_context("generate buffer")?;
        Ok(self.mixer()?.gen_buffer())
    }

    fn delete_buffer(&mut self, buffer: BufferId) -> Result<()> {
        self.require_context("delete buffer")?;
        self.mixer()?.delete_buffer(buffer)
    }

    fn buffer_data(
        &mut self,
        buffer: BufferId,
        format: BufferFormat,
        data: &[u8],
        frequency: u32,
    ) -> Result<()> {
        self.require_context("buffer data")?;
        if frequency == 0 || data.len() % format.bytes_per_frame() != 0 {
            return Err(SoundError::hardware("buffer data", error_code::INVALID_VALUE));
        }

        // Convert outside the lock so the callback is not starved.
        let output_rate = self.mixer()?.output_rate();
        let samples = pcm_to_f32(format, data);
        let samples = AudioResampler::new(frequency, output_rate, format.channels(), None)?
            .resample_interleaved(&samples)?;

        self.mixer()?
            .store_buffer(buffer, format.channels(), samples, frequency)
    }

    fn attach_buffer(&mut self, source: SourceId, buffer: Option<BufferId>) -> Result<()> {
        self.require_context("attach buffer")?;
        self.mixer()?.attach_buffer(source, buffer)
    }

    fn queue_buffers(&mut self, source: SourceId, buffers: &[BufferId]) -> Result<()> {
        self.require_context("queue buffers")?;
        self.mixer()?.queue_buffers(source, buffers)
    }

    fn unqueue_buffers(&mut self, source: SourceId, count: usize) -> Result<Vec<BufferId>> {
        self.require_context("unqueue buffers")?;
        self.mixer()?.unqueue_buffers(source, count)
    }

    fn buffers_processed(&self, source: SourceId) -> Result<usize> {
        self.mixer()?.buffers_processed(source)
    }

    fn buffers_queued(&self, source: SourceId) -> Result<usize> {
        self.mixer()?.buffers_queued(source)
    }

    fn set_source_f32(&mut self, source: SourceId, param: SourceFloat, value: f32) -> Result<()> {
        self.require_context("set source float")?;
        self.mixer()?.set_source_f32(source, param, value)
    }

    fn set_source_vec3(
        &mut self,
        source: SourceId,
        param: SourceVector,
        value: Vec3,
    ) -> Result<()> {
        self.require_context("set source vector")?;
        self.mixer()?.set_source_vec3(source, param, value)
    }

    fn set_source_flag(&mut self, source: SourceId, param: SourceFlag, value: bool) -> Result<()> {
        self.require_context("set source flag")?;
        self.mixer()?.set_source_flag(source, param, value)
    }

    fn set_sample_offset(&mut self, source: SourceId, samples: u64) -> Result<()> {
        self.require_context("set sample offset")?;
        self.mixer()?.set_sample_offset(source, samples)
    }

    fn sample_offset(&self, source: SourceId) -> Result<u64> {
        self.mixer()?.sample_offset(source)
    }

    fn source_state(&self, source: SourceId) -> Result<SourceState> {
        self.mixer()?.source_state(source)
    }

    fn play_sources(&mut self, sources: &[SourceId]) -> Result<()> {
        self.require_context("play sources")?;
        // One lock for the whole group so every source starts in the same block.
        let mut mixer = self.mixer()?;
        for &source in sources {
            mixer.play(source)?;
        }
        Ok(())
    }

    fn stop_sources(&mut self, sources: &[SourceId]) -> Result<()> {
        self.require_context("stop sources")?;
        let mut mixer = self.mixer()?;
        for &source in sources {
            mixer.stop(source)?;
        }
        Ok(())
    }

    fn pause_sources(&mut self, sources: &[SourceId]) -> Result<()> {
        self.require_context("pause sources")?;
        let mut mixer = self.mixer()?;
        for &source in sources {
            mixer.pause(source)?;
        }
        Ok(())
    }

    fn take_errors(&mut self) -> Vec<String> {
        self.error_receiver.try_iter().collect()
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        self.destroy_context();
        self.close_device();
    }
}
