use crate::backend::DistanceModel;
use std::time::Duration;

/// Configuration for a [`SoundSystem`](crate::SoundSystem).
///
/// The defaults match the common hardware setup: 200 KiB priming chunks,
/// 32 KiB refill chunks, one second fades and a linear distance model with a
/// reference distance of 50 units.
#[derive(Debug, Clone)]
pub struct SoundSystemDesc {
    /// Output device to open; `None` selects the backend default
    pub device_name: Option<String>,
    /// Bytes pre-filled into each of the two streaming buffers before upload
    pub initial_chunk_bytes: usize,
    /// Bytes pulled from a stream whenever a consumed buffer is refilled
    pub refill_chunk_bytes: usize,
    /// Duration of the ramps started by fade-up and fade-down
    pub fade_duration: Duration,
    pub reference_distance: f32,
    pub rolloff_factor: f32,
    /// Max distance given to new sounds
    pub max_distance: f32,
    pub distance_model: DistanceModel,
}

impl Default for SoundSystemDesc {
    fn default() -> Self {
        Self {
            device_name: None,
            initial_chunk_bytes: 200 * 1024,
            refill_chunk_bytes: 32 * 1024,
            fade_duration: Duration::from_secs(1),
            reference_distance: 50.0,
            rolloff_factor: 1.0,
            max_distance: f32::MAX,
            distance_model: DistanceModel::Linear,
        }
    }
}

impl SoundSystemDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }

    pub fn initial_chunk_bytes(mut self, bytes: usize) -> Self {
        self.initial_chunk_bytes = bytes;
        self
    }

    pub fn refill_chunk_bytes(mut self, bytes: usize) -> Self {
        self.refill_chunk_bytes = bytes;
        self
    }

    pub fn fade_duration(mut self, duration: Duration) -> Self {
        self.fade_duration = duration;
        self
    }

    pub fn reference_distance(mut self, distance: f32) -> Self {
        self.reference_distance = distance;
        self
    }

    pub fn rolloff_factor(mut self, rolloff: f32) -> Self {
        self.rolloff_factor = rolloff;
        self
    }

    pub fn max_distance(mut self, distance: f32) -> Self {
        self.max_distance = distance;
        self
    }

    pub fn distance_model(mut self, model: DistanceModel) -> Self {
        self.distance_model = model;
        self
    }

    /// Checks that chunk sizes are usable.
    ///
    /// # Errors
    ///
    /// Returns [`SoundError::Configuration`](crate::SoundError::Configuration)
    /// if either chunk size is zero.
    pub fn validate(&self) -> crate::Result<()> {
        if self.initial_chunk_bytes == 0 || self.refill_chunk_bytes == 0 {
            return Err(crate::SoundError::Configuration(
                "Streaming chunk sizes must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let desc = SoundSystemDesc::default();
        assert_eq!(desc.initial_chunk_bytes, 204_800);
        assert_eq!(desc.refill_chunk_bytes, 32_768);
        assert_eq!(desc.fade_duration, Duration::from_secs(1));
        assert_eq!(desc.reference_distance, 50.0);
        assert_eq!(desc.rolloff_factor, 1.0);
        assert_eq!(desc.distance_model, DistanceModel::Linear);
    }

    #[test]
    fn test_builder_and_validation() {
        let desc = SoundSystemDesc::new()
            .device_name("Speakers")
            .refill_chunk_bytes(0);
        assert_eq!(desc.device_name.as_deref(), Some("Speakers"));
        assert!(desc.validate().is_err());
        assert!(SoundSystemDesc::default().validate().is_ok());
    }
}
