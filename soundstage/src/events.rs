use crate::sound::SoundId;

/// Notifications collected during lifecycle calls and ticks.
///
/// Drained with [`SoundSystem::poll_events`](crate::SoundSystem::poll_events).
#[derive(Debug, Clone, PartialEq)]
pub enum SoundEvent {
    /// The device opened and pending sounds are live
    DeviceReady { device_name: String },
    /// The device could not be opened; the system keeps running silently
    DeviceUnavailable { reason: String },
    DeviceClosed,
    /// A looping stream wrapped back to its start
    StreamLooped { sound: SoundId },
    /// A non-looping stream played its last chunk
    StreamFinished { sound: SoundId },
    FadeCompleted { sound: SoundId, gain: f32 },
    /// Asynchronous error reported by the backend
    BackendError { error: String },
}

impl SoundEvent {
    /// Sound this event concerns, if any
    pub fn sound_id(&self) -> Option<SoundId> {
        match self {
            Self::StreamLooped { sound }
            | Self::StreamFinished { sound }
            | Self::FadeCompleted { sound, .. } => Some(*sound),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::DeviceUnavailable { .. } | Self::BackendError { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sound_id() {
        let sound = SoundId::new(7);
        assert_eq!(
            SoundEvent::StreamFinished { sound }.sound_id(),
            Some(sound)
        );
        assert_eq!(SoundEvent::DeviceClosed.sound_id(), None);
        assert!(
            SoundEvent::BackendError {
                error: "underrun".to_string()
            }
            .is_error()
        );
    }
}
