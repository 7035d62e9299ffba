//! Error types for soundstage

use crate::sound::SoundId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SoundError {
    #[error("Unsupported buffer format: {channels} channel(s) at {bits_per_sample} bits per sample")]
    UnsupportedFormat { channels: u16, bits_per_sample: u16 },

    #[error("Unsupported sound format: {0} channel(s)")]
    UnsupportedSoundFormat(u16),

    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Tried to {operation} but got error code {code:#06x}")]
    HardwareCall { operation: &'static str, code: i32 },

    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Unknown sound: {0}")]
    UnknownSound(SoundId),

    #[error("Streaming resource is already bound to another sound")]
    StreamInUse,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audio loading error: {0}")]
    AudioLoading(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl SoundError {
    pub(crate) fn hardware(operation: &'static str, code: i32) -> Self {
        Self::HardwareCall { operation, code }
    }

    pub(crate) fn poisoned(what: &str) -> Self {
        Self::Consistency(format!("{} lock poisoned", what))
    }
}

pub type Result<T> = std::result::Result<T, SoundError>;
