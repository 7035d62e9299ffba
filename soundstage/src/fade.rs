//! Linear gain ramps advanced once per tick.

use crate::sound::SoundId;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Fade {
    sound: SoundId,
    from: f32,
    to: f32,
    start: Instant,
    duration: Duration,
}

/// Gain to apply to one sound after advancing the scheduler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeStep {
    pub sound: SoundId,
    pub gain: f32,
    /// The fade reached its target and was removed
    pub finished: bool,
}

/// Pending fades, at most one per sound.
#[derive(Debug, Default)]
pub struct FadeScheduler {
    fades: Vec<Fade>,
}

impl FadeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a fade from `from` to `to`, replacing any fade already running
    /// on `sound`.
    pub fn add(&mut self, sound: SoundId, from: f32, to: f32, duration: Duration, now: Instant) {
        self.cancel(sound);
        self.fades.push(Fade {
            sound,
            from,
            to,
            start: now,
            duration,
        });
    }

    pub fn cancel(&mut self, sound: SoundId) {
        self.fades.retain(|fade| fade.sound != sound);
    }

    pub fn clear(&mut self) {
        self.fades.clear();
    }

    pub fn len(&self) -> usize {
        self.fades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fades.is_empty()
    }

    pub fn is_fading(&self, sound: SoundId) -> bool {
        self.fades.iter().any(|fade| fade.sound == sound)
    }

    /// Computes the gain of every fade at `now`. Completed fades land
    /// exactly on their target and are removed.
    pub fn advance(&mut self, now: Instant) -> Vec<FadeStep> {
        let steps: Vec<FadeStep> = self
            .fades
            .iter()
            .map(|fade| {
                let elapsed = now.saturating_duration_since(fade.start);
                if elapsed >= fade.duration {
                    FadeStep {
                        sound: fade.sound,
                        gain: fade.to,
                        finished: true,
                    }
                } else {
                    let t = elapsed.as_secs_f32() / fade.duration.as_secs_f32();
                    FadeStep {
                        sound: fade.sound,
                        gain: fade.from + (fade.to - fade.from) * t,
                        finished: false,
                    }
                }
            })
            .collect();

        self.fades.retain(|fade| now.saturating_duration_since(fade.start) < fade.duration);
        steps
    }
}
