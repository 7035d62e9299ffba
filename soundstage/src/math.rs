//! Math types for soundstage

pub use glam::{Quat, Vec3};

/// Position and orientation of the listener.
///
/// Orientation follows the right-handed convention used by the hardware
/// listener: forward is -Z and up is +Y before rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Pose {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn identity() -> Self {
        Self::new(Vec3::ZERO, Quat::IDENTITY)
    }

    pub fn from_position(position: Vec3) -> Self {
        Self::new(position, Quat::IDENTITY)
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * (-Vec3::Z)
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}
