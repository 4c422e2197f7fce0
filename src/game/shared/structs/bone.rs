use anyhow::bail;
use glam::{Mat4, Quat, Vec3};

use crate::game::shared::structs::KeyframeTrack;

/// Capacity of every skeleton's bone palette, and of the skinning shader's
/// bone array.
pub const MAX_BONES: usize = 100;

#[derive(Clone, Debug)]
pub struct Bone {
    pub name: String,
    pub index: usize,
    /// Inverse of the bone's bind-pose world transform.
    pub offset_matrix: Mat4,
    pub positions: KeyframeTrack<Vec3>,
    pub rotations: KeyframeTrack<Quat>,
    pub scales: KeyframeTrack<Vec3>,
}

impl Bone {
    pub fn new(
        name: &str,
        index: usize,
        offset_matrix: Mat4,
        positions: KeyframeTrack<Vec3>,
        rotations: KeyframeTrack<Quat>,
        scales: KeyframeTrack<Vec3>,
    ) -> anyhow::Result<Self> {
        if index >= MAX_BONES {
            bail!(
                "Bone {} has index {}, the palette only holds {} bones.",
                name,
                index,
                MAX_BONES
            );
        }
        Ok(Bone {
            name: name.to_string(),
            index,
            offset_matrix,
            positions,
            rotations,
            scales,
        })
    }

    /// A bone that holds its rest pose for the whole clip.
    pub fn from_rest_pose(
        name: &str,
        index: usize,
        offset_matrix: Mat4,
        rest_transform: Mat4,
    ) -> anyhow::Result<Self> {
        let (scale, rotation, translation) = rest_transform.to_scale_rotation_translation();
        Self::new(
            name,
            index,
            offset_matrix,
            KeyframeTrack::constant(translation),
            KeyframeTrack::constant(rotation),
            KeyframeTrack::constant(scale),
        )
    }

    pub fn evaluate_position(&self, time: f32, duration: f32) -> Mat4 {
        let time = clamp_time(time, duration);
        Mat4::from_translation(self.positions.sample_vector(time))
    }

    pub fn evaluate_rotation(&self, time: f32, duration: f32) -> Mat4 {
        let time = clamp_time(time, duration);
        Mat4::from_quat(self.rotations.sample_rotation(time))
    }

    pub fn evaluate_scaling(&self, time: f32, duration: f32) -> Mat4 {
        let time = clamp_time(time, duration);
        Mat4::from_scale(self.scales.sample_vector(time))
    }

    pub fn local_transform(&self, time: f32, duration: f32) -> Mat4 {
        self.evaluate_position(time, duration)
            * self.evaluate_rotation(time, duration)
            * self.evaluate_scaling(time, duration)
    }
}

fn clamp_time(time: f32, duration: f32) -> f32 {
    if duration > 0.0 {
        time.clamp(0.0, duration)
    } else {
        time.max(0.0)
    }
}
