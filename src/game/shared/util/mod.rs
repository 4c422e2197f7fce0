use anyhow::Context;
use glam::{Mat4, Quat, Vec3};
use std::f32::consts::FRAC_PI_4;

use crate::game::shared::structs::{AnimationClip, Bone, ClipNode, KeyframeTrack, SkinnedModel};

pub const DEMO_MODEL_NAME: &str = "demo_arm";

pub fn read_raw_data(
    file_name: &str,
) -> anyhow::Result<(
    gltf::Document,
    Vec<gltf::buffer::Data>,
    Vec<gltf::image::Data>,
)> {
    let (document, buffers, images) = gltf::import(file_name)
        .with_context(|| format!("Failed to import skinned model from glTF {}.", file_name))?;
    Ok((document, buffers, images))
}

/// A three-bone arm with a rigid hand attachment, waving about its shoulder.
pub fn create_demo_model() -> anyhow::Result<SkinnedModel> {
    let segment = Vec3::new(0.0, 1.0, 0.0);
    let time_stamps = vec![0.0, 0.5, 1.0, 1.5, 2.0];
    let swing = |amplitude: f32| -> anyhow::Result<KeyframeTrack<Quat>> {
        KeyframeTrack::from_samples(
            vec![
                Quat::IDENTITY,
                Quat::from_rotation_z(amplitude),
                Quat::IDENTITY,
                Quat::from_rotation_z(-amplitude),
                Quat::IDENTITY,
            ],
            time_stamps.clone(),
        )
    };

    let mut bones = vec![];
    for (index, name) in ["shoulder", "elbow", "wrist"].iter().enumerate() {
        let bind_height = segment * index as f32;
        let offset = Mat4::from_translation(-bind_height);
        let translation = if index == 0 { Vec3::ZERO } else { segment };
        bones.push(Bone::new(
            name,
            index,
            offset,
            KeyframeTrack::constant(translation),
            swing(FRAC_PI_4 / (index + 1) as f32)?,
            KeyframeTrack::from_samples(
                vec![Vec3::ONE, Vec3::splat(1.1), Vec3::ONE],
                vec![0.0, 1.0, 2.0],
            )?,
        )?);
    }

    let mut chain = ClipNode::new("hand_attachment", Mat4::from_translation(segment * 0.5));
    for bone in bones.into_iter().rev() {
        chain = ClipNode::new(&bone.name, Mat4::IDENTITY)
            .with_bone(bone)
            .with_child(chain);
    }
    let root_node = ClipNode::new("armature", Mat4::IDENTITY).with_child(chain);
    let wave = AnimationClip::new("wave", 2.0, 1.0, root_node)?;
    Ok(SkinnedModel::from_clips(DEMO_MODEL_NAME, vec![wave]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::shared::structs::MAX_BONES;

    #[test]
    fn demo_model_binds_to_its_rest_pose() {
        let model = create_demo_model().unwrap();
        let clip = model.clip("wave").unwrap();
        assert_eq!(3, clip.bone_count());
        let mut buffer = [Mat4::ZERO; MAX_BONES];
        clip.evaluate(0.0, &mut buffer);
        for matrix in buffer.iter().take(3) {
            assert!(matrix.abs_diff_eq(Mat4::IDENTITY, 1e-5));
        }
        assert_eq!(Mat4::ZERO, buffer[3]);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(read_raw_data("./does/not/exist.gltf").is_err());
    }
}
