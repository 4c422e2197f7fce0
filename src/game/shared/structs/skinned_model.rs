use anyhow::Context;
use glam::{Mat4, Quat, Vec3};
use gltf::animation::util::ReadOutputs;
use gltf::animation::Interpolation;
use gltf::Node;
use std::collections::HashMap;
use std::sync::Arc;

use crate::game::shared::structs::{
    AnimationClip, Bone, ClipNode, KeyframeTrack, Skeleton, MAX_BONES,
};
use crate::game::util::read_raw_data;

/// Animation data extracted once from a skinned model and shared by every
/// instance of it.
pub struct SkinnedModel {
    pub model_name: String,
    pub clips: HashMap<String, Arc<AnimationClip>>,
}

/// Keyframe tracks found for one node in one glTF animation.
#[derive(Default)]
struct NodeChannels {
    translations: Option<KeyframeTrack<Vec3>>,
    rotations: Option<KeyframeTrack<Quat>>,
    scales: Option<KeyframeTrack<Vec3>>,
}

/// Skin joints by node index: palette slot and inverse bind matrix.
type JointLookup = HashMap<usize, (usize, Mat4)>;

impl SkinnedModel {
    pub fn new(file_name: &str) -> anyhow::Result<Self> {
        log::info!("Loading skinned model from glTF {}...", file_name);
        let (document, buffers, _images) = read_raw_data(file_name)?;
        Self::from_gltf(file_name, &document, &buffers)
    }

    pub fn from_clips(model_name: &str, clips: Vec<AnimationClip>) -> Self {
        let clips = clips
            .into_iter()
            .map(|clip| (clip.name.clone(), Arc::new(clip)))
            .collect();
        SkinnedModel {
            model_name: model_name.to_string(),
            clips,
        }
    }

    pub fn from_gltf(
        model_name: &str,
        document: &gltf::Document,
        buffers: &[gltf::buffer::Data],
    ) -> anyhow::Result<Self> {
        let skin = document
            .skins()
            .next()
            .with_context(|| format!("Model {} has no skin.", model_name))?;
        let joints = Self::process_joints(&skin, buffers);
        log::info!("Skinned model joint count: {}", joints.len());
        let scene = document
            .default_scene()
            .or_else(|| document.scenes().next())
            .with_context(|| format!("Model {} has no scene.", model_name))?;

        let mut clips = vec![];
        for (index, animation) in document.animations().enumerate() {
            let name = match animation.name() {
                Some(name) => name.to_string(),
                None => format!("default{}", index),
            };
            let (channels, duration) = Self::process_animation(&animation, buffers)
                .with_context(|| format!("Failed to read animation {}.", &name))?;
            let root_node = Self::process_scene(&scene, &joints, &channels)?;
            clips.push(AnimationClip::new(&name, duration, 1.0, root_node)?);
        }
        if clips.is_empty() {
            log::warn!("Model {} has no animations, using its bind pose.", model_name);
            let root_node = Self::process_scene(&scene, &joints, &HashMap::new())?;
            clips.push(AnimationClip::new("bind_pose", 0.0, 1.0, root_node)?);
        }
        log::info!("Animation count: {}", clips.len());
        Ok(Self::from_clips(model_name, clips))
    }

    fn process_joints(skin: &gltf::Skin, buffers: &[gltf::buffer::Data]) -> JointLookup {
        let reader = skin.reader(|buffer| Some(&buffers[buffer.index()]));
        let ibm: Vec<Mat4> = reader
            .read_inverse_bind_matrices()
            .map(|matrices| matrices.map(|m| Mat4::from_cols_array_2d(&m)).collect())
            .unwrap_or_default();
        let mut joints = HashMap::new();
        for (index, node) in skin.joints().enumerate() {
            if index >= MAX_BONES {
                log::warn!(
                    "Joint {} ({}) does not fit in the bone palette and is skipped.",
                    index,
                    node.name().unwrap_or("")
                );
                continue;
            }
            let offset = ibm.get(index).copied().unwrap_or(Mat4::IDENTITY);
            joints.insert(node.index(), (index, offset));
        }
        joints
    }

    fn process_animation(
        animation: &gltf::Animation,
        buffers: &[gltf::buffer::Data],
    ) -> anyhow::Result<(HashMap<usize, NodeChannels>, f32)> {
        let mut channels: HashMap<usize, NodeChannels> = HashMap::new();
        let mut duration = 0.0_f32;
        for channel in animation.channels() {
            let target_node_index = channel.target().node().index();
            let interpolation = channel.sampler().interpolation();
            let reader = channel.reader(|buffer| Some(&buffers[buffer.index()]));
            let inputs = match reader.read_inputs() {
                Some(inputs) => inputs.collect::<Vec<_>>(),
                None => {
                    log::warn!("Channel for node {} has no inputs.", target_node_index);
                    continue;
                }
            };
            let outputs = match reader.read_outputs() {
                Some(outputs) => outputs,
                None => {
                    log::warn!("Channel for node {} has no outputs.", target_node_index);
                    continue;
                }
            };
            if let Some(last) = inputs.last() {
                duration = duration.max(*last);
            }
            let entry = channels.entry(target_node_index).or_default();
            match outputs {
                ReadOutputs::Translations(translations) => {
                    let values: Vec<Vec3> = translations.map(Vec3::from).collect();
                    entry.translations = Some(read_track(values, inputs, interpolation)?);
                }
                ReadOutputs::Rotations(rotations) => {
                    let values: Vec<Quat> = rotations.into_f32().map(Quat::from_array).collect();
                    entry.rotations = Some(read_track(values, inputs, interpolation)?);
                }
                ReadOutputs::Scales(scales) => {
                    let values: Vec<Vec3> = scales.map(Vec3::from).collect();
                    entry.scales = Some(read_track(values, inputs, interpolation)?);
                }
                ReadOutputs::MorphTargetWeights(_) => {
                    log::warn!("Morph target weights are not supported and are skipped.");
                }
            }
        }
        Ok((channels, duration))
    }

    fn process_scene(
        scene: &gltf::Scene,
        joints: &JointLookup,
        channels: &HashMap<usize, NodeChannels>,
    ) -> anyhow::Result<ClipNode> {
        let mut roots = scene
            .nodes()
            .map(|node| Self::process_node(&node, joints, channels))
            .collect::<anyhow::Result<Vec<_>>>()?;
        if roots.len() == 1 {
            if let Some(root) = roots.pop() {
                return Ok(root);
            }
        }
        let mut root = ClipNode::new(scene.name().unwrap_or("scene"), Mat4::IDENTITY);
        root.children = roots;
        Ok(root)
    }

    fn process_node(
        node: &Node,
        joints: &JointLookup,
        channels: &HashMap<usize, NodeChannels>,
    ) -> anyhow::Result<ClipNode> {
        let name = node.name().unwrap_or("");
        let rest_transform = Mat4::from_cols_array_2d(&node.transform().matrix());
        let mut clip_node = ClipNode::new(name, rest_transform);
        if let Some((index, offset)) = joints.get(&node.index()) {
            let (t, r, s) = node.transform().decomposed();
            let node_channels = channels.get(&node.index());
            let translations = node_channels
                .and_then(|c| c.translations.clone())
                .unwrap_or_else(|| KeyframeTrack::constant(Vec3::from(t)));
            let rotations = node_channels
                .and_then(|c| c.rotations.clone())
                .unwrap_or_else(|| KeyframeTrack::constant(Quat::from_array(r)));
            let scales = node_channels
                .and_then(|c| c.scales.clone())
                .unwrap_or_else(|| KeyframeTrack::constant(Vec3::from(s)));
            let bone = Bone::new(name, *index, *offset, translations, rotations, scales)?;
            clip_node = clip_node.with_bone(bone);
        }
        for child in node.children() {
            clip_node = clip_node.with_child(Self::process_node(&child, joints, channels)?);
        }
        Ok(clip_node)
    }

    pub fn clip(&self, name: &str) -> Option<Arc<AnimationClip>> {
        self.clips.get(name).cloned()
    }

    /// The alphabetically first clip, so every instance starts on the same one.
    pub fn default_clip_name(&self) -> Option<&str> {
        self.clips.keys().map(|name| name.as_str()).min()
    }

    pub fn create_skeleton(&self) -> Skeleton {
        Skeleton::new(self.clips.clone())
    }
}

// Cubic spline outputs hold an (in tangent, value, out tangent) triple per input.
fn read_track<T: Copy>(
    values: Vec<T>,
    inputs: Vec<f32>,
    interpolation: Interpolation,
) -> anyhow::Result<KeyframeTrack<T>> {
    match interpolation {
        Interpolation::Linear => KeyframeTrack::from_samples(values, inputs),
        Interpolation::Step => KeyframeTrack::from_step_samples(values, inputs),
        Interpolation::CubicSpline => KeyframeTrack::from_cubic_spline(values, inputs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::shared::structs::TrackInterpolation;

    #[test]
    fn sampler_interpolation_carries_into_the_track() {
        let values = vec![0.0_f32, 1.0, 2.0, 10.0, 11.0, 12.0];
        let spline = read_track(values.clone(), vec![0.0, 1.0], Interpolation::CubicSpline).unwrap();
        assert_eq!(TrackInterpolation::CubicSpline, spline.interpolation());
        assert_eq!(2, spline.len());
        assert_eq!(11.0, spline.keyframes()[1].value);
        assert_eq!(12.0, spline.tangents()[1].out_tangent);

        let step = read_track(vec![0.0_f32, 1.0], vec![0.0, 1.0], Interpolation::Step).unwrap();
        assert_eq!(TrackInterpolation::Step, step.interpolation());
        assert!(read_track(values, vec![0.0, 1.0], Interpolation::Linear).is_err());
    }

    #[test]
    fn default_clip_is_stable() {
        let root = ClipNode::new("root", Mat4::IDENTITY);
        let model = SkinnedModel::from_clips(
            "robot",
            vec![
                AnimationClip::new("walk", 1.0, 1.0, root.clone()).unwrap(),
                AnimationClip::new("idle", 1.0, 1.0, root).unwrap(),
            ],
        );
        assert_eq!(Some("idle"), model.default_clip_name());
        assert!(model.clip("walk").is_some());
        assert_eq!(2, model.create_skeleton().clip_names().len());
    }
}
