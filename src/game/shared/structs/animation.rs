use anyhow::bail;
use glam::Mat4;

use crate::game::shared::structs::{Bone, MAX_BONES};

/// One node of a clip's hierarchy. Nodes without a bone are rigid
/// attachments that only carry their rest transform down the tree.
#[derive(Clone, Debug)]
pub struct ClipNode {
    pub name: String,
    pub rest_transform: Mat4,
    pub children: Vec<ClipNode>,
    pub bone: Option<Bone>,
}

impl ClipNode {
    pub fn new(name: &str, rest_transform: Mat4) -> Self {
        ClipNode {
            name: name.to_string(),
            rest_transform,
            children: vec![],
            bone: None,
        }
    }

    pub fn with_bone(mut self, bone: Bone) -> Self {
        self.bone = Some(bone);
        self
    }

    pub fn with_child(mut self, child: ClipNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn bones(&self) -> Vec<&Bone> {
        let mut bones = vec![];
        self.collect_bones(&mut bones);
        bones
    }

    fn collect_bones<'a>(&'a self, bones: &mut Vec<&'a Bone>) {
        if let Some(bone) = self.bone.as_ref() {
            bones.push(bone);
        }
        for child in self.children.iter() {
            child.collect_bones(bones);
        }
    }
}

#[derive(Clone, Debug)]
pub struct AnimationClip {
    pub name: String,
    pub duration: f32,
    pub ticks_per_second: f32,
    pub root_node: ClipNode,
    pub global_inverse_transform: Mat4,
}

impl AnimationClip {
    pub fn new(
        name: &str,
        duration: f32,
        ticks_per_second: f32,
        root_node: ClipNode,
    ) -> anyhow::Result<Self> {
        if !duration.is_finite() || duration < 0.0 {
            bail!("Animation {} has an invalid duration {}.", name, duration);
        }
        if !ticks_per_second.is_finite() || ticks_per_second <= 0.0 {
            bail!(
                "Animation {} has an invalid tick rate {}.",
                name,
                ticks_per_second
            );
        }
        let mut used = [false; MAX_BONES];
        for bone in root_node.bones() {
            if bone.index >= MAX_BONES {
                bail!("Bone {} is outside the palette.", bone.name);
            }
            if std::mem::replace(&mut used[bone.index], true) {
                bail!(
                    "Animation {} maps more than one bone to palette slot {}.",
                    name,
                    bone.index
                );
            }
        }
        Ok(AnimationClip {
            name: name.to_string(),
            duration,
            ticks_per_second,
            root_node,
            global_inverse_transform: Mat4::IDENTITY,
        })
    }

    pub fn with_global_inverse_transform(mut self, transform: Mat4) -> Self {
        self.global_inverse_transform = transform;
        self
    }

    pub fn bone_count(&self) -> usize {
        self.root_node.bones().len()
    }

    pub fn find_bone(&self, name: &str) -> Option<&Bone> {
        self.root_node
            .bones()
            .into_iter()
            .find(|bone| bone.name == name)
    }

    /// Writes the final skinning matrix of every bone in the clip into
    /// `buffer`. Slots not owned by a bone are left untouched.
    pub fn evaluate(&self, time: f32, buffer: &mut [Mat4; MAX_BONES]) {
        generate_bone_transforms(
            &self.root_node,
            time,
            self.duration,
            self.global_inverse_transform,
            buffer,
        );
    }
}

pub fn generate_bone_transforms(
    node: &ClipNode,
    time: f32,
    duration: f32,
    parent_transform: Mat4,
    buffer: &mut [Mat4; MAX_BONES],
) {
    let local_transform = match node.bone.as_ref() {
        Some(bone) => bone.local_transform(time, duration),
        None => node.rest_transform,
    };
    let global_transform = parent_transform * local_transform;
    if let Some(bone) = node.bone.as_ref() {
        if let Some(slot) = buffer.get_mut(bone.index) {
            *slot = global_transform * bone.offset_matrix;
        }
    }
    for child in node.children.iter() {
        generate_bone_transforms(child, time, duration, global_transform, buffer);
    }
}
