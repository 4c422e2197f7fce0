pub mod animation;
pub mod bone;
pub mod keyframe;
pub mod skeleton;
pub mod skinned_model;
pub use animation::{generate_bone_transforms, AnimationClip, ClipNode};
pub use bone::{Bone, MAX_BONES};
pub use keyframe::{Keyframe, KeyframeIndex, KeyframeTrack, SplineTangents, TrackInterpolation};
pub use skeleton::{LoopMode, PlaybackState, Skeleton};
pub use skinned_model::SkinnedModel;
