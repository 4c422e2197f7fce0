use anyhow::{anyhow, bail};
use glam::Mat4;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Weak};

use crate::game::shared::structs::{AnimationClip, MAX_BONES};
use crate::game::shared::systems::{Job, JobScheduler};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
}

/// What happens when playback time runs past the end of a clip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopMode {
    /// Jump back to the first frame, dropping the overshoot.
    Restart,
    /// Keep the overshoot, `time -= duration`.
    Wrap,
}

impl Default for LoopMode {
    fn default() -> Self {
        LoopMode::Restart
    }
}

impl FromStr for LoopMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "restart" => Ok(LoopMode::Restart),
            "wrap" => Ok(LoopMode::Wrap),
            _ => Err(anyhow!("Unknown loop mode: {}", s)),
        }
    }
}

/// Everything the pose job reads and writes.
#[derive(Clone)]
struct Pose {
    active_clip: Option<Arc<AnimationClip>>,
    current_time: f32,
    final_matrices: Box<[Mat4; MAX_BONES]>,
}

impl Pose {
    fn new() -> Self {
        Pose {
            active_clip: None,
            current_time: 0.0,
            final_matrices: Box::new([Mat4::IDENTITY; MAX_BONES]),
        }
    }

    fn evaluate(&mut self) {
        if let Some(clip) = self.active_clip.as_ref() {
            clip.evaluate(self.current_time, &mut self.final_matrices);
        }
    }
}

/// Per-entity animation state and its bone palette.
///
/// The palette is written by the skeleton's pose job. Between
/// [`Skeleton::submit_pose_job`] and the scheduler's barrier it must not be
/// read; afterwards it holds the pose for the time set by the last
/// [`Skeleton::advance_time`].
pub struct Skeleton {
    clips: HashMap<String, Arc<AnimationClip>>,
    loop_mode: LoopMode,
    pose: Arc<Mutex<Pose>>,
    job: Job,
}

impl Skeleton {
    pub fn new(clips: HashMap<String, Arc<AnimationClip>>) -> Self {
        Self::with_pose(clips, LoopMode::default(), Pose::new())
    }

    fn with_pose(
        clips: HashMap<String, Arc<AnimationClip>>,
        loop_mode: LoopMode,
        pose: Pose,
    ) -> Self {
        let pose = Arc::new(Mutex::new(pose));
        let job = Self::bind_job(Arc::downgrade(&pose));
        Skeleton {
            clips,
            loop_mode,
            pose,
            job,
        }
    }

    // A job left in the queue after its skeleton is gone does nothing.
    fn bind_job(pose: Weak<Mutex<Pose>>) -> Job {
        Job::new("skeleton pose", move || {
            if let Some(pose) = pose.upgrade() {
                pose.lock().evaluate();
            }
        })
    }

    pub fn with_loop_mode(mut self, loop_mode: LoopMode) -> Self {
        self.loop_mode = loop_mode;
        self
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn add_clip(&mut self, clip: Arc<AnimationClip>) {
        self.clips.insert(clip.name.clone(), clip);
    }

    pub fn clip_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.clips.keys().map(|name| name.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn set_active_clip(&mut self, name: &str) -> anyhow::Result<()> {
        let clip = match self.clips.get(name) {
            Some(clip) => clip.clone(),
            None => bail!("Skeleton has no animation named {}.", name),
        };
        self.play(clip);
        Ok(())
    }

    /// Starts `clip` from its first frame. It replaces any registered clip
    /// with the same name.
    pub fn play(&mut self, clip: Arc<AnimationClip>) {
        log::debug!("Playing animation {}.", &clip.name);
        self.clips.insert(clip.name.clone(), clip.clone());
        let mut pose = self.pose.lock();
        pose.active_clip = Some(clip);
        pose.current_time = 0.0;
    }

    /// Returns to `Idle`; the palette keeps its last value.
    pub fn stop(&mut self) {
        let mut pose = self.pose.lock();
        pose.active_clip = None;
        pose.current_time = 0.0;
    }

    pub fn state(&self) -> PlaybackState {
        if self.pose.lock().active_clip.is_some() {
            PlaybackState::Playing
        } else {
            PlaybackState::Idle
        }
    }

    pub fn active_clip(&self) -> Option<Arc<AnimationClip>> {
        self.pose.lock().active_clip.clone()
    }

    pub fn current_time(&self) -> f32 {
        self.pose.lock().current_time
    }

    pub fn advance_time(&mut self, delta_time: f64) {
        let loop_mode = self.loop_mode;
        let mut pose = self.pose.lock();
        let (duration, ticks_per_second) = match pose.active_clip.as_ref() {
            Some(clip) => (clip.duration, clip.ticks_per_second),
            None => return,
        };
        let time = (pose.current_time + ticks_per_second * delta_time as f32).max(0.0);
        pose.current_time = if time > duration {
            match loop_mode {
                LoopMode::Restart => 0.0,
                LoopMode::Wrap if duration > 0.0 => time % duration,
                LoopMode::Wrap => 0.0,
            }
        } else {
            time
        };
    }

    pub fn pose_job(&self) -> &Job {
        &self.job
    }

    pub fn submit_pose_job(&self, scheduler: &JobScheduler) {
        scheduler.submit(self.job.clone());
    }

    /// Evaluates the pose on the calling thread.
    pub fn update_pose(&self) {
        self.job.run();
    }

    /// A copy of the palette. The pose lock is released before returning, so
    /// the copy can be held across the next pose job.
    pub fn final_matrices(&self) -> [Mat4; MAX_BONES] {
        *self.pose.lock().final_matrices
    }

    /// The palette as raw bytes, laid out for a GPU storage buffer.
    pub fn palette_bytes(&self) -> Vec<u8> {
        let pose = self.pose.lock();
        bytemuck::cast_slice::<Mat4, u8>(&pose.final_matrices[..]).to_vec()
    }
}

impl Clone for Skeleton {
    fn clone(&self) -> Self {
        let pose = self.pose.lock().clone();
        Self::with_pose(self.clips.clone(), self.loop_mode, pose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::shared::structs::{Bone, ClipNode, KeyframeTrack};
    use glam::{Quat, Vec3};

    fn sliding_clip(name: &str, offset_matrix: Mat4) -> Arc<AnimationClip> {
        let bone = Bone::new(
            "slider",
            0,
            offset_matrix,
            KeyframeTrack::from_samples(vec![Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0)], vec![0.0, 1.0])
                .unwrap(),
            KeyframeTrack::constant(Quat::IDENTITY),
            KeyframeTrack::constant(Vec3::ONE),
        )
        .unwrap();
        let root = ClipNode::new("root", Mat4::IDENTITY).with_bone(bone);
        Arc::new(AnimationClip::new(name, 1.0, 1.0, root).unwrap())
    }

    fn skeleton_with(clip: Arc<AnimationClip>) -> Skeleton {
        let mut clips = HashMap::new();
        clips.insert(clip.name.clone(), clip);
        Skeleton::new(clips)
    }

    #[test]
    fn new_skeleton_is_idle_with_identity_palette() {
        let skeleton = skeleton_with(sliding_clip("walk", Mat4::IDENTITY));
        assert_eq!(PlaybackState::Idle, skeleton.state());
        assert!(skeleton
            .final_matrices()
            .iter()
            .all(|matrix| *matrix == Mat4::IDENTITY));
    }

    #[test]
    fn half_second_advance_translates_by_half_the_track() {
        let offset = Mat4::from_translation(Vec3::new(0.0, 0.0, -2.0));
        let mut skeleton = skeleton_with(sliding_clip("walk", offset));
        skeleton.set_active_clip("walk").unwrap();
        skeleton.advance_time(0.5);
        assert!((skeleton.current_time() - 0.5).abs() < 1e-6);
        skeleton.update_pose();
        let expected = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)) * offset;
        assert!(skeleton.final_matrices()[0].abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn crossing_the_duration_restarts_on_that_frame() {
        let mut skeleton = skeleton_with(sliding_clip("walk", Mat4::IDENTITY));
        skeleton.set_active_clip("walk").unwrap();
        skeleton.advance_time(0.4);
        skeleton.advance_time(0.4);
        assert!((skeleton.current_time() - 0.8).abs() < 1e-6);
        skeleton.advance_time(0.4);
        assert_eq!(0.0, skeleton.current_time());
    }

    #[test]
    fn landing_exactly_on_the_duration_keeps_the_last_frame() {
        let mut skeleton = skeleton_with(sliding_clip("walk", Mat4::IDENTITY));
        skeleton.set_active_clip("walk").unwrap();
        skeleton.advance_time(0.5);
        skeleton.advance_time(0.5);
        assert_eq!(1.0, skeleton.current_time());
        skeleton.update_pose();
        let end = Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0));
        assert!(skeleton.final_matrices()[0].abs_diff_eq(end, 1e-5));
        skeleton.advance_time(0.01);
        assert_eq!(0.0, skeleton.current_time());
    }

    #[test]
    fn wrap_mode_keeps_the_overshoot() {
        let mut skeleton =
            skeleton_with(sliding_clip("walk", Mat4::IDENTITY)).with_loop_mode(LoopMode::Wrap);
        skeleton.set_active_clip("walk").unwrap();
        skeleton.advance_time(0.75);
        skeleton.advance_time(0.5);
        assert!((skeleton.current_time() - 0.25).abs() < 1e-5);
    }

    #[test]
    fn advancing_an_idle_skeleton_does_nothing() {
        let mut skeleton = skeleton_with(sliding_clip("walk", Mat4::IDENTITY));
        skeleton.advance_time(0.5);
        assert_eq!(0.0, skeleton.current_time());
        skeleton.update_pose();
        assert_eq!(Mat4::IDENTITY, skeleton.final_matrices()[0]);
    }

    #[test]
    fn switching_clips_resets_time() {
        let mut skeleton = skeleton_with(sliding_clip("walk", Mat4::IDENTITY));
        skeleton.add_clip(sliding_clip("run", Mat4::IDENTITY));
        skeleton.set_active_clip("walk").unwrap();
        skeleton.advance_time(0.3);
        skeleton.set_active_clip("run").unwrap();
        assert_eq!(0.0, skeleton.current_time());
        assert_eq!(
            Some("run".to_string()),
            skeleton.active_clip().map(|clip| clip.name.clone())
        );
        assert_eq!(vec!["run", "walk"], skeleton.clip_names());
    }

    #[test]
    fn playing_a_clip_replaces_one_with_the_same_name() {
        let old = sliding_clip("walk", Mat4::IDENTITY);
        let mut skeleton = skeleton_with(old.clone());
        let new = sliding_clip("walk", Mat4::from_translation(Vec3::Y));
        skeleton.play(new.clone());
        skeleton.stop();
        skeleton.set_active_clip("walk").unwrap();
        let active = skeleton.active_clip().unwrap();
        assert!(Arc::ptr_eq(&new, &active));
        assert!(!Arc::ptr_eq(&old, &active));
        assert_eq!(vec!["walk"], skeleton.clip_names());
    }

    #[test]
    fn palette_copy_survives_a_pose_job() {
        let mut skeleton = skeleton_with(sliding_clip("walk", Mat4::IDENTITY));
        skeleton.set_active_clip("walk").unwrap();
        let mut scheduler = JobScheduler::new(1);
        scheduler.begin().unwrap();
        let before = skeleton.final_matrices();
        skeleton.advance_time(0.5);
        skeleton.submit_pose_job(&scheduler);
        scheduler.wait_for_jobs().unwrap();
        assert_eq!(Mat4::IDENTITY, before[0]);
        assert_ne!(before[0], skeleton.final_matrices()[0]);
        scheduler.end();
    }

    #[test]
    fn unknown_clip_is_an_error() {
        let mut skeleton = skeleton_with(sliding_clip("walk", Mat4::IDENTITY));
        assert!(skeleton.set_active_clip("fly").is_err());
        assert_eq!(PlaybackState::Idle, skeleton.state());
    }

    #[test]
    fn stop_freezes_the_palette() {
        let mut skeleton = skeleton_with(sliding_clip("walk", Mat4::IDENTITY));
        skeleton.set_active_clip("walk").unwrap();
        skeleton.advance_time(1.0);
        skeleton.update_pose();
        let frozen = skeleton.final_matrices()[0];
        skeleton.stop();
        skeleton.update_pose();
        assert_eq!(PlaybackState::Idle, skeleton.state());
        assert_eq!(frozen, skeleton.final_matrices()[0]);
    }

    #[test]
    fn clones_have_independent_state() {
        let mut skeleton = skeleton_with(sliding_clip("walk", Mat4::IDENTITY));
        skeleton.set_active_clip("walk").unwrap();
        skeleton.advance_time(0.2);
        let mut copy = skeleton.clone();
        copy.advance_time(0.5);
        copy.update_pose();
        assert!((skeleton.current_time() - 0.2).abs() < 1e-6);
        assert!((copy.current_time() - 0.7).abs() < 1e-6);
        assert_eq!(Mat4::IDENTITY, skeleton.final_matrices()[0]);
        assert_ne!(Mat4::IDENTITY, copy.final_matrices()[0]);
    }

    #[test]
    fn job_of_a_dropped_skeleton_is_harmless() {
        let skeleton = skeleton_with(sliding_clip("walk", Mat4::IDENTITY));
        let job = skeleton.pose_job().clone();
        drop(skeleton);
        job.run();
    }

    #[test]
    fn palette_bytes_cover_every_bone() {
        let skeleton = skeleton_with(sliding_clip("walk", Mat4::IDENTITY));
        assert_eq!(MAX_BONES * 64, skeleton.palette_bytes().len());
    }

    #[test]
    fn parses_loop_modes() {
        assert_eq!(LoopMode::Restart, "restart".parse::<LoopMode>().unwrap());
        assert_eq!(LoopMode::Wrap, "WRAP".parse::<LoopMode>().unwrap());
        assert!("bounce".parse::<LoopMode>().is_err());
    }
}
