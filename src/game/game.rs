use anyhow::Context;
use glam::Mat4;
use slotmap::{DefaultKey, SlotMap};
use std::sync::Arc;

use crate::game::shared::structs::{LoopMode, Skeleton, SkinnedModel, MAX_BONES};
use crate::game::shared::systems::JobScheduler;
use crate::game::ResourceManager;

/// Drives every animated entity once per frame.
///
/// [`Game::update`] advances each skeleton, submits its pose job and then
/// waits on the scheduler, so palettes are only ever read between frames.
pub struct Game {
    pub resource_manager: Arc<ResourceManager>,
    job_scheduler: JobScheduler,
    entities: SlotMap<DefaultKey, Skeleton>,
    loop_mode: LoopMode,
    frame_count: u64,
}

impl Game {
    pub fn new(job_scheduler: JobScheduler, resource_manager: Arc<ResourceManager>) -> Self {
        Game {
            resource_manager,
            job_scheduler,
            entities: SlotMap::new(),
            loop_mode: LoopMode::default(),
            frame_count: 0,
        }
    }

    /// Loop mode given to skeletons added from now on.
    pub fn with_loop_mode(mut self, loop_mode: LoopMode) -> Self {
        self.loop_mode = loop_mode;
        self
    }

    pub fn initialize(&mut self) -> anyhow::Result<()> {
        self.job_scheduler.begin()
    }

    pub fn add_skinned_model(&mut self, file_name: &str) -> anyhow::Result<DefaultKey> {
        let model = self.resource_manager.load_model(file_name)?;
        self.add_model_instance(&model)
    }

    /// Creates a skeleton for `model` playing its default clip.
    pub fn add_model_instance(&mut self, model: &SkinnedModel) -> anyhow::Result<DefaultKey> {
        let mut skeleton = model.create_skeleton().with_loop_mode(self.loop_mode);
        if let Some(clip_name) = model.default_clip_name() {
            skeleton.set_active_clip(clip_name)?;
        }
        let entity = self.add_skeleton(skeleton);
        log::debug!("Added instance of {} as {:?}.", &model.model_name, entity);
        Ok(entity)
    }

    pub fn add_skeleton(&mut self, skeleton: Skeleton) -> DefaultKey {
        self.entities.insert(skeleton)
    }

    /// Removing between frames is always safe: `update` never returns with a
    /// pose job still queued.
    pub fn remove_entity(&mut self, entity: DefaultKey) -> Option<Skeleton> {
        self.entities.remove(entity)
    }

    pub fn set_animation(&mut self, entity: DefaultKey, clip_name: &str) -> anyhow::Result<()> {
        self.entities
            .get_mut(entity)
            .with_context(|| format!("Entity {:?} does not exist.", entity))?
            .set_active_clip(clip_name)
    }

    pub fn skeleton(&self, entity: DefaultKey) -> Option<&Skeleton> {
        self.entities.get(entity)
    }

    pub fn skeleton_mut(&mut self, entity: DefaultKey) -> Option<&mut Skeleton> {
        self.entities.get_mut(entity)
    }

    pub fn bone_matrices(&self, entity: DefaultKey) -> Option<[Mat4; MAX_BONES]> {
        self.entities.get(entity).map(|skeleton| skeleton.final_matrices())
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn job_scheduler(&self) -> &JobScheduler {
        &self.job_scheduler
    }

    pub fn update(&mut self, delta_time: f64) -> anyhow::Result<()> {
        for (_, skeleton) in self.entities.iter_mut() {
            skeleton.advance_time(delta_time);
            skeleton.submit_pose_job(&self.job_scheduler);
        }
        self.frame_count += 1;
        self.job_scheduler
            .wait_for_jobs()
            .with_context(|| format!("Pose evaluation failed in frame {}.", self.frame_count))
    }

    pub fn shutdown(&mut self) {
        self.job_scheduler.end();
    }
}

impl Drop for Game {
    fn drop(&mut self) {
        log::info!("Dropping game after {} frame(s)...", self.frame_count);
        self.shutdown();
    }
}
