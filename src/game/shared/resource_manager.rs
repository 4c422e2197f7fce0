use dashmap::DashMap;
use std::sync::Arc;

use crate::game::shared::structs::SkinnedModel;

/// Loaded skinned models by name. Each model's clips are extracted once and
/// shared by every skeleton created from it.
#[derive(Default)]
pub struct ResourceManager {
    models: DashMap<String, Arc<SkinnedModel>>,
}

impl ResourceManager {
    pub fn new() -> Self {
        ResourceManager {
            models: DashMap::new(),
        }
    }

    /// Registers `model` unless a model with the same name is already cached,
    /// in which case the cached one is returned.
    pub fn add_model(&self, model: SkinnedModel) -> Arc<SkinnedModel> {
        self.models
            .entry(model.model_name.clone())
            .or_insert_with(|| Arc::new(model))
            .clone()
    }

    pub fn get_model(&self, model_name: &str) -> Option<Arc<SkinnedModel>> {
        self.models.get(model_name).map(|model| model.clone())
    }

    pub fn load_model(&self, file_name: &str) -> anyhow::Result<Arc<SkinnedModel>> {
        if let Some(model) = self.get_model(file_name) {
            log::debug!("Using cached skinned model {}.", file_name);
            return Ok(model);
        }
        let model = SkinnedModel::new(file_name)?;
        Ok(self.add_model(model))
    }

    pub fn remove_model(&self, model_name: &str) -> bool {
        self.models.remove(model_name).is_some()
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }
}
