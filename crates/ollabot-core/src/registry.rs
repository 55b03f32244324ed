//! Model listing, vision capability and thinking eligibility

use ollabot_config::{ModelSourceKind, ModelsConfig};
use ollabot_providers::{Backend, BackendError};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// Fixed list from configuration.
    Static(Vec<String>),
    /// Whatever the backend reports on its catalog endpoint.
    Catalog,
}

pub struct ModelRegistry {
    source: ModelSource,
    vision_families: Vec<String>,
    backend: Arc<dyn Backend>,
}

impl ModelRegistry {
    pub fn new(source: ModelSource, vision_families: Vec<String>, backend: Arc<dyn Backend>) -> Self {
        Self {
            source,
            vision_families,
            backend,
        }
    }

    pub fn from_config(config: &ModelsConfig, backend: Arc<dyn Backend>) -> Self {
        let source = match config.source {
            ModelSourceKind::Static => ModelSource::Static(config.static_models.clone()),
            ModelSourceKind::Catalog => ModelSource::Catalog,
        };
        Self::new(source, config.vision_families.clone(), backend)
    }

    /// Sorted ascending, duplicates removed. Catalog failures propagate.
    pub async fn list_models(&self) -> Result<Vec<String>, BackendError> {
        let mut models = match &self.source {
            ModelSource::Static(models) => models.clone(),
            ModelSource::Catalog => self.backend.list_models().await?,
        };
        models.sort();
        models.dedup();
        Ok(models)
    }

    /// Family heuristic: the part before the first `:` is a known family, or
    /// any known family occurs inside the id. Matches loosely: a name like
    /// `not-llava-really` counts as vision capable.
    pub fn supports_vision(&self, model: &str) -> bool {
        let family = model.split(':').next().unwrap_or(model);
        self.vision_families.iter().any(|f| f == family)
            || self
                .vision_families
                .iter()
                .any(|f| !f.is_empty() && model.contains(f.as_str()))
    }

    /// Ids accepted by `/model`. A catalog source accepts anything.
    pub fn is_selectable(&self, model: &str) -> bool {
        match &self.source {
            ModelSource::Static(models) => models.iter().any(|m| m == model),
            ModelSource::Catalog => true,
        }
    }
}

/// Which models the `/thinking off` switch applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThinkingPolicy {
    Unconditional,
    AllowList(HashSet<String>),
}

impl ThinkingPolicy {
    pub fn from_config(allow_list: Option<&[String]>) -> Self {
        match allow_list {
            Some(models) => ThinkingPolicy::AllowList(models.iter().cloned().collect()),
            None => ThinkingPolicy::Unconditional,
        }
    }

    pub fn applies_to(&self, model: &str) -> bool {
        match self {
            ThinkingPolicy::Unconditional => true,
            ThinkingPolicy::AllowList(models) => models.contains(model),
        }
    }
}
