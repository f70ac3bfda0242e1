use crate::backend::{BackendId, BackendRegistry};
use crate::error::AnalysisError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const SCIENTIFIC: &str = "scientific";
pub const STYLE: &str = "style";
pub const SYNTHESIS: &str = "synthesis";
pub const OUTLINE: &str = "outline";

/// Task name to backend mapping for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskConfig {
    tasks: BTreeMap<String, BackendId>,
}

impl TaskConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, task: impl Into<String>, backend: BackendId) -> Self {
        self.tasks.insert(task.into(), backend);
        self
    }

    /// Claude for the analytical tasks; style goes to Gemini, then OpenAI, whichever is
    /// available first.
    pub fn default_for(registry: &BackendRegistry) -> Self {
        let style = [BackendId::Gemini, BackendId::OpenAI]
            .into_iter()
            .find(|id| registry.is_available(*id))
            .unwrap_or(BackendId::Claude);

        Self::new()
            .with(SCIENTIFIC, BackendId::Claude)
            .with(STYLE, style)
            .with(SYNTHESIS, BackendId::Claude)
            .with(OUTLINE, BackendId::Claude)
    }

    pub fn get(&self, task: &str) -> Option<BackendId> {
        self.tasks.get(task).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, BackendId)> {
        self.tasks.iter().map(|(task, id)| (task.as_str(), *id))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Resolves task names to backends.
///
/// The mapping is held behind an `Arc`; [`AnalysisRouter::replace`] swaps the pointer, so
/// a snapshot taken before a reconfiguration keeps resolving against the old mapping.
#[derive(Debug, Clone)]
pub struct AnalysisRouter {
    config: Arc<TaskConfig>,
}

impl AnalysisRouter {
    pub fn new(config: TaskConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn resolve_backend(&self, task: &str) -> Result<BackendId, AnalysisError> {
        self.config
            .get(task)
            .ok_or_else(|| AnalysisError::UnknownTask(task.to_string()))
    }

    pub fn replace(&mut self, config: TaskConfig) {
        self.config = Arc::new(config);
    }

    pub fn snapshot(&self) -> Arc<TaskConfig> {
        Arc::clone(&self.config)
    }
}
