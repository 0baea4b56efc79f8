//! In-memory state store implementation for Flowline
//!
//! This crate provides in-memory implementations of the repository
//! interfaces defined in the flowline-core crate. It is primarily useful for
//! development, testing, and simple deployments where persistence is not required.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod repositories;
pub use repositories::{InMemoryProcessInstanceRepository, InMemoryProcessModelRepository};

use flowline_core::{
    domain::model::ProcessModel,
    domain::repository::{ProcessInstanceRepository, ProcessModelRepository},
};

#[cfg(test)]
mod tests;

/// Provider for in-memory state store repositories
#[derive(Default)]
pub struct InMemoryStateStoreProvider {
    // Shared storage for process models
    models: Arc<RwLock<HashMap<String, Arc<ProcessModel>>>>,

    // Shared storage for process instances
    instances: Arc<RwLock<HashMap<String, serde_json::Value>>>,
}

impl InMemoryStateStoreProvider {
    /// Create a new in-memory state store provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Create repositories for use with the Process Manager
    ///
    /// Repositories created by one provider share the same storage.
    pub fn create_repositories(
        &self,
    ) -> (
        Arc<dyn ProcessModelRepository>,
        Arc<dyn ProcessInstanceRepository>,
    ) {
        let model_repo = Arc::new(InMemoryProcessModelRepository::new(self.models.clone()));
        let instance_repo = Arc::new(InMemoryProcessInstanceRepository::new(
            self.instances.clone(),
        ));

        (model_repo, instance_repo)
    }
}
