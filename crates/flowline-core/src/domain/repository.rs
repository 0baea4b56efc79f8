//! Repository traits for Flowline Core
//!
//! The engine never talks to storage directly. The Process Manager loads
//! and saves through these traits so that external crates can provide
//! different persistence mechanisms.

use async_trait::async_trait;
use std::sync::Arc;

use super::model::{ProcessModel, ProcessModelId};
use super::process_instance::{ProcessInstance, ProcessInstanceId};
use crate::CoreError;

/// Repository for process models
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessModelRepository: Send + Sync {
    /// Find a process model by ID
    async fn find_by_id(&self, id: &ProcessModelId)
        -> Result<Option<Arc<ProcessModel>>, CoreError>;

    /// Save a process model, replacing any model with the same ID
    async fn save(&self, model: ProcessModel) -> Result<(), CoreError>;

    /// Get all process models
    async fn find_all(&self) -> Result<Vec<Arc<ProcessModel>>, CoreError>;
}

/// Repository for process instances
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessInstanceRepository: Send + Sync {
    /// Find a process instance by ID
    async fn find_by_id(&self, id: &ProcessInstanceId)
        -> Result<Option<ProcessInstance>, CoreError>;

    /// Save a process instance
    async fn save(&self, instance: &ProcessInstance) -> Result<(), CoreError>;

    /// Delete a process instance
    async fn delete(&self, id: &ProcessInstanceId) -> Result<(), CoreError>;

    /// IDs of the running instances of a model
    async fn find_running_for_model(
        &self,
        model_id: &ProcessModelId,
    ) -> Result<Vec<ProcessInstanceId>, CoreError>;

    /// List all process instances
    async fn list_instances(&self) -> Result<Vec<ProcessInstance>, CoreError>;
}
