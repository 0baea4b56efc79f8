use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use flowline_core::{
    domain::model::{ProcessModel, ProcessModelId},
    domain::process_instance::{ProcessInstance, ProcessInstanceId},
    domain::repository::{ProcessInstanceRepository, ProcessModelRepository},
    CoreError,
};

/// In-memory implementation of the ProcessModelRepository
pub struct InMemoryProcessModelRepository {
    models: Arc<RwLock<HashMap<String, Arc<ProcessModel>>>>,
}

impl InMemoryProcessModelRepository {
    /// Create a new in-memory process model repository
    pub fn new(models: Arc<RwLock<HashMap<String, Arc<ProcessModel>>>>) -> Self {
        Self { models }
    }
}

#[async_trait]
impl ProcessModelRepository for InMemoryProcessModelRepository {
    async fn find_by_id(
        &self,
        id: &ProcessModelId,
    ) -> Result<Option<Arc<ProcessModel>>, CoreError> {
        let models = self.models.read().await;
        Ok(models.get(&id.0).cloned())
    }

    async fn save(&self, model: ProcessModel) -> Result<(), CoreError> {
        let mut models = self.models.write().await;
        debug!(model_id = %model.id(), "Saving process model");
        models.insert(model.id().0.clone(), Arc::new(model));
        Ok(())
    }

    async fn find_all(&self) -> Result<Vec<Arc<ProcessModel>>, CoreError> {
        let models = self.models.read().await;
        let mut all: Vec<Arc<ProcessModel>> = models.values().cloned().collect();
        all.sort_by(|a, b| a.id().0.cmp(&b.id().0));
        Ok(all)
    }
}

/// In-memory implementation of the ProcessInstanceRepository
///
/// Instances are kept as JSON snapshots, so every load goes through the
/// same serialization a durable store would.
pub struct InMemoryProcessInstanceRepository {
    instances: Arc<RwLock<HashMap<String, Value>>>,
}

impl InMemoryProcessInstanceRepository {
    /// Create a new in-memory process instance repository
    pub fn new(instances: Arc<RwLock<HashMap<String, Value>>>) -> Self {
        Self { instances }
    }

    fn restore(snapshot: &Value) -> Result<ProcessInstance, CoreError> {
        Ok(ProcessInstance::deserialize(snapshot)?)
    }

    async fn load_all(&self) -> Result<Vec<ProcessInstance>, CoreError> {
        let instances = self.instances.read().await;
        let mut all = instances
            .values()
            .map(Self::restore)
            .collect::<Result<Vec<_>, _>>()?;
        all.sort_by_key(|instance| instance.created_at);
        Ok(all)
    }
}

#[async_trait]
impl ProcessInstanceRepository for InMemoryProcessInstanceRepository {
    async fn find_by_id(
        &self,
        id: &ProcessInstanceId,
    ) -> Result<Option<ProcessInstance>, CoreError> {
        let instances = self.instances.read().await;
        instances.get(&id.0).map(Self::restore).transpose()
    }

    async fn save(&self, instance: &ProcessInstance) -> Result<(), CoreError> {
        let snapshot = serde_json::to_value(instance)?;
        let mut instances = self.instances.write().await;
        debug!(
            instance_id = %instance.id,
            history_len = instance.history().len(),
            "Saving process instance"
        );
        instances.insert(instance.id.0.clone(), snapshot);
        Ok(())
    }

    async fn delete(&self, id: &ProcessInstanceId) -> Result<(), CoreError> {
        let mut instances = self.instances.write().await;
        if instances.remove(&id.0).is_none() {
            warn!(instance_id = %id, "Deleting unknown process instance");
        }
        Ok(())
    }

    async fn find_running_for_model(
        &self,
        model_id: &ProcessModelId,
    ) -> Result<Vec<ProcessInstanceId>, CoreError> {
        let running = self
            .load_all()
            .await?
            .into_iter()
            .filter(|instance| &instance.process_model_id == model_id && instance.is_running())
            .map(|instance| instance.id)
            .collect();

        Ok(running)
    }

    async fn list_instances(&self) -> Result<Vec<ProcessInstance>, CoreError> {
        self.load_all().await
    }
}
