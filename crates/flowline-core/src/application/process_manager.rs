use crate::{
    config::EngineConfig,
    domain::history::HistoryItem,
    domain::model::{ProcessModel, ProcessModelId},
    domain::process_instance::{ProcessInstance, ProcessInstanceId},
    domain::repository::{ProcessInstanceRepository, ProcessModelRepository},
    domain::token::TokenId,
    CoreError, DataPacket,
};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Outcome of one Process Manager call for one instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleResult {
    /// Instance that handled the call
    pub process_instance_id: ProcessInstanceId,

    /// Tokens that moved during the call
    pub affected_tokens: Vec<TokenId>,
}

/// Receives history items appended by a call, after the instance is saved
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HistoryEventHandler: Send + Sync {
    /// Handle one history item
    async fn handle_event(
        &self,
        instance_id: &ProcessInstanceId,
        item: &HistoryItem,
    ) -> Result<(), CoreError>;
}

/// Boundary service routing events and activity outcomes to instances
pub struct ProcessManager {
    /// Repository for process models
    model_repo: Arc<dyn ProcessModelRepository>,

    /// Repository for process instances
    instance_repo: Arc<dyn ProcessInstanceRepository>,

    /// History subscriber
    event_handler: Option<Arc<dyn HistoryEventHandler>>,

    config: EngineConfig,

    /// Serializes calls per instance; entries live while a call holds or awaits them
    locks: DashMap<ProcessInstanceId, Arc<Mutex<()>>>,
}

impl ProcessManager {
    /// Create a new process manager
    pub fn new(
        model_repo: Arc<dyn ProcessModelRepository>,
        instance_repo: Arc<dyn ProcessInstanceRepository>,
        config: EngineConfig,
    ) -> Self {
        Self {
            model_repo,
            instance_repo,
            event_handler: None,
            config,
            locks: DashMap::new(),
        }
    }

    /// Publish appended history items to `handler`
    pub fn with_event_handler(mut self, handler: Arc<dyn HistoryEventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Store a model so that events can reach it
    pub async fn deploy(&self, model: ProcessModel) -> Result<ProcessModelId, CoreError> {
        let model_id = model.id().clone();
        self.model_repo.save(model).await?;
        info!(model_id = %model_id, "Process model deployed");
        Ok(model_id)
    }

    /// Load an instance
    pub async fn get_instance(
        &self,
        instance_id: &ProcessInstanceId,
    ) -> Result<ProcessInstance, CoreError> {
        self.instance_repo
            .find_by_id(instance_id)
            .await?
            .ok_or_else(|| CoreError::ProcessInstanceNotFound(instance_id.to_string()))
    }

    /// Route an external event
    ///
    /// Running instances with a token parked at a catcher that accepts the
    /// event get it first. Only when none does is a fresh instance started
    /// for every model with an accepting start event catcher. An empty
    /// result means nothing accepted the event.
    ///
    /// A running instance that fails does not stop the others: every offer
    /// runs to completion and the instances that accepted the event stay
    /// saved. The first failure is then returned in place of the results.
    pub async fn handle_event(&self, event_data: DataPacket) -> Result<Vec<HandleResult>, CoreError> {
        let models = self.model_repo.find_all().await?;

        let mut results = Vec::new();
        let mut failure = None;
        for model in &models {
            let running = self
                .instance_repo
                .find_running_for_model(model.id())
                .await?;

            let offers = running
                .iter()
                .map(|instance_id| self.offer_event(model, instance_id, &event_data));
            for (instance_id, outcome) in running.iter().zip(join_all(offers).await) {
                match outcome {
                    Ok(result) => results.extend(result),
                    Err(err) => {
                        warn!(instance_id = %instance_id, error = %err, "Event delivery failed");
                        failure.get_or_insert(err);
                    }
                }
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }

        if !results.is_empty() {
            return Ok(results);
        }

        for model in &models {
            if let Some(result) = self.start_instance(model, &event_data).await? {
                results.push(result);
            }
        }

        if results.is_empty() {
            debug!("Event not accepted by any process");
        }

        Ok(results)
    }

    /// Report that a suspended activity completed
    pub async fn handle_activity_completion(
        &self,
        instance_id: &ProcessInstanceId,
        token_id: TokenId,
        completion_data: DataPacket,
    ) -> Result<HandleResult, CoreError> {
        self.with_instance(instance_id, |model, instance| {
            instance.handle_activity_completion(model, token_id, completion_data)
        })
        .await
    }

    /// Report that a suspended activity failed
    pub async fn handle_activity_failure(
        &self,
        instance_id: &ProcessInstanceId,
        token_id: TokenId,
        failure_data: DataPacket,
    ) -> Result<HandleResult, CoreError> {
        self.with_instance(instance_id, |model, instance| {
            instance.handle_activity_failure(model, token_id, failure_data)
        })
        .await
    }

    async fn offer_event(
        &self,
        model: &ProcessModel,
        instance_id: &ProcessInstanceId,
        event_data: &DataPacket,
    ) -> Result<Option<HandleResult>, CoreError> {
        self.serialized(instance_id, self.deliver_event(model, instance_id, event_data))
            .await
    }

    async fn deliver_event(
        &self,
        model: &ProcessModel,
        instance_id: &ProcessInstanceId,
        event_data: &DataPacket,
    ) -> Result<Option<HandleResult>, CoreError> {
        let Some(mut instance) = self.instance_repo.find_by_id(instance_id).await? else {
            return Ok(None);
        };
        instance.set_max_advance_steps(self.config.max_advance_steps);
        let before = instance.history().len();

        let mut affected = Vec::new();
        for token_id in instance.tokens_waiting_for(model, event_data) {
            for moved in instance.handle_event(model, token_id, event_data.clone())? {
                if !affected.contains(&moved) {
                    affected.push(moved);
                }
            }
        }

        if affected.is_empty() {
            return Ok(None);
        }

        self.commit(&instance, before).await?;

        Ok(Some(HandleResult {
            process_instance_id: instance.id.clone(),
            affected_tokens: affected,
        }))
    }

    async fn start_instance(
        &self,
        model: &ProcessModel,
        event_data: &DataPacket,
    ) -> Result<Option<HandleResult>, CoreError> {
        if !model
            .start_event_catchers()
            .any(|(_, catcher)| catcher.can_handle(event_data))
        {
            return Ok(None);
        }

        let mut instance =
            ProcessInstance::create(model).with_max_advance_steps(self.config.max_advance_steps);
        let root = instance.root_token_id();

        let affected = instance.handle_event(model, root, event_data.clone())?;

        info!(
            instance_id = %instance.id,
            model_id = %model.id(),
            "Process instance started"
        );

        self.commit(&instance, 0).await?;

        Ok(Some(HandleResult {
            process_instance_id: instance.id.clone(),
            affected_tokens: affected,
        }))
    }

    async fn with_instance<F>(
        &self,
        instance_id: &ProcessInstanceId,
        f: F,
    ) -> Result<HandleResult, CoreError>
    where
        F: FnOnce(&ProcessModel, &mut ProcessInstance) -> Result<Vec<TokenId>, CoreError> + Send,
    {
        self.serialized(instance_id, self.apply(instance_id, f)).await
    }

    async fn apply<F>(
        &self,
        instance_id: &ProcessInstanceId,
        f: F,
    ) -> Result<HandleResult, CoreError>
    where
        F: FnOnce(&ProcessModel, &mut ProcessInstance) -> Result<Vec<TokenId>, CoreError> + Send,
    {
        let mut instance = self.get_instance(instance_id).await?;
        let model = self
            .model_repo
            .find_by_id(&instance.process_model_id)
            .await?
            .ok_or_else(|| {
                CoreError::ProcessModelNotFound(instance.process_model_id.to_string())
            })?;

        instance.set_max_advance_steps(self.config.max_advance_steps);
        let before = instance.history().len();

        let affected = f(&*model, &mut instance)?;

        if !affected.is_empty() {
            self.commit(&instance, before).await?;
        }

        Ok(HandleResult {
            process_instance_id: instance.id.clone(),
            affected_tokens: affected,
        })
    }

    /// Save the instance, then publish what the call appended
    async fn commit(&self, instance: &ProcessInstance, before: usize) -> Result<(), CoreError> {
        self.instance_repo.save(instance).await?;

        if instance.is_done() {
            info!(instance_id = %instance.id, "Process instance done");
        } else if instance.is_compensated() {
            info!(instance_id = %instance.id, "Process instance compensated");
        }

        if let Some(handler) = &self.event_handler {
            for item in instance.history_since(before) {
                handler.handle_event(&instance.id, item).await?;
            }
        }

        Ok(())
    }

    /// Run `work` while holding the instance lock
    async fn serialized<T, Fut>(&self, instance_id: &ProcessInstanceId, work: Fut) -> T
    where
        Fut: Future<Output = T>,
    {
        let lock = self.lock_for(instance_id);
        let output = {
            let _guard = lock.lock().await;
            work.await
        };

        drop(lock);
        self.locks
            .remove_if(instance_id, |_, lock| Arc::strong_count(lock) == 1);
        output
    }

    fn lock_for(&self, instance_id: &ProcessInstanceId) -> Arc<Mutex<()>> {
        self.locks
            .entry(instance_id.clone())
            .or_default()
            .value()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::element::{
        ActivityOutcome, JsonKind, LambdaActivity, ManualActivity, TypedEventCatcher,
    };
    use crate::domain::history::HistoryKind;
    use crate::domain::repository::{MockProcessInstanceRepository, MockProcessModelRepository};
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    type Store = Arc<StdMutex<HashMap<ProcessInstanceId, ProcessInstance>>>;

    fn approval_model() -> ProcessModel {
        ProcessModel::new(ProcessModelId::from("approval"))
            .add_any_event_catcher("submitted")
            .add_activity("approve", ManualActivity)
            .add_silent_event_thrower("approved")
            .add_sequence_flow(&["submitted", "approve", "approved"])
    }

    fn model_repo(model: ProcessModel) -> MockProcessModelRepository {
        let model = Arc::new(model);
        let mut repo = MockProcessModelRepository::new();
        let all = model.clone();
        repo.expect_find_all()
            .returning(move || Ok(vec![all.clone()]));
        repo.expect_find_by_id()
            .returning(move |id| Ok((model.id() == id).then(|| model.clone())));
        repo
    }

    fn instance_repo(store: Store) -> MockProcessInstanceRepository {
        let mut repo = MockProcessInstanceRepository::new();
        let found = store.clone();
        repo.expect_find_by_id()
            .returning(move |id| Ok(found.lock().unwrap().get(id).cloned()));
        let saved = store.clone();
        repo.expect_save().returning(move |instance| {
            saved
                .lock()
                .unwrap()
                .insert(instance.id.clone(), instance.clone());
            Ok(())
        });
        repo.expect_find_running_for_model().returning(move |model_id| {
            Ok(store
                .lock()
                .unwrap()
                .values()
                .filter(|i| &i.process_model_id == model_id && i.is_running())
                .map(|i| i.id.clone())
                .collect())
        });
        repo
    }

    fn manager(model: ProcessModel, store: Store) -> ProcessManager {
        ProcessManager::new(
            Arc::new(model_repo(model)),
            Arc::new(instance_repo(store)),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_event_starts_instance_and_persists_it() {
        let store = Store::default();
        let manager = manager(approval_model(), store.clone());

        let results = manager.handle_event(DataPacket::null()).await.unwrap();

        assert_eq!(results.len(), 1);
        let saved = store.lock().unwrap()[&results[0].process_instance_id].clone();
        assert!(saved.is_running());
        assert_eq!(saved.token().execution_point(), Some("approve"));
        assert_eq!(results[0].affected_tokens, vec![saved.root_token_id()]);
    }

    #[tokio::test]
    async fn test_completion_is_routed_to_stored_instance() {
        let store = Store::default();
        let manager = manager(approval_model(), store.clone());
        let started = manager.handle_event(DataPacket::null()).await.unwrap();
        let instance_id = started[0].process_instance_id.clone();
        let token = started[0].affected_tokens[0];

        let result = manager
            .handle_activity_completion(&instance_id, token, DataPacket::from_string("ok"))
            .await
            .unwrap();

        assert_eq!(result.affected_tokens, vec![token]);
        let instance = manager.get_instance(&instance_id).await.unwrap();
        assert!(instance.is_done());
        assert!(instance.was_activity_completed("approve"));
    }

    #[tokio::test]
    async fn test_running_instance_gets_event_before_new_instance() {
        let model = ProcessModel::new(ProcessModelId::from("chat"))
            .add_any_event_catcher("opened")
            .add_any_event_catcher("reply")
            .add_silent_event_thrower("closed")
            .add_sequence_flow(&["opened", "reply", "closed"]);
        let store = Store::default();
        let manager = manager(model, store.clone());

        let first = manager.handle_event(DataPacket::null()).await.unwrap();
        let second = manager.handle_event(DataPacket::null()).await.unwrap();

        assert_eq!(store.lock().unwrap().len(), 1);
        assert_eq!(second[0].process_instance_id, first[0].process_instance_id);
        let instance = manager
            .get_instance(&first[0].process_instance_id)
            .await
            .unwrap();
        assert!(instance.is_done());
    }

    #[tokio::test]
    async fn test_history_is_published_after_save() {
        let store = Store::default();
        let mut handler = MockHistoryEventHandler::new();
        handler
            .expect_handle_event()
            .withf(|_, item| item.kind == HistoryKind::EventCaught && item.element_name == "submitted")
            .times(1)
            .returning(|_, _| Ok(()));
        handler
            .expect_handle_event()
            .withf(|_, item| item.element_name == "approve")
            .times(1)
            .returning(|_, _| Ok(()));
        let manager = manager(approval_model(), store).with_event_handler(Arc::new(handler));

        manager.handle_event(DataPacket::null()).await.unwrap();
    }

    #[tokio::test]
    async fn test_instance_locks_are_dropped_after_each_call() {
        let model = ProcessModel::new(ProcessModelId::from("chat"))
            .add_any_event_catcher("opened")
            .add_any_event_catcher("reply")
            .add_activity("review", ManualActivity)
            .add_silent_event_thrower("closed")
            .add_sequence_flow(&["opened", "reply", "review", "closed"]);
        let manager = manager(model, Store::default());

        let started = manager.handle_event(DataPacket::null()).await.unwrap();
        let replied = manager.handle_event(DataPacket::null()).await.unwrap();
        assert_eq!(replied[0].process_instance_id, started[0].process_instance_id);
        assert!(manager.locks.is_empty());

        manager
            .handle_activity_completion(
                &started[0].process_instance_id,
                replied[0].affected_tokens[0],
                DataPacket::null(),
            )
            .await
            .unwrap();
        assert!(manager.locks.is_empty());

        let missing = manager
            .handle_activity_completion(
                &ProcessInstanceId("missing".to_string()),
                TokenId::new(),
                DataPacket::null(),
            )
            .await;
        assert!(missing.is_err());
        assert!(manager.locks.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_instance_is_reported() {
        let manager = manager(approval_model(), Store::default());

        let result = manager
            .handle_activity_completion(
                &ProcessInstanceId("missing".to_string()),
                TokenId::new(),
                DataPacket::null(),
            )
            .await;

        assert!(matches!(result, Err(CoreError::ProcessInstanceNotFound(_))));
    }

    #[tokio::test]
    async fn test_failed_call_leaves_stored_state_untouched() {
        let model = ProcessModel::new(ProcessModelId::from("broken"))
            .add_any_event_catcher("start")
            .add_activity("wait", ManualActivity)
            .add_activity(
                "needs-input",
                LambdaActivity::new(|ctx| Ok(ActivityOutcome::Completed(ctx.input("missing")?))),
            )
            .add_silent_event_thrower("end")
            .add_sequence_flow(&["start", "wait", "needs-input", "end"]);
        let store = Store::default();
        let manager = manager(model, store.clone());
        let started = manager.handle_event(DataPacket::null()).await.unwrap();
        let instance_id = started[0].process_instance_id.clone();
        let entries = store.lock().unwrap()[&instance_id].history().len();

        let result = manager
            .handle_activity_completion(&instance_id, started[0].affected_tokens[0], DataPacket::null())
            .await;

        assert!(matches!(result, Err(CoreError::UnresolvedDataInput(_))));
        assert_eq!(store.lock().unwrap()[&instance_id].history().len(), entries);
    }

    #[tokio::test]
    async fn test_unaccepted_event_creates_nothing() {
        let model = ProcessModel::new(ProcessModelId::from("typed")).add_typed_event_catcher(
            "numbers",
            TypedEventCatcher::new(JsonKind::Number),
        );
        let store = Store::default();
        let manager = manager(model, store.clone());

        let results = manager
            .handle_event(DataPacket::from_string("text"))
            .await
            .unwrap();

        assert!(results.is_empty());
        assert!(store.lock().unwrap().is_empty());
    }
}
