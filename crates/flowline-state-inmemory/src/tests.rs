use crate::InMemoryStateStoreProvider;
use flowline_core::{CoreError, DataPacket, ProcessInstance, ProcessInstanceId, ProcessModelId};
use flowline_test_utils::{models, Trail};

#[tokio::test]
async fn test_process_model_repository() -> Result<(), CoreError> {
    let provider = InMemoryStateStoreProvider::new();
    let (model_repo, _) = provider.create_repositories();

    model_repo.save(models::manual_approval()).await?;
    model_repo.save(models::linear(&Trail::new())).await?;

    let found = model_repo.find_by_id(&ProcessModelId::from("approval")).await?;
    assert!(found.is_some());
    assert!(model_repo
        .find_by_id(&ProcessModelId::from("missing"))
        .await?
        .is_none());

    let ids: Vec<String> = model_repo
        .find_all()
        .await?
        .iter()
        .map(|model| model.id().0.clone())
        .collect();
    assert_eq!(ids, vec!["approval", "linear"]);

    Ok(())
}

#[tokio::test]
async fn test_process_instance_repository() -> Result<(), CoreError> {
    let provider = InMemoryStateStoreProvider::new();
    let (_, instance_repo) = provider.create_repositories();
    let model = models::manual_approval();

    let mut instance = ProcessInstance::create(&model);
    let root = instance.root_token_id();
    instance.handle_event(&model, root, DataPacket::from_string("go"))?;

    instance_repo.save(&instance).await?;

    let found = instance_repo
        .find_by_id(&instance.id)
        .await?
        .expect("instance was saved");
    assert_eq!(found.id, instance.id);
    assert_eq!(found.history(), instance.history());
    assert_eq!(found.token(), instance.token());

    let running = instance_repo.find_running_for_model(model.id()).await?;
    assert_eq!(running, vec![instance.id.clone()]);

    instance_repo.delete(&instance.id).await?;
    assert!(instance_repo.find_by_id(&instance.id).await?.is_none());
    assert!(instance_repo.list_instances().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_finished_instances_are_not_running() -> Result<(), CoreError> {
    let provider = InMemoryStateStoreProvider::new();
    let (_, instance_repo) = provider.create_repositories();
    let trail = Trail::new();
    let model = models::linear(&trail);

    let mut finished = ProcessInstance::create(&model);
    let root = finished.root_token_id();
    finished.handle_event(&model, root, DataPacket::null())?;
    assert!(finished.is_done());

    let fresh = ProcessInstance::create(&model);

    instance_repo.save(&finished).await?;
    instance_repo.save(&fresh).await?;

    assert!(instance_repo
        .find_running_for_model(model.id())
        .await?
        .is_empty());
    assert_eq!(instance_repo.list_instances().await?.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_saved_snapshot_is_independent_of_later_changes() -> Result<(), CoreError> {
    let provider = InMemoryStateStoreProvider::new();
    let (_, instance_repo) = provider.create_repositories();
    let model = models::manual_approval();

    let mut instance = ProcessInstance::create(&model);
    instance_repo.save(&instance).await?;

    let root = instance.root_token_id();
    instance.handle_event(&model, root, DataPacket::null())?;

    let stored = instance_repo
        .find_by_id(&instance.id)
        .await?
        .expect("instance was saved");
    assert!(!stored.has_started());
    assert!(instance.has_started());

    Ok(())
}

#[tokio::test]
async fn test_repositories_from_one_provider_share_storage() -> Result<(), CoreError> {
    let provider = InMemoryStateStoreProvider::new();
    let (_, first) = provider.create_repositories();
    let (_, second) = provider.create_repositories();

    let instance = ProcessInstance::create(&models::manual_approval());
    first.save(&instance).await?;

    assert!(second.find_by_id(&instance.id).await?.is_some());
    assert!(second
        .find_by_id(&ProcessInstanceId("other".to_string()))
        .await?
        .is_none());

    Ok(())
}
