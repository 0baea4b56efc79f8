use flowline_core::{
    CoreError, DataPacket, EngineConfig, HistoryKind, ProcessManager, ProcessModel,
};
use flowline_state_inmemory::InMemoryStateStoreProvider;
use flowline_test_utils::{init_test_tracing, models, Trail};
use serde_json::json;

async fn manager_with(model: ProcessModel) -> Result<ProcessManager, CoreError> {
    init_test_tracing();
    let provider = InMemoryStateStoreProvider::new();
    let (model_repo, instance_repo) = provider.create_repositories();
    let manager = ProcessManager::new(model_repo, instance_repo, EngineConfig::default());
    manager.deploy(model).await?;
    Ok(manager)
}

#[tokio::test]
async fn test_start_event_data_reaches_the_following_activity() -> Result<(), CoreError> {
    let trail = Trail::new();
    let manager = manager_with(models::data_communication(&trail)?).await?;

    let result = manager
        .handle_event(DataPacket::from_string("Hello World"))
        .await?;

    assert_eq!(trail.entries(), vec![r#""Hello World""#]);
    let instance = manager.get_instance(&result[0].process_instance_id).await?;
    assert!(instance.is_done());

    let completed = instance
        .history()
        .iter()
        .find(|item| item.kind == HistoryKind::ActivityCompleted)
        .expect("middle completed");
    assert_eq!(completed.payload, DataPacket::from_string("Hello World"));

    Ok(())
}

#[tokio::test]
async fn test_structured_payload_is_passed_unchanged() -> Result<(), CoreError> {
    let trail = Trail::new();
    let manager = manager_with(models::data_communication(&trail)?).await?;
    let payload = json!({"order": {"id": 7, "lines": [1, 2, 3]}});

    manager.handle_event(DataPacket::new(payload.clone())).await?;

    assert_eq!(trail.entries(), vec![payload.to_string()]);

    Ok(())
}

#[tokio::test]
async fn test_field_output_selects_part_of_the_payload() -> Result<(), CoreError> {
    let trail = Trail::new();
    let model = ProcessModel::new("orders".into())
        .add_any_event_catcher("received")
        .add_activity(
            "bill",
            flowline_test_utils::EchoActivity::new("customer", trail.clone()),
        )
        .add_silent_event_thrower("billed")
        .add_sequence_flow(&["received", "bill", "billed"])
        .add_data_association(flowline_core::DataAssociation::new(
            "received", "customer", "bill", "customer",
        ))
        .add_data_output(
            "received",
            flowline_core::DataOutput::field("customer", "customer"),
        )?;
    let manager = manager_with(model).await?;

    manager
        .handle_event(DataPacket::new(json!({"customer": "ada", "total": 12})))
        .await?;

    assert_eq!(trail.entries(), vec![r#""ada""#]);

    Ok(())
}

#[tokio::test]
async fn test_missing_data_input_fails_the_call() -> Result<(), CoreError> {
    let trail = Trail::new();
    let model = ProcessModel::new("unwired".into())
        .add_any_event_catcher("start")
        .add_activity(
            "middle",
            flowline_test_utils::EchoActivity::new("i", trail.clone()),
        )
        .add_silent_event_thrower("end")
        .add_sequence_flow(&["start", "middle", "end"]);
    let manager = manager_with(model).await?;

    let result = manager.handle_event(DataPacket::null()).await;

    assert!(matches!(result, Err(CoreError::UnresolvedDataInput(_))));
    assert!(trail.entries().is_empty());

    Ok(())
}
