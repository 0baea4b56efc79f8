//! Instance data store and data-input resolution

use crate::domain::history::HistoryLog;
use crate::domain::model::ProcessModel;
use crate::domain::token::TokenId;
use crate::{CoreError, DataPacket};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Instance-scoped data objects
///
/// Values are created once from the model's factory and cached for the
/// lifetime of the instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataStore {
    objects: BTreeMap<String, DataPacket>,
}

impl DataStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value of a data object
    pub fn get(&self, name: &str) -> Option<&DataPacket> {
        self.objects.get(name)
    }

    pub(crate) fn put(&mut self, name: &str, value: DataPacket) {
        self.objects.insert(name.to_string(), value);
    }

    /// Cached value, or the factory's value which is then cached
    pub fn get_or_create(
        &mut self,
        model: &ProcessModel,
        name: &str,
    ) -> Result<DataPacket, CoreError> {
        if let Some(value) = self.objects.get(name) {
            return Ok(value.clone());
        }

        let factory = model.data_object_factory(name).ok_or_else(|| {
            CoreError::UnresolvedDataInput(format!("No data object named {}", name))
        })?;

        let value = factory.create();
        tracing::debug!(model_id = %model.id(), data_object = %name, "Data object created");
        self.objects.insert(name.to_string(), value.clone());
        Ok(value)
    }

    /// Names of materialized data objects
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }

    /// Number of materialized data objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether no data object has been materialized
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Resolve `element.input` for a token lineage
///
/// Follows the data association feeding the input back to the producing
/// element and reads that element's most recent recorded output on the
/// lineage.
pub fn resolve_input(
    model: &ProcessModel,
    history: &HistoryLog,
    lineage: &[TokenId],
    element: &str,
    input: &str,
) -> Result<DataPacket, CoreError> {
    let association = model.data_association_to(element, input).ok_or_else(|| {
        CoreError::UnresolvedDataInput(format!("No data association targets {}.{}", element, input))
    })?;

    let output = model
        .data_output(&association.from_element, &association.from_output)
        .ok_or_else(|| {
            CoreError::UnresolvedDataInput(format!(
                "{}.{} is not a declared output",
                association.from_element, association.from_output
            ))
        })?;

    let payload = history
        .latest_output(&association.from_element, lineage)
        .ok_or_else(|| {
            CoreError::UnresolvedDataInput(format!(
                "No output recorded for {} on this token lineage",
                association.from_element
            ))
        })?;

    output.select(payload).ok_or_else(|| {
        CoreError::UnresolvedDataInput(format!(
            "Output {}.{} has no value",
            association.from_element, association.from_output
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::history::HistoryKind;
    use crate::domain::model::{DataAssociation, DataOutput, ProcessModelId};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn model() -> ProcessModel {
        ProcessModel::new(ProcessModelId::from("data"))
            .add_any_event_catcher("start")
            .add_any_event_catcher("other")
            .add_data_output("start", DataOutput::whole("o"))
            .unwrap()
            .add_data_output("start", DataOutput::field("customer", "customer"))
            .unwrap()
            .add_data_association(DataAssociation::new("start", "o", "task", "i"))
            .add_data_association(DataAssociation::new("start", "customer", "task", "who"))
            .add_data_association(DataAssociation::new("other", "o", "task", "x"))
    }

    #[test]
    fn test_resolve_whole_and_field_outputs() {
        let token = TokenId::new();
        let mut history = HistoryLog::new();
        history.append(
            token,
            "start",
            DataPacket::new(json!({"customer": "ada"})),
            HistoryKind::EventCaught,
        );

        let whole = resolve_input(&model(), &history, &[token], "task", "i").unwrap();
        assert_eq!(whole.as_value(), &json!({"customer": "ada"}));

        let field = resolve_input(&model(), &history, &[token], "task", "who").unwrap();
        assert_eq!(field.as_str(), Some("ada"));
    }

    #[test]
    fn test_resolve_fails_without_association() {
        let history = HistoryLog::new();
        let result = resolve_input(&model(), &history, &[TokenId::new()], "task", "nope");
        assert!(matches!(result, Err(CoreError::UnresolvedDataInput(_))));
    }

    #[test]
    fn test_resolve_fails_for_undeclared_output() {
        let token = TokenId::new();
        let mut history = HistoryLog::new();
        history.append(token, "other", DataPacket::null(), HistoryKind::EventCaught);

        let result = resolve_input(&model(), &history, &[token], "task", "x");
        assert!(matches!(result, Err(CoreError::UnresolvedDataInput(_))));
    }

    #[test]
    fn test_resolve_ignores_other_lineages() {
        let token = TokenId::new();
        let stranger = TokenId::new();
        let mut history = HistoryLog::new();
        history.append(stranger, "start", DataPacket::new(json!(1)), HistoryKind::EventCaught);

        let result = resolve_input(&model(), &history, &[token], "task", "i");
        assert!(matches!(result, Err(CoreError::UnresolvedDataInput(_))));
    }

    #[test]
    fn test_data_object_is_created_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let model = ProcessModel::new(ProcessModelId::from("objects")).add_data_object(
            "counter",
            move || DataPacket::new(json!(counter.fetch_add(1, Ordering::SeqCst))),
        );
        let mut store = DataStore::new();

        let first = store.get_or_create(&model, "counter").unwrap();
        let second = store.get_or_create(&model, "counter").unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.names().collect::<Vec<_>>(), vec!["counter"]);
    }

    #[test]
    fn test_unknown_data_object_fails() {
        let model = ProcessModel::new(ProcessModelId::from("objects"));
        let result = DataStore::new().get_or_create(&model, "missing");
        assert!(matches!(result, Err(CoreError::UnresolvedDataInput(_))));
    }
}
