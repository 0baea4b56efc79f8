//! Process model graph
//!
//! Named elements joined by sequence flows and data associations. The engine
//! only reads the graph; the chained `add_*` methods exist to assemble one.

use crate::domain::element::{
    Activity, CatchAnyEventCatcher, Element, EventCatcher, EventThrower, SilentEventThrower,
    TypedEventCatcher,
};
use crate::{CoreError, DataPacket};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Value object: Process Model ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessModelId(pub String);

impl fmt::Display for ProcessModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProcessModelId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Directed control-flow edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceFlow {
    /// Source element
    pub from: String,
    /// Target element
    pub to: String,
}

/// Directed data edge from an element output to an element input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataAssociation {
    /// Producing element
    pub from_element: String,
    /// Output name on the producing element
    pub from_output: String,
    /// Consuming element
    pub to_element: String,
    /// Input name on the consuming element
    pub to_input: String,
}

impl DataAssociation {
    /// `from_element.from_output -> to_element.to_input`
    pub fn new(from_element: &str, from_output: &str, to_element: &str, to_input: &str) -> Self {
        Self {
            from_element: from_element.to_string(),
            from_output: from_output.to_string(),
            to_element: to_element.to_string(),
            to_input: to_input.to_string(),
        }
    }
}

/// Named output of an element
///
/// Without a field selector the output is the whole recorded payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataOutput {
    /// Output name
    pub name: String,
    /// Top-level payload field, if any
    pub field: Option<String>,
}

impl DataOutput {
    /// Output bound to the whole payload
    pub fn whole(name: &str) -> Self {
        Self {
            name: name.to_string(),
            field: None,
        }
    }

    /// Output bound to one field of an object payload
    pub fn field(name: &str, field: &str) -> Self {
        Self {
            name: name.to_string(),
            field: Some(field.to_string()),
        }
    }

    /// Pick this output out of a recorded payload
    pub fn select(&self, payload: &DataPacket) -> Option<DataPacket> {
        match &self.field {
            None => Some(payload.clone()),
            Some(field) => payload.field(field),
        }
    }
}

/// Factory for instance-scoped data objects
pub trait DataObjectFactory: Send + Sync {
    /// Produce the initial value
    fn create(&self) -> DataPacket;
}

impl<F> DataObjectFactory for F
where
    F: Fn() -> DataPacket + Send + Sync,
{
    fn create(&self) -> DataPacket {
        self()
    }
}

/// An element with its name and declared outputs
#[derive(Debug, Clone)]
pub struct NamedElement {
    /// Unique name within the model
    pub name: String,
    /// The element
    pub element: Element,
    /// Declared data outputs
    pub outputs: Vec<DataOutput>,
}

/// A process model
#[derive(Clone)]
pub struct ProcessModel {
    id: ProcessModelId,
    elements: Vec<NamedElement>,
    index: HashMap<String, usize>,
    sequence_flows: Vec<SequenceFlow>,
    data_associations: Vec<DataAssociation>,
    compensations: HashMap<String, String>,
    data_objects: HashMap<String, Arc<dyn DataObjectFactory>>,
}

impl fmt::Debug for ProcessModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessModel")
            .field("id", &self.id)
            .field("elements", &self.elements)
            .field("sequence_flows", &self.sequence_flows)
            .field("data_associations", &self.data_associations)
            .field("compensations", &self.compensations)
            .field("data_objects", &self.data_objects.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProcessModel {
    /// Create an empty model
    pub fn new(id: ProcessModelId) -> Self {
        Self {
            id,
            elements: Vec::new(),
            index: HashMap::new(),
            sequence_flows: Vec::new(),
            data_associations: Vec::new(),
            compensations: HashMap::new(),
            data_objects: HashMap::new(),
        }
    }

    /// Model id
    pub fn id(&self) -> &ProcessModelId {
        &self.id
    }

    fn add_element(mut self, name: &str, element: Element) -> Self {
        match self.index.get(name) {
            Some(&position) => {
                tracing::warn!(model_id = %self.id, element = %name, "Replacing model element");
                self.elements[position].element = element;
            }
            None => {
                self.index.insert(name.to_string(), self.elements.len());
                self.elements.push(NamedElement {
                    name: name.to_string(),
                    element,
                    outputs: Vec::new(),
                });
            }
        }
        self
    }

    /// Add an event catcher
    pub fn add_event_catcher(self, name: &str, catcher: impl EventCatcher + 'static) -> Self {
        self.add_element(name, Element::EventCatcher(Arc::new(catcher)))
    }

    /// Add a catcher that accepts any event
    pub fn add_any_event_catcher(self, name: &str) -> Self {
        self.add_event_catcher(name, CatchAnyEventCatcher)
    }

    /// Add a typed catcher
    pub fn add_typed_event_catcher(self, name: &str, catcher: TypedEventCatcher) -> Self {
        self.add_event_catcher(name, catcher)
    }

    /// Add an event thrower
    pub fn add_event_thrower(self, name: &str, thrower: impl EventThrower + 'static) -> Self {
        self.add_element(name, Element::EventThrower(Arc::new(thrower)))
    }

    /// Add a thrower with no side effect
    pub fn add_silent_event_thrower(self, name: &str) -> Self {
        self.add_event_thrower(name, SilentEventThrower)
    }

    /// Add an activity
    pub fn add_activity(self, name: &str, activity: impl Activity + 'static) -> Self {
        self.add_element(name, Element::Activity(Arc::new(activity)))
    }

    /// Add a parallel gateway
    pub fn add_parallel_gateway(self, name: &str) -> Self {
        self.add_element(name, Element::ParallelGateway)
    }

    /// Chain sequence flows between consecutive names
    pub fn add_sequence_flow(mut self, names: &[&str]) -> Self {
        for pair in names.windows(2) {
            self.sequence_flows.push(SequenceFlow {
                from: pair[0].to_string(),
                to: pair[1].to_string(),
            });
        }
        self
    }

    /// Add a data association
    pub fn add_data_association(mut self, association: DataAssociation) -> Self {
        self.data_associations.push(association);
        self
    }

    /// Attach `compensation` as the rollback of `activity`
    pub fn attach_as_compensation_activity(mut self, compensation: &str, activity: &str) -> Self {
        self.compensations
            .insert(activity.to_string(), compensation.to_string());
        self
    }

    /// Register a data object factory
    pub fn add_data_object<F>(mut self, name: &str, factory: F) -> Self
    where
        F: DataObjectFactory + 'static,
    {
        self.data_objects.insert(name.to_string(), Arc::new(factory));
        self
    }

    /// Declare a data output on an existing element
    pub fn add_data_output(mut self, element: &str, output: DataOutput) -> Result<Self, CoreError> {
        let position = *self.index.get(element).ok_or_else(|| {
            CoreError::UnsupportedModel(format!("Unknown element: {}", element))
        })?;

        let outputs = &mut self.elements[position].outputs;
        if outputs.iter().any(|o| o.name == output.name) {
            return Err(CoreError::UnsupportedModel(format!(
                "Element {} already declares output {}",
                element, output.name
            )));
        }
        outputs.push(output);
        Ok(self)
    }

    /// Look up an element by name
    pub fn element(&self, name: &str) -> Option<&NamedElement> {
        self.index.get(name).map(|&position| &self.elements[position])
    }

    /// All elements in declaration order
    pub fn elements(&self) -> &[NamedElement] {
        &self.elements
    }

    /// Sequence flows leaving `name`
    pub fn outgoing(&self, name: &str) -> Vec<&SequenceFlow> {
        self.sequence_flows
            .iter()
            .filter(|flow| flow.from == name)
            .collect()
    }

    /// Number of sequence flows entering `name`
    pub fn incoming_count(&self, name: &str) -> usize {
        self.sequence_flows
            .iter()
            .filter(|flow| flow.to == name)
            .count()
    }

    /// Catchers without incoming flows, in declaration order
    pub fn start_event_catchers(&self) -> impl Iterator<Item = (&str, &Arc<dyn EventCatcher>)> {
        self.elements.iter().filter_map(move |named| match &named.element {
            Element::EventCatcher(catcher) if self.incoming_count(&named.name) == 0 => {
                Some((named.name.as_str(), catcher))
            }
            _ => None,
        })
    }

    /// Whether `name` is a thrower without outgoing flows
    pub fn is_end_event_thrower(&self, name: &str) -> bool {
        matches!(
            self.element(name).map(|named| &named.element),
            Some(Element::EventThrower(_))
        ) && !self.sequence_flows.iter().any(|flow| flow.from == name)
    }

    /// Association feeding `element.input`
    pub fn data_association_to(&self, element: &str, input: &str) -> Option<&DataAssociation> {
        self.data_associations
            .iter()
            .find(|a| a.to_element == element && a.to_input == input)
    }

    /// Declared output of an element
    pub fn data_output(&self, element: &str, output: &str) -> Option<&DataOutput> {
        self.element(element)?
            .outputs
            .iter()
            .find(|o| o.name == output)
    }

    /// Factory of a data object
    pub fn data_object_factory(&self, name: &str) -> Option<&Arc<dyn DataObjectFactory>> {
        self.data_objects.get(name)
    }

    /// Compensation attached to `activity`
    pub fn compensation_for(&self, activity: &str) -> Option<&str> {
        self.compensations.get(activity).map(String::as_str)
    }

    /// Whether `name` is attached as a compensation
    pub fn is_compensation_activity(&self, name: &str) -> bool {
        self.compensations.values().any(|c| c == name)
    }
}
