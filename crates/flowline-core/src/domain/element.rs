//! Model elements and the context they run in
//!
//! Event catchers, event throwers and activities are supplied by the model
//! author as trait objects. The engine hands each of them an
//! [`ExecutionContext`] scoped to one instance and one token.

use crate::domain::data::{self, DataStore};
use crate::domain::history::HistoryLog;
use crate::domain::model::ProcessModel;
use crate::domain::process_instance::ProcessInstanceId;
use crate::domain::token::TokenId;
use crate::{CoreError, DataPacket, LogLevel};
use std::fmt;
use std::sync::Arc;

/// Result of running an activity
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityOutcome {
    /// The activity finished inline and produced this completion data
    Completed(DataPacket),
    /// The activity is waiting for an external completion or failure call
    Pending(String),
    /// The activity faulted
    Fault(String),
}

impl ActivityOutcome {
    /// Completed with a null payload
    pub fn done() -> Self {
        ActivityOutcome::Completed(DataPacket::null())
    }
}

/// Work performed when a token reaches an activity
///
/// `Err(CoreError::ActivityFault(_))` is treated like [`ActivityOutcome::Fault`];
/// any other error aborts the current call.
pub trait Activity: Send + Sync {
    /// Run the activity for the token in `ctx`
    fn run(&self, ctx: &mut ExecutionContext<'_>) -> Result<ActivityOutcome, CoreError>;
}

/// Suspension point that waits for an external event
pub trait EventCatcher: Send + Sync {
    /// Whether this catcher consumes `event_data`
    fn can_handle(&self, event_data: &DataPacket) -> bool;

    /// Consume an accepted event
    fn handle(
        &self,
        _ctx: &mut ExecutionContext<'_>,
        _event_data: &DataPacket,
    ) -> Result<(), CoreError> {
        Ok(())
    }
}

/// Side-effecting emission point
pub trait EventThrower: Send + Sync {
    /// Emit the event
    fn throw(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), CoreError>;
}

/// A model element, by kind
#[derive(Clone)]
pub enum Element {
    /// Waits for a matching external event
    EventCatcher(Arc<dyn EventCatcher>),
    /// Emits an event; an end event when it has no outgoing flow
    EventThrower(Arc<dyn EventThrower>),
    /// Runs work, inline or suspended
    Activity(Arc<dyn Activity>),
    /// Parallel split and join
    ParallelGateway,
}

impl Element {
    /// Kind name used in logs and errors
    pub fn kind_name(&self) -> &'static str {
        match self {
            Element::EventCatcher(_) => "event_catcher",
            Element::EventThrower(_) => "event_thrower",
            Element::Activity(_) => "activity",
            Element::ParallelGateway => "parallel_gateway",
        }
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind_name())
    }
}

/// Per-call view of one instance given to elements
pub struct ExecutionContext<'a> {
    instance_id: &'a ProcessInstanceId,
    token_id: TokenId,
    element: &'a str,
    scope: &'a str,
    model: &'a ProcessModel,
    history: &'a HistoryLog,
    lineage: &'a [TokenId],
    data: &'a mut DataStore,
}

impl<'a> ExecutionContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        instance_id: &'a ProcessInstanceId,
        token_id: TokenId,
        element: &'a str,
        scope: &'a str,
        model: &'a ProcessModel,
        history: &'a HistoryLog,
        lineage: &'a [TokenId],
        data: &'a mut DataStore,
    ) -> Self {
        Self {
            instance_id,
            token_id,
            element,
            scope,
            model,
            history,
            lineage,
            data,
        }
    }

    /// Instance being executed
    pub fn instance_id(&self) -> &ProcessInstanceId {
        self.instance_id
    }

    /// Token positioned at the running element
    pub fn token_id(&self) -> TokenId {
        self.token_id
    }

    /// Name of the running element
    pub fn element_name(&self) -> &str {
        self.element
    }

    /// Activity being compensated, when running as a compensation
    pub fn compensated_activity(&self) -> Option<&str> {
        (self.scope != self.element).then_some(self.scope)
    }

    /// Resolve a named data input through the model's data associations
    ///
    /// A compensation activity sees the inputs of the activity it compensates.
    pub fn input(&self, name: &str) -> Result<DataPacket, CoreError> {
        data::resolve_input(self.model, self.history, self.lineage, self.scope, name)
    }

    /// Read a data object, creating it on first access
    pub fn data_object(&mut self, name: &str) -> Result<DataPacket, CoreError> {
        self.data.get_or_create(self.model, name)
    }

    /// Replace the value of a data object
    pub fn set_data_object(&mut self, name: &str, value: DataPacket) {
        self.data.put(name, value);
    }

    /// Log with the instance, token and element attached
    pub fn log(&self, level: LogLevel, message: &str) {
        let instance_id = &self.instance_id.0;
        let token_id = &self.token_id;
        let element = self.element;

        match level {
            LogLevel::Error => {
                tracing::error!(instance_id = %instance_id, token_id = %token_id, element = %element, "{}", message)
            }
            LogLevel::Warn => {
                tracing::warn!(instance_id = %instance_id, token_id = %token_id, element = %element, "{}", message)
            }
            LogLevel::Info => {
                tracing::info!(instance_id = %instance_id, token_id = %token_id, element = %element, "{}", message)
            }
            LogLevel::Debug => {
                tracing::debug!(instance_id = %instance_id, token_id = %token_id, element = %element, "{}", message)
            }
            LogLevel::Trace => {
                tracing::trace!(instance_id = %instance_id, token_id = %token_id, element = %element, "{}", message)
            }
        }
    }
}

/// Activity backed by a closure
pub struct LambdaActivity<F> {
    f: F,
}

impl<F> LambdaActivity<F>
where
    F: Fn(&mut ExecutionContext<'_>) -> Result<ActivityOutcome, CoreError> + Send + Sync,
{
    /// Wrap a closure
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Activity for LambdaActivity<F>
where
    F: Fn(&mut ExecutionContext<'_>) -> Result<ActivityOutcome, CoreError> + Send + Sync,
{
    fn run(&self, ctx: &mut ExecutionContext<'_>) -> Result<ActivityOutcome, CoreError> {
        (self.f)(ctx)
    }
}

/// Activity that always waits for an external outcome
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualActivity;

impl Activity for ManualActivity {
    fn run(&self, ctx: &mut ExecutionContext<'_>) -> Result<ActivityOutcome, CoreError> {
        Ok(ActivityOutcome::Pending(format!(
            "{} awaits manual completion",
            ctx.element_name()
        )))
    }
}

/// Catcher that accepts any event
#[derive(Debug, Default, Clone, Copy)]
pub struct CatchAnyEventCatcher;

impl EventCatcher for CatchAnyEventCatcher {
    fn can_handle(&self, _event_data: &DataPacket) -> bool {
        true
    }
}

/// JSON shape of a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonKind {
    /// `null`
    Null,
    /// `true` or `false`
    Bool,
    /// Any number
    Number,
    /// A string
    String,
    /// An array
    Array,
    /// An object
    Object,
}

impl JsonKind {
    /// Kind of a payload
    pub fn of(packet: &DataPacket) -> Self {
        match packet.as_value() {
            serde_json::Value::Null => JsonKind::Null,
            serde_json::Value::Bool(_) => JsonKind::Bool,
            serde_json::Value::Number(_) => JsonKind::Number,
            serde_json::Value::String(_) => JsonKind::String,
            serde_json::Value::Array(_) => JsonKind::Array,
            serde_json::Value::Object(_) => JsonKind::Object,
        }
    }
}

/// Catcher that accepts payloads of one JSON kind
///
/// When a data object name is set, the caught payload is stored there.
#[derive(Debug, Clone)]
pub struct TypedEventCatcher {
    kind: JsonKind,
    data_object: Option<String>,
}

impl TypedEventCatcher {
    /// Accept payloads of `kind`
    pub fn new(kind: JsonKind) -> Self {
        Self {
            kind,
            data_object: None,
        }
    }

    /// Also store the caught payload as data object `name`
    pub fn storing_into(mut self, name: impl Into<String>) -> Self {
        self.data_object = Some(name.into());
        self
    }
}

impl EventCatcher for TypedEventCatcher {
    fn can_handle(&self, event_data: &DataPacket) -> bool {
        JsonKind::of(event_data) == self.kind
    }

    fn handle(
        &self,
        ctx: &mut ExecutionContext<'_>,
        event_data: &DataPacket,
    ) -> Result<(), CoreError> {
        if let Some(name) = &self.data_object {
            ctx.set_data_object(name, event_data.clone());
        }
        Ok(())
    }
}

/// Thrower with no side effect
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentEventThrower;

impl EventThrower for SilentEventThrower {
    fn throw(&self, _ctx: &mut ExecutionContext<'_>) -> Result<(), CoreError> {
        Ok(())
    }
}
