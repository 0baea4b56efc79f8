//!
//! Flowline Core - process execution engine
//!
//! This crate defines the token tree, the append-only history log, data
//! resolution through data associations, saga compensation and the
//! Process Manager boundary. Storage is reached only through the
//! repository traits in [`domain::repository`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - tokens, history, models and process instances
pub mod domain;

/// Application services - Process Manager
pub mod application;

/// Core types
pub mod types;

/// Error types
pub mod error;

/// Engine configuration
pub mod config;

// Re-export key types
pub use config::EngineConfig;
pub use error::CoreError;
pub use types::DataPacket;
pub use types::LogLevel;

// Re-export main API types for easy use
pub use application::process_manager::{HandleResult, HistoryEventHandler, ProcessManager};
pub use domain::element::{
    Activity, ActivityOutcome, CatchAnyEventCatcher, Element, EventCatcher, EventThrower,
    ExecutionContext, JsonKind, LambdaActivity, ManualActivity, SilentEventThrower,
    TypedEventCatcher,
};
pub use domain::history::{HistoryItem, HistoryKind, HistoryLog};
pub use domain::model::{
    DataAssociation, DataObjectFactory, DataOutput, ProcessModel, ProcessModelId, SequenceFlow,
};
pub use domain::process_instance::{ProcessInstance, ProcessInstanceId};
pub use domain::repository::{ProcessInstanceRepository, ProcessModelRepository};
pub use domain::token::{Token, TokenId};
