/// Token tree
pub mod token;

/// Append-only history log
pub mod history;

/// Model elements and execution context
pub mod element;

/// Process model graph and builder
pub mod model;

/// Data objects and data input resolution
pub mod data;

/// Saga compensation planning
pub mod compensation;

/// Process instance aggregate
pub mod process_instance;

/// Repository interfaces
pub mod repository;
