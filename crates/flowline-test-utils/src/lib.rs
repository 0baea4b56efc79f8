//! Testing utilities for Flowline
//!
//! Fixtures shared by the test suites of the other crates: activities that
//! record what ran, canned process models and history assertions.

pub mod activities;
pub mod assertions;
pub mod models;

pub use activities::{EchoActivity, FailingActivity, RecordingActivity, Trail};
pub use assertions::{
    assert_activity_order, assert_history_kinds, history_elements, HistoryAssertionError,
};

use flowline_core::EngineConfig;
use flowline_monitoring::MonitoringConfig;

/// Install the test subscriber once per test binary
///
/// The filter comes from the engine configuration, so `FLOWLINE_LOG_FILTER`
/// (or `RUST_LOG`) controls test output.
pub fn init_test_tracing() {
    let config = EngineConfig::load().unwrap_or_default();
    flowline_monitoring::try_init(
        MonitoringConfig::default().with_log_filter(config.log_filter),
    );
}
