//! Assertion utilities for validating process instance history.

use flowline_core::{HistoryKind, ProcessInstance};
use thiserror::Error;

/// Error type for history validation failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryAssertionError {
    /// The sequence of history kinds differs
    #[error("History kinds mismatch: expected {expected:?}, got {actual:?}")]
    KindsMismatch {
        /// Expected kinds
        expected: Vec<HistoryKind>,
        /// Recorded kinds
        actual: Vec<HistoryKind>,
    },

    /// Activities completed in a different order
    #[error("Activity order mismatch: expected {expected:?}, got {actual:?}")]
    OrderMismatch {
        /// Expected activity names
        expected: Vec<String>,
        /// Completed activity names
        actual: Vec<String>,
    },
}

/// Element names of the history entries of `kind`, oldest first
pub fn history_elements(instance: &ProcessInstance, kind: HistoryKind) -> Vec<String> {
    instance
        .history()
        .iter()
        .filter(|item| item.kind == kind)
        .map(|item| item.element_name.clone())
        .collect()
}

/// Asserts that the instance history has exactly these kinds, in order.
pub fn assert_history_kinds(
    instance: &ProcessInstance,
    expected: &[HistoryKind],
) -> Result<(), HistoryAssertionError> {
    let actual: Vec<HistoryKind> = instance.history().iter().map(|item| item.kind).collect();

    if actual != expected {
        return Err(HistoryAssertionError::KindsMismatch {
            expected: expected.to_vec(),
            actual,
        });
    }

    Ok(())
}

/// Asserts that exactly these activities completed, in this order.
pub fn assert_activity_order(
    instance: &ProcessInstance,
    expected: &[&str],
) -> Result<(), HistoryAssertionError> {
    let actual = history_elements(instance, HistoryKind::ActivityCompleted);

    if actual != expected {
        return Err(HistoryAssertionError::OrderMismatch {
            expected: expected.iter().map(|name| name.to_string()).collect(),
            actual,
        });
    }

    Ok(())
}
