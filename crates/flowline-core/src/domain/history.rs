//! Append-only history log of a process instance
//!
//! The log is the audit trail of an instance and the only source used to
//! answer completion queries, resolve data inputs and order compensation.

use crate::domain::token::TokenId;
use crate::DataPacket;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HistoryKind {
    /// An event catcher consumed an event
    EventCaught,
    /// An activity was invoked
    ActivityStarted,
    /// An activity reported completion
    ActivityCompleted,
    /// An activity faulted or was reported as failed
    ActivityFailed,
    /// An event thrower emitted its event
    EventThrown,
}

impl HistoryKind {
    /// Stable dotted name, used in logs and by event handlers
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryKind::EventCaught => "event.caught",
            HistoryKind::ActivityStarted => "activity.started",
            HistoryKind::ActivityCompleted => "activity.completed",
            HistoryKind::ActivityFailed => "activity.failed",
            HistoryKind::EventThrown => "event.thrown",
        }
    }

    /// Whether entries of this kind carry an element output
    pub fn produces_output(&self) -> bool {
        matches!(
            self,
            HistoryKind::EventCaught | HistoryKind::ActivityCompleted
        )
    }
}

/// One immutable history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    /// When the entry was appended
    pub timestamp: DateTime<Utc>,

    /// Token the entry belongs to
    pub token_id: TokenId,

    /// Model element the token was positioned at
    pub element_name: String,

    /// Event data, completion data or failure data
    pub payload: DataPacket,

    /// Entry kind
    pub kind: HistoryKind,
}

/// Append-only list of [`HistoryItem`]s
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryLog {
    items: Vec<HistoryItem>,
}

impl HistoryLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(
        &mut self,
        token_id: TokenId,
        element_name: &str,
        payload: DataPacket,
        kind: HistoryKind,
    ) {
        tracing::trace!(
            token_id = %token_id,
            element = %element_name,
            kind = kind.as_str(),
            "History entry appended"
        );

        self.items.push(HistoryItem {
            timestamp: Utc::now(),
            token_id,
            element_name: element_name.to_string(),
            payload,
            kind,
        });
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All entries in append order
    pub fn items(&self) -> &[HistoryItem] {
        &self.items
    }

    /// Iterate entries in append order
    pub fn iter(&self) -> std::slice::Iter<'_, HistoryItem> {
        self.items.iter()
    }

    /// Entries appended at or after `index`
    pub fn since(&self, index: usize) -> &[HistoryItem] {
        self.items.get(index..).unwrap_or(&[])
    }

    /// Most recent entry recorded for a token
    pub fn last_for_token(&self, token_id: TokenId) -> Option<&HistoryItem> {
        self.items.iter().rev().find(|item| item.token_id == token_id)
    }

    /// Whether `activity` completed anywhere in the instance
    pub fn was_completed(&self, activity: &str) -> bool {
        self.items.iter().any(|item| {
            item.kind == HistoryKind::ActivityCompleted && item.element_name == activity
        })
    }

    /// Most recent output payload of `element` on the given lineage
    pub fn latest_output(&self, element: &str, lineage: &[TokenId]) -> Option<&DataPacket> {
        self.items
            .iter()
            .rev()
            .find(|item| {
                item.kind.produces_output()
                    && item.element_name == element
                    && lineage.contains(&item.token_id)
            })
            .map(|item| &item.payload)
    }
}

impl<'a> IntoIterator for &'a HistoryLog {
    type Item = &'a HistoryItem;
    type IntoIter = std::slice::Iter<'a, HistoryItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_latest_output_prefers_most_recent_on_lineage() {
        let root = TokenId::new();
        let child = TokenId::new();
        let sibling = TokenId::new();
        let mut log = HistoryLog::new();

        log.append(root, "quote", DataPacket::new(json!(1)), HistoryKind::ActivityCompleted);
        log.append(child, "quote", DataPacket::new(json!(2)), HistoryKind::ActivityCompleted);
        log.append(sibling, "quote", DataPacket::new(json!(3)), HistoryKind::ActivityCompleted);
        log.append(child, "quote", DataPacket::null(), HistoryKind::ActivityStarted);

        let output = log.latest_output("quote", &[root, child]).unwrap();
        assert_eq!(output, &DataPacket::new(json!(2)));
        assert_eq!(log.latest_output("quote", &[root]).unwrap().as_value(), &json!(1));
        assert!(log.latest_output("other", &[root, child]).is_none());
    }

    #[test]
    fn test_was_completed_ignores_started_entries() {
        let token = TokenId::new();
        let mut log = HistoryLog::new();
        log.append(token, "ship", DataPacket::null(), HistoryKind::ActivityStarted);
        assert!(!log.was_completed("ship"));

        log.append(token, "ship", DataPacket::null(), HistoryKind::ActivityCompleted);
        assert!(log.was_completed("ship"));
    }

    #[test]
    fn test_since_and_last_for_token() {
        let a = TokenId::new();
        let b = TokenId::new();
        let mut log = HistoryLog::new();
        log.append(a, "start", DataPacket::null(), HistoryKind::EventCaught);
        log.append(b, "task", DataPacket::null(), HistoryKind::ActivityStarted);
        log.append(a, "end", DataPacket::null(), HistoryKind::EventThrown);

        assert_eq!(log.since(1).len(), 2);
        assert!(log.since(10).is_empty());
        assert_eq!(log.last_for_token(a).unwrap().element_name, "end");
        assert_eq!(log.last_for_token(b).unwrap().kind, HistoryKind::ActivityStarted);
    }

    #[test]
    fn test_kind_serializes_in_camel_case() {
        let value = serde_json::to_value(HistoryKind::ActivityCompleted).unwrap();
        assert_eq!(value, json!("activityCompleted"));
        assert_eq!(HistoryKind::EventCaught.as_str(), "event.caught");
    }
}
