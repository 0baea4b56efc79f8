//! Saga compensation planning
//!
//! Compensation state is never stored. It is derived from the history log:
//! a token compensates from its first failed regular activity until every
//! compensation scheduled for its lineage has settled. A completion shared by
//! several failing branches is compensated by whichever branch starts it first.

use crate::domain::history::{HistoryKind, HistoryLog};
use crate::domain::model::ProcessModel;
use crate::domain::token::TokenId;
use crate::DataPacket;
use serde_json::json;

const COMPENSATES: &str = "compensates";

/// One compensation to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationStep {
    /// Activity being rolled back
    pub activity: String,
    /// Compensation activity attached to it
    pub compensation: String,
    /// History index of the completion being rolled back
    pub completion: usize,
}

impl CompensationStep {
    /// Payload recorded when the compensation starts, claiming the completion
    pub fn started_payload(&self) -> DataPacket {
        DataPacket::new(json!({ COMPENSATES: self.completion }))
    }
}

fn claimed_completion(payload: &DataPacket) -> Option<usize> {
    let index = payload.as_value().get(COMPENSATES)?.as_u64()?;
    usize::try_from(index).ok()
}

/// Compensations still owed by a token, most recent completion first
///
/// Returns `None` when the token never failed. An empty list means the
/// token failed and every compensation has settled.
pub fn pending_steps(
    model: &ProcessModel,
    history: &HistoryLog,
    token_id: TokenId,
    lineage: &[TokenId],
) -> Option<Vec<CompensationStep>> {
    let items = history.items();

    let failed_at = items.iter().position(|item| {
        item.kind == HistoryKind::ActivityFailed
            && item.token_id == token_id
            && !model.is_compensation_activity(&item.element_name)
    })?;

    let claimed_elsewhere: Vec<usize> = items
        .iter()
        .filter(|item| {
            item.kind == HistoryKind::ActivityStarted
                && item.token_id != token_id
                && model.is_compensation_activity(&item.element_name)
        })
        .filter_map(|item| claimed_completion(&item.payload))
        .collect();

    let scheduled = items[..failed_at]
        .iter()
        .enumerate()
        .rev()
        .filter(|(index, item)| {
            item.kind == HistoryKind::ActivityCompleted
                && lineage.contains(&item.token_id)
                && !model.is_compensation_activity(&item.element_name)
                && !claimed_elsewhere.contains(index)
        })
        .filter_map(|(index, item)| {
            model
                .compensation_for(&item.element_name)
                .map(|compensation| CompensationStep {
                    activity: item.element_name.clone(),
                    compensation: compensation.to_string(),
                    completion: index,
                })
        });

    let settled = items[failed_at + 1..]
        .iter()
        .filter(|item| {
            item.token_id == token_id
                && matches!(
                    item.kind,
                    HistoryKind::ActivityCompleted | HistoryKind::ActivityFailed
                )
                && model.is_compensation_activity(&item.element_name)
        })
        .count();

    Some(scheduled.skip(settled).collect())
}
