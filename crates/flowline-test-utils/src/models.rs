//! Canned process models

use crate::activities::{EchoActivity, FailingActivity, Trail};
use flowline_core::{
    Activity, ActivityOutcome, CoreError, DataAssociation, DataOutput, DataPacket, JsonKind,
    LambdaActivity, ManualActivity, ProcessModel, ProcessModelId, TypedEventCatcher,
};
use serde_json::json;

/// start -> a1 -> a2 -> end
pub fn linear(trail: &Trail) -> ProcessModel {
    ProcessModel::new(ProcessModelId::from("linear"))
        .add_any_event_catcher("start")
        .add_activity("a1", trail.activity("a1"))
        .add_activity("a2", trail.activity("a2"))
        .add_silent_event_thrower("end")
        .add_sequence_flow(&["start", "a1", "a2", "end"])
}

/// a1, a2, a3 in sequence, each with a compensation c1, c2, c3
///
/// The activity named `failing` faults; the others record into `trail`.
pub fn saga(trail: &Trail, failing: &str) -> ProcessModel {
    let mut model = ProcessModel::new(ProcessModelId::from("saga")).add_any_event_catcher("start");
    for (activity, compensation) in [("a1", "c1"), ("a2", "c2"), ("a3", "c3")] {
        model = if activity == failing {
            model.add_activity(activity, FailingActivity::new("step failed"))
        } else {
            model.add_activity(activity, trail.activity(activity))
        };
        model = model
            .add_activity(compensation, trail.activity(compensation))
            .attach_as_compensation_activity(compensation, activity);
    }

    model
        .add_silent_event_thrower("end")
        .add_sequence_flow(&["start", "a1", "a2", "a3", "end"])
}

/// "regular" sets data object `data` to 10, its compensation subtracts 5,
/// then `failing` runs
pub fn balance_rollback(failing: impl Activity + 'static) -> ProcessModel {
    ProcessModel::new(ProcessModelId::from("balance"))
        .add_data_object("data", || DataPacket::new(json!(0)))
        .add_any_event_catcher("start")
        .add_activity(
            "regular",
            LambdaActivity::new(|ctx| {
                ctx.set_data_object("data", DataPacket::new(json!(10)));
                Ok(ActivityOutcome::done())
            }),
        )
        .add_activity(
            "compensation",
            LambdaActivity::new(|ctx| {
                let data = ctx.data_object("data")?.as_f64().unwrap_or_default();
                ctx.set_data_object("data", DataPacket::new(json!(data - 5.0)));
                Ok(ActivityOutcome::done())
            }),
        )
        .attach_as_compensation_activity("compensation", "regular")
        .add_activity("failing", failing)
        .add_silent_event_thrower("end")
        .add_sequence_flow(&["start", "regular", "failing", "end"])
}

/// start -> approve (manual) -> end
pub fn manual_approval() -> ProcessModel {
    ProcessModel::new(ProcessModelId::from("approval"))
        .add_any_event_catcher("start")
        .add_activity("approve", ManualActivity)
        .add_silent_event_thrower("end")
        .add_sequence_flow(&["start", "approve", "end"])
}

/// before -> split -> (left | right) -> join -> after
pub fn split_join(trail: &Trail) -> ProcessModel {
    ProcessModel::new(ProcessModelId::from("split-join"))
        .add_any_event_catcher("start")
        .add_activity("before", trail.activity("before"))
        .add_parallel_gateway("split")
        .add_activity("left", trail.activity("left"))
        .add_activity("right", trail.activity("right"))
        .add_parallel_gateway("join")
        .add_activity("after", trail.activity("after"))
        .add_silent_event_thrower("end")
        .add_sequence_flow(&["start", "before", "split"])
        .add_sequence_flow(&["split", "left", "join"])
        .add_sequence_flow(&["split", "right", "join"])
        .add_sequence_flow(&["join", "after", "end"])
}

/// Like [`split_join`], with both branches waiting for manual completion
pub fn manual_split_join(trail: &Trail) -> ProcessModel {
    ProcessModel::new(ProcessModelId::from("manual-split-join"))
        .add_any_event_catcher("start")
        .add_parallel_gateway("split")
        .add_activity("left", ManualActivity)
        .add_activity("right", ManualActivity)
        .add_parallel_gateway("join")
        .add_activity("after", trail.activity("after"))
        .add_silent_event_thrower("end")
        .add_sequence_flow(&["start", "split"])
        .add_sequence_flow(&["split", "left", "join"])
        .add_sequence_flow(&["split", "right", "join", "after", "end"])
}

/// The start event payload flows into "middle" through data input "i"
pub fn data_communication(trail: &Trail) -> Result<ProcessModel, CoreError> {
    ProcessModel::new(ProcessModelId::from("data-communication"))
        .add_any_event_catcher("start")
        .add_activity("middle", EchoActivity::new("i", trail.clone()))
        .add_silent_event_thrower("end")
        .add_sequence_flow(&["start", "middle", "end"])
        .add_data_association(DataAssociation::new("start", "o", "middle", "i"))
        .add_data_output("start", DataOutput::whole("o"))
}

/// String events are stored in data object "MessageReceived"
pub fn typed_message() -> ProcessModel {
    ProcessModel::new(ProcessModelId::from("typed-message"))
        .add_typed_event_catcher(
            "OnMessageReceived",
            TypedEventCatcher::new(JsonKind::String).storing_into("MessageReceived"),
        )
        .add_silent_event_thrower("end")
        .add_sequence_flow(&["OnMessageReceived", "end"])
}
