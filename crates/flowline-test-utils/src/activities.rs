//! Activities for tests

use flowline_core::{Activity, ActivityOutcome, CoreError, DataPacket, ExecutionContext, LogLevel};
use std::sync::{Arc, Mutex};

/// Shared, ordered record of which activities ran
#[derive(Debug, Clone, Default)]
pub struct Trail {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Trail {
    /// Create an empty trail
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn record(&self, entry: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry.to_string());
        }
    }

    /// Snapshot of the entries so far
    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Whether `entry` was recorded
    pub fn contains(&self, entry: &str) -> bool {
        self.entries().iter().any(|e| e == entry)
    }

    /// Activity that records `name` into this trail and completes inline
    pub fn activity(&self, name: &str) -> RecordingActivity {
        RecordingActivity::new(name, self.clone())
    }
}

/// Records its name, then completes with a fixed payload
#[derive(Debug, Clone)]
pub struct RecordingActivity {
    name: String,
    trail: Trail,
    output: DataPacket,
}

impl RecordingActivity {
    /// Record `name` into `trail` when run
    pub fn new(name: &str, trail: Trail) -> Self {
        Self {
            name: name.to_string(),
            trail,
            output: DataPacket::null(),
        }
    }

    /// Complete with `output` instead of null
    pub fn with_output(mut self, output: DataPacket) -> Self {
        self.output = output;
        self
    }
}

impl Activity for RecordingActivity {
    fn run(&self, ctx: &mut ExecutionContext<'_>) -> Result<ActivityOutcome, CoreError> {
        self.trail.record(&self.name);
        ctx.log(LogLevel::Debug, "recorded");
        Ok(ActivityOutcome::Completed(self.output.clone()))
    }
}

/// Always faults with the given reason
#[derive(Debug, Clone)]
pub struct FailingActivity {
    reason: String,
}

impl FailingActivity {
    /// Fault with `reason`
    pub fn new(reason: &str) -> Self {
        Self {
            reason: reason.to_string(),
        }
    }
}

impl Activity for FailingActivity {
    fn run(&self, _ctx: &mut ExecutionContext<'_>) -> Result<ActivityOutcome, CoreError> {
        Ok(ActivityOutcome::Fault(self.reason.clone()))
    }
}

/// Completes with the value of one data input, recording it into a trail
#[derive(Debug, Clone)]
pub struct EchoActivity {
    input: String,
    trail: Trail,
}

impl EchoActivity {
    /// Echo data input `input`
    pub fn new(input: &str, trail: Trail) -> Self {
        Self {
            input: input.to_string(),
            trail,
        }
    }
}

impl Activity for EchoActivity {
    fn run(&self, ctx: &mut ExecutionContext<'_>) -> Result<ActivityOutcome, CoreError> {
        let value = ctx.input(&self.input)?;
        self.trail.record(&value.as_value().to_string());
        Ok(ActivityOutcome::Completed(value))
    }
}
