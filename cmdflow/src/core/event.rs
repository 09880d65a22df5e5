//! Pipeline lifecycle events.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An event emitted while a pipeline runs.
///
/// Events are handed to the pipeline's event sink for logging, monitoring,
/// or test assertions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// The event type (e.g., "stage.started", "pipeline.failed").
    #[serde(rename = "type")]
    pub event_type: String,

    /// When the event occurred (ISO 8601).
    pub timestamp: String,

    /// The event payload data.
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
}

impl PipelineEvent {
    /// Creates a new event.
    #[must_use]
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: crate::utils::iso_timestamp(),
            data: HashMap::new(),
        }
    }

    /// Adds a data field to the event.
    #[must_use]
    pub fn add_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Returns the payload handed to event sinks: the data plus the timestamp.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        let mut map: serde_json::Map<String, serde_json::Value> =
            self.data.clone().into_iter().collect();
        map.insert("timestamp".to_string(), serde_json::json!(self.timestamp));
        serde_json::Value::Object(map)
    }

    /// Creates a "pipeline.started" event.
    #[must_use]
    pub fn pipeline_started(run_id: &str, name: &str, stages: usize) -> Self {
        Self::new("pipeline.started")
            .add_data("run_id", serde_json::json!(run_id))
            .add_data("pipeline", serde_json::json!(name))
            .add_data("stages", serde_json::json!(stages))
    }

    /// Creates a "stage.started" event.
    #[must_use]
    pub fn stage_started(run_id: &str, index: usize, program: &str) -> Self {
        Self::new("stage.started")
            .add_data("run_id", serde_json::json!(run_id))
            .add_data("stage", serde_json::json!(index))
            .add_data("program", serde_json::json!(program))
    }

    /// Creates a "stage.spawn_failed" event.
    #[must_use]
    pub fn stage_spawn_failed(run_id: &str, index: usize, program: &str, error: &str) -> Self {
        Self::new("stage.spawn_failed")
            .add_data("run_id", serde_json::json!(run_id))
            .add_data("stage", serde_json::json!(index))
            .add_data("program", serde_json::json!(program))
            .add_data("error", serde_json::json!(error))
    }

    /// Creates a "stage.exited" event.
    #[must_use]
    pub fn stage_exited(run_id: &str, report: &crate::core::StageReport) -> Self {
        Self::new("stage.exited")
            .add_data("run_id", serde_json::json!(run_id))
            .add_data("stage", serde_json::json!(report.index))
            .add_data("program", serde_json::json!(report.program))
            .add_data("status", serde_json::json!(report.status))
            .add_data(
                "exit",
                serde_json::json!(report.exit.map(|exit| exit.to_string())),
            )
            .add_data("duration_ms", serde_json::json!(report.duration_ms))
    }

    /// Creates a "pipeline.terminating" event.
    #[must_use]
    pub fn pipeline_terminating(run_id: &str, reason: &str) -> Self {
        Self::new("pipeline.terminating")
            .add_data("run_id", serde_json::json!(run_id))
            .add_data("reason", serde_json::json!(reason))
    }

    /// Creates a "pipeline.completed" event.
    #[must_use]
    pub fn pipeline_completed(run_id: &str, duration_ms: f64) -> Self {
        Self::new("pipeline.completed")
            .add_data("run_id", serde_json::json!(run_id))
            .add_data("duration_ms", serde_json::json!(duration_ms))
    }

    /// Creates a "pipeline.failed" event.
    #[must_use]
    pub fn pipeline_failed(run_id: &str, error: &crate::errors::PipelineError, duration_ms: f64) -> Self {
        let error_map: serde_json::Map<String, serde_json::Value> =
            error.to_dict().into_iter().collect();
        Self::new("pipeline.failed")
            .add_data("run_id", serde_json::json!(run_id))
            .add_data("error", serde_json::Value::Object(error_map))
            .add_data("duration_ms", serde_json::json!(duration_ms))
    }
}
