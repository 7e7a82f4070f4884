//! Execution outcome records.

use crate::process::Payload;
use procflow_env::SimTime;
use serde::{Deserialize, Serialize};

/// Outcome of one process execution.
///
/// Produced by groups (one per member slot) and by the workflow manager (one per
/// execution, kept in its result log). Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessResult {
    /// Id of the process that ran
    pub process_id: String,
    /// Display name of the process that ran
    pub name: String,
    /// Whether the logic completed without error
    pub success: bool,
    /// Output on success, `Null` on failure
    pub payload: Payload,
    /// Simulated time execution began
    pub start_time: SimTime,
    /// Simulated time execution ended
    pub end_time: SimTime,
    /// Error text on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ProcessResult {
    /// Record a successful execution.
    pub fn success(
        process_id: impl Into<String>,
        name: impl Into<String>,
        payload: Payload,
        start_time: SimTime,
        end_time: SimTime,
    ) -> Self {
        Self {
            process_id: process_id.into(),
            name: name.into(),
            success: true,
            payload,
            start_time,
            end_time,
            error_message: None,
        }
    }

    /// Record a failed execution.
    pub fn failure(
        process_id: impl Into<String>,
        name: impl Into<String>,
        error: impl ToString,
        start_time: SimTime,
        end_time: SimTime,
    ) -> Self {
        Self {
            process_id: process_id.into(),
            name: name.into(),
            success: false,
            payload: Payload::Null,
            start_time,
            end_time,
            error_message: Some(error.to_string()),
        }
    }

    /// Simulated time spent executing.
    pub fn duration(&self) -> SimTime {
        self.end_time - self.start_time
    }
}
