//! JSON exporter for session replays.
//!
//! Exports one frame per chat turn or telemetry step, so an external viewer
//! can replay the dashboard without re-running the session.

use civitas_core::{InferenceMetrics, SimulationState};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// A single frame of session data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Virtual time in seconds
    pub time_sec: f64,

    /// What produced this frame ("chat", "tick", ...)
    pub step: String,

    /// Store state after the step
    pub state: SimulationState,

    /// Telemetry of the chat turn, if the step was one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inference: Option<InferenceMetrics>,

    /// Applied tool calls, skipped calls, errors
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SimEvent>,
}

/// Something worth showing next to a frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl SimEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: None,
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: Some("warn".into()),
        }
    }
}

/// Complete session export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Virtual duration in seconds
    pub duration_sec: f64,

    /// Session wall-clock time when the export was finalized
    pub recorded_at_unix_secs: u64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final result
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            recorded_at_unix_secs: 0,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }

    /// Records the session's wall-clock time. Times before the Unix epoch
    /// clamp to zero.
    pub fn stamp(&mut self, at: SystemTime) {
        self.recorded_at_unix_secs = at
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs());
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civitas_core::SimulationConfig;

    #[test]
    fn test_export_tracks_duration_and_skips_empty_fields() {
        let mut export = SimExport::new("gpu_drift", 7);
        export.add_frame(SimFrame {
            time_sec: 2.0,
            step: "tick".into(),
            state: SimulationState::initial(&SimulationConfig::default()),
            inference: None,
            events: vec![],
        });
        export.finalize(true, None);

        assert_eq!(export.duration_sec, 2.0);
        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["frames"][0]["state"]["routingBackbone"], "primary");
        assert!(json["frames"][0].get("inference").is_none());
        assert!(json.get("failure_reason").is_none());
    }

    #[test]
    fn test_stamp_records_unix_seconds() {
        let mut export = SimExport::new("ttl_expiry", 1);
        export.stamp(UNIX_EPOCH + std::time::Duration::from_millis(1_704_067_205_900));
        assert_eq!(export.recorded_at_unix_secs, 1_704_067_205);

        export.stamp(UNIX_EPOCH - std::time::Duration::from_secs(1));
        assert_eq!(export.recorded_at_unix_secs, 0);
    }
}
