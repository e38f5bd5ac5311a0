//! JSON messages exchanged with the control backend.
//!
//! Every message is an object tagged by a `type` field, e.g.
//! `{"type": "joint_update", "joints": {"Pitch": 0.3}, "timestamp": 12.5}`.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// New values for some joints, in model units.
///
/// Joints that are not listed keep their previous value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseUpdate {
    /// Backend clock in seconds. `None` orders the update by arrival.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    pub joints: BTreeMap<String, f64>,
}

impl PoseUpdate {
    pub fn new(timestamp: Option<f64>, joints: impl IntoIterator<Item = (String, f64)>) -> Self {
        Self {
            timestamp,
            joints: joints.into_iter().collect(),
        }
    }
}

/// Ports and calibration profiles selected by the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SessionParams {
    pub leader_port: String,
    pub follower_port: String,
    pub leader_config: String,
    pub follower_config: String,
}

impl SessionParams {
    /// Checks that every field is filled in.
    pub fn validate(&self) -> Result<()> {
        let missing = [
            ("leader_port", &self.leader_port),
            ("follower_port", &self.follower_port),
            ("leader_config", &self.leader_config),
            ("follower_config", &self.follower_config),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
        .collect::<Vec<_>>();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::SessionSetup(format!(
                "missing {}",
                missing.join(", ")
            )))
        }
    }

    /// Calibration identifier of the leader arm (file name without `.json`).
    pub fn leader_calibration_id(&self) -> &str {
        calibration_id(&self.leader_config)
    }

    /// Calibration identifier of the follower arm (file name without `.json`).
    pub fn follower_calibration_id(&self) -> &str {
        calibration_id(&self.follower_config)
    }
}

fn calibration_id(config: &str) -> &str {
    config.strip_suffix(".json").unwrap_or(config)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStarted {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingControl {
    /// Skip to the next episode.
    ExitEarly,
    RerecordEpisode,
    StopRecording,
}

/// Operator action sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Command {
    StartTeleoperation,
    StopTeleoperation,
    JointTargets { joints: BTreeMap<String, f64> },
    Recording { control: RecordingControl },
}

/// Message received from the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    JointUpdate(PoseUpdate),
    /// Raw follower motor readings, see [`ObservationMapping`](crate::ObservationMapping).
    Observation {
        values: BTreeMap<String, f64>,
        #[serde(default)]
        timestamp: Option<f64>,
    },
    SessionStarted(SessionStarted),
    Heartbeat,
    Error {
        message: String,
    },
}

impl Inbound {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Protocol(format!("{e}: {text}")))
    }
}

/// Message sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    BeginSession(SessionParams),
    Heartbeat,
    Command { command: Command },
}

impl Outbound {
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Protocol(e.to_string()))
    }
}
