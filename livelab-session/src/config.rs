use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::mapping::ObservationMapping;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub observation: ObservationMapping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct HeartbeatConfig {
    #[serde(default = "default_heartbeat_interval_ms")]
    pub interval_ms: u64,
    /// The connection is considered lost after this long without any message.
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub timeout_ms: u64,
}

const fn default_heartbeat_interval_ms() -> u64 {
    1000
}

const fn default_heartbeat_timeout_ms() -> u64 {
    3000
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_heartbeat_interval_ms(),
            timeout_ms: default_heartbeat_timeout_ms(),
        }
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Exponential backoff between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ReconnectConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_attempts() -> u32 {
    5
}

const fn default_initial_backoff_ms() -> u64 {
    500
}

const fn default_max_backoff_ms() -> u64 {
    8000
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl ReconnectConfig {
    /// Delay before the given attempt, counting from 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(1_u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RenderConfig {
    #[serde(default = "default_fps")]
    pub fps: u32,
}

const fn default_fps() -> u32 {
    60
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { fps: default_fps() }
    }
}

impl RenderConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }
}

/// Local devices requested for the operator preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MediaConfig {
    #[serde(default = "default_camera")]
    pub camera: bool,
    #[serde(default)]
    pub microphone: bool,
}

const fn default_camera() -> bool {
    true
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            camera: default_camera(),
            microphone: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff() {
        let config = ReconnectConfig::default();
        let delays = (1..=6).map(|a| config.backoff(a)).collect::<Vec<_>>();
        assert_eq!(
            delays,
            [500, 1000, 2000, 4000, 8000, 8000].map(Duration::from_millis)
        );
        assert_eq!(config.backoff(100), Duration::from_millis(8000));
        assert_eq!(config.backoff(0), Duration::from_millis(500));
    }

    #[test]
    fn test_partial_config() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"heartbeat":{"timeout_ms":500},"render":{"fps":30}}"#)
                .unwrap();
        assert_eq!(config.heartbeat.interval(), Duration::from_secs(1));
        assert_eq!(config.heartbeat.timeout(), Duration::from_millis(500));
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.render.frame_interval(), Duration::from_secs(1) / 30);
        assert!(config.media.camera);
        assert!(!config.media.microphone);
    }

    #[test]
    fn test_deny_unknown_fields() {
        assert!(serde_json::from_str::<SessionConfig>(r#"{"heartbeat":{"period":1}}"#).is_err());
    }
}
