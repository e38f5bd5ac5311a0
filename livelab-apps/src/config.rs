use std::path::{Path, PathBuf};

use livelab_render::UrdfVizSceneConfig;
use livelab_session::{BackendConfig, SessionConfig, SessionParams};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Configuration of `livelab-teleop`.
#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TeleopConfig {
    /// Robot description (URDF), relative to this file.
    #[serde(default = "default_urdf_path")]
    pub urdf_path: String,
    #[serde(skip)]
    urdf_full_path: Option<PathBuf>,
    #[serde(default)]
    pub backend: BackendConfig,
    /// Ports and calibration profiles of the arms.
    #[serde(default)]
    pub params: SessionParams,
    #[serde(default)]
    pub session: SessionConfig,
    /// Mirror the pose into a running urdf-viz. Without it, frames are only
    /// logged.
    pub urdf_viz: Option<UrdfVizSceneConfig>,
}

fn default_urdf_path() -> String {
    "so101_new_calib.urdf".to_owned()
}

impl Default for TeleopConfig {
    fn default() -> Self {
        Self {
            urdf_path: default_urdf_path(),
            urdf_full_path: None,
            backend: BackendConfig::default(),
            params: SessionParams::default(),
            session: SessionConfig::default(),
            urdf_viz: None,
        }
    }
}

impl TeleopConfig {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        Self::from_str(
            &fs_err::read_to_string(path).map_err(|e| Error::NoFile(path.to_owned(), e))?,
            path,
        )
    }

    pub fn from_str<P: AsRef<Path>>(s: &str, path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let mut config: TeleopConfig =
            toml::from_str(s).map_err(|e| Error::TomlParseFailure(path.to_owned(), e))?;
        config.urdf_full_path = Some(resolve_relative_path(path, &config.urdf_path)?);
        Ok(config)
    }

    /// Robot description path, resolved against the config file if it was
    /// loaded from one.
    pub fn urdf_full_path(&self) -> PathBuf {
        self.urdf_full_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(&self.urdf_path))
    }
}

/// Joins `path` to the directory of `base_path`. Absolute paths are kept.
pub fn resolve_relative_path<P: AsRef<Path>>(base_path: P, path: &str) -> Result<PathBuf, Error> {
    let base_path = base_path.as_ref();
    Ok(base_path
        .parent()
        .ok_or_else(|| Error::NoParentDirectory(base_path.to_owned()))?
        .join(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_round_trip() {
        let s = toml::to_string(&TeleopConfig::default()).unwrap();
        let config = TeleopConfig::from_str(&s, "/etc/livelab/teleop.toml").unwrap();
        assert_eq!(config.session, SessionConfig::default());
        assert_eq!(
            config.urdf_full_path(),
            Path::new("/etc/livelab/so101_new_calib.urdf")
        );
    }

    #[test]
    fn test_from_str() {
        let s = r#"
urdf_path = "urdf/so101.urdf"

[backend]
url = "http://192.168.0.10:8000"

[params]
leader_port = "/dev/ttyACM0"
follower_port = "/dev/ttyACM1"
leader_config = "leader.json"
follower_config = "follower.json"

[session.reconnect]
max_attempts = 3

[urdf_viz]
url = "http://127.0.0.1:7778"
"#;
        let config = TeleopConfig::from_str(s, "config/teleop.toml").unwrap();
        assert_eq!(config.urdf_full_path(), Path::new("config/urdf/so101.urdf"));
        assert_eq!(config.backend.url, "http://192.168.0.10:8000");
        assert!(config.params.validate().is_ok());
        assert_eq!(config.session.reconnect.max_attempts, 3);
        assert_eq!(config.session.heartbeat.timeout_ms, 3000);
        assert_eq!(config.urdf_viz.unwrap().url, "http://127.0.0.1:7778");
    }

    #[test]
    fn test_unknown_field() {
        let err = TeleopConfig::from_str("urdf = \"a.urdf\"", "teleop.toml").unwrap_err();
        assert!(matches!(err, Error::TomlParseFailure(..)));
    }

    #[test]
    fn test_absolute_urdf_path() {
        let config =
            TeleopConfig::from_str("urdf_path = \"/opt/so101.urdf\"", "a/teleop.toml").unwrap();
        assert_eq!(config.urdf_full_path(), Path::new("/opt/so101.urdf"));
        assert!(matches!(
            resolve_relative_path("", "a.urdf"),
            Err(Error::NoParentDirectory(_))
        ));
    }
}
