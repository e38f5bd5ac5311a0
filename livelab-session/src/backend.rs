use std::{fmt, time::Duration};

use schemars::JsonSchema;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::{
    error::{Error, Result},
    message::{PoseUpdate, RecordingControl, SessionParams},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Path of the WebSocket endpoint, relative to `url`.
    #[serde(default = "default_websocket_path")]
    pub websocket_path: String,
}

fn default_url() -> String {
    "http://127.0.0.1:8000".to_owned()
}

const fn default_timeout_ms() -> u64 {
    5000
}

fn default_websocket_path() -> String {
    "ws/joint-data".to_owned()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            timeout_ms: default_timeout_ms(),
            websocket_path: default_websocket_path(),
        }
    }
}

/// Calibration profiles known to the backend, as file names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationConfigs {
    pub leader_configs: Vec<String>,
    pub follower_configs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeleoperationStatus {
    pub teleoperation_active: bool,
    #[serde(default)]
    pub message: String,
}

/// Dataset and episode settings of a recording, with the arms to record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordingRequest {
    #[serde(flatten)]
    pub params: SessionParams,
    /// Dataset to write to, e.g. `user/so101_pick_place`.
    pub dataset_repo_id: String,
    /// Task description stored with every episode.
    pub single_task: String,
    pub num_episodes: u32,
    pub episode_time_s: u32,
    pub reset_time_s: u32,
    pub fps: u32,
    pub video: bool,
    pub push_to_hub: bool,
    /// Append to an existing dataset.
    pub resume: bool,
}

impl RecordingRequest {
    pub fn new(
        params: SessionParams,
        dataset_repo_id: impl Into<String>,
        single_task: impl Into<String>,
    ) -> Self {
        Self {
            params,
            dataset_repo_id: dataset_repo_id.into(),
            single_task: single_task.into(),
            num_episodes: 5,
            episode_time_s: 30,
            reset_time_s: 10,
            fps: 30,
            video: true,
            push_to_hub: false,
            resume: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.params.validate()?;
        if self.dataset_repo_id.trim().is_empty() || self.single_task.trim().is_empty() {
            return Err(Error::SessionSetup(
                "a recording needs a dataset_repo_id and a single_task".to_owned(),
            ));
        }
        if self.num_episodes == 0 || self.fps == 0 {
            return Err(Error::SessionSetup(
                "num_episodes and fps must be positive".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Recording controls the backend currently accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingControls {
    #[serde(default)]
    pub stop_recording: bool,
    #[serde(default)]
    pub exit_early: bool,
    #[serde(default)]
    pub rerecord_episode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingStatus {
    pub recording_active: bool,
    #[serde(default)]
    pub available_controls: RecordingControls,
    #[serde(default)]
    pub message: String,
}

/// Body of a command reply. Some handlers answer `{"message": ..}` without
/// `success`, and a failed one may answer `[{"message": ..}, status]`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ReplyBody {
    Plain(Reply),
    WithStatus(Reply, u16),
}

impl ReplyBody {
    fn into_result(self) -> std::result::Result<String, String> {
        let (reply, status) = match self {
            ReplyBody::Plain(reply) => (reply, None),
            ReplyBody::WithStatus(reply, status) => (reply, Some(status)),
        };
        let success = match (reply.success, status) {
            (_, Some(status)) if status >= 400 => false,
            (Some(success), _) => success,
            (None, _) => reply.error.is_none() && reply.message.is_some(),
        };
        let text = reply.message.or(reply.error).unwrap_or_default();
        if success {
            Ok(text)
        } else {
            Err(text)
        }
    }
}

#[derive(Deserialize)]
struct Reply {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct JointPositionsReply {
    success: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    joint_positions: std::collections::BTreeMap<String, f64>,
    #[serde(default)]
    timestamp: Option<f64>,
}

/// HTTP client of the control backend.
pub struct BackendClient {
    base_url: Url,
    websocket_path: String,
    agent: ureq::Agent,
}

impl fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let base_url = Url::parse(&config.url).map_err(|e| Error::SessionSetup(format!(
            "invalid backend url {}: {e}",
            config.url
        )))?;
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build();
        Ok(Self {
            base_url,
            websocket_path: config.websocket_path.clone(),
            agent,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// WebSocket endpoint on the same host (`http` becomes `ws`).
    pub fn websocket_url(&self) -> Result<Url> {
        let mut url = self.endpoint(&self.websocket_path)?;
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|()| Error::SessionSetup(format!("cannot use {url} as WebSocket url")))?;
        Ok(url)
    }

    /// Lists the calibration profiles of both arms.
    pub fn get_configs(&self) -> Result<CalibrationConfigs> {
        self.get("get-configs")
    }

    /// Starts teleoperation with the given ports and calibration profiles.
    pub fn start_teleoperation(&self, params: &SessionParams) -> Result<String> {
        params.validate()?;
        let reply: ReplyBody = self.post("move-arm", params)?;
        let message = reply.into_result().map_err(Error::SessionRejected)?;
        info!("teleoperation started: {message}");
        Ok(message)
    }

    pub fn stop_teleoperation(&self) -> Result<String> {
        self.command("stop-teleoperation", serde_json::json!({}))
    }

    pub fn teleoperation_status(&self) -> Result<TeleoperationStatus> {
        self.get("teleoperation-status")
    }

    /// Current follower pose, already in joint names and radians.
    pub fn joint_positions(&self) -> Result<PoseUpdate> {
        let reply: JointPositionsReply = self.get("joint-positions")?;
        if !reply.success {
            return Err(Error::Backend {
                message: reply.message,
            });
        }
        Ok(PoseUpdate {
            timestamp: reply.timestamp,
            joints: reply.joint_positions,
        })
    }

    /// Starts recording episodes into a dataset.
    pub fn start_recording(&self, request: &RecordingRequest) -> Result<String> {
        request.validate()?;
        let message = self.command("start-recording", request)?;
        info!(
            "recording {} episode(s) into {}: {message}",
            request.num_episodes, request.dataset_repo_id
        );
        Ok(message)
    }

    /// Sends a control to the running recording.
    pub fn control_recording(&self, control: RecordingControl) -> Result<String> {
        let path = match control {
            RecordingControl::ExitEarly => "recording-exit-early",
            RecordingControl::RerecordEpisode => "recording-rerecord-episode",
            RecordingControl::StopRecording => "stop-recording",
        };
        self.command(path, serde_json::json!({}))
    }

    pub fn recording_status(&self) -> Result<RecordingStatus> {
        self.get("recording-status")
    }

    fn command<T: Serialize>(&self, path: &str, msg: T) -> Result<String> {
        let reply: ReplyBody = self.post(path, msg)?;
        reply
            .into_result()
            .map_err(|message| Error::Backend { message })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(map_connection_error(&self.base_url))
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path)?;
        debug!("GET {url}");
        self.agent
            .get(url.as_str())
            .call()
            .map_err(map_connection_error(&url))?
            .into_json::<T>()
            .map_err(map_connection_error(&url))
    }

    fn post<T: Serialize, U: DeserializeOwned>(&self, path: &str, msg: T) -> Result<U> {
        let url = self.endpoint(path)?;
        debug!("POST {url}");
        let value = serde_json::to_value(msg).map_err(map_connection_error(&url))?;
        self.agent
            .post(url.as_str())
            .send_json(value)
            .map_err(map_connection_error(&url))?
            .into_json()
            .map_err(map_connection_error(&url))
    }
}

fn map_connection_error<E: fmt::Display>(url: &Url) -> impl FnOnce(E) -> Error + '_ {
    move |e: E| Error::Backend {
        message: format!("url:{url}: {e}"),
    }
}
