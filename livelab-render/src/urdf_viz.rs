use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use schemars::JsonSchema;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::{
    error::Error,
    scene::{Frame, Scene},
};

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct UrdfVizSceneConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for UrdfVizSceneConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_url() -> String {
    "http://127.0.0.1:7777".to_owned()
}

fn default_timeout_ms() -> u64 {
    50
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct JointState {
    names: Vec<String>,
    positions: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
struct RpcResult {
    is_ok: bool,
    reason: String,
}

const UNIT_DURATION: Duration = Duration::from_millis(10);

/// Mirrors the joint configuration into a running
/// [urdf-viz](https://github.com/openrr/urdf-viz) viewer.
///
/// urdf-viz computes link poses itself, so only the joint values are sent.
/// It cannot dim a stale pose; staleness is only logged.
///
/// Drawing never waits for the viewer: the latest joint state is stored and
/// a background thread sends it. States that were not sent yet are replaced
/// by newer ones.
pub struct UrdfVizScene {
    base_url: Url,
    target: Arc<Mutex<Option<JointState>>>,
    is_dropping: Arc<AtomicBool>,
    send_thread: Option<JoinHandle<()>>,
    last_stale: bool,
}

impl fmt::Debug for UrdfVizScene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrdfVizScene")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl UrdfVizScene {
    /// Connects to urdf-viz and checks it answers.
    pub fn try_new(config: &UrdfVizSceneConfig) -> Result<Self, Error> {
        let base_url = Url::parse(&config.url).map_err(|e| Error::Connection {
            message: format!("url:{}: {e}", config.url),
        })?;
        let viewer = Viewer {
            base_url,
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_millis(config.timeout_ms))
                .build(),
        };
        let state: JointState = viewer.get("get_joint_positions")?;
        debug!("urdf-viz at {} has {} joints", viewer.base_url, state.names.len());
        Ok(Self::spawn(viewer))
    }

    fn spawn(viewer: Viewer) -> Self {
        let base_url = viewer.base_url.clone();
        let target = Arc::new(Mutex::new(None));
        let is_dropping = Arc::new(AtomicBool::new(false));
        let send_thread = {
            let target = target.clone();
            let is_dropping = is_dropping.clone();
            thread::spawn(move || send_joint_positions_loop(&viewer, &target, &is_dropping))
        };
        Self {
            base_url,
            target,
            is_dropping,
            send_thread: Some(send_thread),
            last_stale: false,
        }
    }
}

impl Scene for UrdfVizScene {
    fn draw(&mut self, frame: &Frame<'_>) -> Result<(), Error> {
        if frame.stale != self.last_stale {
            debug!("urdf-viz pose stale={}", frame.stale);
            self.last_stale = frame.stale;
        }
        if frame.changed_links.is_empty() {
            return Ok(());
        }
        let (names, positions) = frame
            .joint_positions
            .iter()
            .map(|(n, v)| ((*n).to_owned(), *v))
            .unzip();
        *lock(&self.target) = Some(JointState { names, positions });
        Ok(())
    }
}

impl Drop for UrdfVizScene {
    fn drop(&mut self) {
        if let Some(t) = self.send_thread.take() {
            self.is_dropping.store(true, Ordering::Relaxed);
            if t.join().is_err() {
                warn!("urdf-viz sender thread panicked");
            }
        }
    }
}

fn send_joint_positions_loop(
    viewer: &Viewer,
    target: &Mutex<Option<JointState>>,
    is_dropping: &AtomicBool,
) {
    let mut failures = 0_usize;
    while !is_dropping.load(Ordering::Relaxed) {
        let Some(state) = lock(target).take() else {
            thread::sleep(UNIT_DURATION);
            continue;
        };
        match viewer.set_joint_positions(state) {
            Ok(()) => {
                if failures > 0 {
                    debug!("urdf-viz recovered after {failures} failed update(s)");
                }
                failures = 0;
            }
            Err(e) => {
                if failures == 0 {
                    warn!("failed to update urdf-viz: {e}");
                } else {
                    debug!("failed to update urdf-viz: {e}");
                }
                failures += 1;
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
struct Viewer {
    base_url: Url,
    agent: ureq::Agent,
}

impl Viewer {
    fn set_joint_positions(&self, state: JointState) -> Result<(), Error> {
        let res: RpcResult = self.post("set_joint_positions", state)?;
        if !res.is_ok {
            return Err(Error::Rejected(res.reason));
        }
        Ok(())
    }

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        self.base_url
            .join(path)
            .map_err(map_connection_error(&self.base_url))
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.endpoint(path)?;
        self.agent
            .get(url.as_str())
            .call()
            .map_err(map_connection_error(&url))?
            .into_json::<T>()
            .map_err(map_connection_error(&url))
    }

    fn post<T: Serialize, U: DeserializeOwned>(&self, path: &str, msg: T) -> Result<U, Error> {
        let url = self.endpoint(path)?;
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
    move |e: E| Error::Connection {
        message: format!("url:{url}: {e}"),
    }
}
