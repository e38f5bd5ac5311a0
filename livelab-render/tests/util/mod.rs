use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub(crate) struct JointNamesAndPositions {
    pub(crate) names: Vec<String>,
    pub(crate) positions: Vec<f64>,
}

/// Stand-in for the urdf-viz web server.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockViewer {
    /// Every joint state received by `set_joint_positions`, in order.
    pub(crate) received: Arc<Mutex<Vec<JointNamesAndPositions>>>,
    /// How long `set_joint_positions` waits before answering.
    pub(crate) delay: Duration,
}

impl MockViewer {
    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub(crate) fn last_received(&self) -> Option<JointNamesAndPositions> {
        self.received.lock().unwrap().last().cloned()
    }

    /// Serves on an unused port from a background thread and returns its url.
    pub(crate) fn start_background(&self) -> Url {
        let port = portpicker::pick_unused_port().expect("No ports free");
        let listener = std::net::TcpListener::bind(("127.0.0.1", port)).unwrap();
        listener.set_nonblocking(true).unwrap();
        let app = Router::new()
            .route("/get_joint_positions", get(get_joint_positions))
            .route("/set_joint_positions", post(set_joint_positions))
            .with_state(self.clone());
        std::thread::spawn(move || {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap()
                .block_on(async move {
                    let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                    axum::serve(listener, app).await.unwrap();
                })
        });
        Url::parse(&format!("http://127.0.0.1:{port}")).unwrap()
    }
}

async fn get_joint_positions(State(viewer): State<MockViewer>) -> Json<JointNamesAndPositions> {
    Json(viewer.last_received().unwrap_or_default())
}

async fn set_joint_positions(
    State(viewer): State<MockViewer>,
    Json(state): Json<JointNamesAndPositions>,
) -> Json<serde_json::Value> {
    tokio::time::sleep(viewer.delay).await;
    viewer.received.lock().unwrap().push(state);
    Json(serde_json::json!({ "is_ok": true, "reason": "" }))
}
