use std::{collections::BTreeMap, f64::consts::FRAC_PI_2, time::Duration};

use assert_approx_eq::assert_approx_eq;
use livelab_kinematics::KinematicModel;
use livelab_render::{RecordedFrame, RecordingScene};
use livelab_session::{
    Command, ConnectionState, DummyConnector, DummyMediaDevices, Error, Inbound, MediaKind,
    Outbound, PoseUpdate, Session, SessionConfig, SessionEvent, SessionHandle, SessionParams,
    SessionStarted,
};
use tokio::time;

const URDF: &str = r#"
<robot name="so101">
  <link name="base"/>
  <link name="shoulder"/>
  <link name="upper_arm"/>
  <joint name="Rotation" type="revolute">
    <parent link="base"/>
    <child link="shoulder"/>
    <origin xyz="0 0 0.05"/>
    <axis xyz="0 0 1"/>
    <limit lower="-2" upper="2" effort="1" velocity="1"/>
  </joint>
  <joint name="Pitch" type="revolute">
    <parent link="shoulder"/>
    <child link="upper_arm"/>
    <origin xyz="0 0 0.1"/>
    <axis xyz="0 1 0"/>
    <limit lower="-2" upper="2" effort="1" velocity="1"/>
  </joint>
</robot>
"#;

fn model() -> KinematicModel {
    livelab_kinematics::load_str(URDF).unwrap()
}

fn params() -> SessionParams {
    SessionParams {
        leader_port: "/dev/ttyACM0".to_owned(),
        follower_port: "/dev/ttyACM1".to_owned(),
        leader_config: "leader.json".to_owned(),
        follower_config: "follower.json".to_owned(),
    }
}

fn new_session(
    connector: &DummyConnector,
    devices: &DummyMediaDevices,
    config: SessionConfig,
) -> (Session<RecordingScene>, SessionHandle, RecordingScene) {
    let scene = RecordingScene::new();
    let (session, handle) = Session::new(
        model(),
        params(),
        config,
        connector.clone(),
        devices.clone(),
        scene.clone(),
    )
    .unwrap();
    (session, handle, scene)
}

fn joint_update(timestamp: Option<f64>, joint: &str, value: f64) -> Inbound {
    Inbound::JointUpdate(PoseUpdate::new(timestamp, [(joint.to_owned(), value)]))
}

fn position(frame: &RecordedFrame, joint: &str) -> f64 {
    frame
        .joint_positions
        .iter()
        .find(|(n, _)| n == joint)
        .unwrap()
        .1
}

fn is_reconnecting(state: &ConnectionState) -> bool {
    matches!(state, ConnectionState::Reconnecting { .. })
}

fn terminal_failures(handle: &mut SessionHandle) -> usize {
    std::iter::from_fn(|| handle.try_next_event())
        .filter(|e| matches!(e, SessionEvent::TerminalFailure(_)))
        .count()
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_loss_closes_after_retries() {
    let connector = DummyConnector::new();
    let devices = DummyMediaDevices::new();
    let (mut session, mut handle, _scene) =
        new_session(&connector, &devices, SessionConfig::default());
    let mut state = handle.watch_state();

    let (result, ()) = tokio::join!(session.run(), async {
        state.wait_for(ConnectionState::is_active).await.unwrap();
        connector.set_refuse(true);
        connector.set_echo_heartbeat(false);
        state.wait_for(is_reconnecting).await.unwrap();
    });

    assert!(result.unwrap_err().is_connection_loss());
    assert_eq!(handle.state(), ConnectionState::Closed);
    // the first connection and five retries
    assert_eq!(connector.num_connects(), 6);
    assert_eq!(terminal_failures(&mut handle), 1);
    assert_eq!(devices.num_stopped(), 1);
    drop(session);
    assert_eq!(terminal_failures(&mut handle), 0);
    assert_eq!(devices.num_stopped(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_pose_is_frozen_while_reconnecting() {
    let connector = DummyConnector::new();
    let devices = DummyMediaDevices::new();
    let (mut session, handle, scene) = new_session(&connector, &devices, SessionConfig::default());
    let mut state = handle.watch_state();

    let (result, ()) = tokio::join!(session.run(), async {
        state.wait_for(ConnectionState::is_active).await.unwrap();
        assert!(connector.push(joint_update(Some(5.0), "Pitch", 1.0)));
        assert!(connector.push(joint_update(Some(3.0), "Pitch", -1.0)));
        time::sleep(Duration::from_millis(100)).await;
        let frame = scene.last_frame().unwrap();
        assert!(!frame.stale);
        assert!(frame.has_overlay);
        assert_approx_eq!(position(&frame, "Pitch"), 1.0);

        connector.set_refuse(true);
        connector.disconnect();
        state.wait_for(is_reconnecting).await.unwrap();
        time::sleep(Duration::from_millis(100)).await;
        let frame = scene.last_frame().unwrap();
        assert!(frame.stale);
        assert_approx_eq!(position(&frame, "Pitch"), 1.0);

        connector.set_refuse(false);
        state.wait_for(ConnectionState::is_active).await.unwrap();
        // older than anything seen before the loss
        assert!(connector.push(joint_update(Some(1.0), "Pitch", -0.5)));
        time::sleep(Duration::from_millis(100)).await;
        let frame = scene.last_frame().unwrap();
        assert!(!frame.stale);
        assert_approx_eq!(position(&frame, "Pitch"), -0.5);
        handle.close();
    });

    result.unwrap();
    assert_approx_eq!(session.model().joint_value("Pitch").unwrap(), -0.5);
}

#[tokio::test(start_paused = true)]
async fn test_observation_is_mapped() {
    let connector = DummyConnector::new();
    let devices = DummyMediaDevices::new();
    let (mut session, handle, _scene) =
        new_session(&connector, &devices, SessionConfig::default());
    let mut state = handle.watch_state();

    let (result, ()) = tokio::join!(session.run(), async {
        state.wait_for(ConnectionState::is_active).await.unwrap();
        connector.push(Inbound::Observation {
            values: BTreeMap::from([
                ("shoulder_lift.pos".to_owned(), 90.0),
                ("shoulder_pan.pos".to_owned(), 180.0),
            ]),
            timestamp: None,
        });
        time::sleep(Duration::from_millis(100)).await;
        handle.close();
    });

    result.unwrap();
    assert_approx_eq!(session.model().joint_value("Pitch").unwrap(), FRAC_PI_2);
    // clamped to the joint limit
    assert_approx_eq!(session.model().joint_value("Rotation").unwrap(), 2.0);
}

#[tokio::test(start_paused = true)]
async fn test_latest_pending_command_is_flushed() {
    let connector = DummyConnector::new();
    let devices = DummyMediaDevices::new();
    let (mut session, handle, _scene) =
        new_session(&connector, &devices, SessionConfig::default());
    let mut state = handle.watch_state();
    let targets = Command::JointTargets {
        joints: BTreeMap::from([("Pitch".to_owned(), 0.3)]),
    };
    handle.send(Command::StartTeleoperation).unwrap();
    handle.send(targets.clone()).unwrap();

    let (result, ()) = tokio::join!(session.run(), async {
        state.wait_for(ConnectionState::is_active).await.unwrap();
        time::sleep(Duration::from_millis(10)).await;
        handle.send(Command::StopTeleoperation).unwrap();
        time::sleep(Duration::from_millis(10)).await;
        handle.close();
    });

    result.unwrap();
    let received = connector.received();
    assert!(matches!(received[0], Outbound::BeginSession(_)));
    let commands = received
        .into_iter()
        .filter_map(|m| match m {
            Outbound::Command { command } => Some(command),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(commands, [targets, Command::StopTeleoperation]);
    assert!(matches!(
        handle.send(Command::StartTeleoperation),
        Err(Error::SessionClosed)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_rejected_session_is_terminal() {
    let connector = DummyConnector::new();
    connector.set_handshake(Some(SessionStarted {
        success: false,
        message: "Teleoperation is already active".to_owned(),
    }));
    let devices = DummyMediaDevices::new();
    let (mut session, mut handle, _scene) =
        new_session(&connector, &devices, SessionConfig::default());

    match session.run().await {
        Err(Error::SessionRejected(message)) => {
            assert_eq!(message, "Teleoperation is already active")
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(connector.num_connects(), 1);
    assert_eq!(terminal_failures(&mut handle), 1);
    assert!(matches!(session.run().await, Err(Error::SessionClosed)));
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_handshake_times_out() {
    let connector = DummyConnector::new();
    connector.set_handshake(None);
    connector.set_echo_heartbeat(false);
    let devices = DummyMediaDevices::new();
    let (mut session, handle, _scene) =
        new_session(&connector, &devices, SessionConfig::default());
    let mut state = handle.watch_state();

    let (result, ()) = tokio::join!(session.run(), async {
        state.wait_for(is_reconnecting).await.unwrap();
        handle.close();
    });

    result.unwrap();
    assert_eq!(connector.num_connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_close_releases_media_once() {
    let connector = DummyConnector::new();
    let devices = DummyMediaDevices::new();
    let mut config = SessionConfig::default();
    config.media.microphone = true;
    let (mut session, handle, _scene) = new_session(&connector, &devices, config);
    let mut state = handle.watch_state();

    let (result, ()) = tokio::join!(session.run(), async {
        state.wait_for(ConnectionState::is_active).await.unwrap();
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(devices.num_opened(), 2);
        handle.close();
        handle.close();
    });

    result.unwrap();
    assert_eq!(handle.state(), ConnectionState::Closed);
    session.close();
    session.close();
    drop(session);
    assert_eq!(
        *devices.stopped.lock().unwrap(),
        [MediaKind::Camera, MediaKind::Microphone]
    );
}

#[tokio::test(start_paused = true)]
async fn test_close_before_run() {
    let connector = DummyConnector::new();
    let devices = DummyMediaDevices::new();
    let (mut session, handle, scene) = new_session(&connector, &devices, SessionConfig::default());
    handle.close();
    session.run().await.unwrap();
    assert_eq!(connector.num_connects(), 0);
    assert_eq!(scene.num_frames(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_media_denied_degrades() {
    let connector = DummyConnector::new();
    let devices = DummyMediaDevices::new();
    devices.deny(MediaKind::Camera);
    let (mut session, mut handle, scene) =
        new_session(&connector, &devices, SessionConfig::default());
    let mut state = handle.watch_state();

    let (result, ()) = tokio::join!(session.run(), async {
        state.wait_for(ConnectionState::is_active).await.unwrap();
        time::sleep(Duration::from_millis(100)).await;
        assert!(!scene.last_frame().unwrap().has_overlay);
        handle.close();
    });

    result.unwrap();
    assert!(matches!(
        handle.try_next_event(),
        Some(SessionEvent::MediaUnavailable(_))
    ));
    assert_eq!(devices.num_opened(), 0);
}

#[test]
fn test_missing_params_fail_before_connecting() {
    let connector = DummyConnector::new();
    let result = Session::new(
        model(),
        SessionParams {
            follower_port: String::new(),
            ..params()
        },
        SessionConfig::default(),
        connector.clone(),
        DummyMediaDevices::new(),
        RecordingScene::new(),
    );
    assert!(matches!(result, Err(Error::SessionSetup(_))));
    assert_eq!(connector.num_connects(), 0);
}
