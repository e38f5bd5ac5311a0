use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use livelab_apps::{utils, TeleopConfig};
use livelab_render::{Frame, Scene, UrdfVizScene};
use livelab_session::{
    BackendClient, NoMediaDevices, RecordingControl, RecordingRequest, Session, SessionEvent,
    SessionParams, WebSocketConnector,
};
use schemars::schema_for;
use tracing::{debug, error, info, warn};

/// Teleoperation visualizer for leader/follower arms.
#[derive(Debug, Parser)]
#[command(name = env!("CARGO_BIN_NAME"), version)]
struct Args {
    /// Path to the setting file.
    #[arg(short, long, global = true)]
    config_path: Option<PathBuf>,
    #[command(subcommand)]
    subcommand: Subcommand,
}

#[derive(Debug, clap::Subcommand)]
enum Subcommand {
    /// Runs a teleoperation session and follows the pose of the follower arm.
    Teleop {
        #[command(flatten)]
        params: ParamArgs,
        /// Robot description, overriding the one of the setting file.
        #[arg(long)]
        urdf_path: Option<PathBuf>,
    },
    /// Records episodes into a dataset while teleoperating.
    Record {
        #[command(flatten)]
        params: ParamArgs,
        /// Dataset to write to, e.g. `user/so101_pick_place`.
        #[arg(long)]
        dataset_repo_id: String,
        /// Task description stored with every episode.
        #[arg(long)]
        single_task: String,
        #[arg(long, default_value_t = 5)]
        num_episodes: u32,
        #[arg(long, default_value_t = 30)]
        episode_time_s: u32,
        #[arg(long, default_value_t = 10)]
        reset_time_s: u32,
        #[arg(long, default_value_t = 30)]
        fps: u32,
        /// Do not store camera videos.
        #[arg(long)]
        no_video: bool,
        #[arg(long)]
        push_to_hub: bool,
        /// Append to an existing dataset.
        #[arg(long)]
        resume: bool,
    },
    /// Prints whether the backend is recording.
    RecordStatus,
    /// Controls the running recording.
    RecordControl {
        #[arg(value_enum)]
        control: RecordingAction,
    },
    /// Lists the calibration profiles known to the backend.
    Configs,
    /// Prints whether the backend is teleoperating.
    Status,
    /// Stops teleoperation on the backend.
    Stop,
    /// Prints the current joint positions of the follower arm.
    JointPositions,
    /// Prints the default setting as TOML.
    ShowDefaultConfig,
    /// Prints the JSON schema of the setting file.
    Schema,
}

/// Ports and calibration profiles, overriding the ones of the setting file.
#[derive(Debug, clap::Args)]
struct ParamArgs {
    /// Serial port of the leader arm.
    #[arg(long)]
    leader_port: Option<String>,
    /// Serial port of the follower arm.
    #[arg(long)]
    follower_port: Option<String>,
    /// Calibration profile of the leader arm.
    #[arg(long)]
    leader_config: Option<String>,
    /// Calibration profile of the follower arm.
    #[arg(long)]
    follower_config: Option<String>,
}

impl ParamArgs {
    fn apply(self, params: &mut SessionParams) {
        for (value, field) in [
            (self.leader_port, &mut params.leader_port),
            (self.follower_port, &mut params.follower_port),
            (self.leader_config, &mut params.leader_config),
            (self.follower_config, &mut params.follower_config),
        ] {
            if let Some(value) = value {
                *field = value;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum RecordingAction {
    /// Skip to the next episode.
    ExitEarly,
    /// Drop the current episode and record it again.
    RerecordEpisode,
    StopRecording,
}

impl From<RecordingAction> for RecordingControl {
    fn from(action: RecordingAction) -> Self {
        match action {
            RecordingAction::ExitEarly => RecordingControl::ExitEarly,
            RecordingAction::RerecordEpisode => RecordingControl::RerecordEpisode,
            RecordingAction::StopRecording => RecordingControl::StopRecording,
        }
    }
}

/// Headless scene: logs what would be redrawn.
#[derive(Debug, Default)]
struct TracingScene {
    stale: bool,
}

impl Scene for TracingScene {
    fn draw(&mut self, frame: &Frame<'_>) -> Result<(), livelab_render::Error> {
        if frame.stale != self.stale {
            self.stale = frame.stale;
            if frame.stale {
                warn!("connection lost, showing the last known pose");
            } else {
                info!("pose is live again");
            }
        }
        if !frame.changed_links.is_empty() {
            debug!(
                frame = frame.index,
                links = frame.changed_links.len(),
                "joints {:?}",
                frame.joint_positions
            );
        }
        Ok(())
    }
}

fn load_config(path: Option<PathBuf>) -> Result<TeleopConfig> {
    Ok(match utils::get_teleop_config_path(path) {
        Some(path) => TeleopConfig::new(path)?,
        None => TeleopConfig::default(),
    })
}

async fn teleop(config: TeleopConfig, urdf_path: PathBuf) -> Result<()> {
    let model = livelab_kinematics::load_file(&urdf_path)?;
    info!(
        "loaded {} from {} ({} links)",
        model.name(),
        urdf_path.display(),
        model.num_links()
    );
    let backend = BackendClient::new(&config.backend)?;
    let connector = WebSocketConnector::new(backend.websocket_url()?)?;
    let scene: Box<dyn Scene> = match &config.urdf_viz {
        Some(urdf_viz) => Box::new(UrdfVizScene::try_new(urdf_viz)?),
        None => Box::new(TracingScene::default()),
    };
    let (mut session, mut handle) = Session::new(
        model,
        config.params,
        config.session,
        connector,
        NoMediaDevices,
        scene,
    )?;

    let run = session.run();
    tokio::pin!(run);
    let result = loop {
        tokio::select! {
            result = &mut run => break result,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, closing the session");
                handle.close();
            }
            Some(event) = handle.next_event() => match event {
                SessionEvent::MediaUnavailable(reason) => warn!("no local preview: {reason}"),
                SessionEvent::BackendError(message) => warn!("backend: {message}"),
                SessionEvent::TerminalFailure(reason) => error!("session failed: {reason}"),
            },
        }
    };
    Ok(result?)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    utils::init_tracing();
    let args = Args::parse();
    debug!(?args);

    match args.subcommand {
        Subcommand::Teleop { params, urdf_path } => {
            let mut config = load_config(args.config_path)?;
            params.apply(&mut config.params);
            let urdf_path = urdf_path.unwrap_or_else(|| config.urdf_full_path());
            teleop(config, urdf_path).await?;
        }
        Subcommand::Configs => {
            let config = load_config(args.config_path)?;
            let configs = BackendClient::new(&config.backend)?.get_configs()?;
            println!("leader:");
            for c in configs.leader_configs {
                println!("  {c}");
            }
            println!("follower:");
            for c in configs.follower_configs {
                println!("  {c}");
            }
        }
        Subcommand::Status => {
            let config = load_config(args.config_path)?;
            let status = BackendClient::new(&config.backend)?.teleoperation_status()?;
            println!(
                "teleoperation {}",
                if status.teleoperation_active {
                    "active"
                } else {
                    "inactive"
                }
            );
        }
        Subcommand::Stop => {
            let config = load_config(args.config_path)?;
            println!("{}", BackendClient::new(&config.backend)?.stop_teleoperation()?);
        }
        Subcommand::JointPositions => {
            let config = load_config(args.config_path)?;
            let pose = BackendClient::new(&config.backend)?.joint_positions()?;
            for (joint, value) in &pose.joints {
                println!("{joint}: {value:.4} rad ({:.1} deg)", value.to_degrees());
            }
        }
        Subcommand::Record {
            params,
            dataset_repo_id,
            single_task,
            num_episodes,
            episode_time_s,
            reset_time_s,
            fps,
            no_video,
            push_to_hub,
            resume,
        } => {
            let mut config = load_config(args.config_path)?;
            params.apply(&mut config.params);
            let request = RecordingRequest {
                num_episodes,
                episode_time_s,
                reset_time_s,
                fps,
                video: !no_video,
                push_to_hub,
                resume,
                ..RecordingRequest::new(config.params, dataset_repo_id, single_task)
            };
            println!(
                "{}",
                BackendClient::new(&config.backend)?.start_recording(&request)?
            );
        }
        Subcommand::RecordStatus => {
            let config = load_config(args.config_path)?;
            let status = BackendClient::new(&config.backend)?.recording_status()?;
            println!(
                "recording {}",
                if status.recording_active {
                    "active"
                } else {
                    "inactive"
                }
            );
        }
        Subcommand::RecordControl { control } => {
            let config = load_config(args.config_path)?;
            println!(
                "{}",
                BackendClient::new(&config.backend)?.control_recording(control.into())?
            );
        }
        Subcommand::ShowDefaultConfig => {
            print!("{}", toml::to_string(&TeleopConfig::default())?);
        }
        Subcommand::Schema => {
            let schema = schema_for!(TeleopConfig);
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
    }
    Ok(())
}
