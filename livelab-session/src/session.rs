use std::{future, sync::Arc};

use futures::future::BoxFuture;
use livelab_kinematics::KinematicModel;
use livelab_render::{FrameStats, Renderer, Scene};
use tokio::{
    sync::{mpsc, watch},
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    config::SessionConfig,
    controller::{Action, ConnectionState, ControlEvent, SessionController, Transition},
    dispatcher::CommandDispatcher,
    error::{Error, Result},
    media::{MediaDevices, MediaGuard, MediaKind},
    message::{Command, Inbound, Outbound, SessionParams},
    synchronizer::PoseSynchronizer,
    transport::{Connection, Connector},
};

/// Notifications for the surrounding UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Local preview is unavailable; the session goes on without it.
    MediaUnavailable(String),
    /// The backend reported an error without closing the session.
    BackendError(String),
    /// The session closed because of a failure. Sent at most once.
    TerminalFailure(String),
}

#[derive(Debug)]
enum Request {
    Command(Command),
    Orbit { d_theta: f64, d_phi: f64 },
    Zoom(f64),
}

/// UI side of a running [`Session`].
///
/// Dropping the handle closes the session.
#[derive(Debug)]
pub struct SessionHandle {
    requests: mpsc::UnboundedSender<Request>,
    state: watch::Receiver<ConnectionState>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    close: watch::Sender<bool>,
}

impl SessionHandle {
    /// Queues an operator command.
    ///
    /// Fails with [`Error::SessionClosed`] once the session is closed.
    pub fn send(&self, command: Command) -> Result<()> {
        if self.state().is_closed() || *self.close.borrow() {
            return Err(Error::SessionClosed);
        }
        self.requests
            .send(Request::Command(command))
            .map_err(|_| Error::SessionClosed)
    }

    pub fn orbit(&self, d_theta: f64, d_phi: f64) {
        let _ = self.requests.send(Request::Orbit { d_theta, d_phi });
    }

    pub fn zoom(&self, factor: f64) {
        let _ = self.requests.send(Request::Zoom(factor));
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<SessionEvent> {
        self.events.try_recv().ok()
    }

    /// Requests teardown. Calling it more than once has no further effect.
    pub fn close(&self) {
        self.close.send_replace(true);
    }
}

/// One teleoperation session: owns the model and every component that
/// reads or writes it.
pub struct Session<S> {
    params: SessionParams,
    config: SessionConfig,
    model: KinematicModel,
    synchronizer: PoseSynchronizer,
    dispatcher: CommandDispatcher,
    controller: SessionController,
    renderer: Renderer<S>,
    connector: Arc<dyn Connector>,
    devices: Arc<dyn MediaDevices>,
    connection: Option<Connection>,
    connecting: Option<BoxFuture<'static, Result<Connection>>>,
    acquiring: Option<BoxFuture<'static, Result<MediaGuard>>>,
    retry_at: Option<Instant>,
    last_inbound: Instant,
    last_loss: Option<Error>,
    media: MediaGuard,
    requests: mpsc::UnboundedReceiver<Request>,
    close: watch::Receiver<bool>,
    events: mpsc::UnboundedSender<SessionEvent>,
    torn_down: bool,
}

impl<S> std::fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("params", &self.params)
            .field("state", &self.controller.state())
            .field("media", &self.media)
            .finish_non_exhaustive()
    }
}

impl<S> Session<S>
where
    S: Scene,
{
    /// Creates a session in the idle state.
    ///
    /// Missing parameters are reported here, before any connection attempt.
    pub fn new<C, D>(
        model: KinematicModel,
        params: SessionParams,
        config: SessionConfig,
        connector: C,
        devices: D,
        scene: S,
    ) -> Result<(Self, SessionHandle)>
    where
        C: Connector + 'static,
        D: MediaDevices + 'static,
    {
        params.validate()?;
        let (requests_tx, requests) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();
        let (close_tx, close) = watch::channel(false);
        let controller = SessionController::new(config.reconnect);
        let handle = SessionHandle {
            requests: requests_tx,
            state: controller.subscribe(),
            events: events_rx,
            close: close_tx,
        };
        let session = Self {
            params,
            synchronizer: PoseSynchronizer::new(&model),
            dispatcher: CommandDispatcher::new(),
            controller,
            renderer: Renderer::new(scene),
            connector: Arc::new(connector),
            devices: Arc::new(devices),
            connection: None,
            connecting: None,
            acquiring: None,
            retry_at: None,
            last_inbound: Instant::now(),
            last_loss: None,
            media: MediaGuard::empty(),
            requests,
            close,
            events,
            torn_down: false,
            model,
            config,
        };
        Ok((session, handle))
    }

    pub fn model(&self) -> &KinematicModel {
        &self.model
    }

    pub fn renderer(&self) -> &Renderer<S> {
        &self.renderer
    }

    pub fn state(&self) -> ConnectionState {
        self.controller.state()
    }

    pub fn is_stale(&self) -> bool {
        self.synchronizer.is_stale()
    }

    /// Drives the session until it is closed.
    ///
    /// Returns `Ok(())` after an explicit close and the cause of the failure
    /// otherwise.
    pub async fn run(&mut self) -> Result<()> {
        if self.controller.state() != ConnectionState::Idle {
            return Err(Error::SessionClosed);
        }
        let mut heartbeat = time::interval(self.config.heartbeat.interval());
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut frames = time::interval(self.config.render.frame_interval());
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.start_media();
        let transition = self.controller.handle(ControlEvent::Start);
        if let Some(result) = self.apply(transition) {
            return result;
        }

        loop {
            let rendering = self.controller.state().is_rendering();
            // a close request wins over every other ready branch
            let transition = tokio::select! {
                biased;

                () = close_requested(&mut self.close) => {
                    self.controller.handle(ControlEvent::Close)
                }
                media = poll_slot(&mut self.acquiring) => {
                    self.on_media(media);
                    continue;
                }
                result = poll_slot(&mut self.connecting) => match result {
                    Ok(connection) => match self.on_connected(connection) {
                        Ok(()) => continue,
                        Err(e) => self.lose_connection(e),
                    },
                    Err(e) => self.lose_connection(e),
                },
                message = next_inbound(&mut self.connection) => match message {
                    Some(message) => match self.on_inbound(message) {
                        Some(transition) => transition,
                        None => continue,
                    },
                    None => self.lose_connection(Error::transport("connection closed by backend")),
                },
                Some(request) = self.requests.recv() => match self.on_request(request) {
                    Ok(()) => continue,
                    Err(e) => self.lose_connection(e),
                },
                _ = heartbeat.tick(), if self.connection.is_some() || self.connecting.is_some() => {
                    match self.on_heartbeat() {
                        Ok(()) => continue,
                        Err(e) => self.lose_connection(e),
                    }
                }
                _ = frames.tick(), if rendering => {
                    self.render_frame();
                    continue;
                }
                () = sleep_until(self.retry_at) => {
                    self.retry_at = None;
                    self.start_connect();
                    continue;
                }
            };
            if let Some(result) = self.apply(transition) {
                return result;
            }
        }
    }

    /// Applies one frame: pending pose values first, then the redraw.
    pub fn render_frame(&mut self) -> FrameStats {
        let applied = self.synchronizer.apply_pending(&mut self.model);
        if applied > 0 {
            debug!("applied {applied} joint values");
        }
        let overlay = self.media.latest_frame();
        self.renderer
            .render_frame(&mut self.model, self.synchronizer.is_stale(), overlay.as_ref())
    }

    /// Closes the session from any state. Calling it again does nothing.
    pub fn close(&mut self) {
        let transition = self.controller.handle(ControlEvent::Close);
        let _ = self.apply(transition);
        self.teardown();
    }

    fn start_media(&mut self) {
        let mut kinds = Vec::new();
        if self.config.media.camera {
            kinds.push(MediaKind::Camera);
        }
        if self.config.media.microphone {
            kinds.push(MediaKind::Microphone);
        }
        if kinds.is_empty() {
            return;
        }
        let devices = self.devices.clone();
        self.acquiring = Some(Box::pin(async move {
            MediaGuard::acquire(devices.as_ref(), &kinds).await
        }));
    }

    fn on_media(&mut self, media: Result<MediaGuard>) {
        match media {
            Ok(media) => self.media = media,
            Err(e) => {
                warn!("continue without local preview: {e}");
                self.emit(SessionEvent::MediaUnavailable(e.to_string()));
            }
        }
    }

    fn start_connect(&mut self) {
        let connector = self.connector.clone();
        // the attempt and the handshake share the heartbeat timeout
        self.last_inbound = Instant::now();
        self.connecting = Some(Box::pin(async move { connector.connect().await }));
    }

    fn on_connected(&mut self, connection: Connection) -> Result<()> {
        debug!("connected, begin session");
        self.last_inbound = Instant::now();
        connection.send(Outbound::BeginSession(self.params.clone()))?;
        self.connection = Some(connection);
        Ok(())
    }

    fn on_inbound(&mut self, message: Inbound) -> Option<Transition> {
        self.last_inbound = Instant::now();
        match message {
            Inbound::JointUpdate(update) => {
                self.synchronizer.offer(update);
            }
            Inbound::Observation { values, timestamp } => {
                let update = self.config.observation.map(&values, timestamp);
                self.synchronizer.offer(update);
            }
            Inbound::SessionStarted(started) => {
                let event = if started.success {
                    info!("session started: {}", started.message);
                    ControlEvent::HandshakeSucceeded
                } else {
                    self.last_loss = Some(Error::SessionRejected(started.message.clone()));
                    ControlEvent::HandshakeRejected {
                        reason: started.message,
                    }
                };
                return Some(self.controller.handle(event));
            }
            Inbound::Heartbeat => {}
            Inbound::Error { message } => {
                warn!("backend error: {message}");
                self.emit(SessionEvent::BackendError(message));
            }
        }
        None
    }

    fn on_request(&mut self, request: Request) -> Result<()> {
        match request {
            Request::Command(command) => match self.dispatcher.send(command) {
                // the handle raced with teardown
                Err(Error::SessionClosed) => Ok(()),
                result => result,
            },
            Request::Orbit { d_theta, d_phi } => {
                self.renderer.camera_mut().orbit(d_theta, d_phi);
                Ok(())
            }
            Request::Zoom(factor) => {
                self.renderer.camera_mut().zoom(factor);
                Ok(())
            }
        }
    }

    fn on_heartbeat(&mut self) -> Result<()> {
        let timeout = self.config.heartbeat.timeout();
        if self.last_inbound.elapsed() >= timeout {
            return Err(Error::HeartbeatTimeout(timeout));
        }
        match &self.connection {
            Some(connection) => connection.send(Outbound::Heartbeat),
            None => Ok(()),
        }
    }

    fn lose_connection(&mut self, error: Error) -> Transition {
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
        self.connecting = None;
        self.synchronizer.freeze();
        self.dispatcher.suspend();
        let reason = error.to_string();
        self.last_loss = Some(error);
        self.controller
            .handle(ControlEvent::ConnectionLost { reason })
    }

    /// Carries out a transition. Returns the result of `run` once closed.
    fn apply(&mut self, transition: Transition) -> Option<Result<()>> {
        match transition.action {
            Action::None => None,
            Action::Connect => {
                self.start_connect();
                None
            }
            Action::Activate => {
                self.synchronizer.resume();
                let result = match &self.connection {
                    Some(connection) => self.dispatcher.activate(connection.sender()),
                    None => Ok(()),
                };
                match result {
                    Ok(()) => None,
                    Err(e) => {
                        let transition = self.lose_connection(e);
                        self.apply(transition)
                    }
                }
            }
            Action::Reconnect { attempt, delay } => {
                info!("reconnect attempt {attempt} in {delay:?}");
                self.retry_at = Some(Instant::now() + delay);
                None
            }
            Action::Fail { reason } => {
                self.teardown();
                self.emit(SessionEvent::TerminalFailure(reason.clone()));
                Some(Err(self
                    .last_loss
                    .take()
                    .unwrap_or(Error::Transport { message: reason })))
            }
            Action::Shutdown => {
                self.teardown();
                Some(Ok(()))
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("session handle is gone");
        }
    }
}

impl<S> Session<S> {
    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.connecting = None;
        self.acquiring = None;
        self.retry_at = None;
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
        self.synchronizer.close();
        self.dispatcher.close();
        self.media.release();
        info!("session closed");
    }
}

impl<S> Drop for Session<S> {
    fn drop(&mut self) {
        self.controller.handle(ControlEvent::Close);
        self.teardown();
    }
}

async fn close_requested(close: &mut watch::Receiver<bool>) {
    loop {
        if *close.borrow_and_update() {
            return;
        }
        if close.changed().await.is_err() {
            // the handle was dropped
            return;
        }
    }
}

async fn poll_slot<T>(slot: &mut Option<BoxFuture<'static, T>>) -> T {
    match slot {
        Some(fut) => {
            let output = fut.await;
            *slot = None;
            output
        }
        None => future::pending().await,
    }
}

async fn next_inbound(connection: &mut Option<Connection>) -> Option<Inbound> {
    match connection {
        Some(connection) => connection.recv().await,
        None => future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}
