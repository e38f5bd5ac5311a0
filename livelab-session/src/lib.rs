//! Teleoperation session of the livelab visualizer.
//!
//! A [`Session`] owns a [`KinematicModel`](livelab_kinematics::KinematicModel)
//! and keeps it in sync with the follower arm:
//!
//! - [`PoseSynchronizer`] merges inbound pose updates into the model,
//! - [`CommandDispatcher`] sends operator commands,
//! - [`SessionController`] tracks the connection state and its reconnects.
//!
//! The session is driven by [`Session::run`] on a single task and controlled
//! from the UI through a [`SessionHandle`].

#![warn(rust_2018_idioms)]

mod backend;
mod config;
mod controller;
mod dispatcher;
mod error;
mod mapping;
mod media;
mod message;
mod session;
mod synchronizer;
pub mod transport;

pub use crate::{
    backend::*,
    config::*,
    controller::*,
    dispatcher::*,
    error::*,
    mapping::*,
    media::*,
    message::*,
    session::*,
    synchronizer::*,
    transport::{Connection, Connector, DummyConnector, WebSocketConnector},
};
