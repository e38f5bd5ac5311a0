//! Frame loop of the livelab visualizer.
//!
//! [`Renderer`] recomputes the model transforms and hands the links that moved
//! to a [`Scene`]. Backends: [`RecordingScene`] (in memory) and
//! [`UrdfVizScene`] (an external urdf-viz viewer).

#![warn(rust_2018_idioms)]

mod camera;
mod error;
mod renderer;
mod scene;
mod urdf_viz;

pub use crate::{camera::*, error::*, renderer::*, scene::*, urdf_viz::*};
