//! Robot description loader and live kinematic model.
//!
//! A [`KinematicModel`] is built once from a URDF description by the
//! [`loader`] functions, then driven by joint values. World transforms of the
//! links are derived lazily with [`KinematicModel::recompute_transforms`].

#![warn(rust_2018_idioms)]

mod error;
mod joint;
mod link;
pub mod loader;
mod model;

pub use crate::{error::*, joint::*, link::*, model::*};
pub use loader::{load_file, load_robot, load_str};

// re-export
pub use nalgebra;
pub use urdf_rs;
