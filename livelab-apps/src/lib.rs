//! Configuration and helpers shared by the livelab command line tools.

#![warn(rust_2018_idioms)]

mod config;
mod error;
pub mod utils;

pub use crate::{config::*, error::*};
