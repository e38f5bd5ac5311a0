use std::sync::{Arc, Mutex};

use auto_impl::auto_impl;
use livelab_kinematics::Visual;
use nalgebra as na;

use crate::{camera::OrbitCamera, error::Error};

/// Latest picture of the local camera preview.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Packed RGB8 pixels.
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct LinkPose<'a> {
    pub name: &'a str,
    pub transform: na::Isometry3<f64>,
    pub visuals: &'a [Visual],
}

/// Everything a scene needs to redraw one frame.
#[derive(Debug)]
pub struct Frame<'a> {
    pub index: u64,
    /// Links whose world transform differs from the last drawn frame.
    pub changed_links: Vec<LinkPose<'a>>,
    /// Current value of every movable joint.
    pub joint_positions: Vec<(&'a str, f64)>,
    /// The pose is frozen because the connection is lost.
    pub stale: bool,
    pub camera: &'a OrbitCamera,
    pub camera_changed: bool,
    pub overlay: Option<&'a VideoFrame>,
}

#[auto_impl(&mut, Box)]
pub trait Scene {
    fn draw(&mut self, frame: &Frame<'_>) -> Result<(), Error>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordedFrame {
    pub index: u64,
    pub changed_links: Vec<String>,
    pub joint_positions: Vec<(String, f64)>,
    pub stale: bool,
    pub has_overlay: bool,
}

/// Scene that keeps every drawn frame in memory.
///
/// Clones share the same record, so a clone kept outside the renderer can
/// inspect what was drawn.
#[derive(Debug, Clone, Default)]
pub struct RecordingScene {
    pub frames: Arc<Mutex<Vec<RecordedFrame>>>,
}

impl RecordingScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_frame(&self) -> Option<RecordedFrame> {
        self.frames.lock().unwrap().last().cloned()
    }

    pub fn num_frames(&self) -> usize {
        self.frames.lock().unwrap().len()
    }
}

impl Scene for RecordingScene {
    fn draw(&mut self, frame: &Frame<'_>) -> Result<(), Error> {
        self.frames.lock().unwrap().push(RecordedFrame {
            index: frame.index,
            changed_links: frame
                .changed_links
                .iter()
                .map(|l| l.name.to_owned())
                .collect(),
            joint_positions: frame
                .joint_positions
                .iter()
                .map(|(n, v)| ((*n).to_owned(), *v))
                .collect(),
            stale: frame.stale,
            has_overlay: frame.overlay.is_some(),
        });
        Ok(())
    }
}
