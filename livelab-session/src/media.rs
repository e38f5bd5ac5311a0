use std::{
    fmt,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use auto_impl::auto_impl;
use livelab_render::VideoFrame;
use tracing::{debug, info};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Camera,
    Microphone,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Camera => f.write_str("camera"),
            Self::Microphone => f.write_str("microphone"),
        }
    }
}

/// An open local capture device.
#[auto_impl(Box)]
pub trait MediaStream: Send {
    fn kind(&self) -> MediaKind;

    /// Most recent picture, for video streams.
    fn latest_frame(&mut self) -> Option<VideoFrame> {
        None
    }

    /// Closes the device. Called exactly once by [`MediaGuard`].
    fn stop(&mut self);
}

#[async_trait]
#[auto_impl(Box, Arc)]
pub trait MediaDevices: Send + Sync {
    async fn open(&self, kind: MediaKind) -> Result<Box<dyn MediaStream>>;
}

/// Media devices of a headless host: every request is denied.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMediaDevices;

#[async_trait]
impl MediaDevices for NoMediaDevices {
    async fn open(&self, kind: MediaKind) -> Result<Box<dyn MediaStream>> {
        Err(Error::MediaAccessDenied(format!("no {kind} on this host")))
    }
}

/// Streams opened for one teleoperation attempt.
///
/// Streams are stopped exactly once, by [`release`](Self::release) or on drop.
pub struct MediaGuard {
    streams: Vec<Box<dyn MediaStream>>,
}

impl fmt::Debug for MediaGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaGuard")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl MediaGuard {
    /// A guard holding nothing, for sessions without local preview.
    pub fn empty() -> Self {
        Self {
            streams: Vec::new(),
        }
    }

    /// Opens every requested device or none of them.
    ///
    /// On failure the devices opened so far are stopped before returning
    /// [`Error::MediaAccessDenied`].
    pub async fn acquire<D>(devices: &D, kinds: &[MediaKind]) -> Result<Self>
    where
        D: MediaDevices + ?Sized,
    {
        let mut guard = Self::empty();
        for &kind in kinds {
            match devices.open(kind).await {
                Ok(stream) => {
                    debug!("opened {kind}");
                    guard.streams.push(stream);
                }
                Err(e) => {
                    guard.release();
                    return Err(match e {
                        e @ Error::MediaAccessDenied(_) => e,
                        e => Error::MediaAccessDenied(format!("{kind}: {e}")),
                    });
                }
            }
        }
        if !guard.streams.is_empty() {
            info!("acquired media {:?}", guard.kinds());
        }
        Ok(guard)
    }

    pub fn kinds(&self) -> Vec<MediaKind> {
        self.streams.iter().map(|s| s.kind()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Latest camera picture, if a camera is held.
    pub fn latest_frame(&mut self) -> Option<VideoFrame> {
        self.streams
            .iter_mut()
            .filter(|s| s.kind() == MediaKind::Camera)
            .find_map(|s| s.latest_frame())
    }

    /// Stops every held stream. Calling it again does nothing.
    pub fn release(&mut self) {
        for mut stream in self.streams.drain(..) {
            debug!("release {}", stream.kind());
            stream.stop();
        }
    }
}

impl Drop for MediaGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Dummy media devices for debug or tests.
///
/// Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct DummyMediaDevices {
    /// Kinds whose request is denied.
    pub denied: Arc<Mutex<Vec<MediaKind>>>,
    pub opened: Arc<Mutex<Vec<MediaKind>>>,
    pub stopped: Arc<Mutex<Vec<MediaKind>>>,
}

impl DummyMediaDevices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny(&self, kind: MediaKind) {
        self.denied.lock().unwrap().push(kind);
    }

    pub fn num_opened(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    pub fn num_stopped(&self) -> usize {
        self.stopped.lock().unwrap().len()
    }
}

#[async_trait]
impl MediaDevices for DummyMediaDevices {
    async fn open(&self, kind: MediaKind) -> Result<Box<dyn MediaStream>> {
        if self.denied.lock().unwrap().contains(&kind) {
            return Err(Error::MediaAccessDenied(format!("{kind} permission denied")));
        }
        self.opened.lock().unwrap().push(kind);
        Ok(Box::new(DummyMediaStream {
            kind,
            frame_count: 0,
            stopped: self.stopped.clone(),
        }))
    }
}

#[derive(Debug)]
struct DummyMediaStream {
    kind: MediaKind,
    frame_count: u8,
    stopped: Arc<Mutex<Vec<MediaKind>>>,
}

impl MediaStream for DummyMediaStream {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn latest_frame(&mut self) -> Option<VideoFrame> {
        if self.kind != MediaKind::Camera {
            return None;
        }
        self.frame_count = self.frame_count.wrapping_add(1);
        Some(VideoFrame {
            width: 2,
            height: 1,
            data: vec![self.frame_count; 6],
        })
    }

    fn stop(&mut self) {
        self.stopped.lock().unwrap().push(self.kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_release_once() {
        let devices = DummyMediaDevices::new();
        let mut guard = tokio_test::block_on(MediaGuard::acquire(
            &devices,
            &[MediaKind::Camera, MediaKind::Microphone],
        ))
        .unwrap();
        assert_eq!(guard.kinds(), [MediaKind::Camera, MediaKind::Microphone]);
        assert_eq!(guard.latest_frame().unwrap().data, vec![1; 6]);
        guard.release();
        guard.release();
        drop(guard);
        assert_eq!(devices.num_opened(), 2);
        assert_eq!(devices.num_stopped(), 2);
    }

    #[test]
    fn test_acquire_is_all_or_nothing() {
        let devices = DummyMediaDevices::new();
        devices.deny(MediaKind::Microphone);
        let err = tokio_test::block_on(MediaGuard::acquire(
            &devices,
            &[MediaKind::Camera, MediaKind::Microphone],
        ))
        .unwrap_err();
        assert!(matches!(err, Error::MediaAccessDenied(_)));
        assert_eq!(*devices.opened.lock().unwrap(), [MediaKind::Camera]);
        assert_eq!(*devices.stopped.lock().unwrap(), [MediaKind::Camera]);
    }

    #[test]
    fn test_drop_releases() {
        let devices = DummyMediaDevices::new();
        {
            let _guard =
                tokio_test::block_on(MediaGuard::acquire(&devices, &[MediaKind::Camera])).unwrap();
        }
        assert_eq!(devices.num_stopped(), 1);
    }

    #[test]
    fn test_no_media_devices() {
        let err = tokio_test::block_on(MediaGuard::acquire(&NoMediaDevices, &[MediaKind::Camera]))
            .unwrap_err();
        assert!(err.to_string().contains("no camera"));
        let guard = tokio_test::block_on(MediaGuard::acquire(&NoMediaDevices, &[])).unwrap();
        assert!(guard.is_empty());
    }
}
