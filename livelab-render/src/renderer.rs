use livelab_kinematics::KinematicModel;
use nalgebra as na;
use tracing::{debug, warn};

use crate::{
    camera::OrbitCamera,
    scene::{Frame, LinkPose, Scene, VideoFrame},
};

/// Result of one [`Renderer::render_frame`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    pub index: u64,
    pub redrawn_links: usize,
    /// The scene was asked to draw this frame.
    pub drawn: bool,
}

/// Redraws a kinematic model into a [`Scene`], one frame at a time.
///
/// Only links whose transform changed since the last successfully drawn
/// frame are handed to the scene.
#[derive(Debug)]
pub struct Renderer<S> {
    scene: S,
    camera: OrbitCamera,
    camera_changed: bool,
    // Last drawn transform per link, in model traversal order.
    drawn: Vec<Option<na::Isometry3<f64>>>,
    last_stale: bool,
    frame_index: u64,
    failures: usize,
}

impl<S> Renderer<S>
where
    S: Scene,
{
    pub fn new(scene: S) -> Self {
        Self::with_camera(scene, OrbitCamera::default())
    }

    pub fn with_camera(scene: S, camera: OrbitCamera) -> Self {
        Self {
            scene,
            camera,
            camera_changed: true,
            drawn: Vec::new(),
            last_stale: false,
            frame_index: 0,
            failures: 0,
        }
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn camera(&self) -> &OrbitCamera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut OrbitCamera {
        self.camera_changed = true;
        &mut self.camera
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Brings the model transforms up to date and draws what changed.
    ///
    /// Never fails: scene errors are logged and the frame is retried on the
    /// next call.
    pub fn render_frame(
        &mut self,
        model: &mut KinematicModel,
        stale: bool,
        overlay: Option<&VideoFrame>,
    ) -> FrameStats {
        // Clean transforms are already consistent with the joint values.
        if model.is_dirty() {
            model.recompute_transforms();
        }
        if self.drawn.len() != model.num_links() {
            self.drawn = vec![None; model.num_links()];
        }
        self.frame_index += 1;
        let stale_changed = stale != self.last_stale;

        let changed_links = model
            .link_transforms()
            .zip(&self.drawn)
            .filter(|((_, transform), drawn)| stale_changed || drawn.as_ref() != Some(*transform))
            .map(|((link, transform), _)| LinkPose {
                name: link.name(),
                transform: *transform,
                visuals: link.visuals(),
            })
            .collect::<Vec<_>>();

        let redrawn_links = changed_links.len();
        if redrawn_links == 0 && !self.camera_changed && overlay.is_none() {
            return FrameStats {
                index: self.frame_index,
                redrawn_links,
                drawn: false,
            };
        }

        let frame = Frame {
            index: self.frame_index,
            changed_links,
            joint_positions: model.joint_positions().collect(),
            stale,
            camera: &self.camera,
            camera_changed: self.camera_changed,
            overlay,
        };
        match self.scene.draw(&frame) {
            Ok(()) => {
                if self.failures > 0 {
                    debug!("scene recovered after {} failed frame(s)", self.failures);
                }
                self.failures = 0;
                for ((_, transform), drawn) in model.link_transforms().zip(self.drawn.iter_mut()) {
                    *drawn = Some(*transform);
                }
                self.last_stale = stale;
                self.camera_changed = false;
            }
            Err(e) => {
                if self.failures == 0 {
                    warn!("failed to draw frame {}: {e}", self.frame_index);
                } else {
                    debug!("failed to draw frame {}: {e}", self.frame_index);
                }
                self.failures += 1;
            }
        }
        FrameStats {
            index: self.frame_index,
            redrawn_links,
            drawn: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::Error, scene::RecordingScene};

    const URDF: &str = r#"
<robot name="r">
  <link name="base"/>
  <link name="a"/>
  <link name="b"/>
  <joint name="j1" type="continuous">
    <parent link="base"/>
    <child link="a"/>
    <axis xyz="0 0 1"/>
  </joint>
  <joint name="j2" type="continuous">
    <parent link="a"/>
    <child link="b"/>
    <origin xyz="1 0 0"/>
    <axis xyz="0 0 1"/>
  </joint>
</robot>
"#;

    #[test]
    fn test_first_frame_draws_everything() {
        let mut model = livelab_kinematics::load_str(URDF).unwrap();
        let scene = RecordingScene::new();
        let mut renderer = Renderer::new(scene.clone());
        let stats = renderer.render_frame(&mut model, false, None);
        assert_eq!(stats.redrawn_links, 3);
        assert!(stats.drawn);
        assert_eq!(
            scene.last_frame().unwrap().changed_links,
            ["base", "a", "b"]
        );
    }

    #[test]
    fn test_only_changed_links_are_redrawn() {
        let mut model = livelab_kinematics::load_str(URDF).unwrap();
        let scene = RecordingScene::new();
        let mut renderer = Renderer::new(scene.clone());
        renderer.render_frame(&mut model, false, None);

        let stats = renderer.render_frame(&mut model, false, None);
        assert_eq!(stats.redrawn_links, 0);
        assert!(!stats.drawn);
        assert_eq!(scene.num_frames(), 1);

        model.set_joint_value("j2", 0.5).unwrap();
        let stats = renderer.render_frame(&mut model, false, None);
        assert_eq!(stats.redrawn_links, 1);
        assert_eq!(scene.last_frame().unwrap().changed_links, ["b"]);
        assert!(!model.is_dirty());

        model.set_joint_value("j1", 0.5).unwrap();
        renderer.render_frame(&mut model, false, None);
        assert_eq!(scene.last_frame().unwrap().changed_links, ["a", "b"]);
    }

    #[test]
    fn test_stale_flip_redraws_all_links() {
        let mut model = livelab_kinematics::load_str(URDF).unwrap();
        let scene = RecordingScene::new();
        let mut renderer = Renderer::new(scene.clone());
        renderer.render_frame(&mut model, false, None);
        let stats = renderer.render_frame(&mut model, true, None);
        assert_eq!(stats.redrawn_links, 3);
        assert!(scene.last_frame().unwrap().stale);
        let stats = renderer.render_frame(&mut model, true, None);
        assert!(!stats.drawn);
    }

    #[test]
    fn test_camera_change_triggers_draw() {
        let mut model = livelab_kinematics::load_str(URDF).unwrap();
        let scene = RecordingScene::new();
        let mut renderer = Renderer::new(scene.clone());
        renderer.render_frame(&mut model, false, None);
        renderer.camera_mut().zoom(0.5);
        let stats = renderer.render_frame(&mut model, false, None);
        assert!(stats.drawn);
        assert_eq!(stats.redrawn_links, 0);
        assert_eq!(scene.num_frames(), 2);
    }

    #[test]
    fn test_overlay_is_forwarded() {
        let mut model = livelab_kinematics::load_str(URDF).unwrap();
        let scene = RecordingScene::new();
        let mut renderer = Renderer::new(scene.clone());
        renderer.render_frame(&mut model, false, None);
        let video = VideoFrame {
            width: 1,
            height: 1,
            data: vec![0, 0, 0],
        };
        renderer.render_frame(&mut model, false, Some(&video));
        assert!(scene.last_frame().unwrap().has_overlay);
    }

    struct FlakyScene {
        fail: bool,
        inner: RecordingScene,
    }

    impl Scene for FlakyScene {
        fn draw(&mut self, frame: &Frame<'_>) -> Result<(), Error> {
            if self.fail {
                return Err(Error::Rejected("flaky".to_owned()));
            }
            self.inner.draw(frame)
        }
    }

    #[test]
    fn test_failed_frame_is_retried() {
        let mut model = livelab_kinematics::load_str(URDF).unwrap();
        let inner = RecordingScene::new();
        let mut renderer = Renderer::new(FlakyScene {
            fail: true,
            inner: inner.clone(),
        });
        let stats = renderer.render_frame(&mut model, false, None);
        assert!(stats.drawn);
        assert_eq!(inner.num_frames(), 0);

        renderer.scene.fail = false;
        let stats = renderer.render_frame(&mut model, false, None);
        assert_eq!(stats.redrawn_links, 3);
        assert_eq!(inner.num_frames(), 1);
    }
}
