use std::collections::{BTreeMap, HashMap, HashSet};

use livelab_kinematics::KinematicModel;
use tracing::{debug, warn};

use crate::message::PoseUpdate;

/// Bridges inbound pose updates to the joint values of a [`KinematicModel`].
///
/// Updates are merged into a single latest-value slot that holds at most one
/// value per joint and is drained once per frame by [`apply_pending`].
/// A timestamped value older than the newest stamp seen for its joint is
/// dropped. Untimestamped values are taken in arrival order and leave the
/// stamps untouched.
///
/// [`apply_pending`]: PoseSynchronizer::apply_pending
#[derive(Debug)]
pub struct PoseSynchronizer {
    known_joints: HashSet<String>,
    stamps: HashMap<String, f64>,
    pending: BTreeMap<String, f64>,
    accepting: bool,
    stale: bool,
    closed: bool,
}

impl PoseSynchronizer {
    pub fn new(model: &KinematicModel) -> Self {
        Self {
            known_joints: model.joint_names().into_iter().collect(),
            stamps: HashMap::new(),
            pending: BTreeMap::new(),
            accepting: false,
            stale: false,
            closed: false,
        }
    }

    /// Merges an update into the pending slot and returns how many joint
    /// values were taken.
    pub fn offer(&mut self, update: PoseUpdate) -> usize {
        if !self.accepting {
            debug!(
                "drop pose update with {} joints: not accepting updates",
                update.joints.len()
            );
            return 0;
        }
        let mut taken = 0;
        for (joint, value) in update.joints {
            if !self.known_joints.contains(&joint) {
                warn!("skip unknown joint {joint} in pose update");
                continue;
            }
            if !value.is_finite() {
                warn!("skip non-finite value {value} for joint {joint}");
                continue;
            }
            if let Some(timestamp) = update.timestamp {
                match self.stamps.get(&joint) {
                    Some(&newest) if timestamp < newest => {
                        debug!("drop out-of-order value for {joint}: {timestamp} < {newest}");
                        continue;
                    }
                    _ => {
                        self.stamps.insert(joint.clone(), timestamp);
                    }
                }
            }
            self.pending.insert(joint, value);
            taken += 1;
        }
        taken
    }

    /// Writes the pending values into the model and returns how many were set.
    ///
    /// Transforms are left dirty for the renderer to recompute.
    pub fn apply_pending(&mut self, model: &mut KinematicModel) -> usize {
        if self.closed {
            self.pending.clear();
            return 0;
        }
        let mut applied = 0;
        for (joint, value) in std::mem::take(&mut self.pending) {
            match model.set_joint_value(&joint, value) {
                Ok(_) => applied += 1,
                Err(e) => warn!("skip pose value for {joint}: {e}"),
            }
        }
        applied
    }

    /// Freezes the current pose after a connection loss.
    ///
    /// Values received but not applied yet are dropped.
    pub fn freeze(&mut self) {
        if !self.closed {
            self.accepting = false;
            self.stale = true;
            self.pending.clear();
        }
    }

    /// Starts accepting updates with an empty timestamp baseline.
    pub fn resume(&mut self) {
        if self.closed {
            return;
        }
        self.stamps.clear();
        self.pending.clear();
        self.accepting = true;
        self.stale = false;
    }

    /// Refuses every later update. Cannot be undone.
    pub fn close(&mut self) {
        self.closed = true;
        self.accepting = false;
        self.pending.clear();
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
