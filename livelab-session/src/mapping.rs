use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::message::PoseUpdate;

/// Converts raw follower readings (`"shoulder_pan.pos"` in degrees) into
/// robot description joint values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ObservationMapping {
    #[serde(default = "default_key_suffix")]
    pub key_suffix: String,
    /// Readings are in degrees and are converted to radians.
    #[serde(default = "default_degrees")]
    pub degrees: bool,
    /// Motor name to joint name.
    #[serde(default = "default_joints")]
    pub joints: BTreeMap<String, String>,
}

fn default_joints() -> BTreeMap<String, String> {
    [
        ("shoulder_pan", "Rotation"),
        ("shoulder_lift", "Pitch"),
        ("elbow_flex", "Elbow"),
        ("wrist_flex", "Wrist_Pitch"),
        ("wrist_roll", "Wrist_Roll"),
        ("gripper", "Jaw"),
    ]
    .into_iter()
    .map(|(motor, joint)| (motor.to_owned(), joint.to_owned()))
    .collect()
}

fn default_key_suffix() -> String {
    ".pos".to_owned()
}

const fn default_degrees() -> bool {
    true
}

impl Default for ObservationMapping {
    fn default() -> Self {
        Self {
            key_suffix: default_key_suffix(),
            degrees: default_degrees(),
            joints: default_joints(),
        }
    }
}

impl ObservationMapping {
    /// Builds a partial pose update from the readings this mapping knows.
    ///
    /// Motors missing from `values` are left out of the update.
    pub fn map(&self, values: &BTreeMap<String, f64>, timestamp: Option<f64>) -> PoseUpdate {
        let mut joints = BTreeMap::new();
        for (motor, joint) in &self.joints {
            let key = format!("{motor}{}", self.key_suffix);
            match values.get(&key) {
                Some(value) => {
                    let value = if self.degrees {
                        value.to_radians()
                    } else {
                        *value
                    };
                    joints.insert(joint.clone(), value);
                }
                None => debug!("{key} is not in the observation"),
            }
        }
        PoseUpdate { timestamp, joints }
    }
}
