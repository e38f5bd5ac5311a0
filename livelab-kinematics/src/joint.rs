use nalgebra as na;
use serde::{Deserialize, Serialize};

/// Kind of motion a joint allows between its parent and child link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointType {
    /// Rotation about the axis, bounded by the limits.
    Revolute,
    /// Translation along the axis, bounded by the limits.
    Prismatic,
    /// Rotation about the axis without limits.
    Continuous,
    /// No motion. The joint has no value.
    Fixed,
}

impl JointType {
    pub fn is_movable(&self) -> bool {
        !matches!(self, JointType::Fixed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointLimits {
    pub lower: f64,
    pub upper: f64,
}

impl JointLimits {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.lower..=self.upper).contains(&value)
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.lower, self.upper)
    }
}

/// Connection between a parent link and a child link.
#[derive(Debug, Clone)]
pub struct Joint {
    pub(crate) name: String,
    pub(crate) joint_type: JointType,
    pub(crate) axis: na::Unit<na::Vector3<f64>>,
    pub(crate) limits: Option<JointLimits>,
    pub(crate) parent_link: String,
    pub(crate) child_link: String,
    pub(crate) parent: usize,
    pub(crate) child: usize,
}

impl Joint {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn joint_type(&self) -> JointType {
        self.joint_type
    }

    pub fn axis(&self) -> &na::Unit<na::Vector3<f64>> {
        &self.axis
    }

    /// Returns `None` for continuous and fixed joints.
    pub fn limits(&self) -> Option<JointLimits> {
        self.limits
    }

    pub fn parent_link(&self) -> &str {
        &self.parent_link
    }

    pub fn child_link(&self) -> &str {
        &self.child_link
    }

    /// Clamps `value` into the range this joint can take.
    ///
    /// Fixed joints always return `0.0`.
    pub fn clamp(&self, value: f64) -> f64 {
        match self.joint_type {
            JointType::Fixed => 0.0,
            JointType::Continuous => value,
            JointType::Revolute | JointType::Prismatic => match self.limits {
                Some(limits) => limits.clamp(value),
                None => value,
            },
        }
    }

    /// Transform produced by this joint at `value`, relative to the joint frame.
    pub fn motion(&self, value: f64) -> na::Isometry3<f64> {
        match self.joint_type {
            JointType::Revolute | JointType::Continuous => na::Isometry3::from_parts(
                na::Translation3::identity(),
                na::UnitQuaternion::from_axis_angle(&self.axis, value),
            ),
            JointType::Prismatic => na::Isometry3::from_parts(
                na::Translation3::from(self.axis.into_inner() * value),
                na::UnitQuaternion::identity(),
            ),
            JointType::Fixed => na::Isometry3::identity(),
        }
    }
}
