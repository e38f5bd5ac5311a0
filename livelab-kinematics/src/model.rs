use std::collections::HashMap;

use nalgebra as na;
use tracing::debug;

use crate::{
    error::{Error, Result},
    joint::{Joint, JointLimits},
    link::Link,
};

/// Link/joint tree of a robot with its live joint values.
///
/// Joint values are mutated through [`set_joint_value`](Self::set_joint_value),
/// which never touches the world transforms. Call
/// [`recompute_transforms`](Self::recompute_transforms) once a batch of values
/// is applied and before trusting [`link_transform`](Self::link_transform).
#[derive(Debug, Clone)]
pub struct KinematicModel {
    name: String,
    links: Vec<Link>,
    joints: Vec<Joint>,
    link_index: HashMap<String, usize>,
    joint_index: HashMap<String, usize>,
    root: usize,
    // Link indices, parents always before children.
    order: Vec<usize>,
    values: Vec<f64>,
    transforms: Vec<na::Isometry3<f64>>,
    dirty: bool,
}

impl KinematicModel {
    pub(crate) fn new(
        name: String,
        links: Vec<Link>,
        joints: Vec<Joint>,
        root: usize,
        order: Vec<usize>,
    ) -> Self {
        debug_assert_eq!(order.len(), links.len());
        let link_index = links
            .iter()
            .enumerate()
            .map(|(i, l)| (l.name.clone(), i))
            .collect();
        let joint_index = joints
            .iter()
            .enumerate()
            .map(|(i, j)| (j.name.clone(), i))
            .collect();
        let values = joints.iter().map(|j| j.clamp(0.0)).collect();
        let transforms = vec![na::Isometry3::identity(); links.len()];
        let mut model = Self {
            name,
            links,
            joints,
            link_index,
            joint_index,
            root,
            order,
            values,
            transforms,
            dirty: true,
        };
        model.recompute_transforms();
        model
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root_link(&self) -> &Link {
        &self.links[self.root]
    }

    /// Links in traversal order (every parent precedes its children).
    pub fn links(&self) -> impl Iterator<Item = &Link> + '_ {
        self.order.iter().map(move |&i| &self.links[i])
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn num_links(&self) -> usize {
        self.links.len()
    }

    pub fn link(&self, name: &str) -> Result<&Link> {
        self.link_index
            .get(name)
            .map(|&i| &self.links[i])
            .ok_or_else(|| Error::unknown_link(name))
    }

    pub fn joint(&self, name: &str) -> Result<&Joint> {
        self.joint_index
            .get(name)
            .map(|&i| &self.joints[i])
            .ok_or_else(|| Error::unknown_joint(name))
    }

    pub fn joint_names(&self) -> Vec<String> {
        self.joints.iter().map(|j| j.name.clone()).collect()
    }

    /// Link names in traversal order, root first.
    pub fn link_names(&self) -> Vec<String> {
        self.links().map(|l| l.name().to_owned()).collect()
    }

    pub fn has_joint(&self, name: &str) -> bool {
        self.joint_index.contains_key(name)
    }

    pub fn joint_limits(&self, name: &str) -> Result<Option<JointLimits>> {
        Ok(self.joint(name)?.limits())
    }

    /// Sets the value of a joint, clamped to its limits, and returns the stored value.
    ///
    /// Out-of-range values are clamped silently. World transforms are marked
    /// dirty but not recomputed.
    pub fn set_joint_value(&mut self, name: &str, value: f64) -> Result<f64> {
        let index = *self
            .joint_index
            .get(name)
            .ok_or_else(|| Error::unknown_joint(name))?;
        if !value.is_finite() {
            return Err(Error::NonFiniteValue {
                joint: name.to_owned(),
                value,
            });
        }
        let clamped = self.joints[index].clamp(value);
        if clamped != value {
            debug!("clamp joint={name} value={value} to {clamped}");
        }
        if self.values[index] != clamped {
            self.values[index] = clamped;
            self.dirty = true;
        }
        Ok(clamped)
    }

    /// Sets many joints at once. Stops at the first error.
    pub fn set_joint_values<I, S>(&mut self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        for (name, value) in values {
            self.set_joint_value(name.as_ref(), value)?;
        }
        Ok(())
    }

    pub fn joint_value(&self, name: &str) -> Result<f64> {
        self.joint_index
            .get(name)
            .map(|&i| self.values[i])
            .ok_or_else(|| Error::unknown_joint(name))
    }

    /// Name and value of every movable joint, in declaration order.
    pub fn joint_positions(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.joints
            .iter()
            .zip(&self.values)
            .filter(|(j, _)| j.joint_type.is_movable())
            .map(|(j, v)| (j.name(), *v))
    }

    /// Returns true if a joint value changed since the last recompute.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Recomputes the world transform of every link from the current joint values.
    pub fn recompute_transforms(&mut self) {
        for &link_index in &self.order {
            let link = &self.links[link_index];
            self.transforms[link_index] = match link.parent_joint {
                None => link.offset,
                Some(joint_index) => {
                    let joint = &self.joints[joint_index];
                    self.transforms[joint.parent]
                        * link.offset
                        * joint.motion(self.values[joint_index])
                }
            };
        }
        self.dirty = false;
    }

    pub fn link_transform(&self, name: &str) -> Result<na::Isometry3<f64>> {
        self.link_index
            .get(name)
            .map(|&i| self.transforms[i])
            .ok_or_else(|| Error::unknown_link(name))
    }

    /// Links with their world transforms, in traversal order.
    pub fn link_transforms(&self) -> impl Iterator<Item = (&Link, &na::Isometry3<f64>)> + '_ {
        self.order
            .iter()
            .map(move |&i| (&self.links[i], &self.transforms[i]))
    }
}
