use std::{collections::HashMap, path::Path};

use nalgebra as na;
use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    joint::{Joint, JointLimits, JointType},
    link::{isometry_from_urdf_pose, resolve_geometry, Link, Visual},
    model::KinematicModel,
};

/// Loads a kinematic model from URDF text.
///
/// Relative mesh paths cannot be resolved without a base directory and are
/// replaced with placeholders. Use [`load_file`] to keep them.
pub fn load_str(urdf: &str) -> Result<KinematicModel> {
    let robot = urdf_rs::read_from_string(urdf)?;
    load_robot(&robot, None)
}

/// Loads a kinematic model from a URDF file. Meshes are resolved relative to
/// the directory of `path`.
pub fn load_file(path: impl AsRef<Path>) -> Result<KinematicModel> {
    let path = path.as_ref();
    let robot = urdf_rs::read_file(path)?;
    load_robot(&robot, path.parent())
}

/// Builds a kinematic model from a parsed robot description.
pub fn load_robot(robot: &urdf_rs::Robot, base_dir: Option<&Path>) -> Result<KinematicModel> {
    let mut link_index = HashMap::with_capacity(robot.links.len());
    let mut links = Vec::with_capacity(robot.links.len());
    for (i, l) in robot.links.iter().enumerate() {
        if link_index.insert(l.name.clone(), i).is_some() {
            return Err(Error::MalformedModel(format!(
                "duplicate link name {}",
                l.name
            )));
        }
        let visuals = l
            .visual
            .iter()
            .map(|v| Visual {
                origin: isometry_from_urdf_pose(&v.origin),
                geometry: resolve_geometry(&v.geometry, base_dir),
            })
            .collect::<Vec<_>>();
        let num_placeholders = visuals
            .iter()
            .filter(|v| v.geometry.is_placeholder())
            .count();
        if num_placeholders > 0 {
            warn!(
                "link {} has {num_placeholders} unresolved visual(s), drawn as placeholder",
                l.name
            );
        }
        links.push(Link {
            name: l.name.clone(),
            offset: na::Isometry3::identity(),
            visuals,
            parent_joint: None,
            child_joints: Vec::new(),
        });
    }
    if links.is_empty() {
        return Err(Error::MalformedModel("no link is found".to_owned()));
    }

    let mut joint_names = HashMap::with_capacity(robot.joints.len());
    let mut joints = Vec::with_capacity(robot.joints.len());
    // Number of joints naming each link as child.
    let mut parent_count = vec![0_usize; links.len()];
    for (i, j) in robot.joints.iter().enumerate() {
        if joint_names.insert(j.name.as_str(), i).is_some() {
            return Err(Error::MalformedModel(format!(
                "duplicate joint name {}",
                j.name
            )));
        }
        let joint_type = convert_joint_type(j)?;
        let find_link = |name: &str| {
            link_index.get(name).copied().ok_or_else(|| {
                Error::MalformedModel(format!("joint {} references unknown link {name}", j.name))
            })
        };
        let parent = find_link(&j.parent.link)?;
        let child = find_link(&j.child.link)?;
        parent_count[child] += 1;
        if parent_count[child] > 1 {
            return Err(Error::MalformedModel(format!(
                "link {} has more than one parent joint",
                j.child.link
            )));
        }
        let axis = na::Vector3::new(j.axis.xyz[0], j.axis.xyz[1], j.axis.xyz[2]);
        let axis = na::Unit::try_new(axis, f64::EPSILON).ok_or_else(|| {
            Error::MalformedModel(format!("joint {} has a zero-length axis", j.name))
        })?;
        let limits = match joint_type {
            JointType::Revolute | JointType::Prismatic => {
                if j.limit.lower > j.limit.upper {
                    return Err(Error::MalformedModel(format!(
                        "joint {} has lower limit {} above upper limit {}",
                        j.name, j.limit.lower, j.limit.upper
                    )));
                }
                Some(JointLimits::new(j.limit.lower, j.limit.upper))
            }
            JointType::Continuous | JointType::Fixed => None,
        };
        links[child].offset = isometry_from_urdf_pose(&j.origin);
        links[child].parent_joint = Some(i);
        links[parent].child_joints.push(i);
        joints.push(Joint {
            name: j.name.clone(),
            joint_type,
            axis,
            limits,
            parent_link: j.parent.link.clone(),
            child_link: j.child.link.clone(),
            parent,
            child,
        });
    }

    let roots = parent_count
        .iter()
        .enumerate()
        .filter(|(_, count)| **count == 0)
        .map(|(i, _)| i)
        .collect::<Vec<_>>();
    let root = match roots.as_slice() {
        [root] => *root,
        [] => {
            return Err(Error::MalformedModel(
                "no root link is found, the link graph is cyclic".to_owned(),
            ))
        }
        _ => {
            return Err(Error::MalformedModel(format!(
                "more than one root link: {:?}",
                roots.iter().map(|&i| &links[i].name).collect::<Vec<_>>()
            )))
        }
    };

    let order = traverse(&links, &joints, root)?;
    debug!(
        "loaded {} with {} links and {} joints, root={}",
        robot.name,
        links.len(),
        joints.len(),
        links[root].name
    );
    Ok(KinematicModel::new(
        robot.name.clone(),
        links,
        joints,
        root,
        order,
    ))
}

/// Depth first traversal from `root` that rejects revisits and unreachable links.
fn traverse(links: &[Link], joints: &[Joint], root: usize) -> Result<Vec<usize>> {
    let mut visited = vec![false; links.len()];
    let mut order = Vec::with_capacity(links.len());
    let mut stack = vec![root];
    while let Some(link_index) = stack.pop() {
        if visited[link_index] {
            return Err(Error::MalformedModel(format!(
                "cycle detected at link {}",
                links[link_index].name
            )));
        }
        visited[link_index] = true;
        order.push(link_index);
        // Reverse so children are visited in declaration order.
        for &joint_index in links[link_index].child_joints.iter().rev() {
            stack.push(joints[joint_index].child);
        }
    }
    if let Some(unreached) = visited.iter().position(|v| !v) {
        return Err(Error::MalformedModel(format!(
            "link {} is not reachable from root {}, the link graph is cyclic",
            links[unreached].name, links[root].name
        )));
    }
    Ok(order)
}

fn convert_joint_type(joint: &urdf_rs::Joint) -> Result<JointType> {
    match joint.joint_type {
        urdf_rs::JointType::Revolute => Ok(JointType::Revolute),
        urdf_rs::JointType::Prismatic => Ok(JointType::Prismatic),
        urdf_rs::JointType::Continuous => Ok(JointType::Continuous),
        urdf_rs::JointType::Fixed => Ok(JointType::Fixed),
        ref other => Err(Error::UnsupportedJointType {
            joint: joint.name.clone(),
            joint_type: format!("{other:?}"),
        }),
    }
}
