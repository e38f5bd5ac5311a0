use std::path::{Path, PathBuf};

use nalgebra as na;
use tracing::warn;

/// Edge length of the cube drawn in place of geometry that could not be resolved.
pub const PLACEHOLDER_SIZE: f64 = 0.02;

// https://github.com/openrr/urdf-rs/pull/3/files#diff-0fb2eeea3273a4c9b3de69ee949567f546dc8c06b1e190336870d00b54ea0979L36-L38
const DEFAULT_MESH_SCALE: [f64; 3] = [1.0; 3];

#[derive(Debug, Clone, PartialEq)]
pub enum VisualGeometry {
    Box { size: [f64; 3] },
    Cylinder { radius: f64, length: f64 },
    Capsule { radius: f64, length: f64 },
    Sphere { radius: f64 },
    Mesh { path: PathBuf, scale: [f64; 3] },
    /// Stand-in primitive for a reference that could not be resolved.
    Placeholder { reference: String },
}

impl VisualGeometry {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, VisualGeometry::Placeholder { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Visual {
    pub origin: na::Isometry3<f64>,
    pub geometry: VisualGeometry,
}

/// Named rigid body of the model.
#[derive(Debug, Clone)]
pub struct Link {
    pub(crate) name: String,
    pub(crate) offset: na::Isometry3<f64>,
    pub(crate) visuals: Vec<Visual>,
    pub(crate) parent_joint: Option<usize>,
    pub(crate) child_joints: Vec<usize>,
}

impl Link {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fixed transform from the parent link frame to the parent joint frame.
    /// Identity for the root link.
    pub fn offset(&self) -> &na::Isometry3<f64> {
        &self.offset
    }

    pub fn visuals(&self) -> &[Visual] {
        &self.visuals
    }

    pub fn is_root(&self) -> bool {
        self.parent_joint.is_none()
    }
}

pub(crate) fn isometry_from_urdf_pose(pose: &urdf_rs::Pose) -> na::Isometry3<f64> {
    na::Isometry3::from_parts(
        na::Translation3::new(pose.xyz[0], pose.xyz[1], pose.xyz[2]),
        na::UnitQuaternion::from_euler_angles(pose.rpy[0], pose.rpy[1], pose.rpy[2]),
    )
}

/// Converts a URDF geometry, degrading unresolvable meshes to a placeholder.
pub(crate) fn resolve_geometry(
    geometry: &urdf_rs::Geometry,
    base_dir: Option<&Path>,
) -> VisualGeometry {
    match *geometry {
        urdf_rs::Geometry::Box { ref size } => VisualGeometry::Box {
            size: [size[0], size[1], size[2]],
        },
        urdf_rs::Geometry::Cylinder { radius, length } => {
            VisualGeometry::Cylinder { radius, length }
        }
        urdf_rs::Geometry::Capsule { radius, length } => VisualGeometry::Capsule { radius, length },
        urdf_rs::Geometry::Sphere { radius } => VisualGeometry::Sphere { radius },
        urdf_rs::Geometry::Mesh {
            ref filename,
            scale,
        } => {
            let scale = scale.map_or(DEFAULT_MESH_SCALE, |s| [s[0], s[1], s[2]]);
            let replaced_filename = match urdf_rs::utils::expand_package_path(filename, base_dir) {
                Ok(replaced_filename) => replaced_filename,
                Err(e) => {
                    warn!("{filename}: {e}, use placeholder");
                    return placeholder(filename);
                }
            };
            let path = Path::new(&*replaced_filename);
            if !path.exists() {
                warn!("{replaced_filename} not found, use placeholder");
                return placeholder(filename);
            }
            VisualGeometry::Mesh {
                path: path.to_owned(),
                scale,
            }
        }
    }
}

fn placeholder(reference: &str) -> VisualGeometry {
    VisualGeometry::Placeholder {
        reference: reference.to_owned(),
    }
}
