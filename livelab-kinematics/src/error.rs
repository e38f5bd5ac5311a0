use thiserror::Error;

/// Error for `livelab_kinematics`
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("livelab-kinematics: Malformed model: {}", .0)]
    MalformedModel(String),
    #[error(
        "livelab-kinematics: Unsupported joint type {} for joint={}",
        joint_type,
        joint
    )]
    UnsupportedJointType { joint: String, joint_type: String },
    #[error("livelab-kinematics: No {} named {} is found.", kind, name)]
    UnknownEntity { kind: EntityKind, name: String },
    #[error("livelab-kinematics: Non-finite value {} for joint={}", value, joint)]
    NonFiniteValue { joint: String, value: f64 },
    #[error("livelab-kinematics: URDF error: {:?}", source)]
    Urdf {
        #[from]
        source: urdf_rs::UrdfError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Link,
    Joint,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Link => f.write_str("link"),
            EntityKind::Joint => f.write_str("joint"),
        }
    }
}

impl Error {
    pub(crate) fn unknown_link(name: impl Into<String>) -> Self {
        Self::UnknownEntity {
            kind: EntityKind::Link,
            name: name.into(),
        }
    }

    pub(crate) fn unknown_joint(name: impl Into<String>) -> Self {
        Self::UnknownEntity {
            kind: EntityKind::Joint,
            name: name.into(),
        }
    }
}

/// Result for `livelab_kinematics`
pub type Result<T, E = Error> = std::result::Result<T, E>;
