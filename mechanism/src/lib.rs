//! Turns a parametric rover description into a consistent [`multibody::Assembly`].
//!
//! Legs are planar link chains hanging off the chassis. Every link is placed
//! analytically from lengths and angles, every joint anchor is computed
//! independently from both links it connects, and the build fails before any
//! stepping if the two derivations disagree.

pub mod builder;
pub mod chain;
pub mod config;
pub mod presets;
pub mod report;

pub use builder::{Mechanism, build};
pub use chain::{Heading, SegmentPlacement, Side};
pub use config::{
    Attachment, BoxConfig, ChassisConfig, CylinderConfig, LegConfig, LengthUnit,
    LoopClosureConfig, MechanismConfig, SegmentConfig, SegmentRef, SpringConfig, TerrainConfig,
    WheelConfig,
};
pub use report::{AnchorCheck, AnchorReport};

use mass_properties::MassPropertiesErrors;
use multibody::{MultibodyErrors, geometry::GeometryErrors};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MechanismErrors {
    #[error("duplicate name '{0}'")]
    DuplicateName(String),
    #[error("leg '{0}' has no segments")]
    EmptyLeg(String),
    #[error("{0}")]
    Geometry(#[from] GeometryErrors),
    #[error(
        "joint '{joint}': anchor computed from '{link_a}' and from '{link_b}' differ by {residual:.3e}, more than the tolerance {tolerance:.3e}"
    )]
    InconsistentJointAnchor {
        joint: String,
        link_a: String,
        link_b: String,
        residual: f64,
        tolerance: f64,
    },
    #[error("{0}")]
    MassProperties(#[from] MassPropertiesErrors),
    #[error("{0}")]
    Multibody(#[from] MultibodyErrors),
    #[error("{what} must be finite, got {value}")]
    NonFinite { what: String, value: f64 },
    #[error("{what} must be greater than zero, got {value}")]
    NonPositive { what: String, value: f64 },
    #[error("could not parse configuration: {0}")]
    ParseRon(#[from] ron::error::SpannedError),
    #[error("could not read {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("could not serialize configuration: {0}")]
    SerializeRon(#[from] ron::Error),
    #[error("leg '{0}' is not defined")]
    UnknownLeg(String),
    #[error("segment '{segment}' of leg '{leg}' refers to parent '{parent}' which is not defined before it")]
    UnknownParent {
        leg: String,
        segment: String,
        parent: String,
    },
    #[error("unknown preset '{0}'")]
    UnknownPreset(String),
    #[error("leg '{leg}' has no segment '{segment}'")]
    UnknownSegment { leg: String, segment: String },
    #[error("could not write {0}: {1}")]
    Write(PathBuf, std::io::Error),
}
