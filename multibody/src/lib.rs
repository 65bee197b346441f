//! Rigid-body assemblies connected by revolute joints and spring-dampers,
//! advanced with a fixed-step constrained integrator.
//!
//! The [`assembly::Assembly`] owns bodies, joints and spring-dampers. The
//! [`solver::Simulator`] is the only thing that mutates body state, one
//! [`solver::Simulator::step`] at a time.

pub mod assembly;
pub mod body;
pub mod geometry;
pub mod joint;
pub mod snapshot;
pub mod solver;
pub mod spring;

pub use assembly::Assembly;
pub use body::{BodyBuilder, BodyId, BodyState, Pose};
pub use geometry::{CollisionBody, Geometry};
pub use joint::{JointId, JointResidual, Motor, RevoluteJoint, RevoluteJointBuilder};
pub use snapshot::Snapshot;
pub use solver::{Simulator, SimulatorConfig};
pub use spring::{RestLength, SpringDamper, SpringDamperBuilder, SpringId};

use geometry::GeometryErrors;
use mass_properties::MassPropertiesErrors;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MultibodyErrors {
    #[error("simulator was created for {expected} bodies but the assembly has {found}")]
    AssemblyMismatch { expected: usize, found: usize },
    #[error("could not find body '{0}'")]
    BodyNotFound(BodyId),
    #[error("name cannot be empty")]
    EmptyName,
    #[error("{0}")]
    Geometry(#[from] GeometryErrors),
    #[error("invalid inertia for body '{0}': {1}")]
    InvalidInertia(String, MassPropertiesErrors),
    #[error("invalid mass for body '{0}': {1}")]
    InvalidMass(String, MassPropertiesErrors),
    #[error("joint '{0}' has a zero length hinge axis")]
    InvalidJointAxis(String),
    #[error("spring-damper '{0}': {1}")]
    InvalidSpring(String, String),
    #[error("step size must be positive and finite, got {0}")]
    InvalidStepSize(f64),
    #[error("joint '{joint}' anchors are {residual:.3e} apart, more than the allowed {allowed:.3e}")]
    JointAnchorMismatch {
        joint: String,
        residual: f64,
        allowed: f64,
    },
    #[error("joint '{joint}' hinge axes differ by {angle:.3e} rad")]
    JointAxisMismatch { joint: String, angle: f64 },
    #[error("could not find joint '{0}'")]
    JointNotFound(JointId),
    #[error("joint '{0}' does not have a motor")]
    JointNotMotorized(String),
    #[error("joint '{0}' connects a body to itself")]
    JointSameBody(String),
    #[error("the name '{0}' is already taken")]
    NameTaken(String),
    #[error("state of body '{body}' became non-finite at step {step} (t = {time})")]
    SimulationDivergence { body: String, step: u64, time: f64 },
    #[error("simulator halted after divergence, rebuild the assembly to continue")]
    SimulatorHalted,
    #[error("constraint solve failed: {0}")]
    SolverFailure(String),
}
