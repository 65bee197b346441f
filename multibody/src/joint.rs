use nalgebra::{Unit, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use tolerance::Tolerances;

use crate::{
    MultibodyErrors,
    body::{Body, BodyId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JointId(pub(crate) usize);

impl JointId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl Display for JointId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Open-loop torque source about a hinge axis. Positive torque drives body B
/// positively about the hinge axis and reacts equally and oppositely on body A.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Motor {
    pub torque: f64,
}

impl Motor {
    pub fn new(torque: f64) -> Self {
        Self { torque }
    }
}

/// Where the anchor and hinge axis of a new joint come from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JointFrames {
    /// One world point and axis, resolved into both body frames at assembly time.
    World {
        anchor: Vector3<f64>,
        axis: Vector3<f64>,
    },
    /// Independent expressions in each body frame. They must agree in the
    /// world frame at assembly time.
    Local {
        anchor_a: Vector3<f64>,
        axis_a: Vector3<f64>,
        anchor_b: Vector3<f64>,
        axis_b: Vector3<f64>,
    },
}

#[derive(Debug, Clone)]
pub struct RevoluteJointBuilder {
    pub name: String,
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub frames: JointFrames,
    pub motor: Option<Motor>,
    /// Characteristic length the anchor residual is judged against. Defaults
    /// to the distance between the two body origins.
    pub scale: Option<f64>,
}

impl RevoluteJointBuilder {
    pub fn world(
        name: &str,
        body_a: BodyId,
        body_b: BodyId,
        anchor: Vector3<f64>,
        axis: Vector3<f64>,
    ) -> Self {
        Self {
            name: name.to_string(),
            body_a,
            body_b,
            frames: JointFrames::World { anchor, axis },
            motor: None,
            scale: None,
        }
    }

    pub fn local(
        name: &str,
        body_a: BodyId,
        body_b: BodyId,
        (anchor_a, axis_a): (Vector3<f64>, Vector3<f64>),
        (anchor_b, axis_b): (Vector3<f64>, Vector3<f64>),
    ) -> Self {
        Self {
            name: name.to_string(),
            body_a,
            body_b,
            frames: JointFrames::Local {
                anchor_a,
                axis_a,
                anchor_b,
                axis_b,
            },
            motor: None,
            scale: None,
        }
    }

    pub fn with_motor(mut self, motor: Motor) -> Self {
        self.motor = Some(motor);
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }
}

/// A hinge between two bodies. Removes the relative translation and the two
/// rotations perpendicular to the hinge axis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevoluteJoint {
    pub name: String,
    pub(crate) id: JointId,
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub anchor_a: Vector3<f64>,
    pub anchor_b: Vector3<f64>,
    pub axis_a: Unit<Vector3<f64>>,
    pub axis_b: Unit<Vector3<f64>>,
    /// Two unit vectors in B's frame spanning the plane normal to `axis_b`.
    pub(crate) normals_b: [Vector3<f64>; 2],
    pub motor: Option<Motor>,
    pub(crate) closes_loop: bool,
}

impl RevoluteJoint {
    /// Resolves a builder against the current poses of its two bodies. The
    /// anchor residual is judged against `scale`, the axis angle against 1 rad.
    pub(crate) fn resolve(
        id: JointId,
        builder: RevoluteJointBuilder,
        a: &Body,
        b: &Body,
        tolerances: &Tolerances,
        scale: f64,
    ) -> Result<Self, MultibodyErrors> {
        if builder.body_a == builder.body_b {
            return Err(MultibodyErrors::JointSameBody(builder.name));
        }
        let pose_a = a.pose();
        let pose_b = b.pose();
        let (anchor_a, axis_a, anchor_b, axis_b) = match builder.frames {
            JointFrames::World { anchor, axis } => (
                pose_a.inverse_transform_point(&anchor),
                pose_a.orientation.inverse_transform_vector(&axis),
                pose_b.inverse_transform_point(&anchor),
                pose_b.orientation.inverse_transform_vector(&axis),
            ),
            JointFrames::Local {
                anchor_a,
                axis_a,
                anchor_b,
                axis_b,
            } => (anchor_a, axis_a, anchor_b, axis_b),
        };

        let axis_a = Unit::try_new(axis_a, f64::EPSILON)
            .ok_or_else(|| MultibodyErrors::InvalidJointAxis(builder.name.clone()))?;
        let axis_b = Unit::try_new(axis_b, f64::EPSILON)
            .ok_or_else(|| MultibodyErrors::InvalidJointAxis(builder.name.clone()))?;

        let residual =
            (pose_a.transform_point(&anchor_a) - pose_b.transform_point(&anchor_b)).norm();
        if !tolerances.check_residual(residual, scale) {
            return Err(MultibodyErrors::JointAnchorMismatch {
                joint: builder.name,
                residual,
                allowed: tolerances.allowed(scale),
            });
        }
        let world_a = pose_a.orientation * axis_a;
        let world_b = pose_b.orientation * axis_b;
        let angle = world_a.angle(&world_b);
        if !tolerances.check_residual(angle, 1.0) {
            return Err(MultibodyErrors::JointAxisMismatch {
                joint: builder.name,
                angle,
            });
        }

        Ok(Self {
            name: builder.name,
            id,
            body_a: builder.body_a,
            body_b: builder.body_b,
            anchor_a,
            anchor_b,
            axis_a,
            axis_b,
            normals_b: orthonormal_pair(&axis_b),
            motor: builder.motor,
            closes_loop: false,
        })
    }

    pub fn id(&self) -> JointId {
        self.id
    }

    /// True if this joint closed a kinematic loop when it was added.
    pub fn closes_loop(&self) -> bool {
        self.closes_loop
    }

    /// World anchor as seen from body A and from body B.
    pub fn world_anchors(&self, a: &Body, b: &Body) -> (Vector3<f64>, Vector3<f64>) {
        (a.world_point(&self.anchor_a), b.world_point(&self.anchor_b))
    }

    pub fn world_axis(&self, a: &Body) -> Vector3<f64> {
        a.state().orientation * self.axis_a.into_inner()
    }

    /// Current violation: anchor separation and hinge axis misalignment in radians.
    pub fn residual(&self, a: &Body, b: &Body) -> JointResidual {
        let (pa, pb) = self.world_anchors(a, b);
        let axis_a = self.world_axis(a);
        let axis_b = b.state().orientation * self.axis_b.into_inner();
        JointResidual {
            joint: self.id,
            position: (pb - pa).norm(),
            angle: axis_a.angle(&axis_b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointResidual {
    pub joint: JointId,
    pub position: f64,
    pub angle: f64,
}

/// Two unit vectors perpendicular to `axis` and to each other.
fn orthonormal_pair(axis: &Unit<Vector3<f64>>) -> [Vector3<f64>; 2] {
    // seed with the world axis least aligned with the hinge
    let a = axis.into_inner();
    let seed = if a.x.abs() <= a.y.abs() && a.x.abs() <= a.z.abs() {
        Vector3::x()
    } else if a.y.abs() <= a.z.abs() {
        Vector3::y()
    } else {
        Vector3::z()
    };
    let n1 = a.cross(&seed).normalize();
    let n2 = a.cross(&n1);
    [n1, n2]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_orthonormal_pair() {
        for axis in [
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.3, -0.4, 0.5),
        ] {
            let axis = Unit::new_normalize(axis);
            let [n1, n2] = orthonormal_pair(&axis);
            assert_abs_diff_eq!(n1.norm(), 1.0, epsilon = 1e-12);
            assert_abs_diff_eq!(n2.norm(), 1.0, epsilon = 1e-12);
            assert_abs_diff_eq!(n1.dot(&axis), 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(n2.dot(&axis), 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(n1.dot(&n2), 0.0, epsilon = 1e-12);
        }
    }
}
