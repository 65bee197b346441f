use multibody::Pose;
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Which way along X a chain grows: forward is +X.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Heading {
    Forward,
    Rearward,
}

impl Heading {
    pub fn sign(&self) -> f64 {
        match self {
            Heading::Forward => 1.0,
            Heading::Rearward => -1.0,
        }
    }

    /// Reverses the chain direction for a segment that folds back toward
    /// the chassis. The segment angle keeps its meaning (downward from the
    /// horizontal), only the horizontal component changes sign.
    pub fn fold_back(self) -> Self {
        match self {
            Heading::Forward => Heading::Rearward,
            Heading::Rearward => Heading::Forward,
        }
    }
}

/// Vehicle side. Right is +Z; the left side is the mirror image in Z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Right,
    Left,
}

impl Side {
    pub fn sign(&self) -> f64 {
        match self {
            Side::Right => 1.0,
            Side::Left => -1.0,
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            Side::Right => "r",
            Side::Left => "l",
        }
    }

    /// Negates the lateral component on the left side.
    pub fn mirror(&self, v: Vector3<f64>) -> Vector3<f64> {
        Vector3::new(v.x, v.y, self.sign() * v.z)
    }
}

impl Display for Side {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Side::Right => write!(f, "right"),
            Side::Left => write!(f, "left"),
        }
    }
}

/// Unit direction of a segment in the chain (XY) plane. `angle` is measured
/// from the horizontal, positive pointing down.
pub fn segment_direction(angle: f64, heading: Heading) -> Vector3<f64> {
    Vector3::new(heading.sign() * angle.cos(), -angle.sin(), 0.0)
}

/// World placement of one straight segment between its near and far joints.
///
/// The body frame sits at the midpoint with local +X pointing from the near
/// joint to the far joint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentPlacement {
    pub near: Vector3<f64>,
    pub far: Vector3<f64>,
    pub length: f64,
    pub heading: Heading,
    pub pose: Pose,
}

impl SegmentPlacement {
    pub fn new(near: Vector3<f64>, length: f64, angle: f64, heading: Heading) -> Self {
        let direction = segment_direction(angle, heading);
        let far = near + direction * length;
        let midpoint = (near + far) * 0.5;
        let orientation =
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), direction.y.atan2(direction.x));
        Self {
            near,
            far,
            length,
            heading,
            pose: Pose::new(midpoint, orientation),
        }
    }

    pub fn near_local(&self) -> Vector3<f64> {
        self.along_local(0.0)
    }

    pub fn far_local(&self) -> Vector3<f64> {
        self.along_local(self.length)
    }

    /// Body-frame point at `offset` along the segment from its near joint.
    pub fn along_local(&self, offset: f64) -> Vector3<f64> {
        Vector3::new(offset - 0.5 * self.length, 0.0, 0.0)
    }

    /// World point at `offset` from the near joint, derived from the body pose.
    pub fn along_world(&self, offset: f64) -> Vector3<f64> {
        self.pose.transform_point(&self.along_local(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_forward_segment_at_thirty_degrees() {
        let near = Vector3::new(0.0, 0.3, 0.0);
        let seg = SegmentPlacement::new(near, 0.3, 30f64.to_radians(), Heading::Forward);
        let expected = Vector3::new(
            0.3 * 30f64.to_radians().cos(),
            0.3 - 0.3 * 30f64.to_radians().sin(),
            0.0,
        );
        assert_abs_diff_eq!(seg.far, expected, epsilon = 1e-12);
        // the body pose reproduces both joints
        assert_abs_diff_eq!(seg.along_world(0.0), near, epsilon = 1e-12);
        assert_abs_diff_eq!(seg.along_world(0.3), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_fold_back_reverses_horizontal_only() {
        let angle = 0.4;
        let forward = segment_direction(angle, Heading::Forward);
        let back = segment_direction(angle, Heading::Forward.fold_back());
        assert_abs_diff_eq!(back.x, -forward.x, epsilon = 1e-15);
        assert_abs_diff_eq!(back.y, forward.y, epsilon = 1e-15);
        assert_eq!(Heading::Rearward.fold_back(), Heading::Forward);
    }

    #[test]
    fn test_mirror() {
        let v = Vector3::new(1.0, 2.0, 3.0);
        assert_eq!(Side::Right.mirror(v), v);
        assert_eq!(Side::Left.mirror(v), Vector3::new(1.0, 2.0, -3.0));
    }
}
