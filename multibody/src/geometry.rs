use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::body::{BodyId, Pose};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GeometryErrors {
    #[error("cuboid dimension must be greater than 0")]
    CuboidDimension,
    #[error("cylinder radius and height must be greater than 0")]
    CylinderDimension,
}

/// Simple primitives attached to a body, centered on the body origin.
/// Only consumed by external visualization and collision collaborators.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize, Serialize)]
pub enum Geometry {
    /// Box with full edge lengths along the body x, y and z axes.
    Cuboid { x: f64, y: f64, z: f64 },
    /// Cylinder whose symmetry axis is the body z axis.
    Cylinder { radius: f64, height: f64 },
}

impl Geometry {
    pub fn cuboid(x: f64, y: f64, z: f64) -> Result<Self, GeometryErrors> {
        if !(x > 0.0 && y > 0.0 && z > 0.0) {
            return Err(GeometryErrors::CuboidDimension);
        }
        Ok(Geometry::Cuboid { x, y, z })
    }

    pub fn cylinder(radius: f64, height: f64) -> Result<Self, GeometryErrors> {
        if !(radius > 0.0 && height > 0.0) {
            return Err(GeometryErrors::CylinderDimension);
        }
        Ok(Geometry::Cylinder { radius, height })
    }
}

/// A collidable body as seen by an external collision module.
#[derive(Debug, Clone, Copy)]
pub struct CollisionBody<'a> {
    pub id: BodyId,
    pub name: &'a str,
    pub geometry: &'a Geometry,
    pub pose: Pose,
    pub fixed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_dimensions() {
        assert_eq!(
            Geometry::cuboid(1.0, 0.0, 1.0),
            Err(GeometryErrors::CuboidDimension)
        );
        assert_eq!(
            Geometry::cylinder(f64::NAN, 1.0),
            Err(GeometryErrors::CylinderDimension)
        );
    }
}
