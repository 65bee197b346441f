use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum MassPropertiesErrors {
    #[error("shape dimension '{0}' must be greater than zero, got {1}")]
    DimensionLessThanOrEqualToZero(&'static str, f64),
    #[error("inertia tensor is not positive definite")]
    InertiaNotPositiveDefinite,
    #[error("inertia tensor contains a non-finite value")]
    InertiaNotFinite,
    #[error("mass cannot be less than or equal to zero, got {0}")]
    MassLessThanOrEqualToZero(f64),
}

/// Inertia tensor about the center of mass, expressed in the body frame.
/// Only the upper triangle is stored, so the tensor is symmetric by construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Inertia {
    pub ixx: f64,
    pub iyy: f64,
    pub izz: f64,
    pub ixy: f64,
    pub ixz: f64,
    pub iyz: f64,
}

impl Inertia {
    /// Creates a new inertia tensor, failing if it is not symmetric positive definite.
    pub fn new(
        ixx: f64,
        iyy: f64,
        izz: f64,
        ixy: f64,
        ixz: f64,
        iyz: f64,
    ) -> Result<Self, MassPropertiesErrors> {
        let inertia = Self {
            ixx,
            iyy,
            izz,
            ixy,
            ixz,
            iyz,
        };
        inertia.validate()?;
        Ok(inertia)
    }

    /// Diagonal tensor, the common case for primitives aligned with their body frame.
    pub fn principal(ixx: f64, iyy: f64, izz: f64) -> Result<Self, MassPropertiesErrors> {
        Self::new(ixx, iyy, izz, 0.0, 0.0, 0.0)
    }

    /// Solid box of the given mass with edge lengths `x`, `y`, `z` along the body axes.
    pub fn cuboid(mass: f64, x: f64, y: f64, z: f64) -> Result<Self, MassPropertiesErrors> {
        check_mass(mass)?;
        check_dimension("x", x)?;
        check_dimension("y", y)?;
        check_dimension("z", z)?;
        let k = mass / 12.0;
        Self::principal(k * (y * y + z * z), k * (x * x + z * z), k * (x * x + y * y))
    }

    /// Solid cylinder whose symmetry axis is the body z axis.
    pub fn cylinder(mass: f64, radius: f64, height: f64) -> Result<Self, MassPropertiesErrors> {
        check_mass(mass)?;
        check_dimension("radius", radius)?;
        check_dimension("height", height)?;
        let transverse = mass * (3.0 * radius * radius + height * height) / 12.0;
        let axial = 0.5 * mass * radius * radius;
        Self::principal(transverse, transverse, axial)
    }

    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.ixx, self.ixy, self.ixz, //
            self.ixy, self.iyy, self.iyz, //
            self.ixz, self.iyz, self.izz,
        )
    }

    /// Inverse tensor. Only valid for a tensor that passed validation.
    pub fn inverse(&self) -> Result<Matrix3<f64>, MassPropertiesErrors> {
        self.matrix()
            .cholesky()
            .map(|c| c.inverse())
            .ok_or(MassPropertiesErrors::InertiaNotPositiveDefinite)
    }

    fn validate(&self) -> Result<(), MassPropertiesErrors> {
        let m = self.matrix();
        if m.iter().any(|v| !v.is_finite()) {
            return Err(MassPropertiesErrors::InertiaNotFinite);
        }
        // cholesky succeeds only for symmetric positive definite matrices
        if m.cholesky().is_none() {
            return Err(MassPropertiesErrors::InertiaNotPositiveDefinite);
        }
        Ok(())
    }
}

impl TryFrom<Matrix3<f64>> for Inertia {
    type Error = MassPropertiesErrors;
    fn try_from(m: Matrix3<f64>) -> Result<Self, Self::Error> {
        if (m - m.transpose()).abs().max() > 1e-12 * m.abs().max().max(1.0) {
            return Err(MassPropertiesErrors::InertiaNotPositiveDefinite);
        }
        Inertia::new(
            m[(0, 0)],
            m[(1, 1)],
            m[(2, 2)],
            m[(0, 1)],
            m[(0, 2)],
            m[(1, 2)],
        )
    }
}

/// Mass and inertia of a rigid body. The body origin is its center of mass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassProperties {
    pub mass: f64,
    pub inertia: Inertia,
}

impl MassProperties {
    pub fn new(mass: f64, inertia: Inertia) -> Result<Self, MassPropertiesErrors> {
        check_mass(mass)?;
        Ok(Self { mass, inertia })
    }

    pub fn cuboid(mass: f64, x: f64, y: f64, z: f64) -> Result<Self, MassPropertiesErrors> {
        Self::new(mass, Inertia::cuboid(mass, x, y, z)?)
    }

    pub fn cylinder(mass: f64, radius: f64, height: f64) -> Result<Self, MassPropertiesErrors> {
        Self::new(mass, Inertia::cylinder(mass, radius, height)?)
    }
}

fn check_mass(mass: f64) -> Result<(), MassPropertiesErrors> {
    if !mass.is_finite() || mass <= f64::EPSILON {
        return Err(MassPropertiesErrors::MassLessThanOrEqualToZero(mass));
    }
    Ok(())
}

fn check_dimension(name: &'static str, value: f64) -> Result<(), MassPropertiesErrors> {
    if !value.is_finite() || value <= 0.0 {
        return Err(MassPropertiesErrors::DimensionLessThanOrEqualToZero(
            name, value,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    const TOL: f64 = 1e-12;

    #[test]
    fn test_cuboid_inertia() {
        let inertia = Inertia::cuboid(12.0, 1.0, 2.0, 3.0).unwrap();
        assert_abs_diff_eq!(inertia.ixx, 13.0, epsilon = TOL);
        assert_abs_diff_eq!(inertia.iyy, 10.0, epsilon = TOL);
        assert_abs_diff_eq!(inertia.izz, 5.0, epsilon = TOL);
    }

    #[test]
    fn test_cylinder_inertia() {
        let inertia = Inertia::cylinder(2.0, 0.5, 1.0).unwrap();
        // transverse: 2 * (3 * 0.25 + 1) / 12
        assert_abs_diff_eq!(inertia.ixx, 2.0 * 1.75 / 12.0, epsilon = TOL);
        assert_abs_diff_eq!(inertia.izz, 0.25, epsilon = TOL);
    }

    #[test]
    fn test_rejects_non_positive_mass() {
        assert_eq!(
            MassProperties::cuboid(0.0, 1.0, 1.0, 1.0),
            Err(MassPropertiesErrors::MassLessThanOrEqualToZero(0.0))
        );
        assert!(MassProperties::cylinder(-1.0, 1.0, 1.0).is_err());
    }

    #[test]
    fn test_rejects_indefinite_inertia() {
        // positive diagonal but a product of inertia large enough to make it indefinite
        let result = Inertia::new(1.0, 1.0, 1.0, 2.0, 0.0, 0.0);
        assert_eq!(result, Err(MassPropertiesErrors::InertiaNotPositiveDefinite));
        assert!(Inertia::principal(1.0, -1.0, 1.0).is_err());
        assert_eq!(
            Inertia::principal(1.0, f64::NAN, 1.0),
            Err(MassPropertiesErrors::InertiaNotFinite)
        );
    }

    #[test]
    fn test_inverse() {
        let inertia = Inertia::principal(2.0, 4.0, 8.0).unwrap();
        let inv = inertia.inverse().unwrap();
        assert_abs_diff_eq!(inv[(0, 0)], 0.5, epsilon = TOL);
        assert_abs_diff_eq!(inv[(1, 1)], 0.25, epsilon = TOL);
        assert_abs_diff_eq!(inv[(2, 2)], 0.125, epsilon = TOL);
    }

    #[test]
    fn test_try_from_matrix() {
        let m = Matrix3::new(2.0, 0.1, 0.0, 0.1, 2.0, 0.0, 0.0, 0.0, 2.0);
        let inertia = Inertia::try_from(m).unwrap();
        assert_abs_diff_eq!(inertia.ixy, 0.1, epsilon = TOL);
        let asymmetric = Matrix3::new(2.0, 0.5, 0.0, 0.1, 2.0, 0.0, 0.0, 0.0, 2.0);
        assert!(Inertia::try_from(asymmetric).is_err());
    }
}
