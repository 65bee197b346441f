use nalgebra::{Cholesky, DMatrix, DVector, Dyn, Matrix3, SymmetricEigen, Vector3};

use super::integrator;
use crate::{
    MultibodyErrors,
    body::{Body, BodyState},
    joint::RevoluteJoint,
};

/// Constraint rows contributed by one revolute joint: three translational
/// and two rotational about the axes normal to the hinge.
pub const ROWS_PER_JOINT: usize = 5;
const DOF: usize = 6;
const MAX_EIGEN_ITERATIONS: usize = 1000;

/// How the constraint system was factored, kept for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveMethod {
    Unconstrained,
    Cholesky,
    PseudoInverse,
}

enum Factor {
    Cholesky(Cholesky<f64, Dyn>),
    /// Eigenvectors of the effective mass and the reciprocals of its
    /// eigenvalues, zero where an eigenvalue falls below the cutoff.
    PseudoInverse {
        vectors: DMatrix<f64>,
        inverse_values: DVector<f64>,
    },
}

impl Factor {
    fn solve(&self, rhs: &DVector<f64>) -> DVector<f64> {
        match self {
            Factor::Cholesky(cholesky) => cholesky.solve(rhs),
            Factor::PseudoInverse {
                vectors,
                inverse_values,
            } => vectors * vectors.tr_mul(rhs).component_mul(inverse_values),
        }
    }
}

/// Every joint constraint linearized at the start of a step.
///
/// The effective mass `J M^-1 J^T` is assembled block by block from the
/// bodies each joint touches and factored once. The same factor serves the
/// velocity correction and the position projection after integration.
/// Redundant rows from closed loops are handled by a truncated eigen
/// pseudo-inverse.
pub struct ConstraintSystem {
    jacobian: DMatrix<f64>,
    minv_jt: DMatrix<f64>,
    violation: DVector<f64>,
    factor: Factor,
}

impl ConstraintSystem {
    /// Linearizes the joints at `states`. `None` when there are no joints.
    pub fn assemble(
        bodies: &[Body],
        joints: &[RevoluteJoint],
        states: &[BodyState],
        singular_value_tolerance: f64,
        has_loops: bool,
    ) -> Result<Option<Self>, MultibodyErrors> {
        if joints.is_empty() {
            return Ok(None);
        }
        let n = bodies.len() * DOF;
        let m = joints.len() * ROWS_PER_JOINT;

        let mut jacobian = DMatrix::<f64>::zeros(m, n);
        for (k, joint) in joints.iter().enumerate() {
            fill_rows(joint, states, k * ROWS_PER_JOINT, &mut jacobian);
        }

        // M^-1 J^T is one 6x5 block per movable joint end
        let mut minv_jt = DMatrix::<f64>::zeros(n, m);
        let mut touching = vec![Vec::new(); bodies.len()];
        for (k, joint) in joints.iter().enumerate() {
            let row = k * ROWS_PER_JOINT;
            for i in [joint.body_a.0, joint.body_b.0] {
                let body = &bodies[i];
                if body.is_fixed() {
                    continue;
                }
                touching[i].push(row);
                let col = i * DOF;
                let linear = jacobian
                    .fixed_view::<ROWS_PER_JOINT, 3>(row, col)
                    .transpose()
                    * body.inverse_mass();
                let angular = body.inverse_inertia_world()
                    * jacobian
                        .fixed_view::<ROWS_PER_JOINT, 3>(row, col + 3)
                        .transpose();
                minv_jt
                    .fixed_view_mut::<3, ROWS_PER_JOINT>(col, row)
                    .copy_from(&linear);
                minv_jt
                    .fixed_view_mut::<3, ROWS_PER_JOINT>(col + 3, row)
                    .copy_from(&angular);
            }
        }

        // joints couple only through a movable body they share
        let mut effective = DMatrix::<f64>::zeros(m, m);
        for (i, rows) in touching.iter().enumerate() {
            let col = i * DOF;
            for &r in rows {
                for &c in rows {
                    let block = jacobian.fixed_view::<ROWS_PER_JOINT, DOF>(r, col)
                        * minv_jt.fixed_view::<DOF, ROWS_PER_JOINT>(col, c);
                    let mut target =
                        effective.fixed_view_mut::<ROWS_PER_JOINT, ROWS_PER_JOINT>(r, c);
                    target += block;
                }
            }
        }

        let factor = match (!has_loops).then(|| effective.clone().cholesky()).flatten() {
            Some(cholesky) => Factor::Cholesky(cholesky),
            None => {
                let eigen =
                    SymmetricEigen::try_new(effective, f64::EPSILON, MAX_EIGEN_ITERATIONS)
                        .ok_or_else(|| {
                            MultibodyErrors::SolverFailure(
                                "eigen decomposition of the constraint mass did not converge"
                                    .to_string(),
                            )
                        })?;
                let cutoff = singular_value_tolerance * eigen.eigenvalues.amax();
                let inverse_values = eigen
                    .eigenvalues
                    .map(|v| if v > cutoff { 1.0 / v } else { 0.0 });
                Factor::PseudoInverse {
                    vectors: eigen.eigenvectors,
                    inverse_values,
                }
            }
        };

        Ok(Some(Self {
            jacobian,
            minv_jt,
            violation: violation(joints, states),
            factor,
        }))
    }

    pub fn method(&self) -> SolveMethod {
        match self.factor {
            Factor::Cholesky(_) => SolveMethod::Cholesky,
            Factor::PseudoInverse { .. } => SolveMethod::PseudoInverse,
        }
    }

    /// Corrects the predicted velocities so every joint's velocity-level
    /// violation, biased by `baumgarte / dt` times its positional violation,
    /// vanishes: `(J M^-1 J^T) lambda = -(beta / dt) C - J v*`, then
    /// `v = v* + M^-1 J^T lambda`.
    pub fn correct_velocities(
        &self,
        bodies: &[Body],
        states: &mut [BodyState],
        dt: f64,
        baumgarte: f64,
    ) {
        let velocity = stack_velocities(states);
        let rhs = -(baumgarte / dt) * &self.violation - &self.jacobian * velocity;
        let correction = &self.minv_jt * self.factor.solve(&rhs);
        for (i, (body, state)) in bodies.iter().zip(states.iter_mut()).enumerate() {
            if body.is_fixed() {
                continue;
            }
            let base = i * DOF;
            state.linear_velocity += correction.fixed_rows::<3>(base);
            state.angular_velocity += correction.fixed_rows::<3>(base + 3);
        }
    }

    /// One Newton step pulling the integrated positions back onto the
    /// constraint manifold: `(J M^-1 J^T) mu = -C(x)`, `dx = M^-1 J^T mu`.
    /// Velocities are left untouched.
    pub fn project_positions(
        &self,
        bodies: &[Body],
        joints: &[RevoluteJoint],
        states: &mut [BodyState],
    ) {
        let residual = violation(joints, states);
        let displacement = &self.minv_jt * self.factor.solve(&(-residual));
        for (i, (body, state)) in bodies.iter().zip(states.iter_mut()).enumerate() {
            if body.is_fixed() {
                continue;
            }
            let base = i * DOF;
            state.position += displacement.fixed_rows::<3>(base);
            let rotation: Vector3<f64> = displacement.fixed_rows::<3>(base + 3).into_owned();
            integrator::rotate(state, &rotation);
        }
    }
}

fn fill_rows(
    joint: &RevoluteJoint,
    states: &[BodyState],
    row: usize,
    jacobian: &mut DMatrix<f64>,
) {
    let a = &states[joint.body_a.0];
    let b = &states[joint.body_b.0];
    let ra = a.orientation * joint.anchor_a;
    let rb = b.orientation * joint.anchor_b;
    let ca = DOF * joint.body_a.0;
    let cb = DOF * joint.body_b.0;

    // d/dt (pb - pa) = vb - [rb]x wb - va + [ra]x wa
    jacobian
        .fixed_view_mut::<3, 3>(row, ca)
        .copy_from(&(-Matrix3::identity()));
    jacobian
        .fixed_view_mut::<3, 3>(row, ca + 3)
        .copy_from(&ra.cross_matrix());
    jacobian
        .fixed_view_mut::<3, 3>(row, cb)
        .copy_from(&Matrix3::identity());
    jacobian
        .fixed_view_mut::<3, 3>(row, cb + 3)
        .copy_from(&(-rb.cross_matrix()));

    // the hinge axis of A stays normal to both of B's normals:
    // d/dt (a . n) = (a x n) . (wa - wb)
    let axis = a.orientation * joint.axis_a.into_inner();
    for (i, normal) in joint.normals_b.iter().enumerate() {
        let n = b.orientation * normal;
        let r = row + 3 + i;
        let g: Vector3<f64> = axis.cross(&n);
        jacobian
            .fixed_view_mut::<1, 3>(r, ca + 3)
            .copy_from(&g.transpose());
        jacobian
            .fixed_view_mut::<1, 3>(r, cb + 3)
            .copy_from(&(-g).transpose());
    }
}

/// Anchor separation and axis misalignment of every joint, stacked in the
/// row order of the Jacobian.
fn violation(joints: &[RevoluteJoint], states: &[BodyState]) -> DVector<f64> {
    let mut violation = DVector::<f64>::zeros(joints.len() * ROWS_PER_JOINT);
    for (k, joint) in joints.iter().enumerate() {
        let a = &states[joint.body_a.0];
        let b = &states[joint.body_b.0];
        let row = k * ROWS_PER_JOINT;
        let pa = a.position + a.orientation * joint.anchor_a;
        let pb = b.position + b.orientation * joint.anchor_b;
        violation.fixed_rows_mut::<3>(row).copy_from(&(pb - pa));
        let axis = a.orientation * joint.axis_a.into_inner();
        for (i, normal) in joint.normals_b.iter().enumerate() {
            violation[row + 3 + i] = axis.dot(&(b.orientation * normal));
        }
    }
    violation
}

fn stack_velocities(states: &[BodyState]) -> DVector<f64> {
    let mut velocity = DVector::<f64>::zeros(states.len() * DOF);
    for (i, state) in states.iter().enumerate() {
        velocity
            .fixed_rows_mut::<3>(i * DOF)
            .copy_from(&state.linear_velocity);
        velocity
            .fixed_rows_mut::<3>(i * DOF + 3)
            .copy_from(&state.angular_velocity);
    }
    velocity
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::Assembly,
        body::{BodyBuilder, Pose},
        joint::RevoluteJointBuilder,
    };
    use approx::assert_abs_diff_eq;
    use nalgebra::UnitQuaternion;

    fn pendulum() -> Assembly {
        let mut assembly = Assembly::new("pendulum");
        let ground = assembly
            .create_body(BodyBuilder::fixed("ground", Pose::identity()))
            .unwrap();
        let bob = assembly
            .create_body(BodyBuilder::new(
                "bob",
                1.0,
                Matrix3::from_diagonal_element(0.01),
                Pose::from_position(Vector3::new(1.0, 0.0, 0.0)),
            ))
            .unwrap();
        assembly
            .add_revolute(RevoluteJointBuilder::world(
                "pivot",
                ground,
                bob,
                Vector3::zeros(),
                Vector3::z(),
            ))
            .unwrap();
        assembly
    }

    fn states(assembly: &Assembly) -> Vec<BodyState> {
        assembly.bodies().iter().map(|b| *b.state()).collect()
    }

    /// Dense block-diagonal inverse mass, fixed bodies left at zero.
    fn dense_inverse_mass(bodies: &[Body]) -> DMatrix<f64> {
        let n = bodies.len() * DOF;
        let mut inverse_mass = DMatrix::<f64>::zeros(n, n);
        for (i, body) in bodies.iter().enumerate() {
            if body.is_fixed() {
                continue;
            }
            let base = i * DOF;
            inverse_mass
                .fixed_view_mut::<3, 3>(base, base)
                .copy_from(&(Matrix3::identity() * body.inverse_mass()));
            inverse_mass
                .fixed_view_mut::<3, 3>(base + 3, base + 3)
                .copy_from(&body.inverse_inertia_world());
        }
        inverse_mass
    }

    #[test]
    fn test_removes_velocity_along_constraint() {
        let assembly = pendulum();
        let bodies = assembly.bodies().as_slice();
        let mut states = states(&assembly);
        // pulling the bob radially and tilting it out of plane must be cancelled,
        // the tangential part survives
        states[1].linear_velocity = Vector3::new(1.0, 2.0, 0.0);
        states[1].angular_velocity = Vector3::new(0.5, 0.0, 0.0);
        let system = ConstraintSystem::assemble(bodies, assembly.joints(), &states, 1e-9, false)
            .unwrap()
            .unwrap();
        assert_eq!(system.method(), SolveMethod::Cholesky);
        system.correct_velocities(bodies, &mut states, 1e-3, 0.2);

        let v = states[1].linear_velocity;
        let w = states[1].angular_velocity;
        // anchor velocity of the bob is zero: v + w x (0 - x) = 0
        let anchor_velocity = v + w.cross(&Vector3::new(-1.0, 0.0, 0.0));
        assert_abs_diff_eq!(anchor_velocity, Vector3::zeros(), epsilon = 1e-9);
        assert_abs_diff_eq!(w.x, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(w.y, 0.0, epsilon = 1e-9);
        assert!(v.y.abs() > 0.1);
        // fixed bodies are left alone
        assert_eq!(states[0].linear_velocity, Vector3::zeros());
    }

    #[test]
    fn test_without_joints_is_unconstrained() {
        let mut assembly = Assembly::new("free");
        assembly
            .create_body(BodyBuilder::new(
                "b",
                1.0,
                Matrix3::identity(),
                Pose::identity(),
            ))
            .unwrap();
        let system = ConstraintSystem::assemble(
            assembly.bodies().as_slice(),
            assembly.joints(),
            &states(&assembly),
            1e-9,
            false,
        )
        .unwrap();
        assert!(system.is_none());
    }

    #[test]
    fn test_block_effective_mass_matches_dense() {
        // ground - b1 - b2 - b3 chain, tilted bodies and a skewed last hinge
        let mut assembly = Assembly::new("chain");
        let ground = assembly
            .create_body(BodyBuilder::fixed("ground", Pose::identity()))
            .unwrap();
        let mut ids = vec![ground];
        for (i, (mass, roll)) in [(1.0, 0.3), (2.5, -0.7), (0.4, 1.1)].into_iter().enumerate() {
            let id = assembly
                .create_body(BodyBuilder::new(
                    &format!("b{i}"),
                    mass,
                    Matrix3::from_diagonal(&Vector3::new(0.02, 0.05, 0.03)),
                    Pose::new(
                        Vector3::new(i as f64 + 0.5, 0.1, 0.0),
                        UnitQuaternion::from_euler_angles(roll, 0.2, -0.4),
                    ),
                ))
                .unwrap();
            ids.push(id);
        }
        let axes = [Vector3::z(), Vector3::z(), Vector3::new(0.0, 1.0, 1.0)];
        for (i, axis) in axes.into_iter().enumerate() {
            assembly
                .add_revolute(RevoluteJointBuilder::world(
                    &format!("j{i}"),
                    ids[i],
                    ids[i + 1],
                    Vector3::new(i as f64, 0.0, 0.0),
                    axis,
                ))
                .unwrap();
        }

        let bodies = assembly.bodies().as_slice();
        let system =
            ConstraintSystem::assemble(bodies, assembly.joints(), &states(&assembly), 1e-9, false)
                .unwrap()
                .unwrap();
        let dense = dense_inverse_mass(bodies) * system.jacobian.transpose();
        assert_abs_diff_eq!(system.minv_jt, dense, epsilon = 1e-12);

        let effective = &system.jacobian * &dense;
        let rhs = DVector::from_fn(effective.nrows(), |i, _| (i as f64 * 0.7).sin());
        let lambda = system.factor.solve(&rhs);
        assert_abs_diff_eq!(effective * lambda, rhs, epsilon = 1e-9);
    }

    #[test]
    fn test_projection_restores_anchor() {
        let assembly = pendulum();
        let bodies = assembly.bodies().as_slice();
        let mut states = states(&assembly);
        let system = ConstraintSystem::assemble(bodies, assembly.joints(), &states, 1e-9, false)
            .unwrap()
            .unwrap();

        states[1].position += Vector3::new(1e-4, -1e-4, 0.0);
        let before = violation(assembly.joints(), &states).norm();
        system.project_positions(bodies, assembly.joints(), &mut states);
        let after = violation(assembly.joints(), &states).norm();
        assert!(before > 1e-4);
        assert!(after < 1e-7, "left {after}");
        assert_eq!(states[1].linear_velocity, Vector3::zeros());
        assert_eq!(states[0].position, Vector3::zeros());
    }
}
