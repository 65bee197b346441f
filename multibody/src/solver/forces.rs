use nalgebra::Vector3;
use rayon::prelude::*;
use std::ops::AddAssign;

use crate::{assembly::Assembly, spring::SpringLoad};

/// Net external force and torque on a body, about its center of mass, world frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Wrench {
    pub force: Vector3<f64>,
    pub torque: Vector3<f64>,
}

impl AddAssign<&Wrench> for Wrench {
    fn add_assign(&mut self, rhs: &Wrench) {
        self.force += rhs.force;
        self.torque += rhs.torque;
    }
}

/// Gravity on every movable body, spring-damper loads and motor torques.
///
/// Spring loads only read shared state, so they may be evaluated in parallel.
/// They are always summed in declaration order so results do not depend on
/// thread scheduling.
pub fn accumulate(assembly: &Assembly, gravity: &Vector3<f64>, parallel: bool) -> Vec<Wrench> {
    let bodies = assembly.bodies().as_slice();
    let mut wrenches: Vec<Wrench> = bodies
        .iter()
        .map(|body| {
            if body.is_fixed() {
                Wrench::default()
            } else {
                Wrench {
                    force: gravity * body.mass(),
                    torque: Vector3::zeros(),
                }
            }
        })
        .collect();

    let springs = assembly.springs();
    let loads: Vec<SpringLoad> = if parallel {
        springs
            .par_iter()
            .map(|s| s.load(&bodies[s.body_a.0].state, &bodies[s.body_b.0].state))
            .collect()
    } else {
        springs
            .iter()
            .map(|s| s.load(&bodies[s.body_a.0].state, &bodies[s.body_b.0].state))
            .collect()
    };
    for (spring, load) in springs.iter().zip(&loads) {
        wrenches[spring.body_a.0] += &Wrench {
            force: load.force_a,
            torque: load.torque_a,
        };
        wrenches[spring.body_b.0] += &Wrench {
            force: load.force_b,
            torque: load.torque_b,
        };
    }

    for joint in assembly.joints() {
        if let Some(motor) = &joint.motor {
            let axis = joint.world_axis(&bodies[joint.body_a.0]);
            let torque = axis * motor.torque;
            wrenches[joint.body_a.0].torque -= torque;
            wrenches[joint.body_b.0].torque += torque;
        }
    }
    wrenches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        body::{BodyBuilder, Pose},
        joint::{Motor, RevoluteJointBuilder},
        spring::SpringDamperBuilder,
    };
    use approx::assert_abs_diff_eq;
    use nalgebra::Matrix3;

    fn two_links() -> Assembly {
        let mut assembly = Assembly::new("forces");
        for (name, x) in [("a", 0.0), ("b", 1.0)] {
            assembly
                .create_body(BodyBuilder::new(
                    name,
                    2.0,
                    Matrix3::from_diagonal_element(0.1),
                    Pose::from_position(Vector3::new(x, 0.0, 0.0)),
                ))
                .unwrap();
        }
        assembly
    }

    #[test]
    fn test_gravity_scales_with_mass() {
        let assembly = two_links();
        let g = Vector3::new(0.0, -9.81, 0.0);
        let wrenches = accumulate(&assembly, &g, false);
        assert_abs_diff_eq!(wrenches[0].force, Vector3::new(0.0, -19.62, 0.0), epsilon = 1e-12);
        assert_abs_diff_eq!(wrenches[1].torque, Vector3::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn test_motor_torque_is_equal_and_opposite() {
        let mut assembly = two_links();
        let a = assembly.find_body("a").unwrap();
        let b = assembly.find_body("b").unwrap();
        assembly
            .add_revolute(
                RevoluteJointBuilder::world("m", a, b, Vector3::new(0.5, 0.0, 0.0), Vector3::z())
                    .with_motor(Motor::new(4.0)),
            )
            .unwrap();
        let wrenches = accumulate(&assembly, &Vector3::zeros(), false);
        assert_abs_diff_eq!(wrenches[1].torque, Vector3::new(0.0, 0.0, 4.0), epsilon = 1e-12);
        assert_abs_diff_eq!(wrenches[0].torque, -wrenches[1].torque, epsilon = 1e-12);
    }

    #[test]
    fn test_parallel_matches_serial() {
        let mut assembly = two_links();
        let a = assembly.find_body("a").unwrap();
        let b = assembly.find_body("b").unwrap();
        for i in 0..8 {
            let offset = 0.05 * i as f64;
            assembly
                .add_spring(
                    SpringDamperBuilder::world(
                        &format!("s{i}"),
                        a,
                        b,
                        Vector3::new(0.0, offset, 0.0),
                        Vector3::new(1.0, -offset, 0.0),
                    )
                    .with_stiffness(50.0 + i as f64)
                    .with_rest_length(crate::spring::RestLength::Literal(0.5)),
                )
                .unwrap();
        }
        let g = Vector3::new(0.0, -9.81, 0.0);
        assert_eq!(accumulate(&assembly, &g, true), accumulate(&assembly, &g, false));
    }
}
