use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tolerance::Tolerances;

use crate::{
    MultibodyErrors,
    body::{Body, BodyBuilder, BodyId, BodyRegistry, BodyState},
    geometry::CollisionBody,
    joint::{JointId, JointResidual, RevoluteJoint, RevoluteJointBuilder},
    spring::{SpringDamper, SpringDamperBuilder, SpringId},
};

/// Every body, revolute joint and spring-damper of one mechanism.
///
/// Topology is fixed once stepping starts. The simulator is the only writer of
/// body state; everything else reads committed state between steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assembly {
    pub name: String,
    bodies: BodyRegistry,
    joints: Vec<RevoluteJoint>,
    springs: Vec<SpringDamper>,
    loop_closures: Vec<JointId>,
    /// Union-find over the joint graph. Node 0 is ground, shared by every
    /// fixed body; body `i` is node `i + 1`.
    components: Vec<usize>,
    tolerances: Tolerances,
}

impl Default for Assembly {
    fn default() -> Self {
        Self::new("assembly")
    }
}

impl Assembly {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            bodies: BodyRegistry::new(),
            joints: Vec::new(),
            springs: Vec::new(),
            loop_closures: Vec::new(),
            components: vec![0],
            tolerances: Tolerances::default(),
        }
    }

    pub fn with_tolerances(mut self, tolerances: Tolerances) -> Self {
        self.tolerances = tolerances;
        self
    }

    pub fn tolerances(&self) -> &Tolerances {
        &self.tolerances
    }

    pub fn create_body(&mut self, builder: BodyBuilder) -> Result<BodyId, MultibodyErrors> {
        let id = self.bodies.create_body(builder)?;
        let node = self.components.len();
        self.components.push(node);
        Ok(id)
    }

    /// Adds a hinge. A joint whose bodies are already connected through other
    /// joints (or both through ground) closes a loop: it is kept, flagged, and
    /// the solver treats the resulting redundancy in a least-squares sense.
    pub fn add_revolute(
        &mut self,
        builder: RevoluteJointBuilder,
    ) -> Result<JointId, MultibodyErrors> {
        if self.joints.iter().any(|j| j.name == builder.name) {
            return Err(MultibodyErrors::NameTaken(builder.name));
        }
        let a = self.bodies.get(builder.body_a)?;
        let b = self.bodies.get(builder.body_b)?;
        let scale = builder
            .scale
            .unwrap_or_else(|| (a.state().position - b.state().position).norm());

        let id = JointId(self.joints.len());
        let mut joint = RevoluteJoint::resolve(id, builder, a, b, &self.tolerances, scale)?;
        let (name_a, name_b) = (a.name.clone(), b.name.clone());

        let node_a = self.node(joint.body_a);
        let node_b = self.node(joint.body_b);
        let root_a = self.find(node_a);
        let root_b = self.find(node_b);
        if root_a == root_b {
            joint.closes_loop = true;
            self.loop_closures.push(id);
            tracing::warn!(
                "redundant constraint: joint '{}' closes a kinematic loop between '{}' and '{}'",
                joint.name,
                name_a,
                name_b
            );
        } else {
            self.components[root_a] = root_b;
        }
        tracing::debug!(
            "added revolute joint '{}' between '{}' and '{}'",
            joint.name,
            name_a,
            name_b
        );
        self.joints.push(joint);
        Ok(id)
    }

    pub fn add_spring(&mut self, builder: SpringDamperBuilder) -> Result<SpringId, MultibodyErrors> {
        if self.springs.iter().any(|s| s.name == builder.name) {
            return Err(MultibodyErrors::NameTaken(builder.name));
        }
        let a = self.bodies.get(builder.body_a)?;
        let b = self.bodies.get(builder.body_b)?;
        let id = SpringId(self.springs.len());
        let spring = SpringDamper::resolve(id, builder, a, b)?;
        tracing::debug!(
            "added spring-damper '{}' (k = {}, c = {}, rest = {:.6})",
            spring.name,
            spring.stiffness,
            spring.damping,
            spring.rest_length
        );
        self.springs.push(spring);
        Ok(id)
    }

    /// Changes the torque of a motorized joint. Takes effect on the next step.
    pub fn set_motor_torque(&mut self, id: JointId, torque: f64) -> Result<(), MultibodyErrors> {
        let joint = self
            .joints
            .get_mut(id.0)
            .ok_or(MultibodyErrors::JointNotFound(id))?;
        match joint.motor.as_mut() {
            Some(motor) => {
                motor.torque = torque;
                Ok(())
            }
            None => Err(MultibodyErrors::JointNotMotorized(joint.name.clone())),
        }
    }

    pub fn bodies(&self) -> &BodyRegistry {
        &self.bodies
    }

    pub(crate) fn bodies_mut(&mut self) -> &mut BodyRegistry {
        &mut self.bodies
    }

    pub fn body(&self, id: BodyId) -> Result<&Body, MultibodyErrors> {
        self.bodies.get(id)
    }

    pub fn body_state(&self, id: BodyId) -> Result<&BodyState, MultibodyErrors> {
        self.bodies.get_state(id)
    }

    pub fn find_body(&self, name: &str) -> Option<BodyId> {
        self.bodies.find(name)
    }

    pub fn joints(&self) -> &[RevoluteJoint] {
        &self.joints
    }

    pub fn joint(&self, id: JointId) -> Result<&RevoluteJoint, MultibodyErrors> {
        self.joints
            .get(id.0)
            .ok_or(MultibodyErrors::JointNotFound(id))
    }

    pub fn find_joint(&self, name: &str) -> Option<JointId> {
        self.joints.iter().find(|j| j.name == name).map(|j| j.id)
    }

    pub fn springs(&self) -> &[SpringDamper] {
        &self.springs
    }

    pub fn find_spring(&self, name: &str) -> Option<SpringId> {
        self.springs.iter().find(|s| s.name == name).map(|s| s.id)
    }

    pub fn has_loops(&self) -> bool {
        !self.loop_closures.is_empty()
    }

    /// Joints that closed a kinematic loop when they were added.
    pub fn loop_closures(&self) -> &[JointId] {
        &self.loop_closures
    }

    /// Bodies flagged collidable that carry a geometry primitive.
    pub fn collidables(&self) -> impl Iterator<Item = CollisionBody<'_>> {
        self.bodies.collidables()
    }

    /// Current positional and angular violation of every joint.
    pub fn joint_residuals(&self) -> Vec<JointResidual> {
        let bodies = self.bodies.as_slice();
        self.joints
            .iter()
            .map(|j| j.residual(&bodies[j.body_a.0], &bodies[j.body_b.0]))
            .collect()
    }

    pub fn kinetic_energy(&self) -> f64 {
        self.bodies.iter().map(|b| b.kinetic_energy()).sum()
    }

    /// Potential energy of every movable body in a uniform field `gravity`,
    /// zero at the world origin.
    pub fn gravitational_potential(&self, gravity: &Vector3<f64>) -> f64 {
        self.bodies
            .iter()
            .filter(|b| !b.is_fixed())
            .map(|b| -b.mass() * gravity.dot(&b.state().position))
            .sum()
    }

    fn node(&self, id: BodyId) -> usize {
        match self.bodies.get(id) {
            Ok(body) if !body.is_fixed() => id.0 + 1,
            _ => 0,
        }
    }

    fn find(&mut self, mut node: usize) -> usize {
        while self.components[node] != node {
            self.components[node] = self.components[self.components[node]];
            node = self.components[node];
        }
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{body::Pose, joint::Motor, spring::RestLength};
    use approx::assert_abs_diff_eq;
    use nalgebra::Matrix3;

    fn link(assembly: &mut Assembly, name: &str, x: f64, y: f64) -> BodyId {
        assembly
            .create_body(BodyBuilder::new(
                name,
                1.0,
                Matrix3::from_diagonal_element(0.1),
                Pose::from_position(Vector3::new(x, y, 0.0)),
            ))
            .unwrap()
    }

    #[test]
    fn test_tree_has_no_loops() {
        let mut assembly = Assembly::new("tree");
        let ground = assembly
            .create_body(BodyBuilder::fixed("ground", Pose::identity()))
            .unwrap();
        let b1 = link(&mut assembly, "b1", 0.5, 0.0);
        let b2 = link(&mut assembly, "b2", 1.5, 0.0);
        assembly
            .add_revolute(RevoluteJointBuilder::world(
                "j1",
                ground,
                b1,
                Vector3::zeros(),
                Vector3::z(),
            ))
            .unwrap();
        assembly
            .add_revolute(RevoluteJointBuilder::world(
                "j2",
                b1,
                b2,
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::z(),
            ))
            .unwrap();
        assert!(!assembly.has_loops());
        for residual in assembly.joint_residuals() {
            assert_abs_diff_eq!(residual.position, 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(residual.angle, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_loop_through_ground_is_flagged() {
        let mut assembly = Assembly::new("loop");
        let g1 = assembly
            .create_body(BodyBuilder::fixed("g1", Pose::identity()))
            .unwrap();
        let g2 = assembly
            .create_body(BodyBuilder::fixed(
                "g2",
                Pose::from_position(Vector3::new(2.0, 0.0, 0.0)),
            ))
            .unwrap();
        let b = link(&mut assembly, "b", 1.0, 0.0);
        assembly
            .add_revolute(RevoluteJointBuilder::world("j1", g1, b, Vector3::zeros(), Vector3::z()))
            .unwrap();
        let closing = assembly
            .add_revolute(RevoluteJointBuilder::world(
                "j2",
                b,
                g2,
                Vector3::new(2.0, 0.0, 0.0),
                Vector3::z(),
            ))
            .unwrap();
        assert!(assembly.has_loops());
        assert_eq!(assembly.loop_closures(), &[closing]);
        assert!(assembly.joint(closing).unwrap().closes_loop());
    }

    #[test]
    fn test_local_anchor_mismatch_rejected() {
        let mut assembly = Assembly::new("bad");
        let b1 = link(&mut assembly, "b1", 0.0, 0.0);
        let b2 = link(&mut assembly, "b2", 1.0, 0.0);
        let result = assembly.add_revolute(RevoluteJointBuilder::local(
            "j",
            b1,
            b2,
            (Vector3::new(0.5, 0.0, 0.0), Vector3::z()),
            (Vector3::new(-0.4, 0.0, 0.0), Vector3::z()),
        ));
        assert!(matches!(
            result,
            Err(MultibodyErrors::JointAnchorMismatch { .. })
        ));
    }

    #[test]
    fn test_anchor_residual_judged_on_given_scale() {
        let hinge = |b1, b2| {
            RevoluteJointBuilder::local(
                "j",
                b1,
                b2,
                (Vector3::new(0.15, 0.0, 0.0), Vector3::z()),
                (Vector3::new(-0.15 + 3.2e-7, 0.0, 0.0), Vector3::z()),
            )
        };

        // origins 0.3 apart allow 3e-7
        let mut assembly = Assembly::new("short");
        let b1 = link(&mut assembly, "b1", 0.0, 0.0);
        let b2 = link(&mut assembly, "b2", 0.3, 0.0);
        match assembly.add_revolute(hinge(b1, b2)) {
            Err(MultibodyErrors::JointAnchorMismatch { allowed, .. }) => {
                assert_abs_diff_eq!(allowed, 3e-7, epsilon = 1e-15)
            }
            other => panic!("unexpected {other:?}"),
        }

        // a 0.4 long link allows 4e-7
        let mut assembly = Assembly::new("long");
        let b1 = link(&mut assembly, "b1", 0.0, 0.0);
        let b2 = link(&mut assembly, "b2", 0.3, 0.0);
        let id = assembly.add_revolute(hinge(b1, b2).with_scale(0.4)).unwrap();
        let residual = assembly.joint_residuals()[id.index()];
        assert_abs_diff_eq!(residual.position, 3.2e-7, epsilon = 1e-12);
    }

    #[test]
    fn test_axis_mismatch_rejected() {
        let mut assembly = Assembly::new("bad");
        let b1 = link(&mut assembly, "b1", 0.0, 0.0);
        let b2 = link(&mut assembly, "b2", 1.0, 0.0);
        let result = assembly.add_revolute(RevoluteJointBuilder::local(
            "j",
            b1,
            b2,
            (Vector3::new(0.5, 0.0, 0.0), Vector3::z()),
            (Vector3::new(-0.5, 0.0, 0.0), Vector3::y()),
        ));
        assert!(matches!(
            result,
            Err(MultibodyErrors::JointAxisMismatch { .. })
        ));
    }

    #[test]
    fn test_set_motor_torque() {
        let mut assembly = Assembly::new("motor");
        let b1 = link(&mut assembly, "b1", 0.0, 0.0);
        let b2 = link(&mut assembly, "b2", 1.0, 0.0);
        let plain = assembly
            .add_revolute(RevoluteJointBuilder::world(
                "plain",
                b1,
                b2,
                Vector3::new(0.5, 0.0, 0.0),
                Vector3::z(),
            ))
            .unwrap();
        let b3 = link(&mut assembly, "b3", 2.0, 0.0);
        let driven = assembly
            .add_revolute(
                RevoluteJointBuilder::world(
                    "driven",
                    b2,
                    b3,
                    Vector3::new(1.5, 0.0, 0.0),
                    Vector3::z(),
                )
                .with_motor(Motor::new(1.0)),
            )
            .unwrap();
        assembly.set_motor_torque(driven, 3.0).unwrap();
        assert_eq!(assembly.joint(driven).unwrap().motor, Some(Motor::new(3.0)));
        assert!(matches!(
            assembly.set_motor_torque(plain, 1.0),
            Err(MultibodyErrors::JointNotMotorized(_))
        ));
        assert!(matches!(
            assembly.set_motor_torque(JointId(9), 1.0),
            Err(MultibodyErrors::JointNotFound(_))
        ));
    }

    #[test]
    fn test_spring_validation_and_rest_length() {
        let mut assembly = Assembly::new("springs");
        let b1 = link(&mut assembly, "b1", 0.0, 0.0);
        let b2 = link(&mut assembly, "b2", 1.0, 0.0);
        let id = assembly
            .add_spring(
                SpringDamperBuilder::world(
                    "s",
                    b1,
                    b2,
                    Vector3::new(0.0, 0.2, 0.0),
                    Vector3::new(1.0, -0.2, 0.0),
                )
                .with_stiffness(100.0)
                .with_damping(1.0),
            )
            .unwrap();
        let spring = &assembly.springs()[id.index()];
        assert_abs_diff_eq!(spring.rest_length, (1.0f64 + 0.16).sqrt(), epsilon = 1e-12);

        let negative = SpringDamperBuilder::world("n", b1, b2, Vector3::zeros(), Vector3::x())
            .with_stiffness(-1.0);
        assert!(matches!(
            assembly.add_spring(negative),
            Err(MultibodyErrors::InvalidSpring(..))
        ));
        let bad_rest = SpringDamperBuilder::world("r", b1, b2, Vector3::zeros(), Vector3::x())
            .with_rest_length(RestLength::Literal(-0.1));
        assert!(matches!(
            assembly.add_spring(bad_rest),
            Err(MultibodyErrors::InvalidSpring(..))
        ));
    }

    #[test]
    fn test_energy_diagnostics() {
        let mut assembly = Assembly::new("energy");
        let id = assembly
            .create_body(
                BodyBuilder::new(
                    "b",
                    2.0,
                    Matrix3::from_diagonal_element(0.5),
                    Pose::from_position(Vector3::new(0.0, 3.0, 0.0)),
                )
                .with_velocity(Vector3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 0.0, 2.0)),
            )
            .unwrap();
        assert_eq!(assembly.find_body("b"), Some(id));
        // 0.5 * 2 * 1 + 0.5 * 0.5 * 4
        assert_abs_diff_eq!(assembly.kinetic_energy(), 2.0, epsilon = 1e-12);
        let g = Vector3::new(0.0, -9.81, 0.0);
        assert_abs_diff_eq!(assembly.gravitational_potential(&g), 2.0 * 9.81 * 3.0, epsilon = 1e-12);
    }
}
