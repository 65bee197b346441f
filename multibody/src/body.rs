use mass_properties::{Inertia, MassProperties};
use nalgebra::{Matrix3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt::{self, Display, Formatter},
};

use crate::{
    MultibodyErrors,
    geometry::{CollisionBody, Geometry},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyId(pub(crate) usize);

impl BodyId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl Display for BodyId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position and orientation of a body frame in the world frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    pub fn identity() -> Self {
        Self {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
        }
    }

    pub fn new(position: Vector3<f64>, orientation: UnitQuaternion<f64>) -> Self {
        Self {
            position,
            orientation,
        }
    }

    pub fn from_position(position: Vector3<f64>) -> Self {
        Self {
            position,
            orientation: UnitQuaternion::identity(),
        }
    }

    /// Maps a point from the body frame to the world frame.
    pub fn transform_point(&self, local: &Vector3<f64>) -> Vector3<f64> {
        self.position + self.orientation * local
    }

    /// Maps a world point into the body frame.
    pub fn inverse_transform_point(&self, world: &Vector3<f64>) -> Vector3<f64> {
        self.orientation.inverse_transform_vector(&(world - self.position))
    }
}

/// Kinematic state of a body. Velocities are expressed in the world frame,
/// the linear velocity is that of the body origin (center of mass).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyState {
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
    pub linear_velocity: Vector3<f64>,
    pub angular_velocity: Vector3<f64>,
}

impl Default for BodyState {
    fn default() -> Self {
        Self::at_rest(Pose::identity())
    }
}

impl BodyState {
    pub fn at_rest(pose: Pose) -> Self {
        Self {
            position: pose.position,
            orientation: pose.orientation,
            linear_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
        }
    }

    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.orientation)
    }

    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|v| v.is_finite())
            && self.orientation.coords.iter().all(|v| v.is_finite())
            && self.linear_velocity.iter().all(|v| v.is_finite())
            && self.angular_velocity.iter().all(|v| v.is_finite())
    }

    /// Velocity of a material point of the body currently at `world_point`.
    pub fn point_velocity(&self, world_point: &Vector3<f64>) -> Vector3<f64> {
        self.linear_velocity + self.angular_velocity.cross(&(world_point - self.position))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BodyMass {
    Dynamic {
        mass_properties: MassProperties,
        inverse_inertia: Matrix3<f64>,
    },
    /// Infinite mass, never moved by the simulator.
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Body {
    pub name: String,
    id: BodyId,
    mass: BodyMass,
    geometry: Option<Geometry>,
    collidable: bool,
    pub(crate) state: BodyState,
}

impl Body {
    pub fn id(&self) -> BodyId {
        self.id
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self.mass, BodyMass::Fixed)
    }

    pub fn is_collidable(&self) -> bool {
        self.collidable
    }

    pub fn geometry(&self) -> Option<&Geometry> {
        self.geometry.as_ref()
    }

    pub fn mass_properties(&self) -> Option<&MassProperties> {
        match &self.mass {
            BodyMass::Dynamic {
                mass_properties, ..
            } => Some(mass_properties),
            BodyMass::Fixed => None,
        }
    }

    pub fn state(&self) -> &BodyState {
        &self.state
    }

    pub fn pose(&self) -> Pose {
        self.state.pose()
    }

    pub fn mass(&self) -> f64 {
        match &self.mass {
            BodyMass::Dynamic {
                mass_properties, ..
            } => mass_properties.mass,
            BodyMass::Fixed => f64::INFINITY,
        }
    }

    pub fn inverse_mass(&self) -> f64 {
        match &self.mass {
            BodyMass::Dynamic {
                mass_properties, ..
            } => 1.0 / mass_properties.mass,
            BodyMass::Fixed => 0.0,
        }
    }

    /// Inertia tensor rotated into the world frame, R * I * R^T.
    pub fn inertia_world(&self) -> Matrix3<f64> {
        match &self.mass {
            BodyMass::Dynamic {
                mass_properties, ..
            } => {
                let r = self.state.orientation.to_rotation_matrix();
                r.matrix() * mass_properties.inertia.matrix() * r.matrix().transpose()
            }
            BodyMass::Fixed => Matrix3::zeros(),
        }
    }

    /// Inverse inertia in the world frame, zero for fixed bodies.
    pub fn inverse_inertia_world(&self) -> Matrix3<f64> {
        match &self.mass {
            BodyMass::Dynamic {
                inverse_inertia, ..
            } => {
                let r = self.state.orientation.to_rotation_matrix();
                r.matrix() * inverse_inertia * r.matrix().transpose()
            }
            BodyMass::Fixed => Matrix3::zeros(),
        }
    }

    pub fn world_point(&self, local: &Vector3<f64>) -> Vector3<f64> {
        self.pose().transform_point(local)
    }

    pub fn local_point(&self, world: &Vector3<f64>) -> Vector3<f64> {
        self.pose().inverse_transform_point(world)
    }

    pub fn kinetic_energy(&self) -> f64 {
        match &self.mass {
            BodyMass::Dynamic {
                mass_properties, ..
            } => {
                let v = &self.state.linear_velocity;
                let w = &self.state.angular_velocity;
                0.5 * mass_properties.mass * v.norm_squared()
                    + 0.5 * w.dot(&(self.inertia_world() * w))
            }
            BodyMass::Fixed => 0.0,
        }
    }
}

/// Describes a body to be created in a [`BodyRegistry`].
#[derive(Debug, Clone)]
pub struct BodyBuilder {
    pub name: String,
    pub mass: f64,
    pub inertia: Matrix3<f64>,
    pub pose: Pose,
    pub fixed: bool,
    pub geometry: Option<Geometry>,
    pub collidable: bool,
    pub linear_velocity: Vector3<f64>,
    pub angular_velocity: Vector3<f64>,
}

impl BodyBuilder {
    pub fn new(name: &str, mass: f64, inertia: Matrix3<f64>, pose: Pose) -> Self {
        Self {
            name: name.to_string(),
            mass,
            inertia,
            pose,
            fixed: false,
            geometry: None,
            collidable: false,
            linear_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
        }
    }

    /// A body of infinite mass, typically terrain.
    pub fn fixed(name: &str, pose: Pose) -> Self {
        let mut builder = Self::new(name, 0.0, Matrix3::zeros(), pose);
        builder.fixed = true;
        builder
    }

    pub fn from_mass_properties(name: &str, mass_properties: &MassProperties, pose: Pose) -> Self {
        Self::new(
            name,
            mass_properties.mass,
            mass_properties.inertia.matrix(),
            pose,
        )
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn with_collision(mut self, collidable: bool) -> Self {
        self.collidable = collidable;
        self
    }

    pub fn with_velocity(mut self, linear: Vector3<f64>, angular: Vector3<f64>) -> Self {
        self.linear_velocity = linear;
        self.angular_velocity = angular;
        self
    }

    fn resolve_mass(&self) -> Result<BodyMass, MultibodyErrors> {
        if self.fixed {
            return Ok(BodyMass::Fixed);
        }
        let inertia = Inertia::try_from(self.inertia)
            .map_err(|e| MultibodyErrors::InvalidInertia(self.name.clone(), e))?;
        let mass_properties = MassProperties::new(self.mass, inertia)
            .map_err(|e| MultibodyErrors::InvalidMass(self.name.clone(), e))?;
        let inverse_inertia = inertia
            .inverse()
            .map_err(|e| MultibodyErrors::InvalidInertia(self.name.clone(), e))?;
        Ok(BodyMass::Dynamic {
            mass_properties,
            inverse_inertia,
        })
    }
}

/// Owns every body of an assembly. Bodies are only ever added; their state is
/// only mutated by the simulator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BodyRegistry {
    bodies: Vec<Body>,
    names: HashMap<String, BodyId>,
}

impl BodyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_body(&mut self, builder: BodyBuilder) -> Result<BodyId, MultibodyErrors> {
        if builder.name.is_empty() {
            return Err(MultibodyErrors::EmptyName);
        }
        if self.names.contains_key(&builder.name) {
            return Err(MultibodyErrors::NameTaken(builder.name));
        }
        let mass = builder.resolve_mass()?;
        let id = BodyId(self.bodies.len());
        let (linear_velocity, angular_velocity) = if builder.fixed {
            (Vector3::zeros(), Vector3::zeros())
        } else {
            (builder.linear_velocity, builder.angular_velocity)
        };
        let state = BodyState {
            position: builder.pose.position,
            orientation: builder.pose.orientation,
            linear_velocity,
            angular_velocity,
        };
        self.names.insert(builder.name.clone(), id);
        self.bodies.push(Body {
            name: builder.name,
            id,
            mass,
            geometry: builder.geometry,
            collidable: builder.collidable,
            state,
        });
        Ok(id)
    }

    pub fn get(&self, id: BodyId) -> Result<&Body, MultibodyErrors> {
        self.bodies
            .get(id.0)
            .ok_or(MultibodyErrors::BodyNotFound(id))
    }

    pub fn get_state(&self, id: BodyId) -> Result<&BodyState, MultibodyErrors> {
        Ok(&self.get(id)?.state)
    }

    pub fn find(&self, name: &str) -> Option<BodyId> {
        self.names.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Body> {
        self.bodies.iter()
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn as_slice(&self) -> &[Body] {
        &self.bodies
    }

    pub fn collidables(&self) -> impl Iterator<Item = CollisionBody<'_>> {
        self.bodies.iter().filter(|b| b.collidable).filter_map(|b| {
            b.geometry.as_ref().map(|geometry| CollisionBody {
                id: b.id,
                name: &b.name,
                geometry,
                pose: b.pose(),
                fixed: b.is_fixed(),
            })
        })
    }

    /// Overwrites every body state. Fixed bodies keep their state.
    pub(crate) fn commit(&mut self, states: &[BodyState]) {
        for (body, state) in self.bodies.iter_mut().zip(states) {
            if !body.is_fixed() {
                body.state = *state;
            }
        }
    }
}
