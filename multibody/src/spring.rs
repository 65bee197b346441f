use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

use crate::{
    MultibodyErrors,
    body::{Body, BodyId, BodyState},
};

/// Separations shorter than this have no usable direction and produce no force.
const MIN_SEPARATION: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpringId(pub(crate) usize);

impl SpringId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl Display for SpringId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum RestLength {
    /// Distance between the two attachment points when the spring is added.
    #[default]
    AtAssembly,
    Literal(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpringAttachments {
    World {
        point_a: Vector3<f64>,
        point_b: Vector3<f64>,
    },
    Local {
        point_a: Vector3<f64>,
        point_b: Vector3<f64>,
    },
}

#[derive(Debug, Clone)]
pub struct SpringDamperBuilder {
    pub name: String,
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub attachments: SpringAttachments,
    pub stiffness: f64,
    pub damping: f64,
    pub rest_length: RestLength,
}

impl SpringDamperBuilder {
    /// Attachment points given in world coordinates at assembly time.
    pub fn world(
        name: &str,
        body_a: BodyId,
        body_b: BodyId,
        point_a: Vector3<f64>,
        point_b: Vector3<f64>,
    ) -> Self {
        Self {
            name: name.to_string(),
            body_a,
            body_b,
            attachments: SpringAttachments::World { point_a, point_b },
            stiffness: 0.0,
            damping: 0.0,
            rest_length: RestLength::AtAssembly,
        }
    }

    /// Attachment points given in each body's own frame.
    pub fn local(
        name: &str,
        body_a: BodyId,
        body_b: BodyId,
        point_a: Vector3<f64>,
        point_b: Vector3<f64>,
    ) -> Self {
        Self {
            attachments: SpringAttachments::Local { point_a, point_b },
            ..Self::world(name, body_a, body_b, point_a, point_b)
        }
    }

    pub fn with_stiffness(mut self, stiffness: f64) -> Self {
        self.stiffness = stiffness;
        self
    }

    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    pub fn with_rest_length(mut self, rest_length: RestLength) -> Self {
        self.rest_length = rest_length;
        self
    }

    fn validate(&self) -> Result<(), MultibodyErrors> {
        let invalid = |msg: &str| MultibodyErrors::InvalidSpring(self.name.clone(), msg.to_string());
        if self.body_a == self.body_b {
            return Err(invalid("both ends attach to the same body"));
        }
        if !(self.stiffness >= 0.0 && self.stiffness.is_finite()) {
            return Err(invalid("stiffness must be finite and >= 0"));
        }
        if !(self.damping >= 0.0 && self.damping.is_finite()) {
            return Err(invalid("damping must be finite and >= 0"));
        }
        if let RestLength::Literal(length) = self.rest_length {
            if !(length >= 0.0 && length.is_finite()) {
                return Err(invalid("rest length must be finite and >= 0"));
            }
        }
        Ok(())
    }
}

/// Linear spring-damper acting along the line between two attachment points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpringDamper {
    pub name: String,
    pub(crate) id: SpringId,
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub attach_a: Vector3<f64>,
    pub attach_b: Vector3<f64>,
    pub stiffness: f64,
    pub damping: f64,
    pub rest_length: f64,
    pub rest_length_policy: RestLength,
}

/// Force and torque on each end of a spring-damper, about each body origin.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpringLoad {
    pub force_a: Vector3<f64>,
    pub torque_a: Vector3<f64>,
    pub force_b: Vector3<f64>,
    pub torque_b: Vector3<f64>,
}

impl SpringDamper {
    pub(crate) fn resolve(
        id: SpringId,
        builder: SpringDamperBuilder,
        a: &Body,
        b: &Body,
    ) -> Result<Self, MultibodyErrors> {
        builder.validate()?;
        let (attach_a, attach_b) = match builder.attachments {
            SpringAttachments::World { point_a, point_b } => {
                (a.local_point(&point_a), b.local_point(&point_b))
            }
            SpringAttachments::Local { point_a, point_b } => (point_a, point_b),
        };
        let mut spring = Self {
            name: builder.name,
            id,
            body_a: builder.body_a,
            body_b: builder.body_b,
            attach_a,
            attach_b,
            stiffness: builder.stiffness,
            damping: builder.damping,
            rest_length: 0.0,
            rest_length_policy: builder.rest_length,
        };
        spring.rest_length = match builder.rest_length {
            // measured with the same mapping the simulator uses so the
            // initial length is reproduced exactly
            RestLength::AtAssembly => spring.length(a.state(), b.state()),
            RestLength::Literal(length) => length,
        };
        Ok(spring)
    }

    pub fn id(&self) -> SpringId {
        self.id
    }

    pub fn world_points(&self, a: &BodyState, b: &BodyState) -> (Vector3<f64>, Vector3<f64>) {
        (
            a.pose().transform_point(&self.attach_a),
            b.pose().transform_point(&self.attach_b),
        )
    }

    pub fn length(&self, a: &BodyState, b: &BodyState) -> f64 {
        let (pa, pb) = self.world_points(a, b);
        (pb - pa).norm()
    }

    /// Force magnitude is `-k (len - rest) - c d(len)/dt`, positive pushing the
    /// ends apart. The force acts on B along the line from A to B and on A opposite.
    pub fn load(&self, a: &BodyState, b: &BodyState) -> SpringLoad {
        if self.stiffness == 0.0 && self.damping == 0.0 {
            return SpringLoad::default();
        }
        let (pa, pb) = self.world_points(a, b);
        let separation = pb - pa;
        let length = separation.norm();
        if !(length > MIN_SEPARATION) {
            return SpringLoad::default();
        }
        let direction = separation / length;
        let rate = (b.point_velocity(&pb) - a.point_velocity(&pa)).dot(&direction);
        let magnitude = -self.stiffness * (length - self.rest_length) - self.damping * rate;

        let force_b = direction * magnitude;
        let force_a = -force_b;
        SpringLoad {
            force_a,
            torque_a: (pa - a.position).cross(&force_a),
            force_b,
            torque_b: (pb - b.position).cross(&force_b),
        }
    }
}
