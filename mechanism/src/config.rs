use multibody::RestLength;
use nalgebra::Vector3;
use ron::ser::{PrettyConfig, to_string_pretty};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tolerance::Tolerances;

use crate::{MechanismErrors, chain::Heading};

/// Unit of every length in a [`MechanismConfig`]. Masses are always kg,
/// angles radians and gravity m/s^2.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LengthUnit {
    #[default]
    Meters,
    Inches,
    Millimeters,
}

impl LengthUnit {
    pub fn to_meters(&self) -> f64 {
        match self {
            LengthUnit::Meters => 1.0,
            LengthUnit::Inches => 0.0254,
            LengthUnit::Millimeters => 0.001,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChassisConfig {
    pub name: String,
    /// Full box edge lengths along X, Y and Z.
    pub size: [f64; 3],
    pub mass: f64,
    /// World position of the chassis center.
    pub position: [f64; 3],
    /// Pin the chassis in place, e.g. to exercise the suspension in the air.
    #[serde(default)]
    pub fixed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WheelConfig {
    pub radius: f64,
    pub width: f64,
    pub mass: f64,
    /// Outward lateral distance from the segment's far joint to the wheel center.
    #[serde(default)]
    pub lateral_offset: f64,
    #[serde(default = "default_true")]
    pub motorized: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentConfig {
    pub name: String,
    /// Segment of the same leg whose far joint is this segment's near joint.
    /// `None` hinges the segment on the leg's chassis mount.
    #[serde(default)]
    pub parent: Option<String>,
    pub length: f64,
    /// Radians below the horizontal.
    pub angle: f64,
    /// Grow back against the parent's heading.
    #[serde(default)]
    pub fold_back: bool,
    /// Square cross-section edge.
    pub width: f64,
    pub mass: f64,
    #[serde(default)]
    pub wheel: Option<WheelConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegConfig {
    pub name: String,
    /// Hinge point in the chassis frame (X, Y).
    pub mount: [f64; 2],
    pub heading: Heading,
    /// Lateral (Z) offset of the leg plane on the right side. Mirrored on the left.
    pub lateral_offset: f64,
    pub segments: Vec<SegmentConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRef {
    pub leg: String,
    pub segment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Attachment {
    /// At `offset` along the segment from its near joint.
    Segment {
        leg: String,
        segment: String,
        offset: f64,
    },
    /// Chassis-frame point given for the right side, mirrored on the left.
    Chassis { point: [f64; 3] },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpringConfig {
    pub name: String,
    pub a: Attachment,
    pub b: Attachment,
    pub stiffness: f64,
    pub damping: f64,
    #[serde(default)]
    pub rest_length: RestLength,
}

/// Extra hinge joining the far joints of two segments on the same side.
/// It always closes a kinematic loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopClosureConfig {
    pub name: String,
    pub a: SegmentRef,
    pub b: SegmentRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxConfig {
    pub name: String,
    pub size: [f64; 3],
    pub position: [f64; 3],
}

/// Cylinder lying across the path, its axis along the lateral (z) direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CylinderConfig {
    pub name: String,
    pub radius: f64,
    pub length: f64,
    pub position: [f64; 3],
}

/// Fixed collidable scenery. Only exposed to an external contact module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TerrainConfig {
    #[serde(default)]
    pub floor: Option<BoxConfig>,
    #[serde(default)]
    pub obstacles: Vec<BoxConfig>,
    #[serde(default)]
    pub cylinders: Vec<CylinderConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MechanismConfig {
    pub name: String,
    #[serde(default)]
    pub units: LengthUnit,
    #[serde(default = "default_gravity")]
    pub gravity: [f64; 3],
    pub chassis: ChassisConfig,
    pub legs: Vec<LegConfig>,
    #[serde(default)]
    pub springs: Vec<SpringConfig>,
    #[serde(default)]
    pub loop_closures: Vec<LoopClosureConfig>,
    /// Build every leg, spring and loop closure on both sides.
    #[serde(default = "default_true")]
    pub mirror: bool,
    #[serde(default)]
    pub tolerance: Tolerances,
    #[serde(default)]
    pub terrain: TerrainConfig,
    #[serde(default)]
    pub torque_left: f64,
    #[serde(default)]
    pub torque_right: f64,
}

fn default_true() -> bool {
    true
}

fn default_gravity() -> [f64; 3] {
    [0.0, -9.81, 0.0]
}

impl MechanismConfig {
    pub fn from_ron_str(s: &str) -> Result<Self, MechanismErrors> {
        Ok(ron::from_str(s)?)
    }

    pub fn to_ron_string(&self) -> Result<String, MechanismErrors> {
        Ok(to_string_pretty(self, PrettyConfig::new())?)
    }

    pub fn load(path: &Path) -> Result<Self, MechanismErrors> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| MechanismErrors::Read(path.to_path_buf(), e))?;
        Self::from_ron_str(&contents)
    }

    pub fn save(&self, path: &Path) -> Result<(), MechanismErrors> {
        let ron_string = self.to_ron_string()?;
        std::fs::write(path, ron_string)
            .map_err(|e| MechanismErrors::Write(path.to_path_buf(), e))
    }

    pub fn gravity(&self) -> Vector3<f64> {
        Vector3::from(self.gravity)
    }

    /// Copy of this configuration with every length converted to meters.
    pub fn to_meters(&self) -> Self {
        let k = self.units.to_meters();
        let scale3 = |v: [f64; 3]| v.map(|x| x * k);
        let mut c = self.clone();
        c.units = LengthUnit::Meters;

        c.chassis.size = scale3(c.chassis.size);
        c.chassis.position = scale3(c.chassis.position);
        for leg in &mut c.legs {
            leg.mount = leg.mount.map(|x| x * k);
            leg.lateral_offset *= k;
            for seg in &mut leg.segments {
                seg.length *= k;
                seg.width *= k;
                if let Some(wheel) = &mut seg.wheel {
                    wheel.radius *= k;
                    wheel.width *= k;
                    wheel.lateral_offset *= k;
                }
            }
        }
        for spring in &mut c.springs {
            for attachment in [&mut spring.a, &mut spring.b] {
                match attachment {
                    Attachment::Segment { offset, .. } => *offset *= k,
                    Attachment::Chassis { point } => *point = scale3(*point),
                }
            }
            if let RestLength::Literal(length) = &mut spring.rest_length {
                *length *= k;
            }
        }
        for b in c.terrain.floor.iter_mut().chain(c.terrain.obstacles.iter_mut()) {
            b.size = scale3(b.size);
            b.position = scale3(b.position);
        }
        for cylinder in &mut c.terrain.cylinders {
            cylinder.radius *= k;
            cylinder.length *= k;
            cylinder.position = scale3(cylinder.position);
        }
        c
    }

    fn leg(&self, name: &str) -> Result<&LegConfig, MechanismErrors> {
        self.legs
            .iter()
            .find(|l| l.name == name)
            .ok_or_else(|| MechanismErrors::UnknownLeg(name.to_string()))
    }

    /// Rejects non-positive sizes and masses, non-finite numbers and
    /// dangling or duplicate names before anything is built.
    pub fn validate(&self) -> Result<(), MechanismErrors> {
        positive3("chassis size", &self.chassis.size)?;
        positive("chassis mass", self.chassis.mass)?;
        finite3("chassis position", &self.chassis.position)?;
        finite3("gravity", &self.gravity)?;

        for (i, leg) in self.legs.iter().enumerate() {
            if self.legs[..i].iter().any(|l| l.name == leg.name) {
                return Err(MechanismErrors::DuplicateName(leg.name.clone()));
            }
            if leg.segments.is_empty() {
                return Err(MechanismErrors::EmptyLeg(leg.name.clone()));
            }
            finite(&format!("leg '{}' mount x", leg.name), leg.mount[0])?;
            finite(&format!("leg '{}' mount y", leg.name), leg.mount[1])?;
            finite(&format!("leg '{}' lateral offset", leg.name), leg.lateral_offset)?;
            for (j, seg) in leg.segments.iter().enumerate() {
                let what = format!("{} {}", leg.name, seg.name);
                let earlier = &leg.segments[..j];
                if earlier.iter().any(|s| s.name == seg.name) {
                    return Err(MechanismErrors::DuplicateName(what));
                }
                if let Some(parent) = &seg.parent {
                    if !earlier.iter().any(|s| &s.name == parent) {
                        return Err(MechanismErrors::UnknownParent {
                            leg: leg.name.clone(),
                            segment: seg.name.clone(),
                            parent: parent.clone(),
                        });
                    }
                }
                positive(&format!("{what} length"), seg.length)?;
                positive(&format!("{what} width"), seg.width)?;
                positive(&format!("{what} mass"), seg.mass)?;
                finite(&format!("{what} angle"), seg.angle)?;
                if let Some(wheel) = &seg.wheel {
                    positive(&format!("{what} wheel radius"), wheel.radius)?;
                    positive(&format!("{what} wheel width"), wheel.width)?;
                    positive(&format!("{what} wheel mass"), wheel.mass)?;
                    finite(&format!("{what} wheel lateral offset"), wheel.lateral_offset)?;
                }
            }
        }

        for spring in &self.springs {
            for attachment in [&spring.a, &spring.b] {
                match attachment {
                    Attachment::Segment {
                        leg,
                        segment,
                        offset,
                    } => {
                        self.segment(leg, segment)?;
                        finite(&format!("spring '{}' offset", spring.name), *offset)?;
                    }
                    Attachment::Chassis { point } => {
                        finite3(&format!("spring '{}' chassis point", spring.name), point)?
                    }
                }
            }
        }
        for closure in &self.loop_closures {
            self.segment(&closure.a.leg, &closure.a.segment)?;
            self.segment(&closure.b.leg, &closure.b.segment)?;
        }
        for b in self.terrain.floor.iter().chain(&self.terrain.obstacles) {
            positive3(&format!("'{}' size", b.name), &b.size)?;
            finite3(&format!("'{}' position", b.name), &b.position)?;
        }
        for cylinder in &self.terrain.cylinders {
            positive(&format!("'{}' radius", cylinder.name), cylinder.radius)?;
            positive(&format!("'{}' length", cylinder.name), cylinder.length)?;
            finite3(&format!("'{}' position", cylinder.name), &cylinder.position)?;
        }
        finite("left torque", self.torque_left)?;
        finite("right torque", self.torque_right)?;
        Ok(())
    }

    fn segment(&self, leg: &str, segment: &str) -> Result<&SegmentConfig, MechanismErrors> {
        self.leg(leg)?
            .segments
            .iter()
            .find(|s| s.name == segment)
            .ok_or_else(|| MechanismErrors::UnknownSegment {
                leg: leg.to_string(),
                segment: segment.to_string(),
            })
    }
}

fn positive(what: &str, value: f64) -> Result<(), MechanismErrors> {
    finite(what, value)?;
    if value <= 0.0 {
        return Err(MechanismErrors::NonPositive {
            what: what.to_string(),
            value,
        });
    }
    Ok(())
}

fn positive3(what: &str, values: &[f64; 3]) -> Result<(), MechanismErrors> {
    values.iter().try_for_each(|v| positive(what, *v))
}

fn finite(what: &str, value: f64) -> Result<(), MechanismErrors> {
    if !value.is_finite() {
        return Err(MechanismErrors::NonFinite {
            what: what.to_string(),
            value,
        });
    }
    Ok(())
}

fn finite3(what: &str, values: &[f64; 3]) -> Result<(), MechanismErrors> {
    values.iter().try_for_each(|v| finite(what, *v))
}
