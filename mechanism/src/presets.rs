//! Ready-made rover configurations.

use multibody::RestLength;
use tolerance::Tolerances;

use crate::{
    MechanismErrors,
    chain::Heading,
    config::{
        Attachment, BoxConfig, ChassisConfig, CylinderConfig, LegConfig, LengthUnit,
        LoopClosureConfig, MechanismConfig, SegmentConfig, SegmentRef, SpringConfig,
        TerrainConfig, WheelConfig,
    },
};

pub const NAMES: [&str; 2] = ["fibula_rover", "swing_arm_rover"];

pub fn by_name(name: &str) -> Result<MechanismConfig, MechanismErrors> {
    match name {
        "fibula_rover" => Ok(fibula_rover()),
        "swing_arm_rover" => Ok(swing_arm_rover()),
        _ => Err(MechanismErrors::UnknownPreset(name.to_string())),
    }
}

fn link(name: &str, parent: Option<&str>, length: f64, angle: f64) -> SegmentConfig {
    SegmentConfig {
        name: name.to_string(),
        parent: parent.map(str::to_string),
        length,
        angle,
        fold_back: false,
        width: 0.025,
        mass: 0.25,
        wheel: None,
    }
}

/// Level floor whose top face is the plane y = 0.
fn floor() -> BoxConfig {
    BoxConfig {
        name: "floor".to_string(),
        size: [20.0, 0.1, 20.0],
        position: [0.0, -0.05, 0.0],
    }
}

/// Low step across the path, half sunk into the floor.
fn step_obstacle() -> BoxConfig {
    BoxConfig {
        name: "obstacle".to_string(),
        size: [0.2, 0.1, 1.22],
        position: [2.0, 0.0, 0.0],
    }
}

fn at_knee(leg: &str, segment: &str, offset: f64) -> Attachment {
    Attachment::Segment {
        leg: leg.to_string(),
        segment: segment.to_string(),
        offset,
    }
}

/// Six wheels. Each leg is a thigh hinged under the chassis, a tibia carrying
/// an outer wheel and a fibula folding back from the knee. The front and rear
/// fibula tips are pinned together under the chassis, closing a loop, and the
/// front fibula carries the middle wheel. A spring-damper spans each knee.
pub fn fibula_rover() -> MechanismConfig {
    let length = 0.3512;
    let angle = 30f64.to_radians();
    let wheel = WheelConfig {
        radius: 0.1143,
        width: 0.15,
        mass: 3.0,
        lateral_offset: 0.1,
        motorized: true,
    };
    let mount_y = -0.075;
    let ride_height = wheel.radius - mount_y + 2.0 * length * angle.sin();

    let leg = |name: &str, heading: Heading, middle_wheel: bool| {
        let tibia = SegmentConfig {
            wheel: Some(wheel.clone()),
            ..link("tibia", Some("thigh"), length, angle)
        };
        let fibula = SegmentConfig {
            fold_back: true,
            wheel: middle_wheel.then(|| wheel.clone()),
            ..link("fibula", Some("thigh"), length, angle)
        };
        LegConfig {
            name: name.to_string(),
            mount: [0.0, mount_y],
            heading,
            lateral_offset: 0.32,
            segments: vec![link("thigh", None, length, angle), tibia, fibula],
        }
    };
    let knee_spring = |leg: &str| SpringConfig {
        name: format!("{leg}_knee"),
        a: at_knee(leg, "tibia", 0.15),
        b: at_knee(leg, "fibula", 0.15),
        stiffness: 10000.0,
        damping: 100.0,
        rest_length: RestLength::AtAssembly,
    };

    MechanismConfig {
        name: "fibula_rover".to_string(),
        units: LengthUnit::Meters,
        gravity: [0.0, -9.81, 0.0],
        chassis: ChassisConfig {
            name: "chassis".to_string(),
            size: [0.6096, 0.15, 0.6096],
            mass: 30.0,
            position: [0.0, ride_height, 0.0],
            fixed: false,
        },
        legs: vec![
            leg("front", Heading::Forward, true),
            leg("rear", Heading::Rearward, false),
        ],
        springs: vec![knee_spring("front"), knee_spring("rear")],
        loop_closures: vec![LoopClosureConfig {
            name: "fibula_loop".to_string(),
            a: SegmentRef {
                leg: "front".to_string(),
                segment: "fibula".to_string(),
            },
            b: SegmentRef {
                leg: "rear".to_string(),
                segment: "fibula".to_string(),
            },
        }],
        mirror: true,
        tolerance: Tolerances::default(),
        terrain: TerrainConfig {
            floor: Some(floor()),
            obstacles: vec![step_obstacle()],
            cylinders: Vec::new(),
        },
        torque_left: 2.0,
        torque_right: 2.0,
    }
}

/// Four wheels on single swing arms. A spring-damper couples the front and
/// rear arm of each side and a second one ties the front arm to the chassis.
pub fn swing_arm_rover() -> MechanismConfig {
    let length = 0.4;
    let angle = 40f64.to_radians();
    let wheel = WheelConfig {
        radius: 0.12,
        width: 0.1,
        mass: 2.0,
        lateral_offset: 0.08,
        motorized: true,
    };
    let mount_y = -0.075;
    let ride_height = wheel.radius - mount_y + length * angle.sin();

    let leg = |name: &str, heading: Heading, x: f64| LegConfig {
        name: name.to_string(),
        mount: [x, mount_y],
        heading,
        lateral_offset: 0.3,
        segments: vec![SegmentConfig {
            width: 0.03,
            mass: 0.5,
            wheel: Some(wheel.clone()),
            ..link("arm", None, length, angle)
        }],
    };

    MechanismConfig {
        name: "swing_arm_rover".to_string(),
        units: LengthUnit::Meters,
        gravity: [0.0, -9.81, 0.0],
        chassis: ChassisConfig {
            name: "chassis".to_string(),
            size: [0.8, 0.15, 0.5],
            mass: 20.0,
            position: [0.0, ride_height, 0.0],
            fixed: false,
        },
        legs: vec![
            leg("front", Heading::Forward, 0.25),
            leg("rear", Heading::Rearward, -0.25),
        ],
        springs: vec![
            SpringConfig {
                name: "rocker".to_string(),
                a: at_knee("front", "arm", 0.2),
                b: at_knee("rear", "arm", 0.2),
                stiffness: 3000.0,
                damping: 50.0,
                rest_length: RestLength::AtAssembly,
            },
            SpringConfig {
                name: "bump_stop".to_string(),
                a: Attachment::Chassis {
                    point: [0.0, -0.075, 0.3],
                },
                b: at_knee("front", "arm", 0.3),
                stiffness: 2000.0,
                damping: 40.0,
                rest_length: RestLength::AtAssembly,
            },
        ],
        loop_closures: Vec::new(),
        mirror: true,
        tolerance: Tolerances::default(),
        terrain: TerrainConfig {
            floor: Some(floor()),
            obstacles: vec![step_obstacle()],
            // a 12 in log lying across the path, centered on the floor surface
            cylinders: vec![CylinderConfig {
                name: "log".to_string(),
                radius: 0.3048,
                length: 3.0,
                position: [3.0, 0.0, 0.0],
            }],
        },
        torque_left: 1.0,
        torque_right: 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        for name in NAMES {
            by_name(name).unwrap().validate().unwrap();
        }
        assert!(matches!(
            by_name("tank"),
            Err(MechanismErrors::UnknownPreset(_))
        ));
    }
}
