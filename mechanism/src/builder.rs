use mass_properties::MassProperties;
use multibody::{
    Assembly, BodyBuilder, BodyId, Geometry, JointId, Motor, Pose, RevoluteJointBuilder,
    SpringDamperBuilder,
};
use nalgebra::{UnitQuaternion, Vector3};
use std::collections::HashMap;
use tolerance::Tolerances;

use crate::{
    MechanismErrors,
    chain::{SegmentPlacement, Side},
    config::{Attachment, LegConfig, MechanismConfig, SegmentConfig},
    report::AnchorReport,
};

/// A built mechanism: the assembly, the anchor report of its build and the
/// handles needed to drive it.
#[derive(Debug, Clone)]
pub struct Mechanism {
    pub assembly: Assembly,
    pub report: AnchorReport,
    pub chassis: BodyId,
    drives: Vec<(Side, JointId)>,
    placements: HashMap<String, SegmentPlacement>,
}

impl Mechanism {
    /// Motorized wheel joints on one side.
    pub fn drives(&self, side: Side) -> impl Iterator<Item = JointId> + '_ {
        self.drives
            .iter()
            .filter(move |(s, _)| *s == side)
            .map(|(_, id)| *id)
    }

    /// Sets the torque of every motorized wheel on one side. Takes effect on
    /// the next step.
    pub fn set_drive_torque(&mut self, side: Side, torque: f64) -> Result<(), MechanismErrors> {
        for (s, id) in &self.drives {
            if *s == side {
                self.assembly.set_motor_torque(*id, torque)?;
            }
        }
        Ok(())
    }

    /// Placement of a leg segment body at build time, by body name.
    pub fn placement(&self, body: &str) -> Option<&SegmentPlacement> {
        self.placements.get(body)
    }
}

pub fn body_name(leg: &str, segment: &str, side: Side) -> String {
    format!("{leg}_{segment}_{}", side.suffix())
}

pub fn wheel_name(leg: &str, segment: &str, side: Side) -> String {
    format!("{leg}_{segment}_wheel_{}", side.suffix())
}

/// A rigid link as seen by the anchor checks: its body, pose at build time
/// and characteristic length.
#[derive(Debug, Clone)]
struct Link {
    body: BodyId,
    name: String,
    pose: Pose,
    length: f64,
}

impl Link {
    fn local(&self, world: &Vector3<f64>) -> Vector3<f64> {
        self.pose.orientation.inverse_transform_vector(world)
    }
}

#[derive(Debug, Clone)]
struct SegmentLink {
    link: Link,
    placement: SegmentPlacement,
}

/// A joint whose anchor has been derived from both links, waiting for the
/// anchor report to pass before it is added to the assembly.
struct JointPlan {
    builder: RevoluteJointBuilder,
    drive: Option<Side>,
}

struct Build<'a> {
    config: &'a MechanismConfig,
    tolerance: Tolerances,
    assembly: Assembly,
    report: AnchorReport,
    joints: Vec<JointPlan>,
    springs: Vec<SpringDamperBuilder>,
    placements: HashMap<String, SegmentPlacement>,
}

/// Builds the assembly described by `config`.
///
/// Lengths are converted to meters first. Every joint anchor is computed from
/// both links' own geometry and checked; no joint is added unless all checks
/// pass, so an inconsistent mechanism never reaches the simulator.
pub fn build(config: &MechanismConfig) -> Result<Mechanism, MechanismErrors> {
    config.validate()?;
    let config = config.to_meters();
    let mut b = Build {
        config: &config,
        tolerance: config.tolerance,
        assembly: Assembly::new(&config.name).with_tolerances(config.tolerance),
        report: AnchorReport::default(),
        joints: Vec::new(),
        springs: Vec::new(),
        placements: HashMap::new(),
    };

    for block in config.terrain.floor.iter().chain(&config.terrain.obstacles) {
        let [x, y, z] = block.size;
        b.add_scenery(&block.name, block.position, Geometry::cuboid(x, y, z)?)?;
    }
    for log in &config.terrain.cylinders {
        b.add_scenery(&log.name, log.position, Geometry::cylinder(log.radius, log.length)?)?;
    }
    let chassis = b.add_chassis()?;

    let sides: &[Side] = if config.mirror {
        &[Side::Right, Side::Left]
    } else {
        &[Side::Right]
    };
    for &side in sides {
        let mut links = HashMap::new();
        for leg in &config.legs {
            b.add_leg(leg, side, &chassis, &mut links)?;
        }
        b.add_loop_closures(side, &links)?;
        b.add_springs(side, &chassis, &links)?;
    }

    b.report.assert_anchors_coincide()?;

    let Build {
        mut assembly,
        report,
        joints,
        springs,
        placements,
        ..
    } = b;
    let mut drives = Vec::new();
    for plan in joints {
        let id = assembly.add_revolute(plan.builder)?;
        if let Some(side) = plan.drive {
            drives.push((side, id));
        }
    }
    for spring in springs {
        assembly.add_spring(spring)?;
    }

    tracing::info!(
        "built '{}': {} bodies, {} joints ({} closing loops), {} spring-dampers, max anchor residual {:.3e}",
        assembly.name,
        assembly.bodies().len(),
        assembly.joints().len(),
        assembly.loop_closures().len(),
        assembly.springs().len(),
        report.max_residual()
    );

    Ok(Mechanism {
        assembly,
        report,
        chassis: chassis.body,
        drives,
        placements,
    })
}

impl Build<'_> {
    fn add_scenery(
        &mut self,
        name: &str,
        position: [f64; 3],
        geometry: Geometry,
    ) -> Result<BodyId, MechanismErrors> {
        let builder = BodyBuilder::fixed(name, Pose::from_position(Vector3::from(position)))
            .with_geometry(geometry)
            .with_collision(true);
        Ok(self.assembly.create_body(builder)?)
    }

    fn add_chassis(&mut self) -> Result<Link, MechanismErrors> {
        let chassis = &self.config.chassis;
        let [x, y, z] = chassis.size;
        let pose = Pose::from_position(Vector3::from(chassis.position));
        let builder = if chassis.fixed {
            BodyBuilder::fixed(&chassis.name, pose)
        } else {
            let mp = MassProperties::cuboid(chassis.mass, x, y, z)?;
            BodyBuilder::from_mass_properties(&chassis.name, &mp, pose)
        };
        let body = self.assembly.create_body(
            builder
                .with_geometry(Geometry::cuboid(x, y, z)?)
                .with_collision(true),
        )?;
        Ok(Link {
            body,
            name: chassis.name.clone(),
            pose,
            length: x.max(y).max(z),
        })
    }

    fn add_leg(
        &mut self,
        leg: &LegConfig,
        side: Side,
        chassis: &Link,
        links: &mut HashMap<(String, String), SegmentLink>,
    ) -> Result<(), MechanismErrors> {
        let mount = side.mirror(Vector3::new(leg.mount[0], leg.mount[1], leg.lateral_offset));
        for seg in &leg.segments {
            // parent link with the near anchor in its frame, plus the chain
            // heading on arrival
            let (parent, parent_anchor, heading) = match &seg.parent {
                None => (chassis.clone(), mount, leg.heading),
                Some(p) => {
                    let parent = links.get(&(leg.name.clone(), p.clone())).ok_or_else(|| {
                        MechanismErrors::UnknownParent {
                            leg: leg.name.clone(),
                            segment: seg.name.clone(),
                            parent: p.clone(),
                        }
                    })?;
                    (
                        parent.link.clone(),
                        parent.placement.far_local(),
                        parent.placement.heading,
                    )
                }
            };
            let heading = if seg.fold_back {
                heading.fold_back()
            } else {
                heading
            };
            let near = parent.pose.transform_point(&parent_anchor);
            let placement = SegmentPlacement::new(near, seg.length, seg.angle, heading);

            let name = body_name(&leg.name, &seg.name, side);
            let link = self.add_segment_body(&name, seg, &placement)?;
            self.plan_joint(
                &format!("{}_{}_hinge_{}", leg.name, seg.name, side.suffix()),
                (&parent, parent_anchor),
                (&link, placement.near_local()),
                Vector3::z(),
                None,
            );

            if seg.wheel.is_some() {
                self.add_wheel(leg, seg, side, &link, &placement)?;
            }
            self.placements.insert(name, placement);
            links.insert(
                (leg.name.clone(), seg.name.clone()),
                SegmentLink { link, placement },
            );
        }
        Ok(())
    }

    fn add_segment_body(
        &mut self,
        name: &str,
        seg: &SegmentConfig,
        placement: &SegmentPlacement,
    ) -> Result<Link, MechanismErrors> {
        let mp = MassProperties::cuboid(seg.mass, seg.length, seg.width, seg.width)?;
        let body = self.assembly.create_body(
            BodyBuilder::from_mass_properties(name, &mp, placement.pose)
                .with_geometry(Geometry::cuboid(seg.length, seg.width, seg.width)?),
        )?;
        Ok(Link {
            body,
            name: name.to_string(),
            pose: placement.pose,
            length: seg.length,
        })
    }

    /// Wheel centered on the segment's far joint, pushed outward along the
    /// lateral axis, spinning on a hinge about -Z so positive torque drives
    /// the vehicle forward.
    fn add_wheel(
        &mut self,
        leg: &LegConfig,
        seg: &SegmentConfig,
        side: Side,
        segment: &Link,
        placement: &SegmentPlacement,
    ) -> Result<(), MechanismErrors> {
        let Some(wheel) = &seg.wheel else {
            return Ok(());
        };
        let outward = side.mirror(Vector3::new(0.0, 0.0, wheel.lateral_offset));
        let center = placement.far + outward;
        let name = wheel_name(&leg.name, &seg.name, side);
        let mp = MassProperties::cylinder(wheel.mass, wheel.radius, wheel.width)?;
        let pose = Pose::new(center, UnitQuaternion::identity());
        let body = self.assembly.create_body(
            BodyBuilder::from_mass_properties(&name, &mp, pose)
                .with_geometry(Geometry::cylinder(wheel.radius, wheel.width)?)
                .with_collision(true),
        )?;
        let link = Link {
            body,
            name,
            pose,
            length: wheel.radius,
        };

        let axle = placement.far_local() + segment.local(&outward);
        let torque = match side {
            Side::Right => self.config.torque_right,
            Side::Left => self.config.torque_left,
        };
        self.plan_joint(
            &format!("{}_{}_axle_{}", leg.name, seg.name, side.suffix()),
            (segment, axle),
            (&link, Vector3::zeros()),
            -Vector3::z(),
            wheel.motorized.then_some((side, Motor::new(torque))),
        );
        Ok(())
    }

    fn add_loop_closures(
        &mut self,
        side: Side,
        links: &HashMap<(String, String), SegmentLink>,
    ) -> Result<(), MechanismErrors> {
        let config = self.config;
        for closure in &config.loop_closures {
            let a = segment_link(links, &closure.a.leg, &closure.a.segment)?;
            let b = segment_link(links, &closure.b.leg, &closure.b.segment)?;
            self.plan_joint(
                &format!("{}_{}", closure.name, side.suffix()),
                (&a.link, a.placement.far_local()),
                (&b.link, b.placement.far_local()),
                Vector3::z(),
                None,
            );
        }
        Ok(())
    }

    fn add_springs(
        &mut self,
        side: Side,
        chassis: &Link,
        links: &HashMap<(String, String), SegmentLink>,
    ) -> Result<(), MechanismErrors> {
        let config = self.config;
        for spring in &config.springs {
            let (body_a, point_a) = attachment_point(&spring.a, side, chassis, links)?;
            let (body_b, point_b) = attachment_point(&spring.b, side, chassis, links)?;
            self.springs.push(
                SpringDamperBuilder::world(
                    &format!("{}_{}", spring.name, side.suffix()),
                    body_a,
                    body_b,
                    point_a,
                    point_b,
                )
                .with_stiffness(spring.stiffness)
                .with_damping(spring.damping)
                .with_rest_length(spring.rest_length),
            );
        }
        Ok(())
    }

    /// Records the anchor check for a hinge whose anchor is given
    /// independently in the frame of each link, then queues the joint.
    fn plan_joint(
        &mut self,
        name: &str,
        (a, anchor_a): (&Link, Vector3<f64>),
        (b, anchor_b): (&Link, Vector3<f64>),
        axis: Vector3<f64>,
        drive: Option<(Side, Motor)>,
    ) {
        let world_a = a.pose.transform_point(&anchor_a);
        let world_b = b.pose.transform_point(&anchor_b);
        let residual = (world_a - world_b).norm();
        // the assembly judges the same residual on the same scale
        let scale = a.length.max(b.length);
        self.report
            .record(name, &a.name, &b.name, residual, &self.tolerance, scale);

        let mut builder = RevoluteJointBuilder::local(
            name,
            a.body,
            b.body,
            (anchor_a, a.local(&axis)),
            (anchor_b, b.local(&axis)),
        )
        .with_scale(scale);
        if let Some((_, motor)) = drive {
            builder = builder.with_motor(motor);
        }
        self.joints.push(JointPlan {
            builder,
            drive: drive.map(|(side, _)| side),
        });
    }
}

fn segment_link<'a>(
    links: &'a HashMap<(String, String), SegmentLink>,
    leg: &str,
    segment: &str,
) -> Result<&'a SegmentLink, MechanismErrors> {
    links
        .get(&(leg.to_string(), segment.to_string()))
        .ok_or_else(|| MechanismErrors::UnknownSegment {
            leg: leg.to_string(),
            segment: segment.to_string(),
        })
}

fn attachment_point(
    attachment: &Attachment,
    side: Side,
    chassis: &Link,
    links: &HashMap<(String, String), SegmentLink>,
) -> Result<(BodyId, Vector3<f64>), MechanismErrors> {
    match attachment {
        Attachment::Segment {
            leg,
            segment,
            offset,
        } => {
            let s = segment_link(links, leg, segment)?;
            Ok((s.link.body, s.placement.along_world(*offset)))
        }
        Attachment::Chassis { point } => Ok((
            chassis.body,
            chassis
                .pose
                .transform_point(&side.mirror(Vector3::from(*point))),
        )),
    }
}
