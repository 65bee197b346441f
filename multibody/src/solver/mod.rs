use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::{
    MultibodyErrors,
    assembly::Assembly,
    body::{BodyId, BodyState},
    snapshot::Snapshot,
};

pub mod constraints;
pub mod forces;
pub mod integrator;

use constraints::{ConstraintSystem, SolveMethod};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Uniform gravitational acceleration, world frame.
    pub gravity: Vector3<f64>,
    /// Fraction of the positional joint violation fed back per step as a
    /// velocity bias. 0 disables drift correction.
    pub baumgarte: f64,
    /// Singular values below this fraction of the largest one are treated as
    /// zero by the pseudo-inverse.
    pub singular_value_tolerance: f64,
    /// Newton passes projecting the integrated positions back onto the joint
    /// constraints. 0 leaves drift to the Baumgarte term alone.
    pub projection_iterations: usize,
    /// Evaluate spring-damper loads on the rayon thread pool.
    pub parallel: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            gravity: Vector3::new(0.0, -9.81, 0.0),
            baumgarte: 0.2,
            singular_value_tolerance: 1e-9,
            projection_iterations: 1,
            parallel: false,
        }
    }
}

impl SimulatorConfig {
    pub fn zero_gravity() -> Self {
        Self {
            gravity: Vector3::zeros(),
            ..Default::default()
        }
    }
}

/// Fixed-step driver for one [`Assembly`].
///
/// Each [`Simulator::step`] runs force accumulation, the velocity-level
/// constraint solve, integration and a position projection on a scratch copy
/// of the body states, and commits them to the assembly only if every state
/// is finite. After a divergence the simulator
/// halts and refuses further steps.
#[derive(Debug, Clone)]
pub struct Simulator {
    pub config: SimulatorConfig,
    body_count: usize,
    step_count: u64,
    time: f64,
    halted: bool,
    committed: Vec<BodyState>,
    last_method: SolveMethod,
}

impl Simulator {
    pub fn new(assembly: &Assembly, config: SimulatorConfig) -> Self {
        if assembly.has_loops() {
            tracing::info!(
                "'{}' has {} loop closing joint(s), constraints are solved by pseudo-inverse",
                assembly.name,
                assembly.loop_closures().len()
            );
        }
        Self {
            config,
            body_count: assembly.bodies().len(),
            step_count: 0,
            time: 0.0,
            halted: false,
            committed: assembly.bodies().iter().map(|b| *b.state()).collect(),
            last_method: SolveMethod::Unconstrained,
        }
    }

    pub fn step(&mut self, assembly: &mut Assembly, dt: f64) -> Result<(), MultibodyErrors> {
        if self.halted {
            return Err(MultibodyErrors::SimulatorHalted);
        }
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(MultibodyErrors::InvalidStepSize(dt));
        }
        if assembly.bodies().len() != self.body_count {
            return Err(MultibodyErrors::AssemblyMismatch {
                expected: self.body_count,
                found: assembly.bodies().len(),
            });
        }

        let bodies = assembly.bodies().as_slice();
        let wrenches = forces::accumulate(assembly, &self.config.gravity, self.config.parallel);
        let mut states = integrator::predict_velocities(bodies, &wrenches, dt);
        let joints = assembly.joints();
        let system = ConstraintSystem::assemble(
            bodies,
            joints,
            &states,
            self.config.singular_value_tolerance,
            assembly.has_loops(),
        )?;
        if let Some(system) = &system {
            system.correct_velocities(bodies, &mut states, dt, self.config.baumgarte);
        }
        integrator::integrate_positions(bodies, &mut states, dt);
        if let Some(system) = &system {
            for _ in 0..self.config.projection_iterations {
                system.project_positions(bodies, joints, &mut states);
            }
        }
        self.last_method = system
            .as_ref()
            .map_or(SolveMethod::Unconstrained, ConstraintSystem::method);

        if let Some((body, _)) = bodies
            .iter()
            .zip(&states)
            .find(|(body, state)| !body.is_fixed() && !state.is_finite())
        {
            self.halted = true;
            let err = MultibodyErrors::SimulationDivergence {
                body: body.name.clone(),
                step: self.step_count + 1,
                time: self.time + dt,
            };
            tracing::error!("{err}");
            return Err(err);
        }

        assembly.bodies_mut().commit(&states);
        self.committed = states;
        self.step_count += 1;
        self.time += dt;
        Ok(())
    }

    /// Last committed state of a body.
    pub fn body_state(&self, id: BodyId) -> Result<&BodyState, MultibodyErrors> {
        self.committed
            .get(id.0)
            .ok_or(MultibodyErrors::BodyNotFound(id))
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            step: self.step_count,
            time: self.time,
            states: self.committed.clone(),
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn last_solve_method(&self) -> SolveMethod {
        self.last_method
    }
}
